use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Canonical gRPC status codes as carried in `grpc-status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(i32)]
pub enum StatusCode {
    #[default]
    Ok = 0,
    Cancelled = 1,
    Unknown = 2,
    InvalidArgument = 3,
    DeadlineExceeded = 4,
    NotFound = 5,
    AlreadyExists = 6,
    PermissionDenied = 7,
    ResourceExhausted = 8,
    FailedPrecondition = 9,
    Aborted = 10,
    OutOfRange = 11,
    Unimplemented = 12,
    Internal = 13,
    Unavailable = 14,
    DataLoss = 15,
    Unauthenticated = 16,
}

impl From<StatusCode> for i32 {
    fn from(code: StatusCode) -> Self {
        code as i32
    }
}

impl From<i32> for StatusCode {
    fn from(value: i32) -> Self {
        match value {
            0 => StatusCode::Ok,
            1 => StatusCode::Cancelled,
            2 => StatusCode::Unknown,
            3 => StatusCode::InvalidArgument,
            4 => StatusCode::DeadlineExceeded,
            5 => StatusCode::NotFound,
            6 => StatusCode::AlreadyExists,
            7 => StatusCode::PermissionDenied,
            8 => StatusCode::ResourceExhausted,
            9 => StatusCode::FailedPrecondition,
            10 => StatusCode::Aborted,
            11 => StatusCode::OutOfRange,
            12 => StatusCode::Unimplemented,
            13 => StatusCode::Internal,
            14 => StatusCode::Unavailable,
            15 => StatusCode::DataLoss,
            16 => StatusCode::Unauthenticated,
            _ => StatusCode::Unknown,
        }
    }
}

impl From<tonic::Code> for StatusCode {
    fn from(code: tonic::Code) -> Self {
        StatusCode::from(code as i32)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl StatusCode {
    /// Returns true if this status code represents success
    pub fn is_ok(&self) -> bool {
        matches!(self, StatusCode::Ok)
    }

    /// Returns the canonical upper-case name used by gRPC implementations
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::Cancelled => "CANCELLED",
            StatusCode::Unknown => "UNKNOWN",
            StatusCode::InvalidArgument => "INVALID_ARGUMENT",
            StatusCode::DeadlineExceeded => "DEADLINE_EXCEEDED",
            StatusCode::NotFound => "NOT_FOUND",
            StatusCode::AlreadyExists => "ALREADY_EXISTS",
            StatusCode::PermissionDenied => "PERMISSION_DENIED",
            StatusCode::ResourceExhausted => "RESOURCE_EXHAUSTED",
            StatusCode::FailedPrecondition => "FAILED_PRECONDITION",
            StatusCode::Aborted => "ABORTED",
            StatusCode::OutOfRange => "OUT_OF_RANGE",
            StatusCode::Unimplemented => "UNIMPLEMENTED",
            StatusCode::Internal => "INTERNAL",
            StatusCode::Unavailable => "UNAVAILABLE",
            StatusCode::DataLoss => "DATA_LOSS",
            StatusCode::Unauthenticated => "UNAUTHENTICATED",
        }
    }
}

fn status_name(code: &i32) -> &'static str {
    StatusCode::from(*code).as_str()
}

/// Everything a single call can fail with. None of these are retried.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("failed to encode message: {0}")]
    Encoding(String),
    #[error("malformed frame: {0}")]
    Framing(String),
    #[error("failed to decode message: {0}")]
    Decoding(#[from] prost::DecodeError),
    #[error("unexpected http status {status}: {body}")]
    Transport {
        status: http::StatusCode,
        body: String,
    },
    #[error("failed to parse grpc-status {value:?}")]
    StatusParse { value: String },
    #[error("unexpected grpc status {code} ({name}) {message}", name = status_name(.code))]
    Status { code: i32, message: String },
    #[error("deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),
    #[error("http client error: {0}")]
    Client(#[from] hyper_util::client::legacy::Error),
    #[error("response body error: {0}")]
    Body(#[from] hyper::Error),
    #[error("transport error: {0}")]
    Connect(#[from] tonic::transport::Error),
    #[error("tls setup failed: {0}")]
    Tls(#[from] rustls::Error),
    #[error("invalid target: {0}")]
    InvalidTarget(String),
}

pub type RPCResult<T> = Result<T, RpcError>;

impl RpcError {
    pub fn status(code: StatusCode, message: impl Into<String>) -> Self {
        RpcError::Status {
            code: code.into(),
            message: message.into(),
        }
    }

    /// The gRPC code this error would be reported as.
    pub fn code(&self) -> StatusCode {
        match self {
            RpcError::Status { code, .. } => StatusCode::from(*code),
            RpcError::DeadlineExceeded(_) => StatusCode::DeadlineExceeded,
            RpcError::Encoding(_) | RpcError::Framing(_) | RpcError::Decoding(_) => {
                StatusCode::Internal
            }
            RpcError::StatusParse { .. } => StatusCode::Unknown,
            RpcError::InvalidTarget(_) | RpcError::Tls(_) => StatusCode::InvalidArgument,
            RpcError::Transport { .. }
            | RpcError::Client(_)
            | RpcError::Body(_)
            | RpcError::Connect(_) => StatusCode::Unavailable,
        }
    }
}

impl From<tonic::Status> for RpcError {
    fn from(status: tonic::Status) -> Self {
        RpcError::Status {
            code: status.code() as i32,
            message: status.message().to_string(),
        }
    }
}
