use http::HeaderMap;
use percent_encoding::percent_decode_str;

use super::{GRPC_MESSAGE, GRPC_STATUS};
use crate::err::{RPCResult, RpcError, StatusCode};

/// The completion status of a call, independent of the HTTP status.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CallStatus {
    pub code: i32,
    pub message: String,
}

impl CallStatus {
    pub fn is_ok(&self) -> bool {
        self.status_code().is_ok()
    }

    pub fn status_code(&self) -> StatusCode {
        StatusCode::from(self.code)
    }

    pub fn into_result(self) -> RPCResult<()> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(RpcError::Status {
                code: self.code,
                message: self.message,
            })
        }
    }
}

/// Works out the call's completion status.
///
/// Trailers are authoritative; headers are only consulted when trailers do
/// not carry the field, which is how servers answer a call that failed before
/// producing any body (a "trailers-only" response). A missing status means 0.
pub fn resolve(headers: &HeaderMap, trailers: Option<&HeaderMap>) -> RPCResult<CallStatus> {
    let code = match lookup(headers, trailers, GRPC_STATUS) {
        Some(value) => {
            let raw = value.to_str().map_err(|_| RpcError::StatusParse {
                value: String::from_utf8_lossy(value.as_bytes()).into_owned(),
            })?;
            raw.trim()
                .parse::<i32>()
                .map_err(|_| RpcError::StatusParse {
                    value: raw.to_string(),
                })?
        }
        None => 0,
    };

    let message = lookup(headers, trailers, GRPC_MESSAGE)
        .map(|value| {
            let raw = String::from_utf8_lossy(value.as_bytes());
            percent_decode_str(&raw).decode_utf8_lossy().into_owned()
        })
        .unwrap_or_default();

    Ok(CallStatus { code, message })
}

fn lookup<'a>(
    headers: &'a HeaderMap,
    trailers: Option<&'a HeaderMap>,
    name: &str,
) -> Option<&'a http::HeaderValue> {
    trailers
        .and_then(|t| t.get(name))
        .or_else(|| headers.get(name))
}
