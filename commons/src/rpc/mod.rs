use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use http::Uri;

use crate::err::{RPCResult, RpcError};
use msg::{HelloReply, HelloRequest};

pub mod codec;
pub mod grpc;
pub mod msg;
pub mod raw;
pub mod status;

pub const GREETER_SERVICE: &str = "helloworld.Greeter";
pub const SAY_HELLO_METHOD: &str = "SayHello";

pub const CONTENT_TYPE_GRPC_PROTO: &str = "application/grpc+proto";
pub const GRPC_STATUS: &str = "grpc-status";
pub const GRPC_MESSAGE: &str = "grpc-message";

/// One way of issuing the greeting call. Implementations must be usable from
/// many workers at once and keep no per-call state.
#[async_trait]
pub trait Caller: Send + Sync {
    async fn say_hello(
        &self,
        request: HelloRequest,
        deadline: Option<Duration>,
    ) -> RPCResult<HelloReply>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallerKind {
    /// Hand-built frames over a bare HTTP/2 client.
    Raw,
    /// The tonic generated client.
    Stack,
}

impl fmt::Display for CallerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallerKind::Raw => write!(f, "raw"),
            CallerKind::Stack => write!(f, "stack"),
        }
    }
}

impl CallerKind {
    pub fn build(self, target: CallTarget) -> RPCResult<Arc<dyn Caller>> {
        match self {
            CallerKind::Raw => Ok(Arc::new(raw::RawCaller::new(target)?)),
            CallerKind::Stack => Ok(Arc::new(grpc::GrpcTX::new(target)?)),
        }
    }
}

/// Endpoint plus the `<service>/<method>` the call is addressed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallTarget {
    secure: bool,
    host: String,
    port: u16,
    service: String,
    method: String,
}

impl CallTarget {
    /// Parses a base url such as `http://localhost:8080` and addresses the
    /// greeter's `SayHello` method. The url must carry a scheme; the port
    /// defaults to 443 for `https` and 80 for `http`.
    pub fn parse(url: &str) -> RPCResult<Self> {
        let uri: Uri = url
            .parse()
            .map_err(|e| RpcError::InvalidTarget(format!("{}: {}", url, e)))?;

        let secure = match uri.scheme_str() {
            Some("https") => true,
            Some("http") => false,
            Some(other) => {
                return Err(RpcError::InvalidTarget(format!(
                    "unsupported scheme {:?} in {}",
                    other, url
                )))
            }
            None => {
                return Err(RpcError::InvalidTarget(format!(
                    "missing scheme in {}",
                    url
                )))
            }
        };

        let host = uri
            .host()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| RpcError::InvalidTarget(format!("missing host in {}", url)))?
            .to_string();

        let port = uri
            .port_u16()
            .unwrap_or(if secure { 443 } else { 80 });

        // The path is rebuilt from service and method, so anything extra here is a mistake.
        if !matches!(uri.path(), "" | "/") || uri.query().is_some() {
            return Err(RpcError::InvalidTarget(format!(
                "unexpected path or query in {}",
                url
            )));
        }

        Ok(Self {
            secure,
            host,
            port,
            service: GREETER_SERVICE.to_string(),
            method: SAY_HELLO_METHOD.to_string(),
        })
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn scheme(&self) -> &'static str {
        if self.secure {
            "https"
        } else {
            "http"
        }
    }

    /// `scheme://host:port`, always with an explicit port.
    pub fn origin(&self) -> String {
        format!("{}://{}:{}", self.scheme(), self.host, self.port)
    }

    /// `/<service>/<method>`
    pub fn path(&self) -> String {
        format!("/{}/{}", self.service, self.method)
    }

    pub fn uri(&self) -> RPCResult<Uri> {
        let full = format!("{}{}", self.origin(), self.path());
        full.parse()
            .map_err(|e| RpcError::InvalidTarget(format!("{}: {}", full, e)))
    }
}

impl fmt::Display for CallTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.origin(), self.path())
    }
}
