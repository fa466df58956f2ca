use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{CONTENT_TYPE, TE};
use http::{HeaderMap, Method, Request};
use http_body_util::{BodyExt, Full};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use log::{debug, trace};

use super::msg::{HelloReply, HelloRequest};
use super::{codec, status, CallTarget, Caller, CONTENT_TYPE_GRPC_PROTO};
use crate::err::{RPCResult, RpcError};

const TE_TRAILERS: &str = "trailers";

/// Issues the greeting call without the RPC stack: the request frame is built
/// by hand, posted over a bare HTTP/2 client, and the reply frame and status
/// are decoded from the raw response.
#[derive(Clone)]
pub struct RawCaller {
    target: CallTarget,
    client: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
}

impl RawCaller {
    const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn new(target: CallTarget) -> RPCResult<Self> {
        let mut http = HttpConnector::new();
        http.set_nodelay(true);
        http.set_connect_timeout(Some(Self::CONNECT_TIMEOUT));
        // the TLS layer decides the scheme, not the inner connector
        http.enforce_http(false);

        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(Arc::new(rustls::crypto::ring::default_provider()))?
            .https_or_http()
            .enable_http2()
            .wrap_connector(http);

        // h2c prior knowledge on plaintext, ALPN h2 on TLS
        let client = Client::builder(TokioExecutor::new())
            .http2_only(true)
            .build(connector);

        Ok(Self { target, client })
    }

    /// Sends `request` and waits for the reply, bounded by `deadline` if given.
    pub async fn call(
        &self,
        request: &HelloRequest,
        deadline: Option<Duration>,
    ) -> RPCResult<HelloReply> {
        match deadline {
            Some(deadline) => tokio::time::timeout(deadline, self.exchange(request))
                .await
                .map_err(|_| RpcError::DeadlineExceeded(deadline))?,
            None => self.exchange(request).await,
        }
    }

    async fn exchange(&self, request: &HelloRequest) -> RPCResult<HelloReply> {
        let frame = codec::encode(request)?;

        let http_request = Request::builder()
            .method(Method::POST)
            .uri(self.target.uri()?)
            .header(CONTENT_TYPE, CONTENT_TYPE_GRPC_PROTO)
            .header(TE, TE_TRAILERS)
            .body(Full::new(frame))
            .map_err(|e| RpcError::InvalidTarget(e.to_string()))?;

        let response = self.client.request(http_request).await?;
        let (parts, body) = response.into_parts();

        if parts.status != http::StatusCode::OK {
            let body = match body.collect().await {
                Ok(collected) => String::from_utf8_lossy(&collected.to_bytes()).into_owned(),
                Err(_) => "unknown".to_string(),
            };
            return Err(RpcError::Transport {
                status: parts.status,
                body,
            });
        }

        // Trailers only show up once the body has been read to end-of-stream.
        let collected = body.collect().await?;
        let trailers: Option<HeaderMap> = collected.trailers().cloned();
        let data = collected.to_bytes();

        trace!("headers: {:?}", parts.headers);
        trace!("trailers: {:?}", trailers);

        status::resolve(&parts.headers, trailers.as_ref())?.into_result()?;

        let mut reader: &[u8] = &data;
        let reply: HelloReply = codec::read_frame(&mut reader).await?;
        if !reader.is_empty() {
            return Err(RpcError::Framing(format!(
                "{} unexpected bytes after the reply frame",
                reader.len()
            )));
        }

        debug!("{} replied {:?}", self.target, reply.message);
        Ok(reply)
    }
}

#[async_trait]
impl Caller for RawCaller {
    async fn say_hello(
        &self,
        request: HelloRequest,
        deadline: Option<Duration>,
    ) -> RPCResult<HelloReply> {
        self.call(&request, deadline).await
    }
}
