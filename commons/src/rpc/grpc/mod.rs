use std::future::Future;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use axum::extract::{ConnectInfo, State};
use axum::middleware::{self, Next};
use axum::routing::get;
use axum::Router;
use futures::FutureExt;
use log::{debug, error, info};
use tokio::net::TcpListener;
use tonic::service::Routes;
use tonic::transport::{Channel, ClientTlsConfig};
use tonic::{Request, Response, Status};

use super::msg::greeter_client::GreeterClient;
use super::msg::greeter_server::{Greeter, GreeterServer};
use super::msg::{HelloReply, HelloRequest};
use super::{CallTarget, Caller};
use crate::err::{RPCResult, RpcError};
use crate::latency::{LatencySource, UniformLatency};

const GREETING_PREFIX: &str = "Hello ";
const PING_REPLY: &str = "OK\n";

/// Server side of the greeter: the `SayHello` handler plus the `/ping` route.
#[derive(Clone)]
pub struct GreeterRX {
    greeting_latency: Arc<dyn LatencySource>,
    ping_latency: Arc<dyn LatencySource>,
}

impl Default for GreeterRX {
    fn default() -> Self {
        Self::new(
            Arc::new(UniformLatency::GREETING),
            Arc::new(UniformLatency::PING),
        )
    }
}

impl GreeterRX {
    pub fn new(
        greeting_latency: Arc<dyn LatencySource>,
        ping_latency: Arc<dyn LatencySource>,
    ) -> Self {
        Self {
            greeting_latency,
            ping_latency,
        }
    }

    /// The gRPC routes and `/ping` on one router.
    pub fn router(&self) -> Router {
        let grpc = Routes::new(GreeterServer::new(self.clone()))
            .prepare()
            .into_axum_router();

        let ping = Router::new()
            .route("/ping", get(ping).post(ping))
            .with_state(self.ping_latency.clone());

        grpc.merge(ping).layer(middleware::from_fn(log_remote_addr))
    }

    /// Serves HTTP/1.1 and h2c on `listener` until `shutdown` resolves.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        info!("Greeter listening on {}", addr);

        axum::serve(
            listener,
            self.router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await?;

        info!("Greeter on {} stopped", addr);
        Ok(())
    }
}

#[tonic::async_trait]
impl Greeter for GreeterRX {
    async fn say_hello(
        &self,
        request: Request<HelloRequest>,
    ) -> Result<Response<HelloReply>, Status> {
        let request = request.into_inner();
        let latency = self.greeting_latency.clone();

        let outcome = AssertUnwindSafe(async move {
            tokio::time::sleep(latency.next_delay()).await;
            HelloReply {
                message: format!("{}{}", GREETING_PREFIX, request.name),
            }
        })
        .catch_unwind()
        .await;

        match outcome {
            Ok(reply) => Ok(Response::new(reply)),
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!("SayHello handler panicked: {}", reason);
                Err(Status::internal(format!("handler panicked: {}", reason)))
            }
        }
    }
}

async fn ping(State(latency): State<Arc<dyn LatencySource>>) -> &'static str {
    tokio::time::sleep(latency.next_delay()).await;
    PING_REPLY
}

async fn log_remote_addr(request: axum::extract::Request, next: Next) -> axum::response::Response {
    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        info!("remote addr {} {}", addr, request.uri().path());
    }
    next.run(request).await
}

/// Issues the greeting call through the tonic generated client.
#[derive(Clone)]
pub struct GrpcTX {
    target: CallTarget,
    client: GreeterClient<Channel>,
}

impl GrpcTX {
    const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
    const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(120); // 2 minutes
    const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(10);

    /// Must be called from within a tokio runtime; the channel connects lazily
    /// on the first call.
    pub fn new(target: CallTarget) -> RPCResult<Self> {
        let mut endpoint = Channel::from_shared(target.origin())
            .map_err(|e| RpcError::InvalidTarget(format!("{}: {}", target.origin(), e)))?
            .connect_timeout(Self::CONNECT_TIMEOUT)
            .tcp_keepalive(Some(Self::KEEPALIVE_INTERVAL))
            .http2_keep_alive_interval(Self::KEEPALIVE_INTERVAL)
            .keep_alive_timeout(Self::KEEPALIVE_TIMEOUT);

        if target.is_secure() {
            endpoint = endpoint.tls_config(ClientTlsConfig::new().with_webpki_roots())?;
        }

        debug!("[GrpcTX] lazily connecting to {}", target.origin());
        let client = GreeterClient::new(endpoint.connect_lazy());
        Ok(Self { target, client })
    }
}

#[async_trait]
impl Caller for GrpcTX {
    async fn say_hello(
        &self,
        request: HelloRequest,
        deadline: Option<Duration>,
    ) -> RPCResult<HelloReply> {
        let mut client = self.client.clone();
        let call = async move {
            client
                .say_hello(Request::new(request))
                .await
                .map(Response::into_inner)
                .map_err(RpcError::from)
        };

        let reply = match deadline {
            Some(deadline) => tokio::time::timeout(deadline, call)
                .await
                .map_err(|_| RpcError::DeadlineExceeded(deadline))??,
            None => call.await?,
        };

        debug!("[GrpcTX] {} replied {:?}", self.target, reply.message);
        Ok(reply)
    }
}
