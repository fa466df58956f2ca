use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use bytes::Bytes;
use commons::latency::{FixedLatency, LatencySource};
use commons::loadgen::LoadGenerator;
use commons::rpc::grpc::{GreeterRX, GrpcTX};
use commons::rpc::codec;
use commons::rpc::raw::RawCaller;
use commons::{CallTarget, Caller, CallerKind, HelloReply, HelloRequest, RpcError, StatusCode};
use http_body_util::{BodyExt, Empty};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

struct PanickingLatency;

impl LatencySource for PanickingLatency {
    fn next_delay(&self) -> Duration {
        panic!("latency source exploded")
    }
}

struct TestServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestServer {
    async fn greeter(greeter: GreeterRX) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel::<()>();
        tokio::spawn(greeter.serve(listener, async move {
            let _ = rx.await;
        }));
        Self {
            addr,
            shutdown: Some(tx),
        }
    }

    async fn fixed(greeting_ms: u64) -> Self {
        Self::greeter(GreeterRX::new(
            Arc::new(FixedLatency::from_millis(greeting_ms)),
            Arc::new(FixedLatency::default()),
        ))
        .await
    }

    /// Serves `router` as is, for answers the greeter would never give.
    async fn stub(router: Router) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = rx.await;
                })
                .await
        });
        Self {
            addr,
            shutdown: Some(tx),
        }
    }

    async fn failing() -> Self {
        Self::stub(Router::new().fallback(|| async {
            (http::StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded")
        }))
        .await
    }

    /// Answers 200 with `grpc-status` in the headers and `body` verbatim.
    async fn replying(grpc_status: &'static str, body: Vec<u8>) -> Self {
        Self::stub(Router::new().fallback(move || {
            let body = body.clone();
            async move {
                (
                    [
                        (http::header::CONTENT_TYPE, "application/grpc"),
                        (http::HeaderName::from_static("grpc-status"), grpc_status),
                    ],
                    body,
                )
            }
        }))
        .await
    }

    fn target(&self) -> CallTarget {
        CallTarget::parse(&format!("http://{}", self.addr)).unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

#[tokio::test]
async fn test_both_callers_greet_the_same() {
    let server = TestServer::fixed(0).await;

    for kind in [CallerKind::Raw, CallerKind::Stack] {
        let caller = kind.build(server.target()).unwrap();
        let reply = caller
            .say_hello(HelloRequest::new("world"), Some(Duration::from_secs(5)))
            .await
            .unwrap();
        assert_eq!(reply.message, "Hello world", "{} caller", kind);

        let reply = caller
            .say_hello(HelloRequest::default(), Some(Duration::from_secs(5)))
            .await
            .unwrap();
        assert_eq!(reply.message, "Hello ", "{} caller", kind);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_delay_does_not_block_other_calls() {
    let server = TestServer::fixed(300).await;
    let caller = Arc::new(RawCaller::new(server.target()).unwrap());

    // warm the connection so the measurement is about the handler
    caller
        .say_hello(HelloRequest::new("warmup"), None)
        .await
        .unwrap();

    let start = Instant::now();
    let report = LoadGenerator::new(caller)
        .run(10, 1, HelloRequest::new("world"))
        .await;
    let elapsed = start.elapsed();

    assert!(report.all_succeeded());
    assert_eq!(report.records.len(), 10);
    assert!(elapsed >= Duration::from_millis(300));
    // ten sequential sleeps would take 3s
    assert!(elapsed < Duration::from_millis(1500), "took {:?}", elapsed);
}

#[tokio::test]
async fn test_http_500_is_transport_error_and_run_continues() {
    let server = TestServer::failing().await;
    let caller = Arc::new(RawCaller::new(server.target()).unwrap());

    let err = caller
        .say_hello(HelloRequest::new("world"), Some(Duration::from_secs(5)))
        .await
        .unwrap_err();
    match &err {
        RpcError::Transport { status, body } => {
            assert_eq!(*status, http::StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(body, "upstream exploded");
        }
        other => panic!("expected transport error, got {:?}", other),
    }
    assert_eq!(err.code(), StatusCode::Unavailable);

    let report = LoadGenerator::new(caller)
        .with_deadline(Some(Duration::from_secs(5)))
        .run(1, 3, HelloRequest::new("world"))
        .await;
    assert_eq!(report.records.len(), 3);
    assert!(report
        .records
        .iter()
        .all(|r| matches!(r.outcome, Err(RpcError::Transport { .. }))));
}

async fn raw_call(server: &TestServer) -> Result<HelloReply, RpcError> {
    RawCaller::new(server.target())
        .unwrap()
        .say_hello(HelloRequest::new("world"), Some(Duration::from_secs(5)))
        .await
}

#[tokio::test]
async fn test_raw_caller_rejects_bytes_after_reply_frame() {
    let mut body = codec::encode(&HelloReply {
        message: "Hello world".to_string(),
    })
    .unwrap()
    .to_vec();
    body.extend_from_slice(&[0xde, 0xad]);
    let server = TestServer::replying("0", body).await;

    match raw_call(&server).await {
        Err(RpcError::Framing(reason)) => assert!(reason.contains("2 unexpected bytes"), "{}", reason),
        other => panic!("expected framing error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_raw_caller_accepts_exact_reply_frame() {
    let body = codec::encode(&HelloReply {
        message: "Hello stub".to_string(),
    })
    .unwrap()
    .to_vec();
    let server = TestServer::replying("0", body).await;

    assert_eq!(raw_call(&server).await.unwrap().message, "Hello stub");
}

#[tokio::test]
async fn test_raw_caller_rejects_malformed_grpc_status() {
    let server = TestServer::replying("abc", Vec::new()).await;

    match raw_call(&server).await {
        Err(RpcError::StatusParse { value }) => assert_eq!(value, "abc"),
        other => panic!("expected status parse error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_raw_caller_rejects_ok_status_without_reply() {
    let server = TestServer::replying("0", Vec::new()).await;

    assert!(matches!(raw_call(&server).await, Err(RpcError::Framing(_))));
}

#[tokio::test]
async fn test_handler_panic_is_internal_status() {
    let server = TestServer::greeter(GreeterRX::new(
        Arc::new(PanickingLatency),
        Arc::new(FixedLatency::default()),
    ))
    .await;

    let raw = RawCaller::new(server.target()).unwrap();
    let stack = GrpcTX::new(server.target()).unwrap();
    let callers: [&dyn Caller; 2] = [&raw, &stack];

    for caller in callers {
        let err = caller
            .say_hello(HelloRequest::new("boom"), Some(Duration::from_secs(5)))
            .await
            .unwrap_err();
        match err {
            RpcError::Status { code, message } => {
                assert_eq!(code, 13);
                assert!(message.contains("latency source exploded"), "{}", message);
            }
            other => panic!("expected status error, got {:?}", other),
        }
    }

    // the server survives the panic
    let ping = http1_get(server.addr, "/ping").await;
    assert!(ping.ends_with("OK\n"));
}

#[tokio::test]
async fn test_deadline_exceeded() {
    let server = TestServer::fixed(1000).await;
    let deadline = Duration::from_millis(100);

    for kind in [CallerKind::Raw, CallerKind::Stack] {
        let caller = kind.build(server.target()).unwrap();
        let start = Instant::now();
        let err = caller
            .say_hello(HelloRequest::new("world"), Some(deadline))
            .await
            .unwrap_err();
        assert!(
            matches!(err, RpcError::DeadlineExceeded(d) if d == deadline),
            "{} caller: {:?}",
            kind,
            err
        );
        assert_eq!(err.code(), StatusCode::DeadlineExceeded);
        assert!(start.elapsed() < Duration::from_millis(900));
    }
}

#[tokio::test]
async fn test_ping_over_http1_and_h2c() {
    let server = TestServer::fixed(0).await;

    let response = http1_get(server.addr, "/ping").await;
    assert!(response.starts_with("HTTP/1.1 200"), "{}", response);
    assert!(response.ends_with("OK\n"), "{}", response);

    let client: Client<HttpConnector, Empty<Bytes>> = Client::builder(TokioExecutor::new())
        .http2_only(true)
        .build_http();
    let uri: http::Uri = format!("http://{}/ping", server.addr).parse().unwrap();
    let response = client.get(uri).await.unwrap();
    assert_eq!(response.status(), http::StatusCode::OK);
    assert_eq!(response.version(), http::Version::HTTP_2);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"OK\n");
}

#[tokio::test]
async fn test_unreachable_target_is_reported_not_panicked() {
    // bind then drop to get a port nothing listens on
    let addr = TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap()
        .local_addr()
        .unwrap();
    let target = CallTarget::parse(&format!("http://{}", addr)).unwrap();

    let caller = RawCaller::new(target).unwrap();
    let err = caller
        .say_hello(HelloRequest::new("world"), Some(Duration::from_secs(5)))
        .await
        .unwrap_err();
    assert_eq!(err.code(), StatusCode::Unavailable);
}

async fn http1_get(addr: SocketAddr, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
        path, addr
    );
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    String::from_utf8_lossy(&response).into_owned()
}
