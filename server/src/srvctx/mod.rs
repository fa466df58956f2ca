use std::net::SocketAddr;

use anyhow::{Context, Result};
use commons::rpc::grpc::GreeterRX;
use log::{info, warn};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub struct ServerContext {
    pub port: u16,
    greeter: GreeterRX,
    local_addr: Option<SocketAddr>,
    serve_task: Option<JoinHandle<Result<()>>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl ServerContext {
    pub fn new(port: u16) -> Self {
        Self::with_greeter(port, GreeterRX::default())
    }

    pub fn with_greeter(port: u16, greeter: GreeterRX) -> Self {
        Self {
            port,
            greeter,
            local_addr: None,
            serve_task: None,
            shutdown_tx: None,
        }
    }

    /// Binds `0.0.0.0:port` and starts serving in the background.
    pub async fn start(&mut self) -> Result<SocketAddr> {
        let bind_addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(bind_addr)
            .await
            .with_context(|| format!("failed to bind {}", bind_addr))?;
        let local_addr = listener.local_addr()?;

        let (tx, rx) = oneshot::channel::<()>();
        let shutdown = async move {
            let _ = rx.await;
        };
        self.serve_task = Some(tokio::spawn(self.greeter.clone().serve(listener, shutdown)));
        self.shutdown_tx = Some(tx);
        self.local_addr = Some(local_addr);

        info!("Server started on {}", local_addr);
        Ok(local_addr)
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Stops accepting, lets in-flight calls finish, and waits for the server task.
    pub async fn shutdown(&mut self) -> Result<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            if tx.send(()).is_err() {
                warn!("Server task already gone before shutdown signal");
            }
        }
        if let Some(task) = self.serve_task.take() {
            task.await.context("server task panicked")??;
        }
        info!("Server shut down");
        Ok(())
    }

    /// Serves until Ctrl-C, then shuts down gracefully.
    pub async fn run_until_ctrl_c(&mut self) -> Result<()> {
        self.start().await?;
        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for Ctrl-C")?;
        info!("Received Ctrl-C, shutting down");
        self.shutdown().await
    }
}
