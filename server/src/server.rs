use anyhow::Result;
use commons::utils::{EnvUtility, LogUtility};
use log::{error, info};

mod srvctx;
use srvctx::ServerContext;

#[tokio::main]
async fn main() -> Result<()> {
    LogUtility::init();
    info!("starting container");

    let port = EnvUtility::port().inspect_err(|e| error!("{:#}", e))?;

    let mut server_context = ServerContext::new(port);
    if let Err(e) = server_context.run_until_ctrl_c().await {
        error!("server failed: {:#}", e);
        return Err(e);
    }
    Ok(())
}
