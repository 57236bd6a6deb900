use std::sync::Arc;

use canvas_mcp_core::CanvasClient;
use canvas_mcp_core::config::Config;
use canvas_mcp_server::run_main;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let config = Config::from_env()?;
        let canvas = Arc::new(CanvasClient::new(&config)?);
        run_main(canvas).await?;
        Ok(())
    })
}
