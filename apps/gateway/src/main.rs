use anyhow::Result;
use cvi_gateway::{GatewayConfig, run};
use cvi_telemetry::install as init_telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    init_telemetry("cvi-gateway", env!("CARGO_PKG_VERSION"))?;

    let config = GatewayConfig::from_env()?;
    run(config).await
}
