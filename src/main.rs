use tracing_subscriber::{EnvFilter, fmt};
use tracing::info;

use cattrack::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))?;
    fmt().with_env_filter(filter).init();

    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    let config = Config::from_env()?;
    info!(
        target: "cattrack",
        "cattrack starting: RUST_LOG='{}', addr={}, auth_url='{}'",
        rust_log, config.socket_addr(), config.auth_url
    );

    cattrack::server::run(config).await
}
