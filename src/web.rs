#![cfg(not(tarpaulin_include))]

use listsheet::app;
use listsheet::config::ServerConfig;

/// Main entry point for the list server
///
/// Loads an optional `.env`, reads the configuration from the environment
/// and serves the list API until the process is stopped.
///
/// # Environment
/// * `HOST`, `PORT` - listen address (default `127.0.0.1:5000`)
/// * `LIST_NAME`, `ROWS_PER_PAGE`, `MAX_EXPORT_ROWS`
/// * `SCHEMA_FILE`, `DATA_FILE`, `STATIC_DIR`
/// * `RUST_LOG` - log filter (default `info`)
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ServerConfig::from_env()?;
    log::info!("Serving list {:?}", config.list_name);

    app::run(config).await
}
