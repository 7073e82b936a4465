#![cfg(not(tarpaulin_include))]

use sales_dashboard::{app, config};
use std::env;
use std::path::PathBuf;

/// Main entry point for the dashboard web server
///
/// Reads the configuration (first argument, else `dashboard.toml`, else the
/// embedded default) and serves the JSON API plus the landing page.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let explicit = env::args().nth(1).map(PathBuf::from);
    let config = config::load_config(explicit.as_deref())?;

    println!("Serving sales data from {}", config.data.path);
    app::run(config).await
}
