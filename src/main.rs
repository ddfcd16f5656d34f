// src/main.rs

//! The main entry point for the Jasper server daemon.

use anyhow::Result;
use jasper::config::Config;
use jasper::server::Server;
use std::env;
use tracing::error;
use tracing_subscriber::filter::EnvFilter;

const DEFAULT_PORT: u16 = 4711;

#[tokio::main]
async fn main() -> Result<()> {
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    let args: Vec<String> = env::args().collect();

    // Handle the --version flag.
    if args.contains(&"--version".to_string()) {
        println!("Jasper version {VERSION}");
        return Ok(());
    }

    // Determine the configuration. An explicit --config path wins; otherwise
    // the standard search order applies (JASPER_CONFIG, then the config
    // directories). The daemon cannot run without a valid configuration.
    let config_path = args
        .iter()
        .position(|arg| arg == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config = match config_path.map(Config::from_file).unwrap_or_else(Config::load) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    // Override the listen port if provided as a command-line argument.
    let mut port = DEFAULT_PORT;
    if let Some(port_index) = args.iter().position(|arg| arg == "--port") {
        if let Some(port_str) = args.get(port_index + 1) {
            match port_str.parse::<u16>() {
                Ok(p) => port = p,
                Err(_) => {
                    eprintln!("Invalid port number: {port_str}");
                    std::process::exit(1);
                }
            }
        } else {
            eprintln!("--port flag requires a value");
            std::process::exit(1);
        }
    }

    // Setup logging. RUST_LOG takes precedence over the configured level.
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level))
        .compact()
        .with_ansi(true)
        .init();

    let server = Server::bind(&config, &format!("0.0.0.0:{port}")).await?;
    if let Err(e) = server.run().await {
        error!("Server runtime error: {e}");
        return Err(e.into());
    }

    Ok(())
}
