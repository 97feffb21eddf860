//! postpulse: windowed post statistics over a live SSE feed.
//!
//! Usage:
//! ```bash
//! # Run the analysis server (config from --config, $API_CONFIG or ./config.json)
//! postpulse serve --config ./config.json
//!
//! # Validate a configuration file without starting anything
//! postpulse check-config --config ./config.json
//!
//! # Ask for the average likes over the next 5 seconds
//! curl 'http://localhost:8080/analysis?duration=5s&dimension=likes'
//! ```

use std::env;
use std::process;

use tracing::info;

mod app;
mod config;
mod http;
mod logging;

use config::AppConfig;

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let result = match args[1].as_str() {
        "serve" => cmd_serve(&args[2..]).await,
        "check-config" => cmd_check_config(&args[2..]),
        "version" | "--version" | "-V" => {
            println!("postpulse {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            print_usage();
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn print_usage() {
    println!("postpulse {}", env!("CARGO_PKG_VERSION"));
    println!("Windowed statistics over a live Server-Sent-Events feed\n");
    println!("USAGE:");
    println!("    postpulse <COMMAND>\n");
    println!("COMMANDS:");
    println!("    serve         Connect to the feed and serve GET /analysis");
    println!("    check-config  Load and validate the configuration file");
    println!("    version       Print version");
    println!("    help          Print this help\n");
    println!("FLAGS:");
    println!("    --config <PATH>   Config file  [default: ${} or {}]", config::CONFIG_PATH_ENV, config::DEFAULT_CONFIG_PATH);
}

async fn cmd_serve(args: &[String]) -> anyhow::Result<()> {
    let path = config::resolve_path(parse_flag(args, "--config"));
    let config = AppConfig::load(&path)?;

    logging::init(&config.logger)?;
    info!(path = %path.display(), "configuration loaded");

    app::serve(config).await
}

fn cmd_check_config(args: &[String]) -> anyhow::Result<()> {
    let path = config::resolve_path(parse_flag(args, "--config"));
    let config = AppConfig::load(&path)?;

    println!("Configuration OK: {}", path.display());
    println!("  Upstream:             {}", config.sse.server_url);
    println!("  Max reconnections:    {}", config.sse.max_reconnection_attempts);
    println!("  Listen address:       {}", config.router.bind_addr());
    println!("  Shutdown timeout:     {}s", config.router.shutdown_timeout);
    println!(
        "  Dimensions:           {}",
        config.router.analysis_handler_config.authorized_dimensions.join(", ")
    );
    Ok(())
}

fn parse_flag(args: &[String], flag: &str) -> Option<String> {
    let pos = args.iter().position(|a| a == flag)?;
    args.get(pos + 1).cloned()
}
