//! Lab Deployer - Entry Point
//!
//! Deploys an RHCSA training lab (server + client VMs) onto a Proxmox VE
//! cluster, driven by a config.json with connection parameters and defaults.

use std::collections::HashMap;
use std::env;

use labdeployer::app::run::{run, RunOptions};
use labdeployer::logs::{init_logging, LogLevel, LogOptions};

use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    if cli_args.contains_key("version") {
        println!("labdeployer {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    // Initialize logging
    let log_level = cli_args
        .get("log-level")
        .and_then(|s| s.parse::<LogLevel>().ok())
        .unwrap_or_default();
    let log_options = LogOptions {
        log_level,
        ..Default::default()
    };
    if let Err(e) = init_logging(log_options) {
        println!("Failed to initialize logging: {e}");
    }

    let mut options = RunOptions::default();
    if let Some(path) = cli_args.get("config") {
        options.config_path = path.clone();
    }
    if let Some(template) = cli_args.get("template") {
        options.template_id = template.clone();
    }

    info!("Running lab deployer with options: {:?}", options);
    let result = run(options, await_shutdown_signal()).await;
    if let Err(e) = result {
        error!("Deployment failed: {e}");
        std::process::exit(1);
    }
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).unwrap();

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
        info!("Ctrl+C received, shutting down...");
    }
}
