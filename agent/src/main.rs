mod config;
mod handler;
mod io;
mod protocol;
mod state;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::anyhow;
use ovpnstat_core::StatsService;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::AgentConfig;
use crate::handler::dispatch::Dispatcher;
use crate::state::history::HistoryStore;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_usage() {
    eprintln!("Usage: ovpnstat-agent --stdio [--config <path>]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --stdio          Run in stdio mode (NDJSON over stdin/stdout)");
    eprintln!("  --config <path>  Read configuration from <path>");
    eprintln!("  --version        Print version and exit");
    eprintln!("  --help           Print this help message");
}

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Version,
    Help,
    Stdio { config: Option<PathBuf> },
}

fn parse_args(args: &[String]) -> Result<Command, String> {
    let mut stdio = false;
    let mut config = None;
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--version" => return Ok(Command::Version),
            "--help" => return Ok(Command::Help),
            "--stdio" => stdio = true,
            "--config" => match iter.next() {
                Some(path) => config = Some(PathBuf::from(path)),
                None => return Err("--config requires a path".to_string()),
            },
            other => return Err(format!("Unknown option: {other}")),
        }
    }

    if stdio {
        Ok(Command::Stdio { config })
    } else {
        Err("No mode selected".to_string())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    match parse_args(&args) {
        Ok(Command::Version) => {
            println!("ovpnstat-agent {}", VERSION);
            Ok(())
        }
        Ok(Command::Help) => {
            print_usage();
            Ok(())
        }
        Ok(Command::Stdio { config }) => {
            // Logs on stderr; stdout carries the protocol.
            tracing_subscriber::fmt()
                .with_env_filter(
                    EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| EnvFilter::new("info")),
                )
                .with_writer(std::io::stderr)
                .init();

            info!("ovpnstat-agent {} starting in stdio mode", VERSION);
            run_stdio(config).await
        }
        Err(message) => {
            eprintln!("{}", message);
            print_usage();
            std::process::exit(1);
        }
    }
}

async fn run_stdio(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let (config, config_path) = AgentConfig::load(config_path.as_deref())?;
    let history_path = config.history_path(&config_path);
    info!(
        "Watching {}, archiving disconnects to {}",
        config.watch.status_log_path.display(),
        history_path.display()
    );

    let history = Arc::new(HistoryStore::new(history_path, config.users));
    let service = StatsService::from_config(config.watch, history.clone());
    let handle = service
        .start()
        .map_err(|e| anyhow!("Failed to start statistics service: {}", e))?;

    let dispatcher = Dispatcher::new(Arc::clone(handle.registry()), history);
    let result = io::stdio::run_stdio_loop(dispatcher).await;

    handle.shutdown();
    result
}
