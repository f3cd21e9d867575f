//! Consilium command-line front end.
//!
//! Reads one JSON request per line from stdin and writes one JSON response
//! per line to stdout. Logs go to stderr.
//!
//! Usage:
//!   consilium --config consilium.toml < requests.jsonl
//!   echo '{"text":"How do I size a connection pool?","tenantId":"acme"}' | consilium --metrics
//!
//! # Environment Variables
//!
//! - `RUST_LOG` - Log filter (default: info)
//! - `OPENAI_API_KEY` - Key for OpenAI-compatible completion and embedding endpoints
//! - `ANTHROPIC_API_KEY` - Key for the Anthropic provider

use consilium_common::Request;
use consilium_orchestrator::{Orchestrator, OrchestratorConfig};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,consilium_orchestrator=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = std::env::args().collect();
    let mut config_path: Option<String> = None;
    let mut print_metrics = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                let Some(path) = args.get(i + 1) else {
                    anyhow::bail!("--config requires a file path");
                };
                config_path = Some(path.clone());
                i += 1;
            }
            "--metrics" | "-m" => print_metrics = true,
            "--help" | "-h" => {
                println!("Consilium");
                println!();
                println!("Usage: consilium [OPTIONS] < requests.jsonl");
                println!();
                println!("Options:");
                println!("  -c, --config <FILE>   Path to a TOML configuration file");
                println!("  -m, --metrics         Print a metrics snapshot to stderr at EOF");
                println!("  -h, --help            Show this help message");
                return Ok(());
            }
            other => anyhow::bail!("Unknown argument '{other}' (see --help)"),
        }
        i += 1;
    }

    let config = match config_path {
        Some(path) => {
            tracing::info!(path = %path, "Loading configuration");
            OrchestratorConfig::from_file(&path)?
        }
        None => {
            tracing::info!("Using default configuration");
            OrchestratorConfig::default()
        }
    };

    let orchestrator = Orchestrator::from_config(config).await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let output = match serde_json::from_str::<Request>(line) {
            Ok(request) => serde_json::to_string(&orchestrator.handle(request).await)?,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed request line");
                serde_json::json!({ "error": format!("invalid request: {e}") }).to_string()
            }
        };

        stdout.write_all(output.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }

    if print_metrics {
        eprintln!("{}", serde_json::to_string_pretty(&orchestrator.health())?);
    }

    Ok(())
}
