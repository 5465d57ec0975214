//! # Dispatcher Binary Entry Point
//!
//! Thin wrapper that loads the configuration, runs the selected dispatch
//! strategy, and emits the consolidated verdict.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin satcheck -- --config satcheck.toml
//! ```
//!
//! Overriding the configured strategy and command:
//! ```bash
//! cargo run --bin satcheck -- --config satcheck.toml \
//!   --strategy multiple --concurrency 5 \
//!   --command '{"check":"http","url":"https://service.example.net/health"}'
//! ```
//!
//! The dispatcher will:
//! 1. Load configuration from the specified TOML file
//! 2. Validate it (configuration problems are fatal, reported before
//!    any satellite is contacted)
//! 3. Run the selected strategy to its natural completion
//! 4. Print exactly one JSON verdict document on standard output
//! 5. Exit with the monitoring code for the final status
//!    (OK=0, WARNING=1, CRITICAL=2, UNKNOWN=3)

use anyhow::anyhow;
use clap::Parser;
use env_logger::Builder;
use log::{error, LevelFilter};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use satcheck::common::config::{load_config, DispatcherConfig};
use satcheck::common::messages::Verdict;
use satcheck::dispatch::{Dispatcher, Strategy};
use satcheck::emitter;
use satcheck::transport::TlsTransport;

/// Command-line arguments for the dispatcher binary
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the dispatcher configuration file (TOML format)
    ///
    /// Example: /etc/satcheck/web-frontend.toml
    #[arg(short, long)]
    config: String,

    /// Override the configured dispatch strategy
    #[arg(long, value_enum)]
    strategy: Option<Strategy>,

    /// Override the configured service identifier
    #[arg(long)]
    service: Option<String>,

    /// Override the worker bound for the multiple strategy
    #[arg(long)]
    concurrency: Option<usize>,

    /// Override the rotation cache path
    #[arg(long)]
    cache_file: Option<PathBuf>,

    /// Check command as a JSON document, overriding [command] from the file
    #[arg(long)]
    command: Option<String>,
}

/// Initialize the logging system with timestamp, level, and message formatting.
///
/// Logs are printed to stderr so the verdict document owns stdout.
/// Format: `[HH:MM:SS] [LEVEL] message`
fn init_logger() {
    Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] [{}] {}",
                chrono::Local::now().format("%H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logger();

    let args = Args::parse();

    // A configuration problem is the only thing that stops dispatch, and
    // even that still produces one structured verdict on stdout.
    let verdict = match run(&args).await {
        Ok(verdict) => verdict,
        Err(e) => {
            error!("❌ {:#}", e);
            Verdict::unknown(&format!("{:#}", e))
        }
    };

    let code = emitter::emit(&verdict, std::io::stdout())?;
    std::process::exit(code);
}

async fn run(args: &Args) -> anyhow::Result<Verdict> {
    let mut config: DispatcherConfig = load_config(&args.config)?;

    // Command-line overrides beat the file.
    if let Some(strategy) = args.strategy {
        config.dispatcher.strategy = strategy;
    }
    if let Some(service) = &args.service {
        config.dispatcher.service = service.clone();
    }
    if let Some(concurrency) = args.concurrency {
        config.dispatcher.concurrency = concurrency;
    }
    if let Some(cache_file) = &args.cache_file {
        config.dispatcher.cache_file = Some(cache_file.clone());
    }
    if let Some(raw) = &args.command {
        config.command =
            serde_json::from_str(raw).map_err(|e| anyhow!("invalid --command JSON: {}", e))?;
    }

    config.validate()?;

    let transport = TlsTransport::new(
        &config.tls,
        config.auth.clone(),
        config.dispatcher.satellite_port,
    )?;
    let dispatcher = Dispatcher::new(Arc::new(transport), config.dispatcher.concurrency);

    Ok(dispatcher
        .run(
            config.dispatcher.strategy,
            &config.dispatcher.service,
            config.dispatcher.cache_file.as_deref(),
            &config.locations,
            &config.command,
        )
        .await)
}
