use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use feedscout::engine::{ProgressEvent, ProgressSink};
use feedscout::server::{self, AppState};
use feedscout::{Config, FeedEngine, FeedRequest};
use std::io::Write;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(
    name = "feedscout",
    about = "Find the RSS/Atom feed of any web page, or build one from its articles"
)]
struct Args {
    /// Config file (default: ~/.config/feedscout/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API
    Serve {
        /// Listen address, overriding `bind_address`
        #[arg(long, value_name = "ADDR")]
        bind: Option<String>,
    },
    /// Print the feed for a URL to stdout
    Generate {
        url: String,
        /// CSS selector used as the only extraction strategy
        #[arg(long)]
        selector: Option<String>,
    },
    /// Report the feed a page already publishes, if any
    Check { url: String },
}

/// Writes progress messages to stderr as they happen.
struct StderrSink;

impl ProgressSink for StderrSink {
    fn emit(&mut self, event: ProgressEvent) {
        if let ProgressEvent::Progress(message) = event {
            eprintln!("{message}");
        }
    }
}

fn load_config(path: Option<PathBuf>) -> Result<Config> {
    let Some(path) = path.or_else(Config::default_path) else {
        tracing::debug!("HOME not set and no --config given, using defaults");
        return Ok(Config::default());
    };
    Config::load(&path).with_context(|| format!("Failed to load config from {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so `generate` output stays clean
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("feedscout=info,warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = load_config(args.config)?;
    let engine = FeedEngine::from_config(&config).context("Failed to build HTTP client")?;

    match args.command {
        Command::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| config.bind_address.clone());
            let addr: SocketAddr = bind
                .parse()
                .with_context(|| format!("Invalid listen address: {bind}"))?;
            let state = AppState::new(Arc::new(engine), &config);
            server::serve(state, addr).await;
        }
        Command::Generate { url, selector } => {
            let mut request = FeedRequest::new(url);
            request.selector = selector;

            match engine.run(&request, &mut StderrSink).await {
                Ok(delivery) => {
                    let mut stdout = std::io::stdout().lock();
                    stdout
                        .write_all(delivery.document.as_bytes())
                        .context("Failed to write feed to stdout")?;
                    stdout.flush()?;
                }
                Err(e) => {
                    eprintln!("Error: {}", e.user_message());
                    if let Some(tried) = e.tried_selectors() {
                        eprintln!("Tried selectors: {}", tried.join(", "));
                    }
                    tracing::debug!(error = %e, "Generation failed");
                    std::process::exit(1);
                }
            }
        }
        Command::Check { url } => match engine.check_feed(&url).await {
            Ok(Some(feed_url)) => println!("{feed_url}"),
            Ok(None) => {
                eprintln!("No feed found");
                std::process::exit(2);
            }
            Err(e) => {
                eprintln!("Error: {}", e.user_message());
                tracing::debug!(error = %e, "Check failed");
                std::process::exit(1);
            }
        },
    }

    Ok(())
}
