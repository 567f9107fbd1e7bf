use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use capdex::config::CoreConfig;
use capdex::filter::{parse_filter, FilterCache};
use capdex::index::SharedIndex;
use capdex::store::SqliteStore;
use capdex::tailer::{self, ChangeTailer};

#[derive(Parser)]
#[command(name = "capdex")]
#[command(about = "Capability directory search core")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the catalog snapshot, tail the change log, and serve HTTP
    Serve {
        /// Host to bind (overrides CORE_HOST)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides CORE_PORT)
        #[arg(long)]
        port: Option<u16>,

        /// Path of the upstream sqlite store (overrides STORE_URL)
        #[arg(long)]
        store: Option<String>,
    },
    /// Parse a filter expression and print the AST or the parse error
    CheckFilter {
        /// Filter expression, e.g. '(&(type=skill)(capability=summarize))'
        expr: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Commands::Serve {
        host: None,
        port: None,
        store: None,
    }) {
        Commands::Serve { host, port, store } => run_serve(host, port, store),
        Commands::CheckFilter { expr } => check_filter(&expr),
    }
}

fn run_serve(host: Option<String>, port: Option<u16>, store_path: Option<String>) -> Result<()> {
    let mut config = CoreConfig::from_env();
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }
    if let Some(store_path) = store_path {
        config.store_url = store_path;
    }

    let store = SqliteStore::open(&config.store_url)
        .with_context(|| format!("failed to open store at {}", config.store_url))?;

    let index = Arc::new(SharedIndex::new());
    tailer::load_snapshot(&store, &index).context("snapshot load failed")?;

    let tailer_handle = Arc::new(ChangeTailer::new(store, Arc::clone(&index), config.poll_batch));
    if config.poll_ms > 0 {
        let _poll_thread = Arc::clone(&tailer_handle).spawn(config.poll_ms);
    } else {
        tracing::info!("POLL_MS=0, serving a static snapshot");
    }

    let filters = Arc::new(FilterCache::new(config.filter_cache_size));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build server runtime")?;
    let result = runtime.block_on(capdex::server::serve(&config, index, filters));
    tailer_handle.stop();
    result
}

fn check_filter(expr: &str) -> Result<()> {
    match parse_filter(expr) {
        Ok(ast) => {
            println!("{ast:#?}");
            Ok(())
        }
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    }
}
