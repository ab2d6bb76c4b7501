// github-tool-cache - run GitHub tool operations through the result cache.
// Prints each operation result as JSON on stdout; logs go to stderr.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use github_tool_cache::github::{GitHubClient, GitHubHandler, OPERATIONS};
use github_tool_cache::operation::{OperationHandler, Params, ToolRegistry};
use github_tool_cache::{CacheConfig, Result, StoreBackend, ToolCacheError};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "github-tool-cache")]
#[command(about = "Run GitHub tool operations with read-only results cached")]
struct Args {
    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// JSON cache settings file. Without one, results are cached on disk
    /// between runs; GITHUB_TOOL_CACHE_* variables override the defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bypass the cache for this run
    #[arg(long)]
    no_cache: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the available tool names
    Tools,

    /// Run one operation
    Run {
        /// Tool name, e.g. get_repository or list-issues
        operation: String,

        /// Operation parameters as a JSON object
        #[arg(default_value = "{}")]
        params: String,
    },
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let default_level = if args.debug { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    if let Err(e) = run(args).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => CacheConfig::load(path)?,
        // Each run is a new process, so only the file backend can serve a hit.
        None => CacheConfig {
            backend: StoreBackend::File,
            ..CacheConfig::default()
        }
        .apply_env()?,
    };
    if args.no_cache {
        config.enabled = false;
    }
    debug!(?config, "cache configuration");

    match args.command {
        Command::Tools => {
            for name in OPERATIONS {
                println!("{}", name);
            }
            Ok(())
        }
        Command::Run { operation, params } => {
            let params: Params = serde_json::from_str(&params).map_err(|e| {
                ToolCacheError::InvalidParams(format!("params must be a JSON object: {}", e))
            })?;

            let layer = config.build_layer()?;
            let handler: Arc<dyn OperationHandler> =
                Arc::new(GitHubHandler::new(GitHubClient::from_env()?));
            let registry = ToolRegistry::builder()
                .register_all(OPERATIONS, handler)
                .with_cache(Arc::clone(&layer))
                .build();

            let result = registry.execute(&operation, &params).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);

            let stats = layer.stats();
            info!(
                hits = stats.hits,
                misses = stats.misses,
                bypassed = stats.bypassed,
                "cache stats"
            );
            Ok(())
        }
    }
}
