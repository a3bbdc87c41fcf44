//! druidkit CLI
//!
//! Command-line interface for running Druid groupBy queries through the
//! bucket cache:
//! - Run a query from a JSON file
//! - Show how intervals split into buckets
//! - Clear a cache target
//! - Generate a default config file

use anyhow::Context;
use clap::{Parser, Subcommand};
use druidkit::cache::{
    decompose_all, BucketedQuery, GroupByCacheStore, MemoryResultCache, SqliteGroupByStore,
};
use druidkit::client::DruidClient;
use druidkit::config::{generate_default_config, Config};
use druidkit::query::GroupByQuery;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "druidkit")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Druid groupBy client with a time-bucketed result cache")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: searched in the usual locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a groupBy query and print the result rows as JSON
    Query {
        /// Path to the query JSON
        file: PathBuf,
        /// Cache target (default: from config)
        #[arg(short, long)]
        target: Option<String>,
        /// Store buckets fetched from the broker
        #[arg(long)]
        writeback: bool,
        /// Bypass the bucket cache
        #[arg(long)]
        no_cache: bool,
    },

    /// Print the buckets an interval is split into
    Decompose {
        /// Intervals as start/end in RFC 3339
        #[arg(required = true)]
        intervals: Vec<String>,
    },

    /// Remove every cached bucket of a target
    Clean {
        target: String,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Config::load_with_env(path).with_context(|| format!("loading {:?}", path)),
        None => Ok(Config::load_default()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    if let Err(e) = druidkit::logging::init(&config.logging) {
        eprintln!("Logging disabled: {}", e);
    }

    match cli.command {
        Commands::Query {
            file,
            target,
            writeback,
            no_cache,
        } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("reading query {:?}", file))?;
            let query: GroupByQuery =
                serde_json::from_str(&text).with_context(|| format!("parsing query {:?}", file))?;

            let mut client = DruidClient::new(&config.druid)?;
            if config.cache.result_cache {
                client = client.with_result_cache(Arc::new(MemoryResultCache::new()), config.cache.ttl());
            }

            let mut bucketed = BucketedQuery::new(Arc::new(client)).with_ttl(config.cache.ttl());
            if config.cache.enabled && !no_cache {
                let store = SqliteGroupByStore::open(&config.cache.db_path())
                    .with_context(|| format!("opening cache {:?}", config.cache.db_path()))?;
                bucketed = bucketed.with_store(Arc::new(store));
            }

            let target = target.unwrap_or_else(|| config.cache.target.clone());
            let result = bucketed
                .cache_query(&query, Some(&target), writeback || config.cache.writeback)
                .await?;

            println!("{}", serde_json::to_string_pretty(&result.result)?);
        }

        Commands::Decompose { intervals } => {
            for slot in decompose_all(&intervals)? {
                println!("{}\t{}s", slot, slot.duration_seconds);
            }
        }

        Commands::Clean { target } => {
            let store = SqliteGroupByStore::open(&config.cache.db_path())
                .with_context(|| format!("opening cache {:?}", config.cache.db_path()))?;
            store.clean(&target).await?;
            println!("Cleaned cache target {}", target);
        }

        Commands::Config { output } => {
            let config = generate_default_config();

            match output {
                Some(path) => {
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(&path, &config)?;
                    println!("Config written to {:?}", path);
                }
                None => {
                    print!("{}", config);
                }
            }
        }
    }

    Ok(())
}
