//! hoard: operator CLI for a hoard cache.
//!
//! Inspects and invalidates the store configured in `config.toml`, using the
//! same key registry and rules as the services that share it.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;

use hoard::key::split_tag;
use hoard::{CacheKey, Hoard, Settings, TtlClass};

/// Hoard cache operator CLI
#[derive(Parser)]
#[command(name = "hoard")]
#[command(version = hoard::PKG_VERSION)]
#[command(about = "Inspect and invalidate a hoard cache")]
struct Args {
    /// Path to configuration file.
    #[arg(short, long, env = "HOARD_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the value stored under a fully-qualified key
    Get {
        /// Key, e.g. "admin:dashboard_kpis"
        key: String,
    },

    /// Delete one fully-qualified key
    Del {
        key: String,
    },

    /// Purge every key under a `{namespace}:{entity}` tag
    Purge {
        /// Tag, e.g. "list:b2b_users"
        tag: String,
    },

    /// Run the invalidation rule for a table
    Invalidate {
        /// Table name, e.g. "shops"
        table: String,
        /// Affected entity id (repeatable)
        #[arg(long = "id")]
        ids: Vec<String>,
    },

    /// Show the effective TTL policy
    Ttl,

    /// Show build information
    Info,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Default: warn for CLI; override with RUST_LOG.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();

    if let Command::Info = args.command {
        let build = hoard::BuildInfo::current();
        println!("version:  {build}");
        println!("target:   {}", build.target);
        println!("built at: {}", build.built_at);
        return Ok(());
    }

    let settings = Settings::load(args.config.as_deref())?;
    let hoard = Hoard::from_settings(&settings).await?;
    info!(
        version = hoard::version_string(),
        store = hoard.cache().store().name(),
        "hoard cli connected"
    );

    match args.command {
        Command::Get { key } => {
            let key = CacheKey::from_raw(key)?;
            match hoard.cache().get::<serde_json::Value>(&key).await {
                Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                None => println!("{key}: absent"),
            }
        }

        Command::Del { key } => {
            let key = CacheKey::from_raw(key)?;
            let existed = hoard.invalidate_key(&key).await;
            println!("{key}: {}", if existed { "deleted" } else { "absent" });
        }

        Command::Purge { tag } => {
            split_tag(&tag)?;
            let removed = hoard.cache().purge_tag(&tag).await;
            println!("{tag}: {removed} keys purged");
        }

        Command::Invalidate { table, ids } => {
            let report = hoard.invalidate(&table, &ids, &[]).await;
            println!("{table}: {report}");
        }

        Command::Ttl => {
            let policy = hoard.cache().policy();
            for class in TtlClass::NAMED {
                match policy.resolve(class) {
                    Some(ttl) => println!("{:<10} {}s", class.name(), ttl.as_secs()),
                    None => println!("{:<10} until invalidated", class.name()),
                }
            }
        }

        Command::Info => unreachable!("handled above"),
    }

    Ok(())
}
