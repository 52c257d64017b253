//! Administrative CLI for inspecting and purging a cache directory.

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use fslock_cache::CacheDir;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "fslock-cache", about = "Inspect and purge a lock-backed cache directory")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Delete cache entries, skipping any currently locked by another process.
    Clear {
        /// Root of the cache directory to operate on.
        dir: Utf8PathBuf,
        /// Only delete keys starting with this prefix; omit to match all keys.
        #[arg(long)]
        prefix: Option<String>,
        /// Never wait for a contended lock; skip it immediately instead of
        /// retrying with a bounded timeout.
        #[arg(long)]
        only_if_possible: bool,
    },
}

fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        #[allow(clippy::print_stdout, reason = "CLI user-facing output")]
        Command::Clear {
            dir,
            prefix,
            only_if_possible,
        } => {
            let cache = CacheDir::new(dir);
            let report = cache.clear(
                |key| prefix.as_deref().is_none_or(|p| key.starts_with(p)),
                only_if_possible,
            )?;

            println!("deleted {} entries", report.deleted.len());
            for key in &report.deleted {
                println!("  - {key}");
            }
            if !report.skipped.is_empty() {
                println!("skipped {} locked entries", report.skipped.len());
                for key in &report.skipped {
                    println!("  - {key}");
                }
            }
        }
    }

    Ok(())
}
