use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use mediadex::{Bot, Config};

#[derive(Parser)]
#[command(name = "mediadex", version, about = "Media index admin tool")]
struct Cli {
    /// Path to config.toml (defaults to the platform config dir).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Per-tier record counts and database sizes.
    Stats,
    /// Query the index the way a chat search would.
    Search {
        query: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
    /// Delete every record whose name matches the query.
    Delete { query: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    let bot = Bot::from_config(&config)?;

    match cli.command {
        Command::Stats => {
            let stats = bot.store().stats()?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::Search { query, limit, offset } => {
            let page = bot.search().query(&query, None, limit, offset)?;
            println!("{}", serde_json::to_string_pretty(&page)?);
        }
        Command::Delete { query } => {
            let removed = bot.search().delete_matching(&query)?;
            println!("deleted {removed} record(s)");
        }
    }
    Ok(())
}
