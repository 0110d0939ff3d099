//! taskstore CLI: operator interface to a task storage database.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use taskstore::config::secrets::ExposeSecret;
use taskstore::config::{Config, PoolSettings};
use taskstore::telemetry::{TelemetryConfig, init_telemetry};
use taskstore::{Db, PgStorage, TaskStorage};

#[derive(Parser)]
#[command(name = "taskstore", about = "Inspect and maintain task storage")]
struct Cli {
    /// Queue name (partition); overrides TASKSTORE_QUEUE
    #[arg(long, global = true)]
    queue: Option<String>,
    /// TOML file with pool settings; overrides DB_* variables
    #[arg(long, global = true)]
    pool_config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create tables and indexes
    Migrate,
    /// Show item counts for the queue
    Stats {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Work queue operations
    Queue {
        #[command(subcommand)]
        action: ListAction,
    },
    /// Schedule operations
    Schedule {
        #[command(subcommand)]
        action: ListAction,
    },
    /// Result store operations
    Results {
        #[command(subcommand)]
        action: ResultsAction,
    },
    /// Delete items from the queue's stores
    Flush(FlushArgs),
}

#[derive(Subcommand)]
enum ListAction {
    /// List payloads in order without removing them
    List {
        /// Maximum items to show
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum ResultsAction {
    /// List stored keys and value sizes
    List,
    /// Print the value stored under a key
    Show { key: String },
}

#[derive(Args)]
struct FlushArgs {
    #[arg(long)]
    queue_items: bool,
    #[arg(long)]
    schedule: bool,
    #[arg(long)]
    results: bool,
    /// Flush all three stores
    #[arg(long, conflicts_with_all = ["queue_items", "schedule", "results"])]
    all: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = Config::from_env()?;
    if let Some(ref path) = cli.pool_config {
        config.pool = PoolSettings::load(path)?;
    }
    let queue_name = cli.queue.unwrap_or(config.queue_name);

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "taskstore".to_string(),
        log_level: config.log_level.clone(),
    })?;

    let db = Db::connect_with(config.database_url.expose_secret(), &config.pool).await?;
    let storage = PgStorage::new(db.clone(), queue_name);

    let result = match cli.command {
        Command::Migrate => cmd_migrate(&db).await,
        Command::Stats { json } => cmd_stats(&storage, json).await,
        Command::Queue {
            action: ListAction::List { limit },
        } => cmd_list(storage.enqueued_items(Some(limit)).await),
        Command::Schedule {
            action: ListAction::List { limit },
        } => cmd_list(storage.scheduled_items(Some(limit)).await),
        Command::Results { action } => cmd_results(&storage, action).await,
        Command::Flush(args) => cmd_flush(&storage, args).await,
    };

    db.close().await;
    result
}

async fn cmd_migrate(db: &Db) -> anyhow::Result<()> {
    db.migrate().await?;
    println!("Schema is up to date.");
    Ok(())
}

async fn cmd_stats(storage: &PgStorage, json: bool) -> anyhow::Result<()> {
    let stats = storage.stats().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!("Queue:      {}", storage.name());
        println!("Queued:     {}", stats.queued);
        println!("Scheduled:  {}", stats.scheduled);
        println!("Results:    {}", stats.results);
    }
    Ok(())
}

async fn cmd_results(storage: &PgStorage, action: ResultsAction) -> anyhow::Result<()> {
    match action {
        ResultsAction::List => {
            let items = storage.result_items().await?;
            if items.is_empty() {
                println!("No results stored.");
                return Ok(());
            }
            let mut keys: Vec<_> = items.iter().collect();
            keys.sort_by(|a, b| a.0.cmp(b.0));
            println!("{:<40}  BYTES", "KEY");
            println!("{}", "-".repeat(50));
            for (key, value) in keys {
                println!("{key:<40}  {}", value.len());
            }
            println!("\n{} result(s)", items.len());
        }
        ResultsAction::Show { key } => match storage.peek(&key).await? {
            Some(value) => println!("{}", String::from_utf8_lossy(&value)),
            None => anyhow::bail!("no result stored under '{key}'"),
        },
    }
    Ok(())
}

async fn cmd_flush(storage: &PgStorage, args: FlushArgs) -> anyhow::Result<()> {
    if args.all {
        let removed = storage.flush_all().await?;
        println!(
            "Removed {} queued, {} scheduled, {} result(s).",
            removed.queued, removed.scheduled, removed.results
        );
        return Ok(());
    }
    if !(args.queue_items || args.schedule || args.results) {
        anyhow::bail!("nothing to flush: pass --queue-items, --schedule, --results or --all");
    }
    if args.queue_items {
        println!("Removed {} queued item(s).", storage.flush_queue().await?);
    }
    if args.schedule {
        println!("Removed {} scheduled item(s).", storage.flush_schedule().await?);
    }
    if args.results {
        println!("Removed {} result(s).", storage.flush_results().await?);
    }
    Ok(())
}

fn cmd_list(items: taskstore::Result<Vec<Vec<u8>>>) -> anyhow::Result<()> {
    let items = items?;
    if items.is_empty() {
        println!("No items found.");
        return Ok(());
    }
    for (i, data) in items.iter().enumerate() {
        let preview = String::from_utf8_lossy(data);
        let preview: String = preview.chars().take(60).collect();
        println!("{:>4}  {:>6}B  {}", i + 1, data.len(), preview);
    }
    println!("\n{} item(s)", items.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flush_queue_items_keeps_global_queue_selector() {
        let cli = Cli::try_parse_from([
            "taskstore", "--queue", "emails", "flush", "--queue-items",
        ])
        .unwrap();
        assert_eq!(cli.queue.as_deref(), Some("emails"));
        let Command::Flush(args) = cli.command else {
            panic!("expected flush");
        };
        assert!(args.queue_items && !args.schedule && !args.results && !args.all);

        assert!(Cli::try_parse_from(["taskstore", "flush", "--all", "--results"]).is_err());
    }
}
