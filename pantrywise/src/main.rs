// Pantrywise - household inventory tracker
// Entry point: opens the data directory and runs one command

use anyhow::{bail, Context};
use pantrywise::app::AppState;
use pantrywise::expiry;
use pantrywise::services::{views, MemorySyncProvider};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DATA_DIR_ENV: &str = "PANTRYWISE_DATA_DIR";
const DEFAULT_DATA_DIR: &str = "pantrywise-data";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pantrywise=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Pantrywise");

    let data_dir = std::env::var_os(DATA_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));

    let state = AppState::open(
        data_dir,
        Arc::new(MemorySyncProvider::new()),
        Arc::new(pantrywise::services::LogNotifier),
    )
    .await
    .context("failed to open data directory")?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        [] | ["summary"] => print_summary(&state),
        ["export", path] => {
            let json = state.backup_service.export_snapshot()?;
            tokio::fs::write(path, json)
                .await
                .with_context(|| format!("failed to write {}", path))?;
            println!("Exported to {}", path);
        }
        ["import", path] => {
            let json = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("failed to read {}", path))?;
            if !state.backup_service.import_snapshot(&json).await {
                bail!("{} is not a valid snapshot", path);
            }
            state
                .snapshot_store
                .save_items(&state.items_service.list())
                .await?;
            println!("Imported {} items", state.items_service.list().len());
        }
        ["backup"] => {
            let path = state.backup_service.create_backup().await?;
            println!("Backup written to {}", path.display());
        }
        other => bail!(
            "unknown command {:?}; expected summary, export <file>, import <file> or backup",
            other
        ),
    }

    Ok(())
}

fn print_summary(state: &AppState) {
    let today = expiry::today();
    let items = state.items_service.list();
    let summary = views::inventory_summary(&items, today);

    println!(
        "{} active, {} expiring soon, {} expired, {} used",
        summary.active, summary.expiring, summary.expired, summary.used
    );

    let queue = views::attention_queue(&items, today);
    if !queue.is_empty() {
        println!("\nNeeds attention:");
        for item in queue {
            println!(
                "  [{}] {} x{} ({} days)",
                expiry::Urgency::classify(item.days_left(today)),
                item.name,
                item.quantity,
                item.days_left(today)
            );
        }
    }

    let stats = views::waste_statistics(&items, views::StatsPeriod::Month, today);
    println!(
        "\nLast 30 days: {} used in time, {} wasted ({:.0}% waste)",
        stats.used_count,
        stats.wasted_count,
        stats.waste_rate()
    );
}
