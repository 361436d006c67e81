use std::{fs, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use shared::domain::{Record, RecordId};
use storage::SqliteStore;
use tracing::debug;
use view_core::{
    loader::StaticPageLoader,
    query::{self, MemoryQueryStore, QueryStateStore},
    starred::StarredSetManager,
    PageLoader, ViewController, ViewUpdate,
};

mod config;

#[derive(Parser, Debug)]
#[command(name = "grid", about = "Filterable, sortable, starrable dataset viewer")]
struct Cli {
    /// JSON dataset file (array of records); overrides grid.toml.
    #[arg(long)]
    data: Option<String>,
    /// Sqlite url for starred-state persistence; overrides grid.toml.
    #[arg(long)]
    database_url: Option<String>,
    /// Records per simulated page; overrides grid.toml.
    #[arg(long)]
    per_page: Option<usize>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Derive and print the view for a shareable query string.
    Show {
        /// Control state, e.g. "filter_name=al&sort_date=DESC".
        #[arg(long, default_value = "")]
        query: String,
    },
    /// Toggle the star on a record id.
    Star { id: i64 },
    /// List starred record ids.
    Starred,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let cli = Cli::parse();

    let mut settings = config::load_settings();
    if let Some(data) = cli.data {
        settings.data_path = data;
    }
    if let Some(database_url) = cli.database_url {
        settings.database_url = database_url;
    }
    if let Some(per_page) = cli.per_page {
        settings.per_page = per_page;
    }

    match cli.command {
        Command::Show { query } => show(&settings, &query).await,
        Command::Star { id } => toggle_star(&settings, RecordId(id)).await,
        Command::Starred => list_starred(&settings).await,
    }
}

async fn show(settings: &config::Settings, raw_query: &str) -> Result<()> {
    let records = load_records(&settings.data_path)?;
    debug!(records = records.len(), per_page = settings.per_page, "dataset loaded");

    let loader = Arc::new(StaticPageLoader::new(records, settings.per_page));
    let query_store = Arc::new(MemoryQueryStore::from_query_string(raw_query));
    let kv_store = Arc::new(SqliteStore::new(&settings.database_url).await?);

    let handle = ViewController::initialize(
        Vec::new(),
        Arc::clone(&query_store) as Arc<dyn QueryStateStore>,
        kv_store,
        Arc::clone(&loader) as Arc<dyn PageLoader>,
    )
    .await;
    let mut updates = handle.subscribe_updates();

    // Pull every page through the controller, waiting for each append
    // to land before requesting the next.
    while loader.has_more() {
        handle.load_more();
        loop {
            let update = updates.recv().await.context("controller stopped early")?;
            if matches!(update, ViewUpdate::ViewChanged { .. }) {
                break;
            }
        }
    }

    let snapshot = handle.snapshot().await?;
    println!(
        "{:>2} {:<12} {:<12} {:<20} {:<12} {:<12} {:<12}",
        "", "name", "date", "title", "field", "old_value", "new_value"
    );
    for record in &snapshot.view {
        let marker = if snapshot.starred.contains(record.id) {
            "*"
        } else {
            " "
        };
        println!(
            "{marker:>2} {:<12} {:<12} {:<20} {:<12} {:<12} {:<12}",
            record.text_attr("name").unwrap_or("-"),
            record.text_attr("date").unwrap_or("-"),
            record.text_attr("title").unwrap_or("-"),
            record.text_attr("field").unwrap_or("-"),
            record.text_attr("old_value").unwrap_or("-"),
            record.text_attr("new_value").unwrap_or("-"),
        );
    }
    println!(
        "{} of {} records shown",
        snapshot.view.len(),
        snapshot.dataset_len
    );

    let share = query::encode_query_string(&snapshot.control);
    if !share.is_empty() {
        println!("share: ?{share}");
    }

    Ok(())
}

async fn toggle_star(settings: &config::Settings, id: RecordId) -> Result<()> {
    let kv_store = Arc::new(SqliteStore::new(&settings.database_url).await?);
    let manager = StarredSetManager::new(kv_store);

    let mut starred = manager.load().await;
    starred.toggle(id);
    manager.save(&starred).await?;

    if starred.contains(id) {
        println!("starred record {}", id.0);
    } else {
        println!("unstarred record {}", id.0);
    }
    Ok(())
}

async fn list_starred(settings: &config::Settings) -> Result<()> {
    let kv_store = Arc::new(SqliteStore::new(&settings.database_url).await?);
    let manager = StarredSetManager::new(kv_store);

    let starred = manager.load().await;
    if starred.is_empty() {
        println!("no starred records");
        return Ok(());
    }
    for id in starred.iter() {
        println!("{}", id.0);
    }
    Ok(())
}

fn load_records(path: &str) -> Result<Vec<Record>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read dataset file '{path}'"))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid dataset json in '{path}'"))
}
