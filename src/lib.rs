pub mod config;
pub mod drag;
pub mod errors;
pub mod grid;
pub mod import;
pub mod models;
pub mod mover;
pub mod persistence;
pub mod shelf;
pub mod store;
pub mod urls;

pub use crate::config::ShelfConfig;
pub use crate::drag::DragSession;
pub use crate::errors::{ShelfError, ShelfResult};
pub use crate::grid::GridPositionAllocator;
pub use crate::models::{
    Category, ContainerAddress, ContainerKind, DisplaySettings, ExternalChange, Favourite, ImportPayload, InboxItem,
    ItemKind, Link, LinkPatch, MoveCategoryRequest, MoveRequest, Shelf, Slot, Subcategory, TargetIndex,
};
pub use crate::mover::{MoveOutcome, OrderedCollectionMover};
pub use crate::persistence::{SaveStatus, WriteBehind};
pub use crate::shelf::ShelfModel;
pub use crate::store::{MemoryStore, ShelfStore, SqliteStore, StoreEvent};

use std::path::Path;
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

const DATABASE_FILE: &str = "shelf.db";

/// Opens the shelf kept under `data_dir`: reads `config.json` if present, starts file logging
/// and loads the SQLite-backed model. Must be called from within a tokio runtime.
pub fn open_shelf(data_dir: &Path) -> ShelfResult<ShelfModel> {
    std::fs::create_dir_all(data_dir)?;
    let config = ShelfConfig::load(&data_dir.join("config.json"))?;

    let log_dir = config.log_dir.clone().unwrap_or_else(|| data_dir.join("logs"));
    std::fs::create_dir_all(&log_dir)?;
    if let Err(error) = init_tracing(&log_dir) {
        // Only fails when a global subscriber is already installed, which then receives this.
        tracing::warn!(error = %error, "shelf file logging not installed");
    }

    let db_path = config
        .database_path
        .clone()
        .unwrap_or_else(|| data_dir.join(DATABASE_FILE));
    let store = SqliteStore::open(&db_path)?;
    tracing::info!(db_path = %db_path.display(), "opening shelf");
    ShelfModel::load(Arc::new(store), config)
}

pub fn init_tracing(log_dir: &Path) -> Result<(), String> {
    std::fs::create_dir_all(log_dir).map_err(|error| error.to_string())?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "shelf.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .json()
        .with_writer(non_blocking)
        .try_init()
        .map_err(|error| error.to_string())
}
