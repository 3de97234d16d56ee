use super::{event_channel, inbox_event, Record, ShelfStore, StoreEvent};
use crate::errors::{ShelfError, ShelfResult};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use uuid::Uuid;

const SCHEMA_SQL: &str = include_str!("schema.sql");

/// SQLite-backed key/value store. Handles made with [`SqliteStore::handle`] share the
/// connection and event channel but write under their own origin.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    events: broadcast::Sender<StoreEvent>,
    origin: String,
}

impl SqliteStore {
    pub fn open(path: &Path) -> ShelfResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            events: event_channel(),
            origin: Uuid::new_v4().to_string(),
        })
    }

    pub fn open_in_memory() -> ShelfResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            events: event_channel(),
            origin: Uuid::new_v4().to_string(),
        })
    }

    /// Another writer on the same database, e.g. a background "save to inbox" action.
    pub fn handle(&self) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
            events: self.events.clone(),
            origin: Uuid::new_v4().to_string(),
        }
    }

    fn lock(&self) -> ShelfResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| ShelfError::Persistence("database mutex poisoned".to_string()))
    }
}

impl ShelfStore for SqliteStore {
    fn get(&self, keys: &[&str]) -> ShelfResult<Record> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT value_json FROM shelf_state WHERE key = ?1")?;
        let mut record = Record::new();
        for key in keys {
            let raw: Option<String> = stmt.query_row([*key], |row| row.get(0)).optional()?;
            if let Some(raw) = raw {
                record.insert((*key).to_string(), serde_json::from_str(&raw)?);
            }
        }
        Ok(record)
    }

    fn set(&self, record: &Record) -> ShelfResult<()> {
        let event = inbox_event(&self.origin, record)?;
        {
            let mut conn = self.lock()?;
            let tx = conn.transaction()?;
            let now = Utc::now().to_rfc3339();
            for (key, value) in record {
                tx.execute(
                    "INSERT INTO shelf_state (key, value_json, updated_at)
                     VALUES (?1, ?2, ?3)
                     ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json, updated_at = excluded.updated_at",
                    params![key, serde_json::to_string(value)?, now],
                )?;
            }
            tx.commit()?;
        }

        if let Some(event) = event {
            // No subscribers is fine.
            let _ = self.events.send(event);
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    fn origin(&self) -> &str {
        &self.origin
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{KEY_COLUMN_COUNT, KEY_INBOX};
    use serde_json::json;

    #[test]
    fn set_then_get_round_trips_selected_keys() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SqliteStore::open(&dir.path().join("nested").join("shelf.db")).expect("store");

        let mut record = Record::new();
        record.insert(KEY_COLUMN_COUNT.to_string(), json!(5));
        record.insert("showFavourites".to_string(), json!(false));
        store.set(&record).expect("set");

        let loaded = store.get(&[KEY_COLUMN_COUNT, KEY_INBOX]).expect("get");
        assert_eq!(loaded.get(KEY_COLUMN_COUNT), Some(&json!(5)));
        assert!(!loaded.contains_key(KEY_INBOX));

        record.insert(KEY_COLUMN_COUNT.to_string(), json!(2));
        store.set(&record).expect("overwrite");
        let loaded = store.get(&[KEY_COLUMN_COUNT]).expect("get");
        assert_eq!(loaded.get(KEY_COLUMN_COUNT), Some(&json!(2)));
    }

    #[test]
    fn inbox_writes_are_broadcast_with_origin() {
        let store = SqliteStore::open_in_memory().expect("store");
        let other = store.handle();
        let mut events = store.subscribe();

        let mut record = Record::new();
        record.insert(
            KEY_INBOX.to_string(),
            json!([{"id": "i1", "name": "Rust", "url": "https://rust-lang.org"}]),
        );
        other.set(&record).expect("set");

        let event = events.try_recv().expect("event");
        assert_eq!(event.origin, other.origin());
        assert_ne!(event.origin, store.origin());
        assert_eq!(event.change.inbox[0].id, "i1");

        let seen_by_first = store.get(&[KEY_INBOX]).expect("get");
        assert!(seen_by_first.contains_key(KEY_INBOX));
    }

    #[test]
    fn writes_without_inbox_emit_nothing() {
        let store = SqliteStore::open_in_memory().expect("store");
        let mut events = store.subscribe();
        let mut record = Record::new();
        record.insert(KEY_COLUMN_COUNT.to_string(), json!(3));
        store.set(&record).expect("set");
        assert!(events.try_recv().is_err());
    }
}
