pub mod memory;
pub mod sqlite;

use crate::errors::{ShelfError, ShelfResult};
use crate::models::{Category, ExternalChange, Favourite, InboxItem, Shelf};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::sync::broadcast;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

pub type Record = Map<String, Value>;

pub const KEY_CATEGORIES: &str = "categories";
pub const KEY_FAVOURITES: &str = "favourites";
pub const KEY_INBOX: &str = "inbox";
pub const KEY_COLUMN_COUNT: &str = "columnCount";
pub const KEY_SHOW_FAVOURITES: &str = "showFavourites";
pub const KEY_OPEN_LINKS_IN_NEW_TAB: &str = "openLinksInNewTab";

/// The fixed key set the whole shelf is stored under.
pub const SHELF_KEYS: &[&str] = &[
    KEY_CATEGORIES,
    KEY_FAVOURITES,
    KEY_INBOX,
    KEY_COLUMN_COUNT,
    KEY_SHOW_FAVOURITES,
    KEY_OPEN_LINKS_IN_NEW_TAB,
];

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// A write observed by one store handle, delivered to every subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEvent {
    /// Identity of the handle that wrote.
    pub origin: String,
    pub change: ExternalChange,
}

/// Asynchronous key/value collaborator the shelf is persisted through. Calls block; the
/// write-behind saver runs them off the mutation path.
pub trait ShelfStore: Send + Sync {
    fn get(&self, keys: &[&str]) -> ShelfResult<Record>;
    fn set(&self, record: &Record) -> ShelfResult<()>;
    fn subscribe(&self) -> broadcast::Receiver<StoreEvent>;
    /// Distinguishes this handle's own writes from other writers'.
    fn origin(&self) -> &str;
}

pub(crate) fn event_channel() -> broadcast::Sender<StoreEvent> {
    broadcast::channel(EVENT_CHANNEL_CAPACITY).0
}

/// Builds the inbox change event for a written record, if it touched the inbox.
pub(crate) fn inbox_event(origin: &str, record: &Record) -> ShelfResult<Option<StoreEvent>> {
    let Some(raw) = record.get(KEY_INBOX) else {
        return Ok(None);
    };
    let inbox: Vec<InboxItem> = serde_json::from_value(raw.clone())?;
    Ok(Some(StoreEvent {
        origin: origin.to_string(),
        change: ExternalChange { inbox },
    }))
}

pub fn encode_shelf(shelf: &Shelf) -> ShelfResult<Record> {
    let mut record = Record::new();
    record.insert(KEY_CATEGORIES.to_string(), serde_json::to_value(&shelf.categories)?);
    record.insert(KEY_FAVOURITES.to_string(), serde_json::to_value(&shelf.favourites)?);
    record.insert(KEY_INBOX.to_string(), serde_json::to_value(&shelf.inbox)?);
    record.insert(KEY_COLUMN_COUNT.to_string(), Value::from(shelf.column_count));
    record.insert(KEY_SHOW_FAVOURITES.to_string(), Value::from(shelf.show_favourites));
    record.insert(
        KEY_OPEN_LINKS_IN_NEW_TAB.to_string(),
        Value::from(shelf.open_links_in_new_tab),
    );
    Ok(record)
}

/// Absent keys fall back to an empty shelf with `default_column_count` columns.
pub fn decode_shelf(record: &Record, default_column_count: usize) -> ShelfResult<Shelf> {
    let defaults = Shelf::with_column_count(default_column_count);
    Ok(Shelf {
        categories: field::<Vec<Category>>(record, KEY_CATEGORIES)?.unwrap_or_default(),
        favourites: field::<Vec<Favourite>>(record, KEY_FAVOURITES)?.unwrap_or_default(),
        inbox: field::<Vec<InboxItem>>(record, KEY_INBOX)?.unwrap_or_default(),
        column_count: field(record, KEY_COLUMN_COUNT)?.unwrap_or(defaults.column_count),
        show_favourites: field(record, KEY_SHOW_FAVOURITES)?.unwrap_or(defaults.show_favourites),
        open_links_in_new_tab: field(record, KEY_OPEN_LINKS_IN_NEW_TAB)?
            .unwrap_or(defaults.open_links_in_new_tab),
    })
}

fn field<T: DeserializeOwned>(record: &Record, key: &str) -> ShelfResult<Option<T>> {
    match record.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|error| ShelfError::Persistence(format!("stored {} is malformed: {}", key, error))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_defaults_missing_keys() {
        let shelf = decode_shelf(&Record::new(), 3).expect("decode");
        assert_eq!(shelf, Shelf::with_column_count(3));
    }

    #[test]
    fn encode_uses_the_fixed_key_set() {
        let record = encode_shelf(&Shelf::default()).expect("encode");
        let mut keys: Vec<&str> = record.keys().map(String::as_str).collect();
        keys.sort_unstable();
        let mut expected = SHELF_KEYS.to_vec();
        expected.sort_unstable();
        assert_eq!(keys, expected);
    }

    #[test]
    fn decode_reports_malformed_values() {
        let mut record = Record::new();
        record.insert(KEY_CATEGORIES.to_string(), json!([{"id": "c1"}]));
        assert!(matches!(decode_shelf(&record, 4), Err(ShelfError::Persistence(_))));
    }
}
