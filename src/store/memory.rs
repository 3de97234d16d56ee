use super::{event_channel, inbox_event, Record, ShelfStore, StoreEvent};
use crate::errors::{ShelfError, ShelfResult};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use uuid::Uuid;

/// In-process store for embedding without a database file. Saves can be made to fail on
/// demand to exercise the non-fatal persistence path.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    data: Arc<Mutex<Record>>,
    events: broadcast::Sender<StoreEvent>,
    origin: String,
    fail_saves: Arc<AtomicBool>,
    save_count: Arc<AtomicUsize>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            data: Arc::new(Mutex::new(Record::new())),
            events: event_channel(),
            origin: Uuid::new_v4().to_string(),
            fail_saves: Arc::new(AtomicBool::new(false)),
            save_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn handle(&self) -> Self {
        Self {
            origin: Uuid::new_v4().to_string(),
            ..self.clone()
        }
    }

    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Successful saves so far, across all handles.
    pub fn save_count(&self) -> usize {
        self.save_count.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> ShelfResult<Record> {
        Ok(self.lock()?.clone())
    }

    fn lock(&self) -> ShelfResult<std::sync::MutexGuard<'_, Record>> {
        self.data
            .lock()
            .map_err(|_| ShelfError::Persistence("memory store mutex poisoned".to_string()))
    }
}

impl ShelfStore for MemoryStore {
    fn get(&self, keys: &[&str]) -> ShelfResult<Record> {
        let data = self.lock()?;
        Ok(keys
            .iter()
            .filter_map(|key| data.get(*key).map(|value| ((*key).to_string(), value.clone())))
            .collect())
    }

    fn set(&self, record: &Record) -> ShelfResult<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(ShelfError::Persistence("memory store rejected save".to_string()));
        }
        let event = inbox_event(&self.origin, record)?;
        {
            let mut data = self.lock()?;
            for (key, value) in record {
                data.insert(key.clone(), value.clone());
            }
        }
        self.save_count.fetch_add(1, Ordering::SeqCst);
        if let Some(event) = event {
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
