use crate::errors::{ShelfError, ShelfResult};
use crate::store::{Record, ShelfStore};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
struct Snapshot {
    generation: u64,
    record: Record,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveStatus {
    /// Newest generation the saver has tried to store.
    pub attempted_generation: u64,
    /// Newest generation known to be stored.
    pub saved_generation: u64,
    pub last_error: Option<ShelfError>,
}

/// Stores the latest full shelf record in the background. Scheduling never blocks the
/// caller; a burst of schedules collapses into one save of the newest record. A failed save
/// is logged and kept in [`SaveStatus`]; the next schedule writes the full state again.
pub struct WriteBehind {
    store: Arc<dyn ShelfStore>,
    sender: Option<watch::Sender<Option<Snapshot>>>,
    status: watch::Receiver<SaveStatus>,
    generation: AtomicU64,
    task: Option<JoinHandle<()>>,
}

impl WriteBehind {
    /// Must be called from within a tokio runtime.
    pub fn spawn(store: Arc<dyn ShelfStore>) -> Self {
        let (sender, receiver) = watch::channel::<Option<Snapshot>>(None);
        let (status_tx, status_rx) = watch::channel(SaveStatus::default());
        let task = tokio::spawn(run_saver(Arc::clone(&store), receiver, status_tx));
        Self {
            store,
            sender: Some(sender),
            status: status_rx,
            generation: AtomicU64::new(0),
            task: Some(task),
        }
    }

    pub fn store(&self) -> &Arc<dyn ShelfStore> {
        &self.store
    }

    /// Queues `record` as the newest state and returns its generation.
    pub fn schedule(&self, record: Record) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(sender) = &self.sender {
            sender.send_replace(Some(Snapshot { generation, record }));
        }
        generation
    }

    pub fn status(&self) -> SaveStatus {
        self.status.borrow().clone()
    }

    /// True while the newest scheduled generation is not yet known to be stored.
    pub fn has_unsaved(&self) -> bool {
        self.generation.load(Ordering::SeqCst) > self.status.borrow().saved_generation
    }

    /// Waits until the newest scheduled generation has been attempted and reports its
    /// outcome.
    pub async fn flush(&self) -> ShelfResult<()> {
        let target = self.generation.load(Ordering::SeqCst);
        let mut status = self.status.clone();
        let outcome = status
            .wait_for(|current| current.attempted_generation >= target)
            .await
            .map_err(|_| ShelfError::Persistence("saver stopped before flushing".to_string()))?
            .last_error
            .clone();
        match outcome {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Saves whatever is pending, then stops the background task.
    pub async fn shutdown(mut self) -> ShelfResult<()> {
        let flushed = self.flush().await;
        self.sender.take();
        if let Some(task) = self.task.take() {
            task.await
                .map_err(|error| ShelfError::Persistence(format!("saver task failed: {}", error)))?;
        }
        flushed
    }
}

impl Drop for WriteBehind {
    fn drop(&mut self) {
        // Dropping the sender lets the saver finish its current write and exit.
        self.sender.take();
    }
}

async fn run_saver(
    store: Arc<dyn ShelfStore>,
    mut receiver: watch::Receiver<Option<Snapshot>>,
    status: watch::Sender<SaveStatus>,
) {
    while receiver.changed().await.is_ok() {
        let latest = receiver.borrow_and_update().clone();
        let Some(snapshot) = latest else {
            continue;
        };
        let Snapshot { generation, record } = snapshot;

        let writer = Arc::clone(&store);
        let result = tokio::task::spawn_blocking(move || writer.set(&record))
            .await
            .map_err(|error| ShelfError::Persistence(format!("save task panicked: {}", error)))
            .and_then(|inner| inner);

        status.send_modify(|current| {
            current.attempted_generation = generation;
            match &result {
                Ok(()) => {
                    current.saved_generation = generation;
                    current.last_error = None;
                }
                Err(error) => {
                    tracing::warn!(generation, error = %error, "shelf save failed; next change retries");
                    current.last_error = Some(error.clone());
                }
            }
        });
        if result.is_ok() {
            tracing::debug!(generation, "shelf saved");
        }
    }
}
