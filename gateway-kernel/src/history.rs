//! Best-effort hand-off of finished records to a history sink.
//!
//! The gateway never awaits the sink. Records go through a bounded channel to
//! a background task; when the channel is full the record is dropped and a
//! warning is logged.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use thiserror::Error;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::record::ExecutionRecord;

/// Errors reported by history sinks.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// Sink-specific failure.
    #[error("history sink failed: {reason}")]
    Sink {
        /// Failure detail.
        reason: String,
    },

    /// Filesystem failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Record could not be encoded.
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl HistoryError {
    /// Convenience constructor for sink failures.
    #[must_use]
    pub fn sink(reason: impl Into<String>) -> Self {
        Self::Sink {
            reason: reason.into(),
        }
    }
}

/// Consumer of finished execution records.
#[async_trait]
pub trait HistorySink: Send + Sync {
    /// Persists `record`.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError`] when the record could not be stored. The
    /// dispatcher logs the failure and moves on.
    async fn append(&self, record: &ExecutionRecord) -> Result<(), HistoryError>;
}

/// Sink that logs each record.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingHistorySink;

#[async_trait]
impl HistorySink for TracingHistorySink {
    async fn append(&self, record: &ExecutionRecord) -> Result<(), HistoryError> {
        info!(
            request_id = %record.meta.request_id,
            tool = %record.tool_name,
            dataset_id = %record.dataset_id,
            user_id = %record.user_id,
            success = record.success,
            latency_ms = record.meta.latency_ms,
            "execution recorded"
        );
        Ok(())
    }
}

/// Sink that keeps records in memory.
#[derive(Debug, Default)]
pub struct CollectingHistorySink {
    records: Mutex<Vec<ExecutionRecord>>,
}

impl CollectingHistorySink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Removes and returns the collected records.
    #[must_use]
    pub fn drain(&self) -> Vec<ExecutionRecord> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.drain(..).collect()
    }
}

#[async_trait]
impl HistorySink for CollectingHistorySink {
    async fn append(&self, record: &ExecutionRecord) -> Result<(), HistoryError> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        Ok(())
    }
}

/// Sink appending newline-delimited JSON to a file.
#[derive(Debug)]
pub struct FileHistorySink {
    path: PathBuf,
    file: tokio::sync::Mutex<fs::File>,
}

impl FileHistorySink {
    /// Opens (or creates) the journal at `path`.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors from creating the parent directory or the file.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, HistoryError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        Ok(Self {
            path,
            file: tokio::sync::Mutex::new(file),
        })
    }

    /// Path of the journal file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl HistorySink for FileHistorySink {
    async fn append(&self, record: &ExecutionRecord) -> Result<(), HistoryError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        let mut file = self.file.lock().await;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}

/// Owns the channel and drain task feeding a [`HistorySink`].
#[derive(Debug)]
pub struct HistoryDispatcher {
    sender: mpsc::Sender<ExecutionRecord>,
    task: JoinHandle<()>,
}

impl HistoryDispatcher {
    /// Starts the drain task. `capacity` is clamped to at least one.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    #[must_use]
    pub fn spawn(sink: Arc<dyn HistorySink>, capacity: usize) -> Self {
        let (sender, mut receiver) = mpsc::channel::<ExecutionRecord>(capacity.max(1));
        let task = tokio::spawn(async move {
            while let Some(record) = receiver.recv().await {
                if let Err(err) = sink.append(&record).await {
                    warn!(
                        request_id = %record.meta.request_id,
                        error = %err,
                        "history sink rejected record"
                    );
                }
            }
        });
        Self { sender, task }
    }

    /// Queues `record` without waiting. Returns `false` when it was dropped.
    pub fn submit(&self, record: ExecutionRecord) -> bool {
        match self.sender.try_send(record) {
            Ok(()) => true,
            Err(TrySendError::Full(record)) => {
                warn!(
                    request_id = %record.meta.request_id,
                    "history buffer full; record dropped"
                );
                false
            }
            Err(TrySendError::Closed(record)) => {
                warn!(
                    request_id = %record.meta.request_id,
                    "history dispatcher stopped; record dropped"
                );
                false
            }
        }
    }

    /// Closes the channel and waits until queued records are written.
    pub async fn shutdown(self) {
        drop(self.sender);
        if let Err(err) = self.task.await {
            warn!(error = %err, "history drain task ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use gateway_primitives::RequestId;

    use super::*;
    use crate::record::ExecutionMeta;

    fn record(tool: &str) -> ExecutionRecord {
        ExecutionRecord {
            success: true,
            response: Some("42".into()),
            error: None,
            error_kind: None,
            tool_name: tool.into(),
            dataset_id: "ds".into(),
            user_id: "u".into(),
            meta: ExecutionMeta::new(RequestId::random()),
        }
    }

    struct FailingSink {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl HistorySink for FailingSink {
        async fn append(&self, _record: &ExecutionRecord) -> Result<(), HistoryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(HistoryError::sink("disk full"))
        }
    }

    #[tokio::test]
    async fn dispatcher_delivers_in_order() {
        let sink = CollectingHistorySink::new();
        let dispatcher = HistoryDispatcher::spawn(sink.clone(), 8);
        assert!(dispatcher.submit(record("a")));
        assert!(dispatcher.submit(record("b")));
        dispatcher.shutdown().await;

        let names: Vec<_> = sink.drain().into_iter().map(|r| r.tool_name).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn failing_sink_keeps_draining() {
        let sink = Arc::new(FailingSink {
            calls: AtomicUsize::new(0),
        });
        let dispatcher = HistoryDispatcher::spawn(sink.clone(), 4);
        dispatcher.submit(record("a"));
        dispatcher.submit(record("b"));
        dispatcher.shutdown().await;

        assert_eq!(sink.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn full_buffer_drops_instead_of_blocking() {
        let sink = CollectingHistorySink::new();
        let dispatcher = HistoryDispatcher::spawn(sink.clone(), 1);
        // The drain task has not run yet on this single-threaded runtime.
        assert!(dispatcher.submit(record("kept")));
        assert!(!dispatcher.submit(record("dropped")));
        dispatcher.shutdown().await;

        assert_eq!(sink.drain().len(), 1);
    }

    #[tokio::test]
    async fn file_sink_writes_one_json_line_per_record() {
        let mut path = std::env::temp_dir();
        path.push(format!("gateway-history-{}.ndjson", uuid::Uuid::new_v4()));
        let sink = FileHistorySink::open(&path).await.unwrap();
        sink.append(&record("a")).await.unwrap();
        sink.append(&record("b")).await.unwrap();

        let contents = std::fs::read_to_string(sink.path()).unwrap();
        let parsed: Vec<ExecutionRecord> = contents
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1].tool_name, "b");

        let _ = std::fs::remove_file(path);
    }
}
