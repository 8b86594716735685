//! Append-only JSON-array stats sink.
//!
//! Browser clients post periodic connection-statistics batches during a test
//! run; each batch is appended to a shared on-disk JSON array. Appends go
//! through a per-file writer task, so concurrent batches are serialized and
//! never interleave partial writes.

use std::collections::HashMap;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde_json::Value;
use thiserror::Error;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

/// Queue depth per stats file.
const STATS_QUEUE_CAPACITY: usize = 64;

/// Errors from the stats sink.
#[derive(Debug, Error)]
pub enum StatsError {
    /// The per-file writer task is gone.
    #[error("stats writer gone")]
    WriterGone,

    /// The file on disk does not end in a JSON array bracket.
    #[error("stats file is not a JSON array")]
    Malformed,

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

type Job = (Value, oneshot::Sender<Result<(), StatsError>>);

/// Serialized append access to JSON-array stats files.
#[derive(Default)]
pub struct StatsSink {
    writers: Mutex<HashMap<PathBuf, mpsc::Sender<Job>>>,
}

impl StatsSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the file with an empty array unless it already exists.
    pub async fn create_file(path: &Path) -> Result<(), StatsError> {
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await
        {
            Ok(mut file) => {
                file.write_all(b"[]").await?;
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                debug!("stats file already exists: {}", path.display());
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Append one batch, waiting until it is on disk.
    pub async fn append(&self, path: &Path, batch: Value) -> Result<(), StatsError> {
        let tx = {
            let mut writers = self.writers.lock();
            writers
                .entry(path.to_path_buf())
                .or_insert_with(|| spawn_writer(path.to_path_buf()))
                .clone()
        };
        let (ack_tx, ack_rx) = oneshot::channel();
        tx.send((batch, ack_tx))
            .await
            .map_err(|_| StatsError::WriterGone)?;
        ack_rx.await.map_err(|_| StatsError::WriterGone)?
    }
}

fn spawn_writer(path: PathBuf) -> mpsc::Sender<Job> {
    let (tx, mut rx) = mpsc::channel::<Job>(STATS_QUEUE_CAPACITY);
    tokio::spawn(async move {
        while let Some((batch, ack)) = rx.recv().await {
            let result = append_batch(&path, &batch).await;
            if let Err(e) = &result {
                error!("failed to append stats batch to {}: {e}", path.display());
            }
            let _ = ack.send(result);
        }
    });
    tx
}

/// Splice one batch into the on-disk array, in front of the closing bracket.
async fn append_batch(path: &Path, batch: &Value) -> Result<(), StatsError> {
    let mut file = OpenOptions::new().read(true).write(true).open(path).await?;
    let size = file.metadata().await?.len();
    let payload = serde_json::to_vec(batch).expect("JSON value serializes");

    if size > 2 {
        file.seek(SeekFrom::End(-1)).await?;
        let mut last = [0u8; 1];
        file.read_exact(&mut last).await?;
        if last[0] != b']' {
            return Err(StatsError::Malformed);
        }
        let mut data = Vec::with_capacity(payload.len() + 2);
        data.push(b',');
        data.extend_from_slice(&payload);
        data.push(b']');
        file.seek(SeekFrom::End(-1)).await?;
        file.write_all(&data).await?;
    } else {
        // Still the bare seed: replace it with a one-element array.
        let mut data = Vec::with_capacity(payload.len() + 2);
        data.push(b'[');
        data.extend_from_slice(&payload);
        data.push(b']');
        file.seek(SeekFrom::Start(0)).await?;
        file.write_all(&data).await?;
    }
    Ok(())
}
