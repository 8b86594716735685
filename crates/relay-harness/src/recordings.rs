//! Per-file recording streams.
//!
//! Uploaded media chunks are appended to a byte stream named after the
//! uploaded file, so a test run's recording accumulates chunk by chunk.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

/// Append one chunk to its recording, returning the path written to.
pub async fn append_chunk(dir: &Path, name: &str, data: &[u8]) -> std::io::Result<PathBuf> {
    // Drop any path components a client might smuggle into the name.
    let name = Path::new(name)
        .file_name()
        .and_then(OsStr::to_str)
        .unwrap_or("chunk.bin");
    let path = dir.join(name);

    tokio::fs::create_dir_all(dir).await?;
    let mut file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(&path)
        .await?;
    file.write_all(data).await?;
    Ok(path)
}
