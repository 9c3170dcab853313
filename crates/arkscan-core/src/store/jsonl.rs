//! Append-only JSONL store: one committed [`WriteBatch`] per line.
//!
//! A batch counts as committed once its full line, including the trailing
//! newline, has been written and synced. Bytes past the last committed line
//! are the remnant of an interrupted or failed write: they are cut off when
//! the store is opened and again before the next append.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::StorageError;

use super::{Storage, StoredState, WriteBatch};

/// The open log and the length of its committed prefix.
struct LogFile {
    file: File,
    committed_len: u64,
}

impl LogFile {
    /// Append `line` after the committed prefix, dropping any leftover
    /// bytes of an earlier failed write first.
    async fn append(&mut self, line: &[u8]) -> std::io::Result<()> {
        let len = self.file.metadata().await?.len();
        if len != self.committed_len {
            tracing::warn!(
                dropped_bytes = len.saturating_sub(self.committed_len),
                "truncating uncommitted bytes in storage log"
            );
            self.file.set_len(self.committed_len).await?;
        }
        self.file.write_all(line).await?;
        self.file.flush().await?;
        self.file.sync_data().await
    }
}

pub struct JsonlStore {
    path: PathBuf,
    log: Mutex<LogFile>,
}

impl JsonlStore {
    /// Open (or create) the log at `path`, truncating a torn trailing line.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .await?;

        let content = tokio::fs::read(&path).await?;
        let keep = content
            .iter()
            .rposition(|b| *b == b'\n')
            .map_or(0, |idx| idx + 1);
        if keep < content.len() {
            tracing::warn!(
                path = %path.display(),
                dropped_bytes = content.len() - keep,
                "truncating torn trailing batch in storage log"
            );
            file.set_len(keep as u64).await?;
        }

        Ok(Self {
            path,
            log: Mutex::new(LogFile {
                file,
                committed_len: keep as u64,
            }),
        })
    }
}

#[async_trait]
impl Storage for JsonlStore {
    async fn commit(&self, batch: WriteBatch) -> Result<(), StorageError> {
        let mut line = serde_json::to_string(&batch)
            .map_err(|e| StorageError::Unavailable(format!("encode batch: {e}")))?;
        line.push('\n');

        let mut log = self.log.lock().await;
        if let Err(err) = log.append(line.as_bytes()).await {
            let committed_len = log.committed_len;
            if let Err(rollback) = log.file.set_len(committed_len).await {
                tracing::error!(
                    path = %self.path.display(),
                    error = %rollback,
                    "failed to roll back partial batch; will retry before next append"
                );
            }
            return Err(err.into());
        }
        log.committed_len += line.len() as u64;
        Ok(())
    }

    async fn load(&self) -> Result<StoredState, StorageError> {
        // Hold the writer lock so a concurrent commit cannot be half-read.
        let log = self.log.lock().await;
        let mut content = tokio::fs::read(&self.path).await?;
        content.truncate(log.committed_len as usize);
        let content = String::from_utf8_lossy(&content);

        content
            .lines()
            .enumerate()
            .try_fold(StoredState::default(), |mut state, (line_num, line)| {
                let line = line.trim();
                if line.is_empty() {
                    return Ok(state);
                }
                let batch: WriteBatch =
                    serde_json::from_str(line).map_err(|e| StorageError::Corrupt {
                        line: line_num + 1,
                        message: e.to_string(),
                    })?;
                state.apply(batch);
                Ok(state)
            })
    }
}
