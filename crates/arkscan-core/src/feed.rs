//! Upstream event feed plumbing.
//!
//! Lifecycle events arrive as JSONL (one tagged [`Event`] per line). A
//! [`FileFeed`] tails such a file; [`pump_file_feed`] forwards its events
//! into a channel and [`drive`] feeds that channel through the
//! [`Processor`], rejecting bad events one at a time without stopping and
//! retrying events that failed only because storage was unavailable.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::mpsc;

use crate::error::{FeedError, IngestError};
use crate::ingest::{Event, Outcome, Processor};

/// Parse one feed line. Blank lines and `#` comments yield `None`.
pub fn parse_event_line(line_num: usize, line: &str) -> Result<Option<Event>, FeedError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    serde_json::from_str(line)
        .map(Some)
        .map_err(|e| FeedError::Parse {
            line: line_num,
            message: e.to_string(),
        })
}

// ==============================================================================
// File Feed
// ==============================================================================

/// Incremental reader over a JSONL event file.
///
/// Only newline-terminated lines are consumed, so a writer appending to the
/// file concurrently is never read half-way through a line.
pub struct FileFeed {
    path: PathBuf,
    offset: u64,
    lines_read: usize,
}

impl FileFeed {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            offset: 0,
            lines_read: 0,
        }
    }

    /// Events from lines appended since the previous poll. Malformed lines
    /// are logged and skipped; a missing file reads as empty.
    pub async fn poll(&mut self) -> Result<Vec<Event>, FeedError> {
        let mut file = match tokio::fs::File::open(&self.path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let len = file.metadata().await?.len();
        if len < self.offset {
            tracing::warn!(
                path = %self.path.display(),
                "event feed shrank; rereading from the start"
            );
            self.offset = 0;
            self.lines_read = 0;
        }

        file.seek(SeekFrom::Start(self.offset)).await?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).await?;

        let Some(end) = buf.iter().rposition(|b| *b == b'\n') else {
            return Ok(Vec::new());
        };
        let complete = String::from_utf8_lossy(&buf[..=end]);

        let mut events = Vec::new();
        for line in complete.lines() {
            self.lines_read += 1;
            match parse_event_line(self.lines_read, line) {
                Ok(Some(event)) => events.push(event),
                Ok(None) => {}
                Err(err) => tracing::warn!(path = %self.path.display(), error = %err, "skipping malformed event"),
            }
        }
        self.offset += (end + 1) as u64;
        Ok(events)
    }
}

/// Forward events from `feed` into `tx`. With `follow` set, keep polling at
/// that interval until the receiver is dropped; a failed poll is logged and
/// retried on the next tick. Without `follow`, stop after one pass over the
/// file.
pub async fn pump_file_feed(
    mut feed: FileFeed,
    tx: mpsc::Sender<Event>,
    follow: Option<Duration>,
) -> Result<(), FeedError> {
    loop {
        match feed.poll().await {
            Ok(events) => {
                for event in events {
                    if tx.send(event).await.is_err() {
                        return Ok(());
                    }
                }
            }
            Err(err) if follow.is_some() => {
                tracing::warn!(
                    path = %feed.path.display(),
                    error = %err,
                    "event feed poll failed; retrying on next tick"
                );
            }
            Err(err) => return Err(err),
        }
        match follow {
            Some(interval) => tokio::time::sleep(interval).await,
            None => return Ok(()),
        }
    }
}

// ==============================================================================
// Driver
// ==============================================================================

/// Upper bound on the wait between two attempts at a storage-failed event.
const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriveStats {
    pub applied: u64,
    pub replayed: u64,
    pub rejected: u64,
    /// Attempts repeated after a storage failure.
    pub retries: u64,
}

/// Process events until the channel closes.
///
/// An event rejected for its content (unknown round, invalid state,
/// duplicate) is counted and skipped. An event that failed on storage is
/// retried in place with exponential backoff starting at `retry_backoff`,
/// so no later event is applied before it.
pub async fn drive(
    processor: Arc<Processor>,
    mut rx: mpsc::Receiver<Event>,
    retry_backoff: Duration,
) -> DriveStats {
    let mut stats = DriveStats::default();
    while let Some(event) = rx.recv().await {
        let mut backoff = retry_backoff;
        loop {
            match processor.process(event.clone()).await {
                Ok(Outcome::Applied) => stats.applied += 1,
                Ok(Outcome::Replayed) => stats.replayed += 1,
                Err(IngestError::Storage(err)) => {
                    stats.retries += 1;
                    tracing::warn!(
                        event = event.kind(),
                        error = %err,
                        backoff_ms = backoff.as_millis() as u64,
                        "storage unavailable; retrying event"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_RETRY_BACKOFF);
                    continue;
                }
                Err(_) => stats.rejected += 1,
            }
            break;
        }
    }
    tracing::info!(
        applied = stats.applied,
        replayed = stats.replayed,
        rejected = stats.rejected,
        retries = stats.retries,
        "event feed closed"
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::Index;
    use crate::ingest::ReplayPolicy;
    use crate::store::mock::FlakyStore;
    use crate::store::MemoryStore;
    use crate::test_util::*;
    use crate::types::{RoundState, VtxoId};

    #[test]
    fn blank_and_comment_lines_are_skipped() {
        assert!(parse_event_line(1, "").unwrap().is_none());
        assert!(parse_event_line(2, "   # replay from here").unwrap().is_none());
    }

    #[test]
    fn malformed_line_reports_its_number() {
        let err = parse_event_line(7, r#"{"type":"round_exploded"}"#).unwrap_err();
        assert!(matches!(err, FeedError::Parse { line: 7, .. }));
    }

    #[tokio::test]
    async fn file_feed_only_consumes_complete_lines() {
        let path = unique_temp_path("feed-partial");
        std::fs::write(
            &path,
            "{\"type\":\"round_opened\",\"round_id\":\"r1\"}\n{\"type\":\"round_failed\",",
        )
        .expect("write feed fixture");

        let mut feed = FileFeed::new(&path);
        let first = feed.poll().await.expect("poll");
        assert_eq!(first, vec![opened("r1")]);

        {
            use std::io::Write;
            let mut f = std::fs::OpenOptions::new()
                .append(true)
                .open(&path)
                .expect("open feed");
            f.write_all(b"\"round_id\":\"r1\"}\nnot json\n")
                .expect("append rest");
        }
        let second = feed.poll().await.expect("poll");
        assert_eq!(second, vec![failed("r1")]);
        assert!(feed.poll().await.expect("poll").is_empty());

        std::fs::remove_file(&path).expect("cleanup feed");
    }

    #[tokio::test]
    async fn missing_feed_file_reads_empty() {
        let mut feed = FileFeed::new(unique_temp_path("feed-missing"));
        assert!(feed.poll().await.expect("poll").is_empty());
    }

    #[tokio::test]
    async fn drive_continues_past_rejected_events() {
        let processor = Arc::new(Processor::new(
            Arc::new(MemoryStore::new()),
            Index::shared(),
            ReplayPolicy::Ignore,
        ));
        let (tx, rx) = mpsc::channel(16);
        for event in [
            opened("r1"),
            finalized("r9", 1),
            created("r1", 0, "A", 10),
            opened("r1"),
            finalized("r1", 1),
        ] {
            tx.send(event).await.unwrap();
        }
        drop(tx);

        let stats = drive(processor.clone(), rx, Duration::from_millis(1)).await;
        assert_eq!(
            stats,
            DriveStats {
                applied: 3,
                replayed: 1,
                rejected: 1,
                retries: 0,
            }
        );
        let index = processor.index().read().await;
        assert_eq!(index.vtxos.list_by_address("A").spendable.len(), 1);
    }

    #[tokio::test]
    async fn pump_forwards_file_events_once_without_follow() {
        let path = unique_temp_path("feed-pump");
        std::fs::write(
            &path,
            "{\"type\":\"round_opened\",\"round_id\":\"r1\"}\n{\"type\":\"round_opened\",\"round_id\":\"r2\"}\n",
        )
        .expect("write feed fixture");

        let (tx, mut rx) = mpsc::channel(4);
        pump_file_feed(FileFeed::new(&path), tx, None)
            .await
            .expect("pump");

        assert_eq!(rx.recv().await, Some(opened("r1")));
        assert_eq!(rx.recv().await, Some(opened("r2")));
        assert_eq!(rx.recv().await, None);

        std::fs::remove_file(&path).expect("cleanup feed");
    }

    #[tokio::test]
    async fn drive_retries_events_that_failed_on_storage() {
        let store = Arc::new(FlakyStore::new());
        let processor = Arc::new(Processor::new(
            store.clone(),
            Index::shared(),
            ReplayPolicy::Ignore,
        ));
        processor.process(opened("r1")).await.expect("open r1");

        store.set_unavailable(true);
        let (tx, rx) = mpsc::channel(16);
        let driver = tokio::spawn(drive(processor.clone(), rx, Duration::from_millis(2)));
        tx.send(created("r1", 0, "A", 10)).await.unwrap();
        tx.send(finalized("r1", 1)).await.unwrap();
        drop(tx);

        tokio::time::sleep(Duration::from_millis(30)).await;
        {
            let index = processor.index().read().await;
            let round = index.rounds.lookup_by_id("r1").expect("r1 indexed");
            assert_eq!(round.state, RoundState::Pending);
            assert!(round.vtxo_ids.is_empty());
        }

        store.set_unavailable(false);
        let stats = driver.await.expect("driver task");
        assert_eq!(stats.applied, 2);
        assert_eq!(stats.rejected, 0);
        assert!(stats.retries >= 1);

        let index = processor.index().read().await;
        let round = index.rounds.lookup_by_id("r1").expect("r1 indexed");
        assert_eq!(round.state, RoundState::Finalized);
        assert_eq!(round.vtxo_ids, vec![VtxoId::new("r1", 0)]);
        assert_eq!(index.vtxos.list_by_address("A").spendable.len(), 1);
    }

    #[tokio::test]
    async fn following_pump_survives_a_failed_poll() {
        // Reading a directory fails; the pump must keep ticking until the
        // path turns into a readable feed.
        let path = unique_temp_path("feed-transient");
        std::fs::create_dir(&path).expect("create blocking dir");

        let (tx, mut rx) = mpsc::channel(4);
        let pump = tokio::spawn(pump_file_feed(
            FileFeed::new(&path),
            tx,
            Some(Duration::from_millis(5)),
        ));

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!pump.is_finished());

        std::fs::remove_dir(&path).expect("remove blocking dir");
        std::fs::write(&path, "{\"type\":\"round_opened\",\"round_id\":\"r1\"}\n")
            .expect("write feed fixture");

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("event arrives after recovery");
        assert_eq!(event, Some(opened("r1")));

        pump.abort();
        std::fs::remove_file(&path).expect("cleanup feed");
    }

    #[tokio::test]
    async fn one_shot_pump_reports_a_failed_poll() {
        let path = unique_temp_path("feed-dir");
        std::fs::create_dir(&path).expect("create blocking dir");

        let (tx, _rx) = mpsc::channel(4);
        let err = pump_file_feed(FileFeed::new(&path), tx, None)
            .await
            .unwrap_err();
        assert!(matches!(err, FeedError::Io(_)));

        std::fs::remove_dir(&path).expect("cleanup dir");
    }
}
