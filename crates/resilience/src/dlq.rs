//! # Dead Letter Queue
//!
//! Durable overflow store for messages that exhausted retries or hit an
//! open circuit. One JSON file per entry; each write goes temp file →
//! `sync_all` → rename, so a reader can never observe a half-written
//! entry. Writes run on a dedicated writer task so a slow disk never
//! stalls delivery logic for unrelated channels; `enqueue` resolves once
//! the entry is durably committed.
//!
//! A DLQ write failure is the terminal failure mode of the whole triad
//! (guaranteed message loss) and is logged at the highest severity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Default retention window for dead-lettered entries.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Default interval between automatic cleanup sweeps.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Errors from dead letter queue operations.
#[derive(Debug, Error)]
pub enum DlqError {
    /// Filesystem failure.
    #[error("dead letter store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Entry (de)serialization failure.
    #[error("dead letter entry codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// No entry with this id exists.
    #[error("dead letter entry {0} not found")]
    NotFound(Uuid),

    /// Replay delivery failed; the entry was kept.
    #[error("replay of entry {id} failed: {reason}")]
    ReplayFailed {
        /// The entry id.
        id: Uuid,
        /// Delivery failure description.
        reason: String,
    },

    /// The writer task is gone; nothing can be persisted.
    #[error("dead letter writer unavailable")]
    WriterUnavailable,
}

/// Why a message was dead-lettered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The retry handler exhausted its attempt budget.
    RetriesExhausted,
    /// The circuit was open at send time; no delivery was attempted.
    CircuitOpen,
}

impl FailureReason {
    /// Stable wire name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RetriesExhausted => "retries_exhausted",
            Self::CircuitOpen => "circuit_open",
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A durably persisted undeliverable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    /// Entry identifier (also the file name).
    pub id: Uuid,
    /// Logical channel the delivery was counted under.
    pub channel: String,
    /// Broker subject the message targeted.
    pub subject: String,
    /// Why delivery gave up.
    pub reason: FailureReason,
    /// Delivery attempts made before dead-lettering.
    pub attempts: u32,
    /// When the entry was enqueued.
    pub enqueued_at: DateTime<Utc>,
    /// The original message payload.
    pub payload: serde_json::Value,
}

/// Filter for listing entries.
#[derive(Debug, Clone, Default)]
pub struct DlqFilter {
    /// Only entries on this channel.
    pub channel: Option<String>,
    /// Only entries with this failure reason.
    pub reason: Option<FailureReason>,
    /// Only entries enqueued at or after this time.
    pub since: Option<DateTime<Utc>>,
    /// Only entries enqueued at or before this time.
    pub until: Option<DateTime<Utc>>,
}

impl DlqFilter {
    /// Check whether an entry passes the filter.
    #[must_use]
    pub fn matches(&self, entry: &DeadLetterEntry) -> bool {
        if let Some(channel) = &self.channel {
            if &entry.channel != channel {
                return false;
            }
        }
        if let Some(reason) = self.reason {
            if entry.reason != reason {
                return false;
            }
        }
        if let Some(since) = self.since {
            if entry.enqueued_at < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if entry.enqueued_at > until {
                return false;
            }
        }
        true
    }
}

/// Dead letter queue configuration.
#[derive(Debug, Clone)]
pub struct DlqConfig {
    /// Directory entries are stored in (created if missing).
    pub dir: PathBuf,
    /// Entries older than this are removed by cleanup.
    pub retention: Duration,
    /// Interval between automatic cleanup sweeps.
    pub cleanup_interval: Duration,
}

impl DlqConfig {
    /// Config with default retention for the given directory.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            retention: DEFAULT_RETENTION,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
        }
    }
}

struct WriteRequest {
    entry: DeadLetterEntry,
    ack: oneshot::Sender<Result<Uuid, DlqError>>,
}

/// The file-backed dead letter queue.
pub struct DeadLetterQueue {
    dir: PathBuf,
    retention: Duration,
    cleanup_interval: Duration,
    writer_tx: mpsc::UnboundedSender<WriteRequest>,
}

impl DeadLetterQueue {
    /// Open (or create) the store and start the writer task.
    pub async fn open(config: DlqConfig) -> Result<Self, DlqError> {
        tokio::fs::create_dir_all(&config.dir).await?;

        let (writer_tx, writer_rx) = mpsc::unbounded_channel();
        tokio::spawn(writer_loop(config.dir.clone(), writer_rx));

        Ok(Self {
            dir: config.dir,
            retention: config.retention,
            cleanup_interval: config.cleanup_interval,
            writer_tx,
        })
    }

    /// Durably persist one entry, returning its id once committed.
    pub async fn enqueue(
        &self,
        channel: impl Into<String>,
        subject: impl Into<String>,
        reason: FailureReason,
        attempts: u32,
        payload: serde_json::Value,
    ) -> Result<Uuid, DlqError> {
        let entry = DeadLetterEntry {
            id: Uuid::new_v4(),
            channel: channel.into(),
            subject: subject.into(),
            reason,
            attempts,
            enqueued_at: Utc::now(),
            payload,
        };

        let (ack, committed) = oneshot::channel();
        self.writer_tx
            .send(WriteRequest { entry, ack })
            .map_err(|_| DlqError::WriterUnavailable)?;
        committed.await.map_err(|_| DlqError::WriterUnavailable)?
    }

    /// List entries matching the filter, oldest first. Entries are not
    /// removed; torn or foreign files are skipped with a warning.
    pub async fn list(&self, filter: &DlqFilter) -> Result<Vec<DeadLetterEntry>, DlqError> {
        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.dir).await?;

        while let Some(file) = dir.next_entry().await? {
            let path = file.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match read_entry(&path).await {
                Ok(entry) => {
                    if filter.matches(&entry) {
                        entries.push(entry);
                    }
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "skipping unreadable dead letter file");
                }
            }
        }

        entries.sort_by_key(|entry| entry.enqueued_at);
        Ok(entries)
    }

    /// Fetch one entry by id.
    pub async fn entry(&self, id: Uuid) -> Result<Option<DeadLetterEntry>, DlqError> {
        let path = self.entry_path(id);
        match read_entry(&path).await {
            Ok(entry) => Ok(Some(entry)),
            Err(DlqError::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Remove one entry by id. Returns whether it existed.
    pub async fn remove(&self, id: Uuid) -> Result<bool, DlqError> {
        match tokio::fs::remove_file(self.entry_path(id)).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Re-attempt delivery of one entry through `deliver`; the entry is
    /// removed on success and kept on failure.
    pub async fn replay<F, Fut, E>(&self, id: Uuid, deliver: F) -> Result<(), DlqError>
    where
        F: FnOnce(DeadLetterEntry) -> Fut,
        Fut: std::future::Future<Output = Result<(), E>>,
        E: std::fmt::Display,
    {
        let entry = self.entry(id).await?.ok_or(DlqError::NotFound(id))?;
        let channel = entry.channel.clone();

        match deliver(entry).await {
            Ok(()) => {
                self.remove(id).await?;
                info!(%id, channel, "dead letter entry replayed and removed");
                Ok(())
            }
            Err(err) => Err(DlqError::ReplayFailed {
                id,
                reason: err.to_string(),
            }),
        }
    }

    /// Remove entries older than the retention window. Returns how many
    /// were purged.
    pub async fn purge_expired(&self) -> Result<usize, DlqError> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.retention)
                .unwrap_or_else(|_| chrono::Duration::days(7));

        let mut purged = 0usize;
        let expired = self
            .list(&DlqFilter {
                until: Some(cutoff),
                ..DlqFilter::default()
            })
            .await?;
        for entry in expired {
            if self.remove(entry.id).await? {
                purged += 1;
            }
        }

        if purged > 0 {
            info!(purged, "purged expired dead letter entries");
        }
        Ok(purged)
    }

    /// Spawn the periodic retention sweep. The caller owns the handle and
    /// aborts it on shutdown.
    #[must_use]
    pub fn spawn_cleanup(self: &std::sync::Arc<Self>) -> tokio::task::JoinHandle<()> {
        let dlq = self.clone();
        let interval = dlq.cleanup_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick fires immediately; skip it.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(err) = dlq.purge_expired().await {
                    warn!(error = %err, "dead letter cleanup sweep failed");
                }
            }
        })
    }

    fn entry_path(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

async fn writer_loop(dir: PathBuf, mut writer_rx: mpsc::UnboundedReceiver<WriteRequest>) {
    while let Some(request) = writer_rx.recv().await {
        let id = request.entry.id;
        let result = write_entry_atomic(&dir, &request.entry).await;
        if let Err(err) = &result {
            // Terminal failure mode of the triad: this is real message loss.
            error!(
                %id,
                channel = %request.entry.channel,
                error = %err,
                "CRITICAL: dead letter write failed; message is lost"
            );
        } else {
            debug!(
                %id,
                channel = %request.entry.channel,
                reason = %request.entry.reason,
                "message dead-lettered"
            );
        }
        let _ = request.ack.send(result.map(|()| id));
    }
}

/// Atomic create: temp file, fsync, rename. A crash mid-write leaves only
/// a `.tmp` file that listing ignores.
async fn write_entry_atomic(dir: &Path, entry: &DeadLetterEntry) -> Result<(), DlqError> {
    let final_path = dir.join(format!("{}.json", entry.id));
    let temp_path = dir.join(format!("{}.tmp", entry.id));

    let bytes = serde_json::to_vec_pretty(entry)?;

    let mut file = tokio::fs::File::create(&temp_path).await?;
    tokio::io::AsyncWriteExt::write_all(&mut file, &bytes).await?;
    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(&temp_path, &final_path).await?;
    Ok(())
}

async fn read_entry(path: &Path) -> Result<DeadLetterEntry, DlqError> {
    let bytes = tokio::fs::read(path).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn open_temp() -> (TempDir, DeadLetterQueue) {
        let dir = TempDir::new().unwrap();
        let dlq = DeadLetterQueue::open(DlqConfig::new(dir.path())).await.unwrap();
        (dir, dlq)
    }

    fn payload() -> serde_json::Value {
        serde_json::json!({"kind": "game_tick", "payload": {"sequence": 1}})
    }

    #[tokio::test]
    async fn test_enqueue_and_list() {
        let (_dir, dlq) = open_temp().await;

        let id = dlq
            .enqueue(
                "events.domain.game_tick",
                "events.domain.game_tick",
                FailureReason::RetriesExhausted,
                3,
                payload(),
            )
            .await
            .unwrap();

        let entries = dlq.list(&DlqFilter::default()).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, id);
        assert_eq!(entries[0].reason, FailureReason::RetriesExhausted);
        assert_eq!(entries[0].attempts, 3);
    }

    #[tokio::test]
    async fn test_no_temp_file_after_enqueue_returns() {
        let (dir, dlq) = open_temp().await;

        dlq.enqueue(
            "combat.arena",
            "combat.arena",
            FailureReason::CircuitOpen,
            0,
            payload(),
        )
        .await
        .unwrap();

        // Durability contract: once enqueue resolves, the entry is fully
        // committed and no temp file remains.
        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|f| f.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].ends_with(".json"));
    }

    #[tokio::test]
    async fn test_torn_write_invisible_to_list() {
        let (dir, dlq) = open_temp().await;

        dlq.enqueue(
            "chat.say.lobby",
            "chat.say.lobby",
            FailureReason::RetriesExhausted,
            3,
            payload(),
        )
        .await
        .unwrap();

        // Simulate a crash mid-write: a half-written temp file on disk.
        std::fs::write(dir.path().join(format!("{}.tmp", Uuid::new_v4())), b"{\"id\": \"tru").unwrap();
        // And a corrupt committed-looking file from a buggy operator edit.
        std::fs::write(dir.path().join(format!("{}.json", Uuid::new_v4())), b"not json").unwrap();

        let entries = dlq.list(&DlqFilter::default()).await.unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_filters() {
        let (_dir, dlq) = open_temp().await;

        dlq.enqueue(
            "events.domain.game_tick",
            "events.domain.game_tick",
            FailureReason::RetriesExhausted,
            3,
            payload(),
        )
        .await
        .unwrap();
        dlq.enqueue(
            "combat.arena",
            "combat.arena",
            FailureReason::CircuitOpen,
            0,
            payload(),
        )
        .await
        .unwrap();

        let by_channel = dlq
            .list(&DlqFilter {
                channel: Some("combat.arena".to_string()),
                ..DlqFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(by_channel.len(), 1);
        assert_eq!(by_channel[0].reason, FailureReason::CircuitOpen);

        let by_reason = dlq
            .list(&DlqFilter {
                reason: Some(FailureReason::RetriesExhausted),
                ..DlqFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(by_reason.len(), 1);

        let future_only = dlq
            .list(&DlqFilter {
                since: Some(Utc::now() + chrono::Duration::hours(1)),
                ..DlqFilter::default()
            })
            .await
            .unwrap();
        assert!(future_only.is_empty());
    }

    #[tokio::test]
    async fn test_entry_fetch_and_missing() {
        let (_dir, dlq) = open_temp().await;

        let id = dlq
            .enqueue(
                "combat.arena",
                "combat.arena",
                FailureReason::CircuitOpen,
                0,
                payload(),
            )
            .await
            .unwrap();

        assert!(dlq.entry(id).await.unwrap().is_some());
        assert!(dlq.entry(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_replay_success_removes_entry() {
        let (_dir, dlq) = open_temp().await;

        let id = dlq
            .enqueue(
                "events.domain.player_died",
                "events.domain.player_died",
                FailureReason::RetriesExhausted,
                3,
                payload(),
            )
            .await
            .unwrap();

        dlq.replay(id, |_entry| async { Ok::<(), String>(()) })
            .await
            .unwrap();

        assert!(dlq.entry(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_replay_failure_keeps_entry() {
        let (_dir, dlq) = open_temp().await;

        let id = dlq
            .enqueue(
                "events.domain.player_died",
                "events.domain.player_died",
                FailureReason::RetriesExhausted,
                3,
                payload(),
            )
            .await
            .unwrap();

        let err = dlq
            .replay(id, |_entry| async { Err("still down".to_string()) })
            .await
            .unwrap_err();
        assert!(matches!(err, DlqError::ReplayFailed { .. }));
        assert!(dlq.entry(id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_replay_missing_entry() {
        let (_dir, dlq) = open_temp().await;
        let err = dlq
            .replay(Uuid::new_v4(), |_entry| async { Ok::<(), String>(()) })
            .await
            .unwrap_err();
        assert!(matches!(err, DlqError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let (dir, dlq) = open_temp().await;

        // A fresh entry stays.
        dlq.enqueue(
            "combat.arena",
            "combat.arena",
            FailureReason::CircuitOpen,
            0,
            payload(),
        )
        .await
        .unwrap();

        // Plant an entry whose enqueue time predates the retention window.
        let old = DeadLetterEntry {
            id: Uuid::new_v4(),
            channel: "combat.arena".to_string(),
            subject: "combat.arena".to_string(),
            reason: FailureReason::RetriesExhausted,
            attempts: 3,
            enqueued_at: Utc::now() - chrono::Duration::days(10),
            payload: payload(),
        };
        std::fs::write(
            dir.path().join(format!("{}.json", old.id)),
            serde_json::to_vec(&old).unwrap(),
        )
        .unwrap();

        let purged = dlq.purge_expired().await.unwrap();
        assert_eq!(purged, 1);

        let remaining = dlq.list(&DlqFilter::default()).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].reason, FailureReason::CircuitOpen);
    }
}
