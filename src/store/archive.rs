//! Durable tier: match metadata, roster, checkpoints and terminal snapshots
//!
//! Written at match start, at completion, and on optional checkpoints.
//! Never read while a round is being resolved, and never awaited by a game actor:
//! writes go through a per-game [`ArchiveWriter`] task.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::game::model::{Game, GameMode, GameStatus, Team};

use super::supabase::StoreError;

/// Row of the `games` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameRecord {
    pub id: Uuid,
    pub mode: GameMode,
    pub status: GameStatus,
    pub created_at: DateTime<Utc>,
    pub final_snapshot: Option<serde_json::Value>,
    pub failure: Option<String>,
}

impl GameRecord {
    /// Metadata row; the snapshot is attached only once the game is over
    pub fn from_game(game: &Game) -> Result<Self, StoreError> {
        let final_snapshot = if game.is_finished() {
            Some(serde_json::to_value(game)?)
        } else {
            None
        };
        Ok(Self {
            id: game.id,
            mode: game.mode,
            status: game.status,
            created_at: millis_to_datetime(game.created_at),
            final_snapshot,
            failure: game.failure.clone(),
        })
    }
}

/// Row of the `participants` table, keyed by character id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantRecord {
    pub id: Uuid,
    pub game_id: Uuid,
    pub display_name: String,
    pub team: Team,
    /// Participant id for human slots, null for AI slots
    pub connection_handle: Option<Uuid>,
}

impl ParticipantRecord {
    pub fn roster(game: &Game) -> Vec<Self> {
        game.characters
            .iter()
            .map(|c| Self {
                id: c.id,
                game_id: game.id,
                display_name: c.display_name.clone(),
                team: c.team,
                connection_handle: c.participant_id(),
            })
            .collect()
    }
}

/// Row of the `checkpoints` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub game_id: Uuid,
    pub round: u32,
    pub snapshot: serde_json::Value,
}

impl CheckpointRecord {
    pub fn from_game(game: &Game) -> Result<Self, StoreError> {
        Ok(Self {
            game_id: game.id,
            round: game.round,
            snapshot: serde_json::to_value(game)?,
        })
    }
}

/// Durable match history
pub trait MatchArchive: Send + Sync {
    /// Game row plus its roster, written when the lobby fills
    fn record_start(
        &self,
        game: GameRecord,
        roster: Vec<ParticipantRecord>,
    ) -> BoxFuture<'_, Result<(), StoreError>>;

    fn record_checkpoint(&self, checkpoint: CheckpointRecord) -> BoxFuture<'_, Result<(), StoreError>>;

    /// Terminal status, final snapshot and failure detail
    fn record_finish(&self, game: GameRecord) -> BoxFuture<'_, Result<(), StoreError>>;
}

/// Durable write queued by a game actor
#[derive(Debug)]
pub enum ArchiveJob {
    Start {
        game: GameRecord,
        roster: Vec<ParticipantRecord>,
    },
    Checkpoint(CheckpointRecord),
    Finish(GameRecord),
}

impl ArchiveJob {
    fn label(&self) -> &'static str {
        match self {
            ArchiveJob::Start { .. } => "start",
            ArchiveJob::Checkpoint(_) => "checkpoint",
            ArchiveJob::Finish(_) => "finish",
        }
    }
}

/// Per-game queue drained by one writer task. Writes for a game land in
/// submission order; a slow archive delays only this queue.
#[derive(Clone)]
pub struct ArchiveWriter {
    game_id: Uuid,
    tx: mpsc::UnboundedSender<ArchiveJob>,
}

impl ArchiveWriter {
    pub fn spawn(game_id: Uuid, archive: Arc<dyn MatchArchive>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<ArchiveJob>();

        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                let label = job.label();
                let result = match job {
                    ArchiveJob::Start { game, roster } => archive.record_start(game, roster).await,
                    ArchiveJob::Checkpoint(checkpoint) => archive.record_checkpoint(checkpoint).await,
                    ArchiveJob::Finish(game) => archive.record_finish(game).await,
                };
                if let Err(e) = result {
                    warn!(game_id = %game_id, job = label, error = %e, "Durable write failed");
                }
            }
            debug!(game_id = %game_id, "Archive writer stopped");
        });

        Self { game_id, tx }
    }

    pub fn submit(&self, job: ArchiveJob) {
        if let Err(e) = self.tx.send(job) {
            warn!(game_id = %self.game_id, job = e.0.label(), "Archive writer gone, dropping write");
        }
    }
}

/// In-process archive used when no durable backend is configured, and in tests
#[derive(Default)]
pub struct MemoryArchive {
    inner: Mutex<MemoryTables>,
}

#[derive(Default, Clone)]
pub struct MemoryTables {
    pub games: Vec<GameRecord>,
    pub participants: Vec<ParticipantRecord>,
    pub checkpoints: Vec<CheckpointRecord>,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tables(&self) -> MemoryTables {
        self.inner.lock().clone()
    }

    pub fn game(&self, id: Uuid) -> Option<GameRecord> {
        self.inner.lock().games.iter().find(|g| g.id == id).cloned()
    }
}

impl MatchArchive for MemoryArchive {
    fn record_start(
        &self,
        game: GameRecord,
        roster: Vec<ParticipantRecord>,
    ) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            let mut tables = self.inner.lock();
            tables.games.retain(|g| g.id != game.id);
            tables.games.push(game);
            tables.participants.extend(roster);
            Ok(())
        })
    }

    fn record_checkpoint(&self, checkpoint: CheckpointRecord) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            self.inner.lock().checkpoints.push(checkpoint);
            Ok(())
        })
    }

    fn record_finish(&self, game: GameRecord) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            let mut tables = self.inner.lock();
            match tables.games.iter_mut().find(|g| g.id == game.id) {
                Some(existing) => *existing = game,
                None => tables.games.push(game),
            }
            Ok(())
        })
    }
}

fn millis_to_datetime(millis: u64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis as i64)
        .single()
        .unwrap_or_else(Utc::now)
}
