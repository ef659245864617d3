//! Ephemeral tier: live snapshots and in-flight declarations with a TTL
//!
//! Keys follow `game:{id}` and `game:{id}:round:{n}:actions`. Entries for
//! different games live in different shards, so games never contend.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info};
use uuid::Uuid;

use crate::game::declaration::Declaration;
use crate::game::model::Game;

pub fn game_key(game_id: Uuid) -> String {
    format!("game:{game_id}")
}

pub fn actions_key(game_id: Uuid, round: u32) -> String {
    format!("game:{game_id}:round:{round}:actions")
}

struct Expiring<T> {
    value: T,
    expires_at: Instant,
}

impl<T> Expiring<T> {
    fn new(value: T, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Fast shared store for the running rounds
pub struct EphemeralStore {
    snapshots: DashMap<String, Expiring<Arc<Game>>>,
    actions: DashMap<String, Expiring<HashMap<Uuid, Declaration>>>,
    ttl: Duration,
}

impl EphemeralStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            snapshots: DashMap::new(),
            actions: DashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Publish a snapshot, refreshing its TTL
    pub fn put_snapshot(&self, game: Game) {
        let key = game_key(game.id);
        self.snapshots.insert(key, Expiring::new(Arc::new(game), self.ttl));
    }

    /// Current snapshot with this round's declaration flags filled in
    pub fn snapshot(&self, game_id: Uuid) -> Option<Game> {
        let game = self.raw_snapshot(game_id)?;
        let mut game = (*game).clone();

        if game.accepts_declarations() {
            if let Some(entry) = self.actions.get(&actions_key(game_id, game.round)) {
                for character in &mut game.characters {
                    let declared = entry.value.contains_key(&character.id);
                    character.has_movement_declared = declared;
                    character.has_action_declared = declared;
                }
            }
        }
        Some(game)
    }

    /// Snapshot exactly as the resolver published it
    pub fn raw_snapshot(&self, game_id: Uuid) -> Option<Arc<Game>> {
        let entry = self.snapshots.get(&game_key(game_id))?;
        if entry.is_expired(Instant::now()) {
            return None;
        }
        Some(entry.value.clone())
    }

    pub fn contains_game(&self, game_id: Uuid) -> bool {
        self.raw_snapshot(game_id).is_some()
    }

    /// Extend the retention of a game that is still being played
    pub fn touch(&self, game_id: Uuid) {
        let expires_at = Instant::now() + self.ttl;
        if let Some(mut entry) = self.snapshots.get_mut(&game_key(game_id)) {
            entry.expires_at = expires_at;
        }
    }

    /// Record a declaration once per character and round. Returns the number of
    /// declarations held for the round, or `None` when the character already declared.
    pub fn record_declaration(&self, game_id: Uuid, round: u32, declaration: Declaration) -> Option<usize> {
        let key = actions_key(game_id, round);
        let mut entry = self
            .actions
            .entry(key)
            .or_insert_with(|| Expiring::new(HashMap::new(), self.ttl));

        if entry.value.contains_key(&declaration.character_id) {
            return None;
        }
        entry.value.insert(declaration.character_id, declaration);
        Some(entry.value.len())
    }

    pub fn has_declared(&self, game_id: Uuid, round: u32, character_id: Uuid) -> bool {
        self.actions
            .get(&actions_key(game_id, round))
            .is_some_and(|entry| entry.value.contains_key(&character_id))
    }

    /// Declarations held for a round, in acceptance order
    pub fn declarations(&self, game_id: Uuid, round: u32) -> Vec<Declaration> {
        let mut declarations: Vec<Declaration> = self
            .actions
            .get(&actions_key(game_id, round))
            .map(|entry| entry.value.values().cloned().collect())
            .unwrap_or_default();
        declarations.sort_by_key(|d| d.seq);
        declarations
    }

    /// Take the round's declarations and drop the key
    pub fn take_declarations(&self, game_id: Uuid, round: u32) -> Vec<Declaration> {
        let mut declarations: Vec<Declaration> = self
            .actions
            .remove(&actions_key(game_id, round))
            .map(|(_, entry)| entry.value.into_values().collect())
            .unwrap_or_default();
        declarations.sort_by_key(|d| d.seq);
        declarations
    }

    pub fn remove_game(&self, game_id: Uuid) {
        self.snapshots.remove(&game_key(game_id));
        let prefix = format!("{}:", game_key(game_id));
        self.actions.retain(|key, _| !key.starts_with(&prefix));
    }

    /// Evict expired entries, returns how many were removed
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.snapshots.len() + self.actions.len();
        self.snapshots.retain(|_, entry| !entry.is_expired(now));
        self.actions.retain(|_, entry| !entry.is_expired(now));
        before - (self.snapshots.len() + self.actions.len())
    }

    /// Periodic eviction of abandoned games
    pub fn spawn_sweeper(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(every_secs = every.as_secs(), "Ephemeral store sweeper started");
            loop {
                ticker.tick().await;
                let evicted = self.sweep();
                if evicted > 0 {
                    debug!(evicted, "Swept expired ephemeral entries");
                }
            }
        })
    }

    pub fn game_count(&self) -> usize {
        self.snapshots.len()
    }
}
