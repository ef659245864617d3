//! Game actor and registry
//!
//! Every game runs as one task that owns its snapshot and its round barrier.
//! Joins and declarations arrive over an mpsc channel and are handled one at a
//! time, so at most one resolution per game can ever be in flight.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{interval, sleep_until, timeout, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::BalanceConfig;
use crate::store::{
    ArchiveJob, ArchiveWriter, CheckpointRecord, EphemeralStore, GameRecord, MatchArchive, ParticipantRecord,
};
use crate::ws::protocol::ServerMsg;

use super::ai::DecisionPolicy;
use super::barrier::{DeclareReceipt, RoundBarrier};
use super::combat::SeededRolls;
use super::declaration::{Action, Declaration, Movement};
use super::error::{GameError, ResolutionFault};
use super::model::{Controller, Game, GameMode, GamePhase, GameStatus};
use super::round::{Resolution, RoundResolver};
use super::snapshot::SnapshotBuilder;

const MAX_NAME_LEN: usize = 32;

/// How long a caller waits on a game actor before answering "try again"
const ACTOR_REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-game timing knobs taken from the process configuration
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub round_deadline: Duration,
    /// 0 disables checkpoints
    pub checkpoint_every_rounds: u32,
}

/// Result of a successful join
#[derive(Debug, Clone)]
pub struct JoinTicket {
    pub participant_id: Uuid,
    pub character_id: Uuid,
    pub reconnected: bool,
    pub snapshot: Game,
}

/// Requests handled by the game actor
pub enum GameCommand {
    Join {
        participant_name: String,
        reply: oneshot::Sender<Result<JoinTicket, GameError>>,
    },
    Declare {
        participant_id: Uuid,
        character_id: Uuid,
        movement: Movement,
        action: Action,
        /// When the request reached the server
        received_at: Instant,
        reply: oneshot::Sender<Result<DeclareReceipt, GameError>>,
    },
}

/// Handle to a running game
#[derive(Clone)]
pub struct GameHandle {
    pub id: Uuid,
    pub mode: GameMode,
    pub cmd_tx: mpsc::Sender<GameCommand>,
    pub events_tx: broadcast::Sender<ServerMsg>,
    pub participant_count: Arc<AtomicUsize>,
}

impl GameHandle {
    pub fn participant_count(&self) -> usize {
        self.participant_count.load(Ordering::Relaxed)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerMsg> {
        self.events_tx.subscribe()
    }

    /// Errors with `NotFound` when the actor is gone and `Unavailable` when it
    /// does not answer in time
    pub async fn join(&self, participant_name: String) -> Result<JoinTicket, GameError> {
        let (reply, rx) = oneshot::channel();
        self.request(GameCommand::Join { participant_name, reply }, rx).await
    }

    pub async fn declare(
        &self,
        participant_id: Uuid,
        character_id: Uuid,
        movement: Movement,
        action: Action,
        received_at: Instant,
    ) -> Result<DeclareReceipt, GameError> {
        let (reply, rx) = oneshot::channel();
        let cmd = GameCommand::Declare {
            participant_id,
            character_id,
            movement,
            action,
            received_at,
            reply,
        };
        self.request(cmd, rx).await
    }

    async fn request<T>(
        &self,
        cmd: GameCommand,
        rx: oneshot::Receiver<Result<T, GameError>>,
    ) -> Result<T, GameError> {
        let gone = || GameError::NotFound(format!("game {}", self.id));
        let exchange = async {
            if self.cmd_tx.send(cmd).await.is_err() {
                return Err(gone());
            }
            rx.await.unwrap_or_else(|_| Err(gone()))
        };
        match timeout(ACTOR_REPLY_TIMEOUT, exchange).await {
            Ok(result) => result,
            Err(_) => {
                warn!(game_id = %self.id, "Game actor did not answer in time");
                Err(GameError::Unavailable)
            }
        }
    }
}

/// Registry of all running games
pub struct GameRegistry {
    games: DashMap<Uuid, GameHandle>,
}

impl GameRegistry {
    pub fn new() -> Self {
        Self {
            games: DashMap::new(),
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<GameHandle> {
        self.games.get(id).map(|g| g.value().clone())
    }

    pub fn insert(&self, handle: GameHandle) {
        self.games.insert(handle.id, handle);
    }

    pub fn remove(&self, id: &Uuid) -> Option<GameHandle> {
        self.games.remove(id).map(|(_, h)| h)
    }

    pub fn active_games(&self) -> usize {
        self.games.len()
    }

    pub fn total_participants(&self) -> usize {
        self.games.iter().map(|g| g.value().participant_count()).sum()
    }
}

impl Default for GameRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Collaborators shared by every game actor
#[derive(Clone)]
pub struct SessionDeps {
    pub store: Arc<EphemeralStore>,
    pub archive: Arc<dyn MatchArchive>,
    pub registry: Arc<GameRegistry>,
    pub config: Arc<BalanceConfig>,
    pub policy: Arc<dyn DecisionPolicy>,
    pub settings: SessionSettings,
}

/// The authoritative game actor
pub struct GameSession {
    game: Game,
    deps: SessionDeps,
    resolver: RoundResolver,
    barrier: Option<RoundBarrier>,
    builder: SnapshotBuilder,
    archive: ArchiveWriter,
    cmd_rx: mpsc::Receiver<GameCommand>,
    events_tx: broadcast::Sender<ServerMsg>,
    participant_count: Arc<AtomicUsize>,
}

impl GameSession {
    /// Wrap a lobby snapshot. The snapshot is published to the ephemeral store.
    pub fn new(game: Game, deps: SessionDeps) -> (Self, GameHandle) {
        let (cmd_tx, cmd_rx) = mpsc::channel(256);
        let (events_tx, _) = broadcast::channel(64);
        let humans = game.characters.iter().filter(|c| !c.is_ai()).count();
        let participant_count = Arc::new(AtomicUsize::new(humans));

        let handle = GameHandle {
            id: game.id,
            mode: game.mode,
            cmd_tx,
            events_tx: events_tx.clone(),
            participant_count: participant_count.clone(),
        };

        deps.store.put_snapshot(game.clone());

        let session = Self {
            builder: SnapshotBuilder::new(game.id),
            archive: ArchiveWriter::spawn(game.id, deps.archive.clone()),
            resolver: RoundResolver::new(deps.config.clone()),
            game,
            deps,
            barrier: None,
            cmd_rx,
            events_tx,
            participant_count,
        };
        (session, handle)
    }

    /// Run until the game finishes, every handle is dropped, or the snapshot expires
    pub async fn run(mut self) {
        let game_id = self.game.id;
        info!(game_id = %game_id, mode = ?self.game.mode, "Game actor started");

        let check_every = (self.deps.store.ttl() / 4).max(Duration::from_secs(1));
        let mut expiry_check = interval(check_every);
        expiry_check.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if self.game.is_finished() {
                break;
            }
            if self.barrier.as_ref().is_some_and(|b| b.is_satisfied()) {
                self.close_round();
                continue;
            }

            let deadline = self.barrier.as_ref().map(|b| b.deadline());

            tokio::select! {
                biased;

                cmd = self.cmd_rx.recv() => match cmd {
                    Some(cmd) => self.handle(cmd),
                    None => {
                        info!(game_id = %game_id, "All handles dropped, stopping game");
                        break;
                    }
                },

                _ = sleep_until_opt(deadline) => {
                    // Anything that arrived by the deadline still counts
                    while let Ok(cmd) = self.cmd_rx.try_recv() {
                        self.handle(cmd);
                    }
                    if self.barrier.as_ref().is_some_and(|b| !b.is_closed()) {
                        debug!(game_id = %game_id, "Round deadline elapsed");
                        self.close_round();
                    }
                }

                _ = expiry_check.tick() => {
                    if !self.deps.store.contains_game(game_id) {
                        warn!(game_id = %game_id, "Snapshot expired, abandoning game");
                        self.deps.store.remove_game(game_id);
                        break;
                    }
                }
            }
        }

        self.deps.registry.remove(&game_id);
        info!(game_id = %game_id, round = self.game.round, status = ?self.game.status, "Game actor stopped");
    }

    fn handle(&mut self, cmd: GameCommand) {
        match cmd {
            GameCommand::Join {
                participant_name,
                reply,
            } => {
                let result = self.join(participant_name);
                let _ = reply.send(result);
            }
            GameCommand::Declare {
                participant_id,
                character_id,
                movement,
                action,
                received_at,
                reply,
            } => {
                let result = self.declare(participant_id, character_id, movement, action, received_at);
                let _ = reply.send(result);
            }
        }
    }

    fn join(&mut self, participant_name: String) -> Result<JoinTicket, GameError> {
        let name = participant_name.trim();
        if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
            return Err(GameError::Validation(format!(
                "participant name must be 1 to {MAX_NAME_LEN} characters"
            )));
        }

        // Same name reclaims the slot
        let held = self
            .game
            .characters
            .iter()
            .find(|c| !c.is_ai() && c.display_name == name)
            .and_then(|c| Some((c.participant_id()?, c.id)));
        if let Some((participant_id, character_id)) = held {
            self.deps.store.touch(self.game.id);
            info!(game_id = %self.game.id, character_id = %character_id, "Participant reconnected");
            return Ok(JoinTicket {
                participant_id,
                character_id,
                reconnected: true,
                snapshot: self.current_snapshot(),
            });
        }

        if self.game.status != GameStatus::Waiting {
            return Err(GameError::AlreadyStarted);
        }

        let participant_id = Uuid::new_v4();
        let controller = Controller::Participant { participant_id };
        let character_id = self
            .game
            .add_character(controller, name.to_string(), &self.deps.config)
            .ok_or(GameError::AlreadyStarted)?;
        self.participant_count.fetch_add(1, Ordering::Relaxed);

        info!(
            game_id = %self.game.id,
            character_id = %character_id,
            slots_filled = self.game.characters.len(),
            slots = self.game.total_slots(),
            "Participant joined"
        );

        if self.game.is_full() {
            self.start();
        } else {
            self.deps.store.put_snapshot(self.game.clone());
        }

        Ok(JoinTicket {
            participant_id,
            character_id,
            reconnected: false,
            snapshot: self.current_snapshot(),
        })
    }

    fn declare(
        &mut self,
        participant_id: Uuid,
        character_id: Uuid,
        movement: Movement,
        action: Action,
        received_at: Instant,
    ) -> Result<DeclareReceipt, GameError> {
        let Some(barrier) = self.barrier.as_mut() else {
            let reason = if self.game.is_finished() {
                "game is finished"
            } else {
                "round is not accepting declarations"
            };
            return Err(GameError::Phase(reason.into()));
        };

        let receipt = barrier.declare(
            &self.game,
            &self.deps.config,
            participant_id,
            character_id,
            movement,
            action,
            received_at,
        )?;

        self.deps.store.touch(self.game.id);
        let _ = self
            .events_tx
            .send(self.builder.progress(receipt.round, receipt.received, receipt.expected));
        Ok(receipt)
    }

    /// Lobby is full: open round 0
    fn start(&mut self) {
        self.game.status = GameStatus::InProgress;
        self.game.phase = GamePhase::Declaring;
        self.deps.store.put_snapshot(self.game.clone());

        match GameRecord::from_game(&self.game) {
            Ok(game) => self.archive.submit(ArchiveJob::Start {
                game,
                roster: ParticipantRecord::roster(&self.game),
            }),
            Err(e) => warn!(game_id = %self.game.id, error = %e, "Failed to encode game record"),
        }

        self.open_round();
        info!(game_id = %self.game.id, "Game started");

        let _ = self.events_tx.send(ServerMsg::GameStarted {
            game_id: self.game.id,
            round: self.game.round,
            deadline_ms: self.deps.settings.round_deadline.as_millis() as u64,
            snapshot: self.game.clone(),
        });
    }

    fn open_round(&mut self) {
        let deadline = Instant::now() + self.deps.settings.round_deadline;
        self.barrier = Some(RoundBarrier::open(self.deps.store.clone(), &self.game, deadline));
    }

    /// Close the barrier and resolve. The barrier hands out its set once, so a
    /// second call for the same round does nothing.
    fn close_round(&mut self) {
        let Some(barrier) = self.barrier.as_mut() else {
            return;
        };
        let Some(declarations) = barrier.close(&self.game, &self.deps.config, self.deps.policy.as_ref()) else {
            return;
        };
        self.barrier = None;

        self.game.phase = GamePhase::Resolving;
        self.deps.store.put_snapshot(self.game.clone());

        match self.resolve_with_retry(&declarations) {
            Ok(resolution) => self.publish(resolution),
            Err(fault) => self.fail(fault),
        }
    }

    /// One retry against the same declaration set and the same rolls
    fn resolve_with_retry(&self, declarations: &[Declaration]) -> Result<Resolution, ResolutionFault> {
        let attempt = || {
            let mut rolls = SeededRolls::for_round(self.game.seed, self.game.round);
            self.resolver.resolve(&self.game, declarations, &mut rolls)
        };

        attempt().or_else(|fault| {
            warn!(
                game_id = %self.game.id,
                round = self.game.round,
                error = %fault,
                "Resolution fault, retrying round"
            );
            attempt()
        })
    }

    fn publish(&mut self, resolution: Resolution) {
        self.game = resolution.game.clone();
        self.deps.store.put_snapshot(self.game.clone());

        match self.builder.round_resolved(&resolution) {
            Ok(Some(msg)) => {
                let _ = self.events_tx.send(msg);
            }
            Ok(None) => {}
            Err(e) => error!(game_id = %self.game.id, error = %e, "Failed to build round broadcast"),
        }
        self.checkpoint();

        info!(
            game_id = %self.game.id,
            round = resolution.round,
            outcomes = resolution.results.len(),
            "Round published"
        );

        if self.game.is_finished() {
            self.finish();
        } else {
            self.open_round();
        }
    }

    fn checkpoint(&self) {
        let every = self.deps.settings.checkpoint_every_rounds;
        if every == 0 || self.game.round % every != 0 || self.game.is_finished() {
            return;
        }
        match CheckpointRecord::from_game(&self.game) {
            Ok(record) => self.archive.submit(ArchiveJob::Checkpoint(record)),
            Err(e) => warn!(game_id = %self.game.id, round = self.game.round, error = %e, "Checkpoint failed"),
        }
    }

    /// Repeated fault: end the game as errored and keep the cause
    fn fail(&mut self, fault: ResolutionFault) {
        error!(
            game_id = %self.game.id,
            round = self.game.round,
            error = %fault,
            "Resolution fault repeated, ending game"
        );
        self.game.phase = GamePhase::Finished;
        self.game.status = GameStatus::Errored;
        self.game.winner = None;
        self.game.failure = Some(fault.to_string());
        self.deps.store.put_snapshot(self.game.clone());
        self.finish();
    }

    fn finish(&mut self) {
        self.barrier = None;
        match GameRecord::from_game(&self.game) {
            Ok(record) => self.archive.submit(ArchiveJob::Finish(record)),
            Err(e) => error!(game_id = %self.game.id, error = %e, "Failed to encode game record"),
        }

        info!(
            game_id = %self.game.id,
            winner = ?self.game.winner,
            status = ?self.game.status,
            rounds = self.game.round,
            "Game over"
        );
        let _ = self.events_tx.send(self.builder.game_over(&self.game));
    }

    fn current_snapshot(&self) -> Game {
        self.deps
            .store
            .snapshot(self.game.id)
            .unwrap_or_else(|| self.game.clone())
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn unresponsive_actor_answers_try_again() {
        // Commands queue up but nothing ever reads them
        let (cmd_tx, _cmd_rx) = mpsc::channel(4);
        let (events_tx, _) = broadcast::channel(4);
        let handle = GameHandle {
            id: Uuid::new_v4(),
            mode: GameMode::Duel,
            cmd_tx,
            events_tx,
            participant_count: Arc::new(AtomicUsize::new(0)),
        };

        let err = handle.join("ana".into()).await.unwrap_err();
        assert_eq!(err, GameError::Unavailable);
        assert_eq!(err.code(), "unavailable");
    }

    #[tokio::test]
    async fn stopped_actor_is_not_found() {
        let (cmd_tx, cmd_rx) = mpsc::channel(4);
        drop(cmd_rx);
        let (events_tx, _) = broadcast::channel(4);
        let handle = GameHandle {
            id: Uuid::new_v4(),
            mode: GameMode::Duel,
            cmd_tx,
            events_tx,
            participant_count: Arc::new(AtomicUsize::new(0)),
        };

        let err = handle.join("ana".into()).await.unwrap_err();
        assert_eq!(err.code(), "not_found");
    }
}
