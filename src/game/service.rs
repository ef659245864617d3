//! Gateway-facing game service: creates games and routes requests to their actors

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::info;
use uuid::Uuid;

use crate::config::BalanceConfig;
use crate::store::{EphemeralStore, MatchArchive};
use crate::ws::protocol::ServerMsg;

use super::ai::DecisionPolicy;
use super::barrier::DeclareReceipt;
use super::declaration::{Action, Movement};
use super::error::GameError;
use super::model::{Controller, Game, GameMode};
use super::session::{GameRegistry, GameSession, JoinTicket, SessionDeps, SessionSettings};

/// Entry point used by the HTTP and WebSocket layers
#[derive(Clone)]
pub struct GameService {
    deps: SessionDeps,
}

impl GameService {
    pub fn new(
        store: Arc<EphemeralStore>,
        archive: Arc<dyn MatchArchive>,
        config: Arc<BalanceConfig>,
        policy: Arc<dyn DecisionPolicy>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            deps: SessionDeps {
                store,
                archive,
                registry: Arc::new(GameRegistry::new()),
                config,
                policy,
                settings,
            },
        }
    }

    pub fn registry(&self) -> &GameRegistry {
        &self.deps.registry
    }

    /// Open a lobby with up to `bots` AI slots; at least one slot stays free for a participant
    pub fn create_game(&self, mode: GameMode, bots: usize) -> Uuid {
        let id = Uuid::new_v4();
        let seed = rand::random::<u64>();
        let mut game = Game::new(id, mode, seed, &self.deps.config);

        let bots = bots.min(game.total_slots().saturating_sub(1));
        for n in 0..bots {
            game.add_character(Controller::Ai, format!("bot-{}", n + 1), &self.deps.config);
        }

        let (session, handle) = GameSession::new(game, self.deps.clone());
        self.deps.registry.insert(handle);
        tokio::spawn(session.run());

        info!(game_id = %id, mode = ?mode, bots, "Created game");
        id
    }

    pub async fn join_game(&self, game_id: Uuid, participant_name: String) -> Result<JoinTicket, GameError> {
        let Some(handle) = self.deps.registry.get(&game_id) else {
            return Err(self.missing(game_id, GameError::AlreadyStarted));
        };
        match handle.join(participant_name).await {
            Err(GameError::NotFound(_)) => Err(self.missing(game_id, GameError::AlreadyStarted)),
            other => other,
        }
    }

    pub async fn declare(
        &self,
        game_id: Uuid,
        participant_id: Uuid,
        character_id: Uuid,
        movement: Movement,
        action: Action,
    ) -> Result<DeclareReceipt, GameError> {
        let received_at = Instant::now();
        let finished = || GameError::Phase("game is finished".into());

        let Some(handle) = self.deps.registry.get(&game_id) else {
            return Err(self.missing(game_id, finished()));
        };
        match handle
            .declare(participant_id, character_id, movement, action, received_at)
            .await
        {
            Err(GameError::NotFound(what)) if what.starts_with("game") => {
                Err(self.missing(game_id, finished()))
            }
            other => other,
        }
    }

    /// Current snapshot from the ephemeral store
    pub fn snapshot(&self, game_id: Uuid) -> Result<Game, GameError> {
        self.deps
            .store
            .snapshot(game_id)
            .ok_or_else(|| GameError::NotFound(format!("game {game_id}")))
    }

    pub fn subscribe(&self, game_id: Uuid) -> Result<broadcast::Receiver<ServerMsg>, GameError> {
        self.deps
            .registry
            .get(&game_id)
            .map(|h| h.subscribe())
            .ok_or_else(|| GameError::NotFound(format!("game {game_id}")))
    }

    /// A game without an actor is either over (snapshot still retained) or unknown
    fn missing(&self, game_id: Uuid, when_finished: GameError) -> GameError {
        match self.deps.store.raw_snapshot(game_id) {
            Some(game) if game.is_finished() => when_finished,
            _ => GameError::NotFound(format!("game {game_id}")),
        }
    }
}
