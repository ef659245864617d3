//! Application state shared across routes

use std::sync::Arc;

use crate::config::{BalanceConfig, Config};
use crate::game::{DecisionPolicy, FarmingPolicy, GameService, SessionSettings};
use crate::store::{EphemeralStore, MatchArchive};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<EphemeralStore>,
    pub games: GameService,
}

impl AppState {
    pub fn new(
        config: Config,
        balance: BalanceConfig,
        store: Arc<EphemeralStore>,
        archive: Arc<dyn MatchArchive>,
    ) -> Self {
        let config = Arc::new(config);

        let settings = SessionSettings {
            round_deadline: config.round_deadline,
            checkpoint_every_rounds: config.checkpoint_every_rounds,
        };
        let policy: Arc<dyn DecisionPolicy> = Arc::new(FarmingPolicy::default());

        let games = GameService::new(store.clone(), archive, Arc::new(balance), policy, settings);

        Self { config, store, games }
    }
}
