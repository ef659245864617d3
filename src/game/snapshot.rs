//! Snapshot hashing and round broadcast building

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::ws::protocol::ServerMsg;

use super::model::Game;
use super::round::Resolution;

/// Hex SHA-256 of the serialized snapshot
pub fn state_hash(game: &Game) -> Result<String, serde_json::Error> {
    let bytes = serde_json::to_vec(game)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

/// Builds round broadcasts for one game, at most once per round
pub struct SnapshotBuilder {
    game_id: Uuid,
    last_round: Option<u32>,
}

impl SnapshotBuilder {
    pub fn new(game_id: Uuid) -> Self {
        Self {
            game_id,
            last_round: None,
        }
    }

    /// `round_resolved` for a resolution, `None` if that round was already published
    pub fn round_resolved(&mut self, resolution: &Resolution) -> Result<Option<ServerMsg>, serde_json::Error> {
        if self.last_round.is_some_and(|round| round >= resolution.round) {
            return Ok(None);
        }
        let state_hash = state_hash(&resolution.game)?;
        self.last_round = Some(resolution.round);

        Ok(Some(ServerMsg::RoundResolved {
            game_id: self.game_id,
            round: resolution.round,
            phase: resolution.game.phase,
            state_hash,
            results: resolution.results.clone(),
            snapshot: resolution.game.clone(),
        }))
    }

    pub fn progress(&self, round: u32, current: usize, total: usize) -> ServerMsg {
        ServerMsg::Progress {
            game_id: self.game_id,
            round,
            current,
            total,
        }
    }

    pub fn game_over(&self, game: &Game) -> ServerMsg {
        ServerMsg::GameOver {
            game_id: self.game_id,
            winner: game.winner,
            status: game.status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BalanceConfig;
    use crate::game::model::GameMode;

    fn resolution(round: u32) -> Resolution {
        let game = Game::new(Uuid::new_v4(), GameMode::Duel, 1, &BalanceConfig::default());
        Resolution {
            round,
            game,
            results: Vec::new(),
        }
    }

    #[test]
    fn hash_tracks_content() {
        let res = resolution(0);
        let mut other = res.game.clone();
        assert_eq!(state_hash(&res.game).unwrap(), state_hash(&other).unwrap());

        other.round += 1;
        assert_ne!(state_hash(&res.game).unwrap(), state_hash(&other).unwrap());
        assert_eq!(state_hash(&other).unwrap().len(), 64);
    }

    #[test]
    fn each_round_is_published_once() {
        let first = resolution(0);
        let mut builder = SnapshotBuilder::new(first.game.id);

        assert!(builder.round_resolved(&first).unwrap().is_some());
        assert!(builder.round_resolved(&first).unwrap().is_none());
        assert!(builder.round_resolved(&resolution(1)).unwrap().is_some());
    }
}
