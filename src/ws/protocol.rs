//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::combat::Outcome;
use crate::game::declaration::{Action, Movement};
use crate::game::model::{Game, GameMode, GamePhase, GameStatus, Team};

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Open a new lobby
    CreateGame {
        mode: GameMode,
        /// Slots pre-filled with AI characters
        #[serde(default)]
        bots: usize,
    },

    /// Take a slot, or reclaim one held under the same name
    JoinGame {
        game_id: Uuid,
        participant_name: String,
    },

    /// Movement and action for the current round
    Declare {
        game_id: Uuid,
        character_id: Uuid,
        #[serde(default)]
        movement: Movement,
        action: Action,
    },

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Sent on connection
    Welcome {
        connection_id: Uuid,
        server_time: u64,
    },

    GameCreated {
        game_id: Uuid,
        mode: GameMode,
    },

    /// Reply to join_game, with the snapshot to resume from
    Joined {
        game_id: Uuid,
        character_id: Uuid,
        participant_id: Uuid,
        reconnected: bool,
        snapshot: Game,
    },

    /// Broadcast when the lobby fills and round 0 opens
    GameStarted {
        game_id: Uuid,
        round: u32,
        /// Milliseconds until the round deadline
        deadline_ms: u64,
        snapshot: Game,
    },

    DeclarationAccepted {
        game_id: Uuid,
        round: u32,
        character_id: Uuid,
    },

    DeclarationRejected {
        game_id: Uuid,
        character_id: Uuid,
        code: String,
        reason: String,
    },

    /// Exactly once per completed round
    RoundResolved {
        game_id: Uuid,
        /// Round the results belong to
        round: u32,
        phase: GamePhase,
        /// Hex SHA-256 of the serialized snapshot
        state_hash: String,
        results: Vec<Outcome>,
        snapshot: Game,
    },

    /// Advisory count of declarations received this round
    Progress {
        game_id: Uuid,
        round: u32,
        current: usize,
        total: usize,
    },

    GameOver {
        game_id: Uuid,
        winner: Option<Team>,
        status: GameStatus,
    },

    /// Malformed or out-of-phase request
    Error {
        code: String,
        message: String,
    },

    /// Pong response
    Pong {
        /// Echo client timestamp
        t: u64,
        /// Server timestamp
        server_time: u64,
    },
}
