//! Rejection and fault types for the round pipeline

use uuid::Uuid;

use super::area::Area;

/// Reasons a request is refused. None of these mutate state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    /// Malformed declaration, unknown target, illegal move
    #[error("invalid declaration: {0}")]
    Validation(String),

    /// Out-of-phase or duplicate declaration
    #[error("out of phase: {0}")]
    Phase(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("game already started")]
    AlreadyStarted,

    /// Store failure; details are logged, never sent to clients
    #[error("temporarily unavailable, try again")]
    Unavailable,
}

impl GameError {
    /// Stable code sent on the wire
    pub fn code(&self) -> &'static str {
        match self {
            GameError::Validation(_) => "validation",
            GameError::Phase(_) => "phase",
            GameError::NotFound(_) => "not_found",
            GameError::AlreadyStarted => "already_started",
            GameError::Unavailable => "unavailable",
        }
    }
}

/// Invariant violation while resolving a round
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolutionFault {
    #[error("game is not in progress")]
    NotInProgress,

    #[error("declaration for unknown character {0}")]
    UnknownCharacter(Uuid),

    #[error("character {actor} targets missing entity {target}")]
    DanglingTarget { actor: Uuid, target: Uuid },

    #[error("character {0} targets itself")]
    SelfTarget(Uuid),

    #[error("character {character} cannot move from {from:?} to {to:?}")]
    IllegalMove { character: Uuid, from: Area, to: Area },

    #[error("character {character} uses missing skill {index}")]
    UnknownSkill { character: Uuid, index: usize },

    #[error("unknown item {0}")]
    UnknownItem(String),

    #[error("HP invariant broken for character {0}")]
    HpInvariant(Uuid),
}
