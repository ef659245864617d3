//! Per-round declarations submitted by participants

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::area::Area;

/// Movement half of a declaration. On the wire: `"stay"`, `"recall"` or an area id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Movement {
    #[default]
    Stay,
    Recall,
    #[serde(untagged)]
    To(Area),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    Attack {
        target: Uuid,
    },
    Farm,
    Skill {
        index: usize,
        #[serde(default)]
        target: Option<Uuid>,
    },
    /// Direct structure damage, independent of combat rolls
    Siege {
        structure: Uuid,
    },
    Buy {
        item: String,
    },
    Wait,
}

/// Action category used by role eligibility tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Attack,
    Farm,
    Skill,
    Siege,
    Buy,
    Wait,
}

impl ActionKind {
    pub const ALL: [ActionKind; 6] = [
        ActionKind::Attack,
        ActionKind::Farm,
        ActionKind::Skill,
        ActionKind::Siege,
        ActionKind::Buy,
        ActionKind::Wait,
    ];
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Attack { .. } => ActionKind::Attack,
            Action::Farm => ActionKind::Farm,
            Action::Skill { .. } => ActionKind::Skill,
            Action::Siege { .. } => ActionKind::Siege,
            Action::Buy { .. } => ActionKind::Buy,
            Action::Wait => ActionKind::Wait,
        }
    }
}

/// One character's choice for one round. Immutable once the barrier closes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Declaration {
    pub character_id: Uuid,
    pub movement: Movement,
    pub action: Action,
    /// Acceptance order within the round
    pub seq: u64,
    /// Filled in by the server at the deadline or by the AI policy
    pub defaulted: bool,
}

impl Declaration {
    /// Stay and wait, used for participants silent at the deadline
    pub fn idle(character_id: Uuid, seq: u64) -> Self {
        Self {
            character_id,
            movement: Movement::Stay,
            action: Action::Wait,
            seq,
            defaulted: true,
        }
    }
}
