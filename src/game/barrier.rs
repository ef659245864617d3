//! Per-round declaration collector
//!
//! Owned by the game's actor task, so acceptance and closing never race.
//! `close` hands out the declaration set at most once per round.

use std::sync::Arc;

use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use crate::config::BalanceConfig;
use crate::store::EphemeralStore;

use super::ai::DecisionPolicy;
use super::declaration::{Action, Declaration, Movement};
use super::error::GameError;
use super::model::{Character, Game};

/// Reply to an accepted declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeclareReceipt {
    pub round: u32,
    pub received: usize,
    pub expected: usize,
    pub satisfied: bool,
}

pub struct RoundBarrier {
    store: Arc<EphemeralStore>,
    game_id: Uuid,
    round: u32,
    expected: usize,
    received: usize,
    next_seq: u64,
    deadline: Instant,
    closed: bool,
}

impl RoundBarrier {
    /// Open the barrier for the snapshot's current round. Declarations already
    /// held in the store for that round count toward the total.
    pub fn open(store: Arc<EphemeralStore>, game: &Game, deadline: Instant) -> Self {
        let held = store.declarations(game.id, game.round);
        let next_seq = held.iter().map(|d| d.seq + 1).max().unwrap_or(0);
        Self {
            game_id: game.id,
            round: game.round,
            expected: game.expected_declarants(),
            received: held.len(),
            next_seq,
            deadline,
            closed: false,
            store,
        }
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn received(&self) -> usize {
        self.received
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn is_satisfied(&self) -> bool {
        !self.closed && self.received >= self.expected
    }

    /// Validate and record one declaration. `received_at` is when the request
    /// reached the server; a declaration stamped at the deadline still counts.
    #[allow(clippy::too_many_arguments)]
    pub fn declare(
        &mut self,
        game: &Game,
        config: &BalanceConfig,
        participant_id: Uuid,
        character_id: Uuid,
        movement: Movement,
        action: Action,
        received_at: Instant,
    ) -> Result<DeclareReceipt, GameError> {
        if game.is_finished() {
            return Err(GameError::Phase("game is finished".into()));
        }
        if self.closed || !game.accepts_declarations() || game.round != self.round {
            return Err(GameError::Phase("round is not accepting declarations".into()));
        }
        if received_at > self.deadline {
            return Err(GameError::Phase("round deadline has passed".into()));
        }

        let character = game
            .character(character_id)
            .ok_or_else(|| GameError::NotFound(format!("character {character_id}")))?;
        if character.participant_id() != Some(participant_id) {
            return Err(GameError::Validation("character is not controlled by this participant".into()));
        }
        if !character.is_alive {
            return Err(GameError::Validation("character is not alive".into()));
        }
        if self.store.has_declared(self.game_id, self.round, character_id) {
            return Err(GameError::Phase("character already declared this round".into()));
        }

        validate(game, config, character, movement, &action)?;

        let declaration = Declaration {
            character_id,
            movement,
            action,
            seq: self.next_seq,
            defaulted: false,
        };
        self.store
            .record_declaration(self.game_id, self.round, declaration)
            .ok_or_else(|| GameError::Phase("character already declared this round".into()))?;

        self.next_seq += 1;
        self.received += 1;

        debug!(
            game_id = %self.game_id,
            round = self.round,
            character_id = %character_id,
            received = self.received,
            expected = self.expected,
            "Declaration accepted"
        );

        Ok(DeclareReceipt {
            round: self.round,
            received: self.received,
            expected: self.expected,
            satisfied: self.received >= self.expected,
        })
    }

    /// Close the round and return its full declaration set: accepted ones,
    /// idle defaults for silent participants, and policy choices for AI slots.
    /// Returns `None` once the round has already been closed.
    pub fn close(
        &mut self,
        game: &Game,
        config: &BalanceConfig,
        policy: &dyn DecisionPolicy,
    ) -> Option<Vec<Declaration>> {
        if self.closed {
            return None;
        }
        self.closed = true;

        let mut declarations = self.store.take_declarations(self.game_id, self.round);
        let mut defaulted = 0usize;

        for character in game.characters.iter().filter(|c| c.is_alive) {
            if declarations.iter().any(|d| d.character_id == character.id) {
                continue;
            }
            let declaration = if character.is_ai() {
                let (movement, action) = policy.decide(game, character, config);
                Declaration {
                    character_id: character.id,
                    movement,
                    action,
                    seq: self.next_seq,
                    defaulted: true,
                }
            } else {
                defaulted += 1;
                Declaration::idle(character.id, self.next_seq)
            };
            self.next_seq += 1;
            declarations.push(declaration);
        }

        debug!(
            game_id = %self.game_id,
            round = self.round,
            total = declarations.len(),
            defaulted,
            "Round barrier closed"
        );
        Some(declarations)
    }
}

fn validate(
    game: &Game,
    config: &BalanceConfig,
    character: &Character,
    movement: Movement,
    action: &Action,
) -> Result<(), GameError> {
    let invalid = |reason: &str| Err(GameError::Validation(reason.to_string()));

    if let Movement::To(area) = movement {
        if area != character.position && !character.position.is_adjacent(area) {
            return invalid("destination is not adjacent");
        }
    }

    let Some(profile) = config.role(character.role) else {
        return invalid("unknown role");
    };
    if !profile.allows(action.kind()) {
        return invalid("action not allowed for this role");
    }

    match action {
        Action::Attack { target } => {
            let Some(target) = game.character(*target) else {
                if game.structure(*target).is_some() {
                    return invalid("structures are attacked with siege");
                }
                return invalid("unknown target");
            };
            if target.team == character.team {
                return invalid("target is an ally");
            }
            if !target.is_alive {
                return invalid("target is not alive");
            }
        }
        Action::Skill { index, target } => {
            let Some(skill) = profile.skills.get(*index) else {
                return invalid("unknown skill");
            };
            let target = match target {
                Some(id) if *id != character.id => match game.character(*id) {
                    Some(t) => Some(t),
                    None => return invalid("unknown target"),
                },
                _ => None,
            };
            match (skill.effect.targets_enemy(), target) {
                (true, None) => return invalid("skill needs an enemy target"),
                (true, Some(t)) if t.team == character.team => return invalid("skill needs an enemy target"),
                (false, Some(t)) if t.team != character.team => return invalid("skill needs an allied target"),
                _ => {}
            }
            if target.is_some_and(|t| !t.is_alive) {
                return invalid("target is not alive");
            }
        }
        Action::Siege { structure } => {
            let Some(structure) = game.structure(*structure) else {
                return invalid("unknown structure");
            };
            if structure.team == character.team {
                return invalid("structure is allied");
            }
            if structure.destroyed {
                return invalid("structure is already destroyed");
            }
        }
        Action::Buy { item } => {
            if config.item(item).is_none() {
                return invalid("unknown item");
            }
        }
        Action::Farm | Action::Wait => {}
    }
    Ok(())
}
