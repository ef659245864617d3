//! Decision interface for AI-controlled slots

use crate::config::BalanceConfig;

use super::area::Area;
use super::declaration::{Action, Movement};
use super::model::{Character, Game, Role, StructureKind};

/// Chooses a declaration for an AI character when the barrier closes.
/// Must be deterministic for a given snapshot.
pub trait DecisionPolicy: Send + Sync {
    fn decide(&self, game: &Game, character: &Character, config: &BalanceConfig) -> (Movement, Action);
}

/// Farm when healthy, recall when low, fight whatever shares the area
#[derive(Debug, Clone)]
pub struct FarmingPolicy {
    /// HP fraction under which the character heads home
    pub recall_below: f32,
}

impl Default for FarmingPolicy {
    fn default() -> Self {
        Self { recall_below: 0.35 }
    }
}

impl FarmingPolicy {
    fn home_lane(role: Role) -> Area {
        match role {
            Role::Tank | Role::Support => Area::BotLane,
            Role::Fighter => Area::TopLane,
            Role::Mage | Role::Marksman => Area::MidLane,
        }
    }
}

impl DecisionPolicy for FarmingPolicy {
    fn decide(&self, game: &Game, character: &Character, config: &BalanceConfig) -> (Movement, Action) {
        let allowed = |action: Action| match config.role(character.role) {
            Some(profile) if profile.allows(action.kind()) => action,
            _ => Action::Wait,
        };

        let base = Area::base_of(character.team);
        let hp_fraction = character.current_hp as f32 / character.max_hp.max(1) as f32;

        if character.position != base && hp_fraction < self.recall_below {
            return (Movement::Recall, Action::Wait);
        }
        if character.position == base {
            return (Movement::To(Self::home_lane(character.role)), Action::Wait);
        }

        // Weakest enemy in the same area, ties by id
        let target = game
            .characters
            .iter()
            .filter(|c| c.is_alive && c.team != character.team && c.position == character.position)
            .min_by_key(|c| (c.current_hp, c.id));
        if let Some(target) = target {
            return (Movement::Stay, allowed(Action::Attack { target: target.id }));
        }

        let tower = game.structures.iter().find(|s| {
            s.team != character.team
                && !s.destroyed
                && s.area == character.position
                && s.kind == StructureKind::Tower
        });
        if let Some(tower) = tower {
            return (Movement::Stay, allowed(Action::Siege { structure: tower.id }));
        }

        (Movement::Stay, allowed(Action::Farm))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::model::{Controller, GameMode, GameStatus};
    use uuid::Uuid;

    fn duel() -> (Game, BalanceConfig) {
        let config = BalanceConfig::default();
        let mut game = Game::new(Uuid::new_v4(), GameMode::Duel, 9, &config);
        game.add_character(Controller::Ai, "a".into(), &config);
        game.add_character(Controller::Ai, "b".into(), &config);
        game.status = GameStatus::InProgress;
        (game, config)
    }

    #[test]
    fn leaves_base_for_a_lane() {
        let (game, config) = duel();
        let me = &game.characters[0];
        let (movement, action) = FarmingPolicy::default().decide(&game, me, &config);
        assert_eq!(movement, Movement::To(Area::BotLane));
        assert_eq!(action, Action::Wait);
    }

    #[test]
    fn recalls_when_low() {
        let (mut game, config) = duel();
        let me = &mut game.characters[0];
        me.position = Area::JungleA;
        me.current_hp = 10;
        let me = game.characters[0].clone();
        let (movement, _) = FarmingPolicy::default().decide(&game, &me, &config);
        assert_eq!(movement, Movement::Recall);
    }

    #[test]
    fn attacks_enemy_in_same_area_before_farming() {
        let (mut game, config) = duel();
        game.characters[0].position = Area::JungleA;
        game.characters[1].position = Area::JungleA;
        let enemy = game.characters[1].id;
        let me = game.characters[0].clone();

        let (_, action) = FarmingPolicy::default().decide(&game, &me, &config);
        assert_eq!(action, Action::Attack { target: enemy });

        game.characters[1].position = Area::JungleB;
        let (_, action) = FarmingPolicy::default().decide(&game, &me, &config);
        assert_eq!(action, Action::Farm);
    }

    #[test]
    fn sieges_enemy_tower_in_lane() {
        let (mut game, config) = duel();
        game.characters[0].position = Area::TopLane;
        let me = game.characters[0].clone();
        let (_, action) = FarmingPolicy::default().decide(&game, &me, &config);
        assert!(matches!(action, Action::Siege { .. }));
    }
}
