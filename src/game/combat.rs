//! Combat system - matchups, farming, siege, skills and progression

use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::{BalanceConfig, ItemSpec, SkillEffect, SkillSpec};

use super::area::Area;
use super::model::{Character, StatModifier, Structure};

/// Source of the random components of a resolution
pub trait RollSource {
    /// Uniform integer in `min..=max`
    fn roll(&mut self, min: i32, max: i32) -> i32;
}

/// Reproducible rolls keyed by game seed and round
pub struct SeededRolls {
    rng: ChaCha8Rng,
}

impl SeededRolls {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Same game seed and round always yield the same sequence, so a retried
    /// round replays identical rolls.
    pub fn for_round(game_seed: u64, round: u32) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"round-rolls");
        hasher.update(game_seed.to_le_bytes());
        hasher.update(round.to_le_bytes());
        let digest = hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        Self::new(u64::from_le_bytes(bytes))
    }
}

impl RollSource for SeededRolls {
    fn roll(&mut self, min: i32, max: i32) -> i32 {
        if min >= max {
            return min;
        }
        self.rng.gen_range(min..=max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Attack,
    Farm,
    Skill,
    Siege,
    Purchase,
    Recall,
    Respawn,
}

/// One entry of a round result, for client display. The snapshot is authoritative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub kind: OutcomeKind,
    pub actor: Uuid,
    pub target: Option<Uuid>,
    pub success: bool,
    pub damage: u32,
    pub healed: u32,
    pub currency_delta: u32,
    pub experience_delta: u32,
    pub levels_gained: u32,
    pub killed: bool,
    pub critical: bool,
    /// Why an effect did not apply
    pub note: Option<String>,
}

impl Outcome {
    pub fn new(kind: OutcomeKind, actor: Uuid, target: Option<Uuid>) -> Self {
        Self {
            kind,
            actor,
            target,
            success: false,
            damage: 0,
            healed: 0,
            currency_delta: 0,
            experience_delta: 0,
            levels_gained: 0,
            killed: false,
            critical: false,
            note: None,
        }
    }

    pub fn skipped(kind: OutcomeKind, actor: Uuid, target: Option<Uuid>, note: &str) -> Self {
        Self {
            note: Some(note.to_string()),
            ..Self::new(kind, actor, target)
        }
    }
}

/// Pure outcome computation for single matchups. Holds no state besides the balance table.
#[derive(Clone)]
pub struct CombatResolver {
    config: Arc<BalanceConfig>,
}

impl CombatResolver {
    pub fn new(config: Arc<BalanceConfig>) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BalanceConfig {
        &self.config
    }

    /// Attack roll against defense roll; damage only when the attack total is strictly higher
    pub fn attack(
        &self,
        attacker: &mut Character,
        defender: &mut Character,
        rolls: &mut dyn RollSource,
    ) -> Outcome {
        let cfg = &*self.config;
        let mut outcome = Outcome::new(OutcomeKind::Attack, attacker.id, Some(defender.id));

        let attack_roll = rolls.roll(cfg.roll_min, cfg.roll_max);
        let defense_roll = rolls.roll(cfg.roll_min, cfg.roll_max);
        let attack_total = attacker.effective_stats().attack + attack_roll;
        let defense_total = defender.effective_stats().defense + defense_roll;

        if attack_total <= defense_total {
            outcome.note = Some("blocked".to_string());
            return outcome;
        }

        let base = rolls
            .roll(cfg.damage_min as i32, cfg.damage_max as i32)
            .max(0) as u32;
        let critical = attack_roll >= cfg.critical_threshold;
        let damage = if critical { base * 2 } else { base } + attacker.gear.damage;

        outcome.success = true;
        outcome.critical = critical;
        outcome.damage = damage;
        outcome.killed = defender.take_damage(damage);
        if outcome.killed {
            self.award_kill(attacker, &mut outcome);
        }
        outcome
    }

    /// Targetless income action
    pub fn farm(&self, actor: &mut Character) -> Outcome {
        let mut outcome = Outcome::new(OutcomeKind::Farm, actor.id, None);
        actor.currency += self.config.farm_currency;
        outcome.success = true;
        outcome.currency_delta = self.config.farm_currency;
        outcome.experience_delta = self.config.farm_experience;
        outcome.levels_gained = self.grant_experience(actor, self.config.farm_experience);
        outcome
    }

    /// Direct structure damage, no rolls involved
    pub fn siege(&self, actor: &mut Character, structure: &mut Structure) -> Outcome {
        let mut outcome = Outcome::new(OutcomeKind::Siege, actor.id, Some(structure.id));
        let damage = self.config.siege_damage.min(structure.current_hp);
        let destroyed = structure.damage(self.config.siege_damage);
        outcome.success = true;
        outcome.damage = damage;
        outcome.killed = destroyed;
        if destroyed {
            actor.currency += self.config.structure_bounty;
            outcome.currency_delta = self.config.structure_bounty;
            outcome.experience_delta = self.config.structure_experience;
            outcome.levels_gained = self.grant_experience(actor, self.config.structure_experience);
        }
        outcome
    }

    /// Apply a role skill. `target` is `None` when the caster targets itself.
    pub fn skill(
        &self,
        caster: &mut Character,
        target: Option<&mut Character>,
        spec: &SkillSpec,
    ) -> Outcome {
        let utility = caster.effective_stats().utility.max(0) as u32;
        let caster_id = caster.id;
        let target_id = target.as_ref().map(|t| t.id);
        let mut outcome = Outcome::new(OutcomeKind::Skill, caster_id, target_id);
        outcome.success = true;

        match (&spec.effect, target) {
            (SkillEffect::Heal { amount }, Some(ally)) => {
                outcome.healed = ally.heal(amount + utility);
            }
            (SkillEffect::Heal { amount }, None) => {
                outcome.healed = caster.heal(amount + utility);
            }
            (SkillEffect::Buff { stat, amount, rounds }, target) => {
                let modifier = StatModifier {
                    stat: *stat,
                    amount: *amount,
                    rounds_remaining: *rounds,
                    source: caster_id,
                };
                match target {
                    Some(ally) => ally.modifiers.push(modifier),
                    None => caster.modifiers.push(modifier),
                }
            }
            (SkillEffect::Debuff { stat, amount, rounds }, Some(enemy)) => {
                enemy.modifiers.push(StatModifier {
                    stat: *stat,
                    amount: -*amount,
                    rounds_remaining: *rounds,
                    source: caster_id,
                });
            }
            (SkillEffect::Strike { damage }, Some(enemy)) => {
                let damage = damage + utility;
                outcome.damage = damage;
                outcome.killed = enemy.take_damage(damage);
                if outcome.killed {
                    self.award_kill(caster, &mut outcome);
                }
            }
            (SkillEffect::Debuff { .. } | SkillEffect::Strike { .. }, None) => {
                outcome.success = false;
                outcome.note = Some("no_target".to_string());
            }
        }
        outcome
    }

    pub fn buy(&self, actor: &mut Character, item: &ItemSpec) -> Outcome {
        let mut outcome = Outcome::new(OutcomeKind::Purchase, actor.id, None);
        if actor.position != Area::base_of(actor.team) {
            outcome.note = Some("not_in_base".to_string());
            return outcome;
        }
        if actor.currency < item.cost {
            outcome.note = Some("insufficient_currency".to_string());
            return outcome;
        }
        actor.currency -= item.cost;
        actor.equip(item);
        outcome.success = true;
        outcome
    }

    /// Undisturbed recall: full HP in the team base
    pub fn complete_recall(&self, character: &mut Character) -> Outcome {
        let mut outcome = Outcome::new(OutcomeKind::Recall, character.id, None);
        character.recall_origin = None;
        character.position = Area::base_of(character.team);
        outcome.healed = character.heal(character.max_hp);
        outcome.success = true;
        outcome
    }

    /// Add experience and apply every level crossed, returns levels gained
    pub fn grant_experience(&self, character: &mut Character, amount: u32) -> u32 {
        character.experience += amount;
        let growth = self.config.role(character.role).map(|p| p.growth);
        let mut gained = 0;

        while let Some(needed) = self.config.experience_to_advance(character.level) {
            if character.experience < needed {
                break;
            }
            character.experience -= needed;
            character.level += 1;
            gained += 1;
            if let Some(growth) = growth {
                character.base_stats = character.base_stats.plus(&growth.stats);
                character.raise_max_hp(growth.max_hp);
            }
        }
        gained
    }

    fn award_kill(&self, killer: &mut Character, outcome: &mut Outcome) {
        killer.kills += 1;
        killer.currency += self.config.kill_currency;
        outcome.currency_delta = self.config.kill_currency;
        outcome.experience_delta = self.config.kill_experience;
        outcome.levels_gained = self.grant_experience(killer, self.config.kill_experience);
    }
}

#[cfg(test)]
pub mod testing {
    use std::collections::VecDeque;

    use super::RollSource;

    /// Always the midpoint of the requested range
    pub struct MidpointRolls;

    impl RollSource for MidpointRolls {
        fn roll(&mut self, min: i32, max: i32) -> i32 {
            min + (max - min) / 2
        }
    }

    /// Replays a fixed script, clamped to the requested range; midpoint once exhausted
    pub struct ScriptedRolls(pub VecDeque<i32>);

    impl ScriptedRolls {
        pub fn new(values: &[i32]) -> Self {
            Self(values.iter().copied().collect())
        }
    }

    impl RollSource for ScriptedRolls {
        fn roll(&mut self, min: i32, max: i32) -> i32 {
            match self.0.pop_front() {
                Some(v) => v.clamp(min, max),
                None => min + (max - min) / 2,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{MidpointRolls, ScriptedRolls};
    use super::*;
    use crate::game::model::{Controller, Role, Stats, Team};

    fn resolver() -> CombatResolver {
        CombatResolver::new(Arc::new(BalanceConfig::default()))
    }

    fn fighter(team: Team, role: Role) -> Character {
        let config = BalanceConfig::default();
        Character::new(Controller::Ai, format!("{role:?}"), team, config.role(role).unwrap())
    }

    #[test]
    fn midpoint_attack_beats_weaker_defense() {
        let combat = resolver();
        let cfg = combat.config().clone();
        let mut attacker = fighter(Team::A, Role::Fighter);
        let mut defender = fighter(Team::B, Role::Mage);
        attacker.base_stats = Stats::new(10, 0, 0, 0);
        defender.base_stats = Stats::new(0, 5, 0, 0);
        let hp_before = defender.current_hp;

        let outcome = combat.attack(&mut attacker, &mut defender, &mut MidpointRolls);

        assert!(outcome.success);
        assert!(!outcome.critical);
        assert!(outcome.damage >= cfg.damage_min && outcome.damage <= cfg.damage_max);
        assert_eq!(defender.current_hp, hp_before - outcome.damage);
    }

    #[test]
    fn equal_totals_are_blocked() {
        let combat = resolver();
        let mut attacker = fighter(Team::A, Role::Fighter);
        let mut defender = fighter(Team::B, Role::Tank);
        attacker.base_stats = Stats::new(5, 0, 0, 0);
        defender.base_stats = Stats::new(0, 5, 0, 0);
        let hp_before = defender.current_hp;

        let outcome = combat.attack(&mut attacker, &mut defender, &mut MidpointRolls);

        assert!(!outcome.success);
        assert_eq!(defender.current_hp, hp_before);
    }

    #[test]
    fn critical_roll_doubles_damage() {
        let combat = resolver();
        let mut attacker = fighter(Team::A, Role::Marksman);
        let mut defender = fighter(Team::B, Role::Tank);
        // attack roll, defense roll, damage roll
        let mut rolls = ScriptedRolls::new(&[20, 1, 10]);

        let outcome = combat.attack(&mut attacker, &mut defender, &mut rolls);

        assert!(outcome.critical);
        assert_eq!(outcome.damage, 20);
    }

    #[test]
    fn item_damage_bonus_applies() {
        let combat = resolver();
        let mut attacker = fighter(Team::A, Role::Marksman);
        let mut defender = fighter(Team::B, Role::Mage);
        attacker.gear.damage = 5;
        let mut rolls = ScriptedRolls::new(&[15, 1, 9]);

        let outcome = combat.attack(&mut attacker, &mut defender, &mut rolls);

        assert_eq!(outcome.damage, 14);
    }

    #[test]
    fn kill_awards_attacker() {
        let combat = resolver();
        let cfg = combat.config().clone();
        let mut attacker = fighter(Team::A, Role::Marksman);
        let mut defender = fighter(Team::B, Role::Mage);
        defender.current_hp = 3;

        let outcome = combat.attack(&mut attacker, &mut defender, &mut ScriptedRolls::new(&[15, 1, 9]));

        assert!(outcome.killed);
        assert!(!defender.is_alive);
        assert_eq!(defender.current_hp, 0);
        assert_eq!(attacker.currency, cfg.kill_currency);
        assert_eq!(attacker.kills, 1);
        assert_eq!(attacker.level, 2);
    }

    #[test]
    fn farm_grants_exact_reward_only() {
        let combat = resolver();
        let cfg = combat.config().clone();
        let mut actor = fighter(Team::A, Role::Support);
        let (hp, position) = (actor.current_hp, actor.position);

        let outcome = combat.farm(&mut actor);

        assert!(outcome.success);
        assert_eq!(actor.currency, cfg.farm_currency);
        assert_eq!(actor.experience, cfg.farm_experience);
        assert_eq!(actor.current_hp, hp);
        assert_eq!(actor.position, position);
    }

    #[test]
    fn exact_threshold_levels_up_and_keeps_missing_hp() {
        let combat = resolver();
        let cfg = combat.config().clone();
        let mut actor = fighter(Team::A, Role::Tank);
        actor.take_damage(50);
        let (hp, max) = (actor.current_hp, actor.max_hp);
        let growth = cfg.role(Role::Tank).unwrap().growth;
        let needed = cfg.experience_to_advance(1).unwrap();

        let gained = combat.grant_experience(&mut actor, needed);

        assert_eq!(gained, 1);
        assert_eq!(actor.level, 2);
        assert_eq!(actor.experience, 0);
        assert_eq!(actor.max_hp, max + growth.max_hp);
        assert_eq!(actor.current_hp, hp + growth.max_hp);
        assert_eq!(actor.base_stats.defense, cfg.role(Role::Tank).unwrap().stats.defense + growth.stats.defense);
    }

    #[test]
    fn one_below_threshold_does_not_level() {
        let combat = resolver();
        let mut actor = fighter(Team::A, Role::Tank);
        let needed = combat.config().experience_to_advance(1).unwrap();
        assert_eq!(combat.grant_experience(&mut actor, needed - 1), 0);
        assert_eq!(actor.level, 1);
    }

    #[test]
    fn siege_ignores_rolls_and_pays_bounty_on_destroy() {
        let combat = resolver();
        let cfg = combat.config().clone();
        let mut actor = fighter(Team::A, Role::Fighter);
        let mut tower = Structure::new(
            Team::B,
            crate::game::model::StructureKind::Tower,
            Area::MidLane,
            cfg.siege_damage,
        );

        let outcome = combat.siege(&mut actor, &mut tower);

        assert!(outcome.killed);
        assert!(tower.destroyed);
        assert_eq!(actor.currency, cfg.structure_bounty);
    }

    #[test]
    fn heal_never_exceeds_max() {
        let combat = resolver();
        let cfg = combat.config().clone();
        let mut support = fighter(Team::A, Role::Support);
        let mut ally = fighter(Team::A, Role::Tank);
        ally.take_damage(5);
        let mend = cfg.role(Role::Support).unwrap().skills[0].clone();

        let outcome = combat.skill(&mut support, Some(&mut ally), &mend);

        assert_eq!(outcome.healed, 5);
        assert_eq!(ally.current_hp, ally.max_hp);
    }

    #[test]
    fn purchase_requires_base_and_currency() {
        let combat = resolver();
        let cfg = combat.config().clone();
        let belt = cfg.item("giants_belt").unwrap().clone();
        let mut actor = fighter(Team::A, Role::Tank);

        assert_eq!(combat.buy(&mut actor, &belt).note.as_deref(), Some("insufficient_currency"));

        actor.currency = belt.cost;
        actor.position = Area::MidLane;
        assert_eq!(combat.buy(&mut actor, &belt).note.as_deref(), Some("not_in_base"));

        actor.position = Area::BaseA;
        let max = actor.max_hp;
        assert!(combat.buy(&mut actor, &belt).success);
        assert_eq!(actor.currency, 0);
        assert_eq!(actor.max_hp, max + belt.max_hp);
        assert_eq!(actor.current_hp, actor.max_hp);
    }

    #[test]
    fn seeded_rolls_are_reproducible_per_round() {
        let mut a = SeededRolls::for_round(99, 4);
        let mut b = SeededRolls::for_round(99, 4);
        let mut c = SeededRolls::for_round(99, 5);
        let seq_a: Vec<i32> = (0..16).map(|_| a.roll(1, 20)).collect();
        let seq_b: Vec<i32> = (0..16).map(|_| b.roll(1, 20)).collect();
        let seq_c: Vec<i32> = (0..16).map(|_| c.roll(1, 20)).collect();
        assert_eq!(seq_a, seq_b);
        assert_ne!(seq_a, seq_c);
        assert!(seq_a.iter().all(|v| (1..=20).contains(v)));
    }
}
