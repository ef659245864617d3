//! Round resolution: applies one captured declaration set to a snapshot
//!
//! Stages run across every declaration before the next stage starts:
//! modifiers, movement, matchups, attacks (then recall completion),
//! other actions, respawns, victory. No stage observes effects of a later one.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::config::BalanceConfig;

use super::area::Area;
use super::combat::{CombatResolver, Outcome, OutcomeKind, RollSource};
use super::declaration::{Action, Declaration, Movement};
use super::error::ResolutionFault;
use super::model::{Game, GamePhase, GameStatus, Role, StructureKind, Team};

/// Next snapshot plus the display log of a resolved round
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// Round the declarations belonged to
    pub round: u32,
    pub game: Game,
    pub results: Vec<Outcome>,
}

/// Orchestrates a round over the combat resolver. Cheap to clone; rebuild to retune.
#[derive(Clone)]
pub struct RoundResolver {
    combat: CombatResolver,
}

impl RoundResolver {
    pub fn new(config: Arc<BalanceConfig>) -> Self {
        Self {
            combat: CombatResolver::new(config),
        }
    }

    pub fn config(&self) -> &BalanceConfig {
        self.combat.config()
    }

    /// Resolve a round against a copy of `snapshot`. The snapshot itself is never
    /// touched, so a fault leaves the published state intact.
    pub fn resolve(
        &self,
        snapshot: &Game,
        declarations: &[Declaration],
        rolls: &mut dyn RollSource,
    ) -> Result<Resolution, ResolutionFault> {
        if snapshot.status != GameStatus::InProgress || snapshot.is_finished() {
            return Err(ResolutionFault::NotInProgress);
        }

        let mut game = snapshot.clone();
        let round = game.round;
        let mut results = Vec::new();

        let acting = canonical_order(&game, declarations)?;

        self.tick_modifiers(&mut game);
        self.resolve_movement(&mut game, &acting)?;
        let matchups = determine_matchups(&game, &acting)?;
        let disturbed = self.resolve_attacks(&mut game, &matchups, rolls, &mut results);
        self.finish_recalls(&mut game, &acting, &disturbed, &mut results);
        self.resolve_actions(&mut game, &acting, &mut results)?;
        self.resolve_respawns(&mut game, &mut results);
        self.check_victory(&mut game);
        close_round(&mut game)?;

        debug!(
            game_id = %game.id,
            round,
            outcomes = results.len(),
            phase = ?game.phase,
            "Round resolved"
        );

        Ok(Resolution {
            round,
            game,
            results,
        })
    }

    /// Stage 1: decrement durations, drop expired modifiers
    fn tick_modifiers(&self, game: &mut Game) {
        for character in &mut game.characters {
            for modifier in &mut character.modifiers {
                modifier.rounds_remaining = modifier.rounds_remaining.saturating_sub(1);
            }
            character.modifiers.retain(|m| m.rounds_remaining > 0);
        }
    }

    /// Stage 2: recalls first, then ordinary moves
    fn resolve_movement(
        &self,
        game: &mut Game,
        acting: &[Declaration],
    ) -> Result<(), ResolutionFault> {
        for decl in acting.iter().filter(|d| d.movement == Movement::Recall) {
            let character = character_mut(game, decl.character_id)?;
            character.recall_origin = Some(character.position);
            character.position = Area::base_of(character.team);
        }

        for decl in acting {
            let Movement::To(area) = decl.movement else {
                continue;
            };
            let character = character_mut(game, decl.character_id)?;
            if area == character.position {
                continue;
            }
            if !character.position.is_adjacent(area) {
                return Err(ResolutionFault::IllegalMove {
                    character: character.id,
                    from: character.position,
                    to: area,
                });
            }
            character.position = area;
        }
        Ok(())
    }

    /// Stage 4: attacker/defender pairs in canonical attacker order.
    /// Returns recalling characters an attack resolved against, hit or not.
    fn resolve_attacks(
        &self,
        game: &mut Game,
        matchups: &[(usize, usize)],
        rolls: &mut dyn RollSource,
        results: &mut Vec<Outcome>,
    ) -> HashSet<Uuid> {
        let mut disturbed = HashSet::new();

        for &(attacker_idx, defender_idx) in matchups {
            let (attacker, defender) = pair_mut(&mut game.characters, attacker_idx, defender_idx);
            let kind = OutcomeKind::Attack;

            let outcome = if !attacker.is_alive {
                Outcome::skipped(kind, attacker.id, Some(defender.id), "attacker_down")
            } else if !defender.is_alive {
                Outcome::skipped(kind, attacker.id, Some(defender.id), "target_down")
            } else if attacker.team == defender.team {
                Outcome::skipped(kind, attacker.id, Some(defender.id), "friendly_target")
            } else if attacker.engagement_area() != defender.engagement_area() {
                Outcome::skipped(kind, attacker.id, Some(defender.id), "out_of_range")
            } else {
                if defender.recall_origin.is_some() {
                    disturbed.insert(defender.id);
                }
                self.combat.attack(attacker, defender, rolls)
            };
            results.push(outcome);
        }
        disturbed
    }

    /// Recalls complete only when undisturbed; an interrupted recall stays at its origin
    fn finish_recalls(
        &self,
        game: &mut Game,
        acting: &[Declaration],
        disturbed: &HashSet<Uuid>,
        results: &mut Vec<Outcome>,
    ) {
        for decl in acting.iter().filter(|d| d.movement == Movement::Recall) {
            let Some(character) = game.character_mut(decl.character_id) else {
                continue;
            };
            let Some(origin) = character.recall_origin.take() else {
                continue;
            };
            if !character.is_alive || disturbed.contains(&character.id) {
                character.position = origin;
                results.push(Outcome::skipped(
                    OutcomeKind::Recall,
                    character.id,
                    None,
                    "recall_interrupted",
                ));
            } else {
                character.recall_origin = Some(origin);
                results.push(self.combat.complete_recall(character));
            }
        }
    }

    /// Stage 5: farm, skill, siege and purchases in canonical order
    fn resolve_actions(
        &self,
        game: &mut Game,
        acting: &[Declaration],
        results: &mut Vec<Outcome>,
    ) -> Result<(), ResolutionFault> {
        let contest_winners = self.siege_winners(game, acting);
        let round = game.round;

        for decl in acting {
            if decl.movement == Movement::Recall {
                continue;
            }
            if matches!(decl.action, Action::Attack { .. } | Action::Wait) {
                continue;
            }

            let actor_idx = index_of(game, decl.character_id)?;
            let actor_id = decl.character_id;
            if !game.characters[actor_idx].is_alive {
                results.push(Outcome::skipped(
                    outcome_kind(&decl.action),
                    actor_id,
                    None,
                    "actor_down",
                ));
                continue;
            }

            match &decl.action {
                Action::Farm => {
                    let actor = &mut game.characters[actor_idx];
                    let position = actor.position;
                    results.push(self.combat.farm(actor));
                    if let Some(camp) = game
                        .camps
                        .iter_mut()
                        .find(|c| c.alive && c.area == position)
                    {
                        camp.alive = false;
                        camp.respawn_round = Some(round + self.config().camp_respawn_rounds);
                    }
                }
                Action::Skill { index, target } => {
                    let outcome = self.resolve_skill(game, actor_idx, *index, *target)?;
                    results.push(outcome);
                }
                Action::Siege { structure } => {
                    let structure_idx = game.structure_index(*structure).ok_or(
                        ResolutionFault::DanglingTarget {
                            actor: actor_id,
                            target: *structure,
                        },
                    )?;
                    let note = self.siege_blocker(game, actor_idx, structure_idx, &contest_winners);
                    let outcome = match note {
                        Some(note) => {
                            Outcome::skipped(OutcomeKind::Siege, actor_id, Some(*structure), note)
                        }
                        None => self.combat.siege(
                            &mut game.characters[actor_idx],
                            &mut game.structures[structure_idx],
                        ),
                    };
                    results.push(outcome);
                }
                Action::Buy { item } => {
                    let spec = self
                        .config()
                        .item(item)
                        .ok_or_else(|| ResolutionFault::UnknownItem(item.clone()))?;
                    results.push(self.combat.buy(&mut game.characters[actor_idx], spec));
                }
                Action::Attack { .. } | Action::Wait => {}
            }
        }
        Ok(())
    }

    fn resolve_skill(
        &self,
        game: &mut Game,
        caster_idx: usize,
        index: usize,
        target: Option<Uuid>,
    ) -> Result<Outcome, ResolutionFault> {
        let caster_id = game.characters[caster_idx].id;
        let role = game.characters[caster_idx].role;
        let spec = self
            .config()
            .role(role)
            .and_then(|p| p.skills.get(index))
            .ok_or(ResolutionFault::UnknownSkill {
                character: caster_id,
                index,
            })?;

        let target_idx = match target {
            None => None,
            Some(id) if id == caster_id => None,
            Some(id) => Some(index_of(game, id).map_err(|_| ResolutionFault::DanglingTarget {
                actor: caster_id,
                target: id,
            })?),
        };

        let Some(target_idx) = target_idx else {
            return Ok(self.combat.skill(&mut game.characters[caster_idx], None, spec));
        };

        let (caster, target) = pair_mut(&mut game.characters, caster_idx, target_idx);
        if !target.is_alive {
            return Ok(Outcome::skipped(OutcomeKind::Skill, caster_id, Some(target.id), "target_down"));
        }
        if (caster.team == target.team) == spec.effect.targets_enemy() {
            return Ok(Outcome::skipped(OutcomeKind::Skill, caster_id, Some(target.id), "invalid_target"));
        }
        if caster.engagement_area() != target.engagement_area() {
            return Ok(Outcome::skipped(OutcomeKind::Skill, caster_id, Some(target.id), "out_of_range"));
        }
        Ok(self.combat.skill(caster, Some(target), spec))
    }

    /// First declared living sieger of each structure, when siege is exclusive
    fn siege_winners(&self, game: &Game, acting: &[Declaration]) -> HashMap<Uuid, Uuid> {
        let mut winners = HashMap::new();
        if !self.config().exclusive_siege {
            return winners;
        }
        let mut siegers: Vec<&Declaration> = acting
            .iter()
            .filter(|d| d.movement != Movement::Recall)
            .filter(|d| matches!(d.action, Action::Siege { .. }))
            .filter(|d| game.character(d.character_id).is_some_and(|c| c.is_alive))
            .collect();
        siegers.sort_by_key(|d| d.seq);
        for decl in siegers {
            if let Action::Siege { structure } = decl.action {
                winners.entry(structure).or_insert(decl.character_id);
            }
        }
        winners
    }

    fn siege_blocker(
        &self,
        game: &Game,
        actor_idx: usize,
        structure_idx: usize,
        winners: &HashMap<Uuid, Uuid>,
    ) -> Option<&'static str> {
        let actor = &game.characters[actor_idx];
        let structure = &game.structures[structure_idx];

        if structure.team == actor.team {
            return Some("friendly_structure");
        }
        if winners.get(&structure.id).is_some_and(|winner| *winner != actor.id) {
            return Some("contested");
        }
        if structure.destroyed {
            return Some("already_destroyed");
        }
        if actor.position != structure.area {
            return Some("out_of_range");
        }
        if structure.kind == StructureKind::Core {
            let tower_down = game
                .structures
                .iter()
                .any(|s| s.team == structure.team && s.kind == StructureKind::Tower && s.destroyed);
            if !tower_down {
                return Some("core_protected");
            }
        }
        None
    }

    /// Stage 6: schedule this round's fallen, revive due characters and camps
    fn resolve_respawns(&self, game: &mut Game, results: &mut Vec<Outcome>) {
        let round = game.round;
        let delay = self.config().respawn_delay_rounds.max(1);
        let limit = self.config().respawn_limit;

        let fallen: Vec<Uuid> = results
            .iter()
            .filter(|o| o.killed && matches!(o.kind, OutcomeKind::Attack | OutcomeKind::Skill))
            .filter_map(|o| o.target)
            .collect();

        for id in fallen {
            if let Some(character) = game.character_mut(id) {
                character.modifiers.clear();
                let eliminated = limit.is_some_and(|limit| character.deaths > limit);
                character.respawn_round = if eliminated { None } else { Some(round + delay) };
            }
        }

        for character in &mut game.characters {
            if character.is_alive {
                continue;
            }
            if character.respawn_round.is_some_and(|at| at <= round) {
                character.revive();
                let mut outcome = Outcome::new(OutcomeKind::Respawn, character.id, None);
                outcome.success = true;
                results.push(outcome);
            }
        }

        for camp in &mut game.camps {
            if !camp.alive && camp.respawn_round.is_some_and(|at| at <= round) {
                camp.alive = true;
                camp.respawn_round = None;
            }
        }
    }

    /// Stage 7: core destruction, team wipe, then the round limit
    fn check_victory(&self, game: &mut Game) {
        let cores_down: Vec<Team> = Team::BOTH
            .into_iter()
            .filter(|&team| game.core(team).is_some_and(|core| core.destroyed))
            .collect();

        let wiped: Vec<Team> = Team::BOTH
            .into_iter()
            .filter(|&team| game.alive_count(team) == 0 && game.pending_respawns(team) == 0)
            .collect();

        let outcome = if !cores_down.is_empty() {
            Some(sole_loser(&cores_down))
        } else if !wiped.is_empty() {
            Some(sole_loser(&wiped))
        } else if game.round + 1 >= self.config().max_rounds {
            let (a, b) = (game.structure_hp(Team::A), game.structure_hp(Team::B));
            Some(match a.cmp(&b) {
                std::cmp::Ordering::Greater => Some(Team::A),
                std::cmp::Ordering::Less => Some(Team::B),
                std::cmp::Ordering::Equal => None,
            })
        } else {
            None
        };

        if let Some(winner) = outcome {
            game.phase = GamePhase::Finished;
            game.status = GameStatus::Completed;
            game.winner = winner;
        }
    }
}

/// Winner when exactly one team lost, draw otherwise
fn sole_loser(losers: &[Team]) -> Option<Team> {
    match losers {
        [loser] => Some(loser.opponent()),
        _ => None,
    }
}

/// Drop declarations of fallen characters and sort by team, role, then id.
/// Submission order never matters; `seq` only breaks siege contests.
fn canonical_order(game: &Game, declarations: &[Declaration]) -> Result<Vec<Declaration>, ResolutionFault> {
    let mut keyed: Vec<((Team, Role, Uuid, u64), &Declaration)> = Vec::with_capacity(declarations.len());
    for decl in declarations {
        let character = game
            .character(decl.character_id)
            .ok_or(ResolutionFault::UnknownCharacter(decl.character_id))?;
        if !character.is_alive {
            continue;
        }
        keyed.push(((character.team, character.role, character.id, decl.seq), decl));
    }
    keyed.sort_by(|a, b| a.0.cmp(&b.0));
    keyed.dedup_by(|later, earlier| later.1.character_id == earlier.1.character_id);
    Ok(keyed.into_iter().map(|(_, decl)| decl.clone()).collect())
}

/// Stage 3: attack targets by declared id, in canonical attacker order
fn determine_matchups(game: &Game, acting: &[Declaration]) -> Result<Vec<(usize, usize)>, ResolutionFault> {
    let mut matchups = Vec::new();
    for decl in acting {
        if decl.movement == Movement::Recall {
            continue;
        }
        let Action::Attack { target } = decl.action else {
            continue;
        };
        let attacker = index_of(game, decl.character_id)?;
        let defender = game
            .character_index(target)
            .ok_or(ResolutionFault::DanglingTarget {
                actor: decl.character_id,
                target,
            })?;
        if attacker == defender {
            return Err(ResolutionFault::SelfTarget(decl.character_id));
        }
        matchups.push((attacker, defender));
    }
    Ok(matchups)
}

/// Clear per-round flags, check HP invariants, advance the round counter
fn close_round(game: &mut Game) -> Result<(), ResolutionFault> {
    for character in &mut game.characters {
        character.has_movement_declared = false;
        character.has_action_declared = false;
        character.recall_origin = None;
        let hp_ok = character.current_hp <= character.max_hp
            && character.is_alive == (character.current_hp > 0);
        if !hp_ok {
            return Err(ResolutionFault::HpInvariant(character.id));
        }
    }
    game.round += 1;
    if game.phase != GamePhase::Finished {
        game.phase = GamePhase::Declaring;
    }
    Ok(())
}

fn outcome_kind(action: &Action) -> OutcomeKind {
    match action {
        Action::Attack { .. } | Action::Wait => OutcomeKind::Attack,
        Action::Farm => OutcomeKind::Farm,
        Action::Skill { .. } => OutcomeKind::Skill,
        Action::Siege { .. } => OutcomeKind::Siege,
        Action::Buy { .. } => OutcomeKind::Purchase,
    }
}

fn index_of(game: &Game, id: Uuid) -> Result<usize, ResolutionFault> {
    game.character_index(id)
        .ok_or(ResolutionFault::UnknownCharacter(id))
}

fn character_mut(game: &mut Game, id: Uuid) -> Result<&mut super::model::Character, ResolutionFault> {
    game.character_mut(id)
        .ok_or(ResolutionFault::UnknownCharacter(id))
}

/// Two distinct mutable elements of one slice
fn pair_mut<T>(items: &mut [T], a: usize, b: usize) -> (&mut T, &mut T) {
    debug_assert_ne!(a, b);
    if a < b {
        let (left, right) = items.split_at_mut(b);
        (&mut left[a], &mut right[0])
    } else {
        let (left, right) = items.split_at_mut(a);
        (&mut right[0], &mut left[b])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::combat::testing::{MidpointRolls, ScriptedRolls};
    use crate::game::combat::SeededRolls;
    use crate::game::model::{Controller, StatKind, StatModifier, Stats};

    fn config() -> BalanceConfig {
        BalanceConfig::default()
    }

    /// In-progress game with every slot taken by participants, all in mid lane
    fn started(mode: crate::game::model::GameMode, config: &BalanceConfig) -> Game {
        let mut game = Game::new(Uuid::new_v4(), mode, 42, config);
        while game.next_slot().is_some() {
            let controller = Controller::Participant {
                participant_id: Uuid::new_v4(),
            };
            game.add_character(controller, "p".into(), config);
        }
        game.status = GameStatus::InProgress;
        for c in &mut game.characters {
            c.position = Area::MidLane;
        }
        game
    }

    fn duel(config: &BalanceConfig) -> (Game, Uuid, Uuid) {
        let game = started(crate::game::model::GameMode::Duel, config);
        let a = game.characters[0].id;
        let b = game.characters[1].id;
        (game, a, b)
    }

    fn decl(character_id: Uuid, movement: Movement, action: Action, seq: u64) -> Declaration {
        Declaration {
            character_id,
            movement,
            action,
            seq,
            defaulted: false,
        }
    }

    fn resolver(config: BalanceConfig) -> RoundResolver {
        RoundResolver::new(Arc::new(config))
    }

    #[test]
    fn midpoint_attack_lands_through_full_round() {
        let cfg = config();
        let (mut game, a, b) = duel(&cfg);
        game.character_mut(a).unwrap().base_stats = Stats::new(10, 0, 0, 0);
        game.character_mut(b).unwrap().base_stats = Stats::new(0, 5, 0, 0);
        let hp = game.character(b).unwrap().current_hp;

        let decls = vec![
            decl(a, Movement::Stay, Action::Attack { target: b }, 0),
            decl(b, Movement::Stay, Action::Wait, 1),
        ];
        let res = resolver(cfg.clone()).resolve(&game, &decls, &mut MidpointRolls).unwrap();

        let outcome = &res.results[0];
        assert!(outcome.success);
        assert!(outcome.damage >= cfg.damage_min && outcome.damage <= cfg.damage_max);
        assert_eq!(res.game.character(b).unwrap().current_hp, hp - outcome.damage);
        assert_eq!(res.game.round, 1);
        assert_eq!(res.game.phase, GamePhase::Declaring);
        assert_eq!(game.round, 0, "input snapshot must not change");
    }

    #[test]
    fn farm_changes_only_currency_and_experience() {
        let cfg = config();
        let (game, a, _) = duel(&cfg);
        let before = game.character(a).unwrap().clone();

        let decls = vec![decl(a, Movement::Stay, Action::Farm, 0)];
        let res = resolver(cfg.clone()).resolve(&game, &decls, &mut MidpointRolls).unwrap();
        let after = res.game.character(a).unwrap();

        assert_eq!(after.currency, before.currency + cfg.farm_currency);
        assert_eq!(after.experience, before.experience + cfg.farm_experience);
        assert_eq!(after.current_hp, before.current_hp);
        assert_eq!(after.position, before.position);
    }

    #[test]
    fn farming_a_camp_clears_it_until_respawn() {
        let cfg = config();
        let (mut game, a, _) = duel(&cfg);
        game.character_mut(a).unwrap().position = Area::JungleA;

        let decls = vec![decl(a, Movement::Stay, Action::Farm, 0)];
        let res = resolver(cfg.clone()).resolve(&game, &decls, &mut MidpointRolls).unwrap();

        let camp = res.game.camps.iter().find(|c| c.area == Area::JungleA).unwrap();
        assert!(!camp.alive);
        assert_eq!(camp.respawn_round, Some(cfg.camp_respawn_rounds));
    }

    #[test]
    fn resolution_ignores_submission_order() {
        let cfg = config();
        let game = started(crate::game::model::GameMode::Skirmish, &cfg);
        let ids: Vec<Uuid> = game.characters.iter().map(|c| c.id).collect();
        let enemy_of = |i: usize| ids[if i % 2 == 0 { i + 1 } else { i - 1 }];

        let decls: Vec<Declaration> = (0..ids.len())
            .map(|i| {
                let action = if i == 4 {
                    Action::Farm
                } else {
                    Action::Attack { target: enemy_of(i) }
                };
                decl(ids[i], Movement::Stay, action, i as u64)
            })
            .collect();
        let mut reversed = decls.clone();
        reversed.reverse();

        let resolver = resolver(cfg);
        let first = resolver
            .resolve(&game, &decls, &mut SeededRolls::for_round(game.seed, game.round))
            .unwrap();
        let second = resolver
            .resolve(&game, &reversed, &mut SeededRolls::for_round(game.seed, game.round))
            .unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn attacks_follow_team_then_role_order() {
        let cfg = config();
        let game = started(crate::game::model::GameMode::Skirmish, &cfg);
        let b_mage = game
            .characters
            .iter()
            .find(|c| c.team == Team::B && c.role == Role::Mage)
            .unwrap()
            .id;
        let a_tank = game
            .characters
            .iter()
            .find(|c| c.team == Team::A && c.role == Role::Tank)
            .unwrap()
            .id;
        let a_fighter = game
            .characters
            .iter()
            .find(|c| c.team == Team::A && c.role == Role::Fighter)
            .unwrap()
            .id;

        let decls = vec![
            decl(b_mage, Movement::Stay, Action::Attack { target: a_tank }, 0),
            decl(a_fighter, Movement::Stay, Action::Attack { target: b_mage }, 1),
            decl(a_tank, Movement::Stay, Action::Attack { target: b_mage }, 2),
        ];
        let res = resolver(cfg).resolve(&game, &decls, &mut MidpointRolls).unwrap();
        let order: Vec<Uuid> = res.results.iter().map(|o| o.actor).collect();

        assert_eq!(order, vec![a_tank, a_fighter, b_mage]);
    }

    #[test]
    fn hp_invariant_holds_over_many_rounds() {
        let cfg = config();
        let mut game = started(crate::game::model::GameMode::Standard, &cfg);
        let resolver = resolver(cfg);

        for _ in 0..40 {
            if game.is_finished() {
                break;
            }
            let alive: Vec<(Uuid, Team)> = game
                .characters
                .iter()
                .filter(|c| c.is_alive)
                .map(|c| (c.id, c.team))
                .collect();
            let decls: Vec<Declaration> = alive
                .iter()
                .enumerate()
                .map(|(i, &(id, team))| {
                    let target = alive.iter().find(|(_, t)| *t != team).map(|(t, _)| *t);
                    let action = match target {
                        Some(target) if i % 3 != 0 => Action::Attack { target },
                        _ => Action::Farm,
                    };
                    decl(id, Movement::Stay, action, i as u64)
                })
                .collect();

            let mut rolls = SeededRolls::for_round(game.seed, game.round);
            game = resolver.resolve(&game, &decls, &mut rolls).unwrap().game;

            for c in &game.characters {
                assert!(c.current_hp <= c.max_hp);
                assert_eq!(c.is_alive, c.current_hp > 0);
            }
        }
    }

    #[test]
    fn fallen_character_returns_after_delay() {
        let cfg = config();
        let delay = cfg.respawn_delay_rounds;
        let (mut game, a, b) = duel(&cfg);
        game.character_mut(b).unwrap().current_hp = 1;
        let resolver = resolver(cfg);

        let kill = vec![decl(a, Movement::Stay, Action::Attack { target: b }, 0)];
        let mut rolls = ScriptedRolls::new(&[19, 1, 10]);
        let mut res = resolver.resolve(&game, &kill, &mut rolls).unwrap();
        let death_round = res.round;
        assert!(!res.game.character(b).unwrap().is_alive);
        assert_eq!(res.game.character(b).unwrap().respawn_round, Some(death_round + delay));

        let idle = vec![decl(a, Movement::Stay, Action::Wait, 0)];
        loop {
            game = res.game;
            let round = game.round;
            res = resolver.resolve(&game, &idle, &mut MidpointRolls).unwrap();
            let revived = res.game.character(b).unwrap().is_alive;
            if round < death_round + delay {
                assert!(!revived, "revived early in round {round}");
            } else {
                assert!(revived);
                let c = res.game.character(b).unwrap();
                assert_eq!(c.current_hp, c.max_hp);
                assert_eq!(c.position, Area::BaseB);
                break;
            }
        }
    }

    #[test]
    fn dead_characters_declarations_are_ignored() {
        let cfg = config();
        let (mut game, a, b) = duel(&cfg);
        let c = game.character_mut(b).unwrap();
        c.take_damage(c.current_hp);
        c.respawn_round = Some(5);
        let currency = game.character(b).unwrap().currency;

        let decls = vec![
            decl(a, Movement::Stay, Action::Wait, 0),
            decl(b, Movement::Stay, Action::Farm, 1),
        ];
        let res = resolver(cfg).resolve(&game, &decls, &mut MidpointRolls).unwrap();

        assert_eq!(res.game.character(b).unwrap().currency, currency);
    }

    #[test]
    fn disturbed_recall_keeps_position_and_damage() {
        let cfg = config();
        let (mut game, a, b) = duel(&cfg);
        game.character_mut(b).unwrap().take_damage(40);
        let hp = game.character(b).unwrap().current_hp;

        let decls = vec![
            decl(a, Movement::Stay, Action::Attack { target: b }, 0),
            decl(b, Movement::Recall, Action::Wait, 1),
        ];
        let mut rolls = ScriptedRolls::new(&[19, 1, 10]);
        let res = resolver(cfg).resolve(&game, &decls, &mut rolls).unwrap();
        let after = res.game.character(b).unwrap();

        assert_eq!(after.position, Area::MidLane);
        assert_eq!(after.current_hp, hp - 10);
        let recall = res.results.iter().find(|o| o.kind == OutcomeKind::Recall).unwrap();
        assert_eq!(recall.note.as_deref(), Some("recall_interrupted"));
    }

    #[test]
    fn blocked_attack_still_cancels_recall() {
        let cfg = config();
        let (mut game, a, b) = duel(&cfg);
        game.character_mut(b).unwrap().take_damage(40);
        let before = game.character(b).unwrap().clone();

        let decls = vec![
            decl(a, Movement::Stay, Action::Attack { target: b }, 0),
            decl(b, Movement::Recall, Action::Wait, 1),
        ];
        let mut rolls = ScriptedRolls::new(&[1, 20]);
        let res = resolver(cfg).resolve(&game, &decls, &mut rolls).unwrap();

        let attack = res
            .results
            .iter()
            .find(|o| o.kind == OutcomeKind::Attack)
            .unwrap();
        assert!(!attack.success);
        assert_eq!(attack.damage, 0);

        let after = res.game.character(b).unwrap();
        assert_eq!(after.position, before.position);
        assert_eq!(after.current_hp, before.current_hp);
        assert!(res
            .results
            .iter()
            .any(|o| o.kind == OutcomeKind::Recall && o.note.as_deref() == Some("recall_interrupted")));
    }

    #[test]
    fn siege_contest_goes_to_first_declared() {
        let cfg = config();
        let mut game = started(crate::game::model::GameMode::Skirmish, &cfg);
        let tower = game
            .structures
            .iter()
            .find(|s| s.team == Team::B && s.area == Area::TopLane)
            .unwrap()
            .id;
        let team_a: Vec<Uuid> = game
            .characters
            .iter()
            .filter(|c| c.team == Team::A)
            .map(|c| c.id)
            .collect();
        for id in &team_a {
            game.character_mut(*id).unwrap().position = Area::TopLane;
        }
        // Later role in canonical order declares first
        let first = team_a[2];
        let second = team_a[0];

        let decls = vec![
            decl(second, Movement::Stay, Action::Siege { structure: tower }, 7),
            decl(first, Movement::Stay, Action::Siege { structure: tower }, 3),
        ];
        let res = resolver(cfg.clone()).resolve(&game, &decls, &mut MidpointRolls).unwrap();

        let s = res.game.structure(tower).unwrap();
        assert_eq!(s.current_hp, cfg.tower_hp - cfg.siege_damage);
        let loser = res.results.iter().find(|o| o.actor == second).unwrap();
        assert_eq!(loser.note.as_deref(), Some("contested"));

        let mut open = cfg.clone();
        open.exclusive_siege = false;
        let res = resolver(open).resolve(&game, &decls, &mut MidpointRolls).unwrap();
        let s = res.game.structure(tower).unwrap();
        assert_eq!(s.current_hp, cfg.tower_hp - 2 * cfg.siege_damage);
    }

    #[test]
    fn attack_in_shared_lane_lands() {
        let cfg = config();
        let (mut game, a, b) = duel(&cfg);
        game.character_mut(a).unwrap().position = Area::TopLane;
        game.character_mut(b).unwrap().position = Area::TopLane;
        let hp = game.character(b).unwrap().current_hp;

        let decls = vec![decl(a, Movement::Stay, Action::Attack { target: b }, 0)];
        let res = resolver(cfg).resolve(&game, &decls, &mut ScriptedRolls::new(&[19, 1, 10])).unwrap();
        assert_eq!(res.game.character(b).unwrap().current_hp, hp - 10);
    }

    #[test]
    fn core_is_protected_until_a_tower_falls() {
        let cfg = config();
        let (mut game, a, _) = duel(&cfg);
        game.character_mut(a).unwrap().position = Area::BaseB;
        let core = game.core(Team::B).unwrap().id;

        let decls = vec![decl(a, Movement::Stay, Action::Siege { structure: core }, 0)];
        let res = resolver(cfg.clone()).resolve(&game, &decls, &mut MidpointRolls).unwrap();
        assert_eq!(res.results[0].note.as_deref(), Some("core_protected"));

        for s in game.structures.iter_mut() {
            if s.team == Team::B && s.area == Area::MidLane {
                s.damage(s.current_hp);
            }
            if s.id == core {
                s.current_hp = 10;
            }
        }
        let res = resolver(cfg).resolve(&game, &decls, &mut MidpointRolls).unwrap();
        assert!(res.game.structure(core).unwrap().destroyed);
        assert_eq!(res.game.phase, GamePhase::Finished);
        assert_eq!(res.game.winner, Some(Team::A));
    }

    #[test]
    fn team_wipe_without_respawns_finishes_game() {
        let mut cfg = config();
        cfg.respawn_limit = Some(0);
        let (mut game, a, b) = duel(&cfg);
        game.character_mut(b).unwrap().current_hp = 1;

        let decls = vec![
            decl(a, Movement::Stay, Action::Attack { target: b }, 0),
            decl(b, Movement::Stay, Action::Wait, 1),
        ];
        let res = resolver(cfg).resolve(&game, &decls, &mut ScriptedRolls::new(&[19, 1, 10])).unwrap();

        assert_eq!(res.game.phase, GamePhase::Finished);
        assert_eq!(res.game.status, GameStatus::Completed);
        assert_eq!(res.game.winner, Some(Team::A));
        assert_eq!(res.game.character(b).unwrap().respawn_round, None);
    }

    #[test]
    fn pending_respawn_keeps_game_running() {
        let cfg = config();
        let (mut game, a, b) = duel(&cfg);
        game.character_mut(b).unwrap().current_hp = 1;

        let decls = vec![decl(a, Movement::Stay, Action::Attack { target: b }, 0)];
        let res = resolver(cfg).resolve(&game, &decls, &mut ScriptedRolls::new(&[19, 1, 10])).unwrap();

        assert_eq!(res.game.phase, GamePhase::Declaring);
    }

    #[test]
    fn round_limit_decides_by_structure_hp() {
        let mut cfg = config();
        cfg.max_rounds = 1;
        let (mut game, a, _) = duel(&cfg);
        game.structures
            .iter_mut()
            .find(|s| s.team == Team::B && s.kind == StructureKind::Tower)
            .unwrap()
            .current_hp -= 1;

        let decls = vec![decl(a, Movement::Stay, Action::Wait, 0)];
        let res = resolver(cfg).resolve(&game, &decls, &mut MidpointRolls).unwrap();

        assert_eq!(res.game.phase, GamePhase::Finished);
        assert_eq!(res.game.winner, Some(Team::A));
    }

    #[test]
    fn expired_modifiers_are_dropped_first() {
        let cfg = config();
        let (mut game, a, _) = duel(&cfg);
        let c = game.character_mut(a).unwrap();
        for rounds_remaining in [1, 2] {
            c.modifiers.push(StatModifier {
                stat: StatKind::Attack,
                amount: 3,
                rounds_remaining,
                source: a,
            });
        }

        let decls = vec![decl(a, Movement::Stay, Action::Wait, 0)];
        let res = resolver(cfg).resolve(&game, &decls, &mut MidpointRolls).unwrap();
        let modifiers = &res.game.character(a).unwrap().modifiers;

        assert_eq!(modifiers.len(), 1);
        assert_eq!(modifiers[0].rounds_remaining, 1);
    }

    #[test]
    fn movement_happens_before_range_checks() {
        let cfg = config();
        let (mut game, a, b) = duel(&cfg);
        game.character_mut(a).unwrap().position = Area::BaseA;

        let decls = vec![decl(a, Movement::To(Area::MidLane), Action::Attack { target: b }, 0)];
        let res = resolver(cfg).resolve(&game, &decls, &mut ScriptedRolls::new(&[19, 1, 10])).unwrap();

        assert!(res.results[0].success);
        assert_eq!(res.game.character(a).unwrap().position, Area::MidLane);
    }

    #[test]
    fn different_areas_are_out_of_range() {
        let cfg = config();
        let (mut game, a, b) = duel(&cfg);
        game.character_mut(b).unwrap().position = Area::TopLane;

        let decls = vec![decl(a, Movement::Stay, Action::Attack { target: b }, 0)];
        let res = resolver(cfg).resolve(&game, &decls, &mut MidpointRolls).unwrap();

        assert_eq!(res.results[0].note.as_deref(), Some("out_of_range"));
    }

    #[test]
    fn dangling_target_is_a_fault() {
        let cfg = config();
        let (game, a, _) = duel(&cfg);
        let decls = vec![decl(a, Movement::Stay, Action::Attack { target: Uuid::new_v4() }, 0)];

        let err = resolver(cfg).resolve(&game, &decls, &mut MidpointRolls).unwrap_err();
        assert!(matches!(err, ResolutionFault::DanglingTarget { .. }));
    }

    #[test]
    fn illegal_move_is_a_fault() {
        let cfg = config();
        let (mut game, a, _) = duel(&cfg);
        game.character_mut(a).unwrap().position = Area::BaseA;
        let decls = vec![decl(a, Movement::To(Area::BaseB), Action::Wait, 0)];

        let err = resolver(cfg).resolve(&game, &decls, &mut MidpointRolls).unwrap_err();
        assert!(matches!(err, ResolutionFault::IllegalMove { .. }));
    }

    #[test]
    fn support_heal_lands_in_stage_five() {
        let cfg = config();
        let mut game = started(crate::game::model::GameMode::Standard, &cfg);
        let support = game
            .characters
            .iter()
            .find(|c| c.team == Team::A && c.role == Role::Support)
            .unwrap()
            .id;
        let tank = game
            .characters
            .iter()
            .find(|c| c.team == Team::A && c.role == Role::Tank)
            .unwrap()
            .id;
        game.character_mut(tank).unwrap().take_damage(20);

        let decls = vec![decl(
            support,
            Movement::Stay,
            Action::Skill {
                index: 0,
                target: Some(tank),
            },
            0,
        )];
        let res = resolver(cfg).resolve(&game, &decls, &mut MidpointRolls).unwrap();
        let tank = res.game.character(tank).unwrap();

        assert_eq!(tank.current_hp, tank.max_hp);
    }
}
