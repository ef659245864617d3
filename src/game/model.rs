//! Entity model: games, characters, structures and camps
//!
//! Plain value types. Only the round resolver mutates a game once it has
//! started; lobby joins are the one exception and happen before round 0.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{BalanceConfig, ItemSpec, RoleProfile};
use crate::util::time::unix_millis;

use super::area::Area;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Team {
    A,
    B,
}

impl Team {
    pub const BOTH: [Team; 2] = [Team::A, Team::B];

    pub fn opponent(self) -> Self {
        match self {
            Team::A => Team::B,
            Team::B => Team::A,
        }
    }
}

/// Character classes. Declaration order is the canonical tie-break order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Tank,
    Fighter,
    Mage,
    Marksman,
    Support,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Tank,
        Role::Fighter,
        Role::Mage,
        Role::Marksman,
        Role::Support,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatKind {
    Attack,
    Defense,
    Mobility,
    Utility,
}

/// Derived combat stats
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Stats {
    pub attack: i32,
    pub defense: i32,
    pub mobility: i32,
    pub utility: i32,
}

impl Stats {
    pub fn new(attack: i32, defense: i32, mobility: i32, utility: i32) -> Self {
        Self {
            attack,
            defense,
            mobility,
            utility,
        }
    }

    pub fn get(&self, stat: StatKind) -> i32 {
        match stat {
            StatKind::Attack => self.attack,
            StatKind::Defense => self.defense,
            StatKind::Mobility => self.mobility,
            StatKind::Utility => self.utility,
        }
    }

    pub fn add(&mut self, stat: StatKind, amount: i32) {
        match stat {
            StatKind::Attack => self.attack += amount,
            StatKind::Defense => self.defense += amount,
            StatKind::Mobility => self.mobility += amount,
            StatKind::Utility => self.utility += amount,
        }
    }

    pub fn plus(mut self, other: &Stats) -> Self {
        self.attack += other.attack;
        self.defense += other.defense;
        self.mobility += other.mobility;
        self.utility += other.utility;
        self
    }
}

/// Timed buff (positive amount) or debuff (negative amount)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatModifier {
    pub stat: StatKind,
    pub amount: i32,
    pub rounds_remaining: u32,
    pub source: Uuid,
}

/// Accumulated bonuses from owned items
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gear {
    pub attack: i32,
    pub defense: i32,
    pub damage: u32,
    pub max_hp: u32,
}

/// Who submits declarations for a character
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Controller {
    Participant { participant_id: Uuid },
    Ai,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub id: Uuid,
    pub controller: Controller,
    pub display_name: String,
    pub team: Team,
    pub role: Role,
    pub level: u32,
    pub experience: u32,
    pub currency: u32,
    pub current_hp: u32,
    pub max_hp: u32,
    /// Stats from role and levels, without gear or modifiers
    pub base_stats: Stats,
    pub position: Area,
    pub modifiers: Vec<StatModifier>,
    pub items: Vec<String>,
    pub gear: Gear,
    pub is_alive: bool,
    /// Round at which a dead character returns; `None` while alive or eliminated
    pub respawn_round: Option<u32>,
    pub kills: u32,
    pub deaths: u32,
    pub has_movement_declared: bool,
    pub has_action_declared: bool,
    /// Origin area of a recall still being channelled this round
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recall_origin: Option<Area>,
}

impl Character {
    pub fn new(
        controller: Controller,
        display_name: String,
        team: Team,
        profile: &RoleProfile,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            controller,
            display_name,
            team,
            role: profile.role,
            level: 1,
            experience: 0,
            currency: 0,
            current_hp: profile.max_hp,
            max_hp: profile.max_hp,
            base_stats: profile.stats,
            position: Area::base_of(team),
            modifiers: Vec::new(),
            items: Vec::new(),
            gear: Gear::default(),
            is_alive: true,
            respawn_round: None,
            kills: 0,
            deaths: 0,
            has_movement_declared: false,
            has_action_declared: false,
            recall_origin: None,
        }
    }

    pub fn participant_id(&self) -> Option<Uuid> {
        match self.controller {
            Controller::Participant { participant_id } => Some(participant_id),
            Controller::Ai => None,
        }
    }

    pub fn is_ai(&self) -> bool {
        matches!(self.controller, Controller::Ai)
    }

    /// Stats after gear and active modifiers
    pub fn effective_stats(&self) -> Stats {
        let mut stats = self.base_stats;
        stats.attack += self.gear.attack;
        stats.defense += self.gear.defense;
        for modifier in &self.modifiers {
            stats.add(modifier.stat, modifier.amount);
        }
        stats
    }

    /// Area used for range checks. A channelling recall still stands at its origin.
    pub fn engagement_area(&self) -> Area {
        self.recall_origin.unwrap_or(self.position)
    }

    /// Apply damage, returns true when this hit brought HP to zero
    pub fn take_damage(&mut self, amount: u32) -> bool {
        if !self.is_alive {
            return false;
        }
        self.current_hp = self.current_hp.saturating_sub(amount);
        if self.current_hp == 0 {
            self.is_alive = false;
            self.deaths += 1;
            true
        } else {
            false
        }
    }

    /// Restore HP up to max, returns the amount actually healed
    pub fn heal(&mut self, amount: u32) -> u32 {
        if !self.is_alive {
            return 0;
        }
        let before = self.current_hp;
        self.current_hp = self.current_hp.saturating_add(amount).min(self.max_hp);
        self.current_hp - before
    }

    /// Raise max HP; current HP rises by the same delta
    pub fn raise_max_hp(&mut self, delta: u32) {
        self.max_hp += delta;
        if self.is_alive {
            self.current_hp = (self.current_hp + delta).min(self.max_hp);
        }
    }

    pub fn equip(&mut self, item: &ItemSpec) {
        self.items.push(item.id.clone());
        self.gear.attack += item.attack;
        self.gear.defense += item.defense;
        self.gear.damage += item.damage;
        self.gear.max_hp += item.max_hp;
        self.raise_max_hp(item.max_hp);
    }

    /// Return to play at full HP in the team base
    pub fn revive(&mut self) {
        self.is_alive = true;
        self.current_hp = self.max_hp;
        self.position = Area::base_of(self.team);
        self.respawn_round = None;
        self.modifiers.clear();
        self.recall_origin = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructureKind {
    Tower,
    /// Destroying the core ends the game
    Core,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Structure {
    pub id: Uuid,
    pub team: Team,
    pub kind: StructureKind,
    pub area: Area,
    pub current_hp: u32,
    pub max_hp: u32,
    pub destroyed: bool,
}

impl Structure {
    pub fn new(team: Team, kind: StructureKind, area: Area, max_hp: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            team,
            kind,
            area,
            current_hp: max_hp,
            max_hp,
            destroyed: false,
        }
    }

    /// Apply siege damage, returns true when this hit destroyed the structure
    pub fn damage(&mut self, amount: u32) -> bool {
        if self.destroyed {
            return false;
        }
        self.current_hp = self.current_hp.saturating_sub(amount);
        if self.current_hp == 0 {
            self.destroyed = true;
            true
        } else {
            false
        }
    }
}

/// Neutral jungle camp
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Camp {
    pub id: Uuid,
    pub area: Area,
    pub alive: bool,
    pub respawn_round: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GamePhase {
    Declaring,
    Resolving,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    /// Lobby, waiting for every slot to fill
    Waiting,
    InProgress,
    Completed,
    /// Ended after a repeated resolution fault
    Errored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    /// 1v1
    Duel,
    /// 3v3
    Skirmish,
    /// 5v5
    Standard,
}

impl GameMode {
    pub fn slots_per_team(self) -> usize {
        match self {
            GameMode::Duel => 1,
            GameMode::Skirmish => 3,
            GameMode::Standard => 5,
        }
    }
}

/// Authoritative snapshot of a game
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Game {
    pub id: Uuid,
    pub mode: GameMode,
    pub round: u32,
    pub phase: GamePhase,
    pub status: GameStatus,
    pub seed: u64,
    pub characters: Vec<Character>,
    pub structures: Vec<Structure>,
    pub camps: Vec<Camp>,
    pub winner: Option<Team>,
    pub failure: Option<String>,
    pub created_at: u64,
}

impl Game {
    /// Fresh lobby with the fixed structure and camp layout
    pub fn new(id: Uuid, mode: GameMode, seed: u64, config: &BalanceConfig) -> Self {
        let mut structures = Vec::new();
        for team in Team::BOTH {
            for lane in Area::LANES {
                structures.push(Structure::new(team, StructureKind::Tower, lane, config.tower_hp));
            }
            structures.push(Structure::new(
                team,
                StructureKind::Core,
                Area::base_of(team),
                config.core_hp,
            ));
        }

        let camps = [Area::JungleA, Area::JungleB]
            .into_iter()
            .map(|area| Camp {
                id: Uuid::new_v4(),
                area,
                alive: true,
                respawn_round: None,
            })
            .collect();

        Self {
            id,
            mode,
            round: 0,
            phase: GamePhase::Declaring,
            status: GameStatus::Waiting,
            seed,
            characters: Vec::new(),
            structures,
            camps,
            winner: None,
            failure: None,
            created_at: unix_millis(),
        }
    }

    pub fn character(&self, id: Uuid) -> Option<&Character> {
        self.characters.iter().find(|c| c.id == id)
    }

    pub fn character_mut(&mut self, id: Uuid) -> Option<&mut Character> {
        self.characters.iter_mut().find(|c| c.id == id)
    }

    pub fn character_index(&self, id: Uuid) -> Option<usize> {
        self.characters.iter().position(|c| c.id == id)
    }

    pub fn structure(&self, id: Uuid) -> Option<&Structure> {
        self.structures.iter().find(|s| s.id == id)
    }

    pub fn structure_index(&self, id: Uuid) -> Option<usize> {
        self.structures.iter().position(|s| s.id == id)
    }

    pub fn total_slots(&self) -> usize {
        self.mode.slots_per_team() * 2
    }

    pub fn is_full(&self) -> bool {
        self.characters.len() >= self.total_slots()
    }

    /// Team and role of the next free slot. Teams alternate, roles follow canonical order.
    pub fn next_slot(&self) -> Option<(Team, Role)> {
        if self.is_full() {
            return None;
        }
        let index = self.characters.len();
        let team = if index % 2 == 0 { Team::A } else { Team::B };
        let role = Role::ALL[(index / 2) % Role::ALL.len()];
        Some((team, role))
    }

    /// Add a character in the next free slot, returns its id
    pub fn add_character(
        &mut self,
        controller: Controller,
        display_name: String,
        config: &BalanceConfig,
    ) -> Option<Uuid> {
        let (team, role) = self.next_slot()?;
        let profile = config.role(role)?;
        let character = Character::new(controller, display_name, team, profile);
        let id = character.id;
        self.characters.push(character);
        Some(id)
    }

    pub fn participant_character(&self, participant_id: Uuid) -> Option<&Character> {
        self.characters
            .iter()
            .find(|c| c.participant_id() == Some(participant_id))
    }

    /// Participant-controlled characters the barrier waits on
    pub fn expected_declarants(&self) -> usize {
        self.characters
            .iter()
            .filter(|c| c.is_alive && !c.is_ai())
            .count()
    }

    pub fn alive_count(&self, team: Team) -> usize {
        self.characters
            .iter()
            .filter(|c| c.team == team && c.is_alive)
            .count()
    }

    pub fn pending_respawns(&self, team: Team) -> usize {
        self.characters
            .iter()
            .filter(|c| c.team == team && !c.is_alive && c.respawn_round.is_some())
            .count()
    }

    pub fn core(&self, team: Team) -> Option<&Structure> {
        self.structures
            .iter()
            .find(|s| s.team == team && s.kind == StructureKind::Core)
    }

    /// Total HP of a team's standing structures
    pub fn structure_hp(&self, team: Team) -> u32 {
        self.structures
            .iter()
            .filter(|s| s.team == team && !s.destroyed)
            .map(|s| s.current_hp)
            .sum()
    }

    pub fn accepts_declarations(&self) -> bool {
        self.status == GameStatus::InProgress && self.phase == GamePhase::Declaring
    }

    pub fn is_finished(&self) -> bool {
        self.phase == GamePhase::Finished
    }
}
