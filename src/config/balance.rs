//! Balance tables injected into the combat and round resolvers

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::game::declaration::ActionKind;
use crate::game::model::{Role, StatKind, Stats};

use super::ConfigError;

/// Per-level growth of a role
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Growth {
    pub stats: Stats,
    pub max_hp: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SkillEffect {
    /// Restore HP to an ally (or self when untargeted)
    Heal { amount: u32 },
    /// Timed stat bonus on an ally (or self when untargeted)
    Buff { stat: StatKind, amount: i32, rounds: u32 },
    /// Timed stat penalty on an enemy
    Debuff { stat: StatKind, amount: i32, rounds: u32 },
    /// Unblockable damage on an enemy
    Strike { damage: u32 },
}

impl SkillEffect {
    /// Whether the skill must name an enemy target
    pub fn targets_enemy(&self) -> bool {
        matches!(self, SkillEffect::Debuff { .. } | SkillEffect::Strike { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillSpec {
    pub name: String,
    pub effect: SkillEffect,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleProfile {
    pub role: Role,
    pub max_hp: u32,
    pub stats: Stats,
    pub growth: Growth,
    /// Role eligibility predicate, data-driven
    pub allowed_actions: Vec<ActionKind>,
    pub skills: Vec<SkillSpec>,
}

impl RoleProfile {
    pub fn allows(&self, kind: ActionKind) -> bool {
        kind == ActionKind::Wait || self.allowed_actions.contains(&kind)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSpec {
    pub id: String,
    pub name: String,
    pub cost: u32,
    #[serde(default)]
    pub attack: i32,
    #[serde(default)]
    pub defense: i32,
    /// Flat bonus added to every successful hit
    #[serde(default)]
    pub damage: u32,
    #[serde(default)]
    pub max_hp: u32,
}

/// Combat and economy tuning. Reloading means building a new resolver from a new table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BalanceConfig {
    /// Random component of attack and defense rolls, inclusive
    pub roll_min: i32,
    pub roll_max: i32,
    /// Attack roll component at or above this doubles the damage
    pub critical_threshold: i32,
    /// Base damage range of a successful hit, inclusive
    pub damage_min: u32,
    pub damage_max: u32,

    pub kill_currency: u32,
    pub kill_experience: u32,
    pub farm_currency: u32,
    pub farm_experience: u32,

    pub siege_damage: u32,
    pub structure_bounty: u32,
    pub structure_experience: u32,
    /// Only the first declared ally damages a contested structure
    pub exclusive_siege: bool,

    pub respawn_delay_rounds: u32,
    /// Deaths after which a character stays down; unlimited when unset
    pub respawn_limit: Option<u32>,

    /// Experience needed to leave level `i + 1`; max level is `len + 1`
    pub level_thresholds: Vec<u32>,
    pub max_rounds: u32,

    pub tower_hp: u32,
    pub core_hp: u32,
    pub camp_respawn_rounds: u32,

    pub roles: Vec<RoleProfile>,
    pub items: Vec<ItemSpec>,
}

impl Default for BalanceConfig {
    fn default() -> Self {
        Self {
            roll_min: 1,
            roll_max: 20,
            critical_threshold: 20,
            damage_min: 8,
            damage_max: 14,
            kill_currency: 300,
            kill_experience: 120,
            farm_currency: 60,
            farm_experience: 45,
            siege_damage: 150,
            structure_bounty: 250,
            structure_experience: 100,
            exclusive_siege: true,
            respawn_delay_rounds: 2,
            respawn_limit: None,
            level_thresholds: (0..17).map(|i| 100 + i * 40).collect(),
            max_rounds: 60,
            tower_hp: 600,
            core_hp: 1200,
            camp_respawn_rounds: 3,
            roles: default_roles(),
            items: default_items(),
        }
    }
}

impl BalanceConfig {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::BalanceFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.roll_min > self.roll_max {
            return Err(ConfigError::Balance("roll_min exceeds roll_max".into()));
        }
        if self.damage_min > self.damage_max {
            return Err(ConfigError::Balance("damage_min exceeds damage_max".into()));
        }
        if self.respawn_delay_rounds == 0 {
            return Err(ConfigError::Balance("respawn_delay_rounds must be at least 1".into()));
        }
        if self.max_rounds == 0 {
            return Err(ConfigError::Balance("max_rounds must be at least 1".into()));
        }
        if self.tower_hp == 0 || self.core_hp == 0 {
            return Err(ConfigError::Balance("structure HP must be positive".into()));
        }
        if self.level_thresholds.iter().any(|&xp| xp == 0) {
            return Err(ConfigError::Balance("level thresholds must be positive".into()));
        }
        for role in Role::ALL {
            if self.role(role).is_none() {
                return Err(ConfigError::Balance(format!("missing profile for role {role:?}")));
            }
        }
        let mut ids = HashSet::new();
        for item in &self.items {
            if !ids.insert(item.id.as_str()) {
                return Err(ConfigError::Balance(format!("duplicate item id {}", item.id)));
            }
        }
        Ok(())
    }

    pub fn role(&self, role: Role) -> Option<&RoleProfile> {
        self.roles.iter().find(|p| p.role == role)
    }

    pub fn item(&self, id: &str) -> Option<&ItemSpec> {
        self.items.iter().find(|i| i.id == id)
    }

    pub fn max_level(&self) -> u32 {
        self.level_thresholds.len() as u32 + 1
    }

    /// Experience needed to advance past `level`, `None` at the cap
    pub fn experience_to_advance(&self, level: u32) -> Option<u32> {
        let index = level.checked_sub(1)? as usize;
        self.level_thresholds.get(index).copied()
    }
}

fn default_roles() -> Vec<RoleProfile> {
    let every_action = ActionKind::ALL.to_vec();
    let skill = |name: &str, effect| SkillSpec {
        name: name.to_string(),
        effect,
    };

    vec![
        RoleProfile {
            role: Role::Tank,
            max_hp: 160,
            stats: Stats::new(6, 9, 3, 3),
            growth: Growth {
                stats: Stats::new(1, 2, 0, 0),
                max_hp: 20,
            },
            allowed_actions: every_action.clone(),
            skills: vec![skill(
                "fortify",
                SkillEffect::Buff {
                    stat: StatKind::Defense,
                    amount: 3,
                    rounds: 2,
                },
            )],
        },
        RoleProfile {
            role: Role::Fighter,
            max_hp: 130,
            stats: Stats::new(9, 6, 4, 2),
            growth: Growth {
                stats: Stats::new(2, 1, 0, 0),
                max_hp: 15,
            },
            allowed_actions: every_action.clone(),
            skills: vec![skill("cleave", SkillEffect::Strike { damage: 12 })],
        },
        RoleProfile {
            role: Role::Mage,
            max_hp: 100,
            stats: Stats::new(10, 4, 3, 6),
            growth: Growth {
                stats: Stats::new(2, 0, 0, 1),
                max_hp: 10,
            },
            allowed_actions: every_action.clone(),
            skills: vec![
                skill("bolt", SkillEffect::Strike { damage: 18 }),
                skill(
                    "hex",
                    SkillEffect::Debuff {
                        stat: StatKind::Defense,
                        amount: 3,
                        rounds: 2,
                    },
                ),
            ],
        },
        RoleProfile {
            role: Role::Marksman,
            max_hp: 100,
            stats: Stats::new(11, 3, 4, 2),
            growth: Growth {
                stats: Stats::new(2, 0, 1, 0),
                max_hp: 10,
            },
            allowed_actions: every_action.clone(),
            skills: vec![skill("volley", SkillEffect::Strike { damage: 10 })],
        },
        RoleProfile {
            role: Role::Support,
            max_hp: 110,
            stats: Stats::new(5, 5, 4, 8),
            growth: Growth {
                stats: Stats::new(0, 1, 0, 2),
                max_hp: 12,
            },
            allowed_actions: every_action,
            skills: vec![
                skill("mend", SkillEffect::Heal { amount: 25 }),
                skill(
                    "rally",
                    SkillEffect::Buff {
                        stat: StatKind::Attack,
                        amount: 3,
                        rounds: 2,
                    },
                ),
            ],
        },
    ]
}

fn default_items() -> Vec<ItemSpec> {
    let item = |id: &str, name: &str, cost| ItemSpec {
        id: id.to_string(),
        name: name.to_string(),
        cost,
        attack: 0,
        defense: 0,
        damage: 0,
        max_hp: 0,
    };

    vec![
        ItemSpec {
            attack: 3,
            ..item("long_sword", "Long Sword", 350)
        },
        ItemSpec {
            defense: 3,
            ..item("cloth_armor", "Cloth Armor", 300)
        },
        ItemSpec {
            max_hp: 40,
            ..item("giants_belt", "Giant's Belt", 400)
        },
        ItemSpec {
            attack: 2,
            damage: 5,
            ..item("blade_of_fury", "Blade of Fury", 700)
        },
    ]
}
