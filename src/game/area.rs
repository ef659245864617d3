//! Static area graph used to validate movement

use serde::{Deserialize, Serialize};

use super::model::Team;

/// Named zones of the map
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Area {
    BaseA,
    BaseB,
    TopLane,
    MidLane,
    BotLane,
    JungleA,
    JungleB,
    /// Objective pit next to the bottom lane
    DragonPit,
    /// Objective pit next to the top lane
    BaronPit,
}

/// Undirected edges of the map. Never mutated at runtime.
const LINKS: &[(Area, Area)] = &[
    (Area::BaseA, Area::TopLane),
    (Area::BaseA, Area::MidLane),
    (Area::BaseA, Area::BotLane),
    (Area::BaseA, Area::JungleA),
    (Area::BaseB, Area::TopLane),
    (Area::BaseB, Area::MidLane),
    (Area::BaseB, Area::BotLane),
    (Area::BaseB, Area::JungleB),
    (Area::TopLane, Area::JungleA),
    (Area::TopLane, Area::BaronPit),
    (Area::MidLane, Area::JungleA),
    (Area::MidLane, Area::JungleB),
    (Area::BotLane, Area::JungleB),
    (Area::BotLane, Area::DragonPit),
    (Area::JungleA, Area::DragonPit),
    (Area::JungleB, Area::BaronPit),
];

impl Area {
    pub const ALL: [Area; 9] = [
        Area::BaseA,
        Area::BaseB,
        Area::TopLane,
        Area::MidLane,
        Area::BotLane,
        Area::JungleA,
        Area::JungleB,
        Area::DragonPit,
        Area::BaronPit,
    ];

    pub const LANES: [Area; 3] = [Area::TopLane, Area::MidLane, Area::BotLane];

    /// Spawn and recall point of a team
    pub fn base_of(team: Team) -> Self {
        match team {
            Team::A => Area::BaseA,
            Team::B => Area::BaseB,
        }
    }

    /// Check whether two distinct areas share an edge
    pub fn is_adjacent(self, other: Area) -> bool {
        LINKS
            .iter()
            .any(|&(a, b)| (a == self && b == other) || (a == other && b == self))
    }

    /// Areas reachable in a single move
    pub fn neighbors(self) -> impl Iterator<Item = Area> {
        LINKS.iter().filter_map(move |&(a, b)| {
            if a == self {
                Some(b)
            } else if b == self {
                Some(a)
            } else {
                None
            }
        })
    }
}
