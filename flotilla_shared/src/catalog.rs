//! Unit catalog.
//!
//! Every unit is one record tagged with a [`UnitKind`]; the per-kind numbers
//! live in a read-only table. Behaviour differences are checks against the
//! table (a speed of zero means the unit never moves).

use serde::{Deserialize, Serialize};

/// Fixed catalog of unit types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    CommandCenter,
    Cruiser,
    Scout,
}

/// Constants for one unit type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitStats {
    /// Distance moved per simulation tick.
    pub speed: f32,
    pub hp: u32,
    /// Distance within which opposing units are revealed to the owner.
    pub radar_range: f32,
    /// Artillery reach; only cruisers carry guns.
    pub fire_range: Option<f32>,
}

const COMMAND_CENTER: UnitStats = UnitStats {
    speed: 0.0,
    hp: 500,
    radar_range: 180.0,
    fire_range: None,
};

const CRUISER: UnitStats = UnitStats {
    speed: 4.0,
    hp: 150,
    radar_range: 120.0,
    fire_range: Some(250.0),
};

const SCOUT: UnitStats = UnitStats {
    speed: 8.0,
    hp: 50,
    radar_range: 200.0,
    fire_range: None,
};

impl UnitKind {
    /// Every kind, in the order a player's starting fleet is spawned.
    pub const ALL: [UnitKind; 3] = [UnitKind::CommandCenter, UnitKind::Cruiser, UnitKind::Scout];

    pub const fn stats(self) -> &'static UnitStats {
        match self {
            UnitKind::CommandCenter => &COMMAND_CENTER,
            UnitKind::Cruiser => &CRUISER,
            UnitKind::Scout => &SCOUT,
        }
    }

    pub fn is_movable(self) -> bool {
        self.stats().speed > 0.0
    }

    pub fn name(self) -> &'static str {
        match self {
            UnitKind::CommandCenter => "command_center",
            UnitKind::Cruiser => "cruiser",
            UnitKind::Scout => "scout",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_center_is_immovable() {
        assert!(!UnitKind::CommandCenter.is_movable());
        assert!(UnitKind::Cruiser.is_movable());
        assert!(UnitKind::Scout.is_movable());
    }

    #[test]
    fn kind_names_match_wire_tags() {
        for kind in UnitKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.name()));
        }
    }

    #[test]
    fn scout_is_fastest() {
        assert_eq!(UnitKind::Scout.stats().speed, 8.0);
        assert_eq!(UnitKind::Scout.stats().hp, 50);
        assert!(UnitKind::Cruiser.stats().fire_range.is_some());
    }
}
