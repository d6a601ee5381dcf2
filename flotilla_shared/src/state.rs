//! Game state records shared by server and client.
//!
//! `GameState` is the canonical aggregate the server mutates once per tick and
//! replicates in full. Units are keyed by id in an ordered map so snapshots
//! iterate in a stable order.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{catalog::UnitKind, math::Vec2};

/// Server-assigned player identity. Issued from 1 upward, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayerId(pub u32);

impl std::fmt::Display for PlayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Globally increasing unit id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitId(pub u32);

/// One unit owned by one player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    pub id: UnitId,
    #[serde(rename = "type")]
    pub kind: UnitKind,
    pub owner: PlayerId,
    pub pos: Vec2,
    pub hp: u32,
    pub target_pos: Vec2,
}

impl Unit {
    /// Spawns a unit at `pos` with full hit points and no pending move.
    pub fn spawn(id: UnitId, kind: UnitKind, owner: PlayerId, pos: Vec2) -> Self {
        Self {
            id,
            kind,
            owner,
            pos,
            hp: kind.stats().hp,
            target_pos: pos,
        }
    }
}

/// Canonical match state.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GameState {
    pub world_seed: u64,
    pub units: BTreeMap<UnitId, Unit>,
    pub turn_number: u64,
}

impl GameState {
    pub fn new(world_seed: u64) -> Self {
        Self {
            world_seed,
            units: BTreeMap::new(),
            turn_number: 0,
        }
    }

    pub fn units_of(&self, owner: PlayerId) -> impl Iterator<Item = &Unit> {
        self.units.values().filter(move |u| u.owner == owner)
    }
}

/// What a command asks a unit to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Move,
}

/// A client intent for one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub unit_id: UnitId,
    pub action: Action,
    pub target: Vec2,
}

impl Command {
    pub fn move_to(unit_id: UnitId, target: Vec2) -> Self {
        Self {
            unit_id,
            action: Action::Move,
            target,
        }
    }
}

/// One roster row of the pre-game lobby.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LobbyPlayer {
    pub id: PlayerId,
    pub addr: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawned_unit_has_catalog_hp_and_no_target() {
        let u = Unit::spawn(UnitId(7), UnitKind::Cruiser, PlayerId(2), Vec2::new(10.0, 20.0));
        assert_eq!(u.hp, 150);
        assert_eq!(u.target_pos, u.pos);
    }

    #[test]
    fn unit_wire_shape() {
        let u = Unit::spawn(UnitId(1), UnitKind::Scout, PlayerId(1), Vec2::new(1.0, 2.0));
        let v = serde_json::to_value(&u).unwrap();
        assert_eq!(v["type"], "scout");
        assert_eq!(v["owner"], 1);
        assert_eq!(v["pos"], serde_json::json!([1.0, 2.0]));
        assert_eq!(v["target_pos"], serde_json::json!([1.0, 2.0]));
    }

    #[test]
    fn game_state_keys_survive_json() {
        let mut state = GameState::new(99);
        let u = Unit::spawn(UnitId(3), UnitKind::Scout, PlayerId(1), Vec2::ZERO);
        state.units.insert(u.id, u);
        let json = serde_json::to_string(&state).unwrap();
        let back: GameState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}
