//! Authoritative simulation.
//!
//! One tick:
//! 1. Apply the drained commands: a move order sets the target of a unit the
//!    submitting player owns, clamped to the map; anything else, including a
//!    non-finite target, is dropped without a reply.
//! 2. Advance every movable unit by its catalog speed toward its target. A
//!    target on land, or a step that would end on land, is refused and the
//!    unit stops in place.
//! 3. Increment the turn counter.
//!
//! Determinism notes:
//! - Commands are applied in player-id order, then submission order.
//! - Units advance in unit-id order.
//! - No wall-clock input; the driver decides when a tick happens.

use std::sync::Arc;

use flotilla_shared::{
    catalog::UnitKind,
    math::Vec2,
    state::{Action, Command, GameState, PlayerId, Unit, UnitId},
    world::Terrain,
};
use tracing::debug;

use crate::commands::Drained;

/// Distance below which a unit counts as arrived.
pub const ARRIVAL_EPSILON: f32 = 0.01;

/// Offsets of a player's fleet from its start point, in spawn order.
const FLEET_LAYOUT: [(UnitKind, Vec2); 3] = [
    (UnitKind::CommandCenter, Vec2::new(0.0, 0.0)),
    (UnitKind::Cruiser, Vec2::new(50.0, 0.0)),
    (UnitKind::Scout, Vec2::new(50.0, 50.0)),
];

/// Inset of the corner starts used when the world offers too few islands.
const CORNER_INSET: f32 = 200.0;

/// How many tiles out a ship spawning on land looks for water.
const WATER_SEARCH_RINGS: i32 = 96;

/// What happened to one unit during a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Speed zero.
    Stationary,
    Arrived,
    Moved,
    /// The target or the next step is on land; the unit stopped.
    Blocked,
}

pub struct Simulation {
    state: GameState,
    terrain: Arc<dyn Terrain>,
    next_unit_id: u32,
}

impl Simulation {
    /// Creates the match and spawns one fleet per player, in id order.
    pub fn start(world_seed: u64, players: &[PlayerId], terrain: Arc<dyn Terrain>) -> Self {
        let mut sim = Self {
            state: GameState::new(world_seed),
            terrain,
            next_unit_id: 1,
        };
        for (index, &player) in players.iter().enumerate() {
            let origin = sim.start_position(index);
            for (kind, offset) in FLEET_LAYOUT {
                let pos = sim.placement(kind, origin + offset);
                sim.spawn(kind, player, pos);
            }
        }
        sim
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn unit(&self, id: UnitId) -> Option<&Unit> {
        self.state.units.get(&id)
    }

    fn spawn(&mut self, kind: UnitKind, owner: PlayerId, pos: Vec2) -> UnitId {
        let id = UnitId(self.next_unit_id);
        self.next_unit_id += 1;
        self.state.units.insert(id, Unit::spawn(id, kind, owner, pos));
        id
    }

    /// Ships go to the nearest water; the command center stays put.
    fn placement(&self, kind: UnitKind, pos: Vec2) -> Vec2 {
        if !kind.is_movable() {
            return pos;
        }
        match self.terrain.nearest_water(pos, WATER_SEARCH_RINGS) {
            Some(water) => water,
            None => {
                debug!(?kind, ?pos, "No water near start point");
                pos
            }
        }
    }

    fn start_position(&self, index: usize) -> Vec2 {
        if let Some(&point) = self.terrain.spawn_points().get(index) {
            return point;
        }
        let size = self.terrain.size();
        let corners = [
            Vec2::new(CORNER_INSET, CORNER_INSET),
            Vec2::new(size.x - CORNER_INSET, size.y - CORNER_INSET),
            Vec2::new(CORNER_INSET, size.y - CORNER_INSET),
            Vec2::new(size.x - CORNER_INSET, CORNER_INSET),
        ];
        corners[index % corners.len()]
    }

    /// Applies drained commands and returns how many took effect.
    pub fn apply_commands(&mut self, drained: &Drained) -> usize {
        let mut applied = 0;
        for (&player, commands) in drained {
            for command in commands {
                if self.apply_command(player, command) {
                    applied += 1;
                }
            }
        }
        applied
    }

    fn apply_command(&mut self, player: PlayerId, command: &Command) -> bool {
        let Some(unit) = self.state.units.get_mut(&command.unit_id) else {
            debug!(player_id = %player, unit = ?command.unit_id, "Command for unknown unit dropped");
            return false;
        };
        if unit.owner != player {
            debug!(player_id = %player, unit = ?unit.id, owner = %unit.owner, "Command for foreign unit dropped");
            return false;
        }
        match command.action {
            Action::Move => {
                if !unit.kind.is_movable() {
                    debug!(player_id = %player, unit = ?unit.id, "Move order for immovable unit dropped");
                    return false;
                }
                if !command.target.is_finite() {
                    debug!(player_id = %player, unit = ?unit.id, "Non-finite move target dropped");
                    return false;
                }
                unit.target_pos = command.target.clamp(Vec2::ZERO, self.terrain.size());
                true
            }
        }
    }

    /// Moves every unit one step toward its target.
    pub fn advance_units(&mut self) {
        let terrain = self.terrain.as_ref();
        for unit in self.state.units.values_mut() {
            let outcome = step_unit(unit, terrain);
            if outcome == StepOutcome::Blocked {
                debug!(unit = ?unit.id, pos = ?unit.pos, "Unit blocked by land");
            }
        }
    }

    /// Runs one full tick and returns the resulting state.
    pub fn tick(&mut self, drained: &Drained) -> &GameState {
        self.apply_commands(drained);
        self.advance_units();
        self.state.turn_number += 1;
        &self.state
    }
}

/// Advances one unit by at most its speed, refusing land targets and steps
/// onto land.
pub fn step_unit(unit: &mut Unit, terrain: &dyn Terrain) -> StepOutcome {
    let speed = unit.kind.stats().speed;
    if speed <= 0.0 {
        return StepOutcome::Stationary;
    }
    let to_target = unit.target_pos - unit.pos;
    let distance = to_target.len();
    if distance < ARRIVAL_EPSILON {
        return StepOutcome::Arrived;
    }
    let candidate = match to_target.normalized() {
        Some(dir) if distance > speed => unit.pos + dir * speed,
        _ => unit.target_pos,
    };
    if terrain.is_land(unit.target_pos) || terrain.is_land(candidate) {
        unit.target_pos = unit.pos;
        return StepOutcome::Blocked;
    }
    unit.pos = candidate;
    StepOutcome::Moved
}
