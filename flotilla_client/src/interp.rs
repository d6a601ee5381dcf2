//! Interpolation.
//!
//! The server sends whole snapshots at tick boundaries, far slower than the
//! client draws. Each unit proxy keeps the last authoritative position and a
//! displayed position that closes a fixed fraction of the gap every frame.
//! Nothing here feeds back into the authoritative state.

use std::collections::BTreeMap;

use flotilla_shared::{
    catalog::UnitKind,
    math::Vec2,
    state::{GameState, PlayerId, Unit, UnitId},
};

/// Client-side view of one unit.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitProxy {
    pub id: UnitId,
    pub kind: UnitKind,
    pub owner: PlayerId,
    /// Last position reported by the server.
    pub server_pos: Vec2,
    /// Where the unit is drawn.
    pub display_pos: Vec2,
    pub target_pos: Vec2,
    pub hp: u32,
}

impl UnitProxy {
    fn from_unit(unit: &Unit) -> Self {
        Self {
            id: unit.id,
            kind: unit.kind,
            owner: unit.owner,
            server_pos: unit.pos,
            display_pos: unit.pos,
            target_pos: unit.target_pos,
            hp: unit.hp,
        }
    }

    fn update(&mut self, unit: &Unit) {
        self.kind = unit.kind;
        self.owner = unit.owner;
        self.server_pos = unit.pos;
        self.target_pos = unit.target_pos;
        self.hp = unit.hp;
    }
}

/// Applies snapshots and smooths displayed positions.
#[derive(Debug)]
pub struct Reconciler {
    proxies: BTreeMap<UnitId, UnitProxy>,
    smoothing: f32,
    turn: Option<u64>,
    world_seed: Option<u64>,
}

impl Reconciler {
    /// `smoothing` is the fraction of the remaining distance covered per
    /// step, clamped to `(0, 1]`.
    pub fn new(smoothing: f32) -> Self {
        Self {
            proxies: BTreeMap::new(),
            smoothing: smoothing.clamp(f32::EPSILON, 1.0),
            turn: None,
            world_seed: None,
        }
    }

    /// Replaces the authoritative side of every proxy. New units appear at
    /// their server position; units missing from the snapshot are dropped.
    /// Returns false for a snapshot older than the one already applied.
    pub fn apply_snapshot(&mut self, state: &GameState) -> bool {
        if self.turn.is_some_and(|t| state.turn_number < t) {
            return false;
        }
        self.proxies.retain(|id, _| state.units.contains_key(id));
        for (id, unit) in &state.units {
            self.proxies
                .entry(*id)
                .and_modify(|p| p.update(unit))
                .or_insert_with(|| UnitProxy::from_unit(unit));
        }
        self.turn = Some(state.turn_number);
        self.world_seed = Some(state.world_seed);
        true
    }

    /// One local frame of exponential smoothing.
    pub fn step(&mut self) {
        for proxy in self.proxies.values_mut() {
            proxy.display_pos = proxy.display_pos.lerp(proxy.server_pos, self.smoothing);
        }
    }

    pub fn turn(&self) -> Option<u64> {
        self.turn
    }

    pub fn world_seed(&self) -> Option<u64> {
        self.world_seed
    }

    pub fn unit(&self, id: UnitId) -> Option<&UnitProxy> {
        self.proxies.get(&id)
    }

    pub fn units(&self) -> impl Iterator<Item = &UnitProxy> {
        self.proxies.values()
    }

    pub fn units_of(&self, owner: PlayerId) -> impl Iterator<Item = &UnitProxy> {
        self.proxies.values().filter(move |p| p.owner == owner)
    }

    /// Opposing units inside the radar range of at least one of `player`'s
    /// units, measured on authoritative positions.
    pub fn visible_to(&self, player: PlayerId) -> Vec<&UnitProxy> {
        let radars: Vec<(Vec2, f32)> = self
            .units_of(player)
            .map(|p| (p.server_pos, p.kind.stats().radar_range))
            .collect();
        self.proxies
            .values()
            .filter(|p| p.owner != player)
            .filter(|p| {
                radars
                    .iter()
                    .any(|(pos, range)| pos.distance(p.server_pos) <= *range)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(turn: u64, units: &[(u32, UnitKind, u32, Vec2)]) -> GameState {
        let mut s = GameState::new(7);
        s.turn_number = turn;
        for &(id, kind, owner, pos) in units {
            s.units
                .insert(UnitId(id), Unit::spawn(UnitId(id), kind, PlayerId(owner), pos));
        }
        s
    }

    #[test]
    fn new_units_appear_at_server_position() {
        let mut r = Reconciler::new(0.2);
        r.apply_snapshot(&state(0, &[(1, UnitKind::Scout, 1, Vec2::new(10.0, 10.0))]));
        let p = r.unit(UnitId(1)).unwrap();
        assert_eq!(p.display_pos, p.server_pos);
        assert_eq!(r.turn(), Some(0));
        assert_eq!(r.world_seed(), Some(7));
    }

    #[test]
    fn display_closes_a_fraction_of_the_gap() {
        let mut r = Reconciler::new(0.25);
        r.apply_snapshot(&state(0, &[(1, UnitKind::Scout, 1, Vec2::ZERO)]));
        r.apply_snapshot(&state(1, &[(1, UnitKind::Scout, 1, Vec2::new(8.0, 0.0))]));

        // No snapping on the snapshot itself.
        assert_eq!(r.unit(UnitId(1)).unwrap().display_pos, Vec2::ZERO);
        r.step();
        assert!((r.unit(UnitId(1)).unwrap().display_pos.x - 2.0).abs() < 1e-5);
        r.step();
        assert!((r.unit(UnitId(1)).unwrap().display_pos.x - 3.5).abs() < 1e-5);
        assert_eq!(r.unit(UnitId(1)).unwrap().server_pos.x, 8.0);
    }

    #[test]
    fn stale_snapshot_is_ignored_and_missing_units_dropped() {
        let mut r = Reconciler::new(0.2);
        r.apply_snapshot(&state(
            3,
            &[
                (1, UnitKind::Scout, 1, Vec2::ZERO),
                (2, UnitKind::Cruiser, 1, Vec2::ZERO),
            ],
        ));
        assert!(!r.apply_snapshot(&state(2, &[])));
        assert_eq!(r.units().count(), 2);

        assert!(r.apply_snapshot(&state(4, &[(2, UnitKind::Cruiser, 1, Vec2::ZERO)])));
        assert!(r.unit(UnitId(1)).is_none());
        assert_eq!(r.units_of(PlayerId(1)).count(), 1);
    }

    #[test]
    fn radar_reveals_only_nearby_opponents() {
        let mut r = Reconciler::new(0.2);
        r.apply_snapshot(&state(
            0,
            &[
                (1, UnitKind::Scout, 1, Vec2::ZERO),
                (2, UnitKind::Cruiser, 2, Vec2::new(150.0, 0.0)),
                (3, UnitKind::Cruiser, 2, Vec2::new(500.0, 0.0)),
            ],
        ));
        let seen: Vec<UnitId> = r.visible_to(PlayerId(1)).iter().map(|p| p.id).collect();
        assert_eq!(seen, vec![UnitId(2)]);

        // Cruiser radar (120) does not reach the scout 150 away.
        assert!(r.visible_to(PlayerId(2)).is_empty());
    }
}
