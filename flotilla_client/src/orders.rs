//! Outbound order queue.
//!
//! Orders are coalesced by unit: a newer order for a unit replaces the older
//! one. The server keeps only a player's latest `client_commands` for the
//! next tick, so every submission carries the whole live set rather than
//! just what changed. An order stays live until the snapshots show the
//! server has had a tick to apply it.

use std::collections::BTreeMap;

use flotilla_shared::{
    math::Vec2,
    state::{Command, UnitId},
};

/// Turns past its last send after which an order counts as applied. When an
/// order goes out the next tick may already be running, so only the tick
/// after that is certain to have drained it.
pub const RETIRE_AFTER_TURNS: u64 = 2;

#[derive(Debug)]
struct Order {
    command: Command,
    /// Turn the client had seen when this order last went out.
    sent_at: Option<u64>,
}

#[derive(Debug, Default)]
pub struct OrderQueue {
    live: BTreeMap<UnitId, Order>,
    changed: bool,
}

impl OrderQueue {
    pub fn issue_move(&mut self, unit: UnitId, target: Vec2) {
        let command = Command::move_to(unit, target);
        self.live.insert(unit, Order { command, sent_at: None });
        self.changed = true;
    }

    /// The full live set in unit id order, or `None` if nothing changed
    /// since the last batch. Marks every order as sent at `turn`.
    pub fn batch(&mut self, turn: u64) -> Option<Vec<Command>> {
        if !self.changed {
            return None;
        }
        self.changed = false;
        let batch = self
            .live
            .values_mut()
            .map(|order| {
                order.sent_at = Some(turn);
                order.command.clone()
            })
            .collect();
        Some(batch)
    }

    /// Drops the orders a snapshot at `turn` proves were applied. Returns
    /// how many went.
    pub fn retire(&mut self, turn: u64) -> usize {
        let before = self.live.len();
        self.live.retain(|_, order| {
            order
                .sent_at
                .map_or(true, |sent| turn < sent + RETIRE_AFTER_TURNS)
        });
        before - self.live.len()
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_order_replaces_unsent_one() {
        let mut q = OrderQueue::default();
        q.issue_move(UnitId(2), Vec2::new(1.0, 1.0));
        q.issue_move(UnitId(1), Vec2::new(5.0, 5.0));
        q.issue_move(UnitId(2), Vec2::new(9.0, 9.0));
        assert_eq!(q.len(), 2);

        let sent = q.batch(0).unwrap();
        assert_eq!(
            sent,
            vec![
                Command::move_to(UnitId(1), Vec2::new(5.0, 5.0)),
                Command::move_to(UnitId(2), Vec2::new(9.0, 9.0)),
            ]
        );
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn later_batch_still_carries_earlier_orders() {
        let mut q = OrderQueue::default();
        q.issue_move(UnitId(2), Vec2::new(1.0, 1.0));
        assert_eq!(q.batch(4).unwrap().len(), 1);
        assert!(q.batch(4).is_none(), "nothing new");

        q.issue_move(UnitId(7), Vec2::new(3.0, 3.0));
        let sent = q.batch(4).unwrap();
        assert_eq!(
            sent,
            vec![
                Command::move_to(UnitId(2), Vec2::new(1.0, 1.0)),
                Command::move_to(UnitId(7), Vec2::new(3.0, 3.0)),
            ]
        );
    }

    #[test]
    fn orders_retire_once_a_full_tick_has_passed() {
        let mut q = OrderQueue::default();
        q.issue_move(UnitId(1), Vec2::new(1.0, 1.0));
        q.batch(10);
        q.issue_move(UnitId(2), Vec2::new(2.0, 2.0));

        assert_eq!(q.retire(11), 0, "turn 11 may have run before the send arrived");
        assert_eq!(q.retire(12), 1);
        // Never sent, so never retired.
        assert_eq!(q.retire(50), 0);
        assert_eq!(q.batch(50).unwrap(), vec![Command::move_to(UnitId(2), Vec2::new(2.0, 2.0))]);
        assert_eq!(q.retire(52), 1);
        assert!(q.is_empty());
    }
}
