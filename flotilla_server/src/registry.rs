//! Connection registry.
//!
//! Tracks which peers are connected and under which player identity. Ids are
//! issued from 1 upward and never reused within a process, even after a
//! disconnect. The registry is not synchronized itself; it lives inside the
//! server's single exclusive section (see `session`).

use std::collections::BTreeMap;

use flotilla_shared::state::{LobbyPlayer, PlayerId};

use crate::outbound::Outbound;

/// Why a connection was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum JoinRefused {
    #[error("server is full ({0} players)")]
    Full(usize),
    #[error("match already started")]
    MatchStarted,
}

/// One registered player.
pub struct PlayerSlot {
    pub id: PlayerId,
    pub addr: String,
    pub outbound: Outbound,
}

/// Registered players keyed by id.
pub struct ConnectionRegistry {
    players: BTreeMap<PlayerId, PlayerSlot>,
    next_id: u32,
    max_players: usize,
}

impl ConnectionRegistry {
    pub fn new(max_players: usize) -> Self {
        Self {
            players: BTreeMap::new(),
            next_id: 1,
            max_players,
        }
    }

    /// Admits a peer if there is room and returns its fresh identity.
    pub fn register(
        &mut self,
        addr: String,
        outbound: Outbound,
    ) -> Result<PlayerId, JoinRefused> {
        if self.is_full() {
            return Err(JoinRefused::Full(self.max_players));
        }
        let id = PlayerId(self.next_id);
        self.next_id += 1;
        self.players.insert(id, PlayerSlot { id, addr, outbound });
        Ok(id)
    }

    pub fn remove(&mut self, id: PlayerId) -> Option<PlayerSlot> {
        self.players.remove(&id)
    }

    pub fn contains(&self, id: PlayerId) -> bool {
        self.players.contains_key(&id)
    }

    /// The host is whoever currently holds the lowest identity.
    pub fn host(&self) -> Option<PlayerId> {
        self.players.keys().next().copied()
    }

    pub fn ids(&self) -> Vec<PlayerId> {
        self.players.keys().copied().collect()
    }

    /// Lobby roster in id order.
    pub fn roster(&self) -> Vec<LobbyPlayer> {
        self.players
            .values()
            .map(|slot| LobbyPlayer {
                id: slot.id,
                addr: slot.addr.clone(),
            })
            .collect()
    }

    pub fn slots(&self) -> impl Iterator<Item = &PlayerSlot> {
        self.players.values()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.max_players
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= self.max_players
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn join(reg: &mut ConnectionRegistry, port: u16) -> Result<PlayerId, JoinRefused> {
        let (outbound, _) = Outbound::channel(1);
        reg.register(format!("127.0.0.1:{port}"), outbound)
    }

    #[test]
    fn ids_are_unique_and_increasing() {
        let mut reg = ConnectionRegistry::new(4);
        let ids: Vec<_> = (0..4).map(|i| join(&mut reg, 4000 + i).unwrap()).collect();
        assert_eq!(ids, vec![PlayerId(1), PlayerId(2), PlayerId(3), PlayerId(4)]);
    }

    #[test]
    fn capacity_is_enforced() {
        let mut reg = ConnectionRegistry::new(2);
        join(&mut reg, 1).unwrap();
        join(&mut reg, 2).unwrap();
        assert_eq!(join(&mut reg, 3), Err(JoinRefused::Full(2)));
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn ids_are_not_reused_after_disconnect() {
        let mut reg = ConnectionRegistry::new(2);
        let first = join(&mut reg, 1).unwrap();
        join(&mut reg, 2).unwrap();
        assert!(reg.remove(first).is_some());
        assert_eq!(join(&mut reg, 3).unwrap(), PlayerId(3));
    }

    #[test]
    fn host_moves_to_next_lowest_id() {
        let mut reg = ConnectionRegistry::new(4);
        let a = join(&mut reg, 1).unwrap();
        let b = join(&mut reg, 2).unwrap();
        assert_eq!(reg.host(), Some(a));
        reg.remove(a);
        assert_eq!(reg.host(), Some(b));
        reg.remove(b);
        assert_eq!(reg.host(), None);
    }

    #[test]
    fn roster_lists_players_in_id_order() {
        let mut reg = ConnectionRegistry::new(4);
        join(&mut reg, 7001).unwrap();
        join(&mut reg, 7002).unwrap();
        let roster = reg.roster();
        assert_eq!(roster.len(), 2);
        assert_eq!(roster[0].id, PlayerId(1));
        assert_eq!(roster[1].addr, "127.0.0.1:7002");
    }
}
