//! Lobby coordination.
//!
//! Before the match the server only knows a roster; afterwards it owns a
//! simulation. `Phase` makes the two mutually exclusive, and the move from
//! `Lobby` to `Running` happens at most once.

use flotilla_shared::{
    net::Message,
    state::{LobbyPlayer, PlayerId},
};

use crate::{registry::ConnectionRegistry, sim::Simulation};

/// Match lifecycle. There is no way back from `Running`.
pub enum Phase {
    Lobby,
    Running(Simulation),
}

impl Phase {
    pub fn is_started(&self) -> bool {
        matches!(self, Phase::Running(_))
    }

    pub fn simulation(&self) -> Option<&Simulation> {
        match self {
            Phase::Running(sim) => Some(sim),
            Phase::Lobby => None,
        }
    }

    pub fn simulation_mut(&mut self) -> Option<&mut Simulation> {
        match self {
            Phase::Running(sim) => Some(sim),
            Phase::Lobby => None,
        }
    }
}

/// Pre-game view, rebuilt for every broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LobbyState {
    pub players: Vec<LobbyPlayer>,
}

impl LobbyState {
    pub fn snapshot(registry: &ConnectionRegistry) -> Self {
        Self {
            players: registry.roster(),
        }
    }

    pub fn into_message(self) -> Message {
        Message::LobbyUpdate {
            players: self.players,
        }
    }
}

/// Whether `requester` may start the match right now: only the host, and
/// only while still in the lobby.
pub fn may_start(phase: &Phase, registry: &ConnectionRegistry, requester: PlayerId) -> bool {
    !phase.is_started() && registry.host() == Some(requester)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbound::Outbound;
    use flotilla_shared::world::World;
    use std::sync::Arc;

    fn queue() -> Outbound {
        Outbound::channel(1).0
    }

    #[test]
    fn only_host_may_start_and_only_once() {
        let mut reg = ConnectionRegistry::new(4);
        let host = reg.register("a".into(), queue()).unwrap();
        let guest = reg.register("b".into(), queue()).unwrap();

        let mut phase = Phase::Lobby;
        assert!(!may_start(&phase, &reg, guest));
        assert!(may_start(&phase, &reg, host));

        phase = Phase::Running(Simulation::start(
            1,
            &reg.ids(),
            Arc::new(World::ocean(10, 10)),
        ));
        assert!(!may_start(&phase, &reg, host));
        assert!(phase.simulation().is_some());
    }

    #[test]
    fn lobby_message_lists_roster() {
        let mut reg = ConnectionRegistry::new(4);
        reg.register("10.0.0.1:5000".into(), queue()).unwrap();
        let msg = LobbyState::snapshot(&reg).into_message();
        match msg {
            Message::LobbyUpdate { players } => {
                assert_eq!(players.len(), 1);
                assert_eq!(players[0].addr, "10.0.0.1:5000");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
