//! The server's exclusive section.
//!
//! `Session` aggregates everything shared between connection handlers and
//! the scheduler: the registry, the command buffer and the match phase. The
//! server keeps exactly one behind a single async mutex, so every mutation
//! and every snapshot taken for a broadcast sees a consistent whole.

use std::sync::Arc;

use flotilla_shared::{
    net::{encode_frame, Message},
    state::{Command, PlayerId},
    world::WorldSource,
};
use tracing::{debug, info, warn};

use crate::{
    commands::CommandBuffer,
    lobby::{may_start, LobbyState, Phase},
    outbound::Outbound,
    registry::{ConnectionRegistry, JoinRefused},
    sim::Simulation,
};

pub struct Session {
    registry: ConnectionRegistry,
    commands: CommandBuffer,
    phase: Phase,
    worlds: Arc<dyn WorldSource>,
}

impl Session {
    pub fn new(max_players: usize, worlds: Arc<dyn WorldSource>) -> Self {
        Self {
            registry: ConnectionRegistry::new(max_players),
            commands: CommandBuffer::default(),
            phase: Phase::Lobby,
            worlds,
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn commands(&self) -> &CommandBuffer {
        &self.commands
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn is_started(&self) -> bool {
        self.phase.is_started()
    }

    /// Why a new peer would be turned away right now, if it would.
    pub fn admission(&self) -> Option<JoinRefused> {
        if self.phase.is_started() {
            Some(JoinRefused::MatchStarted)
        } else if self.registry.is_full() {
            Some(JoinRefused::Full(self.registry.capacity()))
        } else {
            None
        }
    }

    /// Registers a new peer, refusing it once the match has begun or the
    /// lobby is full.
    pub fn join(
        &mut self,
        addr: String,
        outbound: Outbound,
    ) -> Result<PlayerId, JoinRefused> {
        if let Some(refused) = self.admission() {
            return Err(refused);
        }
        let id = self.registry.register(addr, outbound)?;
        self.commands.add_player(id);
        Ok(id)
    }

    /// Forgets a player. Their units, if any, stay in the match.
    pub fn leave(&mut self, id: PlayerId) -> bool {
        self.commands.remove_player(id);
        self.registry.remove(id).is_some()
    }

    /// Replaces the player's pending commands. Ignored for unknown players.
    pub fn submit(&mut self, id: PlayerId, commands: Vec<Command>) {
        if self.registry.contains(id) {
            self.commands.submit(id, commands);
        }
    }

    /// The roster broadcast, or `None` once the match runs.
    pub fn lobby_update(&self) -> Option<Message> {
        if self.phase.is_started() {
            return None;
        }
        Some(LobbyState::snapshot(&self.registry).into_message())
    }

    /// Starts the match if `requester` is the host and it has not started
    /// yet. Returns the `start_game` message to broadcast.
    pub fn request_start(&mut self, requester: PlayerId, world_seed: u64) -> Option<Message> {
        if !may_start(&self.phase, &self.registry, requester) {
            debug!(player_id = %requester, "Start request ignored");
            return None;
        }
        let terrain = self.worlds.build(world_seed);
        let sim = Simulation::start(world_seed, &self.registry.ids(), terrain);
        // Orders given in the lobby reference no units.
        self.commands.drain_and_clear();
        let start = Message::StartGame(sim.state().clone());
        info!(
            host = %requester,
            players = self.registry.len(),
            units = sim.state().units.len(),
            world_seed,
            "Match started"
        );
        self.phase = Phase::Running(sim);
        Some(start)
    }

    /// Runs one simulation tick and returns the `game_update` to broadcast,
    /// or `None` while in the lobby.
    pub fn tick(&mut self) -> Option<Message> {
        let sim = self.phase.simulation_mut()?;
        let drained = self.commands.drain_and_clear();
        let state = sim.tick(&drained);
        Some(Message::GameUpdate(state.clone()))
    }

    /// Queues `msg` for every registered player and returns how many took
    /// it. Never waits on a socket. A player whose queue is full or whose
    /// writer has stopped is removed; the others still get the message.
    pub fn broadcast(&mut self, msg: &Message) -> usize {
        let frame = match encode_frame(msg) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(kind = msg.kind(), error = %e, "Failed to encode broadcast");
                return 0;
            }
        };
        let mut delivered = 0;
        let mut dropped = Vec::new();
        for slot in self.registry.slots() {
            match slot.outbound.push(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(player_id = %slot.id, kind = msg.kind(), error = %e, "Dropping peer");
                    dropped.push(slot.id);
                }
            }
        }
        for id in dropped {
            self.leave(id);
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbound::tests::queued;
    use bytes::Bytes;
    use flotilla_shared::{
        catalog::UnitKind,
        math::Vec2,
        state::GameState,
        world::{FixedWorld, World},
    };
    use tokio::sync::mpsc;

    fn session(max_players: usize) -> Session {
        let world = World::ocean(100, 100)
            .with_spawn_points(vec![Vec2::new(300.0, 300.0), Vec2::new(900.0, 900.0)]);
        Session::new(max_players, Arc::new(FixedWorld(Arc::new(world))))
    }

    fn join_with(s: &mut Session, capacity: usize) -> (PlayerId, mpsc::Receiver<Bytes>) {
        let (outbound, rx) = Outbound::channel(capacity);
        let id = s.join("127.0.0.1:1".into(), outbound).unwrap();
        (id, rx)
    }

    fn join(s: &mut Session) -> (PlayerId, mpsc::Receiver<Bytes>) {
        join_with(s, 16)
    }

    fn started_state(msg: Option<Message>) -> GameState {
        match msg {
            Some(Message::StartGame(state)) => state,
            other => panic!("expected start_game, got {other:?}"),
        }
    }

    #[test]
    fn join_after_start_is_refused() {
        let mut s = session(4);
        let (host, _) = join(&mut s);
        started_state(s.request_start(host, 1));
        assert_eq!(s.admission(), Some(JoinRefused::MatchStarted));
        let err = s.join("x".into(), Outbound::channel(1).0);
        assert_eq!(err, Err(JoinRefused::MatchStarted));
    }

    #[test]
    fn guest_cannot_start_and_second_start_is_noop() {
        let mut s = session(4);
        let (host, _) = join(&mut s);
        let (guest, _) = join(&mut s);
        assert!(s.request_start(guest, 1).is_none());
        assert!(!s.is_started());
        let state = started_state(s.request_start(host, 1));
        assert_eq!(state.units.len(), 6);
        assert_eq!(state.turn_number, 0);
        assert!(s.request_start(host, 2).is_none());
        assert!(s.lobby_update().is_none());
    }

    #[test]
    fn tick_only_runs_after_start() {
        let mut s = session(4);
        let (host, _) = join(&mut s);
        assert!(s.tick().is_none());
        s.request_start(host, 5);
        match s.tick() {
            Some(Message::GameUpdate(state)) => assert_eq!(state.turn_number, 1),
            other => panic!("expected game_update, got {other:?}"),
        }
    }

    #[test]
    fn submitted_orders_apply_on_next_tick_only() {
        let mut s = session(4);
        let (host, _) = join(&mut s);
        let state = started_state(s.request_start(host, 5));
        let scout = state
            .units_of(host)
            .find(|u| u.kind == UnitKind::Scout)
            .unwrap()
            .clone();
        s.submit(host, vec![Command::move_to(scout.id, scout.pos + Vec2::new(0.0, 80.0))]);
        s.tick();
        assert!(s.commands().pending(host).unwrap().is_empty());
        let sim = s.phase().simulation().unwrap();
        assert!((sim.unit(scout.id).unwrap().pos.y - (scout.pos.y + 8.0)).abs() < 1e-4);
    }

    #[test]
    fn leaving_clears_the_command_slot() {
        let mut s = session(4);
        let (a, _) = join(&mut s);
        s.submit(a, vec![]);
        assert!(s.leave(a));
        assert!(s.commands().pending(a).is_none());
        assert!(!s.leave(a));
        s.submit(a, vec![]);
        assert!(s.commands().pending(a).is_none());
    }

    #[test]
    fn broadcast_survives_a_broken_peer() {
        let mut s = session(4);
        let (_, mut first) = join(&mut s);
        let (dead, dead_rx) = join(&mut s);
        let (_, mut third) = join(&mut s);
        drop(dead_rx);

        let msg = s.lobby_update().unwrap();
        assert_eq!(s.broadcast(&msg), 2);
        assert_eq!(queued(&mut first), vec![msg.clone()]);
        assert_eq!(queued(&mut third), vec![msg]);
        assert!(!s.registry().contains(dead));
    }

    #[test]
    fn peer_that_stops_reading_is_dropped_mid_match() {
        let mut s = session(4);
        let (host, mut healthy) = join(&mut s);
        // Never drained: fills after two frames.
        let (slow, _slow_rx) = join_with(&mut s, 2);
        let start = s.request_start(host, 3).unwrap();
        assert_eq!(s.broadcast(&start), 2);
        assert_eq!(queued(&mut healthy), vec![start]);

        for turn in 1..=5 {
            let update = s.tick().unwrap();
            let expected = if turn == 1 { 2 } else { 1 };
            assert_eq!(s.broadcast(&update), expected, "turn {turn}");
            let got = queued(&mut healthy);
            assert!(matches!(&got[..], [Message::GameUpdate(st)] if st.turn_number == turn));
        }
        assert!(!s.registry().contains(slow));
        // The departed player's fleet stays in the match.
        let sim = s.phase().simulation().unwrap();
        assert_eq!(sim.state().units_of(slow).count(), 3);
    }
}
