//! Per-frame client state machine.
//!
//! `ClientSession` owns the connection, the outbound order queue and the
//! reconciled view. Each call to [`ClientSession::frame`] drains the inbound
//! queue once, applies what arrived and advances display smoothing by one
//! step.

use std::time::Duration;

use flotilla_shared::{
    config::ClientConfig,
    math::Vec2,
    net::Message,
    state::{LobbyPlayer, PlayerId, UnitId},
};
use tracing::{debug, info};

use crate::{client::GameClient, interp::Reconciler, orders::OrderQueue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientPhase {
    Lobby,
    InMatch,
    Disconnected,
}

/// One row of the lobby roster as shown to this player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub player: LobbyPlayer,
    pub is_you: bool,
    pub is_host: bool,
}

pub struct ClientSession {
    client: GameClient,
    orders: OrderQueue,
    view: Reconciler,
    phase: ClientPhase,
    roster: Vec<LobbyPlayer>,
}

impl ClientSession {
    pub fn new(client: GameClient, smoothing: f32) -> Self {
        Self {
            client,
            orders: OrderQueue::default(),
            view: Reconciler::new(smoothing),
            phase: ClientPhase::Lobby,
            roster: Vec::new(),
        }
    }

    /// Connects and waits for the server to assign an identity.
    pub async fn connect(cfg: &ClientConfig, timeout: Duration) -> anyhow::Result<Self> {
        let client = GameClient::connect(cfg).await?;
        client.wait_for_welcome(timeout).await?;
        Ok(Self::new(client, cfg.smoothing))
    }

    /// Runs one local frame. Returns how many server messages were applied.
    pub fn frame(&mut self) -> usize {
        let inbound = self.client.drain();
        let count = inbound.len();
        for msg in inbound {
            self.handle(msg);
        }
        self.view.step();
        if self.phase != ClientPhase::Disconnected && !self.client.is_connected() {
            info!("Disconnected from server");
            self.phase = ClientPhase::Disconnected;
        }
        count
    }

    fn handle(&mut self, msg: Message) {
        match msg {
            Message::LobbyUpdate { players } if self.phase == ClientPhase::Lobby => {
                self.roster = players;
            }
            Message::StartGame(state) => {
                info!(
                    units = state.units.len(),
                    world_seed = state.world_seed,
                    "Match started"
                );
                self.view.apply_snapshot(&state);
                self.phase = ClientPhase::InMatch;
            }
            Message::GameUpdate(state) if self.phase == ClientPhase::InMatch => {
                if self.view.apply_snapshot(&state) {
                    let retired = self.orders.retire(state.turn_number);
                    if retired > 0 {
                        debug!(turn = state.turn_number, retired, "Orders applied");
                    }
                }
            }
            other => debug!(kind = other.kind(), "Ignoring message"),
        }
    }

    /// Queues a move for one of this player's units. Returns false for units
    /// the player does not own or that cannot move.
    pub fn order_move(&mut self, unit: UnitId, target: Vec2) -> bool {
        let me = self.client.player_id();
        match self.view.unit(unit) {
            Some(p) if Some(p.owner) == me && p.kind.is_movable() => {
                self.orders.issue_move(unit, target);
                true
            }
            _ => false,
        }
    }

    /// Sends every live order as one `client_commands` message, if any
    /// order was issued since the last send. Earlier orders that the server
    /// may not have applied yet go out again, since each message replaces
    /// the previous one. Returns how many orders were sent.
    pub async fn submit_orders(&mut self) -> anyhow::Result<usize> {
        let turn = self.view.turn().unwrap_or(0);
        let Some(batch) = self.orders.batch(turn) else {
            return Ok(0);
        };
        let count = batch.len();
        self.client.send_commands(batch).await?;
        Ok(count)
    }

    /// Asks the server to start. Only the host's request has any effect.
    pub async fn request_start(&self) -> anyhow::Result<()> {
        self.client.request_start().await
    }

    pub fn phase(&self) -> ClientPhase {
        self.phase
    }

    pub fn player_id(&self) -> Option<PlayerId> {
        self.client.player_id()
    }

    /// Whether this player holds the lowest id on the last roster.
    pub fn is_host(&self) -> bool {
        let host = self.roster.iter().map(|p| p.id).min();
        host.is_some() && host == self.player_id()
    }

    pub fn roster(&self) -> Vec<RosterEntry> {
        let me = self.player_id();
        let host = self.roster.iter().map(|p| p.id).min();
        self.roster
            .iter()
            .map(|p| RosterEntry {
                player: p.clone(),
                is_you: Some(p.id) == me,
                is_host: Some(p.id) == host,
            })
            .collect()
    }

    pub fn view(&self) -> &Reconciler {
        &self.view
    }

    pub fn pending_orders(&self) -> usize {
        self.orders.len()
    }

    pub async fn disconnect(&mut self) -> anyhow::Result<()> {
        self.phase = ClientPhase::Disconnected;
        self.client.disconnect().await
    }
}
