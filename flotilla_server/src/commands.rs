//! Command buffer.
//!
//! Holds each player's most recently submitted command list. A submission
//! replaces the previous one wholesale; the simulation drains every slot once
//! per tick, so a command is applied at most once.

use std::collections::BTreeMap;

use flotilla_shared::state::{Command, PlayerId};

/// Per-tick snapshot of every player's pending commands.
pub type Drained = BTreeMap<PlayerId, Vec<Command>>;

#[derive(Debug, Default)]
pub struct CommandBuffer {
    pending: BTreeMap<PlayerId, Vec<Command>>,
}

impl CommandBuffer {
    /// Opens an empty slot for a newly registered player.
    pub fn add_player(&mut self, player: PlayerId) {
        self.pending.entry(player).or_default();
    }

    pub fn remove_player(&mut self, player: PlayerId) {
        self.pending.remove(&player);
    }

    /// Replaces the player's pending set (last write wins).
    pub fn submit(&mut self, player: PlayerId, commands: Vec<Command>) {
        self.pending.insert(player, commands);
    }

    pub fn pending(&self, player: PlayerId) -> Option<&[Command]> {
        self.pending.get(&player).map(Vec::as_slice)
    }

    /// Takes every slot's commands and leaves the slots empty.
    pub fn drain_and_clear(&mut self) -> Drained {
        self.pending
            .iter_mut()
            .map(|(player, commands)| (*player, std::mem::take(commands)))
            .collect()
    }
}
