//! Registry of connected players and their per-race state
//!
//! This module owns everything the server knows about a player:
//! - Identity issued at join time and the outbox of its connection
//! - Colour, held through the [`ColorAllocator`]
//! - Readiness, finish state and the last reported position
//!
//! The registry is the single source of truth the session queries and
//! mutates. It never changes phase on its own.

use crate::color::ColorAllocator;
use log::info;
use shared::{Color, LobbyPlayer, PlayerId, Position, ServerMessage};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;

/// Sending half of a connection's outbound queue
pub type Outbox = mpsc::Sender<ServerMessage>;

/// A connected player
///
/// Lives exactly as long as its connection. Race flags are cleared in place
/// whenever the session returns to the lobby.
#[derive(Debug)]
pub struct Player {
    pub id: PlayerId,
    pub color: Color,
    pub ready: bool,
    pub finished: bool,
    /// Set once, when `finished` first becomes true
    pub finish_time: Option<Duration>,
    pub position: Position,
    /// Joined after the lobby closed; sits out readiness and finish checks
    pub spectating: bool,
    outbox: Outbox,
}

impl Player {
    fn new(id: PlayerId, color: Color, outbox: Outbox, spectating: bool) -> Self {
        Self {
            id,
            color,
            ready: false,
            finished: false,
            finish_time: None,
            position: Position::default(),
            spectating,
            outbox,
        }
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    /// True if this player takes part in readiness and finish aggregation
    pub fn is_participant(&self) -> bool {
        !self.spectating
    }

    /// Records the finish the first time it is reported. Returns false if the
    /// player had already finished.
    pub fn mark_finished(&mut self, elapsed: Duration) -> bool {
        if self.finished {
            return false;
        }
        self.finished = true;
        self.finish_time = Some(elapsed);
        true
    }

    fn reset_race_state(&mut self) {
        self.ready = false;
        self.finished = false;
        self.finish_time = None;
        self.spectating = false;
    }

    pub fn lobby_entry(&self) -> LobbyPlayer {
        LobbyPlayer {
            id: self.id,
            ready: self.ready,
            color: self.color,
            spectating: self.spectating,
        }
    }
}

/// Owns all connected players and their colours
pub struct PlayerRegistry {
    players: HashMap<PlayerId, Player>,
    colors: ColorAllocator,
    /// Next id to try
    next_player_id: u32,
}

impl PlayerRegistry {
    pub fn new(colors: ColorAllocator) -> Self {
        Self {
            players: HashMap::new(),
            colors,
            next_player_id: 1,
        }
    }

    /// Registers a new connection, assigning it an id and a colour.
    pub fn join(&mut self, outbox: Outbox, spectating: bool) -> &Player {
        let id = self.issue_id();

        let color = self.colors.allocate(id);
        info!(
            "Player {} joined with color {:?}{}",
            id,
            color,
            if spectating { " as spectator" } else { "" }
        );

        self.players
            .entry(id)
            .or_insert_with(|| Player::new(id, color, outbox, spectating))
    }

    /// Next free id. The counter wraps past `u32::MAX` back to 1 and skips
    /// ids still held by connected players.
    fn issue_id(&mut self) -> PlayerId {
        loop {
            let id = PlayerId::new(self.next_player_id);
            self.next_player_id = self.next_player_id.wrapping_add(1).max(1);
            if !self.players.contains_key(&id) {
                return id;
            }
        }
    }

    /// Removes a player and releases its colour. Returns None if the player
    /// was already gone.
    pub fn leave(&mut self, id: PlayerId) -> Option<Player> {
        let player = self.players.remove(&id)?;
        self.colors.release(id);
        info!("Player {} left, {} remaining", id, self.players.len());
        Some(player)
    }

    pub fn get(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn get_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.get_mut(&id)
    }

    /// All players in join order
    pub fn all(&self) -> Vec<&Player> {
        let mut players: Vec<&Player> = self.players.values().collect();
        players.sort_by_key(|p| p.id);
        players
    }

    /// Players taking part in the current race, in join order
    pub fn participants(&self) -> Vec<&Player> {
        self.all()
            .into_iter()
            .filter(|p| p.is_participant())
            .collect()
    }

    /// True if at least one participant exists and every participant is ready
    pub fn all_ready(&self) -> bool {
        let participants = self.participants();
        !participants.is_empty() && participants.iter().all(|p| p.ready)
    }

    /// True if at least one participant exists and every participant finished
    pub fn all_finished(&self) -> bool {
        let participants = self.participants();
        !participants.is_empty() && participants.iter().all(|p| p.finished)
    }

    pub fn has_participants(&self) -> bool {
        self.players.values().any(|p| p.is_participant())
    }

    /// Clears ready/finished state for everyone and turns spectators into
    /// participants for the next race.
    pub fn reset_race_state(&mut self) {
        for player in self.players.values_mut() {
            player.reset_race_state();
        }
    }

    /// Drops every player. Used by a full session reset.
    pub fn clear(&mut self) {
        self.players.clear();
        self.colors.clear();
    }

    /// Snapshot used by `lobby_update`
    pub fn lobby_entries(&self) -> Vec<LobbyPlayer> {
        self.all().iter().map(|p| p.lobby_entry()).collect()
    }

    pub fn colors(&self) -> &ColorAllocator {
        &self.colors
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}
