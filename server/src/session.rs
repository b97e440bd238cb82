//! Lobby state machine and the single-writer loop that drives it
//!
//! A session moves through `LOBBY -> COUNTDOWN -> RACING -> LOBBY`. Every
//! mutation arrives as a [`SessionEvent`] on one queue and is handled to
//! completion before the next, so the registry, colours and phase never see
//! interleaved writers. The countdown is a deadline owned by the session and
//! awaited next to the queue; dropping it cancels the countdown.
//!
//! Handlers take the current instant as an argument. The loop passes
//! `Instant::now()`, tests pass whatever instant they need.

use crate::broadcast::{Broadcaster, DeliveryStats};
use crate::color::ColorAllocator;
use crate::config::SessionConfig;
use crate::registry::{Outbox, PlayerRegistry};
use log::{debug, info, warn};
use serde::Serialize;
use shared::{
    race_seconds, ClientMessage, LobbyPlayer, PlayerId, Position, RaceResult, ServerMessage,
    COUNTDOWN_START,
};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Lobby,
    Countdown,
    Racing,
}

/// Everything that can change the session, delivered one at a time
#[derive(Debug)]
pub enum SessionEvent {
    /// A connection was accepted. The issued id is sent back on `reply`.
    Connect {
        outbox: Outbox,
        reply: oneshot::Sender<PlayerId>,
    },
    Disconnect {
        id: PlayerId,
    },
    Message {
        id: PlayerId,
        message: ClientMessage,
    },
    /// Consistent read of the session between two events
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub phase: Phase,
    pub players: Vec<LobbyPlayer>,
    pub deliveries: DeliveryStats,
}

/// Pending countdown tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Countdown {
    /// Value broadcast when `deadline` passes; 0 means start the race
    remaining: u8,
    deadline: Instant,
}

pub struct LobbySession {
    registry: PlayerRegistry,
    broadcaster: Broadcaster,
    phase: Phase,
    countdown: Option<Countdown>,
    race_started_at: Option<Instant>,
    countdown_tick: Duration,
}

impl LobbySession {
    pub fn new(config: SessionConfig) -> Self {
        let colors = match config.color_seed {
            Some(seed) => ColorAllocator::with_seed(seed),
            None => ColorAllocator::new(),
        };

        Self {
            registry: PlayerRegistry::new(colors),
            broadcaster: Broadcaster::new(),
            phase: Phase::Lobby,
            countdown: None,
            race_started_at: None,
            countdown_tick: config.countdown_tick,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn registry(&self) -> &PlayerRegistry {
        &self.registry
    }

    pub fn race_started_at(&self) -> Option<Instant> {
        self.race_started_at
    }

    /// When the next countdown tick is due, if a countdown is running
    pub fn countdown_deadline(&self) -> Option<Instant> {
        self.countdown.map(|c| c.deadline)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase,
            players: self.registry.lobby_entries(),
            deliveries: self.broadcaster.stats(),
        }
    }

    pub fn handle_event(&mut self, event: SessionEvent, now: Instant) {
        match event {
            SessionEvent::Connect { outbox, reply } => {
                let id = self.handle_join(outbox);
                if reply.send(id).is_err() {
                    warn!("Connection for player {} closed during registration", id);
                    self.handle_leave(id, now);
                }
            }
            SessionEvent::Disconnect { id } => self.handle_leave(id, now),
            SessionEvent::Message { id, message } => self.handle_message(id, message, now),
            SessionEvent::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    /// Registers a new player, greets it and refreshes everyone's lobby view.
    ///
    /// Players joining after the lobby closed sit the current race out.
    pub fn handle_join(&mut self, outbox: Outbox) -> PlayerId {
        let spectating = self.phase != Phase::Lobby;
        let (id, color) = {
            let player = self.registry.join(outbox, spectating);
            (player.id, player.color)
        };

        if let Some(player) = self.registry.get(id) {
            let _ = self
                .broadcaster
                .send_to(player, ServerMessage::Welcome { id, color });
        }
        self.broadcast_lobby_update();
        id
    }

    pub fn handle_leave(&mut self, id: PlayerId, now: Instant) {
        if self.registry.leave(id).is_none() {
            return;
        }

        if self.registry.is_empty() {
            self.reset();
            return;
        }

        match self.phase {
            Phase::Lobby => {
                self.broadcast_lobby_update();
                self.maybe_start_countdown(now);
            }
            Phase::Countdown => {
                if !self.registry.has_participants() {
                    info!("Last racer left, abandoning countdown");
                    self.return_to_lobby();
                }
                self.broadcast_lobby_update();
            }
            Phase::Racing => {
                if !self.registry.has_participants() {
                    info!("Last racer left, abandoning race");
                    self.return_to_lobby();
                    self.broadcast_lobby_update();
                } else if self.registry.all_finished() {
                    self.finish_race();
                }
            }
        }
    }

    pub fn handle_message(&mut self, id: PlayerId, message: ClientMessage, now: Instant) {
        if self.registry.get(id).is_none() {
            debug!("Ignoring message from unknown player {}", id);
            return;
        }

        match message {
            ClientMessage::Ready => self.handle_ready(id, now),
            ClientMessage::UpdatePosition { x, z, lap } => {
                self.handle_position(id, Position { x, z, lap })
            }
            ClientMessage::Finish => self.handle_finish(id, now),
        }
    }

    fn handle_ready(&mut self, id: PlayerId, now: Instant) {
        if self.phase == Phase::Racing {
            debug!("Ignoring ready from player {} during race", id);
            return;
        }

        let Some(player) = self.registry.get_mut(id) else {
            return;
        };
        if player.spectating {
            debug!("Ignoring ready from spectator {}", id);
            return;
        }

        player.ready = true;
        info!("Player {} is ready", id);

        self.broadcast_lobby_update();
        self.maybe_start_countdown(now);
    }

    /// Stores the reported position as-is and relays it to everyone else.
    fn handle_position(&mut self, id: PlayerId, position: Position) {
        let Some(player) = self.registry.get_mut(id) else {
            return;
        };
        player.position = position;

        let message = ServerMessage::PlayerUpdate {
            id,
            x: position.x,
            z: position.z,
            lap: position.lap,
            color: player.color,
        };
        self.broadcast(&message, Some(id));
    }

    fn handle_finish(&mut self, id: PlayerId, now: Instant) {
        if self.phase != Phase::Racing {
            debug!("Ignoring finish from player {} outside a race", id);
            return;
        }
        let Some(started) = self.race_started_at else {
            return;
        };
        let Some(player) = self.registry.get_mut(id) else {
            return;
        };
        if player.spectating {
            debug!("Ignoring finish from spectator {}", id);
            return;
        }

        let elapsed = now.saturating_duration_since(started);
        if !player.mark_finished(elapsed) {
            debug!("Player {} already finished", id);
            return;
        }

        let time = race_seconds(elapsed);
        info!("Player {} finished in {:.3}s", id, time);
        self.broadcast(&ServerMessage::PlayerFinished { id, time }, None);

        if self.registry.all_finished() {
            self.finish_race();
        }
    }

    fn maybe_start_countdown(&mut self, now: Instant) {
        if self.phase == Phase::Lobby && self.countdown.is_none() && self.registry.all_ready() {
            self.start_countdown(now);
        }
    }

    fn start_countdown(&mut self, now: Instant) {
        info!(
            "All {} players ready, starting countdown",
            self.registry.participants().len()
        );
        self.phase = Phase::Countdown;
        self.broadcast(
            &ServerMessage::Countdown {
                value: COUNTDOWN_START,
            },
            None,
        );
        self.countdown = Some(Countdown {
            remaining: COUNTDOWN_START - 1,
            deadline: now + self.countdown_tick,
        });
    }

    /// Fires the pending countdown tick if its deadline has passed.
    pub fn advance_countdown(&mut self, now: Instant) {
        let Some(countdown) = self.countdown else {
            return;
        };
        if now < countdown.deadline {
            return;
        }

        if countdown.remaining > 0 {
            self.broadcast(
                &ServerMessage::Countdown {
                    value: countdown.remaining,
                },
                None,
            );
            self.countdown = Some(Countdown {
                remaining: countdown.remaining - 1,
                deadline: countdown.deadline + self.countdown_tick,
            });
        } else {
            self.countdown = None;
            self.start_race(now);
        }
    }

    fn start_race(&mut self, now: Instant) {
        info!("Starting race with {} players", self.registry.participants().len());
        self.phase = Phase::Racing;
        self.race_started_at = Some(now);
        self.broadcast(&ServerMessage::GameStart, None);
    }

    fn finish_race(&mut self) {
        let results = self.results();
        info!("Race over, {} results", results.len());

        self.return_to_lobby();
        self.broadcast(&ServerMessage::GameOver { results }, None);
        self.broadcast_lobby_update();
    }

    /// Standings for the current race, fastest first. Racers without a
    /// recorded time go last.
    pub fn results(&self) -> Vec<RaceResult> {
        let mut times: Vec<(PlayerId, Option<Duration>)> = self
            .registry
            .participants()
            .iter()
            .map(|p| (p.id, p.finish_time))
            .collect();
        times.sort_by_key(|(_, time)| (time.is_none(), *time));

        times
            .into_iter()
            .map(|(id, time)| RaceResult {
                id,
                time: time.map(race_seconds),
            })
            .collect()
    }

    fn return_to_lobby(&mut self) {
        self.phase = Phase::Lobby;
        self.countdown = None;
        self.race_started_at = None;
        self.registry.reset_race_state();
    }

    fn reset(&mut self) {
        info!("Resetting session (no players left)");
        self.return_to_lobby();
        self.registry.clear();
    }

    fn broadcast_lobby_update(&mut self) {
        let message = ServerMessage::LobbyUpdate {
            players: self.registry.lobby_entries(),
            game_active: self.phase == Phase::Racing,
        };
        self.broadcast(&message, None);
    }

    fn broadcast(&mut self, message: &ServerMessage, exclude: Option<PlayerId>) {
        self.broadcaster
            .broadcast(self.registry.all(), message, exclude);
    }

    /// Processes events until every sender of the queue is gone.
    pub async fn run(mut self, mut events: mpsc::Receiver<SessionEvent>) {
        info!("Session coordinator started");

        loop {
            let deadline = self.countdown_deadline();

            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event, Instant::now()),
                    None => {
                        info!("Event queue closed, stopping session coordinator");
                        break;
                    }
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.advance_countdown(Instant::now());
                }
            }
        }
    }
}
