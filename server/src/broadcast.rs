//! Best-effort fan-out of server messages to connected players
//!
//! Sends never block: each message goes into the recipient's bounded outbox
//! with `try_send`. A full or closed outbox counts as a failed delivery for
//! that recipient only. Failures are logged and tallied, never returned as
//! errors, and never retried.

use crate::error::DeliveryError;
use crate::registry::Player;
use log::{debug, warn};
use serde::Serialize;
use shared::{PlayerId, ServerMessage};
use tokio::sync::mpsc::error::TrySendError;

/// Outcome of one broadcast
#[derive(Debug, Default, PartialEq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: Vec<(PlayerId, DeliveryError)>,
}

/// Lifetime delivery counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeliveryStats {
    pub delivered: u64,
    pub dropped: u64,
}

#[derive(Debug, Default)]
pub struct Broadcaster {
    stats: DeliveryStats,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `message` for a single player.
    pub fn send_to(&mut self, player: &Player, message: ServerMessage) -> Result<(), DeliveryError> {
        let kind = message.kind();
        let result = match player.outbox().try_send(message) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(DeliveryError::Full),
            Err(TrySendError::Closed(_)) => Err(DeliveryError::Closed),
        };

        match result {
            Ok(()) => self.stats.delivered += 1,
            Err(e) => {
                self.stats.dropped += 1;
                match e {
                    DeliveryError::Full => {
                        warn!("Dropped {} for player {}: {}", kind, player.id, e)
                    }
                    DeliveryError::Closed => {
                        debug!("Dropped {} for player {}: {}", kind, player.id, e)
                    }
                }
            }
        }

        result
    }

    /// Queues `message` for every player in `recipients` except `exclude`.
    pub fn broadcast<'a, I>(
        &mut self,
        recipients: I,
        message: &ServerMessage,
        exclude: Option<PlayerId>,
    ) -> BroadcastReport
    where
        I: IntoIterator<Item = &'a Player>,
    {
        let mut report = BroadcastReport::default();

        for player in recipients {
            if Some(player.id) == exclude {
                continue;
            }

            match self.send_to(player, message.clone()) {
                Ok(()) => report.delivered += 1,
                Err(e) => report.failed.push((player.id, e)),
            }
        }

        debug!(
            "Broadcast {} to {} players ({} failed)",
            message.kind(),
            report.delivered,
            report.failed.len()
        );
        report
    }

    pub fn stats(&self) -> DeliveryStats {
        self.stats
    }
}
