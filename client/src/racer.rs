//! Scripted racer that plays one full race against the lobby server
//!
//! The racer joins, readies up, waits for the countdown, then drives laps of
//! a circular track while streaming positions. It reports its finish and
//! waits for the final standings.

use crate::error::ClientError;
use crate::network::Connection;
use log::{debug, info};
use rand::Rng;
use shared::{ClientMessage, Color, PlayerId, Position, RaceResult, ServerMessage, FIRST_LAP};
use std::f64::consts::TAU;
use std::time::Duration;
use tokio::time::{interval, Instant, MissedTickBehavior};

/// Radius of the circular test track
pub const TRACK_RADIUS: f64 = 50.0;

#[derive(Debug, Clone)]
pub struct RacerConfig {
    pub laps: u32,
    pub lap_time: Duration,
    pub update_interval: Duration,
    /// Random spread applied to the lap time, e.g. 0.1 for +/-10%
    pub pace_jitter: f64,
}

impl Default for RacerConfig {
    fn default() -> Self {
        Self {
            laps: 3,
            lap_time: Duration::from_secs(5),
            update_interval: Duration::from_millis(50),
            pace_jitter: 0.1,
        }
    }
}

/// What the racer saw of the race
#[derive(Debug, Clone)]
pub struct RaceOutcome {
    pub id: PlayerId,
    pub color: Color,
    pub results: Vec<RaceResult>,
}

impl RaceOutcome {
    /// 1-based finishing place of this racer, if it is in the results
    pub fn place(&self) -> Option<usize> {
        self.results
            .iter()
            .position(|r| r.id == self.id)
            .map(|i| i + 1)
    }
}

pub struct Racer {
    config: RacerConfig,
    lap_time: Duration,
}

impl Racer {
    pub fn new(config: RacerConfig) -> Self {
        let spread = config.pace_jitter.abs();
        let factor = if spread > 0.0 {
            rand::thread_rng().gen_range(1.0 - spread..=1.0 + spread)
        } else {
            1.0
        };
        let lap_time = config.lap_time.mul_f64(factor.max(0.0));

        Self { config, lap_time }
    }

    pub fn lap_time(&self) -> Duration {
        self.lap_time
    }

    pub async fn run(&self, connection: &mut Connection) -> Result<RaceOutcome, ClientError> {
        let (id, color) = match connection.recv().await? {
            ServerMessage::Welcome { id, color } => (id, color),
            other => return Err(ClientError::UnexpectedMessage(other.kind())),
        };
        info!("Joined as player {} with color {:?}", id, color);

        connection.send(&ClientMessage::Ready).await?;
        self.wait_for_start(connection).await?;
        self.drive(connection).await?;

        loop {
            match connection.recv().await? {
                ServerMessage::GameOver { results } => {
                    let outcome = RaceOutcome { id, color, results };
                    info!("Race over, finished in place {:?}", outcome.place());
                    return Ok(outcome);
                }
                ServerMessage::PlayerFinished { id: other, time } => {
                    info!("Player {} finished in {:.3}s", other, time);
                }
                other => debug!("Ignoring {} while waiting for results", other.kind()),
            }
        }
    }

    async fn wait_for_start(&self, connection: &mut Connection) -> Result<(), ClientError> {
        loop {
            match connection.recv().await? {
                ServerMessage::Countdown { value } => info!("Countdown: {}", value),
                ServerMessage::GameStart => {
                    info!("Go!");
                    return Ok(());
                }
                other => debug!("Ignoring {} before start", other.kind()),
            }
        }
    }

    /// Streams positions until the configured laps are done, then finishes.
    async fn drive(&self, connection: &mut Connection) -> Result<(), ClientError> {
        let race_time = self.lap_time * self.config.laps;
        let mut ticker = interval(self.config.update_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let start = Instant::now();

        loop {
            ticker.tick().await;
            let elapsed = start.elapsed();
            if elapsed >= race_time {
                break;
            }

            let Position { x, z, lap } = track_position(elapsed, self.lap_time);
            connection
                .send(&ClientMessage::UpdatePosition { x, z, lap })
                .await?;
        }

        connection.send(&ClientMessage::Finish).await?;
        info!("Crossed the line after {} laps", self.config.laps);
        Ok(())
    }
}

/// Where a racer driving `lap_time` laps is on the track after `elapsed`
pub fn track_position(elapsed: Duration, lap_time: Duration) -> Position {
    if lap_time.is_zero() {
        return Position {
            x: TRACK_RADIUS,
            z: 0.0,
            lap: FIRST_LAP,
        };
    }

    let laps_done = elapsed.as_secs_f64() / lap_time.as_secs_f64();
    let angle = laps_done.fract() * TAU;

    Position {
        x: TRACK_RADIUS * angle.cos(),
        z: TRACK_RADIUS * angle.sin(),
        lap: FIRST_LAP + laps_done.floor() as i32,
    }
}
