use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;
use std::time::Duration;

/// First value broadcast by the countdown; ticks run down to 1.
pub const COUNTDOWN_START: u8 = 3;
/// Lap number every racer starts on.
pub const FIRST_LAP: i32 = 1;

/// Server-issued identifier for one live connection.
///
/// Encoded as a decimal string on the wire so clients can treat it as opaque.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct PlayerId(u32);

impl PlayerId {
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PlayerId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(PlayerId)
    }
}

impl From<PlayerId> for String {
    fn from(id: PlayerId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for PlayerId {
    type Error = ParseIntError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// RGB triple, encoded as `[r, g, b]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color(pub u8, pub u8, pub u8);

/// Last position a client reported. Never validated by the server.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub z: f64,
    pub lap: i32,
}

impl Default for Position {
    fn default() -> Self {
        Self {
            x: 0.0,
            z: 0.0,
            lap: FIRST_LAP,
        }
    }
}

fn first_lap() -> i32 {
    FIRST_LAP
}

/// Reads an explicit `null` the same as a missing field.
fn null_as_zero<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or_default())
}

fn null_as_first_lap<'de, D>(deserializer: D) -> Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<i32>::deserialize(deserializer)?.unwrap_or(FIRST_LAP))
}

/// Messages sent from a client to the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Ready,
    UpdatePosition {
        #[serde(default, deserialize_with = "null_as_zero")]
        x: f64,
        #[serde(default, deserialize_with = "null_as_zero")]
        z: f64,
        #[serde(default = "first_lap", deserialize_with = "null_as_first_lap")]
        lap: i32,
    },
    Finish,
}

impl ClientMessage {
    /// Decodes one text frame. Unknown types and malformed JSON are errors the
    /// caller is expected to log and drop.
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// One row of a `lobby_update`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LobbyPlayer {
    pub id: PlayerId,
    pub ready: bool,
    pub color: Color,
    #[serde(default)]
    pub spectating: bool,
}

/// One row of the final standings. `time` is in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceResult {
    pub id: PlayerId,
    pub time: Option<f64>,
}

/// Messages sent from the server to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Welcome {
        id: PlayerId,
        color: Color,
    },
    LobbyUpdate {
        players: Vec<LobbyPlayer>,
        game_active: bool,
    },
    Countdown {
        value: u8,
    },
    GameStart,
    PlayerUpdate {
        id: PlayerId,
        x: f64,
        z: f64,
        lap: i32,
        color: Color,
    },
    PlayerFinished {
        id: PlayerId,
        time: f64,
    },
    GameOver {
        results: Vec<RaceResult>,
    },
}

impl ServerMessage {
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Wire name of the message, handy for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Welcome { .. } => "welcome",
            ServerMessage::LobbyUpdate { .. } => "lobby_update",
            ServerMessage::Countdown { .. } => "countdown",
            ServerMessage::GameStart => "game_start",
            ServerMessage::PlayerUpdate { .. } => "player_update",
            ServerMessage::PlayerFinished { .. } => "player_finished",
            ServerMessage::GameOver { .. } => "game_over",
        }
    }
}

/// Converts a race duration to the seconds value used on the wire.
pub fn race_seconds(elapsed: Duration) -> f64 {
    elapsed.as_secs_f64()
}
