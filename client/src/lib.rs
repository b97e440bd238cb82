//! # Race Lobby Client Library
//!
//! Headless client for the race lobby server. It is used to smoke-test a
//! running server and to drive end-to-end tests; it draws nothing.
//!
//! ## Module Organization
//!
//! ### Network Module (`network`)
//! A thin WebSocket connection that speaks the JSON protocol from `shared`:
//! typed sends, typed receives with an optional timeout, and raw text frames
//! for exercising the server's handling of malformed input.
//!
//! ### Racer Module (`racer`)
//! A scripted player. It readies up, waits for the countdown, drives a fixed
//! number of laps around a circular track while streaming positions, reports
//! its finish and collects the final standings.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::Connection;
//! use client::racer::{Racer, RacerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut connection = Connection::connect("ws://127.0.0.1:8080/ws").await?;
//!     let outcome = Racer::new(RacerConfig::default()).run(&mut connection).await?;
//!     println!("Finished in place {:?}", outcome.place());
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod network;
pub mod racer;
