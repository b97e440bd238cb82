use clap::Parser;
use client::network::Connection;
use client::racer::{Racer, RacerConfig};
use log::info;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// WebSocket URL of the lobby server
    #[arg(short = 's', long, default_value = "ws://127.0.0.1:8080/ws")]
    server: String,

    /// Laps to drive before reporting a finish
    #[arg(short = 'l', long, default_value = "3")]
    laps: u32,

    /// Nominal lap time in milliseconds
    #[arg(long, default_value = "5000")]
    lap_time_ms: u64,

    /// Position updates per second
    #[arg(short = 'u', long, default_value = "20")]
    update_hz: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting racer...");
    info!("Connecting to: {}", args.server);

    let config = RacerConfig {
        laps: args.laps,
        lap_time: Duration::from_millis(args.lap_time_ms),
        update_interval: Duration::from_secs_f64(1.0 / args.update_hz.max(1) as f64),
        ..RacerConfig::default()
    };

    let mut connection = Connection::connect(&args.server).await?;
    let outcome = Racer::new(config).run(&mut connection).await?;

    println!("Results:");
    for (place, result) in outcome.results.iter().enumerate() {
        let marker = if result.id == outcome.id { " (you)" } else { "" };
        match result.time {
            Some(time) => println!("{:>2}. {} {:.3}s{}", place + 1, result.id, time, marker),
            None => println!("{:>2}. {} DNF{}", place + 1, result.id, marker),
        }
    }

    connection.close().await?;
    Ok(())
}
