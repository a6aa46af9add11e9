//! Hardware check for a connected UD-CO2S.
//!
//! Starts a session, prints every event as a JSON line and stops after the
//! given duration. Exits non-zero on the first error event.
//!
//! # Usage
//!
//! ```bash
//! # Watch for 10 seconds
//! ud_co2s_monitor
//!
//! # Watch for a minute with debug logging
//! RUST_LOG=debug ud_co2s_monitor --duration 60
//! ```

use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use tokio::sync::mpsc;

use ud_co2s_lib::{
    NativeTransport, ReadingRecord, ReadingState, SensorCallback, SensorReading, SensorSession,
};

const DEFAULT_DURATION_SECS: u64 = 10;

struct Config {
    duration: Duration,
}

fn parse_args(args: &[String]) -> Result<Config, String> {
    let mut duration_secs = DEFAULT_DURATION_SECS;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--duration" | "-d" => {
                i += 1;
                let value = args.get(i).ok_or("--duration needs a value")?;
                duration_secs = value
                    .parse()
                    .map_err(|_| format!("invalid duration: {}", value))?;
            }
            "--help" | "-h" => return Err(String::new()),
            other => return Err(format!("unknown argument: {}", other)),
        }
        i += 1;
    }

    Ok(Config {
        duration: Duration::from_secs(duration_secs),
    })
}

fn program_name(args: &[String]) -> &str {
    args.first().map(String::as_str).unwrap_or("ud_co2s_monitor")
}

fn print_usage(program: &str) {
    eprintln!("Usage: {} [--duration SECS]", program);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();
    let config = match parse_args(&args) {
        Ok(config) => config,
        Err(e) => {
            if !e.is_empty() {
                eprintln!("Error: {}", e);
            }
            print_usage(program_name(&args));
            std::process::exit(2);
        }
    };

    let (records_tx, mut records_rx) = mpsc::unbounded_channel();
    let callback: SensorCallback = Arc::new(move |reading: SensorReading, message: Option<String>| {
        let _ = records_tx.send(ReadingRecord::new(&reading, message));
    });

    let session = SensorSession::new(Arc::new(NativeTransport::new()));
    log::info!("Starting sensor connection...");
    session
        .start(Some(callback))
        .await
        .context("sensor session did not start")?;

    let deadline = tokio::time::sleep(config.duration);
    tokio::pin!(deadline);

    let outcome = loop {
        tokio::select! {
            _ = &mut deadline => break Ok(()),
            _ = tokio::signal::ctrl_c() => break Ok(()),
            record = records_rx.recv() => {
                let Some(record) = record else { break Ok(()) };
                println!("{}", serde_json::to_string(&record)?);
                match record.state {
                    ReadingState::Error => {
                        break Err(record.message.unwrap_or_else(|| "sensor error".to_string()));
                    }
                    // Unplugged; the session is already gone
                    ReadingState::Warning => break Ok(()),
                    _ => {}
                }
            }
        }
    };

    log::info!("Stopping sensor connection...");
    session.stop().await;

    if let Err(message) = outcome {
        bail!("sensor reported an error: {}", message);
    }
    Ok(())
}
