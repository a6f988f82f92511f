//! Live telemetry monitor
//!
//! Prints state changes, session identity and a once-per-second frame summary.
//! On Windows it attaches to iRacing; elsewhere it runs against a simulated
//! producer so the whole pipeline can be watched on any machine.
//!
//! ```text
//! RUST_LOG=ira_telemetry=debug cargo run --example live_monitor
//! ```

use anyhow::Result;
use futures::StreamExt;
use ira_telemetry::{ClientConfig, LiveConnection};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => ClientConfig::load(path)?,
        None => ClientConfig::default(),
    };

    let (connection, _simulation) = open(config).await?;

    let mut states = Box::pin(connection.state_changes());
    let mut sessions = Box::pin(connection.session_updates());
    let mut summary = tokio::time::interval(Duration::from_secs(1));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            Some(change) = states.next() => {
                println!("state: {} -> {} ({:?})", change.from, change.to, change.event);
            }
            Some(session) = sessions.next() => {
                let identity = &session.identity;
                println!(
                    "session #{}: {} ({}, {:.2} km), {} in {}",
                    session.update,
                    identity.track_name,
                    identity.track_config,
                    identity.track_length_km,
                    identity.driver_name,
                    identity.car_name,
                );
            }
            _ = summary.tick() => {
                if let Some(frame) = connection.latest_frame() {
                    let sample = frame.sample;
                    println!(
                        "tick {:>7}  speed {:>6.1} m/s  rpm {:>6.0}  gear {:>2}",
                        frame.tick,
                        sample.speed.unwrap_or_default(),
                        sample.rpm.unwrap_or_default(),
                        sample.gear.unwrap_or_default(),
                    );
                }
            }
        }
    }

    connection.shutdown().await?;
    Ok(())
}

#[cfg(windows)]
async fn open(config: ClientConfig) -> Result<(LiveConnection, ())> {
    Ok((LiveConnection::connect_with(config).await?, ()))
}

#[cfg(not(windows))]
async fn open(config: ClientConfig) -> Result<(LiveConnection, simulation::Simulation)> {
    let simulation = simulation::Simulation::start();
    let connection = LiveConnection::spawn(simulation.region(), config)?;
    Ok((connection, simulation))
}

#[cfg(not(windows))]
mod simulation {
    use ira_telemetry::types::VariableType;
    use ira_telemetry::{MemoryProducer, MemoryRegion};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;

    const SESSION: &str = "\
WeekendInfo:
 TrackDisplayName: Simulated Raceway
 TrackConfigName: Full Course
 TrackLength: 4.20 km
DriverInfo:
 DriverCarIdx: 0
 Drivers:
 - CarIdx: 0
   UserName: Demo Driver
   CarScreenName: Demo Car
";

    /// A 60 Hz producer on a background thread, stopped on drop.
    pub struct Simulation {
        producer: MemoryProducer,
        stop: Arc<AtomicBool>,
        handle: Option<thread::JoinHandle<()>>,
    }

    impl Simulation {
        pub fn start() -> Self {
            let producer = MemoryProducer::builder()
                .tick_rate(60)
                .variable("Speed", VariableType::Float32, 1)
                .variable("RPM", VariableType::Float32, 1)
                .variable("Gear", VariableType::Int32, 1)
                .variable("Throttle", VariableType::Float32, 1)
                .build();
            if let Err(err) = producer.set_session_info(SESSION) {
                tracing::warn!(%err, "Simulated session metadata rejected");
            }
            producer.set_connected(true);

            let stop = Arc::new(AtomicBool::new(false));
            let flag = Arc::clone(&stop);
            let feed = producer.clone();
            let handle = thread::spawn(move || {
                let mut tick = 0;
                while !flag.load(Ordering::Acquire) {
                    tick += 1;
                    let phase = (tick % 600) as f32 / 600.0;
                    feed.publish_frame(tick, |frame| {
                        frame
                            .set_f32("Speed", 20.0 + 40.0 * phase)
                            .set_f32("RPM", 4000.0 + 6000.0 * phase)
                            .set_i32("Gear", 1 + (phase * 5.0) as i32)
                            .set_f32("Throttle", 1.0);
                    });
                    thread::sleep(Duration::from_millis(16));
                }
            });

            Self { producer, stop, handle: Some(handle) }
        }

        pub fn region(&self) -> MemoryRegion {
            self.producer.region()
        }
    }

    impl Drop for Simulation {
        fn drop(&mut self) {
            self.stop.store(true, Ordering::Release);
            if let Some(handle) = self.handle.take() {
                let _ = handle.join();
            }
        }
    }
}
