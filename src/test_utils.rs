//! Fixtures shared by unit tests and benchmarks.
//!
//! The standard producer publishes the channels the default configuration
//! asks for, plus a few extras, with values derived from the tick so tests can
//! check what they read.

#![cfg(any(test, feature = "benchmark"))]

use crate::config::ClientConfig;
use crate::region::MemoryProducer;
use crate::types::{BitField, VariableType};

/// Session metadata in the simulator's layout, with the local driver in car 1.
pub const SAMPLE_SESSION_YAML: &str = "\
---
WeekendInfo:
 TrackName: texas
 TrackID: 40
 TrackLength: 2.38 km
 TrackDisplayName: Texas Motor Speedway
 TrackConfigName: Oval
 TrackType: super speedway
SessionInfo:
 Sessions:
 - SessionNum: 0
   SessionLaps: 50
   SessionType: Race
DriverInfo:
 DriverCarIdx: 1
 DriverUserID: 123456
 Drivers:
 - CarIdx: 0
   UserName: Pace Car
   CarScreenName: safety pcporsche911cup
   CarNumber: \"0\"
 - CarIdx: 1
   UserName: Jamie Racer
   CarPath: dallarair18
   CarScreenName: Dallara IR18
   CarNumber: \"12\"
 - CarIdx: 2
   UserName: Alex O'Connor
   CarScreenName: Dallara IR18
   CarNumber: \"77\"
...
";

/// A producer with the standard channel set, not yet connected and with no frames.
pub fn standard_producer() -> MemoryProducer {
    MemoryProducer::builder()
        .tick_rate(60)
        .buffers(3)
        .session_capacity(4096)
        .variable("SessionTime", VariableType::Float64, 1)
        .variable("Speed", VariableType::Float32, 1)
        .variable("RPM", VariableType::Float32, 1)
        .variable("Gear", VariableType::Int32, 1)
        .variable("Throttle", VariableType::Float32, 1)
        .variable("Brake", VariableType::Float32, 1)
        .variable("Clutch", VariableType::Float32, 1)
        .variable("Lap", VariableType::Int32, 1)
        .variable("LapDistPct", VariableType::Float32, 1)
        .variable("FuelLevel", VariableType::Float32, 1)
        .variable("IsOnTrack", VariableType::Bool, 1)
        .variable("SessionFlags", VariableType::BitField, 1)
        .variable("FrameTick", VariableType::Int32, 1)
        .variable("CarIdxLapDistPct", VariableType::Float32, 64)
        .build()
}

/// Speed written for `tick` by [`publish_standard_frame`].
pub fn speed_at(tick: i32) -> f32 {
    tick as f32 * 0.5
}

/// Publish a frame whose values are derived from `tick`.
pub fn publish_standard_frame(producer: &MemoryProducer, tick: i32) {
    producer.publish_frame(tick, |frame| {
        frame
            .set_f64("SessionTime", tick as f64 / 60.0)
            .set_f32("Speed", speed_at(tick))
            .set_f32("RPM", 3000.0 + tick as f32)
            .set_i32("Gear", tick % 6 + 1)
            .set_f32("Throttle", 1.0)
            .set_f32("Brake", 0.0)
            .set_f32("Clutch", 0.0)
            .set_i32("Lap", tick / 600)
            .set_f32("LapDistPct", (tick % 600) as f32 / 600.0)
            .set_f32("FuelLevel", 40.0)
            .set_bool("IsOnTrack", true)
            .set_bitfield("SessionFlags", BitField::new(0x0004))
            .set_i32("FrameTick", tick);
        for car in 0..64 {
            frame.set_f32_at("CarIdxLapDistPct", car, car as f32 / 64.0);
        }
    });
}

/// Client configuration with millisecond timeouts for tests.
pub fn fast_config() -> ClientConfig {
    ClientConfig {
        frame_timeout_ms: 5,
        connect_timeout_ms: 5,
        reconnect_interval_ms: 5,
        liveness_window_ms: 250,
        ..ClientConfig::default()
    }
}
