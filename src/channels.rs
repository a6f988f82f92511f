//! Channel resolution: the working set of variables a session needs.
//!
//! A [`ChannelTable`] is built from a [`VariableDirectory`] once per session.
//! It succeeds only when every required channel resolves to a binding that
//! fits the buffer; optional channels may be missing and are simply skipped
//! when sampling.

use crate::schema::VariableDirectory;
use crate::types::{VarBinding, VarData};
use crate::{Result, TelemetryError};
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

/// One requested channel and what it resolved to.
#[derive(Debug, Clone, PartialEq)]
pub enum Channel {
    /// Must resolve for the session to start.
    Required { name: String, binding: VarBinding },
    /// May be absent from this build of the simulator.
    Optional { name: String, binding: Option<VarBinding> },
}

impl Channel {
    pub fn name(&self) -> &str {
        match self {
            Channel::Required { name, .. } | Channel::Optional { name, .. } => name,
        }
    }

    pub fn binding(&self) -> Option<&VarBinding> {
        match self {
            Channel::Required { binding, .. } => Some(binding),
            Channel::Optional { binding, .. } => binding.as_ref(),
        }
    }

    pub fn is_required(&self) -> bool {
        matches!(self, Channel::Required { .. })
    }
}

/// Resolved channels with lookup by name.
#[derive(Debug, Clone, Default)]
pub struct ChannelTable {
    channels: Vec<Channel>,
    index_map: HashMap<String, usize>,
}

impl ChannelTable {
    /// Resolve `required` and `optional` names against `directory`.
    ///
    /// Fails with [`TelemetryError::MissingChannels`] listing every required
    /// name that is absent or does not fit the buffer.
    pub fn resolve<S: AsRef<str>>(
        directory: &VariableDirectory,
        required: &[S],
        optional: &[S],
    ) -> Result<Self> {
        let mut channels = Vec::with_capacity(required.len() + optional.len());
        let mut missing = Vec::new();

        for name in required.iter().map(AsRef::as_ref) {
            match directory.binding(name) {
                Some(binding) => {
                    channels.push(Channel::Required { name: name.to_string(), binding })
                }
                None => missing.push(name.to_string()),
            }
        }

        if !missing.is_empty() {
            return Err(TelemetryError::MissingChannels { names: missing });
        }

        for name in optional.iter().map(AsRef::as_ref) {
            let binding = directory.binding(name);
            if binding.is_none() {
                debug!(name, "Optional channel not available");
            }
            channels.push(Channel::Optional { name: name.to_string(), binding });
        }

        let index_map = channels
            .iter()
            .enumerate()
            .map(|(index, channel)| (channel.name().to_string(), index))
            .collect();

        Ok(Self { channels, index_map })
    }

    pub fn get(&self, name: &str) -> Option<&VarBinding> {
        self.index_map.get(name).and_then(|&index| self.channels[index].binding())
    }

    pub fn is_resolved(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// Number of channels that resolved.
    pub fn resolved_count(&self) -> usize {
        self.channels.iter().filter(|channel| channel.binding().is_some()).count()
    }

    /// Read the first element of `name`, if it resolved and decodes as `T`.
    pub fn read<T: VarData>(&self, frame: &[u8], name: &str) -> Option<T> {
        self.get(name)?.read(frame, 0).ok()
    }

    /// Extract the standard driver channels from `frame`.
    pub fn sample(&self, frame: &[u8], tick: i32) -> TelemetrySample {
        TelemetrySample {
            tick,
            speed: self.read(frame, "Speed"),
            rpm: self.read(frame, "RPM"),
            gear: self.read(frame, "Gear"),
            throttle: self.read(frame, "Throttle"),
            brake: self.read(frame, "Brake"),
            clutch: self.read(frame, "Clutch"),
            lap: self.read(frame, "Lap"),
            lap_dist_pct: self.read(frame, "LapDistPct"),
            session_time: self.read(frame, "SessionTime"),
            fuel_level: self.read(frame, "FuelLevel"),
            is_on_track: self.read(frame, "IsOnTrack"),
        }
    }
}

/// Raw values of the standard channels for one frame. Absent channels are `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TelemetrySample {
    pub tick: i32,
    pub speed: Option<f32>,
    pub rpm: Option<f32>,
    pub gear: Option<i32>,
    pub throttle: Option<f32>,
    pub brake: Option<f32>,
    pub clutch: Option<f32>,
    pub lap: Option<i32>,
    pub lap_dist_pct: Option<f32>,
    pub session_time: Option<f64>,
    pub fuel_level: Option<f32>,
    pub is_on_track: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::VarHeader;
    use crate::types::VariableType;

    fn directory(entries: &[(&str, VariableType, usize)], buf_len: usize) -> VariableDirectory {
        let mut table = Vec::new();
        for (name, data_type, offset) in entries {
            table.extend_from_slice(
                &VarHeader::raw(data_type.raw(), *offset as i32, 1, name).to_bytes(),
            );
        }
        VariableDirectory::from_table(&table, entries.len(), buf_len).unwrap()
    }

    #[test]
    fn resolves_required_and_optional_channels() {
        let dir = directory(
            &[
                ("Speed", VariableType::Float32, 0),
                ("RPM", VariableType::Float32, 4),
                ("Gear", VariableType::Int32, 8),
                ("SessionTime", VariableType::Float64, 16),
            ],
            24,
        );

        let table =
            ChannelTable::resolve(&dir, &["Speed", "RPM", "Gear"], &["SessionTime", "Brake"]).unwrap();
        assert_eq!(table.channels().len(), 5);
        assert_eq!(table.resolved_count(), 4);
        assert!(table.is_resolved("SessionTime"));
        assert!(!table.is_resolved("Brake"));
        assert!(table.channels()[0].is_required());

        let mut frame = vec![0u8; 24];
        frame[0..4].copy_from_slice(&41.0f32.to_le_bytes());
        frame[4..8].copy_from_slice(&6100.0f32.to_le_bytes());
        frame[8..12].copy_from_slice(&3i32.to_le_bytes());
        frame[16..24].copy_from_slice(&12.5f64.to_le_bytes());

        let sample = table.sample(&frame, 77);
        assert_eq!(sample.tick, 77);
        assert_eq!(sample.speed, Some(41.0));
        assert_eq!(sample.rpm, Some(6100.0));
        assert_eq!(sample.gear, Some(3));
        assert_eq!(sample.session_time, Some(12.5));
        assert_eq!(sample.brake, None);
    }

    #[test]
    fn missing_required_channels_are_all_reported() {
        let dir = directory(&[("Speed", VariableType::Float32, 0)], 16);
        let err = ChannelTable::resolve(&dir, &["Speed", "RPM", "Gear"], &[]).unwrap_err();
        match err {
            TelemetryError::MissingChannels { names } => assert_eq!(names, vec!["RPM", "Gear"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn required_channel_outside_buffer_counts_as_missing() {
        let dir = directory(
            &[("Speed", VariableType::Float32, 0), ("RPM", VariableType::Float32, 14)],
            16,
        );
        assert!(ChannelTable::resolve(&dir, &["Speed", "RPM"], &[]).is_err());
    }

    #[test]
    fn sample_serializes_for_consumers() {
        let sample = TelemetrySample { tick: 1, gear: Some(2), ..TelemetrySample::default() };
        let yaml = serde_yaml_ng::to_string(&sample).unwrap();
        assert!(yaml.contains("gear: 2"));
        assert!(yaml.contains("speed: null"));
    }
}
