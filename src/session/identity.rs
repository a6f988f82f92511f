//! Track, car and driver identity for the current session.

use super::query::{parse_float, parse_int, parse_string};
use serde::{Deserialize, Serialize};

/// Who is driving what, where.
#[derive(Default, Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionIdentity {
    /// Display name of the track, or its short name when no display name is published
    pub track_name: String,
    pub track_config: String,
    /// Track length in kilometres
    pub track_length_km: f32,
    /// Car index of the local driver
    pub driver_car_idx: i32,
    pub driver_name: String,
    /// Screen name of the local driver's car, or its path when no screen name is published
    pub car_name: String,
}

impl SessionIdentity {
    /// Extract the identity from session metadata text. Missing fields stay empty.
    pub fn from_metadata(text: &str) -> Self {
        let mut track_name = parse_string(text, "WeekendInfo:TrackDisplayName");
        if track_name.is_empty() {
            track_name = parse_string(text, "WeekendInfo:TrackName");
        }

        let driver_car_idx = parse_int(text, "DriverInfo:DriverCarIdx");
        let driver_field =
            |field: &str| parse_string(text, &format!("DriverInfo:Drivers:CarIdx:{{{driver_car_idx}}}{field}"));

        let mut car_name = driver_field("CarScreenName");
        if car_name.is_empty() {
            car_name = driver_field("CarPath");
        }

        Self {
            track_name,
            track_config: parse_string(text, "WeekendInfo:TrackConfigName"),
            track_length_km: parse_float(text, "WeekendInfo:TrackLength"),
            driver_car_idx,
            driver_name: driver_field("UserName"),
            car_name,
        }
    }

    /// Whether the metadata named a track.
    pub fn is_known(&self) -> bool {
        !self.track_name.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SESSION: &str = "\
---
WeekendInfo:
 TrackName: lagunaseca
 TrackDisplayName: WeatherTech Raceway Laguna Seca
 TrackConfigName: Full Course
 TrackLength: 3.60 km
DriverInfo:
 DriverCarIdx: 2
 Drivers:
 - CarIdx: 0
   UserName: Pace Car
   CarScreenName: safety pcporsche911cup
 - CarIdx: 2
   UserName: Sam Driver
   CarPath: mx5 mx52016
...
";

    #[test]
    fn extracts_identity_for_the_local_driver() {
        let identity = SessionIdentity::from_metadata(SESSION);
        assert_eq!(identity.track_name, "WeatherTech Raceway Laguna Seca");
        assert_eq!(identity.track_config, "Full Course");
        assert_eq!(identity.track_length_km, 3.6);
        assert_eq!(identity.driver_car_idx, 2);
        assert_eq!(identity.driver_name, "Sam Driver");
        assert_eq!(identity.car_name, "mx5 mx52016");
        assert!(identity.is_known());
    }

    #[test]
    fn falls_back_to_short_track_name() {
        let text = "WeekendInfo:\n TrackName: texas\n";
        let identity = SessionIdentity::from_metadata(text);
        assert_eq!(identity.track_name, "texas");
        assert_eq!(identity.driver_car_idx, 0);
        assert_eq!(identity.car_name, "");
    }

    #[test]
    fn empty_metadata_is_unknown() {
        let identity = SessionIdentity::from_metadata("");
        assert_eq!(identity, SessionIdentity::default());
        assert!(!identity.is_known());
    }
}
