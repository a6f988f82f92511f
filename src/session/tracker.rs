//! Session metadata change tracking
//!
//! The producer bumps `session_info_update` whenever it rewrites the metadata
//! block. [`SessionTracker`] re-reads the block only when that counter moves,
//! and discards a read if the counter moved again while it was copying.

use super::identity::SessionIdentity;
use super::query;
use crate::region::SharedRegion;
use crate::schema::SharedHeader;
use crate::Result;
use std::sync::Arc;
use tracing::{debug, info};

/// One version of the session metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionMetadata {
    /// Value of the header's update counter this text was read at
    pub update: i32,
    pub text: String,
    pub identity: SessionIdentity,
}

impl SessionMetadata {
    pub fn new(update: i32, text: String) -> Self {
        let identity = SessionIdentity::from_metadata(&text);
        Self { update, text, identity }
    }

    pub fn query(&self, path: &str) -> Option<&str> {
        query::query_str(&self.text, path)
    }

    pub fn parse_string(&self, path: &str) -> String {
        query::parse_string(&self.text, path)
    }

    pub fn parse_int(&self, path: &str) -> i32 {
        query::parse_int(&self.text, path)
    }

    pub fn parse_float(&self, path: &str) -> f32 {
        query::parse_float(&self.text, path)
    }

    pub fn parse_double(&self, path: &str) -> f64 {
        query::parse_double(&self.text, path)
    }
}

/// Decode the metadata block: bytes up to the first NUL, as Latin-1.
pub fn decode_session_text(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    bytes[..end].iter().map(|&b| char::from(b)).collect()
}

/// Read the metadata block described by `header`.
pub fn read_session_text<R: SharedRegion + ?Sized>(region: &R, header: &SharedHeader) -> Result<String> {
    let (Ok(offset), Ok(len)) =
        (usize::try_from(header.session_info_offset), usize::try_from(header.session_info_len))
    else {
        return Ok(String::new());
    };
    region.check_range(offset, len)?;
    let mut bytes = vec![0u8; len];
    region.read_bytes(offset, &mut bytes)?;
    Ok(decode_session_text(&bytes))
}

/// Caches the latest metadata and refreshes it when the producer's counter changes.
#[derive(Debug, Default)]
pub struct SessionTracker {
    current: Option<Arc<SessionMetadata>>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&Arc<SessionMetadata>> {
        self.current.as_ref()
    }

    /// Counter value of the cached metadata.
    pub fn last_update(&self) -> Option<i32> {
        self.current.as_ref().map(|metadata| metadata.update)
    }

    /// Re-read the metadata if `header` reports a new version.
    ///
    /// Returns the new metadata when it changed, `None` when the cache is
    /// current or the block was rewritten during the read.
    pub fn refresh<R: SharedRegion + ?Sized>(
        &mut self,
        region: &R,
        header: &SharedHeader,
    ) -> Result<Option<Arc<SessionMetadata>>> {
        let update = header.session_info_update;
        if self.last_update() == Some(update) {
            return Ok(None);
        }

        let text = read_session_text(region, header)?;
        let after = region.header()?.session_info_update;
        if after != update {
            debug!(update, after, "Session metadata rewritten during read");
            return Ok(None);
        }

        let metadata = Arc::new(SessionMetadata::new(update, text));
        info!(
            update,
            track = %metadata.identity.track_name,
            car = %metadata.identity.car_name,
            driver = %metadata.identity.driver_name,
            "Session metadata updated"
        );
        self.current = Some(Arc::clone(&metadata));
        Ok(Some(metadata))
    }

    pub fn reset(&mut self) {
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::MemoryProducer;

    #[test]
    fn decodes_latin1_up_to_terminator() {
        assert_eq!(decode_session_text(b"Name: J\xfcrgen\0garbage"), "Name: Jürgen");
        assert_eq!(decode_session_text(b"no terminator"), "no terminator");
        assert_eq!(decode_session_text(b""), "");
    }

    #[test]
    fn refreshes_only_when_the_counter_moves() {
        let producer = MemoryProducer::builder().session_capacity(256).build();
        producer.set_session_info("WeekendInfo:\n TrackName: texas\n").unwrap();
        let mut region = producer.region();
        assert!(region.open());

        let mut tracker = SessionTracker::new();
        let header = region.header().unwrap();
        let first = tracker.refresh(&region, &header).unwrap().unwrap();
        assert_eq!(first.update, 1);
        assert_eq!(first.identity.track_name, "texas");
        assert_eq!(first.query("WeekendInfo:TrackName"), Some("texas"));

        assert!(tracker.refresh(&region, &header).unwrap().is_none());

        producer.set_session_info("WeekendInfo:\n TrackName: daytona\n").unwrap();
        let header = region.header().unwrap();
        let second = tracker.refresh(&region, &header).unwrap().unwrap();
        assert_eq!(second.update, 2);
        assert_eq!(second.parse_string("WeekendInfo:TrackName"), "daytona");
        assert_eq!(tracker.last_update(), Some(2));

        tracker.reset();
        assert!(tracker.current().is_none());
        assert!(tracker.refresh(&region, &header).unwrap().is_some());
    }

    #[test]
    fn oversized_metadata_length_is_a_memory_error() {
        let producer = MemoryProducer::builder().session_capacity(64).build();
        producer.set_session_info("A: 1\n").unwrap();
        let mut region = producer.region();
        assert!(region.open());

        let mut header = region.header().unwrap();
        header.session_info_len = i32::MAX;
        let err = SessionTracker::new().refresh(&region, &header).unwrap_err();
        assert!(matches!(err, crate::TelemetryError::Memory { .. }));
    }

    #[test]
    fn stale_header_read_is_discarded() {
        let producer = MemoryProducer::builder().session_capacity(256).build();
        producer.set_session_info("A: 1\n").unwrap();
        let mut region = producer.region();
        assert!(region.open());
        let stale = region.header().unwrap();

        producer.set_session_info("A: 2\n").unwrap();
        let mut tracker = SessionTracker::new();
        assert!(tracker.refresh(&region, &stale).unwrap().is_none());

        let fresh = region.header().unwrap();
        let metadata = tracker.refresh(&region, &fresh).unwrap().unwrap();
        assert_eq!(metadata.parse_int("A"), 2);
    }
}
