//! Session metadata: path queries, identity extraction and change tracking.

pub mod identity;
pub mod query;
pub mod tracker;

pub use identity::SessionIdentity;
pub use query::{Span, parse_double, parse_float, parse_int, parse_string, query, query_str, query_traced};
pub use tracker::{SessionMetadata, SessionTracker, decode_session_text, read_session_text};
