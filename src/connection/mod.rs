//! Async connection surface over the blocking client loop.

pub mod live;

pub use live::LiveConnection;
