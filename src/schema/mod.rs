//! Shared region layout: the header and the variable descriptor table.
//!
//! Both structures are written by the producer and read here by value. They
//! are cross-platform so that in-memory regions, tests and benchmarks use the
//! exact byte layout the simulator publishes.

pub mod header;
pub mod variables;

pub use header::{
    BufferDescriptor, HEADER_SIZE, IRSDK_MAX_BUFS, IRSDK_STATUS_CONNECTED, IRSDK_VER,
    SharedHeader, tick_count_offset,
};
pub use variables::{VAR_HEADER_SIZE, VarHeader, VariableDirectory};
