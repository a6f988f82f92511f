//! iRacing shared memory access on Windows
//!
//! [`WindowsRegion`] maps the simulator's named file mapping read-only and
//! opens its data-valid event; it is the production [`SharedRegion`]
//! implementation. [`WindowBroadcaster`] sends outbound commands through the
//! registered broadcast window message.
//!
//! ```rust,ignore
//! use ira_telemetry::region::SharedRegion;
//! use ira_telemetry::windows::WindowsRegion;
//!
//! let mut region = WindowsRegion::new();
//! if region.open() {
//!     let header = region.header()?;
//!     println!("{} variables at {} Hz", header.num_vars, header.tick_rate);
//! }
//! ```
//!
//! [`SharedRegion`]: crate::region::SharedRegion

mod broadcast;
mod region;

pub use broadcast::WindowBroadcaster;
pub use region::WindowsRegion;
