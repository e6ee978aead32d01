//! Real-time roll monitor for small vessels.
//!
//! Turns a stream of 6-axis inertial samples into heading, heel and pitch,
//! roll period and per-side roll amplitude, and surge/sway/heave with their
//! session extremes.

pub mod attitude;
pub mod conditioning;
pub mod config;
pub mod dynamics;
pub mod error;
pub mod live_status;
pub mod report;
pub mod roll_analysis;
pub mod sensors;
pub mod session;
pub mod types;

pub use config::{parse_heading, FilterProfile, InitialHeading, MonitorConfig};
pub use error::{MonitorError, Result, SensorError};
pub use report::FrameSink;
pub use sensors::SensorSource;
pub use session::SessionController;
pub use types::{ImuFrame, RawSample, SessionSummary, StopReason};
