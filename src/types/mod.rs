use serde::{Deserialize, Serialize};

use crate::dynamics::AccelerationExtremes;

/// One decoded inertial sample in physical units.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    /// Monotonic seconds
    pub timestamp: f64,
    /// °C
    pub temperature: f64,
    /// deg/s, body X/Y/Z
    pub gyro: (f64, f64, f64),
    /// g, body X/Y/Z
    pub accel: (f64, f64, f64),
}

/// Output of one processed sample.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImuFrame {
    /// Seconds since the first sample of the session
    pub timestamp: f64,
    pub heading: f64,
    pub roll: f64,
    pub pitch: f64,
    pub roll_period: f64,
    pub roll_amp_port: f64,
    pub roll_amp_stbd: f64,
    pub surge: f64,
    pub sway: f64,
    pub heave: f64,
    pub temperature: f64,
    /// Samples drained from the source in the iteration that produced this frame
    pub backlog: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Cancelled,
    DurationReached,
    EndOfStream,
    SensorFailure,
    SinkFailure,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionSummary {
    pub duration_secs: f64,
    pub samples_received: u64,
    pub frames_emitted: u64,
    pub roll_amp_port: f64,
    pub roll_amp_stbd: f64,
    pub roll_period: f64,
    pub acceleration_extremes: AccelerationExtremes,
    pub stop_reason: StopReason,
}
