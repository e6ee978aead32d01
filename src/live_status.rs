use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::dynamics::AccelerationExtremes;
use crate::error::Result;
use crate::report::FrameSink;
use crate::types::{ImuFrame, SessionSummary};

#[derive(Serialize, Deserialize, Clone, Default)]
pub struct LiveStatus {
    pub timestamp: f64,
    pub session_secs: f64,
    pub frames: u64,
    pub max_backlog: usize,
    // Attitude
    pub heading: f64,
    pub roll: f64,
    pub pitch: f64,
    // Roll oscillation
    pub roll_period: f64,
    pub roll_amp_port: f64,
    pub roll_amp_stbd: f64,
    // Dynamics
    pub surge: f64,
    pub sway: f64,
    pub heave: f64,
    pub acceleration_extremes: Option<AccelerationExtremes>,
    pub temperature: f64,
    pub finished: bool,
}

impl LiveStatus {
    pub fn new() -> Self {
        Self {
            timestamp: current_timestamp(),
            ..Self::default()
        }
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

/// Rewrites a live status JSON file at a fixed interval.
pub struct LiveStatusWriter {
    path: PathBuf,
    interval: Duration,
    last_write: Option<Instant>,
    status: LiveStatus,
}

impl LiveStatusWriter {
    pub fn new(path: PathBuf, interval: Duration) -> Self {
        Self {
            path,
            interval,
            last_write: None,
            status: LiveStatus::new(),
        }
    }

    pub fn status(&self) -> &LiveStatus {
        &self.status
    }

    fn write(&mut self) -> Result<()> {
        self.status.timestamp = current_timestamp();
        self.status.save(&self.path)?;
        self.last_write = Some(Instant::now());
        Ok(())
    }
}

impl FrameSink for LiveStatusWriter {
    fn on_frame(&mut self, frame: &ImuFrame) -> Result<()> {
        let s = &mut self.status;
        s.session_secs = frame.timestamp;
        s.frames += 1;
        s.max_backlog = s.max_backlog.max(frame.backlog);
        s.heading = frame.heading;
        s.roll = frame.roll;
        s.pitch = frame.pitch;
        s.roll_period = frame.roll_period;
        s.roll_amp_port = frame.roll_amp_port;
        s.roll_amp_stbd = frame.roll_amp_stbd;
        s.surge = frame.surge;
        s.sway = frame.sway;
        s.heave = frame.heave;
        s.temperature = frame.temperature;

        let due = self
            .last_write
            .map_or(true, |t| t.elapsed() >= self.interval);
        if due {
            if let Err(e) = self.write() {
                // Best-effort, the next frame retries
                log::warn!("live status write failed: {}", e);
            }
        }
        Ok(())
    }

    fn on_summary(&mut self, summary: &SessionSummary) -> Result<()> {
        self.status.session_secs = summary.duration_secs;
        self.status.roll_period = summary.roll_period;
        self.status.roll_amp_port = summary.roll_amp_port;
        self.status.roll_amp_stbd = summary.roll_amp_stbd;
        self.status.acceleration_extremes = Some(summary.acceleration_extremes);
        self.status.finished = true;
        self.write()
    }
}

pub fn current_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
