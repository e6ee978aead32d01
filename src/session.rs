// session.rs — Owns the per-session pipeline state and drives the sample loop
//
// One `SessionController` per session. All filter, attitude, dynamics and
// roll state is created fresh in `new` and only ever mutated by `process`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::attitude::AttitudeEstimator;
use crate::conditioning::SignalConditioner;
use crate::config::{InitialHeading, MonitorConfig};
use crate::dynamics::MotionDynamics;
use crate::error::{MonitorError, Result, SensorError};
use crate::report::FrameSink;
use crate::roll_analysis::RollOscillationAnalyzer;
use crate::sensors::SensorSource;
use crate::types::{ImuFrame, RawSample, SessionSummary, StopReason};

/// Everything the pipeline remembers between samples.
pub struct MotionState {
    pub conditioner: SignalConditioner,
    pub attitude: AttitudeEstimator,
    pub dynamics: MotionDynamics,
    pub roll: RollOscillationAnalyzer,
}

impl MotionState {
    fn new(config: &MonitorConfig, heading: InitialHeading) -> Self {
        Self {
            conditioner: SignalConditioner::new(config.alpha, config.gyro_threshold),
            attitude: AttitudeEstimator::new(heading.degrees()),
            dynamics: MotionDynamics::new(config.stillness_epsilon),
            roll: RollOscillationAnalyzer::new(config),
        }
    }
}

pub struct SessionController {
    config: MonitorConfig,
    state: MotionState,

    // Sample clock
    start_ts: Option<f64>,
    last_ts: Option<f64>,

    samples_received: u64,
    frames_emitted: u64,
}

/// Result of one drain pass over the source.
struct Drained {
    latest: Option<RawSample>,
    count: usize,
    ended: bool,
}

impl SessionController {
    pub fn new(config: MonitorConfig, heading: InitialHeading) -> Result<Self> {
        config.validate()?;
        let state = MotionState::new(&config, heading);
        Ok(Self {
            config,
            state,
            start_ts: None,
            last_ts: None,
            samples_received: 0,
            frames_emitted: 0,
        })
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn state(&self) -> &MotionState {
        &self.state
    }

    /// Run one sample through the pipeline. `backlog` is reported as-is.
    pub fn process(&mut self, sample: &RawSample, backlog: usize) -> ImuFrame {
        let t0 = *self.start_ts.get_or_insert(sample.timestamp);
        let dt = self.last_ts.map_or(0.0, |prev| sample.timestamp - prev);
        self.last_ts = Some(sample.timestamp);
        let t = sample.timestamp - t0;

        let s = &mut self.state;
        let conditioned = s.conditioner.condition(sample);
        let attitude = s.attitude.estimate(conditioned.accel, conditioned.gyro, dt);
        // Dynamics work on the unsmoothed vector
        let accel = s.dynamics.decompose(sample.accel);
        s.roll.observe(attitude.roll, t);
        let amp = s.roll.amplitude();

        self.frames_emitted += 1;
        ImuFrame {
            timestamp: t,
            heading: attitude.heading,
            roll: attitude.roll,
            pitch: attitude.pitch,
            roll_period: s.roll.period(),
            roll_amp_port: amp.roll_amp_port,
            roll_amp_stbd: amp.roll_amp_stbd,
            surge: accel.surge,
            sway: accel.sway,
            heave: accel.heave,
            temperature: sample.temperature,
            backlog,
        }
    }

    /// Summary of everything processed so far. Duration is measured on the
    /// sample clock, first to last processed sample.
    pub fn summary(&self, stop_reason: StopReason) -> SessionSummary {
        let duration_secs = match (self.start_ts, self.last_ts) {
            (Some(first), Some(last)) => (last - first).max(0.0),
            _ => 0.0,
        };
        let amp = self.state.roll.amplitude();
        SessionSummary {
            duration_secs,
            samples_received: self.samples_received,
            frames_emitted: self.frames_emitted,
            roll_amp_port: amp.roll_amp_port,
            roll_amp_stbd: amp.roll_amp_stbd,
            roll_period: self.state.roll.period(),
            acceleration_extremes: *self.state.dynamics.extremes(),
            stop_reason,
        }
    }

    /// Drive the session until `stop` is set, `max_duration` elapses (wall
    /// clock) or the source ends.
    ///
    /// The source is always handed back to idle mode before returning, and
    /// every sink receives the summary, including when a sensor or sink
    /// error ends the session. That error is then returned.
    pub fn run<S>(
        &mut self,
        source: &mut S,
        sinks: &mut [Box<dyn FrameSink + Send>],
        stop: &AtomicBool,
        max_duration: Option<Duration>,
    ) -> Result<SessionSummary>
    where
        S: SensorSource + ?Sized,
    {
        info!(
            "Session starting: alpha={} gyro_threshold={} drain_limit={}",
            self.config.alpha, self.config.gyro_threshold, self.config.drain_limit
        );

        let outcome = match source.enter_sampling_mode() {
            Ok(()) => self.sample_loop(source, sinks, stop, max_duration),
            Err(e) => Err(MonitorError::Sensor(e)),
        };

        if let Err(e) = source.enter_idle_mode() {
            warn!("Could not return sensor to idle mode: {}", e);
        }

        let (reason, error) = match outcome {
            Ok(reason) => (reason, None),
            Err(e) => {
                warn!("Session aborted: {}", e);
                let reason = match e {
                    MonitorError::Sensor(_) => StopReason::SensorFailure,
                    _ => StopReason::SinkFailure,
                };
                (reason, Some(e))
            }
        };

        let summary = self.summary(reason);
        for sink in sinks.iter_mut() {
            if let Err(e) = sink.on_summary(&summary) {
                warn!("Summary sink failed: {}", e);
            }
        }
        info!(
            "Session stopped ({:?}) after {} frames, {:.1}s",
            reason, summary.frames_emitted, summary.duration_secs
        );

        match error {
            Some(e) => Err(e),
            None => Ok(summary),
        }
    }

    fn sample_loop<S>(
        &mut self,
        source: &mut S,
        sinks: &mut [Box<dyn FrameSink + Send>],
        stop: &AtomicBool,
        max_duration: Option<Duration>,
    ) -> Result<StopReason>
    where
        S: SensorSource + ?Sized,
    {
        let started = Instant::now();
        let idle = Duration::from_millis(self.config.idle_sleep_ms);

        loop {
            if stop.load(Ordering::Relaxed) {
                return Ok(StopReason::Cancelled);
            }
            if max_duration.is_some_and(|limit| started.elapsed() >= limit) {
                return Ok(StopReason::DurationReached);
            }

            let drained = self.drain(source)?;
            self.samples_received += drained.count as u64;

            match drained.latest {
                Some(sample) => {
                    let frame = self.process(&sample, drained.count);
                    for sink in sinks.iter_mut() {
                        sink.on_frame(&frame)?;
                    }
                }
                None if drained.ended => return Ok(StopReason::EndOfStream),
                None => thread::sleep(idle),
            }
        }
    }

    /// Pull up to `drain_limit` pending samples and keep the freshest. When
    /// none are pending, one extra read is attempted.
    fn drain<S>(&mut self, source: &mut S) -> Result<Drained>
    where
        S: SensorSource + ?Sized,
    {
        let mut drained = Drained { latest: None, count: 0, ended: false };

        for _ in 0..self.config.drain_limit {
            match Self::read(source, &mut drained)? {
                true => continue,
                false => break,
            }
        }
        if drained.count == 0 && !drained.ended {
            Self::read(source, &mut drained)?;
        }
        if drained.count > 1 {
            debug!("Drained {} samples, skipping {}", drained.count, drained.count - 1);
        }
        Ok(drained)
    }

    /// One read into `drained`. Returns whether a sample arrived.
    fn read<S>(source: &mut S, drained: &mut Drained) -> Result<bool>
    where
        S: SensorSource + ?Sized,
    {
        match source.next_sample() {
            Ok(Some(sample)) => {
                drained.latest = Some(sample);
                drained.count += 1;
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(SensorError::EndOfStream) => {
                drained.ended = true;
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }
}
