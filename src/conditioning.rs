use crate::types::RawSample;

/// Exponential moving average step.
///
/// `alpha` in (0, 1]: small values favour stability, large values favour response.
#[inline]
pub fn ema(prev: f64, raw: f64, alpha: f64) -> f64 {
    (1.0 - alpha) * prev + alpha * raw
}

/// Force `value` to exactly zero when its magnitude is below `threshold`.
#[inline]
pub fn deadband(value: f64, threshold: f64) -> f64 {
    if value.abs() < threshold {
        0.0
    } else {
        value
    }
}

/// Smoothed state of the six inertial channels.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FilterState {
    pub gyro: (f64, f64, f64),
    pub accel: (f64, f64, f64),
}

/// Smoothed accel and deadbanded smoothed gyro for one sample.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConditionedSample {
    pub gyro: (f64, f64, f64),
    pub accel: (f64, f64, f64),
}

pub struct SignalConditioner {
    alpha: f64,
    gyro_threshold: f64,
    state: FilterState,
}

impl SignalConditioner {
    pub fn new(alpha: f64, gyro_threshold: f64) -> Self {
        Self {
            alpha,
            gyro_threshold,
            state: FilterState::default(),
        }
    }

    /// Advance all six filters by one sample.
    ///
    /// The deadband only shapes the returned gyro values; the stored filter
    /// state keeps the unsuppressed average.
    pub fn condition(&mut self, sample: &RawSample) -> ConditionedSample {
        let a = self.alpha;
        let s = &mut self.state;

        s.gyro.0 = ema(s.gyro.0, sample.gyro.0, a);
        s.gyro.1 = ema(s.gyro.1, sample.gyro.1, a);
        s.gyro.2 = ema(s.gyro.2, sample.gyro.2, a);

        s.accel.0 = ema(s.accel.0, sample.accel.0, a);
        s.accel.1 = ema(s.accel.1, sample.accel.1, a);
        s.accel.2 = ema(s.accel.2, sample.accel.2, a);

        let t = self.gyro_threshold;
        ConditionedSample {
            gyro: (deadband(s.gyro.0, t), deadband(s.gyro.1, t), deadband(s.gyro.2, t)),
            accel: s.accel,
        }
    }

    pub fn state(&self) -> &FilterState {
        &self.state
    }
}
