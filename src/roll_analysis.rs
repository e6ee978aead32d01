// roll_analysis.rs — Roll period and swing amplitude from a noisy roll signal
//
// The period estimator does not assume a frequency. It accepts "peaks" that
// alternate between the port and starboard side, gated on a minimum roll
// magnitude and a debounce interval, and takes twice the spacing of the last
// two accepted peaks as the period. Amplitude tracking is separate and
// reports the extent of the current swing on each side.

use serde::{Deserialize, Serialize};

use crate::attitude::ROLL_LIMIT_DEG;
use crate::config::MonitorConfig;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RollPeak {
    pub timestamp: f64,
    pub roll: f64,
}

/// Holds the two most recent accepted peaks.
#[derive(Clone, Debug, Default)]
pub struct PeakBuffer {
    slots: [Option<RollPeak>; 2],
}

impl PeakBuffer {
    /// Append a peak, evicting the oldest when full.
    pub fn push(&mut self, peak: RollPeak) {
        if self.slots[1].is_some() {
            self.slots[0] = self.slots[1].take();
            self.slots[1] = Some(peak);
        } else if self.slots[0].is_some() {
            self.slots[1] = Some(peak);
        } else {
            self.slots[0] = Some(peak);
        }
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots[0].is_none()
    }

    pub fn oldest(&self) -> Option<RollPeak> {
        self.slots[0]
    }

    pub fn latest(&self) -> Option<RollPeak> {
        self.slots[1].or(self.slots[0])
    }

    /// (previous, latest) once two peaks are held
    pub fn pair(&self) -> Option<(RollPeak, RollPeak)> {
        match self.slots {
            [Some(a), Some(b)] => Some((a, b)),
            _ => None,
        }
    }
}

/// Current swing extremes plus the last reported amplitude per side.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RollAmplitude {
    /// <= 0
    pub max_roll_port: f64,
    /// >= 0
    pub max_roll_stbd: f64,
    pub roll_amp_port: f64,
    pub roll_amp_stbd: f64,
}

pub struct RollOscillationAnalyzer {
    // Gates
    peak_min_amplitude: f64,
    peak_min_interval: f64,
    period_range: (f64, f64),
    period_max_age: f64,
    amplitude_reset: f64,

    peaks: PeakBuffer,
    last_roll: f64,
    period: f64,
    amplitude: RollAmplitude,
}

impl RollOscillationAnalyzer {
    pub fn new(config: &MonitorConfig) -> Self {
        Self {
            peak_min_amplitude: config.peak_min_amplitude,
            peak_min_interval: config.peak_min_interval_secs,
            period_range: (config.period_min_secs, config.period_max_secs),
            period_max_age: config.period_max_age_secs,
            amplitude_reset: config.amplitude_reset_deg,
            peaks: PeakBuffer::default(),
            last_roll: 0.0,
            period: 0.0,
            amplitude: RollAmplitude::default(),
        }
    }

    /// Feed one roll observation (degrees) taken at `timestamp` (seconds).
    pub fn observe(&mut self, roll: f64, timestamp: f64) {
        self.update_period(roll, timestamp);
        self.update_amplitude(roll);
    }

    fn update_period(&mut self, roll: f64, timestamp: f64) {
        let gate = self.peak_min_amplitude;

        if roll.abs() >= gate {
            match self.peaks.latest() {
                None => self.peaks.push(RollPeak { timestamp, roll }),
                Some(prev) => {
                    // Trending back up after a port-side peak, or back down
                    // after a starboard-side peak, and now on the other side.
                    let from_port = roll > self.last_roll && prev.roll <= -gate && roll > 0.0;
                    let from_stbd = roll < self.last_roll && prev.roll >= gate && roll < 0.0;

                    if (from_port || from_stbd)
                        && timestamp - prev.timestamp >= self.peak_min_interval
                    {
                        self.peaks.push(RollPeak { timestamp, roll });
                        self.on_peak_accepted();
                    }
                }
            }
            self.last_roll = roll;
        }

        if let Some(oldest) = self.peaks.oldest() {
            if timestamp - oldest.timestamp > self.period_max_age {
                self.period = 0.0;
            }
        }
    }

    fn on_peak_accepted(&mut self) {
        if let Some((prev, latest)) = self.peaks.pair() {
            let period = 2.0 * (latest.timestamp - prev.timestamp);
            let (lo, hi) = self.period_range;
            if (lo..=hi).contains(&period) {
                self.period = period;
            } else {
                log::debug!("roll period {:.2}s outside [{}, {}], keeping {:.2}s", period, lo, hi, self.period);
            }
        }
    }

    fn update_amplitude(&mut self, roll: f64) {
        let roll = roll.clamp(-ROLL_LIMIT_DEG, ROLL_LIMIT_DEG);
        let amp = &mut self.amplitude;

        // Near-zero band ends the current swing; reported amplitudes hold
        if roll.abs() < self.amplitude_reset {
            amp.max_roll_port = 0.0;
            amp.max_roll_stbd = 0.0;
            return;
        }

        // A sign flip is a zero crossing even when no sample fell in the band
        if roll < 0.0 {
            amp.max_roll_stbd = 0.0;
            amp.max_roll_port = roll.min(amp.max_roll_port);
            amp.roll_amp_port = amp.max_roll_port.abs().min(ROLL_LIMIT_DEG);
        } else {
            amp.max_roll_port = 0.0;
            amp.max_roll_stbd = roll.max(amp.max_roll_stbd);
            amp.roll_amp_stbd = amp.max_roll_stbd.abs().min(ROLL_LIMIT_DEG);
        }
    }

    /// Seconds, 0.0 when no recent oscillation
    pub fn period(&self) -> f64 {
        self.period
    }

    pub fn amplitude(&self) -> &RollAmplitude {
        &self.amplitude
    }

    pub fn peaks(&self) -> &PeakBuffer {
        &self.peaks
    }
}
