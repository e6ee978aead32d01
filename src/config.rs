// config.rs — Tunables and constants for a monitoring session
//
// Everything here is fixed for the lifetime of a session. The two knobs a
// user normally touches are `alpha` and `gyro_threshold`; the rest are the
// gates of the roll analyzer and the controller's polling policy.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{MonitorError, Result};

// ─── Presets ─────────────────────────────────────────────────────────────────

/// Named smoothing presets, from calm-harbour stability to drone-like response.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum FilterProfile {
    /// Harbour / bench testing
    UltraStable,
    /// Ship at sea
    VeryStable,
    /// General purpose
    Balanced,
    /// Manoeuvring
    Fast,
    /// Small craft, drones
    VeryFast,
}

impl FilterProfile {
    /// (alpha, gyro_threshold in deg/s)
    pub fn parameters(self) -> (f64, f64) {
        match self {
            FilterProfile::UltraStable => (0.01, 0.4),
            FilterProfile::VeryStable => (0.03, 0.25),
            FilterProfile::Balanced => (0.08, 0.15),
            FilterProfile::Fast => (0.15, 0.1),
            FilterProfile::VeryFast => (0.20, 0.05),
        }
    }
}

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    // ── Signal conditioning ──
    pub alpha: f64,
    pub gyro_threshold: f64,

    // ── Roll period ──
    pub peak_min_amplitude: f64,
    pub peak_min_interval_secs: f64,
    pub period_min_secs: f64,
    pub period_max_secs: f64,
    pub period_max_age_secs: f64,

    // ── Roll amplitude ──
    pub amplitude_reset_deg: f64,

    // ── Motion dynamics ──
    pub stillness_epsilon: f64,

    // ── Controller polling ──
    pub drain_limit: usize,
    pub idle_sleep_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            alpha: 0.15,
            gyro_threshold: 0.25,
            peak_min_amplitude: 0.5,
            peak_min_interval_secs: 0.1,
            period_min_secs: 0.1,
            period_max_secs: 60.0,
            period_max_age_secs: 5.0,
            amplitude_reset_deg: 1.0,
            stillness_epsilon: 0.05,
            drain_limit: 10,
            idle_sleep_ms: 1,
        }
    }
}

impl MonitorConfig {
    pub fn from_profile(profile: FilterProfile) -> Self {
        Self::default().with_profile(profile)
    }

    pub fn with_profile(mut self, profile: FilterProfile) -> Self {
        let (alpha, threshold) = profile.parameters();
        self.alpha = alpha;
        self.gyro_threshold = threshold;
        self
    }

    /// Load a (partial) config from JSON; missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config: MonitorConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.alpha > 0.0 && self.alpha <= 1.0) {
            return Err(MonitorError::InvalidConfig(format!(
                "alpha must be in (0, 1], got {}",
                self.alpha
            )));
        }
        if !(self.gyro_threshold >= 0.0 && self.gyro_threshold.is_finite()) {
            return Err(MonitorError::InvalidConfig(format!(
                "gyro_threshold must be >= 0, got {}",
                self.gyro_threshold
            )));
        }
        if !(self.peak_min_amplitude >= 0.0 && self.amplitude_reset_deg >= 0.0) {
            return Err(MonitorError::InvalidConfig(
                "roll gates must be non-negative".to_string(),
            ));
        }
        if !(self.period_min_secs > 0.0 && self.period_min_secs <= self.period_max_secs) {
            return Err(MonitorError::InvalidConfig(format!(
                "period range [{}, {}] is empty",
                self.period_min_secs, self.period_max_secs
            )));
        }
        if self.drain_limit == 0 {
            return Err(MonitorError::InvalidConfig(
                "drain_limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

// ─── Session start parameter ─────────────────────────────────────────────────

/// Initial heading in degrees, guaranteed to lie in [0, 360].
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct InitialHeading(f64);

impl InitialHeading {
    pub fn new(degrees: f64) -> Result<Self> {
        if degrees.is_finite() && (0.0..=360.0).contains(&degrees) {
            Ok(Self(degrees))
        } else {
            Err(MonitorError::InvalidHeading(format!(
                "{} is outside 0-360 degrees",
                degrees
            )))
        }
    }

    pub fn degrees(self) -> f64 {
        self.0
    }
}

pub fn parse_heading(input: &str) -> Result<InitialHeading> {
    let value: f64 = input
        .trim()
        .parse()
        .map_err(|_| MonitorError::InvalidHeading(format!("'{}' is not a number", input.trim())))?;
    InitialHeading::new(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(MonitorConfig::default().validate().is_ok());
    }

    #[test]
    fn test_profiles_are_valid() {
        for profile in [
            FilterProfile::UltraStable,
            FilterProfile::VeryStable,
            FilterProfile::Balanced,
            FilterProfile::Fast,
            FilterProfile::VeryFast,
        ] {
            let config = MonitorConfig::from_profile(profile);
            assert!(config.validate().is_ok(), "{:?}", profile);
        }
        let sea = MonitorConfig::from_profile(FilterProfile::VeryStable);
        assert_eq!(sea.alpha, 0.03);
        assert_eq!(sea.gyro_threshold, 0.25);
    }

    #[test]
    fn test_rejects_bad_alpha() {
        let mut config = MonitorConfig::default();
        config.alpha = 0.0;
        assert!(matches!(config.validate(), Err(MonitorError::InvalidConfig(_))));
        config.alpha = 1.5;
        assert!(config.validate().is_err());
        config.alpha = 1.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_negative_threshold() {
        let mut config = MonitorConfig::default();
        config.gyro_threshold = -0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: MonitorConfig = serde_json::from_str(r#"{ "alpha": 0.05 }"#).unwrap();
        assert_eq!(config.alpha, 0.05);
        assert_eq!(config.drain_limit, 10);
        assert_eq!(config.amplitude_reset_deg, 1.0);
    }

    #[test]
    fn test_heading_bounds() {
        assert!(InitialHeading::new(0.0).is_ok());
        assert!(InitialHeading::new(360.0).is_ok());
        assert!(InitialHeading::new(-0.1).is_err());
        assert!(InitialHeading::new(360.01).is_err());
        assert!(InitialHeading::new(f64::NAN).is_err());
    }

    #[test]
    fn test_parse_heading() {
        assert_eq!(parse_heading(" 90 \n").unwrap().degrees(), 90.0);
        assert!(matches!(parse_heading("north"), Err(MonitorError::InvalidHeading(_))));
        assert!(parse_heading("400").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = std::env::temp_dir();
        let good = dir.join(format!("roll_monitor_config_{}.json", std::process::id()));
        fs::write(&good, r#"{ "alpha": 0.3, "drain_limit": 4 }"#).unwrap();
        let config = MonitorConfig::load(&good).unwrap();
        assert_eq!(config.alpha, 0.3);
        assert_eq!(config.drain_limit, 4);
        assert_eq!(config.gyro_threshold, 0.25);

        let bad = dir.join(format!("roll_monitor_config_bad_{}.json", std::process::id()));
        fs::write(&bad, r#"{ "alpha": 1.5 }"#).unwrap();
        assert!(matches!(MonitorConfig::load(&bad), Err(MonitorError::InvalidConfig(_))));

        let _ = fs::remove_file(&good);
        let _ = fs::remove_file(&bad);
    }
}
