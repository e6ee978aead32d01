// sensors.rs — The sensor-source boundary
//
// The engine only ever sees `RawSample`s in deg/s and g. Anything that
// produces them implements `SensorSource`; unit conversion (the device streams
// acceleration in milli-g) happens here and nowhere else.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::f64::consts::PI;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

use crate::error::{MonitorError, SensorError};
use crate::types::RawSample;

pub const MILLI_G_PER_G: f64 = 1000.0;

pub trait SensorSource {
    /// Next decoded sample, or `None` when nothing new is available yet.
    fn next_sample(&mut self) -> Result<Option<RawSample>, SensorError>;

    /// Start streaming samples.
    fn enter_sampling_mode(&mut self) -> Result<(), SensorError>;

    /// Return the device to its idle/configuration state. Must not block indefinitely.
    fn enter_idle_mode(&mut self) -> Result<(), SensorError>;
}

impl<S: SensorSource + ?Sized> SensorSource for Box<S> {
    fn next_sample(&mut self) -> Result<Option<RawSample>, SensorError> {
        (**self).next_sample()
    }

    fn enter_sampling_mode(&mut self) -> Result<(), SensorError> {
        (**self).enter_sampling_mode()
    }

    fn enter_idle_mode(&mut self) -> Result<(), SensorError> {
        (**self).enter_idle_mode()
    }
}

// ─── Simulated vessel ────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct VesselMotion {
    pub rate_hz: f64,
    pub roll_amplitude_deg: f64,
    pub roll_period_secs: f64,
    pub pitch_amplitude_deg: f64,
    pub pitch_period_secs: f64,
    /// Constant turn rate, deg/s
    pub yaw_rate: f64,
    /// Peak of the added sensor noise, g
    pub accel_noise: f64,
    pub temperature: f64,
}

impl Default for VesselMotion {
    fn default() -> Self {
        Self {
            rate_hz: 100.0,
            roll_amplitude_deg: 5.0,
            roll_period_secs: 4.0,
            pitch_amplitude_deg: 1.5,
            pitch_period_secs: 6.5,
            yaw_rate: 0.0,
            accel_noise: 0.002,
            temperature: 24.5,
        }
    }
}

/// Synthetic rolling vessel. Accelerations are gravity-consistent so the
/// tilt estimator recovers the commanded roll and pitch.
pub struct SimulatedVessel {
    motion: VesselMotion,
    paced: bool,
    sampling: bool,
    epoch: Instant,
    index: u64,
}

impl SimulatedVessel {
    /// Samples become available in real time at `motion.rate_hz`.
    pub fn paced(motion: VesselMotion) -> Self {
        Self { motion, paced: true, sampling: false, epoch: Instant::now(), index: 0 }
    }

    /// Every call yields the next sample immediately (virtual time).
    pub fn unpaced(motion: VesselMotion) -> Self {
        Self { motion, paced: false, sampling: false, epoch: Instant::now(), index: 0 }
    }

    fn sample_at(&self, t: f64) -> RawSample {
        let m = &self.motion;
        let w_roll = 2.0 * PI / m.roll_period_secs;
        let w_pitch = 2.0 * PI / m.pitch_period_secs;

        let phi = m.roll_amplitude_deg.to_radians() * (w_roll * t).sin();
        let theta = m.pitch_amplitude_deg.to_radians() * (w_pitch * t).sin();
        let roll_rate = m.roll_amplitude_deg * w_roll * (w_roll * t).cos();
        let pitch_rate = m.pitch_amplitude_deg * w_pitch * (w_pitch * t).cos();

        // Deterministic jitter standing in for sensor noise
        let noise = |k: f64| m.accel_noise * (t * 97.0 * k).sin() * (t * 13.0 + k).cos();

        RawSample {
            timestamp: t,
            temperature: m.temperature + 0.1 * (t / 60.0).sin(),
            gyro: (roll_rate, pitch_rate, m.yaw_rate),
            accel: (
                -theta.sin() + noise(1.0),
                -theta.cos() * phi.sin() + noise(2.0),
                -theta.cos() * phi.cos() + noise(3.0),
            ),
        }
    }
}

impl SensorSource for SimulatedVessel {
    fn next_sample(&mut self) -> Result<Option<RawSample>, SensorError> {
        if !self.sampling {
            return Ok(None);
        }
        let t = self.index as f64 / self.motion.rate_hz;
        if self.paced && self.epoch.elapsed().as_secs_f64() < t {
            return Ok(None);
        }
        self.index += 1;
        Ok(Some(self.sample_at(t)))
    }

    fn enter_sampling_mode(&mut self) -> Result<(), SensorError> {
        self.sampling = true;
        self.epoch = Instant::now();
        self.index = 0;
        Ok(())
    }

    fn enter_idle_mode(&mut self) -> Result<(), SensorError> {
        self.sampling = false;
        Ok(())
    }
}

// ─── Burst record stream ─────────────────────────────────────────────────────

/// Decoded burst records, one per line: `tempc gx gy gz ax ay az`, optionally
/// prefixed by a timestamp column. Acceleration arrives in milli-g.
/// Whitespace or commas separate fields; `#` starts a comment.
///
/// Lines are read on a dedicated thread so a quiet pipe never blocks the
/// caller; `next_sample` only polls what has arrived.
pub struct BurstStream {
    lines: mpsc::Receiver<io::Result<String>>,
    clock: Instant,
    line_no: usize,
}

const LINE_QUEUE: usize = 1024;

impl BurstStream {
    pub fn new<R>(reader: R) -> Result<Self, SensorError>
    where
        R: BufRead + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(LINE_QUEUE);
        thread::Builder::new()
            .name("burst-reader".to_string())
            .spawn(move || {
                for line in reader.lines() {
                    let failed = line.is_err();
                    if tx.blocking_send(line).is_err() || failed {
                        break;
                    }
                }
            })?;
        Ok(Self { lines: rx, clock: Instant::now(), line_no: 0 })
    }

    pub fn open(path: &Path) -> Result<Self, SensorError> {
        Self::new(BufReader::new(File::open(path)?))
    }
}

impl SensorSource for BurstStream {
    fn next_sample(&mut self) -> Result<Option<RawSample>, SensorError> {
        loop {
            let line = match self.lines.try_recv() {
                Ok(line) => line?,
                Err(TryRecvError::Empty) => return Ok(None),
                Err(TryRecvError::Disconnected) => return Err(SensorError::EndOfStream),
            };
            self.line_no += 1;

            let record = line.split('#').next().unwrap_or("").trim();
            if record.is_empty() {
                continue;
            }
            let stamp = self.clock.elapsed().as_secs_f64();
            return parse_burst_record(record, stamp, self.line_no).map(Some);
        }
    }

    fn enter_sampling_mode(&mut self) -> Result<(), SensorError> {
        self.clock = Instant::now();
        Ok(())
    }

    fn enter_idle_mode(&mut self) -> Result<(), SensorError> {
        Ok(())
    }
}

/// Parse one burst record. `fallback_timestamp` is used when the record has
/// no leading timestamp column.
pub fn parse_burst_record(
    record: &str,
    fallback_timestamp: f64,
    line: usize,
) -> Result<RawSample, SensorError> {
    let fields = record
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|f| !f.is_empty())
        .map(|f| {
            f.parse::<f64>().map_err(|_| SensorError::Malformed {
                line,
                reason: format!("'{}' is not a number", f),
            })
        })
        .collect::<Result<Vec<f64>, _>>()?;

    let (timestamp, v) = match fields.len() {
        7 => (fallback_timestamp, &fields[..]),
        8 => (fields[0], &fields[1..]),
        n => {
            return Err(SensorError::Malformed {
                line,
                reason: format!("expected 7 or 8 fields, got {}", n),
            })
        }
    };

    Ok(RawSample {
        timestamp,
        temperature: v[0],
        gyro: (v[1], v[2], v[3]),
        accel: (v[4] / MILLI_G_PER_G, v[5] / MILLI_G_PER_G, v[6] / MILLI_G_PER_G),
    })
}

// ─── Session logs ────────────────────────────────────────────────────────────

/// Recorded raw samples of one session.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SessionLog {
    pub started_at: String,
    pub samples: Vec<RawSample>,
}

impl SessionLog {
    /// Load a `.json` or `.json.gz` session log.
    pub fn load(path: &Path) -> Result<Self, MonitorError> {
        let file = File::open(path)?;
        if is_gzip(path) {
            Ok(serde_json::from_reader(BufReader::new(GzDecoder::new(file)))?)
        } else {
            Ok(serde_json::from_reader(BufReader::new(file))?)
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), MonitorError> {
        let file = File::create(path)?;
        if is_gzip(path) {
            let mut gz = GzEncoder::new(BufWriter::new(file), Compression::default());
            serde_json::to_writer(&mut gz, self)?;
            gz.finish()?.flush()?;
        } else {
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, self)?;
            writer.flush()?;
        }
        Ok(())
    }
}

fn is_gzip(path: &Path) -> bool {
    path.extension().map(|e| e == "gz").unwrap_or(false)
}

/// Plays back recorded samples, then reports end of stream.
pub struct ReplaySource {
    samples: VecDeque<RawSample>,
}

impl ReplaySource {
    pub fn new(samples: impl IntoIterator<Item = RawSample>) -> Self {
        Self { samples: samples.into_iter().collect() }
    }

    pub fn remaining(&self) -> usize {
        self.samples.len()
    }
}

impl SensorSource for ReplaySource {
    fn next_sample(&mut self) -> Result<Option<RawSample>, SensorError> {
        self.samples.pop_front().map(Some).ok_or(SensorError::EndOfStream)
    }

    fn enter_sampling_mode(&mut self) -> Result<(), SensorError> {
        Ok(())
    }

    fn enter_idle_mode(&mut self) -> Result<(), SensorError> {
        Ok(())
    }
}

/// Wraps a source and keeps every delivered sample; the log is written when
/// the source is put back into idle mode.
pub struct RecordingSource<S> {
    inner: S,
    log: SessionLog,
    path: PathBuf,
}

impl<S: SensorSource> RecordingSource<S> {
    pub fn new(inner: S, path: PathBuf) -> Self {
        let log = SessionLog {
            started_at: chrono::Utc::now().to_rfc3339(),
            samples: Vec::new(),
        };
        Self { inner, log, path }
    }

    pub fn recorded(&self) -> &[RawSample] {
        &self.log.samples
    }
}

impl<S: SensorSource> SensorSource for RecordingSource<S> {
    fn next_sample(&mut self) -> Result<Option<RawSample>, SensorError> {
        let sample = self.inner.next_sample()?;
        if let Some(ref s) = sample {
            self.log.samples.push(s.clone());
        }
        Ok(sample)
    }

    fn enter_sampling_mode(&mut self) -> Result<(), SensorError> {
        self.inner.enter_sampling_mode()
    }

    fn enter_idle_mode(&mut self) -> Result<(), SensorError> {
        let idle = self.inner.enter_idle_mode();
        match self.log.save(&self.path) {
            Ok(()) => log::info!(
                "Saved {} samples to {}",
                self.log.samples.len(),
                self.path.display()
            ),
            Err(e) => log::error!("Failed to save session log {}: {}", self.path.display(), e),
        }
        idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attitude::tilt_from_gravity;
    use approx::assert_abs_diff_eq;
    use std::io::{Cursor, Read};
    use std::time::Duration;

    /// Poll until the reader thread has delivered something other than "nothing yet".
    fn wait_for_record(stream: &mut BurstStream) -> Result<Option<RawSample>, SensorError> {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            match stream.next_sample() {
                Ok(None) if Instant::now() < deadline => thread::sleep(Duration::from_millis(1)),
                other => return other,
            }
        }
    }

    #[test]
    fn test_burst_record_converts_milli_g() {
        let s = parse_burst_record("25.5 0.1 -0.2 0.3 12.0 -34.0 -998.0", 7.0, 1).unwrap();
        assert_eq!(s.timestamp, 7.0);
        assert_eq!(s.temperature, 25.5);
        assert_eq!(s.gyro, (0.1, -0.2, 0.3));
        assert_abs_diff_eq!(s.accel.0, 0.012, epsilon = 1e-12);
        assert_abs_diff_eq!(s.accel.1, -0.034, epsilon = 1e-12);
        assert_abs_diff_eq!(s.accel.2, -0.998, epsilon = 1e-12);
    }

    #[test]
    fn test_burst_record_with_timestamp_and_commas() {
        let s = parse_burst_record("1.25, 25.0, 0, 0, 1.5, 0, 0, -1000", 99.0, 1).unwrap();
        assert_eq!(s.timestamp, 1.25);
        assert_eq!(s.gyro.2, 1.5);
        assert_eq!(s.accel, (0.0, 0.0, -1.0));
    }

    #[test]
    fn test_burst_record_rejects_garbage() {
        assert!(matches!(
            parse_burst_record("1 2 3", 0.0, 4),
            Err(SensorError::Malformed { line: 4, .. })
        ));
        assert!(matches!(
            parse_burst_record("25 a 0 0 0 0 -1000", 0.0, 9),
            Err(SensorError::Malformed { line: 9, .. })
        ));
    }

    #[test]
    fn test_burst_stream_skips_comments_and_ends() {
        let text = "# tempc gx gy gz ax ay az\n\n0.0 25 0 0 0 0 0 -1000\n0.01 25 0 0 0 0 0 -1000 # ok\n";
        let mut stream = BurstStream::new(Cursor::new(text)).unwrap();
        stream.enter_sampling_mode().unwrap();
        assert_eq!(wait_for_record(&mut stream).unwrap().unwrap().timestamp, 0.0);
        assert_eq!(wait_for_record(&mut stream).unwrap().unwrap().timestamp, 0.01);
        assert!(matches!(wait_for_record(&mut stream), Err(SensorError::EndOfStream)));
    }

    /// Never yields a byte.
    struct SilentPipe;

    impl Read for SilentPipe {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            thread::sleep(Duration::from_secs(3600));
            Ok(0)
        }
    }

    #[test]
    fn test_quiet_stream_does_not_block() {
        let mut stream = BurstStream::new(BufReader::new(SilentPipe)).unwrap();
        stream.enter_sampling_mode().unwrap();
        let started = Instant::now();
        for _ in 0..10 {
            assert!(stream.next_sample().unwrap().is_none());
        }
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_burst_stream_reports_malformed_line() {
        let mut stream = BurstStream::new(Cursor::new("25 0 0 0 0 0 -1000\nbogus\n")).unwrap();
        assert!(wait_for_record(&mut stream).unwrap().is_some());
        assert!(matches!(
            wait_for_record(&mut stream),
            Err(SensorError::Malformed { line: 2, .. })
        ));
    }

    #[test]
    fn test_simulated_vessel_is_gravity_consistent() {
        let motion = VesselMotion { accel_noise: 0.0, ..VesselMotion::default() };
        let mut vessel = SimulatedVessel::unpaced(motion.clone());
        assert!(vessel.next_sample().unwrap().is_none());
        vessel.enter_sampling_mode().unwrap();

        // Peak starboard roll at a quarter period
        let quarter = (motion.rate_hz * motion.roll_period_secs / 4.0) as usize;
        let mut sample = None;
        for _ in 0..=quarter {
            sample = vessel.next_sample().unwrap();
        }
        let s = sample.unwrap();
        assert_abs_diff_eq!(s.timestamp, 1.0, epsilon = 1e-9);
        let (roll, _) = tilt_from_gravity(s.accel);
        assert_abs_diff_eq!(roll, motion.roll_amplitude_deg, epsilon = 1e-6);

        vessel.enter_idle_mode().unwrap();
        assert!(vessel.next_sample().unwrap().is_none());
    }

    #[test]
    fn test_paced_vessel_waits_for_clock() {
        let motion = VesselMotion { rate_hz: 1.0, ..VesselMotion::default() };
        let mut vessel = SimulatedVessel::paced(motion);
        vessel.enter_sampling_mode().unwrap();
        // t = 0 is due immediately, t = 1 s is not
        assert!(vessel.next_sample().unwrap().is_some());
        assert!(vessel.next_sample().unwrap().is_none());
    }

    #[test]
    fn test_replay_source_drains_then_ends() {
        let samples = (0..3).map(|i| RawSample {
            timestamp: i as f64,
            temperature: 20.0,
            gyro: (0.0, 0.0, 0.0),
            accel: (0.0, 0.0, -1.0),
        });
        let mut replay = ReplaySource::new(samples);
        assert_eq!(replay.remaining(), 3);
        for _ in 0..3 {
            assert!(replay.next_sample().unwrap().is_some());
        }
        assert!(matches!(replay.next_sample(), Err(SensorError::EndOfStream)));
    }

    #[test]
    fn test_session_log_round_trip_gz() {
        let path = std::env::temp_dir().join(format!("roll_monitor_log_{}.json.gz", std::process::id()));
        let vessel = SimulatedVessel::unpaced(VesselMotion::default());
        let mut recorder = RecordingSource::new(vessel, path.clone());
        recorder.enter_sampling_mode().unwrap();
        for _ in 0..50 {
            recorder.next_sample().unwrap();
        }
        assert_eq!(recorder.recorded().len(), 50);
        recorder.enter_idle_mode().unwrap();

        let log = SessionLog::load(&path).unwrap();
        assert_eq!(log.samples.len(), 50);
        let (saved, kept) = (&log.samples[49], &recorder.recorded()[49]);
        assert_abs_diff_eq!(saved.timestamp, kept.timestamp, epsilon = 1e-12);
        assert_abs_diff_eq!(saved.accel.1, kept.accel.1, epsilon = 1e-12);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_session_log_load_errors() {
        let missing = std::env::temp_dir().join("roll_monitor_no_such_log.json");
        assert!(matches!(SessionLog::load(&missing), Err(MonitorError::Io(_))));

        let path = std::env::temp_dir().join(format!("roll_monitor_bad_log_{}.json", std::process::id()));
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(SessionLog::load(&path), Err(MonitorError::Serde(_))));
        let _ = std::fs::remove_file(&path);
    }
}
