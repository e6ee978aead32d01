use std::fs::File;
use std::io::{self, BufWriter, Stdout, Write};
use std::path::Path;

use serde::Serialize;

use crate::error::{MonitorError, Result};
use crate::types::{ImuFrame, SessionSummary};

/// Receives every output frame and the final session summary.
pub trait FrameSink {
    fn on_frame(&mut self, frame: &ImuFrame) -> Result<()>;

    fn on_summary(&mut self, _summary: &SessionSummary) -> Result<()> {
        Ok(())
    }
}

impl<S: FrameSink + ?Sized> FrameSink for Box<S> {
    fn on_frame(&mut self, frame: &ImuFrame) -> Result<()> {
        (**self).on_frame(frame)
    }

    fn on_summary(&mut self, summary: &SessionSummary) -> Result<()> {
        (**self).on_summary(summary)
    }
}

/// Collects frames in memory. Handy for replay and tests.
#[derive(Default)]
pub struct FrameCollector {
    pub frames: Vec<ImuFrame>,
    pub summary: Option<SessionSummary>,
}

impl FrameSink for FrameCollector {
    fn on_frame(&mut self, frame: &ImuFrame) -> Result<()> {
        self.frames.push(frame.clone());
        Ok(())
    }

    fn on_summary(&mut self, summary: &SessionSummary) -> Result<()> {
        self.summary = Some(summary.clone());
        Ok(())
    }
}

// ─── Console ─────────────────────────────────────────────────────────────────

/// Single rewriting status line on stdout.
pub struct ConsoleDisplay<W: Write = Stdout> {
    out: W,
    every: u64,
    count: u64,
}

impl ConsoleDisplay<Stdout> {
    pub fn stdout(every: u64) -> Self {
        Self::new(io::stdout(), every)
    }
}

impl<W: Write> ConsoleDisplay<W> {
    pub fn new(out: W, every: u64) -> Self {
        Self { out, every: every.max(1), count: 0 }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

pub fn format_frame(frame: &ImuFrame) -> String {
    format!(
        "[BUF {:2}] Heading: {:6.2}° | Heel: {:6.2}° | Pitch: {:6.2}° | Roll Period: {:4.1}s | \
         Roll Amp P/S: {:5.2}°/{:5.2}° | Surge: {:5.2} | Sway: {:5.2} | Heave: {:5.2} | Temp: {:5.1}°C",
        frame.backlog,
        frame.heading,
        frame.roll,
        frame.pitch,
        frame.roll_period,
        frame.roll_amp_port,
        frame.roll_amp_stbd,
        frame.surge,
        frame.sway,
        frame.heave,
        frame.temperature,
    )
}

impl<W: Write> FrameSink for ConsoleDisplay<W> {
    fn on_frame(&mut self, frame: &ImuFrame) -> Result<()> {
        self.count += 1;
        if self.count % self.every != 0 {
            return Ok(());
        }
        write!(self.out, "\r{}", format_frame(frame))?;
        self.out.flush()?;
        Ok(())
    }

    fn on_summary(&mut self, s: &SessionSummary) -> Result<()> {
        let e = &s.acceleration_extremes;
        writeln!(self.out)?;
        writeln!(self.out, "\nSession Summary:")?;
        writeln!(self.out, "  Duration: {:.1} seconds", s.duration_secs)?;
        writeln!(self.out, "  Samples: {} ({} frames)", s.samples_received, s.frames_emitted)?;
        writeln!(self.out, "  Max Roll Port: {:.2}°", s.roll_amp_port)?;
        writeln!(self.out, "  Max Roll Stbd: {:.2}°", s.roll_amp_stbd)?;
        writeln!(self.out, "  Roll Period: {:.1}s", s.roll_period)?;
        writeln!(self.out, "  Surge fwd/aft: {:.2}/{:.2} g", e.surge.fwd, e.surge.aft)?;
        writeln!(self.out, "  Sway port/stbd: {:.2}/{:.2} g", e.sway.port, e.sway.stbd)?;
        writeln!(self.out, "  Heave up/down: {:.2}/{:.2} g", e.heave.up, e.heave.down)?;
        self.out.flush()?;
        Ok(())
    }
}

// ─── JSON lines ──────────────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Record<'a> {
    Frame(&'a ImuFrame),
    Summary(&'a SessionSummary),
}

/// Writes one JSON object per frame, then the summary.
pub struct FrameRecorder<W: Write> {
    out: W,
}

impl FrameRecorder<BufWriter<File>> {
    pub fn create(path: &Path) -> Result<Self> {
        Ok(Self::new(BufWriter::new(File::create(path)?)))
    }
}

impl<W: Write> FrameRecorder<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    fn write_record(&mut self, record: &Record) -> Result<()> {
        serde_json::to_writer(&mut self.out, record)?;
        self.out.write_all(b"\n")?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> FrameSink for FrameRecorder<W> {
    fn on_frame(&mut self, frame: &ImuFrame) -> Result<()> {
        self.write_record(&Record::Frame(frame))
    }

    fn on_summary(&mut self, summary: &SessionSummary) -> Result<()> {
        self.write_record(&Record::Summary(summary))?;
        self.out
            .flush()
            .map_err(|e| MonitorError::Sink(format!("frame log flush failed: {}", e)))
    }
}
