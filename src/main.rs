use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, ValueEnum};
use std::io::{self, BufReader, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use roll_monitor_rs::live_status::LiveStatusWriter;
use roll_monitor_rs::report::{ConsoleDisplay, FrameRecorder};
use roll_monitor_rs::sensors::{BurstStream, RecordingSource, SimulatedVessel, VesselMotion};
use roll_monitor_rs::{
    parse_heading, FilterProfile, FrameSink, InitialHeading, MonitorConfig, SensorSource,
    SessionController,
};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SourceKind {
    /// Synthetic rolling vessel
    Sim,
    /// Burst records from a file (--input)
    Stream,
    /// Burst records piped on stdin
    Stdin,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "roll_monitor")]
#[command(about = "Real-time vessel roll monitor - heading, heel, roll period and accelerations", long_about = None)]
struct Args {
    /// Duration in seconds (0 = continuous)
    #[arg(value_name = "SECONDS", default_value = "0")]
    duration: u64,

    /// Initial heading in degrees (0-360); prompted for when absent
    #[arg(long)]
    heading: Option<String>,

    /// Smoothing preset
    #[arg(long, value_enum)]
    profile: Option<FilterProfile>,

    /// EMA smoothing factor (0, 1], overrides the profile
    #[arg(long)]
    alpha: Option<f64>,

    /// Gyro deadband in deg/s, overrides the profile
    #[arg(long)]
    gyro_threshold: Option<f64>,

    /// JSON config file; missing fields take defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Sample source
    #[arg(long, value_enum, default_value = "sim")]
    source: SourceKind,

    /// Burst record file for --source stream
    #[arg(long)]
    input: Option<PathBuf>,

    /// Simulated roll period (seconds)
    #[arg(long, default_value = "4.0")]
    sim_roll_period: f64,

    /// Simulated roll amplitude (degrees)
    #[arg(long, default_value = "5.0")]
    sim_roll_amplitude: f64,

    /// Output directory
    #[arg(long, default_value = "roll_monitor_sessions")]
    output_dir: String,

    /// Record raw samples to a gzipped session log for replay
    #[arg(long)]
    record: bool,

    /// Write every frame to a JSON lines file
    #[arg(long)]
    frames: bool,

    /// Refresh the console line every N frames
    #[arg(long, default_value = "1")]
    display_every: u64,

    /// Do not write live_status.json
    #[arg(long)]
    no_status: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = resolve_config(&args)?;
    let heading = resolve_heading(&args)?;

    println!("[{}] Roll Monitor Starting", ts_now());
    println!("  Duration: {} seconds (0=continuous)", args.duration);
    println!("  Source: {:?}", args.source);
    println!("  Initial Heading: {:.1}°", heading.degrees());
    println!("  Alpha: {}  Gyro Threshold: {} deg/s", config.alpha, config.gyro_threshold);
    println!("  Output Dir: {}", args.output_dir);

    std::fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("creating output directory {}", args.output_dir))?;

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                println!("\n[{}] Interrupt received, stopping...", ts_now());
                stop.store(true, Ordering::Relaxed);
            }
            // A second interrupt skips the clean shutdown
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("[{}] Second interrupt, exiting", ts_now());
                std::process::exit(130);
            }
        });
    }

    let max_duration = (args.duration > 0).then(|| Duration::from_secs(args.duration));
    let sinks = build_sinks(&args)?;

    println!("[{}] Starting data collection...", ts_now());

    let worker_args = args.clone();
    let summary = tokio::task::spawn_blocking(move || -> Result<_> {
        let mut source = open_source(&worker_args)?;
        let mut sinks = sinks;
        let mut controller = SessionController::new(config, heading)?;
        Ok(controller.run(&mut source, &mut sinks, &stop, max_duration)?)
    })
    .await??;

    println!(
        "[{}] Session finished ({:?}): {} frames from {} samples",
        ts_now(),
        summary.stop_reason,
        summary.frames_emitted,
        summary.samples_received
    );
    Ok(())
}

fn resolve_config(args: &Args) -> Result<MonitorConfig> {
    let mut config = match &args.config {
        Some(path) => MonitorConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => MonitorConfig::default(),
    };
    if let Some(profile) = args.profile {
        config = config.with_profile(profile);
    }
    if let Some(alpha) = args.alpha {
        config.alpha = alpha;
    }
    if let Some(threshold) = args.gyro_threshold {
        config.gyro_threshold = threshold;
    }
    config.validate()?;
    Ok(config)
}

/// Use --heading when valid, otherwise ask on stdin until a valid value arrives.
fn resolve_heading(args: &Args) -> Result<InitialHeading> {
    if let Some(text) = &args.heading {
        match parse_heading(text) {
            Ok(heading) => return Ok(heading),
            Err(e) => eprintln!("{}", e),
        }
    }
    if matches!(args.source, SourceKind::Stdin) {
        bail!("--heading is required when samples arrive on stdin");
    }

    let stdin = io::stdin();
    loop {
        print!("Enter initial heading (0-360°): ");
        io::stdout().flush()?;
        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            bail!("no initial heading given");
        }
        match parse_heading(&line) {
            Ok(heading) => return Ok(heading),
            Err(e) => println!("{}", e),
        }
    }
}

fn open_source(args: &Args) -> Result<Box<dyn SensorSource>> {
    let source: Box<dyn SensorSource> = match args.source {
        SourceKind::Sim => Box::new(SimulatedVessel::paced(VesselMotion {
            roll_period_secs: args.sim_roll_period,
            roll_amplitude_deg: args.sim_roll_amplitude,
            ..VesselMotion::default()
        })),
        SourceKind::Stream => {
            let Some(path) = &args.input else {
                bail!("--source stream needs --input <FILE>");
            };
            Box::new(
                BurstStream::open(path)
                    .with_context(|| format!("opening {}", path.display()))?,
            )
        }
        SourceKind::Stdin => Box::new(BurstStream::new(BufReader::new(io::stdin()))?),
    };

    if args.record {
        let path = PathBuf::from(&args.output_dir).join(format!("session_{}.json.gz", ts_now_clean()));
        println!("[{}] Recording raw samples to {}", ts_now(), path.display());
        return Ok(Box::new(RecordingSource::new(source, path)));
    }
    Ok(source)
}

fn build_sinks(args: &Args) -> Result<Vec<Box<dyn FrameSink + Send>>> {
    let mut sinks: Vec<Box<dyn FrameSink + Send>> = vec![Box::new(ConsoleDisplay::stdout(args.display_every))];

    if args.frames {
        let path = PathBuf::from(&args.output_dir).join(format!("frames_{}.jsonl", ts_now_clean()));
        sinks.push(Box::new(
            FrameRecorder::create(&path).with_context(|| format!("creating {}", path.display()))?,
        ));
    }
    if !args.no_status {
        let path = PathBuf::from(&args.output_dir).join("live_status.json");
        sinks.push(Box::new(LiveStatusWriter::new(path, Duration::from_secs(2))));
    }
    Ok(sinks)
}

fn ts_now() -> String {
    Utc::now().format("%H:%M:%S").to_string()
}

fn ts_now_clean() -> String {
    Utc::now().format("%Y%m%d_%H%M%S").to_string()
}
