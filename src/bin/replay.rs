use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;

use anyhow::{bail, Context};
use clap::Parser;
use serde_json::json;

use roll_monitor_rs::report::FrameRecorder;
use roll_monitor_rs::sensors::{ReplaySource, SessionLog};
use roll_monitor_rs::{parse_heading, FilterProfile, FrameSink, MonitorConfig, SessionController};

#[derive(Parser, Debug)]
struct Args {
    /// Path to session_*.json[.gz] log
    #[arg(long, conflicts_with = "log_dir")]
    log: Option<PathBuf>,

    /// Directory of session logs to batch replay (processes session_*.json[.gz])
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Initial heading in degrees (0-360)
    #[arg(long, default_value = "0")]
    heading: String,

    /// Smoothing preset
    #[arg(long, value_enum)]
    profile: Option<FilterProfile>,

    /// EMA smoothing factor, overrides the profile
    #[arg(long)]
    alpha: Option<f64>,

    /// Gyro deadband in deg/s, overrides the profile
    #[arg(long)]
    gyro_threshold: Option<f64>,

    /// Write frames as JSON lines next to each log (<log>.frames.jsonl)
    #[arg(long, default_value_t = false)]
    frames: bool,
}

fn replay_config(args: &Args) -> MonitorConfig {
    let mut config = MonitorConfig::default();
    if let Some(profile) = args.profile {
        config = config.with_profile(profile);
    }
    if let Some(alpha) = args.alpha {
        config.alpha = alpha;
    }
    if let Some(threshold) = args.gyro_threshold {
        config.gyro_threshold = threshold;
    }
    // Recorded samples are all processed, none skipped as backlog
    config.drain_limit = 1;
    config
}

fn run_once(path: &Path, args: &Args) -> anyhow::Result<serde_json::Value> {
    let log = SessionLog::load(path).with_context(|| format!("loading {}", path.display()))?;
    let heading = parse_heading(&args.heading)?;
    let mut controller = SessionController::new(replay_config(args), heading)?;

    let mut sinks: Vec<Box<dyn FrameSink + Send>> = Vec::new();
    if args.frames {
        let out = path.with_extension("frames.jsonl");
        sinks.push(Box::new(FrameRecorder::create(&out)?));
    }

    let total = log.samples.len();
    let mut source = ReplaySource::new(log.samples);
    let summary = controller.run(&mut source, &mut sinks, &AtomicBool::new(false), None)?;

    Ok(json!({
        "log": path.display().to_string(),
        "started_at": log.started_at,
        "samples": total,
        "alpha": controller.config().alpha,
        "gyro_threshold": controller.config().gyro_threshold,
        "final_heading": controller.state().attitude.last().heading,
        "summary": summary,
    }))
}

fn is_session_log(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    name.starts_with("session_") && (name.ends_with(".json") || name.ends_with(".json.gz"))
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if let Some(path) = &args.log {
        let result = run_once(path, &args)?;
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    let Some(dir) = &args.log_dir else {
        bail!("either --log or --log-dir is required");
    };

    let mut logs: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| is_session_log(p))
        .collect();
    logs.sort();

    let mut results = Vec::new();
    for path in &logs {
        match run_once(path, &args) {
            Ok(result) => results.push(result),
            Err(e) => {
                log::warn!("Skipping {}: {:#}", path.display(), e);
                results.push(json!({ "log": path.display().to_string(), "error": e.to_string() }));
            }
        }
    }
    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}
