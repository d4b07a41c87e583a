use anyhow::{Context, Result, anyhow};
use clap::Parser;
use log::{error, info};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use dreamcue::config::EngineConfig;
use dreamcue::engine::Engine;
use dreamcue::recorder::{CommandRecorder, TimedRecorder};
use dreamcue::samplelog::SampleLog;
use dreamcue::sampler::Sampler;
use dreamcue::session::{self, SessionEnd};
use dreamcue::source::{LineSource, ReplaySource, SyntheticSource};
use dreamcue::status::SessionStatus;
use dreamcue::traits::Recorder;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Sensor device or FIFO printing one reading per line
    #[arg(short, long)]
    device: Option<PathBuf>,

    /// Replay a recorded session log instead of sampling live
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Run against generated readings, no hardware needed
    #[arg(long, default_value_t = false)]
    synthetic: bool,

    /// JSON config file overriding the built-in tuning
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory the session sample log is written into
    #[arg(long, default_value = "LOGS")]
    log_dir: PathBuf,

    /// External command run once per recording cycle (gets the cycle index)
    #[arg(long)]
    record_cmd: Option<String>,

    /// Override the number of recording cycles
    #[arg(long)]
    max_cycles: Option<u32>,
}

fn main() -> Result<()> {
    env_logger::builder()
        .format_timestamp(None)
        .filter_level(log::LevelFilter::Info)
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if let Some(max) = args.max_cycles {
        config.cycles.max = max;
    }

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    ctrlc::set_handler(move || {
        info!("Ctrl+C received. Shutting down...");
        r.store(false, Ordering::SeqCst);
    })?;

    std::fs::create_dir_all(&args.log_dir)
        .with_context(|| format!("creating log directory {}", args.log_dir.display()))?;

    let status = Arc::new(RwLock::new(SessionStatus::default()));

    match args.record_cmd.clone() {
        Some(cmd) => run_session(&args, config, CommandRecorder::new(cmd), status, &running),
        None => run_session(&args, config, TimedRecorder::default(), status, &running),
    }
}

fn run_session<R: Recorder>(
    args: &Args,
    config: EngineConfig,
    recorder: R,
    status: Arc<RwLock<SessionStatus>>,
    running: &AtomicBool,
) -> Result<()> {
    let mut engine = Engine::new(recorder, status, config);

    let end = if let Some(path) = &args.replay {
        let source = ReplaySource::from_path(path)?;
        session::run_replay(&mut engine, source, running)
    } else if let Some(path) = &args.device {
        info!("Sampling from {}", path.display());
        let source = LineSource::open(path)?;
        let sampler = Sampler::spawn(source, Duration::from_millis(5))?;
        let end = session::run_live(&mut engine, &sampler.feed(), running);
        sampler.stop();
        end
    } else if args.synthetic {
        info!("Sampling synthetic readings");
        let sampler = Sampler::spawn(SyntheticSource::default(), Duration::from_millis(5))?;
        let end = session::run_live(&mut engine, &sampler.feed(), running);
        sampler.stop();
        end
    } else {
        return Err(anyhow!(
            "no sample source: pass --device, --replay or --synthetic"
        ));
    };

    // The record is written however the loop ended, aborts included
    let log_path = SampleLog::session_path(&args.log_dir);
    engine
        .log()
        .flush_to(&log_path)
        .with_context(|| format!("writing session log {}", log_path.display()))?;
    info!(
        "[Session] {} entries written to {}",
        engine.log().len(),
        log_path.display()
    );

    match end {
        Ok(SessionEnd::Finished) => {
            info!("Session complete: all recording cycles done.");
            Ok(())
        }
        Ok(SessionEnd::SourceDrained) => {
            info!("Sample source drained. Exiting.");
            Ok(())
        }
        Ok(SessionEnd::OperatorStop) => {
            info!("Exiting.");
            Ok(())
        }
        Err(e) => {
            error!("Session aborted: {}", e);
            Err(e.into())
        }
    }
}
