// Runs the counting pipeline over a directory of still frames.
//
//   headcount <frames_dir> [output_dir]
//
// Frames are read in file-name order. With an output directory, every counted cycle is
// written there as a PNG, rendered according to `display.mode`. The configuration is
// read from the TOML file named by `HEADCOUNT_CONFIG`, if set.

use anyhow::{Context, bail};
use headcount::io::{FrameDisplay, ImageSequenceSource, NeverStop, NullDisplay, PngSequenceWriter};
use headcount::{PipelineConfig, PipelineDriver, TerminationReason};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

const CONFIG_ENV: &str = "HEADCOUNT_CONFIG";

fn load_config() -> anyhow::Result<PipelineConfig> {
    match std::env::var_os(CONFIG_ENV) {
        Some(path) => {
            let path = PathBuf::from(path);
            PipelineConfig::load(&path)
                .with_context(|| format!("loading config from {}", path.display()))
        }
        None => Ok(PipelineConfig::default()),
    }
}

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 || args.len() > 3 {
        bail!("usage: headcount <frames_dir> [output_dir]");
    }
    let frames_dir = Path::new(&args[1]);

    let config = load_config()?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut display: Box<dyn FrameDisplay> = match args.get(2) {
        Some(out) => Box::new(PngSequenceWriter::create(out, config.display.mode)?),
        None => Box::new(NullDisplay),
    };
    let mut source = ImageSequenceSource::new(frames_dir);
    let mut driver = PipelineDriver::new(config)?;

    let summary = driver
        .run(&mut source, display.as_mut(), &mut NeverStop)
        .with_context(|| format!("processing {}", frames_dir.display()))?;

    info!(
        frames = summary.frames_read,
        counted = summary.cycles_counted,
        reason = ?summary.reason,
        "run finished"
    );
    match &summary.last_detection {
        Some(detection) => println!(
            "{} frames, {} counted, last count: {} people",
            summary.frames_read, summary.cycles_counted, detection.humans
        ),
        None => println!(
            "{} frames, fewer than the window size of {}; nothing counted",
            summary.frames_read,
            driver.config().window_size
        ),
    }
    if summary.reason == TerminationReason::CaptureFailed {
        bail!("stopped early: a frame in {} could not be read", frames_dir.display());
    }
    Ok(())
}
