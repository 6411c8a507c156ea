// Live front end for the counting pipeline: OpenCV capture in, HighGUI window out.
//
//   visual_tester [video_file]
//
// Without an argument the default camera (device 0) is opened. Press `q` in the window
// to stop. The configuration is read from the TOML file named by `HEADCOUNT_CONFIG`.

use anyhow::Context;
use headcount::annotate::{self, DisplayMode};
use headcount::io::{CycleView, FrameDisplay, StopSignal, VideoSource};
use headcount::{PipelineConfig, PipelineDriver, PipelineError};
use image::{DynamicImage, RgbImage};
use opencv::{
    core::{self, Mat, Scalar},
    highgui, imgproc,
    prelude::*,
    videoio::{self, VideoCapture},
};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const WINDOW_NAME: &str = "Video input";
const CONFIG_ENV: &str = "HEADCOUNT_CONFIG";

fn cv_error(err: opencv::Error) -> PipelineError {
    PipelineError::Io(std::io::Error::other(err.to_string()))
}

enum CaptureTarget {
    Device(i32),
    File(String),
}

/// Frames from an OpenCV capture device or video file, converted to RGB.
struct CameraSource {
    target: CaptureTarget,
    capture: Option<VideoCapture>,
    bgr: Mat,
    rgb: Mat,
}

impl CameraSource {
    fn new(target: CaptureTarget) -> Self {
        Self {
            target,
            capture: None,
            bgr: Mat::default(),
            rgb: Mat::default(),
        }
    }

    fn describe(&self) -> String {
        match &self.target {
            CaptureTarget::Device(index) => format!("camera {index}"),
            CaptureTarget::File(path) => path.clone(),
        }
    }
}

impl VideoSource for CameraSource {
    fn open(&mut self) -> Result<(), PipelineError> {
        let capture = match &self.target {
            CaptureTarget::Device(index) => VideoCapture::new(*index, videoio::CAP_ANY),
            CaptureTarget::File(path) => VideoCapture::from_file(path, videoio::CAP_ANY),
        }
        .map_err(|e| PipelineError::SourceUnavailable(format!("{}: {e}", self.describe())))?;

        if !capture.is_opened().map_err(cv_error)? {
            return Err(PipelineError::SourceUnavailable(format!("{} could not be opened", self.describe())));
        }
        self.capture = Some(capture);
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Option<DynamicImage>, PipelineError> {
        let Some(capture) = self.capture.as_mut() else {
            return Err(PipelineError::SourceUnavailable(self.describe()));
        };
        if !capture.read(&mut self.bgr).map_err(cv_error)? || self.bgr.empty() {
            return Ok(None);
        }

        imgproc::cvt_color(&self.bgr, &mut self.rgb, imgproc::COLOR_BGR2RGB, 0)
            .map_err(cv_error)?;
        let (width, height) = (self.rgb.cols() as u32, self.rgb.rows() as u32);
        let bytes = self.rgb.data_bytes().map_err(cv_error)?.to_vec();
        let frame = RgbImage::from_raw(width, height, bytes).ok_or_else(|| {
            PipelineError::Io(std::io::Error::other("capture buffer smaller than frame"))
        })?;
        Ok(Some(DynamicImage::ImageRgb8(frame)))
    }
}

/// Shows each counted cycle in a HighGUI window.
struct HighGuiWindow {
    mode: DisplayMode,
}

impl HighGuiWindow {
    fn open(mode: DisplayMode) -> anyhow::Result<Self> {
        highgui::named_window(WINDOW_NAME, highgui::WINDOW_AUTOSIZE)?;
        Ok(Self { mode })
    }
}

impl FrameDisplay for HighGuiWindow {
    fn show(&mut self, view: &CycleView<'_>) -> Result<(), PipelineError> {
        let rendered = annotate::render(view, self.mode);
        let mut mat = Mat::new_rows_cols_with_default(
            rendered.height() as i32,
            rendered.width() as i32,
            core::CV_8UC3,
            Scalar::all(0.0),
        )
        .map_err(cv_error)?;

        let target = mat.data_bytes_mut().map_err(cv_error)?;
        for (bgr, rgb) in target.chunks_exact_mut(3).zip(rendered.pixels()) {
            bgr[0] = rgb[2];
            bgr[1] = rgb[1];
            bgr[2] = rgb[0];
        }
        highgui::imshow(WINDOW_NAME, &mat).map_err(cv_error)
    }
}

/// Stops when `key` is pressed in the HighGUI window.
struct KeyboardStop {
    key: char,
    delay_ms: i32,
}

impl StopSignal for KeyboardStop {
    fn should_stop(&mut self) -> bool {
        match highgui::wait_key(self.delay_ms) {
            Ok(code) => code == self.key as i32,
            Err(err) => {
                warn!(error = %err, "keyboard poll failed");
                false
            }
        }
    }
}

fn main() -> anyhow::Result<()> {
    let config = match std::env::var_os(CONFIG_ENV) {
        Some(path) => {
            let path = PathBuf::from(path);
            PipelineConfig::load(&path)
                .with_context(|| format!("loading config from {}", path.display()))?
        }
        None => PipelineConfig::default(),
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let target = match std::env::args().nth(1) {
        Some(path) => CaptureTarget::File(path),
        None => CaptureTarget::Device(0),
    };
    let mut source = CameraSource::new(target);
    let mut window = HighGuiWindow::open(config.display.mode)?;
    let mut stop = KeyboardStop {
        key: 'q',
        delay_ms: 5,
    };
    let mut driver = PipelineDriver::new(config)?;

    let summary = driver
        .run(&mut source, &mut window, &mut stop)
        .with_context(|| format!("running on {}", source.describe()))?;
    info!(
        frames = summary.frames_read,
        counted = summary.cycles_counted,
        reason = ?summary.reason,
        "session finished"
    );

    highgui::destroy_all_windows()?;
    Ok(())
}
