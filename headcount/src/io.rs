// THEORY:
// The engine's boundary with the outside world. Frames come in through a
// `VideoSource`, results go out through a `FrameDisplay`, and a `StopSignal` is polled
// once per cycle. The core never knows whether it is fed by a camera, a directory of
// stills or a test fixture.
//
// The implementations here cover what the `image` crate can do on its own: reading a
// directory of image files, replaying in-memory frames, and writing rendered cycles as
// PNG files. Live capture and on-screen windows belong to the `visual_tester` binary.

use crate::annotate::{self, DisplayMode};
use crate::core_modules::foreground::ForegroundMask;
use crate::core_modules::region_counter::Detection;
use crate::error::PipelineError;
use image::{DynamicImage, GrayImage, ImageFormat};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

/// A stream of color (or gray) frames of constant dimensions.
pub trait VideoSource {
    /// Prepares the source. Failure here is fatal for the run.
    fn open(&mut self) -> Result<(), PipelineError>;
    /// The next frame, or `None` once the stream has ended.
    fn read_frame(&mut self) -> Result<Option<DynamicImage>, PipelineError>;
}

/// Everything a display may want to show about one counted cycle.
#[derive(Debug, Clone, Copy)]
pub struct CycleView<'a> {
    /// The frame as captured, before grayscale conversion.
    pub frame: &'a DynamicImage,
    /// The cleaned foreground mask that was labelled.
    pub mask: &'a ForegroundMask,
    pub detection: &'a Detection,
}

pub trait FrameDisplay {
    fn show(&mut self, view: &CycleView<'_>) -> Result<(), PipelineError>;
}

pub trait StopSignal {
    /// Polled once per cycle, after the cycle completes.
    fn should_stop(&mut self) -> bool;
}

/// Single-channel conversion applied to every captured frame before buffering.
pub fn to_grayscale(frame: &DynamicImage) -> GrayImage {
    frame.to_luma8()
}

/// Reads every decodable image file of a directory in file-name order.
#[derive(Debug)]
pub struct ImageSequenceSource {
    dir: PathBuf,
    pending: VecDeque<PathBuf>,
}

impl ImageSequenceSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            pending: VecDeque::new(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

impl VideoSource for ImageSequenceSource {
    fn open(&mut self) -> Result<(), PipelineError> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| {
            PipelineError::SourceUnavailable(format!("{}: {e}", self.dir.display()))
        })?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| path.is_file() && ImageFormat::from_path(path).is_ok())
            .collect();
        if paths.is_empty() {
            return Err(PipelineError::SourceUnavailable(format!(
                "no image files in {}",
                self.dir.display()
            )));
        }
        paths.sort();
        self.pending = paths.into();
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Option<DynamicImage>, PipelineError> {
        match self.pending.pop_front() {
            Some(path) => Ok(Some(image::open(path)?)),
            None => Ok(None),
        }
    }
}

/// Replays frames held in memory.
#[derive(Debug, Default)]
pub struct FrameListSource {
    frames: VecDeque<DynamicImage>,
}

impl FrameListSource {
    pub fn new(frames: impl IntoIterator<Item = DynamicImage>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
        }
    }

    pub fn from_gray(frames: impl IntoIterator<Item = GrayImage>) -> Self {
        Self::new(frames.into_iter().map(DynamicImage::ImageLuma8))
    }
}

impl VideoSource for FrameListSource {
    fn open(&mut self) -> Result<(), PipelineError> {
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Option<DynamicImage>, PipelineError> {
        Ok(self.frames.pop_front())
    }
}

/// Writes each rendered cycle as `frame_000000.png`, `frame_000001.png`, ...
#[derive(Debug)]
pub struct PngSequenceWriter {
    dir: PathBuf,
    mode: DisplayMode,
    written: u64,
}

impl PngSequenceWriter {
    /// Creates the output directory if needed.
    pub fn create(dir: impl Into<PathBuf>, mode: DisplayMode) -> Result<Self, PipelineError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            mode,
            written: 0,
        })
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl FrameDisplay for PngSequenceWriter {
    fn show(&mut self, view: &CycleView<'_>) -> Result<(), PipelineError> {
        let rendered = annotate::render(view, self.mode);
        let path = self.dir.join(format!("frame_{:06}.png", self.written));
        rendered.save_with_format(path, ImageFormat::Png)?;
        self.written += 1;
        Ok(())
    }
}

/// Discards every cycle.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDisplay;

impl FrameDisplay for NullDisplay {
    fn show(&mut self, _view: &CycleView<'_>) -> Result<(), PipelineError> {
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NeverStop;

impl StopSignal for NeverStop {
    fn should_stop(&mut self) -> bool {
        false
    }
}

/// Requests a stop after a fixed number of cycles.
#[derive(Debug, Clone, Copy)]
pub struct FrameLimit {
    remaining: u64,
}

impl FrameLimit {
    pub fn new(cycles: u64) -> Self {
        Self { remaining: cycles }
    }
}

impl StopSignal for FrameLimit {
    fn should_stop(&mut self) -> bool {
        self.remaining = self.remaining.saturating_sub(1);
        self.remaining == 0
    }
}
