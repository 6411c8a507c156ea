// THEORY:
// The `FrameWindow` is the memory of the engine: the last W grayscale frames, oldest
// first. It is the only state that survives from one cycle to the next.
//
// Key architectural principles:
// 1.  **FIFO Sliding**: Frames are appended at the back. Once the window holds more
//     than W frames the oldest is evicted, so its size is always min(frames seen, W).
// 2.  **Fixed Geometry**: The first frame fixes the dimensions. A frame of any other
//     size is refused before anything is mutated.
// 3.  **Incremental Moments**: Alongside the frames the window keeps, per pixel, the
//     running sum and sum of squares of every retained sample. Arrivals add, evictions
//     subtract, so the classifier reads mean and variance in O(1) per pixel instead of
//     re-walking all W frames.

use crate::core_modules::pixel_statistics::{MomentPlanes, PixelMoments};
use crate::error::PipelineError;
use image::GrayImage;
use std::collections::VecDeque;

/// A fixed-capacity, oldest-first window of grayscale frames.
#[derive(Debug, Clone)]
pub struct FrameWindow {
    /// The maximum number of retained frames (W).
    capacity: usize,
    frames: VecDeque<GrayImage>,
    /// Per-pixel sum of the retained samples, row-major.
    sum: Vec<u32>,
    /// Per-pixel sum of squared retained samples, row-major.
    sum_sq: Vec<u64>,
    /// Total frames accepted since construction or the last `clear`.
    frames_seen: u64,
}

impl FrameWindow {
    /// Creates an empty window. A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            frames: VecDeque::with_capacity(capacity + 1),
            sum: Vec::new(),
            sum_sq: Vec::new(),
            frames_seen: 0,
        }
    }

    /// Appends a frame, evicting the oldest one if the window overflows.
    pub fn push(&mut self, frame: GrayImage) -> Result<(), PipelineError> {
        match self.dimensions() {
            Some(expected) => {
                let found = frame.dimensions();
                if found != expected {
                    return Err(PipelineError::DimensionMismatch { expected, found });
                }
            }
            None => {
                let pixels = frame.as_raw().len();
                self.sum.clear();
                self.sum.resize(pixels, 0);
                self.sum_sq.clear();
                self.sum_sq.resize(pixels, 0);
            }
        }

        Self::add_samples(&mut self.sum, &mut self.sum_sq, &frame);
        self.frames.push_back(frame);
        if self.frames.len() > self.capacity {
            if let Some(evicted) = self.frames.pop_front() {
                Self::remove_samples(&mut self.sum, &mut self.sum_sq, &evicted);
            }
        }
        self.frames_seen += 1;
        Ok(())
    }

    pub fn is_full(&self) -> bool {
        self.frames.len() == self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }

    /// `(width, height)` shared by every retained frame, if any.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.frames.front().map(|frame| frame.dimensions())
    }

    /// The retained frames, oldest first.
    pub fn snapshot(&self) -> impl DoubleEndedIterator<Item = &GrayImage> + ExactSizeIterator {
        self.frames.iter()
    }

    /// Running moments of the pixel at `(x, y)`.
    ///
    /// Panics if the coordinate lies outside the frame.
    pub fn moments(&self, x: u32, y: u32) -> PixelMoments {
        let (width, height) = self.dimensions().unwrap_or((0, 0));
        assert!(
            x < width && y < height,
            "pixel ({x}, {y}) outside {width}x{height} window"
        );
        let index = (y * width + x) as usize;
        PixelMoments {
            sum: self.sum[index],
            sum_sq: self.sum_sq[index],
            samples: self.frames.len() as u32,
        }
    }

    /// Borrowed view of the whole moment planes, for bulk classification.
    pub fn moment_planes(&self) -> MomentPlanes<'_> {
        let (width, height) = self.dimensions().unwrap_or((0, 0));
        MomentPlanes {
            width,
            height,
            samples: self.frames.len() as u32,
            sum: &self.sum,
            sum_sq: &self.sum_sq,
        }
    }

    /// Drops every frame; the next push may use new dimensions.
    pub fn clear(&mut self) {
        self.frames.clear();
        self.sum.clear();
        self.sum_sq.clear();
        self.frames_seen = 0;
    }

    fn add_samples(sum: &mut [u32], sum_sq: &mut [u64], frame: &GrayImage) {
        for ((&value, s), sq) in frame.as_raw().iter().zip(sum.iter_mut()).zip(sum_sq.iter_mut()) {
            let value = value as u32;
            *s += value;
            *sq += (value * value) as u64;
        }
    }

    fn remove_samples(sum: &mut [u32], sum_sq: &mut [u64], frame: &GrayImage) {
        for ((&value, s), sq) in frame.as_raw().iter().zip(sum.iter_mut()).zip(sum_sq.iter_mut()) {
            let value = value as u32;
            *s -= value;
            *sq -= (value * value) as u64;
        }
    }
}
