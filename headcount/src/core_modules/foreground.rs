// THEORY:
// The `ForegroundClassifier` turns a full `FrameWindow` into a binary mask. A pixel is
// background when its temporal variance stays below the squared threshold and
// foreground otherwise. The threshold is configured in intensity levels (a standard
// deviation) and squared once, so the hot loop never takes a square root. When the
// squared threshold is a whole number the comparison runs entirely in integers; a
// fractional one falls back to `f64`.
//
// Rows are independent, so they may be classified on a rayon pool. Whichever way the
// rows run, `classify_into` only returns once every cell is written; downstream stages
// never see a partial mask.

use crate::config::PipelineConfig;
use crate::core_modules::frame_window::FrameWindow;
use crate::core_modules::pixel_statistics::{MomentPlanes, PixelMoments};
use crate::error::PipelineError;
use image::GrayImage;
use rayon::prelude::*;

/// A binary mask with cells in {`BACKGROUND`, `FOREGROUND`}.
pub type ForegroundMask = GrayImage;

pub const BACKGROUND: u8 = 0;
pub const FOREGROUND: u8 = 255;

#[derive(Debug)]
pub struct ForegroundClassifier {
    threshold: f64,
    threshold_sq: f64,
    /// `threshold²` when it is a whole number that fits in a `u64`.
    threshold_sq_exact: Option<u64>,
    /// Row-parallel execution; `None` classifies on the calling thread.
    pool: Option<rayon::ThreadPool>,
}

impl ForegroundClassifier {
    /// A single-threaded classifier with the given deviation threshold.
    pub fn new(threshold: f64) -> Self {
        let threshold_sq = threshold * threshold;
        let threshold_sq_exact = (threshold_sq.fract() == 0.0
            && threshold_sq >= 0.0
            && threshold_sq < u64::MAX as f64)
            .then_some(threshold_sq as u64);
        Self {
            threshold,
            threshold_sq,
            threshold_sq_exact,
            pool: None,
        }
    }

    /// A classifier that spreads rows over `threads` workers.
    pub fn parallel(threshold: f64, threads: usize) -> Result<Self, PipelineError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(|i| format!("headcount-classify-{i}"))
            .build()?;
        Ok(Self {
            pool: Some(pool),
            ..Self::new(threshold)
        })
    }

    pub fn from_config(config: &PipelineConfig) -> Result<Self, PipelineError> {
        if config.execution.parallel {
            Self::parallel(
                config.background_threshold,
                config.execution.resolved_worker_threads(),
            )
        } else {
            Ok(Self::new(config.background_threshold))
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn is_parallel(&self) -> bool {
        self.pool.is_some()
    }

    /// Variance compared against the squared threshold, both scaled by n².
    pub fn is_foreground(&self, moments: PixelMoments) -> bool {
        let scaled = moments.scaled_variance();
        match self.threshold_sq_exact {
            Some(threshold_sq) => {
                let n = moments.samples as u64;
                scaled >= threshold_sq.saturating_mul(n * n)
            }
            None => {
                let n = moments.samples as f64;
                scaled as f64 >= self.threshold_sq * n * n
            }
        }
    }

    /// Classifies the window into a freshly allocated mask.
    pub fn classify(&self, window: &FrameWindow) -> Result<ForegroundMask, PipelineError> {
        let mut mask = GrayImage::new(0, 0);
        self.classify_into(window, &mut mask)?;
        Ok(mask)
    }

    /// Classifies the window into `mask`, reallocating it only when the frame size changed.
    /// Every cell is overwritten.
    pub fn classify_into(
        &self,
        window: &FrameWindow,
        mask: &mut ForegroundMask,
    ) -> Result<(), PipelineError> {
        if !window.is_full() {
            return Err(PipelineError::WindowNotFull {
                len: window.len(),
                capacity: window.capacity(),
            });
        }

        let planes = window.moment_planes();
        if mask.dimensions() != (planes.width, planes.height) {
            *mask = GrayImage::new(planes.width, planes.height);
        }
        if planes.width == 0 || planes.height == 0 {
            return Ok(());
        }

        let width = planes.width as usize;
        let cells: &mut [u8] = &mut **mask;
        match &self.pool {
            Some(pool) => pool.install(|| {
                cells
                    .par_chunks_mut(width)
                    .enumerate()
                    .for_each(|(y, row)| self.classify_row(&planes, y as u32, row));
            }),
            None => cells
                .chunks_mut(width)
                .enumerate()
                .for_each(|(y, row)| self.classify_row(&planes, y as u32, row)),
        }
        Ok(())
    }

    fn classify_row(&self, planes: &MomentPlanes<'_>, y: u32, row: &mut [u8]) {
        let (sums, squares) = planes.row(y);
        for ((cell, &sum), &sum_sq) in row.iter_mut().zip(sums).zip(squares) {
            let moments = PixelMoments {
                sum,
                sum_sq,
                samples: planes.samples,
            };
            *cell = if self.is_foreground(moments) {
                FOREGROUND
            } else {
                BACKGROUND
            };
        }
    }
}
