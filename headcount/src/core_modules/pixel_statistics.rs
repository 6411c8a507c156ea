// THEORY:
// Per-pixel temporal statistics over the `FrameWindow`. A pixel that belongs to the
// static background barely changes from frame to frame; a pixel crossed by a moving
// person swings widely. Mean and variance across the window capture exactly that.
//
// Two routes compute the same numbers:
// - `mean` / `variance` / `std_dev` walk the retained frames (two-pass, floating point).
//   They are the reference definition and are what ad-hoc queries use.
// - `PixelMoments` derives them from the window's running Σx and Σx². The classifier
//   uses this route: O(1) per pixel regardless of W.
//
// Both divide by the live window occupancy, never by the configured capacity.

use crate::core_modules::frame_window::FrameWindow;

/// Arithmetic mean of the samples at `(x, y)` across the window. Zero for an empty window.
pub fn mean(window: &FrameWindow, x: u32, y: u32) -> f64 {
    let count = window.len();
    if count == 0 {
        return 0.0;
    }
    let sum: f64 = window
        .snapshot()
        .map(|frame| frame.get_pixel(x, y)[0] as f64)
        .sum();
    sum / count as f64
}

/// Population variance of the samples at `(x, y)`: the mean squared deviation from `mean`.
pub fn variance(window: &FrameWindow, x: u32, y: u32) -> f64 {
    let count = window.len();
    if count == 0 {
        return 0.0;
    }
    let mean = mean(window, x, y);
    window
        .snapshot()
        .map(|frame| (frame.get_pixel(x, y)[0] as f64 - mean).powi(2))
        .sum::<f64>()
        / count as f64
}

pub fn std_dev(window: &FrameWindow, x: u32, y: u32) -> f64 {
    variance(window, x, y).sqrt()
}

/// Running moments of one pixel across the retained samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PixelMoments {
    /// Σx over the retained samples.
    pub sum: u32,
    /// Σx² over the retained samples.
    pub sum_sq: u64,
    /// Number of retained samples (the window occupancy).
    pub samples: u32,
}

impl PixelMoments {
    pub fn mean(&self) -> f64 {
        if self.samples == 0 {
            return 0.0;
        }
        self.sum as f64 / self.samples as f64
    }

    /// `n² · variance`, exact in integer arithmetic.
    ///
    /// Moments taken from a window always satisfy n·Σx² >= (Σx)². Moments that do not
    /// (built by hand) report zero.
    pub fn scaled_variance(&self) -> u64 {
        let n = self.samples as u64;
        let sum = self.sum as u64;
        n.saturating_mul(self.sum_sq).saturating_sub(sum * sum)
    }

    pub fn variance(&self) -> f64 {
        if self.samples == 0 {
            return 0.0;
        }
        let n = self.samples as f64;
        self.scaled_variance() as f64 / (n * n)
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }
}

/// Borrowed, row-major moment planes of a whole window.
#[derive(Debug, Clone, Copy)]
pub struct MomentPlanes<'a> {
    pub width: u32,
    pub height: u32,
    pub samples: u32,
    pub sum: &'a [u32],
    pub sum_sq: &'a [u64],
}

impl<'a> MomentPlanes<'a> {
    /// The `sum` and `sum_sq` slices of row `y`.
    pub fn row(&self, y: u32) -> (&'a [u32], &'a [u64]) {
        let start = (y * self.width) as usize;
        let end = start + self.width as usize;
        (&self.sum[start..end], &self.sum_sq[start..end])
    }

    pub fn get(&self, x: u32, y: u32) -> PixelMoments {
        let index = (y * self.width + x) as usize;
        PixelMoments {
            sum: self.sum[index],
            sum_sq: self.sum_sq[index],
            samples: self.samples,
        }
    }
}
