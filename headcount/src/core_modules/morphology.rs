// THEORY:
// The raw foreground mask is noisy: sensor flicker lights up isolated pixels, and a
// walking person breaks into ragged fragments. A morphological program cleans it before
// labelling. The default program is an opening (erode, then dilate), which deletes
// specks smaller than the structuring element while restoring the extent of the large
// shapes that survive.
//
// The pixel work is delegated to `imageproc::morphology`. A structuring element of
// side `size` becomes a distance bound of `size / 2` under the norm matching its shape:
// a disk for ellipses (L2), a square for rectangles (L-infinity), a diamond for crosses
// (L1). A 1x1 element has radius zero and leaves the mask untouched.

use crate::core_modules::foreground::ForegroundMask;
use imageproc::distance_transform::Norm;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StructuringShape {
    Ellipse,
    Rect,
    Cross,
}

/// One operation of a cleanup program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MorphStep {
    Erode,
    Dilate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StructuringElement {
    pub shape: StructuringShape,
    /// Side length in pixels.
    pub size: u8,
}

impl StructuringElement {
    pub fn new(shape: StructuringShape, size: u8) -> Self {
        Self { shape, size }
    }

    pub fn radius(&self) -> u8 {
        self.size / 2
    }

    pub fn norm(&self) -> Norm {
        match self.shape {
            StructuringShape::Ellipse => Norm::L2,
            StructuringShape::Rect => Norm::LInf,
            StructuringShape::Cross => Norm::L1,
        }
    }
}

/// A pure mask-to-mask transform applied between classification and labelling.
pub trait MaskCleanup {
    fn apply(&self, mask: &ForegroundMask) -> ForegroundMask;
}

/// An ordered list of erosions and dilations with one structuring element.
#[derive(Debug, Clone, PartialEq)]
pub struct MorphologyProgram {
    steps: Vec<MorphStep>,
    element: StructuringElement,
}

impl MorphologyProgram {
    pub fn new(steps: Vec<MorphStep>, element: StructuringElement) -> Self {
        Self { steps, element }
    }

    /// Erode then dilate.
    pub fn opening(element: StructuringElement) -> Self {
        Self::new(vec![MorphStep::Erode, MorphStep::Dilate], element)
    }
}

impl MaskCleanup for MorphologyProgram {
    fn apply(&self, mask: &ForegroundMask) -> ForegroundMask {
        let mut cleaned = mask.clone();
        let radius = self.element.radius();
        if radius == 0 {
            return cleaned;
        }

        let norm = self.element.norm();
        for step in &self.steps {
            match step {
                MorphStep::Erode => imageproc::morphology::erode_mut(&mut cleaned, norm, radius),
                MorphStep::Dilate => imageproc::morphology::dilate_mut(&mut cleaned, norm, radius),
            }
        }
        cleaned
    }
}
