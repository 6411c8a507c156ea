// THEORY:
// The `RegionLabeller` is the spatial grouping layer. It takes a cleaned binary mask
// and answers "which foreground pixels belong together?", returning one `Region` per
// connected component with its bounding box and area.
//
// Key architectural principles:
// 1.  **Delegated Labelling**: Pixel connectivity is resolved by
//     `imageproc::region_labelling::connected_components`. This module only aggregates
//     the label image into per-label statistics, in a single raster pass.
// 2.  **Background Is Label 0**: Label 0 is reserved for background pixels and is
//     reported like any other label whenever the mask has background. Consumers are
//     expected to skip it; the `RegionCounter` always does.
// 3.  **Label Order**: Regions come out sorted by label, so identical masks always
//     yield identical region lists.

use crate::core_modules::foreground::{BACKGROUND, ForegroundMask};
use image::Luma;
use imageproc::region_labelling::{Connectivity, connected_components};
use serde::Deserialize;

/// The label reserved for background pixels.
pub const BACKGROUND_LABEL: u32 = 0;

/// Pixel adjacency used when growing regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelConnectivity {
    /// Horizontal and vertical neighbours only.
    Four,
    /// Diagonal neighbours too.
    #[default]
    Eight,
}

impl From<LabelConnectivity> for Connectivity {
    fn from(connectivity: LabelConnectivity) -> Self {
        match connectivity {
            LabelConnectivity::Four => Connectivity::Four,
            LabelConnectivity::Eight => Connectivity::Eight,
        }
    }
}

/// An axis-aligned box in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoundingBox {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(left: u32, top: u32, width: u32, height: u32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }
}

/// One connected component of a mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub label: u32,
    pub bounds: BoundingBox,
    /// Number of pixels carrying this label.
    pub area: u32,
}

impl Region {
    pub fn is_background(&self) -> bool {
        self.label == BACKGROUND_LABEL
    }
}

/// Connected-component analysis over a binary mask.
pub trait RegionLabeller {
    /// Every label present in `mask`, in label order, background included.
    fn label(&self, mask: &ForegroundMask) -> Vec<Region>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectedComponents {
    connectivity: LabelConnectivity,
}

impl ConnectedComponents {
    pub fn new(connectivity: LabelConnectivity) -> Self {
        Self { connectivity }
    }
}

impl RegionLabeller for ConnectedComponents {
    fn label(&self, mask: &ForegroundMask) -> Vec<Region> {
        let labels = connected_components(mask, self.connectivity.into(), Luma([BACKGROUND]));

        let mut extents: Vec<Extent> = Vec::new();
        for (x, y, pixel) in labels.enumerate_pixels() {
            let label = pixel[0] as usize;
            if label >= extents.len() {
                extents.resize(label + 1, Extent::EMPTY);
            }
            extents[label].include(x, y);
        }

        extents
            .into_iter()
            .enumerate()
            .filter(|(_, extent)| extent.area > 0)
            .map(|(label, extent)| extent.into_region(label as u32))
            .collect()
    }
}

/// Running bounds of one label during the aggregation pass.
#[derive(Debug, Clone, Copy)]
struct Extent {
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
    area: u32,
}

impl Extent {
    const EMPTY: Extent = Extent {
        min_x: u32::MAX,
        min_y: u32::MAX,
        max_x: 0,
        max_y: 0,
        area: 0,
    };

    fn include(&mut self, x: u32, y: u32) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
        self.area += 1;
    }

    fn into_region(self, label: u32) -> Region {
        Region {
            label,
            bounds: BoundingBox::new(
                self.min_x,
                self.min_y,
                self.max_x - self.min_x + 1,
                self.max_y - self.min_y + 1,
            ),
            area: self.area,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::foreground::FOREGROUND;
    use image::GrayImage;

    fn fill(mask: &mut GrayImage, left: u32, top: u32, width: u32, height: u32) {
        for y in top..top + height {
            for x in left..left + width {
                mask.put_pixel(x, y, Luma([FOREGROUND]));
            }
        }
    }

    #[test]
    fn separate_blocks_become_separate_regions() {
        let mut mask = GrayImage::new(20, 10);
        fill(&mut mask, 1, 1, 4, 3);
        fill(&mut mask, 10, 5, 6, 5);

        let regions = ConnectedComponents::default().label(&mask);
        assert_eq!(regions.len(), 3);

        assert!(regions[0].is_background());
        assert_eq!(regions[0].area, 200 - 12 - 30);

        assert_eq!(regions[1].label, 1);
        assert_eq!(regions[1].bounds, BoundingBox::new(1, 1, 4, 3));
        assert_eq!(regions[1].area, 12);

        assert_eq!(regions[2].label, 2);
        assert_eq!(regions[2].bounds, BoundingBox::new(10, 5, 6, 5));
        assert_eq!(regions[2].area, 30);
    }

    #[test]
    fn diagonal_contact_depends_on_connectivity() {
        let mut mask = GrayImage::new(6, 6);
        fill(&mut mask, 1, 1, 2, 2);
        fill(&mut mask, 3, 3, 2, 2);

        let eight = ConnectedComponents::new(LabelConnectivity::Eight).label(&mask);
        let foreground: Vec<_> = eight.iter().filter(|r| !r.is_background()).collect();
        assert_eq!(foreground.len(), 1);
        assert_eq!(foreground[0].bounds, BoundingBox::new(1, 1, 4, 4));
        assert_eq!(foreground[0].area, 8);

        let four = ConnectedComponents::new(LabelConnectivity::Four).label(&mask);
        assert_eq!(four.iter().filter(|r| !r.is_background()).count(), 2);
    }

    #[test]
    fn empty_mask_is_all_background() {
        let mask = GrayImage::new(7, 3);
        let regions = ConnectedComponents::default().label(&mask);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].label, BACKGROUND_LABEL);
        assert_eq!(regions[0].bounds, BoundingBox::new(0, 0, 7, 3));
        assert_eq!(regions[0].area, 21);
    }

    #[test]
    fn fully_foreground_mask_has_no_background_label() {
        let mut mask = GrayImage::new(5, 4);
        fill(&mut mask, 0, 0, 5, 4);
        let regions = ConnectedComponents::default().label(&mask);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].label, 1);
        assert_eq!(regions[0].area, 20);
    }
}
