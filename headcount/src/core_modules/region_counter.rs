// THEORY:
// The decision layer. Every surviving region of the cleaned mask is a candidate; only
// those at least as large as a person are counted. Background (label 0) is never a
// candidate, whatever area the labeller reports for it.

use crate::core_modules::region_labeller::{BoundingBox, Region};

/// The outcome of one counting cycle.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Detection {
    /// Number of regions with area >= the minimum human area.
    pub humans: usize,
    /// Bounding boxes of the counted regions, in label order.
    pub boxes: Vec<BoundingBox>,
    /// Number of non-background regions examined.
    pub regions_considered: usize,
    /// Total area of all non-background regions.
    pub foreground_pixels: u64,
}

/// Counts regions whose area reaches `min_area` (inclusive), ignoring label 0.
pub fn count_humans(regions: &[Region], min_area: u32) -> Detection {
    let mut detection = Detection::default();
    for region in regions.iter().filter(|region| !region.is_background()) {
        detection.regions_considered += 1;
        detection.foreground_pixels += region.area as u64;
        if region.area >= min_area {
            detection.humans += 1;
            detection.boxes.push(region.bounds);
        }
    }
    detection
}

/// `count_humans` bound to a configured minimum area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionCounter {
    min_area: u32,
}

impl RegionCounter {
    pub fn new(min_area: u32) -> Self {
        Self { min_area }
    }

    pub fn min_area(&self) -> u32 {
        self.min_area
    }

    pub fn count(&self, regions: &[Region]) -> Detection {
        count_humans(regions, self.min_area)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(label: u32, left: u32, area: u32) -> Region {
        Region {
            label,
            bounds: BoundingBox::new(left, 0, 10, 10),
            area,
        }
    }

    #[test]
    fn background_label_is_never_counted() {
        let detection = count_humans(&[region(0, 0, 1_000_000)], 1);
        assert_eq!(detection.humans, 0);
        assert!(detection.boxes.is_empty());
        assert_eq!(detection.regions_considered, 0);
    }

    #[test]
    fn minimum_area_is_inclusive() {
        let regions = [region(0, 0, 50), region(1, 10, 100), region(2, 20, 99)];
        let detection = count_humans(&regions, 100);
        assert_eq!(detection.humans, 1);
        assert_eq!(detection.boxes, vec![BoundingBox::new(10, 0, 10, 10)]);
        assert_eq!(detection.regions_considered, 2);
        assert_eq!(detection.foreground_pixels, 199);
    }

    #[test]
    fn boxes_follow_label_order() {
        let regions = [region(1, 30, 500), region(2, 10, 10), region(3, 20, 700)];
        let detection = RegionCounter::new(400).count(&regions);
        assert_eq!(detection.humans, 2);
        let lefts: Vec<u32> = detection.boxes.iter().map(|b| b.left).collect();
        assert_eq!(lefts, vec![30, 20]);
    }

    #[test]
    fn no_regions_counts_nothing() {
        assert_eq!(count_humans(&[], 0), Detection::default());
    }
}
