// Rendering of a counted cycle for display: either the captured frame with a red box
// around every counted person, or the cleaned mask itself.

use crate::core_modules::region_labeller::BoundingBox;
use crate::io::CycleView;
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use serde::Deserialize;

pub const BOX_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
pub const BOX_THICKNESS: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    /// The captured frame with detection boxes drawn on top.
    #[default]
    Annotated,
    /// The cleaned foreground mask.
    Mask,
}

pub fn render(view: &CycleView<'_>, mode: DisplayMode) -> RgbImage {
    match mode {
        DisplayMode::Annotated => {
            let mut canvas = view.frame.to_rgb8();
            draw_boxes(&mut canvas, &view.detection.boxes);
            canvas
        }
        DisplayMode::Mask => DynamicImage::ImageLuma8(view.mask.clone()).to_rgb8(),
    }
}

/// Draws each box as a `BOX_THICKNESS`-pixel outline, growing inwards.
pub fn draw_boxes(canvas: &mut RgbImage, boxes: &[BoundingBox]) {
    for bounds in boxes {
        for inset in 0..BOX_THICKNESS {
            if bounds.width <= 2 * inset || bounds.height <= 2 * inset {
                break;
            }
            let rect = Rect::at((bounds.left + inset) as i32, (bounds.top + inset) as i32)
                .of_size(bounds.width - 2 * inset, bounds.height - 2 * inset);
            draw_hollow_rect_mut(canvas, rect, BOX_COLOR);
        }
    }
}
