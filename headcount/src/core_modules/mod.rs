// The per-frame building blocks, bottom-up: the sliding window and its per-pixel
// statistics, the variance classifier, mask cleanup, region labelling, the area
// filter, and stage timing.

pub mod foreground;
pub mod frame_window;
pub mod morphology;
pub mod pixel_statistics;
pub mod region_counter;
pub mod region_labeller;
pub mod timing;
