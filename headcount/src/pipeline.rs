// THEORY:
// The `pipeline` module is the top-level API of the engine. The `PipelineDriver` owns
// every piece of cross-frame state (the frame window, the reusable mask buffers, the
// phase of its state machine and the stage metrics) and sequences one cycle:
//
//   frame -> grayscale -> window -> foreground mask -> cleanup -> labels -> count
//
// State machine:
// - `Warmup`: the window is still filling. Frames are buffered, nothing is classified.
// - `Steady`: the window is full. Every frame slides it and runs the full cycle; the
//   frame that first fills the window already produces a count.
// - `Terminated`: the stream ended, a capture failed, or a stop was requested. Final.
//
// `process_frame` is one cycle with no I/O. `run` drives a whole session against a
// `VideoSource`, a `FrameDisplay` and a `StopSignal`, polling the stop signal between
// cycles and never in the middle of one.

use crate::config::PipelineConfig;
use crate::core_modules::foreground::{ForegroundClassifier, ForegroundMask};
use crate::core_modules::frame_window::FrameWindow;
use crate::core_modules::morphology::{MaskCleanup, MorphologyProgram};
use crate::core_modules::region_counter::RegionCounter;
use crate::core_modules::region_labeller::{ConnectedComponents, RegionLabeller};
use crate::core_modules::timing::{Stage, StageMetrics, StageTimer};
use crate::error::PipelineError;
use crate::io::{self, CycleView, FrameDisplay, StopSignal, VideoSource};
use image::GrayImage;
use tracing::{debug, info, warn};

// Re-export key data structures for the public API.
pub use crate::core_modules::region_counter::Detection;
pub use crate::core_modules::region_labeller::{BoundingBox, Region};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelinePhase {
    Warmup,
    Steady,
    Terminated,
}

/// The output of the driver for a single frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Report {
    /// The frame was buffered; the window is not full yet.
    Warmup { buffered: usize, capacity: usize },
    /// The window is full and the frame was counted.
    Counted(Detection),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    EndOfStream,
    StopRequested,
    /// The source failed mid-stream; handled like the end of the stream.
    CaptureFailed,
}

/// What a finished `run` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub frames_read: u64,
    pub cycles_counted: u64,
    pub last_detection: Option<Detection>,
    pub reason: TerminationReason,
}

pub struct PipelineDriver {
    config: PipelineConfig,
    window: FrameWindow,
    classifier: ForegroundClassifier,
    cleanup: Box<dyn MaskCleanup>,
    labeller: Box<dyn RegionLabeller>,
    counter: RegionCounter,
    /// Classifier output, overwritten in place every cycle.
    raw_mask: ForegroundMask,
    /// Mask after cleanup; the one that was labelled most recently.
    cleaned_mask: ForegroundMask,
    phase: PipelinePhase,
    metrics: StageMetrics,
    cycles_counted: u64,
}

impl PipelineDriver {
    /// Builds a driver with the `imageproc`-backed cleanup and labeller described by `config`.
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        let cleanup = MorphologyProgram::new(
            config.morphology.steps.clone(),
            config.morphology.structuring_element(),
        );
        let labeller = ConnectedComponents::new(config.connectivity);
        Self::with_collaborators(config, Box::new(cleanup), Box::new(labeller))
    }

    pub fn with_collaborators(
        config: PipelineConfig,
        cleanup: Box<dyn MaskCleanup>,
        labeller: Box<dyn RegionLabeller>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        let classifier = ForegroundClassifier::from_config(&config)?;
        let counter = RegionCounter::new(config.min_human_area);
        debug!(
            window_size = config.window_size,
            threshold = classifier.threshold(),
            min_human_area = counter.min_area(),
            parallel = classifier.is_parallel(),
            "pipeline configured"
        );
        Ok(Self {
            window: FrameWindow::new(config.window_size),
            counter,
            classifier,
            cleanup,
            labeller,
            raw_mask: GrayImage::new(0, 0),
            cleaned_mask: GrayImage::new(0, 0),
            phase: PipelinePhase::Warmup,
            metrics: StageMetrics::new(),
            cycles_counted: 0,
            config,
        })
    }

    /// Runs one cycle on an already grayscale frame.
    pub fn process_frame(&mut self, frame: GrayImage) -> Result<Report, PipelineError> {
        if self.phase == PipelinePhase::Terminated {
            return Err(PipelineError::Terminated);
        }

        self.window.push(frame)?;
        if !self.window.is_full() {
            debug!(
                buffered = self.window.len(),
                capacity = self.window.capacity(),
                "warming up"
            );
            return Ok(Report::Warmup {
                buffered: self.window.len(),
                capacity: self.window.capacity(),
            });
        }
        if self.phase == PipelinePhase::Warmup {
            info!(window_size = self.window.capacity(), "window full, counting started");
            self.phase = PipelinePhase::Steady;
        }

        let timer = StageTimer::start(Stage::Classify);
        self.classifier
            .classify_into(&self.window, &mut self.raw_mask)?;
        timer.stop(&mut self.metrics);

        let timer = StageTimer::start(Stage::Cleanup);
        self.cleaned_mask = self.cleanup.apply(&self.raw_mask);
        timer.stop(&mut self.metrics);

        let timer = StageTimer::start(Stage::Label);
        let regions = self.labeller.label(&self.cleaned_mask);
        timer.stop(&mut self.metrics);

        let timer = StageTimer::start(Stage::Count);
        let detection = self.counter.count(&regions);
        timer.stop(&mut self.metrics);

        self.cycles_counted += 1;
        info!(
            humans = detection.humans,
            regions = detection.regions_considered,
            foreground_pixels = detection.foreground_pixels,
            "frame counted"
        );
        Ok(Report::Counted(detection))
    }

    /// Drives a whole session until the stream ends or a stop is requested.
    ///
    /// Failing to open the source is fatal. A failing read ends the session like the end of
    /// the stream does. Display failures are logged and skipped.
    pub fn run(
        &mut self,
        source: &mut dyn VideoSource,
        display: &mut dyn FrameDisplay,
        stop: &mut dyn StopSignal,
    ) -> Result<RunSummary, PipelineError> {
        if self.phase == PipelinePhase::Terminated {
            return Err(PipelineError::Terminated);
        }
        source.open()?;
        info!("video source opened");

        let mut frames_read = 0;
        let mut last_detection = None;
        let reason = loop {
            let timer = StageTimer::start(Stage::Acquire);
            let next = source.read_frame();
            timer.stop(&mut self.metrics);

            let frame = match next {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    info!("end of video");
                    break TerminationReason::EndOfStream;
                }
                Err(err) => {
                    warn!(error = %err, "frame capture failed, ending stream");
                    break TerminationReason::CaptureFailed;
                }
            };
            frames_read += 1;

            let timer = StageTimer::start(Stage::Grayscale);
            let gray = io::to_grayscale(&frame);
            timer.stop(&mut self.metrics);

            let report = match self.process_frame(gray) {
                Ok(report) => report,
                Err(err) => {
                    self.terminate();
                    return Err(err);
                }
            };

            if let Report::Counted(detection) = report {
                let timer = StageTimer::start(Stage::Display);
                let view = CycleView {
                    frame: &frame,
                    mask: &self.cleaned_mask,
                    detection: &detection,
                };
                if let Err(err) = display.show(&view) {
                    warn!(error = %err, "display failed");
                }
                timer.stop(&mut self.metrics);
                last_detection = Some(detection);
            }

            if stop.should_stop() {
                info!("stop requested");
                break TerminationReason::StopRequested;
            }
        };

        self.terminate();
        self.metrics.log_summary();
        Ok(RunSummary {
            frames_read,
            cycles_counted: self.cycles_counted,
            last_detection,
            reason,
        })
    }

    /// Moves the driver to its final phase.
    pub fn terminate(&mut self) {
        if self.phase != PipelinePhase::Terminated {
            debug!(cycles_counted = self.cycles_counted, "pipeline terminated");
        }
        self.phase = PipelinePhase::Terminated;
    }

    /// Empties the window and starts warming up again. A terminated driver stays terminated.
    pub fn reset(&mut self) -> Result<(), PipelineError> {
        if self.phase == PipelinePhase::Terminated {
            return Err(PipelineError::Terminated);
        }
        self.window.clear();
        self.phase = PipelinePhase::Warmup;
        Ok(())
    }

    pub fn phase(&self) -> PipelinePhase {
        self.phase
    }

    pub fn window(&self) -> &FrameWindow {
        &self.window
    }

    /// The cleaned mask of the most recent counted cycle.
    pub fn last_mask(&self) -> &ForegroundMask {
        &self.cleaned_mask
    }

    /// The classifier output of the most recent counted cycle, before cleanup.
    pub fn raw_mask(&self) -> &ForegroundMask {
        &self.raw_mask
    }

    pub fn metrics(&self) -> &StageMetrics {
        &self.metrics
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn cycles_counted(&self) -> u64 {
        self.cycles_counted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{FrameListSource, FrameLimit, NeverStop, NullDisplay};
    use image::{DynamicImage, Luma};

    fn config(window_size: usize, min_human_area: u32) -> PipelineConfig {
        let mut config = PipelineConfig {
            window_size,
            min_human_area,
            ..PipelineConfig::default()
        };
        config.execution.parallel = false;
        config
    }

    fn flat(value: u8) -> GrayImage {
        GrayImage::from_pixel(40, 40, Luma([value]))
    }

    fn with_block(value: u8) -> GrayImage {
        let mut frame = flat(10);
        for y in 10..30 {
            for x in 10..30 {
                frame.put_pixel(x, y, Luma([value]));
            }
        }
        frame
    }

    struct FailingSource {
        opens: bool,
        frames: Vec<GrayImage>,
    }

    impl VideoSource for FailingSource {
        fn open(&mut self) -> Result<(), PipelineError> {
            if self.opens {
                Ok(())
            } else {
                Err(PipelineError::SourceUnavailable("camera 0".into()))
            }
        }

        fn read_frame(&mut self) -> Result<Option<image::DynamicImage>, PipelineError> {
            match self.frames.pop() {
                Some(frame) => Ok(Some(DynamicImage::ImageLuma8(frame))),
                None => Err(PipelineError::Io(std::io::Error::other("device unplugged"))),
            }
        }
    }

    #[derive(Default)]
    struct RecordingDisplay {
        humans: Vec<usize>,
        mask_sizes: Vec<(u32, u32)>,
    }

    impl FrameDisplay for RecordingDisplay {
        fn show(&mut self, view: &CycleView<'_>) -> Result<(), PipelineError> {
            self.humans.push(view.detection.humans);
            self.mask_sizes.push(view.mask.dimensions());
            Ok(())
        }
    }

    /// Rejects every cycle it is shown.
    #[derive(Default)]
    struct FailingDisplay {
        attempts: usize,
    }

    impl FrameDisplay for FailingDisplay {
        fn show(&mut self, _view: &CycleView<'_>) -> Result<(), PipelineError> {
            self.attempts += 1;
            Err(PipelineError::Io(std::io::Error::other("window closed")))
        }
    }

    #[test]
    fn warmup_then_steady_on_the_filling_frame() {
        let mut driver = PipelineDriver::new(config(3, 100)).unwrap();
        assert_eq!(driver.phase(), PipelinePhase::Warmup);

        assert_eq!(
            driver.process_frame(flat(10)).unwrap(),
            Report::Warmup {
                buffered: 1,
                capacity: 3
            }
        );
        assert_eq!(
            driver.process_frame(flat(10)).unwrap(),
            Report::Warmup {
                buffered: 2,
                capacity: 3
            }
        );
        assert_eq!(driver.phase(), PipelinePhase::Warmup);

        let report = driver.process_frame(with_block(200)).unwrap();
        assert_eq!(driver.phase(), PipelinePhase::Steady);
        let Report::Counted(detection) = report else {
            panic!("expected a count once the window is full");
        };
        assert_eq!(detection.humans, 1);
        assert_eq!(detection.boxes, vec![BoundingBox::new(10, 10, 20, 20)]);
        assert_eq!(driver.cycles_counted(), 1);
        assert!(driver.metrics().get(Stage::Classify).is_some());
    }

    #[test]
    fn steady_state_keeps_window_at_capacity() {
        let mut driver = PipelineDriver::new(config(3, 100)).unwrap();
        for _ in 0..7 {
            driver.process_frame(flat(10)).unwrap();
        }
        assert_eq!(driver.window().len(), 3);
        assert_eq!(driver.window().frames_seen(), 7);
        assert_eq!(driver.cycles_counted(), 5);
        assert!(driver.last_mask().pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn small_regions_are_not_people() {
        let mut driver = PipelineDriver::new(config(2, 401)).unwrap();
        driver.process_frame(flat(10)).unwrap();
        let Report::Counted(detection) = driver.process_frame(with_block(200)).unwrap() else {
            panic!("expected a count");
        };
        assert_eq!(detection.humans, 0);
        assert_eq!(detection.regions_considered, 1);
        assert!(detection.foreground_pixels > 0);
        assert!(driver.raw_mask().pixels().any(|p| p[0] == 255));
    }

    #[test]
    fn dimension_change_fails_fast() {
        let mut driver = PipelineDriver::new(config(3, 100)).unwrap();
        driver.process_frame(flat(10)).unwrap();
        let err = driver.process_frame(GrayImage::new(20, 40)).unwrap_err();
        assert!(matches!(err, PipelineError::DimensionMismatch { .. }));
        assert_eq!(driver.window().len(), 1);
    }

    #[test]
    fn terminated_driver_rejects_frames() {
        let mut driver = PipelineDriver::new(config(3, 100)).unwrap();
        driver.terminate();
        assert!(matches!(
            driver.process_frame(flat(1)),
            Err(PipelineError::Terminated)
        ));
        assert!(matches!(driver.reset(), Err(PipelineError::Terminated)));
    }

    #[test]
    fn reset_returns_to_warmup() {
        let mut driver = PipelineDriver::new(config(2, 100)).unwrap();
        driver.process_frame(flat(1)).unwrap();
        driver.process_frame(flat(1)).unwrap();
        assert_eq!(driver.phase(), PipelinePhase::Steady);
        driver.reset().unwrap();
        assert_eq!(driver.phase(), PipelinePhase::Warmup);
        assert!(driver.window().is_empty());
        assert!(matches!(
            driver.process_frame(GrayImage::new(8, 8)).unwrap(),
            Report::Warmup { buffered: 1, .. }
        ));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let result = PipelineDriver::new(config(1, 100));
        assert!(matches!(result, Err(PipelineError::Config(_))));
    }

    #[test]
    fn run_stops_at_end_of_stream() {
        let frames = vec![flat(10), flat(10), with_block(200), flat(10)];
        let mut source = FrameListSource::from_gray(frames);
        let mut display = RecordingDisplay::default();
        let mut driver = PipelineDriver::new(config(3, 100)).unwrap();

        let summary = driver.run(&mut source, &mut display, &mut NeverStop).unwrap();
        assert_eq!(summary.reason, TerminationReason::EndOfStream);
        assert_eq!(summary.frames_read, 4);
        assert_eq!(summary.cycles_counted, 2);
        assert_eq!(display.humans, vec![1, 1]);
        assert_eq!(display.mask_sizes, vec![(40, 40), (40, 40)]);
        assert_eq!(driver.phase(), PipelinePhase::Terminated);
        assert!(matches!(
            driver.run(&mut FrameListSource::default(), &mut NullDisplay, &mut NeverStop),
            Err(PipelineError::Terminated)
        ));
    }

    #[test]
    fn display_failures_do_not_end_the_run() {
        let mut source = FrameListSource::from_gray(vec![flat(10); 6]);
        let mut display = FailingDisplay::default();
        let mut driver = PipelineDriver::new(config(3, 100)).unwrap();

        let summary = driver.run(&mut source, &mut display, &mut NeverStop).unwrap();
        assert_eq!(summary.reason, TerminationReason::EndOfStream);
        assert_eq!(summary.frames_read, 6);
        assert_eq!(summary.cycles_counted, 4);
        assert_eq!(display.attempts, 4);
        assert_eq!(summary.last_detection, Some(Detection::default()));
    }

    #[test]
    fn run_fails_fast_on_a_resized_frame() {
        let frames = vec![flat(10), flat(10), flat(10), GrayImage::new(20, 20), flat(10)];
        let mut source = FrameListSource::from_gray(frames);
        let mut driver = PipelineDriver::new(config(3, 100)).unwrap();

        let err = driver
            .run(&mut source, &mut NullDisplay, &mut NeverStop)
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::DimensionMismatch {
                expected: (40, 40),
                found: (20, 20)
            }
        ));
        assert_eq!(driver.phase(), PipelinePhase::Terminated);
        assert_eq!(driver.window().len(), 3);
        assert_eq!(driver.cycles_counted(), 1);
    }

    #[test]
    fn run_honours_stop_signal_between_cycles() {
        let mut source = FrameListSource::from_gray(vec![flat(10); 10]);
        let mut driver = PipelineDriver::new(config(3, 100)).unwrap();
        let summary = driver
            .run(&mut source, &mut NullDisplay, &mut FrameLimit::new(4))
            .unwrap();
        assert_eq!(summary.reason, TerminationReason::StopRequested);
        assert_eq!(summary.frames_read, 4);
        assert_eq!(summary.cycles_counted, 2);
        assert_eq!(summary.last_detection, Some(Detection::default()));
    }

    #[test]
    fn capture_failure_ends_stream() {
        let mut source = FailingSource {
            opens: true,
            frames: vec![flat(10), flat(10)],
        };
        let mut driver = PipelineDriver::new(config(2, 100)).unwrap();
        let summary = driver.run(&mut source, &mut NullDisplay, &mut NeverStop).unwrap();
        assert_eq!(summary.reason, TerminationReason::CaptureFailed);
        assert_eq!(summary.frames_read, 2);
        assert_eq!(summary.cycles_counted, 1);
    }

    #[test]
    fn unavailable_source_is_fatal() {
        let mut source = FailingSource {
            opens: false,
            frames: Vec::new(),
        };
        let mut driver = PipelineDriver::new(config(2, 100)).unwrap();
        let err = driver
            .run(&mut source, &mut NullDisplay, &mut NeverStop)
            .unwrap_err();
        assert!(matches!(err, PipelineError::SourceUnavailable(_)));
    }
}
