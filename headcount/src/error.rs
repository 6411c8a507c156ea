// THEORY:
// Every failure the engine can report lives here. Startup problems (a source that
// will not open, a config that does not parse) are fatal and surface as distinct
// variants so the binaries can print them and exit. A source running dry is not an
// error at all; it is `Ok(None)` from the source and ends the loop cleanly.

/// Errors raised by the counting pipeline and its collaborators.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The video source could not be opened at startup.
    #[error("video source unavailable: {0}")]
    SourceUnavailable(String),
    /// A frame arrived with dimensions that differ from the frames already in the window.
    #[error("frame dimensions {found:?} do not match window dimensions {expected:?}")]
    DimensionMismatch {
        expected: (u32, u32),
        found: (u32, u32),
    },
    /// Statistics were requested before the window reached capacity.
    #[error("window holds {len} of {capacity} frames; classification needs a full window")]
    WindowNotFull { len: usize, capacity: usize },
    /// The driver has already stopped and accepts no further frames.
    #[error("pipeline has terminated")]
    Terminated,
    #[error(transparent)]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("failed to build classification thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}
