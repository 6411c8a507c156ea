// THEORY:
// This file is the main entry point for the `headcount` library crate.
// It exposes the `PipelineDriver` and its associated data structures
// (`PipelineConfig`, `Report`, `RunSummary`, etc.) as the high-level interface of the
// counting engine. The building blocks in `core_modules` stay public so a caller can
// run a single stage on its own, but the driver is the intended way in.
//
// Frame acquisition and display are traits in `io`; the library ships file-based
// implementations and leaves cameras and windows to the binaries.

pub mod annotate;
pub mod config;
pub mod core_modules;
pub mod error;
pub mod io;
pub mod pipeline;

pub use config::PipelineConfig;
pub use error::{ConfigError, PipelineError};
pub use pipeline::{
    BoundingBox, Detection, PipelineDriver, PipelinePhase, Region, Report, RunSummary,
    TerminationReason,
};
