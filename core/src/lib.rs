//! Core of the gradient-magnitude and radial-combination tools.
//!
//! The library covers the numerical pipeline (gradient estimators, radial
//! fields, weight curves, the combiner) and the thin glue around it: FITS
//! I/O, parameter persistence, the external smoothing program, the image
//! viewer bridge and the interactive combination session.

pub mod curve;
pub mod io;
pub mod math;
pub mod params;
pub mod prelude;
pub mod processing;
pub mod session;
pub mod smoothing;
pub mod telemetry;
pub mod viewer;

pub use prelude::{GgmError, GgmResult, Image, ProcessingStage, StageInput, StageOutput};
