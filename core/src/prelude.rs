use crate::io::ImageHeader;
use ndarray::Array2;
use std::path::PathBuf;
use std::process::ExitStatus;

/// Two-dimensional image grid, row-major, `[y, x]` indexing.
pub type Image = Array2<f64>;

/// Input payload for an image-to-image processing stage.
#[derive(Debug, Clone)]
pub struct StageInput {
    pub image: Image,
    pub header: Option<ImageHeader>,
}

impl StageInput {
    pub fn new(image: Image) -> Self {
        Self {
            image,
            header: None,
        }
    }

    pub fn with_header(image: Image, header: ImageHeader) -> Self {
        Self {
            image,
            header: Some(header),
        }
    }
}

/// Output produced by each stage.
#[derive(Debug, Clone)]
pub struct StageOutput {
    pub image: Image,
    pub header: Option<ImageHeader>,
    pub metadata: StageMetadata,
}

/// Metadata used for chaining stages and telemetry.
#[derive(Debug, Clone, Default)]
pub struct StageMetadata {
    pub non_finite: usize,
    pub notes: Vec<String>,
}

/// Error taxonomy shared by the pipeline and the combiner.
#[derive(thiserror::Error, Debug)]
pub enum GgmError {
    #[error("external tool {program} failed with {status}")]
    ExternalToolFailure {
        program: PathBuf,
        status: ExitStatus,
    },
    #[error("could not launch external tool {program}: {source}")]
    ExternalToolLaunch {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("image {index} has shape {found:?}, expected {expected:?}")]
    ShapeMismatch {
        index: usize,
        expected: (usize, usize),
        found: (usize, usize),
    },
    #[error("invalid combination: {0}")]
    InvalidCombination(String),
    #[error("log gradient requested on {count} non-positive samples")]
    NonPositiveLogInput { count: usize },
    #[error("invalid weight curve: {0}")]
    InvalidCurve(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),
    #[error("cannot interpret region {0:?}")]
    InvalidRegion(String),
    #[error("image index {index} out of range ({len} images)")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("FITS error: {0}")]
    Fits(#[from] fitsio::errors::Error),
    #[error("parameter file error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type GgmResult<T> = Result<T, GgmError>;

/// Image-to-image processing stage (gradient estimators).
pub trait ProcessingStage {
    fn name(&self) -> &'static str;
    fn execute(&mut self, input: StageInput) -> GgmResult<StageOutput>;
}
