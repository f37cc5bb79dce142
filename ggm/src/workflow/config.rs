use anyhow::Context;
use ggmcore::processing::GradientOptions;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_SN: f64 = 32.0;
pub const DEFAULT_THREADS: usize = 4;
pub const DEFAULT_SCALE_MAP: &str = "scale.fits";
pub const DEFAULT_SMOOTHED: &str = "smoothed.fits";

/// Adaptive pipeline settings; unset fields fall through to the next
/// source and finally to the built-in defaults.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PipelineSettings {
    pub sn: Option<f64>,
    pub log: Option<bool>,
    pub mask: Option<PathBuf>,
    pub scale: Option<PathBuf>,
    pub smimage: Option<PathBuf>,
    pub threads: Option<usize>,
    pub contbin_dir: Option<PathBuf>,
    pub allow_nonpositive: Option<bool>,
}

impl PipelineSettings {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading pipeline settings {}", path_ref.display()))?;
        let settings: PipelineSettings = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing pipeline settings {}", path_ref.display()))?;
        Ok(settings)
    }

    /// Fields set here win; the rest come from `fallback`.
    pub fn merge(self, fallback: PipelineSettings) -> Self {
        Self {
            sn: self.sn.or(fallback.sn),
            log: self.log.or(fallback.log),
            mask: self.mask.or(fallback.mask),
            scale: self.scale.or(fallback.scale),
            smimage: self.smimage.or(fallback.smimage),
            threads: self.threads.or(fallback.threads),
            contbin_dir: self.contbin_dir.or(fallback.contbin_dir),
            allow_nonpositive: self.allow_nonpositive.or(fallback.allow_nonpositive),
        }
    }

    pub fn resolve(
        self,
        counts: PathBuf,
        image: Option<PathBuf>,
        output: PathBuf,
    ) -> AdaptiveConfig {
        AdaptiveConfig {
            counts,
            image,
            output,
            sn: self.sn.unwrap_or(DEFAULT_SN),
            log: self.log.unwrap_or(true),
            mask: self.mask,
            scale: self.scale.unwrap_or_else(|| PathBuf::from(DEFAULT_SCALE_MAP)),
            smimage: self.smimage.unwrap_or_else(|| PathBuf::from(DEFAULT_SMOOTHED)),
            threads: self.threads.unwrap_or(DEFAULT_THREADS),
            contbin_dir: self.contbin_dir,
            allow_nonpositive: self.allow_nonpositive.unwrap_or(false),
        }
    }
}

/// Fully resolved inputs of one adaptive gradient run.
#[derive(Clone, Debug, PartialEq)]
pub struct AdaptiveConfig {
    pub counts: PathBuf,
    pub image: Option<PathBuf>,
    pub output: PathBuf,
    pub sn: f64,
    pub log: bool,
    pub mask: Option<PathBuf>,
    pub scale: PathBuf,
    pub smimage: PathBuf,
    pub threads: usize,
    pub contbin_dir: Option<PathBuf>,
    pub allow_nonpositive: bool,
}

impl AdaptiveConfig {
    /// The image that gets smoothed: `image` when given, else the counts.
    pub fn smoothing_input(&self) -> &Path {
        self.image.as_deref().unwrap_or(&self.counts)
    }

    pub fn gradient_options(&self) -> GradientOptions {
        GradientOptions {
            log: self.log,
            allow_non_positive: self.allow_nonpositive,
        }
    }
}
