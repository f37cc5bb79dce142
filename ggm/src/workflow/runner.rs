use crate::workflow::config::AdaptiveConfig;
use anyhow::Context;
use ggmcore::io::{read_image, write_image};
use ggmcore::prelude::{ProcessingStage, StageInput, StageOutput};
use ggmcore::processing::{
    read_regions, GaussianGradientStage, GradientStage, PhysicalTransform, RegionHider,
};
use ggmcore::smoothing::AccumulateCounts;
use log::info;
use std::path::Path;

#[derive(Debug)]
pub struct WorkflowResult {
    pub shape: (usize, usize),
    pub non_finite: usize,
    pub notes: Vec<String>,
}

impl From<&StageOutput> for WorkflowResult {
    fn from(output: &StageOutput) -> Self {
        Self {
            shape: output.image.dim(),
            non_finite: output.metadata.non_finite,
            notes: output.metadata.notes.clone(),
        }
    }
}

#[derive(Clone)]
pub struct Runner {
    config: AdaptiveConfig,
}

impl Runner {
    pub fn new(config: AdaptiveConfig) -> Self {
        Self { config }
    }

    /// Scale map, adaptive smoothing, then the gradient of the smoothed
    /// image written with the header of the smoothed input.
    pub fn execute(&self) -> anyhow::Result<WorkflowResult> {
        let cfg = &self.config;
        let tool = AccumulateCounts::new(cfg.contbin_dir.as_deref(), cfg.threads, cfg.mask.clone());

        info!("calculating scale map");
        tool.build_scale_map(&cfg.counts, cfg.sn, &cfg.scale)
            .context("building scale map")?;

        info!("smoothing input image");
        let input_path = cfg.smoothing_input();
        tool.apply_smoothing(input_path, &cfg.scale, &cfg.smimage)
            .context("smoothing input image")?;

        info!("calculating gradient");
        let smoothed = read_image(&cfg.smimage)
            .with_context(|| format!("reading smoothed image {}", cfg.smimage.display()))?;
        let input = read_image(input_path)
            .with_context(|| format!("reading header of {}", input_path.display()))?;

        let mut stage = GradientStage::new(cfg.gradient_options());
        let output = stage
            .execute(StageInput::with_header(smoothed.data, input.header))
            .context("executing gradient stage")?;

        info!("writing gradient image {}", cfg.output.display());
        write_image(&cfg.output, &output.image, output.header.as_ref())
            .with_context(|| format!("writing gradient image {}", cfg.output.display()))?;
        Ok(WorkflowResult::from(&output))
    }
}

/// Fixed-scale Gaussian gradient magnitude of `input` written to `output`.
pub fn run_gaussian(input: &Path, output: &Path, sigma: f64) -> anyhow::Result<WorkflowResult> {
    let image =
        read_image(input).with_context(|| format!("reading input image {}", input.display()))?;
    let mut stage = GaussianGradientStage::new(sigma);
    let result = stage
        .execute(StageInput::with_header(image.data, image.header))
        .context("executing gaussian gradient stage")?;
    write_image(output, &result.image, result.header.as_ref())
        .with_context(|| format!("writing gradient image {}", output.display()))?;
    Ok(WorkflowResult::from(&result))
}

/// Refill every region listed in `regions` with pixels drawn from around it.
pub fn run_hide_regions(
    input: &Path,
    regions: &Path,
    output: &Path,
    seed: Option<u64>,
) -> anyhow::Result<WorkflowResult> {
    let image =
        read_image(input).with_context(|| format!("reading input image {}", input.display()))?;
    let transform = PhysicalTransform::read(input)
        .with_context(|| format!("reading physical axes of {}", input.display()))?;
    let shapes =
        read_regions(regions).with_context(|| format!("reading regions {}", regions.display()))?;

    let mut stage = RegionHider::new(shapes, transform, seed);
    info!("hiding {} regions", stage.regions().len());
    let result = stage
        .execute(StageInput::with_header(image.data, image.header))
        .context("hiding regions")?;
    write_image(output, &result.image, result.header.as_ref())
        .with_context(|| format!("writing image {}", output.display()))?;
    Ok(WorkflowResult::from(&result))
}
