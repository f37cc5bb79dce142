use crate::curve::WeightCurve;
use crate::math::stats::StatsHelper;
use crate::prelude::{GgmError, GgmResult, Image};
use crate::telemetry::log::LogManager;
use log::debug;
use ndarray::Zip;

/// One image's contribution to a combination.
#[derive(Debug, Clone, Copy)]
pub struct CombineInput<'a> {
    pub image: &'a Image,
    pub curve: &'a WeightCurve,
    /// Multiplies the curve; values `<= 0` leave the image out.
    pub scale: f64,
}

impl CombineInput<'_> {
    pub fn enabled(&self) -> bool {
        self.scale > 0.0
    }
}

/// Radially weighted sum of registered images sharing one radial field.
pub struct Combiner {
    radial: Image,
    logger: LogManager,
}

impl Combiner {
    pub fn new(radial: Image) -> Self {
        Self {
            radial,
            logger: LogManager::new("combine"),
        }
    }

    pub fn radial(&self) -> &Image {
        &self.radial
    }

    pub fn shape(&self) -> (usize, usize) {
        self.radial.dim()
    }

    fn validate(&self, inputs: &[CombineInput<'_>]) -> GgmResult<()> {
        let expected = self.shape();
        for (index, input) in inputs.iter().enumerate() {
            let found = input.image.dim();
            if found != expected {
                return Err(GgmError::ShapeMismatch {
                    index,
                    expected,
                    found,
                });
            }
        }
        if !inputs.iter().any(|input| input.enabled()) {
            return Err(GgmError::InvalidCombination(
                "no image has a positive scale".into(),
            ));
        }
        Ok(())
    }

    /// Accumulated weighted sum before normalisation.
    pub fn combine_raw(&self, inputs: &[CombineInput<'_>]) -> GgmResult<Image> {
        self.validate(inputs)?;

        let mut out = Image::zeros(self.shape());
        for (index, input) in inputs.iter().enumerate() {
            if !input.enabled() {
                debug!("image {} disabled (scale {})", index, input.scale);
                continue;
            }
            debug!(
                "image {}: radii {:?} weights {:?} scale {}",
                index,
                input.curve.radii(),
                input.curve.weights(),
                input.scale
            );
            let weights = input.curve.evaluate_field(&self.radial, input.scale);
            Zip::from(&mut out)
                .and(&weights)
                .and(input.image)
                .for_each(|acc, &w, &v| *acc += w * v);
        }
        Ok(out)
    }

    /// Weighted sum divided by its largest finite value. Non-finite cells
    /// stay non-finite.
    pub fn combine(&self, inputs: &[CombineInput<'_>]) -> GgmResult<Image> {
        let out = self.combine_raw(inputs)?;
        let max = StatsHelper::finite_max(out.view()).ok_or_else(|| {
            GgmError::InvalidCombination("combined image has no finite values".into())
        })?;
        if max == 0.0 {
            return Err(GgmError::InvalidCombination(
                "combined image has a zero maximum".into(),
            ));
        }

        let enabled = inputs.iter().filter(|input| input.enabled()).count();
        self.logger.record(&format!(
            "{} of {} images combined, peak {:.6e}",
            enabled,
            inputs.len(),
            max
        ));
        Ok(out / max)
    }
}
