//! Fixed-scale Gaussian gradient magnitude.
//!
//! Each axis is filtered with the first derivative of a sampled Gaussian
//! while the other axis is smoothed with the Gaussian itself. Borders are
//! handled by mirror reflection including the edge sample.

use crate::math::stats::StatsHelper;
use crate::prelude::{
    GgmError, GgmResult, Image, ProcessingStage, StageInput, StageMetadata, StageOutput,
};
use crate::telemetry::log::LogManager;
use ndarray::{ArrayView2, Axis, Zip};

const TRUNCATE: f64 = 4.0;

struct GaussianKernels {
    smooth: Vec<f64>,
    derivative: Vec<f64>,
}

impl GaussianKernels {
    fn new(sigma: f64) -> Self {
        let radius = (TRUNCATE * sigma + 0.5) as i64;
        let variance = sigma * sigma;
        let mut smooth: Vec<f64> = (-radius..=radius)
            .map(|x| (-0.5 * (x * x) as f64 / variance).exp())
            .collect();
        let total: f64 = smooth.iter().sum();
        smooth.iter_mut().for_each(|w| *w /= total);
        let derivative = (-radius..=radius)
            .zip(&smooth)
            .map(|(x, w)| -(x as f64) / variance * w)
            .collect();
        Self { smooth, derivative }
    }
}

/// Mirror an out-of-range index back into `0..len` (`d c b a | a b c d`).
fn reflect(index: i64, len: usize) -> usize {
    let len = len as i64;
    let period = 2 * len;
    let wrapped = index.rem_euclid(period);
    if wrapped < len {
        wrapped as usize
    } else {
        (period - 1 - wrapped) as usize
    }
}

/// Convolve every lane along `axis` with an odd-length `kernel`.
fn convolve_axis(input: ArrayView2<f64>, kernel: &[f64], axis: Axis) -> Image {
    let radius = (kernel.len() / 2) as i64;
    let mut output = Image::zeros(input.dim());
    Zip::from(output.lanes_mut(axis))
        .and(input.lanes(axis))
        .for_each(|mut out, lane| {
            let len = lane.len();
            for (i, value) in out.iter_mut().enumerate() {
                let mut acc = 0.0;
                for (k, weight) in kernel.iter().enumerate() {
                    let offset = k as i64 - radius;
                    acc += weight * lane[reflect(i as i64 - offset, len)];
                }
                *value = acc;
            }
        });
    output
}

pub fn gaussian_gradient_magnitude(image: &Image, sigma: f64) -> GgmResult<Image> {
    if !sigma.is_finite() || sigma <= 0.0 {
        return Err(GgmError::InvalidInput(format!(
            "gaussian sigma must be positive, got {}",
            sigma
        )));
    }
    if image.is_empty() {
        return Err(GgmError::InvalidInput("empty image".into()));
    }
    let kernels = GaussianKernels::new(sigma);

    let d_rows = convolve_axis(image.view(), &kernels.derivative, Axis(0));
    let d_rows = convolve_axis(d_rows.view(), &kernels.smooth, Axis(1));
    let d_cols = convolve_axis(image.view(), &kernels.smooth, Axis(0));
    let d_cols = convolve_axis(d_cols.view(), &kernels.derivative, Axis(1));

    Ok(Zip::from(&d_rows)
        .and(&d_cols)
        .map_collect(|&gy, &gx| (gy * gy + gx * gx).sqrt()))
}

pub struct GaussianGradientStage {
    sigma: f64,
    logger: LogManager,
}

impl GaussianGradientStage {
    pub fn new(sigma: f64) -> Self {
        Self {
            sigma,
            logger: LogManager::new("gaussian"),
        }
    }
}

impl ProcessingStage for GaussianGradientStage {
    fn name(&self) -> &'static str {
        "gaussian-gradient"
    }

    fn execute(&mut self, input: StageInput) -> GgmResult<StageOutput> {
        let image = gaussian_gradient_magnitude(&input.image, self.sigma)?;
        let non_finite = StatsHelper::count_non_finite(image.view());
        self.logger
            .record(&format!("sigma {} px, {} non-finite", self.sigma, non_finite));

        Ok(StageOutput {
            image,
            header: input.header,
            metadata: StageMetadata {
                non_finite,
                notes: vec![format!("sigma {}", self.sigma)],
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    #[test]
    fn kernels_are_normalised_and_antisymmetric() {
        let kernels = GaussianKernels::new(1.5);
        assert_eq!(kernels.smooth.len(), 13);
        assert_relative_eq!(kernels.smooth.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(kernels.derivative.iter().sum::<f64>(), 0.0, epsilon = 1e-12);
        assert!(kernels.derivative[0] > 0.0);
    }

    #[test]
    fn reflection_repeats_edge_sample() {
        assert_eq!(reflect(-1, 4), 0);
        assert_eq!(reflect(-2, 4), 1);
        assert_eq!(reflect(4, 4), 3);
        assert_eq!(reflect(5, 4), 2);
        assert_eq!(reflect(9, 4), 1);
    }

    #[test]
    fn constant_image_has_no_gradient() {
        let image = Array2::from_elem((12, 10), 7.0);
        let grad = gaussian_gradient_magnitude(&image, 1.0).unwrap();
        assert!(grad.iter().all(|&v| v.abs() < 1e-12));
    }

    #[test]
    fn ramp_interior_follows_slope() {
        let slope = 0.5;
        let image = Array2::from_shape_fn((40, 40), |(_, x)| slope * x as f64);
        let grad = gaussian_gradient_magnitude(&image, 2.0).unwrap();
        for y in 10..30 {
            for x in 10..30 {
                assert_relative_eq!(grad[[y, x]], slope, max_relative = 2e-3);
            }
        }
    }

    #[test]
    fn sigma_must_be_positive() {
        let image = Array2::from_elem((4, 4), 1.0);
        assert!(gaussian_gradient_magnitude(&image, 0.0).is_err());
        assert!(gaussian_gradient_magnitude(&image, f64::NAN).is_err());
    }
}
