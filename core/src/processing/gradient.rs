use crate::math::stats::StatsHelper;
use crate::prelude::{
    GgmError, GgmResult, Image, ProcessingStage, StageInput, StageMetadata, StageOutput,
};
use crate::telemetry::log::LogManager;
use ndarray::{s, Zip};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GradientOptions {
    /// Take the base-10 logarithm before differencing.
    pub log: bool,
    /// Proceed with a warning instead of failing when `log` meets samples <= 0.
    pub allow_non_positive: bool,
}

impl Default for GradientOptions {
    fn default() -> Self {
        Self {
            log: true,
            allow_non_positive: false,
        }
    }
}

/// Gradient magnitude from forward differences averaged onto pixel
/// centres. The outermost row of the y component and the outermost column
/// of the x component are zero.
pub fn gradient_magnitude(image: &Image, options: &GradientOptions) -> GgmResult<Image> {
    let (height, width) = image.dim();
    if height < 2 || width < 2 {
        return Err(GgmError::InvalidInput(format!(
            "gradient needs at least a 2x2 image, got {}x{}",
            width, height
        )));
    }

    let logged;
    let source = if options.log {
        let count = StatsHelper::count_non_positive(image.view());
        if count > 0 {
            if !options.allow_non_positive {
                return Err(GgmError::NonPositiveLogInput { count });
            }
            log::warn!(
                "{} non-positive samples will give non-finite log gradients",
                count
            );
        }
        logged = image.mapv(f64::log10);
        &logged
    } else {
        image
    };

    let gy = &source.slice(s![1.., ..]) - &source.slice(s![..-1, ..]);
    let gx = &source.slice(s![.., 1..]) - &source.slice(s![.., ..-1]);
    let gyc = (&gy.slice(s![1.., ..]) + &gy.slice(s![..-1, ..])) * 0.5;
    let gxc = (&gx.slice(s![.., 1..]) + &gx.slice(s![.., ..-1])) * 0.5;

    let mut gy_full = Image::zeros((height, width));
    gy_full.slice_mut(s![1..height - 1, ..]).assign(&gyc);
    let mut gx_full = Image::zeros((height, width));
    gx_full.slice_mut(s![.., 1..width - 1]).assign(&gxc);

    Ok(Zip::from(&gx_full)
        .and(&gy_full)
        .map_collect(|&gx, &gy| (gx * gx + gy * gy).sqrt()))
}

/// Final stage of the adaptive pipeline.
pub struct GradientStage {
    options: GradientOptions,
    logger: LogManager,
}

impl GradientStage {
    pub fn new(options: GradientOptions) -> Self {
        Self {
            options,
            logger: LogManager::new("gradient"),
        }
    }
}

impl ProcessingStage for GradientStage {
    fn name(&self) -> &'static str {
        "gradient"
    }

    fn execute(&mut self, input: StageInput) -> GgmResult<StageOutput> {
        let image = gradient_magnitude(&input.image, &self.options)?;
        let non_finite = StatsHelper::count_non_finite(image.view());
        let (height, width) = image.dim();
        self.logger.record(&format!(
            "{}x{} gradient (log={}), {} non-finite",
            width, height, self.options.log, non_finite
        ));

        Ok(StageOutput {
            image,
            header: input.header,
            metadata: StageMetadata {
                non_finite,
                notes: vec![format!("log {}", self.options.log)],
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    const LINEAR: GradientOptions = GradientOptions {
        log: false,
        allow_non_positive: false,
    };

    #[test]
    fn constant_image_has_zero_gradient() {
        let image = Array2::from_elem((6, 7), 42.0);
        let grad = gradient_magnitude(&image, &LINEAR).unwrap();
        assert_eq!(grad.dim(), (6, 7));
        assert!(grad.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn linear_ramp_interior_matches_slope() {
        let (a, b) = (2.0, 3.0);
        let image = Array2::from_shape_fn((8, 9), |(y, x)| a * x as f64 + b * y as f64);
        let grad = gradient_magnitude(&image, &LINEAR).unwrap();
        let expected = (a * a + b * b).sqrt();
        for y in 1..7 {
            for x in 1..8 {
                assert_eq!(grad[[y, x]], expected);
            }
        }
    }

    #[test]
    fn ramp_borders_keep_only_the_unpadded_component() {
        let (a, b) = (2.0, 3.0);
        let image = Array2::from_shape_fn((5, 6), |(y, x)| a * x as f64 + b * y as f64);
        let grad = gradient_magnitude(&image, &LINEAR).unwrap();
        for x in 1..5 {
            assert_eq!(grad[[0, x]], a);
            assert_eq!(grad[[4, x]], a);
        }
        for y in 1..4 {
            assert_eq!(grad[[y, 0]], b);
            assert_eq!(grad[[y, 5]], b);
        }
        assert_eq!(grad[[0, 0]], 0.0);
        assert_eq!(grad[[4, 5]], 0.0);
    }

    #[test]
    fn log_gradient_of_exponential_rows_is_constant() {
        let a = 0.25;
        let image = Array2::from_shape_fn((5, 10), |(_, x)| 10f64.powf(a * x as f64));
        let options = GradientOptions {
            log: true,
            allow_non_positive: false,
        };
        let grad = gradient_magnitude(&image, &options).unwrap();
        for y in 0..5 {
            for x in 1..9 {
                assert_relative_eq!(grad[[y, x]], a, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn log_of_non_positive_samples_is_reported() {
        let mut image = Array2::from_elem((4, 4), 5.0);
        image[[1, 2]] = 0.0;
        image[[3, 3]] = -2.0;
        let err = gradient_magnitude(&image, &GradientOptions::default()).unwrap_err();
        assert!(matches!(err, GgmError::NonPositiveLogInput { count: 2 }));

        let lenient = GradientOptions {
            log: true,
            allow_non_positive: true,
        };
        let grad = gradient_magnitude(&image, &lenient).unwrap();
        assert!(grad.iter().any(|v| !v.is_finite()));
    }

    #[test]
    fn tiny_images_are_rejected() {
        let image = Array2::from_elem((1, 5), 1.0);
        assert!(matches!(
            gradient_magnitude(&image, &LINEAR),
            Err(GgmError::InvalidInput(_))
        ));
    }

    #[test]
    fn two_by_two_image_is_all_padding() {
        let image = Array2::from_shape_vec((2, 2), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let grad = gradient_magnitude(&image, &LINEAR).unwrap();
        assert!(grad.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn stage_passes_header_through() {
        let mut stage = GradientStage::new(LINEAR);
        let header = crate::io::ImageHeader {
            object: Some("cluster".into()),
            ..Default::default()
        };
        let input = StageInput::with_header(Array2::from_elem((3, 3), 1.0), header.clone());
        let output = stage.execute(input).unwrap();
        assert_eq!(output.header, Some(header));
        assert_eq!(output.metadata.non_finite, 0);
    }
}
