//! Radius-dependent weighting curves and their editor mapping.

pub mod display;

pub use display::{DisplayPoint, DisplayTransform, DISPLAY_HEIGHT, DISPLAY_WIDTH};

use crate::math::interp::LinearInterpolator;
use crate::prelude::{GgmError, GgmResult, Image};

/// Immutable control-point snapshot emitted by the curve editor.
#[derive(Debug, Clone, PartialEq)]
pub struct CurveSnapshot {
    pub radii: Vec<f64>,
    pub weights: Vec<f64>,
}

/// Densely sampled curve for drawing.
#[derive(Debug, Clone, PartialEq)]
pub struct CurveSamples {
    pub radii: Vec<f64>,
    pub weights: Vec<f64>,
}

/// Piecewise-linear weight as a function of radius.
///
/// Control points are kept sorted by radius; evaluation outside the
/// control range returns the nearest end weight.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightCurve {
    radii: Vec<f64>,
    weights: Vec<f64>,
}

impl WeightCurve {
    pub fn new(radii: Vec<f64>, weights: Vec<f64>) -> GgmResult<Self> {
        if radii.is_empty() {
            return Err(GgmError::InvalidCurve("no control points".into()));
        }
        if radii.len() != weights.len() {
            return Err(GgmError::InvalidCurve(format!(
                "{} radii but {} weights",
                radii.len(),
                weights.len()
            )));
        }
        if let Some(r) = radii.iter().find(|r| !r.is_finite() || **r < 0.0) {
            return Err(GgmError::InvalidCurve(format!("bad radius {}", r)));
        }
        if let Some(w) = weights.iter().find(|w| !w.is_finite()) {
            return Err(GgmError::InvalidCurve(format!("bad weight {}", w)));
        }

        let mut points: Vec<(f64, f64)> = radii.into_iter().zip(weights).collect();
        points.sort_by(|a, b| a.0.total_cmp(&b.0));
        let (radii, weights) = points.into_iter().unzip();
        Ok(Self { radii, weights })
    }

    pub fn from_snapshot(snapshot: CurveSnapshot) -> GgmResult<Self> {
        Self::new(snapshot.radii, snapshot.weights)
    }

    pub fn radii(&self) -> &[f64] {
        &self.radii
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn len(&self) -> usize {
        self.radii.len()
    }

    pub fn is_empty(&self) -> bool {
        self.radii.is_empty()
    }

    pub fn max_radius(&self) -> f64 {
        self.radii[self.radii.len() - 1]
    }

    pub fn max_weight(&self) -> f64 {
        self.weights.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn snapshot(&self) -> CurveSnapshot {
        CurveSnapshot {
            radii: self.radii.clone(),
            weights: self.weights.clone(),
        }
    }

    pub fn evaluate(&self, radius: f64) -> f64 {
        LinearInterpolator::new(&self.radii, &self.weights).eval(radius)
    }

    /// Weight at every radius of `radial`, with the control weights
    /// multiplied by `scale` before interpolation.
    pub fn evaluate_field(&self, radial: &Image, scale: f64) -> Image {
        let scaled: Vec<f64> = self.weights.iter().map(|w| w * scale).collect();
        let interp = LinearInterpolator::new(&self.radii, &scaled);
        radial.mapv(|r| interp.eval(r))
    }

    /// Display positions of the control points.
    pub fn display_points(&self, transform: &DisplayTransform) -> Vec<DisplayPoint> {
        self.radii
            .iter()
            .zip(&self.weights)
            .map(|(&r, &w)| transform.to_display(r, w))
            .collect()
    }

    /// Snapshot with control point `marker` dragged to `point`.
    pub fn moved_point(
        &self,
        marker: usize,
        point: DisplayPoint,
        transform: &DisplayTransform,
    ) -> GgmResult<CurveSnapshot> {
        if marker >= self.len() {
            return Err(GgmError::InvalidCurve(format!(
                "marker {} of {} control points",
                marker,
                self.len()
            )));
        }
        let (radius, weight) = transform.to_curve(point);
        let mut snapshot = self.snapshot();
        snapshot.radii[marker] = radius;
        snapshot.weights[marker] = weight;
        Ok(snapshot)
    }

    /// The curve at `samples` radii spaced as `(i / samples)^2 * max_radius`,
    /// which is uniform along the editor's square-root axis.
    pub fn sample_display(&self, transform: &DisplayTransform, samples: usize) -> CurveSamples {
        let interp = LinearInterpolator::new(&self.radii, &self.weights);
        let radii: Vec<f64> = (0..samples)
            .map(|i| {
                let t = i as f64 / samples as f64;
                t * t * transform.max_radius
            })
            .collect();
        let weights = radii.iter().map(|&r| interp.eval(r)).collect();
        CurveSamples { radii, weights }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn two_point(w0: f64, w1: f64, r: f64) -> WeightCurve {
        WeightCurve::new(vec![0.0, r], vec![w0, w1]).unwrap()
    }

    #[test]
    fn two_point_curve_interpolates_linearly() {
        let curve = two_point(1.0, 0.2, 50.0);
        for r in [0.0, 10.0, 25.0, 49.0, 50.0] {
            assert_relative_eq!(curve.evaluate(r), 1.0 + (0.2 - 1.0) * r / 50.0, epsilon = 1e-12);
        }
        assert_eq!(curve.evaluate(75.0), 0.2);
        assert_eq!(curve.evaluate(-5.0), 1.0);
    }

    #[test]
    fn out_of_order_points_are_sorted() {
        let curve = WeightCurve::new(vec![30.0, 0.0, 10.0], vec![0.0, 1.0, 0.5]).unwrap();
        assert_eq!(curve.radii(), &[0.0, 10.0, 30.0]);
        assert_eq!(curve.weights(), &[1.0, 0.5, 0.0]);
        assert_relative_eq!(curve.evaluate(20.0), 0.25, epsilon = 1e-12);
    }

    #[test]
    fn invalid_control_points_are_rejected() {
        assert!(WeightCurve::new(vec![], vec![]).is_err());
        assert!(WeightCurve::new(vec![0.0, 1.0], vec![1.0]).is_err());
        assert!(WeightCurve::new(vec![-1.0, 1.0], vec![1.0, 1.0]).is_err());
        assert!(WeightCurve::new(vec![0.0, 1.0], vec![f64::NAN, 1.0]).is_err());
    }

    #[test]
    fn field_evaluation_scales_weights() {
        let curve = two_point(1.0, 0.0, 10.0);
        let radial = array![[0.0, 5.0], [10.0, 20.0]];
        let field = curve.evaluate_field(&radial, -2.0);
        let expected = array![[-2.0, -1.0], [0.0, 0.0]];
        for (got, want) in field.iter().zip(expected.iter()) {
            assert_relative_eq!(*got, *want, epsilon = 1e-12);
        }
    }

    #[test]
    fn dragging_marker_inverts_display_transform() {
        let curve = WeightCurve::new(vec![0.0, 100.0, 400.0], vec![1.0, 0.5, 0.0]).unwrap();
        let transform = DisplayTransform::new(curve.max_radius(), curve.max_weight());
        let snapshot = curve
            .moved_point(1, DisplayPoint { x: 100.0, y: 20.0 }, &transform)
            .unwrap();
        assert_eq!(snapshot.radii, vec![0.0, 25.0, 400.0]);
        assert_eq!(snapshot.weights, vec![1.0, 0.75, 0.0]);
        assert!(curve
            .moved_point(3, DisplayPoint { x: 0.0, y: 0.0 }, &transform)
            .is_err());
    }

    #[test]
    fn display_samples_use_squared_spacing() {
        let curve = two_point(1.0, 0.0, 100.0);
        let transform = DisplayTransform::new(100.0, 1.0);
        let samples = curve.sample_display(&transform, 4);
        assert_eq!(samples.radii, vec![0.0, 6.25, 25.0, 56.25]);
        assert_relative_eq!(samples.weights[2], 0.75, epsilon = 1e-12);
    }
}
