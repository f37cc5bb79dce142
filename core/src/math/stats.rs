use ndarray::ArrayView2;

pub struct StatsHelper;

impl StatsHelper {
    /// Largest finite value, ignoring NaN and infinities.
    pub fn finite_max(values: ArrayView2<f64>) -> Option<f64> {
        values
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(None, |acc, v| match acc {
                Some(max) if max >= v => Some(max),
                _ => Some(v),
            })
    }

    pub fn count_non_finite(values: ArrayView2<f64>) -> usize {
        values.iter().filter(|v| !v.is_finite()).count()
    }

    /// Samples that would not survive a base-10 logarithm.
    pub fn count_non_positive(values: ArrayView2<f64>) -> usize {
        values.iter().filter(|&&v| v <= 0.0).count()
    }
}
