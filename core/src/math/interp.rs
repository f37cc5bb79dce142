/// Piecewise-linear interpolation over sorted abscissas with flat
/// extrapolation past either end.
#[derive(Debug, Clone, Copy)]
pub struct LinearInterpolator<'a> {
    xp: &'a [f64],
    fp: &'a [f64],
}

impl<'a> LinearInterpolator<'a> {
    /// `xp` must be sorted ascending, non-empty, and as long as `fp`.
    pub fn new(xp: &'a [f64], fp: &'a [f64]) -> Self {
        debug_assert!(!xp.is_empty());
        debug_assert_eq!(xp.len(), fp.len());
        Self { xp, fp }
    }

    pub fn eval(&self, x: f64) -> f64 {
        if x.is_nan() {
            return f64::NAN;
        }
        let upper = self.xp.partition_point(|&xi| xi <= x);
        if upper == 0 {
            return self.fp[0];
        }
        if upper == self.xp.len() {
            return self.fp[self.fp.len() - 1];
        }
        let lower = upper - 1;
        let (x0, x1) = (self.xp[lower], self.xp[upper]);
        let (f0, f1) = (self.fp[lower], self.fp[upper]);
        if x == x0 {
            return f0;
        }
        let slope = (f1 - f0) / (x1 - x0);
        slope * (x - x0) + f0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpolates_between_two_points() {
        let xp = [0.0, 10.0];
        let fp = [2.0, 4.0];
        let interp = LinearInterpolator::new(&xp, &fp);
        assert_eq!(interp.eval(5.0), 3.0);
        assert_eq!(interp.eval(2.5), 2.5);
    }

    #[test]
    fn clamps_outside_range() {
        let xp = [1.0, 2.0, 4.0];
        let fp = [1.0, 0.5, 0.0];
        let interp = LinearInterpolator::new(&xp, &fp);
        assert_eq!(interp.eval(-3.0), 1.0);
        assert_eq!(interp.eval(100.0), 0.0);
        assert_eq!(interp.eval(4.0), 0.0);
    }

    #[test]
    fn single_point_is_constant() {
        let xp = [3.0];
        let fp = [0.7];
        let interp = LinearInterpolator::new(&xp, &fp);
        assert_eq!(interp.eval(0.0), 0.7);
        assert_eq!(interp.eval(9.0), 0.7);
    }

    #[test]
    fn nan_propagates() {
        let xp = [0.0, 1.0];
        let fp = [0.0, 1.0];
        assert!(LinearInterpolator::new(&xp, &fp).eval(f64::NAN).is_nan());
    }
}
