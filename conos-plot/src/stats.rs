//! Statistics functions

use ndarray::{stack, Array1, ArrayView1, Axis};
use ndarray_stats::interpolate::Linear;
use ndarray_stats::{CorrelationExt, Quantile1dExt};
use noisy_float::types::{n64, N64};

/// The finite values, in input order.
pub fn finite_values(values: &[f64]) -> Array1<N64> {
    values.iter().copied().filter(|x| x.is_finite()).map(n64).collect()
}

/// Values sorted ascending.
pub fn sorted_values(values: &Array1<N64>) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    sorted.into_iter().map(N64::raw).collect()
}

/// Quantile interpolating linearly between the two closest ranks
/// (`h = (n - 1) * p`). Reorders `values`. None when empty.
pub fn quantile_mut(values: &mut Array1<N64>, p: f64) -> Option<f64> {
    values
        .quantile_mut(n64(p.clamp(0.0, 1.0)), &Linear)
        .ok()
        .map(N64::raw)
}

/// Pearson correlation. None when either side has no variance.
pub fn pearson<'a>(x: ArrayView1<'a, f64>, y: ArrayView1<'a, f64>) -> Option<f64> {
    let pair = stack(Axis(0), &[x, y]).ok()?;
    let r = pair.pearson_correlation().ok()?[[0, 1]];
    r.is_finite().then_some(r)
}

/// Tukey box: quartiles, whiskers at the most extreme values within 1.5 IQR of
/// the box, and everything beyond as outliers.
#[derive(Clone, Debug, PartialEq)]
pub struct BoxStats {
    pub lower_whisker: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub upper_whisker: f64,
    pub outliers: Vec<f64>,
}

impl BoxStats {
    pub fn new(values: &[f64]) -> Option<BoxStats> {
        let mut data = finite_values(values);
        let q1 = quantile_mut(&mut data, 0.25)?;
        let median = quantile_mut(&mut data, 0.5)?;
        let q3 = quantile_mut(&mut data, 0.75)?;
        let sorted = sorted_values(&data);
        let reach = 1.5 * (q3 - q1);
        let (lo_fence, hi_fence) = (q1 - reach, q3 + reach);
        let inside = sorted.iter().copied().filter(|&v| v >= lo_fence && v <= hi_fence);
        let lower_whisker = inside.clone().next().unwrap_or(q1);
        let upper_whisker = inside.last().unwrap_or(q3);
        let outliers = sorted
            .iter()
            .copied()
            .filter(|&v| v < lo_fence || v > hi_fence)
            .collect();
        Some(BoxStats {
            lower_whisker,
            q1,
            median,
            q3,
            upper_whisker,
            outliers,
        })
    }
}

#[cfg(test)]
mod test_stats {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn quantile(values: &[f64], p: f64) -> Option<f64> {
        quantile_mut(&mut finite_values(values), p)
    }

    #[test]
    fn test_quantile_type7() {
        let v = [4.0, 1.0, 3.0, 2.0];
        assert_abs_diff_eq!(quantile(&v, 0.5).unwrap(), 2.5, epsilon = 1e-12);
        assert_abs_diff_eq!(quantile(&v, 0.25).unwrap(), 1.75, epsilon = 1e-12);
        assert_abs_diff_eq!(quantile(&v, 1.0).unwrap(), 4.0, epsilon = 1e-12);
        assert_abs_diff_eq!(quantile(&[7.0], 0.9).unwrap(), 7.0, epsilon = 1e-12);
        assert_eq!(quantile(&[], 0.5), None);
        assert_eq!(quantile(&[1.0, f64::NAN, 3.0], 0.5), Some(2.0));
        assert_eq!(sorted_values(&finite_values(&[3.0, f64::INFINITY, 1.0])), vec![1.0, 3.0]);
    }

    #[test]
    fn test_pearson() {
        let (a, b) = (array![1.0, 2.0, 3.0], array![3.0, 2.0, 1.0]);
        assert_abs_diff_eq!(pearson(a.view(), b.view()).unwrap(), -1.0, epsilon = 1e-12);
        let (flat, c) = (array![1.0, 1.0], array![0.0, 2.0]);
        assert_eq!(pearson(flat.view(), c.view()), None);
    }

    #[test]
    fn test_box_stats() {
        let b = BoxStats::new(&[1.0, 2.0, 3.0, 4.0, 5.0, 100.0]).unwrap();
        assert_abs_diff_eq!(b.median, 3.5, epsilon = 1e-12);
        assert_abs_diff_eq!(b.q1, 2.25, epsilon = 1e-12);
        assert_abs_diff_eq!(b.q3, 4.75, epsilon = 1e-12);
        assert_eq!(b.upper_whisker, 5.0);
        assert_eq!(b.lower_whisker, 1.0);
        assert_eq!(b.outliers, vec![100.0]);
        assert!(BoxStats::new(&[]).is_none());
    }
}
