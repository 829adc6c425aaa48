//! Per-gene scaling of heatmap rows into [0, 1].

use crate::stats::{finite_values, quantile_mut, sorted_values};
use itertools::Itertools;

/// Clipping bounds at the `quantile` and `1 - quantile` of the values.
///
/// When both bounds fall on the same value: with fewer than three distinct values
/// the bounds become min and max. Then, if more values lie below the median than
/// above it, the lower bound moves to the largest value below the median;
/// otherwise the upper bound moves to the smallest value above it, if any.
pub fn winsorize_bounds(values: &[f64], quantile: f64) -> Option<(f64, f64)> {
    let mut finite = finite_values(values);
    let a = quantile_mut(&mut finite, 1.0 - quantile)?;
    let b = quantile_mut(&mut finite, quantile)?;
    let (mut lo, mut hi) = (a.min(b), a.max(b));
    if lo == hi {
        let median = quantile_mut(&mut finite, 0.5)?;
        let sorted = sorted_values(&finite);
        if sorted.iter().dedup().count() < 3 {
            lo = sorted[0];
            hi = sorted[sorted.len() - 1];
        }
        let below = sorted.iter().filter(|&&v| v < median).count();
        let above = sorted.iter().filter(|&&v| v > median).count();
        if below > above {
            if let Some(v) = sorted.iter().rev().find(|&&v| v < median) {
                lo = *v;
            }
        } else if let Some(v) = sorted.iter().find(|&&v| v > median) {
            hi = *v;
        }
    }
    Some((lo, hi))
}

/// Clip to the winsorizing bounds, subtract the minimum and divide by the
/// maximum. A row with no spread left maps to zeros.
pub fn normalize_row(values: &mut [f64], quantile: f64) {
    let Some((lo, hi)) = winsorize_bounds(values, quantile) else {
        return;
    };
    for v in values.iter_mut() {
        *v = if v.is_nan() { lo } else { v.clamp(lo, hi) };
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    for v in values.iter_mut() {
        *v -= min;
    }
    let max = values.iter().copied().fold(0.0, f64::max);
    for v in values.iter_mut() {
        *v = if max > 0.0 { *v / max } else { 0.0 };
    }
}
