use statrs::function::erf::erfc;
use std::cmp::Ordering;

/// Benjamini-Hochberg adjusted p-values, returned in input order. NaN p-values stay NaN.
pub fn adjusted_pvalue_bh(pvalues: &[f64]) -> Vec<f64> {
    // descending p-values with their original position; NaNs are not ranked
    let mut arr = pvalues
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, p)| !p.is_nan())
        .collect::<Vec<_>>();
    arr.sort_by(|&(_, a), &(_, b)| b.partial_cmp(&a).unwrap_or(Ordering::Equal));

    // q = min(1, cummin(n / rank * p)) walking from the largest p-value down
    let len = arr.len() as f64;
    let mut min = f64::MAX;
    let mut adjusted = vec![f64::NAN; pvalues.len()];
    for (idx, (orig, val)) in arr.into_iter().enumerate() {
        let scaled = val * (len / (len - idx as f64));
        if scaled < min {
            min = scaled;
        }
        adjusted[orig] = min.min(1.0);
    }
    adjusted
}

/// P(Z > z) for a standard normal Z.
pub fn normal_upper_tail(z: f64) -> f64 {
    0.5 * erfc(z / std::f64::consts::SQRT_2)
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_adjusted_pvalue_bh() {
        let pvalues = [
            0.34f64, 0.594, 0.212, 0.384, 0.074, 0.94, 0.275, 0.696, 0.269, 0.341, 0.06, 0.008, 0.569, 0.986, 0.042,
            0.251, 0.942, 0.222, 0.762, 0.001, 0.975, 0.216, 0.205, 0.041, 0.039,
        ];
        let expected = [
            0.5328125f64,
            0.781578947368421,
            0.49107142857142866,
            0.5647058823529413,
            0.2642857142857143,
            0.986,
            0.49107142857142866,
            0.8699999999999999,
            0.49107142857142866,
            0.5328125,
            0.25,
            0.1,
            0.781578947368421,
            0.986,
            0.21000000000000002,
            0.49107142857142866,
            0.986,
            0.49107142857142866,
            0.9071428571428571,
            0.025,
            0.986,
            0.49107142857142866,
            0.49107142857142866,
            0.21000000000000002,
            0.21000000000000002,
        ];
        let adjusted = adjusted_pvalue_bh(&pvalues);
        for (a, e) in adjusted.iter().zip(expected.iter()) {
            assert_abs_diff_eq!(*a, *e, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_adjusted_pvalue_bh_nan() {
        let adjusted = adjusted_pvalue_bh(&[0.01, f64::NAN, 0.04]);
        assert!(adjusted[1].is_nan());
        assert_abs_diff_eq!(adjusted[0], 0.02, epsilon = 1e-12);
        assert_abs_diff_eq!(adjusted[2], 0.04, epsilon = 1e-12);
    }

    #[test]
    fn test_normal_upper_tail() {
        assert_abs_diff_eq!(normal_upper_tail(0.0), 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(normal_upper_tail(1.959963984540054), 0.025, epsilon = 1e-9);
        assert!(normal_upper_tail(-5.0) > 0.99);
    }
}
