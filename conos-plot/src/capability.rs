//! Optional computations that enrich a chart. A caller may leave any of them
//! out; the chart is then drawn without the enhancement and a warning is logged.

/// Relative entropy between two discrete distributions.
pub trait EntropyEstimator: Send + Sync {
    /// KL(p || q) in bits. None when it cannot be computed, e.g. when the
    /// vectors differ in length or `q` is zero where `p` is not.
    fn kl_divergence(&self, p: &[f64], q: &[f64]) -> Option<f64>;
}

/// Plug-in estimate on the empirical frequencies.
#[derive(Clone, Copy, Debug, Default)]
pub struct EmpiricalKl;

impl EntropyEstimator for EmpiricalKl {
    fn kl_divergence(&self, p: &[f64], q: &[f64]) -> Option<f64> {
        if p.len() != q.len() {
            return None;
        }
        let (sp, sq) = (p.iter().sum::<f64>(), q.iter().sum::<f64>());
        if sp <= 0.0 || sq <= 0.0 {
            return None;
        }
        let mut kl = 0.0;
        for (&a, &b) in p.iter().zip(q) {
            let (a, b) = (a / sp, b / sq);
            if a > 0.0 {
                if b <= 0.0 {
                    return None;
                }
                kl += a * (a / b).log2();
            }
        }
        Some(kl)
    }
}

/// Moving average along a sequence of values.
pub trait RollingMean: Send + Sync {
    /// Output has the length of `values`. None when the window cannot be applied.
    fn rolling_mean(&self, values: &[f64], window: usize) -> Option<Vec<f64>>;
}

/// Mean over a window centered on each value. Near the ends the window is
/// truncated to the values available.
#[derive(Clone, Copy, Debug, Default)]
pub struct CenteredRunningMean;

impl RollingMean for CenteredRunningMean {
    fn rolling_mean(&self, values: &[f64], window: usize) -> Option<Vec<f64>> {
        if window == 0 {
            return None;
        }
        let n = values.len();
        let mut prefix = Vec::with_capacity(n + 1);
        prefix.push(0.0);
        for v in values {
            prefix.push(prefix[prefix.len() - 1] + v);
        }
        let before = (window - 1) / 2;
        let after = window - 1 - before;
        Some(
            (0..n)
                .map(|i| {
                    let lo = i.saturating_sub(before);
                    let hi = (i + after + 1).min(n);
                    (prefix[hi] - prefix[lo]) / (hi - lo) as f64
                })
                .collect(),
        )
    }
}

/// The optional capabilities available to a chart builder.
pub struct Capabilities {
    pub entropy: Option<Box<dyn EntropyEstimator>>,
    pub rolling: Option<Box<dyn RollingMean>>,
}

impl Capabilities {
    /// Built-in implementations of every capability.
    pub fn default_set() -> Capabilities {
        Capabilities {
            entropy: Some(Box::new(EmpiricalKl)),
            rolling: Some(Box::new(CenteredRunningMean)),
        }
    }

    pub fn none() -> Capabilities {
        Capabilities {
            entropy: None,
            rolling: None,
        }
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Capabilities::default_set()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_kl() {
        let kl = EmpiricalKl;
        assert_abs_diff_eq!(kl.kl_divergence(&[1.0, 1.0], &[2.0, 2.0]).unwrap(), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(kl.kl_divergence(&[1.0, 0.0], &[0.5, 0.5]).unwrap(), 1.0, epsilon = 1e-12);
        assert!(kl.kl_divergence(&[1.0, 1.0], &[1.0, 0.0]).is_none());
        assert!(kl.kl_divergence(&[1.0], &[1.0, 0.0]).is_none());
    }

    #[test]
    fn test_running_mean() {
        let rm = CenteredRunningMean;
        let out = rm.rolling_mean(&[1.0, 2.0, 3.0, 4.0, 5.0], 3).unwrap();
        let expected = [1.5, 2.0, 3.0, 4.0, 4.5];
        for (a, e) in out.iter().zip(expected.iter()) {
            assert_abs_diff_eq!(*a, *e, epsilon = 1e-12);
        }
        assert_eq!(rm.rolling_mean(&[1.0, 2.0], 1).unwrap(), vec![1.0, 2.0]);
        assert!(rm.rolling_mean(&[1.0], 0).is_none());
        assert!(rm.rolling_mean(&[], 5).unwrap().is_empty());
    }
}
