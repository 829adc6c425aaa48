//! One-vs-rest marker genes: Wilcoxon rank-sum test per cluster, with the AUC as
//! effect size and detection-based specificity and precision.

use crate::dist::{adjusted_pvalue_bh, normal_upper_tail};
use crate::rank::rank_sums;
use anyhow::{bail, Error};
use conos_types::{ClusterDe, DeTable, Factor, GeneOrdering, ScoreColumn};
use log::{debug, info};
use rayon::prelude::*;
use serde::Deserialize;
use sprs::CsMat;

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct MarkerParams {
    /// Only report genes with higher expression in the cluster (Z > 0).
    pub upregulated_only: bool,
    /// Minimal fraction of cluster cells expressing the gene.
    pub min_expression_fraction: f64,
}

impl Default for MarkerParams {
    fn default() -> Self {
        MarkerParams {
            upregulated_only: true,
            min_expression_fraction: 0.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct LevelStats {
    z: f64,
    auc: f64,
    specificity: f64,
    precision: f64,
    expression_fraction: f64,
    pvalue: f64,
}

impl LevelStats {
    const EMPTY: LevelStats = LevelStats {
        z: 0.0,
        auc: 0.5,
        specificity: f64::NAN,
        precision: f64::NAN,
        expression_fraction: 0.0,
        pvalue: 1.0,
    };
}

/// Statistics of one gene row against every level of `groups`.
/// `labels[c]` is the level of cell `c`, None for unlabeled cells.
fn gene_stats(row: sprs::CsVecView<f64>, labels: &[Option<usize>], sizes: &[usize]) -> Vec<LevelStats> {
    let n_levels = sizes.len();
    let total: usize = sizes.iter().sum();
    let mut nonzero = Vec::new();
    let mut detected = vec![0usize; n_levels];
    for (cell, &val) in row.iter() {
        if let Some(g) = labels[cell] {
            if val != 0.0 {
                nonzero.push((val, g));
                detected[g] += 1;
            }
        }
    }
    let zeros = sizes.iter().zip(&detected).map(|(n, d)| n - d).collect::<Vec<_>>();
    let ranks = rank_sums(&mut nonzero, &zeros);
    let detected_total: usize = detected.iter().sum();

    let n = total as f64;
    (0..n_levels)
        .map(|g| {
            let n1 = sizes[g] as f64;
            let n2 = n - n1;
            if sizes[g] == 0 || n2 == 0.0 {
                return LevelStats::EMPTY;
            }
            let u = ranks.sums[g] - n1 * (n1 + 1.0) / 2.0;
            let variance = n1 * n2 / 12.0 * ((n + 1.0) - ranks.tie_term / (n * (n - 1.0)));
            let z = if variance > 0.0 {
                (u - n1 * n2 / 2.0) / variance.sqrt()
            } else {
                0.0
            };
            let detected_out = (detected_total - detected[g]) as f64;
            let detected_in = detected[g] as f64;
            LevelStats {
                z,
                auc: u / (n1 * n2),
                specificity: 1.0 - detected_out / n2,
                precision: if detected_total > 0 {
                    detected_in / detected_total as f64
                } else {
                    f64::NAN
                },
                expression_fraction: detected_in / n1,
                pvalue: normal_upper_tail(z),
            }
        })
        .collect()
}

/// Find marker genes for every level of `groups`.
///
/// `matrix` is genes x cells in CSR layout, `genes` names its rows and `groups`
/// labels its columns. Cells without a label take no part in the test. Each
/// returned table is sorted by descending Z.
pub fn find_markers(
    matrix: &CsMat<f64>,
    genes: &[String],
    groups: &Factor,
    params: &MarkerParams,
) -> Result<ClusterDe, Error> {
    if !matrix.is_csr() {
        bail!("marker detection expects a genes x cells matrix in CSR layout");
    }
    if matrix.rows() != genes.len() {
        bail!("{} gene names for a matrix with {} rows", genes.len(), matrix.rows());
    }
    if matrix.cols() != groups.len() {
        bail!("{} cell labels for a matrix with {} columns", groups.len(), matrix.cols());
    }

    let labels = (0..groups.len()).map(|c| groups.code(c)).collect::<Vec<_>>();
    let sizes = groups.counts();
    info!(
        "testing {} genes across {} clusters ({} labeled cells)",
        genes.len(),
        sizes.len(),
        sizes.iter().sum::<usize>()
    );

    let per_gene = (0..matrix.rows())
        .into_par_iter()
        .map(|g| match matrix.outer_view(g) {
            Some(row) => gene_stats(row, &labels, &sizes),
            None => vec![LevelStats::EMPTY; sizes.len()],
        })
        .collect::<Vec<_>>();

    let ordering = GeneOrdering {
        column: ScoreColumn::Z,
        descending: true,
    };
    let mut result = ClusterDe::new();
    for (g, level) in groups.levels().iter().enumerate() {
        if sizes[g] == 0 {
            continue;
        }
        let stats = per_gene.iter().map(|s| s[g]).collect::<Vec<_>>();
        let pvalues = stats.iter().map(|s| s.pvalue).collect::<Vec<_>>();
        let table = DeTable::new(genes.to_vec())
            .with_column(ScoreColumn::Z, stats.iter().map(|s| s.z).collect())?
            .with_column(ScoreColumn::Auc, stats.iter().map(|s| s.auc).collect())?
            .with_column(ScoreColumn::Specificity, stats.iter().map(|s| s.specificity).collect())?
            .with_column(ScoreColumn::Precision, stats.iter().map(|s| s.precision).collect())?
            .with_column(
                ScoreColumn::ExpressionFraction,
                stats.iter().map(|s| s.expression_fraction).collect(),
            )?
            .with_column(ScoreColumn::AdjustedPValue, adjusted_pvalue_bh(&pvalues))?
            .with_column(ScoreColumn::PValue, pvalues)?;

        let table = match table.filter_min(ScoreColumn::ExpressionFraction, params.min_expression_fraction) {
            Some(t) => t,
            None => table,
        };
        let table = if params.upregulated_only {
            let z = table.column(ScoreColumn::Z).unwrap_or(&[]);
            let min_positive = z.iter().copied().filter(|&v| v > 0.0).fold(f64::INFINITY, f64::min);
            match table.filter_min(ScoreColumn::Z, min_positive) {
                Some(t) => t,
                None => table,
            }
        } else {
            table
        };
        let table = table.order_by(ordering)?;
        debug!("cluster {}: {} marker genes", level, table.len());
        result.insert(level.clone(), table);
    }
    Ok(result)
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;
    use sprs::TriMat;

    /// 3 genes x 6 cells; cells 0-2 are cluster "a", 3-5 cluster "b".
    /// g_a is only expressed in "a", g_b only in "b", g_flat everywhere.
    fn fixture() -> (CsMat<f64>, Vec<String>, Factor) {
        let mut tri = TriMat::new((3, 6));
        for c in 0..3 {
            tri.add_triplet(0, c, 2.0 + c as f64);
        }
        for c in 3..6 {
            tri.add_triplet(1, c, 1.0);
        }
        for c in 0..6 {
            tri.add_triplet(2, c, 1.0);
        }
        let genes = vec!["g_a".to_string(), "g_b".to_string(), "g_flat".to_string()];
        let groups = Factor::new(&["a", "a", "a", "b", "b", "b"]);
        (tri.to_csr(), genes, groups)
    }

    #[test]
    fn test_perfect_markers() {
        let (mat, genes, groups) = fixture();
        let params = MarkerParams {
            upregulated_only: false,
            ..MarkerParams::default()
        };
        let de = find_markers(&mat, &genes, &groups, &params).unwrap();
        let a = &de["a"];
        assert_eq!(a.genes()[0], "g_a");
        assert_eq!(a.genes()[2], "g_b");
        let auc = a.column(ScoreColumn::Auc).unwrap();
        assert_abs_diff_eq!(auc[0], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(auc[1], 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(auc[2], 0.0, epsilon = 1e-12);
        let spec = a.column(ScoreColumn::Specificity).unwrap();
        assert_abs_diff_eq!(spec[0], 1.0, epsilon = 1e-12);
        let prec = a.column(ScoreColumn::Precision).unwrap();
        assert_abs_diff_eq!(prec[0], 1.0, epsilon = 1e-12);
        let z = a.column(ScoreColumn::Z).unwrap();
        assert!(z[0] > 0.0);
        assert_abs_diff_eq!(z[1], 0.0, epsilon = 1e-12);
        let p = a.column(ScoreColumn::PValue).unwrap();
        assert!(p[0] < 0.05);
    }

    #[test]
    fn test_upregulated_only() {
        let (mat, genes, groups) = fixture();
        let de = find_markers(&mat, &genes, &groups, &MarkerParams::default()).unwrap();
        assert_eq!(de["a"].genes(), &["g_a"]);
        assert_eq!(de["b"].genes(), &["g_b"]);
    }

    #[test]
    fn test_unlabeled_cells_ignored() {
        let (mat, genes, _) = fixture();
        let groups = Factor::from_options(vec![Some("a"), Some("a"), None, Some("b"), Some("b"), None]);
        let de = find_markers(&mat, &genes, &groups, &MarkerParams::default()).unwrap();
        let frac = de["a"].column(ScoreColumn::ExpressionFraction).unwrap();
        assert_abs_diff_eq!(frac[0], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_shape_checks() {
        let (mat, genes, _) = fixture();
        let short = Factor::new(&["a", "b"]);
        assert!(find_markers(&mat, &genes, &short, &MarkerParams::default()).is_err());
        let (mat, _, groups) = fixture();
        assert!(find_markers(&mat, &["g".to_string()], &groups, &MarkerParams::default()).is_err());
    }
}
