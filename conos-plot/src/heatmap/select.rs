//! Which genes make it into the heatmap, and for which cluster.

use super::HeatmapParams;
use crate::stats::pearson;
use anyhow::Error;
use conos_types::{ClusterDe, DeTable, ExpressionSource, GeneOrdering, ScoreColumn};
use log::{info, warn};
use ndarray::Array1;
use sprs::{CsMat, TriMat};
use std::collections::{BTreeMap, HashSet};

/// Genes fetched per cluster when only additional genes are shown; they are
/// needed to place the additional genes.
pub(crate) const SCRATCH_GENES: usize = 30;

/// A heatmap row: a gene and the cluster it was selected for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GeneRow {
    pub gene: String,
    pub cluster: String,
}

/// Genes x cells matrix over every gene of the source.
pub(crate) fn expression_matrix<E: ExpressionSource>(source: &E) -> (Vec<String>, CsMat<f64>) {
    let genes = source.genes();
    let n_cells = source.cells().len();
    let mut tri = TriMat::new((genes.len(), n_cells));
    for (g, gene) in genes.iter().enumerate() {
        if let Some(values) = source.gene_expression(gene) {
            for (c, &v) in values.iter().enumerate() {
                if v != 0.0 {
                    tri.add_triplet(g, c, v);
                }
            }
        }
    }
    (genes, tri.to_csr())
}

/// Tables of the given levels that have at least one gene, in level order.
pub(crate) fn align_to_levels(mut de: ClusterDe, levels: &[String]) -> Vec<(String, DeTable)> {
    let aligned = levels
        .iter()
        .filter_map(|l| de.remove(l).filter(|t| !t.is_empty()).map(|t| (l.clone(), t)))
        .collect::<Vec<_>>();
    let unmatched = de.keys().filter(|k| !levels.contains(k)).cloned().collect::<Vec<_>>();
    if !unmatched.is_empty() {
        warn!("DE results for unknown clusters ignored: {}", unmatched.join(", "));
    }
    aligned
}

/// Minimal AUC, specificity and precision. A threshold on a column the tables
/// don't have is skipped with a warning.
pub(crate) fn apply_thresholds(tables: Vec<(String, DeTable)>, params: &HeatmapParams) -> Vec<(String, DeTable)> {
    let thresholds = [
        (params.min_auc, ScoreColumn::Auc),
        (params.min_specificity, ScoreColumn::Specificity),
        (params.min_precision, ScoreColumn::Precision),
    ];
    let mut tables = tables;
    for (min, column) in thresholds {
        let Some(min) = min else {
            continue;
        };
        let mut missing = false;
        tables = tables
            .into_iter()
            .map(|(cluster, table)| match table.filter_min(column, min) {
                Some(filtered) => (cluster, filtered),
                None => {
                    missing = true;
                    (cluster, table)
                }
            })
            .collect();
        if missing {
            warn!("DE results have no {} column, minimum of {} not applied", column, min);
        }
    }
    tables
}

/// The first `n` genes of every table under `ordering`.
pub(crate) fn top_genes(tables: &[(String, DeTable)], ordering: GeneOrdering, n: usize) -> Result<Vec<GeneRow>, Error> {
    let mut rows = Vec::new();
    for (cluster, table) in tables {
        for gene in table.order_by(ordering)?.head(n).genes() {
            rows.push(GeneRow {
                gene: gene.clone(),
                cluster: cluster.clone(),
            });
        }
    }
    Ok(rows)
}

/// Expression of every row gene. Rows of genes the source doesn't have are
/// dropped with a warning.
pub(crate) fn fetch_expression<E: ExpressionSource>(
    source: &E,
    rows: Vec<GeneRow>,
) -> (Vec<GeneRow>, BTreeMap<String, Array1<f64>>) {
    let mut expression = BTreeMap::new();
    let mut absent = HashSet::new();
    for row in &rows {
        if expression.contains_key(&row.gene) || absent.contains(&row.gene) {
            continue;
        }
        match source.gene_expression(&row.gene) {
            Some(values) => {
                expression.insert(row.gene.clone(), values);
            }
            None => {
                absent.insert(row.gene.clone());
            }
        }
    }
    if !absent.is_empty() {
        warn!("{} selected genes are missing from the expression data", absent.len());
    }
    let rows = rows.into_iter().filter(|r| expression.contains_key(&r.gene)).collect();
    (rows, expression)
}

/// Cluster whose gene block correlates best, on average, with `values`.
/// Correlations that can't be computed are ignored, and clusters without any are
/// not candidates. The first of equal maxima wins.
pub(crate) fn best_cluster(
    values: &Array1<f64>,
    rows: &[GeneRow],
    expression: &BTreeMap<String, Array1<f64>>,
    levels: &[String],
) -> Option<String> {
    let mut best: Option<(f64, &String)> = None;
    for level in levels {
        let correlations = rows
            .iter()
            .filter(|r| &r.cluster == level)
            .filter_map(|r| expression.get(&r.gene))
            .filter_map(|other| pearson(values.view(), other.view()))
            .collect::<Vec<_>>();
        if correlations.is_empty() {
            continue;
        }
        let mean = correlations.iter().sum::<f64>() / correlations.len() as f64;
        if best.map_or(true, |(m, _)| mean > m) {
            best = Some((mean, level));
        }
    }
    best.map(|(_, level)| level.clone())
}

/// Append genes the caller asked for that aren't selected yet, each assigned to
/// its best correlated cluster. Genes absent from the data are dropped with a warning.
pub(crate) fn add_additional_genes<E: ExpressionSource>(
    source: &E,
    rows: &mut Vec<GeneRow>,
    expression: &mut BTreeMap<String, Array1<f64>>,
    additional: &[String],
    levels: &[String],
) {
    let selected = rows.iter().map(|r| r.gene.clone()).collect::<HashSet<_>>();
    let blocks = rows.clone();
    let mut seen = HashSet::new();
    let mut absent = Vec::new();
    for gene in additional {
        if selected.contains(gene) || !seen.insert(gene.clone()) {
            continue;
        }
        let Some(values) = source.gene_expression(gene) else {
            absent.push(gene.as_str());
            continue;
        };
        let cluster = match best_cluster(&values, &blocks, expression, levels) {
            Some(c) => c,
            None => {
                let Some(first) = levels.first() else {
                    continue;
                };
                warn!(
                    "no correlation could be computed for gene '{}', placing it with cluster {}",
                    gene, first
                );
                first.clone()
            }
        };
        expression.insert(gene.clone(), values);
        rows.push(GeneRow {
            gene: gene.clone(),
            cluster,
        });
    }
    if !absent.is_empty() {
        warn!("additional genes not found in the data: {}", absent.join(", "));
    }
    info!("{} genes selected over {} clusters", rows.len(), levels.len());
}
