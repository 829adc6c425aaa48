//! Heatmap of the marker genes of every cluster over the cells.
//!
//! Genes are picked per cluster from DE tables (computed on the fly when none
//! are given), extended with caller-chosen genes, and shown as rows scaled to
//! [0, 1]. Columns are cells grouped by cluster, optionally subsampled and
//! smoothed. Tracks above the columns show the cluster and any cell metadata.

mod annotation;
mod normalize;
mod render;
mod select;

pub use annotation::{AnnotationTrack, ColumnMetadata};
pub use normalize::{normalize_row, winsorize_bounds};
pub use select::GeneRow;

use crate::capability::{Capabilities, RollingMean};
use crate::palette::{ColorRamp, Palette};
use annotation::{cluster_palette, metadata_track, row_annotation};
use anyhow::{bail, Error};
use conos_types::{ClusterDe, ExpressionSource, Factor, GeneOrdering, NamedFactor, Sample};
use diff_exp::{find_markers, MarkerParams};
use hclust::{ClusterDirection, DistanceMetric, HierarchicalCluster, LeafOrdering, LinkageMethod};
use log::{debug, info, warn};
use ndarray::{s, Array1, Array2, Axis};
use rand::SeedableRng;
use rand_pcg::Pcg64;
use select::{
    add_additional_genes, align_to_levels, apply_thresholds, expression_matrix, fetch_expression, top_genes,
    SCRATCH_GENES,
};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};

/// Genes that get a text label next to their row.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum LabeledGenes {
    /// The first `n` genes of every cluster.
    Top(usize),
    Names(Vec<String>),
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct HeatmapParams {
    /// Top genes per cluster. 0 shows the additional genes only.
    pub genes_per_cluster: usize,
    pub additional_genes: Vec<String>,
    pub additional_genes_only: bool,
    pub exclude_genes: Vec<String>,
    pub min_auc: Option<f64>,
    pub min_specificity: Option<f64>,
    pub min_precision: Option<f64>,
    pub ordering: GeneOrdering,
    /// Order clusters by a dendrogram of their mean expression.
    pub reorder_clusters: bool,
    /// Maximal number of cells shown per cluster.
    pub max_cells: Option<usize>,
    /// Width of the sliding window averaging cells within a cluster. 0 or 1 disables it.
    pub averaging_window: usize,
    /// Rows are clipped at this quantile and its complement before scaling.
    pub expression_quantile: f64,
    pub cell_order: Option<Vec<String>>,
    pub cluster_colors: Option<BTreeMap<String, String>>,
    /// Hex colors per metadata track, keyed by track name then level.
    pub metadata_colors: BTreeMap<String, BTreeMap<String, String>>,
    pub remove_duplicates: bool,
    /// Separate clusters with gaps, both along rows and columns.
    pub split: bool,
    /// Gap between split blocks, in pixels.
    pub split_gap: u32,
    /// Every gene is labeled when unset.
    pub labeled_genes: Option<LabeledGenes>,
    /// Seed of the cell subsampling.
    pub seed: u64,
    /// Used when DE results must be computed.
    pub markers: MarkerParams,
}

impl Default for HeatmapParams {
    fn default() -> Self {
        HeatmapParams {
            genes_per_cluster: 10,
            additional_genes: Vec::new(),
            additional_genes_only: false,
            exclude_genes: Vec::new(),
            min_auc: None,
            min_specificity: None,
            min_precision: None,
            ordering: GeneOrdering::default(),
            reorder_clusters: false,
            max_cells: None,
            averaging_window: 0,
            expression_quantile: 0.99,
            cell_order: None,
            cluster_colors: None,
            metadata_colors: BTreeMap::new(),
            remove_duplicates: true,
            split: false,
            split_gap: 2,
            labeled_genes: None,
            seed: 0,
            markers: MarkerParams::default(),
        }
    }
}

/// Everything the heatmap shows, without the drawing.
#[derive(Clone, Debug, PartialEq)]
pub struct HeatmapDetails {
    /// Scaled values, genes x cells.
    pub matrix: Array2<f64>,
    /// Values of the shown cells before smoothing and scaling.
    pub raw: Array2<f64>,
    pub genes: Vec<String>,
    /// Cluster each row was selected for.
    pub row_clusters: Vec<String>,
    pub cells: Vec<String>,
    pub column_clusters: Vec<String>,
    /// Cluster levels in display order.
    pub clusters: Vec<String>,
    /// Tracks above the columns, top to bottom.
    pub column_annotation: Vec<AnnotationTrack>,
    /// Gene → cluster.
    pub row_annotation: Vec<(String, String)>,
    /// Expression of every shown gene over all cells of the source.
    pub expression: BTreeMap<String, Array1<f64>>,
    pub cluster_palette: Palette,
    pub ramp: ColorRamp,
    pub labeled_genes: Vec<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DeHeatmap {
    pub details: HeatmapDetails,
    pub split: bool,
    pub split_gap: u32,
}

impl DeHeatmap {
    pub fn into_details(self) -> HeatmapDetails {
        self.details
    }
}

/// Mean expression of every row over the cells of every cluster, rows x clusters.
fn cluster_means(
    rows: &[GeneRow],
    expression: &BTreeMap<String, Array1<f64>>,
    groups: &Factor,
) -> Array2<f64> {
    let members = groups.group_indices();
    let mut means = Array2::zeros((rows.len(), members.len()));
    for (r, row) in rows.iter().enumerate() {
        let Some(values) = expression.get(&row.gene) else {
            continue;
        };
        for (k, cells) in members.iter().enumerate() {
            if !cells.is_empty() {
                means[[r, k]] = cells.iter().map(|&i| values[i]).sum::<f64>() / cells.len() as f64;
            }
        }
    }
    means
}

/// Cluster levels in dendrogram leaf order, or None when they can't be clustered.
fn dendrogram_order(means: &Array2<f64>, levels: &[String]) -> Option<Vec<String>> {
    match HierarchicalCluster::new(
        means,
        DistanceMetric::Correlation,
        LinkageMethod::Ward,
        ClusterDirection::Columns,
    ) {
        Ok(tree) => Some(
            tree.leaves(LeafOrdering::Naive)
                .into_iter()
                .map(|i| levels[i].clone())
                .collect(),
        ),
        Err(e) => {
            warn!("clusters not reordered: {}", e);
            None
        }
    }
}

/// Source cell positions grouped by cluster in level order, at most `max_cells`
/// per cluster. Subsampled cells keep their relative order.
fn ordered_columns(groups: &Factor, max_cells: Option<usize>, seed: u64) -> Vec<usize> {
    let mut rng = Pcg64::seed_from_u64(seed);
    let mut columns = Vec::new();
    for cells in groups.group_indices() {
        match max_cells {
            Some(m) if cells.len() > m => {
                let mut picks = rand::seq::index::sample(&mut rng, cells.len(), m).into_vec();
                picks.sort_unstable();
                columns.extend(picks.into_iter().map(|i| cells[i]));
            }
            _ => columns.extend(cells),
        }
    }
    columns
}

/// Start and end of each run of equal keys.
fn blocks<T: PartialEq>(keys: &[T]) -> Vec<(usize, usize)> {
    let mut out = Vec::new();
    let mut start = 0;
    for i in 1..=keys.len() {
        if i == keys.len() || keys[i] != keys[start] {
            out.push((start, i));
            start = i;
        }
    }
    out
}

/// Replace each row by its rolling mean within every column block. Blocks the
/// estimator can't handle are left as they are.
fn smooth_within_blocks(
    matrix: &mut Array2<f64>,
    column_blocks: &[(usize, usize)],
    rolling: &dyn RollingMean,
    window: usize,
) {
    let mut skipped = 0;
    for mut row in matrix.rows_mut() {
        for &(start, end) in column_blocks {
            let values = row.slice(s![start..end]).to_vec();
            match rolling.rolling_mean(&values, window) {
                Some(smoothed) if smoothed.len() == values.len() => {
                    for (j, v) in smoothed.into_iter().enumerate() {
                        row[start + j] = v;
                    }
                }
                _ => skipped += 1,
            }
        }
    }
    if skipped > 0 {
        warn!("{} row blocks could not be averaged over a window of {}", skipped, window);
    }
}

fn resolve_labels(labeled: Option<&LabeledGenes>, genes: &[String], row_clusters: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    match labeled {
        None => genes.iter().filter(|&g| seen.insert(g.as_str())).cloned().collect(),
        Some(LabeledGenes::Top(n)) => {
            let mut per_cluster = BTreeMap::<&str, usize>::new();
            genes
                .iter()
                .zip(row_clusters)
                .filter(|&(g, c)| {
                    let taken = per_cluster.entry(c.as_str()).or_default();
                    if *taken < *n && seen.insert(g.as_str()) {
                        *taken += 1;
                        true
                    } else {
                        false
                    }
                })
                .map(|(g, _)| g.clone())
                .collect()
        }
        Some(LabeledGenes::Names(names)) => {
            let present = genes.iter().map(String::as_str).collect::<HashSet<_>>();
            let missing = names.iter().filter(|n| !present.contains(n.as_str())).count();
            if missing > 0 {
                warn!("{} genes to label are not shown on the heatmap", missing);
            }
            names
                .iter()
                .filter(|&n| present.contains(n.as_str()) && seen.insert(n.as_str()))
                .cloned()
                .collect()
        }
    }
}

/// Build the heatmap of the marker genes of `groups` (cell → cluster) over the
/// cells of `source`.
///
/// `de` holds one table per cluster; it is computed from the source expression
/// when None. `metadata` adds one annotation track per column.
pub fn de_heatmap<E: ExpressionSource>(
    source: &E,
    groups: &NamedFactor,
    de: Option<ClusterDe>,
    metadata: Option<&ColumnMetadata>,
    params: &HeatmapParams,
    capabilities: &Capabilities,
) -> Result<DeHeatmap, Error> {
    let cells = source.cells();
    let mut cell_groups =
        Factor::with_levels(cells.iter().map(|c| groups.get(c)), groups.levels().to_vec())?.drop_unused_levels();
    if cell_groups.n_levels() == 0 {
        bail!("none of the {} cells of the data have a cluster label", cells.len());
    }
    let mut levels = cell_groups.levels().to_vec();

    let de = match de {
        Some(de) => de,
        None => {
            info!("no DE results given, computing markers of {} clusters", levels.len());
            let (genes, matrix) = expression_matrix(source);
            find_markers(&matrix, &genes, &cell_groups, &params.markers)?
        }
    };
    let tables = apply_thresholds(align_to_levels(de, &levels), params);

    let only_additional = params.genes_per_cluster == 0 || params.additional_genes_only;
    let n = if params.genes_per_cluster == 0 {
        SCRATCH_GENES
    } else {
        params.genes_per_cluster
    };
    let (mut rows, mut expression) = fetch_expression(source, top_genes(&tables, params.ordering, n)?);
    add_additional_genes(source, &mut rows, &mut expression, &params.additional_genes, &levels);
    if only_additional {
        let additional = params.additional_genes.iter().collect::<HashSet<_>>();
        rows.retain(|r| additional.contains(&r.gene));
    }

    let excluded = params.exclude_genes.iter().collect::<HashSet<_>>();
    rows.retain(|r| !excluded.contains(&r.gene));
    if params.remove_duplicates {
        let mut seen = HashSet::new();
        rows.retain(|r| seen.insert(r.gene.clone()));
    }
    if rows.is_empty() {
        bail!("no genes left to show on the heatmap");
    }
    expression.retain(|gene, _| rows.iter().any(|r| &r.gene == gene));

    if params.reorder_clusters {
        if levels.len() < 2 {
            debug!("a single cluster, nothing to reorder");
        } else {
            let means = cluster_means(&rows, &expression, &cell_groups);
            if let Some(order) = dendrogram_order(&means, &levels) {
                info!("clusters reordered: {}", order.join(", "));
                cell_groups = cell_groups.reorder_levels(&order)?;
                levels = order;
            }
        }
    }
    rows.sort_by_key(|r| levels.iter().position(|l| l == &r.cluster));

    let columns = ordered_columns(&cell_groups, params.max_cells, params.seed);
    let column_clusters = columns
        .iter()
        .map(|&i| cell_groups.label(i).unwrap_or_default().to_string())
        .collect::<Vec<_>>();
    let mut raw = Array2::zeros((rows.len(), columns.len()));
    for (r, row) in rows.iter().enumerate() {
        if let Some(values) = expression.get(&row.gene) {
            for (j, &i) in columns.iter().enumerate() {
                raw[[r, j]] = values[i];
            }
        }
    }
    debug!("heatmap of {} rows over {} cells", rows.len(), columns.len());

    let mut matrix = raw.clone();
    if params.averaging_window > 1 {
        match capabilities.rolling.as_deref() {
            Some(rolling) => {
                smooth_within_blocks(&mut matrix, &blocks(&column_clusters), rolling, params.averaging_window)
            }
            None => warn!("no rolling mean available, cells are not averaged"),
        }
    }
    for mut row in matrix.rows_mut() {
        let mut values = row.to_vec();
        normalize_row(&mut values, params.expression_quantile);
        row.assign(&Array1::from(values));
    }

    let mut positions = (0..columns.len()).collect::<Vec<_>>();
    if let Some(order) = &params.cell_order {
        let lookup = columns
            .iter()
            .enumerate()
            .map(|(j, &i)| (cells[i].as_str(), j))
            .collect::<BTreeMap<_, _>>();
        positions = order.iter().filter_map(|c| lookup.get(c.as_str()).copied()).collect();
        if positions.is_empty() {
            bail!("none of the cells in the requested cell order are shown");
        }
        if positions.len() < order.len() {
            debug!("{} cells of the requested order are not shown", order.len() - positions.len());
        }
    }
    let matrix = matrix.select(Axis(1), &positions);
    let raw = raw.select(Axis(1), &positions);
    let shown_cells = positions.iter().map(|&j| cells[columns[j]].clone()).collect::<Vec<_>>();
    let column_clusters = positions.iter().map(|&j| column_clusters[j].clone()).collect::<Vec<_>>();

    let palette = cluster_palette(&levels, params.cluster_colors.as_ref())?;
    let mut tracks = vec![AnnotationTrack {
        name: "cluster".to_string(),
        labels: column_clusters.iter().cloned().map(Some).collect(),
        palette: palette.clone(),
    }];
    if let Some(metadata) = metadata {
        for (name, factor) in metadata.clone().into_factors()? {
            tracks.push(metadata_track(&name, &factor, &shown_cells, params.metadata_colors.get(&name))?);
        }
    }
    tracks.reverse();

    let genes = rows.iter().map(|r| r.gene.clone()).collect::<Vec<_>>();
    let row_clusters = rows.iter().map(|r| r.cluster.clone()).collect::<Vec<_>>();
    let labeled_genes = resolve_labels(params.labeled_genes.as_ref(), &genes, &row_clusters);
    info!(
        "heatmap: {} genes, {} cells, {} clusters",
        genes.len(),
        shown_cells.len(),
        levels.len()
    );

    Ok(DeHeatmap {
        details: HeatmapDetails {
            matrix,
            raw,
            genes,
            row_clusters,
            cells: shown_cells,
            column_clusters,
            clusters: levels,
            column_annotation: tracks,
            row_annotation: row_annotation(&rows),
            expression,
            cluster_palette: palette,
            ramp: ColorRamp::heatmap(),
            labeled_genes,
        },
        split: params.split,
        split_gap: params.split_gap,
    })
}

/// Expression of the cells of one sample container.
struct SampleExpression<'a, S>(&'a S);

impl<S: Sample> ExpressionSource for SampleExpression<'_, S> {
    fn cells(&self) -> Vec<String> {
        self.0.cells().to_vec()
    }

    fn genes(&self) -> Vec<String> {
        self.0.genes().to_vec()
    }

    fn gene_expression(&self, gene: &str) -> Option<Array1<f64>> {
        self.0.gene_expression(gene)
    }
}

/// [`de_heatmap`] over the cells of one sample. The DE result the sample stores
/// for `clustering` is used when there is one; markers are computed otherwise.
pub fn sample_de_heatmap<S: Sample>(
    sample: &S,
    groups: &NamedFactor,
    clustering: &str,
    metadata: Option<&ColumnMetadata>,
    params: &HeatmapParams,
    capabilities: &Capabilities,
) -> Result<DeHeatmap, Error> {
    let de = sample.differential_genes(clustering).cloned();
    if de.is_none() {
        debug!("sample '{}' stores no DE results for '{}'", sample.name(), clustering);
    }
    de_heatmap(&SampleExpression(sample), groups, de, metadata, params, capabilities)
}
