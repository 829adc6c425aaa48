//! Sample composition of clusters: stacked fraction bars, with optional entropy
//! and cluster size panels underneath.

use crate::capability::Capabilities;
use crate::palette::Palette;
use crate::render::{category_label, draw_legend, split_heights, text_style, Chart};
use anyhow::{bail, format_err, Error};
use conos_types::{Conos, NamedFactor, Sample};
use log::{debug, warn};
use ndarray::{Array2, Axis};
use plotters::coord::Shift;
use plotters::prelude::*;
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct CompositionParams {
    /// Clustering to look up on the container when no groups are passed in.
    /// Defaults to the first clustering of the container.
    pub clustering: Option<String>,
    pub show_entropy: bool,
    pub show_size: bool,
    /// Relative heights of the legend, bar, entropy and size panels.
    pub legend_height: f64,
    pub bar_height: f64,
    pub entropy_height: f64,
    pub size_height: f64,
    /// Hex color per sample, replacing the hue palette.
    pub palette: Option<BTreeMap<String, String>>,
}

impl Default for CompositionParams {
    fn default() -> Self {
        CompositionParams {
            clustering: None,
            show_entropy: true,
            show_size: true,
            legend_height: 0.2,
            bar_height: 1.0,
            entropy_height: 0.5,
            size_height: 0.5,
            palette: None,
        }
    }
}

/// Cell counts, samples as rows and clusters as columns.
#[derive(Clone, Debug, PartialEq)]
pub struct ContingencyTable {
    pub samples: Vec<String>,
    pub clusters: Vec<String>,
    pub counts: Array2<usize>,
}

impl ContingencyTable {
    /// Count the cells labeled in both factors.
    pub fn new(samples: &NamedFactor, groups: &NamedFactor) -> ContingencyTable {
        let mut counts = Array2::zeros((samples.levels().len(), groups.levels().len()));
        for (i, cell) in groups.names().iter().enumerate() {
            let Some(col) = groups.factor().code(i) else {
                continue;
            };
            let Some(row) = samples.position(cell).and_then(|pos| samples.factor().code(pos)) else {
                continue;
            };
            counts[[row, col]] += 1;
        }
        ContingencyTable {
            samples: samples.levels().to_vec(),
            clusters: groups.levels().to_vec(),
            counts,
        }
    }

    /// Remove all-zero rows and columns.
    pub fn drop_empty(&self) -> ContingencyTable {
        let rows = (0..self.samples.len())
            .filter(|&r| self.counts.row(r).sum() > 0)
            .collect::<Vec<_>>();
        let cols = (0..self.clusters.len())
            .filter(|&c| self.counts.column(c).sum() > 0)
            .collect::<Vec<_>>();
        ContingencyTable {
            samples: rows.iter().map(|&r| self.samples[r].clone()).collect(),
            clusters: cols.iter().map(|&c| self.clusters[c].clone()).collect(),
            counts: self.counts.select(Axis(0), &rows).select(Axis(1), &cols),
        }
    }

    /// Cells per cluster.
    pub fn cluster_totals(&self) -> Vec<usize> {
        self.counts.sum_axis(Axis(0)).to_vec()
    }

    /// Cells per sample.
    pub fn sample_totals(&self) -> Vec<usize> {
        self.counts.sum_axis(Axis(1)).to_vec()
    }

    /// Each cluster column divided by its total.
    pub fn fractions(&self) -> Array2<f64> {
        let totals = self.cluster_totals();
        Array2::from_shape_fn(self.counts.dim(), |(r, c)| {
            if totals[c] > 0 {
                self.counts[[r, c]] as f64 / totals[c] as f64
            } else {
                0.0
            }
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CompositionPlot {
    pub table: ContingencyTable,
    pub fractions: Array2<f64>,
    /// Normalized entropy per cluster, when computed.
    pub entropy: Option<Vec<f64>>,
    /// Cells per cluster, when the size panel is shown.
    pub sizes: Option<Vec<usize>>,
    pub palette: Palette,
    heights: [f64; 4],
}

/// `1 - KL(cluster || overall) / log2(n_samples)`, clamped to [0, 1].
fn normalized_entropy(table: &ContingencyTable, capabilities: &Capabilities) -> Option<Vec<f64>> {
    let Some(estimator) = capabilities.entropy.as_ref() else {
        warn!("no entropy estimator available, skipping the entropy panel");
        return None;
    };
    let n_samples = table.samples.len();
    if n_samples < 2 {
        warn!("entropy needs at least two samples, skipping the entropy panel");
        return None;
    }
    let overall = table.sample_totals().iter().map(|&v| v as f64).collect::<Vec<_>>();
    let norm = (n_samples as f64).log2();
    let mut entropy = Vec::with_capacity(table.clusters.len());
    for c in 0..table.clusters.len() {
        let p = table.counts.column(c).iter().map(|&v| v as f64).collect::<Vec<_>>();
        match estimator.kl_divergence(&p, &overall) {
            Some(kl) => entropy.push((1.0 - kl / norm).clamp(0.0, 1.0)),
            None => {
                warn!(
                    "entropy could not be computed for cluster {}, skipping the entropy panel",
                    table.clusters[c]
                );
                return None;
            }
        }
    }
    Some(entropy)
}

/// Build the composition of each cluster by sample.
///
/// Clusters come from `groups`, or from a clustering of `conos` (see
/// [`CompositionParams::clustering`]). The sample of each cell defaults to the
/// dataset it belongs to.
pub fn cluster_composition<S: Sample>(
    conos: Option<&Conos<S>>,
    groups: Option<&NamedFactor>,
    sample_factor: Option<&NamedFactor>,
    params: &CompositionParams,
    capabilities: &Capabilities,
) -> Result<CompositionPlot, Error> {
    let groups = match (groups, conos) {
        (Some(g), _) => g.clone(),
        (None, Some(con)) => {
            let name = match &params.clustering {
                Some(name) => name.clone(),
                None => con
                    .clustering_names()
                    .next()
                    .map(str::to_string)
                    .ok_or_else(|| format_err!("the container has no clusterings"))?,
            };
            con.clustering(&name)?.clone()
        }
        (None, None) => {
            if params.clustering.is_some() {
                bail!("a results container is required to look up a named clustering");
            }
            bail!("either groups or a results container must be provided");
        }
    };
    let sample_factor = match (sample_factor, conos) {
        (Some(f), _) => f.clone(),
        (None, Some(con)) => con.cell_samples()?,
        (None, None) => bail!("a sample factor is required when no results container is given"),
    };

    let table = ContingencyTable::new(&sample_factor, &groups).drop_empty();
    debug!(
        "composition table: {} samples x {} clusters",
        table.samples.len(),
        table.clusters.len()
    );
    let fractions = table.fractions();
    let entropy = if params.show_entropy {
        normalized_entropy(&table, capabilities)
    } else {
        None
    };
    let sizes = params.show_size.then(|| table.cluster_totals());
    let palette = match &params.palette {
        Some(colors) => Palette::from_map(&table.samples, colors)?,
        None => Palette::default_for(&table.samples),
    };
    Ok(CompositionPlot {
        table,
        fractions,
        entropy,
        sizes,
        palette,
        heights: [
            params.legend_height,
            params.bar_height,
            params.entropy_height,
            params.size_height,
        ],
    })
}

impl CompositionPlot {
    fn draw_bars<DB: DrawingBackend>(&self, area: &DrawingArea<DB, Shift>) -> Result<(), Error>
    where
        DB::ErrorType: 'static,
    {
        let n = self.table.clusters.len();
        let labels = &self.table.clusters;
        let mut chart = ChartBuilder::on(area)
            .margin(5)
            .x_label_area_size(20)
            .y_label_area_size(45)
            .build_cartesian_2d(-0.5f64..(n as f64 - 0.5), 0f64..1f64)?;
        chart
            .configure_mesh()
            .disable_x_mesh()
            .x_labels(n + 1)
            .x_label_formatter(&|x| category_label(labels, *x))
            .y_desc("fraction")
            .draw()?;
        for c in 0..n {
            let mut bottom = 0.0;
            for (r, sample) in self.table.samples.iter().enumerate() {
                let top = bottom + self.fractions[[r, c]];
                let color = self.palette.get(sample).unwrap_or(BLACK);
                chart.draw_series(std::iter::once(Rectangle::new(
                    [(c as f64 - 0.4, bottom), (c as f64 + 0.4, top)],
                    color.filled(),
                )))?;
                bottom = top;
            }
        }
        Ok(())
    }

    fn draw_entropy<DB: DrawingBackend>(&self, area: &DrawingArea<DB, Shift>, entropy: &[f64]) -> Result<(), Error>
    where
        DB::ErrorType: 'static,
    {
        let n = entropy.len();
        let mut chart = ChartBuilder::on(area)
            .margin(5)
            .y_label_area_size(45)
            .build_cartesian_2d(-0.5f64..(n as f64 - 0.5), 0f64..1f64)?;
        chart
            .configure_mesh()
            .disable_x_mesh()
            .x_labels(0)
            .y_labels(3)
            .y_desc("entropy")
            .draw()?;
        chart.draw_series(
            entropy
                .iter()
                .enumerate()
                .map(|(c, &e)| Rectangle::new([(c as f64 - 0.4, 0.0), (c as f64 + 0.4, e)], BLACK.mix(0.6).filled())),
        )?;
        Ok(())
    }

    fn draw_sizes<DB: DrawingBackend>(&self, area: &DrawingArea<DB, Shift>, sizes: &[usize]) -> Result<(), Error>
    where
        DB::ErrorType: 'static,
    {
        let n = sizes.len();
        let max = sizes.iter().copied().max().unwrap_or(1).max(1) as f64;
        let mut chart = ChartBuilder::on(area)
            .margin(5)
            .y_label_area_size(45)
            .build_cartesian_2d(-0.5f64..(n as f64 - 0.5), (1f64..max * 2.0).log_scale())?;
        chart
            .configure_mesh()
            .disable_x_mesh()
            .x_labels(0)
            .y_labels(3)
            .y_desc("cells")
            .draw()?;
        chart.draw_series(sizes.iter().enumerate().map(|(c, &s)| {
            Rectangle::new(
                [(c as f64 - 0.4, 1.0), (c as f64 + 0.4, (s as f64).max(1.0))],
                BLACK.mix(0.6).filled(),
            )
        }))?;
        Ok(())
    }
}

impl Chart for CompositionPlot {
    fn draw<DB: DrawingBackend>(&self, area: &DrawingArea<DB, Shift>) -> Result<(), Error>
    where
        DB::ErrorType: 'static,
    {
        let [legend_h, bar_h, entropy_h, size_h] = self.heights;
        let mut weights = vec![legend_h, bar_h];
        if self.entropy.is_some() {
            weights.push(entropy_h);
        }
        if self.sizes.is_some() {
            weights.push(size_h);
        }
        let parts = split_heights(area, &weights);
        let mut parts = parts.iter();
        if let Some(legend) = parts.next() {
            let entries = self.palette.iter().map(|(l, c)| (l.to_string(), c)).collect::<Vec<_>>();
            draw_legend(legend, &entries)?;
        }
        if let Some(bars) = parts.next() {
            if self.table.clusters.is_empty() {
                bars.draw_text("no cells", &text_style(14), (10, 10))?;
                return Ok(());
            }
            self.draw_bars(bars)?;
        }
        if let Some(entropy) = &self.entropy {
            if let Some(panel) = parts.next() {
                self.draw_entropy(panel, entropy)?;
            }
        }
        if let Some(sizes) = &self.sizes {
            if let Some(panel) = parts.next() {
                self.draw_sizes(panel, sizes)?;
            }
        }
        Ok(())
    }
}
