//! Per-cluster boxplots of sample-level cell counts or proportions, split by a
//! grouping of samples into conditions.

use crate::palette::Palette;
use crate::render::{category_label, draw_box, grid_shape, padded_range, text_style, Chart};
use crate::stats::BoxStats;
use anyhow::{bail, Error};
use conos_types::{Conos, NamedFactor, Sample};
use log::{debug, warn};
use plotters::coord::Shift;
use plotters::prelude::*;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum SummaryKind {
    Counts,
    Proportions,
}

impl FromStr for SummaryKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "counts" => Ok(SummaryKind::Counts),
            "proportions" => Ok(SummaryKind::Proportions),
            _ => bail!("summary type not recognized: {} (expected counts or proportions)", s),
        }
    }
}

impl TryFrom<String> for SummaryKind {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl fmt::Display for SummaryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SummaryKind::Counts => f.write_str("counts"),
            SummaryKind::Proportions => f.write_str("proportions"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProportionParams {
    pub clustering: String,
    pub summary: SummaryKind,
    /// Hex color per sample category, replacing the hue palette.
    pub palette: Option<BTreeMap<String, String>>,
    pub point_size: u32,
    /// Seed of the horizontal point jitter.
    pub seed: u64,
    pub ncol: Option<usize>,
}

impl Default for ProportionParams {
    fn default() -> Self {
        ProportionParams {
            clustering: "multilevel".to_string(),
            summary: SummaryKind::Proportions,
            palette: None,
            point_size: 3,
            seed: 0,
            ncol: None,
        }
    }
}

/// One row of the long table: the value of one cluster in one sample.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProportionRow {
    pub sample: String,
    pub category: String,
    pub cluster: String,
    pub value: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProportionPlot {
    pub rows: Vec<ProportionRow>,
    pub clusters: Vec<String>,
    pub categories: Vec<String>,
    pub summary: SummaryKind,
    pub palette: Palette,
    point_size: u32,
    seed: u64,
    ncol: Option<usize>,
}

impl ProportionPlot {
    pub fn into_rows(self) -> Vec<ProportionRow> {
        self.rows
    }

    fn values(&self, cluster: &str, category: &str) -> Vec<f64> {
        self.rows
            .iter()
            .filter(|r| r.cluster == cluster && r.category == category)
            .map(|r| r.value)
            .collect()
    }
}

/// Summarize each sample's cells per cluster, tagged with the sample's category
/// in `sample_groups` (sample name → category).
pub fn celltype_proportions<S: Sample>(
    conos: &Conos<S>,
    sample_groups: Option<&NamedFactor>,
    params: &ProportionParams,
) -> Result<ProportionPlot, Error> {
    let Some(sample_groups) = sample_groups else {
        bail!("a grouping of samples into categories is required");
    };
    if sample_groups.levels().is_empty() {
        bail!("the sample grouping has no categories");
    }
    let clustering = conos.clustering(&params.clustering)?;
    let clusters = clustering.levels().to_vec();

    let mut rows = Vec::new();
    for (name, sample) in conos.samples() {
        let Some(category) = sample_groups.get(name) else {
            warn!("sample '{}' is not part of the sample grouping, skipping it", name);
            continue;
        };
        let mut counts = vec![0usize; clusters.len()];
        for cell in sample.cells() {
            if let Some(code) = clustering.position(cell).and_then(|i| clustering.factor().code(i)) {
                counts[code] += 1;
            }
        }
        let total = counts.iter().sum::<usize>();
        if total == 0 && params.summary == SummaryKind::Proportions {
            warn!("sample '{}' has no clustered cells", name);
        }
        for (cluster, &count) in clusters.iter().zip(&counts) {
            let value = match params.summary {
                SummaryKind::Counts => count as f64,
                SummaryKind::Proportions if total > 0 => count as f64 / total as f64,
                SummaryKind::Proportions => 0.0,
            };
            rows.push(ProportionRow {
                sample: name.clone(),
                category: category.to_string(),
                cluster: cluster.clone(),
                value,
            });
        }
    }
    debug!("{} rows of per-sample {}", rows.len(), params.summary);

    let categories = sample_groups.levels().to_vec();
    let palette = match &params.palette {
        Some(colors) => Palette::from_map(&categories, colors)?,
        None => Palette::default_for(&categories),
    };
    Ok(ProportionPlot {
        rows,
        clusters,
        categories,
        summary: params.summary,
        palette,
        point_size: params.point_size,
        seed: params.seed,
        ncol: params.ncol,
    })
}

impl Chart for ProportionPlot {
    fn draw<DB: DrawingBackend>(&self, area: &DrawingArea<DB, Shift>) -> Result<(), Error>
    where
        DB::ErrorType: 'static,
    {
        let (nrow, ncol) = grid_shape(self.clusters.len(), None, self.ncol);
        let panels = area.split_evenly((nrow, ncol));
        let mut rng = Pcg64::seed_from_u64(self.seed);
        let n_cat = self.categories.len();
        for (cluster, panel) in self.clusters.iter().zip(panels.iter()) {
            let y_range = padded_range(
                self.rows
                    .iter()
                    .filter(|r| &r.cluster == cluster)
                    .map(|r| r.value)
                    .chain(std::iter::once(0.0)),
                0.05,
            );
            let mut chart = ChartBuilder::on(panel)
                .caption(cluster, text_style(14))
                .margin(5)
                .x_label_area_size(20)
                .y_label_area_size(40)
                .build_cartesian_2d(-0.5f64..(n_cat as f64 - 0.5), y_range)?;
            chart
                .configure_mesh()
                .disable_x_mesh()
                .x_labels(n_cat + 1)
                .x_label_formatter(&|x| category_label(&self.categories, *x))
                .y_labels(4)
                .y_desc(self.summary.to_string())
                .draw()?;
            for (i, category) in self.categories.iter().enumerate() {
                let color = self.palette.get(category).unwrap_or(BLACK);
                let values = self.values(cluster, category);
                if let Some(stats) = BoxStats::new(&values) {
                    draw_box(&mut chart, i as f64, 0.3, &stats, color)?;
                }
                let points = values
                    .iter()
                    .map(|&v| (i as f64 + rng.gen_range(-0.15..0.15), v))
                    .collect::<Vec<_>>();
                chart.draw_series(
                    points
                        .into_iter()
                        .map(|p| Circle::new(p, self.point_size, color.mix(0.8).filled())),
                )?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;
    use conos_types::{FeatureBarcodeMatrix, SeuratSample};

    fn con() -> Conos<SeuratSample> {
        let layout = [("ctrl1", 4usize), ("ctrl2", 2), ("dis1", 3), ("orphan", 1)];
        let mut samples = Vec::new();
        let mut labels = Vec::new();
        for (name, n) in layout {
            let cells = (0..n).map(|i| format!("{name}-{i}")).collect::<Vec<_>>();
            for (i, cell) in cells.iter().enumerate() {
                labels.push((cell.clone(), if i % 2 == 0 { "T" } else { "B" }));
            }
            samples.push(SeuratSample::new(
                FeatureBarcodeMatrix::from_triplets(name, cells, vec!["g".to_string()], &[]).unwrap(),
            ));
        }
        let mut con = Conos::new(samples).unwrap();
        con.add_clustering("multilevel", NamedFactor::from_pairs(labels).unwrap());
        con
    }

    fn groups() -> NamedFactor {
        NamedFactor::from_pairs(vec![("ctrl1", "control"), ("ctrl2", "control"), ("dis1", "disease")]).unwrap()
    }

    #[test]
    fn test_proportions_table() {
        let plot = celltype_proportions(&con(), Some(&groups()), &ProportionParams::default()).unwrap();
        assert_eq!(plot.clusters, vec!["B", "T"]);
        assert_eq!(plot.categories, vec!["control", "disease"]);
        // orphan is not in the grouping
        assert_eq!(plot.rows.len(), 6);
        let dis_t = plot
            .rows
            .iter()
            .find(|r| r.sample == "dis1" && r.cluster == "T")
            .unwrap();
        assert_eq!(dis_t.category, "disease");
        assert_abs_diff_eq!(dis_t.value, 2.0 / 3.0, epsilon = 1e-12);
        for sample in ["ctrl1", "ctrl2", "dis1"] {
            let total = plot.rows.iter().filter(|r| r.sample == sample).map(|r| r.value).sum::<f64>();
            assert_abs_diff_eq!(total, 1.0, epsilon = 1e-12);
        }
        assert!(plot.to_svg_string((500, 300)).is_ok());
    }

    #[test]
    fn test_counts() {
        let params = ProportionParams {
            summary: "counts".parse().unwrap(),
            ..ProportionParams::default()
        };
        let plot = celltype_proportions(&con(), Some(&groups()), &params).unwrap();
        let rows = plot.into_rows();
        let ctrl1_b = rows.iter().find(|r| r.sample == "ctrl1" && r.cluster == "B").unwrap();
        assert_eq!(ctrl1_b.value, 2.0);
    }

    #[test]
    fn test_errors() {
        let con = con();
        assert!(celltype_proportions(&con, None, &ProportionParams::default()).is_err());
        let empty = NamedFactor::new(vec![], conos_types::Factor::new::<&str>(&[])).unwrap();
        assert!(celltype_proportions(&con, Some(&empty), &ProportionParams::default()).is_err());
        let params = ProportionParams {
            clustering: "walktrap".into(),
            ..ProportionParams::default()
        };
        assert!(celltype_proportions(&con, Some(&groups()), &params).is_err());
        assert!("fractions".parse::<SummaryKind>().is_err());
        let parsed: ProportionParams = serde_json::from_str(r#"{"summary": "counts"}"#).unwrap();
        assert_eq!(parsed.summary, SummaryKind::Counts);
        assert_eq!(parsed.clustering, "multilevel");
        assert!(serde_json::from_str::<ProportionParams>(r#"{"summary": "bogus"}"#).is_err());
    }
}
