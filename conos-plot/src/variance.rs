//! Variance explained per component of the pairwise reductions.

use crate::palette::Palette;
use crate::render::{category_label, draw_box, draw_legend, padded_range, split_heights, Chart};
use crate::stats::BoxStats;
use anyhow::{bail, Error};
use conos_types::{Conos, ReductionSpace, Sample};
use itertools::Itertools;
use log::debug;
use plotters::coord::Shift;
use plotters::prelude::*;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct VarianceParams {
    /// Seed of the horizontal point jitter.
    pub seed: u64,
    pub jitter: f64,
    pub point_size: u32,
}

impl Default for VarianceParams {
    fn default() -> Self {
        VarianceParams {
            seed: 0,
            jitter: 0.2,
            point_size: 3,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VarianceRow {
    pub series: String,
    pub component: String,
    pub variance: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct VariancePlot {
    pub space: ReductionSpace,
    pub rows: Vec<VarianceRow>,
    pub series: Vec<String>,
    pub components: Vec<String>,
    params: VarianceParams,
}

/// Collect the per-component variance recorded for the pairs of `space`.
///
/// For PCA every dataset appears once, taken from the first pair that carries it.
/// For CPCA the space is shared within a pair, so each (pair, dataset) is its own
/// series, labelled `"dataset (a.vs.b)"`.
pub fn explained_variance<S: Sample>(
    conos: &Conos<S>,
    space: ReductionSpace,
    params: &VarianceParams,
) -> Result<VariancePlot, Error> {
    let annotated = conos
        .pairs(space)
        .iter()
        .filter_map(|p| p.variance.as_ref().map(|v| (p, v)))
        .collect::<Vec<_>>();
    if annotated.is_empty() {
        bail!(
            "no variance annotation stored for {} pairs; it is recorded when the graph is built",
            space
        );
    }

    let prefix = space.component_prefix();
    let mut rows = Vec::new();
    let mut seen = HashSet::new();
    for (pair, variance) in annotated {
        for (dataset, values) in variance {
            let series = match space {
                ReductionSpace::Pca => {
                    if !seen.insert(dataset.clone()) {
                        continue;
                    }
                    dataset.clone()
                }
                ReductionSpace::Cpca => format!("{} ({})", dataset, pair.label()),
            };
            rows.extend(values.iter().enumerate().map(|(i, &v)| VarianceRow {
                series: series.clone(),
                component: format!("{}{}", prefix, i + 1),
                variance: v,
            }));
        }
    }
    let series = rows.iter().map(|r| r.series.clone()).unique().collect::<Vec<_>>();
    let max_components = rows
        .iter()
        .filter_map(|r| r.component[prefix.len()..].parse::<usize>().ok())
        .max()
        .unwrap_or(0);
    let components = (1..=max_components).map(|i| format!("{prefix}{i}")).collect::<Vec<_>>();
    debug!("{} variance series over {} components", series.len(), components.len());
    Ok(VariancePlot {
        space,
        rows,
        series,
        components,
        params: params.clone(),
    })
}

impl Chart for VariancePlot {
    fn draw<DB: DrawingBackend>(&self, area: &DrawingArea<DB, Shift>) -> Result<(), Error>
    where
        DB::ErrorType: 'static,
    {
        let parts = split_heights(area, &[0.1, 0.9]);
        let palette = Palette::default_for(&self.series);
        let entries = palette.iter().map(|(l, c)| (l.to_string(), c)).collect::<Vec<_>>();
        draw_legend(&parts[0], &entries)?;

        let n = self.components.len();
        let y_range = padded_range(self.rows.iter().map(|r| r.variance).chain(std::iter::once(0.0)), 0.05);
        let mut chart = ChartBuilder::on(&parts[1])
            .margin(10)
            .x_label_area_size(30)
            .y_label_area_size(50)
            .build_cartesian_2d(-0.5f64..(n as f64 - 0.5), y_range)?;
        chart
            .configure_mesh()
            .disable_x_mesh()
            .x_labels(n + 1)
            .x_label_formatter(&|x| category_label(&self.components, *x))
            .x_desc(format!("{} component", self.space))
            .y_desc("explained variance")
            .draw()?;

        let position = |component: &str| self.components.iter().position(|c| c == component);
        for (i, component) in self.components.iter().enumerate() {
            let values = self
                .rows
                .iter()
                .filter(|r| &r.component == component)
                .map(|r| r.variance)
                .collect::<Vec<_>>();
            if let Some(stats) = BoxStats::new(&values) {
                draw_box(&mut chart, i as f64, 0.35, &stats, RGBColor(120, 120, 120))?;
            }
        }

        let mut rng = Pcg64::seed_from_u64(self.params.seed);
        let jitter = self.params.jitter.abs();
        for series in &self.series {
            let color = palette.get(series).unwrap_or(BLACK);
            let points = self
                .rows
                .iter()
                .filter(|r| &r.series == series)
                .filter_map(|r| {
                    let offset = if jitter > 0.0 { rng.gen_range(-jitter..jitter) } else { 0.0 };
                    position(&r.component).map(|x| (x as f64 + offset, r.variance))
                })
                .collect::<Vec<_>>();
            chart.draw_series(LineSeries::new(points.iter().copied(), color.stroke_width(1)))?;
            chart.draw_series(
                points
                    .iter()
                    .map(|&p| Circle::new(p, self.params.point_size, color.filled())),
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use conos_types::{FeatureBarcodeMatrix, PairInfo, SeuratSample};
    use std::collections::BTreeMap;

    fn con() -> Conos<SeuratSample> {
        let samples = ["a", "b", "c"]
            .iter()
            .map(|name| {
                SeuratSample::new(
                    FeatureBarcodeMatrix::from_triplets(*name, vec![format!("{name}1")], vec!["g".into()], &[])
                        .unwrap(),
                )
            })
            .collect::<Vec<_>>();
        let mut con = Conos::new(samples).unwrap();
        let pair = |x: &str, y: &str, vx: Vec<f64>, vy: Vec<f64>| PairInfo {
            datasets: (x.to_string(), y.to_string()),
            variance: Some(BTreeMap::from([(x.to_string(), vx), (y.to_string(), vy)])),
        };
        let pairs = vec![
            pair("a", "b", vec![0.5, 0.2, 0.1], vec![0.4, 0.3, 0.1]),
            pair("a", "c", vec![0.9, 0.05, 0.01], vec![0.6, 0.2, 0.1]),
        ];
        con.add_pairs(ReductionSpace::Pca, pairs.clone());
        con.add_pairs(ReductionSpace::Cpca, pairs);
        con
    }

    #[test]
    fn test_pca_deduplicates_datasets() {
        let plot = explained_variance(&con(), ReductionSpace::Pca, &VarianceParams::default()).unwrap();
        assert_eq!(plot.series, vec!["a", "b", "c"]);
        assert_eq!(plot.components, vec!["PC1", "PC2", "PC3"]);
        assert_eq!(plot.rows.len(), 9);
        // first pair wins for "a"
        let a1 = plot.rows.iter().find(|r| r.series == "a" && r.component == "PC1").unwrap();
        assert_eq!(a1.variance, 0.5);
        let svg = plot.to_svg_string((600, 400)).unwrap();
        assert!(svg.contains("PC2"));
    }

    #[test]
    fn test_cpca_series_per_pair() {
        let plot = explained_variance(&con(), ReductionSpace::Cpca, &VarianceParams::default()).unwrap();
        assert_eq!(
            plot.series,
            vec!["a (a.vs.b)", "b (a.vs.b)", "a (a.vs.c)", "c (a.vs.c)"]
        );
        assert_eq!(plot.components[0], "CPC1");
        assert_eq!(plot.rows.len(), 12);
    }

    #[test]
    fn test_missing_annotation() {
        let mut con = con();
        con.add_pairs(
            ReductionSpace::Cpca,
            vec![PairInfo {
                datasets: ("b".into(), "c".into()),
                variance: None,
            }],
        );
        assert!(explained_variance(&con, ReductionSpace::Cpca, &VarianceParams::default()).is_ok());

        let samples = vec![SeuratSample::new(
            FeatureBarcodeMatrix::from_triplets("a", vec!["a1".into()], vec!["g".into()], &[]).unwrap(),
        )];
        let mut bare = Conos::new(samples).unwrap();
        assert!(explained_variance(&bare, ReductionSpace::Pca, &VarianceParams::default()).is_err());
        bare.add_pairs(
            ReductionSpace::Pca,
            vec![PairInfo {
                datasets: ("a".into(), "b".into()),
                variance: None,
            }],
        );
        assert!(explained_variance(&bare, ReductionSpace::Pca, &VarianceParams::default()).is_err());
    }
}
