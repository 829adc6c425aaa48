//! Scatter panels of two-dimensional embeddings, composed into a grid.

use crate::palette::{ColorRamp, Palette};
use crate::render::{grid_shape, padded_range, split_heights, text_style, Chart};
use anyhow::{bail, Error};
use conos_types::{Embedding, NamedFactor, Sample};
use log::{debug, warn};
use plotters::coord::Shift;
use plotters::prelude::*;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct EmbeddingGridParams {
    /// Grid rows; derived from the panel count when unset.
    pub nrow: Option<usize>,
    /// Grid columns; derived from the panel count when unset.
    pub ncol: Option<usize>,
    pub point_size: u32,
    pub alpha: f64,
    /// Write the panel label in the top-left corner of each panel.
    pub show_labels: bool,
    /// Hex color per group level, replacing the hue palette.
    pub palette: Option<BTreeMap<String, String>>,
    pub title: Option<String>,
}

impl Default for EmbeddingGridParams {
    fn default() -> Self {
        EmbeddingGridParams {
            nrow: None,
            ncol: None,
            point_size: 2,
            alpha: 0.6,
            show_labels: true,
            palette: None,
            title: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct EmbeddingPoint {
    pub cell: String,
    pub x: f64,
    pub y: f64,
    pub group: Option<String>,
    pub value: Option<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EmbeddingPanel {
    pub label: String,
    pub points: Vec<EmbeddingPoint>,
}

/// How points are colored, shared by every panel of a grid.
#[derive(Clone, Debug, PartialEq)]
pub enum PointColors {
    Uniform,
    Groups(Palette),
    Values { ramp: ColorRamp, min: f64, max: f64 },
}

const POINT_GRAY: RGBColor = RGBColor(90, 90, 90);

impl PointColors {
    fn of(&self, point: &EmbeddingPoint) -> RGBColor {
        match self {
            PointColors::Uniform => POINT_GRAY,
            PointColors::Groups(palette) => point
                .group
                .as_deref()
                .and_then(|g| palette.get(g))
                .unwrap_or(POINT_GRAY),
            PointColors::Values { ramp, min, max } => match point.value {
                Some(v) => ramp.color_in(v, *min, *max),
                None => POINT_GRAY,
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct EmbeddingGrid {
    pub panels: Vec<EmbeddingPanel>,
    pub nrow: usize,
    pub ncol: usize,
    pub colors: PointColors,
    point_size: u32,
    alpha: f64,
    show_labels: bool,
    title: Option<String>,
}

impl EmbeddingGrid {
    /// The individual panels, without the grid composition.
    pub fn into_panels(self) -> Vec<EmbeddingPanel> {
        self.panels
    }

    fn draw_panel<DB: DrawingBackend>(&self, panel: &EmbeddingPanel, area: &DrawingArea<DB, Shift>) -> Result<(), Error>
    where
        DB::ErrorType: 'static,
    {
        let (w, h) = area.dim_in_pixel();
        area.draw(&Rectangle::new(
            [(0, 0), (w as i32 - 1, h as i32 - 1)],
            BLACK.mix(0.3).stroke_width(1),
        ))?;
        let x_range = padded_range(panel.points.iter().map(|p| p.x), 0.05);
        let y_range = padded_range(panel.points.iter().map(|p| p.y), 0.05);
        let mut chart = ChartBuilder::on(area).margin(6).build_cartesian_2d(x_range, y_range)?;
        chart.draw_series(panel.points.iter().map(|p| {
            Circle::new(
                (p.x, p.y),
                self.point_size,
                self.colors.of(p).mix(self.alpha).filled(),
            )
        }))?;
        if self.show_labels {
            area.draw_text(&panel.label, &text_style(14), (6, 4))?;
        }
        Ok(())
    }
}

impl Chart for EmbeddingGrid {
    fn draw<DB: DrawingBackend>(&self, area: &DrawingArea<DB, Shift>) -> Result<(), Error>
    where
        DB::ErrorType: 'static,
    {
        let titled;
        let area = match &self.title {
            Some(title) => {
                titled = area.titled(title, text_style(18))?;
                &titled
            }
            None => area,
        };
        let parts = match &self.colors {
            PointColors::Groups(_) => split_heights(area, &[0.92, 0.08]),
            _ => split_heights(area, &[1.0]),
        };
        let cells = parts[0].split_evenly((self.nrow, self.ncol));
        for (panel, cell) in self.panels.iter().zip(cells.iter()) {
            self.draw_panel(panel, cell)?;
        }
        if let (PointColors::Groups(palette), Some(legend)) = (&self.colors, parts.get(1)) {
            let entries = palette.iter().map(|(l, c)| (l.to_string(), c)).collect::<Vec<_>>();
            crate::render::draw_legend(legend, &entries)?;
        }
        Ok(())
    }
}

/// Build embedding panels, one per `(label, embedding)` in the given order.
///
/// Points come from the cells of `subset` when given, from all cells otherwise.
/// Continuous `values` take precedence over `groups` for coloring.
pub fn embedding_grid(
    embeddings: &[(String, Embedding)],
    groups: Option<&NamedFactor>,
    values: Option<&HashMap<String, f64>>,
    subset: Option<&[String]>,
    params: &EmbeddingGridParams,
) -> Result<EmbeddingGrid, Error> {
    let subset = subset.map(|s| s.iter().map(String::as_str).collect::<HashSet<_>>());
    let panels = embeddings
        .iter()
        .map(|(label, emb)| EmbeddingPanel {
            label: label.clone(),
            points: emb
                .iter()
                .filter(|(cell, _, _)| subset.as_ref().map_or(true, |s| s.contains(cell)))
                .map(|(cell, x, y)| EmbeddingPoint {
                    cell: cell.to_string(),
                    x,
                    y,
                    group: groups.and_then(|g| g.get(cell)).map(str::to_string),
                    value: values.and_then(|v| v.get(cell).copied()),
                })
                .collect(),
        })
        .collect::<Vec<_>>();

    let colors = match (values, groups) {
        (Some(_), _) => {
            let (min, max) = panels
                .iter()
                .flat_map(|p| p.points.iter().filter_map(|pt| pt.value))
                .filter(|v| v.is_finite())
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
            let (min, max) = if min <= max { (min, max) } else { (0.0, 1.0) };
            PointColors::Values {
                ramp: ColorRamp::gray_red(),
                min,
                max,
            }
        }
        (None, Some(g)) => match &params.palette {
            Some(colors) => PointColors::Groups(Palette::from_map(g.levels(), colors)?),
            None => PointColors::Groups(Palette::default_for(g.levels())),
        },
        (None, None) => PointColors::Uniform,
    };

    let (nrow, ncol) = grid_shape(panels.len(), params.nrow, params.ncol);
    debug!(
        "embedding grid: {} panels on {}x{}, {} points",
        panels.len(),
        nrow,
        ncol,
        panels.iter().map(|p| p.points.len()).sum::<usize>()
    );
    Ok(EmbeddingGrid {
        panels,
        nrow,
        ncol,
        colors,
        point_size: params.point_size,
        alpha: params.alpha,
        show_labels: params.show_labels,
        title: params.title.clone(),
    })
}

/// Where per-sample coordinates come from.
#[derive(Clone, Copy, Debug)]
pub enum EmbeddingSource<'a> {
    /// Each sample's own embedding of this kind (e.g. `"tSNE"`, `"UMAP"`).
    Named(&'a str),
    /// One joint embedding, split by sample.
    Shared(&'a Embedding),
}

/// One panel per sample. Samples without coordinates are dropped with a warning;
/// asking for an embedding kind that no sample has is an error. With `gene`,
/// points are colored by that gene's expression.
pub fn sample_embeddings<S: Sample>(
    samples: &BTreeMap<String, S>,
    source: EmbeddingSource,
    groups: Option<&NamedFactor>,
    gene: Option<&str>,
    params: &EmbeddingGridParams,
) -> Result<EmbeddingGrid, Error> {
    let mut embeddings = Vec::new();
    let mut kept = Vec::new();
    for (name, sample) in samples {
        let emb = match source {
            EmbeddingSource::Named(kind) => match sample.embedding(kind) {
                Some(e) => e.clone(),
                None => {
                    warn!("sample '{}' has no {} embedding, skipping it", name, kind);
                    continue;
                }
            },
            EmbeddingSource::Shared(joint) => {
                let e = joint.subset(sample.cells().iter().map(String::as_str));
                if e.is_empty() {
                    warn!("none of the cells of sample '{}' are in the embedding, skipping it", name);
                    continue;
                }
                e
            }
        };
        embeddings.push((name.clone(), emb));
        kept.push(sample);
    }
    if let EmbeddingSource::Named(kind) = source {
        if embeddings.is_empty() {
            bail!("no sample has a {} embedding", kind);
        }
    }

    let values = match gene {
        Some(gene) => {
            let mut values = HashMap::new();
            for sample in &kept {
                match sample.gene_expression(gene) {
                    Some(expr) => {
                        values.extend(sample.cells().iter().cloned().zip(expr.iter().copied()));
                    }
                    None => warn!("gene '{}' is not measured in sample '{}'", gene, sample.name()),
                }
            }
            if values.is_empty() {
                bail!("gene '{}' is not measured in any sample", gene);
            }
            Some(values)
        }
        None => None,
    };
    embedding_grid(&embeddings, groups, values.as_ref(), None, params)
}

#[cfg(test)]
mod test {
    use super::*;
    use conos_types::{FeatureBarcodeMatrix, SeuratSample};

    fn embeddings() -> Vec<(String, Embedding)> {
        vec![
            (
                "s1".to_string(),
                Embedding::from_rows(vec![("a1", 0.0, 0.0), ("a2", 1.0, 2.0), ("a3", -1.0, 0.5)]).unwrap(),
            ),
            (
                "s2".to_string(),
                Embedding::from_rows(vec![("b1", 3.0, 1.0), ("b2", 2.0, -2.0)]).unwrap(),
            ),
        ]
    }

    fn groups() -> NamedFactor {
        NamedFactor::from_pairs(vec![("a1", "x"), ("a2", "y"), ("b1", "x"), ("b2", "y")]).unwrap()
    }

    #[test]
    fn test_panels_are_deterministic() {
        let g = groups();
        let params = EmbeddingGridParams::default();
        let first = embedding_grid(&embeddings(), Some(&g), None, None, &params).unwrap();
        let second = embedding_grid(&embeddings(), Some(&g), None, None, &params).unwrap();
        assert_eq!(first, second);
        assert_eq!((first.nrow, first.ncol), (1, 2));

        let panels = first.into_panels();
        assert_eq!(panels.len(), 2);
        assert_eq!(panels[0].label, "s1");
        assert_eq!(panels[0].points[2].group, None);
        assert_eq!(panels[1].points[1].group.as_deref(), Some("y"));
    }

    #[test]
    fn test_subset_and_values() {
        let subset = vec!["a2".to_string(), "b1".to_string()];
        let values = vec![("a2".to_string(), 1.0), ("b1".to_string(), 3.0)]
            .into_iter()
            .collect::<HashMap<_, _>>();
        let params = EmbeddingGridParams {
            ncol: Some(1),
            ..EmbeddingGridParams::default()
        };
        let grid = embedding_grid(&embeddings(), Some(&groups()), Some(&values), Some(&subset), &params).unwrap();
        assert_eq!((grid.nrow, grid.ncol), (2, 1));
        assert_eq!(grid.panels[0].points.len(), 1);
        assert_eq!(grid.panels[0].points[0].cell, "a2");
        match &grid.colors {
            PointColors::Values { min, max, .. } => assert_eq!((*min, *max), (1.0, 3.0)),
            other => panic!("unexpected colors {:?}", other),
        }
    }

    #[test]
    fn test_empty_grid() {
        let grid = embedding_grid(&[], None, None, None, &EmbeddingGridParams::default()).unwrap();
        assert_eq!((grid.nrow, grid.ncol), (1, 1));
        assert!(grid.to_svg_string((200, 200)).is_ok());
    }

    #[test]
    fn test_palette_override_needs_every_level() {
        let mut colors = BTreeMap::new();
        colors.insert("x".to_string(), "#FF0000".to_string());
        let params = EmbeddingGridParams {
            palette: Some(colors.clone()),
            ..EmbeddingGridParams::default()
        };
        assert!(embedding_grid(&embeddings(), Some(&groups()), None, None, &params).is_err());
        colors.insert("y".to_string(), "#0000FF".to_string());
        let params = EmbeddingGridParams {
            palette: Some(colors),
            ..EmbeddingGridParams::default()
        };
        assert!(embedding_grid(&embeddings(), Some(&groups()), None, None, &params).is_ok());
    }

    #[test]
    fn test_explicit_grid_too_small() {
        let mut three = embeddings();
        three.push((
            "s3".to_string(),
            Embedding::from_rows(vec![("c1", 5.0, 5.0)]).unwrap(),
        ));
        let params = EmbeddingGridParams {
            nrow: Some(1),
            ncol: Some(1),
            ..EmbeddingGridParams::default()
        };
        let grid = embedding_grid(&three, None, None, None, &params).unwrap();
        assert_eq!((grid.nrow, grid.ncol), (3, 1));
        let svg = grid.to_svg_string((300, 600)).unwrap();
        for label in ["s1", "s2", "s3"] {
            assert!(svg.contains(label));
        }
    }

    #[test]
    fn test_render_labels() {
        let grid = embedding_grid(&embeddings(), Some(&groups()), None, None, &EmbeddingGridParams::default()).unwrap();
        let svg = grid.to_svg_string((400, 300)).unwrap();
        assert!(svg.contains("s1"));
        assert!(svg.contains("s2"));
        assert!(svg.contains("<circle"));
    }

    fn sample(name: &str, cells: &[&str]) -> SeuratSample {
        let triplets = (0..cells.len()).map(|c| (0, c, 1.0 + c as f64)).collect::<Vec<_>>();
        let counts = FeatureBarcodeMatrix::from_triplets(
            name,
            cells.iter().map(|c| c.to_string()).collect(),
            vec!["CD3E".to_string(), "MS4A1".to_string()],
            &triplets,
        )
        .unwrap();
        SeuratSample::new(counts)
    }

    #[test]
    fn test_sample_embeddings() {
        let mut s1 = sample("s1", &["a1", "a2", "a3"]);
        s1.add_reduction("UMAP", embeddings()[0].1.clone());
        let s2 = sample("s2", &["b1", "b2"]);
        let mut samples = BTreeMap::new();
        samples.insert("s1".to_string(), s1);
        samples.insert("s2".to_string(), s2);
        let params = EmbeddingGridParams::default();

        let grid = sample_embeddings(&samples, EmbeddingSource::Named("umap"), None, None, &params).unwrap();
        assert_eq!(grid.panels.len(), 1);
        assert!(sample_embeddings(&samples, EmbeddingSource::Named("tsne"), None, None, &params).is_err());

        let joint = Embedding::from_rows(vec![("a1", 0.0, 0.0), ("b2", 1.0, 1.0), ("zz", 5.0, 5.0)]).unwrap();
        let grid = sample_embeddings(
            &samples,
            EmbeddingSource::Shared(&joint),
            None,
            Some("CD3E"),
            &params,
        )
        .unwrap();
        assert_eq!(grid.panels.len(), 2);
        assert_eq!(grid.panels[1].points[0].cell, "b2");
        assert!(grid.panels[0].points[0].value.unwrap() > 0.0);
        assert!(sample_embeddings(&samples, EmbeddingSource::Shared(&joint), None, Some("NOPE"), &params).is_err());
    }
}
