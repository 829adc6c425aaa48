//! Column tracks above the heatmap and the gene → cluster row annotation.

use super::select::GeneRow;
use crate::palette::Palette;
use anyhow::{bail, Error};
use conos_types::{Factor, NamedFactor};
use log::warn;
use std::collections::{BTreeMap, HashSet};

/// Per-cell metadata shown as extra column tracks.
#[derive(Clone, Debug, PartialEq)]
pub enum ColumnMetadata {
    /// Named per-cell factors.
    Factors(Vec<(String, NamedFactor)>),
    /// A table with one row per cell and one column per track.
    Table {
        cells: Vec<String>,
        columns: Vec<(String, Vec<Option<String>>)>,
    },
}

impl ColumnMetadata {
    pub fn into_factors(self) -> Result<Vec<(String, NamedFactor)>, Error> {
        match self {
            ColumnMetadata::Factors(factors) => Ok(factors),
            ColumnMetadata::Table { cells, columns } => columns
                .into_iter()
                .map(|(name, labels)| {
                    if labels.len() != cells.len() {
                        bail!(
                            "metadata column '{}' has {} values for {} cells",
                            name,
                            labels.len(),
                            cells.len()
                        );
                    }
                    let factor = Factor::from_options(labels.iter().map(|l| l.as_deref()));
                    Ok((name, NamedFactor::new(cells.clone(), factor)?))
                })
                .collect(),
        }
    }
}

/// One row of colored cells above the heatmap.
#[derive(Clone, Debug, PartialEq)]
pub struct AnnotationTrack {
    pub name: String,
    /// Label of each heatmap column.
    pub labels: Vec<Option<String>>,
    pub palette: Palette,
}

/// Colors of every cluster level. Caller colors are put in level order and must
/// cover all levels.
pub(crate) fn cluster_palette(
    levels: &[String],
    colors: Option<&BTreeMap<String, String>>,
) -> Result<Palette, Error> {
    match colors {
        Some(colors) => Palette::from_map(levels, colors),
        None => Ok(Palette::default_for(levels)),
    }
}

/// A metadata track over `cells`. Caller colors are used when they cover every
/// level of the track, the hue palette otherwise.
pub(crate) fn metadata_track(
    name: &str,
    factor: &NamedFactor,
    cells: &[String],
    colors: Option<&BTreeMap<String, String>>,
) -> Result<AnnotationTrack, Error> {
    let labels = cells
        .iter()
        .map(|c| factor.get(c).map(str::to_string))
        .collect::<Vec<_>>();
    let palette = match colors {
        Some(colors) if Palette::covers(factor.levels(), colors) => Palette::from_map(factor.levels(), colors)?,
        Some(_) => {
            warn!("colors for metadata '{}' don't cover every level, using the default palette", name);
            Palette::default_for(factor.levels())
        }
        None => Palette::default_for(factor.levels()),
    };
    Ok(AnnotationTrack {
        name: name.to_string(),
        labels,
        palette,
    })
}

/// Gene → cluster, first selection of each gene.
pub(crate) fn row_annotation(rows: &[GeneRow]) -> Vec<(String, String)> {
    let mut seen = HashSet::new();
    rows.iter()
        .filter(|r| seen.insert(r.gene.as_str()))
        .map(|r| (r.gene.clone(), r.cluster.clone()))
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_table_metadata() {
        let meta = ColumnMetadata::Table {
            cells: vec!["c1".into(), "c2".into()],
            columns: vec![("batch".into(), vec![Some("b1".into()), None])],
        };
        let factors = meta.into_factors().unwrap();
        assert_eq!(factors[0].0, "batch");
        assert_eq!(factors[0].1.get("c1"), Some("b1"));
        assert_eq!(factors[0].1.get("c2"), None);

        let bad = ColumnMetadata::Table {
            cells: vec!["c1".into()],
            columns: vec![("batch".into(), vec![])],
        };
        assert!(bad.into_factors().is_err());
    }

    #[test]
    fn test_metadata_colors_fallback() {
        let factor = NamedFactor::from_pairs(vec![("c1", "x"), ("c2", "y")]).unwrap();
        let cells = vec!["c2".to_string(), "c1".to_string(), "c3".to_string()];
        let mut colors = BTreeMap::new();
        colors.insert("x".to_string(), "#000000".to_string());
        let track = metadata_track("batch", &factor, &cells, Some(&colors)).unwrap();
        assert_eq!(track.labels, vec![Some("y".to_string()), Some("x".to_string()), None]);
        assert_eq!(track.palette, Palette::default_for(&["x", "y"]));

        colors.insert("y".to_string(), "#FFFFFF".to_string());
        let track = metadata_track("batch", &factor, &cells, Some(&colors)).unwrap();
        assert_eq!(track.palette.to_hex_map()["y"], "#FFFFFF");
    }

    #[test]
    fn test_row_annotation_dedup() {
        let rows = vec![
            GeneRow {
                gene: "g1".into(),
                cluster: "A".into(),
            },
            GeneRow {
                gene: "g1".into(),
                cluster: "B".into(),
            },
            GeneRow {
                gene: "g2".into(),
                cluster: "B".into(),
            },
        ];
        assert_eq!(
            row_annotation(&rows),
            vec![("g1".to_string(), "A".to_string()), ("g2".to_string(), "B".to_string())]
        );
    }
}
