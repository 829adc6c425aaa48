//! Per-cluster differential expression tables.

use anyhow::{bail, format_err, Error};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Score columns a DE table may carry. `Auc` is the effect size.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ScoreColumn {
    Z,
    Auc,
    Specificity,
    Precision,
    ExpressionFraction,
    PValue,
    AdjustedPValue,
}

impl ScoreColumn {
    pub fn name(self) -> &'static str {
        match self {
            ScoreColumn::Z => "Z",
            ScoreColumn::Auc => "AUC",
            ScoreColumn::Specificity => "Specificity",
            ScoreColumn::Precision => "Precision",
            ScoreColumn::ExpressionFraction => "ExpressionFraction",
            ScoreColumn::PValue => "PValue",
            ScoreColumn::AdjustedPValue => "AdjustedPValue",
        }
    }
}

impl fmt::Display for ScoreColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ScoreColumn {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "z" => Ok(ScoreColumn::Z),
            "auc" => Ok(ScoreColumn::Auc),
            "specificity" => Ok(ScoreColumn::Specificity),
            "precision" => Ok(ScoreColumn::Precision),
            "expressionfraction" => Ok(ScoreColumn::ExpressionFraction),
            "pvalue" => Ok(ScoreColumn::PValue),
            "adjustedpvalue" => Ok(ScoreColumn::AdjustedPValue),
            _ => bail!("DE score column not recognized: {}", s),
        }
    }
}

/// Gene ordering used to pick the top genes of a cluster, written like `-AUC`
/// (descending) or `Specificity` (ascending).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct GeneOrdering {
    pub column: ScoreColumn,
    pub descending: bool,
}

impl Default for GeneOrdering {
    fn default() -> Self {
        GeneOrdering {
            column: ScoreColumn::Auc,
            descending: true,
        }
    }
}

impl FromStr for GeneOrdering {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (descending, name) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        Ok(GeneOrdering {
            column: name.parse()?,
            descending,
        })
    }
}

impl TryFrom<String> for GeneOrdering {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl fmt::Display for GeneOrdering {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.descending {
            write!(f, "-{}", self.column)
        } else {
            write!(f, "{}", self.column)
        }
    }
}

/// Marker genes of one cluster, one row per gene.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeTable {
    genes: Vec<String>,
    columns: BTreeMap<ScoreColumn, Vec<f64>>,
}

/// DE tables keyed by cluster label.
pub type ClusterDe = BTreeMap<String, DeTable>;

impl DeTable {
    pub fn new(genes: Vec<String>) -> DeTable {
        DeTable {
            genes,
            columns: BTreeMap::new(),
        }
    }

    /// Add a score column. Its length must match the gene count.
    pub fn with_column(mut self, column: ScoreColumn, values: Vec<f64>) -> Result<DeTable, Error> {
        if values.len() != self.genes.len() {
            bail!(
                "column {} has {} values for {} genes",
                column,
                values.len(),
                self.genes.len()
            );
        }
        self.columns.insert(column, values);
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.genes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }

    pub fn genes(&self) -> &[String] {
        &self.genes
    }

    pub fn has_column(&self, column: ScoreColumn) -> bool {
        self.columns.contains_key(&column)
    }

    pub fn column(&self, column: ScoreColumn) -> Option<&[f64]> {
        self.columns.get(&column).map(Vec::as_slice)
    }

    fn select(&self, rows: &[usize]) -> DeTable {
        DeTable {
            genes: rows.iter().map(|&i| self.genes[i].clone()).collect(),
            columns: self
                .columns
                .iter()
                .map(|(k, v)| (*k, rows.iter().map(|&i| v[i]).collect()))
                .collect(),
        }
    }

    /// Keep rows whose `column` is at least `min`. None when the column is absent.
    pub fn filter_min(&self, column: ScoreColumn, min: f64) -> Option<DeTable> {
        let values = self.column(column)?;
        let rows = (0..self.len()).filter(|&i| values[i] >= min).collect::<Vec<_>>();
        Some(self.select(&rows))
    }

    /// Stable sort by the ordering. NaN scores sort last either way.
    pub fn order_by(&self, ordering: GeneOrdering) -> Result<DeTable, Error> {
        let values = self.column(ordering.column).ok_or_else(|| {
            format_err!(
                "cannot order genes by {}: the DE table has no such column",
                ordering.column
            )
        })?;
        let mut rows = (0..self.len()).collect::<Vec<_>>();
        rows.sort_by(|&a, &b| {
            let (x, y) = (values[a], values[b]);
            match (x.is_nan(), y.is_nan()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                _ if ordering.descending => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
                _ => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            }
        });
        Ok(self.select(&rows))
    }

    pub fn head(&self, n: usize) -> DeTable {
        let rows = (0..self.len().min(n)).collect::<Vec<_>>();
        self.select(&rows)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn table() -> DeTable {
        DeTable::new(vec!["g1".into(), "g2".into(), "g3".into()])
            .with_column(ScoreColumn::Auc, vec![0.7, 0.9, f64::NAN])
            .unwrap()
            .with_column(ScoreColumn::Specificity, vec![0.5, 0.1, 0.8])
            .unwrap()
    }

    #[test]
    fn test_parse_ordering() {
        let o: GeneOrdering = "-AUC".parse().unwrap();
        assert_eq!(o, GeneOrdering::default());
        let o: GeneOrdering = "Specificity".parse().unwrap();
        assert!(!o.descending);
        assert_eq!(o.column, ScoreColumn::Specificity);
        assert_eq!(o.to_string(), "Specificity");
        assert!("-Bogus".parse::<GeneOrdering>().is_err());
    }

    #[test]
    fn test_order_and_filter() {
        let t = table();
        let ordered = t.order_by(GeneOrdering::default()).unwrap();
        assert_eq!(ordered.genes(), &["g2", "g1", "g3"]);
        assert_eq!(ordered.head(1).genes(), &["g2"]);

        let filtered = t.filter_min(ScoreColumn::Specificity, 0.5).unwrap();
        assert_eq!(filtered.genes(), &["g1", "g3"]);
        assert!(t.filter_min(ScoreColumn::Precision, 0.5).is_none());
        assert!(t.order_by("-Precision".parse().unwrap()).is_err());
    }

    #[test]
    fn test_column_length_checked() {
        assert!(DeTable::new(vec!["g1".into()]).with_column(ScoreColumn::Z, vec![]).is_err());
    }
}
