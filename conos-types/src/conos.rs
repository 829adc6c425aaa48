//! The joint results container: samples, clusterings over their union of cells,
//! and the pairwise reduction metadata written by graph construction.

use crate::embedding::Embedding;
use crate::factor::{Factor, NamedFactor};
use crate::sample::{ExpressionSource, Sample};
use anyhow::{bail, format_err, Error};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// Reduction spaces used for pairwise alignment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ReductionSpace {
    Pca,
    Cpca,
}

impl ReductionSpace {
    /// Prefix of component names in this space.
    pub fn component_prefix(self) -> &'static str {
        match self {
            ReductionSpace::Pca => "PC",
            ReductionSpace::Cpca => "CPC",
        }
    }
}

impl FromStr for ReductionSpace {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PCA" | "pca" => Ok(ReductionSpace::Pca),
            "CPCA" | "cpca" => Ok(ReductionSpace::Cpca),
            _ => bail!("reduction space not supported: {} (expected PCA or CPCA)", s),
        }
    }
}

impl fmt::Display for ReductionSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReductionSpace::Pca => f.write_str("PCA"),
            ReductionSpace::Cpca => f.write_str("CPCA"),
        }
    }
}

/// Metadata of one aligned sample pair.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PairInfo {
    pub datasets: (String, String),
    /// Explained variance per component for each dataset of the pair, when the
    /// graph construction step recorded it.
    #[serde(default)]
    pub variance: Option<BTreeMap<String, Vec<f64>>>,
}

impl PairInfo {
    pub fn label(&self) -> String {
        format!("{}.vs.{}", self.datasets.0, self.datasets.1)
    }
}

pub struct Conos<S: Sample> {
    samples: BTreeMap<String, S>,
    clusters: BTreeMap<String, NamedFactor>,
    pairs: BTreeMap<ReductionSpace, Vec<PairInfo>>,
    embedding: Option<Embedding>,
}

impl<S: Sample> Conos<S> {
    /// Cell names must be unique across samples.
    pub fn new<I>(samples: I) -> Result<Conos<S>, Error>
    where
        I: IntoIterator<Item = S>,
    {
        let mut map = BTreeMap::new();
        let mut seen = HashSet::new();
        for sample in samples {
            for cell in sample.cells() {
                if !seen.insert(cell.clone()) {
                    bail!("cell '{}' of sample '{}' is present in another sample", cell, sample.name());
                }
            }
            let name = sample.name().to_string();
            if map.insert(name.clone(), sample).is_some() {
                bail!("sample '{}' given twice", name);
            }
        }
        Ok(Conos {
            samples: map,
            clusters: BTreeMap::new(),
            pairs: BTreeMap::new(),
            embedding: None,
        })
    }

    pub fn samples(&self) -> &BTreeMap<String, S> {
        &self.samples
    }

    pub fn add_clustering(&mut self, name: &str, groups: NamedFactor) {
        self.clusters.insert(name.to_string(), groups);
    }

    pub fn clustering_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.clusters.keys().map(String::as_str)
    }

    pub fn clustering(&self, name: &str) -> Result<&NamedFactor, Error> {
        self.clusters.get(name).ok_or_else(|| {
            format_err!(
                "clustering '{}' does not exist, available: [{}]",
                name,
                self.clusters.keys().cloned().collect::<Vec<_>>().join(", ")
            )
        })
    }

    pub fn add_pairs(&mut self, space: ReductionSpace, pairs: Vec<PairInfo>) {
        self.pairs.entry(space).or_default().extend(pairs);
    }

    pub fn pairs(&self, space: ReductionSpace) -> &[PairInfo] {
        self.pairs.get(&space).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn set_embedding(&mut self, embedding: Embedding) {
        self.embedding = Some(embedding);
    }

    pub fn embedding(&self) -> Option<&Embedding> {
        self.embedding.as_ref()
    }

    /// The dataset each cell belongs to, levels in sample order.
    pub fn cell_samples(&self) -> Result<NamedFactor, Error> {
        let levels = self.samples.keys().cloned().collect::<Vec<_>>();
        let mut names = Vec::new();
        let mut labels = Vec::new();
        for (name, sample) in &self.samples {
            for cell in sample.cells() {
                names.push(cell.clone());
                labels.push(name.as_str());
            }
        }
        let factor = Factor::with_levels(labels.into_iter().map(Some), levels)?;
        NamedFactor::new(names, factor)
    }
}

impl<S: Sample> ExpressionSource for Conos<S> {
    fn cells(&self) -> Vec<String> {
        self.samples.values().flat_map(|s| s.cells().iter().cloned()).collect()
    }

    /// Genes measured in every sample, in the order of the first sample.
    fn genes(&self) -> Vec<String> {
        let mut iter = self.samples.values();
        let Some(first) = iter.next() else {
            return vec![];
        };
        let rest = iter.collect::<Vec<_>>();
        first
            .genes()
            .iter()
            .filter(|g| rest.iter().all(|s| s.has_gene(g)))
            .cloned()
            .collect()
    }

    /// Concatenation over samples. None unless every sample measures the gene.
    fn gene_expression(&self, gene: &str) -> Option<Array1<f64>> {
        let mut values = Vec::new();
        for sample in self.samples.values() {
            values.extend(sample.gene_expression(gene)?.iter().copied());
        }
        Some(Array1::from(values))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::matrix::FeatureBarcodeMatrix;
    use crate::sample::SeuratSample;

    fn sample(name: &str, cells: &[&str], genes: &[&str]) -> SeuratSample {
        let triplets = (0..cells.len()).map(|c| (0, c, 1.0 + c as f64)).collect::<Vec<_>>();
        SeuratSample::new(
            FeatureBarcodeMatrix::from_triplets(
                name,
                cells.iter().map(|c| c.to_string()).collect(),
                genes.iter().map(|g| g.to_string()).collect(),
                &triplets,
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_cells_and_genes() {
        let mut con = Conos::new(vec![
            sample("s2", &["b1", "b2"], &["g1", "g3"]),
            sample("s1", &["a1"], &["g1", "g2", "g3"]),
        ])
        .unwrap();
        assert_eq!(ExpressionSource::cells(&con), vec!["a1", "b1", "b2"]);
        assert_eq!(ExpressionSource::genes(&con), vec!["g1", "g3"]);
        assert_eq!(ExpressionSource::gene_expression(&con, "g1").unwrap().len(), 3);
        assert!(ExpressionSource::gene_expression(&con, "g2").is_none());

        let cs = con.cell_samples().unwrap();
        assert_eq!(cs.levels(), &["s1", "s2"]);
        assert_eq!(cs.get("b2"), Some("s2"));

        assert!(con.embedding().is_none());
        con.set_embedding(Embedding::from_rows(vec![("a1", 0.0, 1.0), ("b2", 2.0, 3.0)]).unwrap());
        assert_eq!(con.embedding().map(Embedding::len), Some(2));
    }

    #[test]
    fn test_duplicate_cells_rejected() {
        let res = Conos::new(vec![sample("s1", &["a1"], &["g1"]), sample("s2", &["a1"], &["g1"])]);
        assert!(res.is_err());
    }

    #[test]
    fn test_clustering_lookup() {
        let mut con = Conos::new(vec![sample("s1", &["a1"], &["g1"])]).unwrap();
        con.add_clustering("leiden", NamedFactor::from_pairs(vec![("a1", "1")]).unwrap());
        assert!(con.clustering("leiden").is_ok());
        let err = con.clustering("walktrap").unwrap_err();
        assert!(err.to_string().contains("leiden"));
        assert_eq!("CPCA".parse::<ReductionSpace>().unwrap(), ReductionSpace::Cpca);
        assert!("ICA".parse::<ReductionSpace>().is_err());
    }
}
