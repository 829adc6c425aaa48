//! Sample containers. Both flavours expose the same capability set through
//! [`Sample`]; they differ in how they store counts and reductions.

use crate::de::ClusterDe;
use crate::embedding::Embedding;
use crate::matrix::FeatureBarcodeMatrix;
use anyhow::{bail, Error};
use ndarray::Array1;
use sprs::{CsMat, TriMat};
use std::collections::{BTreeMap, HashMap};

/// Operations the plotting layer needs from one input dataset.
pub trait Sample {
    fn name(&self) -> &str;

    /// Cell barcodes, in matrix column order.
    fn cells(&self) -> &[String];

    /// Raw counts, genes x cells.
    fn count_matrix(&self) -> &FeatureBarcodeMatrix;

    /// Embedding stored under `kind`, if any.
    fn embedding(&self, kind: &str) -> Option<&Embedding>;

    /// Normalized expression of `gene` for every cell, None when the gene is absent.
    fn gene_expression(&self, gene: &str) -> Option<Array1<f64>>;

    /// Stored per-cluster DE result for a clustering, if one was computed.
    fn differential_genes(&self, clustering: &str) -> Option<&ClusterDe>;

    fn genes(&self) -> &[String] {
        &self.count_matrix().feature_names
    }

    fn has_gene(&self, gene: &str) -> bool {
        self.count_matrix().feature_index(gene).is_some()
    }
}

/// Anything that can produce per-cell expression of named genes over a fixed cell set.
pub trait ExpressionSource {
    fn cells(&self) -> Vec<String>;

    /// Genes available for every cell.
    fn genes(&self) -> Vec<String>;

    fn gene_expression(&self, gene: &str) -> Option<Array1<f64>>;
}

/// Pagoda2-style container: depth-normalized, log-transformed counts stored
/// cells x genes in CSC so a gene is one outer view; embeddings keyed by
/// `"<reduction>/<method>"` (e.g. `"PCA/tSNE"`).
#[derive(Clone, Debug)]
pub struct Pagoda2Sample {
    counts: FeatureBarcodeMatrix,
    normalized: CsMat<f64>,
    embeddings: BTreeMap<String, Embedding>,
    de: BTreeMap<String, ClusterDe>,
}

const PAGODA2_DEPTH_SCALE: f64 = 1e3;

impl Pagoda2Sample {
    pub fn new(counts: FeatureBarcodeMatrix) -> Pagoda2Sample {
        let depth = counts.barcode_totals();
        let mut tri = TriMat::with_capacity((counts.cols(), counts.rows()), counts.nnz());
        for (&val, (gene, cell)) in counts.matrix.iter() {
            if depth[cell] > 0.0 {
                tri.add_triplet(cell, gene, (val * PAGODA2_DEPTH_SCALE / depth[cell]).ln_1p());
            }
        }
        Pagoda2Sample {
            normalized: tri.to_csc(),
            counts,
            embeddings: BTreeMap::new(),
            de: BTreeMap::new(),
        }
    }

    /// Store an embedding under `"<reduction>/<method>"`. Cells must be part of the sample.
    pub fn add_embedding(&mut self, reduction: &str, method: &str, embedding: Embedding) -> Result<(), Error> {
        if let Some(cell) = embedding.cells().iter().find(|c| !self.counts.barcodes.contains(*c)) {
            bail!("embedding cell '{}' is not part of sample '{}'", cell, self.counts.name);
        }
        self.embeddings.insert(format!("{reduction}/{method}"), embedding);
        Ok(())
    }

    pub fn add_differential_genes(&mut self, clustering: &str, de: ClusterDe) {
        self.de.insert(clustering.to_string(), de);
    }
}

impl Sample for Pagoda2Sample {
    fn name(&self) -> &str {
        &self.counts.name
    }

    fn cells(&self) -> &[String] {
        &self.counts.barcodes
    }

    fn count_matrix(&self) -> &FeatureBarcodeMatrix {
        &self.counts
    }

    /// Looks up the full `"<reduction>/<method>"` key first, then a bare method
    /// name against any reduction.
    fn embedding(&self, kind: &str) -> Option<&Embedding> {
        self.embeddings.get(kind).or_else(|| {
            self.embeddings
                .iter()
                .find(|(k, _)| k.rsplit('/').next() == Some(kind))
                .map(|(_, e)| e)
        })
    }

    fn gene_expression(&self, gene: &str) -> Option<Array1<f64>> {
        let idx = self.counts.feature_index(gene)?;
        let mut values = Array1::zeros(self.counts.cols());
        if let Some(col) = self.normalized.outer_view(idx) {
            for (cell, &val) in col.iter() {
                values[cell] = val;
            }
        }
        Some(values)
    }

    fn differential_genes(&self, clustering: &str) -> Option<&ClusterDe> {
        self.de.get(clustering)
    }
}

/// Seurat-style container: raw counts plus log-normalized `data`, both genes x cells,
/// and named reductions.
#[derive(Clone, Debug)]
pub struct SeuratSample {
    counts: FeatureBarcodeMatrix,
    data: CsMat<f64>,
    reductions: HashMap<String, Embedding>,
    markers: BTreeMap<String, ClusterDe>,
}

const SEURAT_SCALE_FACTOR: f64 = 1e4;

impl SeuratSample {
    /// Log-normalize: counts scaled to 10,000 per cell, then `x -> ln(1 + x)`.
    pub fn new(counts: FeatureBarcodeMatrix) -> SeuratSample {
        let totals = counts.barcode_totals();
        let mut tri = TriMat::with_capacity((counts.rows(), counts.cols()), counts.nnz());
        for (&val, (gene, cell)) in counts.matrix.iter() {
            if totals[cell] > 0.0 {
                tri.add_triplet(gene, cell, (val * SEURAT_SCALE_FACTOR / totals[cell]).ln_1p());
            }
        }
        let data = tri.to_csr();
        SeuratSample {
            counts,
            data,
            reductions: HashMap::new(),
            markers: BTreeMap::new(),
        }
    }

    pub fn add_reduction(&mut self, name: &str, embedding: Embedding) {
        self.reductions.insert(name.to_ascii_lowercase(), embedding);
    }

    pub fn add_markers(&mut self, clustering: &str, de: ClusterDe) {
        self.markers.insert(clustering.to_string(), de);
    }
}

impl Sample for SeuratSample {
    fn name(&self) -> &str {
        &self.counts.name
    }

    fn cells(&self) -> &[String] {
        &self.counts.barcodes
    }

    fn count_matrix(&self) -> &FeatureBarcodeMatrix {
        &self.counts
    }

    /// Reduction names are case-insensitive (`"UMAP"` and `"umap"` are the same).
    fn embedding(&self, kind: &str) -> Option<&Embedding> {
        self.reductions.get(&kind.to_ascii_lowercase())
    }

    fn gene_expression(&self, gene: &str) -> Option<Array1<f64>> {
        let idx = self.counts.feature_index(gene)?;
        let mut values = Array1::zeros(self.counts.cols());
        if let Some(row) = self.data.outer_view(idx) {
            for (cell, &val) in row.iter() {
                values[cell] = val;
            }
        }
        Some(values)
    }

    fn differential_genes(&self, clustering: &str) -> Option<&ClusterDe> {
        self.markers.get(clustering)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn counts(name: &str) -> FeatureBarcodeMatrix {
        FeatureBarcodeMatrix::from_triplets(
            name,
            vec!["c1".into(), "c2".into()],
            vec!["g1".into(), "g2".into()],
            &[(0, 0, 1.0), (1, 0, 3.0), (1, 1, 2.0)],
        )
        .unwrap()
    }

    #[test]
    fn test_pagoda2_expression() {
        let s = Pagoda2Sample::new(counts("p2"));
        let g1 = s.gene_expression("g1").unwrap();
        assert_abs_diff_eq!(g1[0], (1.0f64 * 1e3 / 4.0).ln_1p(), epsilon = 1e-12);
        assert_eq!(g1[1], 0.0);
        assert!(s.gene_expression("g9").is_none());
        assert_eq!(s.genes(), &["g1", "g2"]);
    }

    #[test]
    fn test_seurat_expression() {
        let s = SeuratSample::new(counts("seu"));
        let g2 = s.gene_expression("g2").unwrap();
        assert_abs_diff_eq!(g2[0], (3.0f64 * 1e4 / 4.0).ln_1p(), epsilon = 1e-12);
        assert_abs_diff_eq!(g2[1], (2.0f64 * 1e4 / 2.0).ln_1p(), epsilon = 1e-12);
    }

    #[test]
    fn test_stored_de() {
        let mut de = ClusterDe::new();
        de.insert("1".to_string(), crate::de::DeTable::new(vec!["g2".to_string()]));
        let mut p2 = Pagoda2Sample::new(counts("p2"));
        assert!(p2.differential_genes("leiden").is_none());
        p2.add_differential_genes("leiden", de.clone());
        assert_eq!(p2.differential_genes("leiden"), Some(&de));

        let mut seu = SeuratSample::new(counts("seu"));
        seu.add_markers("leiden", de);
        assert!(seu.differential_genes("leiden").is_some());
        assert!(seu.differential_genes("walktrap").is_none());
    }

    #[test]
    fn test_embedding_lookup() {
        let emb = Embedding::from_rows(vec![("c1", 0.0, 0.0), ("c2", 1.0, 1.0)]).unwrap();
        let mut p2 = Pagoda2Sample::new(counts("p2"));
        p2.add_embedding("PCA", "tSNE", emb.clone()).unwrap();
        assert!(p2.embedding("PCA/tSNE").is_some());
        assert!(p2.embedding("tSNE").is_some());
        assert!(p2.embedding("UMAP").is_none());

        let bad = Embedding::from_rows(vec![("zz", 0.0, 0.0)]).unwrap();
        assert!(p2.add_embedding("PCA", "UMAP", bad).is_err());

        let mut seu = SeuratSample::new(counts("seu"));
        seu.add_reduction("UMAP", emb);
        assert!(seu.embedding("umap").is_some());
    }
}
