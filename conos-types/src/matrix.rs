use anyhow::{bail, Error};
use ndarray::Array1;
use sprs::{CsMat, TriMat};
use std::collections::HashMap;

pub type CountMatrixType = CsMat<f64>;

/// Feature x barcode matrix (genes as rows, cells as columns), stored CSR so that
/// a gene row is one outer view.
#[derive(Clone, Debug)]
pub struct FeatureBarcodeMatrix {
    pub name: String,
    pub barcodes: Vec<String>,
    pub feature_names: Vec<String>,
    pub matrix: CountMatrixType,
    feature_index: HashMap<String, usize>,
}

impl FeatureBarcodeMatrix {
    pub fn new(
        name: impl Into<String>,
        barcodes: Vec<String>,
        feature_names: Vec<String>,
        matrix: CountMatrixType,
    ) -> Result<FeatureBarcodeMatrix, Error> {
        let name = name.into();
        if matrix.rows() != feature_names.len() || matrix.cols() != barcodes.len() {
            bail!(
                "matrix '{}' is {} x {} but {} features and {} barcodes were given",
                name,
                matrix.rows(),
                matrix.cols(),
                feature_names.len(),
                barcodes.len()
            );
        }
        let matrix = if matrix.is_csr() { matrix } else { matrix.to_csr() };
        let feature_index = feature_names
            .iter()
            .enumerate()
            .map(|(i, f)| (f.clone(), i))
            .collect();
        Ok(FeatureBarcodeMatrix {
            name,
            barcodes,
            feature_names,
            matrix,
            feature_index,
        })
    }

    /// Assemble from (feature, barcode, value) triplets. Repeated coordinates are summed.
    pub fn from_triplets(
        name: impl Into<String>,
        barcodes: Vec<String>,
        feature_names: Vec<String>,
        triplets: &[(usize, usize, f64)],
    ) -> Result<FeatureBarcodeMatrix, Error> {
        let mut tri = TriMat::with_capacity((feature_names.len(), barcodes.len()), triplets.len());
        for &(row, col, val) in triplets {
            if row >= feature_names.len() || col >= barcodes.len() {
                bail!("triplet ({}, {}) is outside the matrix", row, col);
            }
            tri.add_triplet(row, col, val);
        }
        let matrix: CountMatrixType = tri.to_csr();
        FeatureBarcodeMatrix::new(name, barcodes, feature_names, matrix)
    }

    pub fn rows(&self) -> usize {
        self.matrix.rows()
    }

    pub fn cols(&self) -> usize {
        self.matrix.cols()
    }

    pub fn nnz(&self) -> usize {
        self.matrix.nnz()
    }

    pub fn feature_index(&self, feature: &str) -> Option<usize> {
        self.feature_index.get(feature).copied()
    }

    /// Dense values of one feature across all barcodes.
    pub fn feature_row(&self, idx: usize) -> Array1<f64> {
        let mut row = Array1::zeros(self.cols());
        if let Some(view) = self.matrix.outer_view(idx) {
            for (col, &val) in view.iter() {
                row[col] = val;
            }
        }
        row
    }

    /// Column sums (total counts per barcode).
    pub fn barcode_totals(&self) -> Array1<f64> {
        let mut totals = Array1::zeros(self.cols());
        for (&val, (_, col)) in self.matrix.iter() {
            totals[col] += val;
        }
        totals
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_feature_rows() {
        let fbm = FeatureBarcodeMatrix::from_triplets(
            "s1",
            vec!["c1".into(), "c2".into(), "c3".into()],
            vec!["g1".into(), "g2".into()],
            &[(0, 0, 1.0), (0, 2, 3.0), (1, 1, 2.0), (1, 1, 2.0)],
        )
        .unwrap();
        assert_eq!(fbm.nnz(), 3);
        assert_eq!(fbm.feature_index("g2"), Some(1));
        assert_eq!(fbm.feature_row(0).to_vec(), vec![1.0, 0.0, 3.0]);
        assert_eq!(fbm.feature_row(1).to_vec(), vec![0.0, 4.0, 0.0]);
        assert_eq!(fbm.barcode_totals().to_vec(), vec![1.0, 4.0, 3.0]);
    }

    #[test]
    fn test_shape_mismatch() {
        let res = FeatureBarcodeMatrix::from_triplets("s1", vec!["c1".into()], vec!["g1".into()], &[(0, 1, 1.0)]);
        assert!(res.is_err());
    }
}
