//! # conos-types: data model shared by the conos plotting crates

/// Joint results container
pub mod conos;

/// Per-cluster differential expression tables
pub mod de;

/// Two-dimensional cell embeddings
pub mod embedding;

/// Ordered categorical labels
pub mod factor;

/// Feature x barcode count matrices
pub mod matrix;

/// Sample containers
pub mod sample;

pub use crate::conos::{Conos, PairInfo, ReductionSpace};
pub use crate::de::{ClusterDe, DeTable, GeneOrdering, ScoreColumn};
pub use crate::embedding::Embedding;
pub use crate::factor::{Factor, NamedFactor};
pub use crate::matrix::FeatureBarcodeMatrix;
pub use crate::sample::{ExpressionSource, Pagoda2Sample, Sample, SeuratSample};
