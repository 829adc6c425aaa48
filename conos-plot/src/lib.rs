//! # conos-plot: summary plots over jointly analyzed single-cell samples

/// Optional computations injected into the chart builders
pub mod capability;

/// Cluster composition across samples
pub mod composition;

/// Embedding panel grids
pub mod embedding;

/// Marker gene heatmap
pub mod heatmap;

/// Color palettes and gradients
pub mod palette;

/// Per-cluster proportion boxplots
pub mod proportions;

/// Shared drawing helpers
pub mod render;

/// Quantiles, correlation and box statistics
pub mod stats;

/// Explained variance of the pairwise reductions
pub mod variance;

pub use crate::capability::{Capabilities, CenteredRunningMean, EmpiricalKl, EntropyEstimator, RollingMean};
pub use crate::composition::{cluster_composition, CompositionParams, CompositionPlot, ContingencyTable};
pub use crate::embedding::{
    embedding_grid, sample_embeddings, EmbeddingGrid, EmbeddingGridParams, EmbeddingPanel, EmbeddingPoint,
    EmbeddingSource, PointColors,
};
pub use crate::heatmap::{
    de_heatmap, sample_de_heatmap, ColumnMetadata, DeHeatmap, HeatmapDetails, HeatmapParams, LabeledGenes,
};
pub use crate::palette::{hue_palette, parse_hex_color, ColorRamp, Palette};
pub use crate::proportions::{celltype_proportions, ProportionParams, ProportionPlot, ProportionRow, SummaryKind};
pub use crate::render::{grid_shape, Chart};
pub use crate::variance::{explained_variance, VarianceParams, VariancePlot, VarianceRow};
