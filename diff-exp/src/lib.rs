//! Marker gene detection for clusters of cells.

pub mod dist;
pub mod markers;
pub mod rank;

pub use dist::adjusted_pvalue_bh;
pub use markers::{find_markers, MarkerParams};
