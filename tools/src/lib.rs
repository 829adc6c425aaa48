//! Support code for the conos-plot command line utility

/// CSV inputs and outputs, plain or gzipped
pub mod io;
