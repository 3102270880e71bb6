//! Event read path: query aggregation and view model assembly.

pub mod aggregator;
pub mod view;
