//! Gamma event ingestion: page source, record transform and the sync loop.

pub mod gamma;
pub mod pipeline;
pub mod transform;
