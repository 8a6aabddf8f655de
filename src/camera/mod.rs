mod photos;
pub mod quality;
mod source;

#[cfg(test)]
pub(crate) use source::testing;

pub use photos::PhotoStore;
pub use quality::{FrameStats, ImageQualityGate, QualityThresholds};
pub use source::{FrameSource, StillImageFrameSource};
