//! Classification pipeline: inference session and logit post-processing.

mod classifier;
pub mod postprocess;
mod provider;

pub use classifier::{Classification, Classifier, Config};
pub use postprocess::Prediction;
pub use provider::ExecutionProvider;
