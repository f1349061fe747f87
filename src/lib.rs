//! # `onnx-classify`
//!
//! ImageNet-style image classification on top of ONNX Runtime.
//!
//! An image is resized and standardized into a `[1, 3, H, W]` tensor, run
//! through a pretrained classifier, and the resulting logits are turned into
//! a probability distribution with a top prediction.
//!
//! ## Example
//!
//! ```no_run
//! use onnx_classify::{Classifier, Config};
//! use onnx_classify::model::{ModelCache, ModelType};
//!
//! # fn main() -> onnx_classify::Result<()> {
//! let cache = ModelCache::new()?;
//! let mut classifier = Classifier::from_cache(&cache, ModelType::MobileNetV2, None, Config::default())?;
//!
//! let result = classifier.classify_path("cat.jpg")?;
//! println!("{:?} {:.2}", result.label, result.top.probability);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod image;
pub mod model;
pub mod pipeline;

pub use error::{Error, Result};
pub use pipeline::{Classification, Classifier, Config, ExecutionProvider, Prediction};
