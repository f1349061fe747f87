//! Model catalogue, caching, labels and metadata.

mod info;
mod labels;
mod loader;

pub use info::{format_size, MetadataField, ModelInfo};
pub use labels::Labels;
pub use loader::{ModelCache, ModelType};
