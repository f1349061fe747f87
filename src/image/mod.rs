//! Image loading and tensor preprocessing.

mod load;

pub use load::{load_image, normalize_channel, preprocess};

use ndarray::Array4;

/// Image tensor in NCHW format (batch, channels, height, width).
/// Values are standardized per channel with the ImageNet statistics.
pub type ImageTensor = Array4<f32>;

/// Native input resolution of the supported ImageNet classifiers.
pub const DEFAULT_INPUT_SIZE: u32 = 224;

/// Number of channels in RGB images.
pub const RGB_CHANNELS: usize = 3;

/// Per-channel mean of the ImageNet training set, in R, G, B order.
pub const IMAGENET_MEAN: [f32; RGB_CHANNELS] = [0.485, 0.456, 0.406];

/// Per-channel standard deviation of the ImageNet training set, in R, G, B order.
pub const IMAGENET_STD: [f32; RGB_CHANNELS] = [0.229, 0.224, 0.225];
