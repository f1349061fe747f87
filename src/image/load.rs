//! Image loading utilities.

use std::path::Path;

use image::{imageops::FilterType, DynamicImage, GenericImageView};
use ndarray::Array4;

use crate::error::{Error, Result};

use super::{ImageTensor, IMAGENET_MEAN, IMAGENET_STD, RGB_CHANNELS};

/// Load an image from disk and convert it to a normalized tensor.
///
/// Returns the tensor together with the original image dimensions.
///
/// # Errors
///
/// Returns an error if the image cannot be decoded or the target size is empty.
pub fn load_image<P: AsRef<Path>>(
    path: P,
    width: u32,
    height: u32,
    filter: FilterType,
) -> Result<(ImageTensor, (u32, u32))> {
    let path = path.as_ref();

    let img = image::open(path).map_err(|source| Error::ImageLoad {
        path: path.to_path_buf(),
        source,
    })?;

    let original_dims = img.dimensions();
    tracing::debug!(
        "Decoded {} ({}x{})",
        path.display(),
        original_dims.0,
        original_dims.1
    );

    let tensor = preprocess(&img, width, height, filter)?;

    Ok((tensor, original_dims))
}

/// Convert a `DynamicImage` to a standardized NCHW tensor.
///
/// The image is:
/// 1. Resized to exactly `width` x `height` (skipped if it already has that size)
/// 2. Converted to RGB
/// 3. Scaled to [0, 1] and standardized with the ImageNet mean and std
/// 4. Written channel-major, then row-major: `c * H * W + y * W + x`
///
/// # Errors
///
/// Returns [`Error::InvalidInputShape`] if the target size or the image has a
/// zero dimension.
pub fn preprocess(
    img: &DynamicImage,
    width: u32,
    height: u32,
    filter: FilterType,
) -> Result<ImageTensor> {
    if width == 0 || height == 0 {
        return Err(Error::InvalidInputShape {
            expected: "non-zero target size".to_string(),
            actual: format!("{width}x{height}"),
        });
    }

    let (src_width, src_height) = img.dimensions();
    if src_width == 0 || src_height == 0 {
        return Err(Error::InvalidInputShape {
            expected: "non-empty bitmap".to_string(),
            actual: format!("{src_width}x{src_height}"),
        });
    }

    let rgb = if (src_width, src_height) == (width, height) {
        img.to_rgb8()
    } else {
        img.resize_exact(width, height, filter).to_rgb8()
    };

    let (w, h) = (width as usize, height as usize);
    let plane = w * h;

    let mut data = vec![0.0_f32; RGB_CHANNELS * plane];
    for (x, y, pixel) in rgb.enumerate_pixels() {
        let offset = y as usize * w + x as usize;
        for c in 0..RGB_CHANNELS {
            data[c * plane + offset] = normalize_channel(pixel[c], c);
        }
    }

    Array4::from_shape_vec((1, RGB_CHANNELS, h, w), data).map_err(|_| Error::InvalidInputShape {
        expected: format!("[1, {RGB_CHANNELS}, {h}, {w}]"),
        actual: "reshape failed".to_string(),
    })
}

/// Scale a channel intensity to [0, 1] and standardize it for channel `c`.
///
/// # Panics
///
/// Panics if `c` is not a valid RGB channel index.
#[inline]
#[must_use]
pub fn normalize_channel(value: u8, c: usize) -> f32 {
    (f32::from(value) / 255.0 - IMAGENET_MEAN[c]) / IMAGENET_STD[c]
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_tensor_shape() {
        let img = DynamicImage::new_rgb8(100, 60);
        let tensor = preprocess(&img, 224, 224, FilterType::Triangle).unwrap();

        assert_eq!(tensor.shape(), &[1, 3, 224, 224]);
        assert_eq!(tensor.len(), 3 * 224 * 224);
    }

    #[test]
    fn test_non_square_target() {
        let img = DynamicImage::new_rgb8(10, 10);
        let tensor = preprocess(&img, 7, 5, FilterType::Nearest).unwrap();

        assert_eq!(tensor.shape(), &[1, 3, 5, 7]);
    }

    #[test]
    fn test_uniform_gray_value() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 2, Rgb([128, 128, 128])));
        let tensor = preprocess(&img, 2, 2, FilterType::Triangle).unwrap();

        for c in 0..RGB_CHANNELS {
            let expected = (128.0 / 255.0 - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
            for y in 0..2 {
                for x in 0..2 {
                    assert!((tensor[[0, c, y, x]] - expected).abs() < 1e-6);
                }
            }
        }
        assert!((tensor[[0, 0, 0, 0]] - 0.0741).abs() < 1e-3);
    }

    #[test]
    fn test_channel_major_layout() {
        let mut img = RgbImage::new(3, 2);
        img.put_pixel(0, 0, Rgb([255, 0, 0]));
        img.put_pixel(2, 1, Rgb([0, 255, 10]));
        let tensor = preprocess(&DynamicImage::ImageRgb8(img), 3, 2, FilterType::Nearest).unwrap();

        let flat = tensor.as_slice().unwrap();
        let (h, w) = (2, 3);

        // Red of (0, 0) sits at the very start of the red plane.
        assert!((flat[0] - normalize_channel(255, 0)).abs() < 1e-6);
        // Green of (2, 1) sits in the green plane, row 1, column 2.
        assert!((flat[h * w + w + 2] - normalize_channel(255, 1)).abs() < 1e-6);
        // Blue of (2, 1) is the last element.
        assert!((flat[2 * h * w + w + 2] - normalize_channel(10, 2)).abs() < 1e-6);
        assert!((flat[h * w] - normalize_channel(0, 1)).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_extremes() {
        for c in 0..RGB_CHANNELS {
            let low = normalize_channel(0, c);
            let high = normalize_channel(255, c);
            assert!((low - (-IMAGENET_MEAN[c] / IMAGENET_STD[c])).abs() < 1e-6);
            assert!((high - ((1.0 - IMAGENET_MEAN[c]) / IMAGENET_STD[c])).abs() < 1e-6);
        }
    }

    #[test]
    fn test_zero_target_rejected() {
        let img = DynamicImage::new_rgb8(4, 4);
        let err = preprocess(&img, 0, 224, FilterType::Triangle).unwrap_err();

        assert!(matches!(err, Error::InvalidInputShape { .. }));
    }

    #[test]
    fn test_empty_bitmap_rejected() {
        let img = DynamicImage::new_rgb8(0, 0);
        let err = preprocess(&img, 224, 224, FilterType::Triangle).unwrap_err();

        assert!(matches!(err, Error::InvalidInputShape { .. }));
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_image("does/not/exist.png", 224, 224, FilterType::Triangle).unwrap_err();

        assert!(matches!(err, Error::ImageLoad { .. }));
    }
}
