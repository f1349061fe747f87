//! Model downloading and caching utilities.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};

use crate::error::{Error, Result};

/// ImageNet label file shared by every catalogue model.
const LABELS_FILENAME: &str = "imagenet-simple-labels.json";

const LABELS_URL: &str =
    "https://raw.githubusercontent.com/anishathalye/imagenet-simple-labels/master/imagenet-simple-labels.json";

const LABELS_APPROX_SIZE: u64 = 14_000;

/// Pretrained classifiers known to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelType {
    /// `MobileNetV2` (opset 12), lightweight mobile architecture.
    MobileNetV2,
    /// `ResNet-50` v2 (opset 7).
    ResNet50,
}

impl ModelType {
    /// Human-readable model name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::MobileNetV2 => "MobileNetV2",
            Self::ResNet50 => "ResNet-50 v2",
        }
    }

    /// Get the filename for this model type.
    #[must_use]
    pub const fn filename(&self) -> &'static str {
        match self {
            Self::MobileNetV2 => "mobilenetv2-12.onnx",
            Self::ResNet50 => "resnet50-v2-7.onnx",
        }
    }

    /// Get the download URL for this model type.
    /// Both come from the validated ONNX model zoo.
    #[must_use]
    pub const fn url(&self) -> &'static str {
        match self {
            Self::MobileNetV2 => {
                "https://github.com/onnx/models/raw/main/validated/vision/classification/mobilenet/model/mobilenetv2-12.onnx"
            }
            Self::ResNet50 => {
                "https://github.com/onnx/models/raw/main/validated/vision/classification/resnet/model/resnet50-v2-7.onnx"
            }
        }
    }

    /// Get the approximate size in bytes for progress indication.
    #[must_use]
    pub const fn approx_size(&self) -> u64 {
        match self {
            Self::MobileNetV2 => 13_600_000, // ~13.6 MB
            Self::ResNet50 => 98_000_000,    // ~98 MB
        }
    }

    /// Number of output classes.
    #[must_use]
    pub const fn num_classes(&self) -> usize {
        match self {
            Self::MobileNetV2 | Self::ResNet50 => 1000,
        }
    }
}

/// Manages the model cache directory and downloads.
pub struct ModelCache {
    cache_dir: PathBuf,
}

impl ModelCache {
    /// Create a new model cache.
    ///
    /// Uses the platform-appropriate cache directory:
    /// - Windows: `%LOCALAPPDATA%\onnx-classify\models`
    /// - Linux: `~/.cache/onnx-classify/models`
    /// - macOS: `~/Library/Caches/onnx-classify/models`
    ///
    /// # Errors
    ///
    /// Returns an error if the cache directory cannot be created.
    pub fn new() -> Result<Self> {
        let base = dirs::cache_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::with_dir(base.join("onnx-classify").join("models"))
    }

    /// Create a cache rooted at an explicit directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn with_dir<P: Into<PathBuf>>(cache_dir: P) -> Result<Self> {
        let cache_dir = cache_dir.into();

        fs::create_dir_all(&cache_dir).map_err(|source| Error::CacheDir {
            path: cache_dir.clone(),
            source,
        })?;

        Ok(Self { cache_dir })
    }

    /// Directory holding cached files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Get the path to a model file, downloading if necessary.
    ///
    /// # Errors
    ///
    /// Returns an error if the model cannot be downloaded or accessed.
    pub fn get_model_path(&self, model_type: ModelType) -> Result<PathBuf> {
        let path = self.cache_dir.join(model_type.filename());

        if !path.exists() {
            download_file(
                model_type.url(),
                &path,
                model_type.filename(),
                model_type.approx_size(),
            )?;
        }

        Ok(path)
    }

    /// Get the path to the ImageNet label file, downloading if necessary.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be downloaded or accessed.
    pub fn get_labels_path(&self) -> Result<PathBuf> {
        let path = self.cache_dir.join(LABELS_FILENAME);

        if !path.exists() {
            download_file(LABELS_URL, &path, LABELS_FILENAME, LABELS_APPROX_SIZE)?;
        }

        Ok(path)
    }
}

/// Download a file from a URL to a path with progress indication.
fn download_file(url: &str, path: &Path, name: &str, approx_size: u64) -> Result<()> {
    tracing::info!("Downloading {name} from {url}");

    let client = reqwest::blocking::Client::new();
    let response = client
        .get(url)
        .send()
        .and_then(reqwest::blocking::Response::error_for_status)
        .map_err(|source| Error::ModelDownload {
            name: name.to_string(),
            source,
        })?;

    let total_size = response.content_length().unwrap_or(approx_size);

    let pb = ProgressBar::new(total_size);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
            .expect("valid template")
            .progress_chars("#>-"),
    );
    pb.set_message(format!("Downloading {name}"));

    // Partial downloads never land under the final name
    let temp_path = path.with_extension("tmp");
    let mut file = fs::File::create(&temp_path)?;

    let mut downloaded = 0u64;
    let mut reader = response;

    loop {
        let mut buffer = [0u8; 8192];
        let bytes_read = std::io::Read::read(&mut reader, &mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        file.write_all(&buffer[..bytes_read])?;
        downloaded += bytes_read as u64;
        pb.set_position(downloaded);
    }
    file.flush()?;

    pb.finish_with_message(format!("Downloaded {name}"));

    fs::rename(&temp_path, path)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalogue_filenames_are_onnx() {
        for model in [ModelType::MobileNetV2, ModelType::ResNet50] {
            assert!(model.filename().ends_with(".onnx"));
            assert!(model.url().ends_with(model.filename()));
            assert_eq!(model.num_classes(), 1000);
        }
    }

    #[test]
    fn test_cached_model_is_not_downloaded() {
        let dir = std::env::temp_dir().join(format!("onnx-classify-cache-{}", std::process::id()));
        let cache = ModelCache::with_dir(&dir).unwrap();

        let expected = dir.join(ModelType::MobileNetV2.filename());
        fs::write(&expected, b"stub").unwrap();

        let path = cache.get_model_path(ModelType::MobileNetV2).unwrap();
        assert_eq!(path, expected);
        assert_eq!(cache.dir(), dir.as_path());

        fs::remove_dir_all(&dir).unwrap();
    }
}
