//! Image classification session.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use image::{imageops::FilterType, DynamicImage};
use ort::session::Session;
use ort::value::TensorRef;

use crate::error::{Error, Result};
use crate::image::{ImageTensor, DEFAULT_INPUT_SIZE};
use crate::model::{format_size, Labels, ModelCache, ModelInfo, ModelType};

use super::postprocess::{self, Prediction};
use super::provider::ExecutionProvider;

/// Configuration for the classification pipeline.
#[derive(Debug, Clone)]
pub struct Config {
    /// Model input width in pixels.
    pub input_width: u32,

    /// Model input height in pixels.
    pub input_height: u32,

    /// Resampling filter used when resizing to the model input.
    pub filter: FilterType,

    /// Execution provider for the ONNX session.
    pub provider: ExecutionProvider,

    /// Intra-op thread count. None leaves the runtime default.
    pub intra_threads: Option<usize>,

    /// Number of ranked predictions to report.
    pub top_k: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_width: DEFAULT_INPUT_SIZE,
            input_height: DEFAULT_INPUT_SIZE,
            filter: FilterType::Triangle,
            provider: ExecutionProvider::Cpu,
            intra_threads: None,
            top_k: 5,
        }
    }
}

impl Config {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any parameter is out of valid range.
    pub fn validate(&self) -> Result<()> {
        if self.input_width == 0 || self.input_height == 0 {
            return Err(Error::InvalidParameter {
                name: "input_size".to_string(),
                reason: "width and height must be greater than 0".to_string(),
            });
        }

        if self.intra_threads == Some(0) {
            return Err(Error::InvalidParameter {
                name: "intra_threads".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }

        if self.top_k == 0 {
            return Err(Error::InvalidParameter {
                name: "top_k".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

/// Result of one inference pass.
#[derive(Debug, Clone)]
pub struct Classification {
    /// Softmax of the model logits, one entry per class.
    pub probabilities: Vec<f32>,

    /// Most probable class.
    pub top: Prediction,

    /// Name of the top class, when labels are loaded.
    pub label: Option<String>,
}

impl Classification {
    /// The `k` most probable classes, best first.
    #[must_use]
    pub fn top_k(&self, k: usize) -> Vec<Prediction> {
        postprocess::top_k(&self.probabilities, k)
    }
}

/// Decoded and preprocessed image kept between runs.
///
/// Valid while both the path and the file's modification time match.
#[derive(Debug)]
struct CachedImage {
    path: PathBuf,
    modified: Option<SystemTime>,
    tensor: ImageTensor,
}

impl CachedImage {
    fn is_fresh(&self, path: &Path, modified: Option<SystemTime>) -> bool {
        // Without a modification time there is nothing to compare against
        self.modified.is_some() && self.modified == modified && self.path == path
    }

    /// Reuse `previous` if it still matches `path`, otherwise build a new entry with `load`.
    fn refresh<F>(
        previous: Option<Self>,
        path: &Path,
        modified: Option<SystemTime>,
        load: F,
    ) -> Result<Self>
    where
        F: FnOnce() -> Result<ImageTensor>,
    {
        if let Some(cached) = previous.filter(|cached| cached.is_fresh(path, modified)) {
            tracing::debug!("Reusing preprocessed image for {}", path.display());
            return Ok(cached);
        }

        tracing::info!("Processing image: {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            modified,
            tensor: load()?,
        })
    }
}

/// A loaded classifier model plus the state owned alongside it.
pub struct Classifier {
    config: Config,
    session: Session,
    model_name: String,
    model_path: PathBuf,
    model_size: u64,
    num_classes: Option<usize>,
    labels: Option<Labels>,
    cached_image: Option<CachedImage>,
}

impl Classifier {
    /// Load a classifier from an ONNX file.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the model cannot be loaded.
    pub fn new<P: AsRef<Path>>(model_path: P, labels: Option<Labels>, config: Config) -> Result<Self> {
        config.validate()?;

        let model_path = model_path.as_ref();
        let model_name = model_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("model")
            .to_string();

        tracing::info!("Initializing classifier with config: {config:?}");

        let session = build_session(model_path, &model_name, &config)?;
        let model_size = std::fs::metadata(model_path)?.len();

        let classifier = Self {
            config,
            session,
            model_name,
            model_path: model_path.to_path_buf(),
            model_size,
            num_classes: None,
            labels,
            cached_image: None,
        };
        classifier.log_signature();

        Ok(classifier)
    }

    /// Load a catalogue model, downloading it if needed.
    ///
    /// Without explicit `labels` the ImageNet label file is fetched as well.
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be fetched or the model cannot be loaded.
    pub fn from_cache(
        cache: &ModelCache,
        model_type: ModelType,
        labels: Option<Labels>,
        config: Config,
    ) -> Result<Self> {
        let model_path = cache.get_model_path(model_type)?;
        let labels = match labels {
            Some(labels) => labels,
            None => Labels::from_path(cache.get_labels_path()?)?,
        };

        if labels.len() != model_type.num_classes() {
            tracing::warn!(
                "{} has {} classes but {} labels are loaded",
                model_type.name(),
                model_type.num_classes(),
                labels.len()
            );
        }

        let mut classifier = Self::new(model_path, Some(labels), config)?;
        classifier.model_name = model_type.name().to_string();
        classifier.num_classes = Some(model_type.num_classes());
        Ok(classifier)
    }

    /// Replace the loaded model, keeping labels and the image cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the model cannot be loaded; the previous model stays active.
    pub fn load_model<P: AsRef<Path>>(&mut self, model_path: P) -> Result<()> {
        let model_path = model_path.as_ref();
        let model_name = model_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("model")
            .to_string();

        let session = build_session(model_path, &model_name, &self.config)?;
        let model_size = std::fs::metadata(model_path)?.len();

        self.session = session;
        self.model_name = model_name;
        self.model_path = model_path.to_path_buf();
        self.model_size = model_size;
        self.num_classes = None;
        self.log_signature();

        Ok(())
    }

    /// Name of class `index`, if labels are loaded and cover it.
    #[must_use]
    pub fn label(&self, index: usize) -> Option<&str> {
        self.labels.as_ref().and_then(|labels| labels.get(index))
    }

    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Number of classes the model output must have, if known.
    ///
    /// Catalogue models carry their own count; otherwise the loaded labels decide.
    #[must_use]
    pub fn expected_classes(&self) -> Option<usize> {
        self.num_classes.or_else(|| {
            self.labels
                .as_ref()
                .filter(|labels| !labels.is_empty())
                .map(Labels::len)
        })
    }

    /// Size of the loaded model file in bytes.
    #[must_use]
    pub const fn model_size(&self) -> u64 {
        self.model_size
    }

    /// Drop the cached preprocessed image.
    pub fn clear_image_cache(&mut self) {
        self.cached_image = None;
    }

    /// Describe the loaded model as ordered (label, text) pairs.
    #[must_use]
    pub fn model_info(&self) -> ModelInfo {
        let mut info = base_info(
            &self.model_name,
            &self.model_path,
            self.model_size,
            &self.config,
        );

        for input in &self.session.inputs {
            info.push(format!("Input {}", input.name), format!("{:?}", input.input_type));
        }
        for output in &self.session.outputs {
            info.push(format!("Output {}", output.name), format!("{:?}", output.output_type));
        }

        match &self.labels {
            Some(labels) => info.push("Classes", labels.len()),
            None => info.push("Classes", "unknown (no labels)"),
        }

        info
    }

    /// Classify an image file.
    ///
    /// The preprocessed tensor is reused while the path and its modification
    /// time stay the same.
    ///
    /// # Errors
    ///
    /// Returns an error if the image cannot be loaded or inference fails.
    pub fn classify_path<P: AsRef<Path>>(&mut self, path: P) -> Result<Classification> {
        let path = path.as_ref();
        let modified = std::fs::metadata(path).and_then(|m| m.modified()).ok();

        let (width, height, filter) = (
            self.config.input_width,
            self.config.input_height,
            self.config.filter,
        );
        let cached = CachedImage::refresh(self.cached_image.take(), path, modified, || {
            crate::image::load_image(path, width, height, filter).map(|(tensor, _)| tensor)
        })?;

        let result = self.classify_tensor(&cached.tensor);
        self.cached_image = Some(cached);
        result
    }

    /// Classify an already decoded image.
    ///
    /// # Errors
    ///
    /// Returns an error if preprocessing or inference fails.
    pub fn classify_image(&mut self, img: &DynamicImage) -> Result<Classification> {
        let tensor = crate::image::preprocess(
            img,
            self.config.input_width,
            self.config.input_height,
            self.config.filter,
        )?;
        self.classify_tensor(&tensor)
    }

    /// Run the model on a preprocessed tensor and post-process the logits.
    ///
    /// # Errors
    ///
    /// Returns an error if inference fails or the logits are unusable.
    pub fn classify_tensor(&mut self, tensor: &ImageTensor) -> Result<Classification> {
        let logits = self.run_logits(tensor)?;
        let (probabilities, top) = postprocess::classify_logits(&logits)?;
        let label = self.label(top.index).map(str::to_string);

        tracing::debug!(
            "Top class {} ({:?}) p={:.4}",
            top.index,
            label,
            top.probability
        );

        Ok(Classification {
            probabilities,
            top,
            label,
        })
    }

    /// Run the model and return the raw logits of the single batch entry.
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    fn run_logits(&mut self, tensor: &ImageTensor) -> Result<Vec<f32>> {
        let expected = [
            1,
            3,
            self.config.input_height as usize,
            self.config.input_width as usize,
        ];
        if tensor.shape() != expected {
            return Err(Error::InvalidInputShape {
                expected: format!("{expected:?}"),
                actual: format!("{:?}", tensor.shape()),
            });
        }

        let input_value = TensorRef::from_array_view(tensor.view())
            .map_err(|source| Error::Inference { source })?;
        let classes = self.expected_classes();

        let outputs = self
            .session
            .run(ort::inputs![input_value])
            .map_err(|source| Error::Inference { source })?;

        // Get first output
        let output = outputs
            .values()
            .next()
            .ok_or_else(|| Error::InvalidInputShape {
                expected: "logits output".to_string(),
                actual: "no output".to_string(),
            })?;

        let (shape_info, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|source| Error::Inference { source })?;

        // Safe: tensor dimensions are always non-negative
        let dims: Vec<usize> = shape_info.iter().map(|&x| x as usize).collect();
        tracing::debug!("Logits shape: {dims:?}");

        logits_from_output(&dims, data, classes)
    }

    fn log_signature(&self) {
        tracing::info!(
            "Loaded {} ({})",
            self.model_name,
            format_size(self.model_size)
        );
        for input in &self.session.inputs {
            tracing::debug!("Input '{}': {:?}", input.name, input.input_type);
        }
        for output in &self.session.outputs {
            tracing::debug!("Output '{}': {:?}", output.name, output.output_type);
        }
    }
}

/// Fields describing the model file and configuration, before session inputs and outputs.
fn base_info(name: &str, path: &Path, size: u64, config: &Config) -> ModelInfo {
    ModelInfo::new()
        .with("Model", name)
        .with("File", path.display())
        .with("File size", format_size(size))
        .with("Execution provider", config.provider.name())
        .with(
            "Input size",
            format!("{}x{}", config.input_width, config.input_height),
        )
}

/// Validate a model output and copy out the logits of its single batch entry.
///
/// Accepted layouts are `[N]`, `[1, N]` and `[1, N, 1, ..]`. When `classes`
/// is known, `N` must equal it.
fn logits_from_output(dims: &[usize], data: &[f32], classes: Option<usize>) -> Result<Vec<f32>> {
    let shape_error = |expected: String| Error::InvalidInputShape {
        expected,
        actual: format!("{dims:?}"),
    };

    let Some((&first, rest)) = dims.split_first() else {
        return Err(shape_error("logit vector".to_string()));
    };

    if dims.iter().product::<usize>() != data.len() {
        return Err(Error::InvalidInputShape {
            expected: format!("{} elements for shape {dims:?}", dims.iter().product::<usize>()),
            actual: format!("{} elements", data.len()),
        });
    }

    if !rest.is_empty() {
        if first != 1 {
            return Err(shape_error("batch size 1".to_string()));
        }
        if rest.iter().skip(1).any(|&d| d != 1) {
            return Err(shape_error("[1, N] class scores".to_string()));
        }
    }

    if let Some(classes) = classes {
        if data.len() != classes {
            return Err(Error::InvalidInputShape {
                expected: format!("{classes} class scores"),
                actual: format!("{} scores in {dims:?}", data.len()),
            });
        }
    }

    Ok(data.to_vec())
}

/// Create an ONNX session for the model at `path`.
fn build_session(path: &Path, name: &str, config: &Config) -> Result<Session> {
    let load_error = |source: ort::Error| Error::ModelLoad {
        name: name.to_string(),
        source,
    };

    if !path.exists() {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("model not found: {}", path.display()),
        )));
    }

    tracing::info!("Loading model from: {}", path.display());

    let mut builder = Session::builder()
        .map_err(load_error)?
        .with_execution_providers([config.provider.dispatch()])
        .map_err(|e| load_error(e.into()))?;

    if let Some(threads) = config.intra_threads {
        builder = builder
            .with_intra_threads(threads)
            .map_err(|e| load_error(e.into()))?;
    }

    builder
        .commit_from_file(path)
        .map_err(|e| load_error(e.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();

        assert!(config.validate().is_ok());
        assert_eq!((config.input_width, config.input_height), (224, 224));
    }

    #[test]
    fn test_config_rejects_zero_values() {
        let config = Config {
            input_width: 0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidParameter { .. })));

        let config = Config {
            intra_threads: Some(0),
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidParameter { .. })));

        let config = Config {
            top_k: 0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidParameter { .. })));
    }

    #[test]
    fn test_cached_image_invalidation() {
        let stamp = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        let cached = CachedImage {
            path: PathBuf::from("photo.jpg"),
            modified: Some(stamp),
            tensor: ImageTensor::zeros((1, 3, 2, 2)),
        };

        assert!(cached.is_fresh(Path::new("photo.jpg"), Some(stamp)));
        assert!(!cached.is_fresh(Path::new("other.jpg"), Some(stamp)));
        assert!(!cached.is_fresh(
            Path::new("photo.jpg"),
            Some(stamp + Duration::from_secs(1))
        ));
        assert!(!cached.is_fresh(Path::new("photo.jpg"), None));
    }

    #[test]
    fn test_cached_image_without_timestamp_is_stale() {
        let cached = CachedImage {
            path: PathBuf::from("photo.jpg"),
            modified: None,
            tensor: ImageTensor::zeros((1, 3, 2, 2)),
        };

        assert!(!cached.is_fresh(Path::new("photo.jpg"), None));
    }

    #[test]
    fn test_classification_top_k() {
        let classification = Classification {
            probabilities: vec![0.2, 0.5, 0.3],
            top: Prediction {
                index: 1,
                probability: 0.5,
            },
            label: None,
        };

        let ranked: Vec<_> = classification.top_k(2).iter().map(|p| p.index).collect();
        assert_eq!(ranked, [1, 2]);
    }

    #[test]
    fn test_refresh_reuses_fresh_entry() {
        let stamp = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        let previous = CachedImage {
            path: PathBuf::from("photo.jpg"),
            modified: Some(stamp),
            tensor: ImageTensor::from_elem((1, 3, 2, 2), 0.5),
        };

        let cached = CachedImage::refresh(Some(previous), Path::new("photo.jpg"), Some(stamp), || {
            panic!("fresh entry must not be reloaded")
        })
        .unwrap();

        assert_eq!(cached.path, PathBuf::from("photo.jpg"));
        assert!(cached.tensor.iter().all(|&v| (v - 0.5).abs() < f32::EPSILON));
    }

    #[test]
    fn test_refresh_reloads_stale_entry() {
        let stamp = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        let later = stamp + Duration::from_secs(5);
        let previous = CachedImage {
            path: PathBuf::from("photo.jpg"),
            modified: Some(stamp),
            tensor: ImageTensor::zeros((1, 3, 2, 2)),
        };

        let cached = CachedImage::refresh(Some(previous), Path::new("photo.jpg"), Some(later), || {
            Ok(ImageTensor::ones((1, 3, 2, 2)))
        })
        .unwrap();

        assert_eq!(cached.modified, Some(later));
        assert!(cached.tensor.iter().all(|&v| (v - 1.0).abs() < f32::EPSILON));
    }

    #[test]
    fn test_refresh_without_entry_loads() {
        let cached = CachedImage::refresh(None, Path::new("a.png"), None, || {
            Ok(ImageTensor::zeros((1, 3, 4, 4)))
        })
        .unwrap();

        assert_eq!(cached.path, PathBuf::from("a.png"));
        assert_eq!(cached.tensor.shape(), &[1, 3, 4, 4]);
    }

    #[test]
    fn test_refresh_propagates_load_error() {
        let result = CachedImage::refresh(None, Path::new("a.png"), None, || {
            Err(Error::EmptyInput {
                what: "image".to_string(),
            })
        });

        assert!(matches!(result, Err(Error::EmptyInput { .. })));
    }

    #[test]
    fn test_logits_accepts_batched_and_flat_outputs() {
        let data = [0.1, 0.2, 0.3];

        assert_eq!(logits_from_output(&[1, 3], &data, Some(3)).unwrap(), data);
        assert_eq!(logits_from_output(&[3], &data, None).unwrap(), data);
        assert_eq!(logits_from_output(&[1, 3, 1, 1], &data, Some(3)).unwrap(), data);
    }

    #[test]
    fn test_logits_rejects_batch_size() {
        let data = [0.0; 6];
        let err = logits_from_output(&[2, 3], &data, None).unwrap_err();

        assert!(matches!(err, Error::InvalidInputShape { .. }));
    }

    #[test]
    fn test_logits_rejects_wrong_class_count() {
        let data = vec![0.0; 1001];
        let err = logits_from_output(&[1, 1001], &data, Some(1000)).unwrap_err();

        assert!(matches!(err, Error::InvalidInputShape { .. }));
    }

    #[test]
    fn test_logits_rejects_feature_maps() {
        let data = vec![0.0; 1000 * 7 * 7];

        let err = logits_from_output(&[1, 1000, 7, 7], &data, None).unwrap_err();
        assert!(matches!(err, Error::InvalidInputShape { .. }));

        let err = logits_from_output(&[1, 1000, 7, 7], &data, Some(1000)).unwrap_err();
        assert!(matches!(err, Error::InvalidInputShape { .. }));
    }

    #[test]
    fn test_logits_rejects_scalar_output() {
        let err = logits_from_output(&[], &[1.0], None).unwrap_err();

        assert!(matches!(err, Error::InvalidInputShape { .. }));
    }

    #[test]
    fn test_logits_rejects_length_mismatch() {
        let err = logits_from_output(&[1, 4], &[0.0; 3], None).unwrap_err();

        assert!(matches!(err, Error::InvalidInputShape { .. }));
    }

    #[test]
    fn test_base_info_field_order() {
        let config = Config {
            provider: ExecutionProvider::Cuda,
            ..Config::default()
        };
        let info = base_info("MobileNetV2", Path::new("m.onnx"), 13_600_000, &config);

        let labels: Vec<_> = info.iter().map(|f| f.label.as_str()).collect();
        assert_eq!(
            labels,
            ["Model", "File", "File size", "Execution provider", "Input size"]
        );
        assert_eq!(info.get("File size"), Some("13.6 MB"));
        assert_eq!(info.get("Execution provider"), Some("CUDA"));
        assert_eq!(info.get("Input size"), Some("224x224"));
    }

    #[test]
    fn test_from_cache_with_labels_skips_label_download() {
        let dir = std::env::temp_dir().join(format!("onnx-classify-offline-{}", std::process::id()));
        let cache = ModelCache::with_dir(&dir).unwrap();
        std::fs::write(dir.join(ModelType::MobileNetV2.filename()), b"not a model").unwrap();

        let labels = Labels::from(vec!["a".to_string(), "b".to_string()]);
        let result = Classifier::from_cache(&cache, ModelType::MobileNetV2, Some(labels), Config::default());

        // The stub fails to load as a model; nothing was fetched on the way
        assert!(matches!(result, Err(Error::ModelLoad { .. })));
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 1);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_model_file() {
        let result = Classifier::new("no/such/model.onnx", None, Config::default());

        assert!(matches!(result, Err(Error::Io(_))));
    }
}
