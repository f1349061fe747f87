//! `onnx-classify` CLI - classify an image with a pretrained ONNX model.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use onnx_classify::model::{Labels, ModelCache, ModelType};
use onnx_classify::{Classifier, Config, ExecutionProvider};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModelArg {
    Mobilenetv2,
    Resnet50,
}

impl From<ModelArg> for ModelType {
    fn from(arg: ModelArg) -> Self {
        match arg {
            ModelArg::Mobilenetv2 => Self::MobileNetV2,
            ModelArg::Resnet50 => Self::ResNet50,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ProviderArg {
    Cpu,
    Cuda,
    Coreml,
    Xnnpack,
}

impl From<ProviderArg> for ExecutionProvider {
    fn from(arg: ProviderArg) -> Self {
        match arg {
            ProviderArg::Cpu => Self::Cpu,
            ProviderArg::Cuda => Self::Cuda,
            ProviderArg::Coreml => Self::CoreMl,
            ProviderArg::Xnnpack => Self::XnnPack,
        }
    }
}

/// Classify an image with a pretrained ImageNet model.
#[derive(Parser, Debug)]
#[command(name = "onnx-classify")]
#[command(version, about, long_about = None)]
struct Args {
    /// Input image path.
    #[arg(value_name = "IMAGE")]
    image: PathBuf,

    /// Catalogue model, downloaded on first use.
    #[arg(short, long, value_enum, default_value = "mobilenetv2")]
    model: ModelArg,

    /// Use a local ONNX file instead of a catalogue model.
    #[arg(long, value_name = "PATH")]
    model_path: Option<PathBuf>,

    /// JSON label file (array of names or index map).
    #[arg(short, long, value_name = "PATH")]
    labels: Option<PathBuf>,

    /// Execution provider.
    #[arg(short, long, value_enum, default_value = "cpu")]
    provider: ProviderArg,

    /// Intra-op thread count.
    #[arg(long, value_name = "INT")]
    threads: Option<usize>,

    /// Number of predictions to print.
    #[arg(short = 'k', long, default_value = "5", value_name = "INT")]
    top_k: usize,

    /// Square model input size in pixels.
    #[arg(long, default_value = "224", value_name = "INT")]
    size: u32,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("onnx_classify={log_level}").into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    if let Err(err) = run(&args) {
        tracing::error!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn run(args: &Args) -> Result<()> {
    if !args.image.exists() {
        anyhow::bail!("Input file does not exist: {}", args.image.display());
    }

    let config = Config {
        input_width: args.size,
        input_height: args.size,
        provider: args.provider.into(),
        intra_threads: args.threads,
        top_k: args.top_k,
        ..Config::default()
    };

    let labels = args
        .labels
        .as_ref()
        .map(|path| {
            Labels::from_path(path)
                .with_context(|| format!("Failed to read labels from {}", path.display()))
        })
        .transpose()?;

    let mut classifier = if let Some(model_path) = &args.model_path {
        Classifier::new(model_path, labels, config).context("Failed to load model")?
    } else {
        let cache = ModelCache::new().context("Failed to open model cache")?;
        Classifier::from_cache(&cache, args.model.into(), labels, config)
            .context("Failed to load model")?
    };

    print!("{}", classifier.model_info());
    println!();

    let result = classifier
        .classify_path(&args.image)
        .context("Failed to classify image")?;

    for (rank, prediction) in result.top_k(classifier.config().top_k).iter().enumerate() {
        let label = classifier
            .label(prediction.index)
            .map_or_else(|| format!("class {}", prediction.index), str::to_string);
        println!(
            "{}. {label} (ID: {}) {:.2}%",
            rank + 1,
            prediction.index,
            prediction.probability * 100.0
        );
    }

    Ok(())
}
