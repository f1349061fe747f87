//! Execution provider selection.

use ort::execution_providers::{
    CPUExecutionProvider, CUDAExecutionProvider, CoreMLExecutionProvider,
    ExecutionProviderDispatch, XNNPACKExecutionProvider,
};

/// Backend ONNX Runtime uses to run the model.
///
/// Providers that are not compiled into the runtime fall back to CPU.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExecutionProvider {
    #[default]
    Cpu,
    Cuda,
    CoreMl,
    XnnPack,
}

impl ExecutionProvider {
    /// Display name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Cpu => "CPU",
            Self::Cuda => "CUDA",
            Self::CoreMl => "CoreML",
            Self::XnnPack => "XNNPACK",
        }
    }

    pub(crate) fn dispatch(self) -> ExecutionProviderDispatch {
        match self {
            Self::Cpu => CPUExecutionProvider::default().build(),
            Self::Cuda => CUDAExecutionProvider::default().build(),
            Self::CoreMl => CoreMLExecutionProvider::default().build(),
            Self::XnnPack => XNNPACKExecutionProvider::default().build(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_cpu() {
        assert_eq!(ExecutionProvider::default(), ExecutionProvider::Cpu);
        assert_eq!(ExecutionProvider::default().name(), "CPU");
    }
}
