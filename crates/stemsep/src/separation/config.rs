//! Separation configuration types

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::stems::Source;

/// Configuration for audio stem separation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeparationConfig {
    /// Which model to use
    pub model: ModelType,

    /// Explicit ONNX model file; bypasses the model cache when set
    pub model_path: Option<PathBuf>,

    /// Override for the model cache directory
    pub cache_dir: Option<PathBuf>,

    /// Whether to attempt GPU acceleration
    pub use_gpu: bool,

    /// Download missing model files on first use
    pub auto_download: bool,
}

impl Default for SeparationConfig {
    fn default() -> Self {
        Self {
            model: ModelType::HtDemucs,
            model_path: None,
            cache_dir: None,
            use_gpu: true, // Try GPU, fall back to CPU
            auto_download: true,
        }
    }
}

impl SeparationConfig {
    /// Validate configuration values
    ///
    /// Empty paths (e.g. `model_path: ""` in YAML) are treated as unset.
    pub fn validate(&mut self) {
        if self
            .model_path
            .as_ref()
            .is_some_and(|p| p.as_os_str().is_empty())
        {
            self.model_path = None;
        }
        if self
            .cache_dir
            .as_ref()
            .is_some_and(|p| p.as_os_str().is_empty())
        {
            self.cache_dir = None;
        }
    }
}

/// Available separation models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ModelType {
    /// Hybrid Transformer Demucs, 4 sources (drums, bass, other, vocals)
    #[default]
    #[serde(rename = "htdemucs")]
    HtDemucs,
}

impl ModelType {
    /// Display name for progress messages
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::HtDemucs => "HTDemucs 4-source",
        }
    }

    /// Model filename (must match the name used during ONNX export, since external data
    /// files reference it by name)
    pub fn filename(&self) -> &'static str {
        match self {
            Self::HtDemucs => "htdemucs.onnx",
        }
    }

    /// Download URL for the graph file
    pub fn download_url(&self) -> &'static str {
        match self {
            Self::HtDemucs => {
                "https://github.com/dataO1/Mesh/releases/download/models/htdemucs.onnx"
            }
        }
    }

    /// Whether the weights live in a separate `.onnx.data` file
    pub fn has_external_data(&self) -> bool {
        match self {
            Self::HtDemucs => true,
        }
    }

    /// Filename of the external weights file
    pub fn data_filename(&self) -> &'static str {
        match self {
            Self::HtDemucs => "htdemucs.onnx.data",
        }
    }

    /// Download URL for the external weights file
    pub fn data_download_url(&self) -> &'static str {
        match self {
            Self::HtDemucs => {
                "https://github.com/dataO1/Mesh/releases/download/models/htdemucs.onnx.data"
            }
        }
    }

    /// Sample rate the model was trained at; input is resampled to it and
    /// stems are written at it
    pub fn sample_rate(&self) -> u32 {
        match self {
            Self::HtDemucs => 44_100,
        }
    }

    /// Order of the sources along the model's stem axis
    pub fn sources(&self) -> [Source; 4] {
        match self {
            Self::HtDemucs => [Source::Drums, Source::Bass, Source::Other, Source::Vocals],
        }
    }

    /// All available models
    pub fn all() -> &'static [Self] {
        &[Self::HtDemucs]
    }
}

/// Compute device the model runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cpu,
    Cuda,
}

impl Device {
    /// Pick the accelerator when requested and usable, otherwise the CPU
    pub fn select(use_gpu: bool) -> Self {
        if use_gpu && Self::cuda_available() {
            Self::Cuda
        } else {
            Self::Cpu
        }
    }

    #[cfg(feature = "cuda")]
    fn cuda_available() -> bool {
        use ort::execution_providers::{CUDAExecutionProvider, ExecutionProvider};

        match CUDAExecutionProvider::default().is_available() {
            Ok(available) => available,
            Err(e) => {
                log::warn!("Could not query CUDA execution provider: {}", e);
                false
            }
        }
    }

    #[cfg(not(feature = "cuda"))]
    fn cuda_available() -> bool {
        false
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Cuda => "cuda",
        }
    }
}
