//! Separation backend trait and the ONNX Runtime implementation
//!
//! `SeparationBackend` abstracts the inference step so the pipeline does not
//! depend on a particular runtime. `OrtBackend` runs the exported Demucs graph
//! through the `ort` crate.

use std::path::Path;

use ndarray::{Array2, Array3};

use super::audio::AudioBuffer;
use super::config::{Device, ModelType};
use super::error::{Result, SeparationError};
use super::stems::SeparationResult;

/// Trait for audio stem separation backends
///
/// Input is always a stereo buffer at the model's sample rate; output is the
/// four model sources with the same duration.
pub trait SeparationBackend: Send {
    /// Run the model once over the whole buffer
    fn separate(&mut self, mixture: &AudioBuffer) -> Result<SeparationResult>;

    /// Get backend name for logging
    fn name(&self) -> &'static str;

    /// Device the model was loaded on
    fn device(&self) -> Device;
}

/// Backend using ONNX Runtime directly via the `ort` crate
///
/// The session is built once in [`OrtBackend::load`] and reused for the
/// lifetime of the backend.
pub struct OrtBackend {
    session: ort::session::Session,
    model: ModelType,
    device: Device,
}

impl OrtBackend {
    /// Load the ONNX model and build an inference session on `device`
    pub fn load(model_path: &Path, model: ModelType, device: Device) -> Result<Self> {
        use ort::session::{builder::GraphOptimizationLevel, Session};

        if !model_path.exists() {
            return Err(SeparationError::ModelNotFound(
                model_path.display().to_string(),
            ));
        }

        log::info!(
            "Loading ONNX model from {:?} on {}",
            model_path,
            device.name()
        );

        let builder = Session::builder()
            .map_err(|e| SeparationError::BackendInitFailed(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| SeparationError::BackendInitFailed(e.to_string()))?;

        let builder = match device {
            Device::Cpu => builder,
            Device::Cuda => Self::with_cuda(builder)?,
        };

        let session = builder.commit_from_file(model_path).map_err(|e| {
            SeparationError::BackendInitFailed(format!("Failed to load ONNX model: {}", e))
        })?;

        Ok(Self {
            session,
            model,
            device,
        })
    }

    #[cfg(feature = "cuda")]
    fn with_cuda(
        builder: ort::session::builder::SessionBuilder,
    ) -> Result<ort::session::builder::SessionBuilder> {
        use ort::execution_providers::CUDAExecutionProvider;

        builder
            .with_execution_providers([CUDAExecutionProvider::default().build()])
            .map_err(|e| SeparationError::BackendInitFailed(e.to_string()))
    }

    #[cfg(not(feature = "cuda"))]
    fn with_cuda(
        _builder: ort::session::builder::SessionBuilder,
    ) -> Result<ort::session::builder::SessionBuilder> {
        Err(SeparationError::BackendInitFailed(
            "Built without the `cuda` feature".to_string(),
        ))
    }
}

impl SeparationBackend for OrtBackend {
    fn separate(&mut self, mixture: &AudioBuffer) -> Result<SeparationResult> {
        use ort::value::Tensor;

        if mixture.channels() != 2 {
            return Err(SeparationError::SeparationFailed(format!(
                "Model expects stereo input, got {} channels",
                mixture.channels()
            )));
        }

        let num_samples = mixture.frames();

        // Demucs expects shape [1, 2, N]
        let input_array: Array3<f32> = mixture
            .samples()
            .as_standard_layout()
            .into_owned()
            .into_shape_with_order((1, 2, num_samples))
            .map_err(|e| SeparationError::SeparationFailed(e.to_string()))?;

        log::info!("Running inference on {} samples...", num_samples);

        let input_tensor = Tensor::from_array(input_array).map_err(|e| {
            SeparationError::SeparationFailed(format!("Failed to create input tensor: {}", e))
        })?;

        let outputs = self
            .session
            .run(ort::inputs!["input" => input_tensor])
            .map_err(|e| SeparationError::SeparationFailed(format!("Inference failed: {}", e)))?;

        let output = outputs
            .iter()
            .next()
            .ok_or_else(|| SeparationError::SeparationFailed("No output tensor".to_string()))?
            .1;

        let (shape, data) = output.try_extract_tensor::<f32>().map_err(|e| {
            SeparationError::SeparationFailed(format!("Failed to extract output: {}", e))
        })?;

        let output_shape: Vec<i64> = shape.iter().copied().collect();
        log::info!("Output shape: {:?}", output_shape);

        split_sources(&output_shape, data, self.model)
    }

    fn name(&self) -> &'static str {
        "ONNX Runtime"
    }

    fn device(&self) -> Device {
        self.device
    }
}

/// Split a flat `[1, 4, 2, N]` row-major output tensor into the model's sources
fn split_sources(shape: &[i64], data: &[f32], model: ModelType) -> Result<SeparationResult> {
    let order = model.sources();

    if shape.len() != 4 || shape[0] != 1 || shape[1] != order.len() as i64 || shape[2] != 2 {
        return Err(SeparationError::SeparationFailed(format!(
            "Unexpected output shape: {:?}, expected [1, {}, 2, N]",
            shape,
            order.len()
        )));
    }

    let channels = shape[2] as usize;
    let frames = shape[3].max(0) as usize;
    let per_source = channels * frames;

    if data.len() != order.len() * per_source {
        return Err(SeparationError::SeparationFailed(format!(
            "Output has {} values, shape {:?} needs {}",
            data.len(),
            shape,
            order.len() * per_source
        )));
    }

    let sample_rate = model.sample_rate();
    let mut buffers: [Option<AudioBuffer>; 4] = Default::default();
    for (stem_idx, source) in order.iter().enumerate() {
        let slice = &data[stem_idx * per_source..(stem_idx + 1) * per_source];
        let samples = Array2::from_shape_vec((channels, frames), slice.to_vec())
            .map_err(|e| SeparationError::SeparationFailed(e.to_string()))?;
        buffers[source.index()] = Some(AudioBuffer::new(samples, sample_rate));
    }

    let [drums, bass, other, vocals] = buffers;
    let missing = || SeparationError::SeparationFailed("Model order lacks a source".to_string());
    SeparationResult::new(
        drums.ok_or_else(missing)?,
        bass.ok_or_else(missing)?,
        other.ok_or_else(missing)?,
        vocals.ok_or_else(missing)?,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::separation::stems::Source;

    #[test]
    fn test_split_sources_follows_model_order() {
        let frames = 3;
        // Fill each [stem, channel] row with stem*10 + channel
        let data: Vec<f32> = (0..4)
            .flat_map(|stem| {
                (0..2).flat_map(move |ch| std::iter::repeat((stem * 10 + ch) as f32).take(frames))
            })
            .collect();

        let result = split_sources(&[1, 4, 2, frames as i64], &data, ModelType::HtDemucs).unwrap();

        assert_eq!(result.frames(), frames);
        assert_eq!(result.sample_rate(), 44_100);
        assert_eq!(result.get(Source::Drums).samples()[[0, 0]], 0.0);
        assert_eq!(result.get(Source::Drums).samples()[[1, 2]], 1.0);
        assert_eq!(result.get(Source::Bass).samples()[[0, 1]], 10.0);
        assert_eq!(result.get(Source::Other).samples()[[1, 0]], 21.0);
        assert_eq!(result.get(Source::Vocals).samples()[[0, 2]], 30.0);
    }

    #[test]
    fn test_split_sources_rejects_bad_shape() {
        let err = split_sources(&[1, 6, 2, 1], &[0.0; 12], ModelType::HtDemucs);
        assert!(err.is_err());

        let err = split_sources(&[1, 4, 2, 2], &[0.0; 3], ModelType::HtDemucs);
        assert!(err.is_err());
    }

    #[test]
    fn test_load_missing_model() {
        let err = OrtBackend::load(
            Path::new("/nonexistent/htdemucs.onnx"),
            ModelType::HtDemucs,
            Device::Cpu,
        )
        .err()
        .unwrap();
        assert!(matches!(err, SeparationError::ModelNotFound(_)));
    }
}
