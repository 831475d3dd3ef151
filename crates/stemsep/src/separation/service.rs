//! Separation service - coordinates model provisioning, inference and stem output
//!
//! The `SeparationService` is the main entry point for stem separation.
//! One call to [`SeparationService::separate`] runs the whole pipeline,
//! sequentially and blocking:
//!
//! ```text
//! decode → resample/stereo → model → select stems → write WAVs
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use super::audio::{decode_audio, write_wav};
use super::backend::{OrtBackend, SeparationBackend};
use super::config::{Device, SeparationConfig};
use super::error::{Result, SeparationError};
use super::model::{DownloadProgress, ModelManager};
use super::preprocess::prepare;
use super::report::SeparationReport;
use super::stems::{OutputManifest, StemRequest};

/// Progress stage during separation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeparationStage {
    /// Downloading model (if needed)
    DownloadingModel,
    /// Loading model into memory
    LoadingModel,
    /// Decoding the input file
    LoadingAudio,
    /// Converting to the model's sample rate
    Resampling,
    /// Running the model
    Separating,
    /// Writing stem files
    Saving,
    /// Finished
    Complete,
}

/// Progress event with a human-readable status message
#[derive(Debug, Clone)]
pub struct SeparationProgress {
    pub stage: SeparationStage,
    pub message: String,
}

impl SeparationProgress {
    fn new(stage: SeparationStage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }
}

/// Callback for separation progress (uses Arc for cloneability)
pub type ProgressCallback = Arc<dyn Fn(SeparationProgress) + Send + Sync>;

fn report(progress: Option<&ProgressCallback>, stage: SeparationStage, message: impl Into<String>) {
    if let Some(cb) = progress {
        cb(SeparationProgress::new(stage, message));
    }
}

/// Main service for audio stem separation
///
/// Example usage:
/// ```ignore
/// let mut service = SeparationService::new(SeparationConfig::default(), None)?;
/// let manifest = service.separate("song.mp3", "out", &["vocals", "drums"], None)?;
/// ```
pub struct SeparationService {
    config: SeparationConfig,
    backend: Box<dyn SeparationBackend>,
}

impl SeparationService {
    /// Provision the model (downloading if allowed) and load it
    pub fn new(mut config: SeparationConfig, progress: Option<ProgressCallback>) -> Result<Self> {
        config.validate();

        let model_path = resolve_model_path(&config, progress.clone())?;

        let device = Device::select(config.use_gpu);
        report(
            progress.as_ref(),
            SeparationStage::LoadingModel,
            format!(
                "Loading {} model on {}",
                config.model.display_name(),
                device.name()
            ),
        );
        let backend = OrtBackend::load(&model_path, config.model, device)?;

        Ok(Self::with_backend(config, Box::new(backend)))
    }

    /// Use an already loaded backend
    pub fn with_backend(mut config: SeparationConfig, backend: Box<dyn SeparationBackend>) -> Self {
        config.validate();
        log::info!(
            "SeparationService using {} on {}",
            backend.name(),
            backend.device().name()
        );
        Self { config, backend }
    }

    /// Get current configuration
    pub fn config(&self) -> &SeparationConfig {
        &self.config
    }

    /// Get information about the current backend
    pub fn backend_info(&self) -> &'static str {
        self.backend.name()
    }

    pub fn device(&self) -> Device {
        self.backend.device()
    }

    /// Separate `input` and write the requested stems into `output_dir`
    ///
    /// Unknown stem names are reported and skipped. Requests that resolve to
    /// an already written stem are ignored. Any failure aborts the run; files
    /// written before it are left in place.
    pub fn separate<S: AsRef<str>>(
        &mut self,
        input: impl AsRef<Path>,
        output_dir: impl AsRef<Path>,
        stems: &[S],
        progress: Option<&ProgressCallback>,
    ) -> Result<OutputManifest> {
        let input = input.as_ref();
        let output_dir = output_dir.as_ref();
        let model_rate = self.config.model.sample_rate();

        check_input(input)?;

        report(
            progress,
            SeparationStage::LoadingAudio,
            format!("Loading audio file: {}", input.display()),
        );
        let audio = decode_audio(input)?;

        if audio.sample_rate() != model_rate {
            report(
                progress,
                SeparationStage::Resampling,
                format!("Resampling from {} to {}", audio.sample_rate(), model_rate),
            );
        }
        let mixture = prepare(audio, model_rate)?;

        report(
            progress,
            SeparationStage::Separating,
            format!(
                "Processing audio with {} on {}...",
                self.config.model.display_name(),
                self.backend.device().name()
            ),
        );
        let sources = self.backend.separate(&mixture)?;

        if sources.frames() != mixture.frames() {
            log::warn!(
                "Model returned {} frames for {} input frames",
                sources.frames(),
                mixture.frames()
            );
        }

        std::fs::create_dir_all(output_dir)?;

        report(progress, SeparationStage::Saving, "Saving separated stems...");

        let mut manifest = OutputManifest::new();
        for name in stems {
            let name = name.as_ref();
            let Some(request) = StemRequest::resolve(name) else {
                log::warn!("Unknown stem {:?}, skipping", name);
                report(
                    progress,
                    SeparationStage::Saving,
                    format!("Unknown stem: {}, skipping", name),
                );
                continue;
            };

            if manifest.get(&request.output_name).is_some() {
                log::debug!("Stem {} already written, ignoring {:?}", request.output_name, name);
                continue;
            }

            let path = request.output_path(output_dir);
            write_wav(&path, &request.render(&sources))?;
            report(
                progress,
                SeparationStage::Saving,
                format!("Saved {} to {}", request.output_name, path.display()),
            );
            manifest.insert(request.output_name, path);
        }

        report(
            progress,
            SeparationStage::Complete,
            "Audio separation completed successfully",
        );

        Ok(manifest)
    }
}

/// Run a whole separation and fold any failure into the report
///
/// The input is checked before the model is provisioned so a bad path fails
/// without touching the network.
pub fn run_separation<S: AsRef<str>>(
    config: SeparationConfig,
    input: &Path,
    output_dir: &Path,
    stems: &[S],
    progress: Option<ProgressCallback>,
) -> SeparationReport {
    let outcome = check_input(input)
        .and_then(|_| SeparationService::new(config, progress.clone()))
        .and_then(|mut service| service.separate(input, output_dir, stems, progress.as_ref()));

    if let Err(e) = &outcome {
        log::error!("Separation failed: {}", e);
        report(
            progress.as_ref(),
            SeparationStage::Complete,
            format!("Error during separation: {}", e),
        );
    }

    SeparationReport::from(outcome)
}

fn check_input(input: &Path) -> Result<()> {
    if input.is_file() {
        return Ok(());
    }
    Err(SeparationError::AudioReadError {
        path: input.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::NotFound, "Input file not found"),
    })
}

/// Locate the ONNX model: explicit path, or the cache (downloading if allowed)
fn resolve_model_path(
    config: &SeparationConfig,
    progress: Option<ProgressCallback>,
) -> Result<PathBuf> {
    if let Some(path) = &config.model_path {
        if path.is_file() {
            return Ok(path.clone());
        }
        return Err(SeparationError::ModelNotFound(path.display().to_string()));
    }

    let manager = match &config.cache_dir {
        Some(dir) => ModelManager::with_cache_dir(dir.clone()),
        None => ModelManager::new()?,
    };

    if manager.is_model_available(config.model) {
        return manager.ensure_model(config.model, None);
    }

    if !config.auto_download {
        return Err(SeparationError::ModelNotFound(format!(
            "{} is not in {} and auto_download is disabled",
            config.model.filename(),
            manager.cache_dir().display()
        )));
    }

    report(
        progress.as_ref(),
        SeparationStage::DownloadingModel,
        format!("Downloading {} model...", config.model.display_name()),
    );

    // One progress line per 10% step
    let download_progress: Option<DownloadProgress> = progress.map(|cb| {
        let last_step = AtomicU32::new(0);
        Box::new(move |p: f32| {
            let step = (p.clamp(0.0, 1.0) * 10.0) as u32;
            if step > last_step.swap(step, Ordering::Relaxed) {
                cb(SeparationProgress::new(
                    SeparationStage::DownloadingModel,
                    format!("Downloading model... {}%", step * 10),
                ));
            }
        }) as DownloadProgress
    });

    manager.ensure_model(config.model, download_progress)
}
