//! Audio stem separation module
//!
//! Splits a mixed recording into the four sources of a Demucs-style model
//! (drums, bass, other, vocals) and writes the requested stems as WAV files.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                  SeparationService                       │
//! │  • Provisions the model (cache / download)              │
//! │  • Decodes and preprocesses the input                   │
//! │  • Selects and writes stems                             │
//! └─────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │              SeparationBackend (trait)                   │
//! │  • separate() - one forward pass over the mixture       │
//! └─────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//!                    ┌─────────────────┐
//!                    │   OrtBackend    │
//!                    │ (ONNX Runtime)  │
//!                    └─────────────────┘
//! ```

mod audio;
mod backend;
mod config;
mod error;
mod model;
mod preprocess;
mod report;
mod service;
mod stems;

pub use audio::{decode_audio, write_wav, AudioBuffer};
pub use backend::{OrtBackend, SeparationBackend};
pub use config::{Device, ModelType, SeparationConfig};
pub use error::{Result, SeparationError};
pub use model::{DownloadProgress, ModelManager};
pub use preprocess::{prepare, resample, to_stereo};
pub use report::SeparationReport;
pub use service::{
    run_separation, ProgressCallback, SeparationProgress, SeparationService, SeparationStage,
};
pub use stems::{OutputManifest, SeparationResult, Source, StemRequest};
