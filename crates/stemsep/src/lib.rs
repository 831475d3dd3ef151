//! stemsep - split a mixed audio file into stems
//!
//! Runs a pretrained 4-source separation model (HTDemucs, ONNX) over one input
//! file and writes the requested stems (vocals, drums, bass, instrumental, ...)
//! as WAV files.

pub mod config;
pub mod separation;
