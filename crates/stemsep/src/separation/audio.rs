//! Audio buffers, decoding (Symphonia) and WAV writing (hound)

use std::fs::File;
use std::path::Path;

use ndarray::{Array2, Axis};

use super::error::{Result, SeparationError};

/// Planar audio samples, shape `(channels, frames)`
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    samples: Array2<f32>,
    sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(samples: Array2<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Build a buffer from interleaved samples (`L R L R ...` for stereo)
    ///
    /// A trailing partial frame is dropped.
    pub fn from_interleaved(interleaved: &[f32], channels: usize, sample_rate: u32) -> Self {
        if channels == 0 {
            return Self::new(Array2::zeros((0, 0)), sample_rate);
        }
        let frames = interleaved.len() / channels;
        let samples =
            Array2::from_shape_fn((channels, frames), |(ch, i)| interleaved[i * channels + ch]);
        Self::new(samples, sample_rate)
    }

    /// Interleave channels for writing
    pub fn to_interleaved(&self) -> Vec<f32> {
        // Transposed iteration walks frame by frame
        self.samples.t().iter().copied().collect()
    }

    pub fn channels(&self) -> usize {
        self.samples.nrows()
    }

    /// Number of samples per channel
    pub fn frames(&self) -> usize {
        self.samples.ncols()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in seconds
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn samples(&self) -> &Array2<f32> {
        &self.samples
    }

    /// Iterate over channel rows
    pub fn channel_rows(&self) -> impl Iterator<Item = ndarray::ArrayView1<'_, f32>> {
        self.samples.axis_iter(Axis(0))
    }
}

/// Decode an audio file to an [`AudioBuffer`] using Symphonia
pub fn decode_audio(path: &Path) -> Result<AudioBuffer> {
    use symphonia::core::audio::SampleBuffer;
    use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
    use symphonia::core::errors::Error as SymphoniaError;
    use symphonia::core::formats::FormatOptions;
    use symphonia::core::io::MediaSourceStream;
    use symphonia::core::meta::MetadataOptions;
    use symphonia::core::probe::Hint;

    let file = File::open(path).map_err(|e| SeparationError::AudioReadError {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| SeparationError::UnsupportedFormat(e.to_string()))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| SeparationError::UnsupportedFormat("No audio track found".to_string()))?;

    let track_id = track.id;

    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| SeparationError::UnsupportedFormat("Unknown sample rate".to_string()))?;

    let mut channels = track
        .codec_params
        .channels
        .map(|c| c.count())
        .unwrap_or(2);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| SeparationError::UnsupportedFormat(e.to_string()))?;

    let mut samples: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => {
                log::warn!("Error reading packet: {}", e);
                break;
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(e) => {
                log::warn!("Error decoding packet: {}", e);
                continue;
            }
        };

        if sample_buf.is_none() {
            let spec = *decoded.spec();
            channels = spec.channels.count();
            sample_buf = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
        }

        if let Some(ref mut buf) = sample_buf {
            buf.copy_interleaved_ref(decoded);
            samples.extend_from_slice(buf.samples());
        }
    }

    log::info!(
        "Decoded {:?}: {} samples, {}Hz, {} channels",
        path,
        samples.len(),
        sample_rate,
        channels
    );

    Ok(AudioBuffer::from_interleaved(&samples, channels, sample_rate))
}

/// Write a buffer as a 32-bit float WAV file
pub fn write_wav(path: &Path, buffer: &AudioBuffer) -> Result<()> {
    use hound::{SampleFormat, WavSpec, WavWriter};

    let write_error = |e: hound::Error| SeparationError::StemWriteError {
        path: path.to_path_buf(),
        source: match e {
            hound::Error::IoError(io) => io,
            other => std::io::Error::new(std::io::ErrorKind::Other, other.to_string()),
        },
    };

    let channels = u16::try_from(buffer.channels()).map_err(|_| {
        SeparationError::SeparationFailed(format!(
            "Too many channels to write: {}",
            buffer.channels()
        ))
    })?;

    let spec = WavSpec {
        channels,
        sample_rate: buffer.sample_rate(),
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };

    let mut writer = WavWriter::create(path, spec).map_err(write_error)?;
    for sample in buffer.to_interleaved() {
        writer.write_sample(sample).map_err(write_error)?;
    }
    writer.finalize().map_err(write_error)?;

    Ok(())
}
