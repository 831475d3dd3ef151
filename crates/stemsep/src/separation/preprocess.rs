//! Input preprocessing: resample to the model rate and coerce to stereo

use ndarray::{s, Array2, ArrayView1};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use super::audio::AudioBuffer;
use super::error::{Result, SeparationError};

/// Resample to `target_rate` and make sure there are exactly two channels
pub fn prepare(buffer: AudioBuffer, target_rate: u32) -> Result<AudioBuffer> {
    let resampled = resample(buffer, target_rate)?;
    to_stereo(resampled)
}

/// Sinc-resample the whole buffer in one pass
///
/// Output is time-aligned with the input (an event at `t` seconds stays at
/// `t`) and the length is `round(frames * target / source)`.
pub fn resample(buffer: AudioBuffer, target_rate: u32) -> Result<AudioBuffer> {
    let source_rate = buffer.sample_rate();
    if source_rate == target_rate {
        return Ok(buffer);
    }
    if source_rate == 0 || target_rate == 0 {
        return Err(SeparationError::ResampleFailed(format!(
            "Invalid sample rates: {} -> {}",
            source_rate, target_rate
        )));
    }

    let channels = buffer.channels();
    let frames = buffer.frames();
    let ratio = target_rate as f64 / source_rate as f64;
    let expected_frames = (frames as f64 * ratio).round() as usize;

    if frames == 0 || channels == 0 {
        return Ok(AudioBuffer::new(Array2::zeros((channels, 0)), target_rate));
    }

    log::info!(
        "Resampling {} frames from {}Hz to {}Hz ({} channels)",
        frames,
        source_rate,
        target_rate,
        channels
    );

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, frames, channels)
        .map_err(|e| SeparationError::ResampleFailed(e.to_string()))?;

    let waves_in: Vec<Vec<f32>> = buffer.channel_rows().map(|row| row.to_vec()).collect();

    let mut waves_out = resampler
        .process(&waves_in, None)
        .map_err(|e| SeparationError::ResampleFailed(e.to_string()))?;

    // Flush what is still held back by the filter delay
    let tail = resampler
        .process_partial(None::<&[Vec<f32>]>, None)
        .map_err(|e| SeparationError::ResampleFailed(e.to_string()))?;
    for (out, rest) in waves_out.iter_mut().zip(tail) {
        out.extend(rest);
    }

    // The flushed output already starts at input time zero; only the length
    // needs fixing up
    let mut samples = Array2::<f32>::zeros((channels, expected_frames));
    for (ch, wave) in waves_out.iter().enumerate() {
        let n = wave.len().min(expected_frames);
        samples
            .slice_mut(s![ch, ..n])
            .assign(&ArrayView1::from(&wave[..n]));
    }

    Ok(AudioBuffer::new(samples, target_rate))
}

/// Duplicate mono to stereo; keep the first two channels of wider input
pub fn to_stereo(buffer: AudioBuffer) -> Result<AudioBuffer> {
    let sample_rate = buffer.sample_rate();
    match buffer.channels() {
        0 => Err(SeparationError::UnsupportedFormat(
            "Audio has no channels".to_string(),
        )),
        1 => {
            let mono = buffer.samples().row(0);
            let stereo = Array2::from_shape_fn((2, mono.len()), |(_, i)| mono[i]);
            Ok(AudioBuffer::new(stereo, sample_rate))
        }
        2 => Ok(buffer),
        n => {
            log::info!("Keeping first 2 of {} channels", n);
            let stereo = buffer.samples().slice(s![0..2, ..]).to_owned();
            Ok(AudioBuffer::new(stereo, sample_rate))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn sine(frames: usize, rate: u32, freq: f32) -> Vec<f32> {
        (0..frames)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / rate as f32).sin())
            .collect()
    }

    #[test]
    fn test_mono_duplicated_to_stereo() {
        let mono = AudioBuffer::new(array![[0.1, 0.2, 0.3]], 44100);
        let stereo = to_stereo(mono).unwrap();
        assert_eq!(stereo.samples(), &array![[0.1, 0.2, 0.3], [0.1, 0.2, 0.3]]);
    }

    #[test]
    fn test_stereo_passthrough() {
        let buffer = AudioBuffer::new(array![[0.1, 0.2], [0.3, 0.4]], 44100);
        assert_eq!(to_stereo(buffer.clone()).unwrap(), buffer);
    }

    #[test]
    fn test_multichannel_keeps_first_two() {
        let buffer = AudioBuffer::new(array![[1.0, 1.0], [2.0, 2.0], [3.0, 3.0]], 48000);
        let stereo = to_stereo(buffer).unwrap();
        assert_eq!(stereo.samples(), &array![[1.0, 1.0], [2.0, 2.0]]);
    }

    #[test]
    fn test_no_channels_rejected() {
        let buffer = AudioBuffer::new(Array2::zeros((0, 0)), 44100);
        assert!(to_stereo(buffer).is_err());
    }

    #[test]
    fn test_resample_same_rate_is_noop() {
        let buffer = AudioBuffer::new(array![[0.5, -0.5]], 44100);
        assert_eq!(resample(buffer.clone(), 44100).unwrap(), buffer);
    }

    #[test]
    fn test_resample_length_and_rate() {
        let frames = 22050;
        let buffer = AudioBuffer::from_interleaved(&sine(frames, 22050, 440.0), 1, 22050);
        let out = resample(buffer, 44100).unwrap();
        assert_eq!(out.sample_rate(), 44100);
        assert_eq!(out.channels(), 1);
        assert_eq!(out.frames(), 44100);
    }

    #[test]
    fn test_resample_preserves_signal() {
        let input = sine(48000, 48000, 440.0);
        let buffer = AudioBuffer::from_interleaved(&input, 1, 48000);
        let out = resample(buffer, 44100).unwrap();
        let expected = sine(44100, 44100, 440.0);

        // Skip the edges where the filter sees zero padding
        let row = out.samples().row(0);
        let max_diff = (1000..43000)
            .map(|i| (row[i] - expected[i]).abs())
            .fold(0.0f32, f32::max);
        assert!(max_diff < 0.1, "Resampled signal drifted: {}", max_diff);
    }

    #[test]
    fn test_resample_keeps_impulse_position() {
        let mut input = vec![0.0f32; 48000];
        input[24000] = 1.0;
        let buffer = AudioBuffer::from_interleaved(&input, 1, 48000);
        let out = resample(buffer, 44100).unwrap();

        let row = out.samples().row(0);
        let peak = (0..row.len())
            .max_by(|&a, &b| row[a].abs().total_cmp(&row[b].abs()))
            .unwrap();
        // 0.5 s in at either rate
        assert!(
            peak.abs_diff(22050) <= 2,
            "Impulse moved to frame {}",
            peak
        );
    }

    #[test]
    fn test_resample_empty() {
        let buffer = AudioBuffer::new(Array2::zeros((2, 0)), 22050);
        let out = resample(buffer, 44100).unwrap();
        assert_eq!(out.frames(), 0);
        assert_eq!(out.channels(), 2);
        assert_eq!(out.sample_rate(), 44100);
    }

    #[test]
    fn test_prepare_mono_22k() {
        let buffer = AudioBuffer::from_interleaved(&sine(2205, 22050, 220.0), 1, 22050);
        let out = prepare(buffer, 44100).unwrap();
        assert_eq!(out.channels(), 2);
        assert_eq!(out.frames(), 4410);
        assert_eq!(out.samples().row(0), out.samples().row(1));
    }
}
