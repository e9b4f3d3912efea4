//! PCM resampling adapter
//!
//! High-quality FFT resampling via rubato, with a deterministic
//! linear-interpolation fallback when the resampler cannot be constructed
//! for a rate pair. Also hosts the fixed-point conversion used at the
//! encoder boundary.

use rubato::{FftFixedIn, Resampler};
use tracing::debug;

use crate::application::ports::{PcmResampler, ResampleError};

/// Rubato-backed resampler implementing the [`PcmResampler`] port.
pub struct RubatoResampler;

impl PcmResampler for RubatoResampler {
    fn resample(
        &self,
        samples: Vec<f32>,
        in_rate: u32,
        out_rate: u32,
    ) -> Result<Vec<f32>, ResampleError> {
        resample_mono(&samples, in_rate, out_rate)
    }
}

/// Resample mono PCM from `in_rate` to `out_rate`.
pub fn resample_mono(samples: &[f32], in_rate: u32, out_rate: u32) -> Result<Vec<f32>, ResampleError> {
    if in_rate == out_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let ratio = out_rate as f64 / in_rate as f64;
    let output_len = (samples.len() as f64 * ratio).ceil() as usize;

    let resampler = FftFixedIn::<f32>::new(
        in_rate as usize,
        out_rate as usize,
        1024, // Chunk size
        2,    // Sub-chunks
        1,    // Mono
    );

    let mut resampler = match resampler {
        Ok(r) => r,
        Err(e) => {
            debug!(in_rate, out_rate, error = %e, "fft resampler unavailable, using linear");
            return Ok(linear_resample_mono(samples, in_rate, out_rate));
        }
    };

    let mut output = Vec::with_capacity(output_len);
    let mut input_pos = 0;

    while input_pos < samples.len() {
        let frames_needed = resampler.input_frames_next();
        let end_pos = (input_pos + frames_needed).min(samples.len());
        let chunk: Vec<Vec<f32>> = vec![samples[input_pos..end_pos].to_vec()];

        // Pad if we don't have enough samples
        let chunk = if chunk[0].len() < frames_needed {
            let mut padded = chunk[0].clone();
            padded.resize(frames_needed, 0.0);
            vec![padded]
        } else {
            chunk
        };

        let resampled = resampler
            .process(&chunk, None)
            .map_err(|e| ResampleError::Failed(e.to_string()))?;

        output.extend_from_slice(&resampled[0]);
        input_pos = end_pos;
    }

    // Trim to expected output length
    output.truncate(output_len);

    Ok(output)
}

/// Linear-interpolation fallback. Deterministic and dependency-free; lower
/// quality than the FFT path but acceptable per the resampling policy.
pub fn linear_resample_mono(samples: &[f32], in_rate: u32, out_rate: u32) -> Vec<f32> {
    if in_rate == out_rate || samples.is_empty() {
        return samples.to_vec();
    }
    let ratio = in_rate as f64 / out_rate as f64;
    let out_len = (samples.len() as f64 / ratio).floor() as usize;
    let mut out = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let idx = i as f64 * ratio;
        let idx_prev = idx.floor() as usize;
        let idx_next = (idx_prev + 1).min(samples.len() - 1);
        let frac = (idx - idx_prev as f64) as f32;
        out.push(samples[idx_prev] * (1.0 - frac) + samples[idx_next] * frac);
    }
    out
}

/// Map normalized floats to the encoder's fixed-point input range, clamping
/// to prevent wraparound on values slightly outside [-1, 1].
pub fn float_to_i16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| {
            let s = s.clamp(-1.0, 1.0);
            if s < 0.0 {
                (s * 32768.0) as i16
            } else {
                (s * 32767.0) as i16
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_when_rates_match() {
        let samples = vec![0.1f32, 0.2, 0.3];
        assert_eq!(resample_mono(&samples, 48000, 48000).unwrap(), samples);
    }

    #[test]
    fn downsample_halves_length_approximately() {
        let samples = vec![0.5f32; 48000];
        let out = resample_mono(&samples, 48000, 24000).unwrap();
        let expected = 24000;
        assert!((out.len() as i64 - expected).abs() <= 2, "got {}", out.len());
    }

    #[test]
    fn linear_fallback_interpolates() {
        let samples = vec![0.0f32, 1.0];
        let out = linear_resample_mono(&samples, 2, 4);
        assert_eq!(out.len(), 4);
        assert_eq!(out[0], 0.0);
        assert!((out[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn resampling_is_deterministic() {
        let samples: Vec<f32> = (0..4410)
            .map(|i| (i as f32 * 0.01).sin() * 0.5)
            .collect();
        let a = resample_mono(&samples, 44100, 48000).unwrap();
        let b = resample_mono(&samples, 44100, 48000).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn float_conversion_clamps_out_of_range() {
        let out = float_to_i16(&[1.5, -1.5, 0.0, 1.0, -1.0]);
        assert_eq!(out, vec![32767, -32768, 0, 32767, -32768]);
    }
}
