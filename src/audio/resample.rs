//! Channel mixing and sample-rate conversion for the capture path.
//!
//! Analysis runs on mono audio at one configured rate (16 kHz by default),
//! while capture devices deliver whatever they like — 44.1/48 kHz, one or
//! more channels.  Every chunk is normalized with [`mix_to_mono`] followed by
//! [`resample`] before it reaches the session buffer or the VAD.
//!
//! The resampler is linear interpolation: cheap, allocation-light, and more
//! than accurate enough for energy-based VAD and feature extraction.

// ---------------------------------------------------------------------------
// mix_to_mono
// ---------------------------------------------------------------------------

/// Downmix interleaved multi-channel audio to mono by averaging channels.
///
/// * `channels == 1` returns an owned copy of the input (fast path).
/// * `channels == 0` returns an empty vector.
///
/// # Example
///
/// ```rust
/// use scene_audio::audio::mix_to_mono;
///
/// let stereo = vec![0.5_f32, -0.5, 0.2, -0.2]; // L R L R
/// let mono = mix_to_mono(&stereo, 2);
/// assert_eq!(mono.len(), 2);
/// assert!((mono[0]).abs() < 1e-6);
/// ```
pub fn mix_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.to_vec(),
        n => {
            let n = n as usize;
            samples
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() / n as f32)
                .collect()
        }
    }
}

// ---------------------------------------------------------------------------
// resample
// ---------------------------------------------------------------------------

/// Resample mono `samples` from `from_hz` to `to_hz` by linear interpolation.
///
/// Equal rates (or a zero rate on either side) return the input unchanged.
///
/// # Example
///
/// ```rust
/// use scene_audio::audio::resample;
///
/// // 480 samples @ 48 kHz = 10 ms → 160 samples @ 16 kHz.
/// let hi = vec![0.5_f32; 480];
/// let lo = resample(&hi, 48_000, 16_000);
/// assert_eq!(lo.len(), 160);
/// ```
pub fn resample(samples: &[f32], from_hz: u32, to_hz: u32) -> Vec<f32> {
    if from_hz == to_hz || from_hz == 0 || to_hz == 0 {
        return samples.to_vec();
    }
    if samples.is_empty() {
        return Vec::new();
    }

    let ratio = to_hz as f64 / from_hz as f64;
    let output_len = (samples.len() as f64 * ratio).ceil() as usize;
    let mut output = Vec::with_capacity(output_len);

    for i in 0..output_len {
        let src_pos = i as f64 / ratio;
        let idx = src_pos as usize;
        let frac = src_pos - idx as f64;

        let sample = if idx + 1 < samples.len() {
            samples[idx] * (1.0 - frac as f32) + samples[idx + 1] * frac as f32
        } else if idx < samples.len() {
            samples[idx]
        } else {
            0.0
        };

        output.push(sample);
    }

    output
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
