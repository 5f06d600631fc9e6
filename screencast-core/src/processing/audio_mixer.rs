/// Pure-math sample conversion and gain mixing for the audio graph.
///
/// All operations work on `&[f32]` buffers with no host dependencies.
/// Every source is brought to interleaved stereo at the output rate before
/// mixing; mono sources are centered.
#[derive(Debug, Clone)]
pub struct AudioMixer {
    pub target_sample_rate: f64,
}

impl AudioMixer {
    pub fn new(target_sample_rate: f64) -> Self {
        Self { target_sample_rate }
    }

    /// Convert a delivered buffer to interleaved stereo at the output rate.
    ///
    /// Mono is duplicated to both channels, stereo is resampled as-is, and
    /// anything wider is downmixed to mono first.
    pub fn to_output_stereo(&self, samples: &[f32], sample_rate: f64, channels: u16) -> Vec<f32> {
        match channels {
            0 => Vec::new(),
            1 => {
                let mono = self.resample(samples, sample_rate);
                self.interleave(&mono, &mono)
            }
            2 => self.resample_stereo(samples, sample_rate),
            n => {
                let mono = self.resample(&downmix_to_mono(samples, n as usize), sample_rate);
                self.interleave(&mono, &mono)
            }
        }
    }

    /// Sum gain-scaled interleaved stereo inputs.
    ///
    /// Inputs shorter than the longest are treated as silence past their end.
    pub fn mix_nodes(&self, inputs: &[(&[f32], f32)]) -> Vec<f32> {
        let len = inputs.iter().map(|(s, _)| s.len()).max().unwrap_or(0);
        let mut out = vec![0.0f32; len];
        for (samples, gain) in inputs {
            for (o, s) in out.iter_mut().zip(samples.iter()) {
                *o += s * gain;
            }
        }
        out
    }

    /// Interleave two mono channels into stereo `[L0, R0, L1, R1, ...]`.
    pub fn interleave(&self, left: &[f32], right: &[f32]) -> Vec<f32> {
        let frame_count = left.len().max(right.len());
        if frame_count == 0 {
            return Vec::new();
        }

        let mut stereo = vec![0.0f32; frame_count * 2];
        for i in 0..frame_count {
            stereo[i * 2] = if i < left.len() { left[i] } else { 0.0 };
            stereo[i * 2 + 1] = if i < right.len() { right[i] } else { 0.0 };
        }
        stereo
    }

    /// Convert f32 samples `[-1.0, 1.0]` to 16-bit PCM (little-endian bytes).
    ///
    /// Clamps out-of-range values. Output length = `samples.len() * 2` bytes.
    pub fn convert_to_int16_pcm(samples: &[f32]) -> Vec<u8> {
        let mut data = Vec::with_capacity(samples.len() * 2);
        for &sample in samples {
            let clamped = sample.clamp(-1.0, 1.0);
            let int16_value = (clamped * i16::MAX as f32) as i16;
            data.extend_from_slice(&int16_value.to_le_bytes());
        }
        data
    }

    /// Linear interpolation resampling for mono audio.
    ///
    /// Returns input unchanged if rates match.
    pub fn resample(&self, samples: &[f32], source_sample_rate: f64) -> Vec<f32> {
        if (source_sample_rate - self.target_sample_rate).abs() < 0.01 || samples.is_empty() {
            return samples.to_vec();
        }

        let ratio = self.target_sample_rate / source_sample_rate;
        let output_count = (samples.len() as f64 * ratio) as usize;
        if output_count == 0 {
            return Vec::new();
        }

        let mut output = vec![0.0f32; output_count];
        for (i, sample) in output.iter_mut().enumerate() {
            let source_index = i as f64 / ratio;
            let index = source_index as usize;
            let fraction = (source_index - index as f64) as f32;

            if index + 1 < samples.len() {
                *sample = samples[index] * (1.0 - fraction) + samples[index + 1] * fraction;
            } else if index < samples.len() {
                *sample = samples[index];
            }
        }
        output
    }

    /// Linear interpolation resampling for interleaved stereo audio.
    pub fn resample_stereo(&self, samples: &[f32], source_sample_rate: f64) -> Vec<f32> {
        if (source_sample_rate - self.target_sample_rate).abs() < 0.01 || samples.is_empty() {
            return samples.to_vec();
        }

        let frame_count = samples.len() / 2;
        let ratio = self.target_sample_rate / source_sample_rate;
        let output_frames = (frame_count as f64 * ratio) as usize;
        if output_frames == 0 {
            return Vec::new();
        }

        let mut output = vec![0.0f32; output_frames * 2];
        for i in 0..output_frames {
            let source_index = i as f64 / ratio;
            let index = source_index as usize;
            let fraction = (source_index - index as f64) as f32;

            for ch in 0..2usize {
                if index + 1 < frame_count {
                    output[i * 2 + ch] =
                        samples[index * 2 + ch] * (1.0 - fraction) + samples[(index + 1) * 2 + ch] * fraction;
                } else if index < frame_count {
                    output[i * 2 + ch] = samples[index * 2 + ch];
                }
            }
        }
        output
    }
}

/// Average interleaved channels down to mono.
pub fn downmix_to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}
