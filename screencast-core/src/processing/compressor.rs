/// Dynamics limiter settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompressorSettings {
    pub threshold_db: f32,
    pub knee_db: f32,
    pub ratio: f32,
    pub attack_secs: f32,
    pub release_secs: f32,
}

impl Default for CompressorSettings {
    fn default() -> Self {
        Self {
            threshold_db: -10.0,
            knee_db: 12.0,
            ratio: 3.0,
            attack_secs: 0.003,
            release_secs: 0.25,
        }
    }
}

/// Soft-knee feed-forward compressor shared by every mixer input.
///
/// Channels are linked: the gain for a frame is computed from its loudest
/// channel and applied to all of them, which keeps the stereo image stable.
#[derive(Debug, Clone)]
pub struct DynamicsCompressor {
    settings: CompressorSettings,
    attack_coeff: f32,
    release_coeff: f32,
    /// Current gain reduction in dB (always <= 0).
    reduction_db: f32,
}

impl DynamicsCompressor {
    pub fn new(settings: CompressorSettings, sample_rate: f64) -> Self {
        Self {
            attack_coeff: time_coefficient(settings.attack_secs, sample_rate),
            release_coeff: time_coefficient(settings.release_secs, sample_rate),
            settings,
            reduction_db: 0.0,
        }
    }

    pub fn settings(&self) -> &CompressorSettings {
        &self.settings
    }

    pub fn reduction_db(&self) -> f32 {
        self.reduction_db
    }

    /// Static transfer curve: output level (dB) for a steady input level (dB).
    pub fn static_curve(&self, input_db: f32) -> f32 {
        let CompressorSettings {
            threshold_db: t,
            knee_db: w,
            ratio: r,
            ..
        } = self.settings;
        let over = input_db - t;

        if 2.0 * over < -w {
            input_db
        } else if w > 0.0 && 2.0 * over.abs() <= w {
            input_db + (1.0 / r - 1.0) * (over + w / 2.0).powi(2) / (2.0 * w)
        } else {
            t + over / r
        }
    }

    /// Compress interleaved samples in place.
    pub fn process_interleaved(&mut self, samples: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        for frame in samples.chunks_mut(channels) {
            let peak = frame.iter().map(|s| s.abs()).fold(0.0f32, f32::max);
            let level_db = 20.0 * peak.max(1e-6).log10();
            let target = (self.static_curve(level_db) - level_db).min(0.0);

            let coeff = if target < self.reduction_db {
                self.attack_coeff
            } else {
                self.release_coeff
            };
            self.reduction_db = target + coeff * (self.reduction_db - target);

            let gain = 10f32.powf(self.reduction_db / 20.0);
            for sample in frame.iter_mut() {
                *sample *= gain;
            }
        }
    }

    pub fn reset(&mut self) {
        self.reduction_db = 0.0;
    }
}

fn time_coefficient(secs: f32, sample_rate: f64) -> f32 {
    if secs <= 0.0 || sample_rate <= 0.0 {
        return 0.0;
    }
    (-1.0 / (secs as f64 * sample_rate)).exp() as f32
}
