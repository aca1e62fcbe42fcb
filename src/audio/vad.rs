use serde::{Deserialize, Serialize};

/// Voice Activity Detection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VadConfig {
    pub enable: bool,
    /// RMS energy (i16 scale) above which a frame counts as speech
    pub threshold: f32,
    /// Ambient calibration window before the first phrase (ms)
    pub calibration_ms: u32,
    /// Calibrated threshold is ambient RMS times this factor
    pub ambient_factor: f32,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            enable: true,
            threshold: 500.0,
            calibration_ms: 2000,
            ambient_factor: 2.5,
        }
    }
}

/// Energy-based voice activity detector
pub struct VoiceActivityDetector {
    config: VadConfig,
}

impl VoiceActivityDetector {
    pub fn new(config: VadConfig) -> Self {
        if !config.enable {
            log::info!("VAD disabled in configuration");
        }
        Self { config }
    }

    /// Returns true if the frame looks like speech
    pub fn process_frame(&self, samples: &[i16]) -> bool {
        if !self.config.enable {
            return true;
        }
        Self::compute_energy(samples) > self.config.threshold
    }

    pub fn threshold(&self) -> f32 {
        self.config.threshold
    }

    /// Raise the threshold to sit above measured ambient noise, never below
    /// the configured floor
    pub fn calibrate(&mut self, ambient_frames: &[Vec<i16>]) {
        if ambient_frames.is_empty() {
            return;
        }

        let ambient = ambient_frames
            .iter()
            .map(|f| Self::compute_energy(f))
            .sum::<f32>()
            / ambient_frames.len() as f32;
        let calibrated = (ambient * self.config.ambient_factor).max(self.config.threshold);

        log::info!(
            "VAD threshold calibrated: ambient={:.1} → threshold {:.1}",
            ambient,
            calibrated
        );
        self.config.threshold = calibrated;
    }

    /// RMS energy of a frame
    pub fn compute_energy(samples: &[i16]) -> f32 {
        if samples.is_empty() {
            return 0.0;
        }

        let sum_squares: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
        (sum_squares / samples.len() as f64).sqrt() as f32
    }
}
