//! Sound output: WAV clips and generated tones
//!
//! Clips are decoded with hound into mono f32 and played through CPAL with
//! the same F32 → I16 → U16 format fallback for every device.

use anyhow::{bail, Context, Result};
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::SampleFormat;
use std::f32::consts::PI;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use super::resolve_output_device;

/// Something that can make noise
pub trait SoundPlayer: Send + Sync {
    /// Play a WAV file to completion
    fn play_file(&self, path: &Path) -> Result<()>;

    /// Fallback alarm when no alarm sound is installed
    fn play_alarm_tone(&self) -> Result<()>;

    /// Short acknowledgement after the wake word
    fn play_beep(&self) -> Result<()> {
        self.play_alarm_tone()
    }
}

/// Mono audio held in memory
#[derive(Debug, Clone)]
pub struct Clip {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl Clip {
    /// Decode a WAV file, downmixing to mono
    pub fn from_wav(path: &Path) -> Result<Self> {
        let mut reader = hound::WavReader::open(path)
            .with_context(|| format!("Failed to open sound: {:?}", path))?;
        let spec = reader.spec();
        let channels = spec.channels.max(1) as usize;

        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .collect::<Result<_, _>>()
                .context("Failed to decode WAV samples")?,
            hound::SampleFormat::Int => {
                let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<Result<_, _>>()
                    .context("Failed to decode WAV samples")?
            }
        };

        let samples = interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect();

        Ok(Self {
            samples,
            sample_rate: spec.sample_rate,
        })
    }

    /// Sine tone, parameters clamped to safe ranges
    pub fn tone(freq_hz: f32, duration_ms: u32, volume: f32, sample_rate: u32) -> Self {
        let freq_hz = freq_hz.clamp(40.0, 20000.0);
        let duration_ms = duration_ms.clamp(50, 10_000);
        let volume = volume.clamp(0.0, 1.0);

        let count = (sample_rate as u64 * duration_ms as u64 / 1000) as usize;
        let samples = (0..count)
            .map(|i| (2.0 * PI * freq_hz * i as f32 / sample_rate as f32).sin() * volume)
            .collect();

        Self {
            samples,
            sample_rate,
        }
    }

    /// Append another clip (sample rates must match)
    pub fn then(mut self, other: &Clip) -> Self {
        self.samples.extend_from_slice(&other.samples);
        self
    }

    /// Silence of the given length
    pub fn silence(duration_ms: u32, sample_rate: u32) -> Self {
        Self {
            samples: vec![0.0; (sample_rate as u64 * duration_ms as u64 / 1000) as usize],
            sample_rate,
        }
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }

    /// Sample for output frame `n` at `device_rate` (nearest neighbour)
    fn sample_for_frame(&self, n: u64, device_rate: u32) -> Option<f32> {
        if device_rate == 0 {
            return None;
        }
        let index = (n * self.sample_rate as u64 / device_rate as u64) as usize;
        self.samples.get(index).copied()
    }
}

/// CPAL-backed player
pub struct CpalPlayer {
    device_name: Option<String>,
}

impl CpalPlayer {
    pub fn new(device_name: Option<String>) -> Self {
        Self { device_name }
    }

    /// Play a clip to completion with automatic format fallback
    pub fn play_clip(&self, clip: &Clip) -> Result<()> {
        let device = resolve_output_device(self.device_name.as_deref())?;
        let device_name = device.name()?;

        let default_config = device.default_output_config()?;
        let device_rate = default_config.sample_rate().0;
        let channels = default_config.channels();

        log::debug!(
            "Playing {:.2}s on '{}': {}Hz, {} channels",
            clip.duration().as_secs_f32(),
            device_name,
            device_rate,
            channels
        );

        let clip = Arc::new(clip.clone());
        let formats_to_try = [
            (SampleFormat::F32, "F32"),
            (SampleFormat::I16, "I16"),
            (SampleFormat::U16, "U16"),
        ];

        let mut last_error = None;
        for (format, format_name) in &formats_to_try {
            match build_stream(&device, *format, channels, device_rate, clip.clone()) {
                Ok(stream) => {
                    log::debug!("✓ Output using {} format", format_name);
                    stream.play()?;
                    // Small tail so the device drains its buffer
                    std::thread::sleep(clip.duration() + Duration::from_millis(100));
                    drop(stream);
                    return Ok(());
                }
                Err(e) => {
                    log::warn!("Format {} failed: {}", format_name, e);
                    last_error = Some((format_name, e));
                }
            }
        }

        match last_error {
            Some((failed_format, err)) => bail!(
                "Playback failed on device '{}': all formats (F32, I16, U16) failed. Last error ({}): {:?}",
                device_name,
                failed_format,
                err
            ),
            None => bail!("Playback failed on device '{}'", device_name),
        }
    }
}

impl SoundPlayer for CpalPlayer {
    fn play_file(&self, path: &Path) -> Result<()> {
        let clip = Clip::from_wav(path)?;
        log::info!("🔔 Playing {:?}", path.file_name().unwrap_or_default());
        self.play_clip(&clip)
    }

    fn play_alarm_tone(&self) -> Result<()> {
        let rate = 44_100;
        let beep = Clip::tone(880.0, 400, 0.6, rate);
        let gap = Clip::silence(200, rate);
        let clip = beep.clone().then(&gap).then(&beep).then(&gap).then(&beep);
        self.play_clip(&clip)
    }

    fn play_beep(&self) -> Result<()> {
        self.play_clip(&Clip::tone(1000.0, 150, 0.5, 44_100))
    }
}

fn build_stream(
    device: &cpal::Device,
    format: SampleFormat,
    channels: u16,
    device_rate: u32,
    clip: Arc<Clip>,
) -> Result<cpal::Stream> {
    let config = cpal::StreamConfig {
        channels,
        sample_rate: cpal::SampleRate(device_rate),
        buffer_size: cpal::BufferSize::Default,
    };
    let channels = channels as usize;
    let mut frame_index = 0u64;
    let mut next_value = move || {
        let value = clip.sample_for_frame(frame_index, device_rate).unwrap_or(0.0);
        frame_index += 1;
        value
    };
    let on_error = |err| log::error!("Output stream error: {}", err);

    let stream = match format {
        SampleFormat::F32 => device.build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                for frame in data.chunks_mut(channels) {
                    let value = next_value();
                    frame.iter_mut().for_each(|s| *s = value);
                }
            },
            on_error,
            None,
        )?,
        SampleFormat::I16 => device.build_output_stream(
            &config,
            move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                for frame in data.chunks_mut(channels) {
                    let value = (next_value() * i16::MAX as f32) as i16;
                    frame.iter_mut().for_each(|s| *s = value);
                }
            },
            on_error,
            None,
        )?,
        SampleFormat::U16 => device.build_output_stream(
            &config,
            move |data: &mut [u16], _: &cpal::OutputCallbackInfo| {
                for frame in data.chunks_mut(channels) {
                    // -1.0..1.0 → 0..65535
                    let value = ((next_value() + 1.0) * 0.5 * u16::MAX as f32) as u16;
                    frame.iter_mut().for_each(|s| *s = value);
                }
            },
            on_error,
            None,
        )?,
        other => bail!("Unsupported format: {:?}", other),
    };

    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tone_parameter_clamping() {
        let clip = Clip::tone(30000.0, 50_000, 5.0, 8000);
        assert_eq!(clip.samples.len(), 80_000); // clamped to 10s
        assert!(clip.samples.iter().all(|s| s.abs() <= 1.0));
    }

    #[test]
    fn test_clip_duration() {
        let clip = Clip::silence(500, 16000);
        assert_eq!(clip.samples.len(), 8000);
        assert_eq!(clip.duration(), Duration::from_millis(500));
    }

    #[test]
    fn test_sample_rate_mapping() {
        let clip = Clip {
            samples: vec![0.0, 0.5, 1.0],
            sample_rate: 1,
        };
        // Device at 2x the clip rate repeats each sample
        assert_eq!(clip.sample_for_frame(0, 2), Some(0.0));
        assert_eq!(clip.sample_for_frame(1, 2), Some(0.0));
        assert_eq!(clip.sample_for_frame(2, 2), Some(0.5));
        assert_eq!(clip.sample_for_frame(6, 2), None);
    }

    #[test]
    fn test_wav_decoding_downmixes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 22050,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for _ in 0..100 {
            writer.write_sample(16384i16).unwrap();
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();

        let clip = Clip::from_wav(&path).unwrap();
        assert_eq!(clip.sample_rate, 22050);
        assert_eq!(clip.samples.len(), 100);
        assert!((clip.samples[0] - 0.25).abs() < 0.001);
    }

    #[test]
    fn test_missing_wav_is_error() {
        assert!(Clip::from_wav(Path::new("/nonexistent/alarm.wav")).is_err());
    }
}
