pub mod playback;
pub mod vad;

use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream, StreamConfig};
use crossbeam_channel::{unbounded, Receiver, Sender};
use rubato::{FftFixedIn, Resampler};
use serde::{Deserialize, Serialize};

/// Target sample rate for recordings sent to speech-to-text (16 kHz)
pub const TARGET_SAMPLE_RATE: u32 = 16000;

/// Target number of channels for processing (always mono)
pub const TARGET_CHANNELS: usize = 1;

/// Audio configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate_hz: u32,
    pub frame_ms: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_device_name: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: TARGET_SAMPLE_RATE,
            frame_ms: 20,
            device_name: None,
            output_device_name: None,
        }
    }
}

impl AudioConfig {
    pub fn samples_per_frame(&self) -> usize {
        (self.sample_rate_hz * self.frame_ms / 1000) as usize
    }
}

/// Resolve the configured input device by name, or the system default
pub fn resolve_input_device(name: Option<&str>) -> Result<cpal::Device> {
    let host = cpal::default_host();

    if let Some(device_name) = name {
        if let Ok(mut devices) = host.input_devices() {
            if let Some(device) = devices.find(|d| d.name().ok().as_deref() == Some(device_name)) {
                log::info!("✓ Resolved input device by name: {}", device_name);
                return Ok(device);
            }
        }
        log::warn!(
            "Input device '{}' not found, falling back to default",
            device_name
        );
    }

    host.default_input_device()
        .context("No input device available")
}

/// Resolve the configured output device by name, or the system default
pub fn resolve_output_device(name: Option<&str>) -> Result<cpal::Device> {
    let host = cpal::default_host();

    if let Some(device_name) = name {
        if let Ok(mut devices) = host.output_devices() {
            if let Some(device) = devices.find(|d| d.name().ok().as_deref() == Some(device_name)) {
                return Ok(device);
            }
        }
        log::warn!(
            "Output device '{}' not found, falling back to default",
            device_name
        );
    }

    host.default_output_device()
        .context("No default output device available")
}

/// Trait for audio sources that can provide frames
///
/// Not `Send`: a capture stream stays on the thread that opened it.
pub trait AudioSource {
    /// Next frame of mono samples, or `None` if not enough audio has arrived yet
    fn next_frame(&mut self) -> Option<Vec<i16>>;

    fn sample_rate(&self) -> u32;

    fn frame_size(&self) -> usize;
}

/// Microphone capture using CPAL, downmixed to mono and resampled to 16 kHz
pub struct AudioCapture {
    _stream: Stream,
    receiver: Receiver<Vec<i16>>,
    config: AudioConfig,
    resampler: Option<FftFixedIn<f32>>,
    buffer: Vec<i16>,
    resample_input_buffer: Vec<f32>,
}

impl AudioCapture {
    /// Open the configured (or default) input device
    pub fn new(config: AudioConfig) -> Result<Self> {
        let device = resolve_input_device(config.device_name.as_deref())?;
        log::info!("Using audio device: {}", device.name()?);

        let supported_config = device
            .default_input_config()
            .context("Failed to get default input config")?;

        let sample_rate = supported_config.sample_rate().0;
        let channels = supported_config.channels();

        log::info!(
            "Device config: {} Hz, {} channels, format: {:?}",
            sample_rate,
            channels,
            supported_config.sample_format()
        );

        let resampler = if sample_rate != config.sample_rate_hz {
            log::info!(
                "Audio: device={}Hz, {}ch -> processing={}Hz, {}ch",
                sample_rate,
                channels,
                config.sample_rate_hz,
                TARGET_CHANNELS
            );
            Some(FftFixedIn::<f32>::new(
                sample_rate as usize,
                config.sample_rate_hz as usize,
                config.samples_per_frame(),
                2,
                TARGET_CHANNELS,
            )?)
        } else {
            None
        };

        let (sender, receiver) = unbounded();

        let stream_config = StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };
        let channels_count = channels as usize;

        let stream = match supported_config.sample_format() {
            SampleFormat::F32 => {
                let sender = sender.clone();
                device.build_input_stream(
                    &stream_config,
                    move |data: &[f32], _: &_| Self::handle_input_f32(data, channels_count, &sender),
                    |err| log::error!("Audio stream error: {}", err),
                    None,
                )?
            }
            SampleFormat::I16 => {
                let sender = sender.clone();
                device.build_input_stream(
                    &stream_config,
                    move |data: &[i16], _: &_| Self::handle_input_i16(data, channels_count, &sender),
                    |err| log::error!("Audio stream error: {}", err),
                    None,
                )?
            }
            SampleFormat::U16 => device.build_input_stream(
                &stream_config,
                move |data: &[u16], _: &_| Self::handle_input_u16(data, channels_count, &sender),
                |err| log::error!("Audio stream error: {}", err),
                None,
            )?,
            other => anyhow::bail!("Unsupported sample format: {:?}", other),
        };

        stream.play()?;
        log::info!("Audio capture started");

        Ok(Self {
            _stream: stream,
            receiver,
            config,
            resampler,
            buffer: Vec::new(),
            resample_input_buffer: Vec::new(),
        })
    }

    /// Drop anything captured so far (e.g. while the assistant was speaking)
    pub fn flush(&mut self) {
        while self.receiver.try_recv().is_ok() {}
        self.buffer.clear();
        self.resample_input_buffer.clear();
    }

    fn handle_input_f32(data: &[f32], channels: usize, sender: &Sender<Vec<i16>>) {
        let mono: Vec<i16> = data
            .chunks(channels)
            .map(|chunk| {
                let avg = chunk.iter().sum::<f32>() / channels as f32;
                (avg * i16::MAX as f32) as i16
            })
            .collect();
        let _ = sender.send(mono);
    }

    fn handle_input_i16(data: &[i16], channels: usize, sender: &Sender<Vec<i16>>) {
        let mono: Vec<i16> = data
            .chunks(channels)
            .map(|chunk| {
                let sum: i32 = chunk.iter().map(|&s| s as i32).sum();
                (sum / channels as i32) as i16
            })
            .collect();
        let _ = sender.send(mono);
    }

    fn handle_input_u16(data: &[u16], channels: usize, sender: &Sender<Vec<i16>>) {
        let mono: Vec<i16> = data
            .chunks(channels)
            .map(|chunk| {
                let sum: i32 = chunk.iter().map(|&s| s as i32).sum();
                ((sum / channels as i32) - 32768) as i16
            })
            .collect();
        let _ = sender.send(mono);
    }
}

impl AudioSource for AudioCapture {
    fn next_frame(&mut self) -> Option<Vec<i16>> {
        let frame_size = self.config.samples_per_frame();

        while let Ok(data) = self.receiver.try_recv() {
            let Some(resampler) = self.resampler.as_mut() else {
                self.buffer.extend_from_slice(&data);
                continue;
            };

            self.resample_input_buffer
                .extend(data.iter().map(|&s| s as f32 / i16::MAX as f32));

            let mut needed = resampler.input_frames_next();
            while self.resample_input_buffer.len() >= needed {
                let chunk: Vec<f32> = self.resample_input_buffer.drain(..needed).collect();
                match resampler.process(&[chunk], None) {
                    Ok(output) => self.buffer.extend(output[0].iter().map(|&s| {
                        (s * i16::MAX as f32).clamp(i16::MIN as f32, i16::MAX as f32) as i16
                    })),
                    Err(e) => log::error!("Resampling error: {}", e),
                }
                needed = resampler.input_frames_next();
            }
        }

        if self.buffer.len() >= frame_size {
            Some(self.buffer.drain(..frame_size).collect())
        } else {
            None
        }
    }

    fn sample_rate(&self) -> u32 {
        self.config.sample_rate_hz
    }

    fn frame_size(&self) -> usize {
        self.config.samples_per_frame()
    }
}
