//! Phrase sources: typed lines or the microphone plus a transcription server

use anyhow::{bail, Context, Result};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use super::{Heard, Listener, SpeechConfig};
use crate::audio::vad::{VadConfig, VoiceActivityDetector};
use crate::audio::{AudioCapture, AudioConfig, AudioSource};

/// Reads one command per line (text mode)
pub struct ConsoleListener<R> {
    input: R,
    prompt: bool,
}

impl ConsoleListener<std::io::StdinLock<'static>> {
    pub fn stdin() -> Self {
        Self::new(std::io::stdin().lock(), true)
    }
}

impl<R: BufRead> ConsoleListener<R> {
    pub fn new(input: R, prompt: bool) -> Self {
        Self { input, prompt }
    }
}

impl<R: BufRead> Listener for ConsoleListener<R> {
    fn listen(&mut self, _timeout: Option<Duration>, _phrase_limit: Duration) -> Result<Heard> {
        if self.prompt {
            eprint!("> ");
        }

        let mut line = String::new();
        if self.input.read_line(&mut line).context("Failed to read input")? == 0 {
            return Ok(Heard::Closed);
        }

        let line = line.trim();
        Ok(if line.is_empty() {
            Heard::Nothing
        } else {
            Heard::Phrase(line.to_lowercase())
        })
    }
}

/// Speech-to-text backend
pub trait Transcriber: Send + Sync {
    fn transcribe(&self, wav_path: &Path) -> Result<String>;
}

/// Multipart POST to a Whisper-compatible `/v1/audio/transcriptions`
pub struct WhisperHttpTranscriber {
    url: String,
    model: String,
    api_key: Option<String>,
    client: reqwest::blocking::Client,
}

impl WhisperHttpTranscriber {
    pub fn new(config: &SpeechConfig) -> Result<Self> {
        let url = config.stt_url.trim_end_matches('/').to_string();
        let api_key = config
            .stt_api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok());
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to build HTTP client")?;

        log::info!("Transcription endpoint: {}", url);
        Ok(Self {
            url,
            model: config.stt_model.clone(),
            api_key,
            client,
        })
    }
}

impl Transcriber for WhisperHttpTranscriber {
    fn transcribe(&self, wav_path: &Path) -> Result<String> {
        let form = reqwest::blocking::multipart::Form::new()
            .text("model", self.model.clone())
            .text("response_format", "json")
            .file("file", wav_path)
            .with_context(|| format!("Failed to attach {:?}", wav_path))?;

        let mut request = self
            .client
            .post(format!("{}/v1/audio/transcriptions", self.url))
            .multipart(form);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().context("Transcription request failed")?;
        if !response.status().is_success() {
            bail!("Transcription failed with status: {}", response.status());
        }

        let body: serde_json::Value = response.json().context("Invalid transcription response")?;
        let text = body["text"].as_str().unwrap_or("").trim().to_string();
        log::debug!("Transcription: {:?}", text);
        Ok(text)
    }
}

/// Where a phrase recording stands after a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    WaitingForSpeech,
    Recording,
    /// Phrase ended by trailing silence or the phrase limit
    Done,
    /// No speech before the timeout
    TimedOut,
}

/// Frame-by-frame phrase segmentation, independent of the audio device
pub struct PhraseRecorder {
    frame_ms: u32,
    timeout_ms: Option<u64>,
    phrase_limit_ms: u64,
    trailing_silence_ms: u32,
    waited_ms: u64,
    silence_ms: u32,
    samples: Vec<i16>,
    recorded_ms: u64,
    state: RecorderState,
}

impl PhraseRecorder {
    pub fn new(
        frame_ms: u32,
        timeout: Option<Duration>,
        phrase_limit: Duration,
        trailing_silence_ms: u32,
    ) -> Self {
        Self {
            frame_ms: frame_ms.max(1),
            timeout_ms: timeout.map(|t| t.as_millis() as u64),
            phrase_limit_ms: phrase_limit.as_millis() as u64,
            trailing_silence_ms,
            waited_ms: 0,
            silence_ms: 0,
            samples: Vec::new(),
            recorded_ms: 0,
            state: RecorderState::WaitingForSpeech,
        }
    }

    pub fn push(&mut self, frame: &[i16], is_speech: bool) -> RecorderState {
        match self.state {
            RecorderState::WaitingForSpeech => {
                if is_speech {
                    self.state = RecorderState::Recording;
                    self.append(frame);
                } else {
                    self.waited_ms += self.frame_ms as u64;
                    if self.timeout_ms.is_some_and(|t| self.waited_ms >= t) {
                        self.state = RecorderState::TimedOut;
                    }
                }
            }
            RecorderState::Recording => {
                self.append(frame);
                if is_speech {
                    self.silence_ms = 0;
                } else {
                    self.silence_ms += self.frame_ms;
                }
                if self.silence_ms >= self.trailing_silence_ms
                    || self.recorded_ms >= self.phrase_limit_ms
                {
                    self.state = RecorderState::Done;
                }
            }
            RecorderState::Done | RecorderState::TimedOut => {}
        }
        self.state
    }

    pub fn into_samples(self) -> Vec<i16> {
        self.samples
    }

    fn append(&mut self, frame: &[i16]) {
        self.samples.extend_from_slice(frame);
        self.recorded_ms += self.frame_ms as u64;
    }
}

/// Write 16-bit mono PCM
pub fn write_wav(path: &Path, samples: &[i16], sample_rate: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create {:?}", path))?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize().context("Failed to finalize WAV")?;
    Ok(())
}

/// Microphone listener: VAD-gated phrase capture, then transcription
pub struct MicListener {
    capture: AudioCapture,
    vad: VoiceActivityDetector,
    vad_config: VadConfig,
    calibrated: bool,
    transcriber: Box<dyn Transcriber>,
    recordings_dir: PathBuf,
    frame_ms: u32,
    trailing_silence_ms: u32,
}

impl MicListener {
    pub fn new(
        audio: AudioConfig,
        vad_config: VadConfig,
        speech: &SpeechConfig,
        transcriber: Box<dyn Transcriber>,
        recordings_dir: PathBuf,
    ) -> Result<Self> {
        std::fs::create_dir_all(&recordings_dir)
            .with_context(|| format!("Failed to create {:?}", recordings_dir))?;
        let frame_ms = audio.frame_ms;
        let capture = AudioCapture::new(audio)?;
        log::info!("✓ Microphone ready");

        Ok(Self {
            capture,
            vad: VoiceActivityDetector::new(vad_config.clone()),
            vad_config,
            calibrated: false,
            transcriber,
            recordings_dir,
            frame_ms,
            trailing_silence_ms: speech.trailing_silence_ms,
        })
    }

    fn next_frame_blocking(&mut self) -> Vec<i16> {
        loop {
            if let Some(frame) = self.capture.next_frame() {
                return frame;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    fn calibrate(&mut self) {
        let frames = (self.vad_config.calibration_ms / self.frame_ms.max(1)) as usize;
        log::info!("Calibrating for ambient noise...");
        let ambient: Vec<Vec<i16>> = (0..frames).map(|_| self.next_frame_blocking()).collect();
        self.vad.calibrate(&ambient);
        self.calibrated = true;
    }

    fn record_phrase(&mut self, timeout: Option<Duration>, phrase_limit: Duration) -> Option<Vec<i16>> {
        self.capture.flush();
        let mut recorder =
            PhraseRecorder::new(self.frame_ms, timeout, phrase_limit, self.trailing_silence_ms);
        let started = Instant::now();

        loop {
            let frame = self.next_frame_blocking();
            let is_speech = self.vad.process_frame(&frame);
            match recorder.push(&frame, is_speech) {
                RecorderState::Done => {
                    log::debug!("Phrase captured in {:?}", started.elapsed());
                    return Some(recorder.into_samples());
                }
                RecorderState::TimedOut => {
                    log::debug!("⏱️ No speech detected within time window");
                    return None;
                }
                _ => {}
            }
        }
    }
}

impl Listener for MicListener {
    fn listen(&mut self, timeout: Option<Duration>, phrase_limit: Duration) -> Result<Heard> {
        if !self.calibrated {
            self.calibrate();
        }

        let Some(samples) = self.record_phrase(timeout, phrase_limit) else {
            return Ok(Heard::Nothing);
        };

        let path = self.recordings_dir.join("last_phrase.wav");
        write_wav(&path, &samples, self.capture.sample_rate())?;

        match self.transcriber.transcribe(&path) {
            Ok(text) if text.trim().is_empty() => {
                log::debug!("🤷 Could not understand the speech");
                Ok(Heard::Nothing)
            }
            Ok(text) => {
                log::info!("🎙️ Heard: {}", text);
                Ok(Heard::Phrase(text.to_lowercase()))
            }
            Err(e) => {
                log::warn!("Transcription error: {:#}", e);
                Ok(Heard::Nothing)
            }
        }
    }
}
