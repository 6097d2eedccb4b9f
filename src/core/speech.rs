// Speech backend capability and the adapters selectable from settings.
//
// The narrator only ever sees `dyn SpeechBackend`; which adapter is active is
// decided once, at construction.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("speech backend unavailable: {0}")]
    Unavailable(String),
    #[error("audio device error: {0}")]
    Device(String),
    #[error("render failed: {0}")]
    Render(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeechBackendKind {
    /// Audio disabled; alerts are still published
    None,
    /// Utterances go to the log, optionally paced like speech
    #[default]
    Log,
    /// Audible chime through the default output device
    Chime,
}

impl SpeechBackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Log => "log",
            Self::Chime => "chime",
        }
    }
}

impl fmt::Display for SpeechBackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SpeechBackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "log" => Ok(Self::Log),
            "chime" => Ok(Self::Chime),
            other => Err(format!("unknown speech backend '{}' (expected none, log or chime)", other)),
        }
    }
}

/// Renders one utterance. Blocks until the utterance is complete.
pub trait SpeechBackend: Send + Sync {
    fn kind(&self) -> SpeechBackendKind;

    fn render(&self, text: &str) -> Result<(), SpeechError>;
}

/// Writes utterances to the log. With a non-zero speaking rate it also
/// blocks for roughly as long as reading the text aloud would take.
pub struct LogSpeech {
    words_per_minute: u32,
}

impl LogSpeech {
    pub fn new(words_per_minute: u32) -> Self {
        Self { words_per_minute }
    }

    fn utterance_length(&self, text: &str) -> Duration {
        if self.words_per_minute == 0 {
            return Duration::ZERO;
        }
        let words = text.split_whitespace().count() as u64;
        Duration::from_millis(words * 60_000 / u64::from(self.words_per_minute))
    }
}

impl SpeechBackend for LogSpeech {
    fn kind(&self) -> SpeechBackendKind {
        SpeechBackendKind::Log
    }

    fn render(&self, text: &str) -> Result<(), SpeechError> {
        log::info!(target: "flood_watcher::speech", "\u{1F50A} {}", text);
        let length = self.utterance_length(text);
        if !length.is_zero() {
            thread::sleep(length);
        }
        Ok(())
    }
}

/// Plays a tone sized to the utterance on the default output device.
#[cfg(feature = "audio")]
pub struct ChimeSpeech {
    volume: f32,
}

#[cfg(feature = "audio")]
impl ChimeSpeech {
    const TONE_HZ: f32 = 880.0;

    pub fn new(volume: f32) -> Self {
        Self {
            volume: volume.clamp(0.0, 1.0),
        }
    }
}

#[cfg(feature = "audio")]
impl SpeechBackend for ChimeSpeech {
    fn kind(&self) -> SpeechBackendKind {
        SpeechBackendKind::Chime
    }

    fn render(&self, text: &str) -> Result<(), SpeechError> {
        use rodio::Source;

        let words = text.split_whitespace().count() as u64;
        let length = Duration::from_millis((words * 150).clamp(300, 3000));

        let stream = rodio::OutputStreamBuilder::open_default_stream()
            .map_err(|e| SpeechError::Device(e.to_string()))?;
        let sink = rodio::Sink::connect_new(stream.mixer());
        sink.set_volume(self.volume);
        sink.append(rodio::source::SineWave::new(Self::TONE_HZ).take_duration(length));
        sink.sleep_until_end();
        Ok(())
    }
}

/// Build the configured backend. `None` means audio is disabled.
pub fn backend_for(
    kind: SpeechBackendKind,
    volume: f32,
    words_per_minute: u32,
) -> Option<Arc<dyn SpeechBackend>> {
    match kind {
        SpeechBackendKind::None => None,
        SpeechBackendKind::Log => Some(Arc::new(LogSpeech::new(words_per_minute))),
        #[cfg(feature = "audio")]
        SpeechBackendKind::Chime => Some(Arc::new(ChimeSpeech::new(volume))),
        #[cfg(not(feature = "audio"))]
        SpeechBackendKind::Chime => {
            let _ = volume;
            log::warn!("Chime backend requested but built without the `audio` feature; audio disabled");
            None
        }
    }
}
