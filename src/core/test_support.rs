// Fakes shared by unit and scenario tests.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use super::speech::{SpeechBackend, SpeechBackendKind, SpeechError};

/// Records rendered text; sleeps to simulate utterance length. Text
/// containing "fail" is rejected and text containing "panic" panics.
pub struct RecordingSpeech {
    rendered: Mutex<Vec<String>>,
    utterance: Duration,
}

impl RecordingSpeech {
    pub fn new(utterance: Duration) -> Arc<Self> {
        Arc::new(Self {
            rendered: Mutex::new(Vec::new()),
            utterance,
        })
    }

    pub fn rendered(&self) -> Vec<String> {
        self.rendered.lock().unwrap().clone()
    }
}

impl SpeechBackend for RecordingSpeech {
    fn kind(&self) -> SpeechBackendKind {
        SpeechBackendKind::Log
    }

    fn render(&self, text: &str) -> Result<(), SpeechError> {
        thread::sleep(self.utterance);
        if text.contains("panic") {
            panic!("backend crashed on {:?}", text);
        }
        if text.contains("fail") {
            return Err(SpeechError::Render("synthetic failure".into()));
        }
        self.rendered.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

/// Poll `cond` for up to five seconds.
pub fn wait_until(cond: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    cond()
}
