// Audio narrator - priority-ordered speech queue drained by one worker thread.
//
// Lower priority values play first (0 = critical). Equal priorities play in
// enqueue order. An "interrupt" request only notifies `on_interrupt`; the
// utterance already being rendered always finishes, and the urgent item is
// simply next in line.

use std::cmp::{Ordering as CmpOrdering, Reverse};
use std::collections::BinaryHeap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Local};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

use super::alerts::model::Alert;
use super::speech::{self, SpeechBackend, SpeechBackendKind};

pub const PRIORITY_CRITICAL: u8 = 0;
pub const PRIORITY_HIGH: u8 = 1;
pub const PRIORITY_MEDIUM: u8 = 2;
pub const PRIORITY_LOW: u8 = 3;

/// Narrator configuration - persisted in settings.json
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarratorConfig {
    #[serde(default)]
    pub backend: SpeechBackendKind,
    #[serde(default = "default_volume")]
    pub volume: f32,
    /// How long the worker waits for work before re-checking for stop
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// How long `stop` waits for an in-flight utterance
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_ms: u64,
    /// Speaking rate used to pace the log backend (0 = no pacing)
    #[serde(default = "default_words_per_minute")]
    pub words_per_minute: u32,
}

fn default_volume() -> f32 {
    0.9
}

fn default_poll_interval() -> u64 {
    500
}

fn default_stop_timeout() -> u64 {
    2000
}

fn default_words_per_minute() -> u32 {
    160
}

impl Default for NarratorConfig {
    fn default() -> Self {
        Self {
            backend: SpeechBackendKind::default(),
            volume: default_volume(),
            poll_interval_ms: default_poll_interval(),
            stop_timeout_ms: default_stop_timeout(),
            words_per_minute: default_words_per_minute(),
        }
    }
}

/// One queued utterance. Ordered by `(priority, enqueue sequence)`.
#[derive(Debug, Clone)]
pub struct AudioQueueItem {
    pub priority: u8,
    pub enqueued_at: DateTime<Local>,
    pub text: String,
    pub alert_id: String,
    pub interrupt_current: bool,
    sequence: u64,
}

impl PartialEq for AudioQueueItem {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == CmpOrdering::Equal
    }
}

impl Eq for AudioQueueItem {}

impl PartialOrd for AudioQueueItem {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for AudioQueueItem {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        (self.priority, self.sequence).cmp(&(other.priority, other.sequence))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NarratorStats {
    pub queued: u64,
    pub played: u64,
    pub interrupted: u64,
    pub errors: u64,
    /// Discarded by `clear_queue` or `stop` before being played
    pub dropped: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendInfo {
    pub backend_kind: &'static str,
    pub available: bool,
    pub running: bool,
    pub queue_size: usize,
    pub is_playing: bool,
}

pub type NarrationCallback = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Default, Clone)]
struct Callbacks {
    on_start: Option<NarrationCallback>,
    on_end: Option<NarrationCallback>,
    on_interrupt: Option<NarrationCallback>,
}

#[derive(Default)]
struct Counters {
    queued: AtomicU64,
    played: AtomicU64,
    interrupted: AtomicU64,
    errors: AtomicU64,
    dropped: AtomicU64,
}

struct Shared {
    backend: Option<Arc<dyn SpeechBackend>>,
    queue: Mutex<BinaryHeap<Reverse<AudioQueueItem>>>,
    work_available: Condvar,
    running: AtomicBool,
    /// Bumped on every stop so a worker that outlived `stop` exits.
    epoch: AtomicU64,
    current: Mutex<Option<String>>,
    sequence: AtomicU64,
    counters: Counters,
    callbacks: RwLock<Callbacks>,
    poll_interval: Duration,
}

impl Shared {
    fn queue(&self) -> MutexGuard<'_, BinaryHeap<Reverse<AudioQueueItem>>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current(&self) -> MutexGuard<'_, Option<String>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn callbacks(&self) -> Callbacks {
        self.callbacks.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.running.load(Ordering::SeqCst) && self.epoch.load(Ordering::SeqCst) == epoch
    }

    /// Pop the most urgent item, waiting up to one poll interval.
    fn next_item(&self, epoch: u64) -> Option<AudioQueueItem> {
        let mut queue = self.queue();
        if queue.is_empty() {
            queue = self
                .work_available
                .wait_timeout(queue, self.poll_interval)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        if !self.is_current(epoch) {
            return None;
        }
        queue.pop().map(|Reverse(item)| item)
    }

    fn play(&self, backend: &dyn SpeechBackend, item: AudioQueueItem) {
        *self.current() = Some(item.alert_id.clone());
        let callbacks = self.callbacks();
        fire("on_start", callbacks.on_start.as_ref(), &item.alert_id);

        match panic::catch_unwind(AssertUnwindSafe(|| backend.render(&item.text))) {
            Ok(Ok(())) => {
                self.counters.played.fetch_add(1, Ordering::SeqCst);
            }
            Ok(Err(e)) => {
                self.counters.errors.fetch_add(1, Ordering::SeqCst);
                warn!("Speech backend failed for {}: {}", item.alert_id, e);
            }
            Err(_) => {
                self.counters.errors.fetch_add(1, Ordering::SeqCst);
                error!("Speech backend panicked while rendering {}", item.alert_id);
            }
        }

        fire("on_end", callbacks.on_end.as_ref(), &item.alert_id);
        *self.current() = None;
    }

    fn drain(&self) -> usize {
        let drained = {
            let mut queue = self.queue();
            let n = queue.len();
            queue.clear();
            n
        };
        self.counters.dropped.fetch_add(drained as u64, Ordering::SeqCst);
        drained
    }
}

fn fire(name: &str, callback: Option<&NarrationCallback>, alert_id: &str) {
    if let Some(callback) = callback {
        if panic::catch_unwind(AssertUnwindSafe(|| callback(alert_id))).is_err() {
            error!("Narrator {} callback panicked for {}", name, alert_id);
        }
    }
}

fn run_worker(shared: Arc<Shared>, backend: Arc<dyn SpeechBackend>, epoch: u64, done_tx: mpsc::Sender<()>) {
    debug!("Narrator worker {} started", epoch);
    while shared.is_current(epoch) {
        if let Some(item) = shared.next_item(epoch) {
            shared.play(backend.as_ref(), item);
        }
    }
    debug!("Narrator worker {} exiting", epoch);
    let _ = done_tx.send(());
}

struct WorkerControl {
    done_rx: mpsc::Receiver<()>,
    handle: thread::JoinHandle<()>,
}

/// Priority delivery queue in front of a speech backend.
pub struct AudioNarrator {
    shared: Arc<Shared>,
    worker: Mutex<Option<WorkerControl>>,
    stop_timeout: Duration,
}

impl AudioNarrator {
    pub fn new(backend: Option<Arc<dyn SpeechBackend>>, config: &NarratorConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                backend,
                queue: Mutex::new(BinaryHeap::new()),
                work_available: Condvar::new(),
                running: AtomicBool::new(false),
                epoch: AtomicU64::new(0),
                current: Mutex::new(None),
                sequence: AtomicU64::new(0),
                counters: Counters::default(),
                callbacks: RwLock::new(Callbacks::default()),
                poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
            }),
            worker: Mutex::new(None),
            stop_timeout: Duration::from_millis(config.stop_timeout_ms),
        }
    }

    /// Build the narrator with the backend named in the config.
    pub fn from_config(config: &NarratorConfig) -> Self {
        let backend = speech::backend_for(config.backend, config.volume, config.words_per_minute);
        Self::new(backend, config)
    }

    pub fn on_start(&self, callback: impl Fn(&str) + Send + Sync + 'static) {
        self.callbacks_mut().on_start = Some(Arc::new(callback));
    }

    pub fn on_end(&self, callback: impl Fn(&str) + Send + Sync + 'static) {
        self.callbacks_mut().on_end = Some(Arc::new(callback));
    }

    pub fn on_interrupt(&self, callback: impl Fn(&str) + Send + Sync + 'static) {
        self.callbacks_mut().on_interrupt = Some(Arc::new(callback));
    }

    /// Queue text for speech. Returns whether anything was queued: blank text
    /// and a missing backend are silent no-ops.
    pub fn enqueue(&self, text: &str, priority: u8, alert_id: &str, interrupt: bool) -> bool {
        if self.shared.backend.is_none() {
            return false;
        }
        let text = text.trim();
        if text.is_empty() {
            return false;
        }

        let was_playing = self.is_playing();
        let item = AudioQueueItem {
            priority,
            enqueued_at: Local::now(),
            text: text.to_string(),
            alert_id: alert_id.to_string(),
            interrupt_current: interrupt,
            sequence: self.shared.sequence.fetch_add(1, Ordering::SeqCst),
        };
        self.shared.queue().push(Reverse(item));
        self.shared.counters.queued.fetch_add(1, Ordering::SeqCst);
        self.shared.work_available.notify_one();

        if interrupt && was_playing {
            self.shared.counters.interrupted.fetch_add(1, Ordering::SeqCst);
            fire("on_interrupt", self.shared.callbacks().on_interrupt.as_ref(), alert_id);
        }
        true
    }

    /// Queue an alert's speech text at its mapped audio priority.
    pub fn speak_alert(&self, alert: &Alert) -> bool {
        self.enqueue(
            &alert.speech_text,
            alert.priority.audio_priority(),
            &alert.id,
            alert.priority.interrupts(),
        )
    }

    /// Spawn the worker. Calling it while running is a no-op.
    pub fn start(&self) -> bool {
        let Some(backend) = self.shared.backend.clone() else {
            info!("Narrator: no speech backend configured, audio disabled");
            return false;
        };
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return true;
        }

        let epoch = self.shared.epoch.load(Ordering::SeqCst);
        let shared = Arc::clone(&self.shared);
        let (done_tx, done_rx) = mpsc::channel();
        match thread::Builder::new()
            .name("narrator".into())
            .spawn(move || run_worker(shared, backend, epoch, done_tx))
        {
            Ok(handle) => {
                *worker = Some(WorkerControl { done_rx, handle });
                info!("Narrator started ({} backend)", self.backend_name());
                true
            }
            Err(e) => {
                self.shared.running.store(false, Ordering::SeqCst);
                error!("Narrator: failed to spawn worker: {}", e);
                false
            }
        }
    }

    /// Stop the worker and discard queued items. An utterance already being
    /// rendered is allowed to finish; waiting for it is bounded.
    pub fn stop(&self) {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.shared.epoch.fetch_add(1, Ordering::SeqCst);
        let dropped = self.shared.drain();
        self.shared.work_available.notify_all();

        if let Some(control) = worker.take() {
            match control.done_rx.recv_timeout(self.stop_timeout) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    if control.handle.join().is_err() {
                        error!("Narrator worker panicked");
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    warn!("Narrator worker still rendering after {:?}; detaching", self.stop_timeout);
                }
            }
        }
        info!("Narrator stopped ({} queued items dropped)", dropped);
    }

    /// Discard everything waiting to be played.
    pub fn clear_queue(&self) -> usize {
        self.shared.drain()
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    pub fn is_playing(&self) -> bool {
        self.shared.current().is_some()
    }

    pub fn queue_size(&self) -> usize {
        self.shared.queue().len()
    }

    pub fn stats(&self) -> NarratorStats {
        let c = &self.shared.counters;
        NarratorStats {
            queued: c.queued.load(Ordering::SeqCst),
            played: c.played.load(Ordering::SeqCst),
            interrupted: c.interrupted.load(Ordering::SeqCst),
            errors: c.errors.load(Ordering::SeqCst),
            dropped: c.dropped.load(Ordering::SeqCst),
        }
    }

    pub fn backend_info(&self) -> BackendInfo {
        BackendInfo {
            backend_kind: self.backend_name(),
            available: self.shared.backend.is_some(),
            running: self.is_running(),
            queue_size: self.queue_size(),
            is_playing: self.is_playing(),
        }
    }

    fn backend_name(&self) -> &'static str {
        self.shared
            .backend
            .as_ref()
            .map_or(SpeechBackendKind::None, |b| b.kind())
            .as_str()
    }

    fn callbacks_mut(&self) -> std::sync::RwLockWriteGuard<'_, Callbacks> {
        self.shared.callbacks.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for AudioNarrator {
    fn drop(&mut self) {
        self.stop();
    }
}
