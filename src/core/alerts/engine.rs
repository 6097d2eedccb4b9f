// Alert engine - turns crossings into alerts, gates them with cooldowns and
// publishes them to subscribers.

use std::collections::{HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

use super::generator::{derive_speech_text, AlertContentGenerator, GenerationRequest, GeneratorError};
use super::messages::MessageCatalog;
use super::model::{Alert, AlertKind, AlertPriority};
use crate::core::model::{RainfallBucket, Trend};
use crate::core::monitor::ThresholdMonitor;

pub type AlertCallback = Arc<dyn Fn(&Alert) + Send + Sync>;

/// Alert engine configuration - persisted in settings.json
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEngineConfig {
    /// Minimum time between any two alerts
    #[serde(default = "default_global_interval")]
    pub min_global_interval_seconds: u64,
    /// Minimum time between two alerts of the same kind
    #[serde(default = "default_kind_cooldown")]
    pub per_kind_cooldown_seconds: u64,
    /// Alerts kept in history (oldest dropped first)
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// Generator calls allowed in flight on the async path
    #[serde(default = "default_max_generations")]
    pub max_concurrent_generations: usize,
    /// Ask the content generator before falling back to the catalog
    #[serde(default = "default_true")]
    pub use_generator: bool,
    /// Upper bound for derived speech text, in characters
    #[serde(default = "default_speech_len")]
    pub speech_text_max_len: usize,
}

fn default_global_interval() -> u64 {
    30
}

fn default_kind_cooldown() -> u64 {
    60
}

fn default_history_limit() -> usize {
    50
}

fn default_max_generations() -> usize {
    4
}

fn default_true() -> bool {
    true
}

fn default_speech_len() -> usize {
    120
}

impl Default for AlertEngineConfig {
    fn default() -> Self {
        Self {
            min_global_interval_seconds: default_global_interval(),
            per_kind_cooldown_seconds: default_kind_cooldown(),
            history_limit: default_history_limit(),
            max_concurrent_generations: default_max_generations(),
            use_generator: true,
            speech_text_max_len: default_speech_len(),
        }
    }
}

impl AlertEngineConfig {
    pub fn global_interval(&self) -> Duration {
        Duration::from_secs(self.min_global_interval_seconds)
    }

    pub fn kind_cooldown(&self) -> Duration {
        Duration::from_secs(self.per_kind_cooldown_seconds)
    }
}

/// Read-only snapshot for dashboards and the CLI summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineStats {
    pub pending_count: usize,
    pub total_history_count: usize,
    pub current_bucket: Option<RainfallBucket>,
    pub current_location: Option<String>,
    pub current_rainfall: Option<f64>,
    pub generator_available: bool,
}

#[derive(Default)]
struct EngineState {
    monitor: ThresholdMonitor,
    current_location: Option<String>,
    current_value: Option<f64>,
    last_alert_at: Option<Instant>,
    kind_fired_at: HashMap<AlertKind, Instant>,
    pending: VecDeque<Alert>,
    history: VecDeque<Alert>,
}

impl EngineState {
    fn can_fire(&self, kind: AlertKind, now: Instant, config: &AlertEngineConfig) -> bool {
        if let Some(last) = self.last_alert_at {
            if now.saturating_duration_since(last) < config.global_interval() {
                return false;
            }
        }
        if let Some(last) = self.kind_fired_at.get(&kind) {
            if now.saturating_duration_since(*last) < config.kind_cooldown() {
                return false;
            }
        }
        true
    }

    fn stamp(&mut self, kind: AlertKind, now: Instant) {
        self.last_alert_at = Some(now);
        self.kind_fired_at.insert(kind, now);
    }

    fn for_each_copy(&mut self, alert_id: &str, mut f: impl FnMut(&mut Alert)) -> bool {
        let mut found = false;
        for alert in self.pending.iter_mut().chain(self.history.iter_mut()) {
            if alert.id == alert_id {
                f(alert);
                found = true;
            }
        }
        found
    }
}

/// Alert orchestrator. All mutable state sits behind one mutex; subscriber
/// callbacks always run after it is released.
pub struct AlertEngine {
    config: AlertEngineConfig,
    catalog: MessageCatalog,
    generator: Option<Arc<dyn AlertContentGenerator>>,
    state: Mutex<EngineState>,
    subscribers: RwLock<Vec<AlertCallback>>,
}

impl AlertEngine {
    pub fn new(config: AlertEngineConfig, catalog: MessageCatalog) -> Self {
        Self {
            config,
            catalog,
            generator: None,
            state: Mutex::new(EngineState::default()),
            subscribers: RwLock::new(Vec::new()),
        }
    }

    pub fn with_generator(mut self, generator: Arc<dyn AlertContentGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn config(&self) -> &AlertEngineConfig {
        &self.config
    }

    /// Register a subscriber. Subscribers run in registration order.
    pub fn on_alert(&self, callback: impl Fn(&Alert) + Send + Sync + 'static) {
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(callback));
    }

    pub fn update_conditions(&self, rainfall: f64, location: &str) -> Option<Alert> {
        self.update_conditions_at(rainfall, location, Instant::now())
    }

    /// Feed one tick. Returns the alert emitted by this tick, if any.
    pub fn update_conditions_at(&self, rainfall: f64, location: &str, now: Instant) -> Option<Alert> {
        let request = self.prepare_at(rainfall, location, now)?;
        let alert = self.resolve(&request);
        Some(self.publish(alert))
    }

    /// Run detection and the cooldown gate. A returned request has already
    /// reserved its cooldown slot and must be published.
    pub fn prepare_at(&self, rainfall: f64, location: &str, now: Instant) -> Option<GenerationRequest> {
        if !rainfall.is_finite() {
            warn!("Ignoring non-finite rainfall reading {} at {}", rainfall, location);
            return None;
        }
        let mut state = self.state();
        state.current_value = Some(rainfall);

        if state.current_location.as_deref() != Some(location) {
            debug!("Location changed {:?} -> {}", state.current_location, location);
            state.current_location = Some(location.to_string());
            state.monitor.reset();
            state.monitor.observe_at(rainfall, now);

            if !state.can_fire(AlertKind::LocationChange, now, &self.config) {
                return None;
            }
            state.stamp(AlertKind::LocationChange, now);
            let bucket = RainfallBucket::classify(rainfall);
            return Some(GenerationRequest {
                kind: AlertKind::LocationChange,
                location: location.to_string(),
                rainfall,
                from_bucket: None,
                to_bucket: bucket,
                severity: AlertPriority::derive(AlertKind::LocationChange, bucket),
                crossing: None,
            });
        }

        let crossing = state.monitor.observe_at(rainfall, now)?;
        let kind = AlertKind::for_crossing(&crossing);
        if !state.can_fire(kind, now, &self.config) {
            debug!("{} suppressed by cooldown", kind.as_str());
            return None;
        }
        state.stamp(kind, now);

        Some(GenerationRequest {
            kind,
            location: location.to_string(),
            rainfall,
            from_bucket: Some(crossing.from_bucket()),
            to_bucket: crossing.to_bucket(),
            severity: AlertPriority::derive(kind, crossing.to_bucket()),
            crossing: Some(crossing),
        })
    }

    /// Build the alert, asking the generator first. Never fails.
    pub fn resolve(&self, request: &GenerationRequest) -> Alert {
        match self.try_generator(request) {
            Ok(Some(alert)) => alert,
            Ok(None) => self.fallback(request),
            Err(e) => {
                warn!("Alert generator failed for {}: {}", request.kind.as_str(), e);
                self.fallback(request)
            }
        }
    }

    /// Build the alert from the message catalog only.
    pub fn fallback(&self, request: &GenerationRequest) -> Alert {
        let display = self.catalog.render(
            request.kind,
            &request.location,
            request.rainfall,
            request.to_bucket,
            request.crossing.as_ref(),
        );
        let speech = derive_speech_text(&display, request.severity, self.config.speech_text_max_len);
        Alert::new(
            request.kind,
            request.severity,
            request.location.clone(),
            request.rainfall,
            display,
            speech,
        )
    }

    fn try_generator(&self, request: &GenerationRequest) -> Result<Option<Alert>, GeneratorError> {
        let Some(generator) = self.generator.as_ref().filter(|_| self.config.use_generator) else {
            return Ok(None);
        };
        if !generator.is_available() {
            return Err(GeneratorError::Unavailable);
        }

        let content = panic::catch_unwind(AssertUnwindSafe(|| generator.generate(request)))
            .map_err(|_| GeneratorError::Failed(format!("{} generator panicked", generator.name())))??;
        if content.display_text.trim().is_empty() {
            return Err(GeneratorError::Empty);
        }
        let speech = if content.speech_text.trim().is_empty() {
            derive_speech_text(&content.display_text, content.severity, self.config.speech_text_max_len)
        } else {
            content.speech_text
        };

        let mut alert = Alert::new(
            request.kind,
            content.severity,
            request.location.clone(),
            request.rainfall,
            content.display_text,
            speech,
        );
        alert.source_references = content.source_references;
        Ok(Some(alert))
    }

    /// Store the alert and notify subscribers outside the lock.
    pub fn publish(&self, alert: Alert) -> Alert {
        {
            let mut state = self.state();
            state.pending.push_back(alert.clone());
            state.history.push_back(alert.clone());
            while state.history.len() > self.config.history_limit {
                state.history.pop_front();
            }
        }
        info!("[{:?}] {} @ {}: {}", alert.priority, alert.kind.as_str(), alert.location, alert.display_text);

        let subscribers = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for (index, callback) in subscribers.iter().enumerate() {
            if panic::catch_unwind(AssertUnwindSafe(|| callback(&alert))).is_err() {
                error!("Alert subscriber #{} panicked on {}", index, alert.id);
            }
        }
        alert
    }

    /// Unread alerts, oldest first.
    pub fn pending_alerts(&self) -> Vec<Alert> {
        self.state().pending.iter().cloned().collect()
    }

    /// Pop the oldest unread alert and mark it read.
    pub fn take_next_alert(&self) -> Option<Alert> {
        let mut state = self.state();
        let mut alert = state.pending.pop_front()?;
        alert.read = true;
        state.for_each_copy(&alert.id, |a| a.read = true);
        Some(alert)
    }

    pub fn has_unread(&self) -> bool {
        !self.state().pending.is_empty()
    }

    pub fn mark_spoken(&self, alert_id: &str) -> bool {
        self.state().for_each_copy(alert_id, |a| a.spoken = true)
    }

    /// Drop unread alerts. History is kept.
    pub fn clear_pending(&self) {
        self.state().pending.clear();
    }

    /// The most recent `limit` alerts, oldest first.
    pub fn history(&self, limit: usize) -> Vec<Alert> {
        let state = self.state();
        let skip = state.history.len().saturating_sub(limit);
        state.history.iter().skip(skip).cloned().collect()
    }

    pub fn trend(&self, window: Duration) -> Trend {
        self.state().monitor.trend(window)
    }

    pub fn generator_available(&self) -> bool {
        self.config.use_generator && self.generator.as_ref().is_some_and(|g| g.is_available())
    }

    pub fn stats(&self) -> EngineStats {
        let generator_available = self.generator_available();
        let state = self.state();
        EngineStats {
            pending_count: state.pending.len(),
            total_history_count: state.history.len(),
            current_bucket: state.current_value.map(RainfallBucket::classify),
            current_location: state.current_location.clone(),
            current_rainfall: state.current_value,
            generator_available,
        }
    }

    fn state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
