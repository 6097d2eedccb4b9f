// Coordinator - owns the alert engine and the narrator and wires them
// together: every published alert is queued for speech, and finished
// utterances mark the alert as spoken.

use std::sync::Arc;
use std::time::Instant;

use log::{error, warn};
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use super::alerts::engine::{AlertEngine, EngineStats};
use super::alerts::generator::TemplateGenerator;
use super::alerts::model::Alert;
use super::config::Settings;
use super::narrator::{AudioNarrator, NarratorStats};

/// Outcome of `Coordinator::tick_async`.
pub enum Dispatch {
    /// Content is being generated on the blocking pool; resolves to the
    /// published alert.
    Spawned(JoinHandle<Alert>),
    /// Already published on the calling thread.
    Inline(Alert),
}

impl Dispatch {
    pub async fn into_alert(self) -> Option<Alert> {
        match self {
            Self::Inline(alert) => Some(alert),
            Self::Spawned(handle) => match handle.await {
                Ok(alert) => Some(alert),
                Err(e) => {
                    error!("Alert generation task failed: {}", e);
                    None
                }
            },
        }
    }
}

pub struct Coordinator {
    engine: Arc<AlertEngine>,
    narrator: Arc<AudioNarrator>,
    generations: Arc<Semaphore>,
}

impl Coordinator {
    /// Build engine, template generator and narrator from settings.
    pub fn from_settings(settings: &Settings) -> Self {
        let catalog = settings.catalog();
        let generator = TemplateGenerator::new(catalog.clone(), settings.alerts.speech_text_max_len);
        let engine = AlertEngine::new(settings.alerts.clone(), catalog).with_generator(Arc::new(generator));
        Self::new(engine, AudioNarrator::from_config(&settings.narrator))
    }

    /// Wire an engine to a narrator and start the narrator.
    pub fn new(engine: AlertEngine, narrator: AudioNarrator) -> Self {
        let permits = engine.config().max_concurrent_generations.min(Semaphore::MAX_PERMITS);
        let generations = Arc::new(Semaphore::new(permits));
        let engine = Arc::new(engine);
        let narrator = Arc::new(narrator);

        let speaker = Arc::clone(&narrator);
        engine.on_alert(move |alert| {
            speaker.speak_alert(alert);
        });

        // Weak: the engine already owns the narrator through its subscriber.
        let spoken = Arc::downgrade(&engine);
        narrator.on_end(move |alert_id| {
            if let Some(engine) = spoken.upgrade() {
                engine.mark_spoken(alert_id);
            }
        });
        narrator.start();

        Self {
            engine,
            narrator,
            generations,
        }
    }

    /// Feed one measurement; content is resolved on the calling thread.
    pub fn tick(&self, rainfall: f64, location: &str) -> Option<Alert> {
        self.engine.update_conditions(rainfall, location)
    }

    pub fn tick_at(&self, rainfall: f64, location: &str, now: Instant) -> Option<Alert> {
        self.engine.update_conditions_at(rainfall, location, now)
    }

    /// Feed one measurement without blocking on content generation.
    ///
    /// Detection and cooldown gating happen immediately. Generation then runs
    /// on the tokio blocking pool, bounded by `max_concurrent_generations`;
    /// when every slot is taken the alert is built from the message catalog
    /// inline. Outside a tokio runtime this behaves like `tick`.
    pub fn tick_async(&self, rainfall: f64, location: &str) -> Option<Dispatch> {
        self.tick_async_at(rainfall, location, Instant::now())
    }

    pub fn tick_async_at(&self, rainfall: f64, location: &str, now: Instant) -> Option<Dispatch> {
        let request = self.engine.prepare_at(rainfall, location, now)?;

        let Ok(runtime) = Handle::try_current() else {
            let alert = self.engine.resolve(&request);
            return Some(Dispatch::Inline(self.engine.publish(alert)));
        };

        match Arc::clone(&self.generations).try_acquire_owned() {
            Ok(permit) => {
                let engine = Arc::clone(&self.engine);
                Some(Dispatch::Spawned(runtime.spawn_blocking(move || {
                    let _permit = permit;
                    let alert = engine.resolve(&request);
                    engine.publish(alert)
                })))
            }
            Err(_) => {
                warn!("Generation pool saturated; using fallback for {}", request.kind.as_str());
                let alert = self.engine.fallback(&request);
                Some(Dispatch::Inline(self.engine.publish(alert)))
            }
        }
    }

    pub fn engine(&self) -> &Arc<AlertEngine> {
        &self.engine
    }

    pub fn narrator(&self) -> &Arc<AudioNarrator> {
        &self.narrator
    }

    pub fn engine_stats(&self) -> EngineStats {
        self.engine.stats()
    }

    pub fn narrator_stats(&self) -> NarratorStats {
        self.narrator.stats()
    }

    /// Stop the narrator. Queued speech is dropped.
    pub fn shutdown(&self) {
        self.narrator.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::alerts::engine::AlertEngineConfig;
    use crate::core::alerts::generator::{
        AlertContentGenerator, GeneratedContent, GenerationRequest, GeneratorError,
    };
    use crate::core::alerts::messages::MessageCatalog;
    use crate::core::alerts::model::AlertKind;
    use crate::core::narrator::NarratorConfig;
    use crate::core::speech::SpeechBackend;
    use crate::core::test_support::{wait_until, RecordingSpeech};
    use std::thread;
    use std::time::Duration;

    fn config(max_generations: usize) -> AlertEngineConfig {
        AlertEngineConfig {
            min_global_interval_seconds: 0,
            per_kind_cooldown_seconds: 0,
            max_concurrent_generations: max_generations,
            ..AlertEngineConfig::default()
        }
    }

    fn narrator(backend: &Arc<RecordingSpeech>) -> AudioNarrator {
        let backend: Arc<dyn SpeechBackend> = backend.clone();
        let config = NarratorConfig {
            poll_interval_ms: 20,
            ..NarratorConfig::default()
        };
        AudioNarrator::new(Some(backend), &config)
    }

    /// Generator that takes a while to answer.
    struct SlowGenerator;

    impl AlertContentGenerator for SlowGenerator {
        fn name(&self) -> &str {
            "slow"
        }

        fn generate(&self, request: &GenerationRequest) -> Result<GeneratedContent, GeneratorError> {
            thread::sleep(Duration::from_millis(300));
            Ok(GeneratedContent {
                display_text: format!("Generated briefing for {}", request.location),
                speech_text: String::new(),
                severity: request.severity,
                source_references: Vec::new(),
            })
        }
    }

    #[test]
    fn test_published_alert_is_spoken_and_marked() {
        let backend = RecordingSpeech::new(Duration::ZERO);
        let engine = AlertEngine::new(config(4), MessageCatalog::builtin());
        let coordinator = Coordinator::new(engine, narrator(&backend));

        let alert = coordinator.tick(10.0, "Orchard Road").unwrap();
        assert_eq!(alert.kind, AlertKind::LocationChange);

        assert!(wait_until(|| coordinator.engine().history(1)[0].spoken));
        assert_eq!(backend.rendered(), vec![alert.speech_text.clone()]);
        assert_eq!(coordinator.narrator_stats().played, 1);

        coordinator.shutdown();
        assert!(!coordinator.narrator().is_running());
    }

    #[test]
    fn test_tick_async_without_runtime_runs_inline() {
        let backend = RecordingSpeech::new(Duration::ZERO);
        let engine = AlertEngine::new(config(1), MessageCatalog::builtin());
        let coordinator = Coordinator::new(engine, narrator(&backend));

        match coordinator.tick_async(10.0, "Zone A") {
            Some(Dispatch::Inline(alert)) => assert_eq!(alert.location, "Zone A"),
            _ => panic!("expected an inline dispatch"),
        }
        assert!(coordinator.tick_async(12.0, "Zone A").is_none());
        coordinator.shutdown();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_saturated_pool_falls_back_inline() {
        let backend = RecordingSpeech::new(Duration::ZERO);
        let engine =
            AlertEngine::new(config(1), MessageCatalog::builtin()).with_generator(Arc::new(SlowGenerator));
        let coordinator = Coordinator::new(engine, narrator(&backend));

        let first = coordinator.tick_async(10.0, "Zone A").unwrap();
        assert!(matches!(first, Dispatch::Spawned(_)));

        // The only slot is busy with Zone A.
        let second = coordinator.tick_async(10.0, "Zone B").unwrap();
        let inline = match second {
            Dispatch::Inline(alert) => alert,
            Dispatch::Spawned(_) => panic!("expected fallback while saturated"),
        };
        assert_eq!(inline.display_text, "Welcome to Zone B. Conditions are normal.");

        let generated = first.into_alert().await.unwrap();
        assert_eq!(generated.display_text, "Generated briefing for Zone A");
        assert_eq!(coordinator.engine_stats().total_history_count, 2);
        coordinator.shutdown();
    }

    #[test]
    fn test_oversized_generation_pool_is_clamped() {
        let backend = RecordingSpeech::new(Duration::ZERO);
        let engine = AlertEngine::new(config(usize::MAX), MessageCatalog::builtin());
        let coordinator = Coordinator::new(engine, narrator(&backend));

        assert_eq!(coordinator.generations.available_permits(), Semaphore::MAX_PERMITS);
        assert!(coordinator.tick(10.0, "Zone A").is_some());
        coordinator.shutdown();
    }

    #[test]
    fn test_from_settings_without_audio() {
        let mut settings = Settings::default();
        settings.narrator.backend = crate::core::speech::SpeechBackendKind::None;
        settings.alerts = config(2);
        let coordinator = Coordinator::from_settings(&settings);

        let alert = coordinator.tick(85.0, "Tanglin Carpark").unwrap();
        assert_eq!(alert.display_text, "EMERGENCY at Tanglin Carpark! Severe rain! Evacuate NOW!");
        assert!(coordinator.engine_stats().generator_available);
        assert_eq!(coordinator.narrator_stats().queued, 0);
        assert_eq!(coordinator.narrator().backend_info().backend_kind, "none");
    }
}
