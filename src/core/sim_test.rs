#[cfg(test)]
mod sim_tests {
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use crate::core::alerts::engine::{AlertEngine, AlertEngineConfig};
    use crate::core::alerts::messages::MessageCatalog;
    use crate::core::alerts::model::{Alert, AlertKind, AlertPriority};
    use crate::core::coordinator::Coordinator;
    use crate::core::narrator::{AudioNarrator, NarratorConfig};
    use crate::core::speech::SpeechBackend;
    use crate::core::test_support::{wait_until, RecordingSpeech};

    const STORM: [f64; 6] = [10.0, 35.0, 55.0, 85.0, 60.0, 25.0];

    fn no_cooldown() -> AlertEngineConfig {
        AlertEngineConfig {
            min_global_interval_seconds: 0,
            per_kind_cooldown_seconds: 0,
            ..AlertEngineConfig::default()
        }
    }

    fn at(start: Instant, secs: u64) -> Instant {
        start + Duration::from_secs(secs)
    }

    #[test]
    fn simulate_storm_passing_over_zone() {
        let engine = AlertEngine::new(no_cooldown(), MessageCatalog::builtin());
        let start = Instant::now();

        let alerts: Vec<Alert> = STORM
            .iter()
            .enumerate()
            .filter_map(|(i, v)| engine.update_conditions_at(*v, "Zone A", at(start, i as u64)))
            .collect();

        let kinds: Vec<AlertKind> = alerts.iter().map(|a| a.kind).collect();
        assert_eq!(
            kinds,
            vec![
                AlertKind::LocationChange,
                AlertKind::ThresholdCrossing,
                AlertKind::Escalation,
                AlertKind::SevereWeather,
                AlertKind::ThresholdCrossing,
                AlertKind::ThresholdCrossing,
            ]
        );

        let priorities: Vec<AlertPriority> = alerts.iter().map(|a| a.priority).collect();
        assert_eq!(
            priorities,
            vec![
                AlertPriority::Low,
                AlertPriority::High,
                AlertPriority::Medium,
                AlertPriority::Critical,
                AlertPriority::High,
                AlertPriority::Low,
            ]
        );

        assert!(alerts[3].display_text.starts_with("DANGER at Zone A"));
        assert!(alerts[3].speech_text.starts_with("Emergency alert! "));
        assert_eq!(alerts[5].display_text, "Conditions improving at Zone A. Rain easing to normal levels.");
        assert_eq!(engine.history(50).len(), 6);
    }

    #[test]
    fn simulate_storm_with_default_cooldowns() {
        let engine = AlertEngine::new(AlertEngineConfig::default(), MessageCatalog::builtin());
        let start = Instant::now();

        let fired: Vec<AlertKind> = STORM
            .iter()
            .enumerate()
            .filter_map(|(i, v)| engine.update_conditions_at(*v, "Zone A", at(start, i as u64)))
            .map(|a| a.kind)
            .collect();
        // Everything after arrival lands inside the 30s global interval.
        assert_eq!(fired, vec![AlertKind::LocationChange]);

        // Monitor state kept advancing while suppressed: 25 -> 40 is a fresh crossing.
        let late = engine.update_conditions_at(40.0, "Zone A", at(start, 45)).unwrap();
        assert_eq!(late.kind, AlertKind::ThresholdCrossing);
    }

    #[test]
    fn simulate_zone_switch_emits_single_alert() {
        let engine = AlertEngine::new(no_cooldown(), MessageCatalog::builtin());
        let start = Instant::now();

        engine.update_conditions_at(10.0, "Zone A", start);
        engine.update_conditions_at(35.0, "Zone A", at(start, 1));

        // Arriving in Zone B at a Danger value: one welcome alert, no crossing.
        let arrival = engine.update_conditions_at(85.0, "Zone B", at(start, 2)).unwrap();
        assert_eq!(arrival.kind, AlertKind::LocationChange);
        assert_eq!(arrival.priority, AlertPriority::Low);
        assert_eq!(
            arrival.display_text,
            "Welcome to Zone B. Severe rain! Seek higher ground immediately."
        );
        assert_eq!(engine.history(50).len(), 3);

        assert!(engine.update_conditions_at(88.0, "Zone B", at(start, 3)).is_none());
        let stats = engine.stats();
        assert_eq!(stats.current_location.as_deref(), Some("Zone B"));
        assert_eq!(stats.current_rainfall, Some(88.0));
    }

    #[test]
    fn simulate_narrated_storm_plays_most_urgent_first() {
        let backend = RecordingSpeech::new(Duration::from_millis(200));
        let dyn_backend: Arc<dyn SpeechBackend> = backend.clone();
        let narrator = AudioNarrator::new(
            Some(dyn_backend),
            &NarratorConfig {
                poll_interval_ms: 20,
                ..NarratorConfig::default()
            },
        );
        let coordinator = Coordinator::new(AlertEngine::new(no_cooldown(), MessageCatalog::builtin()), narrator);
        let start = Instant::now();

        let mut alerts = Vec::new();
        alerts.push(coordinator.tick_at(STORM[0], "Zone A", start).unwrap());
        assert!(wait_until(|| coordinator.narrator().is_playing()));
        for (i, v) in STORM.iter().enumerate().skip(1) {
            alerts.push(coordinator.tick_at(*v, "Zone A", at(start, i as u64)).unwrap());
        }

        assert!(wait_until(|| coordinator.narrator_stats().played == 6));
        let expected: Vec<String> = [0, 3, 1, 4, 2, 5]
            .iter()
            .map(|i| alerts[*i].speech_text.clone())
            .collect();
        assert_eq!(backend.rendered(), expected);

        // Two High and one Critical arrived while the welcome was playing.
        assert_eq!(coordinator.narrator_stats().interrupted, 3);
        assert!(wait_until(|| coordinator.engine().history(50).iter().all(|a| a.spoken)));

        coordinator.shutdown();
        assert_eq!(coordinator.narrator_stats().dropped, 0);
    }
}
