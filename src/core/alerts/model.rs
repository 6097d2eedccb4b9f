// Alert model types shared by the engine, the generators and the narrator.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::core::model::{CrossingEvent, RainfallBucket};

static ALERT_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// What caused an alert. Exactly one per emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// Moved between Normal and Warning, or down out of Danger
    ThresholdCrossing,
    /// Rose through 50mm inside Warning
    Escalation,
    /// Entered Danger
    SevereWeather,
    /// Entered a new zone
    LocationChange,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ThresholdCrossing => "threshold_crossing",
            Self::Escalation => "escalation",
            Self::SevereWeather => "severe_weather",
            Self::LocationChange => "location_change",
        }
    }

    /// Map a monitor crossing onto the alert kind it raises.
    pub fn for_crossing(crossing: &CrossingEvent) -> Self {
        if !crossing.is_bucket_change() {
            Self::Escalation
        } else if crossing.to_bucket() == RainfallBucket::Danger {
            Self::SevereWeather
        } else {
            Self::ThresholdCrossing
        }
    }

    pub fn all() -> &'static [AlertKind] {
        &[
            Self::ThresholdCrossing,
            Self::Escalation,
            Self::SevereWeather,
            Self::LocationChange,
        ]
    }
}

/// Alert urgency. `Critical` is the most urgent and sorts highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl AlertPriority {
    /// Audio queue priority: 0 plays first. Note the inverted scale.
    pub fn audio_priority(&self) -> u8 {
        match self {
            Self::Critical => 0,
            Self::High => 1,
            Self::Medium => 2,
            Self::Low => 3,
        }
    }

    pub fn from_audio_priority(priority: u8) -> Option<Self> {
        match priority {
            0 => Some(Self::Critical),
            1 => Some(Self::High),
            2 => Some(Self::Medium),
            3 => Some(Self::Low),
            _ => None,
        }
    }

    /// Derive severity from the alert kind and the bucket it lands in.
    pub fn derive(kind: AlertKind, to_bucket: RainfallBucket) -> Self {
        match (kind, to_bucket) {
            (AlertKind::SevereWeather, _) | (AlertKind::ThresholdCrossing, RainfallBucket::Danger) => {
                Self::Critical
            }
            (AlertKind::ThresholdCrossing, RainfallBucket::Warning) => Self::High,
            (AlertKind::Escalation, _) => Self::Medium,
            _ => Self::Low,
        }
    }

    /// Whether the narrator should announce this ahead of whatever is playing.
    pub fn interrupts(&self) -> bool {
        matches!(self, Self::Critical | Self::High)
    }

    fn badge(&self) -> &'static str {
        match self {
            Self::Low => "[info]",
            Self::Medium => "[caution]",
            Self::High => "[warning]",
            Self::Critical => "[EMERGENCY]",
        }
    }

    pub(crate) fn speech_prefix(&self) -> &'static str {
        match self {
            Self::Critical => "Emergency alert! ",
            Self::High => "Warning! ",
            Self::Medium => "Caution: ",
            Self::Low => "",
        }
    }
}

/// A published alert. Only `read` and `spoken` change after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub display_text: String,
    pub speech_text: String,
    pub priority: AlertPriority,
    pub kind: AlertKind,
    pub location: String,
    pub rainfall: f64,
    pub created_at: DateTime<Local>,
    #[serde(default)]
    pub source_references: Vec<String>,
    pub read: bool,
    pub spoken: bool,
}

impl Alert {
    pub fn new(
        kind: AlertKind,
        priority: AlertPriority,
        location: impl Into<String>,
        rainfall: f64,
        display_text: impl Into<String>,
        speech_text: impl Into<String>,
    ) -> Self {
        let created_at = Local::now();
        Self {
            id: next_alert_id(kind, &created_at),
            display_text: display_text.into(),
            speech_text: speech_text.into(),
            priority,
            kind,
            location: location.into(),
            rainfall,
            created_at,
            source_references: Vec::new(),
            read: false,
            spoken: false,
        }
    }

    /// Transcript form with a priority badge.
    pub fn chat_line(&self) -> String {
        format!("{} Alert: {}", self.priority.badge(), self.display_text)
    }
}

fn next_alert_id(kind: AlertKind, created_at: &DateTime<Local>) -> String {
    let seq = ALERT_SEQUENCE.fetch_add(1, Ordering::SeqCst) + 1;
    format!("{}_{}_{}", kind.as_str(), created_at.timestamp_millis(), seq)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{CrossingKind, Direction};

    #[test]
    fn test_audio_priority_round_trip_is_inverted() {
        for priority in [
            AlertPriority::Low,
            AlertPriority::Medium,
            AlertPriority::High,
            AlertPriority::Critical,
        ] {
            let audio = priority.audio_priority();
            assert_eq!(AlertPriority::from_audio_priority(audio), Some(priority));
        }
        assert_eq!(AlertPriority::Critical.audio_priority(), 0);
        assert_eq!(AlertPriority::Low.audio_priority(), 3);
        assert_eq!(AlertPriority::from_audio_priority(9), None);
    }

    #[test]
    fn test_severity_derivation() {
        use RainfallBucket::*;
        assert_eq!(AlertPriority::derive(AlertKind::SevereWeather, Danger), AlertPriority::Critical);
        assert_eq!(AlertPriority::derive(AlertKind::ThresholdCrossing, Danger), AlertPriority::Critical);
        assert_eq!(AlertPriority::derive(AlertKind::ThresholdCrossing, Warning), AlertPriority::High);
        assert_eq!(AlertPriority::derive(AlertKind::Escalation, Warning), AlertPriority::Medium);
        assert_eq!(AlertPriority::derive(AlertKind::ThresholdCrossing, Normal), AlertPriority::Low);
        assert_eq!(AlertPriority::derive(AlertKind::LocationChange, Danger), AlertPriority::Low);
    }

    #[test]
    fn test_kind_for_crossing() {
        let mut crossing = CrossingEvent {
            kind: CrossingKind::BucketChange {
                from: RainfallBucket::Warning,
                to: RainfallBucket::Danger,
            },
            from_value: 60.0,
            to_value: 85.0,
            direction: Direction::Rising,
            crossed_threshold: 80.0,
        };
        assert_eq!(AlertKind::for_crossing(&crossing), AlertKind::SevereWeather);

        crossing.kind = CrossingKind::BucketChange {
            from: RainfallBucket::Danger,
            to: RainfallBucket::Warning,
        };
        assert_eq!(AlertKind::for_crossing(&crossing), AlertKind::ThresholdCrossing);

        crossing.kind = CrossingKind::InternalEscalation;
        assert_eq!(AlertKind::for_crossing(&crossing), AlertKind::Escalation);
    }

    #[test]
    fn test_alert_ids_are_unique() {
        let a = Alert::new(AlertKind::Escalation, AlertPriority::Medium, "Zone A", 55.0, "x", "x");
        let b = Alert::new(AlertKind::Escalation, AlertPriority::Medium, "Zone A", 55.0, "x", "x");
        assert_ne!(a.id, b.id);
        assert!(a.id.starts_with("escalation_"));
    }

    #[test]
    fn test_chat_line_has_badge() {
        let alert = Alert::new(
            AlertKind::SevereWeather,
            AlertPriority::Critical,
            "Zone A",
            90.0,
            "Evacuate now",
            "Evacuate now",
        );
        assert_eq!(alert.chat_line(), "[EMERGENCY] Alert: Evacuate now");
    }
}
