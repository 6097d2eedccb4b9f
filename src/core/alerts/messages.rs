// Deterministic fallback messages, keyed by location with a mandatory default.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::model::AlertKind;
use crate::core::model::{CrossingEvent, Direction, RainfallBucket};

/// One message per bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketMessages {
    pub normal: String,
    pub warning: String,
    pub danger: String,
}

impl BucketMessages {
    pub fn for_bucket(&self, bucket: RainfallBucket) -> &str {
        match bucket {
            RainfallBucket::Normal => &self.normal,
            RainfallBucket::Warning => &self.warning,
            RainfallBucket::Danger => &self.danger,
        }
    }
}

/// Messages for a single location. `{location}` and `{rainfall}` are
/// substituted when rendered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationMessages {
    /// Shown on arrival, chosen by the current bucket
    pub welcome: BucketMessages,
    /// Rising through 30mm
    pub heavy_rain: String,
    /// Falling back under 30mm
    pub easing: String,
    /// Rising through 80mm
    pub severe: String,
    /// Falling back under 80mm
    pub decreasing: String,
    /// Rising through 50mm inside Warning
    pub escalation: String,
}

impl LocationMessages {
    fn template(
        &self,
        kind: AlertKind,
        bucket: RainfallBucket,
        crossing: Option<&CrossingEvent>,
    ) -> &str {
        match kind {
            AlertKind::LocationChange => self.welcome.for_bucket(bucket),
            AlertKind::Escalation => &self.escalation,
            AlertKind::SevereWeather => &self.severe,
            AlertKind::ThresholdCrossing => {
                let (to, direction) = crossing
                    .map(|c| (c.to_bucket(), c.direction))
                    .unwrap_or((bucket, Direction::Rising));
                match (to, direction) {
                    (RainfallBucket::Danger, _) => &self.severe,
                    (RainfallBucket::Warning, Direction::Rising) => &self.heavy_rain,
                    (RainfallBucket::Warning, Direction::Falling) => &self.decreasing,
                    (RainfallBucket::Normal, _) => &self.easing,
                }
            }
        }
    }
}

/// Location → messages, with a default entry so every location resolves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageCatalog {
    #[serde(default)]
    pub locations: HashMap<String, LocationMessages>,
    pub default: LocationMessages,
}

impl MessageCatalog {
    pub fn new(default: LocationMessages) -> Self {
        Self {
            locations: HashMap::new(),
            default,
        }
    }

    pub fn with_location(mut self, location: impl Into<String>, messages: LocationMessages) -> Self {
        self.locations.insert(location.into(), messages);
        self
    }

    /// Entry for a location, or the default entry for unknown ones.
    pub fn entry(&self, location: &str) -> &LocationMessages {
        self.locations.get(location).unwrap_or(&self.default)
    }

    /// Render the message for an alert. Never fails.
    pub fn render(
        &self,
        kind: AlertKind,
        location: &str,
        rainfall: f64,
        bucket: RainfallBucket,
        crossing: Option<&CrossingEvent>,
    ) -> String {
        self.entry(location)
            .template(kind, bucket, crossing)
            .replace("{location}", location)
            .replace("{rainfall}", &format!("{:.0}", rainfall))
    }

    /// Built-in catalog for the monitored Orchard zones.
    pub fn builtin() -> Self {
        Self::new(LocationMessages {
            welcome: BucketMessages {
                normal: "Welcome to {location}. Conditions are normal.".into(),
                warning: "Welcome to {location}. Heavy rain detected, monitor conditions.".into(),
                danger: "Welcome to {location}. Severe rain! Seek higher ground immediately.".into(),
            },
            heavy_rain: "Warning at {location}: heavy rain, {rainfall}mm. Monitor conditions.".into(),
            easing: "Conditions improving at {location}. Rain easing to normal levels.".into(),
            severe: "DANGER at {location}: severe rainfall, {rainfall}mm! Seek higher ground immediately.".into(),
            decreasing: "{location}: rain decreasing but still heavy. Remain cautious.".into(),
            escalation: "Caution at {location}: rain intensifying, {rainfall}mm. Be ready to move.".into(),
        })
        .with_location(
            "ION Orchard",
            LocationMessages {
                welcome: BucketMessages {
                    normal: "Welcome to ION Orchard. You are at 18 meters elevation, safe from flooding.".into(),
                    warning: "ION Orchard: Heavy rain outside, but you are safe here on high ground.".into(),
                    danger: "ION Orchard: Severe rain. You are safe, but avoid going outside.".into(),
                },
                heavy_rain: "ION Orchard: Heavy rain outside. You are safe on high ground.".into(),
                easing: "ION Orchard: Rain easing. Conditions improving.".into(),
                severe: "URGENT at ION Orchard: Severe rain! Stay inside, avoid basement levels.".into(),
                decreasing: "ION Orchard: Rain decreasing but still heavy. Remain cautious.".into(),
                escalation: "ION Orchard: Rain intensifying. Stay on the upper levels.".into(),
            },
        )
        .with_location(
            "Orchard Road",
            LocationMessages {
                welcome: BucketMessages {
                    normal: "Welcome to Orchard Road. Watch for water pooling during rain.".into(),
                    warning: "Orchard Road: Heavy rain may cause flash floods. Stay alert.".into(),
                    danger: "URGENT: Severe rain on Orchard Road! Seek shelter immediately!".into(),
                },
                heavy_rain: "Orchard Road warning: Heavy rain may cause flash floods. Move to higher ground.".into(),
                easing: "Orchard Road: Rain easing. Still watch for water pooling.".into(),
                severe: "EMERGENCY on Orchard Road! Severe rain! Seek shelter immediately!".into(),
                decreasing: "Orchard Road: Rain decreasing from severe levels. Stay alert.".into(),
                escalation: "Orchard Road: Rain intensifying. Keep away from drains and canals.".into(),
            },
        )
        .with_location(
            "Tanglin Carpark",
            LocationMessages {
                welcome: BucketMessages {
                    normal: "Welcome to Tanglin Carpark. Warning: This basement flooded in 2010 and 2011.".into(),
                    warning: "Tanglin Carpark: Heavy rain! Be ready to evacuate. Watch water levels.".into(),
                    danger: "EMERGENCY at Tanglin Carpark! Severe rain! Evacuate NOW!".into(),
                },
                heavy_rain: "Tanglin Carpark warning: Heavy rain! This area flooded in 2010 and 2011. Watch water levels.".into(),
                easing: "Tanglin Carpark: Rain easing. Check for water accumulation before leaving.".into(),
                severe: "EMERGENCY at Tanglin Carpark! Severe rain! Evacuate NOW! Abandon vehicle if necessary!".into(),
                decreasing: "Tanglin Carpark: Severe rain decreasing but still dangerous. Evacuate if water rising.".into(),
                escalation: "Tanglin Carpark: Rain intensifying. Move your vehicle to a higher deck.".into(),
            },
        )
    }
}

impl Default for MessageCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
