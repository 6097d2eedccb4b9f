use std::fmt;

use serde::{Deserialize, Serialize};

/// Rainfall below this is Normal (mm).
pub const WARNING_THRESHOLD_MM: f64 = 30.0;
/// Sub-bucket escalation point inside Warning (mm).
pub const ESCALATION_THRESHOLD_MM: f64 = 50.0;
/// Rainfall at or above this is Danger (mm).
pub const DANGER_THRESHOLD_MM: f64 = 80.0;

/// Ordered rainfall classification. Comparisons are by rank only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RainfallBucket {
    Normal,
    Warning,
    Danger,
}

impl RainfallBucket {
    /// Classify a reading against the fixed breakpoints.
    pub fn classify(rainfall_mm: f64) -> Self {
        if rainfall_mm < WARNING_THRESHOLD_MM {
            Self::Normal
        } else if rainfall_mm < DANGER_THRESHOLD_MM {
            Self::Warning
        } else {
            Self::Danger
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Warning => "warning",
            Self::Danger => "danger",
        }
    }
}

impl fmt::Display for RainfallBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Rising,
    Falling,
}

impl Direction {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Rising => "rising",
            Self::Falling => "falling",
        }
    }
}

/// What kind of boundary a crossing went through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CrossingKind {
    /// Moved from one bucket into another.
    BucketChange {
        from: RainfallBucket,
        to: RainfallBucket,
    },
    /// Rose through the 50mm mark while staying in Warning.
    InternalEscalation,
}

/// A detected transition between two consecutive readings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CrossingEvent {
    pub kind: CrossingKind,
    pub from_value: f64,
    pub to_value: f64,
    pub direction: Direction,
    pub crossed_threshold: f64,
}

impl CrossingEvent {
    /// Bucket the reading landed in.
    pub fn to_bucket(&self) -> RainfallBucket {
        match self.kind {
            CrossingKind::BucketChange { to, .. } => to,
            CrossingKind::InternalEscalation => RainfallBucket::Warning,
        }
    }

    /// Bucket the previous reading was in.
    pub fn from_bucket(&self) -> RainfallBucket {
        match self.kind {
            CrossingKind::BucketChange { from, .. } => from,
            CrossingKind::InternalEscalation => RainfallBucket::Warning,
        }
    }

    pub fn is_bucket_change(&self) -> bool {
        matches!(self.kind, CrossingKind::BucketChange { .. })
    }
}

/// Short-term direction of rainfall over a trailing window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Rising,
    Falling,
    Stable,
}
