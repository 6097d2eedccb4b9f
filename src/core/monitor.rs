// Threshold monitor - classifies readings and detects boundary crossings.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use super::model::{
    CrossingEvent, CrossingKind, Direction, RainfallBucket, Trend, DANGER_THRESHOLD_MM,
    ESCALATION_THRESHOLD_MM, WARNING_THRESHOLD_MM,
};

/// Bucket-change samples retained for trend analysis.
const MAX_TREND_SAMPLES: usize = 64;
/// Minimum change (mm) across the window to count as a trend.
const TREND_DELTA_MM: f64 = 10.0;

#[derive(Debug, Clone, Copy)]
struct TrendSample {
    at: Instant,
    value: f64,
}

/// Tracks the last reading for one location and reports crossings.
#[derive(Debug, Default)]
pub struct ThresholdMonitor {
    last_value: Option<f64>,
    last_bucket: Option<RainfallBucket>,
    samples: VecDeque<TrendSample>,
}

impl ThresholdMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn classify(value: f64) -> RainfallBucket {
        RainfallBucket::classify(value)
    }

    pub fn last_bucket(&self) -> Option<RainfallBucket> {
        self.last_bucket
    }

    pub fn last_value(&self) -> Option<f64> {
        self.last_value
    }

    pub fn observe(&mut self, value: f64) -> Option<CrossingEvent> {
        self.observe_at(value, Instant::now())
    }

    /// Feed one reading. The first reading after construction or `reset`
    /// only establishes the baseline.
    pub fn observe_at(&mut self, value: f64, now: Instant) -> Option<CrossingEvent> {
        let new_bucket = Self::classify(value);
        let (last_value, last_bucket) = match (self.last_value, self.last_bucket) {
            (Some(v), Some(b)) => (v, b),
            _ => {
                self.last_value = Some(value);
                self.last_bucket = Some(new_bucket);
                return None;
            }
        };

        if new_bucket != last_bucket {
            let direction = if value > last_value {
                Direction::Rising
            } else {
                Direction::Falling
            };
            let event = CrossingEvent {
                kind: CrossingKind::BucketChange {
                    from: last_bucket,
                    to: new_bucket,
                },
                from_value: last_value,
                to_value: value,
                direction,
                crossed_threshold: crossed_threshold(direction, new_bucket),
            };
            self.last_value = Some(value);
            self.last_bucket = Some(new_bucket);
            self.record_sample(now, value);
            return Some(event);
        }

        // Only the rising edge through 50 is reported inside Warning.
        if new_bucket == RainfallBucket::Warning
            && last_value < ESCALATION_THRESHOLD_MM
            && value >= ESCALATION_THRESHOLD_MM
        {
            self.last_value = Some(value);
            return Some(CrossingEvent {
                kind: CrossingKind::InternalEscalation,
                from_value: last_value,
                to_value: value,
                direction: Direction::Rising,
                crossed_threshold: ESCALATION_THRESHOLD_MM,
            });
        }

        self.last_value = Some(value);
        None
    }

    /// Forget the baseline (used when the location changes).
    pub fn reset(&mut self) {
        self.last_value = None;
        self.last_bucket = None;
        self.samples.clear();
    }

    pub fn trend(&self, window: Duration) -> Trend {
        self.trend_at(window, Instant::now())
    }

    /// Compare the oldest and newest bucket-change samples inside the window.
    pub fn trend_at(&self, window: Duration, now: Instant) -> Trend {
        let mut recent = self
            .samples
            .iter()
            .filter(|s| now.saturating_duration_since(s.at) < window);
        let Some(first) = recent.next() else {
            return Trend::Stable;
        };
        let Some(last) = recent.last() else {
            return Trend::Stable;
        };

        let delta = last.value - first.value;
        if delta > TREND_DELTA_MM {
            Trend::Rising
        } else if delta < -TREND_DELTA_MM {
            Trend::Falling
        } else {
            Trend::Stable
        }
    }

    fn record_sample(&mut self, at: Instant, value: f64) {
        if self.samples.len() == MAX_TREND_SAMPLES {
            self.samples.pop_front();
        }
        self.samples.push_back(TrendSample { at, value });
    }
}

fn crossed_threshold(direction: Direction, into: RainfallBucket) -> f64 {
    match (direction, into) {
        (Direction::Rising, RainfallBucket::Danger) | (Direction::Falling, RainfallBucket::Warning) => {
            DANGER_THRESHOLD_MM
        }
        _ => WARNING_THRESHOLD_MM,
    }
}
