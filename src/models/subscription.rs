use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// Per-phase retry budgets. A budget of N means one initial attempt plus
/// N retries; 0 means a single attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RetryCounts {
    #[serde(default = "default_photo_upload")]
    pub photo_upload: u32,
    #[serde(default = "default_operation_start")]
    pub operation_start: u32,
    #[serde(default = "default_operation_status")]
    pub operation_status: u32,
    #[serde(default = "default_result_download")]
    pub result_download: u32,
}

fn default_photo_upload() -> u32 {
    2
}

fn default_operation_start() -> u32 {
    // Starting a generation job is not idempotent; no retry by default.
    0
}

fn default_operation_status() -> u32 {
    2
}

fn default_result_download() -> u32 {
    2
}

impl Default for RetryCounts {
    fn default() -> Self {
        Self {
            photo_upload: default_photo_upload(),
            operation_start: default_operation_start(),
            operation_status: default_operation_status(),
            result_download: default_result_download(),
        }
    }
}

/// One segment of the polling delay schedule: `interval_seconds` repeated
/// `repeat` times, or forever when `repeat` is absent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DelayEntry {
    pub interval_seconds: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat: Option<u32>,
}

impl DelayEntry {
    pub fn finite(interval_seconds: f64, repeat: u32) -> Self {
        Self {
            interval_seconds,
            repeat: Some(repeat),
        }
    }

    pub fn infinite(interval_seconds: f64) -> Self {
        Self {
            interval_seconds,
            repeat: None,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs_f64(self.interval_seconds)
    }
}

/// Built-in polling schedule: 1s x4, 0.5s x20, then 3s indefinitely.
pub fn default_delay_schedule() -> Vec<DelayEntry> {
    vec![
        DelayEntry::finite(1.0, 4),
        DelayEntry::finite(0.5, 20),
        DelayEntry::infinite(3.0),
    ]
}

/// Display flag for the "powered by" sticker, hidden unless the server
/// says otherwise.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PoweredBySticker {
    #[serde(default)]
    pub url_ios: Option<String>,
    #[serde(default)]
    pub is_visible: bool,
}

/// Remote configuration document supplying retry budgets, the polling
/// delay schedule, and feature flags.
///
/// Every field is optional on decode; anything missing falls back to its
/// documented default, so a partial or empty document never fails.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SubscriptionDetails {
    pub powered_by_sticker: PoweredBySticker,
    pub retry_counts: RetryCounts,
    pub operation_delays_sequence: Vec<DelayEntry>,
}

impl Default for SubscriptionDetails {
    fn default() -> Self {
        Self {
            powered_by_sticker: PoweredBySticker::default(),
            retry_counts: RetryCounts::default(),
            operation_delays_sequence: default_delay_schedule(),
        }
    }
}

impl SubscriptionDetails {
    /// The delay schedule, validated for use by the polling loop.
    ///
    /// A valid schedule is non-empty, uses positive finite intervals, and
    /// ends with an infinite entry so the sequence never runs dry. A
    /// server document violating that falls back to the built-in schedule.
    pub fn delay_schedule(&self) -> Vec<DelayEntry> {
        if schedule_is_valid(&self.operation_delays_sequence) {
            self.operation_delays_sequence.clone()
        } else {
            warn!(
                entries = self.operation_delays_sequence.len(),
                "Malformed operation delay schedule, using built-in default"
            );
            default_delay_schedule()
        }
    }
}

fn schedule_is_valid(entries: &[DelayEntry]) -> bool {
    let Some(last) = entries.last() else {
        return false;
    };
    if last.repeat.is_some() {
        return false;
    }
    entries
        .iter()
        .all(|e| e.interval_seconds.is_finite() && e.interval_seconds > 0.0)
}
