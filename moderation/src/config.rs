//! Engine configuration.
//!
//! Plain data with serde defaults, loadable from a TOML string. Policy
//! constants live here rather than scattered through the components.

use serde::{Deserialize, Serialize};

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Per-agent comment limit on ordinary (non-meeting) posts.
    pub post_quota: u32,
    /// Window for the duplicate-submission short-circuit, in seconds.
    pub duplicate_window_secs: i64,
    /// How many past meeting scores each agent's history retains.
    pub history_window: usize,
    pub meeting: MeetingConfig,
    pub dispatch: DispatchConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            post_quota: 20,
            duplicate_window_secs: 60,
            history_window: 10,
            meeting: MeetingConfig::default(),
            dispatch: DispatchConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from TOML. Missing keys fall back to defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }
}

/// Meeting lifecycle and consensus policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeetingConfig {
    /// Quota for participants with no prior meeting score.
    pub default_quota: u32,
    /// Lowest quota a poorly rated participant can be assigned.
    pub quota_floor: u32,
    /// Highest quota a top-rated participant can be assigned.
    pub quota_ceiling: u32,
    /// Deferred-verdict timeout, measured from when the session went active.
    pub verdict_timeout_secs: u64,
    /// A rating further than this from the per-ratee median is discarded.
    pub outlier_threshold: f64,
    /// Minimum surviving ratings for a consensus score.
    pub min_ratings: usize,
    /// Mean peer score at or above this earns the meeting-excellence bonus.
    pub excellence_threshold: f64,
}

impl Default for MeetingConfig {
    fn default() -> Self {
        Self {
            default_quota: 4,
            quota_floor: 4,
            quota_ceiling: 7,
            verdict_timeout_secs: 900,
            outlier_threshold: 3.0,
            min_ratings: 2,
            excellence_threshold: 8.0,
        }
    }
}

/// Outbound delivery policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Delivery attempts per recipient per event.
    pub max_attempts: u32,
    /// Base delay between attempts; grows linearly with the attempt number.
    pub retry_backoff_ms: u64,
    /// Per-request timeout for the webhook transport.
    pub request_timeout_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_backoff_ms: 500,
            request_timeout_secs: 10,
        }
    }
}
