use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::utils::constants::{
    CONFIRM_SETTLE, NAV_WATCH_INTERVAL, RELOAD_SETTLE, SUBMIT_MAX_ATTEMPTS, SUBMIT_RETRY_INTERVAL,
    TRANSITION_SETTLE,
};

/// Fixed delays and caps of the polling engine.
///
/// The defaults match how fast the target site re-renders; override them in
/// the settings file only for slow machines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineTimings {
    #[serde(default = "default_nav_watch_ms")]
    pub nav_watch_ms: u64,

    #[serde(default = "default_reload_settle_ms")]
    pub reload_settle_ms: u64,

    #[serde(default = "default_confirm_settle_ms")]
    pub confirm_settle_ms: u64,

    #[serde(default = "default_transition_settle_ms")]
    pub transition_settle_ms: u64,

    #[serde(default = "default_submit_retry_ms")]
    pub submit_retry_ms: u64,

    #[serde(default = "default_submit_max_attempts")]
    pub submit_max_attempts: u32,
}

fn default_nav_watch_ms() -> u64 {
    NAV_WATCH_INTERVAL.as_millis() as u64
}
fn default_reload_settle_ms() -> u64 {
    RELOAD_SETTLE.as_millis() as u64
}
fn default_confirm_settle_ms() -> u64 {
    CONFIRM_SETTLE.as_millis() as u64
}
fn default_transition_settle_ms() -> u64 {
    TRANSITION_SETTLE.as_millis() as u64
}
fn default_submit_retry_ms() -> u64 {
    SUBMIT_RETRY_INTERVAL.as_millis() as u64
}
fn default_submit_max_attempts() -> u32 {
    SUBMIT_MAX_ATTEMPTS
}

impl Default for EngineTimings {
    fn default() -> Self {
        Self {
            nav_watch_ms: default_nav_watch_ms(),
            reload_settle_ms: default_reload_settle_ms(),
            confirm_settle_ms: default_confirm_settle_ms(),
            transition_settle_ms: default_transition_settle_ms(),
            submit_retry_ms: default_submit_retry_ms(),
            submit_max_attempts: default_submit_max_attempts(),
        }
    }
}

impl EngineTimings {
    // Interval periods must be non-zero
    pub fn nav_watch(&self) -> Duration {
        Duration::from_millis(self.nav_watch_ms.max(1))
    }

    pub fn reload_settle(&self) -> Duration {
        Duration::from_millis(self.reload_settle_ms)
    }

    pub fn confirm_settle(&self) -> Duration {
        Duration::from_millis(self.confirm_settle_ms)
    }

    pub fn transition_settle(&self) -> Duration {
        Duration::from_millis(self.transition_settle_ms)
    }

    pub fn submit_retry(&self) -> Duration {
        Duration::from_millis(self.submit_retry_ms.max(1))
    }
}
