//! Reservation autopilot for timed booking slots
//!
//! Drives a Chrome tab through a two-page reservation flow via chromiumoxide:
//! reloads slot availability on a timer, clicks the most preferred free slot,
//! confirms it, and clicks the final submission button once the confirmation
//! page loads.

pub mod autorun;
mod browser;
pub mod browser_setup;
pub mod commands;
pub mod controller;
pub mod dom;
pub mod engine;
pub mod intent;
pub mod locator;
mod manager;
pub mod phase;
pub mod slot_search;
pub mod store;
mod utils;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::phase::{Phase, classify_with, host_matches};

pub use autorun::watch_page_loads;
pub use browser::{
    BrowserError, BrowserWrapper, download_managed_browser, find_browser_executable,
    first_page, launch_browser,
};
pub use commands::{Command, CommandResponse, dispatch, serve_lines};
pub use controller::{ControllerError, EngineStatus, LifecycleController, StartOutcome};
pub use engine::{EngineTimings, RunConfig, RunState, StopReason};
pub use manager::BrowserManager;
pub use store::SettingsStore;
pub use utils::ConfigError;
pub use utils::constants::KNOWN_TIME_SLOTS;

/// User-facing settings, persisted as YAML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Slot labels in priority order, most preferred first
    #[serde(default = "default_target_times", alias = "targetTimes")]
    pub target_times: Vec<String>,

    /// Seconds between reload/search ticks
    #[serde(default = "default_retry_interval", alias = "retryInterval")]
    pub retry_interval: f64,

    /// Minutes before a run gives up on the slot page
    #[serde(default = "default_max_duration", alias = "maxDuration")]
    pub max_duration: u64,

    /// Start a run automatically whenever a reservation page loads
    #[serde(default = "default_auto_run", alias = "autoRun")]
    pub auto_run: bool,

    /// Page to open when the browser starts
    #[serde(default)]
    pub start_url: Option<String>,

    #[serde(default = "default_navigation_timeout_ms")]
    pub navigation_timeout_ms: u64,

    #[serde(default)]
    pub browser: BrowserConfig,

    #[serde(default)]
    pub site: SiteProfile,

    #[serde(default)]
    pub timings: EngineTimings,
}

/// Browser security and launch configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Run browser in headless mode
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Disable web security features (Same-Origin Policy, etc.)
    /// WARNING: Only enable for trusted content
    #[serde(default = "default_disable_security")]
    pub disable_security: bool,

    /// Persistent Chrome profile, so a logged-in session survives restarts.
    /// A temporary profile is used (and deleted on shutdown) when unset.
    #[serde(default)]
    pub profile_dir: Option<PathBuf>,

    /// Window dimensions
    #[serde(default)]
    pub window: WindowConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowConfig {
    #[serde(default = "default_window_width")]
    pub width: u32,

    #[serde(default = "default_window_height")]
    pub height: u32,
}

/// The reservation site's interaction contract: where each phase lives and
/// how its controls are recognised
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteProfile {
    /// Runs only start on this host or its subdomains; `None` allows any host
    #[serde(default = "default_host")]
    pub host: Option<String>,

    #[serde(default = "default_entry_marker")]
    pub entry_marker: String,

    #[serde(default = "default_confirm_marker")]
    pub confirm_marker: String,

    /// Text of the slot page's confirm button
    #[serde(default = "default_confirm_label")]
    pub confirm_label: String,

    /// Phrase on the confirmation page's submission button
    #[serde(default = "default_submit_phrase")]
    pub submit_phrase: String,

    /// Class of the primary-action button on the confirmation page
    #[serde(default = "default_primary_class")]
    pub primary_class: String,

    /// Icon class inside the slot page's reload button
    #[serde(default = "default_refresh_icon_class")]
    pub refresh_icon_class: String,
}

fn default_target_times() -> Vec<String> {
    vec!["12:00～12:30".to_string()]
}
fn default_retry_interval() -> f64 {
    1.0
}
fn default_max_duration() -> u64 {
    3
}
fn default_auto_run() -> bool {
    true
}
fn default_navigation_timeout_ms() -> u64 {
    30_000
}

fn default_headless() -> bool {
    // The reservation needs a logged-in, visible session
    false
}

fn default_disable_security() -> bool {
    false  // SECURE BY DEFAULT
}

fn default_window_width() -> u32 {
    1280
}

fn default_window_height() -> u32 {
    720
}

fn default_host() -> Option<String> {
    Some("gundam-base-entry.net".to_string())
}
fn default_entry_marker() -> String {
    phase::ENTRY_MARKER.to_string()
}
fn default_confirm_marker() -> String {
    phase::CONFIRM_MARKER.to_string()
}
fn default_confirm_label() -> String {
    "確認する".to_string()
}
fn default_submit_phrase() -> String {
    "申し込み".to_string()
}
fn default_primary_class() -> String {
    "bg-primary".to_string()
}
fn default_refresh_icon_class() -> String {
    "lucide-refresh-ccw".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            target_times: default_target_times(),
            retry_interval: default_retry_interval(),
            max_duration: default_max_duration(),
            auto_run: default_auto_run(),
            start_url: None,
            navigation_timeout_ms: default_navigation_timeout_ms(),
            browser: BrowserConfig::default(),
            site: SiteProfile::default(),
            timings: EngineTimings::default(),
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: default_headless(),
            disable_security: default_disable_security(),
            profile_dir: None,
            window: WindowConfig::default(),
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: default_window_width(),
            height: default_window_height(),
        }
    }
}

impl Default for SiteProfile {
    fn default() -> Self {
        Self {
            host: default_host(),
            entry_marker: default_entry_marker(),
            confirm_marker: default_confirm_marker(),
            confirm_label: default_confirm_label(),
            submit_phrase: default_submit_phrase(),
            primary_class: default_primary_class(),
            refresh_icon_class: default_refresh_icon_class(),
        }
    }
}

impl SiteProfile {
    pub fn classify(&self, location: &str) -> Phase {
        classify_with(location, &self.entry_marker, &self.confirm_marker)
    }

    pub fn accepts_host(&self, location: &str) -> bool {
        match &self.host {
            Some(host) => host_matches(location, host),
            None => true,
        }
    }
}

impl Settings {
    /// Check what the settings form enforces. Unknown slot labels are allowed
    /// (the site may add slots) but logged.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_times.is_empty() {
            return Err(ConfigError::NoTargetTimes);
        }
        self.retry_period()?;
        self.navigation_timeout()?;
        for label in &self.target_times {
            if !KNOWN_TIME_SLOTS.contains(&label.as_str()) {
                tracing::warn!(label = %label, "target time is not one of the known slot labels");
            }
        }
        Ok(())
    }

    /// `retry_interval` as a `Duration`. Rejects negative, non-finite and
    /// unrepresentably large values.
    fn retry_period(&self) -> Result<std::time::Duration, ConfigError> {
        std::time::Duration::try_from_secs_f64(self.retry_interval)
            .map_err(|_| ConfigError::InvalidRetryInterval(self.retry_interval))
    }

    /// Timeout for opening `start_url`, capped at five minutes
    pub fn navigation_timeout(&self) -> Result<std::time::Duration, ConfigError> {
        utils::validate_navigation_timeout(
            Some(self.navigation_timeout_ms),
            default_navigation_timeout_ms(),
        )
    }

    /// Engine parameters for one run, with seconds/minutes converted
    pub fn run_config(&self) -> Result<RunConfig, ConfigError> {
        self.validate()?;
        RunConfig::new(
            self.target_times.clone(),
            self.retry_period()?,
            std::time::Duration::from_secs(self.max_duration.saturating_mul(60)),
        )
    }
}
