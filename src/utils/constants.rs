//! Shared configuration constants for the reservation autopilot
//!
//! This module contains default values and configuration constants used
//! throughout the codebase to ensure consistency and avoid magic numbers.

use std::time::Duration;

/// Chrome user agent string for stealth mode
///
/// Updated: 2025-01-29 to Chrome 132 (current stable)
/// Next update: 2025-04-29 (quarterly schedule)
///
/// Reference: https://chromiumdash.appspot.com/schedule
pub const CHROME_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.6834.160 Safari/537.36";

/// How often the navigation watch compares the current location to the last one seen
pub const NAV_WATCH_INTERVAL: Duration = Duration::from_millis(100);

/// Wait after pressing the reload control before searching for slots
pub const RELOAD_SETTLE: Duration = Duration::from_millis(200);

/// Wait after clicking a slot before looking for the confirm button
pub const CONFIRM_SETTLE: Duration = Duration::from_millis(380);

/// Wait after the confirmation location appears before the first submit attempt
pub const TRANSITION_SETTLE: Duration = Duration::from_millis(500);

/// Period of the submission retry loop on the confirmation page
pub const SUBMIT_RETRY_INTERVAL: Duration = Duration::from_millis(200);

/// Submission attempts before the confirmation phase gives up
pub const SUBMIT_MAX_ATTEMPTS: u32 = 5;

/// Smallest period a reload/search timer runs at (browsers clamp nested timers to 4ms)
pub const MIN_RETRY_INTERVAL: Duration = Duration::from_millis(4);

/// Largest period a reload/search timer runs at. Anything longer could not be
/// added to an `Instant` and never fires before a sensible deadline anyway.
pub const MAX_RETRY_INTERVAL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// How long `stop()` waits for a cancelled run to wind down before aborting it
pub const STOP_GRACE: Duration = Duration::from_secs(5);

/// Half-hour labels offered by the settings form, in chronological order
pub const KNOWN_TIME_SLOTS: [&str; 21] = [
    "10:00～10:30",
    "10:30～11:00",
    "11:00～11:30",
    "11:30～12:00",
    "12:00～12:30",
    "12:30～13:00",
    "13:00～13:30",
    "13:30～14:00",
    "14:00～14:30",
    "14:30～15:00",
    "15:00～15:30",
    "15:30～16:00",
    "16:00～16:30",
    "16:30～17:00",
    "17:00～17:30",
    "17:30～18:00",
    "18:00～18:30",
    "18:30～19:00",
    "19:00～19:30",
    "19:30～20:00",
    "20:00～20:30",
];
