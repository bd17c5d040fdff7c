//! Page-phase classification from the navigation location

use serde::{Deserialize, Serialize};

pub const ENTRY_MARKER: &str = "/entry";
pub const CONFIRM_MARKER: &str = "/confirm";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Time-slot buttons and the reload control are on the page
    SlotSelection,
    /// The final submission control is on the page
    Confirmation,
    Other,
}

/// Substring classification. The confirm marker is checked first because the
/// confirmation location usually sits under the entry path.
pub fn classify_with(location: &str, entry_marker: &str, confirm_marker: &str) -> Phase {
    if location.contains(confirm_marker) {
        Phase::Confirmation
    } else if location.contains(entry_marker) {
        Phase::SlotSelection
    } else {
        Phase::Other
    }
}

/// True when the location's host is `host` or one of its subdomains
pub fn host_matches(location: &str, host: &str) -> bool {
    let Ok(parsed) = url::Url::parse(location) else {
        return false;
    };
    match parsed.host_str() {
        Some(actual) => {
            actual == host
                || actual
                    .strip_suffix(host)
                    .is_some_and(|prefix| prefix.ends_with('.'))
        }
        None => false,
    }
}
