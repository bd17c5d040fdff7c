//! Clickable-element locator
//!
//! Decides whether a button snapshot may be clicked and performs the click.
//! The order of checks matters: interactability first, then the cancelled
//! marker, and only then the click. A click is a one-way side effect.

use tracing::debug;

use crate::dom::{ButtonHandle, DomResult, PageDom};

/// Glyph the site prefixes to slots that are sold out or cancelled
pub const CANCELLED_MARKER: char = '×';

/// False for a missing, disabled, `display: none`, `visibility: hidden` or
/// `pointer-events: none` button
pub fn is_interactable(button: Option<&ButtonHandle>) -> bool {
    let Some(button) = button else {
        return false;
    };
    !button.disabled
        && button.display != "none"
        && button.visibility != "hidden"
        && button.pointer_events != "none"
}

pub fn is_cancelled_marker(button: &ButtonHandle) -> bool {
    button.text.trim().starts_with(CANCELLED_MARKER)
}

/// Click the button if it is interactable and not marked cancelled.
///
/// Returns `Ok(false)` without touching the page when either gate fails, and
/// also when the page no longer has this button where the snapshot saw it.
pub async fn attempt_click(dom: &dyn PageDom, button: &ButtonHandle) -> DomResult<bool> {
    if !is_interactable(Some(button)) {
        debug!(button = %button.label(), "not interactable, skipping click");
        return Ok(false);
    }
    if is_cancelled_marker(button) {
        debug!(button = %button.label(), "marked cancelled, skipping click");
        return Ok(false);
    }
    dom.click(button).await
}
