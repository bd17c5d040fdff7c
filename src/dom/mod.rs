//! Narrow DOM query capability used by the polling engine
//!
//! The engine never holds live element handles. Every query returns
//! [`ButtonHandle`] snapshots taken in one pass over the page, and a click
//! re-resolves the button by its position among all `button` elements. A
//! snapshot is only meaningful within the tick that produced it: the page
//! replaces its slot buttons on every reload.

mod cdp;
#[cfg(test)]
pub(crate) mod fake;

pub use cdp::CdpPage;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Snapshot of one `<button>` element and the computed style bits that decide
/// whether it can be clicked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ButtonHandle {
    /// Position among `document.querySelectorAll('button')`
    pub index: usize,
    /// Raw `textContent`
    pub text: String,
    #[serde(default)]
    pub classes: Vec<String>,
    #[serde(default)]
    pub disabled: bool,
    /// Computed `display`
    #[serde(default)]
    pub display: String,
    /// Computed `visibility`
    #[serde(default)]
    pub visibility: String,
    /// Computed `pointer-events`
    #[serde(default)]
    pub pointer_events: String,
}

impl ButtonHandle {
    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    /// Trimmed text, shortened for log lines
    pub fn label(&self) -> String {
        let trimmed = self.text.trim();
        if trimmed.chars().count() > 30 {
            let short: String = trimmed.chars().take(30).collect();
            format!("{short}...")
        } else {
            trimmed.to_string()
        }
    }
}

/// Where a class has to appear for [`PageDom::find_by_class`] to match a button
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassScope {
    /// The button element itself carries the class
    Button,
    /// Some element inside the button carries the class (icon buttons)
    Descendant,
}

#[derive(Error, Debug)]
pub enum DomError {
    #[error("Script evaluation failed: {0}")]
    EvaluationFailed(String),

    #[error("Unexpected script result: {0}")]
    UnexpectedResult(String),
}

pub type DomResult<T> = Result<T, DomError>;

/// The page operations the engine needs, and nothing more
#[async_trait]
pub trait PageDom: Send + Sync {
    /// Current navigation location (`location.href`)
    async fn location(&self) -> DomResult<String>;

    /// Buttons whose text contains `needle`, in DOM order. An empty needle
    /// matches every button.
    async fn find_by_text_substring(&self, needle: &str) -> DomResult<Vec<ButtonHandle>>;

    /// Buttons matching `class` within `scope`, in DOM order
    async fn find_by_class(&self, class: &str, scope: ClassScope) -> DomResult<Vec<ButtonHandle>>;

    /// Every button inside the anchor's parent element, in DOM order. Empty
    /// when the anchor is gone or has no parent.
    async fn container_buttons(&self, anchor: &ButtonHandle) -> DomResult<Vec<ButtonHandle>>;

    /// Dispatch a click on the button. Returns `false` without clicking when
    /// the button at that position no longer carries the snapshot's text.
    async fn click(&self, button: &ButtonHandle) -> DomResult<bool>;
}
