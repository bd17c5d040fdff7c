//! `PageDom` over a live chromiumoxide page
//!
//! Each query is a single `Runtime.evaluate` round trip returning plain JSON
//! snapshots, so nothing on the Rust side points into the page's heap.

use async_trait::async_trait;
use chromiumoxide::Page;
use chromiumoxide_cdp::cdp::js_protocol::runtime::EvaluateParams;
use serde::de::DeserializeOwned;
use tracing::trace;

use super::{ButtonHandle, ClassScope, DomError, DomResult, PageDom};

/// Serialises a button into the shape `ButtonHandle` deserialises from.
/// `all` must be the `querySelectorAll('button')` list the index refers to.
const SNAPSHOT_FN: &str = r#"(b, all) => {
    const s = window.getComputedStyle(b);
    return {
        index: all.indexOf(b),
        text: b.textContent || '',
        classes: Array.from(b.classList),
        disabled: !!b.disabled,
        display: s.display,
        visibility: s.visibility,
        pointerEvents: s.pointerEvents
    };
}"#;

/// DOM access through the DevTools protocol for one tab
#[derive(Clone)]
pub struct CdpPage {
    page: Page,
}

impl CdpPage {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    pub(crate) async fn eval<T: DeserializeOwned>(&self, script: String) -> DomResult<T> {
        trace!(script = %script, "evaluating page script");
        // Explicit params: the scripts are IIFEs, never function declarations
        let params = EvaluateParams::builder()
            .expression(script)
            .return_by_value(true)
            .build()
            .map_err(DomError::EvaluationFailed)?;
        self.page
            .evaluate_expression(params)
            .await
            .map_err(|e| DomError::EvaluationFailed(e.to_string()))?
            .into_value::<T>()
            .map_err(|e| DomError::UnexpectedResult(e.to_string()))
    }

    /// Wrap a filter body into a script that snapshots every matching button.
    /// The body sees `b` (the button) and must evaluate to a boolean.
    fn select_buttons(filter: &str) -> String {
        format!(
            r#"(() => {{
    const snap = {SNAPSHOT_FN};
    const all = Array.from(document.querySelectorAll('button'));
    return all.filter(b => {filter}).map(b => snap(b, all));
}})()"#
        )
    }
}

fn js_string(value: &str) -> String {
    // A JSON string literal is a valid JS string literal
    serde_json::Value::String(value.to_string()).to_string()
}

#[async_trait]
impl PageDom for CdpPage {
    async fn location(&self) -> DomResult<String> {
        self.eval("location.href".to_string()).await
    }

    async fn find_by_text_substring(&self, needle: &str) -> DomResult<Vec<ButtonHandle>> {
        let filter = format!("(b.textContent || '').includes({})", js_string(needle));
        self.eval(Self::select_buttons(&filter)).await
    }

    async fn find_by_class(&self, class: &str, scope: ClassScope) -> DomResult<Vec<ButtonHandle>> {
        let class = js_string(class);
        let filter = match scope {
            ClassScope::Button => format!("b.classList.contains({class})"),
            ClassScope::Descendant => {
                format!("b.querySelector('.' + CSS.escape({class})) !== null")
            }
        };
        self.eval(Self::select_buttons(&filter)).await
    }

    async fn container_buttons(&self, anchor: &ButtonHandle) -> DomResult<Vec<ButtonHandle>> {
        let script = format!(
            r#"(() => {{
    const snap = {SNAPSHOT_FN};
    const all = Array.from(document.querySelectorAll('button'));
    const anchor = all[{index}];
    if (!anchor || !anchor.parentElement) return [];
    return Array.from(anchor.parentElement.querySelectorAll('button')).map(b => snap(b, all));
}})()"#,
            index = anchor.index
        );
        self.eval(script).await
    }

    async fn click(&self, button: &ButtonHandle) -> DomResult<bool> {
        let script = format!(
            r#"(() => {{
    const b = document.querySelectorAll('button')[{index}];
    if (!b || (b.textContent || '') !== {text}) return false;
    b.click();
    return true;
}})()"#,
            index = button.index,
            text = js_string(&button.text)
        );
        self.eval(script).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn js_string_escapes_quotes_and_backslashes() {
        assert_eq!(js_string(r#"a"b\c"#), r#""a\"b\\c""#);
        assert_eq!(js_string("12:00～12:30"), "\"12:00～12:30\"");
    }

    #[test]
    fn select_buttons_embeds_filter_and_snapshot() {
        let script = CdpPage::select_buttons("b.disabled");
        assert!(script.contains("all.filter(b => b.disabled)"));
        assert!(script.contains("pointerEvents: s.pointerEvents"));
    }

    #[test]
    fn snapshot_json_deserialises_into_handle() {
        let raw = serde_json::json!({
            "index": 4,
            "text": " 12:00～12:30 ",
            "classes": ["btn", "bg-primary"],
            "disabled": false,
            "display": "block",
            "visibility": "visible",
            "pointerEvents": "auto"
        });
        let handle: ButtonHandle = serde_json::from_value(raw).expect("valid snapshot");
        assert_eq!(handle.index, 4);
        assert!(handle.has_class("bg-primary"));
        assert_eq!(handle.pointer_events, "auto");
        assert_eq!(handle.label(), "12:00～12:30");
    }
}
