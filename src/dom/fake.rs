//! In-memory `PageDom` for engine and controller tests

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{ButtonHandle, ClassScope, DomError, DomResult, PageDom};

#[derive(Debug, Clone)]
pub(crate) struct FakeButton {
    text: String,
    classes: Vec<String>,
    icon_classes: Vec<String>,
    disabled: bool,
    display: String,
    visibility: String,
    pointer_events: String,
    container: usize,
}

impl FakeButton {
    pub(crate) fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            classes: Vec::new(),
            icon_classes: Vec::new(),
            disabled: false,
            display: "inline-block".to_string(),
            visibility: "visible".to_string(),
            pointer_events: "auto".to_string(),
            container: 0,
        }
    }

    pub(crate) fn in_container(mut self, container: usize) -> Self {
        self.container = container;
        self
    }

    pub(crate) fn class(mut self, class: &str) -> Self {
        self.classes.push(class.to_string());
        self
    }

    pub(crate) fn icon(mut self, class: &str) -> Self {
        self.icon_classes.push(class.to_string());
        self
    }

    pub(crate) fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    pub(crate) fn display_none(mut self) -> Self {
        self.display = "none".to_string();
        self
    }

    pub(crate) fn hidden(mut self) -> Self {
        self.visibility = "hidden".to_string();
        self
    }

    pub(crate) fn no_pointer(mut self) -> Self {
        self.pointer_events = "none".to_string();
        self
    }

    fn snapshot(&self, index: usize) -> ButtonHandle {
        ButtonHandle {
            index,
            text: self.text.clone(),
            classes: self.classes.clone(),
            disabled: self.disabled,
            display: self.display.clone(),
            visibility: self.visibility.clone(),
            pointer_events: self.pointer_events.clone(),
        }
    }
}

/// What happens to the page when a button whose text contains the hook's needle is clicked
#[derive(Debug, Clone)]
pub(crate) enum OnClick {
    Navigate { url: String, buttons: Vec<FakeButton> },
    /// The click lands and navigates, but the evaluation reporting it fails
    /// because its execution context is torn down
    NavigateAndLoseContext { url: String, buttons: Vec<FakeButton> },
    /// The evaluation fails before anything is clicked
    Fail,
}

#[derive(Default)]
struct FakeState {
    url: String,
    buttons: Vec<FakeButton>,
    clicks: Vec<String>,
    hooks: Vec<(String, OnClick)>,
}

#[derive(Default)]
pub(crate) struct FakePage {
    state: Mutex<FakeState>,
}

impl FakePage {
    pub(crate) fn new(url: &str, buttons: Vec<FakeButton>) -> Self {
        Self {
            state: Mutex::new(FakeState {
                url: url.to_string(),
                buttons,
                ..FakeState::default()
            }),
        }
    }

    pub(crate) fn navigate(&self, url: &str, buttons: Vec<FakeButton>) {
        let mut state = self.state.lock();
        state.url = url.to_string();
        state.buttons = buttons;
    }

    pub(crate) fn on_click(&self, needle: &str, action: OnClick) {
        self.state.lock().hooks.push((needle.to_string(), action));
    }

    /// Text of every clicked button, in click order
    pub(crate) fn clicks(&self) -> Vec<String> {
        self.state.lock().clicks.clone()
    }

    pub(crate) fn clicks_containing(&self, needle: &str) -> usize {
        self.state
            .lock()
            .clicks
            .iter()
            .filter(|text| text.contains(needle))
            .count()
    }

    fn select(&self, keep: impl Fn(&FakeButton) -> bool) -> Vec<ButtonHandle> {
        self.state
            .lock()
            .buttons
            .iter()
            .enumerate()
            .filter(|(_, b)| keep(b))
            .map(|(i, b)| b.snapshot(i))
            .collect()
    }
}

#[async_trait]
impl PageDom for FakePage {
    async fn location(&self) -> DomResult<String> {
        Ok(self.state.lock().url.clone())
    }

    async fn find_by_text_substring(&self, needle: &str) -> DomResult<Vec<ButtonHandle>> {
        Ok(self.select(|b| b.text.contains(needle)))
    }

    async fn find_by_class(&self, class: &str, scope: ClassScope) -> DomResult<Vec<ButtonHandle>> {
        Ok(self.select(|b| match scope {
            ClassScope::Button => b.classes.iter().any(|c| c == class),
            ClassScope::Descendant => b.icon_classes.iter().any(|c| c == class),
        }))
    }

    async fn container_buttons(&self, anchor: &ButtonHandle) -> DomResult<Vec<ButtonHandle>> {
        let container = match self.state.lock().buttons.get(anchor.index) {
            Some(b) => b.container,
            None => return Ok(Vec::new()),
        };
        Ok(self.select(|b| b.container == container))
    }

    async fn click(&self, button: &ButtonHandle) -> DomResult<bool> {
        let mut state = self.state.lock();
        let matches = state
            .buttons
            .get(button.index)
            .is_some_and(|b| b.text == button.text);
        if !matches {
            return Ok(false);
        }

        let hook = state
            .hooks
            .iter()
            .find(|(needle, _)| button.text.contains(needle.as_str()))
            .map(|(_, action)| action.clone());
        match hook {
            Some(OnClick::Fail) => {
                return Err(DomError::EvaluationFailed("Target closed".to_string()));
            }
            Some(OnClick::Navigate { url, buttons }) => {
                state.clicks.push(button.text.clone());
                state.url = url;
                state.buttons = buttons;
            }
            Some(OnClick::NavigateAndLoseContext { url, buttons }) => {
                state.clicks.push(button.text.clone());
                state.url = url;
                state.buttons = buttons;
                return Err(DomError::EvaluationFailed(
                    "Execution context was destroyed".to_string(),
                ));
            }
            None => state.clicks.push(button.text.clone()),
        }
        Ok(true)
    }
}
