//! Cross-navigation intent flag
//!
//! A single boolean that outlives a full page load: "the next page should go
//! straight to the submission click". It is set right before the click that
//! navigates and consumed first thing when the next page initialises.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use thiserror::Error;

use crate::dom::{CdpPage, DomError};

/// `sessionStorage` key holding the flag
pub const INTENT_KEY: &str = "reservation_autopilot.pending_submit";

#[derive(Error, Debug)]
pub enum IntentError {
    #[error("Intent storage unavailable: {0}")]
    Storage(String),
}

impl From<DomError> for IntentError {
    fn from(err: DomError) -> Self {
        IntentError::Storage(err.to_string())
    }
}

#[async_trait]
pub trait IntentStore: Send + Sync {
    async fn set(&self) -> Result<(), IntentError>;

    /// Read the flag and clear it in one step
    async fn get_and_clear(&self) -> Result<bool, IntentError>;
}

/// Flag kept in the tab's `sessionStorage`: survives reloads and navigations
/// within the tab, gone with the browser profile
pub struct SessionStorageIntentStore {
    page: CdpPage,
}

impl SessionStorageIntentStore {
    pub fn new(page: CdpPage) -> Self {
        Self { page }
    }
}

fn key_literal() -> String {
    serde_json::Value::String(INTENT_KEY.to_string()).to_string()
}

#[async_trait]
impl IntentStore for SessionStorageIntentStore {
    async fn set(&self) -> Result<(), IntentError> {
        let script = format!("(sessionStorage.setItem({}, '1'), true)", key_literal());
        let _: bool = self.page.eval(script).await?;
        Ok(())
    }

    async fn get_and_clear(&self) -> Result<bool, IntentError> {
        let script = format!(
            r#"(() => {{
    const key = {};
    const value = sessionStorage.getItem(key);
    sessionStorage.removeItem(key);
    return value === '1';
}})()"#,
            key_literal()
        );
        Ok(self.page.eval(script).await?)
    }
}

/// Process-local flag for embedding without a live tab, and for tests
#[derive(Debug, Default)]
pub struct MemoryIntentStore {
    flag: AtomicBool,
}

impl MemoryIntentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Peek without consuming
    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

#[async_trait]
impl IntentStore for MemoryIntentStore {
    async fn set(&self) -> Result<(), IntentError> {
        self.flag.store(true, Ordering::Release);
        Ok(())
    }

    async fn get_and_clear(&self) -> Result<bool, IntentError> {
        Ok(self.flag.swap(false, Ordering::AcqRel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn flag_is_consumed_exactly_once() {
        let store = MemoryIntentStore::new();
        assert!(!store.get_and_clear().await.unwrap());

        store.set().await.unwrap();
        assert!(store.is_set());
        assert!(store.get_and_clear().await.unwrap());
        assert!(!store.get_and_clear().await.unwrap());
    }

    #[test]
    fn key_literal_is_quoted() {
        assert_eq!(key_literal(), "\"reservation_autopilot.pending_submit\"");
    }
}
