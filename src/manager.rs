//! Process-wide browser ownership
//!
//! One Chrome per process, launched lazily on first use and health-checked
//! on every access. A crashed browser is closed and relaunched transparently.
//!
//! The browser sits behind a `tokio::sync::Mutex` because every operation on
//! it awaits CDP round-trips while the lock is held.

use anyhow::{Context, Result};
use chromiumoxide::page::Page;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::BrowserConfig;
use crate::browser::{BrowserError, BrowserWrapper, first_page, launch_browser};

static GLOBAL_MANAGER: OnceLock<Arc<BrowserManager>> = OnceLock::new();

pub struct BrowserManager {
    browser: Mutex<Option<BrowserWrapper>>,
    current_page: Mutex<Option<Page>>,
}

impl BrowserManager {
    #[must_use]
    pub fn global() -> Arc<BrowserManager> {
        GLOBAL_MANAGER
            .get_or_init(|| {
                Arc::new(BrowserManager {
                    browser: Mutex::new(None),
                    current_page: Mutex::new(None),
                })
            })
            .clone()
    }

    /// Make sure a healthy browser is running, launching one if needed
    pub async fn ensure_running(&self, config: &BrowserConfig) -> Result<()> {
        let mut guard = self.browser.lock().await;

        if let Some(wrapper) = guard.as_ref() {
            match wrapper.browser().version().await {
                Ok(_) => {
                    debug!("browser health check passed");
                    return Ok(());
                }
                Err(e) => {
                    warn!("Browser health check failed: {}. Relaunching", e);
                    if let Some(mut crashed) = guard.take() {
                        let _ = crashed.browser_mut().close().await;
                        let _ = crashed.browser_mut().wait().await;
                        crashed.cleanup_temp_dir();
                    }
                    // pages of the dead browser are unusable
                    *self.current_page.lock().await = None;
                }
            }
        }

        *guard = Some(launch_browser(config).await?);
        Ok(())
    }

    /// The tab the autopilot drives. Reuses the first open tab of a freshly
    /// launched browser.
    pub async fn tab(&self, config: &BrowserConfig) -> Result<Page> {
        self.ensure_running(config).await?;
        if let Some(page) = self.current_page.lock().await.clone() {
            return Ok(page);
        }

        let guard = self.browser.lock().await;
        let wrapper = guard
            .as_ref()
            .ok_or_else(|| BrowserError::PageCreationFailed("browser not available".into()))?;
        let page = first_page(wrapper).await?;
        drop(guard);

        *self.current_page.lock().await = Some(page.clone());
        Ok(page)
    }

    /// Close every open tab and start over with a single blank one
    pub async fn new_tab(&self, config: &BrowserConfig) -> Result<Page> {
        self.ensure_running(config).await?;

        let guard = self.browser.lock().await;
        let wrapper = guard
            .as_ref()
            .ok_or_else(|| BrowserError::PageCreationFailed("browser not available".into()))?;
        if let Ok(existing) = wrapper.browser().pages().await {
            for page in existing {
                let _ = page.close().await;
            }
        }
        let page = wrapper
            .browser()
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::PageCreationFailed(e.to_string()))?;
        drop(guard);

        *self.current_page.lock().await = Some(page.clone());
        Ok(page)
    }

    /// Navigate `page` and wait for the load to finish
    pub async fn goto(&self, page: &Page, url: &str, timeout: Duration) -> Result<()> {
        info!(url, "navigating");
        tokio::time::timeout(timeout, page.goto(url))
            .await
            .map_err(|_| BrowserError::NavigationTimeout {
                url: url.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            })?
            .map_err(|e| BrowserError::NavigationFailed(e.to_string()))?;

        page.wait_for_navigation()
            .await
            .with_context(|| format!("Page did not finish loading: {url}"))?;
        Ok(())
    }

    /// Close Chrome, wait for the process to exit, then remove a temporary
    /// profile. Safe to call more than once.
    pub async fn shutdown(&self) -> Result<()> {
        *self.current_page.lock().await = None;
        let mut guard = self.browser.lock().await;

        if let Some(mut wrapper) = guard.take() {
            info!("Shutting down browser");
            if let Err(e) = wrapper.browser_mut().close().await {
                warn!("Failed to close browser cleanly: {}", e);
            }
            // the profile is still locked until the process is gone
            if let Err(e) = wrapper.browser_mut().wait().await {
                warn!("Failed to wait for browser exit: {}", e);
            }
            wrapper.cleanup_temp_dir();
        }
        Ok(())
    }
}
