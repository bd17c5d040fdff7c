//! Browser lifecycle: launch, page access, cleanup
//!
//! The CDP handler must be polled for the browser to respond at all, so it
//! runs on its own task for as long as the wrapper lives.

use anyhow::{Context, Result};
use chromiumoxide::browser::Browser;
use chromiumoxide::page::Page;
use std::path::PathBuf;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::BrowserConfig;

/// Browser plus its event handler task
///
/// Dropping the wrapper aborts the handler. It does not close Chrome; use
/// `BrowserManager::shutdown()` for that.
pub struct BrowserWrapper {
    browser: Browser,
    handler: JoinHandle<()>,
    /// Set only for throwaway profiles, which are deleted on shutdown
    temp_profile: Option<PathBuf>,
}

impl BrowserWrapper {
    pub(crate) fn new(browser: Browser, handler: JoinHandle<()>, temp_profile: Option<PathBuf>) -> Self {
        Self {
            browser,
            handler,
            temp_profile,
        }
    }

    pub(crate) fn browser(&self) -> &Browser {
        &self.browser
    }

    pub(crate) fn browser_mut(&mut self) -> &mut Browser {
        &mut self.browser
    }

    /// Remove a temporary profile directory.
    ///
    /// Call only after `browser.wait()`: Chrome must have released its files.
    /// A configured profile directory is left alone.
    pub fn cleanup_temp_dir(&mut self) {
        if let Some(path) = self.temp_profile.take() {
            info!("Removing temporary profile: {}", path.display());
            if let Err(e) = std::fs::remove_dir_all(&path) {
                warn!(
                    "Failed to remove temporary profile {}: {}. Manual cleanup may be required.",
                    path.display(),
                    e
                );
            }
        }
    }
}

impl Drop for BrowserWrapper {
    fn drop(&mut self) {
        self.handler.abort();
        if let Some(path) = &self.temp_profile {
            warn!(
                "Browser dropped without shutdown, temporary profile left behind: {}",
                path.display()
            );
        }
    }
}

/// Launch Chrome for the autopilot.
///
/// With `profile_dir` configured the session (cookies, logins) persists
/// across restarts. Otherwise a per-process temporary profile is used.
pub async fn launch_browser(config: &BrowserConfig) -> Result<BrowserWrapper> {
    let (user_data_dir, temp_profile) = match &config.profile_dir {
        Some(dir) => (dir.clone(), None),
        None => {
            let dir = std::env::temp_dir()
                .join(format!("reservation_autopilot_{}", std::process::id()));
            (dir.clone(), Some(dir))
        }
    };
    info!(
        profile = %user_data_dir.display(),
        persistent = temp_profile.is_none(),
        "launching browser"
    );

    let (browser, handler) =
        crate::browser_setup::launch_browser(config, user_data_dir, temp_profile.is_some()).await?;

    Ok(BrowserWrapper::new(browser, handler, temp_profile))
}

/// The tab to drive: the first open page, or a new blank one
pub async fn first_page(wrapper: &BrowserWrapper) -> Result<Page> {
    let pages = wrapper
        .browser()
        .pages()
        .await
        .context("Failed to get browser pages")?;

    if let Some(page) = pages.into_iter().next() {
        return Ok(page);
    }
    let page = wrapper
        .browser()
        .new_page("about:blank")
        .await
        .context("Failed to create blank page")?;
    info!("Opened a blank tab");
    Ok(page)
}
