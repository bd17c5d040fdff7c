use anyhow::{Context, Result};
use chromiumoxide::browser::{Browser, BrowserConfigBuilder, HeadlessMode};
use chromiumoxide::fetcher::{BrowserFetcher, BrowserFetcherOptions};
use futures::StreamExt;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;
use tokio::task::{self, JoinHandle};
use tracing::{debug, error, info, trace, warn};

use crate::BrowserConfig;
use crate::utils::constants::CHROME_USER_AGENT;

/// Flags for every launch. The first group hides automation from the site;
/// the second keeps page timers running at full rate in a background window.
const LAUNCH_ARGS: &[&str] = &[
    "--disable-blink-features=AutomationControlled",
    "--disable-infobars",
    "--no-first-run",
    "--no-default-browser-check",
    "--password-store=basic",
    "--use-mock-keychain",
    "--disable-notifications",
    "--disable-features=TranslateUI",
    "--disable-breakpad",
    "--disable-hang-monitor",
    "--disable-prompt-on-repost",
    "--disable-background-timer-throttling",
    "--disable-backgrounding-occluded-windows",
    "--disable-renderer-backgrounding",
    "--disable-ipc-flooding-protection",
];

/// Removes a freshly created profile directory if the launch fails.
/// Configured (persistent) profiles are never removed.
struct ProfileDirGuard {
    path: PathBuf,
    remove_on_drop: bool,
}

impl ProfileDirGuard {
    fn create(path: PathBuf, temporary: bool) -> Result<Self> {
        std::fs::create_dir_all(&path).context("Failed to create user data directory")?;
        Ok(Self {
            path,
            remove_on_drop: temporary,
        })
    }

    /// Launch succeeded; the browser wrapper owns the directory now
    fn disarm(mut self) {
        self.remove_on_drop = false;
    }
}

impl Drop for ProfileDirGuard {
    fn drop(&mut self) {
        if !self.remove_on_drop {
            return;
        }
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => info!("Cleaned up profile dir after launch failure: {}", self.path.display()),
            Err(e) => warn!("Failed to clean up profile dir {}: {}", self.path.display(), e),
        }
    }
}

/// Locate a local Chrome/Chromium: `CHROMIUM_PATH`, then the usual install
/// locations for the platform, then `which` on Unix.
pub async fn find_browser_executable() -> Result<PathBuf> {
    if let Some(path) = std::env::var_os("CHROMIUM_PATH").map(PathBuf::from) {
        if path.exists() {
            info!("Using browser from CHROMIUM_PATH: {}", path.display());
            return Ok(path);
        }
        warn!("CHROMIUM_PATH points to a missing file: {}", path.display());
    }

    if let Some(path) = install_locations().into_iter().find(|p| p.exists()) {
        info!("Found browser at: {}", path.display());
        return Ok(path);
    }

    if !cfg!(target_os = "windows")
        && let Some(path) = which_browser()
    {
        info!("Found browser on PATH: {}", path.display());
        return Ok(path);
    }

    warn!("No Chrome/Chromium executable found, a managed Chromium will be downloaded");
    Err(anyhow::anyhow!("Chrome/Chromium executable not found"))
}

fn install_locations() -> Vec<PathBuf> {
    let candidates: &[&str] = if cfg!(target_os = "windows") {
        &[
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"%LOCALAPPDATA%\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files\Chromium\Application\chrome.exe",
        ]
    } else if cfg!(target_os = "macos") {
        &[
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "~/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/opt/homebrew/bin/chromium",
        ]
    } else {
        &[
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/snap/bin/chromium",
            "/opt/google/chrome/chrome",
        ]
    };

    candidates
        .iter()
        .filter_map(|raw| {
            if let Some(rest) = raw.strip_prefix("~/") {
                dirs::home_dir().map(|home| home.join(rest))
            } else if raw.contains('%') {
                Some(PathBuf::from(expand_windows_env_vars(raw)))
            } else {
                Some(PathBuf::from(raw))
            }
        })
        .collect()
}

fn which_browser() -> Option<PathBuf> {
    ["chromium", "chromium-browser", "google-chrome", "chrome"]
        .iter()
        .filter_map(|cmd| Command::new("which").arg(cmd).output().ok())
        .filter(|output| output.status.success())
        .map(|output| String::from_utf8_lossy(&output.stdout).trim().to_string())
        .find(|path| !path.is_empty())
        .map(PathBuf::from)
}

/// Expand `%VAR%` tokens; unknown variables are kept verbatim
fn expand_windows_env_vars(path: &str) -> String {
    let mut result = String::with_capacity(path.len());
    let mut chars = path.chars();

    while let Some(ch) = chars.next() {
        if ch != '%' {
            result.push(ch);
            continue;
        }
        let name: String = chars.by_ref().take_while(|&c| c != '%').collect();
        if name.is_empty() {
            result.push('%');
        } else if let Ok(value) = std::env::var(&name) {
            result.push_str(&value);
        } else {
            result.push('%');
            result.push_str(&name);
            result.push('%');
        }
    }
    result
}

/// Fetch a Chromium build into the user cache, reusing an earlier download
pub async fn download_managed_browser() -> Result<PathBuf> {
    let cache_dir = dirs::cache_dir()
        .unwrap_or_else(|| std::env::temp_dir().join(".cache"))
        .join("reservation-autopilot/chromium");
    std::fs::create_dir_all(&cache_dir).context("Failed to create cache directory")?;
    info!("Fetching managed Chromium into {}", cache_dir.display());

    let fetcher = BrowserFetcher::new(
        BrowserFetcherOptions::builder()
            .with_path(&cache_dir)
            .build()
            .context("Failed to build fetcher options")?,
    );
    let revision = fetcher.fetch().await.context("Failed to fetch browser")?;

    info!("Managed Chromium ready at {}", revision.folder_path.display());
    Ok(revision.executable_path)
}

/// Find or download Chrome and start it with anti-automation flags.
///
/// `temporary` marks `user_data_dir` as throwaway: it is removed again if the
/// launch fails.
pub async fn launch_browser(
    config: &BrowserConfig,
    user_data_dir: PathBuf,
    temporary: bool,
) -> Result<(Browser, JoinHandle<()>)> {
    let chrome_path = match find_browser_executable().await {
        Ok(path) => path,
        Err(_) => download_managed_browser().await?,
    };

    let profile = ProfileDirGuard::create(user_data_dir, temporary)?;

    let mut config_builder = BrowserConfigBuilder::default()
        .request_timeout(Duration::from_secs(30))
        .window_size(config.window.width, config.window.height)
        .user_data_dir(profile.path.clone())
        .chrome_executable(chrome_path);

    if config.headless {
        config_builder = config_builder.headless_mode(HeadlessMode::default());
    } else {
        // the site is used while logged in; keep the window visible
        config_builder = config_builder.with_head();
    }

    config_builder = config_builder
        .arg(format!("--user-agent={}", CHROME_USER_AGENT))
        .args(LAUNCH_ARGS.iter().copied());

    if config.disable_security {
        info!("WARNING: Disabling browser security features (disable_security=true)");
        config_builder = config_builder
            .arg("--disable-web-security")
            .arg("--disable-features=IsolateOrigins,site-per-process")
            .arg("--ignore-certificate-errors");
    }

    if should_disable_sandbox() || config.disable_security {
        info!("Disabling the Chrome sandbox");
        config_builder = config_builder
            .arg("--no-sandbox")
            .arg("--disable-setuid-sandbox");
    }

    let browser_config = config_builder
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build browser config: {e}"))?;

    debug!("Launching browser with config: {:?}", browser_config);
    let (browser, mut handler) = Browser::launch(browser_config)
        .await
        .context("Failed to launch browser")?;

    let handler_task = task::spawn(async move {
        while let Some(h) = handler.next().await {
            if let Err(e) = h {
                let error_msg = e.to_string();
                // CDP events newer than chromiumoxide's protocol types fail to deserialize
                if is_unknown_cdp_message(&error_msg) {
                    trace!("Ignored unknown CDP message: {}", error_msg);
                } else {
                    error!("Browser handler error: {:?}", e);
                }
            }
        }
        info!("Browser handler task completed");
    });

    profile.disarm();
    Ok((browser, handler_task))
}

fn is_unknown_cdp_message(error: &str) -> bool {
    error.contains("data did not match any variant of untagged enum Message")
        || error.contains("Failed to deserialize WS response")
}

/// setuid sandboxing does not work inside containers
fn should_disable_sandbox() -> bool {
    std::path::Path::new("/.dockerenv").exists()
        || std::env::var("container").is_ok()
        || std::env::var("KUBERNETES_SERVICE_HOST").is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_env_tokens_expand() {
        let path = std::env::var("PATH").unwrap();
        assert_eq!(
            expand_windows_env_vars(r"%PATH%\chrome.exe"),
            format!(r"{path}\chrome.exe")
        );
        assert_eq!(expand_windows_env_vars("%NO_SUCH_VAR_HERE%/x"), "%NO_SUCH_VAR_HERE%/x");
        assert_eq!(expand_windows_env_vars("100%%"), "100%");
    }

    #[test]
    fn unknown_cdp_messages_are_recognised() {
        assert!(is_unknown_cdp_message(
            "data did not match any variant of untagged enum Message"
        ));
        assert!(!is_unknown_cdp_message("connection closed"));
    }

    #[test]
    fn failed_launch_removes_a_temporary_profile_only() {
        let root = tempfile::tempdir().unwrap();
        let temp = root.path().join("temp");
        let kept = root.path().join("kept");

        drop(ProfileDirGuard::create(temp.clone(), true).unwrap());
        drop(ProfileDirGuard::create(kept.clone(), false).unwrap());

        assert!(!temp.exists());
        assert!(kept.exists());
    }
}
