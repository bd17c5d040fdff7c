// Reservation autopilot
//
// Launches Chrome, watches the reservation tab for page loads and serves the
// JSON command channel on stdin/stdout until EOF or Ctrl-C.

use anyhow::{Context, Result};
use chromiumoxide_cdp::cdp::browser_protocol::page::EventLoadEventFired;
use std::sync::Arc;
use tokio::io::BufReader;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use kodegen_tools_reservation::dom::CdpPage;
use kodegen_tools_reservation::intent::SessionStorageIntentStore;
use kodegen_tools_reservation::{
    BrowserManager, LifecycleController, SettingsStore, serve_lines, watch_page_loads,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let store = SettingsStore::from_env();
    let settings = store
        .load()
        .with_context(|| format!("Failed to load settings from {}", store.path().display()))?;
    settings.validate()?;
    info!(path = %store.path().display(), "settings loaded");

    let manager = BrowserManager::global();
    let page = if settings.start_url.is_some() {
        manager.new_tab(&settings.browser).await?
    } else {
        manager.tab(&settings.browser).await?
    };

    // subscribe before navigating so the first load is not missed
    let loads = page
        .event_listener::<EventLoadEventFired>()
        .await
        .context("Failed to subscribe to page load events")?;

    let cdp = CdpPage::new(page.clone());
    let controller = Arc::new(LifecycleController::new(
        Arc::new(cdp.clone()),
        Arc::new(SessionStorageIntentStore::new(cdp)),
        settings.site.clone(),
        settings.timings.clone(),
    ));
    let watcher = tokio::spawn(watch_page_loads(loads, controller.clone(), store.clone()));

    if let Some(url) = &settings.start_url {
        let timeout = settings.navigation_timeout()?;
        if let Err(e) = manager.goto(&page, url, timeout).await {
            warn!("Could not open start page: {:#}", e);
        }
    }

    info!("ready; send JSON commands on stdin (runNow, stop, getStatus)");
    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();
    tokio::select! {
        served = serve_lines(stdin, stdout, &controller, &store) => {
            if let Err(e) = served {
                warn!("command channel failed: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
    }

    controller.stop().await;
    watcher.abort();
    manager.shutdown().await?;
    info!("bye");
    Ok(())
}
