//! Page-load hook: the equivalent of a content script running on every load

use std::sync::Arc;

use futures::{Stream, StreamExt};
use tracing::{debug, info, warn};

use crate::controller::{ControllerError, LifecycleController, StartOutcome};
use crate::store::SettingsStore;
use crate::Settings;

/// Call `on_page_load` once per item of `loads` until the stream ends.
///
/// Settings are re-read on every load. An unreadable settings file disables
/// auto-run for that load, but a pending submission is still resumed.
pub async fn watch_page_loads<S>(loads: S, controller: Arc<LifecycleController>, store: SettingsStore)
where
    S: Stream,
{
    let mut loads = std::pin::pin!(loads);
    while loads.next().await.is_some() {
        let settings = match store.load() {
            Ok(settings) => settings,
            Err(e) => {
                warn!(error = %e, path = %store.path().display(), "could not read settings, auto-run is off for this page");
                Settings {
                    auto_run: false,
                    ..Settings::default()
                }
            }
        };

        match controller.on_page_load(&settings).await {
            Ok(Some(StartOutcome::Started { run_id })) => info!(%run_id, "run started on page load"),
            Ok(Some(StartOutcome::AlreadyRunning)) => debug!("page loaded while a run is active"),
            Ok(None) => {}
            Err(ControllerError::UnrecognizedPage(location) | ControllerError::ForeignHost(location)) => {
                debug!(%location, "not a reservation page")
            }
            Err(e) => warn!(error = %e, "could not start on page load"),
        }
    }
    debug!("page-load events ended");
}
