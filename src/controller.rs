//! Lifecycle controller: owns the one active run
//!
//! # Single run
//!
//! At most one engine task exists per controller. `start` while a run is
//! active is ignored. `stop` is always safe and idempotent. The run state is
//! shared with the engine through a `parking_lot::Mutex` so `status()` is a
//! synchronous snapshot that never waits on the engine.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use futures::FutureExt;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::dom::{DomError, PageDom};
use crate::engine::{
    EngineContext, EngineTimings, EntryPoint, PollingEngine, RunConfig, RunState, StopReason,
};
use crate::intent::IntentStore;
use crate::utils::ConfigError;
use crate::utils::constants::STOP_GRACE;
use crate::{Settings, SiteProfile};

#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("Not a reservation page: {0}")]
    UnrecognizedPage(String),

    #[error("Page is not on the reservation site: {0}")]
    ForeignHost(String),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Could not read the page: {0}")]
    Dom(#[from] DomError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started { run_id: Uuid },
    /// A run was already active; nothing changed
    AlreadyRunning,
}

/// Point-in-time view of the controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineStatus {
    pub running: bool,
    #[serde(flatten)]
    pub state: RunState,
    pub run_id: Option<Uuid>,
    pub started_at: Option<DateTime<Utc>>,
}

/// The active (or most recent) run
struct EngineHandle {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    cancel: CancellationToken,
    task: Option<JoinHandle<StopReason>>,
}

pub struct LifecycleController {
    ctx: EngineContext,
    state: Arc<Mutex<RunState>>,
    engine: tokio::sync::Mutex<Option<EngineHandle>>,
}

impl LifecycleController {
    pub fn new(
        dom: Arc<dyn PageDom>,
        intent: Arc<dyn IntentStore>,
        site: SiteProfile,
        timings: EngineTimings,
    ) -> Self {
        Self {
            ctx: EngineContext {
                dom,
                intent,
                site,
                timings,
            },
            state: Arc::new(Mutex::new(RunState::Idle)),
            engine: tokio::sync::Mutex::new(None),
        }
    }

    /// Start a run on the current page unless one is already active.
    ///
    /// Consumes the cross-navigation intent flag before anything else.
    pub async fn start(&self, config: RunConfig) -> Result<StartOutcome, ControllerError> {
        let resume = self.take_intent().await;
        self.start_with(config, resume).await
    }

    /// Page-initialisation hook, called once per page load.
    ///
    /// The intent flag is read and cleared first, whatever happens next, so a
    /// stale flag can never leak into a later, unrelated load. A run starts
    /// when auto-run is on or the previous page asked for it.
    pub async fn on_page_load(
        &self,
        settings: &Settings,
    ) -> Result<Option<StartOutcome>, ControllerError> {
        let resume = self.take_intent().await;
        if !settings.auto_run && !resume {
            debug!("page loaded, auto-run is off and no submit is pending");
            return Ok(None);
        }
        let config = settings.run_config()?;
        self.start_with(config, resume).await.map(Some)
    }

    async fn start_with(
        &self,
        config: RunConfig,
        resume: bool,
    ) -> Result<StartOutcome, ControllerError> {
        let mut engine = self.engine.lock().await;
        if self.state.lock().is_running() {
            info!("a run is already active, ignoring start");
            return Ok(StartOutcome::AlreadyRunning);
        }

        let location = self.ctx.dom.location().await?;
        if !self.ctx.site.accepts_host(&location) {
            return Err(ControllerError::ForeignHost(location));
        }
        let phase = self.ctx.site.classify(&location);
        let Some(entry) = EntryPoint::from_phase(phase) else {
            return Err(ControllerError::UnrecognizedPage(location));
        };
        if resume {
            match entry {
                EntryPoint::Confirmation => info!("resuming submission after navigation"),
                EntryPoint::SlotSelection => {
                    debug!("submit intent was pending but this is the slot page")
                }
            }
        }

        let run_id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        *self.state.lock() = match entry {
            EntryPoint::SlotSelection => RunState::SearchingSlot,
            EntryPoint::Confirmation => RunState::ConfirmingSubmission,
        };

        let run = PollingEngine::new(
            self.ctx.clone(),
            config,
            self.state.clone(),
            cancel.clone(),
        );
        let span = info_span!("run", run_id = %run_id, ?entry);
        let state = self.state.clone();
        let task = tokio::spawn(
            async move {
                match AssertUnwindSafe(run.run(entry, location)).catch_unwind().await {
                    Ok(reason) => reason,
                    Err(_) => {
                        error!("run task panicked");
                        *state.lock() = RunState::Stopped(StopReason::Failed);
                        StopReason::Failed
                    }
                }
            }
            .instrument(span),
        );
        info!(%run_id, ?entry, "run started");

        *engine = Some(EngineHandle {
            run_id,
            started_at: Utc::now(),
            cancel,
            task: Some(task),
        });
        Ok(StartOutcome::Started { run_id })
    }

    /// Cancel the active run and wait for it to wind down. Safe to call at
    /// any time, any number of times.
    pub async fn stop(&self) {
        let mut engine = self.engine.lock().await;
        let Some(handle) = engine.as_mut() else {
            debug!("stop requested, nothing was ever started");
            return;
        };

        handle.cancel.cancel();
        if let Some(task) = handle.task.take() {
            let abort = task.abort_handle();
            match tokio::time::timeout(STOP_GRACE, task).await {
                Ok(Ok(reason)) => debug!(?reason, "run task finished"),
                Ok(Err(e)) => warn!("run task failed: {}", e),
                Err(_) => {
                    warn!("run did not stop within {:?}, aborting", STOP_GRACE);
                    abort.abort();
                }
            }
        }

        let mut state = self.state.lock();
        if state.is_running() {
            *state = RunState::Stopped(StopReason::Cancelled);
        }
        info!(run_id = %handle.run_id, state = ?*state, "stopped");
    }

    pub fn status(&self) -> EngineStatus {
        let state = *self.state.lock();
        let (run_id, started_at) = match self.engine.try_lock() {
            Ok(engine) => match engine.as_ref() {
                Some(handle) => (Some(handle.run_id), Some(handle.started_at)),
                None => (None, None),
            },
            // start/stop in progress; the run state alone is authoritative
            Err(_) => (None, None),
        };
        EngineStatus {
            running: state.is_running(),
            state,
            run_id,
            started_at,
        }
    }

    async fn take_intent(&self) -> bool {
        match self.ctx.intent.get_and_clear().await {
            Ok(flag) => flag,
            Err(e) => {
                warn!(error = %e, "could not read submit intent, assuming none");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::fake::{FakeButton, FakePage};
    use crate::intent::MemoryIntentStore;
    use std::time::Duration;

    const ENTRY: &str = "https://gundam-base-entry.net/event/7/entry";
    const CONFIRM: &str = "https://gundam-base-entry.net/event/7/entry/confirm";

    fn controller(page: Arc<FakePage>, intent: Arc<MemoryIntentStore>) -> LifecycleController {
        LifecycleController::new(page, intent, SiteProfile::default(), EngineTimings::default())
    }

    fn config() -> RunConfig {
        RunConfig::new(
            vec!["12:00～12:30".to_string()],
            Duration::from_secs(1),
            Duration::from_secs(180),
        )
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent() {
        let page = Arc::new(FakePage::new(ENTRY, vec![]));
        let c = controller(page, Arc::new(MemoryIntentStore::new()));

        c.stop().await;
        assert!(!c.status().running);
        c.stop().await;
        assert!(!c.status().running);

        c.start(config()).await.unwrap();
        assert!(c.status().running);
        c.stop().await;
        assert!(!c.status().running);
        c.stop().await;
        assert!(!c.status().running);
        assert_eq!(c.status().state, RunState::Stopped(StopReason::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_is_ignored() {
        let page = Arc::new(FakePage::new(ENTRY, vec![]));
        let c = controller(page, Arc::new(MemoryIntentStore::new()));

        let first = c.start(config()).await.unwrap();
        let second = c.start(config()).await.unwrap();

        let StartOutcome::Started { run_id } = first else {
            panic!("first start should start a run");
        };
        assert_eq!(second, StartOutcome::AlreadyRunning);
        assert_eq!(c.status().run_id, Some(run_id));
        c.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn no_tick_fires_after_stop() {
        let page = Arc::new(FakePage::new(
            ENTRY,
            vec![FakeButton::new("更新").icon("lucide-refresh-ccw")],
        ));
        let c = controller(page.clone(), Arc::new(MemoryIntentStore::new()));

        c.start(config()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        c.stop().await;
        let clicks_at_stop = page.clicks().len();
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(clicks_at_stop, 1);
        assert_eq!(page.clicks().len(), clicks_at_stop);
    }

    #[tokio::test(start_paused = true)]
    async fn unrecognized_or_foreign_pages_are_refused() {
        let page = Arc::new(FakePage::new("https://gundam-base-entry.net/mypage", vec![]));
        let c = controller(page.clone(), Arc::new(MemoryIntentStore::new()));
        assert!(matches!(
            c.start(config()).await,
            Err(ControllerError::UnrecognizedPage(_))
        ));

        page.navigate("https://example.com/entry", vec![]);
        assert!(matches!(
            c.start(config()).await,
            Err(ControllerError::ForeignHost(_))
        ));
        assert!(!c.status().running);
        assert_eq!(c.status().state, RunState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn run_completes_on_its_own_and_allows_a_new_start() {
        let page = Arc::new(FakePage::new(CONFIRM, vec![FakeButton::new("戻る")]));
        let c = controller(page, Arc::new(MemoryIntentStore::new()));

        c.start(config()).await.unwrap();
        assert_eq!(c.status().state, RunState::ConfirmingSubmission);
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(c.status().state, RunState::Stopped(StopReason::Exhausted));
        assert!(matches!(
            c.start(config()).await.unwrap(),
            StartOutcome::Started { .. }
        ));
        c.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn page_load_consumes_intent_even_when_auto_run_is_off() {
        let page = Arc::new(FakePage::new(
            CONFIRM,
            vec![FakeButton::new("申し込み").class("bg-primary")],
        ));
        let intent = Arc::new(MemoryIntentStore::new());
        let c = controller(page.clone(), intent.clone());
        let manual = Settings {
            auto_run: false,
            ..Settings::default()
        };

        // nothing pending: manual mode does nothing
        assert_eq!(c.on_page_load(&manual).await.unwrap(), None);
        assert!(page.clicks().is_empty());

        // the previous page clicked confirm: submit even in manual mode
        intent.set().await.unwrap();
        let outcome = c.on_page_load(&manual).await.unwrap();
        assert!(matches!(outcome, Some(StartOutcome::Started { .. })));
        assert!(!intent.is_set());
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(c.status().state, RunState::Stopped(StopReason::Submitted));
        assert_eq!(page.clicks(), vec!["申し込み"]);
    }

    #[tokio::test(start_paused = true)]
    async fn start_clears_a_stale_intent() {
        let page = Arc::new(FakePage::new(ENTRY, vec![]));
        let intent = Arc::new(MemoryIntentStore::new());
        intent.set().await.unwrap();
        let c = controller(page, intent.clone());

        c.start(config()).await.unwrap();

        assert!(!intent.is_set());
        assert_eq!(c.status().state, RunState::SearchingSlot);
        c.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn enormous_retry_interval_still_times_out() {
        let page = Arc::new(FakePage::new(ENTRY, vec![]));
        let c = controller(page, Arc::new(MemoryIntentStore::new()));
        let config = RunConfig::new(
            vec!["12:00～12:30".to_string()],
            Duration::from_secs(10u64.pow(19)),
            Duration::from_secs(180),
        )
        .unwrap();

        c.start(config).await.unwrap();
        tokio::time::sleep(Duration::from_secs(600)).await;

        let status = c.status();
        assert!(!status.running);
        assert_eq!(status.state, RunState::Stopped(StopReason::TimedOut));
    }

    /// Slot page whose DOM layer blows up once the run starts polling
    struct BrokenPage;

    #[async_trait::async_trait]
    impl PageDom for BrokenPage {
        async fn location(&self) -> crate::dom::DomResult<String> {
            Ok(ENTRY.to_string())
        }
        async fn find_by_text_substring(
            &self,
            _needle: &str,
        ) -> crate::dom::DomResult<Vec<crate::dom::ButtonHandle>> {
            panic!("renderer went away")
        }
        async fn find_by_class(
            &self,
            _class: &str,
            _scope: crate::dom::ClassScope,
        ) -> crate::dom::DomResult<Vec<crate::dom::ButtonHandle>> {
            panic!("renderer went away")
        }
        async fn container_buttons(
            &self,
            _anchor: &crate::dom::ButtonHandle,
        ) -> crate::dom::DomResult<Vec<crate::dom::ButtonHandle>> {
            Ok(Vec::new())
        }
        async fn click(&self, _button: &crate::dom::ButtonHandle) -> crate::dom::DomResult<bool> {
            Ok(false)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn crashed_run_is_reported_stopped_and_can_be_restarted() {
        let c = LifecycleController::new(
            Arc::new(BrokenPage),
            Arc::new(MemoryIntentStore::new()),
            SiteProfile::default(),
            EngineTimings::default(),
        );

        c.start(config()).await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;

        let status = c.status();
        assert!(!status.running);
        assert_eq!(status.state, RunState::Stopped(StopReason::Failed));
        assert!(matches!(
            c.start(config()).await.unwrap(),
            StartOutcome::Started { .. }
        ));
        c.stop().await;
    }

    #[test]
    fn status_serialises_flat() {
        let status = EngineStatus {
            running: false,
            state: RunState::Stopped(StopReason::Submitted),
            run_id: None,
            started_at: None,
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["running"], false);
        assert_eq!(json["state"], "stopped");
        assert_eq!(json["reason"], "submitted");
    }
}
