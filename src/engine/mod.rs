//! Polling engine: the reservation state machine
//!
//! One run is one async task driven by a single `select!` loop per phase.
//! Each timer of the phase is a branch of that loop, so leaving a phase drops
//! every timer it armed in one step, and a cancelled or deadline-expired run
//! cannot tick again. A reload/search tick in flight is a boxed future owned
//! by the loop. It is dropped, mid-delay if need be, the moment the
//! navigation watch sees the confirmation page.
//!
//! Phase flow:
//!
//! ```text
//! SearchingSlot --confirm clicked--> AwaitingTransition --next tick--> SearchingSlot
//!       |                                   |
//!       +------ location is /confirm -------+--> (settle) --> ConfirmingSubmission
//!       |                                   |                        |
//!       +---------- deadline / stop --------+----> Stopped <---------+
//! ```

mod timings;

pub use timings::EngineTimings;

use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, OptionFuture};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::{self, Instant, MissedTickBehavior, Sleep};
use tokio_util::sync::CancellationToken;
use tracing::{Level, debug, info, warn};

use crate::SiteProfile;
use crate::dom::{ButtonHandle, ClassScope, DomResult, PageDom};
use crate::intent::IntentStore;
use crate::locator::{attempt_click, is_interactable};
use crate::phase::Phase;
use crate::slot_search::{SlotMatch, find_alternative, find_preferred_slot};
use crate::utils::ConfigError;
use crate::utils::constants::{MAX_RETRY_INTERVAL, MIN_RETRY_INTERVAL};

/// Parameters of one run, fixed for its lifetime
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    target_times: Vec<String>,
    retry_interval: Duration,
    max_duration: Duration,
}

impl RunConfig {
    /// `target_times` is the priority list, most preferred first, and must not be empty
    pub fn new(
        target_times: Vec<String>,
        retry_interval: Duration,
        max_duration: Duration,
    ) -> Result<Self, ConfigError> {
        if target_times.is_empty() {
            return Err(ConfigError::NoTargetTimes);
        }
        Ok(Self {
            target_times,
            retry_interval,
            max_duration,
        })
    }

    pub fn target_times(&self) -> &[String] {
        &self.target_times
    }

    pub fn retry_interval(&self) -> Duration {
        self.retry_interval
    }

    pub fn max_duration(&self) -> Duration {
        self.max_duration
    }
}

/// Why a run ended. None of these is an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The submission button was clicked
    Submitted,
    /// The maximum run time passed without reaching the confirmation page
    TimedOut,
    /// The confirmation page never offered a submission button
    Exhausted,
    /// Stopped on request
    Cancelled,
    /// The run task ended abnormally
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum RunState {
    #[default]
    Idle,
    SearchingSlot,
    AwaitingTransition,
    ConfirmingSubmission,
    Stopped(StopReason),
}

impl RunState {
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            RunState::SearchingSlot | RunState::AwaitingTransition | RunState::ConfirmingSubmission
        )
    }
}

/// The phase a run begins in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryPoint {
    SlotSelection,
    Confirmation,
}

impl EntryPoint {
    pub fn from_phase(phase: Phase) -> Option<Self> {
        match phase {
            Phase::SlotSelection => Some(EntryPoint::SlotSelection),
            Phase::Confirmation => Some(EntryPoint::Confirmation),
            Phase::Other => None,
        }
    }
}

/// Collaborators shared by every run started from the same controller
#[derive(Clone)]
pub struct EngineContext {
    pub dom: Arc<dyn PageDom>,
    pub intent: Arc<dyn IntentStore>,
    pub site: SiteProfile,
    pub timings: EngineTimings,
}

enum SearchExit {
    Transition,
    Stopped(StopReason),
}

pub struct PollingEngine {
    ctx: EngineContext,
    config: RunConfig,
    state: Arc<Mutex<RunState>>,
    cancel: CancellationToken,
}

impl PollingEngine {
    pub fn new(
        ctx: EngineContext,
        config: RunConfig,
        state: Arc<Mutex<RunState>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            ctx,
            config,
            state,
            cancel,
        }
    }

    /// Drive the run to a terminal state and record it
    pub async fn run(self, entry: EntryPoint, location: String) -> StopReason {
        let reason = match entry {
            EntryPoint::SlotSelection => self.run_from_slot_selection(location).await,
            EntryPoint::Confirmation => self.confirm_submission().await,
        };
        info!(?reason, "run finished");
        *self.state.lock() = RunState::Stopped(reason);
        reason
    }

    fn set_state(&self, next: RunState) {
        if self.cancel.is_cancelled() {
            return;
        }
        let mut state = self.state.lock();
        if *state != next {
            debug!(from = ?*state, to = ?next, "state change");
            *state = next;
        }
    }

    async fn run_from_slot_selection(&self, location: String) -> StopReason {
        let deadline = time::sleep(self.config.max_duration);
        tokio::pin!(deadline);

        match self.search_slots(location, deadline.as_mut()).await {
            SearchExit::Transition => {}
            SearchExit::Stopped(reason) => return reason,
        }

        self.consume_intent().await;
        self.set_state(RunState::AwaitingTransition);
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return StopReason::Cancelled,
            _ = &mut deadline => {
                info!("maximum run time reached before the confirmation page settled");
                return StopReason::TimedOut;
            }
            _ = time::sleep(self.ctx.timings.transition_settle()) => {}
        }

        self.confirm_submission().await
    }

    async fn search_slots(&self, location: String, mut deadline: std::pin::Pin<&mut Sleep>) -> SearchExit {
        self.set_state(RunState::SearchingSlot);
        info!(
            targets = ?self.config.target_times,
            retry_ms = self.config.retry_interval.as_millis() as u64,
            max_ms = self.config.max_duration.as_millis() as u64,
            "searching for a slot"
        );

        let period = self
            .config
            .retry_interval
            .clamp(MIN_RETRY_INTERVAL, MAX_RETRY_INTERVAL);
        let mut reload = time::interval_at(Instant::now() + period, period);
        reload.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut watch = time::interval(self.ctx.timings.nav_watch());
        watch.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut last_location = location;
        let mut tick_no: u64 = 0;
        let mut in_flight: Option<BoxFuture<'_, ()>> = None;

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return SearchExit::Stopped(StopReason::Cancelled),
                _ = &mut deadline => {
                    info!(ticks = tick_no, "maximum run time reached without securing a slot");
                    return SearchExit::Stopped(StopReason::TimedOut);
                }
                _ = watch.tick() => {
                    if self.moved_to_confirmation(&mut last_location).await {
                        info!(location = %last_location, "confirmation page reached");
                        return SearchExit::Transition;
                    }
                }
                Some(()) = OptionFuture::from(in_flight.as_mut()), if in_flight.is_some() => {
                    in_flight = None;
                }
                _ = reload.tick() => {
                    if in_flight.is_some() {
                        debug!(tick = tick_no, "previous tick still running, skipping this period");
                    } else {
                        tick_no += 1;
                        self.set_state(RunState::SearchingSlot);
                        in_flight = Some(Box::pin(self.search_tick(tick_no)));
                    }
                }
            }
        }
    }

    /// True when the location changed since the last look and is now the
    /// confirmation page
    async fn moved_to_confirmation(&self, last_location: &mut String) -> bool {
        let current = match self.ctx.dom.location().await {
            Ok(current) => current,
            Err(e) => {
                debug!(error = %e, "could not read location");
                return false;
            }
        };
        if current == *last_location {
            return false;
        }
        debug!(from = %last_location, to = %current, "location changed");
        *last_location = current;
        self.ctx.site.classify(last_location) == Phase::Confirmation
    }

    /// One reload/search/click cycle on the slot page
    async fn search_tick(&self, tick: u64) {
        debug!(tick, "retry tick");
        self.press_reload().await;
        time::sleep(self.ctx.timings.reload_settle()).await;

        let dom = &*self.ctx.dom;
        let found = match find_preferred_slot(dom, &self.config.target_times).await {
            Ok(Some(found)) => found,
            Ok(None) => {
                debug!(tick, "no target slot button on the page");
                return;
            }
            Err(e) => {
                warn!(tick, error = %e, "slot search failed");
                return;
            }
        };

        match self.click_slot(&found).await {
            Ok(true) => {}
            Ok(false) => {
                info!(label = %found.label, "no clickable slot at or after the preferred time");
                return;
            }
            Err(e) => {
                warn!(tick, error = %e, "slot click failed");
                return;
            }
        }

        time::sleep(self.ctx.timings.confirm_settle()).await;
        self.press_confirm().await;
    }

    /// The page's reload control is an icon button; pages without one are fine
    async fn press_reload(&self) {
        let dom = &*self.ctx.dom;
        match dom
            .find_by_class(&self.ctx.site.refresh_icon_class, ClassScope::Descendant)
            .await
        {
            Ok(buttons) => match buttons.first() {
                Some(reload) => {
                    if let Err(e) = dom.click(reload).await {
                        debug!(error = %e, "reload click failed");
                    }
                }
                None => debug!("no reload control on the page"),
            },
            Err(e) => debug!(error = %e, "reload control lookup failed"),
        }
    }

    async fn click_slot(&self, found: &SlotMatch) -> DomResult<bool> {
        let dom = &*self.ctx.dom;
        if attempt_click(dom, &found.button).await? {
            info!(label = %found.label, "clicked preferred slot");
            return Ok(true);
        }
        if let Some(alternative) = find_alternative(dom, &found.button).await? {
            info!(
                label = %found.label,
                alternative = %alternative.label(),
                "preferred slot unavailable, clicked the next later slot"
            );
            return Ok(true);
        }
        Ok(false)
    }

    /// Click the slot page's confirm button. The flag goes up first: the
    /// click is what navigates.
    async fn press_confirm(&self) {
        let dom = &*self.ctx.dom;
        let confirm = match dom.find_by_text_substring(&self.ctx.site.confirm_label).await {
            Ok(buttons) => buttons.into_iter().next(),
            Err(e) => {
                warn!(error = %e, "confirm button lookup failed");
                return;
            }
        };
        let Some(confirm) = confirm else {
            debug!("confirm button not on the page");
            return;
        };

        if let Err(e) = self.ctx.intent.set().await {
            warn!(error = %e, "could not record submit intent");
        }
        match dom.click(&confirm).await {
            Ok(true) => {
                info!("confirm clicked, waiting for the confirmation page");
                self.set_state(RunState::AwaitingTransition);
            }
            Ok(false) => debug!("confirm button changed before the click"),
            // a navigating click can take the evaluation's context down with it;
            // the navigation watch decides whether it landed
            Err(e) => {
                warn!(error = %e, "confirm click unconfirmed, watching for the confirmation page");
                self.set_state(RunState::AwaitingTransition);
            }
        }
    }

    async fn consume_intent(&self) {
        if let Err(e) = self.ctx.intent.get_and_clear().await {
            warn!(error = %e, "could not clear submit intent");
        }
    }

    /// Bounded retry loop on the confirmation page
    async fn confirm_submission(&self) -> StopReason {
        self.set_state(RunState::ConfirmingSubmission);
        let max_attempts = self.ctx.timings.submit_max_attempts;
        let period = self.ctx.timings.submit_retry();
        let mut retry = time::interval_at(Instant::now() + period, period);

        for attempt in 1..=max_attempts {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return StopReason::Cancelled,
                _ = retry.tick() => {}
            }
            debug!(attempt, max_attempts, "looking for the submit button");

            let submitted = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return StopReason::Cancelled,
                submitted = self.submit_attempt(attempt) => submitted,
            };
            if submitted {
                return StopReason::Submitted;
            }
        }

        warn!(attempts = max_attempts, "submit button never became available, giving up");
        StopReason::Exhausted
    }

    async fn submit_attempt(&self, attempt: u32) -> bool {
        let button = match self.find_submit_button(attempt == 1).await {
            Ok(Some(button)) => button,
            Ok(None) => {
                debug!(attempt, "submit button not available yet");
                return false;
            }
            Err(e) => {
                warn!(attempt, error = %e, "submit button lookup failed");
                return false;
            }
        };
        let before = self.ctx.dom.location().await.ok();
        match self.ctx.dom.click(&button).await {
            Ok(true) => {
                info!(button = %button.label(), attempt, "submission clicked");
                true
            }
            Ok(false) => {
                debug!(attempt, "submit button changed before the click");
                false
            }
            Err(e) => {
                // Retrying after a click that did navigate would press whatever
                // primary button the next page has
                let after = self.ctx.dom.location().await.ok();
                if after.is_none() || after != before {
                    info!(
                        button = %button.label(),
                        attempt,
                        error = %e,
                        "page left during the submit click, treating it as submitted"
                    );
                    true
                } else {
                    warn!(attempt, error = %e, "submit click failed");
                    false
                }
            }
        }
    }

    /// First interactable button that mentions the submit phrase or carries
    /// the primary-action class, in DOM order
    async fn find_submit_button(&self, list_page: bool) -> DomResult<Option<ButtonHandle>> {
        let dom = &*self.ctx.dom;
        let site = &self.ctx.site;

        if list_page && tracing::enabled!(Level::DEBUG) {
            let all = dom.find_by_text_substring("").await?;
            debug!(count = all.len(), "buttons on the confirmation page");
            for button in &all {
                debug!(index = button.index, text = %button.label(), disabled = button.disabled);
            }
        }

        let mut candidates = dom.find_by_text_substring(&site.submit_phrase).await?;
        candidates.extend(dom.find_by_class(&site.primary_class, ClassScope::Button).await?);
        candidates.sort_by_key(|b| b.index);
        candidates.dedup_by_key(|b| b.index);

        Ok(candidates.into_iter().find(|b| is_interactable(Some(b))))
    }
}
