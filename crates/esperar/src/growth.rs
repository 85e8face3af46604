//! Growth detection for lazily loaded content.
//!
//! A [`GrowthDetector`] counts something on the page (rows, cards, list
//! items) and waits for the count to rise above a baseline captured before a
//! trigger such as scrolling to the bottom.
//!
//! ```ignore
//! let rows = GrowthDetector::rows("tbody tr.data-row")
//!     .with_loading_indicator(Selector::class("loading-indicator"), 2_000);
//! let grown = rows.grow_after(&page, &poller, &scroll_to_bottom()).await?;
//! assert!(grown.value().is_some_and(|n| n > 10));
//! ```

use crate::action::Action;
use crate::condition::{visible, Condition, ConditionError, Count, Evaluation};
use crate::page::{PageQuery, Snapshot};
use crate::result::EsperarResult;
use crate::selector::Selector;
use crate::wait::{Poller, WaitOutcome};
use async_trait::async_trait;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, trace};

/// Counter over `find_all` matches
pub type RowCounter = Count;

/// Baseline and high-water mark of one growth wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrowthState {
    baseline: usize,
    observed: usize,
}

impl GrowthState {
    /// Start tracking from `baseline`
    #[must_use]
    pub const fn new(baseline: usize) -> Self {
        Self {
            baseline,
            observed: baseline,
        }
    }

    /// Record one poll's count.
    ///
    /// `observed` never decreases; a lower count leaves it untouched.
    pub fn record(&mut self, count: usize) {
        if count < self.observed {
            debug!(count, observed = self.observed, "count decreased between polls");
        }
        self.observed = self.observed.max(count);
    }

    /// Whether the count has risen above the baseline
    #[must_use]
    pub const fn has_grown(&self) -> bool {
        self.observed > self.baseline
    }

    /// Count captured before the trigger
    #[must_use]
    pub const fn baseline(&self) -> usize {
        self.baseline
    }

    /// Highest count seen so far
    #[must_use]
    pub const fn observed(&self) -> usize {
        self.observed
    }
}

/// Condition satisfied once a counter exceeds its baseline
struct Grown<'c, C> {
    counter: &'c C,
    state: Mutex<GrowthState>,
}

#[async_trait]
impl<'c, C: Condition<Output = usize>> Condition for Grown<'c, C> {
    type Output = usize;

    async fn evaluate(&self, snapshot: &Snapshot<'_>) -> Evaluation<usize> {
        let count = self.counter.evaluate(snapshot).await?;
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.record(count);
        trace!(count, observed = state.observed(), baseline = state.baseline(), "growth poll");
        if state.has_grown() {
            Ok(state.observed())
        } else {
            Err(ConditionError::not_yet(format!(
                "{count} (baseline {})",
                state.baseline()
            )))
        }
    }

    fn description(&self) -> String {
        let baseline = self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .baseline();
        format!("{} to exceed {baseline}", self.counter.description())
    }
}

/// Waits for a count to grow past a baseline
#[derive(Debug, Clone)]
pub struct GrowthDetector<C> {
    counter: C,
    indicator: Option<(Selector, Duration)>,
}

impl GrowthDetector<RowCounter> {
    /// Count matches of `selector`
    pub fn rows(selector: impl Into<Selector>) -> Self {
        Self::new(Count(selector.into()))
    }
}

impl<C: Condition<Output = usize>> GrowthDetector<C> {
    /// Detect growth of any counting condition
    pub const fn new(counter: C) -> Self {
        Self {
            counter,
            indicator: None,
        }
    }

    /// Look for a loading indicator after the trigger, for at most `probe_ms`.
    ///
    /// The indicator is optional: not seeing it never fails the wait.
    #[must_use]
    pub fn with_loading_indicator(mut self, selector: impl Into<Selector>, probe_ms: u64) -> Self {
        self.indicator = Some((selector.into(), Duration::from_millis(probe_ms)));
        self
    }

    /// Read the current count, retrying stale reads within the poller's budget
    pub async fn capture_baseline(&self, page: &dyn PageQuery, poller: &Poller) -> EsperarResult<usize> {
        let baseline = poller.until(page, &self.counter).await?;
        debug!(counter = %self.counter.description(), baseline, "baseline captured");
        Ok(baseline)
    }

    /// Wait for the count to exceed `baseline`
    pub async fn wait_for_growth(
        &self,
        page: &dyn PageQuery,
        poller: &Poller,
        baseline: usize,
    ) -> EsperarResult<WaitOutcome<usize>> {
        let grown = Grown {
            counter: &self.counter,
            state: Mutex::new(GrowthState::new(baseline)),
        };
        poller.wait(page, &grown).await
    }

    /// Capture a baseline, perform `trigger`, then wait for growth
    pub async fn grow_after(
        &self,
        page: &dyn PageQuery,
        poller: &Poller,
        trigger: &dyn Action,
    ) -> EsperarResult<WaitOutcome<usize>> {
        let baseline = self.capture_baseline(page, poller).await?;
        trigger.perform(page).await?;
        if let Some((selector, window)) = &self.indicator {
            let seen = poller.probe(page, &visible(selector.clone()), *window).await?;
            debug!(indicator = %selector, seen = seen.is_some(), "loading indicator probe");
        }
        self.wait_for_growth(page, poller, baseline).await
    }
}
