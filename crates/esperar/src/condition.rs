//! Conditions: predicates evaluated against a [`Snapshot`].
//!
//! A condition either yields a value (`Ok`) or explains why the page is not
//! there yet. Page read failures convert into [`ConditionError::Stale`] via
//! `?`, so a condition body reads like straight-line code while the poller
//! absorbs transient DOM churn.
//!
//! ## Toyota Way Application
//!
//! - **Poka-Yoke**: typed outcomes separate "not yet" from "impossible"
//! - **Jidoka**: invariant violations stop the line instead of retrying

use crate::page::{Alert, Element, Snapshot};
use crate::result::PageError;
use crate::selector::Selector;
use async_trait::async_trait;
use regex::Regex;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use thiserror::Error;

/// Boxed, sendable future used by closure-backed conditions
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Result of evaluating a condition once
pub type Evaluation<T> = Result<T, ConditionError>;

/// The page has not reached the expected state yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotYet {
    reason: String,
}

impl NotYet {
    /// Create with a description of what was observed instead
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// What was observed instead of the expected state
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl fmt::Display for NotYet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)
    }
}

/// Why a single evaluation did not produce a value
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConditionError {
    /// Expected state not reached; retry on the next attempt
    #[error("not yet: {0}")]
    NotYet(NotYet),
    /// A read failed mid-evaluation; retry on the next attempt
    #[error("stale evaluation: {0}")]
    Stale(String),
    /// The page is logically inconsistent; fail without retrying
    #[error("invariant violated: {0}")]
    Invariant(String),
}

impl ConditionError {
    /// Shorthand for [`ConditionError::NotYet`]
    #[must_use]
    pub fn not_yet(reason: impl Into<String>) -> Self {
        Self::NotYet(NotYet::new(reason))
    }

    /// Shorthand for [`ConditionError::Invariant`]
    #[must_use]
    pub fn invariant(message: impl Into<String>) -> Self {
        Self::Invariant(message.into())
    }

    /// Whether the poller should try again
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        !matches!(self, Self::Invariant(_))
    }

    /// Observation to report if the wait eventually times out
    #[must_use]
    pub fn observation(&self) -> String {
        match self {
            Self::NotYet(n) => n.reason().to_string(),
            Self::Stale(m) => format!("stale read: {m}"),
            Self::Invariant(m) => m.clone(),
        }
    }
}

impl From<PageError> for ConditionError {
    fn from(err: PageError) -> Self {
        Self::Stale(err.to_string())
    }
}

impl From<NotYet> for ConditionError {
    fn from(not_yet: NotYet) -> Self {
        Self::NotYet(not_yet)
    }
}

// =============================================================================
// CONDITION TRAIT
// =============================================================================

/// A named predicate over a snapshot.
///
/// Implementations must be side-effect free: the poller may evaluate a
/// condition any number of times.
#[async_trait]
pub trait Condition: Send + Sync {
    /// Value produced once the condition holds
    type Output: Send;

    /// Evaluate against one snapshot
    async fn evaluate(&self, snapshot: &Snapshot<'_>) -> Evaluation<Self::Output>;

    /// Description for logs and error messages
    fn description(&self) -> String;
}

#[async_trait]
impl<C: Condition + ?Sized> Condition for &C {
    type Output = C::Output;

    async fn evaluate(&self, snapshot: &Snapshot<'_>) -> Evaluation<Self::Output> {
        (**self).evaluate(snapshot).await
    }

    fn description(&self) -> String {
        (**self).description()
    }
}

/// A closure-backed condition
///
/// ```ignore
/// let ready = FnCondition::new("grid rendered", |snap| {
///     Box::pin(async move {
///         let rows = snap.count(&Selector::css("tbody tr.data-row")).await?;
///         if rows > 0 { Ok(rows) } else { Err(ConditionError::not_yet("no rows")) }
///     })
/// });
/// ```
pub struct FnCondition<F, T> {
    func: F,
    description: String,
    _output: PhantomData<fn() -> T>,
}

impl<F, T> FnCondition<F, T>
where
    F: for<'s> Fn(&'s Snapshot<'s>) -> BoxFuture<'s, Evaluation<T>> + Send + Sync,
    T: Send,
{
    /// Create a new function condition
    pub fn new(description: impl Into<String>, func: F) -> Self {
        Self {
            func,
            description: description.into(),
            _output: PhantomData,
        }
    }
}

impl<F, T> fmt::Debug for FnCondition<F, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnCondition")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<F, T> Condition for FnCondition<F, T>
where
    F: for<'s> Fn(&'s Snapshot<'s>) -> BoxFuture<'s, Evaluation<T>> + Send + Sync,
    T: Send,
{
    type Output = T;

    async fn evaluate(&self, snapshot: &Snapshot<'_>) -> Evaluation<T> {
        (self.func)(snapshot).await
    }

    fn description(&self) -> String {
        self.description.clone()
    }
}

// =============================================================================
// STOCK CONDITIONS
// =============================================================================

/// At least one element matches
#[derive(Debug, Clone)]
pub struct Present(pub Selector);

#[async_trait]
impl Condition for Present {
    type Output = Element;

    async fn evaluate(&self, snapshot: &Snapshot<'_>) -> Evaluation<Element> {
        snapshot
            .find(&self.0)
            .await?
            .ok_or_else(|| ConditionError::not_yet(format!("no element matches {}", self.0)))
    }

    fn description(&self) -> String {
        format!("presence of {}", self.0)
    }
}

/// The first match exists and is visible
#[derive(Debug, Clone)]
pub struct Visible(pub Selector);

#[async_trait]
impl Condition for Visible {
    type Output = Element;

    async fn evaluate(&self, snapshot: &Snapshot<'_>) -> Evaluation<Element> {
        let element = Present(self.0.clone()).evaluate(snapshot).await?;
        if element.is_visible().await? {
            Ok(element)
        } else {
            Err(ConditionError::not_yet(format!("{} is hidden", self.0)))
        }
    }

    fn description(&self) -> String {
        format!("visibility of {}", self.0)
    }
}

/// One or more elements match; yields all of them
#[derive(Debug, Clone)]
pub struct AllPresent(pub Selector);

#[async_trait]
impl Condition for AllPresent {
    type Output = Vec<Element>;

    async fn evaluate(&self, snapshot: &Snapshot<'_>) -> Evaluation<Vec<Element>> {
        let elements = snapshot.find_all(&self.0).await?;
        if elements.is_empty() {
            Err(ConditionError::not_yet(format!("no element matches {}", self.0)))
        } else {
            Ok(elements)
        }
    }

    fn description(&self) -> String {
        format!("presence of all {}", self.0)
    }
}

/// The first match is visible and enabled
#[derive(Debug, Clone)]
pub struct Clickable(pub Selector);

#[async_trait]
impl Condition for Clickable {
    type Output = Element;

    async fn evaluate(&self, snapshot: &Snapshot<'_>) -> Evaluation<Element> {
        let element = Visible(self.0.clone()).evaluate(snapshot).await?;
        if element.is_enabled().await? {
            Ok(element)
        } else {
            Err(ConditionError::not_yet(format!("{} is disabled", self.0)))
        }
    }

    fn description(&self) -> String {
        format!("{} to be clickable", self.0)
    }
}

/// No match is visible.
///
/// Elements that are removed, hidden, or detached while being read all
/// count as gone.
#[derive(Debug, Clone)]
pub struct HiddenOrAbsent(pub Selector);

#[async_trait]
impl Condition for HiddenOrAbsent {
    type Output = ();

    async fn evaluate(&self, snapshot: &Snapshot<'_>) -> Evaluation<()> {
        let mut shown = 0usize;
        for element in snapshot.find_all(&self.0).await? {
            match element.is_visible().await {
                Ok(true) => shown += 1,
                Ok(false) | Err(PageError::Stale { .. }) => {}
                Err(other) => return Err(other.into()),
            }
        }
        if shown == 0 {
            Ok(())
        } else {
            Err(ConditionError::not_yet(format!(
                "{shown} visible element(s) match {}",
                self.0
            )))
        }
    }

    fn description(&self) -> String {
        format!("invisibility of {}", self.0)
    }
}

/// Number of matches; always satisfied
#[derive(Debug, Clone)]
pub struct Count(pub Selector);

#[async_trait]
impl Condition for Count {
    type Output = usize;

    async fn evaluate(&self, snapshot: &Snapshot<'_>) -> Evaluation<usize> {
        Ok(snapshot.count(&self.0).await?)
    }

    fn description(&self) -> String {
        format!("count of {}", self.0)
    }
}

/// At least `min` matches
#[derive(Debug, Clone)]
pub struct CountAtLeast {
    /// Elements to count
    pub selector: Selector,
    /// Minimum count
    pub min: usize,
}

#[async_trait]
impl Condition for CountAtLeast {
    type Output = usize;

    async fn evaluate(&self, snapshot: &Snapshot<'_>) -> Evaluation<usize> {
        let n = snapshot.count(&self.selector).await?;
        if n >= self.min {
            Ok(n)
        } else {
            Err(ConditionError::not_yet(format!("{n} of {} matches", self.min)))
        }
    }

    fn description(&self) -> String {
        format!("at least {} of {}", self.min, self.selector)
    }
}

/// Matches have exactly these trimmed texts, in order
#[derive(Debug, Clone)]
pub struct TextsEqual {
    /// Elements to read
    pub selector: Selector,
    /// Expected texts
    pub expected: Vec<String>,
}

#[async_trait]
impl Condition for TextsEqual {
    type Output = Vec<String>;

    async fn evaluate(&self, snapshot: &Snapshot<'_>) -> Evaluation<Vec<String>> {
        let mut texts = Vec::new();
        for element in snapshot.find_all(&self.selector).await? {
            texts.push(element.text().await?.trim().to_string());
        }
        if texts == self.expected {
            Ok(texts)
        } else {
            Err(ConditionError::not_yet(format!("texts were {texts:?}")))
        }
    }

    fn description(&self) -> String {
        format!("{} texts to equal {:?}", self.selector, self.expected)
    }
}

/// The first match's text contains a fragment
#[derive(Debug, Clone)]
pub struct TextContains {
    /// Element to read
    pub selector: Selector,
    /// Expected fragment
    pub fragment: String,
}

#[async_trait]
impl Condition for TextContains {
    type Output = String;

    async fn evaluate(&self, snapshot: &Snapshot<'_>) -> Evaluation<String> {
        let element = Present(self.selector.clone()).evaluate(snapshot).await?;
        let text = element.text().await?;
        if text.contains(&self.fragment) {
            Ok(text)
        } else {
            Err(ConditionError::not_yet(format!("text was {text:?}")))
        }
    }

    fn description(&self) -> String {
        format!("{} text to contain {:?}", self.selector, self.fragment)
    }
}

/// The first match's text matches a regular expression
#[derive(Debug, Clone)]
pub struct TextMatches {
    /// Element to read
    pub selector: Selector,
    /// Pattern to match
    pub pattern: Regex,
}

#[async_trait]
impl Condition for TextMatches {
    type Output = String;

    async fn evaluate(&self, snapshot: &Snapshot<'_>) -> Evaluation<String> {
        let element = Present(self.selector.clone()).evaluate(snapshot).await?;
        let text = element.text().await?;
        if self.pattern.is_match(&text) {
            Ok(text)
        } else {
            Err(ConditionError::not_yet(format!("text was {text:?}")))
        }
    }

    fn description(&self) -> String {
        format!("{} text to match /{}/", self.selector, self.pattern)
    }
}

/// Script that reports the document ready state
pub const READY_STATE_SCRIPT: &str = "return document.readyState";

/// `document.readyState` is `"complete"`
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadyStateComplete;

#[async_trait]
impl Condition for ReadyStateComplete {
    type Output = ();

    async fn evaluate(&self, snapshot: &Snapshot<'_>) -> Evaluation<()> {
        let state = snapshot.execute_script(READY_STATE_SCRIPT).await?;
        match state.as_str() {
            Some("complete") => Ok(()),
            _ => Err(ConditionError::not_yet(format!("readyState was {state}"))),
        }
    }

    fn description(&self) -> String {
        "document ready state complete".to_string()
    }
}

/// A native dialog is open
#[derive(Debug, Clone, Copy, Default)]
pub struct AlertPresent;

#[async_trait]
impl Condition for AlertPresent {
    type Output = Alert;

    async fn evaluate(&self, snapshot: &Snapshot<'_>) -> Evaluation<Alert> {
        snapshot
            .current_alert()
            .await?
            .ok_or_else(|| ConditionError::not_yet("no alert open"))
    }

    fn description(&self) -> String {
        "alert to be present".to_string()
    }
}

// =============================================================================
// CONSTRUCTORS
// =============================================================================

/// At least one element matches `selector`
pub fn present(selector: impl Into<Selector>) -> Present {
    Present(selector.into())
}

/// The first match of `selector` is visible
pub fn visible(selector: impl Into<Selector>) -> Visible {
    Visible(selector.into())
}

/// One or more elements match `selector`
pub fn all_present(selector: impl Into<Selector>) -> AllPresent {
    AllPresent(selector.into())
}

/// The first match of `selector` is visible and enabled
pub fn clickable(selector: impl Into<Selector>) -> Clickable {
    Clickable(selector.into())
}

/// No match of `selector` is visible
pub fn hidden_or_absent(selector: impl Into<Selector>) -> HiddenOrAbsent {
    HiddenOrAbsent(selector.into())
}

/// Number of matches of `selector`
pub fn count(selector: impl Into<Selector>) -> Count {
    Count(selector.into())
}

/// At least `min` matches of `selector`
pub fn count_at_least(selector: impl Into<Selector>, min: usize) -> CountAtLeast {
    CountAtLeast {
        selector: selector.into(),
        min,
    }
}

/// Matches of `selector` have exactly the `expected` texts
pub fn texts_equal<S: Into<String>>(
    selector: impl Into<Selector>,
    expected: impl IntoIterator<Item = S>,
) -> TextsEqual {
    TextsEqual {
        selector: selector.into(),
        expected: expected.into_iter().map(Into::into).collect(),
    }
}

/// The first match of `selector` contains `fragment`
pub fn text_contains(selector: impl Into<Selector>, fragment: impl Into<String>) -> TextContains {
    TextContains {
        selector: selector.into(),
        fragment: fragment.into(),
    }
}

/// The first match of `selector` matches `pattern`
pub fn text_matches(selector: impl Into<Selector>, pattern: Regex) -> TextMatches {
    TextMatches {
        selector: selector.into(),
        pattern,
    }
}

/// The document has finished loading
pub const fn ready_state_complete() -> ReadyStateComplete {
    ReadyStateComplete
}

/// A native dialog is open
pub const fn alert_present() -> AlertPresent {
    AlertPresent
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::mock::{MockNode, MockPage};

    fn grid_page() -> MockPage {
        let page = MockPage::new();
        for header in ["Select", "Name", "Email"] {
            page.insert(Selector::tag("th"), MockNode::new().text(header));
        }
        page.insert(
            Selector::css(".export-btn"),
            MockNode::new().text("CSV").enabled(false),
        );
        page.insert(Selector::class("modal-content"), MockNode::new().hidden());
        page
    }

    mod condition_error_tests {
        use super::*;

        #[test]
        fn test_page_errors_become_stale() {
            let err: ConditionError = PageError::stale("node detached").into();
            assert!(matches!(err, ConditionError::Stale(_)));
            assert!(err.is_retryable());
        }

        #[test]
        fn test_invariant_not_retryable() {
            let err = ConditionError::invariant("two open modals");
            assert!(!err.is_retryable());
            assert_eq!(err.observation(), "two open modals");
        }

        #[test]
        fn test_not_yet_observation() {
            let err = ConditionError::not_yet("3 rows");
            assert_eq!(err.observation(), "3 rows");
            assert_eq!(err.to_string(), "not yet: 3 rows");
        }
    }

    mod stock_condition_tests {
        use super::*;

        #[tokio::test]
        async fn test_present_and_absent() {
            let page = grid_page();
            let snap = Snapshot::new(&page, 1);
            assert!(present(Selector::tag("th")).evaluate(&snap).await.is_ok());
            let err = present(".missing").evaluate(&snap).await.unwrap_err();
            assert!(matches!(err, ConditionError::NotYet(_)));
        }

        #[tokio::test]
        async fn test_visible_rejects_hidden() {
            let page = grid_page();
            let snap = Snapshot::new(&page, 1);
            let err = visible(Selector::class("modal-content"))
                .evaluate(&snap)
                .await
                .unwrap_err();
            assert!(err.observation().contains("hidden"));
        }

        #[tokio::test]
        async fn test_clickable_requires_enabled() {
            let page = grid_page();
            let snap = Snapshot::new(&page, 1);
            let err = clickable(".export-btn").evaluate(&snap).await.unwrap_err();
            assert!(err.observation().contains("disabled"));
        }

        #[tokio::test]
        async fn test_hidden_or_absent() {
            let page = grid_page();
            let snap = Snapshot::new(&page, 1);
            assert!(hidden_or_absent(Selector::class("modal-content"))
                .evaluate(&snap)
                .await
                .is_ok());
            assert!(hidden_or_absent(".missing").evaluate(&snap).await.is_ok());
            assert!(hidden_or_absent(Selector::tag("th"))
                .evaluate(&snap)
                .await
                .is_err());
        }

        #[tokio::test]
        async fn test_texts_equal_reports_observed() {
            let page = grid_page();
            let snap = Snapshot::new(&page, 1);
            let ok = texts_equal(Selector::tag("th"), ["Select", "Name", "Email"])
                .evaluate(&snap)
                .await
                .unwrap();
            assert_eq!(ok.len(), 3);

            let err = texts_equal(Selector::tag("th"), ["Select"])
                .evaluate(&snap)
                .await
                .unwrap_err();
            assert!(err.observation().contains("Email"));
        }

        #[tokio::test]
        async fn test_count_conditions() {
            let page = grid_page();
            let snap = Snapshot::new(&page, 1);
            assert_eq!(count(Selector::tag("th")).evaluate(&snap).await.unwrap(), 3);
            assert!(count_at_least(Selector::tag("th"), 4)
                .evaluate(&snap)
                .await
                .is_err());
        }

        #[tokio::test]
        async fn test_text_matches() {
            let page = grid_page();
            let snap = Snapshot::new(&page, 1);
            let cond = text_matches(Selector::tag("th"), Regex::new("^Sel").unwrap());
            assert_eq!(cond.evaluate(&snap).await.unwrap(), "Select");
            assert!(text_contains(Selector::tag("th"), "Nope")
                .evaluate(&snap)
                .await
                .is_err());
        }

        #[tokio::test]
        async fn test_ready_state() {
            let page = grid_page();
            page.set_script_results(READY_STATE_SCRIPT, ["loading", "complete"]);
            assert!(ready_state_complete()
                .evaluate(&Snapshot::new(&page, 1))
                .await
                .is_err());
            assert!(ready_state_complete()
                .evaluate(&Snapshot::new(&page, 2))
                .await
                .is_ok());
        }

        #[tokio::test]
        async fn test_fn_condition() {
            let page = grid_page();
            let cond = FnCondition::new("three headers", |snap| {
                Box::pin(async move {
                    let n = snap.count(&Selector::tag("th")).await?;
                    if n == 3 {
                        Ok(n)
                    } else {
                        Err(ConditionError::not_yet(format!("{n} headers")))
                    }
                })
            });
            assert_eq!(cond.description(), "three headers");
            assert_eq!(cond.evaluate(&Snapshot::new(&page, 1)).await.unwrap(), 3);
        }
    }
}
