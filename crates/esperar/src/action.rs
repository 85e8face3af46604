//! Actions: the triggers that drive a page between waits.
//!
//! Actions run outside the poll loop, exactly once. A failing action is a
//! real failure and surfaces as [`EsperarError::Page`](crate::EsperarError::Page)
//! instead of being retried.

use crate::condition::{AlertPresent, BoxFuture};
use crate::page::PageQuery;
use crate::result::{EsperarError, PageError, PageResult};
use crate::selector::Selector;
use crate::wait::probe;
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// Script that scrolls the window to the end of the document
pub const SCROLL_TO_BOTTOM_SCRIPT: &str = "window.scrollTo(0, document.body.scrollHeight);";

/// Something done to a page, once
#[async_trait]
pub trait Action: Send + Sync {
    /// Perform the action
    async fn perform(&self, page: &dyn PageQuery) -> PageResult<()>;

    /// Description for logs
    fn description(&self) -> String;
}

#[async_trait]
impl<A: Action + ?Sized> Action for &A {
    async fn perform(&self, page: &dyn PageQuery) -> PageResult<()> {
        (**self).perform(page).await
    }

    fn description(&self) -> String {
        (**self).description()
    }
}

#[async_trait]
impl<A: Action + ?Sized> Action for Box<A> {
    async fn perform(&self, page: &dyn PageQuery) -> PageResult<()> {
        (**self).perform(page).await
    }

    fn description(&self) -> String {
        (**self).description()
    }
}

/// Click the first element matching a selector
#[derive(Debug, Clone)]
pub struct Click(pub Selector);

#[async_trait]
impl Action for Click {
    async fn perform(&self, page: &dyn PageQuery) -> PageResult<()> {
        let element = page
            .find(&self.0)
            .await?
            .ok_or_else(|| PageError::not_found(&self.0))?;
        element.click().await
    }

    fn description(&self) -> String {
        format!("click {}", self.0)
    }
}

/// Type text into the first element matching a selector
#[derive(Debug, Clone)]
pub struct TypeText {
    /// Target element
    pub selector: Selector,
    /// Text to type
    pub text: String,
}

#[async_trait]
impl Action for TypeText {
    async fn perform(&self, page: &dyn PageQuery) -> PageResult<()> {
        let element = page
            .find(&self.selector)
            .await?
            .ok_or_else(|| PageError::not_found(&self.selector))?;
        element.send_keys(&self.text).await
    }

    fn description(&self) -> String {
        format!("type {:?} into {}", self.text, self.selector)
    }
}

/// Run a script, discarding its value
#[derive(Debug, Clone)]
pub struct RunScript(pub String);

#[async_trait]
impl Action for RunScript {
    async fn perform(&self, page: &dyn PageQuery) -> PageResult<()> {
        page.execute_script(&self.0).await.map(|_| ())
    }

    fn description(&self) -> String {
        format!("run script {:?}", self.0)
    }
}

/// Accept a native dialog if one opens within `window`
#[derive(Debug, Clone, Copy)]
pub struct AcceptAlert {
    /// How long to look for the dialog
    pub window: Duration,
}

#[async_trait]
impl Action for AcceptAlert {
    async fn perform(&self, page: &dyn PageQuery) -> PageResult<()> {
        let alert = probe(page, &AlertPresent, self.window)
            .await
            .map_err(|err| match err {
                EsperarError::Page(page_err) => page_err,
                other => PageError::script(other.to_string()),
            })?;
        match alert {
            Some(alert) => match alert.accept().await {
                Ok(()) | Err(PageError::Stale { .. }) => Ok(()),
                Err(err) => Err(err),
            },
            None => {
                debug!(window_ms = self.window.as_millis() as u64, "no alert appeared");
                Ok(())
            }
        }
    }

    fn description(&self) -> String {
        "accept alert if present".to_string()
    }
}

/// Actions performed in order, stopping at the first failure
#[derive(Default)]
pub struct Sequence {
    steps: Vec<Box<dyn Action>>,
}

impl Sequence {
    /// Create an empty sequence
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step
    #[must_use]
    pub fn then(mut self, action: impl Action + 'static) -> Self {
        self.steps.push(Box::new(action));
        self
    }

    /// Number of steps
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the sequence has no steps
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl fmt::Debug for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.steps.iter().map(|s| s.description()))
            .finish()
    }
}

#[async_trait]
impl Action for Sequence {
    async fn perform(&self, page: &dyn PageQuery) -> PageResult<()> {
        for step in &self.steps {
            debug!(step = %step.description(), "performing");
            step.perform(page).await?;
        }
        Ok(())
    }

    fn description(&self) -> String {
        self.steps
            .iter()
            .map(|s| s.description())
            .collect::<Vec<_>>()
            .join(", then ")
    }
}

/// A closure-backed action
pub struct FnAction<F> {
    func: F,
    description: String,
}

impl<F> FnAction<F>
where
    F: for<'p> Fn(&'p dyn PageQuery) -> BoxFuture<'p, PageResult<()>> + Send + Sync,
{
    /// Create a new function action
    pub fn new(description: impl Into<String>, func: F) -> Self {
        Self {
            func,
            description: description.into(),
        }
    }
}

impl<F> fmt::Debug for FnAction<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnAction")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<F> Action for FnAction<F>
where
    F: for<'p> Fn(&'p dyn PageQuery) -> BoxFuture<'p, PageResult<()>> + Send + Sync,
{
    async fn perform(&self, page: &dyn PageQuery) -> PageResult<()> {
        (self.func)(page).await
    }

    fn description(&self) -> String {
        self.description.clone()
    }
}

// =============================================================================
// CONSTRUCTORS
// =============================================================================

/// Click the first match of `selector`
pub fn click(selector: impl Into<Selector>) -> Click {
    Click(selector.into())
}

/// Type `text` into the first match of `selector`
pub fn type_text(selector: impl Into<Selector>, text: impl Into<String>) -> TypeText {
    TypeText {
        selector: selector.into(),
        text: text.into(),
    }
}

/// Scroll the window to the bottom of the document
#[must_use]
pub fn scroll_to_bottom() -> RunScript {
    RunScript(SCROLL_TO_BOTTOM_SCRIPT.to_string())
}

/// Accept a dialog appearing within `window`
#[must_use]
pub const fn accept_alert(window: Duration) -> AcceptAlert {
    AcceptAlert { window }
}
