//! Page Query Surface contract and per-attempt snapshots.
//!
//! The engine never drives a browser itself. It reads page state through
//! [`PageQuery`], implemented by a real driver adapter (see the `chromium`
//! feature) or by [`MockPage`](crate::MockPage) in tests.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  fresh Snapshot   ┌──────────────┐   find/text/...   ┌──────────────┐
//! │   Poller     │ ────────────────► │  Condition   │ ────────────────► │  PageQuery   │
//! │ (wait loop)  │ ◄──────────────── │  (evaluate)  │ ◄──────────────── │ (driver/mock)│
//! └──────────────┘  Ok(T) / NotYet   └──────────────┘   PageResult<T>   └──────────────┘
//! ```

use crate::result::PageResult;
use crate::selector::Selector;
use async_trait::async_trait;
use std::fmt;
use tokio::time::Instant;

/// Boxed element handle returned by lookups
pub type Element = Box<dyn ElementHandle>;

/// Boxed alert handle
pub type Alert = Box<dyn AlertHandle>;

/// A live reference to one element on the page
#[async_trait]
pub trait ElementHandle: Send + Sync + fmt::Debug {
    /// Whether the element is rendered and visible
    async fn is_visible(&self) -> PageResult<bool>;

    /// Visible text content
    async fn text(&self) -> PageResult<String>;

    /// Markup attribute value, `None` when the attribute is absent.
    ///
    /// This is the attribute as authored, not the live property: a checkbox's
    /// `checked` or an input's `value` attribute do not follow user input.
    /// Use [`ElementHandle::is_selected`] and [`ElementHandle::value`] for those.
    async fn attribute(&self, name: &str) -> PageResult<Option<String>>;

    /// Live checked state of a checkbox or radio, or selected state of an option
    async fn is_selected(&self) -> PageResult<bool>;

    /// Live `value` of a form control, `""` for elements without one
    async fn value(&self) -> PageResult<String>;

    /// Click the element
    async fn click(&self) -> PageResult<()>;

    /// Type text into the element
    async fn send_keys(&self, text: &str) -> PageResult<()>;

    /// Whether the element accepts interaction
    async fn is_enabled(&self) -> PageResult<bool>;

    /// Descendants matching `selector`, in document order
    async fn find_all(&self, selector: &Selector) -> PageResult<Vec<Element>>;

    /// First descendant matching `selector`
    async fn find(&self, selector: &Selector) -> PageResult<Option<Element>> {
        Ok(self.find_all(selector).await?.into_iter().next())
    }
}

/// A native browser dialog (alert, confirm, prompt)
#[async_trait]
pub trait AlertHandle: Send + Sync + fmt::Debug {
    /// Dialog message
    async fn text(&self) -> PageResult<String>;

    /// Accept the dialog (OK)
    async fn accept(&self) -> PageResult<()>;

    /// Dismiss the dialog (Cancel)
    async fn dismiss(&self) -> PageResult<()>;
}

/// Read and interaction surface of a page.
///
/// Implementations must return fresh state on every call: the engine relies
/// on the browser mutating the page between polls and caches nothing.
#[async_trait]
pub trait PageQuery: Send + Sync {
    /// All elements matching `selector`, in document order (possibly empty)
    async fn find_all(&self, selector: &Selector) -> PageResult<Vec<Element>>;

    /// First element matching `selector`, `None` when nothing matches
    async fn find(&self, selector: &Selector) -> PageResult<Option<Element>> {
        Ok(self.find_all(selector).await?.into_iter().next())
    }

    /// Evaluate a script in the page context
    async fn execute_script(&self, script: &str) -> PageResult<serde_json::Value>;

    /// The currently open native dialog, if any
    async fn current_alert(&self) -> PageResult<Option<Alert>>;

    /// Release the underlying session
    async fn close(&self) -> PageResult<()> {
        Ok(())
    }
}

/// One poll attempt's view of the page.
///
/// A snapshot is created for every attempt and dropped before the poller
/// sleeps, so no state read through it outlives its attempt.
pub struct Snapshot<'a> {
    page: &'a dyn PageQuery,
    attempt: u32,
    taken_at: Instant,
}

impl<'a> Snapshot<'a> {
    /// Take a snapshot for the given attempt number (1-based)
    #[must_use]
    pub fn new(page: &'a dyn PageQuery, attempt: u32) -> Self {
        Self {
            page,
            attempt,
            taken_at: Instant::now(),
        }
    }

    /// Attempt number this snapshot belongs to
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    /// When the snapshot was taken
    #[must_use]
    pub const fn taken_at(&self) -> Instant {
        self.taken_at
    }

    /// The underlying page
    #[must_use]
    pub fn page(&self) -> &'a dyn PageQuery {
        self.page
    }

    /// All elements matching `selector`
    pub async fn find_all(&self, selector: &Selector) -> PageResult<Vec<Element>> {
        self.page.find_all(selector).await
    }

    /// First element matching `selector`
    pub async fn find(&self, selector: &Selector) -> PageResult<Option<Element>> {
        self.page.find(selector).await
    }

    /// Number of elements matching `selector`
    pub async fn count(&self, selector: &Selector) -> PageResult<usize> {
        Ok(self.page.find_all(selector).await?.len())
    }

    /// Evaluate a script in the page context
    pub async fn execute_script(&self, script: &str) -> PageResult<serde_json::Value> {
        self.page.execute_script(script).await
    }

    /// The currently open native dialog, if any
    pub async fn current_alert(&self) -> PageResult<Option<Alert>> {
        self.page.current_alert().await
    }
}

impl fmt::Debug for Snapshot<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("attempt", &self.attempt)
            .field("taken_at", &self.taken_at)
            .finish_non_exhaustive()
    }
}
