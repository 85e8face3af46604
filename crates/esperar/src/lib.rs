//! Esperar: Condition Waits for Browser-Driven UI Tests
//!
//! Esperar (Spanish: "to wait") replaces fixed sleeps in browser tests with a
//! bounded, cancellable poll loop. Every expectation about the page is a
//! [`Condition`] evaluated against a fresh [`Snapshot`] until it holds or its
//! budget runs out.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    ESPERAR Architecture                          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │   ┌────────────┐    ┌────────────┐    ┌────────────┐            │
//! │   │ Growth /   │    │  Poller    │    │ PageQuery  │            │
//! │   │ Transient /│───►│ (bounded   │───►│ (chromium  │            │
//! │   │ Selection  │    │  polling)  │    │  or mock)  │            │
//! │   └────────────┘    └────────────┘    └────────────┘            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use esperar::prelude::*;
//!
//! let poller = Poller::new(WaitOptions::new().with_timeout(10_000));
//! poller.until(&page, &ready_state_complete()).await?;
//! let mut modal = TransientArtifact::modal(".modal-content").with_part("text", "textarea");
//! modal.open(&page, &poller, &click(".comments-btn")).await?.into_result()?;
//! ```

#![warn(missing_docs)]
// Lints are configured in workspace Cargo.toml [workspace.lints.clippy]

/// Actions performed between waits
pub mod action;

/// Chromium adapter over CDP
#[cfg(feature = "chromium")]
pub mod cdp;

/// Conditions evaluated by the poller
pub mod condition;

/// Configuration loading
pub mod config;

/// Growth detection for lazy loading
pub mod growth;

/// Tracing subscriber setup
pub mod logging;

/// Scriptable in-memory page for tests
pub mod mock;

/// Page Query Surface contract
pub mod page;

mod result;

/// Selection Set Model
pub mod selection;

/// Element selectors
pub mod selector;

/// Scoped page sessions
pub mod session;

/// Transient UI State Machine
pub mod transient;

/// Wait Mechanisms
pub mod wait;

pub use action::{
    accept_alert, click, scroll_to_bottom, type_text, AcceptAlert, Action, Click, FnAction,
    RunScript, Sequence, TypeText, SCROLL_TO_BOTTOM_SCRIPT,
};
#[cfg(feature = "chromium")]
pub use cdp::{CdpAlert, CdpElement, CdpPage};
pub use condition::{
    alert_present, all_present, clickable, count, count_at_least, hidden_or_absent, present,
    ready_state_complete, text_contains, text_matches, texts_equal, visible, AlertPresent,
    AllPresent, BoxFuture, Clickable, Condition, ConditionError, Count, CountAtLeast, Evaluation,
    FnCondition, HiddenOrAbsent, NotYet, Present, ReadyStateComplete, TextContains, TextMatches,
    TextsEqual, Visible, READY_STATE_SCRIPT,
};
pub use config::{EsperarConfig, DEFAULT_INDICATOR_PROBE_MS, ENV_POLL_INTERVAL_MS, ENV_TIMEOUT_MS};
pub use growth::{GrowthDetector, GrowthState, RowCounter};
pub use logging::{LogConfig, LogFormat};
pub use mock::{MockAlert, MockDom, MockElement, MockNode, MockPage, NodeId};
pub use page::{Alert, AlertHandle, Element, ElementHandle, PageQuery, Snapshot};
pub use result::{EsperarError, EsperarResult, PageError, PageResult};
pub use selection::{SelectionBinding, SelectionSet, SELECTION_LABEL};
pub use selector::Selector;
pub use session::{with_session, Session};
pub use transient::{ArtifactHandle, ArtifactKind, TransientArtifact, TransientState};
pub use wait::{
    accept_alert_if_present, probe, wait_until, Poller, WaitOptions, WaitOutcome,
    DEFAULT_ALERT_WINDOW_MS, DEFAULT_POLL_INTERVAL_MS, DEFAULT_WAIT_TIMEOUT_MS,
};
pub use tokio_util::sync::CancellationToken;

/// Prelude for convenient imports
pub mod prelude {
    pub use super::action::*;
    pub use super::condition::*;
    pub use super::config::*;
    pub use super::growth::*;
    pub use super::page::*;
    pub use super::result::*;
    pub use super::selection::*;
    pub use super::selector::*;
    pub use super::session::*;
    pub use super::transient::*;
    pub use super::wait::*;
    pub use super::CancellationToken;
    pub use super::{MockNode, MockPage};
}
