//! Transient UI artifacts: modal dialogs and dropdown menus.
//!
//! An artifact moves `Closed -> Opening -> Open -> Closing -> Closed`.
//! `Opening` and `Closing` only last while a trigger runs and the poller
//! waits for the page to catch up; callers observe `Closed` or `Open`
//! between calls.
//!
//! ## Toyota Way Application
//!
//! - **Poka-Yoke**: opening an artifact that is already open is rejected
//! - **Jidoka**: two visible roots in one snapshot stop the wait
//! - **Genchi Genbutsu**: state transitions only follow what the page shows

use crate::action::Action;
use crate::condition::{hidden_or_absent, Condition, ConditionError, Evaluation};
use crate::page::{Element, PageQuery, Snapshot};
use crate::result::{EsperarError, EsperarResult, PageError};
use crate::selector::Selector;
use crate::wait::{Poller, WaitOutcome};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Lifecycle state of a transient artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransientState {
    /// Not shown
    #[default]
    Closed,
    /// Trigger performed, waiting to appear
    Opening,
    /// Shown with all required parts
    Open,
    /// Trigger performed, waiting to disappear
    Closing,
}

impl TransientState {
    /// Whether the artifact is shown
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }
}

impl fmt::Display for TransientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Closed => "closed",
            Self::Opening => "opening",
            Self::Open => "open",
            Self::Closing => "closing",
        };
        f.write_str(name)
    }
}

/// Kind of transient artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Overlay dialog
    Modal,
    /// Menu anchored to a trigger
    Dropdown,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Modal => f.write_str("modal"),
            Self::Dropdown => f.write_str("dropdown"),
        }
    }
}

/// Handles to an open artifact's root and parts
#[derive(Debug)]
pub struct ArtifactHandle {
    root: Element,
    parts: Vec<(String, Vec<Element>)>,
}

impl ArtifactHandle {
    /// The visible root element
    #[must_use]
    pub fn root(&self) -> &Element {
        &self.root
    }

    /// First element of a named part
    #[must_use]
    pub fn part(&self, name: &str) -> Option<&Element> {
        self.part_all(name).first()
    }

    /// All elements of a named part, in document order
    #[must_use]
    pub fn part_all(&self, name: &str) -> &[Element] {
        self.parts
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, elements)| elements.as_slice())
            .unwrap_or_default()
    }

    /// Names of the resolved parts
    pub fn parts(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().map(|(n, _)| n.as_str())
    }
}

/// Root visible exactly once, with every required part inside it
struct Shown<'a> {
    root: &'a Selector,
    parts: &'a [(String, Selector)],
}

#[async_trait]
impl<'a> Condition for Shown<'a> {
    type Output = ArtifactHandle;

    async fn evaluate(&self, snapshot: &Snapshot<'_>) -> Evaluation<ArtifactHandle> {
        let mut shown = Vec::new();
        for element in snapshot.find_all(self.root).await? {
            if element.is_visible().await? {
                shown.push(element);
            }
        }
        if shown.len() > 1 {
            return Err(ConditionError::invariant(format!(
                "{} visible elements match {}",
                shown.len(),
                self.root
            )));
        }
        let Some(root) = shown.pop() else {
            return Err(ConditionError::not_yet(format!("{} not visible", self.root)));
        };

        let mut parts = Vec::with_capacity(self.parts.len());
        for (name, selector) in self.parts {
            let found = root.find_all(selector).await?;
            if found.is_empty() {
                return Err(ConditionError::not_yet(format!(
                    "part {name} ({selector}) missing"
                )));
            }
            parts.push((name.clone(), found));
        }
        Ok(ArtifactHandle { root, parts })
    }

    fn description(&self) -> String {
        format!("{} to open", self.root)
    }
}

/// One modal or dropdown and its lifecycle
#[derive(Debug, Clone)]
pub struct TransientArtifact {
    kind: ArtifactKind,
    root: Selector,
    parts: Vec<(String, Selector)>,
    state: TransientState,
}

impl TransientArtifact {
    /// Track an artifact whose root matches `root`
    pub fn new(kind: ArtifactKind, root: impl Into<Selector>) -> Self {
        Self {
            kind,
            root: root.into(),
            parts: Vec::new(),
            state: TransientState::Closed,
        }
    }

    /// A modal dialog
    pub fn modal(root: impl Into<Selector>) -> Self {
        Self::new(ArtifactKind::Modal, root)
    }

    /// A dropdown menu
    pub fn dropdown(root: impl Into<Selector>) -> Self {
        Self::new(ArtifactKind::Dropdown, root)
    }

    /// Require a part, looked up inside the root, before counting as open
    #[must_use]
    pub fn with_part(mut self, name: impl Into<String>, selector: impl Into<Selector>) -> Self {
        self.parts.push((name.into(), selector.into()));
        self
    }

    /// Current lifecycle state
    #[must_use]
    pub const fn state(&self) -> TransientState {
        self.state
    }

    /// Artifact kind
    #[must_use]
    pub const fn kind(&self) -> ArtifactKind {
        self.kind
    }

    /// Root selector
    #[must_use]
    pub const fn root(&self) -> &Selector {
        &self.root
    }

    /// Perform `trigger` and wait for the root and every part to show.
    ///
    /// Fails with [`EsperarError::InvalidState`] when already open. On
    /// timeout the artifact is considered closed again.
    pub async fn open(
        &mut self,
        page: &dyn PageQuery,
        poller: &Poller,
        trigger: &dyn Action,
    ) -> EsperarResult<WaitOutcome<ArtifactHandle>> {
        if self.state.is_open() {
            return Err(EsperarError::InvalidState {
                message: format!("{} {} is already open", self.kind, self.root),
            });
        }
        self.transition(TransientState::Opening);
        let outcome = self.run_open(page, poller, trigger).await;
        let next = match &outcome {
            Ok(o) if o.is_satisfied() => TransientState::Open,
            _ => TransientState::Closed,
        };
        self.transition(next);
        outcome
    }

    async fn run_open(
        &self,
        page: &dyn PageQuery,
        poller: &Poller,
        trigger: &dyn Action,
    ) -> EsperarResult<WaitOutcome<ArtifactHandle>> {
        debug!(kind = %self.kind, trigger = %trigger.description(), "opening");
        trigger.perform(page).await?;
        let shown = Shown {
            root: &self.root,
            parts: &self.parts,
        };
        poller.wait(page, &shown).await
    }

    /// Perform `trigger` and wait until no root match is visible.
    ///
    /// On an artifact that is already closed the trigger is skipped and the
    /// wait only confirms absence. On timeout the artifact stays open.
    pub async fn close(
        &mut self,
        page: &dyn PageQuery,
        poller: &Poller,
        trigger: &dyn Action,
    ) -> EsperarResult<WaitOutcome<()>> {
        if self.state == TransientState::Closed {
            debug!(kind = %self.kind, root = %self.root, "already closed, skipping trigger");
            return poller.wait(page, &hidden_or_absent(self.root.clone())).await;
        }
        self.transition(TransientState::Closing);
        let outcome = self.run_close(page, poller, trigger).await;
        let next = match &outcome {
            Ok(o) if o.is_satisfied() => TransientState::Closed,
            _ => TransientState::Open,
        };
        self.transition(next);
        outcome
    }

    async fn run_close(
        &self,
        page: &dyn PageQuery,
        poller: &Poller,
        trigger: &dyn Action,
    ) -> EsperarResult<WaitOutcome<()>> {
        debug!(kind = %self.kind, trigger = %trigger.description(), "closing");
        trigger.perform(page).await?;
        poller.wait(page, &hidden_or_absent(self.root.clone())).await
    }

    /// Whether any root match is visible right now
    pub async fn is_present(&self, page: &dyn PageQuery) -> EsperarResult<bool> {
        for element in page.find_all(&self.root).await? {
            match element.is_visible().await {
                Ok(true) => return Ok(true),
                Ok(false) | Err(PageError::Stale { .. }) => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(false)
    }

    fn transition(&mut self, next: TransientState) {
        if self.state != next {
            debug!(kind = %self.kind, root = %self.root, from = %self.state, to = %next, "transition");
            self.state = next;
        }
    }
}
