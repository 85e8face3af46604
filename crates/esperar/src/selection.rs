//! Selection Set Model: row checkboxes and the ids they select.
//!
//! [`SelectionSet`] is the expected membership; [`SelectionBinding`] ties it
//! to the checkboxes on a page so that every toggle is performed on the page
//! and then confirmed against the model.

use crate::condition::{Condition, ConditionError, Evaluation};
use crate::page::{Element, PageQuery, Snapshot};
use crate::result::{EsperarResult, PageResult};
use crate::selector::Selector;
use crate::wait::{Poller, WaitOutcome};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

/// Label preceding the selected ids in the rendered listing
pub const SELECTION_LABEL: &str = "Selected Row IDs:";

/// Unique row ids in insertion order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SelectionSet {
    ids: Vec<String>,
}

impl SelectionSet {
    /// Empty selection
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip membership of `id`; returns whether it is now selected
    pub fn toggle(&mut self, id: impl Into<String>) -> bool {
        let id = id.into();
        if let Some(pos) = self.ids.iter().position(|i| *i == id) {
            self.ids.remove(pos);
            false
        } else {
            self.ids.push(id);
            true
        }
    }

    /// Copy with `id` toggled
    #[must_use]
    pub fn toggled(&self, id: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.toggle(id);
        next
    }

    /// Whether `id` is selected
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|i| i == id)
    }

    /// Number of selected ids
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether nothing is selected
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Selected ids in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    /// Display string, e.g. `Selected Row IDs: ["2","5"]`.
    ///
    /// Ids are JSON string literals, so ids containing commas or quotes
    /// cannot be confused with one another.
    #[must_use]
    pub fn render(&self) -> String {
        let quoted: Vec<String> = self
            .ids
            .iter()
            .map(|id| serde_json::Value::String(id.clone()).to_string())
            .collect();
        format!("{SELECTION_LABEL} [{}]", quoted.join(","))
    }

    /// Whether a page listing names exactly the selected ids.
    ///
    /// Accepts the output of [`SelectionSet::render`] or a plain listing
    /// split on `separator` (such as `1, 2` with `", "`), with or without
    /// the leading label. Order is ignored.
    #[must_use]
    pub fn matches_listing(&self, text: &str, separator: &str) -> bool {
        let body = text.trim();
        let body = body.strip_prefix(SELECTION_LABEL).unwrap_or(body).trim();
        let listed: BTreeSet<String> = if body.starts_with('[') {
            match serde_json::from_str::<Vec<String>>(body) {
                Ok(ids) => ids.into_iter().collect(),
                Err(_) => return false,
            }
        } else {
            body.split(separator.trim())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        };
        listed.len() == self.ids.len() && self.ids.iter().all(|id| listed.contains(id))
    }

    fn as_set(&self) -> BTreeSet<&str> {
        self.iter().collect()
    }
}

impl<S: Into<String>> FromIterator<S> for SelectionSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = Self::new();
        for id in iter {
            let id = id.into();
            if !set.contains(&id) {
                set.ids.push(id);
            }
        }
        set
    }
}

// =============================================================================
// PAGE BINDING
// =============================================================================

/// Binds row checkboxes on a page to a [`SelectionSet`]
#[derive(Debug, Clone)]
pub struct SelectionBinding {
    checkbox: Selector,
    id_attribute: String,
    display: Option<(Selector, String)>,
}

impl SelectionBinding {
    /// Checkboxes matching `checkbox`, identified by `id_attribute`
    pub fn new(checkbox: impl Into<Selector>, id_attribute: impl Into<String>) -> Self {
        Self {
            checkbox: checkbox.into(),
            id_attribute: id_attribute.into(),
            display: None,
        }
    }

    /// Also confirm the listing shown by `selector`, split on `separator`
    #[must_use]
    pub fn with_display(mut self, selector: impl Into<Selector>, separator: impl Into<String>) -> Self {
        self.display = Some((selector.into(), separator.into()));
        self
    }

    /// Click the checkbox of row `id`, update `set`, and wait for the page to agree.
    ///
    /// When the checkbox cannot be found or clicked, `set` is left unchanged.
    pub async fn toggle(
        &self,
        page: &dyn PageQuery,
        poller: &Poller,
        set: &mut SelectionSet,
        id: &str,
    ) -> EsperarResult<WaitOutcome<SelectionSet>> {
        let checkbox = poller
            .until(page, &RowCheckbox { binding: self, id })
            .await?;
        checkbox.click().await?;
        let now_selected = set.toggle(id);
        debug!(id, now_selected, selection = %set.render(), "row toggled");
        poller
            .wait(page, &Agrees { binding: self, expected: &*set })
            .await
    }

    /// Ids of the checked checkboxes, in document order.
    ///
    /// Reads the live checked state, never the `checked` markup attribute.
    pub async fn checked_ids(&self, page: &dyn PageQuery) -> EsperarResult<SelectionSet> {
        let snapshot = Snapshot::new(page, 1);
        Ok(self.read_checked(&snapshot).await?)
    }

    async fn read_checked(&self, snapshot: &Snapshot<'_>) -> PageResult<SelectionSet> {
        let mut checked = SelectionSet::new();
        for checkbox in snapshot.find_all(&self.checkbox).await? {
            if checkbox.is_selected().await? {
                if let Some(id) = checkbox.attribute(&self.id_attribute).await? {
                    checked.toggle(id);
                }
            }
        }
        Ok(checked)
    }
}

/// The checkbox of one row
struct RowCheckbox<'a> {
    binding: &'a SelectionBinding,
    id: &'a str,
}

#[async_trait]
impl<'a> Condition for RowCheckbox<'a> {
    type Output = Element;

    async fn evaluate(&self, snapshot: &Snapshot<'_>) -> Evaluation<Element> {
        for checkbox in snapshot.find_all(&self.binding.checkbox).await? {
            let id = checkbox.attribute(&self.binding.id_attribute).await?;
            if id.as_deref() == Some(self.id) {
                return Ok(checkbox);
            }
        }
        Err(ConditionError::not_yet(format!("no checkbox for row {}", self.id)))
    }

    fn description(&self) -> String {
        format!(
            "{}[{}={:?}]",
            self.binding.checkbox, self.binding.id_attribute, self.id
        )
    }
}

/// Checked controls (and display, when bound) match the model
struct Agrees<'a> {
    binding: &'a SelectionBinding,
    expected: &'a SelectionSet,
}

#[async_trait]
impl<'a> Condition for Agrees<'a> {
    type Output = SelectionSet;

    async fn evaluate(&self, snapshot: &Snapshot<'_>) -> Evaluation<SelectionSet> {
        let checked = self.binding.read_checked(snapshot).await?;
        if checked.as_set() != self.expected.as_set() {
            return Err(ConditionError::not_yet(format!(
                "checked {}",
                checked.render()
            )));
        }
        if let Some((selector, separator)) = &self.binding.display {
            let shown = match snapshot.find(selector).await? {
                Some(element) => element.text().await?,
                None => String::new(),
            };
            if !self.expected.matches_listing(&shown, separator) {
                return Err(ConditionError::not_yet(format!("display showed {shown:?}")));
            }
        }
        Ok(self.expected.clone())
    }

    fn description(&self) -> String {
        format!("selection to equal {}", self.expected.render())
    }
}
