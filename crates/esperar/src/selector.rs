//! Selectors for addressing elements on the Page Query Surface.
//!
//! Every variant renders to a CSS selector so that any driver able to run
//! `querySelectorAll` can resolve it. `CssWithText` narrows the CSS match to
//! elements whose text contains a fragment; drivers apply the text filter
//! after the CSS lookup.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Selector type for locating elements
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selector {
    /// CSS selector (e.g., "tbody tr.data-row")
    Css(String),
    /// Single class name (e.g., "modal-content")
    ClassName(String),
    /// Tag name (e.g., "th")
    TagName(String),
    /// Element id attribute
    Id(String),
    /// Test ID selector (data-testid attribute)
    TestId(String),
    /// CSS selector with a text content filter
    CssWithText {
        /// Base CSS selector
        css: String,
        /// Text content to match
        text: String,
    },
}

impl Selector {
    /// Create a CSS selector
    #[must_use]
    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css(selector.into())
    }

    /// Create a class-name selector
    #[must_use]
    pub fn class(name: impl Into<String>) -> Self {
        Self::ClassName(name.into())
    }

    /// Create a tag-name selector
    #[must_use]
    pub fn tag(name: impl Into<String>) -> Self {
        Self::TagName(name.into())
    }

    /// Create an id selector
    #[must_use]
    pub fn id(id: impl Into<String>) -> Self {
        Self::Id(id.into())
    }

    /// Create a test ID selector
    #[must_use]
    pub fn test_id(id: impl Into<String>) -> Self {
        Self::TestId(id.into())
    }

    /// Narrow this selector to elements containing `text`
    #[must_use]
    pub fn with_text(self, text: impl Into<String>) -> Self {
        Self::CssWithText {
            css: self.to_css(),
            text: text.into(),
        }
    }

    /// Render as a CSS selector
    #[must_use]
    pub fn to_css(&self) -> String {
        match self {
            Self::Css(s) => s.clone(),
            Self::ClassName(c) => format!(".{c}"),
            Self::TagName(t) => t.clone(),
            Self::Id(id) => format!("#{id}"),
            Self::TestId(id) => format!("[data-testid={id:?}]"),
            Self::CssWithText { css, .. } => css.clone(),
        }
    }

    /// Text filter applied after the CSS lookup, if any
    #[must_use]
    pub fn text_filter(&self) -> Option<&str> {
        match self {
            Self::CssWithText { text, .. } => Some(text),
            _ => None,
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CssWithText { css, text } => write!(f, "{css} :has-text({text:?})"),
            other => f.write_str(&other.to_css()),
        }
    }
}

impl From<&str> for Selector {
    fn from(css: &str) -> Self {
        Self::css(css)
    }
}

impl From<String> for Selector {
    fn from(css: String) -> Self {
        Self::Css(css)
    }
}
