//! Chromium DevTools Protocol page adapter.
//!
//! [`CdpPage`] implements [`PageQuery`] over a `chromiumoxide` page so the
//! poller can drive a real browser. Native dialogs are tracked from CDP
//! events because the protocol has no "current dialog" query.
//!
//! Scripts are run the way WebDriver runs them: as a function body, so a
//! script may `return` its value.

use crate::page::{Alert, AlertHandle, Element, ElementHandle, PageQuery};
use crate::result::{PageError, PageResult};
use crate::selector::Selector;
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::page::{
    EventJavascriptDialogClosed, EventJavascriptDialogOpening, HandleJavaScriptDialogParams,
};
use chromiumoxide::Page;
use futures::StreamExt;
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use tracing::debug;

const IS_VISIBLE_FN: &str = "function() { \
    const s = window.getComputedStyle(this); \
    const r = this.getBoundingClientRect(); \
    return s.display !== 'none' && s.visibility !== 'hidden' && r.width > 0 && r.height > 0; }";

const IS_ENABLED_FN: &str = "function() { return !this.disabled; }";

const IS_SELECTED_FN: &str = "function() { return !!(this.checked || this.selected); }";

const VALUE_FN: &str = "function() { return this.value == null ? '' : String(this.value); }";

type DialogSlot = Arc<Mutex<Option<String>>>;

/// A Chromium page reachable through CDP
pub struct CdpPage {
    page: Page,
    dialog: DialogSlot,
    listeners: Vec<JoinHandle<()>>,
}

impl CdpPage {
    /// Wrap `page` and start tracking its JavaScript dialogs
    pub async fn new(page: Page) -> PageResult<Self> {
        let dialog: DialogSlot = Arc::default();

        let mut opened = page
            .event_listener::<EventJavascriptDialogOpening>()
            .await
            .map_err(transport)?;
        let slot = Arc::clone(&dialog);
        let on_open = tokio::spawn(async move {
            while let Some(event) = opened.next().await {
                debug!(message = %event.message, "dialog opened");
                *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(event.message.clone());
            }
        });

        let mut closed = page
            .event_listener::<EventJavascriptDialogClosed>()
            .await
            .map_err(transport)?;
        let slot = Arc::clone(&dialog);
        let on_close = tokio::spawn(async move {
            while closed.next().await.is_some() {
                slot.lock().unwrap_or_else(PoisonError::into_inner).take();
            }
        });

        Ok(Self {
            page,
            dialog,
            listeners: vec![on_open, on_close],
        })
    }

    /// The underlying chromiumoxide page
    #[must_use]
    pub const fn inner(&self) -> &Page {
        &self.page
    }

    /// Navigate to `url`
    pub async fn goto(&self, url: &str) -> PageResult<()> {
        self.page.goto(url).await.map_err(transport)?;
        Ok(())
    }
}

impl fmt::Debug for CdpPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CdpPage")
            .field("dialog", &self.dialog)
            .finish_non_exhaustive()
    }
}

impl Drop for CdpPage {
    fn drop(&mut self) {
        for listener in &self.listeners {
            listener.abort();
        }
    }
}

fn transport(err: impl fmt::Display) -> PageError {
    PageError::transport(err.to_string())
}

fn stale(err: impl fmt::Display) -> PageError {
    PageError::stale(err.to_string())
}

fn as_script_body(script: &str) -> String {
    format!("(() => {{ {script} }})()")
}

async fn filter_by_text(
    elements: Vec<chromiumoxide::Element>,
    selector: &Selector,
) -> PageResult<Vec<Element>> {
    let mut matched = Vec::with_capacity(elements.len());
    for element in elements {
        if let Some(fragment) = selector.text_filter() {
            let text = element.inner_text().await.map_err(stale)?.unwrap_or_default();
            if !text.contains(fragment) {
                continue;
            }
        }
        matched.push(Box::new(CdpElement { element }) as Element);
    }
    Ok(matched)
}

#[async_trait]
impl PageQuery for CdpPage {
    async fn find_all(&self, selector: &Selector) -> PageResult<Vec<Element>> {
        let elements = self
            .page
            .find_elements(selector.to_css())
            .await
            .map_err(transport)?;
        filter_by_text(elements, selector).await
    }

    async fn execute_script(&self, script: &str) -> PageResult<Value> {
        let result = self
            .page
            .evaluate(as_script_body(script))
            .await
            .map_err(|e| PageError::script(e.to_string()))?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    async fn current_alert(&self) -> PageResult<Option<Alert>> {
        let open = self
            .dialog
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        Ok(open.map(|message| {
            Box::new(CdpAlert {
                page: self.page.clone(),
                slot: Arc::clone(&self.dialog),
                message,
            }) as Alert
        }))
    }

    async fn close(&self) -> PageResult<()> {
        self.page.clone().close().await.map_err(transport)
    }
}

/// Element handle backed by a CDP remote object
pub struct CdpElement {
    element: chromiumoxide::Element,
}

impl fmt::Debug for CdpElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CdpElement")
            .field("node", &self.element.node_id)
            .finish()
    }
}

impl CdpElement {
    async fn call_bool(&self, function: &str) -> PageResult<bool> {
        let returns = self
            .element
            .call_js_fn(function, false)
            .await
            .map_err(stale)?;
        Ok(returns
            .result
            .value
            .as_ref()
            .and_then(Value::as_bool)
            .unwrap_or(false))
    }

    async fn call_string(&self, function: &str) -> PageResult<String> {
        let returns = self
            .element
            .call_js_fn(function, false)
            .await
            .map_err(stale)?;
        Ok(returns
            .result
            .value
            .as_ref()
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_default())
    }
}

#[async_trait]
impl ElementHandle for CdpElement {
    async fn is_visible(&self) -> PageResult<bool> {
        self.call_bool(IS_VISIBLE_FN).await
    }

    async fn text(&self) -> PageResult<String> {
        Ok(self
            .element
            .inner_text()
            .await
            .map_err(stale)?
            .unwrap_or_default())
    }

    async fn attribute(&self, name: &str) -> PageResult<Option<String>> {
        self.element.attribute(name).await.map_err(stale)
    }

    async fn is_selected(&self) -> PageResult<bool> {
        self.call_bool(IS_SELECTED_FN).await
    }

    async fn value(&self) -> PageResult<String> {
        self.call_string(VALUE_FN).await
    }

    async fn click(&self) -> PageResult<()> {
        self.element.click().await.map_err(stale)?;
        Ok(())
    }

    async fn send_keys(&self, text: &str) -> PageResult<()> {
        self.element.type_str(text).await.map_err(stale)?;
        Ok(())
    }

    async fn is_enabled(&self) -> PageResult<bool> {
        self.call_bool(IS_ENABLED_FN).await
    }

    async fn find_all(&self, selector: &Selector) -> PageResult<Vec<Element>> {
        let elements = self
            .element
            .find_elements(selector.to_css())
            .await
            .map_err(stale)?;
        filter_by_text(elements, selector).await
    }
}

/// An open JavaScript dialog
pub struct CdpAlert {
    page: Page,
    slot: DialogSlot,
    message: String,
}

impl fmt::Debug for CdpAlert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CdpAlert")
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

impl CdpAlert {
    async fn resolve(&self, accept: bool) -> PageResult<()> {
        self.page
            .execute(HandleJavaScriptDialogParams::new(accept))
            .await
            .map_err(stale)?;
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).take();
        Ok(())
    }
}

#[async_trait]
impl AlertHandle for CdpAlert {
    async fn text(&self) -> PageResult<String> {
        Ok(self.message.clone())
    }

    async fn accept(&self) -> PageResult<()> {
        self.resolve(true).await
    }

    async fn dismiss(&self) -> PageResult<()> {
        self.resolve(false).await
    }
}
