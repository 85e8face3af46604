//! Mock Page Query Surface for unit testing.
//!
//! [`MockPage`] is a scriptable in-memory DOM. Nodes are registered under
//! selectors; lookups match on the selector's CSS rendering, so
//! `Selector::class("modal-content")` and `Selector::css(".modal-content")`
//! address the same nodes. Clicks and typing run reactions against the DOM,
//! and mutations can be scheduled on the tokio clock to model asynchronous
//! rendering (pair with `#[tokio::test(start_paused = true)]`).

use crate::page::{Alert, AlertHandle, Element, ElementHandle, PageQuery};
use crate::result::{PageError, PageResult};
use crate::selector::Selector;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Identifier of a node inside a [`MockDom`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// DOM reaction run on click, typing, or a scheduled tick
pub type Mutation = Arc<dyn Fn(&mut MockDom) + Send + Sync>;

/// Builder for a node's initial state
#[derive(Clone)]
pub struct MockNode {
    text: String,
    visible: bool,
    enabled: bool,
    attributes: HashMap<String, String>,
    checkbox: bool,
    selected: bool,
    value: String,
    on_click: Vec<Mutation>,
    on_keys: Vec<Mutation>,
}

impl MockNode {
    /// A visible, enabled node with no text
    #[must_use]
    pub fn new() -> Self {
        Self {
            text: String::new(),
            visible: true,
            enabled: true,
            attributes: HashMap::new(),
            checkbox: false,
            selected: false,
            value: String::new(),
            on_click: Vec::new(),
            on_keys: Vec::new(),
        }
    }

    /// Set text content
    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Start hidden
    #[must_use]
    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    /// Set enabled state
    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set an attribute
    #[must_use]
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Behave like a checkbox rendered with `checked` markup when `checked`.
    ///
    /// Clicks toggle the live checked state only; the markup attribute keeps
    /// its initial value, as in a browser.
    #[must_use]
    pub fn checkbox(mut self, checked: bool) -> Self {
        self.checkbox = true;
        self.selected = checked;
        if checked {
            self.attributes.insert("checked".to_string(), "checked".to_string());
        }
        self
    }

    /// Run `mutation` whenever the node is clicked
    #[must_use]
    pub fn on_click(mut self, mutation: impl Fn(&mut MockDom) + Send + Sync + 'static) -> Self {
        self.on_click.push(Arc::new(mutation));
        self
    }

    /// Run `mutation` whenever text is typed into the node
    #[must_use]
    pub fn on_keys(mut self, mutation: impl Fn(&mut MockDom) + Send + Sync + 'static) -> Self {
        self.on_keys.push(Arc::new(mutation));
        self
    }
}

impl Default for MockNode {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MockNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockNode")
            .field("text", &self.text)
            .field("visible", &self.visible)
            .field("enabled", &self.enabled)
            .field("attributes", &self.attributes)
            .field("selected", &self.selected)
            .field("value", &self.value)
            .finish_non_exhaustive()
    }
}

struct NodeState {
    props: MockNode,
    attached: bool,
    children: Vec<(String, NodeId)>,
}

struct Scheduled {
    due: Instant,
    mutation: Mutation,
}

/// In-memory document backing a [`MockPage`]
#[derive(Default)]
pub struct MockDom {
    nodes: Vec<NodeState>,
    roots: Vec<(String, NodeId)>,
    scripts: HashMap<String, VecDeque<Value>>,
    script_reactions: HashMap<String, Vec<Mutation>>,
    alert: Option<String>,
    scheduled: Vec<Scheduled>,
    history: Vec<String>,
    closed: bool,
}

impl MockDom {
    /// Register a new node under `selector`
    pub fn insert(&mut self, selector: impl Into<Selector>, node: MockNode) -> NodeId {
        let id = self.alloc(node);
        self.roots.push((selector.into().to_css(), id));
        id
    }

    /// Register a new node as a child of `parent`, addressable from it
    pub fn insert_child(
        &mut self,
        parent: NodeId,
        selector: impl Into<Selector>,
        node: MockNode,
    ) -> NodeId {
        let id = self.alloc(node);
        if let Some(state) = self.nodes.get_mut(parent.0) {
            state.children.push((selector.into().to_css(), id));
        }
        id
    }

    /// Make an existing node addressable under another page-level selector
    pub fn alias(&mut self, selector: impl Into<Selector>, id: NodeId) {
        self.roots.push((selector.into().to_css(), id));
    }

    /// Detach every node matching `selector`; held handles turn stale
    pub fn remove(&mut self, selector: impl Into<Selector>) {
        for id in self.matching(&selector.into()) {
            self.detach(id);
        }
    }

    /// Detach one node and its children
    pub fn detach(&mut self, id: NodeId) {
        let children: Vec<NodeId> = match self.nodes.get_mut(id.0) {
            Some(state) => {
                state.attached = false;
                state.children.iter().map(|(_, c)| *c).collect()
            }
            None => return,
        };
        for child in children {
            self.detach(child);
        }
    }

    /// Show or hide every node matching `selector`
    pub fn set_visible(&mut self, selector: impl Into<Selector>, visible: bool) {
        for id in self.matching(&selector.into()) {
            self.node_mut(id).props.visible = visible;
        }
    }

    /// Show or hide one node
    pub fn set_node_visible(&mut self, id: NodeId, visible: bool) {
        if let Some(state) = self.nodes.get_mut(id.0) {
            state.props.visible = visible;
        }
    }

    /// Enable or disable every node matching `selector`
    pub fn set_enabled(&mut self, selector: impl Into<Selector>, enabled: bool) {
        for id in self.matching(&selector.into()) {
            self.node_mut(id).props.enabled = enabled;
        }
    }

    /// Replace the text of every node matching `selector`
    pub fn set_text(&mut self, selector: impl Into<Selector>, text: impl Into<String>) {
        let text = text.into();
        for id in self.matching(&selector.into()) {
            self.node_mut(id).props.text.clone_from(&text);
        }
    }

    /// Set or remove (`None`) an attribute on one node
    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: Option<&str>) {
        if let Some(state) = self.nodes.get_mut(id.0) {
            match value {
                Some(v) => {
                    state.props.attributes.insert(name.to_string(), v.to_string());
                }
                None => {
                    state.props.attributes.remove(name);
                }
            }
        }
    }

    /// Read an attribute of one node
    #[must_use]
    pub fn attribute(&self, id: NodeId, name: &str) -> Option<String> {
        self.nodes
            .get(id.0)
            .and_then(|s| s.props.attributes.get(name).cloned())
    }

    /// Live checked state of one node
    #[must_use]
    pub fn is_selected(&self, id: NodeId) -> bool {
        self.nodes.get(id.0).is_some_and(|s| s.props.selected)
    }

    /// Set the live checked state of one node, leaving its markup alone
    pub fn set_selected(&mut self, id: NodeId, selected: bool) {
        if let Some(state) = self.nodes.get_mut(id.0) {
            state.props.selected = selected;
        }
    }

    /// Live `value` of one node, i.e. what has been typed into it
    #[must_use]
    pub fn value(&self, id: NodeId) -> Option<String> {
        self.nodes.get(id.0).map(|s| s.props.value.clone())
    }

    /// Open a native dialog with `message`
    pub fn open_alert(&mut self, message: impl Into<String>) {
        self.alert = Some(message.into());
    }

    /// Apply `mutation` once the tokio clock has advanced by `delay`
    pub fn schedule(&mut self, delay: Duration, mutation: impl Fn(&mut Self) + Send + Sync + 'static) {
        self.scheduled.push(Scheduled {
            due: Instant::now() + delay,
            mutation: Arc::new(mutation),
        });
    }

    /// Attached nodes matching `selector`, in registration order
    #[must_use]
    pub fn matching(&self, selector: &Selector) -> Vec<NodeId> {
        self.filter(&self.roots, selector)
    }

    /// Number of attached nodes matching `selector`
    #[must_use]
    pub fn count(&self, selector: &Selector) -> usize {
        self.matching(selector).len()
    }

    fn alloc(&mut self, node: MockNode) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeState {
            props: node,
            attached: true,
            children: Vec::new(),
        });
        id
    }

    fn node_mut(&mut self, id: NodeId) -> &mut NodeState {
        &mut self.nodes[id.0]
    }

    fn filter(&self, entries: &[(String, NodeId)], selector: &Selector) -> Vec<NodeId> {
        let css = selector.to_css();
        entries
            .iter()
            .filter(|(key, id)| {
                *key == css
                    && self.nodes[id.0].attached
                    && selector
                        .text_filter()
                        .map_or(true, |t| self.nodes[id.0].props.text.contains(t))
            })
            .map(|(_, id)| *id)
            .collect()
    }

    fn live(&self, id: NodeId) -> PageResult<&NodeState> {
        match self.nodes.get(id.0) {
            Some(state) if state.attached => Ok(state),
            _ => Err(PageError::stale(format!("node {} is detached", id.0))),
        }
    }

    fn run_due(&mut self, now: Instant) {
        let (due, pending): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.scheduled).into_iter().partition(|s| s.due <= now);
        self.scheduled = pending;
        for scheduled in due {
            (scheduled.mutation)(self);
        }
    }
}

impl fmt::Debug for MockDom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockDom")
            .field("nodes", &self.nodes.len())
            .field("alert", &self.alert)
            .field("pending_mutations", &self.scheduled.len())
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// MOCK PAGE
// =============================================================================

/// Scriptable page for tests
#[derive(Debug, Clone, Default)]
pub struct MockPage {
    dom: Arc<Mutex<MockDom>>,
}

impl MockPage {
    /// Create an empty page
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mutate the DOM directly
    pub fn with_dom<R>(&self, f: impl FnOnce(&mut MockDom) -> R) -> R {
        let mut dom = self.dom.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut dom)
    }

    /// Register a node under `selector`
    pub fn insert(&self, selector: impl Into<Selector>, node: MockNode) -> NodeId {
        self.with_dom(|dom| dom.insert(selector, node))
    }

    /// Register `n` nodes under `selector`
    pub fn insert_many(&self, selector: impl Into<Selector>, n: usize) -> Vec<NodeId> {
        let selector = selector.into();
        self.with_dom(|dom| (0..n).map(|_| dom.insert(selector.clone(), MockNode::new())).collect())
    }

    /// Register a child node addressable from `parent`
    pub fn insert_child(
        &self,
        parent: NodeId,
        selector: impl Into<Selector>,
        node: MockNode,
    ) -> NodeId {
        self.with_dom(|dom| dom.insert_child(parent, selector, node))
    }

    /// Apply `mutation` once the tokio clock has advanced by `delay`
    pub fn schedule(&self, delay: Duration, mutation: impl Fn(&mut MockDom) + Send + Sync + 'static) {
        self.with_dom(|dom| dom.schedule(delay, mutation));
    }

    /// Results returned, in order, for `script`; the last one repeats
    pub fn set_script_results<V: Into<Value>>(
        &self,
        script: &str,
        results: impl IntoIterator<Item = V>,
    ) {
        let queue = results.into_iter().map(Into::into).collect();
        self.with_dom(|dom| {
            dom.scripts.insert(script.to_string(), queue);
        });
    }

    /// Run `mutation` every time `script` is executed
    pub fn on_script(&self, script: &str, mutation: impl Fn(&mut MockDom) + Send + Sync + 'static) {
        self.with_dom(|dom| {
            dom.script_reactions
                .entry(script.to_string())
                .or_default()
                .push(Arc::new(mutation));
        });
    }

    /// Open a native dialog
    pub fn open_alert(&self, message: impl Into<String>) {
        self.with_dom(|dom| dom.open_alert(message));
    }

    /// Whether a native dialog is open
    #[must_use]
    pub fn alert_open(&self) -> bool {
        self.with_dom(|dom| dom.alert.is_some())
    }

    /// Attached nodes matching `selector`
    #[must_use]
    pub fn count(&self, selector: &Selector) -> usize {
        self.with_dom(|dom| dom.count(selector))
    }

    /// Recorded calls, e.g. `"find_all:.modal-content"`, `"click:3"`
    #[must_use]
    pub fn history(&self) -> Vec<String> {
        self.with_dom(|dom| dom.history.clone())
    }

    /// Whether any recorded call starts with `prefix`
    #[must_use]
    pub fn was_called(&self, prefix: &str) -> bool {
        self.with_dom(|dom| dom.history.iter().any(|c| c.starts_with(prefix)))
    }

    /// Whether the page session was released
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.with_dom(|dom| dom.closed)
    }

    fn enter(&self, call: String) -> PageResult<std::sync::MutexGuard<'_, MockDom>> {
        let mut dom = self.dom.lock().unwrap_or_else(PoisonError::into_inner);
        if dom.closed {
            return Err(PageError::Closed);
        }
        dom.run_due(Instant::now());
        dom.history.push(call);
        Ok(dom)
    }

    fn handles(&self, ids: Vec<NodeId>) -> Vec<Element> {
        ids.into_iter()
            .map(|id| {
                Box::new(MockElement {
                    dom: Arc::clone(&self.dom),
                    id,
                }) as Element
            })
            .collect()
    }
}

#[async_trait]
impl PageQuery for MockPage {
    async fn find_all(&self, selector: &Selector) -> PageResult<Vec<Element>> {
        let ids = self.enter(format!("find_all:{selector}"))?.matching(selector);
        Ok(self.handles(ids))
    }

    async fn execute_script(&self, script: &str) -> PageResult<Value> {
        let mut dom = self.enter(format!("script:{script}"))?;
        let queue = dom
            .scripts
            .get_mut(script)
            .ok_or_else(|| PageError::script(format!("no mock result for {script:?}")))?;
        let value = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        let reactions = dom.script_reactions.get(script).cloned().unwrap_or_default();
        for mutation in reactions {
            mutation(&mut *dom);
        }
        Ok(value.unwrap_or(Value::Null))
    }

    async fn current_alert(&self) -> PageResult<Option<Alert>> {
        let dom = self.enter("current_alert".to_string())?;
        Ok(dom.alert.as_ref().map(|_| {
            Box::new(MockAlert {
                dom: Arc::clone(&self.dom),
            }) as Alert
        }))
    }

    async fn close(&self) -> PageResult<()> {
        self.enter("close".to_string())?.closed = true;
        Ok(())
    }
}

// =============================================================================
// HANDLES
// =============================================================================

/// Handle to a node of a [`MockPage`]
#[derive(Debug)]
pub struct MockElement {
    dom: Arc<Mutex<MockDom>>,
    id: NodeId,
}

impl MockElement {
    fn read<R>(&self, call: &str, f: impl FnOnce(&NodeState) -> R) -> PageResult<R> {
        let mut dom = self.dom.lock().unwrap_or_else(PoisonError::into_inner);
        dom.run_due(Instant::now());
        dom.history.push(format!("{call}:{}", self.id.0));
        dom.live(self.id).map(f)
    }

    fn react(&self, call: &str, typed: Option<&str>) -> PageResult<()> {
        let mut dom = self.dom.lock().unwrap_or_else(PoisonError::into_inner);
        dom.run_due(Instant::now());
        dom.history.push(format!("{call}:{}", self.id.0));
        let state = dom.live(self.id)?;
        if !state.props.visible || !state.props.enabled {
            return Err(PageError::script(format!(
                "node {} is not interactable",
                self.id.0
            )));
        }
        let reactions = match typed {
            Some(_) => state.props.on_keys.clone(),
            None => state.props.on_click.clone(),
        };
        let props = &mut dom.node_mut(self.id).props;
        match typed {
            Some(text) => props.value.push_str(text),
            None if props.checkbox => props.selected = !props.selected,
            None => {}
        }
        for mutation in reactions {
            mutation(&mut *dom);
        }
        Ok(())
    }
}

#[async_trait]
impl ElementHandle for MockElement {
    async fn is_visible(&self) -> PageResult<bool> {
        self.read("is_visible", |s| s.props.visible)
    }

    async fn text(&self) -> PageResult<String> {
        self.read("text", |s| s.props.text.clone())
    }

    async fn attribute(&self, name: &str) -> PageResult<Option<String>> {
        self.read("attribute", |s| s.props.attributes.get(name).cloned())
    }

    async fn is_selected(&self) -> PageResult<bool> {
        self.read("is_selected", |s| s.props.selected)
    }

    async fn value(&self) -> PageResult<String> {
        self.read("value", |s| s.props.value.clone())
    }

    async fn click(&self) -> PageResult<()> {
        self.react("click", None)
    }

    async fn send_keys(&self, text: &str) -> PageResult<()> {
        self.react("send_keys", Some(text))
    }

    async fn is_enabled(&self) -> PageResult<bool> {
        self.read("is_enabled", |s| s.props.enabled)
    }

    async fn find_all(&self, selector: &Selector) -> PageResult<Vec<Element>> {
        let ids = {
            let mut dom = self.dom.lock().unwrap_or_else(PoisonError::into_inner);
            dom.run_due(Instant::now());
            dom.history.push(format!("find_within:{}:{selector}", self.id.0));
            let children = dom.live(self.id)?.children.clone();
            dom.filter(&children, selector)
        };
        Ok(ids
            .into_iter()
            .map(|id| {
                Box::new(MockElement {
                    dom: Arc::clone(&self.dom),
                    id,
                }) as Element
            })
            .collect())
    }
}

/// Handle to the open dialog of a [`MockPage`]
#[derive(Debug)]
pub struct MockAlert {
    dom: Arc<Mutex<MockDom>>,
}

impl MockAlert {
    fn resolve(&self, call: &str) -> PageResult<()> {
        let mut dom = self.dom.lock().unwrap_or_else(PoisonError::into_inner);
        dom.history.push(call.to_string());
        dom.alert
            .take()
            .map(|_| ())
            .ok_or_else(|| PageError::stale("alert already closed"))
    }
}

#[async_trait]
impl AlertHandle for MockAlert {
    async fn text(&self) -> PageResult<String> {
        let dom = self.dom.lock().unwrap_or_else(PoisonError::into_inner);
        dom.alert
            .clone()
            .ok_or_else(|| PageError::stale("alert already closed"))
    }

    async fn accept(&self) -> PageResult<()> {
        self.resolve("alert:accept")
    }

    async fn dismiss(&self) -> PageResult<()> {
        self.resolve("alert:dismiss")
    }
}
