//! In-memory collaborators for engine tests.
//!
//! `FakeDom` treats selectors as opaque tags attached to nodes, plus the
//! three shapes the engine itself writes: `#id`, `.class` and bare tag names.
//! With [`FakeDom::renumber_released`] it also hands out fresh ids for
//! elements whose handles were released, like `WebDom` does.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::rc::Rc;

use crate::bridge::{MessageChannel, OutboundMessage, QuestionSummary};
use crate::dom::{
    ChildNode, HostDom, NodeId, Overflow, Rect, ScrollHandle, ScrollMetrics, Viewport,
};
use crate::error::{RailError, Result};
use crate::favorites::{FavoriteEntry, FavoritesStore};

// ============================================================================
// FakeDom
// ============================================================================

#[derive(Debug, Clone)]
enum Slot {
    Text(String),
    Node(NodeId),
}

#[derive(Debug, Clone, Default)]
struct FakeNode {
    tag: String,
    parent: Option<NodeId>,
    children: Vec<Slot>,
    selectors: BTreeSet<String>,
    attrs: BTreeMap<String, String>,
    classes: BTreeSet<String>,
    styles: BTreeMap<String, String>,
    inner_html: Option<String>,
    rect: Rect,
    overflow: Overflow,
    metrics: ScrollMetrics,
}

pub struct FakeDom {
    nodes: Vec<FakeNode>,
    body: NodeId,
    viewport: Viewport,
    host: String,
    href: String,
    smooth: bool,
    writes: usize,
    listened: Vec<(NodeId, NodeId)>,
    last_keep: Option<HashSet<NodeId>>,
    renumber: bool,
    /// Handle -> arena slot, for ids handed out after a release.
    aliases: HashMap<NodeId, NodeId>,
    /// Arena slot -> handle currently handed out.
    current: HashMap<NodeId, NodeId>,
    next_alias: u32,
    reads: HashMap<NodeId, usize>,
}

impl Default for FakeDom {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeDom {
    pub fn new() -> Self {
        let body = FakeNode {
            tag: "body".to_string(),
            ..FakeNode::default()
        };
        Self {
            nodes: vec![body],
            body: NodeId(0),
            viewport: Viewport {
                scroll_y: 0.0,
                inner_height: 800.0,
                document_scroll_height: 2000.0,
            },
            host: "chatgpt.com".to_string(),
            href: "https://chatgpt.com/c/first".to_string(),
            smooth: true,
            writes: 0,
            listened: Vec::new(),
            last_keep: None,
            renumber: false,
            aliases: HashMap::new(),
            current: HashMap::new(),
            next_alias: 1_000_000,
            reads: HashMap::new(),
        }
    }

    fn slot(&self, id: NodeId) -> NodeId {
        self.aliases.get(&id).copied().unwrap_or(id)
    }

    fn surface(&self, slot: NodeId) -> NodeId {
        self.current.get(&slot).copied().unwrap_or(slot)
    }

    fn node(&self, id: NodeId) -> &FakeNode {
        &self.nodes[self.slot(id).0 as usize]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut FakeNode {
        let slot = self.slot(id);
        &mut self.nodes[slot.0 as usize]
    }

    fn new_node(&mut self, tag: &str) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(FakeNode {
            tag: tag.to_string(),
            ..FakeNode::default()
        });
        id
    }

    fn element_children(&self, id: NodeId) -> Vec<NodeId> {
        self.node(id)
            .children
            .iter()
            .filter_map(|s| match s {
                Slot::Node(n) => Some(*n),
                Slot::Text(_) => None,
            })
            .collect()
    }

    fn preorder(&self, root: NodeId, out: &mut Vec<NodeId>) {
        out.push(root);
        for child in self.element_children(root) {
            self.preorder(child, out);
        }
    }

    fn connected(&self, id: NodeId) -> bool {
        let mut current = Some(self.slot(id));
        while let Some(n) = current {
            if n == self.body {
                return true;
            }
            current = self.node(n).parent;
        }
        false
    }

    fn selector_matches(&self, id: NodeId, selector: &str) -> bool {
        let n = self.node(id);
        if n.selectors.contains(selector) {
            return true;
        }
        if let Some(id_sel) = selector.strip_prefix('#') {
            return n.attrs.get("id").map(String::as_str) == Some(id_sel);
        }
        if let Some(class) = selector.strip_prefix('.') {
            return n.classes.contains(class);
        }
        selector.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
            && n.tag.eq_ignore_ascii_case(selector)
    }

    fn unlink(&mut self, id: NodeId) {
        let id = self.slot(id);
        if let Some(parent) = self.node_mut(id).parent.take() {
            self.node_mut(parent)
                .children
                .retain(|s| !matches!(s, Slot::Node(n) if *n == id));
        }
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        for slot in &self.node(id).children {
            match slot {
                Slot::Text(t) => out.push_str(t),
                Slot::Node(n) => self.collect_text(*n, out),
            }
        }
    }

    // ---- building ----

    pub fn body_id(&self) -> NodeId {
        self.body
    }

    /// Append a host element tagged with `selectors`. Not counted as a write.
    pub fn add(&mut self, parent: NodeId, tag: &str, selectors: &[&str]) -> NodeId {
        let id = self.new_node(tag);
        self.node_mut(id).selectors = selectors.iter().map(|s| s.to_string()).collect();
        self.attach(parent, id);
        id
    }

    pub fn add_text(&mut self, node: NodeId, text: &str) {
        self.node_mut(node).children.push(Slot::Text(text.to_string()));
    }

    /// Replace all text children of `node`.
    pub fn set_text(&mut self, node: NodeId, text: &str) {
        let n = self.node_mut(node);
        n.children.retain(|s| matches!(s, Slot::Node(_)));
        n.children.insert(0, Slot::Text(text.to_string()));
    }

    pub fn attach(&mut self, parent: NodeId, child: NodeId) {
        let (parent, child) = (self.slot(parent), self.slot(child));
        self.unlink(child);
        self.node_mut(child).parent = Some(parent);
        self.node_mut(parent).children.push(Slot::Node(child));
    }

    pub fn detach(&mut self, node: NodeId) {
        self.unlink(node);
    }

    pub fn tag(&mut self, node: NodeId, selector: &str) {
        self.node_mut(node).selectors.insert(selector.to_string());
    }

    pub fn untag(&mut self, node: NodeId, selector: &str) {
        self.node_mut(node).selectors.remove(selector);
    }

    pub fn set_attr(&mut self, node: NodeId, name: &str, value: &str) {
        self.node_mut(node)
            .attrs
            .insert(name.to_string(), value.to_string());
    }

    pub fn set_rect(&mut self, node: NodeId, rect: Rect) {
        self.node_mut(node).rect = rect;
    }

    pub fn set_scrollable(
        &mut self,
        node: NodeId,
        overflow: Overflow,
        scroll_height: f64,
        client_height: f64,
    ) {
        let n = self.node_mut(node);
        n.overflow = overflow;
        n.metrics.scroll_height = scroll_height;
        n.metrics.client_height = client_height;
    }

    pub fn set_viewport(&mut self, document_scroll_height: f64, inner_height: f64) {
        self.viewport.document_scroll_height = document_scroll_height;
        self.viewport.inner_height = inner_height;
    }

    pub fn set_window_scroll(&mut self, y: f64) {
        self.viewport.scroll_y = y;
    }

    pub fn window_scroll(&self) -> f64 {
        self.viewport.scroll_y
    }

    pub fn set_location(&mut self, host: &str, href: &str) {
        self.host = host.to_string();
        self.href = href.to_string();
    }

    pub fn disable_smooth_scroll(&mut self) {
        self.smooth = false;
    }

    /// Released elements come back under new ids on their next lookup.
    pub fn renumber_released(&mut self) {
        self.renumber = true;
    }

    // ---- inspection ----

    /// DOM writes made through [`HostDom`] since the last reset.
    pub fn writes(&self) -> usize {
        self.writes
    }

    pub fn reset_writes(&mut self) {
        self.writes = 0;
    }

    pub fn connected_node(&self, node: NodeId) -> bool {
        self.connected(node)
    }

    pub fn children_of(&self, node: NodeId) -> Vec<NodeId> {
        self.element_children(node)
            .into_iter()
            .map(|n| self.surface(n))
            .collect()
    }

    pub fn parent_of(&self, node: NodeId) -> Option<NodeId> {
        self.node(node).parent.map(|p| self.surface(p))
    }

    /// Text reads (child walks and `textContent`) on `node`.
    pub fn reads(&self, node: NodeId) -> usize {
        self.reads.get(&self.slot(node)).copied().unwrap_or(0)
    }

    fn count_read(&mut self, node: NodeId) {
        let slot = self.slot(node);
        *self.reads.entry(slot).or_insert(0) += 1;
    }

    pub fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.node(node).classes.contains(class)
    }

    pub fn style(&self, node: NodeId, property: &str) -> Option<String> {
        self.node(node).styles.get(property).cloned()
    }

    pub fn attr(&self, node: NodeId, name: &str) -> Option<String> {
        self.node(node).attrs.get(name).cloned()
    }

    pub fn html(&self, node: NodeId) -> Option<String> {
        self.node(node).inner_html.clone()
    }

    pub fn listened(&self) -> &[(NodeId, NodeId)] {
        &self.listened
    }

    pub fn last_keep(&self) -> Option<&HashSet<NodeId>> {
        self.last_keep.as_ref()
    }

    /// Connected nodes carrying `class`, in document order.
    pub fn with_class(&self, class: &str) -> Vec<NodeId> {
        let mut all = Vec::new();
        self.preorder(self.body, &mut all);
        all.into_iter()
            .filter(|n| self.node(*n).classes.contains(class))
            .map(|n| self.surface(n))
            .collect()
    }
}

impl HostDom for FakeDom {
    fn query_all(&mut self, selector: &str) -> Vec<NodeId> {
        let mut all = Vec::new();
        self.preorder(self.body, &mut all);
        all.into_iter()
            .filter(|n| self.selector_matches(*n, selector))
            .map(|n| self.surface(n))
            .collect()
    }

    fn query_within(&mut self, root: NodeId, selector: &str) -> Vec<NodeId> {
        let mut all = Vec::new();
        self.preorder(self.slot(root), &mut all);
        all.into_iter()
            .skip(1)
            .filter(|n| self.selector_matches(*n, selector))
            .map(|n| self.surface(n))
            .collect()
    }

    fn closest(&mut self, node: NodeId, selector: &str) -> Option<NodeId> {
        let mut current = Some(self.slot(node));
        while let Some(n) = current {
            if self.selector_matches(n, selector) {
                return Some(self.surface(n));
            }
            current = self.node(n).parent;
        }
        None
    }

    fn matches(&mut self, node: NodeId, selector: &str) -> bool {
        self.selector_matches(node, selector)
    }

    fn parent(&mut self, node: NodeId) -> Option<NodeId> {
        self.parent_of(node)
    }

    fn body(&mut self) -> Option<NodeId> {
        Some(self.body)
    }

    fn is_connected(&mut self, node: NodeId) -> bool {
        self.connected(node)
    }

    fn children(&mut self, node: NodeId) -> Vec<ChildNode> {
        self.count_read(node);
        self.node(node)
            .children
            .iter()
            .map(|s| match s {
                Slot::Text(t) => ChildNode::Text(t.clone()),
                Slot::Node(n) => ChildNode::Element(self.surface(*n)),
            })
            .collect()
    }

    fn tag_name(&mut self, node: NodeId) -> String {
        self.node(node).tag.to_ascii_uppercase()
    }

    fn attribute(&mut self, node: NodeId, name: &str) -> Option<String> {
        self.node(node).attrs.get(name).cloned()
    }

    fn text_content(&mut self, node: NodeId) -> String {
        self.count_read(node);
        let mut out = String::new();
        self.collect_text(node, &mut out);
        out
    }

    fn location_href(&mut self) -> String {
        self.href.clone()
    }

    fn location_host(&mut self) -> String {
        self.host.clone()
    }

    fn bounding_rect(&mut self, node: NodeId) -> Rect {
        self.node(node).rect
    }

    fn overflow_y(&mut self, node: NodeId) -> Overflow {
        self.node(node).overflow
    }

    fn scroll_metrics(&mut self, node: NodeId) -> ScrollMetrics {
        self.node(node).metrics
    }

    fn viewport(&mut self) -> Viewport {
        self.viewport
    }

    fn smooth_scroll(&mut self, target: ScrollHandle, top: f64) -> bool {
        if !self.smooth {
            return false;
        }
        self.set_scroll_top(target, top);
        true
    }

    fn set_scroll_top(&mut self, target: ScrollHandle, top: f64) {
        match target {
            ScrollHandle::Viewport => self.viewport.scroll_y = top,
            ScrollHandle::Element(el) => self.node_mut(el).metrics.scroll_top = top,
        }
    }

    fn create_element(&mut self, tag: &str) -> NodeId {
        self.writes += 1;
        self.new_node(tag)
    }

    fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.writes += 1;
        self.attach(parent, child);
    }

    fn remove(&mut self, node: NodeId) {
        self.writes += 1;
        self.unlink(node);
    }

    fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) {
        self.writes += 1;
        self.set_attr(node, name, value);
    }

    fn set_class(&mut self, node: NodeId, class: &str, on: bool) {
        self.writes += 1;
        let classes = &mut self.node_mut(node).classes;
        if on {
            classes.insert(class.to_string());
        } else {
            classes.remove(class);
        }
    }

    fn set_style(&mut self, node: NodeId, property: &str, value: &str) {
        self.writes += 1;
        self.node_mut(node)
            .styles
            .insert(property.to_string(), value.to_string());
    }

    fn set_inner_html(&mut self, node: NodeId, html: &str) {
        self.writes += 1;
        self.node_mut(node).inner_html = Some(html.to_string());
    }

    fn listen_marker(&mut self, marker: NodeId, tooltip: NodeId) {
        self.listened.push((marker, tooltip));
    }

    fn release_except(&mut self, keep: &HashSet<NodeId>) {
        self.last_keep = Some(keep.clone());
        if !self.renumber {
            return;
        }
        let kept: HashSet<NodeId> = keep.iter().map(|id| self.slot(*id)).collect();
        for index in 0..self.nodes.len() {
            let slot = NodeId(index as u32);
            if slot == self.body || kept.contains(&slot) {
                continue;
            }
            let fresh = NodeId(self.next_alias);
            self.next_alias += 1;
            self.aliases.insert(fresh, slot);
            self.current.insert(slot, fresh);
        }
    }
}

// ============================================================================
// MemoryStore
// ============================================================================

/// Shared in-memory favorites list. Clones see the same data, like two
/// surfaces reading one extension storage area.
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Rc<RefCell<Vec<FavoriteEntry>>>,
    failure: Rc<RefCell<Option<RailError>>>,
    loads: Rc<RefCell<usize>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(entries: Vec<FavoriteEntry>) -> Self {
        let store = Self::default();
        *store.entries.borrow_mut() = entries;
        store
    }

    pub fn snapshot(&self) -> Vec<FavoriteEntry> {
        self.entries.borrow().clone()
    }

    /// Make every following load and save fail with `error` (or succeed on `None`).
    pub fn fail_with(&self, error: Option<RailError>) {
        *self.failure.borrow_mut() = error;
    }

    pub fn loads(&self) -> usize {
        *self.loads.borrow()
    }
}

impl FavoritesStore for MemoryStore {
    async fn load(&self) -> Result<Vec<FavoriteEntry>> {
        *self.loads.borrow_mut() += 1;
        if let Some(e) = self.failure.borrow().clone() {
            return Err(e);
        }
        Ok(self.snapshot())
    }

    async fn save(&self, entries: &[FavoriteEntry]) -> Result<()> {
        if let Some(e) = self.failure.borrow().clone() {
            return Err(e);
        }
        *self.entries.borrow_mut() = entries.to_vec();
        Ok(())
    }
}

// ============================================================================
// RecordingChannel
// ============================================================================

#[derive(Default)]
pub struct RecordingChannel {
    sent: RefCell<Vec<OutboundMessage>>,
    failure: Option<RailError>,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(error: RailError) -> Self {
        Self {
            sent: RefCell::new(Vec::new()),
            failure: Some(error),
        }
    }

    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.borrow().clone()
    }

    /// Questions of the most recent list message.
    pub fn last_questions(&self) -> Vec<QuestionSummary> {
        match self.sent.borrow().last() {
            Some(OutboundMessage::QuestionList { questions }) => questions.clone(),
            None => Vec::new(),
        }
    }
}

impl MessageChannel for RecordingChannel {
    fn send(&self, message: &OutboundMessage) -> Result<()> {
        if let Some(e) = &self.failure {
            return Err(e.clone());
        }
        self.sent.borrow_mut().push(message.clone());
        Ok(())
    }
}
