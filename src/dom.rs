//! Host DOM seam
//!
//! The engine never touches `web_sys` directly. It talks to a [`HostDom`]
//! through arena handles ([`NodeId`]), which keeps the reconciliation logic
//! testable against an in-memory document and lets the browser binding
//! decide how element references are held.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Arena handle for a DOM node. Stable for as long as the binding retains it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

/// What scrolls the conversation: the viewport or a specific element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScrollHandle {
    Viewport,
    Element(NodeId),
}

impl ScrollHandle {
    pub fn element(&self) -> Option<NodeId> {
        match self {
            ScrollHandle::Viewport => None,
            ScrollHandle::Element(id) => Some(*id),
        }
    }
}

/// Viewport-relative box, as `getBoundingClientRect` reports it.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub top: f64,
    pub left: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(top: f64, height: f64) -> Self {
        Self {
            top,
            left: 0.0,
            width: 0.0,
            height,
        }
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }
}

/// Computed `overflow-y`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Overflow {
    #[default]
    Visible,
    Hidden,
    Auto,
    Scroll,
    Overlay,
}

impl Overflow {
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "auto" => Overflow::Auto,
            "scroll" => Overflow::Scroll,
            "overlay" => Overflow::Overlay,
            "hidden" | "clip" => Overflow::Hidden,
            _ => Overflow::Visible,
        }
    }

    pub fn allows_scroll(&self) -> bool {
        matches!(self, Overflow::Auto | Overflow::Scroll | Overflow::Overlay)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScrollMetrics {
    pub scroll_top: f64,
    pub scroll_height: f64,
    pub client_height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Viewport {
    pub scroll_y: f64,
    pub inner_height: f64,
    pub document_scroll_height: f64,
}

/// One child of an element, as seen by the text walker.
#[derive(Debug, Clone, PartialEq)]
pub enum ChildNode {
    Text(String),
    Element(NodeId),
}

/// Pointer/interaction events the binding forwards for injected markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerEvent {
    /// Pointer entered the marker itself.
    Enter,
    /// Pointer entered the marker's tooltip.
    TooltipEnter,
    /// Pointer left the marker or its tooltip.
    Leave,
    Click,
    ContextMenu,
}

/// Everything the engine needs from the page it runs in.
pub trait HostDom {
    // ---- discovery ----
    fn query_all(&mut self, selector: &str) -> Vec<NodeId>;
    fn query_first(&mut self, selector: &str) -> Option<NodeId> {
        self.query_all(selector).into_iter().next()
    }
    /// Descendants of `root` matching `selector`, in document order.
    fn query_within(&mut self, root: NodeId, selector: &str) -> Vec<NodeId>;
    /// `Element.closest`: the node itself or its nearest matching ancestor.
    fn closest(&mut self, node: NodeId, selector: &str) -> Option<NodeId>;
    fn matches(&mut self, node: NodeId, selector: &str) -> bool;
    fn parent(&mut self, node: NodeId) -> Option<NodeId>;
    fn body(&mut self) -> Option<NodeId>;
    fn is_connected(&mut self, node: NodeId) -> bool;
    fn children(&mut self, node: NodeId) -> Vec<ChildNode>;
    fn tag_name(&mut self, node: NodeId) -> String;
    fn attribute(&mut self, node: NodeId, name: &str) -> Option<String>;
    fn text_content(&mut self, node: NodeId) -> String;
    fn location_href(&mut self) -> String;
    fn location_host(&mut self) -> String;

    // ---- geometry ----
    fn bounding_rect(&mut self, node: NodeId) -> Rect;
    fn overflow_y(&mut self, node: NodeId) -> Overflow;
    fn scroll_metrics(&mut self, node: NodeId) -> ScrollMetrics;
    fn viewport(&mut self) -> Viewport;

    // ---- scrolling ----
    /// Smooth scroll; returns false when the target lacks `scrollTo`.
    fn smooth_scroll(&mut self, target: ScrollHandle, top: f64) -> bool;
    fn set_scroll_top(&mut self, target: ScrollHandle, top: f64);

    // ---- injection ----
    fn create_element(&mut self, tag: &str) -> NodeId;
    fn append_child(&mut self, parent: NodeId, child: NodeId);
    fn remove(&mut self, node: NodeId);
    fn set_attribute(&mut self, node: NodeId, name: &str, value: &str);
    fn set_class(&mut self, node: NodeId, class: &str, on: bool);
    fn set_style(&mut self, node: NodeId, property: &str, value: &str);
    fn set_inner_html(&mut self, node: NodeId, html: &str);
    /// Attach marker + tooltip listeners. Called once per marker.
    fn listen_marker(&mut self, marker: NodeId, tooltip: NodeId);

    /// Drop handles not in `keep`. Bindings that pin element references use
    /// this to avoid growing without bound; the default is a no-op.
    fn release_except(&mut self, _keep: &HashSet<NodeId>) {}
}
