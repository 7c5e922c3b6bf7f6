//! ScrollContainerLocator + PositionProjector
//!
//! Host layouts differ: sometimes the window scrolls, sometimes an inner
//! div does. The locator finds the element that actually scrolls and caches
//! it briefly; the projector maps message geometry into that container's
//! scroll coordinates and back.

use crate::config::RailConfig;
use crate::dom::{HostDom, NodeId, ScrollHandle};
use crate::site::{SiteAdapter, SiteProfile};

#[derive(Debug, Clone, Copy)]
struct CachedHandle {
    handle: ScrollHandle,
    validated_at: f64,
}

pub struct ScrollLocator {
    cached: Option<CachedHandle>,
    ttl_ms: f64,
    epsilon_px: f64,
    window_margin_px: f64,
    element_margin_px: f64,
}

impl ScrollLocator {
    pub fn new(config: &RailConfig) -> Self {
        Self {
            cached: None,
            ttl_ms: config.container_cache_ttl_ms,
            epsilon_px: config.scrollable_epsilon_px,
            window_margin_px: config.window_margin_px,
            element_margin_px: config.element_margin_px,
        }
    }

    pub fn invalidate(&mut self) {
        self.cached = None;
    }

    pub fn cached(&self) -> Option<ScrollHandle> {
        self.cached.map(|c| c.handle)
    }

    /// Find the scrolling container for the conversation.
    ///
    /// A cached element is reused only while it is fresh, attached and still
    /// scrollable. Anything else runs discovery again, site guesses first.
    pub fn locate<D: HostDom>(
        &mut self,
        dom: &mut D,
        profile: &SiteProfile,
        first_message: Option<NodeId>,
        now: f64,
    ) -> ScrollHandle {
        if let Some(cached) = self.cached {
            let fresh = now - cached.validated_at < self.ttl_ms;
            match cached.handle {
                ScrollHandle::Viewport if fresh => return cached.handle,
                ScrollHandle::Element(el)
                    if fresh && dom.is_connected(el) && self.is_scrollable(dom, el) =>
                {
                    return cached.handle;
                }
                _ => {}
            }
        }

        let handle = self.discover(dom, profile, first_message);
        if self.cached.map(|c| c.handle) != Some(handle) {
            log::debug!("[ScrollLocator] container -> {:?}", handle);
        }
        self.remember(handle, now);
        handle
    }

    fn remember(&mut self, handle: ScrollHandle, now: f64) {
        self.cached = Some(CachedHandle {
            handle,
            validated_at: now,
        });
    }

    fn discover<D: HostDom>(
        &self,
        dom: &mut D,
        profile: &SiteProfile,
        first_message: Option<NodeId>,
    ) -> ScrollHandle {
        for guess in profile.container_guesses {
            if let Some(el) = dom.query_first(guess) {
                if self.is_scrollable(dom, el) {
                    return ScrollHandle::Element(el);
                }
            }
        }

        let Some(first) = first_message else {
            return ScrollHandle::Viewport;
        };
        let body = dom.body();
        let mut current = dom.parent(first);
        while let Some(el) = current {
            if Some(el) == body {
                break;
            }
            if self.is_scrollable(dom, el) {
                return ScrollHandle::Element(el);
            }
            current = dom.parent(el);
        }
        ScrollHandle::Viewport
    }

    /// Overflow permits scrolling and there is content to scroll.
    pub fn is_scrollable<D: HostDom>(&self, dom: &mut D, el: NodeId) -> bool {
        if !dom.overflow_y(el).allows_scroll() {
            return false;
        }
        let m = dom.scroll_metrics(el);
        m.scroll_height > m.client_height + self.epsilon_px
    }

    // =========================================================================
    // PositionProjector
    // =========================================================================

    /// Offset of a message within the container's scroll coordinates,
    /// measured on its visual row rather than the raw node.
    pub fn position_of<D: HostDom>(
        &self,
        dom: &mut D,
        adapter: &SiteAdapter,
        node: NodeId,
        handle: ScrollHandle,
    ) -> f64 {
        let row = adapter.row_of(dom, node);
        let rect = dom.bounding_rect(row);
        match handle {
            ScrollHandle::Viewport => rect.top + dom.viewport().scroll_y,
            ScrollHandle::Element(container) => {
                let container_top = dom.bounding_rect(container).top;
                rect.top - container_top + dom.scroll_metrics(container).scroll_top
            }
        }
    }

    /// Total scrollable extent used as the rail's 100%; never below 1.
    pub fn total_extent<D: HostDom>(&self, dom: &mut D, handle: ScrollHandle) -> f64 {
        let extent = match handle {
            ScrollHandle::Viewport => {
                let vp = dom.viewport();
                vp.document_scroll_height.max(vp.inner_height)
            }
            ScrollHandle::Element(el) => {
                let m = dom.scroll_metrics(el);
                m.scroll_height.max(m.client_height)
            }
        };
        extent.max(1.0)
    }

    /// Margin kept above a scroll target so sticky headers don't cover it.
    pub fn scroll_offset_for<D: HostDom>(
        &self,
        dom: &mut D,
        profile: &SiteProfile,
        handle: ScrollHandle,
    ) -> f64 {
        if let Some(fixed) = profile.fixed_scroll_offset {
            return fixed;
        }
        match handle {
            ScrollHandle::Viewport => {
                let mut tallest = 0.0_f64;
                for sel in profile.header_selectors {
                    if let Some(el) = dom.query_first(sel) {
                        tallest = tallest.max(dom.bounding_rect(el).height);
                    }
                }
                tallest + self.window_margin_px
            }
            ScrollHandle::Element(_) => self.element_margin_px,
        }
    }

    /// Scroll so `raw_position` lands just below any sticky chrome.
    pub fn scroll_to<D: HostDom>(
        &self,
        dom: &mut D,
        profile: &SiteProfile,
        handle: ScrollHandle,
        raw_position: f64,
    ) -> f64 {
        let target = (raw_position - self.scroll_offset_for(dom, profile, handle)).max(0.0);
        if !dom.smooth_scroll(handle, target) {
            dom.set_scroll_top(handle, target);
        }
        target
    }
}
