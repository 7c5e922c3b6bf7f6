//! MarkerReconciler: keeps one rail marker per live message node
//!
//! # Invariants
//! - `live` maps exactly the connected, non-empty message nodes found by the
//!   last pass to their markers. Stale entries are dropped in the removal
//!   pass of the very next reconciliation.
//! - `cache` only holds nodes found by the last pass (including ones with
//!   no extractable text, so they aren't re-extracted every pass) and is
//!   purged in the same removal pass.
//! - Markers are mutated in place, never recreated, so hover state survives
//!   and an unchanged page produces no DOM writes.
//!
//! Event handlers are attached once per marker and resolve the message node
//! through `owner` at invocation time, so a click always scrolls to where the
//! message is *now*, not where it was when the marker was built.

use std::collections::{HashMap, HashSet};

use crate::bridge::QuestionSummary;
use crate::config::{IdScheme, InjectedNames, RailConfig};
use crate::dom::{HostDom, MarkerEvent, NodeId, ScrollHandle};
use crate::favorites::{FavoriteEntry, FavoriteSet};
use crate::identity::{derive_id, within_jitter, IdAnchor};
use crate::scroll::ScrollLocator;
use crate::site::SiteAdapter;
use crate::tooltip::{choose_placement, HoverTimers, TooltipPlacement};

// =============================================================================
// Types
// =============================================================================

/// Per-node derived data, refreshed only when it may have gone stale.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedRecord {
    /// Display text (escaped, `<br>`-joined), body capped.
    pub text: String,
    pub position: f64,
    pub id: String,
    pub is_question: bool,
    pub source_index: usize,
}

/// What the marker currently shows; lets updates skip no-op writes.
#[derive(Debug, Clone, Default, PartialEq)]
struct AppliedState {
    id: String,
    top: String,
    favorite: bool,
    question: bool,
}

#[derive(Debug, Clone)]
struct MarkerBinding {
    marker: NodeId,
    tooltip: NodeId,
    /// Favorite star appended to the message's row.
    star: Option<NodeId>,
    applied: AppliedState,
    tooltip_html: Option<String>,
}

/// Outcome of one pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassReport {
    pub summary: Vec<QuestionSummary>,
    pub handle: Option<ScrollHandle>,
    pub created: usize,
    pub removed: usize,
    pub refreshed: usize,
}

/// Result of a marker interaction the engine may need to finish.
#[derive(Debug, Clone, PartialEq)]
pub enum MarkerAction {
    None,
    TooltipShown(TooltipPlacement),
    /// Hide is pending; call `on_hover_timer` at the deadline.
    HideScheduled(f64),
    Scrolled(f64),
    /// Toggle this entry in the favorites store.
    ToggleFavorite(FavoriteEntry),
}

// =============================================================================
// MarkerReconciler
// =============================================================================

pub struct MarkerReconciler {
    names: InjectedNames,
    rail: Option<NodeId>,
    rail_visible: bool,
    live: HashMap<NodeId, MarkerBinding>,
    /// Marker or tooltip node -> message node.
    owner: HashMap<NodeId, NodeId>,
    cache: HashMap<NodeId, DerivedRecord>,
    hover: HoverTimers,
    id_scheme: IdScheme,
    id_prefix_len: usize,
    jitter_px: f64,
    fast_text_max: usize,
    edge_margin_px: f64,
}

impl MarkerReconciler {
    pub fn new(config: &RailConfig) -> Self {
        Self {
            names: config.names.clone(),
            rail: None,
            rail_visible: false,
            live: HashMap::new(),
            owner: HashMap::new(),
            cache: HashMap::new(),
            hover: HoverTimers::new(config.tooltip_hide_delay_ms),
            id_scheme: config.id_scheme,
            id_prefix_len: config.id_prefix_len,
            jitter_px: config.jitter_threshold_px,
            fast_text_max: config.fast_text_max_chars,
            edge_margin_px: config.tooltip_edge_margin_px,
        }
    }

    // ---- inspection ----

    pub fn rail(&self) -> Option<NodeId> {
        self.rail
    }

    pub fn is_rail_visible(&self) -> bool {
        self.rail_visible
    }

    /// Tracked message nodes, sorted.
    pub fn live_nodes(&self) -> Vec<NodeId> {
        let mut nodes: Vec<NodeId> = self.live.keys().copied().collect();
        nodes.sort();
        nodes
    }

    pub fn marker_for(&self, node: NodeId) -> Option<NodeId> {
        self.live.get(&node).map(|b| b.marker)
    }

    pub fn star_for(&self, node: NodeId) -> Option<NodeId> {
        self.live.get(&node).and_then(|b| b.star)
    }

    pub fn record(&self, node: NodeId) -> Option<&DerivedRecord> {
        self.cache.get(&node)
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Every node handle this reconciler still refers to, cached records
    /// included.
    pub fn retained_nodes(&self) -> HashSet<NodeId> {
        let mut keep: HashSet<NodeId> = self.cache.keys().copied().collect();
        keep.extend(self.rail);
        for (node, b) in &self.live {
            keep.insert(*node);
            keep.insert(b.marker);
            keep.insert(b.tooltip);
            keep.extend(b.star);
        }
        keep
    }

    // ---- reconciliation ----

    /// One discovery → diff → mutate pass.
    pub fn reconcile<D: HostDom>(
        &mut self,
        dom: &mut D,
        adapter: &mut SiteAdapter,
        locator: &mut ScrollLocator,
        favorites: &FavoriteSet,
        force: bool,
        now: f64,
    ) -> PassReport {
        let messages: Vec<NodeId> = adapter
            .message_elements(dom)
            .into_iter()
            .filter(|n| dom.is_connected(*n))
            .collect();

        if messages.is_empty() {
            let removed = self.live.len();
            self.clear(dom);
            return PassReport {
                removed,
                ..PassReport::default()
            };
        }

        let rail = self.ensure_rail(dom);
        let handle = locator.locate(dom, adapter.profile(), messages.first().copied(), now);
        let extent = locator.total_extent(dom, handle);

        // Removal pass.
        let current: HashSet<NodeId> = messages.iter().copied().collect();
        let stale: Vec<NodeId> = self
            .live
            .keys()
            .copied()
            .filter(|n| !current.contains(n))
            .collect();
        let mut removed = 0;
        for node in stale {
            self.remove_binding(dom, node);
            removed += 1;
        }
        self.cache.retain(|node, _| current.contains(node));

        // Upsert pass.
        let mut report = PassReport {
            handle: Some(handle),
            removed,
            ..PassReport::default()
        };
        for (index, node) in messages.iter().copied().enumerate() {
            let position = locator.position_of(dom, adapter, node, handle);
            // A forced pass re-reads text but keeps the anchor while the
            // node has only jittered.
            let anchor = match self.cache.get(&node) {
                None => Some(position),
                Some(rec)
                    if rec.source_index != index
                        || !within_jitter(rec.position, position, self.jitter_px) =>
                {
                    Some(position)
                }
                Some(rec) if force => Some(rec.position),
                Some(_) => None,
            };
            if let Some(position) = anchor {
                let record = self.derive(dom, adapter, node, index, position);
                self.cache.insert(node, record);
                report.refreshed += 1;
            }
            let Some(record) = self.cache.get(&node).cloned() else {
                continue;
            };

            if record.text.is_empty() {
                if self.live.contains_key(&node) {
                    self.remove_binding(dom, node);
                    report.removed += 1;
                }
                continue;
            }

            if !self.live.contains_key(&node) {
                self.create_marker(dom, rail, node);
                report.created += 1;
            }
            let favorite = favorites.contains(&record.id);
            self.apply_state(dom, adapter, node, &record, favorite, extent);

            report.summary.push(QuestionSummary {
                id: record.id.clone(),
                text: record.text.clone(),
                position: record.position,
                is_question: record.is_question,
            });
        }

        log::debug!(
            "[Reconciler] pass: {} markers (+{} -{} ~{})",
            self.live.len(),
            report.created,
            report.removed,
            report.refreshed
        );
        report
    }

    /// Drop every marker and star and hide the rail.
    pub fn clear<D: HostDom>(&mut self, dom: &mut D) {
        let nodes: Vec<NodeId> = self.live.keys().copied().collect();
        for node in nodes {
            self.remove_binding(dom, node);
        }
        self.cache.clear();
        self.owner.clear();
        self.hover.clear();

        // Stars whose binding was lost (e.g. an earlier script instance).
        let stray = format!(".{}", self.names.star_class);
        for star in dom.query_all(&stray) {
            dom.remove(star);
        }

        if let Some(rail) = self.rail {
            if self.rail_visible {
                dom.set_style(rail, "display", "none");
                self.rail_visible = false;
            }
        }
    }

    fn ensure_rail<D: HostDom>(&mut self, dom: &mut D) -> NodeId {
        let rail = match self.rail.filter(|r| dom.is_connected(*r)) {
            Some(rail) => rail,
            None => {
                let selector = format!("#{}", self.names.rail_id);
                let rail = match dom.query_first(&selector) {
                    Some(existing) => existing,
                    None => {
                        let rail = dom.create_element("div");
                        dom.set_attribute(rail, "id", &self.names.rail_id);
                        if let Some(body) = dom.body() {
                            dom.append_child(body, rail);
                        }
                        rail
                    }
                };
                self.rail = Some(rail);
                self.rail_visible = false;
                rail
            }
        };
        if !self.rail_visible {
            dom.set_style(rail, "display", "block");
            self.rail_visible = true;
        }
        rail
    }

    fn derive<D: HostDom>(
        &self,
        dom: &mut D,
        adapter: &SiteAdapter,
        node: NodeId,
        index: usize,
        position: f64,
    ) -> DerivedRecord {
        let full = adapter.extract_text(dom, node);
        let is_question = adapter.is_question(&full);
        let text = full.truncated(self.fast_text_max).to_display();
        let anchor = IdAnchor::for_scheme(self.id_scheme, position, index);
        DerivedRecord {
            id: derive_id(&text, anchor, self.id_prefix_len),
            text,
            position,
            is_question,
            source_index: index,
        }
    }

    fn create_marker<D: HostDom>(&mut self, dom: &mut D, rail: NodeId, node: NodeId) {
        let marker = dom.create_element("div");
        dom.set_class(marker, &self.names.marker_class, true);
        let tooltip = dom.create_element("div");
        dom.set_class(tooltip, &self.names.tooltip_class, true);
        dom.append_child(marker, tooltip);
        dom.append_child(rail, marker);
        dom.listen_marker(marker, tooltip);

        self.owner.insert(marker, node);
        self.owner.insert(tooltip, node);
        self.live.insert(
            node,
            MarkerBinding {
                marker,
                tooltip,
                star: None,
                applied: AppliedState::default(),
                tooltip_html: None,
            },
        );
    }

    fn apply_state<D: HostDom>(
        &mut self,
        dom: &mut D,
        adapter: &SiteAdapter,
        node: NodeId,
        record: &DerivedRecord,
        favorite: bool,
        extent: f64,
    ) {
        let names = &self.names;
        let Some(binding) = self.live.get_mut(&node) else {
            return;
        };
        let top = placement(record.position, extent);

        if binding.applied.id != record.id {
            dom.set_attribute(binding.marker, &names.id_attribute, &record.id);
            binding.applied.id = record.id.clone();
            // Text may have changed with the id; refill lazily on next hover.
            binding.tooltip_html = None;
        }
        if binding.applied.top != top {
            dom.set_style(binding.marker, "top", &top);
            binding.applied.top = top;
        }
        if binding.applied.question != record.is_question {
            dom.set_class(binding.marker, &names.question_class, record.is_question);
            binding.applied.question = record.is_question;
        }
        if binding.applied.favorite != favorite {
            dom.set_class(binding.marker, &names.favorite_class, favorite);
            binding.applied.favorite = favorite;
        }

        match (favorite, binding.star) {
            (true, None) => {
                if dom.is_connected(node) {
                    binding.star = Some(append_star(dom, adapter, node, &names.star_class));
                }
            }
            (true, Some(star)) if !dom.is_connected(star) => {
                // Host re-rendered the wrapper and dropped our star.
                binding.star = Some(append_star(dom, adapter, node, &names.star_class));
            }
            (false, Some(star)) => {
                dom.remove(star);
                binding.star = None;
            }
            _ => {}
        }
    }

    fn remove_binding<D: HostDom>(&mut self, dom: &mut D, node: NodeId) {
        if let Some(binding) = self.live.remove(&node) {
            dom.remove(binding.marker);
            if let Some(star) = binding.star {
                dom.remove(star);
            }
            self.owner.remove(&binding.marker);
            self.owner.remove(&binding.tooltip);
            self.hover.forget(binding.marker);
        }
        self.cache.remove(&node);
    }

    // ---- interaction ----

    /// Message node behind a marker or tooltip.
    pub fn owner_of(&self, target: NodeId) -> Option<NodeId> {
        self.owner.get(&target).copied()
    }

    /// Favorite record for a tracked message, from its cached data.
    pub fn favorite_entry(&self, node: NodeId) -> Option<FavoriteEntry> {
        self.cache.get(&node).map(|rec| FavoriteEntry {
            id: rec.id.clone(),
            text: rec.text.clone(),
            position: rec.position,
        })
    }

    pub fn handle_event<D: HostDom>(
        &mut self,
        dom: &mut D,
        adapter: &SiteAdapter,
        locator: &mut ScrollLocator,
        target: NodeId,
        event: MarkerEvent,
        now: f64,
    ) -> MarkerAction {
        let Some(node) = self.owner_of(target) else {
            return MarkerAction::None;
        };
        let Some(binding) = self.live.get(&node) else {
            return MarkerAction::None;
        };
        let marker = binding.marker;

        match event {
            MarkerEvent::Enter | MarkerEvent::TooltipEnter => {
                self.hover.enter(marker);
                MarkerAction::TooltipShown(self.show_tooltip(dom, adapter, node))
            }
            MarkerEvent::Leave => match self.hover.leave(marker, now) {
                Some(deadline) => MarkerAction::HideScheduled(deadline),
                None => MarkerAction::None,
            },
            MarkerEvent::Click => {
                if !dom.is_connected(node) {
                    return MarkerAction::None;
                }
                let handle = locator.locate(dom, adapter.profile(), Some(node), now);
                let position = locator.position_of(dom, adapter, node, handle);
                MarkerAction::Scrolled(locator.scroll_to(dom, adapter.profile(), handle, position))
            }
            MarkerEvent::ContextMenu => match self.favorite_entry(node) {
                Some(entry) => MarkerAction::ToggleFavorite(entry),
                None => MarkerAction::None,
            },
        }
    }

    /// Hide tooltips whose delay elapsed. Returns the next pending deadline.
    pub fn on_hover_timer<D: HostDom>(&mut self, dom: &mut D, now: f64) -> Option<f64> {
        let due = self.hover.take_due(now);
        for marker in due {
            let tooltip = self
                .owner
                .get(&marker)
                .and_then(|node| self.live.get(node))
                .map(|b| b.tooltip);
            if let Some(tooltip) = tooltip {
                dom.set_class(tooltip, &self.names.visible_class, false);
            }
        }
        self.hover.next_deadline()
    }

    fn show_tooltip<D: HostDom>(
        &mut self,
        dom: &mut D,
        adapter: &SiteAdapter,
        node: NodeId,
    ) -> TooltipPlacement {
        let cached = self.cache.get(&node).map(|r| r.text.clone()).unwrap_or_default();
        let Some(binding) = self.live.get_mut(&node) else {
            return TooltipPlacement::Centered;
        };

        if binding.tooltip_html.is_none() {
            let detailed = if dom.is_connected(node) {
                adapter.extract_text(dom, node).to_display()
            } else {
                String::new()
            };
            let html = if detailed.is_empty() { cached } else { detailed };
            dom.set_inner_html(binding.tooltip, &html);
            binding.tooltip_html = Some(html);
        }

        dom.set_class(binding.tooltip, &self.names.visible_class, true);
        dom.set_attribute(binding.tooltip, "data-placement", TooltipPlacement::Centered.as_attr());
        let rect = dom.bounding_rect(binding.tooltip);
        let viewport_height = dom.viewport().inner_height;
        let placement = choose_placement(rect, viewport_height, self.edge_margin_px);
        if placement != TooltipPlacement::Centered {
            dom.set_attribute(binding.tooltip, "data-placement", placement.as_attr());
        }
        placement
    }
}

fn append_star<D: HostDom>(
    dom: &mut D,
    adapter: &SiteAdapter,
    node: NodeId,
    class: &str,
) -> NodeId {
    let wrapper = adapter.row_of(dom, node);
    let star = dom.create_element("span");
    dom.set_class(star, class, true);
    dom.set_inner_html(star, "★");
    dom.append_child(wrapper, star);
    star
}

/// Vertical placement on the rail as a CSS percentage.
pub fn placement(position: f64, extent: f64) -> String {
    let extent = extent.max(1.0);
    let pct = position.clamp(0.0, extent) / extent * 100.0;
    format!("{}%", (pct * 1000.0).round() / 1000.0)
}
