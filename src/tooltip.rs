//! Tooltip hover timing and vertical placement.

use std::collections::{HashMap, HashSet};

use crate::dom::{NodeId, Rect};

/// Vertical anchoring of a tooltip relative to its marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TooltipPlacement {
    Centered,
    /// Tooltip top aligned with the marker; used near the viewport top.
    TopAligned,
    /// Tooltip bottom aligned with the marker; used near the viewport bottom.
    BottomAligned,
}

impl TooltipPlacement {
    pub fn as_attr(&self) -> &'static str {
        match self {
            TooltipPlacement::Centered => "center",
            TooltipPlacement::TopAligned => "top",
            TooltipPlacement::BottomAligned => "bottom",
        }
    }
}

/// Pick a placement from the tooltip's rect measured while centered.
pub fn choose_placement(centered: Rect, viewport_height: f64, margin: f64) -> TooltipPlacement {
    if centered.top < margin {
        TooltipPlacement::TopAligned
    } else if centered.bottom() > viewport_height - margin {
        TooltipPlacement::BottomAligned
    } else {
        TooltipPlacement::Centered
    }
}

/// Delayed-hide bookkeeping for all markers.
///
/// Leaving a marker (or its tooltip) starts a hide deadline; re-entering
/// either cancels it. That lets the pointer cross the gap between marker
/// and tooltip without flicker.
#[derive(Debug, Default)]
pub struct HoverTimers {
    visible: HashSet<NodeId>,
    pending_hide: HashMap<NodeId, f64>,
    hide_delay_ms: f64,
}

impl HoverTimers {
    pub fn new(hide_delay_ms: f64) -> Self {
        Self {
            hide_delay_ms,
            ..Self::default()
        }
    }

    /// Pointer entered marker or tooltip. Returns true if it was hidden.
    pub fn enter(&mut self, marker: NodeId) -> bool {
        self.pending_hide.remove(&marker);
        self.visible.insert(marker)
    }

    /// Pointer left; returns the hide deadline.
    pub fn leave(&mut self, marker: NodeId, now: f64) -> Option<f64> {
        if !self.visible.contains(&marker) {
            return None;
        }
        let deadline = now + self.hide_delay_ms;
        self.pending_hide.insert(marker, deadline);
        Some(deadline)
    }

    /// Markers whose hide deadline has passed; they are marked hidden.
    pub fn take_due(&mut self, now: f64) -> Vec<NodeId> {
        let mut due: Vec<NodeId> = self
            .pending_hide
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(marker, _)| *marker)
            .collect();
        due.sort();
        for marker in &due {
            self.pending_hide.remove(marker);
            self.visible.remove(marker);
        }
        due
    }

    pub fn next_deadline(&self) -> Option<f64> {
        self.pending_hide.values().copied().reduce(f64::min)
    }

    pub fn is_visible(&self, marker: NodeId) -> bool {
        self.visible.contains(&marker)
    }

    /// Marker went away.
    pub fn forget(&mut self, marker: NodeId) {
        self.visible.remove(&marker);
        self.pending_hide.remove(&marker);
    }

    pub fn clear(&mut self) {
        self.visible.clear();
        self.pending_hide.clear();
    }
}
