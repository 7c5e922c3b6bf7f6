//! Mutation classification: which host mutations should trigger a refresh.
//!
//! Our own rail, markers and stars live in the same document, so every pass
//! produces mutations. Those must be filtered out or each pass would
//! schedule the next one.

use crate::config::InjectedNames;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    ChildList,
    Attributes,
    CharacterData,
}

/// Added or removed node, reduced to what classification needs.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TouchedNode {
    pub is_element: bool,
    pub id: Option<String>,
    pub classes: Vec<String>,
}

impl TouchedNode {
    pub fn element(id: Option<&str>, classes: &[&str]) -> Self {
        Self {
            is_element: true,
            id: id.map(str::to_string),
            classes: classes.iter().map(|c| c.to_string()).collect(),
        }
    }

    pub fn text() -> Self {
        Self::default()
    }
}

/// One `MutationRecord`, flattened.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationNote {
    pub kind: MutationKind,
    /// The record's target sits inside something we injected.
    pub target_injected: bool,
    pub added: Vec<TouchedNode>,
    pub removed: Vec<TouchedNode>,
}

pub struct InjectionFilter {
    rail_id: String,
    classes: Vec<String>,
}

impl InjectionFilter {
    pub fn new(names: &InjectedNames) -> Self {
        Self {
            rail_id: names.rail_id.clone(),
            classes: vec![
                names.marker_class.clone(),
                names.tooltip_class.clone(),
                names.star_class.clone(),
            ],
        }
    }

    /// Selector matching any node we inject (for `closest` checks).
    pub fn selector(&self) -> String {
        let mut parts = vec![format!("#{}", self.rail_id)];
        parts.extend(self.classes.iter().map(|c| format!(".{}", c)));
        parts.join(", ")
    }

    pub fn is_injected(&self, node: &TouchedNode) -> bool {
        node.id.as_deref() == Some(self.rail_id.as_str())
            || node.classes.iter().any(|c| self.classes.contains(c))
    }

    /// Structural change to host content.
    pub fn is_relevant(&self, note: &MutationNote) -> bool {
        if note.kind != MutationKind::ChildList || note.target_injected {
            return false;
        }
        note.added
            .iter()
            .chain(note.removed.iter())
            .any(|n| n.is_element && !self.is_injected(n))
    }

    pub fn any_relevant<'a>(&self, notes: impl IntoIterator<Item = &'a MutationNote>) -> bool {
        notes.into_iter().any(|n| self.is_relevant(n))
    }
}
