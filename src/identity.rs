//! IdentityDeriver: stable string ids for messages
//!
//! An id is `<text prefix>-<anchor>`, where the anchor is either the rounded
//! scroll position or the ordinal index (see [`IdScheme`]). The id joins a
//! marker to its persisted favorite, so changing the derivation breaks
//! previously stored favorites.
//!
//! Known trade-offs, kept deliberately:
//! - two messages with the same prefix at the same rounded anchor collide;
//! - with the position anchor, a genuine layout shift changes the id.
//!
//! Sub-pixel noise is absorbed by rounding here; the reconciler additionally
//! keeps a cached id until the position moves by more than the jitter
//! threshold.

use crate::config::IdScheme;
use crate::text;

/// Numeric component of an id.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IdAnchor {
    Position(f64),
    Index(usize),
}

impl IdAnchor {
    pub fn for_scheme(scheme: IdScheme, position: f64, index: usize) -> Self {
        match scheme {
            IdScheme::ContentPosition => IdAnchor::Position(position),
            IdScheme::ContentIndex => IdAnchor::Index(index),
        }
    }

    fn render(&self) -> String {
        match self {
            IdAnchor::Position(p) => {
                let rounded = p.round();
                // Avoid "-0" for positions in (-0.5, 0].
                if rounded == 0.0 {
                    "0".to_string()
                } else {
                    format!("{}", rounded as i64)
                }
            }
            IdAnchor::Index(i) => i.to_string(),
        }
    }
}

/// Derive an id from display text (markup allowed) and an anchor.
pub fn derive_id(display_text: &str, anchor: IdAnchor, prefix_len: usize) -> String {
    let clean = text::strip_markup(display_text);
    let prefix = text::truncate_graphemes(&clean, prefix_len);
    format!("{}-{}", prefix.trim_end(), anchor.render())
}

/// Whether a cached position is still close enough to keep its id.
pub fn within_jitter(cached: f64, current: f64, threshold: f64) -> bool {
    (cached - current).abs() <= threshold
}
