//! WITQ Core: conversation minimap for AI chat pages
//!
//! A Rust/WASM content script that finds the message nodes of a chat
//! conversation, injects a vertical rail with one marker per message and
//! keeps it in sync as the host page streams, re-renders and navigates.
//!
//! # Architecture
//!
//! ## Page model
//! - `dom.rs` - HostDom: the seam between engine and document (arena `NodeId`s)
//! - `site.rs` - SiteAdapter: per-host selector strategies and text extraction
//! - `text.rs` - Text cleanup, escaping and question heuristics
//! - `scroll.rs` - ScrollLocator: scroll container discovery, positions, scrolling
//!
//! ## Sync
//! - `identity.rs` - Content + position marker ids
//! - `reconcile.rs` - MarkerReconciler: discovery → diff → in-place marker updates
//! - `tooltip.rs` - Tooltip placement and delayed hide
//! - `mutation.rs` - InjectionFilter: ignores our own DOM writes
//! - `scheduler.rs` - UpdateScheduler: debounce, throttle, reruns, warmup
//! - `session.rs` - SessionWatch: conversation switches
//! - `engine.rs` - ContentScript: one instance per page, wires everything
//!
//! ## Shared state and messaging
//! - `favorites.rs` - FavoriteSet + FavoritesStore (read-modify-write toggle)
//! - `bridge.rs` - Popup messages (question list out, scroll/refresh in)
//!
//! ## Ambient
//! - `config.rs` - RailConfig and defaults
//! - `error.rs` - RailError
//! - `web.rs` - web-sys bindings and the timer-driven runtime
//!
//! # Usage (WASM)
//! ```javascript,ignore
//! import init, { startContentScript, toggleFavorite } from 'witq-core';
//!
//! await init();
//!
//! // Partial config; missing fields take their defaults
//! startContentScript({ mutationDebounceMs: 1200, logLevel: 'debug' });
//!
//! // From the popup: same set semantics as the right-click on a marker
//! const nowFavorite = await toggleFavorite({ id, text, position });
//! ```

pub mod bridge;
pub mod config;
pub mod dom;
pub mod engine;
pub mod error;
pub mod favorites;
pub mod identity;
pub mod mutation;
pub mod reconcile;
pub mod scheduler;
pub mod scroll;
pub mod session;
pub mod site;
pub mod text;
pub mod tooltip;
pub mod web;

#[cfg(test)]
mod tests;

pub use config::RailConfig;
pub use engine::ContentScript;
pub use error::RailError;

use wasm_bindgen::prelude::*;

// When the `wee_alloc` feature is enabled, use `wee_alloc` as the global
// allocator for smaller WASM bundle size.
#[cfg(feature = "wee_alloc")]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

/// Initialize panic hook for better error messages in browser console
#[wasm_bindgen(start)]
pub fn main() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// Question heuristic, shared with the popup's list rendering
#[wasm_bindgen(js_name = isQuestion)]
pub fn is_question(text: &str) -> bool {
    text::is_question(text)
}

/// Markup-free text for display outside the page
#[wasm_bindgen(js_name = stripMarkup)]
pub fn strip_markup(html: &str) -> String {
    text::strip_markup(html)
}

/// Get version information
#[wasm_bindgen]
pub fn version() -> String {
    format!("witq-core v{}", env!("CARGO_PKG_VERSION"))
}
