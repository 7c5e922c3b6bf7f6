//! Cross-module scenario tests. In-memory collaborators live in `support`.

pub mod support;

mod engine_tests;

use crate::dom::{NodeId, Rect};
use support::FakeDom;

pub(crate) const TURN: &str = r#"[data-testid^="conversation-turn"]"#;
pub(crate) const USER_MESSAGE: &str = r#"div[data-message-author-role="user"]"#;

/// Append one ChatGPT turn (row wrapper + user message) with its row at `top`.
/// Returns `(row, message)`.
pub(crate) fn add_turn(dom: &mut FakeDom, top: f64, text: &str) -> (NodeId, NodeId) {
    let body = dom.body_id();
    let row = dom.add(body, "article", &[TURN]);
    let msg = dom.add(row, "div", &[USER_MESSAGE]);
    dom.add_text(msg, text);
    dom.set_rect(row, Rect::new(top, 60.0));
    dom.set_rect(msg, Rect::new(top + 10.0, 40.0));
    (row, msg)
}

/// Window-scrolled ChatGPT page, document height 2000.
pub(crate) fn chat_page(turns: &[(f64, &str)]) -> (FakeDom, Vec<(NodeId, NodeId)>) {
    let mut dom = FakeDom::new();
    dom.set_viewport(2000.0, 800.0);
    let nodes = turns
        .iter()
        .map(|(top, text)| add_turn(&mut dom, *top, text))
        .collect();
    (dom, nodes)
}
