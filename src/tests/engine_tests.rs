//! Tests for ContentScript
//!
//! The engine wired to in-memory collaborators, driven the way the browser
//! runtime drives it: triggers, directives, split passes.

use super::support::{FakeDom, MemoryStore, RecordingChannel};
use super::{add_turn, chat_page};
use crate::bridge::{InboundRequest, InboundResponse};
use crate::config::RailConfig;
use crate::dom::{MarkerEvent, NodeId};
use crate::engine::ContentScript;
use crate::error::RailError;
use crate::favorites::FavoriteEntry;
use crate::mutation::{MutationKind, MutationNote, TouchedNode};
use crate::reconcile::MarkerAction;
use crate::scheduler::{Directive, Phase, Trigger};
use crate::site::SiteTag;

type Engine = ContentScript<FakeDom, MemoryStore, RecordingChannel>;

fn engine(dom: FakeDom, store: MemoryStore) -> Engine {
    ContentScript::new(RailConfig::default(), dom, store, RecordingChannel::new())
        .expect("default config is valid")
}

fn three_turns() -> (FakeDom, Vec<(NodeId, NodeId)>) {
    chat_page(&[(100.0, "How do I borrow?"), (900.0, "ok"), (1700.0, "Why?")])
}

/// Follow directives until a pass runs; returns the directive after it.
async fn drive(engine: &mut Engine, mut next: Directive, now: &mut f64) -> Directive {
    loop {
        next = match next {
            Directive::Nothing => return Directive::Nothing,
            Directive::ArmTimer { token, delay_ms } => {
                *now += delay_ms;
                engine.on_timer(token, *now)
            }
            Directive::RequestFrame { token } => {
                *now += 16.0;
                engine.on_frame(token, *now)
            }
            Directive::Run { force } => {
                engine.begin_pass(*now);
                let loaded = crate::favorites::FavoritesStore::load(engine.store()).await;
                return engine.complete_pass(loaded, force, *now);
            }
        };
    }
}

fn host_mutation() -> MutationNote {
    MutationNote {
        kind: MutationKind::ChildList,
        target_injected: false,
        added: vec![TouchedNode::element(None, &["group"])],
        removed: vec![],
    }
}

// ============================================================================
// Construction
// ============================================================================

#[test]
fn test_rejects_invalid_config() {
    let config = RailConfig {
        id_prefix_len: 0,
        ..RailConfig::default()
    };
    let result = ContentScript::new(config, FakeDom::new(), MemoryStore::new(), RecordingChannel::new());
    assert!(matches!(result, Err(RailError::Config(_))));
}

#[test]
fn test_site_from_location() {
    let mut dom = FakeDom::new();
    dom.set_location("gemini.google.com", "https://gemini.google.com/app/1");
    let engine = engine(dom, MemoryStore::new());
    assert_eq!(engine.site(), SiteTag::Gemini);
}

// ============================================================================
// Passes
// ============================================================================

#[tokio::test]
async fn test_initial_pass_publishes_summary() {
    let (dom, _) = three_turns();
    let mut engine = engine(dom, MemoryStore::new());
    let mut now = 0.0;

    let first = engine.start(now);
    assert_eq!(first, Directive::ArmTimer { token: 1, delay_ms: 1000.0 });
    let after = drive(&mut engine, first, &mut now).await;
    assert_eq!(after, Directive::Nothing);
    assert_eq!(engine.scheduler().phase(), Phase::Idle);

    let questions = engine.channel().last_questions();
    let flags: Vec<(String, bool)> = questions
        .iter()
        .map(|q| (q.id.clone(), q.is_question))
        .collect();
    assert_eq!(
        flags,
        vec![
            ("How do I borrow?-100".to_string(), true),
            ("ok-900".to_string(), false),
            ("Why?-1700".to_string(), true),
        ]
    );
    assert_eq!(engine.last_summary().len(), 3);
}

#[tokio::test]
async fn test_empty_page_publishes_empty_list() {
    let mut engine = engine(FakeDom::new(), MemoryStore::new());
    engine.run_pass(true, 0.0).await;

    assert!(engine.channel().last_questions().is_empty());
    assert_eq!(engine.channel().sent().len(), 1);
    assert!(!engine.reconciler().is_rail_visible());
}

#[tokio::test]
async fn test_pass_releases_unreferenced_handles() {
    let (dom, turns) = three_turns();
    let mut engine = engine(dom, MemoryStore::new());
    engine.run_pass(true, 0.0).await;

    let keep = engine.dom().last_keep().expect("release after pass");
    for (_, msg) in &turns {
        assert!(keep.contains(msg));
        assert!(keep.contains(&engine.reconciler().marker_for(*msg).unwrap()));
    }
    assert!(keep.contains(&engine.reconciler().rail().unwrap()));
}

#[tokio::test]
async fn test_empty_message_handle_survives_release() {
    let (mut dom, turns) = chat_page(&[(100.0, "one"), (900.0, "")]);
    dom.renumber_released();
    let mut engine = engine(dom, MemoryStore::new());
    engine.run_pass(false, 0.0).await;
    let empty = turns[1].1;
    assert!(engine.dom().last_keep().unwrap().contains(&empty));

    let reads = engine.dom().reads(empty);
    engine.run_pass(false, 5000.0).await;
    assert_eq!(engine.dom().reads(empty), reads);
    assert_eq!(engine.last_summary().len(), 1);
}

#[tokio::test]
async fn test_silent_channel_failure_does_not_break_pass() {
    let (dom, turns) = three_turns();
    let mut engine = ContentScript::new(
        RailConfig::default(),
        dom,
        MemoryStore::new(),
        RecordingChannel::failing(RailError::ContextInvalidated),
    )
    .unwrap();
    engine.run_pass(true, 0.0).await;

    assert!(engine.reconciler().marker_for(turns[0].1).is_some());
    assert!(engine.channel().sent().is_empty());
}

// ============================================================================
// Scheduling (Scenario D)
// ============================================================================

#[tokio::test]
async fn test_requests_inside_min_interval_are_deferred() {
    let (dom, _) = three_turns();
    let mut engine = engine(dom, MemoryStore::new());
    let mut now = 0.0;

    let d = engine.on_mutations(&[host_mutation()], now);
    assert!(matches!(d, Directive::ArmTimer { delay_ms, .. } if delay_ms == 1200.0));
    drive(&mut engine, d, &mut now).await;
    assert_eq!(engine.scheduler().run_count(), 1);
    let first_run = now;

    // Second request lands 40ms later; the frame arrives inside the window.
    now += 40.0;
    let d = engine.trigger(Trigger::External, now);
    let Directive::ArmTimer { token, .. } = d else {
        panic!("expected timer, got {:?}", d);
    };
    let frame = engine.on_timer(token, now);
    let Directive::RequestFrame { token } = frame else {
        panic!("expected frame, got {:?}", frame);
    };
    now += 16.0;
    let deferred = engine.on_frame(token, now);
    let Directive::ArmTimer { delay_ms, .. } = deferred else {
        panic!("expected deferral, got {:?}", deferred);
    };
    assert_eq!(now + delay_ms, first_run + 180.0);
    assert_eq!(engine.scheduler().run_count(), 1);

    // Deferred, not dropped.
    drive(&mut engine, deferred, &mut now).await;
    assert_eq!(engine.scheduler().run_count(), 2);
    assert!(now - first_run >= 180.0);
}

#[test]
fn test_own_mutations_are_ignored() {
    let (dom, _) = three_turns();
    let mut engine = engine(dom, MemoryStore::new());
    let ours = MutationNote {
        kind: MutationKind::ChildList,
        target_injected: false,
        added: vec![TouchedNode::element(None, &["question-marker"])],
        removed: vec![TouchedNode::element(Some("question-scrollbar-container"), &[])],
    };
    assert_eq!(engine.on_mutations(&[ours], 0.0), Directive::Nothing);
    assert_eq!(engine.scheduler().phase(), Phase::Idle);
}

#[tokio::test]
async fn test_mutation_debounce_shorter_after_navigation() {
    let (dom, _) = three_turns();
    let mut engine = engine(dom, MemoryStore::new());
    let mut now = 0.0;

    let d = engine.trigger(Trigger::Navigation, now);
    assert!(matches!(d, Directive::ArmTimer { delay_ms, .. } if delay_ms == 0.0));
    drive(&mut engine, d, &mut now).await;

    now += 1000.0;
    let d = engine.on_mutations(&[host_mutation()], now);
    assert!(matches!(d, Directive::ArmTimer { delay_ms, .. } if delay_ms == 400.0));

    let d = engine.trigger(Trigger::Resize, now + 6000.0);
    assert!(matches!(d, Directive::ArmTimer { delay_ms, .. } if delay_ms == 300.0));
}

#[tokio::test]
async fn test_trigger_during_pass_reruns() {
    let (dom, _) = three_turns();
    let mut engine = engine(dom, MemoryStore::new());
    let mut now = 0.0;

    let mut d = engine.trigger(Trigger::External, now);
    while !matches!(d, Directive::Run { .. }) {
        d = match d {
            Directive::ArmTimer { token, .. } => engine.on_timer(token, now),
            Directive::RequestFrame { token } => engine.on_frame(token, now),
            other => panic!("unexpected {:?}", other),
        };
    }
    assert!(engine.scheduler().is_running());
    assert_eq!(engine.begin_pass(now), false);

    // Favorites change while the store read is in flight.
    assert_eq!(engine.trigger(Trigger::FavoritesChanged, now), Directive::Nothing);
    now += 5.0;
    let loaded = Ok(Vec::new());
    let after = engine.complete_pass(loaded, true, now);
    assert_eq!(after, Directive::ArmTimer { token: 2, delay_ms: 50.0 });

    drive(&mut engine, after, &mut now).await;
    assert_eq!(engine.scheduler().run_count(), 2);
}

// ============================================================================
// Session change (Scenario E)
// ============================================================================

#[tokio::test]
async fn test_navigation_clears_before_new_markers() {
    let (dom, turns) = three_turns();
    let mut engine = engine(dom, MemoryStore::new());
    engine.run_pass(true, 0.0).await;
    let old_markers: Vec<NodeId> = turns
        .iter()
        .map(|(_, m)| engine.reconciler().marker_for(*m).unwrap())
        .collect();

    // New conversation: different URL, different messages.
    let dom = engine.dom_mut();
    dom.set_location("chatgpt.com", "https://chatgpt.com/c/second");
    for (row, _) in &turns {
        dom.detach(*row);
    }
    let (_, fresh) = add_turn(dom, 300.0, "brand new");

    assert!(engine.begin_pass(2000.0));
    assert!(engine.reconciler().live_nodes().is_empty());
    assert_eq!(engine.reconciler().cache_len(), 0);
    for marker in &old_markers {
        assert!(!engine.dom().connected_node(*marker));
    }
    assert_eq!(engine.scheduler().pending_warmups(), 3);
    assert!(engine.last_summary().is_empty());

    engine.complete_pass(Ok(Vec::new()), true, 2000.0);
    assert_eq!(engine.reconciler().live_nodes(), vec![fresh]);
    assert_eq!(engine.channel().last_questions()[0].id, "brand new-300");
}

#[tokio::test]
async fn test_warmup_passes_follow_session_change() {
    let (dom, _) = three_turns();
    let mut engine = engine(dom, MemoryStore::new());
    let mut now = 0.0;
    let d = engine.start(now);
    drive(&mut engine, d, &mut now).await;

    engine
        .dom_mut()
        .set_location("chatgpt.com", "https://chatgpt.com/c/other");
    let mut d = engine.trigger(Trigger::Navigation, now);
    let mut delays = Vec::new();
    for _ in 0..4 {
        d = drive(&mut engine, d, &mut now).await;
        if let Directive::ArmTimer { delay_ms, .. } = d {
            delays.push(delay_ms);
        }
    }
    assert_eq!(delays, vec![150.0, 600.0, 1500.0]);
    assert_eq!(engine.scheduler().run_count(), 5);
    assert_eq!(engine.scheduler().pending_warmups(), 0);
}

#[tokio::test]
async fn test_fragment_change_is_same_session() {
    let (dom, turns) = three_turns();
    let mut engine = engine(dom, MemoryStore::new());
    engine.run_pass(true, 0.0).await;
    let marker = engine.reconciler().marker_for(turns[0].1).unwrap();

    engine
        .dom_mut()
        .set_location("chatgpt.com", "https://chatgpt.com/c/first#bottom");
    assert!(!engine.begin_pass(100.0));
    assert_eq!(engine.reconciler().marker_for(turns[0].1), Some(marker));
}

// ============================================================================
// Favorites
// ============================================================================

#[tokio::test]
async fn test_favorite_round_trip() {
    let (dom, turns) = three_turns();
    let store = MemoryStore::new();
    let mut engine = engine(dom, store.clone());
    engine.run_pass(true, 0.0).await;
    let marker = engine.reconciler().marker_for(turns[1].1).unwrap();

    let MarkerAction::ToggleFavorite(entry) =
        engine.handle_marker_event(marker, MarkerEvent::ContextMenu, 10.0)
    else {
        panic!("context menu should toggle");
    };
    let d = engine.toggle_favorite(entry, 10.0).await;
    assert!(matches!(d, Directive::ArmTimer { delay_ms, .. } if delay_ms == 0.0));
    assert_eq!(
        store.snapshot(),
        vec![FavoriteEntry {
            id: "ok-900".into(),
            text: "ok".into(),
            position: 900.0,
        }]
    );

    let mut now = 10.0;
    drive(&mut engine, d, &mut now).await;
    assert!(engine.dom().has_class(marker, "favorite"));
    assert!(engine.reconciler().star_for(turns[1].1).is_some());

    // Second toggle removes it again; set semantics, no duplicates.
    let MarkerAction::ToggleFavorite(entry) =
        engine.handle_marker_event(marker, MarkerEvent::ContextMenu, now)
    else {
        panic!("context menu should toggle");
    };
    let d = engine.toggle_favorite(entry, now).await;
    assert!(store.snapshot().is_empty());
    drive(&mut engine, d, &mut now).await;
    assert!(!engine.dom().has_class(marker, "favorite"));
    assert!(engine.reconciler().star_for(turns[1].1).is_none());
}

#[tokio::test]
async fn test_external_favorite_change_applies() {
    let (dom, turns) = three_turns();
    let store = MemoryStore::new();
    let mut engine = engine(dom, store.clone());
    let mut now = 0.0;
    engine.run_pass(true, now).await;

    // Another surface (the popup) toggles through its own handle.
    let popup = store.clone();
    let entry = FavoriteEntry {
        id: "Why?-1700".into(),
        text: "Why?".into(),
        position: 1700.0,
    };
    assert!(crate::favorites::toggle_favorite(&popup, entry).await.unwrap());

    let d = engine.trigger(Trigger::FavoritesChanged, now);
    drive(&mut engine, d, &mut now).await;
    let marker = engine.reconciler().marker_for(turns[2].1).unwrap();
    assert!(engine.dom().has_class(marker, "favorite"));
}

#[tokio::test]
async fn test_failed_read_keeps_last_known_favorites() {
    let (dom, turns) = three_turns();
    let store = MemoryStore::with(vec![FavoriteEntry {
        id: "ok-900".into(),
        text: "ok".into(),
        position: 900.0,
    }]);
    let mut engine = engine(dom, store.clone());
    engine.run_pass(true, 0.0).await;
    assert!(engine.reconciler().star_for(turns[1].1).is_some());

    store.fail_with(Some(RailError::Store("quota".into())));
    engine.run_pass(true, 1000.0).await;
    assert!(engine.reconciler().star_for(turns[1].1).is_some());
    assert_eq!(store.loads(), 2);
}

#[tokio::test]
async fn test_failed_toggle_schedules_nothing() {
    let (dom, turns) = three_turns();
    let store = MemoryStore::new();
    let mut engine = engine(dom, store.clone());
    engine.run_pass(true, 0.0).await;
    let entry = engine.reconciler().favorite_entry(turns[0].1).unwrap();

    store.fail_with(Some(RailError::ContextInvalidated));
    assert_eq!(engine.toggle_favorite(entry, 10.0).await, Directive::Nothing);
    store.fail_with(None);
    assert!(store.snapshot().is_empty());
}

// ============================================================================
// Popup requests
// ============================================================================

#[tokio::test]
async fn test_scroll_request_applies_header_margin() {
    let (dom, _) = three_turns();
    let mut engine = engine(dom, MemoryStore::new());
    engine.run_pass(true, 0.0).await;

    let (response, d) =
        engine.handle_request(&InboundRequest::ScrollToQuestion { position: 640.0 }, 10.0);
    assert_eq!(response, InboundResponse::new("scrolling"));
    assert_eq!(d, Directive::Nothing);
    assert_eq!(engine.dom().window_scroll(), 628.0);
}

#[test]
fn test_get_questions_schedules_forced_pass() {
    let (dom, _) = three_turns();
    let mut engine = engine(dom, MemoryStore::new());
    let (response, d) = engine.handle_request(&InboundRequest::GetQuestions, 0.0);
    assert_eq!(response.status, "processing");
    assert_eq!(d, Directive::ArmTimer { token: 1, delay_ms: 0.0 });
}

#[tokio::test]
async fn test_marker_click_scrolls() {
    let (dom, turns) = three_turns();
    let mut engine = engine(dom, MemoryStore::new());
    engine.run_pass(true, 0.0).await;
    let marker = engine.reconciler().marker_for(turns[2].1).unwrap();

    assert_eq!(
        engine.handle_marker_event(marker, MarkerEvent::Click, 5.0),
        MarkerAction::Scrolled(1688.0)
    );
    assert_eq!(engine.dom().window_scroll(), 1688.0);
}
