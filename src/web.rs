//! Browser bindings: web-sys/js-sys implementations of every collaborator,
//! plus the runtime that turns scheduler directives into real timers.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::{Rc, Weak};

use serde::Serialize;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::{spawn_local, JsFuture};
use web_sys::{Document, Element, Event, HtmlElement, MutationObserver, MutationObserverInit, Node, Window};

use crate::bridge::{InboundRequest, MessageChannel, OutboundMessage};
use crate::config::RailConfig;
use crate::dom::{
    ChildNode, HostDom, MarkerEvent, NodeId, Overflow, Rect, ScrollHandle, ScrollMetrics, Viewport,
};
use crate::engine::ContentScript;
use crate::error::{RailError, Result};
use crate::favorites::{self, FavoriteEntry, FavoritesStore, FAVORITES_KEY};
use crate::mutation::{MutationKind, MutationNote, TouchedNode};
use crate::reconcile::MarkerAction;
use crate::scheduler::{Directive, Trigger};

/// Synthetic event dispatched after wrapped history navigation.
const NAVIGATED_EVENT: &str = "witq:navigated";

// =============================================================================
// Extension APIs
// =============================================================================

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(js_namespace = ["chrome", "storage", "local"], js_name = get, catch)]
    fn storage_local_get(keys: &JsValue) -> std::result::Result<js_sys::Promise, JsValue>;

    #[wasm_bindgen(js_namespace = ["chrome", "storage", "local"], js_name = set, catch)]
    fn storage_local_set(items: &JsValue) -> std::result::Result<js_sys::Promise, JsValue>;

    #[wasm_bindgen(js_namespace = ["chrome", "storage", "onChanged"], js_name = addListener, catch)]
    fn storage_on_changed(callback: &js_sys::Function) -> std::result::Result<(), JsValue>;

    #[wasm_bindgen(js_namespace = ["chrome", "runtime"], js_name = sendMessage, catch)]
    fn runtime_send_message(message: &JsValue) -> std::result::Result<js_sys::Promise, JsValue>;

    #[wasm_bindgen(js_namespace = ["chrome", "runtime", "onMessage"], js_name = addListener, catch)]
    fn runtime_on_message(callback: &js_sys::Function) -> std::result::Result<(), JsValue>;
}

fn js_error(e: JsValue) -> RailError {
    let message = e
        .dyn_ref::<js_sys::Error>()
        .map(|err| String::from(err.message()))
        .or_else(|| e.as_string())
        .unwrap_or_else(|| format!("{:?}", e));
    RailError::from_runtime_message(&message)
}

fn to_js<T: Serialize>(value: &T) -> Result<JsValue> {
    serde_wasm_bindgen::to_value(value).map_err(|e| RailError::Serialization(e.to_string()))
}

fn now() -> f64 {
    instant::now()
}

/// `chrome.storage.local`, key [`FAVORITES_KEY`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ChromeStore;

impl FavoritesStore for ChromeStore {
    async fn load(&self) -> Result<Vec<FavoriteEntry>> {
        let keys = js_sys::Object::new();
        js_sys::Reflect::set(&keys, &FAVORITES_KEY.into(), &js_sys::Array::new()).map_err(js_error)?;
        let promise = storage_local_get(&keys).map_err(js_error)?;
        let result = JsFuture::from(promise).await.map_err(js_error)?;
        let raw = js_sys::Reflect::get(&result, &FAVORITES_KEY.into()).map_err(js_error)?;
        if raw.is_undefined() || raw.is_null() {
            return Ok(Vec::new());
        }
        serde_wasm_bindgen::from_value(raw).map_err(|e| RailError::Serialization(e.to_string()))
    }

    async fn save(&self, entries: &[FavoriteEntry]) -> Result<()> {
        let items = js_sys::Object::new();
        js_sys::Reflect::set(&items, &FAVORITES_KEY.into(), &to_js(&entries)?).map_err(js_error)?;
        let promise = storage_local_set(&items).map_err(js_error)?;
        JsFuture::from(promise).await.map_err(js_error)?;
        Ok(())
    }
}

/// `chrome.runtime.sendMessage`, fire-and-forget.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChromeChannel;

impl MessageChannel for ChromeChannel {
    fn send(&self, message: &OutboundMessage) -> Result<()> {
        let value = to_js(message)?;
        let promise = runtime_send_message(&value).map_err(js_error)?;
        spawn_local(async move {
            if let Err(e) = JsFuture::from(promise).await {
                // No popup open is the common case.
                log::debug!("[ChromeChannel] {}", js_error(e));
            }
        });
        Ok(())
    }
}

// =============================================================================
// WebDom
// =============================================================================

type MarkerSink = Rc<dyn Fn(NodeId, MarkerEvent, &Event)>;
type Listener = Closure<dyn FnMut(Event)>;

/// [`HostDom`] over the live document. Element references are pinned in a
/// map keyed by a monotonically increasing id; a `WeakMap` gives the reverse
/// lookup so the same element always yields the same [`NodeId`].
pub struct WebDom {
    window: Window,
    document: Document,
    nodes: HashMap<NodeId, Element>,
    reverse: js_sys::WeakMap,
    next_id: u32,
    listeners: HashMap<NodeId, Vec<(Element, &'static str, Listener)>>,
    sink: MarkerSink,
}

impl WebDom {
    pub fn new(sink: MarkerSink) -> Result<Self> {
        let window = web_sys::window().ok_or_else(|| RailError::Dom("no window".into()))?;
        let document = window
            .document()
            .ok_or_else(|| RailError::Dom("no document".into()))?;
        Ok(Self {
            window,
            document,
            nodes: HashMap::new(),
            reverse: js_sys::WeakMap::new(),
            next_id: 1,
            listeners: HashMap::new(),
            sink,
        })
    }

    fn intern(&mut self, el: Element) -> NodeId {
        if let Some(idx) = self.reverse.get(&el).as_f64() {
            let id = NodeId(idx as u32);
            if self.nodes.contains_key(&id) {
                return id;
            }
        }
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.reverse.set(&el, &JsValue::from(id.0));
        self.nodes.insert(id, el);
        id
    }

    fn el(&self, node: NodeId) -> Option<&Element> {
        self.nodes.get(&node)
    }

    fn collect(&mut self, list: std::result::Result<web_sys::NodeList, JsValue>) -> Vec<NodeId> {
        let Ok(list) = list else {
            return Vec::new();
        };
        (0..list.length())
            .filter_map(|i| list.item(i))
            .filter_map(|n| n.dyn_into::<Element>().ok())
            .map(|el| self.intern(el))
            .collect()
    }

    fn drop_listeners(&mut self, node: NodeId) {
        if let Some(list) = self.listeners.remove(&node) {
            for (target, kind, closure) in list {
                let _ = target
                    .remove_event_listener_with_callback(kind, closure.as_ref().unchecked_ref());
            }
        }
    }

    fn listen(&mut self, owner: NodeId, target: Element, kind: &'static str, event: MarkerEvent) {
        let sink = self.sink.clone();
        let closure = Closure::<dyn FnMut(Event)>::new(move |ev: Event| sink(owner, event, &ev));
        let _ = target.add_event_listener_with_callback(kind, closure.as_ref().unchecked_ref());
        self.listeners
            .entry(owner)
            .or_default()
            .push((target, kind, closure));
    }
}

impl HostDom for WebDom {
    fn query_all(&mut self, selector: &str) -> Vec<NodeId> {
        let list = self.document.query_selector_all(selector);
        self.collect(list)
    }

    fn query_first(&mut self, selector: &str) -> Option<NodeId> {
        let found = self.document.query_selector(selector).ok().flatten()?;
        Some(self.intern(found))
    }

    fn query_within(&mut self, root: NodeId, selector: &str) -> Vec<NodeId> {
        let Some(list) = self.el(root).map(|el| el.query_selector_all(selector)) else {
            return Vec::new();
        };
        self.collect(list)
    }

    fn closest(&mut self, node: NodeId, selector: &str) -> Option<NodeId> {
        let found = self.el(node)?.closest(selector).ok().flatten()?;
        Some(self.intern(found))
    }

    fn matches(&mut self, node: NodeId, selector: &str) -> bool {
        self.el(node)
            .map(|el| el.matches(selector).unwrap_or(false))
            .unwrap_or(false)
    }

    fn parent(&mut self, node: NodeId) -> Option<NodeId> {
        let parent = self.el(node)?.parent_element()?;
        Some(self.intern(parent))
    }

    fn body(&mut self) -> Option<NodeId> {
        let body: Element = self.document.body()?.into();
        Some(self.intern(body))
    }

    fn is_connected(&mut self, node: NodeId) -> bool {
        self.el(node).map(|el| el.is_connected()).unwrap_or(false)
    }

    fn children(&mut self, node: NodeId) -> Vec<ChildNode> {
        let Some(list) = self.el(node).map(|el| el.child_nodes()) else {
            return Vec::new();
        };
        let mut out = Vec::with_capacity(list.length() as usize);
        for i in 0..list.length() {
            let Some(child) = list.item(i) else { continue };
            match child.node_type() {
                Node::TEXT_NODE => out.push(ChildNode::Text(child.text_content().unwrap_or_default())),
                Node::ELEMENT_NODE => {
                    if let Ok(el) = child.dyn_into::<Element>() {
                        out.push(ChildNode::Element(self.intern(el)));
                    }
                }
                _ => {}
            }
        }
        out
    }

    fn tag_name(&mut self, node: NodeId) -> String {
        self.el(node).map(|el| el.tag_name()).unwrap_or_default()
    }

    fn attribute(&mut self, node: NodeId, name: &str) -> Option<String> {
        self.el(node)?.get_attribute(name)
    }

    fn text_content(&mut self, node: NodeId) -> String {
        self.el(node)
            .and_then(|el| el.text_content())
            .unwrap_or_default()
    }

    fn location_href(&mut self) -> String {
        self.window.location().href().unwrap_or_default()
    }

    fn location_host(&mut self) -> String {
        self.window.location().hostname().unwrap_or_default()
    }

    fn bounding_rect(&mut self, node: NodeId) -> Rect {
        match self.el(node) {
            Some(el) => {
                let r = el.get_bounding_client_rect();
                Rect {
                    top: r.top(),
                    left: r.left(),
                    width: r.width(),
                    height: r.height(),
                }
            }
            None => Rect::default(),
        }
    }

    fn overflow_y(&mut self, node: NodeId) -> Overflow {
        let Some(el) = self.el(node) else {
            return Overflow::Visible;
        };
        self.window
            .get_computed_style(el)
            .ok()
            .flatten()
            .and_then(|style| style.get_property_value("overflow-y").ok())
            .map(|v| Overflow::parse(&v))
            .unwrap_or_default()
    }

    fn scroll_metrics(&mut self, node: NodeId) -> ScrollMetrics {
        match self.el(node) {
            Some(el) => ScrollMetrics {
                scroll_top: el.scroll_top() as f64,
                scroll_height: el.scroll_height() as f64,
                client_height: el.client_height() as f64,
            },
            None => ScrollMetrics::default(),
        }
    }

    fn viewport(&mut self) -> Viewport {
        let document_scroll_height = self
            .document
            .document_element()
            .map(|el| el.scroll_height() as f64)
            .unwrap_or(0.0);
        Viewport {
            scroll_y: self.window.scroll_y().unwrap_or(0.0),
            inner_height: self
                .window
                .inner_height()
                .ok()
                .and_then(|v| v.as_f64())
                .unwrap_or(0.0),
            document_scroll_height,
        }
    }

    fn smooth_scroll(&mut self, target: ScrollHandle, top: f64) -> bool {
        let opts = web_sys::ScrollToOptions::new();
        opts.set_top(top);
        opts.set_behavior(web_sys::ScrollBehavior::Smooth);
        match target {
            ScrollHandle::Viewport => {
                self.window.scroll_to_with_scroll_to_options(&opts);
                true
            }
            ScrollHandle::Element(node) => {
                let Some(el) = self.el(node) else {
                    return false;
                };
                let supported = js_sys::Reflect::get(el, &"scrollTo".into())
                    .map(|f| f.is_function())
                    .unwrap_or(false);
                if supported {
                    el.scroll_to_with_scroll_to_options(&opts);
                }
                supported
            }
        }
    }

    fn set_scroll_top(&mut self, target: ScrollHandle, top: f64) {
        match target {
            ScrollHandle::Viewport => self.window.scroll_to_with_x_and_y(0.0, top),
            ScrollHandle::Element(node) => {
                if let Some(el) = self.el(node) {
                    el.set_scroll_top(top.round() as i32);
                }
            }
        }
    }

    fn create_element(&mut self, tag: &str) -> NodeId {
        let el = self.document.create_element(tag).unwrap_throw();
        self.intern(el)
    }

    fn append_child(&mut self, parent: NodeId, child: NodeId) {
        if let (Some(p), Some(c)) = (self.el(parent), self.el(child)) {
            if let Err(e) = p.append_child(c) {
                log::debug!("[WebDom] append failed: {:?}", e);
            }
        }
    }

    fn remove(&mut self, node: NodeId) {
        self.drop_listeners(node);
        if let Some(el) = self.el(node) {
            el.remove();
        }
    }

    fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) {
        if let Some(el) = self.el(node) {
            let _ = el.set_attribute(name, value);
        }
    }

    fn set_class(&mut self, node: NodeId, class: &str, on: bool) {
        if let Some(el) = self.el(node) {
            let _ = el.class_list().toggle_with_force(class, on);
        }
    }

    fn set_style(&mut self, node: NodeId, property: &str, value: &str) {
        if let Some(el) = self.el(node).and_then(|el| el.dyn_ref::<HtmlElement>()) {
            let _ = el.style().set_property(property, value);
        }
    }

    fn set_inner_html(&mut self, node: NodeId, html: &str) {
        if let Some(el) = self.el(node) {
            el.set_inner_html(html);
        }
    }

    fn listen_marker(&mut self, marker: NodeId, tooltip: NodeId) {
        let (Some(m), Some(t)) = (self.el(marker).cloned(), self.el(tooltip).cloned()) else {
            return;
        };
        self.listen(marker, m.clone(), "mouseenter", MarkerEvent::Enter);
        self.listen(marker, m.clone(), "mouseleave", MarkerEvent::Leave);
        self.listen(marker, m.clone(), "click", MarkerEvent::Click);
        self.listen(marker, m, "contextmenu", MarkerEvent::ContextMenu);
        self.listen(marker, t.clone(), "mouseenter", MarkerEvent::TooltipEnter);
        self.listen(marker, t, "mouseleave", MarkerEvent::Leave);
    }

    fn release_except(&mut self, keep: &HashSet<NodeId>) {
        let drop: Vec<NodeId> = self
            .nodes
            .keys()
            .copied()
            .filter(|id| !keep.contains(id))
            .collect();
        for id in drop {
            self.drop_listeners(id);
            if let Some(el) = self.nodes.remove(&id) {
                self.reverse.delete(&el);
            }
        }
    }
}

// =============================================================================
// Runtime
// =============================================================================

type Engine = ContentScript<WebDom, ChromeStore, ChromeChannel>;

/// Owns the engine and drives it with real timers and listeners. Kept
/// alive by the listeners it installs for the lifetime of the page.
struct Runtime {
    engine: RefCell<Engine>,
    window: Window,
}

impl Runtime {
    fn apply(self: &Rc<Self>, directive: Directive) {
        match directive {
            Directive::Nothing => {}
            Directive::ArmTimer { token, delay_ms } => {
                let rt = self.clone();
                self.set_timeout(delay_ms, move || {
                    let next = rt.engine.borrow_mut().on_timer(token, now());
                    rt.apply(next);
                });
            }
            Directive::RequestFrame { token } => {
                let rt = self.clone();
                let cb = Closure::once_into_js(move || {
                    let next = rt.engine.borrow_mut().on_frame(token, now());
                    rt.apply(next);
                });
                if let Err(e) = self.window.request_animation_frame(cb.unchecked_ref()) {
                    log::warn!("[Runtime] requestAnimationFrame failed: {:?}", e);
                }
            }
            Directive::Run { force } => {
                let rt = self.clone();
                spawn_local(async move { rt.run(force).await });
            }
        }
    }

    fn set_timeout(&self, delay_ms: f64, f: impl FnOnce() + 'static) {
        let cb = Closure::once_into_js(f);
        let delay = delay_ms.max(0.0).ceil() as i32;
        if let Err(e) = self
            .window
            .set_timeout_with_callback_and_timeout_and_arguments_0(cb.unchecked_ref(), delay)
        {
            log::warn!("[Runtime] setTimeout failed: {:?}", e);
        }
    }

    async fn run(self: Rc<Self>, force: bool) {
        let store = {
            let mut engine = self.engine.borrow_mut();
            engine.begin_pass(now());
            *engine.store()
        };
        let loaded = store.load().await;
        let next = self.engine.borrow_mut().complete_pass(loaded, force, now());
        self.apply(next);
    }

    fn trigger(self: &Rc<Self>, trigger: Trigger) {
        let next = match self.engine.try_borrow_mut() {
            Ok(mut engine) => engine.trigger(trigger, now()),
            Err(_) => return,
        };
        self.apply(next);
    }

    fn marker_event(self: &Rc<Self>, target: NodeId, event: MarkerEvent, raw: &Event) {
        if event == MarkerEvent::ContextMenu {
            raw.prevent_default();
        }
        let action = match self.engine.try_borrow_mut() {
            Ok(mut engine) => engine.handle_marker_event(target, event, now()),
            Err(_) => return,
        };
        match action {
            MarkerAction::HideScheduled(deadline) => self.arm_hover(deadline),
            MarkerAction::ToggleFavorite(entry) => {
                let rt = self.clone();
                spawn_local(async move {
                    let result = favorites::toggle_favorite(&ChromeStore, entry).await;
                    let next = rt.engine.borrow_mut().favorite_toggled(result, now());
                    rt.apply(next);
                });
            }
            MarkerAction::None | MarkerAction::TooltipShown(_) | MarkerAction::Scrolled(_) => {}
        }
    }

    fn arm_hover(self: &Rc<Self>, deadline: f64) {
        let rt = self.clone();
        self.set_timeout(deadline - now(), move || {
            let next = rt.engine.borrow_mut().on_hover_timer(now());
            if let Some(deadline) = next {
                rt.arm_hover(deadline);
            }
        });
    }

    fn on_mutations(self: &Rc<Self>, records: js_sys::Array) {
        let next = match self.engine.try_borrow_mut() {
            Ok(mut engine) => {
                let selector = engine.injection_filter().selector();
                let notes: Vec<MutationNote> = records
                    .iter()
                    .filter_map(|r| r.dyn_into::<web_sys::MutationRecord>().ok())
                    .map(|r| mutation_note(&r, &selector))
                    .collect();
                engine.on_mutations(&notes, now())
            }
            Err(_) => return,
        };
        self.apply(next);
    }

    fn on_message(self: &Rc<Self>, message: JsValue, respond: &js_sys::Function) -> bool {
        let Ok(request) = serde_wasm_bindgen::from_value::<InboundRequest>(message) else {
            return false;
        };
        let (response, next) = match self.engine.try_borrow_mut() {
            Ok(mut engine) => engine.handle_request(&request, now()),
            Err(_) => return false,
        };
        match to_js(&response) {
            Ok(value) => {
                let _ = respond.call1(&JsValue::NULL, &value);
            }
            Err(e) => web_sys::console::error_1(&format!("[Runtime] {}", e).into()),
        }
        self.apply(next);
        false
    }
}

fn touched(node: &Node) -> TouchedNode {
    match node.dyn_ref::<Element>() {
        Some(el) => {
            let list = el.class_list();
            TouchedNode {
                is_element: true,
                id: Some(el.id()).filter(|id| !id.is_empty()),
                classes: (0..list.length()).filter_map(|i| list.item(i)).collect(),
            }
        }
        None => TouchedNode::text(),
    }
}

fn mutation_note(record: &web_sys::MutationRecord, injected_selector: &str) -> MutationNote {
    let kind = match record.type_().as_str() {
        "childList" => MutationKind::ChildList,
        "attributes" => MutationKind::Attributes,
        _ => MutationKind::CharacterData,
    };
    let target_injected = record
        .target()
        .and_then(|t| match t.dyn_into::<Element>() {
            Ok(el) => Some(el),
            Err(node) => node.parent_element(),
        })
        .and_then(|el| el.closest(injected_selector).ok().flatten())
        .is_some();
    let nodes = |list: web_sys::NodeList| -> Vec<TouchedNode> {
        (0..list.length())
            .filter_map(|i| list.item(i))
            .map(|n| touched(&n))
            .collect()
    };
    MutationNote {
        kind,
        target_injected,
        added: nodes(record.added_nodes()),
        removed: nodes(record.removed_nodes()),
    }
}

fn on_window_event(window: &Window, kind: &str, f: impl FnMut(Event) + 'static) -> Result<()> {
    let closure = Closure::<dyn FnMut(Event)>::new(f);
    window
        .add_event_listener_with_callback(kind, closure.as_ref().unchecked_ref())
        .map_err(js_error)?;
    closure.forget();
    Ok(())
}

/// Wrap `history.pushState`/`replaceState` so SPA route changes dispatch
/// [`NAVIGATED_EVENT`] on the window.
fn intercept_history(window: &Window) -> Result<()> {
    let history = window.history().map_err(js_error)?;
    for name in ["pushState", "replaceState"] {
        let original: js_sys::Function = js_sys::Reflect::get(&history, &name.into())
            .map_err(js_error)?
            .dyn_into()
            .map_err(|_| RailError::Dom(format!("history.{} is not a function", name)))?;
        let target = history.clone();
        let wrapper = Closure::<dyn FnMut(JsValue, JsValue, JsValue) -> JsValue>::new(
            move |state: JsValue, title: JsValue, url: JsValue| {
                let result = original
                    .call3(&target, &state, &title, &url)
                    .unwrap_or(JsValue::UNDEFINED);
                if let Some(w) = web_sys::window() {
                    if let Ok(ev) = Event::new(NAVIGATED_EVENT) {
                        let _ = w.dispatch_event(&ev);
                    }
                }
                result
            },
        );
        js_sys::Reflect::set(&history, &name.into(), wrapper.as_ref()).map_err(js_error)?;
        wrapper.forget();
    }
    Ok(())
}

fn install(config: RailConfig) -> Result<()> {
    let slot: Rc<RefCell<Weak<Runtime>>> = Rc::new(RefCell::new(Weak::new()));
    let sink_slot = slot.clone();
    let sink: MarkerSink = Rc::new(move |target: NodeId, event: MarkerEvent, raw: &Event| {
        let rt = sink_slot.borrow().upgrade();
        if let Some(rt) = rt {
            rt.marker_event(target, event, raw);
        }
    });

    let dom = WebDom::new(sink)?;
    let window = dom.window.clone();
    let engine = ContentScript::new(config, dom, ChromeStore, ChromeChannel)?;
    let rt = Rc::new(Runtime {
        engine: RefCell::new(engine),
        window: window.clone(),
    });
    *slot.borrow_mut() = Rc::downgrade(&rt);

    // Resize.
    let r = rt.clone();
    on_window_event(&window, "resize", move |_| r.trigger(Trigger::Resize))?;

    // Navigation: wrapped history calls and back/forward.
    if let Err(e) = intercept_history(&window) {
        log::debug!("[Runtime] history interception unavailable: {}", e);
    }
    for kind in [NAVIGATED_EVENT, "popstate"] {
        let r = rt.clone();
        on_window_event(&window, kind, move |_| r.trigger(Trigger::Navigation))?;
    }

    // Host DOM mutations.
    let r = rt.clone();
    let on_mutation = Closure::<dyn FnMut(js_sys::Array, MutationObserver)>::new(
        move |records: js_sys::Array, _observer: MutationObserver| r.on_mutations(records),
    );
    let observer = MutationObserver::new(on_mutation.as_ref().unchecked_ref()).map_err(js_error)?;
    on_mutation.forget();
    let init = MutationObserverInit::new();
    init.set_child_list(true);
    init.set_subtree(true);
    if let Some(body) = window.document().and_then(|d| d.body()) {
        observer
            .observe_with_options(&body, &init)
            .map_err(js_error)?;
    }

    // Favorites changed in any surface.
    let r = rt.clone();
    let on_storage = Closure::<dyn FnMut(JsValue, JsValue)>::new(move |changes: JsValue, area: JsValue| {
        let is_local = area.as_string().as_deref() == Some("local");
        let changed = js_sys::Reflect::has(&changes, &FAVORITES_KEY.into()).unwrap_or(false);
        if is_local && changed {
            r.trigger(Trigger::FavoritesChanged);
        }
    });
    match storage_on_changed(on_storage.as_ref().unchecked_ref()) {
        Ok(()) => on_storage.forget(),
        Err(e) => log::debug!("[Runtime] storage listener unavailable: {}", js_error(e)),
    }

    // Popup requests.
    let r = rt.clone();
    let on_message = Closure::<dyn FnMut(JsValue, JsValue, js_sys::Function) -> bool>::new(
        move |message: JsValue, _sender: JsValue, respond: js_sys::Function| {
            r.on_message(message, &respond)
        },
    );
    match runtime_on_message(on_message.as_ref().unchecked_ref()) {
        Ok(()) => on_message.forget(),
        Err(e) => log::debug!("[Runtime] message listener unavailable: {}", js_error(e)),
    }

    let first = rt.engine.borrow_mut().start(now());
    rt.apply(first);
    Ok(())
}

// =============================================================================
// WASM exports
// =============================================================================

/// Start the content script. `config` is an optional partial `RailConfig`.
#[wasm_bindgen(js_name = startContentScript)]
pub fn start_content_script(config: JsValue) -> std::result::Result<(), JsValue> {
    let config: RailConfig = if config.is_undefined() || config.is_null() {
        RailConfig::default()
    } else {
        serde_wasm_bindgen::from_value(config)
            .map_err(|e| JsValue::from_str(&format!("Failed to parse config: {}", e)))?
    };
    wasm_logger::init(wasm_logger::Config::new(config.log_level_filter()));
    install(config).map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Popup-side toggle sharing the content script's set semantics.
/// Resolves to the entry's new favorite state.
#[wasm_bindgen(js_name = toggleFavorite)]
pub async fn js_toggle_favorite(entry: JsValue) -> std::result::Result<JsValue, JsValue> {
    let entry: FavoriteEntry = serde_wasm_bindgen::from_value(entry)
        .map_err(|e| JsValue::from_str(&format!("Failed to parse entry: {}", e)))?;
    let now_favorite = favorites::toggle_favorite(&ChromeStore, entry)
        .await
        .map_err(|e| JsValue::from_str(&e.to_string()))?;
    Ok(JsValue::from_bool(now_favorite))
}
