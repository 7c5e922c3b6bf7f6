//! ContentScript: one engine instance per page
//!
//! Composes the site adapter, scroll locator, reconciler, scheduler and
//! session watch around injected collaborators (host DOM, favorites store,
//! message channel). Nothing here is global; the browser binding constructs
//! one instance and routes events into it.
//!
//! # Pass lifecycle
//! 1. a trigger goes through the scheduler ([`ContentScript::trigger`])
//! 2. the driver follows [`Directive`]s until it gets `Run`
//! 3. [`ContentScript::begin_pass`] (sync), favorites load (async),
//!    [`ContentScript::complete_pass`] (sync, always finishes the scheduler)
//!
//! Splitting around the one await lets a driver avoid holding a borrow of
//! the engine while the store read is in flight.

use crate::bridge::{
    send_best_effort, InboundRequest, InboundResponse, MessageChannel, OutboundMessage,
    QuestionSummary,
};
use crate::config::{IdScheme, RailConfig};
use crate::dom::{HostDom, MarkerEvent, NodeId};
use crate::error::Result;
use crate::favorites::{self, FavoriteEntry, FavoriteSet, FavoritesStore};
use crate::mutation::{InjectionFilter, MutationNote};
use crate::reconcile::{MarkerAction, MarkerReconciler, PassReport};
use crate::scheduler::{Directive, Trigger, UpdateScheduler};
use crate::scroll::ScrollLocator;
use crate::session::{SessionChange, SessionWatch};
use crate::site::{SiteAdapter, SiteTag};

pub struct ContentScript<D, S, C> {
    config: RailConfig,
    dom: D,
    store: S,
    channel: C,
    adapter: SiteAdapter,
    locator: ScrollLocator,
    reconciler: MarkerReconciler,
    scheduler: UpdateScheduler,
    session: SessionWatch,
    filter: InjectionFilter,
    /// Last successfully read favorites; used when a read fails.
    favorites: FavoriteSet,
    last_report: Option<PassReport>,
}

impl<D, S, C> ContentScript<D, S, C>
where
    D: HostDom,
    S: FavoritesStore + Clone,
    C: MessageChannel,
{
    pub fn new(config: RailConfig, mut dom: D, store: S, channel: C) -> Result<Self> {
        config.validate()?;
        if config.id_scheme != IdScheme::default() {
            log::warn!(
                "[ContentScript] id scheme {:?} differs from the default; favorites saved under the other scheme will not match",
                config.id_scheme
            );
        }
        let adapter = Self::build_adapter(&config, &mut dom);
        log::info!("[ContentScript] site: {}", adapter.tag().as_str());
        Ok(Self {
            locator: ScrollLocator::new(&config),
            reconciler: MarkerReconciler::new(&config),
            scheduler: UpdateScheduler::new(&config),
            session: SessionWatch::new(config.nav_grace_ms),
            filter: InjectionFilter::new(&config.names),
            favorites: FavoriteSet::new(),
            last_report: None,
            adapter,
            config,
            dom,
            store,
            channel,
        })
    }

    fn build_adapter(config: &RailConfig, dom: &mut D) -> SiteAdapter {
        SiteAdapter::for_host(&dom.location_host())
            .with_excluded([format!(".{}", config.names.star_class)])
    }

    // ---- accessors ----

    pub fn config(&self) -> &RailConfig {
        &self.config
    }

    pub fn dom(&self) -> &D {
        &self.dom
    }

    pub fn dom_mut(&mut self) -> &mut D {
        &mut self.dom
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn site(&self) -> SiteTag {
        self.adapter.tag()
    }

    pub fn reconciler(&self) -> &MarkerReconciler {
        &self.reconciler
    }

    pub fn scheduler(&self) -> &UpdateScheduler {
        &self.scheduler
    }

    pub fn injection_filter(&self) -> &InjectionFilter {
        &self.filter
    }

    pub fn last_summary(&self) -> &[QuestionSummary] {
        self.last_report
            .as_ref()
            .map(|r| r.summary.as_slice())
            .unwrap_or(&[])
    }

    pub fn last_report(&self) -> Option<&PassReport> {
        self.last_report.as_ref()
    }

    // ---- scheduling ----

    /// Delayed first pass.
    pub fn start(&mut self, now: f64) -> Directive {
        self.trigger(Trigger::Initial, now)
    }

    pub fn trigger(&mut self, trigger: Trigger, now: f64) -> Directive {
        if trigger == Trigger::Navigation {
            self.session.note_navigation(now);
        }
        let (force, delay) = trigger.policy(&self.config, self.session.recently_changed(now));
        log::trace!("[ContentScript] trigger {:?} force={} delay={}", trigger, force, delay);
        self.scheduler.schedule(force, delay, now)
    }

    /// Batch of mutation records; only structural host changes count.
    pub fn on_mutations(&mut self, notes: &[MutationNote], now: f64) -> Directive {
        if self.filter.any_relevant(notes) {
            self.trigger(Trigger::Mutation, now)
        } else {
            Directive::Nothing
        }
    }

    pub fn on_timer(&mut self, token: u64, now: f64) -> Directive {
        self.scheduler.on_timer(token, now)
    }

    pub fn on_frame(&mut self, token: u64, now: f64) -> Directive {
        self.scheduler.on_frame(token, now)
    }

    // ---- passes ----

    /// Start of a pass: detect a session change and reset if needed.
    /// Returns true when the previous conversation's state was dropped.
    pub fn begin_pass(&mut self, now: f64) -> bool {
        let href = self.dom.location_href();
        match self.session.observe(&href, now) {
            SessionChange::Changed { from, to } => {
                log::info!("[ContentScript] session changed: {} -> {}", from, to);
                self.reconciler.clear(&mut self.dom);
                self.locator.invalidate();
                self.adapter = Self::build_adapter(&self.config, &mut self.dom);
                self.last_report = None;
                self.scheduler.start_warmup(&self.config.warmup_delays_ms);
                true
            }
            SessionChange::First | SessionChange::Unchanged => false,
        }
    }

    /// Rest of the pass once favorites were read. Always releases the
    /// scheduler's running state and returns its follow-up directive.
    pub fn complete_pass(
        &mut self,
        loaded: Result<Vec<FavoriteEntry>>,
        force: bool,
        now: f64,
    ) -> Directive {
        match loaded {
            Ok(entries) => self.favorites = FavoriteSet::from_entries(entries),
            Err(e) if e.is_silent() => {
                log::debug!("[ContentScript] favorites unavailable: {}", e)
            }
            Err(e) => log::warn!("[ContentScript] favorites read failed: {}", e),
        }

        let report = self.reconciler.reconcile(
            &mut self.dom,
            &mut self.adapter,
            &mut self.locator,
            &self.favorites,
            force,
            now,
        );

        let mut keep = self.reconciler.retained_nodes();
        keep.extend(self.locator.cached().and_then(|h| h.element()));
        self.dom.release_except(&keep);

        send_best_effort(
            &self.channel,
            &OutboundMessage::QuestionList {
                questions: report.summary.clone(),
            },
        );
        self.last_report = Some(report);

        self.scheduler.finish(now)
    }

    /// Whole pass in one call, for drivers that can hold `&mut self`.
    pub async fn run_pass(&mut self, force: bool, now: f64) -> Directive {
        self.begin_pass(now);
        let store = self.store.clone();
        let loaded = store.load().await;
        self.complete_pass(loaded, force, now)
    }

    // ---- interaction ----

    pub fn handle_marker_event(
        &mut self,
        target: NodeId,
        event: MarkerEvent,
        now: f64,
    ) -> MarkerAction {
        self.reconciler.handle_event(
            &mut self.dom,
            &self.adapter,
            &mut self.locator,
            target,
            event,
            now,
        )
    }

    pub fn on_hover_timer(&mut self, now: f64) -> Option<f64> {
        self.reconciler.on_hover_timer(&mut self.dom, now)
    }

    /// Outcome of a store toggle. A successful write also arrives later as
    /// a storage change; refreshing here keeps this surface prompt.
    pub fn favorite_toggled(&mut self, result: Result<bool>, now: f64) -> Directive {
        match result {
            Ok(_) => self.trigger(Trigger::FavoritesChanged, now),
            Err(e) if e.is_silent() => {
                log::debug!("[ContentScript] favorite toggle dropped: {}", e);
                Directive::Nothing
            }
            Err(e) => {
                log::warn!("[ContentScript] favorite toggle failed: {}", e);
                Directive::Nothing
            }
        }
    }

    pub async fn toggle_favorite(&mut self, entry: FavoriteEntry, now: f64) -> Directive {
        let store = self.store.clone();
        let result = favorites::toggle_favorite(&store, entry).await;
        self.favorite_toggled(result, now)
    }

    /// Requests arriving over the extension channel.
    pub fn handle_request(
        &mut self,
        request: &InboundRequest,
        now: f64,
    ) -> (InboundResponse, Directive) {
        match request {
            InboundRequest::ScrollToQuestion { position } => {
                let first = self.adapter.message_elements(&mut self.dom).first().copied();
                let profile = self.adapter.profile();
                let handle = self.locator.locate(&mut self.dom, profile, first, now);
                self.locator
                    .scroll_to(&mut self.dom, profile, handle, *position);
                (InboundResponse::new("scrolling"), Directive::Nothing)
            }
            InboundRequest::GetQuestions => (
                InboundResponse::new("processing"),
                self.trigger(Trigger::External, now),
            ),
        }
    }
}
