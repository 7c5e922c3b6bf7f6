//! UpdateScheduler: coalescing, rate limiting and reentrancy for passes
//!
//! # State machine
//! `Idle → Scheduled → Running → Idle`
//!
//! The scheduler owns no timers. Every call returns a [`Directive`] telling
//! the driver what to arm next (a timeout, an animation frame, or the pass
//! itself), and the driver reports back with the token it was given. Stale
//! tokens are ignored, which is how a superseded debounce gets cancelled.
//! This keeps the whole thing testable on a virtual clock.

use std::collections::VecDeque;

use crate::config::RailConfig;

// =============================================================================
// Triggers
// =============================================================================

/// Why a pass was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// First pass after the script loads.
    Initial,
    Resize,
    /// SPA route change (history push/replace, popstate).
    Navigation,
    /// Structural host DOM change.
    Mutation,
    /// The favorites key changed in storage.
    FavoritesChanged,
    /// Explicit "refresh now" from the popup.
    External,
}

impl Trigger {
    /// `(force, delay_ms)` for this trigger.
    pub fn policy(&self, config: &RailConfig, recently_navigated: bool) -> (bool, f64) {
        match self {
            Trigger::Initial => (true, config.initial_delay_ms),
            Trigger::Resize => (false, config.resize_debounce_ms),
            Trigger::Navigation => (true, 0.0),
            Trigger::Mutation if recently_navigated => {
                (false, config.mutation_debounce_after_nav_ms)
            }
            Trigger::Mutation => (false, config.mutation_debounce_ms),
            Trigger::FavoritesChanged => (true, 0.0),
            Trigger::External => (true, 0.0),
        }
    }
}

// =============================================================================
// State machine
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    /// A debounce timer or animation frame is pending.
    Scheduled,
    /// A pass is executing (possibly suspended on an await).
    Running,
}

/// What the driver should do next.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Directive {
    Nothing,
    /// Call [`UpdateScheduler::on_timer`] with `token` after `delay_ms`.
    ArmTimer { token: u64, delay_ms: f64 },
    /// Call [`UpdateScheduler::on_frame`] with `token` on the next frame.
    RequestFrame { token: u64 },
    /// Run a pass now, then call [`UpdateScheduler::finish`].
    Run { force: bool },
}

#[derive(Debug)]
pub struct UpdateScheduler {
    phase: Phase,
    /// Bumped on every (re)arm; callbacks carrying an older token are stale.
    generation: u64,
    deadline: Option<f64>,
    pending_force: bool,
    /// Set when a pass is requested mid-run; carries sticky forced-ness.
    rerun_after: Option<bool>,
    last_run_at: Option<f64>,
    warmups: VecDeque<f64>,
    min_interval_ms: f64,
    rerun_delay_ms: f64,
    runs: u64,
}

impl UpdateScheduler {
    pub fn new(config: &RailConfig) -> Self {
        Self {
            phase: Phase::Idle,
            generation: 0,
            deadline: None,
            pending_force: false,
            rerun_after: None,
            last_run_at: None,
            warmups: VecDeque::new(),
            min_interval_ms: config.min_interval_ms,
            rerun_delay_ms: config.rerun_delay_ms,
            runs: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn state_name(&self) -> &'static str {
        match self.phase {
            Phase::Idle => "idle",
            Phase::Scheduled => "scheduled",
            Phase::Running => "running",
        }
    }

    pub fn is_running(&self) -> bool {
        self.phase == Phase::Running
    }

    /// Passes started so far.
    pub fn run_count(&self) -> u64 {
        self.runs
    }

    pub fn pending_warmups(&self) -> usize {
        self.warmups.len()
    }

    /// Request a pass after `delay_ms`. Restarts the debounce, except that
    /// an unforced request never pushes back an earlier forced one.
    pub fn schedule(&mut self, force: bool, delay_ms: f64, now: f64) -> Directive {
        if self.phase == Phase::Running {
            self.rerun_after = Some(self.rerun_after.unwrap_or(false) || force);
            return Directive::Nothing;
        }

        let deadline = now + delay_ms.max(0.0);
        if self.phase == Phase::Scheduled && self.pending_force && !force {
            if let Some(existing) = self.deadline {
                if existing <= deadline {
                    return Directive::Nothing;
                }
            }
        }

        self.pending_force |= force;
        self.phase = Phase::Scheduled;
        self.generation += 1;
        self.deadline = Some(deadline);
        Directive::ArmTimer {
            token: self.generation,
            delay_ms: delay_ms.max(0.0),
        }
    }

    /// Debounce timer fired.
    pub fn on_timer(&mut self, token: u64, _now: f64) -> Directive {
        if token != self.generation || self.phase != Phase::Scheduled {
            return Directive::Nothing;
        }
        Directive::RequestFrame { token }
    }

    /// Animation frame arrived. Runs, or defers if the last pass was too recent.
    pub fn on_frame(&mut self, token: u64, now: f64) -> Directive {
        if token != self.generation || self.phase != Phase::Scheduled {
            return Directive::Nothing;
        }
        if let Some(last) = self.last_run_at {
            let elapsed = now - last;
            if elapsed < self.min_interval_ms {
                let wait = self.min_interval_ms - elapsed;
                self.generation += 1;
                self.deadline = Some(now + wait);
                return Directive::ArmTimer {
                    token: self.generation,
                    delay_ms: wait,
                };
            }
        }
        self.phase = Phase::Running;
        self.deadline = None;
        self.last_run_at = Some(now);
        self.runs += 1;
        let force = std::mem::take(&mut self.pending_force);
        Directive::Run { force }
    }

    /// The pass ended (successfully or not). Must always be called.
    pub fn finish(&mut self, now: f64) -> Directive {
        if self.phase != Phase::Running {
            return Directive::Nothing;
        }
        self.phase = Phase::Idle;
        if let Some(force) = self.rerun_after.take() {
            return self.schedule(force, self.rerun_delay_ms, now);
        }
        if let Some(delay) = self.warmups.pop_front() {
            return self.schedule(true, delay, now);
        }
        Directive::Nothing
    }

    /// Queue forced follow-up passes, one after each completed pass.
    pub fn start_warmup(&mut self, delays: &[f64]) {
        self.warmups = delays.iter().copied().collect();
    }
}
