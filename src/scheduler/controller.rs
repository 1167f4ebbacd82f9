use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use chrono::{DateTime, Utc};
use log::{debug, error, info};
use rand::{rngs::StdRng, SeedableRng};
use serde::Serialize;
use tokio::{task::JoinHandle, time};
use tokio_util::sync::CancellationToken;

use crate::settings::SettingsStore;

use super::{
    cycle::{CaptureCycle, CyclePhase},
    policy,
};

const DEFAULT_TICK_UNIT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerSnapshot {
    pub armed: bool,
    pub phase: CyclePhase,
    pub next_fire_at: Option<DateTime<Utc>>,
    pub cycles_completed: u64,
}

#[derive(Default)]
struct SchedulerState {
    armed: bool,
    /// Bumped on every arm and disarm; a timeline only rearms while its own
    /// generation is current.
    generation: u64,
    phase: CyclePhase,
    next_fire_at: Option<DateTime<Utc>>,
    cycles_started: u64,
    cycles_completed: u64,
    cancel: Option<CancellationToken>,
    timeline: Option<JoinHandle<()>>,
}

struct SchedulerInner {
    cycle: Arc<CaptureCycle>,
    settings: Arc<SettingsStore>,
    tick_unit: Duration,
    state: Mutex<SchedulerState>,
    cycle_gate: tokio::sync::Mutex<()>,
    rng: Mutex<StdRng>,
}

/// One-shot timer that is re-armed after every cycle until disarmed.
#[derive(Clone)]
pub struct CaptureScheduler {
    inner: Arc<SchedulerInner>,
}

impl CaptureScheduler {
    pub fn new(cycle: Arc<CaptureCycle>, settings: Arc<SettingsStore>) -> Self {
        Self::with_tick_unit(cycle, settings, DEFAULT_TICK_UNIT)
    }

    /// `tick_unit` is the length of one "frequency minute".
    pub fn with_tick_unit(
        cycle: Arc<CaptureCycle>,
        settings: Arc<SettingsStore>,
        tick_unit: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                cycle,
                settings,
                tick_unit,
                state: Mutex::new(SchedulerState::default()),
                cycle_gate: tokio::sync::Mutex::new(()),
                rng: Mutex::new(StdRng::from_entropy()),
            }),
        }
    }

    /// Start a fresh timeline, stopping any existing timer first. Must be called
    /// from within a Tokio runtime. Returns the first delay.
    pub fn arm(&self) -> Duration {
        let delay = self.inner.draw_delay();

        let mut state = self.inner.lock_state();
        if let Some(token) = state.cancel.take() {
            token.cancel();
        }
        state.generation = state.generation.wrapping_add(1);
        state.armed = true;
        state.phase = CyclePhase::Idle;
        state.next_fire_at = fire_at(delay);

        let generation = state.generation;
        let token = CancellationToken::new();
        state.cancel = Some(token.clone());
        state.timeline = Some(tokio::spawn(run_timeline(
            Arc::clone(&self.inner),
            generation,
            token,
            delay,
        )));

        info!(
            "Capture scheduler armed (generation {generation}), first capture in {}s",
            delay.as_secs()
        );
        delay
    }

    /// Stop the timer. A cycle already running finishes but will not rearm.
    /// Returns whether the scheduler was armed.
    pub fn disarm(&self) -> bool {
        let mut state = self.inner.lock_state();
        let was_armed = state.armed;

        state.armed = false;
        state.generation = state.generation.wrapping_add(1);
        state.phase = CyclePhase::Idle;
        state.next_fire_at = None;
        if let Some(token) = state.cancel.take() {
            token.cancel();
        }
        state.timeline.take();

        if was_armed {
            info!("Capture scheduler disarmed");
        }
        was_armed
    }

    pub fn is_armed(&self) -> bool {
        self.inner.lock_state().armed
    }

    pub fn snapshot(&self) -> SchedulerSnapshot {
        let state = self.inner.lock_state();
        SchedulerSnapshot {
            armed: state.armed,
            phase: state.phase,
            next_fire_at: state.next_fire_at,
            cycles_completed: state.cycles_completed,
        }
    }
}

impl SchedulerInner {
    fn lock_state(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn draw_delay(&self) -> Duration {
        let config = self.settings.snapshot();
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        policy::next_delay(
            &config.schedule,
            config.frequency_minutes,
            self.tick_unit,
            &mut *rng,
        )
    }

    fn is_current(&self, generation: u64) -> bool {
        let state = self.lock_state();
        state.armed && state.generation == generation
    }

    /// Record `phase` only for the current timeline. Returns whether it was current.
    fn set_phase(&self, generation: u64, phase: CyclePhase) -> bool {
        let mut state = self.lock_state();
        let current = state.armed && state.generation == generation;
        if current {
            state.phase = phase;
        }
        current
    }

    /// Run one cycle on the blocking pool. Cycles never overlap. Returns false
    /// without capturing when the timeline went stale while waiting for the gate.
    async fn run_cycle(self: &Arc<Self>, generation: u64) -> bool {
        let _gate = self.cycle_gate.lock().await;

        let cycle_number = {
            let mut state = self.lock_state();
            if !state.armed || state.generation != generation {
                return false;
            }
            state.cycles_started += 1;
            state.cycles_started
        };

        let inner = Arc::clone(self);
        let outcome = tokio::task::spawn_blocking(move || {
            inner.cycle.run(cycle_number, |phase| {
                inner.set_phase(generation, phase);
            })
        })
        .await;

        match outcome {
            Ok(report) => debug!("Cycle {cycle_number} finished: {report:?}"),
            Err(err) => error!("Cycle {cycle_number} aborted: {err}"),
        }

        self.lock_state().cycles_completed += 1;
        true
    }

    /// The rearm step. Draws the next delay only if this timeline is still the
    /// current, armed one; otherwise the timeline ends here.
    fn rearm(&self, generation: u64) -> Option<Duration> {
        if !self.set_phase(generation, CyclePhase::Rescheduling) {
            return None;
        }
        let delay = self.draw_delay();

        let mut state = self.lock_state();
        if !state.armed || state.generation != generation {
            return None;
        }
        state.phase = CyclePhase::Idle;
        state.next_fire_at = fire_at(delay);
        Some(delay)
    }
}

async fn run_timeline(
    inner: Arc<SchedulerInner>,
    generation: u64,
    cancel: CancellationToken,
    first_delay: Duration,
) {
    let mut delay = first_delay;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Timeline {generation} cancelled while waiting");
                return;
            }
            _ = time::sleep(delay) => {}
        }

        if !inner.is_current(generation) {
            return;
        }

        if !inner.run_cycle(generation).await {
            debug!("Timeline {generation} went stale waiting for the previous cycle");
            return;
        }

        match inner.rearm(generation) {
            Some(next) => {
                debug!("Next capture in {}s", next.as_secs());
                delay = next;
            }
            None => {
                debug!("Timeline {generation} not rearmed: scheduler stopped");
                return;
            }
        }
    }
}

fn fire_at(delay: Duration) -> Option<DateTime<Utc>> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|delta| Utc::now().checked_add_signed(delta))
}
