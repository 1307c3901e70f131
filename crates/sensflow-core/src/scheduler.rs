#![forbid(unsafe_code)]

//! Single-threaded cooperative scheduler.
//!
//! Tasks are plain callbacks registered with a fire time and an optional
//! period. The host calls [`Scheduler::run_once`] in a loop; each call fires
//! every task that is due at that instant, one at a time, and returns.
//!
//! # Invariants
//!
//! 1. Due tasks fire in ascending `(next_fire_time, registration order)`.
//! 2. A periodic task is rescheduled to `anchor + period`, where `anchor` is
//!    the time it was *scheduled* to fire, never the time it actually ran.
//!    Slow callbacks therefore do not accumulate drift.
//! 3. `next_fire_time` of one task never decreases between fires, including
//!    with jitter and across [`Scheduler::set_interval`]: a rescheduled fire
//!    is clamped to no earlier than the previous one.
//! 4. One `run_once` fires each task at most once. Tasks registered during a
//!    run fire no earlier than the next run.
//! 5. [`Scheduler::cancel`] takes effect immediately, including from inside
//!    the cancelled task's own callback.
//!
//! # Failure Modes
//!
//! There is no isolation between tasks. A callback that panics unwinds
//! through `run_once` and takes the host loop with it: a stalled or corrupt
//! input must not leave scheduling state half-updated behind a caught panic.
//! Recoverable faults (failed reads, rejected configuration) are handled by
//! the callbacks themselves and never reach the scheduler.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

use web_time::Duration;

use crate::clock::Clock;

/// Identity of a registered task. Allocated in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u64);

impl TaskId {
    /// Raw registration sequence number.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// Repeat period of a task, optionally with random jitter added per fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    period: Duration,
    max_jitter: Duration,
}

impl Interval {
    /// Fire exactly every `period`.
    #[must_use]
    pub const fn fixed(period: Duration) -> Self {
        Self {
            period,
            max_jitter: Duration::ZERO,
        }
    }

    /// Fire every `period`, each fire delayed by a random amount in
    /// `0..=max_jitter`. The jitter is clamped to `period`.
    #[must_use]
    pub fn jittered(period: Duration, max_jitter: Duration) -> Self {
        Self {
            period,
            max_jitter: max_jitter.min(period),
        }
    }

    #[must_use]
    pub const fn period(&self) -> Duration {
        self.period
    }

    #[must_use]
    pub const fn max_jitter(&self) -> Duration {
        self.max_jitter
    }

    fn sample_jitter(&self) -> Duration {
        if self.max_jitter.is_zero() {
            return Duration::ZERO;
        }
        let span = self.max_jitter.as_micros().min(u64::MAX as u128 - 1) as u64;
        Duration::from_micros(rand::random::<u64>() % (span + 1))
    }
}

type Callback = Box<dyn FnMut(TaskId)>;

struct Task {
    interval: Option<Interval>,
    /// Un-jittered schedule point of the next fire.
    anchor: Duration,
    next_fire: Duration,
    last_anchor: Option<Duration>,
    /// Jittered time of the previous fire.
    last_fire: Option<Duration>,
    /// `None` while the callback is executing.
    callback: Option<Callback>,
    fires: u64,
}

impl Task {
    /// `anchor` plus fresh jitter, held at or after the previous fire.
    fn jittered_fire(&self, interval: Interval) -> Duration {
        let candidate = self.anchor + interval.sample_jitter();
        self.last_fire.map_or(candidate, |last| candidate.max(last))
    }
}

#[derive(Default)]
struct SchedulerState {
    tasks: BTreeMap<TaskId, Task>,
    next_id: u64,
    total_fires: u64,
}

/// Cooperative scheduler handle.
///
/// Cloning yields another handle to the same task set, so callbacks can
/// capture a clone to register or cancel tasks while the loop is running.
#[derive(Clone)]
pub struct Scheduler {
    clock: Clock,
    state: Rc<RefCell<SchedulerState>>,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("Scheduler")
            .field("tasks", &state.tasks.len())
            .field("total_fires", &state.total_fires)
            .field("clock", &self.clock)
            .finish()
    }
}

/// Non-owning [`Scheduler`] handle.
#[derive(Clone)]
pub struct WeakScheduler {
    clock: Clock,
    state: Weak<RefCell<SchedulerState>>,
}

impl WeakScheduler {
    /// `None` once every strong handle is gone.
    #[must_use]
    pub fn upgrade(&self) -> Option<Scheduler> {
        self.state.upgrade().map(|state| Scheduler {
            clock: self.clock.clone(),
            state,
        })
    }
}

impl fmt::Debug for WeakScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakScheduler")
            .field("alive", &(self.state.strong_count() > 0))
            .finish()
    }
}

impl Scheduler {
    #[must_use]
    pub fn new(clock: Clock) -> Self {
        Self {
            clock,
            state: Rc::new(RefCell::new(SchedulerState::default())),
        }
    }

    #[must_use]
    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Handle that does not keep the task set alive. Task callbacks that
    /// need to reach their own scheduler hold one of these to avoid a
    /// reference cycle through the task table.
    #[must_use]
    pub fn downgrade(&self) -> WeakScheduler {
        WeakScheduler {
            clock: self.clock.clone(),
            state: Rc::downgrade(&self.state),
        }
    }

    // ── Registration ─────────────────────────────────────────────────

    /// Register `callback` to first fire `initial_delay` from now.
    ///
    /// With `interval` set the task repeats; without it the task fires once
    /// and is removed. The callback receives its own [`TaskId`].
    pub fn register(
        &self,
        interval: Option<Interval>,
        initial_delay: Duration,
        callback: impl FnMut(TaskId) + 'static,
    ) -> TaskId {
        let anchor = self.clock.now() + initial_delay;
        let next_fire = anchor + interval.map_or(Duration::ZERO, |i| i.sample_jitter());
        let mut state = self.state.borrow_mut();
        let id = TaskId(state.next_id);
        state.next_id += 1;
        state.tasks.insert(
            id,
            Task {
                interval,
                anchor,
                next_fire,
                last_anchor: None,
                last_fire: None,
                callback: Some(Box::new(callback)),
                fires: 0,
            },
        );
        tracing::debug!(
            task = %id,
            period_ms = interval.map(|i| i.period().as_millis() as u64),
            first_fire_us = next_fire.as_micros() as u64,
            "task registered"
        );
        id
    }

    /// Repeat every `interval`, first fire immediately.
    pub fn every(&self, interval: Interval, callback: impl FnMut(TaskId) + 'static) -> TaskId {
        self.register(Some(interval), Duration::ZERO, callback)
    }

    /// Fire once after `delay`.
    pub fn after(&self, delay: Duration, callback: impl FnMut(TaskId) + 'static) -> TaskId {
        self.register(None, delay, callback)
    }

    /// Remove a task. Returns `false` if it was already gone.
    pub fn cancel(&self, id: TaskId) -> bool {
        let removed = self.state.borrow_mut().tasks.remove(&id);
        if removed.is_some() {
            tracing::debug!(task = %id, "task cancelled");
        }
        // Drop the callback (if not currently running) outside the borrow.
        removed.is_some()
    }

    /// Change the period of a periodic task.
    ///
    /// The next fire is re-anchored to the last scheduled fire plus the new
    /// period, but never earlier than the last actual fire. A task that has
    /// not fired yet keeps its first fire time.
    /// Returns `false` for unknown or one-shot tasks.
    pub fn set_interval(&self, id: TaskId, interval: Interval) -> bool {
        let mut state = self.state.borrow_mut();
        let Some(task) = state.tasks.get_mut(&id) else {
            return false;
        };
        if task.interval.is_none() {
            return false;
        }
        task.interval = Some(interval);
        // A running task is re-anchored when its callback returns.
        if task.callback.is_some() {
            if let Some(last) = task.last_anchor {
                task.anchor = last + interval.period();
                task.next_fire = task.jittered_fire(interval);
            }
        }
        tracing::debug!(
            task = %id,
            period_ms = interval.period().as_millis() as u64,
            "task interval changed"
        );
        true
    }

    // ── Inspection ───────────────────────────────────────────────────

    #[must_use]
    pub fn contains(&self, id: TaskId) -> bool {
        self.state.borrow().tasks.contains_key(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state.borrow().tasks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.borrow().tasks.is_empty()
    }

    /// Scheduled uptime of a task's next fire.
    #[must_use]
    pub fn next_fire(&self, id: TaskId) -> Option<Duration> {
        self.state.borrow().tasks.get(&id).map(|t| t.next_fire)
    }

    /// How many times a task has fired.
    #[must_use]
    pub fn fires(&self, id: TaskId) -> Option<u64> {
        self.state.borrow().tasks.get(&id).map(|t| t.fires)
    }

    /// Total fires across all tasks, including removed ones.
    #[must_use]
    pub fn total_fires(&self) -> u64 {
        self.state.borrow().total_fires
    }

    /// Earliest fire time among all tasks.
    #[must_use]
    pub fn next_due(&self) -> Option<Duration> {
        self.state.borrow().tasks.values().map(|t| t.next_fire).min()
    }

    /// Time from now until the earliest task is due (zero if overdue).
    #[must_use]
    pub fn time_until_next(&self) -> Option<Duration> {
        let now = self.clock.now();
        self.next_due().map(|due| due.saturating_sub(now))
    }

    // ── Execution ────────────────────────────────────────────────────

    /// Fire every task due at the current instant. Returns the number fired.
    pub fn run_once(&self) -> usize {
        let now = self.clock.now();
        let mut due: Vec<(Duration, TaskId)> = self
            .state
            .borrow()
            .tasks
            .iter()
            .filter(|(_, task)| task.next_fire <= now && task.callback.is_some())
            .map(|(id, task)| (task.next_fire, *id))
            .collect();
        due.sort_unstable();

        let mut fired = 0;
        for (_, id) in due {
            // An earlier callback in this run may have cancelled this task.
            let taken = {
                let mut state = self.state.borrow_mut();
                state
                    .tasks
                    .get_mut(&id)
                    .and_then(|task| task.callback.take().map(|cb| (cb, task.next_fire)))
            };
            let Some((mut callback, fire_time)) = taken else {
                continue;
            };

            tracing::trace!(task = %id, at_us = fire_time.as_micros() as u64, "task fired");
            callback(id);
            fired += 1;

            let leftover = self.finish_fire(id, callback, fire_time);
            drop(leftover);
        }
        fired
    }

    /// Reschedule or retire a task after its callback returned. Hands back
    /// the callback when it is no longer needed so it drops outside the
    /// state borrow.
    fn finish_fire(&self, id: TaskId, callback: Callback, fire_time: Duration) -> Option<Callback> {
        let mut state = self.state.borrow_mut();
        state.total_fires += 1;
        let Some(task) = state.tasks.get_mut(&id) else {
            // Cancelled during its own callback.
            return Some(callback);
        };
        task.fires += 1;
        task.last_fire = Some(fire_time);
        match task.interval {
            Some(interval) => {
                task.last_anchor = Some(task.anchor);
                task.anchor += interval.period();
                task.next_fire = task.jittered_fire(interval);
                task.callback = Some(callback);
                None
            }
            None => {
                state.tasks.remove(&id);
                Some(callback)
            }
        }
    }
}
