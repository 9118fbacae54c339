//! Repeating timers for the assembler and dispatcher ticks.
//!
//! [`ThreadScheduler`] runs each timer on its own thread driven by a
//! crossbeam ticker. [`ManualScheduler`] runs timers on virtual time so
//! tests control cadence exactly.

use crate::clock::ManualClock;
use crossbeam_channel::{bounded, select, tick, Sender};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Work run on every tick.
pub type TickTask = Box<dyn FnMut() + Send + 'static>;

/// Something that can run a task at a fixed interval.
pub trait Scheduler: Send + Sync {
    fn schedule_repeating(
        &self,
        label: &'static str,
        interval: Duration,
        task: TickTask,
    ) -> TimerHandle;
}

/// Owner of a scheduled timer. Cancelling (or dropping) it stops the timer;
/// for threaded timers it also waits for an in-flight tick to finish.
pub struct TimerHandle {
    label: &'static str,
    cancelled: Arc<AtomicBool>,
    stop_tx: Option<Sender<()>>,
    thread_handle: Option<JoinHandle<()>>,
}

impl TimerHandle {
    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Stop the timer and wait until no tick is running.
    pub fn cancel(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
        // Dropping the sender wakes the timer thread.
        self.stop_tx.take();
        if let Some(handle) = self.thread_handle.take() {
            // A tick cancelling its own timer must not join itself.
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerHandle")
            .field("label", &self.label)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Wall-clock scheduler, one thread per timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadScheduler;

impl Scheduler for ThreadScheduler {
    fn schedule_repeating(
        &self,
        label: &'static str,
        interval: Duration,
        mut task: TickTask,
    ) -> TimerHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let (stop_tx, stop_rx) = bounded::<()>(0);
        let flag = cancelled.clone();

        let spawned = thread::Builder::new()
            .name(format!("wrist-relay-{label}"))
            .spawn(move || {
                let ticker = tick(interval);
                loop {
                    select! {
                        recv(ticker) -> _ => {
                            if flag.load(Ordering::SeqCst) {
                                break;
                            }
                            task();
                        }
                        recv(stop_rx) -> _ => break,
                    }
                }
                tracing::debug!(timer = label, "timer thread exited");
            });

        let thread_handle = match spawned {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::error!(timer = label, error = %e, "could not spawn timer thread");
                cancelled.store(true, Ordering::SeqCst);
                None
            }
        };

        TimerHandle {
            label,
            cancelled,
            stop_tx: Some(stop_tx),
            thread_handle,
        }
    }
}

struct VirtualTimer {
    id: u64,
    label: &'static str,
    interval_micros: u64,
    next_due: u64,
    cancelled: Arc<AtomicBool>,
    task: Option<TickTask>,
}

#[derive(Default)]
struct VirtualState {
    now: u64,
    next_id: u64,
    timers: Vec<VirtualTimer>,
    fired: HashMap<&'static str, u64>,
}

/// Deterministic scheduler on virtual time.
///
/// Timers fire in due-time order during [`ManualScheduler::advance`]; timers
/// due at the same instant fire in registration order. The shared
/// [`ManualClock`] is moved to each tick's due time before the task runs.
#[derive(Clone)]
pub struct ManualScheduler {
    clock: ManualClock,
    state: Arc<Mutex<VirtualState>>,
}

impl ManualScheduler {
    /// Create a scheduler that moves `clock` as virtual time advances.
    pub fn new(clock: ManualClock) -> Self {
        Self {
            clock,
            state: Arc::new(Mutex::new(VirtualState::default())),
        }
    }

    /// The clock shared with scheduled tasks.
    pub fn clock(&self) -> ManualClock {
        self.clock.clone()
    }

    /// Run every tick due within the next `by` of virtual time.
    pub fn advance(&self, by: Duration) {
        let target = self.lock().now + by.as_micros() as u64;

        loop {
            let (id, mut task) = {
                let mut state = self.lock();
                state.timers.retain(|t| !t.cancelled.load(Ordering::SeqCst));

                let now = state.now;
                let Some(timer) = state
                    .timers
                    .iter_mut()
                    .filter(|t| t.next_due <= target)
                    .min_by_key(|t| (t.next_due, t.id))
                else {
                    break;
                };
                let Some(task) = timer.task.take() else { break };

                let due = timer.next_due;
                timer.next_due += timer.interval_micros;
                let (id, label) = (timer.id, timer.label);

                self.clock.advance(Duration::from_micros(due - now));
                state.now = due;
                *state.fired.entry(label).or_insert(0) += 1;
                (id, task)
            };

            // Run outside the lock so the task may schedule or cancel timers.
            task();

            let mut state = self.lock();
            if let Some(timer) = state.timers.iter_mut().find(|t| t.id == id) {
                timer.task = Some(task);
            }
        }

        let mut state = self.lock();
        self.clock.advance(Duration::from_micros(target - state.now));
        state.now = target;
    }

    /// Number of times a timer with `label` has fired.
    pub fn fired(&self, label: &str) -> u64 {
        self.lock().fired.get(label).copied().unwrap_or(0)
    }

    /// Timers that are scheduled and not cancelled.
    pub fn active_timers(&self) -> usize {
        self.lock()
            .timers
            .iter()
            .filter(|t| !t.cancelled.load(Ordering::SeqCst))
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VirtualState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_repeating(
        &self,
        label: &'static str,
        interval: Duration,
        task: TickTask,
    ) -> TimerHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let interval_micros = (interval.as_micros() as u64).max(1);

        let mut state = self.lock();
        let id = state.next_id;
        state.next_id += 1;
        let next_due = state.now + interval_micros;
        state.timers.push(VirtualTimer {
            id,
            label,
            interval_micros,
            next_due,
            cancelled: cancelled.clone(),
            task: Some(task),
        });

        TimerHandle {
            label,
            cancelled,
            stop_tx: None,
            thread_handle: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, TickTask) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        (
            count,
            Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }),
        )
    }

    #[test]
    fn test_manual_ticks_follow_interval() {
        let scheduler = ManualScheduler::new(ManualClock::default());
        let (fast, fast_task) = counter();
        let (slow, slow_task) = counter();
        let _a = scheduler.schedule_repeating("fast", Duration::from_millis(20), fast_task);
        let _b = scheduler.schedule_repeating("slow", Duration::from_millis(100), slow_task);

        scheduler.advance(Duration::from_secs(1));
        assert_eq!(fast.load(Ordering::SeqCst), 50);
        assert_eq!(slow.load(Ordering::SeqCst), 10);
        assert_eq!(scheduler.fired("fast"), 50);
        assert_eq!(scheduler.clock().now_micros(), 1_000_000);
    }

    #[test]
    fn test_same_instant_fires_in_registration_order() {
        let scheduler = ManualScheduler::new(ManualClock::default());
        let order = Arc::new(Mutex::new(Vec::new()));
        let (o1, o2) = (order.clone(), order.clone());
        let _a = scheduler.schedule_repeating(
            "first",
            Duration::from_millis(50),
            Box::new(move || o1.lock().unwrap().push("first")),
        );
        let _b = scheduler.schedule_repeating(
            "second",
            Duration::from_millis(50),
            Box::new(move || o2.lock().unwrap().push("second")),
        );

        scheduler.advance(Duration::from_millis(50));
        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn test_cancelled_manual_timer_stops() {
        let scheduler = ManualScheduler::new(ManualClock::default());
        let (count, task) = counter();
        let handle = scheduler.schedule_repeating("t", Duration::from_millis(10), task);
        scheduler.advance(Duration::from_millis(30));
        handle.cancel();
        scheduler.advance(Duration::from_millis(30));

        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert_eq!(scheduler.active_timers(), 0);
    }

    #[test]
    fn test_thread_timer_runs_and_cancels() {
        let (count, task) = counter();
        let handle = ThreadScheduler.schedule_repeating("test", Duration::from_millis(5), task);
        thread::sleep(Duration::from_millis(60));
        handle.cancel();

        let after_cancel = count.load(Ordering::SeqCst);
        assert!(after_cancel > 0);
        thread::sleep(Duration::from_millis(30));
        assert_eq!(count.load(Ordering::SeqCst), after_cancel);
    }
}
