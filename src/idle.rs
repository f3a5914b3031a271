//! Cooperative idle scheduling.
//!
//! Deferred service construction runs either inside an idle task pumped by
//! the host, or synchronously when the first real access forces it;
//! whichever happens first wins. There is no native idle facility
//! in-process, so
//! the provided [`IdleQueue`] is the bounded time-box fallback: the host
//! calls [`IdleQueue::run_pending`] whenever it has spare cycles and each
//! task gets a short deadline.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::{Duration, Instant};
use tracing::trace;

/// Time budget handed to each idle task by the fallback queue.
const TIME_SLICE: Duration = Duration::from_millis(15);

/// Deadline visible to a running idle task.
pub struct IdleDeadline {
    end: Instant,
    did_timeout: bool,
}

impl IdleDeadline {
    pub fn time_remaining(&self) -> Duration {
        self.end.saturating_duration_since(Instant::now())
    }

    /// True when the task runs under the time-box fallback rather than a
    /// native idle callback.
    pub fn did_timeout(&self) -> bool {
        self.did_timeout
    }
}

pub type IdleTask = Box<dyn FnOnce(&IdleDeadline)>;

/// Cancellation handle for a scheduled idle task.
#[derive(Clone)]
pub struct IdleHandle {
    cancelled: Rc<Cell<bool>>,
}

impl IdleHandle {
    /// Cancel the task if it has not run yet. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.set(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.get()
    }
}

/// The idle-scheduling collaborator: must eventually run each scheduled
/// task exactly once unless it is cancelled first.
pub trait IdleScheduler {
    fn schedule(&self, task: IdleTask) -> IdleHandle;
}

struct QueuedTask {
    task: IdleTask,
    cancelled: Rc<Cell<bool>>,
}

/// FIFO fallback queue. Tasks wait until the host pumps `run_pending`.
#[derive(Default)]
pub struct IdleQueue {
    pending: RefCell<VecDeque<QueuedTask>>,
}

impl IdleQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the tasks that were pending on entry, each with a fresh
    /// time-box deadline. Tasks scheduled while the pump runs wait for the
    /// next pump. Returns how many tasks actually ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        let budget = self.pending.borrow().len();
        for _ in 0..budget {
            let entry = self.pending.borrow_mut().pop_front();
            let Some(entry) = entry else { break };
            if entry.cancelled.get() {
                continue;
            }
            let deadline = IdleDeadline {
                end: Instant::now() + TIME_SLICE,
                did_timeout: true,
            };
            trace!("running idle task");
            (entry.task)(&deadline);
            ran += 1;
        }
        ran
    }

    pub fn pending_count(&self) -> usize {
        self.pending.borrow().len()
    }
}

impl IdleScheduler for IdleQueue {
    fn schedule(&self, task: IdleTask) -> IdleHandle {
        let cancelled = Rc::new(Cell::new(false));
        self.pending.borrow_mut().push_back(QueuedTask {
            task,
            cancelled: Rc::clone(&cancelled),
        });
        IdleHandle { cancelled }
    }
}
