//! Deferred construction.
//!
//! A [`DeferredValue`] is a compute-once memoized holder: construction is
//! scheduled on idle time at creation, and the first real access forces it
//! synchronously instead. Whichever happens first wins, enforced by the
//! one-shot state transition. [`LazyService`] builds the service stand-in
//! on top of it: event subscriptions made before materialization are
//! buffered and replayed against the real instance, everything else forces.

use indexmap::IndexMap;
use std::cell::RefCell;
use std::rc::Rc;
use tracing::debug;

use crate::errors::ResolutionError;
use crate::events::{Listener, Subscription};
use crate::idle::{IdleHandle, IdleScheduler};
use crate::service::{Service, ServiceRef};

type Builder<T> = Box<dyn FnOnce() -> Result<T, ResolutionError>>;

/// State transitions only move forward, exactly once from `Pending` to a
/// terminal state. `Materializing` guards the window while the builder
/// runs so re-entrant forcing is detected instead of looping.
enum DeferredState<T> {
    Pending(Option<Builder<T>>),
    Materializing,
    Done(T),
    Failed(ResolutionError),
}

/// Compute-once-lazily memoized value with an idle-time trigger and a
/// forced-early-execution path.
pub struct DeferredValue<T> {
    label: String,
    state: RefCell<DeferredState<T>>,
    idle: RefCell<Option<IdleHandle>>,
}

impl<T: Clone + 'static> DeferredValue<T> {
    /// Create the value and schedule its construction on idle time.
    pub fn new(
        label: impl Into<String>,
        scheduler: &dyn IdleScheduler,
        builder: impl FnOnce() -> Result<T, ResolutionError> + 'static,
    ) -> Rc<Self> {
        let value = Rc::new(Self {
            label: label.into(),
            state: RefCell::new(DeferredState::Pending(Some(Box::new(builder)))),
            idle: RefCell::new(None),
        });
        let weak = Rc::downgrade(&value);
        let handle = scheduler.schedule(Box::new(move |_deadline| {
            if let Some(deferred) = weak.upgrade() {
                deferred.materialize_idle();
            }
        }));
        *value.idle.borrow_mut() = Some(handle);
        value
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_materialized(&self) -> bool {
        matches!(
            &*self.state.borrow(),
            DeferredState::Done(_) | DeferredState::Failed(_)
        )
    }

    /// Peek at the outcome without forcing construction.
    pub fn try_get(&self) -> Option<Result<T, ResolutionError>> {
        match &*self.state.borrow() {
            DeferredState::Done(value) => Some(Ok(value.clone())),
            DeferredState::Failed(error) => Some(Err(error.clone())),
            _ => None,
        }
    }

    /// Materialize now: cancel the pending idle work and run the builder
    /// if it has not run yet. A cached failure is re-raised on every call;
    /// a failed build is never retried.
    pub fn force(&self) -> Result<T, ResolutionError> {
        if let Some(handle) = self.idle.borrow_mut().take() {
            handle.cancel();
        }
        self.run()
    }

    fn materialize_idle(&self) {
        if let Err(error) = self.run() {
            debug!(label = %self.label, %error, "idle materialization failed");
        }
    }

    fn run(&self) -> Result<T, ResolutionError> {
        let builder = {
            let mut state = self.state.borrow_mut();
            match &mut *state {
                DeferredState::Pending(slot) => {
                    let builder = slot.take();
                    *state = DeferredState::Materializing;
                    builder
                }
                DeferredState::Done(value) => return Ok(value.clone()),
                DeferredState::Failed(error) => return Err(error.clone()),
                DeferredState::Materializing => {
                    return Err(ResolutionError::RecursiveInstantiation {
                        id: self.label.clone(),
                    })
                }
            }
        };
        let Some(builder) = builder else {
            return Err(ResolutionError::RecursiveInstantiation {
                id: self.label.clone(),
            });
        };

        // No borrow is held here: the builder may run arbitrary user code,
        // including resolution that re-enters this module.
        match builder() {
            Ok(value) => {
                debug!(label = %self.label, "deferred value materialized");
                *self.state.borrow_mut() = DeferredState::Done(value.clone());
                Ok(value)
            }
            Err(error) => {
                let cached = self.as_failure(error);
                *self.state.borrow_mut() = DeferredState::Failed(cached.clone());
                Err(cached)
            }
        }
    }

    fn as_failure(&self, error: ResolutionError) -> ResolutionError {
        match error {
            cached @ ResolutionError::DeferredBuildFailure { .. } => cached,
            other => ResolutionError::DeferredBuildFailure {
                id: self.label.clone(),
                message: other.to_string(),
            },
        }
    }
}

struct EarlySlot {
    listener: Option<Listener>,
    real: Option<Subscription>,
}

/// Ordered per-name queues of subscriptions made before materialization.
#[derive(Default)]
struct EarlyListeners {
    queues: RefCell<IndexMap<String, Vec<Rc<RefCell<EarlySlot>>>>>,
}

impl EarlyListeners {
    fn buffer(&self, event: &str, listener: Listener) -> Subscription {
        let slot = Rc::new(RefCell::new(EarlySlot {
            listener: Some(listener),
            real: None,
        }));
        self.queues
            .borrow_mut()
            .entry(event.to_string())
            .or_default()
            .push(Rc::clone(&slot));
        Subscription::new(move || {
            let mut slot = slot.borrow_mut();
            slot.listener = None;
            if let Some(mut real) = slot.real.take() {
                real.dispose();
            }
        })
    }

    /// Replay every still-live buffered subscription against the real
    /// instance, in original registration order, then clear the queues.
    /// Names the instance does not expose are dropped.
    fn replay(&self, instance: &dyn Service) {
        let drained = std::mem::take(&mut *self.queues.borrow_mut());
        let Some(source) = instance.as_event_source() else {
            return;
        };
        for (event, slots) in drained {
            for slot_rc in slots {
                let listener = slot_rc.borrow().listener.clone();
                let Some(listener) = listener else { continue };
                if let Some(real) = source.subscribe(&event, listener) {
                    let mut slot = slot_rc.borrow_mut();
                    if slot.listener.is_some() {
                        slot.real = Some(real);
                    } else {
                        // disposed while the subscription was being made
                        let mut real = real;
                        drop(slot);
                        real.dispose();
                    }
                }
            }
        }
    }
}

/// The stand-in handed out for a delayed descriptor.
///
/// Subscribing to a named event before materialization buffers the
/// listener and returns a disposable handle immediately; forcing, via any
/// other access, builds the real instance exactly once and replays the
/// buffered subscriptions against it.
pub struct LazyService {
    deferred: Rc<DeferredValue<ServiceRef>>,
    early: Rc<EarlyListeners>,
}

impl LazyService {
    pub(crate) fn new(
        label: impl Into<String>,
        scheduler: &dyn IdleScheduler,
        build: impl FnOnce() -> Result<ServiceRef, ResolutionError> + 'static,
    ) -> Rc<Self> {
        let early = Rc::new(EarlyListeners::default());
        let replay_queue = Rc::clone(&early);
        let deferred = DeferredValue::new(label, scheduler, move || {
            let instance = build()?;
            replay_queue.replay(&*instance);
            Ok(instance)
        });
        Rc::new(Self { deferred, early })
    }

    pub fn label(&self) -> &str {
        self.deferred.label()
    }

    pub fn force(&self) -> Result<ServiceRef, ResolutionError> {
        self.deferred.force()
    }

    pub fn is_materialized(&self) -> bool {
        self.deferred.is_materialized()
    }

    pub fn subscribe(
        &self,
        event: &str,
        listener: Listener,
    ) -> Result<Option<Subscription>, ResolutionError> {
        match self.deferred.try_get() {
            None => Ok(Some(self.early.buffer(event, listener))),
            Some(Ok(instance)) => Ok(instance
                .as_event_source()
                .and_then(|source| source.subscribe(event, listener))),
            Some(Err(error)) => Err(error),
        }
    }
}
