use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Callback invoked with an opaque event payload.
pub type Listener = Rc<dyn Fn(&dyn Any)>;

/// Disposable handle for an event subscription.
///
/// Disposal is explicit; dropping the handle leaves the listener attached.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("disposed", &self.cancel.is_none())
            .finish()
    }
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Detach the listener. Idempotent.
    pub fn dispose(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.cancel.is_none()
    }
}

/// Capability check for event subscription: a type exposing named events
/// implements this and answers `Some` for the names it actually has.
pub trait EventSource {
    fn subscribe(&self, event: &str, listener: Listener) -> Option<Subscription>;
}

/// Single-threaded event emitter with an ordered listener list.
#[derive(Default)]
pub struct EventEmitter {
    listeners: Rc<RefCell<Vec<(u64, Listener)>>>,
    next_token: Cell<u64>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: Listener) -> Subscription {
        let token = self.next_token.get();
        self.next_token.set(token + 1);
        self.listeners.borrow_mut().push((token, listener));

        let listeners = Rc::clone(&self.listeners);
        Subscription::new(move || {
            listeners.borrow_mut().retain(|(t, _)| *t != token);
        })
    }

    /// Fire every listener, in subscription order. The list is snapshotted
    /// first so listeners may subscribe or dispose while the event runs.
    pub fn emit(&self, payload: &dyn Any) {
        let snapshot: Vec<Listener> = self
            .listeners
            .borrow()
            .iter()
            .map(|(_, listener)| Rc::clone(listener))
            .collect();
        for listener in snapshot {
            listener(payload);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }
}
