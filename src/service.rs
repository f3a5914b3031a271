use downcast_rs::{impl_downcast, Downcast};
use std::any::type_name;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::container::{Container, ContainerCore};
use crate::deferred::LazyService;
use crate::errors::ResolutionError;
use crate::events::{EventSource, Listener, Subscription};

/// Marker trait for anything a container can hand out.
///
/// The default `as_event_source` answers `None`; types exposing named
/// events override it so deferred stand-ins can buffer and replay
/// subscriptions against them.
pub trait Service: Downcast {
    fn as_event_source(&self) -> Option<&dyn EventSource> {
        None
    }
}
impl_downcast!(Service);

impl fmt::Debug for dyn Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<dyn Service>")
    }
}

/// Shared reference to a resolved service instance.
pub type ServiceRef = Rc<dyn Service>;

/// The access facade resolution hands out.
///
/// A handle is either a ready instance, a lazy stand-in for a delayed
/// descriptor, or the resolving scope itself. Every access path is an
/// explicit method; the ones that need the real object force a pending
/// stand-in to materialize first.
#[derive(Clone)]
pub struct ServiceHandle {
    inner: HandleInner,
}

#[derive(Clone)]
enum HandleInner {
    Ready(ServiceRef),
    Lazy(Rc<LazyService>),
    Scope(Weak<ContainerCore>),
}

impl ServiceHandle {
    pub fn ready(instance: ServiceRef) -> Self {
        Self {
            inner: HandleInner::Ready(instance),
        }
    }

    pub fn of<T: Service>(value: T) -> Self {
        Self::ready(Rc::new(value))
    }

    pub(crate) fn lazy(stand_in: Rc<LazyService>) -> Self {
        Self {
            inner: HandleInner::Lazy(stand_in),
        }
    }

    pub(crate) fn scope(core: Weak<ContainerCore>) -> Self {
        Self {
            inner: HandleInner::Scope(core),
        }
    }

    /// The underlying instance, forcing materialization of a stand-in.
    pub fn instance(&self) -> Result<ServiceRef, ResolutionError> {
        match &self.inner {
            HandleInner::Ready(instance) => Ok(Rc::clone(instance)),
            HandleInner::Lazy(stand_in) => stand_in.force(),
            HandleInner::Scope(core) => match core.upgrade() {
                Some(core) => Ok(Rc::new(Container::from_core(core)) as ServiceRef),
                None => Err(ResolutionError::unknown(Container::self_id().name())),
            },
        }
    }

    /// Checked downcast to a concrete service type. Forces materialization.
    pub fn downcast<T: Service>(&self) -> Result<Rc<T>, ResolutionError> {
        self.instance()?
            .downcast_rc::<T>()
            .map_err(|_| ResolutionError::TypeMismatch {
                expected: type_name::<T>(),
            })
    }

    /// Run `f` against the real instance, forcing materialization first.
    /// This is the write-through path: mutation goes through the instance's
    /// own interior mutability once it exists.
    pub fn with_instance<R>(
        &self,
        f: impl FnOnce(&dyn Service) -> R,
    ) -> Result<R, ResolutionError> {
        let instance = self.instance()?;
        Ok(f(&*instance))
    }

    /// Subscribe to a named event without forcing materialization.
    ///
    /// On a pending stand-in the listener is buffered and replayed when the
    /// real instance appears. `Ok(None)` means the (materialized) service
    /// does not expose an event with that name.
    pub fn subscribe(
        &self,
        event: &str,
        listener: Listener,
    ) -> Result<Option<Subscription>, ResolutionError> {
        match &self.inner {
            HandleInner::Ready(instance) => Ok(instance
                .as_event_source()
                .and_then(|source| source.subscribe(event, listener))),
            HandleInner::Lazy(stand_in) => stand_in.subscribe(event, listener),
            HandleInner::Scope(_) => Ok(None),
        }
    }

    /// True once a real instance exists behind this handle (ready handles
    /// always, stand-ins after materialization succeeded or failed).
    pub fn is_materialized(&self) -> bool {
        match &self.inner {
            HandleInner::Ready(_) | HandleInner::Scope(_) => true,
            HandleInner::Lazy(stand_in) => stand_in.is_materialized(),
        }
    }
}

impl fmt::Debug for ServiceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            HandleInner::Ready(_) => f.write_str("ServiceHandle::Ready"),
            HandleInner::Lazy(stand_in) => write!(
                f,
                "ServiceHandle::Lazy(materialized: {})",
                stand_in.is_materialized()
            ),
            HandleInner::Scope(_) => f.write_str("ServiceHandle::Scope"),
        }
    }
}
