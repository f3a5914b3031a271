use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::rc::Rc;

use crate::errors::ResolutionError;
use crate::service::{Service, ServiceHandle, ServiceRef};
use crate::service_id::ServiceId;

/// A leading constructor argument fixed at registration time.
pub type StaticArg = Rc<dyn Any>;

type BuildFn = Rc<dyn Fn(&FactoryArgs<'_>) -> Result<ServiceRef, ResolutionError>>;

/// Fixed-arity factory for one constructible type.
///
/// Carries the `TypeId` used to look up the type's declared dependencies
/// and the type name used in diagnostics. The closure receives the leading
/// static arguments and the resolved dependency slots and returns the
/// built instance.
#[derive(Clone)]
pub struct Constructor {
    type_id: TypeId,
    type_name: &'static str,
    build: BuildFn,
}

impl Constructor {
    pub fn of<T: Service>(
        build: impl Fn(&FactoryArgs<'_>) -> Result<T, ResolutionError> + 'static,
    ) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            build: Rc::new(move |args| build(args).map(|value| Rc::new(value) as ServiceRef)),
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub(crate) fn construct(&self, args: &FactoryArgs<'_>) -> Result<ServiceRef, ResolutionError> {
        (self.build)(args)
    }
}

impl fmt::Debug for Constructor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Constructor({})", self.type_name)
    }
}

/// One resolved dependency slot: the identifier that was requested and the
/// handle it resolved to, absent when a lenient container substituted a
/// missing registration with a no-op slot.
#[derive(Debug, Clone)]
pub struct ResolvedDependency {
    pub id: ServiceId,
    pub handle: Option<ServiceHandle>,
}

/// Argument view handed to a factory: leading static arguments (padded or
/// truncated to line up with the first declared dependency slot) followed
/// by the resolved dependencies, ordered by declared slot.
pub struct FactoryArgs<'a> {
    static_args: &'a [Option<StaticArg>],
    services: &'a [ResolvedDependency],
}

impl<'a> FactoryArgs<'a> {
    pub(crate) fn new(
        static_args: &'a [Option<StaticArg>],
        services: &'a [ResolvedDependency],
    ) -> Self {
        Self {
            static_args,
            services,
        }
    }

    /// Typed access to a leading argument. `None` for an absent padding
    /// slot, an out-of-range index, or a type mismatch.
    pub fn static_arg<T: 'static>(&self, slot: usize) -> Option<Rc<T>> {
        self.static_args
            .get(slot)
            .and_then(|arg| arg.as_ref())
            .and_then(|arg| Rc::clone(arg).downcast::<T>().ok())
    }

    pub fn static_len(&self) -> usize {
        self.static_args.len()
    }

    /// The `index`-th declared dependency (by slot order), if it resolved.
    pub fn service(&self, index: usize) -> Option<&ServiceHandle> {
        self.services.get(index).and_then(|dep| dep.handle.as_ref())
    }

    pub fn require_service(&self, index: usize) -> Result<&ServiceHandle, ResolutionError> {
        let Some(dep) = self.services.get(index) else {
            return Err(ResolutionError::unknown(format!(
                "<dependency slot {index}>"
            )));
        };
        dep.handle
            .as_ref()
            .ok_or_else(|| ResolutionError::unknown(dep.id.name()))
    }

    pub fn service_len(&self) -> usize {
        self.services.len()
    }
}

/// Immutable recipe for building one service: factory, fixed leading
/// arguments, and whether construction may be deferred until first use.
pub struct ServiceDescriptor {
    ctor: Constructor,
    static_args: Vec<StaticArg>,
    delayed: bool,
}

impl ServiceDescriptor {
    pub fn new(ctor: Constructor, static_args: Vec<StaticArg>, delayed: bool) -> Self {
        Self {
            ctor,
            static_args,
            delayed,
        }
    }

    /// Eager descriptor without static arguments.
    pub fn eager(ctor: Constructor) -> Self {
        Self::new(ctor, Vec::new(), false)
    }

    /// Delayed descriptor without static arguments: resolution hands out a
    /// stand-in and construction runs on idle time or first real access.
    pub fn deferred(ctor: Constructor) -> Self {
        Self::new(ctor, Vec::new(), true)
    }

    pub fn ctor(&self) -> &Constructor {
        &self.ctor
    }

    pub fn static_args(&self) -> &[StaticArg] {
        &self.static_args
    }

    pub fn is_delayed(&self) -> bool {
        self.delayed
    }
}

impl fmt::Debug for ServiceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("ctor", &self.ctor.type_name())
            .field("static_args", &self.static_args.len())
            .field("delayed", &self.delayed)
            .finish()
    }
}
