//! The resolution engine.
//!
//! A [`Container`] owns a [`ServiceRegistry`], an optional parent scope and
//! the get-or-create algorithm: walk declared dependencies, build a
//! transient graph of not-yet-built descriptors, detect cycles, then
//! instantiate in dependency waves, caching each new singleton in whichever
//! scope owns its descriptor. Delayed descriptors materialize through a
//! [`LazyService`] stand-in instead of being built eagerly.

mod trace;

pub use trace::CreationTrace;

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use tracing::{debug, warn};

use crate::dependencies::DependencyTable;
use crate::descriptor::{Constructor, ResolvedDependency, ServiceDescriptor, StaticArg};
use crate::deferred::LazyService;
use crate::errors::ResolutionError;
use crate::graph::Graph;
use crate::idle::{IdleQueue, IdleScheduler};
use crate::registry::{ServiceEntry, ServiceRegistry};
use crate::service::{Service, ServiceHandle, ServiceRef};
use crate::service_id::ServiceId;

const DEFAULT_CYCLE_SCAN_LIMIT: usize = 1000;

/// Tunables for a container scope. Children inherit their parent's options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerOptions {
    /// Fail the whole operation when a declared dependency is not
    /// registered anywhere in the chain. Lenient scopes warn and
    /// substitute an absent slot instead.
    pub strict: bool,
    /// Visited-node bound for the build walk. A heuristic stand-in for a
    /// cycle proof, not a guarantee.
    pub cycle_scan_limit: usize,
    /// Record the creation trace.
    pub tracing: bool,
}

impl Default for ContainerOptions {
    fn default() -> Self {
        Self {
            strict: false,
            cycle_scan_limit: DEFAULT_CYCLE_SCAN_LIMIT,
            tracing: false,
        }
    }
}

pub(crate) struct ContainerCore {
    registry: RefCell<ServiceRegistry>,
    parent: Option<Container>,
    options: ContainerOptions,
    dependencies: Rc<DependencyTable>,
    scheduler: Rc<dyn IdleScheduler>,
    active_builds: RefCell<FxHashSet<ServiceId>>,
    trace: Option<CreationTrace>,
    /// Identifier recorded as the cause of every access made through this
    /// scope. Set on the short-lived scopes that run deferred builds.
    trace_origin: Option<String>,
}

/// One node of the transient per-resolution graph: an identifier together
/// with the descriptor that will build it.
#[derive(Clone)]
struct BuildNode {
    id: ServiceId,
    descriptor: Rc<ServiceDescriptor>,
}

fn cyclic<T>(graph: &Graph<T>) -> ResolutionError {
    let cycle = graph
        .find_cycle_slow()
        .unwrap_or_else(|| format!("unable to detect cycle, dumping graph:\n{graph}"));
    ResolutionError::CyclicDependency { cycle }
}

/// Hierarchical resolution scope.
///
/// Cheap to clone; clones share the same scope. Lookups miss through to the
/// parent chain, and a descriptor's built instance is always cached in the
/// scope whose registry holds the descriptor, so every descendant observes
/// the same singleton.
#[derive(Clone)]
pub struct Container {
    core: Rc<ContainerCore>,
}

impl Service for Container {}

impl Container {
    /// The identifier under which every scope registers itself, letting
    /// services take a constructor dependency on the engine.
    pub fn self_id() -> ServiceId {
        ServiceId::new("container")
    }

    pub fn new(registry: ServiceRegistry) -> Self {
        Self::builder().registry(registry).build()
    }

    pub fn builder() -> ContainerBuilder {
        ContainerBuilder::default()
    }

    pub(crate) fn from_core(core: Rc<ContainerCore>) -> Self {
        Self { core }
    }

    fn new_scope(
        registry: ServiceRegistry,
        options: ContainerOptions,
        dependencies: Rc<DependencyTable>,
        scheduler: Rc<dyn IdleScheduler>,
        parent: Option<Container>,
        trace: Option<CreationTrace>,
        trace_origin: Option<String>,
    ) -> Self {
        let core = Rc::new_cyclic(|weak: &Weak<ContainerCore>| {
            let mut registry = registry;
            registry.set(
                Container::self_id(),
                ServiceEntry::Instance(ServiceHandle::scope(weak.clone())),
            );
            ContainerCore {
                registry: RefCell::new(registry),
                parent,
                options,
                dependencies,
                scheduler,
                active_builds: RefCell::new(FxHashSet::default()),
                trace,
                trace_origin,
            }
        });
        Self { core }
    }

    /// A child scope with its own registry. Lookups that miss the child
    /// registry continue in this scope; singleton ownership is unaffected
    /// by which scope performs the lookup.
    pub fn create_child(&self, registry: ServiceRegistry) -> Self {
        Self::new_scope(
            registry,
            self.core.options.clone(),
            Rc::clone(&self.core.dependencies),
            Rc::clone(&self.core.scheduler),
            Some(self.clone()),
            self.core.trace.clone(),
            None,
        )
    }

    /// Whether two container values are views of the same scope.
    pub fn is_same_scope(&self, other: &Container) -> bool {
        Rc::ptr_eq(&self.core, &other.core)
    }

    pub fn options(&self) -> &ContainerOptions {
        &self.core.options
    }

    pub fn trace(&self) -> Option<&CreationTrace> {
        self.core.trace.as_ref()
    }

    pub fn scheduler(&self) -> &Rc<dyn IdleScheduler> {
        &self.core.scheduler
    }

    pub fn dependencies(&self) -> &Rc<DependencyTable> {
        &self.core.dependencies
    }

    /// Register directly into this scope's own registry.
    pub fn register(&self, id: ServiceId, entry: ServiceEntry) -> Option<ServiceEntry> {
        self.core.registry.borrow_mut().set(id, entry)
    }

    pub fn register_instance(&self, id: ServiceId, instance: ServiceRef) -> Option<ServiceEntry> {
        self.core.registry.borrow_mut().set_instance(id, instance)
    }

    pub fn register_descriptor(
        &self,
        id: ServiceId,
        descriptor: ServiceDescriptor,
    ) -> Option<ServiceEntry> {
        self.core
            .registry
            .borrow_mut()
            .set_descriptor(id, descriptor)
    }

    /// Whether the identifier is registered in this scope or any ancestor.
    pub fn has(&self, id: ServiceId) -> bool {
        self.entry_for(id).is_some()
    }

    /// Run `f` with a resolution accessor. The accessor is only valid for
    /// the dynamic extent of this call: retaining it (or a clone) and
    /// calling it later fails with `StaleAccessor`, also when `f` panics.
    pub fn invoke<R>(&self, f: impl FnOnce(&ServicesAccessor) -> R) -> R {
        struct Guard(Rc<Cell<bool>>);
        impl Drop for Guard {
            fn drop(&mut self) {
                self.0.set(false);
            }
        }

        let accessor = ServicesAccessor {
            container: self.clone(),
            live: Rc::new(Cell::new(true)),
        };
        let _guard = Guard(Rc::clone(&accessor.live));
        f(&accessor)
    }

    /// Build one instance eagerly, resolving declared dependency slots and
    /// splicing them after `leading_args`. A leading-argument count that
    /// does not line up with the first declared slot is realigned with a
    /// warning, not an error.
    pub fn create_instance(
        &self,
        ctor: &Constructor,
        leading_args: Vec<StaticArg>,
    ) -> Result<ServiceRef, ResolutionError> {
        let args = leading_args.into_iter().map(Some).collect();
        self.construct_with(ctor, args)
    }

    /// Like [`create_instance`](Self::create_instance) with the
    /// descriptor's static arguments prepended. Always eager: the delayed
    /// flag only takes effect on the registry resolution path.
    pub fn create_from_descriptor(
        &self,
        descriptor: &ServiceDescriptor,
        extra_args: Vec<StaticArg>,
    ) -> Result<ServiceRef, ResolutionError> {
        let args = descriptor
            .static_args()
            .iter()
            .map(|arg| Some(Rc::clone(arg)))
            .chain(extra_args.into_iter().map(Some))
            .collect();
        self.construct_with(descriptor.ctor(), args)
    }

    fn entry_for(&self, id: ServiceId) -> Option<ServiceEntry> {
        if let Some(entry) = self.core.registry.borrow().get(id) {
            return Some(entry.clone());
        }
        self.core
            .parent
            .as_ref()
            .and_then(|parent| parent.entry_for(id))
    }

    pub(crate) fn get_or_create(&self, id: ServiceId) -> Result<ServiceHandle, ResolutionError> {
        if let (Some(trace), Some(origin)) = (&self.core.trace, &self.core.trace_origin) {
            trace.record(origin, id.name());
        }
        match self.entry_for(id) {
            Some(ServiceEntry::Instance(handle)) => Ok(handle),
            Some(ServiceEntry::Descriptor(descriptor)) => {
                self.safe_create_and_cache(id, descriptor)
            }
            None => Err(ResolutionError::unknown(id.name())),
        }
    }

    /// Guard against lexical self-recursion: a factory calling back into
    /// the resolver for its own identifier never shows up as a graph cycle,
    /// so it is caught by the per-scope active-build set instead.
    fn safe_create_and_cache(
        &self,
        id: ServiceId,
        descriptor: Rc<ServiceDescriptor>,
    ) -> Result<ServiceHandle, ResolutionError> {
        struct ActiveBuildGuard {
            core: Rc<ContainerCore>,
            id: ServiceId,
        }
        impl Drop for ActiveBuildGuard {
            fn drop(&mut self) {
                self.core.active_builds.borrow_mut().remove(&self.id);
            }
        }

        if !self.core.active_builds.borrow_mut().insert(id) {
            return Err(ResolutionError::RecursiveInstantiation {
                id: id.name().to_string(),
            });
        }
        let _guard = ActiveBuildGuard {
            core: Rc::clone(&self.core),
            id,
        };
        self.create_and_cache(id, descriptor)
    }

    fn create_and_cache(
        &self,
        id: ServiceId,
        descriptor: Rc<ServiceDescriptor>,
    ) -> Result<ServiceHandle, ResolutionError> {
        let mut graph: Graph<BuildNode> = Graph::new(|node: &BuildNode| node.id.name().to_string());
        let mut stack = vec![BuildNode { id, descriptor }];
        let mut visited = 0usize;

        // Phase one: explicit work-stack walk over not-yet-built
        // descriptors reachable from the request. Nodes are revisited when
        // pushed again, which is what lets the visit counter act as a weak
        // but working cycle heuristic.
        while let Some(item) = stack.pop() {
            graph.lookup_or_insert_node(item.clone());

            visited += 1;
            if visited > self.core.options.cycle_scan_limit {
                return Err(cyclic(&graph));
            }

            for dependency in self
                .core
                .dependencies
                .dependencies_of(item.descriptor.ctor().type_id())
            {
                match self.entry_for(dependency.id) {
                    None => {
                        warn!(
                            service = %item.id,
                            dependency = %dependency.id,
                            "service depends on an unregistered service"
                        );
                        if self.core.options.strict {
                            return Err(ResolutionError::unknown(dependency.id.name()));
                        }
                    }
                    Some(entry) => {
                        if let Some(trace) = &self.core.trace {
                            trace.record(item.id.name(), dependency.id.name());
                        }
                        if let ServiceEntry::Descriptor(dep_descriptor) = entry {
                            let node = BuildNode {
                                id: dependency.id,
                                descriptor: dep_descriptor,
                            };
                            graph.insert_edge(item.clone(), node.clone());
                            stack.push(node);
                        }
                    }
                }
            }
        }

        // Phase two: build in waves of roots, caching each instance in the
        // scope that owns its descriptor.
        loop {
            let roots: Vec<BuildNode> = graph
                .roots()
                .into_iter()
                .map(|node| node.data().clone())
                .collect();
            if roots.is_empty() {
                if !graph.is_empty() {
                    return Err(cyclic(&graph));
                }
                break;
            }
            for node in roots {
                // Building a sibling may have side effects that already
                // materialized this entry; only build if it is still a
                // descriptor.
                if let Some(ServiceEntry::Descriptor(descriptor)) = self.entry_for(node.id) {
                    let handle = self.create_with_owner(node.id, &descriptor)?;
                    self.set_instance(node.id, handle)?;
                }
                graph.remove_node(&node);
            }
        }

        match self.entry_for(id) {
            Some(ServiceEntry::Instance(handle)) => Ok(handle),
            _ => Err(ResolutionError::unknown(id.name())),
        }
    }

    fn create_with_owner(
        &self,
        id: ServiceId,
        descriptor: &Rc<ServiceDescriptor>,
    ) -> Result<ServiceHandle, ResolutionError> {
        let owns = self
            .core
            .registry
            .borrow()
            .get(id)
            .is_some_and(ServiceEntry::is_descriptor);
        if owns {
            self.create_service_instance(id, descriptor)
        } else if let Some(parent) = &self.core.parent {
            parent.create_with_owner(id, descriptor)
        } else {
            Err(ResolutionError::unknown(id.name()))
        }
    }

    fn create_service_instance(
        &self,
        id: ServiceId,
        descriptor: &Rc<ServiceDescriptor>,
    ) -> Result<ServiceHandle, ResolutionError> {
        if !descriptor.is_delayed() {
            debug!(service = %id, "building service");
            let instance = self.build_eager(descriptor)?;
            return Ok(ServiceHandle::ready(instance));
        }

        debug!(service = %id, "deferring service build");
        let weak_owner = Rc::downgrade(&self.core);
        let descriptor = Rc::clone(descriptor);
        let lazy = LazyService::new(id.name(), &*self.core.scheduler, move || {
            // The owner is only held weakly so an unmaterialized stand-in
            // cannot keep its scope alive.
            let Some(owner) = weak_owner.upgrade() else {
                return Err(ResolutionError::unknown(id.name()));
            };
            Container::from_core(owner).deferred_scope(id).build_eager(&descriptor)
        });
        Ok(ServiceHandle::lazy(lazy))
    }

    /// Short-lived child scope that runs one deferred build, recording the
    /// deferred identifier as the cause of every access it makes.
    fn deferred_scope(&self, id: ServiceId) -> Container {
        Container::new_scope(
            ServiceRegistry::new(),
            self.core.options.clone(),
            Rc::clone(&self.core.dependencies),
            Rc::clone(&self.core.scheduler),
            Some(self.clone()),
            self.core.trace.clone(),
            Some(id.name().to_string()),
        )
    }

    fn build_eager(&self, descriptor: &ServiceDescriptor) -> Result<ServiceRef, ResolutionError> {
        let args = descriptor
            .static_args()
            .iter()
            .map(|arg| Some(Rc::clone(arg)))
            .collect();
        self.construct_with(descriptor.ctor(), args)
    }

    fn construct_with(
        &self,
        ctor: &Constructor,
        mut args: Vec<Option<StaticArg>>,
    ) -> Result<ServiceRef, ResolutionError> {
        let deps = self.core.dependencies.dependencies_of(ctor.type_id());
        let mut resolved = Vec::with_capacity(deps.len());
        for dependency in &deps {
            match self.get_or_create(dependency.id) {
                Ok(handle) => resolved.push(ResolvedDependency {
                    id: dependency.id,
                    handle: Some(handle),
                }),
                Err(error) if error.is_unknown_service() && !self.core.options.strict => {
                    warn!(
                        type_name = ctor.type_name(),
                        dependency = %dependency.id,
                        "constructor depends on an unregistered service; passing an absent slot"
                    );
                    resolved.push(ResolvedDependency {
                        id: dependency.id,
                        handle: None,
                    });
                }
                Err(error) => return Err(error),
            }
        }

        let first_service_slot = deps.first().map_or(args.len(), |dep| dep.slot);
        if args.len() != first_service_slot {
            warn!(
                type_name = ctor.type_name(),
                expected = first_service_slot,
                supplied = args.len(),
                "leading argument count does not line up with the first dependency slot; realigning"
            );
            if args.len() < first_service_slot {
                args.resize(first_service_slot, None);
            } else {
                args.truncate(first_service_slot);
            }
        }

        let factory_args = crate::descriptor::FactoryArgs::new(&args, &resolved);
        ctor.construct(&factory_args)
    }

    fn set_instance(&self, id: ServiceId, handle: ServiceHandle) -> Result<(), ResolutionError> {
        let owns = self
            .core
            .registry
            .borrow()
            .get(id)
            .is_some_and(ServiceEntry::is_descriptor);
        if owns {
            self.core
                .registry
                .borrow_mut()
                .set(id, ServiceEntry::Instance(handle));
            Ok(())
        } else if let Some(parent) = &self.core.parent {
            parent.set_instance(id, handle)
        } else {
            Err(ResolutionError::unknown(id.name()))
        }
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("strict", &self.core.options.strict)
            .field("services", &self.core.registry.borrow().len())
            .field("has_parent", &self.core.parent.is_some())
            .finish_non_exhaustive()
    }
}

/// Resolution handle passed to [`Container::invoke`] callbacks.
///
/// Clone-able, but only valid while its `invoke` call is on the stack; any
/// later use fails with `StaleAccessor`.
#[derive(Clone)]
pub struct ServicesAccessor {
    container: Container,
    live: Rc<Cell<bool>>,
}

impl ServicesAccessor {
    pub fn get(&self, id: ServiceId) -> Result<ServiceHandle, ResolutionError> {
        if !self.live.get() {
            return Err(ResolutionError::StaleAccessor);
        }
        self.container.get_or_create(id)
    }

    pub fn get_as<T: Service>(&self, id: ServiceId) -> Result<Rc<T>, ResolutionError> {
        self.get(id)?.downcast::<T>()
    }
}

/// Builds a root [`Container`].
#[derive(Default)]
pub struct ContainerBuilder {
    registry: ServiceRegistry,
    options: ContainerOptions,
    dependencies: Option<Rc<DependencyTable>>,
    scheduler: Option<Rc<dyn IdleScheduler>>,
}

impl ContainerBuilder {
    pub fn registry(mut self, registry: ServiceRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn options(mut self, options: ContainerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.options.strict = strict;
        self
    }

    pub fn tracing(mut self, tracing: bool) -> Self {
        self.options.tracing = tracing;
        self
    }

    pub fn cycle_scan_limit(mut self, limit: usize) -> Self {
        self.options.cycle_scan_limit = limit;
        self
    }

    pub fn dependencies(mut self, dependencies: Rc<DependencyTable>) -> Self {
        self.dependencies = Some(dependencies);
        self
    }

    pub fn scheduler(mut self, scheduler: Rc<dyn IdleScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn build(self) -> Container {
        let dependencies = self
            .dependencies
            .unwrap_or_else(|| Rc::new(DependencyTable::new()));
        let scheduler = self
            .scheduler
            .unwrap_or_else(|| Rc::new(IdleQueue::new()) as Rc<dyn IdleScheduler>);
        let trace = self.options.tracing.then(CreationTrace::new);
        Container::new_scope(
            self.registry,
            self.options,
            dependencies,
            scheduler,
            None,
            trace,
            None,
        )
    }
}

#[cfg(test)]
mod tests;
