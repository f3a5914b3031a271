pub mod container;
pub mod dependencies;
pub mod deferred;
pub mod descriptor;
pub mod errors;
pub mod events;
pub mod graph;
pub mod idle;
pub mod registry;
pub mod service;
pub mod service_id;
pub mod staging;

pub use container::{
    Container, ContainerBuilder, ContainerOptions, CreationTrace, ServicesAccessor,
};
pub use dependencies::{DependencyTable, ServiceDependency};
pub use deferred::{DeferredValue, LazyService};
pub use descriptor::{Constructor, FactoryArgs, ServiceDescriptor, StaticArg};
pub use errors::ResolutionError;
pub use events::{EventEmitter, EventSource, Listener, Subscription};
pub use graph::Graph;
pub use idle::{IdleDeadline, IdleHandle, IdleQueue, IdleScheduler, IdleTask};
pub use registry::{ServiceEntry, ServiceRegistry};
pub use service::{Service, ServiceHandle, ServiceRef};
pub use service_id::ServiceId;
pub use staging::SingletonStaging;
