use std::cell::Cell;
use std::rc::Rc;

use crate::container::{Container, ServicesAccessor};
use crate::dependencies::DependencyTable;
use crate::descriptor::{Constructor, ServiceDescriptor, StaticArg};
use crate::errors::ResolutionError;
use crate::registry::{ServiceEntry, ServiceRegistry};
use crate::service::{Service, ServiceHandle};
use crate::service_id::ServiceId;

struct Service1 {
    c: i32,
}
impl Service for Service1 {}

struct Consumer {
    service1: Rc<Service1>,
}
impl Service for Consumer {}

fn service1_id() -> ServiceId {
    ServiceId::new("service1")
}

fn service1_ctor() -> Constructor {
    Constructor::of::<Service1>(|_| Ok(Service1 { c: 1 }))
}

fn consumer_ctor() -> Constructor {
    Constructor::of::<Consumer>(|args| {
        Ok(Consumer {
            service1: args.require_service(0)?.downcast()?,
        })
    })
}

fn consumer_table() -> Rc<DependencyTable> {
    let table = DependencyTable::new();
    table
        .declare::<Consumer>([(service1_id(), 0)])
        .expect("valid declaration");
    Rc::new(table)
}

#[test]
fn self_entry_resolves_to_the_same_scope() {
    let container = Container::new(ServiceRegistry::new());
    let resolved = container
        .invoke(|accessor| accessor.get_as::<Container>(Container::self_id()))
        .expect("self entry");
    assert!(resolved.is_same_scope(&container));
}

#[test]
fn descriptor_resolves_to_a_singleton() {
    let container = Container::new(ServiceRegistry::new());
    container.register_descriptor(service1_id(), ServiceDescriptor::eager(service1_ctor()));

    let (first, second) = container.invoke(|accessor| {
        let first = accessor.get_as::<Service1>(service1_id()).expect("first");
        let second = accessor.get_as::<Service1>(service1_id()).expect("second");
        (first, second)
    });
    assert_eq!(first.c, 1);
    assert!(Rc::ptr_eq(&first, &second));
}

#[test]
fn dependencies_are_spliced_into_the_factory() {
    let container = Container::builder().dependencies(consumer_table()).build();
    container.register_descriptor(service1_id(), ServiceDescriptor::eager(service1_ctor()));

    let consumer = container
        .create_instance(&consumer_ctor(), Vec::new())
        .expect("built");
    let consumer = ServiceHandle::ready(consumer)
        .downcast::<Consumer>()
        .expect("consumer");
    assert_eq!(consumer.service1.c, 1);
}

struct Labeled {
    label: String,
    service1: Rc<Service1>,
}
impl Service for Labeled {}

fn labeled_ctor() -> Constructor {
    Constructor::of::<Labeled>(|args| {
        Ok(Labeled {
            label: args
                .static_arg::<String>(0)
                .map(|s| (*s).clone())
                .unwrap_or_else(|| "<absent>".to_string()),
            service1: args.require_service(0)?.downcast()?,
        })
    })
}

fn labeled_container() -> Container {
    let table = DependencyTable::new();
    table
        .declare::<Labeled>([(service1_id(), 1)])
        .expect("valid declaration");
    let container = Container::builder().dependencies(Rc::new(table)).build();
    container.register_descriptor(service1_id(), ServiceDescriptor::eager(service1_ctor()));
    container
}

#[test]
fn exact_leading_args_pass_through() {
    let container = labeled_container();
    let arg: StaticArg = Rc::new("hello".to_string());
    let labeled = container
        .create_instance(&labeled_ctor(), vec![arg])
        .expect("built");
    let labeled = ServiceHandle::ready(labeled)
        .downcast::<Labeled>()
        .expect("labeled");
    assert_eq!(labeled.label, "hello");
    assert_eq!(labeled.service1.c, 1);
}

#[test]
fn too_few_leading_args_are_padded() {
    let container = labeled_container();
    let labeled = container
        .create_instance(&labeled_ctor(), Vec::new())
        .expect("built despite missing leading arg");
    let labeled = ServiceHandle::ready(labeled)
        .downcast::<Labeled>()
        .expect("labeled");
    assert_eq!(labeled.label, "<absent>");
    assert_eq!(labeled.service1.c, 1);
}

#[test]
fn too_many_leading_args_are_truncated() {
    let container = labeled_container();
    let first: StaticArg = Rc::new("kept".to_string());
    let second: StaticArg = Rc::new("dropped".to_string());
    let labeled = container
        .create_instance(&labeled_ctor(), vec![first, second])
        .expect("built despite extra leading arg");
    let labeled = ServiceHandle::ready(labeled)
        .downcast::<Labeled>()
        .expect("labeled");
    assert_eq!(labeled.label, "kept");
}

struct OptionalConsumer {
    has_dependency: bool,
}
impl Service for OptionalConsumer {}

fn optional_consumer_ctor() -> Constructor {
    Constructor::of::<OptionalConsumer>(|args| {
        Ok(OptionalConsumer {
            has_dependency: args.service(0).is_some(),
        })
    })
}

fn optional_consumer_table() -> Rc<DependencyTable> {
    let table = DependencyTable::new();
    table
        .declare::<OptionalConsumer>([(ServiceId::new("never-registered"), 0)])
        .expect("valid declaration");
    Rc::new(table)
}

#[test]
fn lenient_scope_substitutes_absent_slot_for_unknown_dependency() {
    let container = Container::builder()
        .dependencies(optional_consumer_table())
        .build();
    let built = container
        .create_instance(&optional_consumer_ctor(), Vec::new())
        .expect("lenient build");
    let built = ServiceHandle::ready(built)
        .downcast::<OptionalConsumer>()
        .expect("consumer");
    assert!(!built.has_dependency);
}

#[test]
fn strict_scope_fails_on_unknown_dependency() {
    let container = Container::builder()
        .dependencies(optional_consumer_table())
        .strict(true)
        .build();
    let err = container
        .create_instance(&optional_consumer_ctor(), Vec::new())
        .unwrap_err();
    assert!(matches!(err, ResolutionError::UnknownService { ref id } if id == "never-registered"));
}

#[test]
fn strict_scope_fails_resolution_when_transitive_dependency_is_missing() {
    let container = Container::builder()
        .dependencies(optional_consumer_table())
        .strict(true)
        .build();
    let id = ServiceId::new("optional-consumer");
    container.register_descriptor(id, ServiceDescriptor::eager(optional_consumer_ctor()));

    let err = container.invoke(|accessor| accessor.get(id)).unwrap_err();
    assert!(err.is_unknown_service());
}

struct LoopA;
impl Service for LoopA {}
struct LoopB;
impl Service for LoopB {}

fn eager_cycle_container() -> (Container, ServiceId, ServiceId) {
    let a = ServiceId::new("loop-a");
    let b = ServiceId::new("loop-b");
    let table = DependencyTable::new();
    table.declare::<LoopA>([(b, 0)]).expect("valid declaration");
    table.declare::<LoopB>([(a, 0)]).expect("valid declaration");

    let container = Container::builder().dependencies(Rc::new(table)).build();
    container.register_descriptor(
        a,
        ServiceDescriptor::eager(Constructor::of::<LoopA>(|args| {
            args.require_service(0)?;
            Ok(LoopA)
        })),
    );
    container.register_descriptor(
        b,
        ServiceDescriptor::eager(Constructor::of::<LoopB>(|args| {
            args.require_service(0)?;
            Ok(LoopB)
        })),
    );
    (container, a, b)
}

#[test]
fn eager_cycle_fails_with_a_path_naming_both_services() {
    let (container, a, b) = eager_cycle_container();
    for id in [a, b] {
        let err = container.invoke(|accessor| accessor.get(id)).unwrap_err();
        match err {
            ResolutionError::CyclicDependency { cycle } => {
                assert!(cycle.contains("loop-a"));
                assert!(cycle.contains("loop-b"));
                assert!(cycle.contains(" -> "));
            }
            other => panic!("expected cyclic dependency, got {other}"),
        }
    }
}

#[test]
fn cycle_scan_limit_is_configurable() {
    // A dependency chain deeper than the limit trips the heuristic even
    // though no true cycle exists; the error then carries the graph dump.
    struct Chain0;
    impl Service for Chain0 {}
    struct Chain1;
    impl Service for Chain1 {}
    struct Chain2;
    impl Service for Chain2 {}

    let c0 = ServiceId::new("chain-0");
    let c1 = ServiceId::new("chain-1");
    let c2 = ServiceId::new("chain-2");
    let table = DependencyTable::new();
    table.declare::<Chain0>([(c1, 0)]).expect("valid declaration");
    table.declare::<Chain1>([(c2, 0)]).expect("valid declaration");

    let container = Container::builder()
        .dependencies(Rc::new(table))
        .cycle_scan_limit(2)
        .build();
    container.register_descriptor(c0, ServiceDescriptor::eager(Constructor::of::<Chain0>(|_| Ok(Chain0))));
    container.register_descriptor(c1, ServiceDescriptor::eager(Constructor::of::<Chain1>(|_| Ok(Chain1))));
    container.register_descriptor(c2, ServiceDescriptor::eager(Constructor::of::<Chain2>(|_| Ok(Chain2))));

    let err = container.invoke(|accessor| accessor.get(c0)).unwrap_err();
    assert!(matches!(err, ResolutionError::CyclicDependency { .. }));
}

struct SelfLooper;
impl Service for SelfLooper {}

#[test]
fn factory_resolving_its_own_identifier_is_recursive_instantiation() {
    let id = ServiceId::new("self-looper");
    let table = DependencyTable::new();
    table
        .declare::<SelfLooper>([(Container::self_id(), 0)])
        .expect("valid declaration");

    let container = Container::builder().dependencies(Rc::new(table)).build();
    container.register_descriptor(
        id,
        ServiceDescriptor::eager(Constructor::of::<SelfLooper>(move |args| {
            let scope: Rc<Container> = args.require_service(0)?.downcast()?;
            scope.invoke(|accessor| accessor.get(id))?;
            Ok(SelfLooper)
        })),
    );

    let err = container.invoke(|accessor| accessor.get(id)).unwrap_err();
    assert!(
        matches!(err, ResolutionError::RecursiveInstantiation { ref id } if id == "self-looper")
    );
}

#[test]
fn child_scope_reuses_the_ancestor_owned_singleton() {
    let built = Rc::new(Cell::new(0));
    let b = Rc::clone(&built);
    let counting_ctor = Constructor::of::<Service1>(move |_| {
        b.set(b.get() + 1);
        Ok(Service1 { c: 1 })
    });

    let parent = Container::new(ServiceRegistry::new());
    parent.register_descriptor(service1_id(), ServiceDescriptor::eager(counting_ctor));

    let child_a = parent.create_child(ServiceRegistry::new());
    let child_b = parent.create_child(ServiceRegistry::new());

    let from_a = child_a
        .invoke(|accessor| accessor.get_as::<Service1>(service1_id()))
        .expect("resolved through child a");
    let from_b = child_b
        .invoke(|accessor| accessor.get_as::<Service1>(service1_id()))
        .expect("resolved through child b");
    let from_parent = parent
        .invoke(|accessor| accessor.get_as::<Service1>(service1_id()))
        .expect("resolved through parent");

    assert_eq!(built.get(), 1);
    assert!(Rc::ptr_eq(&from_a, &from_b));
    assert!(Rc::ptr_eq(&from_a, &from_parent));
}

#[test]
fn child_registrations_shadow_without_touching_the_parent() {
    let parent = Container::new(ServiceRegistry::new());
    parent.register_instance(service1_id(), Rc::new(Service1 { c: 1 }));

    let child = parent.create_child(ServiceRegistry::new());
    child.register_instance(service1_id(), Rc::new(Service1 { c: 2 }));

    let from_child = child
        .invoke(|accessor| accessor.get_as::<Service1>(service1_id()))
        .expect("child entry");
    let from_parent = parent
        .invoke(|accessor| accessor.get_as::<Service1>(service1_id()))
        .expect("parent entry");
    assert_eq!(from_child.c, 2);
    assert_eq!(from_parent.c, 1);
}

#[test]
fn registry_is_live_after_container_creation() {
    let container = Container::new(ServiceRegistry::new());
    let id = ServiceId::new("late-registration");
    assert!(!container.has(id));

    container.register_instance(id, Rc::new(Service1 { c: 5 }));
    let resolved = container
        .invoke(|accessor| accessor.get_as::<Service1>(id))
        .expect("late entry");
    assert_eq!(resolved.c, 5);
}

#[test]
fn accessor_is_stale_after_invoke_returns() {
    let container = Container::new(ServiceRegistry::new());
    container.register_instance(service1_id(), Rc::new(Service1 { c: 1 }));

    let mut cached: Option<ServicesAccessor> = None;
    let live = container.invoke(|accessor| {
        cached = Some(accessor.clone());
        accessor.get(service1_id()).is_ok()
    });
    assert!(live);

    let err = cached
        .expect("accessor captured")
        .get(service1_id())
        .unwrap_err();
    assert_eq!(err, ResolutionError::StaleAccessor);
}

#[test]
fn invoke_returns_the_callback_value_and_propagates_errors() {
    let container = Container::new(ServiceRegistry::new());
    assert_eq!(container.invoke(|_| 41 + 1), 42);

    let err: Result<(), ResolutionError> =
        container.invoke(|_| Err(ResolutionError::construction("Probe", "on purpose")));
    assert!(matches!(err, Err(ResolutionError::ConstructionFailed { .. })));
}

#[test]
fn unknown_service_through_accessor() {
    let container = Container::new(ServiceRegistry::new());
    let err = container
        .invoke(|accessor| accessor.get(ServiceId::new("nowhere")))
        .unwrap_err();
    assert!(matches!(err, ResolutionError::UnknownService { ref id } if id == "nowhere"));
}

#[test]
fn sibling_side_effects_skip_the_second_build() {
    // A factory that materializes a sibling identifier while it runs: the
    // wave loop must re-check the registry instead of building twice.
    struct Root;
    impl Service for Root {}
    struct Left;
    impl Service for Left {}
    struct Right;
    impl Service for Right {}

    let root_id = ServiceId::new("side-effect-root");
    let left_id = ServiceId::new("side-effect-left");
    let right_id = ServiceId::new("side-effect-right");

    let table = DependencyTable::new();
    table
        .declare::<Root>([(left_id, 0), (right_id, 1)])
        .expect("valid declaration");
    table
        .declare::<Left>([(Container::self_id(), 0)])
        .expect("valid declaration");

    let right_builds = Rc::new(Cell::new(0));

    let container = Container::builder().dependencies(Rc::new(table)).build();
    container.register_descriptor(
        root_id,
        ServiceDescriptor::eager(Constructor::of::<Root>(|args| {
            args.require_service(0)?;
            args.require_service(1)?;
            Ok(Root)
        })),
    );
    container.register_descriptor(
        left_id,
        ServiceDescriptor::eager(Constructor::of::<Left>(move |args| {
            let scope: Rc<Container> = args.require_service(0)?.downcast()?;
            scope.invoke(|accessor| accessor.get(right_id))?;
            Ok(Left)
        })),
    );
    let rb = Rc::clone(&right_builds);
    container.register_descriptor(
        right_id,
        ServiceDescriptor::eager(Constructor::of::<Right>(move |_| {
            rb.set(rb.get() + 1);
            Ok(Right)
        })),
    );

    container
        .invoke(|accessor| accessor.get(root_id))
        .expect("resolved");
    assert_eq!(right_builds.get(), 1);
}

#[test]
fn options_deserialize_with_defaults() {
    let options: crate::container::ContainerOptions =
        serde_json::from_str(r#"{ "strict": true }"#).expect("parse");
    assert!(options.strict);
    assert_eq!(options.cycle_scan_limit, 1000);
    assert!(!options.tracing);
}

#[test]
fn register_returns_the_previous_entry() {
    let container = Container::new(ServiceRegistry::new());
    let id = ServiceId::new("overwrite-probe");

    assert!(container.register_instance(id, Rc::new(Service1 { c: 1 })).is_none());
    let previous = container.register_instance(id, Rc::new(Service1 { c: 2 }));
    assert!(matches!(previous, Some(ServiceEntry::Instance(_))));
}
