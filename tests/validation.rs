use ferrous_ioc::prelude::*;
use ferrous_ioc::ValidationReport;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct Root;
struct Consumer {
    _root: Arc<Root>,
}
struct Unrelated;

fn failing_root() -> Arc<TypeDescriptor> {
    TypeDescriptor::of::<Root>()
        .constructor(|c| c.build(|_| Err("root refused to start".into())))
        .build()
}

fn consumer() -> Arc<TypeDescriptor> {
    TypeDescriptor::of::<Consumer>()
        .constructor(|c| {
            c.service::<Root>("root")
                .build(|args| Ok(Consumer { _root: args.get("root")? }))
        })
        .build()
}

fn validate(registry: Registry) -> ValidationReport {
    Container::new(registry)
        .assert_configuration_is_valid()
        .expect_err("configuration should be invalid")
}

#[test]
fn test_independent_failures_are_all_reported() {
    let unrelated = TypeDescriptor::of::<Unrelated>()
        .constructor(|c| c.primitive::<u32>("size").build(|_| Ok(Unrelated)))
        .build();

    let mut registry = Registry::new();
    registry.for_type::<Root>().use_instance(Instance::constructed(failing_root()));
    registry.for_type::<Unrelated>().use_instance(Instance::constructed(unrelated));

    let report = validate(registry);
    assert_eq!(report.build_failures.len(), 2);
    assert!(report.validation_errors.is_empty());
}

#[test]
fn test_downstream_consumer_is_not_reported_twice() {
    let mut registry = Registry::new();
    registry.for_type::<Root>().use_instance(Instance::constructed(failing_root()).named("root"));
    registry.for_type::<Consumer>().use_instance(Instance::constructed(consumer()).named("consumer"));

    let report = validate(registry);
    assert_eq!(report.build_failures.len(), 1);
    let failure = &report.build_failures[0];
    assert_eq!(failure.instance, "root");
    assert!(failure.message.contains("root refused to start"), "{}", failure.message);
}

#[test]
fn test_invalid_plan_upstream_is_reported_once() {
    let unconfigured_root = TypeDescriptor::of::<Root>()
        .constructor(|c| c.primitive::<String>("endpoint").build(|_| Ok(Root)))
        .build();

    let mut registry = Registry::new();
    registry.for_type::<Root>().use_instance(Instance::constructed(unconfigured_root));
    registry.for_type::<Consumer>().use_instance(Instance::constructed(consumer()));

    let report = validate(registry);
    assert_eq!(report.build_failures.len(), 1);
    assert!(report.build_failures[0].message.contains("endpoint"));
}

#[test]
fn test_valid_configuration_passes_without_touching_caches() {
    let built = Arc::new(AtomicUsize::new(0));
    let counter = built.clone();

    let mut registry = Registry::new();
    registry
        .for_type::<Root>()
        .use_lambda(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(Root))
        })
        .singleton();
    registry.for_type::<Consumer>().use_instance(Instance::constructed(consumer()));

    let container = Container::new(registry);
    assert!(container.assert_configuration_is_valid().is_ok());
    let during_validation = built.load(Ordering::SeqCst);
    assert!(during_validation >= 1);

    container.get_instance::<Root>().unwrap();
    assert_eq!(built.load(Ordering::SeqCst), during_validation + 1);
}

#[test]
fn test_validation_methods_are_counted_separately() {
    struct Pool {
        size: usize,
    }

    let pool = TypeDescriptor::of::<Pool>()
        .constructor(|c| {
            c.primitive_or("size", 0usize).build(|args| Ok(Pool { size: args.value("size")? }))
        })
        .validation_method("check_size", |pool| {
            if pool.size == 0 {
                Err("pool is empty".to_string())
            } else {
                Ok(())
            }
        })
        .build();

    let mut registry = Registry::new();
    registry
        .for_type::<Pool>()
        .add(Instance::constructed(pool.clone()).named("a"))
        .add(Instance::constructed(pool.clone()).named("b"))
        .add(Instance::constructed(pool).named("sized").with_value("size", 4usize));

    let report = validate(registry);
    assert!(report.build_failures.is_empty());
    assert_eq!(report.validation_errors.len(), 1);
    assert_eq!(report.validation_errors[0].method, "check_size");
    assert!(report.to_string().contains("0 build failure(s), 1 validation error(s)"));
}

#[test]
fn test_async_plans_are_only_checked_for_configuration() {
    let built = Arc::new(AtomicUsize::new(0));
    let counter = built.clone();

    let mut registry = Registry::new();
    registry.for_type::<Root>().use_async_lambda(move |_container| {
        counter.fetch_add(1, Ordering::SeqCst);
        async { Ok(Arc::new(Root)) }
    });

    let container = Container::new(registry);
    assert!(container.assert_configuration_is_valid().is_ok());
    assert_eq!(built.load(Ordering::SeqCst), 0);
}

#[test]
fn test_cyclic_references_fail_validation() {
    let mut registry = Registry::new();
    registry
        .for_type::<Root>()
        .add(Instance::referenced("b").named("a"))
        .add(Instance::referenced("a").named("b"));

    let report = validate(registry);
    assert!(!report.build_failures.is_empty());
    assert!(report
        .build_failures
        .iter()
        .any(|f| f.message.contains("Cyclic instance reference")));
}

#[test]
fn test_report_serializes_for_tooling() {
    let mut registry = Registry::new();
    registry.for_type::<Root>().use_instance(Instance::constructed(failing_root()).named("root"));

    let report = validate(registry);
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["build_failures"][0]["instance"], "root");
    assert_eq!(json["validation_errors"].as_array().map(Vec::len), Some(0));
}

#[test]
fn test_invalid_nested_instance_is_reported_where_it_fails() {
    struct Pool;

    let pool = TypeDescriptor::of::<Pool>()
        .constructor(|c| c.primitive::<u32>("size").build(|_| Ok(Pool)))
        .build();
    let repository = TypeDescriptor::of::<Consumer>()
        .constructor(|c| c.service::<Pool>("pool").build(|_| Ok(Consumer { _root: Arc::new(Root) })))
        .build();

    let mut registry = Registry::new();
    registry.for_type::<Consumer>().use_instance(
        Instance::constructed(repository)
            .named("repository")
            .with_dependency::<Pool>("pool", Instance::constructed(pool).named("pool")),
    );

    let report = validate(registry);
    assert_eq!(report.build_failures.len(), 1);
    assert_eq!(report.build_failures[0].instance, "pool");
    assert!(report.build_failures[0].message.contains("size"), "{}", report.build_failures[0].message);
}

#[test]
fn test_self_reference_fails_validation_once() {
    let mut registry = Registry::new();
    registry.for_type::<Root>().use_instance(Instance::referenced("me").named("me"));

    let report = validate(registry);
    assert_eq!(report.build_failures.len(), 1);
    assert!(report.build_failures[0].message.contains("Cyclic instance reference"));
}

#[test]
fn test_objects_built_while_validating_are_disposed() {
    struct Conn {
        closed: Arc<AtomicUsize>,
    }

    impl ferrous_ioc::Dispose for Conn {
        fn dispose(&self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    let closed = Arc::new(AtomicUsize::new(0));
    let counter = closed.clone();
    let conn = TypeDescriptor::of::<Conn>()
        .constructor(move |c| {
            c.build(move |_| {
                Ok(Conn {
                    closed: counter.clone(),
                })
            })
        })
        .disposable()
        .build();

    let mut registry = Registry::new();
    registry
        .for_type::<Conn>()
        .use_instance(Instance::constructed(conn))
        .singleton();

    let container = Container::new(registry);
    assert!(container.assert_configuration_is_valid().is_ok());
    assert_eq!(closed.load(Ordering::SeqCst), 1);

    container.get_instance::<Conn>().unwrap();
    assert_eq!(closed.load(Ordering::SeqCst), 1);
}
