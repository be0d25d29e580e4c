use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ferrous_ioc::prelude::*;
use std::sync::Arc;

trait Service: Send + Sync {
    fn id(&self) -> usize;
}

struct Indexed(usize);

impl Service for Indexed {
    fn id(&self) -> usize {
        self.0
    }
}

struct Consumer {
    service: Arc<dyn Service>,
}

fn consumer_descriptor() -> Arc<TypeDescriptor> {
    TypeDescriptor::of::<Consumer>()
        .constructor(|c| {
            c.service::<dyn Service>("service")
                .build(|args| Ok(Consumer { service: args.get("service")? }))
        })
        .build()
}

// ===== Micro Benchmarks =====

fn bench_singleton_hit(c: &mut Criterion) {
    let mut registry = Registry::new();
    registry.for_type::<u64>().use_instance(Instance::value(42u64)).singleton();
    let container = Container::new(registry);

    // Prime the cache and the plan memo
    let _ = container.get_instance::<u64>().unwrap();

    c.bench_function("singleton_hit_u64", |b| {
        b.iter(|| black_box(container.get_instance::<u64>().unwrap()))
    });
}

fn bench_transient_autowired(c: &mut Criterion) {
    let mut registry = Registry::new();
    registry.for_type::<dyn Service>().use_object(Arc::new(Indexed(1)));
    registry.for_type::<Consumer>().use_instance(Instance::constructed(consumer_descriptor()));
    let container = Container::new(registry);

    c.bench_function("transient_autowired_constructor", |b| {
        b.iter(|| black_box(container.get_instance::<Consumer>().unwrap().service.id()))
    });
}

fn bench_cold_plan_compile(c: &mut Criterion) {
    c.bench_function("cold_container_first_resolve", |b| {
        b.iter_batched(
            || {
                let mut registry = Registry::new();
                registry.for_type::<dyn Service>().use_object(Arc::new(Indexed(1)));
                registry.for_type::<Consumer>().use_instance(Instance::constructed(consumer_descriptor()));
                Container::new(registry)
            },
            |container| black_box(container.get_instance::<Consumer>().unwrap().service.id()),
            criterion::BatchSize::SmallInput,
        )
    });
}

fn bench_all_instances_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("all_instances");
    for count in [1usize, 10, 100] {
        let mut registry = Registry::new();
        {
            let mut family = registry.for_type::<dyn Service>();
            for i in 0..count {
                family.add_object(Arc::new(Indexed(i)));
            }
        }
        let container = Container::new(registry);

        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| black_box(container.get_all_instances::<dyn Service>().unwrap().len()))
        });
    }
    group.finish();
}

fn bench_decorated(c: &mut Criterion) {
    struct Wrapper(Arc<dyn Service>);
    impl Service for Wrapper {
        fn id(&self) -> usize {
            self.0.id() + 1
        }
    }

    let mut registry = Registry::new();
    registry
        .for_type::<dyn Service>()
        .use_lambda(|_| Ok(Arc::new(Indexed(0))))
        .decorate_all_with("wrap", |inner: Arc<dyn Service>| -> Arc<dyn Service> { Arc::new(Wrapper(inner)) })
        .decorate_all_with("wrap again", |inner: Arc<dyn Service>| -> Arc<dyn Service> { Arc::new(Wrapper(inner)) });
    let container = Container::new(registry);

    c.bench_function("transient_two_decorators", |b| {
        b.iter(|| black_box(container.get_instance::<dyn Service>().unwrap().id()))
    });
}

// ===== Macro Benchmarks =====

fn bench_validation(c: &mut Criterion) {
    let mut registry = Registry::new();
    registry.for_type::<dyn Service>().use_object(Arc::new(Indexed(1)));
    for _ in 0..50 {
        registry.for_type::<Consumer>().add(Instance::constructed(consumer_descriptor()));
    }
    let container = Container::new(registry);

    c.bench_function("assert_configuration_is_valid_50", |b| {
        b.iter(|| black_box(container.assert_configuration_is_valid().is_ok()))
    });
}

criterion_group!(
    micro_benches,
    bench_singleton_hit,
    bench_transient_autowired,
    bench_cold_plan_compile,
    bench_all_instances_scaling,
    bench_decorated
);

criterion_group!(macro_benches, bench_validation);

criterion_main!(micro_benches, macro_benches);
