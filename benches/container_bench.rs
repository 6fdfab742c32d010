#![allow(clippy::uninlined_format_args)]
//! 容器、事件总线与响应式属性的性能基准测试

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use wiring::{EventBus, ReactiveProperty, ServiceContainer};

/// 测试用的简单服务
struct SimpleService {
    value: i32,
}

/// 依赖 SimpleService 的服务
struct DependentService {
    inner: Arc<SimpleService>,
    label: String,
}

struct Tick(u64);

/// 基准测试：单例解析（缓存未命中与命中）
fn bench_singleton_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("singleton_resolution");

    group.bench_function("cache_miss", |b| {
        b.iter(|| {
            let container = ServiceContainer::new();
            container
                .register_singleton(|_| Ok(Arc::new(SimpleService { value: 42 })))
                .unwrap();
            let service = container.resolve::<SimpleService>().unwrap();
            black_box(service.value)
        });
    });

    let container = ServiceContainer::new();
    container
        .register_singleton(|_| Ok(Arc::new(SimpleService { value: 42 })))
        .unwrap();
    let _ = container.resolve::<SimpleService>().unwrap();
    group.bench_function("cache_hit", |b| {
        b.iter(|| {
            let service = container.resolve::<SimpleService>().unwrap();
            black_box(service.value)
        });
    });

    group.finish();
}

/// 基准测试：带依赖的瞬态解析
fn bench_transient_with_dependency(c: &mut Criterion) {
    let container = ServiceContainer::new();
    container
        .register_singleton(|_| Ok(Arc::new(SimpleService { value: 7 })))
        .unwrap();
    container
        .register_transient(|r| {
            Ok(Arc::new(DependentService {
                inner: r.resolve::<SimpleService>()?,
                label: "dependent".to_string(),
            }))
        })
        .unwrap();

    c.bench_function("transient_with_dependency", |b| {
        b.iter(|| {
            let service = container.resolve::<DependentService>().unwrap();
            black_box((service.inner.value, service.label.len()))
        });
    });
}

/// 基准测试：作用域创建、scoped 解析与释放
fn bench_scoped_lifecycle(c: &mut Criterion) {
    let container = ServiceContainer::new();
    container
        .register_scoped(|_| Ok(Arc::new(SimpleService { value: 1 })))
        .unwrap();

    c.bench_function("scoped_lifecycle", |b| {
        b.iter(|| {
            let scope = container
                .create_scope(container.root_scope(), "request")
                .unwrap();
            let first = container.resolve_in::<SimpleService>(&scope).unwrap();
            let second = container.resolve_in::<SimpleService>(&scope).unwrap();
            scope.dispose();
            black_box(first.value + second.value)
        });
    });
}

/// 基准测试：不同订阅者数量下的事件分发
fn bench_event_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_dispatch");

    for subscriber_count in [1, 10, 100].iter() {
        let bus = EventBus::new();
        let subscriptions: Vec<_> = (0..*subscriber_count)
            .map(|_| {
                bus.subscribe(|tick: &Tick| {
                    black_box(tick.0);
                    Ok(())
                })
            })
            .collect();

        group.bench_with_input(
            BenchmarkId::from_parameter(subscriber_count),
            subscriber_count,
            |b, _| {
                b.iter(|| bus.publish(Tick(black_box(1))));
            },
        );

        for subscription in subscriptions {
            subscription.dispose();
        }
    }

    group.finish();
}

/// 基准测试：属性变更通知
fn bench_property_notification(c: &mut Criterion) {
    let property = ReactiveProperty::new(0u64);
    let _subscription = property.subscribe(|_, current| {
        black_box(*current);
    });

    let mut next = 0u64;
    c.bench_function("property_notification", |b| {
        b.iter(|| {
            next += 1;
            property.set(next);
        });
    });
}

criterion_group!(
    benches,
    bench_singleton_resolution,
    bench_transient_with_dependency,
    bench_scoped_lifecycle,
    bench_event_dispatch,
    bench_property_notification
);
criterion_main!(benches);
