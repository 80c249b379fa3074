//! Handle churn benchmarks
//!
//! Measures the cost of the registry paths every binding call goes through:
//! context open/close, socket create/close, and option get/set.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use spindle::{Context, HandleRegistry, OptionId, SocketType};

const SOCKETS_PER_CONTEXT: &[usize] = &[1, 16, 256];

fn context_lifecycle(c: &mut Criterion) {
    spindle::dev_tracing::init_tracing();
    let registry = Arc::new(HandleRegistry::local());
    let mut group = c.benchmark_group("handles/context");

    for &count in SOCKETS_PER_CONTEXT {
        group.bench_with_input(
            BenchmarkId::new("open_create_close", count),
            &count,
            |b, &count| {
                b.iter(|| {
                    let ctx = Context::with_registry(Arc::clone(&registry)).unwrap();
                    let sockets: Vec<_> = (0..count)
                        .map(|i| ctx.socket(SocketType::ALL[i % SocketType::ALL.len()]).unwrap())
                        .collect();
                    ctx.close().unwrap();
                    black_box(sockets)
                });
            },
        );
    }
    group.finish();
}

fn option_access(c: &mut Criterion) {
    let registry = Arc::new(HandleRegistry::local());
    let ctx = Context::with_registry(registry).unwrap();
    let socket = ctx.dealer().unwrap();
    let mut group = c.benchmark_group("handles/options");

    group.bench_function("set_get", |b| {
        let mut hwm = 0;
        b.iter(|| {
            hwm = (hwm + 1) % 10_000;
            socket.set(OptionId::SendHwm, hwm).unwrap();
            black_box(socket.get(OptionId::SendHwm).unwrap())
        });
    });
    group.bench_function("unknown_option", |b| {
        b.iter(|| black_box(socket.get(black_box(9999)).is_err()));
    });
    group.finish();
}

criterion_group!(benches, context_lifecycle, option_access);
criterion_main!(benches);
