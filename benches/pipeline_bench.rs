//! Pipeline Benchmarks - Hot-Path Performance Validation
//!
//! Benchmarks the payout conversion and one actor tick over a large
//! in-flight set, the work every stage loop repeats each interval.
//!
//! Run with: cargo bench --bench pipeline_bench

use std::sync::Arc;

use async_trait::async_trait;
use criterion::{Criterion, black_box, criterion_group, criterion_main};
use tokio::sync::Mutex;

use otc_pipeline::domain::order::{Currency, Destination, DropAddress, Order};
use otc_pipeline::domain::pricing::convert;
use otc_pipeline::domain::work::{Backoff, WorkItem};
use otc_pipeline::usecases::actor::{Actor, Outcome, Task};

/// Task that inspects the order and keeps it.
struct Peek;

#[async_trait]
impl Task for Peek {
    async fn run(&self, item: &Arc<WorkItem>) -> Outcome {
        let order = item.order().lock().await;
        black_box(order.amount);
        Outcome::Stay
    }
}

fn order(n: usize) -> Order {
    Order::new(
        DropAddress {
            address: format!("drop{n}"),
            currency: Currency::BTC,
        },
        Destination {
            address: "2GgFvqoyk9RjwVzj8tqfcXVXB4orBwoc9qv".to_string(),
            currency: Currency::SKY,
        },
    )
}

/// Benchmark the deposit-to-payout conversion.
fn bench_convert(c: &mut Criterion) {
    c.bench_function("convert_btc_to_sky", |b| {
        b.iter(|| convert(black_box(123_456_789), black_box(200_000), Currency::SKY));
    });
}

/// Benchmark one tick over 1000 in-flight orders.
fn bench_actor_tick(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let actor = Actor::new("bench", Peek, Backoff::default());
    rt.block_on(async {
        for n in 0..1_000 {
            let o = order(n);
            let id = o.id.clone();
            let status = o.status;
            actor.add(WorkItem::new(Arc::new(Mutex::new(o)), id, status)).await;
        }
    });

    c.bench_function("actor_tick_1000", |b| {
        b.to_async(&rt).iter(|| actor.tick());
    });
}

criterion_group!(benches, bench_convert, bench_actor_tick);
criterion_main!(benches);
