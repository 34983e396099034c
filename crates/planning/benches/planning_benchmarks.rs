use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use chrono::NaiveDate;
use shipplan_planning::{
    aggregate, validate_group, CartLine, CollectionCatalog, CollectionRef, CollectionWindow,
    CombineEngine, ShipmentPlan,
};

const COLLECTIONS: usize = 8;

fn catalog() -> CollectionCatalog {
    let base = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
    (0..COLLECTIONS).fold(CollectionCatalog::new(), |catalog, i| {
        let start = base + chrono::Duration::days(30 * i as i64);
        let end = start + chrono::Duration::days(14);
        catalog.with_window(CollectionWindow::new(
            format!("C{i}"),
            format!("Collection {i}"),
            Some(start),
            Some(end),
        ))
    })
}

/// Cart of `size` lines spread over the collections, every fifth one unconstrained.
fn cart(size: usize) -> Vec<CartLine> {
    (0..size)
        .map(|i| {
            let line = CartLine::new(format!("SKU-{i}"), "item", 1 + (i % 5) as i64, 1_000);
            if i % 5 == 4 {
                line
            } else {
                let c = i % COLLECTIONS;
                line.in_collection(CollectionRef::new(format!("C{c}"), format!("Collection {c}")))
            }
        })
        .collect()
}

fn bench_aggregate(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregate_cart");
    let provider = catalog();

    for size in [10usize, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let lines = cart(size);
            b.iter(|| {
                let aggregation = aggregate(black_box(lines.clone()), &provider).unwrap();
                black_box(aggregation);
            });
        });
    }

    group.finish();
}

fn bench_combine_split(c: &mut Criterion) {
    let mut group = c.benchmark_group("combine_split");
    let provider = catalog();
    let groups = aggregate(cart(200), &provider).unwrap().groups;

    group.bench_function("combine_all_then_split", |b| {
        b.iter(|| {
            let mut engine = CombineEngine::new();
            let mut iter = groups.iter().cloned();
            let first = iter.next().unwrap();
            let combined = iter.fold(first, |acc, g| engine.combine(acc, g).unwrap());
            black_box(engine.split(combined));
        });
    });

    group.bench_function("validate_all_groups", |b| {
        b.iter(|| {
            for g in &groups {
                black_box(validate_group(g));
            }
        });
    });

    group.bench_function("plan_session_round_trip", |b| {
        let lines = cart(200);
        b.iter(|| {
            let mut plan = ShipmentPlan::from_cart("bench", lines.clone(), &provider).unwrap();
            let ids: Vec<_> = plan.groups().iter().map(|g| g.id_typed()).collect();
            let combined = plan.on_combine(ids[0], ids[1]).unwrap();
            black_box(plan.on_split(combined).unwrap());
        });
    });

    group.finish();
}

criterion_group!(benches, bench_aggregate, bench_combine_split);
criterion_main!(benches);
