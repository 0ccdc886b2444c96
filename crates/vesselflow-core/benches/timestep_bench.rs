//! Criterion benchmarks for the resource engine.
//!
//! - `recipe_heavy`: 200 chained converter recipes per step over 40 resources
//! - `many_tanks`: 2000 tanks across 20 resources, flat produce/consume load
//! - `virtual_pools`: save/load of 500 virtual pools

use criterion::{Criterion, criterion_group, criterion_main};
use vesselflow_core::handler::VesselResourceHandler;
use vesselflow_core::id::BrokerId;
use vesselflow_core::storage::{StorageContext, Tank, Tanks};
use vesselflow_core::test_utils::*;

// ===========================================================================
// Craft builders
// ===========================================================================

fn resource(i: usize) -> String {
    format!("Resource{i}")
}

/// 40 resources, 5 tanks each.
fn build_chain_craft() -> (VesselResourceHandler, Tanks<Tank>) {
    let mut tanks = Tanks::simulated();
    for i in 0..40 {
        for _ in 0..5 {
            tanks.insert(Tank::new(resource(i), 50.0, 100.0));
        }
    }
    let handler = handler_for(&tanks);
    (handler, tanks)
}

/// Queue 200 recipes, each turning one resource into the next.
fn queue_chain_recipes(handler: &mut VesselResourceHandler) {
    for r in 0..200 {
        let from = resource(r % 40);
        let to = resource((r + 1) % 40);
        handler.add_recipe(make_recipe(
            BrokerId(1000 + r as u32),
            &[(from.as_str(), 0.5), (EC, 0.1)],
            &[(to.as_str(), 0.5)],
        ));
    }
}

fn build_tank_farm() -> (VesselResourceHandler, Tanks<Tank>) {
    let mut tanks = Tanks::simulated();
    for i in 0..20 {
        for _ in 0..100 {
            tanks.insert(Tank::new(resource(i), 10.0, 20.0));
        }
    }
    let handler = handler_for(&tanks);
    (handler, tanks)
}

// ===========================================================================
// Benchmarks
// ===========================================================================

fn bench_recipe_heavy(c: &mut Criterion) {
    let mut group = c.benchmark_group("recipe_heavy");
    group.sample_size(50);

    let (mut handler, mut tanks) = build_chain_craft();
    handler.produce(EC, 1.0, None);

    group.bench_function("200_recipes_40_resources", |b| {
        b.iter(|| {
            queue_chain_recipes(&mut handler);
            handler.produce(EC, 20.0, None);
            step(&mut handler, &mut tanks, 1.0);
        });
    });

    group.finish();
}

fn bench_many_tanks(c: &mut Criterion) {
    let mut group = c.benchmark_group("many_tanks");
    group.sample_size(30);

    let (mut handler, mut tanks) = build_tank_farm();
    group.bench_function("2000_tanks_20_resources", |b| {
        b.iter(|| {
            for i in 0..20 {
                let name = resource(i);
                handler.produce(&name, 3.0, Some(BrokerId(500)));
                handler.consume(&name, 2.0, Some(BrokerId(501)), i % 2 == 0);
            }
            step(&mut handler, &mut tanks, 1.0);
        });
    });

    group.finish();
}

fn bench_virtual_pools(c: &mut Criterion) {
    let mut group = c.benchmark_group("virtual_pools");
    group.sample_size(30);

    let mut handler = VesselResourceHandler::new(StorageContext::Simulated);
    for i in 0..500 {
        let pool = handler.create_virtual_pool(&format!("Virtual{i}"), None);
        let _ = pool.set_capacity(100.0);
        let _ = pool.set_amount(i as f64 % 100.0);
    }
    let data = handler.save_virtual_pools().unwrap();

    group.bench_function("save_500", |b| {
        b.iter(|| handler.save_virtual_pools().unwrap());
    });
    group.bench_function("load_500", |b| {
        b.iter(|| {
            let mut target = VesselResourceHandler::new(StorageContext::Simulated);
            target.load_virtual_pools(&data).unwrap()
        });
    });

    group.finish();
}

criterion_group!(benches, bench_recipe_heavy, bench_many_tanks, bench_virtual_pools);
criterion_main!(benches);
