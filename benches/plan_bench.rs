use criterion::{black_box, criterion_group, criterion_main, Criterion};
use epbatch::config::RunConfig;
use epbatch::jobs::dimensions::{Vintage, BUILDING_TYPES, CLIMATE_ZONES};
use epbatch::jobs::{enumerate_jobs, partition};
use std::path::PathBuf;

/// Input paths for every archetype, zone and vintage; nothing touches disk.
fn synthetic_inputs() -> Vec<PathBuf> {
    let mut files = Vec::new();
    for vintage in Vintage::ALL {
        for cz in CLIMATE_ZONES {
            for building in BUILDING_TYPES {
                files.push(PathBuf::from(format!(
                    "/proj/eplus_simulations/{v}/idf_files/v22_2/{cz}_{v}_v22_2/{b}_{v}_{CZ}.idf",
                    v = vintage.label(),
                    cz = cz,
                    b = building,
                    CZ = cz.to_uppercase(),
                )));
            }
        }
    }
    files
}

fn bench_plan(c: &mut Criterion) {
    let config = RunConfig::default();
    let codec = config.codec();
    let scenario_years = config.scenario_years();
    let inputs = synthetic_inputs();

    // 768 files x 13 scenario years
    c.bench_function("enumerate_full_universe", |b| {
        b.iter(|| {
            enumerate_jobs(
                black_box(&codec),
                &config.vintages,
                black_box(&inputs),
                &scenario_years,
            )
            .unwrap()
        })
    });

    let jobs = enumerate_jobs(&codec, &config.vintages, &inputs, &scenario_years).unwrap();
    c.bench_function("partition_full_universe_16_workers", |b| {
        b.iter(|| partition(black_box(&jobs), 16).unwrap())
    });
}

criterion_group!(benches, bench_plan);
criterion_main!(benches);
