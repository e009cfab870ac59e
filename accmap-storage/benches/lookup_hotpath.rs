use accmap_test_utils::{SourceRows, StoreFixture};
use criterion::{criterion_group, criterion_main, Criterion};
use std::collections::BTreeMap;
use std::hint::black_box;

const ACCESSIONS: usize = 20_000;

fn bench_fixture() -> StoreFixture {
    let mut sources = BTreeMap::new();
    for (name, stride) in [("Taxonomy", 1usize), ("KEGG", 3), ("eggNOG", 7)] {
        let rows: SourceRows = (0..ACCESSIONS)
            .step_by(stride)
            .map(|i| (format!("WP_{:09}.1", i), (i as i64 % 9_973) + 1))
            .collect();
        sources.insert(name.to_string(), rows);
    }
    StoreFixture::build(sources)
}

fn bench_lookups(c: &mut Criterion) {
    let fixture = bench_fixture();
    let store = fixture.open_all();
    let probe: Vec<String> = (0..1_000)
        .map(|i| format!("WP_{:09}.1", i * (ACCESSIONS / 1_000)))
        .collect();

    c.bench_function("lookup/get_single", |b| {
        let mut i = 0usize;
        b.iter(|| {
            let accession = &probe[i % probe.len()];
            i += 1;
            black_box(store.get("KEGG", black_box(accession)));
        });
    });

    c.bench_function("lookup/get_missing", |b| {
        b.iter(|| black_box(store.get("Taxonomy", black_box("not-an-accession"))));
    });

    c.bench_function("lookup/get_many_1000", |b| {
        b.iter(|| {
            let rows = store
                .get_many(black_box(&probe), probe.len())
                .expect("batched lookup");
            black_box(rows.len());
        });
    });
}

criterion_group!(benches, bench_lookups);
criterion_main!(benches);
