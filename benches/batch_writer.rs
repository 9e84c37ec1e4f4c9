use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;
use tablet_client::writer::{BufferLimits, MutationBuffer};
use tablet_client::{
    Authorizations, BatchWriterConfig, ClientConfig, ClientSession, LocalStore, Mutation,
    NewTableConfiguration, StaticCredential,
};

fn hello_mutation(i: usize) -> Mutation {
    let mut m = Mutation::new(format!("row_{}", i));
    for j in 0..5 {
        m.put("colfam", format!("colqual_{}", j), format!("value_{}_{}", i, j));
    }
    m
}

fn session() -> Arc<ClientSession> {
    let session = ClientSession::open(
        &ClientConfig::default(),
        Arc::new(LocalStore::new()),
        Box::new(StaticCredential::password("root", "secret")),
    )
    .unwrap();
    session
        .table_operations()
        .create("hellotable", NewTableConfiguration::new())
        .unwrap();
    session
}

fn bench_buffer(c: &mut Criterion) {
    let mut group = c.benchmark_group("mutation_buffer");
    let mutations: Vec<_> = (0..1000).map(hello_mutation).collect();
    group.throughput(Throughput::Elements(mutations.len() as u64));

    group.bench_function("add_then_drain", |b| {
        let buffer = MutationBuffer::new(BufferLimits {
            max_mutations: usize::MAX,
            max_memory: usize::MAX,
            max_latency: Duration::from_secs(3600),
        });
        b.iter(|| {
            for m in &mutations {
                buffer.add(black_box(m.clone())).unwrap();
            }
            black_box(buffer.drain());
        });
    });
    group.finish();
}

fn bench_batch_writer(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_writer");
    group.sample_size(10);

    for max_mutations in [100, 1000, 10_000].iter() {
        group.throughput(Throughput::Elements(10_000));
        group.bench_with_input(
            BenchmarkId::new("hello_workload", max_mutations),
            max_mutations,
            |b, &max_mutations| {
                let session = session();
                let config = BatchWriterConfig {
                    max_mutations,
                    ..Default::default()
                };
                b.iter(|| {
                    let writer = session
                        .create_batch_writer_with("hellotable", config.clone())
                        .unwrap();
                    for i in 0..10_000 {
                        writer.add_mutation(hello_mutation(i)).unwrap();
                    }
                    writer.close().unwrap();
                });
            },
        );
    }
    group.finish();
}

fn bench_scan(c: &mut Criterion) {
    let session = session();
    let writer = session.create_batch_writer("hellotable").unwrap();
    for i in 0..10_000 {
        writer.add_mutation(hello_mutation(i)).unwrap();
    }
    writer.close().unwrap();

    let mut group = c.benchmark_group("scanner");
    group.throughput(Throughput::Elements(50_000));
    group.sample_size(10);
    group.bench_function("full_table", |b| {
        b.iter(|| {
            let scanner = session
                .create_scanner("hellotable", Authorizations::empty())
                .unwrap();
            black_box(scanner.count());
        });
    });
    group.finish();
}

criterion_group!(benches, bench_buffer, bench_batch_writer, bench_scan);
criterion_main!(benches);
