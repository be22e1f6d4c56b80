use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use minicoap::exchange::{Exchange, ExchangeRegistry, TransmissionParams};
use minicoap::ordered::{ByKey, OrderedContainer};
use rand::{Rng, SeedableRng};
use std::hint::black_box;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

fn random_keys(n: usize) -> Vec<u64> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(0x5eed);
    (0..n).map(|_| rng.gen_range(0..1_000_000)).collect()
}

/// One-at-a-time insert versus a single batch insert
fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("ordered_insert");

    for size in [64usize, 1024, 8192].iter() {
        let keys = random_keys(*size);

        group.bench_with_input(BenchmarkId::new("single", size), &keys, |b, keys| {
            b.iter(|| {
                let mut c = OrderedContainer::natural();
                for k in keys {
                    c.insert(black_box(*k)).ok();
                }
                c
            });
        });

        group.bench_with_input(BenchmarkId::new("batch", size), &keys, |b, keys| {
            b.iter_batched(
                || keys.clone(),
                |batch| {
                    let mut c = OrderedContainer::natural();
                    c.insert_batch(black_box(batch)).ok();
                    c
                },
                BatchSize::SmallInput,
            );
        });

        // Monotonic deadlines are the common case for exchanges: insert lands at the tail
        group.bench_with_input(BenchmarkId::new("ascending", size), size, |b, &size| {
            b.iter(|| {
                let mut c = OrderedContainer::new(ByKey(|e: &(u64, u16)| e.0));
                for i in 0..size as u64 {
                    c.insert(black_box((i, i as u16))).ok();
                }
                c
            });
        });
    }

    group.finish();
}

/// Sweep cost with a populated registry where a tenth of the exchanges are due
fn bench_sweep(c: &mut Criterion) {
    let mut group = c.benchmark_group("retransmission_sweep");
    let peer: SocketAddr = "127.0.0.1:5683".parse().expect("valid address");

    for in_flight in [100u16, 1000].iter() {
        group.bench_with_input(
            BenchmarkId::new("in_flight", in_flight),
            in_flight,
            |b, &in_flight| {
                b.iter_batched(
                    || {
                        let registry = ExchangeRegistry::new(TransmissionParams::default());
                        let t0 = Instant::now();
                        for mid in 0..in_flight {
                            let deadline = t0 + Duration::from_millis(u64::from(mid) * 10);
                            registry
                                .schedule(Exchange {
                                    message_id: mid,
                                    token: vec![],
                                    peer,
                                    bytes: vec![0x40, 0x45, 0, 0],
                                    deadline,
                                    timeout: Duration::from_secs(2),
                                    retries: 0,
                                })
                                .ok();
                        }
                        (registry, t0 + Duration::from_millis(u64::from(in_flight)))
                    },
                    |(registry, now)| registry.retransmission_sweep(now, |e| {
                        black_box(e.bytes.len());
                    }),
                    BatchSize::SmallInput,
                );
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_insert, bench_sweep);
criterion_main!(benches);
