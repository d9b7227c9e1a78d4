use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::time::Duration;
use vc_supervisor::{CircuitBreaker, CircuitBreakerConfig, ErrorKind};

fn circuit_breaker_admission_closed(c: &mut Criterion) {
    let breaker = CircuitBreaker::new(CircuitBreakerConfig {
        failure_threshold: 1_000_000,
        success_threshold: 1,
        open_timeout: Duration::from_secs(30),
    });

    c.bench_function("circuit_breaker_try_acquire_closed", |b| {
        b.iter(|| black_box(breaker.try_acquire()));
    });
}

fn circuit_breaker_record_success(c: &mut Criterion) {
    let breaker = CircuitBreaker::new(CircuitBreakerConfig {
        failure_threshold: 1_000_000,
        success_threshold: 1,
        open_timeout: Duration::from_secs(30),
    });

    c.bench_function("circuit_breaker_record_success", |b| {
        b.iter(|| black_box(breaker.record_success()));
    });
}

fn circuit_breaker_record_failure_open(c: &mut Criterion) {
    // failure_threshold(1): every recorded failure flips Open then immediately
    // needs a fresh breaker, so this measures the hot contended path of a
    // breaker that is permanently tripping.
    c.bench_function("circuit_breaker_record_failure_tripped", |b| {
        b.iter_batched(
            || {
                CircuitBreaker::new(CircuitBreakerConfig {
                    failure_threshold: 1,
                    success_threshold: 1,
                    open_timeout: Duration::from_secs(30),
                })
            },
            |breaker| black_box(breaker.record_failure(ErrorKind::Transient)),
            criterion::BatchSize::SmallInput,
        );
    });
}

criterion_group!(
    benches,
    circuit_breaker_admission_closed,
    circuit_breaker_record_success,
    circuit_breaker_record_failure_open
);
criterion_main!(benches);
