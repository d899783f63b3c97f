use criterion::{black_box, criterion_group, criterion_main, Criterion};
use gmail_relay::utils::{is_promotional, remove_quotes};

fn classifier_benchmarks(c: &mut Criterion) {
    c.bench_function("is_promotional_genuine", |b| {
        b.iter(|| {
            black_box(is_promotional(
                black_box("Your Zomato order from Biryani Blues"),
                black_box("Order delivered. Paid Rs 250.50 via UPI"),
            ))
        })
    });

    c.bench_function("remove_quotes", |b| {
        b.iter(|| {
            black_box(remove_quotes(black_box(
                "“Atomic Habits”, \"James Clear\" 'Amazon' after:2015/04/01 and before:2025/04/01",
            )))
        })
    });
}

criterion_group!(benches, classifier_benchmarks);
criterion_main!(benches);
