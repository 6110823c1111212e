use criterion::{black_box, criterion_group, criterion_main, Criterion};
use matchbook::order::book::Book;
use matchbook::order::{Order, OrderType, Side};

/// Build a book with `levels` price levels per side and `per_level` orders on
/// each, leaving a spread so nothing crosses.
fn seeded_book(levels: i32, per_level: u64) -> Book {
    let mut book = Book::new();
    let mut id = 0u64;
    for level in 0..levels {
        for _ in 0..per_level {
            id += 1;
            book.add(Order::new(
                OrderType::GoodTillCancel,
                id,
                Side::Buy,
                1_000 - level,
                10,
            ))
            .unwrap();
            id += 1;
            book.add(Order::new(
                OrderType::GoodTillCancel,
                id,
                Side::Sell,
                1_001 + level,
                10,
            ))
            .unwrap();
        }
    }
    book
}

fn bench_add_cancel_churn(c: &mut Criterion) {
    let mut book = seeded_book(50, 20);
    let mut id = 1_000_000u64;

    c.bench_function("Book::add + Book::cancel away from the touch", |b| {
        b.iter(|| {
            id += 1;
            book.add(Order::new(OrderType::GoodTillCancel, id, Side::Buy, 900, 10))
                .unwrap();
            black_box(book.cancel(id));
        });
    });
}

fn bench_crossing_taker(c: &mut Criterion) {
    c.bench_function("Book::add sweeping 10 resting orders", |b| {
        b.iter_batched(
            || seeded_book(5, 2),
            |mut book| {
                let trades = book
                    .add(Order::new(
                        OrderType::GoodTillCancel,
                        1_000_000,
                        Side::Buy,
                        1_005,
                        100,
                    ))
                    .unwrap();
                black_box(trades);
            },
            criterion::BatchSize::SmallInput,
        );
    });
}

fn bench_snapshot(c: &mut Criterion) {
    let book = seeded_book(100, 10);

    c.bench_function("Book::snapshot on 200 levels", |b| {
        b.iter(|| black_box(book.snapshot()));
    });
}

criterion_group!(
    benches,
    bench_add_cancel_churn,
    bench_crossing_taker,
    bench_snapshot
);
criterion_main!(benches);
