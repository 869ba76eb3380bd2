use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use rapid_match::domain::order::{Order, TimeInForce};
use rapid_match::domain::orderbook::{EventBuffer, OrderBook};

const SYMBOL: u32 = 1;

/// Book with `levels` ask levels starting at 50000, `per_level` orders each
fn seeded_book(levels: u64, per_level: u64) -> OrderBook {
    let mut book = OrderBook::new(SYMBOL, "BTC-USDT");
    let mut events = EventBuffer::new();
    let mut id = 1;
    for level in 0..levels {
        for _ in 0..per_level {
            let order = Order::limit_ask(id, SYMBOL, 50_000 + level, 10, TimeInForce::GTC).unwrap();
            book.add_order(order, &mut events).unwrap();
            events.clear();
            id += 1;
        }
    }
    book
}

fn realistic_match_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("Realistic OrderBook Matching");

    // 1. 一次性创建一个预填充的“母版”订单簿
    let master = seeded_book(1000, 1);

    group.bench_function("1-to-1 match in a cloned book with 1000 levels", |b| {
        b.iter_batched(
            // 2. Setup: 每次迭代只是克隆母版
            || {
                let incoming = Order::limit_bid(1_000_000, SYMBOL, 50_000, 10, TimeInForce::GTC).unwrap();
                (master.clone(), incoming, EventBuffer::new())
            },
            // 3. Measured Routine: 实际的撮合操作
            |(mut book, order, mut events)| {
                book.add_order(black_box(order), &mut events).unwrap();
                events
            },
            BatchSize::SmallInput,
        );
    });

    group.bench_function("market sweep across 10 levels", |b| {
        b.iter_batched(
            || {
                let incoming = Order::market_bid(1_000_000, SYMBOL, 100).unwrap();
                (master.clone(), incoming, EventBuffer::new())
            },
            |(mut book, order, mut events)| {
                book.add_order(black_box(order), &mut events).unwrap();
                events
            },
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

fn resting_insert_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("OrderBook Insert and Cancel");

    for depth in [10u64, 100, 1000] {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("insert_non_crossing", depth), &depth, |b, &depth| {
            let master = seeded_book(depth, 1);
            b.iter_batched(
                || {
                    let bid = Order::limit_bid(1_000_000, SYMBOL, 49_000, 10, TimeInForce::GTC).unwrap();
                    (master.clone(), bid, EventBuffer::new())
                },
                |(mut book, order, mut events)| {
                    book.add_order(black_box(order), &mut events).unwrap();
                    events
                },
                BatchSize::SmallInput,
            );
        });

        group.bench_with_input(BenchmarkId::new("cancel_middle", depth), &depth, |b, &depth| {
            let master = seeded_book(depth, 4);
            let target = depth * 2;
            b.iter_batched(
                || (master.clone(), EventBuffer::new()),
                |(mut book, mut events)| {
                    book.delete_order(black_box(target), &mut events).unwrap();
                    events
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

fn stop_cascade_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("OrderBook Stop Activation");

    // 每个止损单吃掉一个价位，推高成交价并触发下一个
    let mut master = seeded_book(200, 1);
    let mut events = EventBuffer::new();
    for i in 0..100u64 {
        let stop = Order::stop_bid(2_000_000 + i, SYMBOL, 50_000 + i, 10, TimeInForce::GTC).unwrap();
        master.add_order(stop, &mut events).unwrap();
    }

    group.bench_function("cascade of 100 buy stops", |b| {
        b.iter_batched(
            || {
                let trigger = Order::limit_bid(1_000_000, SYMBOL, 50_000, 10, TimeInForce::GTC).unwrap();
                (master.clone(), trigger, EventBuffer::new())
            },
            |(mut book, order, mut events)| {
                book.add_order(black_box(order), &mut events).unwrap();
                events
            },
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

criterion_group!(
    benches,
    realistic_match_benchmark,
    resting_insert_benchmark,
    stop_cascade_benchmark
);
criterion_main!(benches);
