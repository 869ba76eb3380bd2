//! In-process throughput test for the concurrent market
//!
//! Spawns client threads that submit random limit, IOC and market orders
//! (plus the occasional cancel) across several symbols, then reports
//! throughput, matches and call latency.

use clap::Parser;
use rand::Rng;
use rapid_match::application::{ConcurrentMarket, MarketConfig};
use rapid_match::domain::events::{EventHandler, ExecutedOrder};
use rapid_match::domain::order::{Order, OrderSide, TimeInForce};
use rapid_match::shared::logging::init_logging;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

// --- 配置 ---
#[derive(Parser, Debug)]
#[command(name = "load-generator", about = "Concurrent market load test")]
struct Args {
    /// 模拟的并发客户端数量
    #[arg(short, long, default_value_t = 8)]
    clients: u32,

    /// 品种数量
    #[arg(short, long, default_value_t = 8)]
    symbols: u32,

    /// 工作线程数量（0表示自动检测CPU核心数）
    #[arg(short = 'n', long, default_value_t = 0)]
    workers: usize,

    /// 测试持续时间（秒）
    #[arg(short, long, default_value_t = 10)]
    duration: u64,

    #[arg(short, long, default_value = "warn")]
    log_level: String,
}

/// Counts matches seen by one worker
#[derive(Debug, Default)]
struct ExecutionCounter {
    matches: u64,
}

impl EventHandler for ExecutionCounter {
    fn handle_order_executed(&mut self, event: &ExecutedOrder) {
        if event.order.is_bid() {
            self.matches += 1;
        }
    }
}

#[derive(Debug, Default)]
struct ClientStats {
    submitted: u64,
    refused: u64,
    latencies_ns: Vec<u64>,
}

fn main() {
    let args = Args::parse();
    init_logging(&args.log_level, false);

    let config = MarketConfig {
        worker_count: args.workers,
        ..MarketConfig::default()
    };
    let market = match ConcurrentMarket::new(config, |_| ExecutionCounter::default()) {
        Ok(market) => Arc::new(market),
        Err(e) => {
            eprintln!("无法启动撮合引擎: {}", e);
            std::process::exit(1);
        }
    };

    for symbol_id in 1..=args.symbols {
        if let Err(e) = market.add_symbol(symbol_id, &format!("SYM{}-USDT", symbol_id)) {
            eprintln!("添加品种失败: {}", e);
            std::process::exit(1);
        }
    }

    println!("启动吞吐量测试...");
    println!("模拟客户端数量: {}", args.clients);
    println!("品种数量: {}", args.symbols);
    println!("工作线程数量: {}", market.worker_count());
    println!("测试持续时间: {}s", args.duration);

    let deadline = Instant::now() + Duration::from_secs(args.duration);
    let handles: Vec<_> = (0..args.clients)
        .map(|client_id| {
            let market = Arc::clone(&market);
            let symbols = args.symbols;
            thread::spawn(move || run_client(client_id, &market, symbols, deadline))
        })
        .collect();

    let mut stats = ClientStats::default();
    for handle in handles {
        match handle.join() {
            Ok(client) => {
                stats.submitted += client.submitted;
                stats.refused += client.refused;
                stats.latencies_ns.extend(client.latencies_ns);
            }
            Err(_) => eprintln!("客户端线程异常退出"),
        }
    }

    let market = match Arc::try_unwrap(market) {
        Ok(market) => market,
        Err(_) => {
            eprintln!("客户端仍持有市场引用");
            std::process::exit(1);
        }
    };
    let matches: u64 = market.shutdown().iter().map(|h| h.matches).sum();

    // 测试结束，计算结果
    let elapsed = args.duration.max(1) as f64;
    stats.latencies_ns.sort_unstable();
    let avg = if stats.latencies_ns.is_empty() {
        0.0
    } else {
        stats.latencies_ns.iter().sum::<u64>() as f64 / stats.latencies_ns.len() as f64
    };
    let p99 = stats
        .latencies_ns
        .get(stats.latencies_ns.len().saturating_mul(99) / 100)
        .copied()
        .unwrap_or_default();

    println!("\n--- 测试结果 ---");
    println!("提交操作数: {}", stats.submitted);
    println!("被拒绝操作数: {}", stats.refused);
    println!("吞吐量 (ops/s): {:.2}", stats.submitted as f64 / elapsed);
    println!("总撮合次数: {}", matches);
    println!("平均调用延迟: {:.2} µs", avg / 1000.0);
    println!("P99 调用延迟: {:.2} µs", p99 as f64 / 1000.0);
}

fn run_client(
    client_id: u32,
    market: &ConcurrentMarket<ExecutionCounter>,
    symbols: u32,
    deadline: Instant,
) -> ClientStats {
    let mut rng = rand::thread_rng();
    let mut stats = ClientStats::default();
    let mut order_id_counter: u64 = (client_id as u64) << 32;
    let mut recent: Vec<(u32, u64)> = Vec::with_capacity(64);

    while Instant::now() < deadline {
        let started = Instant::now();

        // 约 10% 的操作为撤单
        let result = if !recent.is_empty() && rng.gen_ratio(1, 10) {
            let (symbol_id, order_id) = recent.swap_remove(rng.gen_range(0..recent.len()));
            market.delete_order(symbol_id, order_id)
        } else {
            order_id_counter += 1;
            let symbol_id = rng.gen_range(1..=symbols);
            let side = if rng.gen::<bool>() { OrderSide::Bid } else { OrderSide::Ask };
            let quantity = rng.gen_range(1..=5);
            let price = match side {
                OrderSide::Bid => rng.gen_range(49_990..=50_000),
                OrderSide::Ask => rng.gen_range(50_000..=50_010),
            };

            let order = match rng.gen_range(0..20) {
                0 => Order::market(order_id_counter, symbol_id, side, quantity, TimeInForce::IOC),
                1 | 2 => Order::limit(order_id_counter, symbol_id, side, price, quantity, TimeInForce::IOC),
                _ => {
                    if recent.len() < recent.capacity() {
                        recent.push((symbol_id, order_id_counter));
                    }
                    Order::limit(order_id_counter, symbol_id, side, price, quantity, TimeInForce::GTC)
                }
            };

            match order {
                Ok(order) => market.add_order(order),
                Err(e) => Err(e.into()),
            }
        };

        stats.submitted += 1;
        if result.is_err() {
            // 已成交订单的撤单会返回 NotFound
            stats.refused += 1;
        }
        stats.latencies_ns.push(started.elapsed().as_nanos() as u64);
    }

    stats
}
