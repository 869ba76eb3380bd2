use rapid_match::application::{ConcurrentMarket, MarketConfig};
use rapid_match::domain::events::{EventHandler, MarketEvent};
use rapid_match::domain::{MarketError, Order, OrderSide, TimeInForce};
use rapid_match::interfaces::handlers::RecordingEventHandler;
use std::sync::Arc;
use std::thread;

const BTC: u32 = 1;
const ETH: u32 = 2;

fn market(worker_count: usize) -> ConcurrentMarket<RecordingEventHandler> {
    let config = MarketConfig {
        worker_count,
        queue_capacity: 64,
        batch_size: 8,
        ..MarketConfig::default()
    };
    ConcurrentMarket::new(config, |_| RecordingEventHandler::default()).unwrap()
}

fn all_events(handlers: Vec<RecordingEventHandler>) -> Vec<MarketEvent> {
    handlers.into_iter().flat_map(RecordingEventHandler::into_events).collect()
}

fn trace_for(events: &[MarketEvent], symbol_id: u32) -> Vec<(&'static str, u64)> {
    events
        .iter()
        .filter(|e| e.symbol_id() == symbol_id)
        .filter_map(|e| e.order().map(|o| (e.kind(), o.id())))
        .collect()
}

#[test]
fn symbols_on_separate_workers_trade_independently() {
    let market = Arc::new(market(2));
    market.add_symbol(BTC, "BTC-USDT").unwrap();
    market.add_symbol(ETH, "ETH-USDT").unwrap();
    assert_ne!(market.worker_of(BTC), market.worker_of(ETH));

    let handles: Vec<_> = [(BTC, 50_000u64, 100u64), (ETH, 3_000, 200)]
        .into_iter()
        .map(|(symbol_id, price, base_id)| {
            let market = Arc::clone(&market);
            thread::spawn(move || {
                let bid = Order::limit_bid(base_id + 1, symbol_id, price, 10, TimeInForce::GTC).unwrap();
                let ask = Order::limit_ask(base_id + 2, symbol_id, price, 10, TimeInForce::GTC).unwrap();
                market.add_order(bid).unwrap();
                market.add_order(ask).unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let market = Arc::try_unwrap(market).ok().unwrap();
    let events = all_events(market.shutdown());

    for (symbol_id, base_id) in [(BTC, 100u64), (ETH, 200)] {
        assert_eq!(
            trace_for(&events, symbol_id),
            vec![
                ("OrderAdded", base_id + 1),
                ("ExecutedOrder", base_id + 1),
                ("ExecutedOrder", base_id + 2),
                ("OrderDeleted", base_id + 1),
                ("OrderDeleted", base_id + 2),
            ]
        );
    }
}

#[test]
fn per_symbol_order_is_preserved_under_contention() {
    let market = Arc::new(market(3));
    for symbol_id in 1..=6 {
        market.add_symbol(symbol_id, &format!("SYM{}", symbol_id)).unwrap();
    }

    // 每个品种一个提交线程，挂单价格互不交叉
    let handles: Vec<_> = (1..=6u32)
        .map(|symbol_id| {
            let market = Arc::clone(&market);
            thread::spawn(move || {
                for n in 0..50u64 {
                    let id = u64::from(symbol_id) * 1_000 + n;
                    let order = Order::limit_bid(id, symbol_id, 100 + n, 1, TimeInForce::GTC).unwrap();
                    market.add_order(order).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let market = Arc::try_unwrap(market).ok().unwrap();
    let events = all_events(market.shutdown());

    for symbol_id in 1..=6u32 {
        let ids: Vec<u64> = trace_for(&events, symbol_id).into_iter().map(|(_, id)| id).collect();
        let expected: Vec<u64> = (0..50).map(|n| u64::from(symbol_id) * 1_000 + n).collect();
        assert_eq!(ids, expected);
    }
}

#[test]
fn unknown_symbols_and_orders_are_reported() {
    let market = market(2);
    market.add_symbol(BTC, "BTC-USDT").unwrap();

    let order = Order::limit_bid(1, 9, 100, 1, TimeInForce::GTC).unwrap();
    assert_eq!(market.add_order(order), Err(MarketError::SymbolNotFound(9)));
    assert_eq!(market.delete_order(9, 1), Err(MarketError::SymbolNotFound(9)));
    assert_eq!(
        market.delete_order(BTC, 1),
        Err(MarketError::OrderNotFound { symbol_id: BTC, order_id: 1 })
    );
    assert_eq!(market.add_symbol(BTC, "again"), Err(MarketError::SymbolAlreadyExists(BTC)));
    assert_eq!(market.delete_symbol(ETH), Err(MarketError::SymbolNotFound(ETH)));
}

#[test]
fn delete_symbol_cancels_its_orders() {
    let market = market(2);
    market.add_symbol(BTC, "BTC-USDT").unwrap();
    market
        .add_order(Order::limit(1, BTC, OrderSide::Bid, 100, 5, TimeInForce::GTC).unwrap())
        .unwrap();
    market
        .add_order(Order::stop_ask(2, BTC, 90, 5, TimeInForce::GTC).unwrap())
        .unwrap();

    market.delete_symbol(BTC).unwrap();
    assert!(!market.has_symbol(BTC));

    let order = Order::limit_bid(3, BTC, 100, 1, TimeInForce::GTC).unwrap();
    assert_eq!(market.add_order(order), Err(MarketError::SymbolNotFound(BTC)));

    let events = all_events(market.shutdown());
    let kinds: Vec<&str> = events
        .iter()
        .filter(|e| e.symbol_id() == BTC)
        .map(MarketEvent::kind)
        .collect();
    assert_eq!(
        kinds,
        vec!["SymbolAdded", "OrderAdded", "OrderAdded", "OrderDeleted", "OrderDeleted", "SymbolDeleted"]
    );
}

#[test]
fn shutdown_returns_every_handler() {
    let market = market(4);
    market.add_symbol(BTC, "BTC-USDT").unwrap();
    for id in 1..=20 {
        let order = Order::limit_ask(id, BTC, 100 + id, 1, TimeInForce::GTC).unwrap();
        market.add_order(order).unwrap();
    }

    let handlers = market.shutdown();
    assert_eq!(handlers.len(), 4);
    let added = handlers
        .iter()
        .flat_map(|h| h.events())
        .filter(|e| matches!(e, MarketEvent::OrderAdded(_)))
        .count();
    assert_eq!(added, 20);
}

/// Counts events and panics when it sees `abort_on`, taking its worker down
#[derive(Debug)]
struct AbortingHandler {
    abort_on: u64,
    seen: usize,
}

impl EventHandler for AbortingHandler {
    fn handle_event(&mut self, event: &MarketEvent) {
        if event.order().map(Order::id) == Some(self.abort_on) {
            panic!("invariant violated on order {}", self.abort_on);
        }
        self.seen += 1;
    }
}

fn aborting_market(worker_count: usize) -> ConcurrentMarket<AbortingHandler> {
    let config = MarketConfig {
        worker_count,
        queue_capacity: 64,
        batch_size: 8,
        ..MarketConfig::default()
    };
    ConcurrentMarket::new(config, |_| AbortingHandler { abort_on: 666, seen: 0 }).unwrap()
}

#[test]
fn aborted_worker_only_takes_down_its_own_symbols() {
    let market = aborting_market(2);
    market.add_symbol(BTC, "BTC-USDT").unwrap();
    market.add_symbol(ETH, "ETH-USDT").unwrap();
    let dead = market.worker_of(BTC).unwrap();

    let order = Order::limit_bid(666, BTC, 100, 1, TimeInForce::GTC).unwrap();
    assert_eq!(market.add_order(order), Err(MarketError::WorkerUnavailable(dead)));

    let order = Order::limit_bid(1, BTC, 100, 1, TimeInForce::GTC).unwrap();
    assert_eq!(market.add_order(order), Err(MarketError::WorkerUnavailable(dead)));
    assert_eq!(market.delete_order(BTC, 1), Err(MarketError::WorkerUnavailable(dead)));

    // 其他工作线程上的品种照常撮合
    market
        .add_order(Order::limit_bid(2, ETH, 3_000, 1, TimeInForce::GTC).unwrap())
        .unwrap();
    market
        .add_order(Order::limit_ask(3, ETH, 3_000, 1, TimeInForce::GTC).unwrap())
        .unwrap();

    let handlers = market.shutdown();
    assert_eq!(handlers.len(), 1);
    // SymbolAdded, OrderAdded, two executions, two deletes
    assert_eq!(handlers[0].seen, 6);
}

#[test]
fn add_symbol_skips_a_stopped_worker() {
    let market = aborting_market(2);
    market.add_symbol(BTC, "BTC-USDT").unwrap();
    let dead = market.worker_of(BTC).unwrap();
    let order = Order::limit_bid(666, BTC, 100, 1, TimeInForce::GTC).unwrap();
    assert!(market.add_order(order).is_err());

    market.add_symbol(ETH, "ETH-USDT").unwrap();
    market.add_symbol(3, "SOL-USDT").unwrap();
    assert_eq!(market.worker_of(ETH), Some(1 - dead));
    assert_eq!(market.worker_of(3), Some(1 - dead));

    market
        .add_order(Order::limit_ask(4, 3, 150, 1, TimeInForce::GTC).unwrap())
        .unwrap();
}

#[test]
fn add_symbol_fails_once_every_worker_is_gone() {
    let market = aborting_market(1);
    market.add_symbol(BTC, "BTC-USDT").unwrap();
    let order = Order::limit_bid(666, BTC, 100, 1, TimeInForce::GTC).unwrap();
    assert!(market.add_order(order).is_err());

    assert_eq!(market.add_symbol(ETH, "ETH-USDT"), Err(MarketError::WorkerUnavailable(0)));
    assert!(!market.has_symbol(ETH));
    assert!(market.shutdown().is_empty());
}
