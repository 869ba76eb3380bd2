//! Concurrent Market - Symbol-partitioned Worker Pool
//!
//! Spreads symbols across a fixed pool of worker threads. Each worker owns a
//! `Market` and its `EventHandler` outright; callers only ever touch a
//! worker's inbound queue and the read-mostly symbol → worker table.
//!
//! ## Architecture
//! - **Partitioning**: a symbol is bound to one worker when it is added
//!   (round-robin) and stays there until it is deleted
//! - **Serialization**: every operation on a symbol runs on its worker, one
//!   at a time, so order books need no locks
//! - **Synchronous calls**: each call blocks until the worker has finished
//!   the operation and returns the worker's result
//! - **Batch Processing**: workers drain up to `batch_size` items per wakeup
//! - **CPU Affinity**: optional core pinning (`cpu-affinity` feature)
//!
//! ## Shutdown
//! `shutdown()` (or dropping the market) sends every worker an explicit
//! shutdown item; each worker finishes everything queued ahead of it, then
//! exits and hands its event handler back.
//!
//! ## Usage
//! ```rust
//! use rapid_match::application::{ConcurrentMarket, MarketConfig};
//! use rapid_match::domain::{NullEventHandler, Order, TimeInForce};
//!
//! let config = MarketConfig { worker_count: 2, ..MarketConfig::default() };
//! let market = ConcurrentMarket::new(config, |_| NullEventHandler).unwrap();
//!
//! market.add_symbol(1, "BTC-USDT").unwrap();
//! market.add_order(Order::limit_bid(1, 1, 50_000, 10, TimeInForce::GTC).unwrap()).unwrap();
//!
//! let handlers = market.shutdown();
//! assert_eq!(handlers.len(), 2);
//! ```

use super::market::Market;
use crate::domain::error::MarketError;
use crate::domain::events::EventHandler;
use crate::domain::order::Order;
use crate::domain::validation::{OrderValidator, ValidationConfig};
use crate::shared::metrics::METRICS;
use crossbeam::channel::{bounded, Receiver, Sender};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::io;
use std::thread;
use std::time::Instant;
use tracing::{debug, error, info, info_span, warn};

/// Configuration for the concurrent market
#[derive(Clone, Debug)]
pub struct MarketConfig {
    /// Number of worker threads (recommended: number of CPU cores)
    pub worker_count: usize,

    /// Queue capacity per worker
    pub queue_capacity: usize,

    /// Maximum work items handled per wakeup
    pub batch_size: usize,

    /// Pin worker i to core i (needs the `cpu-affinity` feature)
    pub enable_cpu_affinity: bool,

    /// Limits applied by every worker's validator
    pub validation: ValidationConfig,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            worker_count: num_cpus::get(),
            queue_capacity: 10_000,
            batch_size: 100,
            enable_cpu_affinity: false,
            validation: ValidationConfig::default(),
        }
    }
}

type Reply = Sender<Result<(), MarketError>>;

/// Work item sent to a worker
enum WorkItem {
    AddSymbol { symbol_id: u32, name: String, reply: Reply },
    DeleteSymbol { symbol_id: u32, reply: Reply },
    AddOrder { order: Order, reply: Reply },
    DeleteOrder { symbol_id: u32, order_id: u64, reply: Reply },
    Shutdown,
}

/// Worker owning the markets of one partition
struct MarketWorker<H: EventHandler> {
    worker_id: usize,
    market: Market<H>,
    rx: Receiver<WorkItem>,
    config: MarketConfig,
    label: String,
}

impl<H: EventHandler> MarketWorker<H> {
    fn new(worker_id: usize, handler: H, rx: Receiver<WorkItem>, config: MarketConfig) -> Self {
        let validator = OrderValidator::with_config(config.validation.clone());
        Self {
            worker_id,
            market: Market::with_validator(handler, validator),
            rx,
            config,
            label: worker_id.to_string(),
        }
    }

    /// Main processing loop
    ///
    /// Returns the handler once a shutdown item has been seen and the queue
    /// is drained, or once every sender is gone.
    fn run(mut self) -> H {
        let span = info_span!("worker", worker = self.worker_id);
        let _entered = span.enter();

        if self.config.enable_cpu_affinity {
            self.pin_to_core();
        }

        info!("worker started");
        let batch_size = self.config.batch_size.max(1);
        let mut batch: Vec<WorkItem> = Vec::with_capacity(batch_size);

        loop {
            // 阻塞等待第一个请求，再批量取出剩余请求
            let Ok(first) = self.rx.recv() else {
                break;
            };
            batch.push(first);
            batch.extend(self.rx.try_iter().take(batch_size - 1));

            let mut stop = false;
            for item in batch.drain(..) {
                stop |= !self.process(item);
            }

            METRICS
                .worker_queue_depth
                .with_label_values(&[self.label.as_str()])
                .set(self.rx.len() as f64);

            if stop {
                // 关闭前排空队列
                let pending: Vec<WorkItem> = self.rx.try_iter().collect();
                for item in pending {
                    self.process(item);
                }
                break;
            }
        }

        info!(symbols = self.market.symbol_count(), "worker stopped");
        self.market.into_handler()
    }

    #[cfg(feature = "cpu-affinity")]
    fn pin_to_core(&self) {
        if let Some(core_ids) = core_affinity::get_core_ids() {
            if let Some(core) = core_ids.get(self.worker_id) {
                core_affinity::set_for_current(*core);
                debug!(core = core.id, "worker pinned");
            }
        }
    }

    #[cfg(not(feature = "cpu-affinity"))]
    fn pin_to_core(&self) {
        debug!("cpu affinity requested but the cpu-affinity feature is disabled");
    }

    /// Handles one work item; returns false on shutdown
    #[inline]
    fn process(&mut self, item: WorkItem) -> bool {
        let started = Instant::now();

        match item {
            WorkItem::AddSymbol { symbol_id, name, reply } => {
                let result = self.market.add_symbol(symbol_id, &name);
                self.finish("add_symbol", started, reply, result);
            }
            WorkItem::DeleteSymbol { symbol_id, reply } => {
                let result = self.market.delete_symbol(symbol_id);
                self.finish("delete_symbol", started, reply, result);
            }
            WorkItem::AddOrder { order, reply } => {
                let symbol_id = order.symbol_id();
                let executed_before = self.market.execution_count();
                let result = self.market.add_order(order);

                let executed = self.market.execution_count() - executed_before;
                if executed > 0 {
                    METRICS
                        .executions_total
                        .with_label_values(&[symbol_id.to_string().as_str()])
                        .inc_by(executed as f64);
                }
                self.finish("add_order", started, reply, result);
            }
            WorkItem::DeleteOrder { symbol_id, order_id, reply } => {
                let result = self.market.delete_order(symbol_id, order_id);
                self.finish("delete_order", started, reply, result);
            }
            WorkItem::Shutdown => {
                debug!("shutdown requested");
                return false;
            }
        }
        true
    }

    fn finish(&self, operation: &str, started: Instant, reply: Reply, result: Result<(), MarketError>) {
        let status = match &result {
            Ok(()) => "ok",
            Err(e) => e.kind(),
        };
        METRICS
            .operations_total
            .with_label_values(&[operation, status])
            .inc();
        METRICS
            .operation_duration
            .with_label_values(&[operation])
            .observe(started.elapsed().as_secs_f64() * 1_000_000.0);

        // 调用方已放弃等待时忽略
        let _ = reply.send(result);
    }
}

/// symbol → worker 路由表
#[derive(Debug, Default)]
struct Routing {
    symbols: HashMap<u32, usize>,
    next_worker: usize,
}

/// Concurrent Market
///
/// Thread-safe front for a pool of single-threaded `Market`s, one per
/// worker, each with its own event handler.
pub struct ConcurrentMarket<H: EventHandler + Send + 'static> {
    /// Sender channels for each worker
    workers: Vec<Sender<WorkItem>>,

    /// Worker thread handles; emptied by shutdown
    handles: Vec<thread::JoinHandle<H>>,

    routing: RwLock<Routing>,

    config: MarketConfig,
}

impl<H: EventHandler + Send + 'static> ConcurrentMarket<H> {
    /// Spawns the worker pool
    ///
    /// `make_handler` is called once per worker with the worker index.
    /// A `worker_count` of 0 means one worker per CPU core.
    ///
    /// # Errors
    /// Fails if a worker thread cannot be spawned; workers started before the
    /// failure are shut down again.
    pub fn new<F>(mut config: MarketConfig, mut make_handler: F) -> io::Result<Self>
    where
        F: FnMut(usize) -> H,
    {
        if config.worker_count == 0 {
            config.worker_count = num_cpus::get();
        }

        let mut market = Self {
            workers: Vec::with_capacity(config.worker_count),
            handles: Vec::with_capacity(config.worker_count),
            routing: RwLock::new(Routing::default()),
            config: config.clone(),
        };

        for worker_id in 0..config.worker_count {
            let (tx, rx) = bounded(config.queue_capacity.max(1));
            let worker = MarketWorker::new(worker_id, make_handler(worker_id), rx, config.clone());

            // 失败时 market 被 drop，已启动的工作线程随之关闭
            let handle = thread::Builder::new()
                .name(format!("market-worker-{}", worker_id))
                .spawn(move || worker.run())?;

            market.workers.push(tx);
            market.handles.push(handle);
        }

        info!(
            workers = config.worker_count,
            queue_capacity = config.queue_capacity,
            batch_size = config.batch_size,
            "concurrent market started"
        );
        Ok(market)
    }

    /// Adds a symbol and binds it to the next worker in round-robin order
    ///
    /// Holds the routing write lock until the worker has created the book,
    /// so no operation can reach the symbol before it exists. A worker that
    /// has stopped is skipped; `WorkerUnavailable` is returned only when no
    /// worker is left.
    pub fn add_symbol(&self, symbol_id: u32, name: &str) -> Result<(), MarketError> {
        let mut routing = self.routing.write();
        if routing.symbols.contains_key(&symbol_id) {
            return Err(MarketError::SymbolAlreadyExists(symbol_id));
        }

        let worker_count = self.workers.len();
        let mut last_error = MarketError::WorkerUnavailable(routing.next_worker % worker_count);
        for _ in 0..worker_count {
            let worker = routing.next_worker % worker_count;
            routing.next_worker = routing.next_worker.wrapping_add(1);

            let result = self.call(worker, |reply| WorkItem::AddSymbol {
                symbol_id,
                name: name.to_string(),
                reply,
            });
            match result {
                Ok(()) => {
                    routing.symbols.insert(symbol_id, worker);
                    debug!(symbol_id, worker, "symbol assigned");
                    return Ok(());
                }
                Err(e @ MarketError::WorkerUnavailable(_)) => {
                    warn!(symbol_id, worker, "worker unavailable, trying the next one");
                    last_error = e;
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error)
    }

    /// Deletes a symbol on its worker (cascade-cancelling its orders)
    pub fn delete_symbol(&self, symbol_id: u32) -> Result<(), MarketError> {
        let mut routing = self.routing.write();
        let worker = *routing
            .symbols
            .get(&symbol_id)
            .ok_or(MarketError::SymbolNotFound(symbol_id))?;

        self.call(worker, |reply| WorkItem::DeleteSymbol { symbol_id, reply })?;
        routing.symbols.remove(&symbol_id);
        Ok(())
    }

    /// Submits an order and waits for its worker to process it
    ///
    /// Symbols live on different workers, so duplicate ids are only caught
    /// within one symbol's book.
    pub fn add_order(&self, order: Order) -> Result<(), MarketError> {
        let symbol_id = order.symbol_id();
        let worker = self
            .worker_of(symbol_id)
            .ok_or(MarketError::SymbolNotFound(symbol_id))?;

        self.call(worker, |reply| WorkItem::AddOrder { order, reply })
    }

    pub fn delete_order(&self, symbol_id: u32, order_id: u64) -> Result<(), MarketError> {
        let worker = self
            .worker_of(symbol_id)
            .ok_or(MarketError::SymbolNotFound(symbol_id))?;

        self.call(worker, |reply| WorkItem::DeleteOrder {
            symbol_id,
            order_id,
            reply,
        })
    }

    #[inline]
    pub fn has_symbol(&self, symbol_id: u32) -> bool {
        self.routing.read().symbols.contains_key(&symbol_id)
    }

    /// Index of the worker that owns `symbol_id`
    #[inline]
    pub fn worker_of(&self, symbol_id: u32) -> Option<usize> {
        self.routing.read().symbols.get(&symbol_id).copied()
    }

    /// Gets the number of workers
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn config(&self) -> &MarketConfig {
        &self.config
    }

    /// Drains every worker, stops the pool and returns the event handlers
    ///
    /// Handlers come back in worker order. A worker that died on an
    /// invariant violation has no handler to return and is skipped.
    pub fn shutdown(mut self) -> Vec<H> {
        self.stop_workers()
    }

    fn stop_workers(&mut self) -> Vec<H> {
        for tx in &self.workers {
            // 已退出的工作线程无需通知
            let _ = tx.send(WorkItem::Shutdown);
        }

        let handlers: Vec<H> = self
            .handles
            .drain(..)
            .enumerate()
            .filter_map(|(worker, handle)| match handle.join() {
                Ok(handler) => Some(handler),
                Err(_) => {
                    error!(worker, "worker thread panicked");
                    None
                }
            })
            .collect();

        info!(workers = handlers.len(), "concurrent market stopped");
        handlers
    }

    /// Sends a work item and blocks until the worker replies
    fn call<F>(&self, worker: usize, make_item: F) -> Result<(), MarketError>
    where
        F: FnOnce(Reply) -> WorkItem,
    {
        let (reply_tx, reply_rx) = bounded(1);

        self.workers[worker]
            .send(make_item(reply_tx))
            .map_err(|_| MarketError::WorkerUnavailable(worker))?;

        match reply_rx.recv() {
            Ok(result) => result,
            Err(_) => {
                error!(worker, "worker stopped before completing the operation");
                Err(MarketError::WorkerUnavailable(worker))
            }
        }
    }
}

impl<H: EventHandler + Send + 'static> Drop for ConcurrentMarket<H> {
    fn drop(&mut self) {
        if !self.handles.is_empty() {
            self.stop_workers();
        }
    }
}
