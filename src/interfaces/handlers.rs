//! Event handler implementations
//!
//! The core only knows the `EventHandler` trait. These are the collaborators
//! this crate ships with:
//!
//! - `RecordingEventHandler`: keeps every event in memory (tests, replay)
//! - `TracingEventHandler`: writes each event as a structured log line
//! - `ChannelEventHandler`: forwards events to another thread

use crate::domain::events::{
    EventHandler, ExecutedOrder, MarketEvent, OrderAdded, OrderDeleted, OrderUpdated, SymbolAdded,
    SymbolDeleted,
};
use crossbeam::channel::Sender;
use tracing::{debug, info};

/// Captures events in arrival order
#[derive(Debug, Default, Clone)]
pub struct RecordingEventHandler {
    events: Vec<MarketEvent>,
}

impl RecordingEventHandler {
    pub fn events(&self) -> &[MarketEvent] {
        &self.events
    }

    /// Event kinds in arrival order
    pub fn kinds(&self) -> Vec<&'static str> {
        self.events.iter().map(MarketEvent::kind).collect()
    }

    /// Events that belong to one symbol
    pub fn for_symbol(&self, symbol_id: u32) -> Vec<&MarketEvent> {
        self.events
            .iter()
            .filter(|event| event.symbol_id() == symbol_id)
            .collect()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn into_events(self) -> Vec<MarketEvent> {
        self.events
    }
}

impl EventHandler for RecordingEventHandler {
    fn handle_event(&mut self, event: &MarketEvent) {
        self.events.push(event.clone());
    }
}

/// Logs events through `tracing`
///
/// Executions and symbol changes go out at `info`, order bookkeeping at
/// `debug`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventHandler;

impl EventHandler for TracingEventHandler {
    fn handle_symbol_added(&mut self, event: &SymbolAdded) {
        info!(symbol_id = event.symbol_id, name = %event.name, "SymbolAdded");
    }

    fn handle_symbol_deleted(&mut self, event: &SymbolDeleted) {
        info!(symbol_id = event.symbol_id, "SymbolDeleted");
    }

    fn handle_order_added(&mut self, event: &OrderAdded) {
        debug!(order = %event.order, "OrderAdded");
    }

    fn handle_order_updated(&mut self, event: &OrderUpdated) {
        debug!(order = %event.order, "OrderUpdated");
    }

    fn handle_order_deleted(&mut self, event: &OrderDeleted) {
        debug!(order = %event.order, "OrderDeleted");
    }

    fn handle_order_executed(&mut self, event: &ExecutedOrder) {
        let order = &event.order;
        info!(
            symbol_id = order.symbol_id(),
            order_id = order.id(),
            side = ?order.side(),
            price = order.last_executed_price(),
            quantity = order.last_executed_quantity(),
            open = order.open_quantity(),
            "ExecutedOrder"
        );
    }
}

/// Forwards every event over a crossbeam channel
///
/// Sending never blocks the worker for long: the channel is expected to be
/// unbounded or drained promptly. Events sent after the receiver is gone are
/// dropped.
#[derive(Debug, Clone)]
pub struct ChannelEventHandler {
    tx: Sender<MarketEvent>,
}

impl ChannelEventHandler {
    pub fn new(tx: Sender<MarketEvent>) -> Self {
        Self { tx }
    }
}

impl EventHandler for ChannelEventHandler {
    fn handle_event(&mut self, event: &MarketEvent) {
        if self.tx.send(event.clone()).is_err() {
            debug!(event = event.kind(), "event receiver closed, dropping event");
        }
    }
}
