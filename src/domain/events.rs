//! Market events and the handler interface
//!
//! The order book records what happened as a sequence of `MarketEvent`s; the
//! `Market` replays them, in order, against its `EventHandler`. Each event
//! carries a snapshot of the order at the moment it was produced.
//!
//! `EventHandler` has one method per event kind, each defaulting to a no-op,
//! so a handler overrides only what it cares about.

use super::order::Order;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolAdded {
    pub symbol_id: u32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolDeleted {
    pub symbol_id: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderAdded {
    pub order: Order,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderUpdated {
    pub order: Order,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDeleted {
    pub order: Order,
}

/// One side of a match, with `last_executed_price`/`last_executed_quantity` set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutedOrder {
    pub order: Order,
}

/// All lifecycle events, as one tagged type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_type", content = "data")]
pub enum MarketEvent {
    SymbolAdded(SymbolAdded),
    SymbolDeleted(SymbolDeleted),
    OrderAdded(OrderAdded),
    OrderUpdated(OrderUpdated),
    OrderDeleted(OrderDeleted),
    ExecutedOrder(ExecutedOrder),
}

impl MarketEvent {
    pub(crate) fn order_added(order: &Order) -> Self {
        MarketEvent::OrderAdded(OrderAdded { order: order.clone() })
    }

    pub(crate) fn order_updated(order: &Order) -> Self {
        MarketEvent::OrderUpdated(OrderUpdated { order: order.clone() })
    }

    pub(crate) fn order_deleted(order: &Order) -> Self {
        MarketEvent::OrderDeleted(OrderDeleted { order: order.clone() })
    }

    pub(crate) fn executed(order: &Order) -> Self {
        MarketEvent::ExecutedOrder(ExecutedOrder { order: order.clone() })
    }

    /// The order snapshot carried by order events
    pub fn order(&self) -> Option<&Order> {
        match self {
            MarketEvent::OrderAdded(e) => Some(&e.order),
            MarketEvent::OrderUpdated(e) => Some(&e.order),
            MarketEvent::OrderDeleted(e) => Some(&e.order),
            MarketEvent::ExecutedOrder(e) => Some(&e.order),
            MarketEvent::SymbolAdded(_) | MarketEvent::SymbolDeleted(_) => None,
        }
    }

    /// The symbol this event belongs to
    pub fn symbol_id(&self) -> u32 {
        match self {
            MarketEvent::SymbolAdded(e) => e.symbol_id,
            MarketEvent::SymbolDeleted(e) => e.symbol_id,
            other => other.order().map(Order::symbol_id).unwrap_or_default(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            MarketEvent::SymbolAdded(_) => "SymbolAdded",
            MarketEvent::SymbolDeleted(_) => "SymbolDeleted",
            MarketEvent::OrderAdded(_) => "OrderAdded",
            MarketEvent::OrderUpdated(_) => "OrderUpdated",
            MarketEvent::OrderDeleted(_) => "OrderDeleted",
            MarketEvent::ExecutedOrder(_) => "ExecutedOrder",
        }
    }
}

/// Receives lifecycle events from a single-threaded `Market`
///
/// Callbacks run synchronously on the thread that owns the market, in the
/// exact order the operation produced them. In the concurrent setting there
/// is one handler per worker.
pub trait EventHandler {
    fn handle_symbol_added(&mut self, _event: &SymbolAdded) {}
    fn handle_symbol_deleted(&mut self, _event: &SymbolDeleted) {}
    fn handle_order_added(&mut self, _event: &OrderAdded) {}
    fn handle_order_updated(&mut self, _event: &OrderUpdated) {}
    fn handle_order_deleted(&mut self, _event: &OrderDeleted) {}
    fn handle_order_executed(&mut self, _event: &ExecutedOrder) {}

    /// Routes a tagged event to its callback
    ///
    /// Handlers that prefer to see the tagged form (e.g. to forward it
    /// whole) can override this instead of the individual callbacks.
    fn handle_event(&mut self, event: &MarketEvent) {
        match event {
            MarketEvent::SymbolAdded(e) => self.handle_symbol_added(e),
            MarketEvent::SymbolDeleted(e) => self.handle_symbol_deleted(e),
            MarketEvent::OrderAdded(e) => self.handle_order_added(e),
            MarketEvent::OrderUpdated(e) => self.handle_order_updated(e),
            MarketEvent::OrderDeleted(e) => self.handle_order_deleted(e),
            MarketEvent::ExecutedOrder(e) => self.handle_order_executed(e),
        }
    }
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventHandler;

impl EventHandler for NullEventHandler {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::TimeInForce;

    #[derive(Default)]
    struct CountingHandler {
        added: usize,
        executed: usize,
    }

    impl EventHandler for CountingHandler {
        fn handle_order_added(&mut self, _event: &OrderAdded) {
            self.added += 1;
        }

        fn handle_order_executed(&mut self, _event: &ExecutedOrder) {
            self.executed += 1;
        }
    }

    #[test]
    fn test_default_dispatch_routes_by_kind() {
        let order = Order::limit_bid(1, 3, 100, 10, TimeInForce::GTC).unwrap();
        let mut handler = CountingHandler::default();

        handler.handle_event(&MarketEvent::order_added(&order));
        handler.handle_event(&MarketEvent::executed(&order));
        handler.handle_event(&MarketEvent::order_deleted(&order));

        assert_eq!(handler.added, 1);
        assert_eq!(handler.executed, 1);
    }

    #[test]
    fn test_event_accessors() {
        let order = Order::limit_ask(9, 3, 100, 10, TimeInForce::GTC).unwrap();
        let event = MarketEvent::order_updated(&order);
        assert_eq!(event.symbol_id(), 3);
        assert_eq!(event.order().map(Order::id), Some(9));
        assert_eq!(event.kind(), "OrderUpdated");

        let event = MarketEvent::SymbolAdded(SymbolAdded {
            symbol_id: 5,
            name: "BTC-USDT".to_string(),
        });
        assert_eq!(event.symbol_id(), 5);
        assert!(event.order().is_none());
    }

    #[test]
    fn test_event_json_shape() {
        let event = MarketEvent::SymbolDeleted(SymbolDeleted { symbol_id: 2 });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "SymbolDeleted");
        assert_eq!(json["data"]["symbol_id"], 2);
    }
}
