//! JSON command decoding and event encoding
//!
//! Inbound messages carry an `operation` tag and a `payload`:
//!
//! ```json
//! {"operation": "ADD_ORDER", "payload": {"order_id": 1, "instrument_id": 1,
//!  "side": "Bid", "price": 50000, "quantity": 10, "time_in_force": "GTC"}}
//! {"operation": "CANCEL_ORDER", "payload": {"order_id": 1, "instrument_id": 1}}
//! ```
//!
//! Outbound events are `{"event_type": ..., "data": {...}}` with the order
//! flattened into `data`.

use crate::domain::events::MarketEvent;
use crate::domain::order::{Order, OrderSide, OrderType, TimeInForce};
use crate::domain::validation::ValidationError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Malformed command: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Inbound command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "operation", content = "payload")]
pub enum Command {
    #[serde(rename = "ADD_ORDER")]
    AddOrder(OrderRequest),

    #[serde(rename = "CANCEL_ORDER")]
    CancelOrder(CancelRequest),

    #[serde(rename = "ADD_SYMBOL")]
    AddSymbol(SymbolRequest),

    #[serde(rename = "DELETE_SYMBOL")]
    DeleteSymbol(DeleteSymbolRequest),
}

impl Command {
    /// Parses one JSON message
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        Ok(serde_json::from_str(line)?)
    }

    /// Operation name, as used in logs
    pub fn operation(&self) -> &'static str {
        match self {
            Command::AddOrder(_) => "ADD_ORDER",
            Command::CancelOrder(_) => "CANCEL_ORDER",
            Command::AddSymbol(_) => "ADD_SYMBOL",
            Command::DeleteSymbol(_) => "DELETE_SYMBOL",
        }
    }
}

/// `ADD_ORDER` payload
///
/// `type` defaults to `Limit` and `time_in_force` to `GTC`. Fields a type
/// does not use may be left out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub order_id: u64,
    pub instrument_id: u32,
    pub side: OrderSide,
    #[serde(rename = "type", default = "default_order_type")]
    pub order_type: OrderType,
    #[serde(default)]
    pub time_in_force: TimeInForce,
    #[serde(default)]
    pub price: u64,
    #[serde(default)]
    pub stop_price: u64,
    #[serde(default)]
    pub trail_amount: u64,
    pub quantity: u64,
}

fn default_order_type() -> OrderType {
    OrderType::Limit
}

impl OrderRequest {
    /// Builds the order through the typed factories
    pub fn into_order(self) -> Result<Order, ValidationError> {
        let Self {
            order_id: id,
            instrument_id: symbol_id,
            side,
            order_type,
            time_in_force: tif,
            price,
            stop_price,
            trail_amount,
            quantity,
        } = self;

        match order_type {
            OrderType::Limit => Order::limit(id, symbol_id, side, price, quantity, tif),
            OrderType::Market => Order::market(id, symbol_id, side, quantity, tif),
            OrderType::Stop => Order::stop(id, symbol_id, side, stop_price, quantity, tif),
            OrderType::StopLimit => {
                Order::stop_limit(id, symbol_id, side, stop_price, price, quantity, tif)
            }
            OrderType::TrailingStop => {
                Order::trailing_stop(id, symbol_id, side, stop_price, trail_amount, quantity, tif)
            }
            OrderType::TrailingStopLimit => Order::trailing_stop_limit(
                id,
                symbol_id,
                side,
                stop_price,
                price,
                trail_amount,
                quantity,
                tif,
            ),
        }
    }
}

/// `CANCEL_ORDER` payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelRequest {
    pub order_id: u64,
    pub instrument_id: u32,
}

/// `ADD_SYMBOL` payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolRequest {
    pub instrument_id: u32,
    pub name: String,
}

/// `DELETE_SYMBOL` payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteSymbolRequest {
    pub instrument_id: u32,
}

/// Flattened order as it appears in outbound `data`
#[derive(Debug, Serialize)]
struct OrderView {
    order_id: u64,
    symbol_id: u32,
    side: OrderSide,
    #[serde(rename = "type")]
    order_type: OrderType,
    time_in_force: TimeInForce,
    price: u64,
    stop_price: u64,
    quantity: u64,
    open_quantity: u64,
    executed_quantity: u64,
    last_executed_price: u64,
    last_executed_quantity: u64,
}

impl From<&Order> for OrderView {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.id(),
            symbol_id: order.symbol_id(),
            side: order.side(),
            order_type: order.order_type(),
            time_in_force: order.time_in_force(),
            price: order.price(),
            stop_price: order.stop_price(),
            quantity: order.quantity(),
            open_quantity: order.open_quantity(),
            executed_quantity: order.executed_quantity(),
            last_executed_price: order.last_executed_price(),
            last_executed_quantity: order.last_executed_quantity(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum EventData<'a> {
    Order(OrderView),
    SymbolAdded { symbol_id: u32, name: &'a str },
    SymbolDeleted { symbol_id: u32 },
}

#[derive(Debug, Serialize)]
struct EventMessage<'a> {
    event_type: &'static str,
    data: EventData<'a>,
}

/// Encodes an event as one JSON line (without the newline)
pub fn encode_event(event: &MarketEvent) -> Result<String, serde_json::Error> {
    let data = match event {
        MarketEvent::SymbolAdded(e) => EventData::SymbolAdded {
            symbol_id: e.symbol_id,
            name: &e.name,
        },
        MarketEvent::SymbolDeleted(e) => EventData::SymbolDeleted {
            symbol_id: e.symbol_id,
        },
        MarketEvent::OrderAdded(e) => EventData::Order((&e.order).into()),
        MarketEvent::OrderUpdated(e) => EventData::Order((&e.order).into()),
        MarketEvent::OrderDeleted(e) => EventData::Order((&e.order).into()),
        MarketEvent::ExecutedOrder(e) => EventData::Order((&e.order).into()),
    };

    serde_json::to_string(&EventMessage {
        event_type: event.kind(),
        data,
    })
}
