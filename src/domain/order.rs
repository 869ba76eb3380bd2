//! Order entity
//!
//! An `Order` carries an immutable identity (id, symbol, side, type) plus the
//! mutable execution state the order book updates while matching.
//!
//! ## Quantity invariant
//! `open_quantity + executed_quantity == quantity` holds for every order at
//! every point in its life. An order with `open_quantity == 0` is finished and
//! never stays resident in a book.
//!
//! ## Construction
//! Orders are built through the typed factories (`Order::limit_bid`,
//! `Order::stop_limit_ask`, ...), which reject non-positive prices and
//! quantities up front.

use super::validation::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderSide {
    Bid,
    Ask,
}

/// Order type
///
/// Closed set of variants, matched exhaustively by the order book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderType {
    Limit,
    Market,
    Stop,
    StopLimit,
    TrailingStop,
    TrailingStopLimit,
}

impl OrderType {
    /// Whether the order waits in the stop index before it can trade
    #[inline]
    pub fn is_stop(self) -> bool {
        matches!(
            self,
            OrderType::Stop | OrderType::StopLimit | OrderType::TrailingStop | OrderType::TrailingStopLimit
        )
    }

    #[inline]
    pub fn is_trailing(self) -> bool {
        matches!(self, OrderType::TrailingStop | OrderType::TrailingStopLimit)
    }

    /// Whether the order carries a limit price
    #[inline]
    pub fn has_limit_price(self) -> bool {
        matches!(
            self,
            OrderType::Limit | OrderType::StopLimit | OrderType::TrailingStopLimit
        )
    }

    /// The type a stop order turns into once its trigger fires
    #[inline]
    pub fn activated(self) -> Self {
        match self {
            OrderType::Stop | OrderType::TrailingStop => OrderType::Market,
            OrderType::StopLimit | OrderType::TrailingStopLimit => OrderType::Limit,
            other => other,
        }
    }

    /// Label used for metrics and logs
    pub fn as_str(self) -> &'static str {
        match self {
            OrderType::Limit => "limit",
            OrderType::Market => "market",
            OrderType::Stop => "stop",
            OrderType::StopLimit => "stop_limit",
            OrderType::TrailingStop => "trailing_stop",
            OrderType::TrailingStopLimit => "trailing_stop_limit",
        }
    }
}

/// Time in force
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TimeInForce {
    /// Good-til-canceled: the remainder rests in the book
    #[default]
    GTC,
    /// Immediate-or-cancel: the remainder is discarded
    IOC,
    /// Fill-or-kill: fill completely now or reject the whole order
    FOK,
}

/// A single order request and its execution state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: u64,
    symbol_id: u32,
    side: OrderSide,
    order_type: OrderType,
    time_in_force: TimeInForce,
    price: u64,
    stop_price: u64,
    trail_amount: u64,
    quantity: u64,
    open_quantity: u64,
    executed_quantity: u64,
    last_executed_price: u64,
    last_executed_quantity: u64,
    sequence: u64,
}

impl Order {
    #[allow(clippy::too_many_arguments)]
    fn build(
        id: u64,
        symbol_id: u32,
        side: OrderSide,
        order_type: OrderType,
        time_in_force: TimeInForce,
        price: u64,
        stop_price: u64,
        trail_amount: u64,
        quantity: u64,
    ) -> Result<Self, ValidationError> {
        if quantity == 0 {
            return Err(ValidationError::InvalidQuantity(
                "Quantity must be greater than zero".to_string(),
            ));
        }
        if order_type.has_limit_price() && price == 0 {
            return Err(ValidationError::InvalidPrice(
                "Price must be greater than zero".to_string(),
            ));
        }
        if order_type.is_stop() && stop_price == 0 {
            return Err(ValidationError::InvalidStopPrice(
                "Stop price must be greater than zero".to_string(),
            ));
        }
        if order_type.is_trailing() && trail_amount == 0 {
            return Err(ValidationError::InvalidTrailAmount(
                "Trail amount must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            id,
            symbol_id,
            side,
            order_type,
            time_in_force,
            price,
            stop_price,
            trail_amount,
            quantity,
            open_quantity: quantity,
            executed_quantity: 0,
            last_executed_price: 0,
            last_executed_quantity: 0,
            sequence: 0,
        })
    }

    /// Limit order on the given side
    pub fn limit(
        id: u64,
        symbol_id: u32,
        side: OrderSide,
        price: u64,
        quantity: u64,
        time_in_force: TimeInForce,
    ) -> Result<Self, ValidationError> {
        Self::build(id, symbol_id, side, OrderType::Limit, time_in_force, price, 0, 0, quantity)
    }

    pub fn limit_bid(
        id: u64,
        symbol_id: u32,
        price: u64,
        quantity: u64,
        time_in_force: TimeInForce,
    ) -> Result<Self, ValidationError> {
        Self::limit(id, symbol_id, OrderSide::Bid, price, quantity, time_in_force)
    }

    pub fn limit_ask(
        id: u64,
        symbol_id: u32,
        price: u64,
        quantity: u64,
        time_in_force: TimeInForce,
    ) -> Result<Self, ValidationError> {
        Self::limit(id, symbol_id, OrderSide::Ask, price, quantity, time_in_force)
    }

    /// Market order on the given side
    ///
    /// Market orders never rest. Only `FOK` changes their behaviour (all-or-nothing).
    pub fn market(
        id: u64,
        symbol_id: u32,
        side: OrderSide,
        quantity: u64,
        time_in_force: TimeInForce,
    ) -> Result<Self, ValidationError> {
        Self::build(id, symbol_id, side, OrderType::Market, time_in_force, 0, 0, 0, quantity)
    }

    pub fn market_bid(id: u64, symbol_id: u32, quantity: u64) -> Result<Self, ValidationError> {
        Self::market(id, symbol_id, OrderSide::Bid, quantity, TimeInForce::IOC)
    }

    pub fn market_ask(id: u64, symbol_id: u32, quantity: u64) -> Result<Self, ValidationError> {
        Self::market(id, symbol_id, OrderSide::Ask, quantity, TimeInForce::IOC)
    }

    /// Stop order: becomes a market order once `stop_price` trades
    pub fn stop(
        id: u64,
        symbol_id: u32,
        side: OrderSide,
        stop_price: u64,
        quantity: u64,
        time_in_force: TimeInForce,
    ) -> Result<Self, ValidationError> {
        Self::build(id, symbol_id, side, OrderType::Stop, time_in_force, 0, stop_price, 0, quantity)
    }

    pub fn stop_bid(
        id: u64,
        symbol_id: u32,
        stop_price: u64,
        quantity: u64,
        time_in_force: TimeInForce,
    ) -> Result<Self, ValidationError> {
        Self::stop(id, symbol_id, OrderSide::Bid, stop_price, quantity, time_in_force)
    }

    pub fn stop_ask(
        id: u64,
        symbol_id: u32,
        stop_price: u64,
        quantity: u64,
        time_in_force: TimeInForce,
    ) -> Result<Self, ValidationError> {
        Self::stop(id, symbol_id, OrderSide::Ask, stop_price, quantity, time_in_force)
    }

    /// Stop-limit order: becomes a limit order at `price` once `stop_price` trades
    #[allow(clippy::too_many_arguments)]
    pub fn stop_limit(
        id: u64,
        symbol_id: u32,
        side: OrderSide,
        stop_price: u64,
        price: u64,
        quantity: u64,
        time_in_force: TimeInForce,
    ) -> Result<Self, ValidationError> {
        Self::build(
            id,
            symbol_id,
            side,
            OrderType::StopLimit,
            time_in_force,
            price,
            stop_price,
            0,
            quantity,
        )
    }

    pub fn stop_limit_bid(
        id: u64,
        symbol_id: u32,
        stop_price: u64,
        price: u64,
        quantity: u64,
        time_in_force: TimeInForce,
    ) -> Result<Self, ValidationError> {
        Self::stop_limit(id, symbol_id, OrderSide::Bid, stop_price, price, quantity, time_in_force)
    }

    pub fn stop_limit_ask(
        id: u64,
        symbol_id: u32,
        stop_price: u64,
        price: u64,
        quantity: u64,
        time_in_force: TimeInForce,
    ) -> Result<Self, ValidationError> {
        Self::stop_limit(id, symbol_id, OrderSide::Ask, stop_price, price, quantity, time_in_force)
    }

    /// Trailing stop: a stop order whose trigger follows the market by `trail_amount`
    #[allow(clippy::too_many_arguments)]
    pub fn trailing_stop(
        id: u64,
        symbol_id: u32,
        side: OrderSide,
        stop_price: u64,
        trail_amount: u64,
        quantity: u64,
        time_in_force: TimeInForce,
    ) -> Result<Self, ValidationError> {
        Self::build(
            id,
            symbol_id,
            side,
            OrderType::TrailingStop,
            time_in_force,
            0,
            stop_price,
            trail_amount,
            quantity,
        )
    }

    pub fn trailing_stop_bid(
        id: u64,
        symbol_id: u32,
        stop_price: u64,
        trail_amount: u64,
        quantity: u64,
        time_in_force: TimeInForce,
    ) -> Result<Self, ValidationError> {
        Self::trailing_stop(id, symbol_id, OrderSide::Bid, stop_price, trail_amount, quantity, time_in_force)
    }

    pub fn trailing_stop_ask(
        id: u64,
        symbol_id: u32,
        stop_price: u64,
        trail_amount: u64,
        quantity: u64,
        time_in_force: TimeInForce,
    ) -> Result<Self, ValidationError> {
        Self::trailing_stop(id, symbol_id, OrderSide::Ask, stop_price, trail_amount, quantity, time_in_force)
    }

    /// Trailing stop-limit: trailing trigger, limit price keeps its offset from the trigger
    #[allow(clippy::too_many_arguments)]
    pub fn trailing_stop_limit(
        id: u64,
        symbol_id: u32,
        side: OrderSide,
        stop_price: u64,
        price: u64,
        trail_amount: u64,
        quantity: u64,
        time_in_force: TimeInForce,
    ) -> Result<Self, ValidationError> {
        Self::build(
            id,
            symbol_id,
            side,
            OrderType::TrailingStopLimit,
            time_in_force,
            price,
            stop_price,
            trail_amount,
            quantity,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn trailing_stop_limit_bid(
        id: u64,
        symbol_id: u32,
        stop_price: u64,
        price: u64,
        trail_amount: u64,
        quantity: u64,
        time_in_force: TimeInForce,
    ) -> Result<Self, ValidationError> {
        Self::trailing_stop_limit(
            id,
            symbol_id,
            OrderSide::Bid,
            stop_price,
            price,
            trail_amount,
            quantity,
            time_in_force,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn trailing_stop_limit_ask(
        id: u64,
        symbol_id: u32,
        stop_price: u64,
        price: u64,
        trail_amount: u64,
        quantity: u64,
        time_in_force: TimeInForce,
    ) -> Result<Self, ValidationError> {
        Self::trailing_stop_limit(
            id,
            symbol_id,
            OrderSide::Ask,
            stop_price,
            price,
            trail_amount,
            quantity,
            time_in_force,
        )
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub fn symbol_id(&self) -> u32 {
        self.symbol_id
    }

    #[inline]
    pub fn side(&self) -> OrderSide {
        self.side
    }

    #[inline]
    pub fn is_bid(&self) -> bool {
        self.side == OrderSide::Bid
    }

    #[inline]
    pub fn is_ask(&self) -> bool {
        self.side == OrderSide::Ask
    }

    #[inline]
    pub fn order_type(&self) -> OrderType {
        self.order_type
    }

    #[inline]
    pub fn time_in_force(&self) -> TimeInForce {
        self.time_in_force
    }

    /// Limit price (0 for market and plain stop orders)
    #[inline]
    pub fn price(&self) -> u64 {
        self.price
    }

    #[inline]
    pub fn stop_price(&self) -> u64 {
        self.stop_price
    }

    #[inline]
    pub fn trail_amount(&self) -> u64 {
        self.trail_amount
    }

    /// Originally ordered quantity
    #[inline]
    pub fn quantity(&self) -> u64 {
        self.quantity
    }

    #[inline]
    pub fn open_quantity(&self) -> u64 {
        self.open_quantity
    }

    #[inline]
    pub fn executed_quantity(&self) -> u64 {
        self.executed_quantity
    }

    #[inline]
    pub fn last_executed_price(&self) -> u64 {
        self.last_executed_price
    }

    #[inline]
    pub fn last_executed_quantity(&self) -> u64 {
        self.last_executed_quantity
    }

    /// Acceptance sequence, the FIFO tie-break within a price level
    #[inline]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    #[inline]
    pub fn is_filled(&self) -> bool {
        self.open_quantity == 0
    }

    /// Whether this order is willing to trade at `price`
    ///
    /// Market orders accept any price.
    #[inline]
    pub fn crosses(&self, price: u64) -> bool {
        match self.order_type {
            OrderType::Market | OrderType::Stop | OrderType::TrailingStop => true,
            _ => match self.side {
                OrderSide::Bid => self.price >= price,
                OrderSide::Ask => self.price <= price,
            },
        }
    }

    /// Whether a stop order fires at the given last traded price
    #[inline]
    pub fn is_triggered_by(&self, last_price: u64) -> bool {
        match self.side {
            OrderSide::Bid => last_price >= self.stop_price,
            OrderSide::Ask => last_price <= self.stop_price,
        }
    }

    /// Records an execution of `quantity` at `price`
    pub(crate) fn execute(&mut self, price: u64, quantity: u64) {
        debug_assert!(quantity > 0 && quantity <= self.open_quantity);
        self.open_quantity -= quantity;
        self.executed_quantity += quantity;
        self.last_executed_price = price;
        self.last_executed_quantity = quantity;
    }

    pub(crate) fn set_sequence(&mut self, sequence: u64) {
        self.sequence = sequence;
    }

    /// Turns a triggered stop order into its market/limit form
    pub(crate) fn activate(&mut self) {
        self.order_type = self.order_type.activated();
    }

    /// Moves a trailing stop towards the market
    ///
    /// Sell stops follow the highest traded price down by `trail_amount`,
    /// buy stops follow the lowest traded price up by `trail_amount`. The stop
    /// only ever moves in the favourable direction; a trailing stop-limit
    /// shifts its limit price by the same distance. Returns whether the stop
    /// moved.
    pub(crate) fn trail(&mut self, high: u64, low: u64) -> bool {
        if !self.order_type.is_trailing() {
            return false;
        }

        let new_stop = match self.side {
            OrderSide::Ask => {
                let candidate = high.saturating_sub(self.trail_amount);
                if candidate <= self.stop_price {
                    return false;
                }
                candidate
            }
            OrderSide::Bid => {
                let candidate = low.saturating_add(self.trail_amount);
                if candidate >= self.stop_price {
                    return false;
                }
                candidate
            }
        };

        if self.order_type == OrderType::TrailingStopLimit {
            self.price = if new_stop > self.stop_price {
                self.price.saturating_add(new_stop - self.stop_price)
            } else {
                self.price.saturating_sub(self.stop_price - new_stop).max(1)
            };
        }
        self.stop_price = new_stop;
        true
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Order(id={}, symbol={}, {:?} {:?} {:?}, price={}, stop={}, qty={}/{} open)",
            self.id,
            self.symbol_id,
            self.side,
            self.order_type,
            self.time_in_force,
            self.price,
            self.stop_price,
            self.open_quantity,
            self.quantity,
        )
    }
}
