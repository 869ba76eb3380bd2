//! Market - Single-threaded Symbol Registry
//!
//! Owns one `OrderBook` per symbol and the one `EventHandler` bound to it.
//! Every mutating call validates, forwards to the symbol's book and then
//! replays the book's events against the handler, synchronously and in the
//! order they were produced.
//!
//! ## Usage
//! ```rust
//! use rapid_match::application::Market;
//! use rapid_match::domain::{NullEventHandler, Order, TimeInForce};
//!
//! let mut market = Market::new(NullEventHandler);
//! market.add_symbol(1, "BTC-USDT").unwrap();
//! market
//!     .add_order(Order::limit_bid(1, 1, 50_000, 10, TimeInForce::GTC).unwrap())
//!     .unwrap();
//! assert_eq!(market.order_book(1).unwrap().best_bid(), Some(50_000));
//! ```

use crate::domain::error::MarketError;
use crate::domain::events::{EventHandler, MarketEvent, SymbolAdded, SymbolDeleted};
use crate::domain::order::Order;
use crate::domain::orderbook::{EventBuffer, OrderBook};
use crate::domain::validation::OrderValidator;
use std::collections::HashMap;
use tracing::{debug, info, warn};

pub struct Market<H: EventHandler> {
    books: HashMap<u32, OrderBook>,
    handler: H,
    validator: OrderValidator,
    // 复用的事件缓冲区
    events: EventBuffer,
    /// Matches executed since creation
    execution_count: u64,
}

impl<H: EventHandler> Market<H> {
    pub fn new(handler: H) -> Self {
        Self::with_validator(handler, OrderValidator::new())
    }

    pub fn with_validator(handler: H, validator: OrderValidator) -> Self {
        Self {
            books: HashMap::new(),
            handler,
            validator,
            events: EventBuffer::new(),
            execution_count: 0,
        }
    }

    /// Creates an empty order book for `symbol_id`
    pub fn add_symbol(&mut self, symbol_id: u32, name: &str) -> Result<(), MarketError> {
        if self.books.contains_key(&symbol_id) {
            warn!(symbol_id, "symbol already exists");
            return Err(MarketError::SymbolAlreadyExists(symbol_id));
        }

        self.books.insert(symbol_id, OrderBook::new(symbol_id, name));
        info!(symbol_id, name, "symbol added");

        self.handler.handle_event(&MarketEvent::SymbolAdded(SymbolAdded {
            symbol_id,
            name: name.to_string(),
        }));
        Ok(())
    }

    /// Removes a symbol, cancelling every order it still holds
    ///
    /// Each resident order is reported through `OrderDeleted` before the
    /// final `SymbolDeleted`.
    pub fn delete_symbol(&mut self, symbol_id: u32) -> Result<(), MarketError> {
        let mut book = self
            .books
            .remove(&symbol_id)
            .ok_or(MarketError::SymbolNotFound(symbol_id))?;

        self.events.clear();
        book.clear(&mut self.events);
        let cancelled = self.events.len();
        self.dispatch();

        self.handler
            .handle_event(&MarketEvent::SymbolDeleted(SymbolDeleted { symbol_id }));
        info!(symbol_id, cancelled, "symbol deleted");
        Ok(())
    }

    #[inline]
    pub fn has_symbol(&self, symbol_id: u32) -> bool {
        self.books.contains_key(&symbol_id)
    }

    pub fn symbol_name(&self, symbol_id: u32) -> Option<&str> {
        self.books.get(&symbol_id).map(OrderBook::name)
    }

    pub fn symbol_count(&self) -> usize {
        self.books.len()
    }

    pub fn order_book(&self, symbol_id: u32) -> Option<&OrderBook> {
        self.books.get(&symbol_id)
    }

    /// Validates and submits an order to its symbol's book
    ///
    /// # Errors
    /// * `SymbolNotFound` for an unknown symbol
    /// * `InvalidOrder` when the order breaks the configured limits
    /// * `OrderAlreadyExists` / `Rejected` from the book
    ///
    /// `OrderAlreadyExists` only covers orders resident in the same symbol's
    /// book; global id uniqueness is the caller's contract.
    pub fn add_order(&mut self, order: Order) -> Result<(), MarketError> {
        let symbol_id = order.symbol_id();
        let order_id = order.id();

        let book = self
            .books
            .get_mut(&symbol_id)
            .ok_or(MarketError::SymbolNotFound(symbol_id))?;

        if let Err(e) = self.validator.validate(&order) {
            warn!(symbol_id, order_id, error = %e, "order failed validation");
            return Err(e.into());
        }

        self.events.clear();
        if let Err(e) = book.add_order(order, &mut self.events) {
            warn!(symbol_id, order_id, error = %e, "order refused");
            return Err(e);
        }

        debug!(symbol_id, order_id, events = self.events.len(), "order processed");
        self.dispatch();
        Ok(())
    }

    pub fn delete_order(&mut self, symbol_id: u32, order_id: u64) -> Result<(), MarketError> {
        let book = self
            .books
            .get_mut(&symbol_id)
            .ok_or(MarketError::SymbolNotFound(symbol_id))?;

        self.events.clear();
        book.delete_order(order_id, &mut self.events)?;

        debug!(symbol_id, order_id, "order deleted");
        self.dispatch();
        Ok(())
    }

    /// Matches executed so far (one per maker/taker pair)
    #[inline]
    pub fn execution_count(&self) -> u64 {
        self.execution_count
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    pub fn into_handler(self) -> H {
        self.handler
    }

    /// 按产生顺序分发事件
    fn dispatch(&mut self) {
        for event in self.events.drain(..) {
            if let MarketEvent::ExecutedOrder(executed) = &event {
                if executed.order.is_bid() {
                    self.execution_count += 1;
                }
            }
            self.handler.handle_event(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::TimeInForce;
    use crate::domain::validation::ValidationConfig;
    use crate::interfaces::handlers::RecordingEventHandler;

    fn market() -> Market<RecordingEventHandler> {
        let mut market = Market::new(RecordingEventHandler::default());
        market.add_symbol(1, "BTC-USDT").unwrap();
        market
    }

    #[test]
    fn test_symbol_lifecycle() {
        let mut market = market();
        assert!(market.has_symbol(1));
        assert_eq!(market.symbol_name(1), Some("BTC-USDT"));
        assert_eq!(
            market.add_symbol(1, "dup"),
            Err(MarketError::SymbolAlreadyExists(1))
        );

        market.delete_symbol(1).unwrap();
        assert!(!market.has_symbol(1));
        assert_eq!(market.delete_symbol(1), Err(MarketError::SymbolNotFound(1)));

        assert_eq!(market.handler().kinds(), vec!["SymbolAdded", "SymbolDeleted"]);
    }

    #[test]
    fn test_unknown_symbol_is_not_found() {
        let mut market = market();
        let order = Order::limit_bid(1, 9, 100, 1, TimeInForce::GTC).unwrap();
        assert_eq!(market.add_order(order), Err(MarketError::SymbolNotFound(9)));
        assert_eq!(market.delete_order(9, 1), Err(MarketError::SymbolNotFound(9)));
    }

    #[test]
    fn test_events_dispatched_in_order() {
        let mut market = market();
        market
            .add_order(Order::limit_bid(101, 1, 50_000, 10, TimeInForce::GTC).unwrap())
            .unwrap();
        market
            .add_order(Order::limit_ask(102, 1, 50_000, 10, TimeInForce::GTC).unwrap())
            .unwrap();

        assert_eq!(
            market.handler().kinds(),
            vec![
                "SymbolAdded",
                "OrderAdded",
                "ExecutedOrder",
                "ExecutedOrder",
                "OrderDeleted",
                "OrderDeleted"
            ]
        );
        assert_eq!(market.execution_count(), 1);
    }

    #[test]
    fn test_validation_limits_apply() {
        let validator = OrderValidator::with_config(ValidationConfig {
            max_quantity: 100,
            ..ValidationConfig::default()
        });
        let mut market = Market::with_validator(RecordingEventHandler::default(), validator);
        market.add_symbol(1, "BTC-USDT").unwrap();

        let order = Order::limit_bid(1, 1, 100, 101, TimeInForce::GTC).unwrap();
        assert!(matches!(
            market.add_order(order),
            Err(MarketError::InvalidOrder(_))
        ));
        assert!(market.order_book(1).unwrap().is_empty());
    }

    #[test]
    fn test_delete_symbol_cascades() {
        let mut market = market();
        market
            .add_order(Order::limit_bid(1, 1, 99, 5, TimeInForce::GTC).unwrap())
            .unwrap();
        market
            .add_order(Order::stop_ask(2, 1, 90, 5, TimeInForce::GTC).unwrap())
            .unwrap();
        market.handler_mut().clear();

        market.delete_symbol(1).unwrap();
        assert_eq!(
            market.handler().kinds(),
            vec!["OrderDeleted", "OrderDeleted", "SymbolDeleted"]
        );
    }

    #[test]
    fn test_rejected_order_emits_nothing() {
        let mut market = market();
        market
            .add_order(Order::limit_ask(3, 1, 100, 5, TimeInForce::GTC).unwrap())
            .unwrap();
        market.handler_mut().clear();

        let fok = Order::limit_bid(4, 1, 100, 10, TimeInForce::FOK).unwrap();
        assert!(matches!(
            market.add_order(fok),
            Err(MarketError::Rejected { order_id: 4, .. })
        ));
        assert!(market.handler().events().is_empty());
    }
}
