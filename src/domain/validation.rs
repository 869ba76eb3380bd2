//! Order Validator - Business Rule Validation
//!
//! Order factories already reject zero prices and quantities. The validator
//! adds the configurable market-wide limits that an order must respect before
//! it reaches an order book.
//!
//! ## Validation Rules
//! - Limit price (where present) must lie in `[min_price, max_price]`
//! - Stop price (where present) must lie in `[min_price, max_price]`
//! - Quantity must lie in `[min_quantity, max_quantity]`
//!
//! ## Usage
//! ```rust
//! use rapid_match::domain::order::{Order, TimeInForce};
//! use rapid_match::domain::validation::OrderValidator;
//!
//! let validator = OrderValidator::new();
//! let order = Order::limit_bid(1, 1, 100, 10, TimeInForce::GTC).unwrap();
//! assert!(validator.validate(&order).is_ok());
//! ```

use super::order::Order;
use thiserror::Error;

/// Validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Price is zero
    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    /// Quantity is zero
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    /// Stop price is zero on a stop variant
    #[error("Invalid stop price: {0}")]
    InvalidStopPrice(String),

    /// Trail amount is zero on a trailing variant
    #[error("Invalid trail amount: {0}")]
    InvalidTrailAmount(String),

    /// Price exceeds configured range
    #[error("Price out of range: {0}")]
    PriceOutOfRange(String),

    /// Quantity exceeds configured range
    #[error("Quantity out of range: {0}")]
    QuantityOutOfRange(String),
}

/// Order validation configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationConfig {
    /// Minimum price (inclusive)
    pub min_price: u64,

    /// Maximum price (inclusive)
    pub max_price: u64,

    /// Minimum quantity (inclusive)
    pub min_quantity: u64,

    /// Maximum quantity (inclusive)
    pub max_quantity: u64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_price: 1,
            max_price: u64::MAX,
            min_quantity: 1,
            max_quantity: 1_000_000_000,
        }
    }
}

/// Order validator
///
/// Validates orders according to the configured market limits.
#[derive(Debug, Clone, Default)]
pub struct OrderValidator {
    config: ValidationConfig,
}

impl OrderValidator {
    /// Creates a new validator with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new validator with custom configuration
    pub fn with_config(config: ValidationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// Validates an order
    ///
    /// # Returns
    /// * `Ok(())` if the order is valid
    /// * `Err(ValidationError)` naming the first rule that failed
    pub fn validate(&self, order: &Order) -> Result<(), ValidationError> {
        if order.order_type().has_limit_price() {
            self.validate_price(order.price())?;
        }

        if order.order_type().is_stop() {
            self.validate_price(order.stop_price())?;
        }

        self.validate_quantity(order.quantity())?;

        Ok(())
    }

    /// Validates a price against the configured range
    fn validate_price(&self, price: u64) -> Result<(), ValidationError> {
        if price == 0 {
            return Err(ValidationError::InvalidPrice(
                "Price must be greater than zero".to_string(),
            ));
        }

        if price < self.config.min_price {
            return Err(ValidationError::PriceOutOfRange(format!(
                "Price {} is below minimum {}",
                price, self.config.min_price
            )));
        }

        if price > self.config.max_price {
            return Err(ValidationError::PriceOutOfRange(format!(
                "Price {} exceeds maximum {}",
                price, self.config.max_price
            )));
        }

        Ok(())
    }

    /// Validates the quantity
    fn validate_quantity(&self, quantity: u64) -> Result<(), ValidationError> {
        if quantity == 0 {
            return Err(ValidationError::InvalidQuantity(
                "Quantity must be greater than zero".to_string(),
            ));
        }

        if quantity < self.config.min_quantity {
            return Err(ValidationError::QuantityOutOfRange(format!(
                "Quantity {} is below minimum {}",
                quantity, self.config.min_quantity
            )));
        }

        if quantity > self.config.max_quantity {
            return Err(ValidationError::QuantityOutOfRange(format!(
                "Quantity {} exceeds maximum {}",
                quantity, self.config.max_quantity
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::TimeInForce;

    fn limited_validator() -> OrderValidator {
        OrderValidator::with_config(ValidationConfig {
            min_price: 100,
            max_price: 10_000,
            min_quantity: 1,
            max_quantity: 1_000,
        })
    }

    #[test]
    fn test_valid_order() {
        let validator = limited_validator();
        let order = Order::limit_bid(1, 1, 5_000, 10, TimeInForce::GTC).unwrap();
        assert!(validator.validate(&order).is_ok());
    }

    #[test]
    fn test_price_below_minimum() {
        let validator = limited_validator();
        let order = Order::limit_ask(1, 1, 50, 10, TimeInForce::GTC).unwrap();
        assert!(matches!(
            validator.validate(&order),
            Err(ValidationError::PriceOutOfRange(_))
        ));
    }

    #[test]
    fn test_price_above_maximum() {
        let validator = limited_validator();
        let order = Order::limit_ask(1, 1, 10_001, 10, TimeInForce::GTC).unwrap();
        assert!(matches!(
            validator.validate(&order),
            Err(ValidationError::PriceOutOfRange(_))
        ));
    }

    #[test]
    fn test_stop_price_is_range_checked() {
        let validator = limited_validator();
        let order = Order::stop_bid(1, 1, 20_000, 10, TimeInForce::GTC).unwrap();
        assert!(matches!(
            validator.validate(&order),
            Err(ValidationError::PriceOutOfRange(_))
        ));
    }

    #[test]
    fn test_market_order_skips_price_checks() {
        let validator = limited_validator();
        let order = Order::market_ask(1, 1, 10).unwrap();
        assert!(validator.validate(&order).is_ok());
    }

    #[test]
    fn test_quantity_above_maximum() {
        let validator = limited_validator();
        let order = Order::limit_bid(1, 1, 5_000, 1_001, TimeInForce::GTC).unwrap();
        assert!(matches!(
            validator.validate(&order),
            Err(ValidationError::QuantityOutOfRange(_))
        ));
    }

    #[test]
    fn test_error_display() {
        let err = ValidationError::InvalidPrice("Price must be greater than zero".to_string());
        assert_eq!(err.to_string(), "Invalid price: Price must be greater than zero");
    }
}
