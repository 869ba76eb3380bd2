/// Domain Layer - Core Business Logic
///
/// Orders, the per-instrument order book, events and errors. Nothing in here
/// does I/O, spawns threads or logs; the application layer drives it.
///
/// ## Modules
/// - `order`: Order entity, side, type and time in force
/// - `orderbook`: Price levels and the matching order book
/// - `events`: Lifecycle events and the `EventHandler` trait
/// - `validation`: Market-wide order limits
/// - `error`: `MarketError`

pub mod error;
pub mod events;
pub mod order;
pub mod orderbook;
pub mod validation;

// Re-export key types
pub use error::{MarketError, RejectReason};
pub use events::{EventHandler, MarketEvent, NullEventHandler};
pub use order::{Order, OrderSide, OrderType, TimeInForce};
pub use orderbook::{EventBuffer, OrderBook, PriceLevel};
pub use validation::{OrderValidator, ValidationConfig, ValidationError};
