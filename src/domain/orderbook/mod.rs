//! Order book for a single instrument
//!
//! - `price_level`: slab-backed FIFO queue per price
//! - `book`: the two book sides, stop index and matching

mod book;
mod price_level;

pub use book::{EventBuffer, OrderBook};
pub use price_level::PriceLevel;
