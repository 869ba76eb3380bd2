/// Application Layer - Market Orchestration
///
/// Drives the domain layer: symbol registry and event dispatch for one
/// thread (`Market`), and the symbol-partitioned worker pool on top of it
/// (`ConcurrentMarket`).
///
/// ## Modules
/// - `market`: Single-threaded `Market`
/// - `concurrent_market`: `ConcurrentMarket` and `MarketConfig`

pub mod concurrent_market;
pub mod market;

// Re-export key services
pub use concurrent_market::{ConcurrentMarket, MarketConfig};
pub use market::Market;
