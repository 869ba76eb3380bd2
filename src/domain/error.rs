//! Market error taxonomy
//!
//! Every variant is local and recoverable: the operation that returned it left
//! the order book exactly as it was. Internal invariant violations are not
//! errors; they panic and take the owning worker down.

use super::validation::ValidationError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why an otherwise valid order was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    /// A fill-or-kill order could not be filled completely
    InsufficientLiquidity,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::InsufficientLiquidity => write!(f, "insufficient liquidity"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarketError {
    #[error("Symbol {0} not found")]
    SymbolNotFound(u32),

    #[error("Order {order_id} not found in symbol {symbol_id}")]
    OrderNotFound { symbol_id: u32, order_id: u64 },

    #[error("Symbol {0} already exists")]
    SymbolAlreadyExists(u32),

    #[error("Order {order_id} already exists in symbol {symbol_id}")]
    OrderAlreadyExists { symbol_id: u32, order_id: u64 },

    #[error("Invalid order: {0}")]
    InvalidOrder(#[from] ValidationError),

    #[error("Order {order_id} rejected: {reason}")]
    Rejected { order_id: u64, reason: RejectReason },

    /// The worker owning the symbol has stopped
    #[error("Worker {0} is unavailable")]
    WorkerUnavailable(usize),
}

impl MarketError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            MarketError::SymbolNotFound(_) | MarketError::OrderNotFound { .. }
        )
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(
            self,
            MarketError::SymbolAlreadyExists(_) | MarketError::OrderAlreadyExists { .. }
        )
    }

    /// Short label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            MarketError::SymbolNotFound(_) | MarketError::OrderNotFound { .. } => "not_found",
            MarketError::SymbolAlreadyExists(_) | MarketError::OrderAlreadyExists { .. } => {
                "already_exists"
            }
            MarketError::InvalidOrder(_) => "invalid_order",
            MarketError::Rejected { .. } => "rejected",
            MarketError::WorkerUnavailable(_) => "worker_unavailable",
        }
    }
}
