//! Trade representation produced by the matching engine.
//!
//! A Trade links the buy and the sell order that were matched, along with the
//! execution price, quantity, the side that provided liquidity (maker), and a
//! timestamp.

use crate::order;
use time::OffsetDateTime;

/// A single execution between a buy and a sell order.
#[derive(Debug, Clone)]
pub struct Trade {
    /// The buy order involved in the trade.
    pub bid_order_id: order::Id,
    /// The sell order involved in the trade.
    pub ask_order_id: order::Id,
    /// Whether the buy side was the maker (i.e., provided resting liquidity).
    pub is_bid_maker: bool,
    /// Execution price of the trade.
    pub price: order::Price,
    /// Executed quantity for this trade.
    pub quantity: order::Quantity,
    /// UTC timestamp when the trade was generated.
    pub timestamp: OffsetDateTime,
}
