//! Price-time priority limit order book.
//!
//! The book keeps two BTreeMaps of price levels (bids keyed ascending with the
//! best bid at the last key, asks with the best ask at the first key). Each
//! price level maintains a FIFO queue of orders via indices into a Slab,
//! avoiding frequent allocations and allowing O(1) insertion/removal within a
//! level. A HashMap from order id to slab index is the single source of truth
//! for which orders exist; cancel and modify locate orders through it, never
//! by searching levels. Matching crosses the best bid and best ask while
//! prices overlap.

use crate::order::{Id, Order, OrderType, Price, Quantity, Side};
use crate::trade::Trade;
use slab::Slab;
use std::cmp;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::debug;

/// Aggregated depth at a single price level.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DepthItem {
    /// Price level.
    pub price: Price,
    /// Total resting quantity at this price level.
    pub quantity: Quantity,
}

/// A snapshot of the price levels on both sides of the book.
///
/// The snapshot is an owned copy; it stays valid while the book keeps
/// mutating.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Depth {
    /// Bids in descending price order.
    pub bids: Vec<DepthItem>,
    /// Asks in ascending price order.
    pub asks: Vec<DepthItem>,
}

/// Order book input errors.
///
/// Structural rejections (duplicate id, a market order against an empty
/// opposite side, an under-fillable fill-or-kill) are not errors: they return
/// an empty trade list without touching the book.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("order #{0} has zero quantity")]
    /// Orders must be submitted with a strictly positive quantity.
    InvalidQuantity(Id),
}

/// Aggregated state for a single price level.
///
/// Keeps the head/tail of a doubly-linked list of orders (by slab index), as
/// well as cumulative quantity and order count for quick depth queries and
/// fill-or-kill feasibility checks.
#[derive(Debug, Default)]
struct Level {
    head: Option<usize>,
    tail: Option<usize>,
    total_quantity: Quantity,
    total_orders: usize,
}

impl Level {
    /// Append an order node to the back of the level's FIFO queue and update
    /// aggregates. The `idx` must reference a valid entry in `orders`.
    fn push(&mut self, orders: &mut Slab<OrderNode>, idx: usize) {
        match self.tail {
            Some(tail) => {
                orders[tail].next = Some(idx);
                orders[idx].prev = Some(tail);
                self.tail = Some(idx);
            }
            None => {
                self.head = Some(idx);
                self.tail = Some(idx);
                orders[idx].prev = None;
            }
        }

        self.total_quantity += orders[idx].order.remaining_quantity();
        self.total_orders += 1;
    }

    /// Unlink a specific order node from the level's queue and update
    /// aggregates. The node must be currently linked in this level.
    fn remove(&mut self, orders: &mut Slab<OrderNode>, idx: usize) {
        let prev = orders[idx].prev;
        let next = orders[idx].next;

        if let Some(p) = prev {
            orders[p].next = next;
        } else {
            self.head = next;
        }
        if let Some(n) = next {
            orders[n].prev = prev;
        } else {
            self.tail = prev;
        }
        self.total_orders -= 1;
        self.total_quantity -= orders[idx].order.remaining_quantity();
        orders[idx].prev = None;
        orders[idx].next = None;
    }
}

/// Node representing an individual order stored in a slab and linked within a
/// price level's FIFO queue. `seq` records arrival order across the whole
/// book; the lower sequence at a cross is the maker and sets the trade price.
#[derive(Debug, Clone)]
struct OrderNode {
    order: Order,
    seq: u64,
    next: Option<usize>,
    prev: Option<usize>,
}

/// BTreeMap-backed order book implementing price-time priority.
#[derive(Debug, Default)]
pub struct Book {
    bids: BTreeMap<Price, Level>,
    asks: BTreeMap<Price, Level>,
    orders: Slab<OrderNode>,
    index: HashMap<Id, usize>,
    next_seq: u64,
}

impl Book {
    /// Create a new, empty book.
    pub fn new() -> Self {
        Book::default()
    }

    /// Number of resting orders.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn best_bid(&self) -> Option<Price> {
        self.bids.last_key_value().map(|(price, _)| *price)
    }

    pub fn best_ask(&self) -> Option<Price> {
        self.asks.first_key_value().map(|(price, _)| *price)
    }

    /// Gets a resting order by its id.
    pub fn get(&self, id: Id) -> Option<&Order> {
        let idx = self.index.get(&id)?;

        Some(&self.orders[*idx].order)
    }

    /// Submit an order and match it against the book.
    ///
    /// The order is inserted at the tail of its price level before the match
    /// loop runs, so time priority within a level is exact. Returns the trades
    /// generated by the submission, oldest first. Structural rejections
    /// (duplicate id, market order with no opposite liquidity, fill-or-kill
    /// that cannot fully fill) return an empty trade list and leave the book
    /// untouched.
    pub fn add(&mut self, mut order: Order) -> Result<Vec<Trade>, Error> {
        if order.quantity == 0 {
            return Err(Error::InvalidQuantity(order.id));
        }
        if self.index.contains_key(&order.id) {
            debug!(order_id = order.id, "add rejected, id already in the book");
            return Ok(Vec::new());
        }

        match order.order_type {
            // A market order crosses every opposite level, expressed by
            // rewriting its price to the opposite side's worst before
            // insertion. With no opposite liquidity it cannot fill at all.
            OrderType::Market => match self.worst_opposite(order.side) {
                Some(worst) => order.price = worst,
                None => {
                    debug!(order_id = order.id, "market order rejected, opposite side empty");
                    return Ok(Vec::new());
                }
            },
            OrderType::FillOrKill => {
                if !self.can_fully_fill(order.side, order.price, order.quantity) {
                    debug!(order_id = order.id, "fill-or-kill rejected, not fully fillable");
                    return Ok(Vec::new());
                }
            }
            _ => {}
        }

        let id = order.id;
        let order_type = order.order_type;
        self.insert(order);
        let trades = self.match_book();

        if !order_type.rests() {
            // The slab index may no longer be valid if the order fully filled,
            // so the residual is located through the directory.
            if let Some(idx) = self.index.get(&id).copied() {
                let residual = self.remove_order(idx);
                debug!(
                    order_id = id,
                    remaining = residual.remaining_quantity(),
                    "discarded non-resting residual"
                );
            }
        }

        Ok(trades)
    }

    /// Cancel a resting order by id, returning it. Unknown ids are a no-op:
    /// in a live feed, races between a client cancel and a fill are routine.
    pub fn cancel(&mut self, id: Id) -> Option<Order> {
        let idx = *self.index.get(&id)?;

        Some(self.remove_order(idx))
    }

    /// Cancel a batch of orders, skipping unknown ids. Returns how many were
    /// actually cancelled.
    pub fn cancel_many<I>(&mut self, ids: I) -> usize
    where
        I: IntoIterator<Item = Id>,
    {
        ids.into_iter().filter(|id| self.cancel(*id).is_some()).count()
    }

    /// Replace a resting order with new parameters, losing its time priority.
    ///
    /// The existing order is cancelled and a new order with the same id and
    /// the same order type is submitted, so the replacement joins the tail of
    /// its level and may trade immediately. Returns the trades of the
    /// re-submission; an unknown id returns an empty list.
    pub fn modify(
        &mut self,
        id: Id,
        side: Side,
        price: Price,
        quantity: Quantity,
    ) -> Result<Vec<Trade>, Error> {
        if quantity == 0 {
            return Err(Error::InvalidQuantity(id));
        }
        let idx = match self.index.get(&id) {
            Some(idx) => *idx,
            None => {
                debug!(order_id = id, "modify ignored, id not in the book");
                return Ok(Vec::new());
            }
        };

        // Only resting types can be present here, so the replacement keeps
        // GoodTillCancel/GoodForDay semantics.
        let order_type = self.orders[idx].order.order_type;
        self.remove_order(idx);
        self.add(Order::new(order_type, id, side, price, quantity))
    }

    /// Cancel every resting GoodForDay order. Invoked by the engine at the
    /// daily session cutoff.
    pub fn cancel_day_orders(&mut self) -> usize {
        let ids: Vec<Id> = self
            .orders
            .iter()
            .filter(|(_, node)| node.order.order_type == OrderType::GoodForDay)
            .map(|(_, node)| node.order.id)
            .collect();

        self.cancel_many(ids)
    }

    /// Return a snapshot of top-of-book depth up to `limit` levels per side.
    pub fn depth(&self, limit: usize) -> Depth {
        Depth {
            bids: self
                .bids
                .iter()
                .rev()
                .take(limit)
                .map(|(price, level)| DepthItem {
                    price: *price,
                    quantity: level.total_quantity,
                })
                .collect(),
            asks: self
                .asks
                .iter()
                .take(limit)
                .map(|(price, level)| DepthItem {
                    price: *price,
                    quantity: level.total_quantity,
                })
                .collect(),
        }
    }

    /// Full-depth snapshot of every level on both sides.
    pub fn snapshot(&self) -> Depth {
        self.depth(usize::MAX)
    }

    /// The worst resting price on the side opposite to `side`, if any.
    fn worst_opposite(&self, side: Side) -> Option<Price> {
        match side {
            Side::Buy => self.asks.last_key_value().map(|(price, _)| *price),
            Side::Sell => self.bids.first_key_value().map(|(price, _)| *price),
        }
    }

    /// Whether a taker of `quantity` at `price` could be fully satisfied by
    /// the opposite side. Walks level aggregates from the best price outward,
    /// so no per-order traversal is needed.
    fn can_fully_fill(&self, side: Side, price: Price, quantity: Quantity) -> bool {
        let mut needed = quantity;
        match side {
            Side::Buy => {
                for (level_price, level) in self.asks.iter() {
                    if *level_price > price {
                        break;
                    }
                    needed = needed.saturating_sub(level.total_quantity);
                    if needed == 0 {
                        return true;
                    }
                }
            }
            Side::Sell => {
                for (level_price, level) in self.bids.iter().rev() {
                    if *level_price < price {
                        break;
                    }
                    needed = needed.saturating_sub(level.total_quantity);
                    if needed == 0 {
                        return true;
                    }
                }
            }
        }

        needed == 0
    }

    /// Insert a new order at the tail of its price level, creating the level
    /// if absent, and record it in the directory with the next arrival
    /// sequence.
    fn insert(&mut self, order: Order) -> usize {
        let seq = self.next_seq;
        self.next_seq += 1;

        let idx = self.orders.insert(OrderNode {
            order,
            seq,
            next: None,
            prev: None,
        });
        self.index.insert(self.orders[idx].order.id, idx);
        let level = match self.orders[idx].order.side {
            Side::Buy => self.bids.entry(self.orders[idx].order.price).or_default(),
            Side::Sell => self.asks.entry(self.orders[idx].order.price).or_default(),
        };
        level.push(&mut self.orders, idx);

        idx
    }

    /// Unlink an order (by slab index) from its price level, drop the level if
    /// it emptied, and erase the order from the slab and the directory.
    fn remove_order(&mut self, idx: usize) -> Order {
        let side = self.orders[idx].order.side;
        let price = self.orders[idx].order.price;

        let level = match side {
            Side::Buy => self.bids.get_mut(&price).unwrap(),
            Side::Sell => self.asks.get_mut(&price).unwrap(),
        };
        level.remove(&mut self.orders, idx);
        if level.total_orders == 0 {
            match side {
                Side::Buy => self.bids.remove(&price),
                Side::Sell => self.asks.remove(&price),
            };
        }

        let node = self.orders.remove(idx);
        self.index.remove(&node.order.id);
        node.order
    }

    /// Execute `quantity` against the order at `idx`, keeping the level
    /// aggregate in step and removing the order once exhausted.
    fn fill(&mut self, idx: usize, quantity: Quantity) {
        let side = self.orders[idx].order.side;
        let price = self.orders[idx].order.price;

        let level = match side {
            Side::Buy => self.bids.get_mut(&price).unwrap(),
            Side::Sell => self.asks.get_mut(&price).unwrap(),
        };
        level.total_quantity -= quantity;
        self.orders[idx].order.executed_quantity += quantity;
        if self.orders[idx].order.is_filled() {
            self.remove_order(idx);
        }
    }

    /// Cross the best bid and best ask while their prices overlap.
    ///
    /// Each iteration trades the heads of the two best levels for the smaller
    /// remaining quantity; the head that arrived earlier is the maker and sets
    /// the trade price. Exhausted orders and emptied levels are removed as
    /// they occur, so the loop terminates with best bid strictly below best
    /// ask (or a side empty).
    fn match_book(&mut self) -> Vec<Trade> {
        let mut trades = Vec::new();

        loop {
            let (bid_price, bid_idx) = match self.bids.last_key_value() {
                Some((price, level)) => (*price, level.head.unwrap()),
                None => break,
            };
            let (ask_price, ask_idx) = match self.asks.first_key_value() {
                Some((price, level)) => (*price, level.head.unwrap()),
                None => break,
            };
            if bid_price < ask_price {
                break;
            }

            let quantity = cmp::min(
                self.orders[bid_idx].order.remaining_quantity(),
                self.orders[ask_idx].order.remaining_quantity(),
            );
            let is_bid_maker = self.orders[bid_idx].seq < self.orders[ask_idx].seq;
            let price = if is_bid_maker { bid_price } else { ask_price };
            trades.push(Trade {
                bid_order_id: self.orders[bid_idx].order.id,
                ask_order_id: self.orders[ask_idx].order.id,
                is_bid_maker,
                price,
                quantity,
                timestamp: OffsetDateTime::now_utc(),
            });
            self.fill(bid_idx, quantity);
            self.fill(ask_idx, quantity);
        }

        trades
    }
}
