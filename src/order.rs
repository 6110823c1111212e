#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// The side this order would match against.
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OrderType {
    GoodTillCancel,
    GoodForDay,
    FillAndKill,
    FillOrKill,
    Market,
}

impl OrderType {
    /// Whether an unfilled remainder may stay in the book after the matching
    /// attempt that admitted the order.
    pub fn rests(self) -> bool {
        matches!(self, OrderType::GoodTillCancel | OrderType::GoodForDay)
    }
}

pub type Id = u64;
pub type Price = i32; // signed ticks
pub type Quantity = u64;

#[derive(Debug, Clone)]
pub struct Order {
    pub id: Id,
    pub order_type: OrderType,
    pub side: Side,
    pub price: Price,
    pub quantity: Quantity,
    pub executed_quantity: Quantity,
}

impl Order {
    pub fn new(order_type: OrderType, id: Id, side: Side, price: Price, quantity: Quantity) -> Self {
        Order {
            id,
            order_type,
            side,
            price,
            quantity,
            executed_quantity: 0,
        }
    }

    /// A market order carries no limit price of its own. The stored price is a
    /// placeholder that the book rewrites to the opposite side's worst resting
    /// price before the order touches a level.
    pub fn market(id: Id, side: Side, quantity: Quantity) -> Self {
        Order::new(OrderType::Market, id, side, 0, quantity)
    }

    pub fn remaining_quantity(&self) -> Quantity {
        self.quantity - self.executed_quantity
    }

    pub fn is_filled(&self) -> bool {
        self.remaining_quantity() == 0
    }
}

pub mod book;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_quantity_tracks_fills() {
        let mut order = Order::new(OrderType::GoodTillCancel, 1, Side::Buy, 100, 10);
        assert_eq!(order.remaining_quantity(), 10);
        assert!(!order.is_filled());

        order.executed_quantity += 4;
        assert_eq!(order.remaining_quantity(), 6);

        order.executed_quantity += 6;
        assert_eq!(order.remaining_quantity(), 0);
        assert!(order.is_filled(), "order with no remainder should be filled");
    }

    #[test]
    fn only_good_till_cancel_and_good_for_day_rest() {
        assert!(OrderType::GoodTillCancel.rests());
        assert!(OrderType::GoodForDay.rests());
        assert!(!OrderType::FillAndKill.rests());
        assert!(!OrderType::FillOrKill.rests());
        assert!(!OrderType::Market.rests());
    }

    #[test]
    fn opposite_side() {
        assert_eq!(Side::Buy.opposite(), Side::Sell);
        assert_eq!(Side::Sell.opposite(), Side::Buy);
    }
}
