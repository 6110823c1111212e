//! Scripted order-flow format.
//!
//! A script is a text file with one record per line driving the engine:
//!
//! - `A <side:B|S> <type> <price> <quantity> <orderId>` submits an order,
//! - `M <orderId> <side:B|S> <price> <quantity>` replaces an order,
//! - `C <orderId>` cancels an order,
//! - `R <totalCount> <bidLevels> <askLevels>` asserts the final book totals.
//!
//! `<type>` is spelled `GoodTillCancel`, `GoodForDay`, `FillAndKill`,
//! `FillOrKill`, or `Market`; a market order's price column is carried but
//! ignored. Action records that do not parse are skipped. The `R` record is
//! mandatory and must be the last line of the script.

use crate::engine::Engine;
use crate::order::{Id, Order, OrderType, Price, Quantity, Side};
use thiserror::Error;
use tracing::warn;

/// A single parsed action record.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Record {
    Add {
        order_type: OrderType,
        side: Side,
        price: Price,
        quantity: Quantity,
        id: Id,
    },
    Modify {
        id: Id,
        side: Side,
        price: Price,
        quantity: Quantity,
    },
    Cancel {
        id: Id,
    },
}

/// Book totals, as asserted by the terminal `R` record and as observed after
/// a replay.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Totals {
    /// Number of resting orders.
    pub orders: usize,
    /// Number of populated bid levels.
    pub bid_levels: usize,
    /// Number of populated ask levels.
    pub ask_levels: usize,
}

/// A fully parsed script: the action records plus the terminal assertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    pub records: Vec<Record>,
    pub expected: Totals,
}

/// Script parsing and replay errors.
#[derive(Error, Debug)]
pub enum Error {
    #[error("script has no terminal R record")]
    MissingResult,
    #[error("R record on line {0} must be the last line of the script")]
    ResultNotLast(usize),
    #[error("malformed R record on line {0}")]
    MalformedResult(usize),
    #[error("script assertion failed: expected {expected:?}, got {actual:?}")]
    AssertionFailed { expected: Totals, actual: Totals },
    #[error(transparent)]
    Book(#[from] crate::order::book::Error),
}

/// Parse a script, skipping malformed action records.
pub fn parse(input: &str) -> Result<Script, Error> {
    let mut records = Vec::new();

    let mut lines = input.lines().enumerate();
    while let Some((number, line)) = lines.next() {
        let line = line.trim();
        if line.is_empty() {
            break;
        }

        if line.starts_with('R') {
            let expected =
                parse_totals(line).ok_or_else(|| Error::MalformedResult(number + 1))?;
            if let Some((trailing, _)) = lines.find(|(_, rest)| !rest.trim().is_empty()) {
                return Err(Error::ResultNotLast(trailing + 1));
            }
            return Ok(Script { records, expected });
        }

        match parse_record(line) {
            Some(record) => records.push(record),
            None => warn!(line = number + 1, "skipping malformed script record"),
        }
    }

    Err(Error::MissingResult)
}

/// Apply every record of a script through the engine façade and return the
/// observed final totals. Trades are generated and dropped; a script verifies
/// book state, not executions.
pub fn replay(engine: &Engine, script: &Script) -> Result<Totals, Error> {
    for record in &script.records {
        match *record {
            Record::Add {
                order_type,
                side,
                price,
                quantity,
                id,
            } => {
                let order = match order_type {
                    OrderType::Market => Order::market(id, side, quantity),
                    _ => Order::new(order_type, id, side, price, quantity),
                };
                engine.add_order(order)?;
            }
            Record::Modify {
                id,
                side,
                price,
                quantity,
            } => {
                engine.modify_order(id, side, price, quantity)?;
            }
            Record::Cancel { id } => engine.cancel_order(id),
        }
    }

    let depth = engine.snapshot();
    Ok(Totals {
        orders: engine.len(),
        bid_levels: depth.bids.len(),
        ask_levels: depth.asks.len(),
    })
}

/// Parse and replay `input`, verifying the terminal assertion.
pub fn verify(engine: &Engine, input: &str) -> Result<Totals, Error> {
    let script = parse(input)?;
    let actual = replay(engine, &script)?;
    if actual != script.expected {
        return Err(Error::AssertionFailed {
            expected: script.expected,
            actual,
        });
    }
    Ok(actual)
}

fn parse_totals(line: &str) -> Option<Totals> {
    let mut parts = line.split_whitespace();
    if parts.next()? != "R" {
        return None;
    }
    let totals = Totals {
        orders: parts.next()?.parse().ok()?,
        bid_levels: parts.next()?.parse().ok()?,
        ask_levels: parts.next()?.parse().ok()?,
    };
    if parts.next().is_some() {
        return None;
    }
    Some(totals)
}

fn parse_record(line: &str) -> Option<Record> {
    let mut parts = line.split_whitespace();
    let record = match parts.next()? {
        "A" => {
            let side = parse_side(parts.next()?)?;
            let order_type = parse_order_type(parts.next()?)?;
            let price = parts.next()?.parse().ok()?;
            let quantity = parse_quantity(parts.next()?)?;
            let id = parts.next()?.parse().ok()?;
            Record::Add {
                order_type,
                side,
                price,
                quantity,
                id,
            }
        }
        "M" => {
            let id = parts.next()?.parse().ok()?;
            let side = parse_side(parts.next()?)?;
            let price = parts.next()?.parse().ok()?;
            let quantity = parse_quantity(parts.next()?)?;
            Record::Modify {
                id,
                side,
                price,
                quantity,
            }
        }
        "C" => Record::Cancel {
            id: parts.next()?.parse().ok()?,
        },
        _ => return None,
    };
    if parts.next().is_some() {
        return None;
    }
    Some(record)
}

fn parse_side(token: &str) -> Option<Side> {
    match token {
        "B" => Some(Side::Buy),
        "S" => Some(Side::Sell),
        _ => None,
    }
}

fn parse_order_type(token: &str) -> Option<OrderType> {
    match token {
        "GoodTillCancel" => Some(OrderType::GoodTillCancel),
        "GoodForDay" => Some(OrderType::GoodForDay),
        "FillAndKill" => Some(OrderType::FillAndKill),
        "FillOrKill" => Some(OrderType::FillOrKill),
        "Market" => Some(OrderType::Market),
        _ => None,
    }
}

fn parse_quantity(token: &str) -> Option<Quantity> {
    match token.parse().ok()? {
        0 => None,
        quantity => Some(quantity),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;

    fn engine() -> Engine {
        Engine::new(&SessionConfig::default()).expect("engine should start")
    }

    fn run(input: &str) -> Result<Totals, Error> {
        verify(&engine(), input)
    }

    #[test]
    fn parses_every_record_kind() {
        let script = parse(
            "A B GoodTillCancel 100 10 1\n\
             A S Market 0 5 2\n\
             M 1 S 110 4\n\
             C 1\n\
             R 0 0 0\n",
        )
        .expect("script should parse");

        assert_eq!(
            script.records,
            vec![
                Record::Add {
                    order_type: OrderType::GoodTillCancel,
                    side: Side::Buy,
                    price: 100,
                    quantity: 10,
                    id: 1,
                },
                Record::Add {
                    order_type: OrderType::Market,
                    side: Side::Sell,
                    price: 0,
                    quantity: 5,
                    id: 2,
                },
                Record::Modify {
                    id: 1,
                    side: Side::Sell,
                    price: 110,
                    quantity: 4,
                },
                Record::Cancel { id: 1 },
            ],
            "parsed records mismatch: got {:?}",
            script.records
        );
        assert_eq!(
            script.expected,
            Totals {
                orders: 0,
                bid_levels: 0,
                ask_levels: 0
            }
        );
    }

    #[test]
    fn malformed_action_records_are_skipped() {
        let script = parse(
            "A B GoodTillCancel 100 10 1\n\
             A X GoodTillCancel 100 10 2\n\
             A B NotAType 100 10 3\n\
             A B GoodTillCancel 100 0 4\n\
             Q what\n\
             R 1 1 0\n",
        )
        .expect("valid records should survive the bad ones");

        assert_eq!(
            script.records.len(),
            1,
            "only the first record is valid, got {:?}",
            script.records
        );
    }

    #[test]
    fn missing_result_record_is_an_error() {
        assert!(matches!(
            parse("A B GoodTillCancel 100 10 1\n"),
            Err(Error::MissingResult)
        ));
        assert!(matches!(parse(""), Err(Error::MissingResult)));
    }

    #[test]
    fn result_record_must_be_last() {
        let err = parse(
            "A B GoodTillCancel 100 10 1\n\
             R 1 1 0\n\
             C 1\n",
        )
        .unwrap_err();
        assert!(matches!(err, Error::ResultNotLast(3)), "got {:?}", err);
    }

    #[test]
    fn malformed_result_record_is_an_error() {
        assert!(matches!(
            parse("R 1 1\n"),
            Err(Error::MalformedResult(1))
        ));
        assert!(matches!(
            parse("R one 1 0\n"),
            Err(Error::MalformedResult(1))
        ));
    }

    #[test]
    fn scenario_good_till_cancel_match() {
        let totals = run(
            "A B GoodTillCancel 100 10 1\n\
             A S GoodTillCancel 100 10 2\n\
             R 0 0 0\n",
        )
        .expect("full cross should leave an empty book");
        assert_eq!(
            totals,
            Totals {
                orders: 0,
                bid_levels: 0,
                ask_levels: 0
            }
        );
    }

    #[test]
    fn scenario_fill_and_kill_discards_residual() {
        run(
            "A S GoodTillCancel 100 10 1\n\
             A B FillAndKill 100 15 2\n\
             R 0 0 0\n",
        )
        .expect("FAK takes the partial fill and leaves nothing resting");
    }

    #[test]
    fn scenario_fill_or_kill_hit() {
        run(
            "A S GoodTillCancel 100 10 1\n\
             A S GoodTillCancel 100 5 2\n\
             A B FillOrKill 100 15 3\n\
             R 0 0 0\n",
        )
        .expect("exactly sufficient liquidity fills the FOK");
    }

    #[test]
    fn scenario_fill_or_kill_miss() {
        run(
            "A S GoodTillCancel 100 10 1\n\
             A B FillOrKill 100 15 2\n\
             R 1 0 1\n",
        )
        .expect("under-fillable FOK leaves the resting ask untouched");
    }

    #[test]
    fn scenario_market_order_fully_matches() {
        run(
            "A S GoodTillCancel 100 10 1\n\
             A B Market 0 10 2\n\
             R 0 0 0\n",
        )
        .expect("market order consumes the ask");
    }

    #[test]
    fn scenario_market_order_partial_fill_discards_rest() {
        run(
            "A S GoodTillCancel 100 10 1\n\
             A B Market 0 15 2\n\
             R 0 0 0\n",
        )
        .expect("market residual must not rest");
    }

    #[test]
    fn scenario_sequential_market_orders() {
        run(
            "A S GoodTillCancel 100 5 1\n\
             A S GoodTillCancel 101 5 2\n\
             A B Market 0 5 3\n\
             A B Market 0 5 4\n\
             R 0 0 0\n",
        )
        .expect("each market order takes the best remaining level");
    }

    #[test]
    fn scenario_cancel_success() {
        run(
            "A B GoodTillCancel 100 10 1\n\
             C 1\n\
             R 0 0 0\n",
        )
        .expect("cancel empties the book");
    }

    #[test]
    fn scenario_modify_side() {
        run(
            "A B GoodTillCancel 100 10 1\n\
             M 1 S 110 10\n\
             R 1 0 1\n",
        )
        .expect("modify moves the order to the ask side");
    }

    #[test]
    fn scenario_multiple_limit_orders_at_same_price() {
        run(
            "A B GoodTillCancel 100 10 1\n\
             A B GoodTillCancel 100 5 2\n\
             A S GoodTillCancel 100 12 3\n\
             R 1 1 0\n",
        )
        .expect("taker consumes the queue in FIFO order and leaves the tail");
    }

    #[test]
    fn scenario_empty_book() {
        run("R 0 0 0\n").expect("an empty script verifies an empty book");
    }

    #[test]
    fn failed_assertion_reports_both_totals() {
        let err = run(
            "A B GoodTillCancel 100 10 1\n\
             R 0 0 0\n",
        )
        .unwrap_err();
        match err {
            Error::AssertionFailed { expected, actual } => {
                assert_eq!(expected.orders, 0);
                assert_eq!(actual.orders, 1, "one bid is resting, got {:?}", actual);
            }
            other => panic!("expected AssertionFailed, got {:?}", other),
        }
    }
}
