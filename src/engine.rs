//! Engine façade: the public contract over the order book.
//!
//! All public operations serialize through one mutex around the book, so
//! callers on any thread observe a single linearization. Nothing blocks while
//! the lock is held; every operation is CPU-bound work on in-memory
//! containers. Construction starts the day-order expirer, a dedicated worker
//! thread that sleeps until the configured daily cutoff and then cancels every
//! resting GoodForDay order under the same lock. Dropping the engine signals
//! the worker through its condition variable and joins it.

use crate::config::SessionConfig;
use crate::order::book::{self, Book, Depth};
use crate::order::{Id, Order, Price, Quantity, Side};
use crate::trade::Trade;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use thiserror::Error;
use time::{Duration, OffsetDateTime, Time, UtcOffset};
use tracing::{debug, info};

/// Engine construction errors.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid session cutoff {0:?}, expected \"HH:MM\"")]
    /// The configured cutoff is not a valid wall-clock time.
    InvalidCutoff(String),
    #[error("invalid session utc offset {0}")]
    /// The configured UTC offset is out of range.
    InvalidUtcOffset(i8),
    #[error("failed to start the day-order expirer: {0}")]
    Spawn(#[from] std::io::Error),
}

/// The daily wall-clock instant at which GoodForDay orders expire.
#[derive(Debug, Copy, Clone)]
struct Cutoff {
    time: Time,
    offset: UtcOffset,
}

/// State shared between the façade and the expirer thread.
struct Shared {
    book: Mutex<Book>,
    /// Shutdown flag, paired with `wakeup` so the expirer can be interrupted
    /// mid-wait. Never held together with the book lock.
    shutdown: Mutex<bool>,
    wakeup: Condvar,
    cutoff: Cutoff,
}

/// Thread-safe matching engine for a single instrument.
pub struct Engine {
    shared: Arc<Shared>,
    expirer: Option<thread::JoinHandle<()>>,
}

impl Engine {
    /// Build an engine and start its day-order expirer.
    pub fn new(session: &SessionConfig) -> Result<Self, Error> {
        let time = parse_cutoff(&session.cutoff)?;
        let offset = UtcOffset::from_hms(session.offset, 0, 0)
            .map_err(|_| Error::InvalidUtcOffset(session.offset))?;

        let shared = Arc::new(Shared {
            book: Mutex::new(Book::new()),
            shutdown: Mutex::new(false),
            wakeup: Condvar::new(),
            cutoff: Cutoff { time, offset },
        });

        let worker = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("day-order-expirer".to_string())
                .spawn(move || run_expirer(&shared))?
        };

        Ok(Engine {
            shared,
            expirer: Some(worker),
        })
    }

    /// Submit an order; returns the trades it generated, possibly none.
    ///
    /// Structural rejections (duplicate id, market order against an empty
    /// opposite side, under-fillable fill-or-kill) come back as an empty trade
    /// list; a zero quantity is an input error.
    pub fn add_order(&self, order: Order) -> Result<Vec<Trade>, book::Error> {
        self.shared.book.lock().unwrap().add(order)
    }

    /// Cancel a resting order. Unknown ids are a silent no-op.
    pub fn cancel_order(&self, id: Id) {
        if self.shared.book.lock().unwrap().cancel(id).is_none() {
            debug!(order_id = id, "cancel ignored, unknown id");
        }
    }

    /// Cancel a batch of orders under a single lock acquisition, skipping
    /// unknown ids. Returns how many were cancelled.
    pub fn cancel_orders(&self, ids: &[Id]) -> usize {
        self.shared.book.lock().unwrap().cancel_many(ids.iter().copied())
    }

    /// Replace a resting order, losing its time priority; returns the trades
    /// of the re-submission. Unknown ids return an empty list.
    pub fn modify_order(
        &self,
        id: Id,
        side: Side,
        price: Price,
        quantity: Quantity,
    ) -> Result<Vec<Trade>, book::Error> {
        self.shared.book.lock().unwrap().modify(id, side, price, quantity)
    }

    /// Owned full-depth snapshot of both sides.
    pub fn snapshot(&self) -> Depth {
        self.shared.book.lock().unwrap().snapshot()
    }

    /// Owned snapshot limited to the top `limit` levels per side.
    pub fn depth(&self, limit: usize) -> Depth {
        self.shared.book.lock().unwrap().depth(limit)
    }

    /// Number of resting orders.
    pub fn len(&self) -> usize {
        self.shared.book.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        *self.shared.shutdown.lock().unwrap() = true;
        self.shared.wakeup.notify_all();
        if let Some(worker) = self.expirer.take() {
            let _ = worker.join();
        }
    }
}

/// Parse a "HH:MM" cutoff string into a wall-clock time.
fn parse_cutoff(cutoff: &str) -> Result<Time, Error> {
    let invalid = || Error::InvalidCutoff(cutoff.to_string());

    let (hour, minute) = cutoff.split_once(':').ok_or_else(invalid)?;
    let hour: u8 = hour.parse().map_err(|_| invalid())?;
    let minute: u8 = minute.parse().map_err(|_| invalid())?;
    Time::from_hms(hour, minute, 0).map_err(|_| invalid())
}

/// The next cutoff instant strictly after `now`.
///
/// Pure so the scheduling arithmetic is testable without waiting: project
/// `now` into the cutoff's offset, pin the wall-clock time, and roll to the
/// next day when the instant has already passed.
fn next_cutoff(now: OffsetDateTime, cutoff: Cutoff) -> OffsetDateTime {
    let local = now.to_offset(cutoff.offset);
    let mut at = local.replace_time(cutoff.time);
    if at <= local {
        at += Duration::days(1);
    }
    at
}

/// Day-order expirer loop.
///
/// Waits until the next daily cutoff with a timed condition-variable wait
/// keyed on the shutdown flag, so shutdown interrupts the wait promptly and
/// the engine lock is only ever taken for the bulk cancel itself.
fn run_expirer(shared: &Shared) {
    info!("day-order expirer started");

    loop {
        let now = OffsetDateTime::now_utc();
        let wait = (next_cutoff(now, shared.cutoff) - now).unsigned_abs();

        let guard = shared.shutdown.lock().unwrap();
        let (guard, timeout) = shared
            .wakeup
            .wait_timeout_while(guard, wait, |stop| !*stop)
            .unwrap();
        if *guard {
            break;
        }
        drop(guard);

        if timeout.timed_out() {
            let cancelled = shared.book.lock().unwrap().cancel_day_orders();
            info!(cancelled, "session cutoff reached, expired good-for-day orders");
        }
    }

    info!("day-order expirer stopped");
}
