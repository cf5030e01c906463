//! Execution scheduler — turns close-of-day targets into next-session orders.
//!
//! A signal set stamped at the close of day T is executed at the open of the
//! first trading session strictly after T. Orders are priced at that
//! session's open, so no fill can use a price from day ≤ T. Rebalances that
//! cannot execute on their session (holiday, missing open) are moved to the
//! following session with a `DataGapWarning`, or fail the run, depending on
//! `SessionGapPolicy`.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

use crate::data::PriceSource;
use crate::domain::{Order, PriceLookup, SignalSet};
use crate::engine::ledger::{validate_price, PositionLedger};
use crate::engine::state::{DataGapWarning, GapReason, SessionGapPolicy};
use crate::error::EngineError;

/// Order quantities smaller than this are not worth sending.
const MIN_ORDER_SHARES: f64 = 1e-9;

/// A signal set waiting for its execution session.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRebalance {
    pub signal_date: NaiveDate,
    /// First session after `signal_date` on the calendar.
    pub expected_date: NaiveDate,
    pub set: SignalSet,
}

/// Why orders could not be built for a session.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderBuildError {
    /// A symbol that must trade has no opening price on this session.
    MissingOpen(String),
    Integrity(EngineError),
}

#[derive(Debug, Clone)]
pub struct ExecutionScheduler {
    calendar: Vec<NaiveDate>,
    policy: SessionGapPolicy,
    fractional_shares: bool,
    pending: BTreeMap<NaiveDate, PendingRebalance>,
    warnings: Vec<DataGapWarning>,
}

impl ExecutionScheduler {
    /// The calendar must be strictly ascending.
    pub fn new(
        calendar: Vec<NaiveDate>,
        policy: SessionGapPolicy,
        fractional_shares: bool,
    ) -> Result<Self, EngineError> {
        if let Some(pair) = calendar.windows(2).find(|w| w[0] >= w[1]) {
            return Err(EngineError::integrity(
                pair[1],
                format!("trading calendar not strictly ascending ({} then {})", pair[0], pair[1]),
            ));
        }
        Ok(Self {
            calendar,
            policy,
            fractional_shares,
            pending: BTreeMap::new(),
            warnings: Vec::new(),
        })
    }

    pub fn calendar(&self) -> &[NaiveDate] {
        &self.calendar
    }

    /// First session strictly after `date`.
    pub fn next_session(&self, date: NaiveDate) -> Option<NaiveDate> {
        let idx = self.calendar.partition_point(|d| *d <= date);
        self.calendar.get(idx).copied()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Queue a signal set for the session after its date.
    pub fn schedule(&mut self, set: SignalSet) -> Result<(), EngineError> {
        let signal_date = set.date;
        let expected_weekday = next_weekday(signal_date);

        let Some(session) = self.next_session(signal_date) else {
            warn!(%signal_date, "no session left in range; rebalance dropped");
            self.warnings.push(DataGapWarning {
                signal_date,
                expected_date: expected_weekday,
                executed_date: None,
                reason: GapReason::EndOfRange,
                symbol: None,
            });
            return Ok(());
        };

        if session > expected_weekday {
            match self.policy {
                SessionGapPolicy::Fail => {
                    return Err(EngineError::integrity(
                        expected_weekday,
                        format!("no trading session after signal of {signal_date}"),
                    ));
                }
                SessionGapPolicy::NextSession => {
                    warn!(%signal_date, expected = %expected_weekday, %session, "session gap; rebalance moved");
                    self.warnings.push(DataGapWarning {
                        signal_date,
                        expected_date: expected_weekday,
                        executed_date: Some(session),
                        reason: GapReason::MissingSession,
                        symbol: None,
                    });
                }
            }
        }

        self.enqueue(
            session,
            PendingRebalance {
                signal_date,
                expected_date: session,
                set,
            },
        );
        Ok(())
    }

    /// Remove and return the rebalance due on `date`, if any.
    pub fn due(&mut self, date: NaiveDate) -> Option<PendingRebalance> {
        self.pending.remove(&date)
    }

    /// Size orders for `rebalance` at `date`'s open.
    ///
    /// Equity is the ledger marked at the open (last known price for symbols
    /// not involved). Target shares are `w * equity / open`, truncated toward
    /// zero unless fractional sizing is enabled. Reducing orders come first.
    pub fn build_orders(
        &self,
        rebalance: &PendingRebalance,
        date: NaiveDate,
        ledger: &PositionLedger,
        prices: &dyn PriceSource,
    ) -> Result<Vec<Order>, OrderBuildError> {
        if date <= rebalance.signal_date {
            return Err(OrderBuildError::Integrity(EngineError::integrity(
                date,
                format!("execution on or before signal date {}", rebalance.signal_date),
            )));
        }

        let mut symbols: BTreeSet<&str> = rebalance.set.weights.keys().map(|s| s.as_str()).collect();
        symbols.extend(ledger.held_symbols());

        let mut opens: BTreeMap<&str, f64> = BTreeMap::new();
        for &symbol in &symbols {
            let target_weight = rebalance.set.weight(symbol);
            let current = ledger.shares(symbol);
            match prices.bar(symbol, date) {
                PriceLookup::Available(bar) => {
                    validate_price(date, symbol, "open", bar.open)
                        .map_err(OrderBuildError::Integrity)?;
                    opens.insert(symbol, bar.open);
                }
                PriceLookup::Missing => {
                    if target_weight != 0.0 || current != 0.0 {
                        return Err(OrderBuildError::MissingOpen(symbol.to_string()));
                    }
                }
            }
        }

        let equity = ledger.mark_value(|symbol| opens.get(symbol).copied());

        let mut reducing = Vec::new();
        let mut increasing = Vec::new();
        for (&symbol, &open) in &opens {
            let raw_target = rebalance.set.weight(symbol) * equity / open;
            let target = if self.fractional_shares {
                raw_target
            } else {
                raw_target.trunc()
            };
            let current = ledger.shares(symbol);
            let quantity = target - current;
            if quantity.abs() < MIN_ORDER_SHARES {
                continue;
            }
            let order = Order {
                execution_date: date,
                signal_date: rebalance.signal_date,
                symbol: symbol.to_string(),
                quantity,
                price: open,
            };
            let reduces = current != 0.0 && (target.abs() < current.abs() || target * current < 0.0);
            if reduces {
                reducing.push(order);
            } else {
                increasing.push(order);
            }
        }

        debug!(%date, signal_date = %rebalance.signal_date, equity, orders = reducing.len() + increasing.len(), "rebalance sized");
        reducing.extend(increasing);
        Ok(reducing)
    }

    /// Move a rebalance that could not execute on `date` to the next session.
    pub fn defer(
        &mut self,
        rebalance: PendingRebalance,
        date: NaiveDate,
        symbol: &str,
    ) -> Result<(), EngineError> {
        if self.policy == SessionGapPolicy::Fail {
            return Err(EngineError::integrity(
                date,
                format!("no opening price for {symbol}"),
            ));
        }
        let next = self.next_session(date);
        warn!(%date, symbol, next = ?next, "missing open; rebalance deferred");
        self.warnings.push(DataGapWarning {
            signal_date: rebalance.signal_date,
            expected_date: rebalance.expected_date,
            executed_date: next,
            reason: if next.is_some() {
                GapReason::MissingOpen
            } else {
                GapReason::EndOfRange
            },
            symbol: Some(symbol.to_string()),
        });
        if let Some(next) = next {
            self.enqueue(next, rebalance);
        }
        Ok(())
    }

    pub fn warnings(&self) -> &[DataGapWarning] {
        &self.warnings
    }

    pub fn take_warnings(&mut self) -> Vec<DataGapWarning> {
        std::mem::take(&mut self.warnings)
    }

    /// Queue on `session`; the later signal wins a collision.
    fn enqueue(&mut self, session: NaiveDate, rebalance: PendingRebalance) {
        let dropped = match self.pending.remove(&session) {
            Some(existing) if existing.signal_date > rebalance.signal_date => {
                self.pending.insert(session, existing);
                rebalance
            }
            Some(existing) => {
                self.pending.insert(session, rebalance);
                existing
            }
            None => {
                self.pending.insert(session, rebalance);
                return;
            }
        };
        self.warnings.push(DataGapWarning {
            signal_date: dropped.signal_date,
            expected_date: dropped.expected_date,
            executed_date: None,
            reason: GapReason::Superseded,
            symbol: None,
        });
    }
}

/// Next Monday–Friday date after `date`.
fn next_weekday(date: NaiveDate) -> NaiveDate {
    let mut next = date + Duration::days(1);
    while matches!(next.weekday(), Weekday::Sat | Weekday::Sun) {
        next += Duration::days(1);
    }
    next
}
