//! Turn restrictions limit which edge may be taken after arriving at a vertex
//! along another edge. A restriction either bans a single turn (NoTurn), or
//! bans every turn except one (OnlyTurn). Restrictions can be limited to a
//! set of modes, and to a repeating window of time.

use crate::common::graph_data::{TraverseMode, TraverseModeSet};
use petgraph::graph::EdgeIndex;

pub const SECONDS_PER_DAY: i64 = 24 * 60 * 60;
pub const SECONDS_PER_WEEK: i64 = 7 * SECONDS_PER_DAY;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnRestrictionKind {
    NoTurn,
    OnlyTurn,
}

/// A window of time which repeats every `period` seconds. Instants are taken
/// modulo the period, so windows are measured from the unix epoch (i.e.
/// from UTC midnight for a daily period). When `start` is after `end` the
/// window wraps around the end of the period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepeatingTimePeriod {
    period: i64,
    start: i64,
    end: i64,
}

impl RepeatingTimePeriod {
    /// Create a new window, `start` and `end` must fall within the period
    pub fn new(period: i64, start: i64, end: i64) -> Option<Self> {
        let in_period = |value: i64| (0..=period).contains(&value);
        if period <= 0 || !in_period(start) || !in_period(end) {
            return None;
        }
        Some(RepeatingTimePeriod { period, start, end })
    }

    /// A window which repeats every day
    pub fn daily(start: i64, end: i64) -> Option<Self> {
        RepeatingTimePeriod::new(SECONDS_PER_DAY, start, end)
    }

    pub fn active(&self, instant: i64) -> bool {
        let offset = instant.rem_euclid(self.period);
        if self.start <= self.end {
            offset >= self.start && offset < self.end
        } else {
            offset >= self.start || offset < self.end
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TurnRestriction {
    pub kind: TurnRestrictionKind,
    pub from: EdgeIndex,
    pub to: EdgeIndex,
    pub time: Option<RepeatingTimePeriod>,
    pub modes: TraverseModeSet,
}

impl TurnRestriction {
    pub fn new(
        from: EdgeIndex,
        to: EdgeIndex,
        kind: TurnRestrictionKind,
        modes: TraverseModeSet,
    ) -> Self {
        TurnRestriction {
            kind,
            from,
            to,
            time: None,
            modes,
        }
    }

    pub fn with_time(mut self, time: RepeatingTimePeriod) -> Self {
        self.time = Some(time);
        self
    }

    /// Whether the restriction is in force at the provided instant.
    /// Restrictions without a time window are always in force
    pub fn active(&self, instant: i64) -> bool {
        match &self.time {
            Some(time) => time.active(instant),
            None => true,
        }
    }

    fn applies_to(&self, mode: TraverseMode, instant: i64) -> bool {
        self.modes.contains(mode) && self.active(instant)
    }
}

/// Check whether a turn onto `to` is permitted, given every restriction
/// which starts on the edge the traveller is arriving from
pub fn turn_permitted(
    restrictions: &[TurnRestriction],
    to: EdgeIndex,
    mode: TraverseMode,
    instant: i64,
) -> bool {
    for restriction in restrictions {
        if !restriction.applies_to(mode, instant) {
            continue;
        }
        let banned = match restriction.kind {
            TurnRestrictionKind::NoTurn => restriction.to == to,
            TurnRestrictionKind::OnlyTurn => restriction.to != to,
        };
        if banned {
            return false;
        }
    }
    true
}
