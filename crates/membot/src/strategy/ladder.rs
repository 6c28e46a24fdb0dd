//! Market-cap exit ladders.
//!
//! Both ladders are pure state machines: feed each market-cap observation to
//! `observe` and act on the returned `LadderStep`. Partial sells come before
//! any exit in the same step.

use std::fmt;

use rust_decimal::Decimal;

use crate::config::{DynamicBagConfig, LadderConfig};

/// Why a round sold everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// Market cap fell too far between two observations.
    InstantDrop,
    /// Armed stop-loss hit.
    StopLoss,
    /// Final milestone reached.
    SellAll,
    /// Dynamic ladder ceiling reached.
    MaxReached,
    /// Hold time or maximum duration elapsed.
    Timeout,
    /// No fresh trade flow.
    Idle,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExitReason::InstantDrop => "instant drop",
            ExitReason::StopLoss => "stop loss",
            ExitReason::SellAll => "sell-all level",
            ExitReason::MaxReached => "max level",
            ExitReason::Timeout => "timeout",
            ExitReason::Idle => "idle",
        };
        write!(f, "{s}")
    }
}

/// What to do after one observation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LadderStep {
    /// Fractions of the current balance to sell, in order.
    pub partial_sells: Vec<Decimal>,
    /// Sell everything and end the round.
    pub exit: Option<ExitReason>,
}

impl LadderStep {
    fn exit(reason: ExitReason) -> Self {
        Self {
            partial_sells: Vec::new(),
            exit: Some(reason),
        }
    }

    pub fn is_idle(&self) -> bool {
        self.partial_sells.is_empty() && self.exit.is_none()
    }
}

/// Shared drop detector and armed stop-loss.
#[derive(Debug, Clone)]
struct StopGuard {
    instant_drop_pct: Decimal,
    arm_after: Decimal,
    stop_loss: Decimal,
    armed: bool,
    last: Option<Decimal>,
}

impl StopGuard {
    fn new(config: &LadderConfig, stop_loss: Decimal) -> Self {
        Self {
            instant_drop_pct: config.instant_drop_stop_pct,
            arm_after: config.arm_stop_after,
            stop_loss,
            armed: false,
            last: None,
        }
    }

    fn check(&mut self, mcap: Decimal) -> Option<ExitReason> {
        if let Some(last) = self.last
            && last > Decimal::ZERO
        {
            let drop_pct = Decimal::ONE_HUNDRED * (last - mcap) / last;
            if drop_pct >= self.instant_drop_pct {
                return Some(ExitReason::InstantDrop);
            }
        }
        self.last = Some(mcap);

        if !self.armed && mcap >= self.arm_after {
            self.armed = true;
        }
        if self.armed && mcap <= self.stop_loss {
            return Some(ExitReason::StopLoss);
        }
        None
    }
}

/// Fixed take-profit milestones ending in a sell-all level.
#[derive(Debug, Clone)]
pub struct MilestoneLadder {
    guard: StopGuard,
    levels: Vec<(Decimal, Option<Decimal>)>,
    next: usize,
    sell_all: Decimal,
}

impl MilestoneLadder {
    pub fn new(config: &LadderConfig) -> Self {
        Self::with_stop_loss(config, config.stop_loss)
    }

    /// Ladder with a stop-loss other than the configured one.
    pub fn with_stop_loss(config: &LadderConfig, stop_loss: Decimal) -> Self {
        let levels = config
            .tp_levels
            .iter()
            .enumerate()
            .map(|(i, level)| (*level, config.tp_fractions.get(i).copied()))
            .collect();
        Self {
            guard: StopGuard::new(config, stop_loss),
            levels,
            next: 0,
            sell_all: config.sell_all_level,
        }
    }

    pub fn observe(&mut self, mcap: Decimal) -> LadderStep {
        if let Some(reason) = self.guard.check(mcap) {
            return LadderStep::exit(reason);
        }

        let mut step = LadderStep::default();
        if let Some(&(level, fraction)) = self.levels.get(self.next)
            && mcap >= level
        {
            self.next += 1;
            // An unset or zero fraction consumes the level without a dust sell.
            if let Some(fraction) = fraction.filter(|f| *f > Decimal::ZERO) {
                step.partial_sells.push(fraction);
            }
        }

        if mcap >= self.sell_all {
            step.exit = Some(ExitReason::SellAll);
        }
        step
    }

    pub fn is_armed(&self) -> bool {
        self.guard.armed
    }

    /// Milestones not yet reached.
    pub fn remaining_levels(&self) -> usize {
        self.levels.len() - self.next
    }
}

/// Open-ended ladder selling a fixed fraction every `step` of market cap.
#[derive(Debug, Clone)]
pub struct DynamicLadder {
    guard: StopGuard,
    next_level: Decimal,
    step: Decimal,
    fraction: Decimal,
    max: Decimal,
}

impl DynamicLadder {
    pub fn new(bag: &DynamicBagConfig, ladder: &LadderConfig, stop_loss: Decimal) -> Self {
        Self {
            guard: StopGuard::new(ladder, stop_loss),
            next_level: bag.start_usd,
            step: bag.step_usd,
            fraction: bag.sell_fraction,
            max: bag.max_usd,
        }
    }

    pub fn observe(&mut self, mcap: Decimal) -> LadderStep {
        if let Some(reason) = self.guard.check(mcap) {
            return LadderStep::exit(reason);
        }
        if mcap >= self.max {
            return LadderStep::exit(ExitReason::MaxReached);
        }

        let mut step = LadderStep::default();
        while mcap >= self.next_level {
            step.partial_sells.push(self.fraction);
            if self.step <= Decimal::ZERO {
                self.next_level = self.max;
                break;
            }
            self.next_level += self.step;
        }
        step
    }

    pub fn next_level(&self) -> Decimal {
        self.next_level
    }
}
