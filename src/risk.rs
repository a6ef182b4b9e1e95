//! Multi-account risk gate - a pre-enqueue filter on the producer side.
//!
//! The gate validates commands BEFORE they enter the ring; a rejected
//! command never reaches the matcher, which keeps the matching core free of
//! account state. Fills are reported back through [`RiskGate::on_fill`] to
//! keep positions current.

use crate::command::{Command, Side};
use rustc_hash::FxHashMap;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Why a command was refused at the gate
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RiskReject {
    #[error("account is not registered")]
    UnknownAccount,
    #[error("account is disabled")]
    AccountDisabled,
    #[error("order quantity exceeds the per-order limit")]
    OrderQty,
    #[error("order notional exceeds the per-order limit")]
    OrderNotional,
    #[error("per-second rate limit reached")]
    RateLimit,
    #[error("resulting net position would exceed the limit")]
    Position,
    #[error("resulting gross exposure would exceed the limit")]
    Exposure,
}

/// Per-account limits
#[derive(Clone, Copy, Debug)]
pub struct RiskLimits {
    /// Maximum quantity of a single order
    pub max_order_qty: u64,
    /// Maximum price * quantity of a single order
    pub max_order_notional: u64,
    /// Maximum absolute net position
    pub max_position: i64,
    /// Maximum accumulated gross exposure (bought + sold quantity)
    pub max_gross_exposure: u64,
    /// NEW orders allowed per second
    pub max_orders_per_sec: u32,
    /// Cancels allowed per second
    pub max_cancels_per_sec: u32,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_order_qty: 100_000,
            max_order_notional: 10_000_000,
            max_position: 1_000_000,
            max_gross_exposure: 5_000_000,
            max_orders_per_sec: 100_000,
            max_cancels_per_sec: 50_000,
        }
    }
}

/// Tracked state for one trading account
#[derive(Debug)]
struct Account {
    limits: RiskLimits,
    enabled: bool,
    /// Signed position; positive = long
    net_position: i64,
    /// Bought plus sold quantity since the account was registered
    gross_exposure: u64,
    orders_this_sec: u32,
    cancels_this_sec: u32,
    window_start: Instant,
}

impl Account {
    fn new(limits: RiskLimits) -> Self {
        Self {
            limits,
            enabled: true,
            net_position: 0,
            gross_exposure: 0,
            orders_this_sec: 0,
            cancels_this_sec: 0,
            window_start: Instant::now(),
        }
    }

    fn roll_window(&mut self, now: Instant) {
        if now.duration_since(self.window_start) >= Duration::from_secs(1) {
            self.window_start = now;
            self.orders_this_sec = 0;
            self.cancels_this_sec = 0;
        }
    }
}

/// Pre-enqueue validation gate over a set of accounts
pub struct RiskGate {
    accounts: FxHashMap<u64, Account>,
    enabled: bool,
    checked: u64,
    rejected: u64,
}

impl RiskGate {
    pub fn new() -> Self {
        Self {
            accounts: FxHashMap::default(),
            enabled: true,
            checked: 0,
            rejected: 0,
        }
    }

    /// Register an account; returns false if it already exists
    pub fn add_account(&mut self, account_id: u64, limits: RiskLimits) -> bool {
        if self.accounts.contains_key(&account_id) {
            return false;
        }
        self.accounts.insert(account_id, Account::new(limits));
        true
    }

    pub fn remove_account(&mut self, account_id: u64) -> bool {
        self.accounts.remove(&account_id).is_some()
    }

    pub fn set_account_enabled(&mut self, account_id: u64, enabled: bool) -> bool {
        match self.accounts.get_mut(&account_id) {
            Some(account) => {
                account.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Disable all checking; every command passes
    pub fn disable(&mut self) {
        self.enabled = false;
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    /// Validate a command for an account. `Ok` means it may be enqueued.
    pub fn check(&mut self, account_id: u64, cmd: &Command) -> Result<(), RiskReject> {
        if !self.enabled {
            return Ok(());
        }
        self.checked += 1;

        let result = match self.accounts.get_mut(&account_id) {
            None => Err(RiskReject::UnknownAccount),
            Some(account) => Self::check_account(account, cmd),
        };
        if result.is_err() {
            self.rejected += 1;
        }
        result
    }

    fn check_account(account: &mut Account, cmd: &Command) -> Result<(), RiskReject> {
        if !account.enabled {
            return Err(RiskReject::AccountDisabled);
        }
        account.roll_window(Instant::now());

        match cmd {
            Command::Cancel(_) => {
                if account.cancels_this_sec >= account.limits.max_cancels_per_sec {
                    return Err(RiskReject::RateLimit);
                }
                account.cancels_this_sec += 1;
                Ok(())
            }
            Command::New(new) => {
                if new.qty > account.limits.max_order_qty {
                    return Err(RiskReject::OrderQty);
                }
                let notional = new.price.unsigned_abs().saturating_mul(new.qty);
                if notional > account.limits.max_order_notional {
                    return Err(RiskReject::OrderNotional);
                }
                if account.orders_this_sec >= account.limits.max_orders_per_sec {
                    return Err(RiskReject::RateLimit);
                }

                let delta = match new.side {
                    Side::Buy => new.qty as i64,
                    Side::Sell => -(new.qty as i64),
                };
                if (account.net_position + delta).unsigned_abs()
                    > account.limits.max_position.unsigned_abs()
                {
                    return Err(RiskReject::Position);
                }
                if account.gross_exposure.saturating_add(new.qty)
                    > account.limits.max_gross_exposure
                {
                    return Err(RiskReject::Exposure);
                }

                account.orders_this_sec += 1;
                Ok(())
            }
        }
    }

    /// Report an executed fill so position and exposure stay current
    pub fn on_fill(&mut self, account_id: u64, side: Side, qty: u64) {
        if let Some(account) = self.accounts.get_mut(&account_id) {
            match side {
                Side::Buy => account.net_position += qty as i64,
                Side::Sell => account.net_position -= qty as i64,
            }
            account.gross_exposure = account.gross_exposure.saturating_add(qty);
        }
    }

    /// Current signed position for an account
    pub fn net_position(&self, account_id: u64) -> Option<i64> {
        self.accounts.get(&account_id).map(|a| a.net_position)
    }

    pub fn checked(&self) -> u64 {
        self.checked
    }

    pub fn rejected(&self) -> u64 {
        self.rejected
    }
}

impl Default for RiskGate {
    fn default() -> Self {
        Self::new()
    }
}
