//! Collaborator interfaces: the balance ledger and the profile (rating) store.
//!
//! The service only records intended balance changes. Moving funds on chain
//! is someone else's job, triggered when a player claims their balance.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{Result, ServerError};
use crate::lock;
use crate::PlayerId;

/// Balance ledger keyed by player.
pub trait Ledger: Send + Sync {
    /// Add to the player's claimable balance.
    fn credit_claimable(&self, player: &PlayerId, amount: u64);

    /// Take from the player's balance.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::InsufficientBalance`] and changes nothing if
    /// the balance is too small.
    fn debit(&self, player: &PlayerId, amount: u64) -> Result<()>;

    /// Return a debit that bought nothing to the spendable balance.
    fn refund(&self, player: &PlayerId, amount: u64);

    /// Spendable balance.
    fn balance(&self, player: &PlayerId) -> u64;

    /// Claimable (won but not yet withdrawn) balance.
    fn claimable(&self, player: &PlayerId) -> u64;
}

/// Rating storage keyed by player.
pub trait ProfileStore: Send + Sync {
    /// Current rating, zero for unknown players.
    fn rating(&self, player: &PlayerId) -> u32;

    /// Overwrite the rating.
    fn set_rating(&self, player: &PlayerId, rating: u32);
}

#[derive(Debug, Default, Clone, Copy)]
struct Account {
    balance: u64,
    claimable: u64,
}

/// Ledger kept in memory.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    accounts: Mutex<HashMap<PlayerId, Account>>,
}

impl InMemoryLedger {
    /// Empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Give a player spendable funds.
    pub fn deposit(&self, player: &PlayerId, amount: u64) {
        let mut accounts = lock(&self.accounts);
        let account = accounts.entry(player.clone()).or_default();
        account.balance = account.balance.saturating_add(amount);
    }
}

impl Ledger for InMemoryLedger {
    fn credit_claimable(&self, player: &PlayerId, amount: u64) {
        let mut accounts = lock(&self.accounts);
        let account = accounts.entry(player.clone()).or_default();
        account.claimable = account.claimable.saturating_add(amount);
    }

    fn debit(&self, player: &PlayerId, amount: u64) -> Result<()> {
        let mut accounts = lock(&self.accounts);
        let account = accounts.entry(player.clone()).or_default();
        if account.balance < amount {
            return Err(ServerError::InsufficientBalance {
                needed: amount,
                available: account.balance,
            });
        }
        account.balance -= amount;
        Ok(())
    }

    fn refund(&self, player: &PlayerId, amount: u64) {
        let mut accounts = lock(&self.accounts);
        let account = accounts.entry(player.clone()).or_default();
        account.balance = account.balance.saturating_add(amount);
    }

    fn balance(&self, player: &PlayerId) -> u64 {
        lock(&self.accounts).get(player).map_or(0, |a| a.balance)
    }

    fn claimable(&self, player: &PlayerId) -> u64 {
        lock(&self.accounts).get(player).map_or(0, |a| a.claimable)
    }
}

/// Profile store kept in memory.
#[derive(Debug, Default)]
pub struct InMemoryProfiles {
    ratings: Mutex<HashMap<PlayerId, u32>>,
}

impl InMemoryProfiles {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProfileStore for InMemoryProfiles {
    fn rating(&self, player: &PlayerId) -> u32 {
        lock(&self.ratings).get(player).copied().unwrap_or(0)
    }

    fn set_rating(&self, player: &PlayerId, rating: u32) {
        lock(&self.ratings).insert(player.clone(), rating);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debit_refuses_overdraft() {
        let ledger = InMemoryLedger::new();
        let p = PlayerId::new("0xAbC");
        ledger.deposit(&p, 100);
        assert!(ledger.debit(&p, 60).is_ok());
        let err = ledger.debit(&p, 60).unwrap_err();
        assert!(matches!(
            err,
            ServerError::InsufficientBalance {
                needed: 60,
                available: 40
            }
        ));
        assert_eq!(ledger.balance(&p), 40);
    }

    #[test]
    fn test_refund_restores_spendable_balance() {
        let ledger = InMemoryLedger::new();
        let p = PlayerId::new("p");
        ledger.deposit(&p, 100);
        ledger.debit(&p, 100).unwrap();
        ledger.refund(&p, 100);
        assert_eq!(ledger.balance(&p), 100);
        assert_eq!(ledger.claimable(&p), 0);
    }

    #[test]
    fn test_claimable_is_separate() {
        let ledger = InMemoryLedger::new();
        let p = PlayerId::new("p");
        ledger.credit_claimable(&p, 900);
        assert_eq!(ledger.claimable(&p), 900);
        assert_eq!(ledger.balance(&p), 0);
    }

    #[test]
    fn test_ratings_default_to_zero() {
        let profiles = InMemoryProfiles::new();
        let p = PlayerId::new("p");
        assert_eq!(profiles.rating(&p), 0);
        profiles.set_rating(&p, 120);
        assert_eq!(profiles.rating(&p), 120);
    }
}
