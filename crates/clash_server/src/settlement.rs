//! Defense pools, staked-match settlement and the defense leaderboard.
//!
//! A defense pool is an amount staked behind one deck. Attackers pay a fee
//! of a tenth of the tier to play that deck (driven by the CPU); 90% of the
//! fee is the prize, the rest is burned. The prize is reserved from the
//! pool when the match starts so two attackers can never win the same coins.
//!
//! A pool that can no longer cover one prize is exhausted: it is closed and
//! the remainder goes to the owner's claimable balance. Leaderboard totals
//! belong to the owner and outlive any one pool; only owners with a live
//! pool are listed.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::info;

use clash_core::result::Winner;
use clash_core::state::Side;

use crate::collab::Ledger;
use crate::decks::DeckId;
use crate::error::{Result, ServerError};
use crate::{lock, PlayerId};

/// Allowed stake sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StakeTier {
    /// 1,000.
    T1k,
    /// 5,000.
    T5k,
    /// 10,000.
    T10k,
    /// 25,000.
    T25k,
    /// 50,000.
    T50k,
}

impl StakeTier {
    /// Every tier, smallest first.
    pub const ALL: [Self; 5] = [Self::T1k, Self::T5k, Self::T10k, Self::T25k, Self::T50k];

    /// Tier size.
    #[must_use]
    pub const fn amount(self) -> u64 {
        match self {
            Self::T1k => 1_000,
            Self::T5k => 5_000,
            Self::T10k => 10_000,
            Self::T25k => 25_000,
            Self::T50k => 50_000,
        }
    }

    /// Tier with exactly this amount.
    #[must_use]
    pub fn from_amount(amount: u64) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.amount() == amount)
    }

    /// Entry fee: 10% of the tier.
    #[must_use]
    pub const fn fee(self) -> u64 {
        self.amount() / 10
    }

    /// Contested prize: 90% of the fee.
    #[must_use]
    pub const fn prize(self) -> u64 {
        self.fee() * 9 / 10
    }

    /// Burned part of the fee.
    #[must_use]
    pub const fn burn(self) -> u64 {
        self.fee() - self.prize()
    }
}

impl fmt::Display for StakeTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.amount())
    }
}

/// Stake attached to a staked match. The attacker sits in seat A and the
/// defense deck in seat B.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stake {
    /// Tier played at.
    pub tier: StakeTier,
    /// Attacking player.
    pub attacker: PlayerId,
    /// Defending deck.
    pub defender_deck: DeckId,
    /// Defending deck's owner.
    pub defender: PlayerId,
    /// Set once settlement has been recorded.
    pub settled: bool,
}

/// Who took the prize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettlementOutcome {
    /// Prize credited to the attacker and taken from the pool.
    AttackerWon {
        /// Amount credited.
        prize: u64,
        /// Pool left afterwards. Zero once exhausted.
        pool_left: u64,
        /// Remainder returned to the owner when the pool was exhausted.
        refunded: u64,
    },
    /// Prize added to the pool.
    DefenseHeld {
        /// Amount added.
        prize: u64,
        /// Pool afterwards.
        pool: u64,
    },
}

/// Stake currently behind a deck.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefensePool {
    /// Deck staked.
    pub deck: DeckId,
    /// Owner.
    pub owner: PlayerId,
    /// Tier it defends at.
    pub tier: StakeTier,
    /// Coins in the pool, reserved ones included.
    pub pool: u64,
    /// Prizes held back for matches in progress.
    pub reserved: u64,
    /// False once the pool is exhausted.
    pub active: bool,
}

impl DefensePool {
    /// Pool not already promised to a running match.
    #[must_use]
    pub const fn available(&self) -> u64 {
        self.pool.saturating_sub(self.reserved)
    }
}

/// Leaderboard row for one owner, cumulative across their pools.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    /// Owner.
    pub owner: PlayerId,
    /// Deck currently defending, `None` between pools.
    pub deck: Option<DeckId>,
    /// Matches the defense held.
    pub wins: u32,
    /// Matches the defense lost.
    pub losses: u32,
    /// Prizes kept.
    pub earned: u64,
    /// Prizes paid out.
    pub lost: u64,
    /// Current pool.
    pub pool: u64,
}

impl LeaderboardEntry {
    fn close(&mut self) {
        self.deck = None;
        self.pool = 0;
    }
}

#[derive(Debug, Default)]
struct Book {
    pools: BTreeMap<DeckId, DefensePool>,
    board: BTreeMap<PlayerId, LeaderboardEntry>,
}

/// Defense pools and leaderboard, updated together under one lock.
#[derive(Debug, Default)]
pub struct DefenseBook {
    inner: Mutex<Book>,
}

impl DefenseBook {
    /// Empty book.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stake `tier` behind a deck, debiting the owner.
    ///
    /// # Errors
    ///
    /// - [`ServerError::AlreadyProcessed`] if the deck, or another deck of the owner, already defends
    /// - [`ServerError::InsufficientBalance`] if the owner cannot cover the stake
    pub fn set_pool(
        &self,
        ledger: &dyn Ledger,
        owner: &PlayerId,
        deck: DeckId,
        tier: StakeTier,
    ) -> Result<DefensePool> {
        let mut book = lock(&self.inner);
        if book.pools.get(&deck).is_some_and(|p| p.active) {
            return Err(ServerError::AlreadyProcessed(format!(
                "{deck} already has a defense pool"
            )));
        }
        if let Some(other) = book.pools.values().find(|p| p.active && &p.owner == owner) {
            return Err(ServerError::AlreadyProcessed(format!(
                "{owner} already defends with {}",
                other.deck
            )));
        }
        ledger.debit(owner, tier.amount())?;

        let pool = DefensePool {
            deck,
            owner: owner.clone(),
            tier,
            pool: tier.amount(),
            reserved: 0,
            active: true,
        };
        book.pools.insert(deck, pool.clone());
        let entry = book.board.entry(owner.clone()).or_insert_with(|| LeaderboardEntry {
            owner: owner.clone(),
            ..LeaderboardEntry::default()
        });
        entry.deck = Some(deck);
        entry.pool = pool.pool;
        info!(%owner, %deck, %tier, "defense pool set");
        Ok(pool)
    }

    /// Withdraw a pool, crediting what is left to the owner's claimable
    /// balance. The owner's leaderboard totals are kept.
    ///
    /// # Errors
    ///
    /// - [`ServerError::DeckNotFound`] if the deck has no pool owned by `owner`
    /// - [`ServerError::DefenseLocked`] while a match holds part of the pool
    pub fn withdraw(&self, ledger: &dyn Ledger, owner: &PlayerId, deck: DeckId) -> Result<u64> {
        let mut book = lock(&self.inner);
        let pool = match book.pools.get(&deck) {
            Some(p) if &p.owner == owner && p.active => p,
            _ => return Err(ServerError::DeckNotFound(deck)),
        };
        if pool.reserved > 0 {
            return Err(ServerError::DefenseLocked(deck));
        }
        let amount = pool.pool;
        book.pools.remove(&deck);
        if let Some(entry) = book.board.get_mut(owner) {
            entry.close();
        }
        ledger.credit_claimable(owner, amount);
        info!(%owner, %deck, amount, "defense pool withdrawn");
        Ok(amount)
    }

    /// Pick a random defense deck able to cover a prize at `tier`, skipping
    /// the attacker's own decks, and reserve the prize from it.
    ///
    /// `pick` receives the number of candidates and returns an index.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::NoDefenders`] if nothing qualifies.
    pub fn reserve_defender<F>(
        &self,
        tier: StakeTier,
        attacker: &PlayerId,
        pick: F,
    ) -> Result<DefensePool>
    where
        F: FnOnce(usize) -> usize,
    {
        let mut book = lock(&self.inner);
        let candidates: Vec<DeckId> = book
            .pools
            .values()
            .filter(|p| {
                p.active && p.tier == tier && &p.owner != attacker && p.available() >= tier.prize()
            })
            .map(|p| p.deck)
            .collect();
        if candidates.is_empty() {
            return Err(ServerError::NoDefenders(tier));
        }
        let chosen = candidates[pick(candidates.len()).min(candidates.len() - 1)];
        let pool = book
            .pools
            .get_mut(&chosen)
            .ok_or(ServerError::NoDefenders(tier))?;
        pool.reserved += tier.prize();
        Ok(pool.clone())
    }

    /// Give back a reservation without settling (match never got going).
    pub fn release(&self, deck: DeckId, tier: StakeTier) {
        let mut book = lock(&self.inner);
        if let Some(pool) = book.pools.get_mut(&deck) {
            pool.reserved = pool.reserved.saturating_sub(tier.prize());
        }
    }

    /// Settle a finished staked match. Runs at most once per stake.
    ///
    /// Seat A is the attacker. A tie counts as the defense holding.
    /// Returns `None` if the stake was already settled.
    pub fn settle(
        &self,
        ledger: &dyn Ledger,
        stake: &mut Stake,
        winner: Winner,
    ) -> Option<SettlementOutcome> {
        if stake.settled {
            return None;
        }
        let prize = stake.tier.prize();
        let mut book = lock(&self.inner);
        let Book { pools, board } = &mut *book;

        let outcome = if winner == Winner::Side(Side::A) {
            ledger.credit_claimable(&stake.attacker, prize);
            let mut pool_left = pools.get_mut(&stake.defender_deck).map_or(0, |pool| {
                pool.reserved = pool.reserved.saturating_sub(prize);
                pool.pool = pool.pool.saturating_sub(prize);
                if pool.pool < pool.tier.prize() && pool.reserved == 0 {
                    pool.active = false;
                }
                pool.pool
            });
            let mut refunded = 0;
            if pools.get(&stake.defender_deck).is_some_and(|p| !p.active) {
                pools.remove(&stake.defender_deck);
                refunded = pool_left;
                pool_left = 0;
                if refunded > 0 {
                    ledger.credit_claimable(&stake.defender, refunded);
                }
                info!(defender = %stake.defender, deck = %stake.defender_deck, refunded, "defense pool exhausted");
            }
            if let Some(entry) = board.get_mut(&stake.defender) {
                entry.losses += 1;
                entry.lost += prize;
                entry.pool = pool_left;
                if pool_left == 0 {
                    entry.close();
                }
            }
            SettlementOutcome::AttackerWon {
                prize,
                pool_left,
                refunded,
            }
        } else {
            let pool = pools.get_mut(&stake.defender_deck).map_or(0, |pool| {
                pool.reserved = pool.reserved.saturating_sub(prize);
                pool.pool = pool.pool.saturating_add(prize);
                pool.pool
            });
            if let Some(entry) = board.get_mut(&stake.defender) {
                entry.wins += 1;
                entry.earned += prize;
                entry.pool = pool;
            }
            SettlementOutcome::DefenseHeld { prize, pool }
        };

        stake.settled = true;
        info!(
            attacker = %stake.attacker,
            defender = %stake.defender,
            deck = %stake.defender_deck,
            ?outcome,
            "stake settled"
        );
        Some(outcome)
    }

    /// Pool behind a deck.
    #[must_use]
    pub fn pool(&self, deck: DeckId) -> Option<DefensePool> {
        lock(&self.inner).pools.get(&deck).cloned()
    }

    /// An owner's cumulative record, listed or not.
    #[must_use]
    pub fn record_of(&self, owner: &PlayerId) -> Option<LeaderboardEntry> {
        lock(&self.inner).board.get(owner).cloned()
    }

    /// All pools owned by a player.
    #[must_use]
    pub fn pools_of(&self, owner: &PlayerId) -> Vec<DefensePool> {
        lock(&self.inner)
            .pools
            .values()
            .filter(|p| &p.owner == owner)
            .cloned()
            .collect()
    }

    /// Leaderboard of owners with a live pool, largest pool first.
    #[must_use]
    pub fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        let mut rows: Vec<LeaderboardEntry> = lock(&self.inner)
            .board
            .values()
            .filter(|e| e.deck.is_some())
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.pool.cmp(&a.pool).then(b.wins.cmp(&a.wins)));
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::InMemoryLedger;

    fn setup(tier: StakeTier) -> (InMemoryLedger, DefenseBook, PlayerId, PlayerId) {
        let ledger = InMemoryLedger::new();
        let book = DefenseBook::new();
        let defender = PlayerId::new("defender");
        let attacker = PlayerId::new("attacker");
        ledger.deposit(&defender, tier.amount());
        book.set_pool(&ledger, &defender, DeckId(1), tier).unwrap();
        (ledger, book, defender, attacker)
    }

    fn stake(tier: StakeTier, attacker: &PlayerId, defender: &PlayerId) -> Stake {
        Stake {
            tier,
            attacker: attacker.clone(),
            defender_deck: DeckId(1),
            defender: defender.clone(),
            settled: false,
        }
    }

    #[test]
    fn test_tier_math() {
        assert_eq!(StakeTier::T10k.fee(), 1_000);
        assert_eq!(StakeTier::T10k.prize(), 900);
        assert_eq!(StakeTier::T10k.burn(), 100);
        assert_eq!(StakeTier::from_amount(25_000), Some(StakeTier::T25k));
        assert_eq!(StakeTier::from_amount(7), None);
    }

    #[test]
    fn test_attacker_win_moves_prize() {
        let (ledger, book, defender, attacker) = setup(StakeTier::T10k);
        book.reserve_defender(StakeTier::T10k, &attacker, |_| 0)
            .unwrap();
        let mut s = stake(StakeTier::T10k, &attacker, &defender);

        let outcome = book.settle(&ledger, &mut s, Winner::Side(Side::A));
        assert_eq!(
            outcome,
            Some(SettlementOutcome::AttackerWon {
                prize: 900,
                pool_left: 9_100,
                refunded: 0
            })
        );
        assert_eq!(ledger.claimable(&attacker), 900);
        let pool = book.pool(DeckId(1)).unwrap();
        assert_eq!(pool.pool, 9_100);
        assert_eq!(pool.reserved, 0);
        let row = &book.leaderboard()[0];
        assert_eq!((row.losses, row.lost, row.pool), (1, 900, 9_100));
    }

    #[test]
    fn test_defense_win_grows_pool() {
        let (ledger, book, defender, attacker) = setup(StakeTier::T10k);
        book.reserve_defender(StakeTier::T10k, &attacker, |_| 0)
            .unwrap();
        let mut s = stake(StakeTier::T10k, &attacker, &defender);
        let outcome = book.settle(&ledger, &mut s, Winner::Side(Side::B));
        assert_eq!(
            outcome,
            Some(SettlementOutcome::DefenseHeld {
                prize: 900,
                pool: 10_900
            })
        );
        assert_eq!(ledger.claimable(&attacker), 0);
        assert_eq!(book.leaderboard()[0].earned, 900);
    }

    #[test]
    fn test_settle_twice_is_noop() {
        let (ledger, book, defender, attacker) = setup(StakeTier::T10k);
        book.reserve_defender(StakeTier::T10k, &attacker, |_| 0)
            .unwrap();
        let mut s = stake(StakeTier::T10k, &attacker, &defender);
        assert!(book.settle(&ledger, &mut s, Winner::Side(Side::A)).is_some());
        assert!(book.settle(&ledger, &mut s, Winner::Side(Side::A)).is_none());
        assert_eq!(ledger.claimable(&attacker), 900);
        assert_eq!(book.pool(DeckId(1)).unwrap().pool, 9_100);
    }

    #[test]
    fn test_exhausted_pool_leaves_board() {
        let ledger = InMemoryLedger::new();
        let book = DefenseBook::new();
        let defender = PlayerId::new("defender");
        let attacker = PlayerId::new("attacker");
        ledger.deposit(&defender, 1_000);
        book.set_pool(&ledger, &defender, DeckId(1), StakeTier::T1k)
            .unwrap();

        // 1,000 pool pays 90 per loss; the eleventh loss leaves 10.
        let mut last = None;
        while book
            .reserve_defender(StakeTier::T1k, &attacker, |_| 0)
            .is_ok()
        {
            let mut s = stake(StakeTier::T1k, &attacker, &defender);
            last = book.settle(&ledger, &mut s, Winner::Side(Side::A));
        }
        assert_eq!(
            last,
            Some(SettlementOutcome::AttackerWon {
                prize: 90,
                pool_left: 0,
                refunded: 10
            })
        );
        assert_eq!(ledger.claimable(&attacker), 990);
        assert_eq!(ledger.claimable(&defender), 10);
        assert!(book.pool(DeckId(1)).is_none());
        assert!(book.leaderboard().is_empty());
        let record = book.record_of(&defender).unwrap();
        assert_eq!((record.losses, record.lost, record.deck), (11, 990, None));
        assert!(matches!(
            book.reserve_defender(StakeTier::T1k, &attacker, |_| 0),
            Err(ServerError::NoDefenders(StakeTier::T1k))
        ));
    }

    #[test]
    fn test_pool_covering_a_prize_stays_active() {
        let ledger = InMemoryLedger::new();
        let book = DefenseBook::new();
        let defender = PlayerId::new("defender");
        let attacker = PlayerId::new("attacker");
        ledger.deposit(&defender, 1_000);
        book.set_pool(&ledger, &defender, DeckId(1), StakeTier::T1k)
            .unwrap();
        for _ in 0..9 {
            book.reserve_defender(StakeTier::T1k, &attacker, |_| 0)
                .unwrap();
            let mut s = stake(StakeTier::T1k, &attacker, &defender);
            book.settle(&ledger, &mut s, Winner::Side(Side::A));
        }
        // 190 left; two matches reserve 90 each and the first one loses.
        book.reserve_defender(StakeTier::T1k, &attacker, |_| 0)
            .unwrap();
        book.reserve_defender(StakeTier::T1k, &attacker, |_| 0)
            .unwrap();
        let mut s = stake(StakeTier::T1k, &attacker, &defender);
        book.settle(&ledger, &mut s, Winner::Side(Side::A));
        let pool = book.pool(DeckId(1)).unwrap();
        assert_eq!((pool.pool, pool.reserved, pool.active), (100, 90, true));
    }

    #[test]
    fn test_withdraw_keeps_owner_totals() {
        let (ledger, book, defender, attacker) = setup(StakeTier::T1k);
        book.reserve_defender(StakeTier::T1k, &attacker, |_| 0)
            .unwrap();
        let mut s = stake(StakeTier::T1k, &attacker, &defender);
        book.settle(&ledger, &mut s, Winner::Side(Side::B));
        book.withdraw(&ledger, &defender, DeckId(1)).unwrap();
        assert!(book.leaderboard().is_empty());

        ledger.deposit(&defender, 1_000);
        book.set_pool(&ledger, &defender, DeckId(2), StakeTier::T1k)
            .unwrap();
        let row = &book.leaderboard()[0];
        assert_eq!(row.deck, Some(DeckId(2)));
        assert_eq!((row.wins, row.earned, row.pool), (1, 90, 1_000));
    }

    #[test]
    fn test_reserved_pool_cannot_be_withdrawn() {
        let (ledger, book, defender, attacker) = setup(StakeTier::T5k);
        book.reserve_defender(StakeTier::T5k, &attacker, |_| 0)
            .unwrap();
        assert!(matches!(
            book.withdraw(&ledger, &defender, DeckId(1)),
            Err(ServerError::DefenseLocked(_))
        ));
        book.release(DeckId(1), StakeTier::T5k);
        assert_eq!(book.withdraw(&ledger, &defender, DeckId(1)).unwrap(), 5_000);
        assert_eq!(ledger.claimable(&defender), 5_000);
        assert!(book.leaderboard().is_empty());
    }

    #[test]
    fn test_own_pool_is_not_a_defender() {
        let (_, book, defender, _) = setup(StakeTier::T5k);
        assert!(book.reserve_defender(StakeTier::T5k, &defender, |_| 0).is_err());
        assert!(book.reserve_defender(StakeTier::T10k, &PlayerId::new("x"), |_| 0).is_err());
    }

    #[test]
    fn test_set_pool_needs_balance() {
        let ledger = InMemoryLedger::new();
        let book = DefenseBook::new();
        let err = book
            .set_pool(&ledger, &PlayerId::new("poor"), DeckId(3), StakeTier::T50k)
            .unwrap_err();
        assert!(matches!(err, ServerError::InsufficientBalance { .. }));
        assert!(book.pool(DeckId(3)).is_none());
    }

    #[test]
    fn test_one_defense_deck_per_owner() {
        let (ledger, book, defender, _) = setup(StakeTier::T1k);
        ledger.deposit(&defender, 1_000);
        let err = book
            .set_pool(&ledger, &defender, DeckId(2), StakeTier::T1k)
            .unwrap_err();
        assert!(matches!(err, ServerError::AlreadyProcessed(_)));
        assert_eq!(ledger.balance(&defender), 1_000);
    }
}
