//! Bid arithmetic and roster checks.
//!
//! Everything here is a pure function of its arguments. The engine calls
//! these at bid time and again at settlement.

use gavel_protocol::{Amount, League, PlayerLot, Team};

use crate::RuleViolation;

/// Below this the bid rises by half a crore.
pub const LOW_TIER_CEILING: Amount = Amount::crores(10);
/// Below this (and at or above the low ceiling) it rises by one crore.
pub const MID_TIER_CEILING: Amount = Amount::crores(20);

/// Step size for the next raise over `current`.
pub fn increment(current: Amount) -> Amount {
    if current < LOW_TIER_CEILING {
        Amount::from_hundredths(50)
    } else if current < MID_TIER_CEILING {
        Amount::crores(1)
    } else {
        Amount::crores(2)
    }
}

/// The amount the next bid on a lot commits to.
///
/// The opening bid is the base price; every later bid adds one increment.
pub fn next_bid_amount(current_highest: Amount, base_price: Amount) -> Amount {
    if current_highest.is_zero() {
        base_price
    } else {
        current_highest + increment(current_highest)
    }
}

pub fn normalize_nation(nation: &str) -> String {
    nation.trim().to_lowercase()
}

/// An unknown (empty) nation counts as local.
pub fn is_foreign(lot_nation: &str, local_nation: &str) -> bool {
    let nation = normalize_nation(lot_nation);
    !nation.is_empty() && nation != normalize_nation(local_nation)
}

pub fn foreign_count(team: &Team, local_nation: &str) -> usize {
    team.roster
        .iter()
        .filter(|entry| is_foreign(&entry.lot.nation, local_nation))
        .count()
}

/// Per-room roster limits, bundled so checks take one argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RosterLimits {
    pub capacity: usize,
    pub foreign_cap: usize,
    pub local_nation: &'static str,
}

impl RosterLimits {
    pub fn new(league: League, capacity: usize, foreign_cap: usize) -> Self {
        Self {
            capacity,
            foreign_cap,
            local_nation: league.local_nation(),
        }
    }
}

/// Checks whether `team` may commit `amount` to `lot`.
///
/// Checked in order: roster space, foreign cap, any budget at all, then
/// whether the budget covers `amount`. The first failure wins.
pub fn can_accept_bid(
    team: &Team,
    lot: &PlayerLot,
    amount: Amount,
    limits: &RosterLimits,
) -> Result<(), RuleViolation> {
    if team.roster.len() >= limits.capacity {
        return Err(RuleViolation::RosterFull {
            capacity: limits.capacity,
        });
    }
    if is_foreign(&lot.nation, limits.local_nation)
        && foreign_count(team, limits.local_nation) >= limits.foreign_cap
    {
        return Err(RuleViolation::ForeignCapReached {
            cap: limits.foreign_cap,
        });
    }
    if team.budget.is_zero() || amount > team.budget {
        return Err(RuleViolation::InsufficientBudget {
            needed: amount,
            budget: team.budget,
        });
    }
    Ok(())
}

/// A team that could still win a lot: roster space and money left.
pub fn is_active(team: &Team, capacity: usize) -> bool {
    team.roster.len() < capacity && !team.budget.is_zero()
}

#[cfg(test)]
mod tests {
    use gavel_protocol::RosterEntry;

    use super::*;

    fn team_with(budget: Amount, nations: &[&str]) -> Team {
        let mut team = Team::new("T".into(), budget, None);
        for (i, nation) in nations.iter().enumerate() {
            team.roster.push(RosterEntry {
                lot: PlayerLot::new(format!("P{i}"), Amount::crores(1), *nation, "Batter"),
                price_paid: Amount::crores(1),
            });
        }
        team
    }

    fn ipl(capacity: usize, foreign_cap: usize) -> RosterLimits {
        RosterLimits::new(League::Ipl, capacity, foreign_cap)
    }

    // =====================================================================
    // Increments
    // =====================================================================

    #[test]
    fn test_increment_tiers() {
        assert_eq!(increment(Amount::crores(2)), Amount(50));
        assert_eq!(increment(Amount(999)), Amount(50));
        assert_eq!(increment(Amount::crores(10)), Amount(100));
        assert_eq!(increment(Amount(1999)), Amount(100));
        assert_eq!(increment(Amount::crores(20)), Amount(200));
        assert_eq!(increment(Amount::crores(75)), Amount(200));
    }

    #[test]
    fn test_next_bid_opens_at_base_price() {
        assert_eq!(next_bid_amount(Amount::ZERO, Amount::crores(2)), Amount::crores(2));
    }

    #[test]
    fn test_next_bid_climbs_through_tiers() {
        let mut bid = Amount::ZERO;
        let mut seen = Vec::new();
        for _ in 0..4 {
            bid = next_bid_amount(bid, Amount(900));
            seen.push(bid.hundredths());
        }
        assert_eq!(seen, vec![900, 950, 1000, 1100]);
        assert_eq!(next_bid_amount(Amount(1900), Amount(200)), Amount(2000));
        assert_eq!(next_bid_amount(Amount(2000), Amount(200)), Amount(2200));
    }

    // =====================================================================
    // Nationality
    // =====================================================================

    #[test]
    fn test_is_foreign_ignores_case_and_whitespace() {
        assert!(!is_foreign("  india ", "India"));
        assert!(is_foreign("Australia", "India"));
        assert!(!is_foreign("", "India"));
    }

    #[test]
    fn test_foreign_count_skips_locals() {
        let team = team_with(Amount::crores(50), &["India", "England", "SOUTH AFRICA", ""]);
        assert_eq!(foreign_count(&team, "India"), 2);
        assert_eq!(foreign_count(&team, "England"), 2);
    }

    // =====================================================================
    // can_accept_bid
    // =====================================================================

    #[test]
    fn test_can_accept_bid_ok() {
        let team = team_with(Amount::crores(10), &[]);
        let lot = PlayerLot::new("A", Amount::crores(2), "India", "Bowler");
        assert_eq!(can_accept_bid(&team, &lot, Amount::crores(2), &ipl(15, 4)), Ok(()));
    }

    #[test]
    fn test_can_accept_bid_roster_full() {
        let team = team_with(Amount::crores(10), &["India"]);
        let lot = PlayerLot::new("A", Amount::crores(2), "India", "Bowler");
        assert_eq!(
            can_accept_bid(&team, &lot, Amount::crores(2), &ipl(1, 1)),
            Err(RuleViolation::RosterFull { capacity: 1 })
        );
    }

    #[test]
    fn test_can_accept_bid_foreign_cap() {
        let team = team_with(Amount::crores(10), &["Australia"]);
        let foreign = PlayerLot::new("A", Amount::crores(2), "New Zealand", "Bowler");
        let local = PlayerLot::new("B", Amount::crores(2), "India", "Bowler");
        assert_eq!(
            can_accept_bid(&team, &foreign, Amount::crores(2), &ipl(5, 1)),
            Err(RuleViolation::ForeignCapReached { cap: 1 })
        );
        assert_eq!(can_accept_bid(&team, &local, Amount::crores(2), &ipl(5, 1)), Ok(()));
    }

    #[test]
    fn test_can_accept_bid_exact_budget_is_allowed() {
        let team = team_with(Amount(250), &[]);
        let lot = PlayerLot::new("A", Amount::crores(2), "India", "Bowler");
        assert_eq!(can_accept_bid(&team, &lot, Amount(250), &ipl(5, 1)), Ok(()));
        assert_eq!(
            can_accept_bid(&team, &lot, Amount(300), &ipl(5, 1)),
            Err(RuleViolation::InsufficientBudget {
                needed: Amount(300),
                budget: Amount(250),
            })
        );
    }

    #[test]
    fn test_can_accept_bid_full_roster_reported_before_budget() {
        let team = team_with(Amount::ZERO, &["India"]);
        let lot = PlayerLot::new("A", Amount::crores(2), "India", "Bowler");
        assert!(matches!(
            can_accept_bid(&team, &lot, Amount::crores(2), &ipl(1, 1)),
            Err(RuleViolation::RosterFull { .. })
        ));
    }

    #[test]
    fn test_is_active() {
        assert!(is_active(&team_with(Amount(1), &[]), 1));
        assert!(!is_active(&team_with(Amount::ZERO, &[]), 1));
        assert!(!is_active(&team_with(Amount::crores(5), &["India"]), 1));
    }
}
