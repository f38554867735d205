//! Full-population match calculation.
//!
//! Given every member, derive for each one:
//!
//! - `crush_count`: how many other members have a crush resolving to them
//! - `matches`: peers whose crushes resolve back to them
//! - `locked_crushes`: previous locks plus every crush text that is part of a match
//!
//! Crushes that resolve to nobody land in an orphan bucket keyed by their
//! literal text. Self-crushes and repeated crushes on the same target within
//! one list are tallied as redundant, so that
//! `Σ crush_count + Σ orphans + redundant == total crush entries`.

use crate::model::{MatchEntry, Member, MemberId};
use crate::resolver::{AmbiguityPolicy, NameResolver};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Derived state for one member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberOutcome {
    /// Stored crush counter
    pub crush_count: u32,
    /// Mutual matches, in crush-list order
    pub matches: Vec<MatchEntry>,
    /// Previous locks followed by newly locked crush text
    pub locked_crushes: Vec<String>,
}

/// Aggregate figures for one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecomputeTotals {
    pub members: usize,
    pub verified_members: usize,
    pub crush_entries: usize,
    pub resolved_crushes: usize,
    pub orphan_crushes: usize,
    pub redundant_crushes: usize,
    pub match_pairs: usize,
    pub new_locks: usize,
}

/// Result of a full pass over the population.
#[derive(Debug, Clone, Default)]
pub struct Recomputation {
    /// Resolved crush counts keyed by target member id
    pub crush_counts: HashMap<MemberId, u32>,
    /// Unresolved crushes keyed by literal text
    pub orphans: BTreeMap<String, u32>,
    /// Per-member derived state
    pub outcomes: HashMap<MemberId, MemberOutcome>,
    /// Aggregates
    pub totals: RecomputeTotals,
}

impl Recomputation {
    /// Derived state for `id`, if that member was part of the pass.
    pub fn outcome(&self, id: &str) -> Option<&MemberOutcome> {
        self.outcomes.get(id)
    }

    /// Orphan count for a literal crush text.
    pub fn orphan_count(&self, literal: &str) -> u32 {
        self.orphans.get(literal).copied().unwrap_or(0)
    }
}

/// Stateless calculator; the policy decides name collisions.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchCalculator {
    policy: AmbiguityPolicy,
}

impl MatchCalculator {
    /// Create a calculator with the given tie-break policy.
    pub fn new(policy: AmbiguityPolicy) -> Self {
        Self { policy }
    }

    /// Recompute derived state for every member.
    ///
    /// `now` stamps match entries that did not exist before; existing entries
    /// keep their original timestamp, so running twice changes nothing.
    pub fn recompute(&self, members: &[Member], now: u64) -> Recomputation {
        let resolver = NameResolver::new(members, self.policy);
        let mut result = Recomputation::default();
        result.totals.members = members.len();

        // Resolve every crush once: targets[i][j] is the resolved id of members[i].crushes[j]
        let mut targets: Vec<Vec<Option<&str>>> = Vec::with_capacity(members.len());
        for member in members {
            let mut seen: HashSet<&str> = HashSet::new();
            let mut row = Vec::with_capacity(member.crushes.len());
            for crush in &member.crushes {
                result.totals.crush_entries += 1;
                let target = resolver.resolve(crush).map(|t| t.id.as_str());
                match target {
                    Some(id) if id == member.id || !seen.insert(id) => {
                        result.totals.redundant_crushes += 1;
                    }
                    Some(id) => {
                        *result.crush_counts.entry(id.to_string()).or_insert(0) += 1;
                        result.totals.resolved_crushes += 1;
                    }
                    None => {
                        *result.orphans.entry(crush.clone()).or_insert(0) += 1;
                        result.totals.orphan_crushes += 1;
                    }
                }
                row.push(target);
            }
            targets.push(row);
        }

        // Who each verified member's crushes point at, for the mutuality test
        let by_id: HashMap<&str, usize> = members
            .iter()
            .enumerate()
            .map(|(i, m)| (m.id.as_str(), i))
            .collect();
        let wants: Vec<HashSet<&str>> = targets
            .iter()
            .zip(members)
            .map(|(row, member)| {
                if member.is_verified() {
                    row.iter().flatten().copied().collect()
                } else {
                    HashSet::new()
                }
            })
            .collect();

        for (i, member) in members.iter().enumerate() {
            let previous: HashMap<&str, u64> = member
                .matches
                .iter()
                .map(|m| (m.peer_name.as_str(), m.matched_at))
                .collect();
            let mut locked = member.locked_crushes.clone();
            let mut matches = Vec::new();
            let mut matched: HashSet<&str> = HashSet::new();

            if member.is_verified() {
                result.totals.verified_members += 1;
                for (crush, target) in member.crushes.iter().zip(&targets[i]) {
                    let Some(target_id) = *target else { continue };
                    if target_id == member.id {
                        continue;
                    }
                    let Some(&j) = by_id.get(target_id) else { continue };
                    if !wants[j].contains(member.id.as_str()) {
                        continue;
                    }
                    let peer = &members[j];
                    if matched.insert(target_id) {
                        matches.push(MatchEntry {
                            peer_name: peer.identity_name.clone(),
                            peer_contact: peer.contact.clone(),
                            matched_at: previous
                                .get(peer.identity_name.as_str())
                                .copied()
                                .unwrap_or(now),
                        });
                    }
                    if !locked.contains(crush) {
                        locked.push(crush.clone());
                        result.totals.new_locks += 1;
                    }
                }
            }
            result.totals.match_pairs += matches.len();

            let crush_count = result
                .crush_counts
                .get(&member.id)
                .copied()
                .unwrap_or(0)
                .max(result.orphans.get(&member.id).copied().unwrap_or(0));

            result.outcomes.insert(
                member.id.clone(),
                MemberOutcome {
                    crush_count,
                    matches,
                    locked_crushes: locked,
                },
            );
        }

        // Each pair was counted once from each side
        result.totals.match_pairs /= 2;
        result
    }
}
