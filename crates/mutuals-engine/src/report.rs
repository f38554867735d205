//! Aggregate snapshots for the scheduled report.
//!
//! Reports are computed from stored member data and appended to a separate
//! analytics record. They never write member records, so producing one can
//! not retrigger a recompute.

use crate::error::Result;
use crate::model::{now_millis, Member};
use crate::resolver::{AmbiguityPolicy, NameResolver};
use crate::store::MemberStore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A mutual pair, names in sorted order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MatchPair {
    pub first: String,
    pub second: String,
    pub matched_at: u64,
}

/// Point-in-time statistics over the member collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReportSnapshot {
    /// When the snapshot was taken (unix millis)
    pub generated_at: u64,
    pub total_members: usize,
    pub verified_members: usize,
    /// Members with at least one crush
    pub participants: usize,
    /// `participants / total_members`, 0 for an empty roster
    pub participation_rate: f64,
    pub total_crushes: usize,
    /// Crush entries that resolve to no current member
    pub orphan_crushes: usize,
    pub matches: Vec<MatchPair>,
}

impl ReportSnapshot {
    /// Build a snapshot from stored member data.
    pub fn from_members(members: &[Member], policy: AmbiguityPolicy, now: u64) -> Self {
        let resolver = NameResolver::new(members, policy);

        let total_members = members.len();
        let verified_members = members.iter().filter(|m| m.is_verified()).count();
        let participants = members.iter().filter(|m| !m.crushes.is_empty()).count();
        let total_crushes = members.iter().map(|m| m.crushes.len()).sum();
        let orphan_crushes = members
            .iter()
            .flat_map(|m| m.crushes.iter())
            .filter(|c| resolver.resolve(c).is_none())
            .count();

        let mut pairs: BTreeMap<(String, String), u64> = BTreeMap::new();
        for member in members {
            for entry in &member.matches {
                let key = if member.identity_name <= entry.peer_name {
                    (member.identity_name.clone(), entry.peer_name.clone())
                } else {
                    (entry.peer_name.clone(), member.identity_name.clone())
                };
                let at = pairs.entry(key).or_insert(entry.matched_at);
                *at = (*at).min(entry.matched_at);
            }
        }

        Self {
            generated_at: now,
            total_members,
            verified_members,
            participants,
            participation_rate: if total_members == 0 {
                0.0
            } else {
                participants as f64 / total_members as f64
            },
            total_crushes,
            orphan_crushes,
            matches: pairs
                .into_iter()
                .map(|((first, second), matched_at)| MatchPair {
                    first,
                    second,
                    matched_at,
                })
                .collect(),
        }
    }
}

/// Snapshot the store and append a report to its analytics record.
pub fn periodic_report<S: MemberStore + ?Sized>(
    store: &S,
    policy: AmbiguityPolicy,
) -> Result<ReportSnapshot> {
    let members = store.snapshot()?;
    let report = ReportSnapshot::from_members(&members, policy, now_millis());
    store.append_report(&report)?;
    tracing::info!(
        "Report: {} members, {} participants, {} match pairs",
        report.total_members,
        report.participants,
        report.matches.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MatchEntry;
    use crate::store::MemoryStore;

    fn matched(id: &str, name: &str, peer: &str, at: u64) -> Member {
        let mut member = Member::new(id.into(), String::new())
            .with_name(name)
            .with_crushes([peer]);
        member.matches.push(MatchEntry {
            peer_name: peer.into(),
            peer_contact: String::new(),
            matched_at: at,
        });
        member
    }

    #[test]
    fn empty_roster() {
        let report = ReportSnapshot::from_members(&[], AmbiguityPolicy::FirstById, 1);
        assert_eq!(report.total_members, 0);
        assert_eq!(report.participation_rate, 0.0);
        assert!(report.matches.is_empty());
    }

    #[test]
    fn pairs_are_listed_once() {
        let members = vec![
            matched("a", "Ada", "Bob", 5),
            matched("b", "Bob", "Ada", 3),
            Member::new("c".into(), String::new()).with_crushes(["Nobody Here"]),
            Member::new("d".into(), String::new()),
        ];
        let report = ReportSnapshot::from_members(&members, AmbiguityPolicy::FirstById, 9);

        assert_eq!(report.total_members, 4);
        assert_eq!(report.verified_members, 2);
        assert_eq!(report.participants, 3);
        assert_eq!(report.participation_rate, 0.75);
        assert_eq!(report.total_crushes, 3);
        assert_eq!(report.orphan_crushes, 1);
        assert_eq!(
            report.matches,
            vec![MatchPair {
                first: "Ada".into(),
                second: "Bob".into(),
                matched_at: 3,
            }]
        );
    }

    #[test]
    fn periodic_report_appends_without_touching_members() {
        let store = MemoryStore::new();
        store.insert(matched("a", "Ada", "Bob", 1)).unwrap();
        let before = store.snapshot().unwrap();

        let report = periodic_report(&store, AmbiguityPolicy::FirstById).unwrap();
        assert_eq!(store.latest_report().unwrap(), Some(report));
        assert_eq!(store.snapshot().unwrap(), before);
    }
}
