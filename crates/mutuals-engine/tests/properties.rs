//! Property tests over randomly generated populations.

use mutuals_engine::{
    normalize_name, plan_recompute, restore_locks, EngineWrite, MatchCalculator, Member,
};
use proptest::prelude::*;
use proptest::sample::{select, subsequence};
use std::collections::HashMap;

const NAMES: &[&str] = &[
    "Ada Lovelace",
    "Bob Ross",
    "Zoë Martín",
    "Jon Smith",
    "Grace Hopper",
    "Alan Turing",
    "Jon Paul Smith",
    "Émile Zola",
    "Mary Ann Shelley",
    "Linus Torvalds",
];

fn spelling() -> impl Strategy<Value = String> {
    prop_oneof![
        select(NAMES).prop_map(|n| n.to_string()),
        select(NAMES).prop_map(|n| n.to_uppercase()),
        select(NAMES).prop_map(|n| format!("  {}  ", n.to_lowercase())),
        Just("Jon A. Smith".to_string()),
        Just("Zoe Martin".to_string()),
        Just("Mary Shelley".to_string()),
        Just("Nobody Known".to_string()),
    ]
}

fn population() -> impl Strategy<Value = Vec<Member>> {
    (2usize..=8)
        .prop_flat_map(|n| {
            (
                subsequence(NAMES.to_vec(), n),
                prop::collection::vec(
                    (prop::bool::weighted(0.85), prop::collection::vec(spelling(), 0..5)),
                    n,
                ),
            )
        })
        .prop_map(|(names, rows)| {
            names
                .into_iter()
                .zip(rows)
                .enumerate()
                .map(|(i, (name, (verified, crushes)))| {
                    let member = Member::new(format!("id-{:02}", i), format!("c{}", i))
                        .with_crushes(crushes);
                    if verified {
                        member.with_name(name)
                    } else {
                        member
                    }
                })
                .collect()
        })
}

fn apply(members: &mut [Member], writes: &[EngineWrite]) {
    for write in writes {
        if let Some(member) = members.iter_mut().find(|m| m.id == write.id) {
            member.apply_engine_write(write);
        }
    }
}

fn recomputed(members: &[Member], now: u64) -> Vec<Member> {
    let mut members = members.to_vec();
    let plan = plan_recompute(members.clone(), &MatchCalculator::default(), now);
    apply(&mut members, &plan.writes);
    members
}

proptest! {
    #[test]
    fn normalization_is_idempotent(input in "[a-zA-ZÀ-ÖØ-öø-ÿ0-9 .,'_-]{0,40}") {
        let once = normalize_name(&input);
        prop_assert_eq!(normalize_name(&once), once);
    }

    #[test]
    fn recompute_is_idempotent(members in population()) {
        let once = recomputed(&members, 100);
        let plan = plan_recompute(once.clone(), &MatchCalculator::default(), 200);
        prop_assert!(plan.writes.is_empty(), "second pass wrote {:?}", plan.writes);
        prop_assert_eq!(recomputed(&once, 300), once);
    }

    #[test]
    fn matches_are_symmetric(members in population()) {
        let members = recomputed(&members, 1);
        let by_name: HashMap<&str, &Member> = members
            .iter()
            .filter(|m| m.is_verified())
            .map(|m| (m.identity_name.as_str(), m))
            .collect();

        for member in &members {
            for entry in &member.matches {
                let peer = by_name.get(entry.peer_name.as_str());
                prop_assert!(peer.is_some(), "match on unknown peer {}", entry.peer_name);
                let peer = peer.unwrap();
                prop_assert!(
                    peer.matches.iter().any(|e| e.peer_name == member.identity_name),
                    "{} matches {} but not the other way round",
                    member.identity_name,
                    peer.identity_name
                );
            }
        }
    }

    #[test]
    fn counts_are_conserved(members in population()) {
        let result = MatchCalculator::default().recompute(&members, 1);
        let entries: usize = members.iter().map(|m| m.crushes.len()).sum();
        let counted: u32 = members
            .iter()
            .map(|m| result.outcome(&m.id).map(|o| o.crush_count).unwrap_or(0))
            .sum();
        let orphans: u32 = result.orphans.values().sum();

        prop_assert_eq!(
            counted as usize + orphans as usize + result.totals.redundant_crushes,
            entries
        );
    }

    #[test]
    fn locks_never_shrink(
        members in population(),
        edits in prop::collection::vec(
            prop::collection::vec((0usize..8, prop::collection::vec(spelling(), 0..4)), 1..4),
            1..5,
        ),
    ) {
        let mut members = recomputed(&members, 1);
        for (step, round) in edits.into_iter().enumerate() {
            let before: Vec<Vec<String>> =
                members.iter().map(|m| m.locked_crushes.clone()).collect();

            let len = members.len();
            for (index, crushes) in round {
                let member = &mut members[index % len];
                member.crushes =
                    restore_locks(&member.locked_crushes, &crushes).unwrap_or(crushes);
                member.revision += 1;
            }
            members = recomputed(&members, step as u64 + 2);

            for (member, old) in members.iter().zip(before) {
                for lock in &old {
                    prop_assert!(member.locked_crushes.contains(lock));
                    prop_assert!(member.crushes.contains(lock));
                }
            }
        }
    }
}
