//! Free-text crush names to canonical members.
//!
//! Resolution is a two-step lookup over normalized names:
//!
//! 1. exact match on the whole normalized name
//! 2. if the candidate has at least two tokens, match on first + last token,
//!    which tolerates middle names and initials ("Jon A. Smith" → "Jon Smith")
//!
//! Members are indexed in id order, so "first match" is stable no matter how
//! the store happens to iterate its records.

use crate::model::Member;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Fold a name for comparison.
///
/// Lowercases, decomposes accented characters and drops the diacritics, then
/// collapses every run of non-alphanumeric characters into a single space.
/// The result has no leading or trailing whitespace.
pub fn normalize_name(input: &str) -> String {
    let folded: String = input
        .to_lowercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect();

    let mut out = String::with_capacity(folded.len());
    for token in folded.split(|c: char| !c.is_alphanumeric()) {
        if token.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(token);
    }
    out
}

/// How to break ties when several members share a name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmbiguityPolicy {
    /// The member with the lowest id wins
    #[default]
    FirstById,
    /// Ambiguous names resolve to nothing
    Reject,
}

impl std::str::FromStr for AmbiguityPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first" | "first_by_id" => Ok(Self::FirstById),
            "reject" => Ok(Self::Reject),
            other => Err(format!("unknown ambiguity policy: {}", other)),
        }
    }
}

/// Index of verified members by normalized name.
pub struct NameResolver<'a> {
    members: Vec<&'a Member>,
    exact: HashMap<String, Vec<usize>>,
    first_last: HashMap<(String, String), Vec<usize>>,
    policy: AmbiguityPolicy,
}

impl<'a> NameResolver<'a> {
    /// Build an index over `members`. Members without an identity name are
    /// never resolution targets.
    pub fn new(members: &'a [Member], policy: AmbiguityPolicy) -> Self {
        let mut sorted: Vec<&'a Member> = members.iter().collect();
        sorted.sort_by(|a, b| a.id.cmp(&b.id));

        let mut indexed = Vec::with_capacity(sorted.len());
        let mut exact: HashMap<String, Vec<usize>> = HashMap::new();
        let mut first_last: HashMap<(String, String), Vec<usize>> = HashMap::new();

        for member in sorted {
            let normalized = normalize_name(&member.identity_name);
            let Some((first, last)) = first_and_last(&normalized) else {
                continue;
            };
            let idx = indexed.len();
            indexed.push(member);
            first_last
                .entry((first.to_string(), last.to_string()))
                .or_default()
                .push(idx);
            exact.entry(normalized).or_default().push(idx);
        }

        Self {
            members: indexed,
            exact,
            first_last,
            policy,
        }
    }

    /// Resolve a crush string to a member, or `None` for an orphan.
    pub fn resolve(&self, candidate: &str) -> Option<&'a Member> {
        let normalized = normalize_name(candidate);
        if normalized.is_empty() {
            return None;
        }

        if let Some(hits) = self.exact.get(&normalized) {
            return self.pick(hits);
        }

        if normalized.split(' ').count() < 2 {
            return None;
        }
        let (first, last) = first_and_last(&normalized)?;
        self.first_last
            .get(&(first.to_string(), last.to_string()))
            .and_then(|hits| self.pick(hits))
    }

    /// Number of members that can be resolved to.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether no member can be resolved to.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    fn pick(&self, hits: &[usize]) -> Option<&'a Member> {
        match (hits, self.policy) {
            ([only], _) => Some(self.members[*only]),
            ([first, ..], AmbiguityPolicy::FirstById) => Some(self.members[*first]),
            _ => None,
        }
    }
}

/// One-shot resolution without keeping an index around.
pub fn resolve<'a>(candidate: &str, members: &'a [Member]) -> Option<&'a Member> {
    NameResolver::new(members, AmbiguityPolicy::default()).resolve(candidate)
}

fn first_and_last(normalized: &str) -> Option<(&str, &str)> {
    let mut tokens = normalized.split(' ').filter(|t| !t.is_empty());
    let first = tokens.next()?;
    let last = tokens.last().unwrap_or(first);
    Some((first, last))
}
