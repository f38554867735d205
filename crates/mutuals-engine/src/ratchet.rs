//! Lock ratchet: a crush that became a match can never be withdrawn.

use crate::model::Member;

/// Locked crushes of `before` that are missing from `after`'s crush list.
///
/// Comparison is on the exact stored text; locks are copied verbatim from the
/// crush list, so a client that re-cases a locked entry still loses nothing.
pub fn missing_locks(locked: &[String], crushes: &[String]) -> Vec<String> {
    let mut missing: Vec<String> = Vec::new();
    for lock in locked {
        if !crushes.contains(lock) && !missing.contains(lock) {
            missing.push(lock.clone());
        }
    }
    missing
}

/// Check a client update against the locks held before it.
///
/// Returns `None` when every locked crush is still present, otherwise the
/// corrected list: the client's crushes followed by the restored entries,
/// de-duplicated.
pub fn enforce_locks(before: &Member, after: &Member) -> Option<Vec<String>> {
    restore_locks(&before.locked_crushes, &after.crushes)
}

/// Same as [`enforce_locks`] on bare lists.
pub fn restore_locks(locked: &[String], crushes: &[String]) -> Option<Vec<String>> {
    let missing = missing_locks(locked, crushes);
    if missing.is_empty() {
        return None;
    }

    let mut corrected: Vec<String> = Vec::with_capacity(crushes.len() + missing.len());
    for crush in crushes.iter().chain(missing.iter()) {
        if !corrected.contains(crush) {
            corrected.push(crush.clone());
        }
    }
    Some(corrected)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_locks(crushes: &[&str], locked: &[&str]) -> Member {
        let mut member = Member::new("a".into(), String::new()).with_crushes(crushes.iter().copied());
        member.locked_crushes = locked.iter().map(|s| s.to_string()).collect();
        member
    }

    #[test]
    fn dropping_a_locked_crush_is_restored() {
        let before = with_locks(&["B", "C"], &["B"]);
        let after = with_locks(&["C"], &["B"]);
        assert_eq!(
            enforce_locks(&before, &after),
            Some(vec!["C".to_string(), "B".to_string()])
        );
    }

    #[test]
    fn dropping_an_unlocked_crush_is_fine() {
        let before = with_locks(&["B", "C"], &["B"]);
        let after = with_locks(&["B"], &["B"]);
        assert_eq!(enforce_locks(&before, &after), None);
    }

    #[test]
    fn restored_list_is_deduplicated() {
        let corrected = restore_locks(
            &["B".to_string(), "B".to_string(), "D".to_string()],
            &["C".to_string(), "C".to_string()],
        )
        .unwrap();
        assert_eq!(corrected, vec!["C", "B", "D"]);
    }

    #[test]
    fn nothing_locked_nothing_to_do() {
        assert_eq!(restore_locks(&[], &[]), None);
        assert!(missing_locks(&[], &["A".to_string()]).is_empty());
    }
}
