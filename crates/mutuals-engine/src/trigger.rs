//! Materiality test for change events.
//!
//! The engine's own writes land on the records it watches. Only the fields a
//! client may change (crush list, identity name) decide whether a change is
//! worth a recompute, so engine writes never retrigger.

use crate::model::Member;

fn crush_set(crushes: &[String]) -> Vec<String> {
    let mut set: Vec<String> = crushes.iter().map(|c| c.trim().to_lowercase()).collect();
    set.sort();
    set.dedup();
    set
}

/// Whether the change from `before` to `after` should cause a recompute.
pub fn is_material(before: &Member, after: &Member) -> bool {
    before.identity_name != after.identity_name
        || crush_set(&before.crushes) != crush_set(&after.crushes)
}

/// [`is_material`] for a signup, where there is no previous record.
pub fn is_material_change(before: Option<&Member>, after: &Member) -> bool {
    match before {
        Some(before) => is_material(before, after),
        None => !after.identity_name.is_empty() || !after.crushes.is_empty(),
    }
}
