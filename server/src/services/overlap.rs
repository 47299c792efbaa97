use crate::services::cidr::NetworkRange;
use crate::types::OverlapEntry;

/// A persisted subnet's range, loaded straight from the store's integer
/// bounds columns.
#[derive(Debug, Clone)]
pub struct SubnetRange {
    pub id: String,
    pub name: Option<String>,
    pub cidr: String,
    pub start: u32,
    pub end: u32,
}

/// Inclusive intersection test over the 32-bit address space.
pub fn ranges_intersect(a_start: u32, a_end: u32, b_start: u32, b_end: u32) -> bool {
    a_start <= b_end && b_start <= a_end
}

/// Every existing subnet whose range intersects the candidate, in store
/// order. `exclude_id` lets an edit-in-place re-validation skip the subnet
/// being edited.
pub fn find_overlaps(
    candidate: &NetworkRange,
    existing: &[SubnetRange],
    exclude_id: Option<&str>,
) -> Vec<OverlapEntry> {
    existing
        .iter()
        .filter(|s| exclude_id != Some(s.id.as_str()))
        .filter(|s| ranges_intersect(candidate.first(), candidate.last(), s.start, s.end))
        .map(|s| OverlapEntry {
            id: s.id.clone(),
            name: s.name.clone(),
            cidr: s.cidr.clone(),
        })
        .collect()
}
