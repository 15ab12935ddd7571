//! Pointer cross-references
//!
//! Any aligned or unaligned 16-bit little-endian word whose value equals a
//! known offset is a potential pointer to it. Links inside headers show up
//! here as expected; the interesting hits are the ones in unclassified
//! bytes, which point at structures the layout does not yet explain.

use crate::classifier::{RegionKind, Timeline};
use crate::layout::read_word;
use serde::Serialize;
use std::collections::BTreeSet;

/// A word at `at` whose value is `target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Reference {
    pub at: u32,
    pub target: u32,
    /// Kind of the region holding the word, when a timeline was supplied.
    pub kind: Option<RegionKind>,
}

/// Every position in `bytes` whose little-endian word equals a target.
///
/// Targets above `u16::MAX` cannot be encoded in a word and are ignored.
pub fn find_references(bytes: &[u8], targets: &BTreeSet<u32>) -> Vec<Reference> {
    let wanted: BTreeSet<u16> = targets
        .iter()
        .filter_map(|&t| u16::try_from(t).ok())
        .collect();
    if wanted.is_empty() || bytes.len() < 2 {
        return Vec::new();
    }

    (0..bytes.len() - 1)
        .filter_map(|pos| {
            let word = read_word(bytes, pos);
            wanted.contains(&word).then_some(Reference {
                at: pos as u32,
                target: word as u32,
                kind: None,
            })
        })
        .collect()
}

/// Like [`find_references`], labelling each hit with its region kind.
pub fn find_references_in(
    bytes: &[u8],
    targets: &BTreeSet<u32>,
    timeline: &Timeline,
) -> Vec<Reference> {
    let mut refs = find_references(bytes, targets);
    for r in &mut refs {
        r.kind = timeline.region_at(r.at).map(|(_, region)| region.kind);
    }
    refs
}
