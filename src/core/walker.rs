//! Block list traversal
//!
//! Headers are linked into an active list and a free list through their
//! link words. The walker follows both chains from their roots, parsing each
//! header once into an offset-indexed arena and keeping a visited set per
//! list, so a corrupt chain that loops back on itself ends in a
//! `CycleDetected` warning instead of an endless walk.

use crate::error::{Result, Warning};
use crate::header::{parse_header, BlockHeader};
use crate::layout::DEFAULT_ACTIVE_ROOT;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Which chain a block was reached from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListKind {
    Active,
    Free,
}

impl ListKind {
    /// BUSY bit expected on blocks of this list.
    pub fn expects_allocated(self) -> bool {
        matches!(self, ListKind::Active)
    }
}

impl std::fmt::Display for ListKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListKind::Active => write!(f, "active"),
            ListKind::Free => write!(f, "free"),
        }
    }
}

/// Root offsets of the two lists.
///
/// Neither root is confirmed; both can be overridden.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roots {
    pub active: Option<u32>,
    pub free: Option<u32>,
}

impl Roots {
    pub fn new(active: Option<u32>, free: Option<u32>) -> Self {
        Roots { active, free }
    }

    fn lists(&self) -> impl Iterator<Item = (ListKind, u32)> {
        [
            self.active.map(|o| (ListKind::Active, o)),
            self.free.map(|o| (ListKind::Free, o)),
        ]
        .into_iter()
        .flatten()
    }
}

impl Default for Roots {
    fn default() -> Self {
        Roots {
            active: Some(DEFAULT_ACTIVE_ROOT),
            free: None,
        }
    }
}

/// Offsets visited on one list, in chain order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chain {
    pub list: ListKind,
    pub offsets: Vec<u32>,
}

/// Everything the walker found.
#[derive(Debug, Clone, Default)]
pub struct WalkOutcome {
    /// Every reachable header, once, sorted by offset.
    pub headers: Vec<BlockHeader>,
    /// The chains as walked.
    pub chains: Vec<Chain>,
    pub warnings: Vec<Warning>,
}

impl WalkOutcome {
    pub fn header_at(&self, offset: u32) -> Option<&BlockHeader> {
        self.headers
            .binary_search_by_key(&offset, |h| h.offset)
            .ok()
            .map(|i| &self.headers[i])
    }
}

/// Follow every root's chain and collect the headers reached.
///
/// Fatal header errors abort the walk. A chain that revisits one of its own
/// offsets is cut there with a `CycleDetected` warning; a block reached from
/// both lists is kept once and reported as `SharedBlock`.
pub fn walk(bytes: &[u8], roots: &Roots) -> Result<WalkOutcome> {
    let file_len = bytes.len() as u32;
    let mut arena: BTreeMap<u32, BlockHeader> = BTreeMap::new();
    let mut owner: BTreeMap<u32, ListKind> = BTreeMap::new();
    let mut outcome = WalkOutcome::default();

    for (list, root) in roots.lists() {
        let mut visited = BTreeSet::new();
        let mut offsets = Vec::new();
        let mut cursor = Some(root);

        while let Some(offset) = cursor {
            if !visited.insert(offset) {
                warn!("Cycle in {} list: offset {} revisited", list, offset);
                outcome
                    .warnings
                    .push(Warning::CycleDetected { list, offset });
                break;
            }

            if let Some(&first) = owner.get(&offset) {
                if first != list {
                    warn!("Block {} is on both the {} and {} lists", offset, first, list);
                    outcome.warnings.push(Warning::SharedBlock { offset });
                    // The rest of this chain was already walked from the other root.
                    offsets.push(offset);
                    break;
                }
            }

            let header = match arena.get(&offset) {
                Some(h) => *h,
                None => {
                    let h = parse_header(bytes, offset)?;
                    for anomaly in h.anomalies(file_len) {
                        warn!("Header at {}: {}", offset, anomaly);
                        outcome
                            .warnings
                            .push(Warning::HeaderAnomaly { offset, anomaly });
                    }
                    if h.allocated != list.expects_allocated() {
                        warn!("Block {} on {} list has busy={}", offset, list, h.allocated);
                        outcome
                            .warnings
                            .push(Warning::ListFlagMismatch { list, offset });
                    }
                    arena.insert(offset, h);
                    owner.insert(offset, list);
                    h
                }
            };

            offsets.push(offset);
            cursor = header.next_offset;
        }

        debug!("Walked {} list from {}: {} blocks", list, root, offsets.len());
        outcome.chains.push(Chain { list, offsets });
    }

    outcome.headers = arena.into_values().collect();
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AnalysisError;

    fn file_with(headers: &[BlockHeader], len: usize) -> Vec<u8> {
        let mut bytes = vec![0u8; len];
        for h in headers {
            let at = h.offset as usize;
            bytes[at..at + 4].copy_from_slice(&h.encode());
        }
        bytes
    }

    #[test]
    fn test_walk_active_chain() {
        let bytes = file_with(
            &[
                BlockHeader::new(0, 8, 6, true, Some(8)),
                BlockHeader::new(8, 8, 8, true, Some(16)),
                BlockHeader::new(16, 8, 4, true, None),
            ],
            24,
        );

        let outcome = walk(&bytes, &Roots::default()).unwrap();
        assert_eq!(outcome.headers.len(), 3);
        assert_eq!(outcome.chains[0].offsets, vec![0, 8, 16]);
        assert!(outcome.warnings.is_empty());
        assert_eq!(outcome.header_at(8).unwrap().used_length, 8);
        assert!(outcome.header_at(4).is_none());
    }

    #[test]
    fn test_cycle_is_cut_with_warning() {
        let bytes = file_with(
            &[
                BlockHeader::new(2, 8, 4, true, Some(10)),
                BlockHeader::new(10, 8, 4, true, Some(2)),
            ],
            18,
        );

        let outcome = walk(&bytes, &Roots::new(Some(2), None)).unwrap();
        assert_eq!(outcome.headers.len(), 2);
        assert_eq!(outcome.chains[0].offsets, vec![2, 10]);
        assert_eq!(
            outcome.warnings,
            vec![Warning::CycleDetected {
                list: ListKind::Active,
                offset: 2
            }]
        );
    }

    #[test]
    fn test_self_link_is_a_cycle() {
        let bytes = file_with(&[BlockHeader::new(4, 8, 4, true, Some(4))], 12);
        let outcome = walk(&bytes, &Roots::new(Some(4), None)).unwrap();
        assert_eq!(outcome.chains[0].offsets, vec![4]);
        assert_eq!(outcome.warnings.len(), 1);
    }

    #[test]
    fn test_free_list_and_flag_mismatch() {
        let bytes = file_with(
            &[
                BlockHeader::new(0, 8, 8, true, None),
                BlockHeader::new(8, 8, 4, false, Some(16)),
                BlockHeader::new(16, 8, 4, true, None),
            ],
            24,
        );

        let outcome = walk(&bytes, &Roots::new(Some(0), Some(8))).unwrap();
        assert_eq!(outcome.headers.len(), 3);
        assert_eq!(outcome.chains[1].list, ListKind::Free);
        assert_eq!(outcome.chains[1].offsets, vec![8, 16]);
        assert_eq!(
            outcome.warnings,
            vec![Warning::ListFlagMismatch {
                list: ListKind::Free,
                offset: 16
            }]
        );
    }

    #[test]
    fn test_block_on_both_lists() {
        let bytes = file_with(
            &[
                BlockHeader::new(0, 8, 8, true, Some(8)),
                BlockHeader::new(8, 8, 8, true, None),
                BlockHeader::new(16, 8, 4, false, Some(8)),
            ],
            24,
        );

        let outcome = walk(&bytes, &Roots::new(Some(0), Some(16))).unwrap();
        assert_eq!(outcome.headers.len(), 3);
        assert!(outcome
            .warnings
            .contains(&Warning::SharedBlock { offset: 8 }));
    }

    #[test]
    fn test_link_past_eof_is_fatal() {
        let bytes = file_with(&[BlockHeader::new(0, 8, 4, true, Some(100))], 8);
        let err = walk(&bytes, &Roots::default()).unwrap_err();
        assert!(matches!(err, AnalysisError::OutOfBounds { offset: 100, .. }));
    }

    #[test]
    fn test_no_roots_walks_nothing() {
        let outcome = walk(&[], &Roots::new(None, None)).unwrap();
        assert!(outcome.headers.is_empty());
        assert!(outcome.chains.is_empty());
    }
}
