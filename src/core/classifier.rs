//! Memory classifier
//!
//! Turns the walked headers into a partition of the file: every byte ends up
//! in exactly one [`Region`]. Header-derived regions that overlap are never
//! reconciled; the classifier fails with `OverlapDetected` and leaves the
//! disagreement to whoever reads the dump next.

use crate::error::{AnalysisError, Result};
use crate::header::BlockHeader;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// What a range of bytes is believed to hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionKind {
    /// Live part of an allocated block
    AllocatedString,
    /// Live part of a block on the free list
    FreedBlock,
    /// Bytes between a block's used length and its capacity
    Slack,
    /// Not reachable from any header
    Unclassified,
}

impl RegionKind {
    /// True for the live part of a block, allocated or not.
    pub fn is_live(self) -> bool {
        matches!(self, RegionKind::AllocatedString | RegionKind::FreedBlock)
    }
}

/// Index of a region in the ordered sequence returned by [`classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegionId(pub usize);

/// Half-open byte range `[start, end)` with one classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub start: u32,
    pub end: u32,
    pub kind: RegionKind,
    /// Offset of the header this region was derived from.
    pub block: Option<u32>,
}

impl Region {
    pub fn new(start: u32, end: u32, kind: RegionKind, block: Option<u32>) -> Self {
        Region {
            start,
            end,
            kind,
            block,
        }
    }

    pub fn len(&self) -> u32 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, offset: u32) -> bool {
        offset >= self.start && offset < self.end
    }

    pub fn overlaps(&self, other: &Region) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Partition `[0, bytes.len())` into labelled regions, ordered by start.
///
/// Each header yields its live range (`AllocatedString` or `FreedBlock`)
/// and, if `capacity > used_length`, a `Slack` range. Gaps become
/// `Unclassified`. Fails with `OutOfBounds` if a block runs past the end of
/// the file and `OverlapDetected` if two derived regions overlap.
pub fn classify(bytes: &[u8], headers: &[BlockHeader]) -> Result<Vec<Region>> {
    let file_len = bytes.len() as u32;
    let mut derived = Vec::with_capacity(headers.len() * 2);

    for h in headers {
        let block_end = h.offset as u64 + h.capacity as u64;
        if block_end > file_len as u64 {
            return Err(AnalysisError::OutOfBounds {
                offset: h.offset,
                needed: h.capacity as u32,
                len: file_len,
            });
        }

        let live_kind = if h.allocated {
            RegionKind::AllocatedString
        } else {
            RegionKind::FreedBlock
        };
        let live = Region::new(h.offset, h.used_end(), live_kind, Some(h.offset));
        if !live.is_empty() {
            derived.push(live);
        }

        if h.capacity > h.used_length {
            derived.push(Region::new(
                h.used_end(),
                h.end(),
                RegionKind::Slack,
                Some(h.offset),
            ));
        }
    }

    derived.sort_by_key(|r| (r.start, r.end));

    for pair in derived.windows(2) {
        if pair[0].overlaps(&pair[1]) {
            return Err(AnalysisError::OverlapDetected {
                first: pair[0],
                second: pair[1],
            });
        }
    }

    let mut regions = Vec::with_capacity(derived.len() * 2 + 1);
    let mut cursor = 0u32;
    for region in derived {
        if region.start > cursor {
            regions.push(Region::new(cursor, region.start, RegionKind::Unclassified, None));
        }
        cursor = region.end;
        regions.push(region);
    }
    if cursor < file_len {
        regions.push(Region::new(cursor, file_len, RegionKind::Unclassified, None));
    }

    debug!(
        "Classified {} bytes into {} regions from {} headers",
        file_len,
        regions.len(),
        headers.len()
    );

    Ok(regions)
}

/// Classified regions with lookup helpers.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Timeline {
    regions: Vec<Region>,
}

impl Timeline {
    pub fn new(regions: Vec<Region>) -> Self {
        Timeline { regions }
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn get(&self, id: RegionId) -> Option<&Region> {
        self.regions.get(id.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (RegionId, &Region)> {
        self.regions.iter().enumerate().map(|(i, r)| (RegionId(i), r))
    }

    /// Region containing `offset`, if inside the file.
    pub fn region_at(&self, offset: u32) -> Option<(RegionId, &Region)> {
        let idx = self.regions.partition_point(|r| r.end <= offset);
        self.regions
            .get(idx)
            .filter(|r| r.contains(offset))
            .map(|r| (RegionId(idx), r))
    }

    /// Regions derived from the header at `block`.
    pub fn regions_of_block(&self, block: u32) -> impl Iterator<Item = (RegionId, &Region)> {
        self.iter().filter(move |(_, r)| r.block == Some(block))
    }

    /// Bytes covered per kind.
    pub fn coverage(&self) -> BTreeMap<RegionKind, u64> {
        let mut totals = BTreeMap::new();
        for r in &self.regions {
            *totals.entry(r.kind).or_insert(0) += r.len() as u64;
        }
        totals
    }

    pub fn into_regions(self) -> Vec<Region> {
        self.regions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocated_block_with_slack() {
        let bytes = [0u8; 10];
        let headers = [BlockHeader::new(0, 10, 4, true, None)];

        let regions = classify(&bytes, &headers).unwrap();
        assert_eq!(
            regions,
            vec![
                Region::new(0, 4, RegionKind::AllocatedString, Some(0)),
                Region::new(4, 10, RegionKind::Slack, Some(0)),
            ]
        );
    }

    #[test]
    fn test_gaps_are_unclassified() {
        let bytes = [0u8; 32];
        let headers = [
            BlockHeader::new(4, 8, 8, false, None),
            BlockHeader::new(20, 6, 4, true, None),
        ];

        let regions = classify(&bytes, &headers).unwrap();
        let kinds: Vec<_> = regions.iter().map(|r| (r.start, r.end, r.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                (0, 4, RegionKind::Unclassified),
                (4, 12, RegionKind::FreedBlock),
                (12, 20, RegionKind::Unclassified),
                (20, 24, RegionKind::AllocatedString),
                (24, 26, RegionKind::Slack),
                (26, 32, RegionKind::Unclassified),
            ]
        );
    }

    #[test]
    fn test_no_headers_is_one_unclassified_region() {
        let regions = classify(&[1, 2, 3], &[]).unwrap();
        assert_eq!(regions, vec![Region::new(0, 3, RegionKind::Unclassified, None)]);
        assert!(classify(&[], &[]).unwrap().is_empty());
    }

    #[test]
    fn test_overlap_is_surfaced() {
        let bytes = [0u8; 20];
        let headers = [
            BlockHeader::new(0, 12, 4, true, None),
            BlockHeader::new(8, 8, 8, true, None),
        ];

        match classify(&bytes, &headers) {
            Err(AnalysisError::OverlapDetected { first, second }) => {
                assert_eq!(first, Region::new(4, 12, RegionKind::Slack, Some(0)));
                assert_eq!(second.start, 8);
            }
            other => panic!("expected overlap, got {:?}", other),
        }
    }

    #[test]
    fn test_block_past_eof_is_out_of_bounds() {
        let bytes = [0u8; 8];
        let headers = [BlockHeader::new(0, 10, 4, true, None)];
        assert!(matches!(
            classify(&bytes, &headers),
            Err(AnalysisError::OutOfBounds { offset: 0, needed: 10, len: 8 })
        ));
    }

    #[test]
    fn test_timeline_lookup() {
        let bytes = [0u8; 16];
        let headers = [BlockHeader::new(2, 10, 6, true, None)];
        let timeline = Timeline::new(classify(&bytes, &headers).unwrap());

        let (id, region) = timeline.region_at(9).unwrap();
        assert_eq!(id, RegionId(2));
        assert_eq!(region.kind, RegionKind::Slack);
        assert_eq!(timeline.region_at(0).unwrap().1.kind, RegionKind::Unclassified);
        assert!(timeline.region_at(16).is_none());

        assert_eq!(timeline.regions_of_block(2).count(), 2);

        let coverage = timeline.coverage();
        assert_eq!(coverage[&RegionKind::AllocatedString], 6);
        assert_eq!(coverage[&RegionKind::Slack], 4);
        assert_eq!(coverage[&RegionKind::Unclassified], 6);
    }
}
