//! Residual recovery and write-order inference
//!
//! Slack bytes keep whatever a longer, earlier occupant of the block left
//! behind. Comparing the fragments of one block with each other and with
//! the live string gives "written before" facts; this module collects them
//! into a DAG and refuses any fact that would make the order cyclic.
//!
//! The result is deliberately partial. Fragments with no evidence between
//! them stay incomparable and no linear history is ever produced.

use crate::classifier::RegionKind;
use crate::error::Warning;
use crate::layout::DEFAULT_MIN_STRING_LEN;
use crate::strings::CandidateString;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Identity of a candidate string: the dump it came from and its offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CandidateId {
    pub origin: u32,
    pub offset: u32,
}

impl CandidateId {
    pub fn new(origin: u32, offset: u32) -> Self {
        CandidateId { origin, offset }
    }
}

impl std::fmt::Display for CandidateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.origin, self.offset)
    }
}

/// Why one candidate is believed to predate another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderEvidence {
    /// Slack fragment beyond the live string of the same block.
    Truncation,
    /// Slack fragment beyond a NUL-terminated slack fragment of the same block.
    SuccessiveSlack,
    /// Strings of two dumps at the same place, one inside the other's span,
    /// agreeing on a prefix or suffix but not throughout. The older dump's
    /// string is the earlier one.
    PartialOverwrite,
    /// Supplied by the caller.
    External,
}

/// `earlier` was overwritten or truncated before `later` was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlapRelation {
    pub earlier: CandidateId,
    pub later: CandidateId,
    pub evidence: OrderEvidence,
}

impl OverlapRelation {
    pub fn new(earlier: CandidateId, later: CandidateId, evidence: OrderEvidence) -> Self {
        OverlapRelation {
            earlier,
            later,
            evidence,
        }
    }
}

/// Partial order of writes as a DAG over candidate ids.
#[derive(Debug, Clone, Default)]
pub struct WriteOrder {
    nodes: BTreeSet<CandidateId>,
    successors: BTreeMap<CandidateId, BTreeSet<CandidateId>>,
    predecessors: BTreeMap<CandidateId, BTreeSet<CandidateId>>,
    relations: Vec<OverlapRelation>,
}

impl WriteOrder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, id: CandidateId) {
        self.nodes.insert(id);
    }

    /// Add `relation` unless it would close a cycle.
    ///
    /// Returns `Ok(true)` if a new edge was added, `Ok(false)` if the edge
    /// was already present, and `ConflictingOverlap` if `later` already
    /// precedes `earlier` (or they are the same candidate).
    pub fn propose(&mut self, relation: OverlapRelation) -> std::result::Result<bool, Warning> {
        let OverlapRelation { earlier, later, .. } = relation;

        if earlier == later || self.precedes(later, earlier) {
            return Err(Warning::ConflictingOverlap { earlier, later });
        }

        self.nodes.insert(earlier);
        self.nodes.insert(later);

        if !self.successors.entry(earlier).or_default().insert(later) {
            return Ok(false);
        }
        self.predecessors.entry(later).or_default().insert(earlier);
        self.relations.push(relation);
        Ok(true)
    }

    /// True if a chain of relations leads from `a` to `b`.
    pub fn precedes(&self, a: CandidateId, b: CandidateId) -> bool {
        if a == b {
            return false;
        }
        let mut stack = vec![a];
        let mut seen = BTreeSet::new();
        while let Some(node) = stack.pop() {
            let Some(next) = self.successors.get(&node) else {
                continue;
            };
            for &succ in next {
                if succ == b {
                    return true;
                }
                if seen.insert(succ) {
                    stack.push(succ);
                }
            }
        }
        false
    }

    /// Neither candidate is known to precede the other.
    pub fn incomparable(&self, a: CandidateId, b: CandidateId) -> bool {
        a != b && !self.precedes(a, b) && !self.precedes(b, a)
    }

    /// Candidates directly known to predate `id`.
    pub fn predecessors(&self, id: CandidateId) -> impl Iterator<Item = CandidateId> + '_ {
        self.predecessors.get(&id).into_iter().flatten().copied()
    }

    /// Candidates directly known to postdate `id`.
    pub fn successors(&self, id: CandidateId) -> impl Iterator<Item = CandidateId> + '_ {
        self.successors.get(&id).into_iter().flatten().copied()
    }

    /// Candidates with no known predecessor.
    pub fn oldest(&self) -> impl Iterator<Item = CandidateId> + '_ {
        self.nodes
            .iter()
            .copied()
            .filter(|id| self.predecessors.get(id).map_or(true, |p| p.is_empty()))
    }

    /// Accepted relations in insertion order.
    pub fn relations(&self) -> &[OverlapRelation] {
        &self.relations
    }

    pub fn nodes(&self) -> impl Iterator<Item = CandidateId> + '_ {
        self.nodes.iter().copied()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.relations.len()
    }
}

/// Result of [`infer_order`].
#[derive(Debug, Clone, Default)]
pub struct OrderOutcome {
    pub order: WriteOrder,
    pub warnings: Vec<Warning>,
}

/// Write-order inference with a tunable agreement threshold.
#[derive(Debug, Clone, Copy)]
pub struct OrderInference {
    /// Shortest common prefix or suffix accepted as partial-overwrite evidence.
    pub min_agreement: usize,
}

impl Default for OrderInference {
    fn default() -> Self {
        OrderInference {
            min_agreement: DEFAULT_MIN_STRING_LEN,
        }
    }
}

impl OrderInference {
    pub fn new(min_agreement: usize) -> Self {
        OrderInference { min_agreement }
    }

    /// Build the write order for `candidates`.
    ///
    /// Only candidates of the same block are compared. Every candidate
    /// becomes a node even when nothing is known about it.
    pub fn infer(&self, candidates: &[CandidateString]) -> OrderOutcome {
        let mut outcome = OrderOutcome::default();
        let mut by_block: BTreeMap<u32, Vec<&CandidateString>> = BTreeMap::new();

        for c in candidates {
            outcome.order.add_node(c.id);
            if let Some(block) = c.block {
                by_block.entry(block).or_default().push(c);
            }
        }

        for (block, mut group) in by_block {
            group.sort_by_key(|c| (c.start, c.origin, c.end));
            for (i, a) in group.iter().enumerate() {
                for b in &group[i + 1..] {
                    if let Some(relation) = self.compare(a, b) {
                        debug!(
                            "Block {}: {} before {} ({:?})",
                            block, relation.earlier, relation.later, relation.evidence
                        );
                        if let Err(w) = outcome.order.propose(relation) {
                            warn!("Block {}: dropped relation, {}", block, w);
                            outcome.warnings.push(w);
                        }
                    }
                }
            }
        }

        debug!(
            "Inferred {} relations over {} candidates",
            outcome.order.edge_count(),
            outcome.order.node_count()
        );
        outcome
    }

    fn compare(&self, a: &CandidateString, b: &CandidateString) -> Option<OverlapRelation> {
        if a.intersects(b) {
            return self.partial_overwrite(a, b);
        }
        if a.origin != b.origin {
            return None;
        }

        let (near, far) = if a.end <= b.start { (a, b) } else { (b, a) };
        if far.kind != RegionKind::Slack {
            return None;
        }
        if near.kind.is_live() {
            return Some(OverlapRelation::new(far.id, near.id, OrderEvidence::Truncation));
        }
        if near.kind == RegionKind::Slack && near.terminated {
            return Some(OverlapRelation::new(
                far.id,
                near.id,
                OrderEvidence::SuccessiveSlack,
            ));
        }
        None
    }

    fn partial_overwrite(
        &self,
        a: &CandidateString,
        b: &CandidateString,
    ) -> Option<OverlapRelation> {
        if a.origin == b.origin {
            return None;
        }
        let (inner, outer) = if strictly_within(a, b) {
            (a, b)
        } else if strictly_within(b, a) {
            (b, a)
        } else {
            return None;
        };

        let from = (inner.start - outer.start) as usize;
        let to = (inner.end - outer.start) as usize;
        let inner_text = inner.text.as_bytes();
        let outer_text = outer.text.as_bytes().get(from..to)?;
        if inner_text == outer_text {
            return None;
        }

        let prefix = common_prefix(inner_text.iter().copied(), outer_text.iter().copied());
        let suffix = common_prefix(
            inner_text.iter().rev().copied(),
            outer_text.iter().rev().copied(),
        );
        if prefix.max(suffix) < self.min_agreement {
            return None;
        }

        // Dumps are numbered oldest first.
        let (earlier, later) = if inner.origin < outer.origin {
            (inner, outer)
        } else {
            (outer, inner)
        };
        Some(OverlapRelation::new(
            earlier.id,
            later.id,
            OrderEvidence::PartialOverwrite,
        ))
    }
}

fn strictly_within(inner: &CandidateString, outer: &CandidateString) -> bool {
    inner.start >= outer.start
        && inner.end <= outer.end
        && (inner.start, inner.end) != (outer.start, outer.end)
}

fn common_prefix<A, B>(a: A, b: B) -> usize
where
    A: IntoIterator<Item = u8>,
    B: IntoIterator<Item = u8>,
{
    a.into_iter().zip(b).take_while(|(x, y)| x == y).count()
}

/// Infer the write order of `candidates` with default thresholds.
pub fn infer_order(candidates: &[CandidateString]) -> OrderOutcome {
    OrderInference::default().infer(candidates)
}
