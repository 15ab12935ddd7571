use crate::core::classifier::Region;
use crate::core::header::HeaderAnomaly;
use crate::core::residual::CandidateId;
use crate::core::walker::ListKind;
use serde::Serialize;
use thiserror::Error;

/// Fatal analysis errors.
///
/// The three format violations (`OutOfBounds`, `InvalidHeader`,
/// `OverlapDetected`) mean the bytes do not match the assumed layout closely
/// enough to trust further output. Each carries the offending byte offset.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Out of bounds at offset {offset}: need {needed} bytes, file is {len} bytes")]
    OutOfBounds { offset: u32, needed: u32, len: u32 },

    #[error("Invalid header at offset {offset}: {violation}")]
    InvalidHeader {
        offset: u32,
        violation: HeaderViolation,
    },

    #[error(
        "Overlapping regions at offset {}: {:?} [{}, {}) and {:?} [{}, {})",
        .second.start, .first.kind, .first.start, .first.end,
        .second.kind, .second.start, .second.end
    )]
    OverlapDetected { first: Region, second: Region },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Worker for {0} panicked")]
    WorkerPanicked(String),

    #[error("File too large to address: {0} bytes")]
    FileTooLarge(u64),
}

impl AnalysisError {
    /// True for the errors that describe the file itself rather than the
    /// environment it was loaded from.
    pub fn is_format_violation(&self) -> bool {
        matches!(
            self,
            AnalysisError::OutOfBounds { .. }
                | AnalysisError::InvalidHeader { .. }
                | AnalysisError::OverlapDetected { .. }
        )
    }

    /// Byte offset that violated an invariant, if any.
    pub fn offset(&self) -> Option<u32> {
        match self {
            AnalysisError::OutOfBounds { offset, .. }
            | AnalysisError::InvalidHeader { offset, .. } => Some(*offset),
            AnalysisError::OverlapDetected { second, .. } => Some(second.start),
            _ => None,
        }
    }
}

/// The two header invariants known to hold for every well-formed block.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HeaderViolation {
    #[error("used length {used_length} exceeds capacity {capacity}")]
    UsedExceedsCapacity { used_length: u16, capacity: u16 },

    #[error("reserved bits set: {bits:#04x}")]
    ReservedBitsSet { bits: u8 },
}

/// Recoverable anomalies, collected alongside the result instead of aborting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "warning", rename_all = "snake_case")]
pub enum Warning {
    /// A `next_offset` chain revisited `offset`; the chain was cut there.
    CycleDetected { list: ListKind, offset: u32 },

    /// Accepting `earlier -> later` would have made the write order cyclic.
    ConflictingOverlap {
        earlier: CandidateId,
        later: CandidateId,
    },

    /// The block at `offset` is reachable from both the active and free list.
    SharedBlock { offset: u32 },

    /// The BUSY bit of the block at `offset` disagrees with its list.
    ListFlagMismatch { list: ListKind, offset: u32 },

    /// Header parsed but looks suspicious.
    HeaderAnomaly { offset: u32, anomaly: HeaderAnomaly },
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::CycleDetected { list, offset } => {
                write!(f, "cycle detected in {list} list at offset {offset}")
            }
            Warning::ConflictingOverlap { earlier, later } => write!(
                f,
                "conflicting overlap: {earlier} before {later} contradicts existing order"
            ),
            Warning::SharedBlock { offset } => {
                write!(f, "block at offset {offset} is on both lists")
            }
            Warning::ListFlagMismatch { list, offset } => write!(
                f,
                "block at offset {offset} on {list} list has the wrong busy bit"
            ),
            Warning::HeaderAnomaly { offset, anomaly } => {
                write!(f, "header at offset {offset}: {anomaly}")
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
