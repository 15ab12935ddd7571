use crate::error::{AnalysisError, HeaderViolation, Result};
use crate::layout::{
    read_word, BLOCK_ALIGN, BUSY_BIT, CAPACITY_BYTE, CAPACITY_RESERVED_MASK, HEADER_LEN,
    LINK_MASK, LINK_WORD, NIL_LINK, USED_BYTE,
};
use serde::{Deserialize, Serialize};

/// Decoded block header
///
/// One header per block, at the block's first byte. `capacity` and
/// `used_length` are measured from `offset`, so both include the header
/// itself. The raw record is kept so a header can be re-derived if the
/// layout assumptions in [`crate::layout`] change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Position of the header in the file
    pub offset: u32,

    /// Allocated length of the block
    pub capacity: u16,

    /// Logical length of the live content (always `<= capacity`)
    pub used_length: u16,

    /// BUSY bit of the link word
    pub allocated: bool,

    /// Next header on the same list, `None` at end of list
    pub next_offset: Option<u32>,

    /// Header bytes as found on disk
    pub raw: [u8; HEADER_LEN],
}

/// Suspicious but non-fatal header properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HeaderAnomaly {
    /// Capacity too small to hold the header itself.
    CapacityBelowHeader { capacity: u16 },
    /// Used length too small to hold the header itself.
    UsedBelowHeader { used_length: u16 },
    /// Block runs past the end of the file.
    BlockPastEof { end: u32, len: u32 },
    /// Header is not word aligned.
    Misaligned,
    /// Link points beyond the end of the file.
    LinkPastEof { next_offset: u32, len: u32 },
}

impl std::fmt::Display for HeaderAnomaly {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HeaderAnomaly::CapacityBelowHeader { capacity } => {
                write!(f, "capacity {capacity} is smaller than the header")
            }
            HeaderAnomaly::UsedBelowHeader { used_length } => {
                write!(f, "used length {used_length} is smaller than the header")
            }
            HeaderAnomaly::BlockPastEof { end, len } => {
                write!(f, "block ends at {end}, past end of file ({len})")
            }
            HeaderAnomaly::Misaligned => write!(f, "header is not word aligned"),
            HeaderAnomaly::LinkPastEof { next_offset, len } => {
                write!(f, "link {next_offset} points past end of file ({len})")
            }
        }
    }
}

/// Decode the header at `offset`.
///
/// Pure function of `bytes` and `offset`. Fails with `OutOfBounds` if the
/// record does not fit in the file and with `InvalidHeader` if
/// `used_length > capacity` or a reserved bit is set. Everything else is
/// left to [`BlockHeader::anomalies`].
pub fn parse_header(bytes: &[u8], offset: u32) -> Result<BlockHeader> {
    let len = bytes.len();
    let start = offset as usize;
    if start.checked_add(HEADER_LEN).map_or(true, |end| end > len) {
        return Err(AnalysisError::OutOfBounds {
            offset,
            needed: HEADER_LEN as u32,
            len: len as u32,
        });
    }

    let mut raw = [0u8; HEADER_LEN];
    raw.copy_from_slice(&bytes[start..start + HEADER_LEN]);

    let link = read_word(&raw, LINK_WORD);
    let capacity_byte = raw[CAPACITY_BYTE];
    let used_length = raw[USED_BYTE] as u16;

    let reserved = capacity_byte & CAPACITY_RESERVED_MASK;
    if reserved != 0 {
        return Err(AnalysisError::InvalidHeader {
            offset,
            violation: HeaderViolation::ReservedBitsSet { bits: reserved },
        });
    }

    let capacity = capacity_byte as u16;
    if used_length > capacity {
        return Err(AnalysisError::InvalidHeader {
            offset,
            violation: HeaderViolation::UsedExceedsCapacity {
                used_length,
                capacity,
            },
        });
    }

    let next = link & LINK_MASK;
    let header = BlockHeader {
        offset,
        capacity,
        used_length,
        allocated: link & BUSY_BIT != 0,
        next_offset: (next != NIL_LINK).then_some(next as u32),
        raw,
    };

    tracing::debug!(
        "Parsed header at {}: capacity={} used={} allocated={} next={:?}",
        offset,
        header.capacity,
        header.used_length,
        header.allocated,
        header.next_offset
    );

    Ok(header)
}

impl BlockHeader {
    /// Build a header in memory. Fields are taken as given.
    pub fn new(
        offset: u32,
        capacity: u16,
        used_length: u16,
        allocated: bool,
        next_offset: Option<u32>,
    ) -> Self {
        let mut header = BlockHeader {
            offset,
            capacity,
            used_length,
            allocated,
            next_offset,
            raw: [0; HEADER_LEN],
        };
        header.raw = header.encode();
        header
    }

    /// Encode to the on-disk record.
    ///
    /// Values wider than their field are truncated; use this to build
    /// synthetic dumps, including deliberately corrupt ones.
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut link = self.next_offset.map_or(NIL_LINK, |n| n as u16) & LINK_MASK;
        if self.allocated {
            link |= BUSY_BIT;
        }

        let mut raw = [0u8; HEADER_LEN];
        raw[LINK_WORD..LINK_WORD + 2].copy_from_slice(&link.to_le_bytes());
        raw[CAPACITY_BYTE] = self.capacity as u8;
        raw[USED_BYTE] = self.used_length as u8;
        raw
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.encode().to_vec()
    }

    /// End of the live content (exclusive).
    pub fn used_end(&self) -> u32 {
        self.offset + self.used_length as u32
    }

    /// End of the block (exclusive).
    pub fn end(&self) -> u32 {
        self.offset + self.capacity as u32
    }

    /// Number of slack bytes between the live content and the block end.
    pub fn slack_len(&self) -> u16 {
        self.capacity.saturating_sub(self.used_length)
    }

    /// Anomalies worth a warning, given the length of the file.
    pub fn anomalies(&self, file_len: u32) -> Vec<HeaderAnomaly> {
        let mut found = Vec::new();

        if (self.capacity as usize) < HEADER_LEN {
            found.push(HeaderAnomaly::CapacityBelowHeader {
                capacity: self.capacity,
            });
        }
        if (self.used_length as usize) < HEADER_LEN {
            found.push(HeaderAnomaly::UsedBelowHeader {
                used_length: self.used_length,
            });
        }
        if self.end() > file_len {
            found.push(HeaderAnomaly::BlockPastEof {
                end: self.end(),
                len: file_len,
            });
        }
        if self.offset % BLOCK_ALIGN != 0 {
            found.push(HeaderAnomaly::Misaligned);
        }
        if let Some(next) = self.next_offset {
            if next >= file_len {
                found.push(HeaderAnomaly::LinkPastEof {
                    next_offset: next,
                    len: file_len,
                });
            }
        }

        found
    }
}
