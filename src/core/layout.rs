//! On-disk layout of an associative-memory block header
//!
//! Nothing here comes from published documentation. Every constant is
//! inferred from hex dumps and may need revision. All other modules read the
//! layout through these names only.
//!
//! # Layout
//!
//! ```text
//! offset  size  field
//! +0      2     link word (little-endian 16-bit)
//!               bits 15..1  next block offset (word aligned)
//!               bit  0      BUSY flag (block allocated)
//! +2      1     capacity     block length, header included
//! +3      1     used length  live length, header included
//! ```
//!
//! A block occupies `[offset, offset + capacity)`. The live string is
//! `[offset, offset + used)`; the rest of the block is slack.

/// Size of one header record in bytes: two 16-bit words.
pub const HEADER_LEN: usize = 4;

/// Byte offset of the link word within a header.
pub const LINK_WORD: usize = 0;

/// Byte offset of the capacity byte within a header.
pub const CAPACITY_BYTE: usize = 2;

/// Byte offset of the used-length byte within a header.
pub const USED_BYTE: usize = 3;

/// BUSY bit of the link word. Links are word aligned, so the allocator
/// borrows bit 0 to mark a block in use (the same trick as the PDP-11 era
/// `malloc`, whose `testbusy` masks the low pointer bit).
pub const BUSY_BIT: u16 = 0x0001;

/// Mask extracting the next-block offset from the link word.
pub const LINK_MASK: u16 = !BUSY_BIT;

/// Link value terminating a list. Offset 0 may hold a root block but is
/// never the target of a link.
pub const NIL_LINK: u16 = 0;

/// Must-be-zero bits of the capacity byte. Blocks are allocated in whole
/// words, so an odd capacity means the header is not what we think it is.
pub const CAPACITY_RESERVED_MASK: u8 = 0x01;

/// Alignment every block offset is expected to have.
pub const BLOCK_ALIGN: u32 = 2;

/// Offset of the active-list root when none is configured.
///
/// Unconfirmed: every dump examined so far starts with a live block.
pub const DEFAULT_ACTIVE_ROOT: u32 = 0;

/// Minimum printable-run length used by the string extractor by default.
pub const DEFAULT_MIN_STRING_LEN: usize = 3;

/// Read a little-endian 16-bit word at `pos`. Caller checks bounds.
#[inline]
pub(crate) fn read_word(bytes: &[u8], pos: usize) -> u16 {
    u16::from_le_bytes([bytes[pos], bytes[pos + 1]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_fit_in_header() {
        assert!(LINK_WORD + 2 <= HEADER_LEN);
        assert!(CAPACITY_BYTE < HEADER_LEN);
        assert!(USED_BYTE < HEADER_LEN);
        assert_eq!(LINK_MASK | BUSY_BIT, u16::MAX);
    }

    #[test]
    fn test_read_word_is_little_endian() {
        assert_eq!(read_word(&[0x34, 0x12], 0), 0x1234);
        assert_eq!(read_word(&[0xff, 0x01, 0x00], 1), 0x0001);
    }
}
