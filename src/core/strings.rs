//! Printable-run extraction
//!
//! Purely syntactic: a candidate is any maximal run of text-plausible bytes
//! (printable ASCII, TAB, LF) at least `min_len` long inside one region.

use crate::classifier::{Region, RegionId, RegionKind};
use crate::error::{AnalysisError, Result};
use crate::layout::{DEFAULT_MIN_STRING_LEN, HEADER_LEN};
use crate::residual::CandidateId;
use regex::bytes::Regex;
use serde::Serialize;

/// A run of printable bytes found inside one region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateString {
    pub id: CandidateId,
    pub start: u32,
    pub end: u32,
    pub text: String,
    /// Region the run was found in.
    pub region: RegionId,
    /// Kind of that region.
    pub kind: RegionKind,
    /// Header offset of that region, if any.
    pub block: Option<u32>,
    /// Run is immediately followed by a NUL byte.
    pub terminated: bool,
    /// Dump this candidate was recovered from.
    pub origin: u32,
}

impl CandidateString {
    pub fn len(&self) -> u32 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn intersects(&self, other: &CandidateString) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Extracts candidate strings from regions.
///
/// The compiled pattern is immutable, so one extractor can be reused for
/// every region and every call yields the same sequence.
#[derive(Debug, Clone)]
pub struct StringExtractor {
    min_len: usize,
    origin: u32,
    pattern: Regex,
}

impl StringExtractor {
    pub fn new(min_len: usize) -> Result<Self> {
        if min_len == 0 {
            return Err(AnalysisError::Config(
                "minimum string length must be at least 1".to_string(),
            ));
        }
        let pattern = Regex::new(&format!(r"(?-u)[\t\n\x20-\x7e]{{{},}}", min_len))
            .map_err(|e| AnalysisError::Config(e.to_string()))?;
        Ok(StringExtractor {
            min_len,
            origin: 0,
            pattern,
        })
    }

    /// Tag every candidate with `origin` (the index of the dump).
    pub fn with_origin(mut self, origin: u32) -> Self {
        self.origin = origin;
        self
    }

    pub fn min_len(&self) -> usize {
        self.min_len
    }

    /// Lazily scan `region` of `bytes`.
    ///
    /// The live region of a block begins with its header, which is skipped.
    pub fn extract<'a>(&self, bytes: &'a [u8], id: RegionId, region: &Region) -> StringRuns<'a> {
        let end = (region.end as usize).min(bytes.len());
        let mut start = region.start as usize;
        if region.kind.is_live() && region.block == Some(region.start) {
            start += HEADER_LEN;
        }
        let start = start.min(end);
        StringRuns {
            pattern: self.pattern.clone(),
            haystack: &bytes[start..end],
            pos: 0,
            base: start as u32,
            next_byte: bytes.get(end).copied(),
            region: id,
            kind: region.kind,
            block: region.block,
            origin: self.origin,
        }
    }
}

impl Default for StringExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_STRING_LEN).expect("default pattern compiles")
    }
}

/// Iterator over the candidate strings of one region.
///
/// Owns its scan position and nothing else mutable; dropping it and calling
/// `extract` again starts over from the region start.
pub struct StringRuns<'a> {
    pattern: Regex,
    haystack: &'a [u8],
    pos: usize,
    base: u32,
    next_byte: Option<u8>,
    region: RegionId,
    kind: RegionKind,
    block: Option<u32>,
    origin: u32,
}

impl<'a> Iterator for StringRuns<'a> {
    type Item = CandidateString;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.haystack.len() {
            return None;
        }
        let m = self.pattern.find_at(self.haystack, self.pos)?;
        self.pos = m.end();

        let follower = if m.end() < self.haystack.len() {
            Some(self.haystack[m.end()])
        } else {
            self.next_byte
        };
        let start = self.base + m.start() as u32;

        // The pattern only admits ASCII, so this conversion is lossless.
        let text = String::from_utf8_lossy(m.as_bytes()).into_owned();

        Some(CandidateString {
            id: CandidateId::new(self.origin, start),
            start,
            end: self.base + m.end() as u32,
            text,
            region: self.region,
            kind: self.kind,
            block: self.block,
            terminated: follower == Some(0),
            origin: self.origin,
        })
    }
}

/// Candidate strings in one region with the default threshold.
///
/// Takes the region together with its id, as yielded by
/// [`Timeline::iter`](crate::classifier::Timeline::iter).
pub fn extract_strings<'a>(bytes: &'a [u8], region: (RegionId, &Region)) -> StringRuns<'a> {
    StringExtractor::default().extract(bytes, region.0, region.1)
}
