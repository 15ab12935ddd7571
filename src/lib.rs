//! # assocmem - Associative-Memory File Decoder
//!
//! `assocmem` decodes the on-disk associative-memory files of a legacy
//! form-letter system. It walks the linked block headers, partitions the file
//! into live strings, freed blocks, slack and unexplained bytes, recovers
//! printable fragments, and infers a partial "written before" order between
//! fragments that share a block.
//!
//! Input is read-only. Nothing in this crate ever writes to an analysed file.
//!
//! ## Quick Start
//!
//! ```rust
//! use assocmem::{Analyzer, BlockHeader, ByteSource, RegionKind, Result};
//!
//! # fn main() -> Result<()> {
//! // One allocated block: 4 bytes live (just the header), 6 bytes of slack.
//! let mut bytes = BlockHeader::new(0, 10, 4, true, None).to_bytes();
//! bytes.extend_from_slice(b"Madam!");
//!
//! let source = ByteSource::from_bytes(bytes)?;
//! let analysis = Analyzer::builder().build()?.analyze(&source)?;
//!
//! assert_eq!(analysis.regions()[1].kind, RegionKind::Slack);
//! assert_eq!(analysis.candidates[0].text, "Madam!");
//! # Ok(())
//! # }
//! ```
//!
//! ## Successive dumps
//!
//! ```rust,no_run
//! use assocmem::{Analyzer, ByteSource, Result};
//!
//! # fn main() -> Result<()> {
//! let dumps = [ByteSource::open("form.m.1")?, ByteSource::open("form.m.2")?];
//! let lineage = Analyzer::builder().min_string_len(4).build()?.analyze_lineage(&dumps)?;
//!
//! for rel in lineage.order.relations() {
//!     println!("{} before {} ({:?})", rel.earlier, rel.later, rel.evidence);
//! }
//! # Ok(())
//! # }
//! ```

pub mod core;

// Re-export core modules internally so crate:: paths in core still work
#[allow(unused_imports)]
pub(crate) use crate::core::{
    batch, classifier, config, error, header, layout, report, residual, source, strings, walker,
    xref,
};

// Re-export core types that users need
pub use crate::core::{
    batch::{analyze_files, FileAnalysis},
    classifier::{classify, Region, RegionId, RegionKind, Timeline},
    config::AnalysisConfig,
    error::{AnalysisError, HeaderViolation, Result, Warning},
    header::{parse_header, BlockHeader, HeaderAnomaly},
    layout::HEADER_LEN,
    report::{JsonLines, Record},
    residual::{
        infer_order, CandidateId, OrderEvidence, OrderInference, OrderOutcome, OverlapRelation,
        WriteOrder,
    },
    source::ByteSource,
    strings::{extract_strings, CandidateString, StringExtractor},
    walker::{walk, Chain, ListKind, Roots},
    xref::{find_references, find_references_in, Reference},
};

use crate::layout::NIL_LINK;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// Everything recovered from one dump.
#[derive(Debug, Clone)]
pub struct Analysis {
    /// Index of the dump in a lineage run, 0 otherwise.
    pub origin: u32,
    pub file_len: u32,
    /// Every header reached from a root, sorted by offset.
    pub headers: Vec<BlockHeader>,
    pub chains: Vec<Chain>,
    pub timeline: Timeline,
    /// Candidate strings in file order.
    pub candidates: Vec<CandidateString>,
    /// Write order over this dump's candidates alone.
    pub order: WriteOrder,
    pub references: Vec<Reference>,
    pub warnings: Vec<Warning>,
}

impl Analysis {
    pub fn regions(&self) -> &[Region] {
        self.timeline.regions()
    }

    /// Candidates recovered from slack, i.e. not part of any live string.
    pub fn residue(&self) -> impl Iterator<Item = &CandidateString> {
        self.candidates
            .iter()
            .filter(|c| c.kind == RegionKind::Slack)
    }

    pub fn candidate(&self, id: CandidateId) -> Option<&CandidateString> {
        self.candidates
            .binary_search_by_key(&id.offset, |c| c.start)
            .ok()
            .map(|i| &self.candidates[i])
            .filter(|c| c.id == id)
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn summary(&self) -> Summary {
        Summary {
            file_len: self.file_len,
            blocks: self.headers.len(),
            regions: self.regions().len(),
            coverage: self.timeline.coverage(),
            candidates: self.candidates.len(),
            residual_candidates: self.residue().count(),
            relations: self.order.edge_count(),
            references: self.references.len(),
            warnings: self.warnings.len(),
        }
    }
}

/// Counts for a one-line overview of an [`Analysis`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub file_len: u32,
    pub blocks: usize,
    pub regions: usize,
    /// Bytes covered per region kind.
    pub coverage: BTreeMap<RegionKind, u64>,
    pub candidates: usize,
    pub residual_candidates: usize,
    pub relations: usize,
    pub references: usize,
    pub warnings: usize,
}

/// Analyses of successive dumps plus the order inferred across all of them.
#[derive(Debug, Clone)]
pub struct Lineage {
    /// One analysis per dump, `origin` matching the index.
    pub analyses: Vec<Analysis>,
    /// Write order over the union of every dump's candidates.
    pub order: WriteOrder,
    /// Conflicts found while building the combined order.
    pub warnings: Vec<Warning>,
}

/// Runs the full pipeline: walk, classify, extract, order, cross-reference.
///
/// An `Analyzer` holds no per-file state and can be shared between threads.
#[derive(Debug, Clone)]
pub struct Analyzer {
    roots: Roots,
    extractor: StringExtractor,
    inference: OrderInference,
    scan_unclassified: bool,
}

impl Analyzer {
    pub fn builder() -> AnalyzerBuilder {
        AnalyzerBuilder::new()
    }

    pub fn from_config(config: &AnalysisConfig) -> Result<Self> {
        config.validate()?;
        Ok(Analyzer {
            roots: config.roots(),
            extractor: StringExtractor::new(config.min_string_len)?,
            inference: OrderInference::new(config.min_string_len),
            scan_unclassified: config.scan_unclassified,
        })
    }

    pub fn roots(&self) -> Roots {
        self.roots
    }

    /// Analyse one dump.
    pub fn analyze(&self, source: &ByteSource) -> Result<Analysis> {
        self.analyze_origin(source, 0)
    }

    /// Analyse one dump, tagging its candidates with `origin`.
    pub fn analyze_origin(&self, source: &ByteSource, origin: u32) -> Result<Analysis> {
        let bytes = source.bytes();
        let file_len = source.len();

        let walked = walk(bytes, &self.roots)?;
        let timeline = Timeline::new(classify(bytes, &walked.headers)?);
        debug!(
            "Classified {} bytes into {} regions",
            file_len,
            timeline.regions().len()
        );

        let extractor = self.extractor.clone().with_origin(origin);
        let candidates: Vec<CandidateString> = timeline
            .iter()
            .filter(|(_, r)| self.scan_unclassified || r.kind != RegionKind::Unclassified)
            .flat_map(|(id, r)| extractor.extract(bytes, id, r))
            .collect();

        let ordered = self.inference.infer(&candidates);

        // Zero words are everywhere; the nil link is not worth cross-referencing.
        let targets: BTreeSet<u32> = walked
            .headers
            .iter()
            .map(|h| h.offset)
            .filter(|&o| o != NIL_LINK as u32)
            .collect();
        let references = find_references_in(bytes, &targets, &timeline);

        let mut warnings = walked.warnings;
        warnings.extend(ordered.warnings);

        info!(
            "Analysed {:?}: {} blocks, {} candidates, {} relations, {} warnings",
            source.path(),
            walked.headers.len(),
            candidates.len(),
            ordered.order.edge_count(),
            warnings.len()
        );

        Ok(Analysis {
            origin,
            file_len,
            headers: walked.headers,
            chains: walked.chains,
            timeline,
            candidates,
            order: ordered.order,
            references,
            warnings,
        })
    }

    /// Analyse successive dumps of the same file, oldest first.
    ///
    /// Each dump is analysed on its own, then the write order is inferred
    /// again over the union of all candidates so that fragments can be
    /// related across dumps.
    pub fn analyze_lineage(&self, sources: &[ByteSource]) -> Result<Lineage> {
        let analyses = sources
            .iter()
            .enumerate()
            .map(|(i, s)| self.analyze_origin(s, i as u32))
            .collect::<Result<Vec<_>>>()?;

        let union: Vec<CandidateString> = analyses
            .iter()
            .flat_map(|a| a.candidates.iter().cloned())
            .collect();
        let combined = self.inference.infer(&union);

        info!(
            "Lineage of {} dumps: {} relations over {} candidates",
            analyses.len(),
            combined.order.edge_count(),
            combined.order.node_count()
        );

        Ok(Lineage {
            analyses,
            order: combined.order,
            warnings: combined.warnings,
        })
    }
}

impl Default for Analyzer {
    fn default() -> Self {
        Analyzer {
            roots: Roots::default(),
            extractor: StringExtractor::default(),
            inference: OrderInference::default(),
            scan_unclassified: false,
        }
    }
}

/// Builder for customizing an [`Analyzer`]
///
/// # Examples
///
/// ```rust
/// use assocmem::Analyzer;
///
/// let analyzer = Analyzer::builder()
///     .min_string_len(5)
///     .active_root(2)
///     .free_root(512)
///     .build()
///     .unwrap();
/// assert_eq!(analyzer.roots().free, Some(512));
/// ```
#[derive(Debug, Clone, Default)]
pub struct AnalyzerBuilder {
    config: AnalysisConfig,
}

impl AnalyzerBuilder {
    pub fn new() -> Self {
        AnalyzerBuilder {
            config: AnalysisConfig::default(),
        }
    }

    /// Start from a loaded configuration
    pub fn config(mut self, config: AnalysisConfig) -> Self {
        self.config = config;
        self
    }

    pub fn min_string_len(mut self, min_len: usize) -> Self {
        self.config.min_string_len = min_len;
        self
    }

    pub fn active_root(mut self, offset: u32) -> Self {
        self.config.active_root = Some(offset);
        self
    }

    /// Do not walk an active list
    pub fn no_active_root(mut self) -> Self {
        self.config.active_root = None;
        self
    }

    pub fn free_root(mut self, offset: u32) -> Self {
        self.config.free_root = Some(offset);
        self
    }

    /// Also extract candidates from unclassified bytes
    pub fn scan_unclassified(mut self, scan: bool) -> Self {
        self.config.scan_unclassified = scan;
        self
    }

    pub fn build(self) -> Result<Analyzer> {
        Analyzer::from_config(&self.config)
    }
}
