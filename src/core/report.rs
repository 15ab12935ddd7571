//! JSON-lines records for downstream review tools
//!
//! One object per line, each tagged with `"record"`. The shapes are plain
//! structured records so that any consumer can read them without this crate.

use crate::classifier::{Region, RegionKind};
use crate::error::{Result, Warning};
use crate::residual::{CandidateId, OrderEvidence};
use crate::source::ByteSource;
use crate::Analysis;
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Serialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum Record<'a> {
    Source {
        path: Option<String>,
        origin: u32,
        length: u32,
        sha256: String,
    },
    Region {
        offset: u32,
        length: u32,
        kind: RegionKind,
        block: Option<u32>,
    },
    String {
        id: CandidateId,
        offset: u32,
        length: u32,
        kind: RegionKind,
        block: Option<u32>,
        text: &'a str,
    },
    Edge {
        earlier: CandidateId,
        later: CandidateId,
        evidence: OrderEvidence,
    },
    Reference {
        at: u32,
        target: u32,
        kind: Option<RegionKind>,
    },
    Warning {
        message: String,
        detail: &'a Warning,
    },
}

impl<'a> From<&'a Region> for Record<'a> {
    fn from(r: &'a Region) -> Self {
        Record::Region {
            offset: r.start,
            length: r.len(),
            kind: r.kind,
            block: r.block,
        }
    }
}

/// Writes records, one JSON object per line.
pub struct JsonLines<W: Write> {
    out: W,
}

impl<W: Write> JsonLines<W> {
    pub fn new(out: W) -> Self {
        JsonLines { out }
    }

    pub fn write(&mut self, record: &Record<'_>) -> Result<()> {
        serde_json::to_writer(&mut self.out, record)?;
        self.out.write_all(b"\n")?;
        Ok(())
    }

    /// Source line, regions, strings, references, then warnings.
    ///
    /// Edges are left to [`JsonLines::write_edges`] so lineage runs can emit
    /// the combined order once.
    pub fn write_analysis(
        &mut self,
        source: &ByteSource,
        origin: u32,
        analysis: &Analysis,
    ) -> Result<()> {
        self.write(&Record::Source {
            path: source.path().map(|p| p.display().to_string()),
            origin,
            length: source.len(),
            sha256: source.sha256_hex(),
        })?;
        for region in analysis.regions() {
            self.write(&Record::from(region))?;
        }
        for c in &analysis.candidates {
            self.write(&Record::String {
                id: c.id,
                offset: c.start,
                length: c.len(),
                kind: c.kind,
                block: c.block,
                text: &c.text,
            })?;
        }
        for r in &analysis.references {
            self.write(&Record::Reference {
                at: r.at,
                target: r.target,
                kind: r.kind,
            })?;
        }
        self.write_warnings(&analysis.warnings)
    }

    pub fn write_edges(&mut self, order: &crate::residual::WriteOrder) -> Result<()> {
        for rel in order.relations() {
            self.write(&Record::Edge {
                earlier: rel.earlier,
                later: rel.later,
                evidence: rel.evidence,
            })?;
        }
        Ok(())
    }

    pub fn write_warnings(&mut self, warnings: &[Warning]) -> Result<()> {
        for w in warnings {
            self.write(&Record::Warning {
                message: w.to_string(),
                detail: w,
            })?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
