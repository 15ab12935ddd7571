//! Batch analysis of independent files
//!
//! Each file is its own task with its own `ByteSource`. Workers share only
//! the read-only `Analyzer`, so there is nothing to lock.

use crate::error::{AnalysisError, Result};
use crate::source::ByteSource;
use crate::{Analysis, Analyzer};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Outcome for one input file.
#[derive(Debug)]
pub struct FileAnalysis {
    pub path: PathBuf,
    pub result: Result<(ByteSource, Analysis)>,
}

fn analyze_path(analyzer: &Analyzer, path: &Path) -> Result<(ByteSource, Analysis)> {
    let source = ByteSource::open(path)?;
    let analysis = analyzer.analyze(&source)?;
    Ok((source, analysis))
}

/// Analyse every path on scoped worker threads, at most `workers` at a time.
///
/// Results come back in input order. A failure in one file never affects the
/// others.
pub fn analyze_files<P: AsRef<Path> + Sync>(
    analyzer: &Analyzer,
    paths: &[P],
    workers: usize,
) -> Vec<FileAnalysis> {
    let workers = workers.max(1);
    let mut results = Vec::with_capacity(paths.len());

    for chunk in paths.chunks(workers) {
        debug!("Analysing batch of {} files", chunk.len());
        let batch: Vec<FileAnalysis> = crossbeam::thread::scope(|s| {
            let handles: Vec<_> = chunk
                .iter()
                .map(|p| {
                    let path = p.as_ref();
                    (path, s.spawn(move |_| analyze_path(analyzer, path)))
                })
                .collect();

            handles
                .into_iter()
                .map(|(path, handle)| FileAnalysis {
                    path: path.to_path_buf(),
                    result: handle.join().unwrap_or_else(|_| {
                        warn!("Worker for {:?} panicked", path);
                        Err(AnalysisError::WorkerPanicked(path.display().to_string()))
                    }),
                })
                .collect()
        })
        .unwrap_or_else(|_| {
            // Every handle was joined above, so the scope itself cannot
            // report a panic that was not already captured.
            Vec::new()
        });
        results.extend(batch);
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::BlockHeader;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_results_keep_input_order() {
        let dir = TempDir::new().unwrap();
        let mut paths = Vec::new();
        for i in 0..5u16 {
            let mut bytes = BlockHeader::new(0, 12, 12, true, None).to_bytes();
            bytes.extend_from_slice(format!("letter{i:02}").as_bytes());
            let path = dir.path().join(format!("dump{i}.m"));
            fs::write(&path, bytes).unwrap();
            paths.push(path);
        }
        paths.insert(2, dir.path().join("missing.m"));

        let results = analyze_files(&Analyzer::default(), &paths, 2);
        assert_eq!(results.len(), 6);
        for (path, file) in paths.iter().zip(&results) {
            assert_eq!(&file.path, path);
        }

        assert!(matches!(results[2].result, Err(AnalysisError::Io(_))));
        let (source, analysis) = results[3].result.as_ref().unwrap();
        assert_eq!(source.len(), 12);
        assert_eq!(analysis.candidates[0].text, "letter02");
    }
}
