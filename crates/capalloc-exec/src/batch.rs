//! Batch driver: feed every regular file in a directory through a [`Harness`].
//!
//! Non-recursive. Files are visited in path order so runs are reproducible.
//! Per-file failures (unreadable files, host errors) are logged and counted,
//! never propagated.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use capalloc_core::HostLibrary;
use capalloc_mem::PlatformAlloc;
use serde::Serialize;

use crate::runtime::{ExecError, Harness, RunReport};

#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    #[serde(flatten)]
    pub run: RunReport,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    /// Regular files found directly inside the directory.
    pub files_seen: usize,
    /// Files handed to the harness.
    pub files_processed: usize,
    /// Files that were empty or could not be read.
    pub files_skipped: usize,
    /// Processed files whose run ended in a host error.
    pub runs_failed: usize,
    pub pages_rendered: usize,
    /// Highest per-run peak usage across the batch.
    pub peak_bytes: usize,
    pub reports: Vec<FileReport>,
}

impl BatchSummary {
    fn record(&mut self, path: PathBuf, run: RunReport) {
        self.files_processed += 1;
        if !run.is_ok() {
            self.runs_failed += 1;
        }
        self.pages_rendered += run.pages_rendered;
        self.peak_bytes = self.peak_bytes.max(run.peak_bytes);
        self.reports.push(FileReport { path, run });
    }
}

/// Regular files directly inside `dir`, sorted.
pub fn list_inputs(dir: &Path) -> Result<Vec<PathBuf>, ExecError> {
    if !dir.is_dir() {
        return Err(ExecError::InvalidDirectory(dir.display().to_string()));
    }
    let entries = fs::read_dir(dir)?.map(|entry| entry.map(|e| e.path()));
    Ok(regular_files(entries))
}

/// Keep the regular files of a listing, sorted. Entries that cannot be read
/// are logged and dropped.
fn regular_files(entries: impl Iterator<Item = io::Result<PathBuf>>) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for entry in entries {
        let path = match entry {
            Ok(path) => path,
            Err(err) => {
                tracing::warn!(error = %err, "failed to read directory entry");
                continue;
            }
        };
        // Follows symlinks, so a link to a regular file counts as one.
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    files
}

pub fn run_directory<H, P>(
    dir: &Path,
    harness: &mut Harness<H, P>,
) -> Result<BatchSummary, ExecError>
where
    H: HostLibrary,
    P: PlatformAlloc,
{
    let files = list_inputs(dir)?;
    let mut summary = BatchSummary {
        files_seen: files.len(),
        ..Default::default()
    };

    for path in files {
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "failed to open file");
                summary.files_skipped += 1;
                continue;
            }
        };

        tracing::info!(path = %path.display(), bytes = data.len(), "running on file");
        if data.is_empty() {
            summary.files_skipped += 1;
            continue;
        }

        let run = harness.run_input(&data);
        summary.record(path, run);
    }

    tracing::info!(
        files = summary.files_processed,
        failed = summary.runs_failed,
        skipped = summary.files_skipped,
        pages = summary.pages_rendered,
        "batch complete"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreadable_entries_are_skipped() {
        let dir = std::env::temp_dir().join("capalloc-batch-unreadable-entry");
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).expect("mkdir");
        fs::write(dir.join("b.pdf"), b"x").expect("write b");
        fs::write(dir.join("a.pdf"), b"x").expect("write a");

        let entries = vec![
            Ok(dir.join("b.pdf")),
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied")),
            Ok(dir.join("a.pdf")),
            Ok(dir.join("missing.pdf")),
        ];
        let files = regular_files(entries.into_iter());
        assert_eq!(files, vec![dir.join("a.pdf"), dir.join("b.pdf")]);

        let _ = fs::remove_dir_all(&dir);
    }
}
