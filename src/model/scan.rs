use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;

use super::PluginRecord;

/// Category of a non-fatal problem met during a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// A subdirectory of the root could not be listed.
    SubdirectoryAccess,
    /// A candidate file could not be opened or read.
    FileRead,
    /// A symbolic link resolved to a location outside the scan root.
    OutsideRoot,
    /// A symbolic link pointed back at one of its own ancestors.
    SymlinkLoop,
}

impl DiagnosticKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticKind::SubdirectoryAccess => "subdirectory access",
            DiagnosticKind::FileRead => "file read",
            DiagnosticKind::OutsideRoot => "outside root",
            DiagnosticKind::SymlinkLoop => "symlink loop",
        }
    }
}

impl std::fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub path: PathBuf,
    pub kind: DiagnosticKind,
    pub message: String,
}

impl Diagnostic {
    pub fn new(path: impl Into<PathBuf>, kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind,
            message: message.into(),
        }
    }
}

/// Per-candidate outcome counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanStats {
    /// Files that passed the depth and extension filters.
    pub candidates: usize,
    /// Candidates that produced a record.
    pub recorded: usize,
    /// Candidates without a valid header.
    pub skipped: usize,
    /// Candidates that could not be read.
    pub failed: usize,
}

/// The outcome of one detection run.
///
/// Records are sorted by relative path once the scan finishes, so two scans
/// of the same tree yield identical record lists.
#[derive(Debug, Clone, Serialize)]
pub struct ScanResult {
    pub root: PathBuf,
    pub scanned_at: DateTime<Utc>,
    pub records: Vec<PluginRecord>,
    pub diagnostics: Vec<Diagnostic>,
    pub stats: ScanStats,
    /// The scan stopped early; records and diagnostics are partial.
    pub cancelled: bool,
}

impl ScanResult {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            scanned_at: Utc::now(),
            records: Vec::new(),
            diagnostics: Vec::new(),
            stats: ScanStats::default(),
            cancelled: false,
        }
    }

    /// Puts records and diagnostics into their deterministic order.
    pub fn sort(&mut self) {
        self.records
            .sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        self.diagnostics
            .sort_by(|a, b| a.path.cmp(&b.path).then(a.kind.cmp(&b.kind)));
    }

    /// Keeps only the first record seen for each slug.
    ///
    /// This mirrors how WordPress itself treats a directory with more than
    /// one header file. The detector never applies it on its own; callers opt in.
    pub fn first_per_slug(&self) -> Vec<PluginRecord> {
        let mut seen = HashSet::new();
        self.records
            .iter()
            .filter(|record| seen.insert(record.slug.as_str()))
            .cloned()
            .collect()
    }

    pub fn mismatches(&self) -> impl Iterator<Item = &PluginRecord> {
        self.records.iter().filter(|record| record.version_mismatch)
    }

    pub fn has_mismatch(&self) -> bool {
        self.mismatches().next().is_some()
    }
}
