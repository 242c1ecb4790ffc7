//! Candidate file discovery.
//!
//! The [`Scanner`] lists plugin source files the way WordPress does when it
//! builds its plugin list: files directly inside the plugins directory and
//! files one subdirectory down. Nothing deeper is ever visited, whatever it
//! contains.
//!
//! # Example
//!
//! ```no_run
//! use wpdetect::scanner::{ScanEvent, Scanner};
//!
//! let scanner = Scanner::new("wp-content/plugins");
//! for event in scanner.walk()? {
//!     match event {
//!         ScanEvent::Candidate(candidate) => println!("{}", candidate.path.display()),
//!         ScanEvent::Diagnostic(diagnostic) => eprintln!("{}", diagnostic.message),
//!     }
//! }
//! # Ok::<(), wpdetect::DetectError>(())
//! ```

use crate::error::DetectError;
use crate::model::{CandidatePath, Diagnostic, DiagnosticKind};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Extension of WordPress plugin source files.
pub const DEFAULT_EXTENSION: &str = "php";

/// Deepest level a candidate may sit at below the root.
pub const MAX_DEPTH: usize = 2;

/// One item produced while walking the scan root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    Candidate(CandidatePath),
    Diagnostic(Diagnostic),
}

/// Everything a complete walk produced.
#[derive(Debug, Default)]
pub struct ScanOutput {
    pub candidates: Vec<CandidatePath>,
    pub diagnostics: Vec<Diagnostic>,
}

pub struct Scanner {
    root: PathBuf,
    extension: String,
}

impl Scanner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            extension: DEFAULT_EXTENSION.to_string(),
        }
    }

    /// Sets the file extension (without the leading dot) that candidates must carry.
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// Opens the root and returns a lazy walk over it.
    ///
    /// # Errors
    ///
    /// Fails only when the root itself cannot be opened or is not a
    /// directory. Problems below the root come back as
    /// [`ScanEvent::Diagnostic`] items.
    pub fn walk(&self) -> Result<Walk, DetectError> {
        let metadata = fs::metadata(&self.root).map_err(|source| DetectError::RootUnreadable {
            path: self.root.clone(),
            source,
        })?;
        if !metadata.is_dir() {
            return Err(DetectError::RootNotDirectory {
                path: self.root.clone(),
            });
        }

        fs::read_dir(&self.root).map_err(|source| DetectError::RootUnreadable {
            path: self.root.clone(),
            source,
        })?;
        let canonical_root =
            fs::canonicalize(&self.root).map_err(|source| DetectError::RootUnreadable {
                path: self.root.clone(),
                source,
            })?;

        let inner = WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(MAX_DEPTH)
            .follow_links(true)
            .into_iter();

        Ok(Walk {
            inner,
            canonical_root,
            extension: self.extension.clone(),
        })
    }

    /// Walks the whole root and collects the results.
    pub fn scan(&self) -> Result<ScanOutput, DetectError> {
        let mut output = ScanOutput::default();
        for event in self.walk()? {
            match event {
                ScanEvent::Candidate(candidate) => output.candidates.push(candidate),
                ScanEvent::Diagnostic(diagnostic) => output.diagnostics.push(diagnostic),
            }
        }
        Ok(output)
    }
}

/// Lazy walk over a scan root, see [`Scanner::walk`].
pub struct Walk {
    inner: walkdir::IntoIter,
    canonical_root: PathBuf,
    extension: String,
}

impl Walk {
    fn has_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext == self.extension)
    }

    /// Checks that a followed link still resolves inside the root.
    fn escapes_root(&self, path: &Path) -> std::io::Result<bool> {
        let target = fs::canonicalize(path)?;
        Ok(!target.starts_with(&self.canonical_root))
    }
}

impl Iterator for Walk {
    type Item = ScanEvent;

    fn next(&mut self) -> Option<ScanEvent> {
        loop {
            let entry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(err) => return Some(ScanEvent::Diagnostic(diagnose(err))),
            };

            if entry.path_is_symlink() {
                let escapes = match self.escapes_root(entry.path()) {
                    Ok(escapes) => escapes,
                    Err(err) => {
                        let diagnostic = Diagnostic::new(
                            entry.path(),
                            DiagnosticKind::FileRead,
                            format!("cannot resolve link: {}", err),
                        );
                        tracing::warn!(path = ?entry.path(), error = %err, "cannot resolve link");
                        if entry.file_type().is_dir() {
                            self.inner.skip_current_dir();
                        }
                        return Some(ScanEvent::Diagnostic(diagnostic));
                    }
                };

                if escapes {
                    if entry.file_type().is_dir() {
                        self.inner.skip_current_dir();
                    }
                    tracing::warn!(path = ?entry.path(), "link resolves outside the scan root");
                    return Some(ScanEvent::Diagnostic(Diagnostic::new(
                        entry.path(),
                        DiagnosticKind::OutsideRoot,
                        "link resolves outside the scan root",
                    )));
                }
            }

            if !entry.file_type().is_file() || !self.has_extension(entry.path()) {
                continue;
            }

            let depth = entry.depth();
            return Some(ScanEvent::Candidate(CandidatePath::new(
                entry.into_path(),
                depth,
            )));
        }
    }
}

fn diagnose(err: walkdir::Error) -> Diagnostic {
    let path = err.path().map(Path::to_path_buf).unwrap_or_default();

    if let Some(ancestor) = err.loop_ancestor() {
        tracing::warn!(?path, ?ancestor, "symlink loop");
        return Diagnostic::new(
            &path,
            DiagnosticKind::SymlinkLoop,
            format!("link points back at {}", ancestor.display()),
        );
    }

    let kind = if path.is_dir() {
        DiagnosticKind::SubdirectoryAccess
    } else {
        DiagnosticKind::FileRead
    };
    tracing::warn!(?path, error = %err, "{}", kind);
    Diagnostic::new(path, kind, err.to_string())
}
