//! Error types for the detection engine.
//!
//! Only problems with the scan root are fatal. Everything that goes wrong
//! below the root is reported as a [`Diagnostic`](crate::model::Diagnostic)
//! on the [`ScanResult`](crate::model::ScanResult) instead.

use std::path::PathBuf;
use thiserror::Error;

/// A failure that aborts a whole detection run.
#[derive(Debug, Error)]
pub enum DetectError {
    #[error("cannot read scan root {path:?}: {source}")]
    RootUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("scan root {path:?} is not a directory")]
    RootNotDirectory { path: PathBuf },
}

/// The byte window holds no header with a non-empty `Plugin Name`.
///
/// This is the common case for most files in a plugin directory and is
/// never surfaced as a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("no plugin header found")]
pub struct MissingHeaderError;
