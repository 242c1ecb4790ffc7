//! Core data types for detected plugins and scan results.
//!
//! This module contains the fundamental types used throughout wpdetect:
//!
//! - [`CandidatePath`] - A source file discovered by the scanner
//! - [`HeaderFieldSet`] - Fields extracted from a plugin header comment
//! - [`PluginRecord`] - A detected plugin
//! - [`Diagnostic`] - A non-fatal problem encountered during a scan
//! - [`ScanResult`] - Complete scan results
//!
//! # Example
//!
//! ```
//! use wpdetect::{HeaderFieldSet, PluginRecord, VersionSource};
//!
//! let mut fields = HeaderFieldSet::new();
//! fields.insert("Plugin Name", "Hello Dolly");
//!
//! let record = PluginRecord::new("Hello Dolly", "hello-dolly", "hello-dolly/hello.php")
//!     .with_version("1.7.2", VersionSource::Header);
//!
//! assert_eq!(record.slug, "hello-dolly");
//! ```

mod plugin;
mod scan;

pub use plugin::*;
pub use scan::*;
