//! Version resolution.
//!
//! The `Version` header field is authoritative. Plenty of plugins also
//! declare their version in code, usually as
//! `define( 'AKISMET_VERSION', '5.3' )`, `const VERSION = '5.3';` or a
//! `$MY_PLUGIN_VERSION = '5.3';` assignment, and that value is used when the
//! header leaves the version out.

use super::header::{HEADER_WINDOW, VERSION};
use crate::model::{HeaderFieldSet, VersionSource};
use regex::Regex;
use std::sync::LazyLock;

static VERSION_CONSTANT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?x)
        \bdefine\s*\(\s*
            ['"](?:[A-Za-z0-9_]*_)?VERSION['"]\s*,\s*
            ['"]?(?P<define>\d+(?:\.\d+)*(?:[-+][0-9A-Za-z.]+)?)['"]?\s*\)
        |
        \bconst\s+(?:\??[A-Za-z_][A-Za-z0-9_]*\s+)?(?:[A-Za-z0-9_]*_)?VERSION\s*=\s*
            ['"]?(?P<const>\d+(?:\.\d+)*(?:[-+][0-9A-Za-z.]+)?)['"]?\s*;
        |
        (?:\$|\b)(?:[A-Za-z0-9_]*_)?VERSION\s*=\s*
            ['"]?(?P<assign>\d+(?:\.\d+)*(?:[-+][0-9A-Za-z.]+)?)['"]?\s*;
        "#,
    )
    .expect("version constant pattern is valid")
});

/// Final version of a plugin and how it was arrived at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedVersion {
    /// Empty when neither the header nor the code declare a version.
    pub version: String,
    pub source: VersionSource,
    /// The first version constant found in the file, if any.
    pub constant: Option<String>,
    /// Both versions exist and are not the same string.
    pub mismatch: bool,
}

/// Decides the version of a plugin from its header fields and file window.
///
/// # Example
///
/// ```
/// use wpdetect::detector::{header, version};
/// use wpdetect::VersionSource;
///
/// let source = b"<?php\n/*\nPlugin Name: Drift\nVersion: 1.0\n*/\ndefine( 'DRIFT_VERSION', '1.0.1' );\n";
/// let fields = header::parse(source).unwrap();
/// let resolved = version::resolve(&fields, source);
///
/// assert_eq!(resolved.version, "1.0");
/// assert_eq!(resolved.source, VersionSource::Header);
/// assert!(resolved.mismatch);
/// ```
pub fn resolve(fields: &HeaderFieldSet, bytes: &[u8]) -> ResolvedVersion {
    let header = fields.get(VERSION).unwrap_or_default().trim();
    let constant = find_version_constant(bytes);

    if !header.is_empty() {
        let mismatch = constant.as_deref().is_some_and(|c| c != header);
        return ResolvedVersion {
            version: header.to_string(),
            source: VersionSource::Header,
            constant,
            mismatch,
        };
    }

    match constant {
        Some(version) => ResolvedVersion {
            version: version.clone(),
            source: VersionSource::ConstantFallback,
            constant: Some(version),
            mismatch: false,
        },
        None => ResolvedVersion {
            version: String::new(),
            source: VersionSource::Header,
            constant: None,
            mismatch: false,
        },
    }
}

/// Returns the value of the first `*_VERSION` or `VERSION` constant,
/// class constant, variable or property assignment in the window.
pub fn find_version_constant(bytes: &[u8]) -> Option<String> {
    let window = &bytes[..bytes.len().min(HEADER_WINDOW)];
    let text = String::from_utf8_lossy(window);

    let caps = VERSION_CONSTANT.captures(&text)?;
    caps.name("define")
        .or_else(|| caps.name("const"))
        .or_else(|| caps.name("assign"))
        .map(|m| m.as_str().to_string())
}
