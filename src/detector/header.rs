//! Plugin header parsing.
//!
//! WordPress identifies a plugin by a comment block of `Field Name: value`
//! lines near the top of a PHP file:
//!
//! ```text
//! <?php
//! /*
//!  * Plugin Name: Hello Dolly
//!  * Version: 1.7.2
//!  * Requires PHP: 7.4
//!  */
//! ```
//!
//! Only the first [`HEADER_WINDOW`] bytes of a file are ever considered.

use crate::error::MissingHeaderError;
use crate::model::HeaderFieldSet;
use regex::Regex;
use std::sync::LazyLock;

/// Number of leading bytes of a file that may carry the header.
pub const HEADER_WINDOW: usize = 8192;

pub const PLUGIN_NAME: &str = "Plugin Name";
pub const VERSION: &str = "Version";

/// `<optional <?php><comment markers>Field Name:value`
static FIELD_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[ \t]*(?:<\?php)?[ \t/*#@]*([A-Z][A-Za-z0-9_-]*(?: [A-Za-z0-9][A-Za-z0-9_-]*)*):(.*)$")
        .expect("field line pattern is valid")
});

/// Extracts the header fields from the start of a file.
///
/// The window is cut into blocks at each comment closer (`*/`); the last
/// block runs to the end of the window. The header is the first block whose
/// `Plugin Name` is non-empty, and within it the first occurrence of each
/// field wins. Invalid UTF-8 is replaced rather than rejected.
///
/// # Errors
///
/// Returns [`MissingHeaderError`] when no block carries a non-empty
/// `Plugin Name`, whatever else was matched.
///
/// # Example
///
/// ```
/// use wpdetect::detector::header::parse;
///
/// let fields = parse(b"<?php\n/*\nPlugin Name: Hello Dolly\nVersion: 1.7.2\n*/\n").unwrap();
/// assert_eq!(fields.get("Plugin Name"), Some("Hello Dolly"));
/// assert_eq!(fields.get("Version"), Some("1.7.2"));
/// ```
pub fn parse(bytes: &[u8]) -> Result<HeaderFieldSet, MissingHeaderError> {
    let window = &bytes[..bytes.len().min(HEADER_WINDOW)];
    let text = String::from_utf8_lossy(window);
    let text = text.strip_prefix('\u{feff}').unwrap_or(&text);

    let mut block = HeaderFieldSet::new();
    for line in text.split(['\r', '\n']) {
        if let Some((name, value)) = field_line(line) {
            block.insert(name, value);
        }

        if line.contains("*/") {
            if is_header(&block) {
                return Ok(block);
            }
            block = HeaderFieldSet::new();
        }
    }

    if is_header(&block) {
        Ok(block)
    } else {
        Err(MissingHeaderError)
    }
}

fn is_header(block: &HeaderFieldSet) -> bool {
    block
        .get(PLUGIN_NAME)
        .is_some_and(|name| !name.is_empty())
}

/// Matches a single `Field Name: value` line.
fn field_line(line: &str) -> Option<(&str, &str)> {
    let caps = FIELD_LINE.captures(line)?;
    let name = caps.get(1)?.as_str();
    let raw = caps.get(2)?.as_str();

    // `Class::method()` at the start of a line is code, not a field.
    if raw.starts_with(':') {
        return None;
    }

    Some((name, clean_value(raw)))
}

/// Cuts a value at a closing comment or PHP tag and trims it.
fn clean_value(raw: &str) -> &str {
    let mut value = raw;
    for closer in ["*/", "?>"] {
        if let Some(pos) = value.find(closer) {
            value = &value[..pos];
        }
    }
    value.trim()
}
