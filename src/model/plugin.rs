use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::path::PathBuf;

/// A source file found by the scanner, tagged with its depth below the root.
///
/// Depth 1 is a file directly under the root, depth 2 is a file inside one
/// of the root's immediate subdirectories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidatePath {
    pub path: PathBuf,
    pub depth: usize,
}

impl CandidatePath {
    pub fn new(path: impl Into<PathBuf>, depth: usize) -> Self {
        Self {
            path: path.into(),
            depth,
        }
    }
}

/// Header fields in the order they were first seen.
///
/// Keys are case-sensitive and unique: inserting a key that already exists
/// is a no-op, so the first occurrence in a header always wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderFieldSet {
    entries: Vec<(String, String)>,
}

impl HeaderFieldSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a field unless it is already present.
    ///
    /// Returns `true` if the field was added.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> bool {
        let name = name.into();
        if self.contains(&name) {
            return false;
        }
        self.entries.push((name, value.into()));
        true
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(key, _)| key == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns a copy without the named fields, preserving order.
    pub fn without(&self, names: &[&str]) -> HeaderFieldSet {
        HeaderFieldSet {
            entries: self
                .entries
                .iter()
                .filter(|(key, _)| !names.contains(&key.as_str()))
                .cloned()
                .collect(),
        }
    }
}

impl Serialize for HeaderFieldSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Where the final version of a plugin came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VersionSource {
    /// The `Version` header field (also used when no version was found at all).
    Header,
    /// A `*_VERSION` constant declared in the same file.
    ConstantFallback,
}

impl VersionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            VersionSource::Header => "header",
            VersionSource::ConstantFallback => "constant-fallback",
        }
    }
}

impl std::fmt::Display for VersionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A plugin detected from a file carrying a valid header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginRecord {
    pub name: String,
    pub version: String,
    pub slug: String,
    /// Path of the header file relative to the scan root, `/`-separated.
    pub relative_path: String,
    pub version_source: VersionSource,
    /// The header and constant versions both exist and differ.
    pub version_mismatch: bool,
    /// The constant version seen in the file, kept for auditing mismatches.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constant_version: Option<String>,
    #[serde(skip_serializing_if = "HeaderFieldSet::is_empty")]
    pub other_fields: HeaderFieldSet,
}

impl PluginRecord {
    pub fn new(
        name: impl Into<String>,
        slug: impl Into<String>,
        relative_path: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: String::new(),
            slug: slug.into(),
            relative_path: relative_path.into(),
            version_source: VersionSource::Header,
            version_mismatch: false,
            constant_version: None,
            other_fields: HeaderFieldSet::default(),
        }
    }

    pub fn with_version(mut self, version: impl Into<String>, source: VersionSource) -> Self {
        self.version = version.into();
        self.version_source = source;
        self
    }

    pub fn with_constant_version(mut self, constant: Option<String>, mismatch: bool) -> Self {
        self.constant_version = constant;
        self.version_mismatch = mismatch;
        self
    }

    pub fn with_fields(mut self, fields: HeaderFieldSet) -> Self {
        self.other_fields = fields;
        self
    }
}
