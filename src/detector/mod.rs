//! Plugin detection.
//!
//! The [`Detector`] ties the pieces together: the [`Scanner`] walks the
//! plugins directory on a blocking thread and streams candidates to a
//! bounded pool of readers. Each reader takes the first
//! [`HEADER_WINDOW`](header::HEADER_WINDOW) bytes of its file, runs the
//! [`header`] parser and the [`version`] resolver over them, and hands back
//! an [`Outcome`]. Outcomes are merged by a single consumer, then sorted.
//!
//! # Example
//!
//! ```no_run
//! use wpdetect::detector::detect;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let result = detect("wp-content/plugins").await?;
//!     for record in &result.records {
//!         println!("{} {}", record.slug, record.version);
//!     }
//!     Ok(())
//! }
//! ```

pub mod header;
pub mod version;

use crate::config::Config;
use crate::error::{DetectError, MissingHeaderError};
use crate::model::{CandidatePath, Diagnostic, DiagnosticKind, PluginRecord, ScanResult};
use crate::scanner::{ScanEvent, Scanner, DEFAULT_EXTENSION};
use futures::stream::{self, Stream, StreamExt};
use std::path::{Component, Path};
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use header::{HEADER_WINDOW, PLUGIN_NAME, VERSION};

/// Default number of files read at the same time.
pub const DEFAULT_WORKERS: usize = 16;

/// Engine settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectOptions {
    /// Upper bound on concurrently open candidate files.
    pub workers: usize,
    /// Extension of source files, without the dot.
    pub extension: String,
}

impl Default for DetectOptions {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            extension: DEFAULT_EXTENSION.to_string(),
        }
    }
}

impl From<&Config> for DetectOptions {
    fn from(config: &Config) -> Self {
        Self {
            workers: config.workers,
            extension: config.extension.clone(),
        }
    }
}

/// What happened to one item coming out of the scanner.
#[derive(Debug)]
pub enum Outcome {
    /// The candidate carried a valid header.
    Recorded(PluginRecord),
    /// The candidate has no header. Not a problem.
    Skipped,
    /// The candidate could not be read.
    Failed(Diagnostic),
    /// The scanner itself reported a problem.
    Walk(Diagnostic),
}

#[derive(Debug, Clone, Default)]
pub struct Detector {
    options: DetectOptions,
}

impl Detector {
    pub fn new(options: DetectOptions) -> Self {
        Self { options }
    }

    /// Detects every plugin under `root`.
    ///
    /// # Errors
    ///
    /// Fails only when `root` cannot be opened. Every other problem ends up
    /// in [`ScanResult::diagnostics`].
    pub async fn detect(&self, root: impl AsRef<Path>) -> Result<ScanResult, DetectError> {
        self.detect_with_cancel(root, CancellationToken::new())
            .await
    }

    /// Like [`detect`](Self::detect), stopping early once `cancel` fires.
    ///
    /// After cancellation no further candidate is dispatched. Reads already
    /// in flight complete, and the partial result comes back with
    /// [`ScanResult::cancelled`] set. A token that fires after every
    /// candidate was already dispatched leaves the result complete.
    pub async fn detect_with_cancel(
        &self,
        root: impl AsRef<Path>,
        cancel: CancellationToken,
    ) -> Result<ScanResult, DetectError> {
        let root = root.as_ref().to_path_buf();
        let workers = self.options.workers.max(1);

        let walk = Scanner::new(&root)
            .with_extension(self.options.extension.clone())
            .walk()?;

        let (tx, rx) = mpsc::channel::<ScanEvent>(workers * 2);
        let walker_cancel = cancel.clone();
        let walker = tokio::task::spawn_blocking(move || {
            let mut sent: usize = 0;
            for event in walk {
                if walker_cancel.is_cancelled() || tx.blocking_send(event).is_err() {
                    return None;
                }
                sent += 1;
            }
            Some(sent)
        });

        let events = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        });
        let (mut result, merged) = gather(events, &root, workers, &cancel).await;

        let sent = walker.await.unwrap_or_else(|err| {
            tracing::warn!(error = %err, "scanner task did not finish cleanly");
            None
        });

        // Partial only if the walk stopped early or some event was never
        // pulled. A token firing after the last event does not count.
        result.cancelled = sent != Some(merged);
        result.sort();

        tracing::info!(
            root = ?result.root,
            candidates = result.stats.candidates,
            records = result.records.len(),
            diagnostics = result.diagnostics.len(),
            cancelled = result.cancelled,
            "scan finished"
        );

        Ok(result)
    }
}

/// Detects every plugin under `root` with default options.
pub async fn detect(root: impl AsRef<Path>) -> Result<ScanResult, DetectError> {
    Detector::default().detect(root).await
}

/// Runs every event through the reader pool and merges the outcomes.
///
/// Returns the unsorted result and the number of events merged. Once
/// `cancel` fires no further event is pulled, but reads already in flight
/// are still merged.
async fn gather<S>(
    events: S,
    root: &Path,
    workers: usize,
    cancel: &CancellationToken,
) -> (ScanResult, usize)
where
    S: Stream<Item = ScanEvent>,
{
    let shared_root = Arc::new(root.to_path_buf());
    let mut outcomes = Box::pin(
        events
            .take_until(cancel.clone().cancelled_owned())
            .map(|event| {
                let root = Arc::clone(&shared_root);
                async move {
                    match event {
                        ScanEvent::Candidate(candidate) => inspect(candidate, &root).await,
                        ScanEvent::Diagnostic(diagnostic) => Outcome::Walk(diagnostic),
                    }
                }
            })
            .buffer_unordered(workers),
    );

    let mut result = ScanResult::new(root);
    let mut merged = 0;
    while let Some(outcome) = outcomes.next().await {
        merge(&mut result, outcome);
        merged += 1;
    }
    (result, merged)
}

/// Folds one outcome into the running result.
fn merge(result: &mut ScanResult, outcome: Outcome) {
    match outcome {
        Outcome::Recorded(record) => {
            result.stats.candidates += 1;
            result.stats.recorded += 1;
            result.records.push(record);
        }
        Outcome::Skipped => {
            result.stats.candidates += 1;
            result.stats.skipped += 1;
        }
        Outcome::Failed(diagnostic) => {
            result.stats.candidates += 1;
            result.stats.failed += 1;
            result.diagnostics.push(diagnostic);
        }
        Outcome::Walk(diagnostic) => result.diagnostics.push(diagnostic),
    }
}

/// Reads, parses and resolves a single candidate.
pub async fn inspect(candidate: CandidatePath, root: &Path) -> Outcome {
    let bytes = match read_window(&candidate.path).await {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::warn!(path = ?candidate.path, error = %err, "cannot read candidate");
            return Outcome::Failed(Diagnostic::new(
                &candidate.path,
                DiagnosticKind::FileRead,
                err.to_string(),
            ));
        }
    };

    let fields = match header::parse(&bytes) {
        Ok(fields) => fields,
        Err(MissingHeaderError) => {
            tracing::debug!(path = ?candidate.path, "no plugin header");
            return Outcome::Skipped;
        }
    };

    let resolved = version::resolve(&fields, &bytes);
    let relative = relative_path(&candidate.path, root);

    if resolved.mismatch {
        tracing::warn!(
            path = %relative,
            header = %resolved.version,
            constant = ?resolved.constant,
            "header and constant versions disagree"
        );
    }

    let record = PluginRecord::new(
        fields.get(PLUGIN_NAME).unwrap_or_default(),
        slug(&candidate),
        relative,
    )
    .with_version(resolved.version, resolved.source)
    .with_constant_version(resolved.constant, resolved.mismatch)
    .with_fields(fields.without(&[PLUGIN_NAME, VERSION]));

    tracing::debug!(path = %record.relative_path, slug = %record.slug, "plugin recorded");
    Outcome::Recorded(record)
}

/// Reads at most [`HEADER_WINDOW`] bytes from the start of a file.
async fn read_window(path: &Path) -> std::io::Result<Vec<u8>> {
    let file = File::open(path).await?;
    let mut bytes = Vec::with_capacity(HEADER_WINDOW);
    file.take(HEADER_WINDOW as u64)
        .read_to_end(&mut bytes)
        .await?;
    Ok(bytes)
}

/// Directory name for depth-2 files, file stem for depth-1 files.
fn slug(candidate: &CandidatePath) -> String {
    let name = if candidate.depth >= 2 {
        candidate.path.parent().and_then(Path::file_name)
    } else {
        candidate.path.file_stem()
    };
    name.map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn relative_path(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::VersionSource;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, relative: &str, content: impl AsRef<[u8]>) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn plugin_file(name: &str, version: &str) -> String {
        format!("<?php\n/*\n * Plugin Name: {}\n * Version: {}\n */\n", name, version)
    }

    #[tokio::test]
    async fn test_hello_dolly_single_file() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "hello-dolly/hello.php",
            "Plugin Name: Hello Dolly\nVersion: 1.7.2\n",
        );

        let result = detect(dir.path()).await.unwrap();

        assert_eq!(result.records.len(), 1);
        let record = &result.records[0];
        assert_eq!(record.name, "Hello Dolly");
        assert_eq!(record.slug, "hello-dolly");
        assert_eq!(record.version, "1.7.2");
        assert_eq!(record.relative_path, "hello-dolly/hello.php");
        assert_eq!(record.version_source, VersionSource::Header);
        assert!(result.diagnostics.is_empty());
    }

    #[tokio::test]
    async fn test_akismet_one_header_file() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "akismet/akismet.php", plugin_file("Akismet Anti-spam", "5.3"));
        write(
            dir.path(),
            "akismet/class.akismet.php",
            "<?php\nclass Akismet {\n    const API_HOST = 'rest.akismet.com';\n}\n",
        );

        let result = detect(dir.path()).await.unwrap();

        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].slug, "akismet");
        assert_eq!(result.stats.candidates, 2);
        assert_eq!(result.stats.skipped, 1);
    }

    #[tokio::test]
    async fn test_header_after_filler_is_not_detected() {
        let dir = TempDir::new().unwrap();
        let mut content = String::from("<?php\n");
        for i in 0..500 {
            content.push_str(&format!("// padding {:06}\n", i));
        }
        content.push_str("/*\nPlugin Name: Buried\nVersion: 1.0\n*/\n");
        write(dir.path(), "buried/buried.php", content);

        let result = detect(dir.path()).await.unwrap();

        assert!(result.records.is_empty());
        assert!(result.diagnostics.is_empty());
    }

    #[tokio::test]
    async fn test_depth_cutoff() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "nested/inner/deep.php", plugin_file("Too Deep", "1.0"));
        write(dir.path(), "nested/inner/deeper/deepest.php", plugin_file("Deepest", "1.0"));
        write(dir.path(), "nested/top.php", plugin_file("Top", "1.0"));

        let result = detect(dir.path()).await.unwrap();

        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].name, "Top");
        assert!(result
            .records
            .iter()
            .all(|r| r.relative_path.matches('/').count() <= 1));
    }

    #[tokio::test]
    async fn test_single_file_plugin_slug_is_stem() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "hello.php", plugin_file("Hello Dolly", "1.7.2"));

        let result = detect(dir.path()).await.unwrap();

        assert_eq!(result.records[0].slug, "hello");
        assert_eq!(result.records[0].relative_path, "hello.php");
    }

    fn window_boundary_file(header_starts_at: usize) -> Vec<u8> {
        let opening = "<?php\n/*\n";
        let filler_len = header_starts_at - opening.len() - 1;
        let mut content = String::from(opening);
        content.push_str(&"x".repeat(filler_len));
        content.push('\n');
        assert_eq!(content.len(), header_starts_at);
        content.push_str("Plugin Name: Edge\n*/\n");
        content.push_str(&"// trailing\n".repeat(1000));
        content.into_bytes()
    }

    #[tokio::test]
    async fn test_header_ending_at_window_edge_is_detected() {
        let dir = TempDir::new().unwrap();
        let line = "Plugin Name: Edge";
        write(
            dir.path(),
            "edge/edge.php",
            window_boundary_file(HEADER_WINDOW - line.len()),
        );

        let result = detect(dir.path()).await.unwrap();

        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].name, "Edge");
    }

    #[tokio::test]
    async fn test_header_starting_at_window_end_is_not_detected() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "edge/edge.php", window_boundary_file(HEADER_WINDOW));

        let result = detect(dir.path()).await.unwrap();

        assert!(result.records.is_empty());
        assert_eq!(result.stats.skipped, 1);
    }

    #[tokio::test]
    async fn test_small_file_is_detected() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "tiny/tiny.php", "<?php /* Plugin Name: Tiny */");

        let result = detect(dir.path()).await.unwrap();

        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].version, "");
    }

    #[tokio::test]
    async fn test_detection_is_idempotent() {
        let dir = TempDir::new().unwrap();
        for i in 0..40 {
            write(
                dir.path(),
                &format!("plugin-{:02}/main.php", i),
                plugin_file(&format!("Plugin {}", i), &format!("1.{}", i)),
            );
            write(dir.path(), &format!("plugin-{:02}/helper.php", i), "<?php\n");
        }

        let detector = Detector::new(DetectOptions {
            workers: 4,
            ..DetectOptions::default()
        });
        let first = detector.detect(dir.path()).await.unwrap();
        let second = detector.detect(dir.path()).await.unwrap();

        assert_eq!(first.records.len(), 40);
        assert_eq!(first.records, second.records);
        assert_eq!(first.records[0].slug, "plugin-00");
        assert_eq!(first.records[39].slug, "plugin-39");
    }

    #[tokio::test]
    async fn test_records_never_have_empty_name() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "empty/empty.php", "<?php\n/*\nPlugin Name:\nVersion: 1.0\n*/\n");
        write(dir.path(), "blank/blank.php", "<?php\n/*\nPlugin Name:    \n*/\n");
        write(dir.path(), "good/good.php", plugin_file("Good", "1.0"));

        let result = detect(dir.path()).await.unwrap();

        assert_eq!(result.records.len(), 1);
        assert!(result.records.iter().all(|r| !r.name.is_empty()));
    }

    #[tokio::test]
    async fn test_constant_fallback_record() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "fallback/fallback.php",
            "<?php\n/*\n * Plugin Name: Fallback\n * Version:\n */\ndefine( 'FALLBACK_VERSION', '2.0-beta1' );\n",
        );

        let result = detect(dir.path()).await.unwrap();

        let record = &result.records[0];
        assert_eq!(record.version, "2.0-beta1");
        assert_eq!(record.version_source, VersionSource::ConstantFallback);
        assert!(!record.version_mismatch);
    }

    #[tokio::test]
    async fn test_version_mismatch_record() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "drift/drift.php",
            format!("{}define( 'DRIFT_VERSION', '1.0.1' );\n", plugin_file("Drift", "1.0")),
        );

        let result = detect(dir.path()).await.unwrap();

        let record = &result.records[0];
        assert_eq!(record.version, "1.0");
        assert!(record.version_mismatch);
        assert_eq!(record.constant_version.as_deref(), Some("1.0.1"));
        assert!(result.has_mismatch());
    }

    #[tokio::test]
    async fn test_duplicate_headers_are_all_reported() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "twins/a.php", plugin_file("Twin A", "1.0"));
        write(dir.path(), "twins/b.php", plugin_file("Twin B", "2.0"));

        let result = detect(dir.path()).await.unwrap();

        assert_eq!(result.records.len(), 2);
        assert!(result.records.iter().all(|r| r.slug == "twins"));

        let reduced = result.first_per_slug();
        assert_eq!(reduced.len(), 1);
        assert_eq!(reduced[0].name, "Twin A");
    }

    #[tokio::test]
    async fn test_other_fields_exclude_name_and_version() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "meta/meta.php",
            "<?php\n/*\n * Plugin Name: Meta\n * Version: 1.0\n * Requires PHP: 7.4\n * Text Domain: meta\n */\n",
        );

        let result = detect(dir.path()).await.unwrap();

        let other = &result.records[0].other_fields;
        assert_eq!(other.len(), 2);
        assert_eq!(other.get("Requires PHP"), Some("7.4"));
        assert_eq!(other.get("Text Domain"), Some("meta"));
    }

    #[tokio::test]
    async fn test_missing_root_is_fatal() {
        let dir = TempDir::new().unwrap();

        let err = detect(dir.path().join("missing")).await.unwrap_err();

        assert!(matches!(err, DetectError::RootUnreadable { .. }));
    }

    /// Writes `count` plugins and returns them as scanner events, in order.
    fn plugin_events(root: &Path, count: usize) -> Vec<ScanEvent> {
        (0..count)
            .map(|i| {
                let relative = format!("plugin-{:03}/plugin-{:03}.php", i, i);
                write(root, &relative, plugin_file(&format!("Plugin {:03}", i), "1.0"));
                ScanEvent::Candidate(CandidatePath::new(root.join(relative), 2))
            })
            .collect()
    }

    /// A stream that yields nothing and cancels `token` when it is reached.
    fn cancel_when_reached(token: CancellationToken) -> impl Stream<Item = ScanEvent> {
        stream::once(async move { token.cancel() }).filter_map(|()| async { None })
    }

    #[tokio::test]
    async fn test_cancel_mid_scan_keeps_finalized_records() {
        let dir = TempDir::new().unwrap();
        let mut events = plugin_events(dir.path(), 200);
        let rest = events.split_off(3);

        let cancel = CancellationToken::new();
        let events = stream::iter(events)
            .chain(cancel_when_reached(cancel.clone()))
            .chain(stream::iter(rest));
        let (mut result, merged) = gather(events, dir.path(), 1, &cancel).await;
        result.sort();

        assert!(cancel.is_cancelled());
        assert!(merged < 200);
        assert_eq!(merged, result.stats.candidates);
        assert_eq!(result.records.len(), result.stats.recorded);
        let names: Vec<&str> = result.records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(&names[..3], ["Plugin 000", "Plugin 001", "Plugin 002"]);
        assert!(result.records.iter().all(|r| r.version == "1.0"));
    }

    #[tokio::test]
    async fn test_cancel_after_last_event_counts_everything() {
        let dir = TempDir::new().unwrap();
        let events = plugin_events(dir.path(), 20);

        let cancel = CancellationToken::new();
        let events = stream::iter(events).chain(cancel_when_reached(cancel.clone()));
        let (result, merged) = gather(events, dir.path(), 4, &cancel).await;

        assert!(cancel.is_cancelled());
        assert_eq!(merged, 20);
        assert_eq!(result.records.len(), 20);
    }

    #[tokio::test]
    async fn test_completed_scan_is_not_cancelled() {
        let dir = TempDir::new().unwrap();
        for i in 0..30 {
            write(
                dir.path(),
                &format!("p{}/p{}.php", i, i),
                plugin_file(&format!("P{}", i), "1.0"),
            );
        }

        let cancel = CancellationToken::new();
        let result = Detector::default()
            .detect_with_cancel(dir.path(), cancel.clone())
            .await
            .unwrap();
        cancel.cancel();

        assert!(!result.cancelled);
        assert_eq!(result.records.len(), 30);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "hello/hello.php", plugin_file("Hello", "1.0"));

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = Detector::default()
            .detect_with_cancel(dir.path(), cancel)
            .await
            .unwrap();

        assert!(result.cancelled);
        assert!(result.records.is_empty());
        assert_eq!(result.stats.candidates, 0);
    }

    #[tokio::test]
    async fn test_zero_workers_is_clamped() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "hello/hello.php", plugin_file("Hello", "1.0"));

        let result = Detector::new(DetectOptions {
            workers: 0,
            ..DetectOptions::default()
        })
        .detect(dir.path())
        .await
        .unwrap();

        assert_eq!(result.records.len(), 1);
        assert!(!result.cancelled);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unreadable_file_is_diagnostic() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        write(dir.path(), "locked/locked.php", plugin_file("Locked", "1.0"));
        write(dir.path(), "open/open.php", plugin_file("Open", "1.0"));
        let locked = dir.path().join("locked/locked.php");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        // Privileged users can read the file anyway.
        if fs::File::open(&locked).is_ok() {
            return;
        }

        let result = detect(dir.path()).await.unwrap();

        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].slug, "open");
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.diagnostics[0].kind, DiagnosticKind::FileRead);
        assert_eq!(result.stats.failed, 1);
    }

    #[test]
    fn test_relative_path_uses_forward_slashes() {
        let root = Path::new("/srv/plugins");
        let path = root.join("akismet").join("akismet.php");

        assert_eq!(relative_path(&path, root), "akismet/akismet.php");
    }

    #[test]
    fn test_slug_by_depth() {
        let deep = CandidatePath::new("/srv/plugins/akismet/akismet.php", 2);
        let shallow = CandidatePath::new("/srv/plugins/hello.php", 1);

        assert_eq!(slug(&deep), "akismet");
        assert_eq!(slug(&shallow), "hello");
    }
}
