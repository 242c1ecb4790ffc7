use crate::model::{ScanResult, VersionSource};
use anyhow::Result;
use std::fmt;
use tabled::{settings::Style, Table, Tabled};

#[derive(Tabled)]
struct PluginRow {
    #[tabled(rename = "Slug")]
    slug: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Version")]
    version: String,
    #[tabled(rename = "From")]
    source: String,
    #[tabled(rename = "Path")]
    path: String,
}

#[derive(Tabled)]
struct MismatchRow {
    #[tabled(rename = "Plugin")]
    slug: String,
    #[tabled(rename = "Header")]
    header: String,
    #[tabled(rename = "Constant")]
    constant: String,
    #[tabled(rename = "Path")]
    path: String,
}

#[derive(Tabled)]
struct DiagnosticRow {
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Path")]
    path: String,
    #[tabled(rename = "Message")]
    message: String,
}

pub fn print_cli_table(result: &ScanResult) -> Result<()> {
    print!("{}", TableReport(result));
    Ok(())
}

pub(crate) fn render_table(result: &ScanResult) -> String {
    TableReport(result).to_string()
}

/// Human-readable report: plugin table, mismatches, diagnostics, summary.
struct TableReport<'a>(&'a ScanResult);

impl fmt::Display for TableReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let result = self.0;

        writeln!(f)?;
        writeln!(
            f,
            "Scan of {} completed at: {}",
            result.root.display(),
            result.scanned_at.format("%Y-%m-%d %H:%M:%S UTC")
        )?;
        if result.cancelled {
            writeln!(f, "Scan was cancelled; results are partial.")?;
        }
        writeln!(f)?;

        if result.records.is_empty() {
            writeln!(f, "No plugins found.")?;
        } else {
            writeln!(f, "Found {} plugins:", result.records.len())?;
            writeln!(f)?;

            let rows: Vec<PluginRow> = result
                .records
                .iter()
                .map(|r| PluginRow {
                    slug: truncate(&r.slug, 40),
                    name: truncate(&r.name, 40),
                    version: format_version(&r.version, r.version_mismatch),
                    source: match r.version_source {
                        VersionSource::Header => "header".to_string(),
                        VersionSource::ConstantFallback => "constant".to_string(),
                    },
                    path: truncate(&r.relative_path, 60),
                })
                .collect();

            writeln!(f, "{}", Table::new(rows).with(Style::rounded()))?;
        }

        // Mismatches deserve their own section so they are not missed.
        if result.has_mismatch() {
            writeln!(f)?;
            writeln!(
                f,
                "Version mismatches ({}), header and code disagree:",
                result.mismatches().count()
            )?;
            writeln!(f)?;

            let rows: Vec<MismatchRow> = result
                .mismatches()
                .map(|r| MismatchRow {
                    slug: r.slug.clone(),
                    header: r.version.clone(),
                    constant: r.constant_version.clone().unwrap_or_else(|| "-".to_string()),
                    path: truncate(&r.relative_path, 60),
                })
                .collect();

            writeln!(f, "{}", Table::new(rows).with(Style::rounded()))?;
        }

        if !result.diagnostics.is_empty() {
            writeln!(f)?;
            writeln!(f, "Diagnostics ({}):", result.diagnostics.len())?;
            writeln!(f)?;

            let rows: Vec<DiagnosticRow> = result
                .diagnostics
                .iter()
                .map(|d| DiagnosticRow {
                    kind: d.kind.to_string(),
                    path: truncate(&d.path.display().to_string(), 60),
                    message: truncate(&d.message, 60),
                })
                .collect();

            writeln!(f, "{}", Table::new(rows).with(Style::rounded()))?;
        }

        writeln!(f)?;
        write_summary(f, result)
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

fn format_version(version: &str, mismatch: bool) -> String {
    let version = if version.is_empty() { "-" } else { version };
    if mismatch {
        format!("{} (!)", version)
    } else {
        version.to_string()
    }
}

fn write_summary(f: &mut fmt::Formatter<'_>, result: &ScanResult) -> fmt::Result {
    let stats = &result.stats;
    let without_version = result
        .records
        .iter()
        .filter(|r| r.version.is_empty())
        .count();
    let from_constant = result
        .records
        .iter()
        .filter(|r| r.version_source == VersionSource::ConstantFallback)
        .count();

    writeln!(f, "Summary:")?;
    writeln!(
        f,
        "  Files inspected: {} ({} with header, {} without, {} unreadable)",
        stats.candidates, stats.recorded, stats.skipped, stats.failed
    )?;
    if without_version > 0 {
        writeln!(
            f,
            "  Total plugins: {} ({} with unknown version)",
            result.records.len(),
            without_version
        )?;
    } else {
        writeln!(f, "  Total plugins: {}", result.records.len())?;
    }
    if from_constant > 0 {
        writeln!(f, "  Versions taken from code: {}", from_constant)?;
    }
    if result.has_mismatch() {
        writeln!(f, "  Version mismatches: {}", result.mismatches().count())?;
    }
    Ok(())
}
