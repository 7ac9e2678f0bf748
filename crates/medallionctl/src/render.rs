//! Console rendering of plans, run reports and diagnostics.
//!
//! Every function returns the text instead of printing it.

use std::fmt::Write;

use chrono::{DateTime, Utc};
use medallion_engine::catalog::PipelineSpec;
use medallion_engine::{
    ComparisonEntry, Layer, PipelineStep, ResolvedConfig, RunReport, SampleEntry,
    VerificationEntry,
};

const RULE_WIDTH: usize = 70;

fn rule(ch: char) -> String {
    std::iter::repeat(ch).take(RULE_WIDTH).collect()
}

fn title_case(layer: Layer) -> String {
    let name = layer.as_str();
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Last segment of a `project.dataset.table` identifier.
fn short_name(table: &str) -> &str {
    table.rsplit('.').next().unwrap_or(table)
}

/// Insert `,` every three digits.
fn group_digits(digits: &str) -> String {
    let len = digits.len();
    let mut out = String::with_capacity(len + len / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

pub fn format_bytes(bytes: u64) -> String {
    group_digits(&bytes.to_string())
}

pub fn format_count(count: i64) -> String {
    let grouped = group_digits(&count.unsigned_abs().to_string());
    if count < 0 {
        format!("-{}", grouped)
    } else {
        grouped
    }
}

/// Signed row delta: `+n`, `-n` or `0`.
pub fn format_change(delta: i64) -> String {
    if delta > 0 {
        format!("+{}", format_count(delta))
    } else {
        format_count(delta)
    }
}

pub fn banner(spec: &PipelineSpec, config: &ResolvedConfig, now: DateTime<Utc>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", rule('='));
    let _ = writeln!(out, "{}", spec.title);
    let _ = writeln!(out, "Project: {}", config.project_id);
    let _ = writeln!(out, "Dataset: {}", config.datasets.get(spec.target));
    let _ = writeln!(out, "Timestamp: {}", now.format("%Y-%m-%d %H:%M:%S UTC"));
    let _ = writeln!(out, "{}", rule('='));
    out
}

/// Rendered SQL for `--dry-run`.
pub fn plan(steps: &[PipelineStep]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "[DRY RUN] Would execute {} step(s):", steps.len());
    for (i, step) in steps.iter().enumerate() {
        let _ = writeln!(out);
        let _ = writeln!(out, "[{}/{}] {}: {}", i + 1, steps.len(), step.name, step.description);
        for line in step.sql.lines() {
            let _ = writeln!(out, "    {}", line);
        }
    }
    out
}

/// Per-step progress, plus the steps a failure left unexecuted.
pub fn steps(spec: &PipelineSpec, report: &RunReport) -> String {
    let mut out = String::new();
    for result in &report.steps {
        let file = spec
            .steps
            .iter()
            .find(|f| f.name() == result.step.name)
            .map(|f| f.file.to_string())
            .unwrap_or_else(|| format!("{}.sql", result.step.name));

        let _ = writeln!(out, "\n[EXECUTING] {}", result.step.description);
        let _ = writeln!(out, "  File: {}", file);
        match result.error {
            None => {
                let _ = writeln!(out, "  [OK] Query completed");
                let _ = writeln!(
                    out,
                    "       Bytes processed: {}",
                    format_bytes(result.bytes_processed.unwrap_or(0))
                );
                let _ = writeln!(
                    out,
                    "       Bytes billed: {}",
                    format_bytes(result.bytes_billed.unwrap_or(0))
                );
            }
            Some(ref err) => {
                let _ = writeln!(out, "  [ERROR] {}: {}", err.kind, err.message);
            }
        }
    }
    for skipped in spec.steps.iter().skip(report.steps.len()) {
        let _ = writeln!(out, "[SKIPPED] {}", skipped.file);
    }
    out
}

fn verification_row(out: &mut String, entry: &VerificationEntry) {
    match (entry.row_count, entry.error.as_ref()) {
        (Some(count), None) => {
            let _ = writeln!(out, "  {:<32}{:>15}", short_name(&entry.table_name), format_count(count));
        }
        (_, Some(err)) => {
            let _ = writeln!(
                out,
                "  {:<32}ERROR {}: {}",
                short_name(&entry.table_name),
                err.kind,
                err.message
            );
        }
        (None, None) => {
            let _ = writeln!(out, "  {:<32}{:>15}", short_name(&entry.table_name), "-");
        }
    }
}

/// Row counts, grouped under the pipeline's labels when they line up.
pub fn verification(spec: &PipelineSpec, entries: &[VerificationEntry]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\nVERIFICATION");
    let _ = writeln!(out, "{}", rule('-'));
    let _ = writeln!(out, "  {:<32}{:>15}", "Table", "Rows");

    let grouped_len: usize = spec.verify.iter().map(|g| g.tables.len()).sum();
    if grouped_len != entries.len() {
        for entry in entries {
            verification_row(&mut out, entry);
        }
        return out;
    }

    let mut offset = 0;
    for group in spec.verify {
        if let Some(label) = group.label {
            let _ = writeln!(out, "{}:", label);
        }
        for entry in &entries[offset..offset + group.tables.len()] {
            verification_row(&mut out, entry);
        }
        offset += group.tables.len();
    }
    out
}

/// Upstream/downstream counts with the signed change.
pub fn comparison(upstream: Layer, downstream: Layer, entries: &[ComparisonEntry]) -> String {
    let up = title_case(upstream);
    let down = title_case(downstream);

    let mut out = String::new();
    let _ = writeln!(out, "\n{} VS {} COMPARISON", up.to_uppercase(), down.to_uppercase());
    let _ = writeln!(out, "{}", rule('-'));
    let _ = writeln!(out, "  {:<20}{:>15}{:>15}{:>15}", "Table", up, down, "Change");

    let cell = |count: Option<i64>| count.map(format_count).unwrap_or_else(|| "-".to_string());
    for entry in entries {
        let change = match (entry.delta, entry.error.as_ref()) {
            (Some(delta), _) => format_change(delta),
            (None, Some(err)) => format!("ERROR {}", err.kind),
            (None, None) => "-".to_string(),
        };
        let _ = writeln!(
            out,
            "  {:<20}{:>15}{:>15}{:>15}",
            entry.table_name,
            cell(entry.upstream_count),
            cell(entry.downstream_count),
            change
        );
        if let Some(ref err) = entry.error {
            let _ = writeln!(out, "    {}", err.message);
        }
    }
    out
}

fn cell_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "N/A".to_string(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Rows of each sample query as a plain aligned table.
pub fn samples(spec: &PipelineSpec, entries: &[SampleEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        let _ = writeln!(out, "\n{}", entry.title);
        let _ = writeln!(out, "{}", rule('-'));

        if let Some(ref err) = entry.error {
            let _ = writeln!(out, "[ERROR] Sample query failed: {}: {}", err.kind, err.message);
            continue;
        }
        if entry.rows.is_empty() {
            let message = spec
                .sample(&entry.name)
                .map(|s| s.empty_message)
                .unwrap_or("(No rows)");
            let _ = writeln!(out, "{}", message);
            continue;
        }

        let cells: Vec<Vec<String>> = entry
            .rows
            .iter()
            .map(|row| row.iter().map(cell_text).collect())
            .collect();
        let widths: Vec<usize> = entry
            .columns
            .iter()
            .enumerate()
            .map(|(i, name)| {
                cells
                    .iter()
                    .filter_map(|row| row.get(i))
                    .map(|c| c.chars().count())
                    .chain(std::iter::once(name.chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let header: Vec<String> = entry
            .columns
            .iter()
            .zip(&widths)
            .map(|(name, w)| format!("{:<w$}", name, w = *w))
            .collect();
        let _ = writeln!(out, "{}", header.join("  ").trim_end());
        for row in &cells {
            let line: Vec<String> = row
                .iter()
                .enumerate()
                .map(|(i, c)| format!("{:<w$}", c, w = widths.get(i).copied().unwrap_or(0)))
                .collect();
            let _ = writeln!(out, "{}", line.join("  ").trim_end());
        }
        let _ = writeln!(out, "[OK] {} row(s)", entry.rows.len());
    }
    out
}

/// Closing line and next-step hint.
pub fn summary(spec: &PipelineSpec, report: &RunReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\n{}", rule('='));
    if report.all_succeeded {
        let _ = writeln!(
            out,
            "[SUCCESS] {}: {} step(s), {} bytes processed, {} bytes billed",
            spec.title,
            report.steps.len(),
            format_bytes(report.total_bytes_processed()),
            format_bytes(report.total_bytes_billed())
        );
        if let Some(ms) = report.duration_ms() {
            let _ = writeln!(out, "Duration: {:.1}s", ms as f64 / 1000.0);
        }
        let _ = writeln!(out, "{}", rule('='));
        let _ = writeln!(out, "\nNext: {}", spec.next_hint);
    } else {
        let _ = writeln!(
            out,
            "[ERROR] {} transformation(s) failed",
            report.unsuccessful_step_count()
        );
        let _ = writeln!(out, "{}", rule('='));
    }
    out
}

/// Full console report for a build.
pub fn report(spec: &PipelineSpec, report: &RunReport) -> String {
    let mut out = steps(spec, report);
    if let Some(ref entries) = report.verification {
        out.push_str(&verification(spec, entries));
    }
    if let (Some((upstream, _)), Some(entries)) = (spec.compare_with, report.comparison.as_ref()) {
        out.push_str(&comparison(upstream, spec.target, entries));
    }
    if let Some(ref entries) = report.samples {
        out.push_str(&samples(spec, entries));
    }
    out.push_str(&summary(spec, report));
    out
}

/// Built-in pipelines with their step files.
pub fn catalog(pipelines: &[PipelineSpec]) -> String {
    let mut out = String::new();
    for spec in pipelines {
        let _ = writeln!(out, "{} ({} layer): {}", spec.name, spec.target, spec.title);
        for step in spec.steps {
            let _ = writeln!(out, "  {:<32}{}", step.file, step.description);
        }
        let _ = writeln!(out);
    }
    out
}
