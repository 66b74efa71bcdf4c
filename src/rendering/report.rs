//! Markdown and JSON report rendering.

use crate::models::{Bucket, BucketEntry, Findings};
use crate::{Error, Result};
use std::fmt::Write as _;

/// Output format for a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    /// Human-readable Markdown.
    #[default]
    Markdown,
    /// Pretty-printed JSON of the full findings record.
    Json,
}

impl ReportFormat {
    /// Parses a format name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for anything but `markdown`/`md` or
    /// `json`.
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "markdown" | "md" => Ok(Self::Markdown),
            "json" => Ok(Self::Json),
            other => Err(Error::InvalidInput(format!(
                "unknown report format '{other}' (expected markdown or json)"
            ))),
        }
    }
}

const fn heading(bucket: Bucket) -> &'static str {
    match bucket {
        Bucket::High => "#### \u{1f534} High Risk",
        Bucket::Medium => "#### \u{1f7e1} Medium Risk",
        Bucket::Low => "#### \u{1f7e2} Low Risk",
        Bucket::Unknown => "#### \u{26aa} Unknown Risk",
    }
}

/// Upper-cases the first character and lower-cases the rest.
fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect()
    })
}

/// Renders the ingredient breakdown: one section per non-empty bucket,
/// entries sorted by name.
#[must_use]
pub fn render_markdown(findings: &Findings) -> String {
    let mut output = String::from("### Ingredient Breakdown\n\n");
    let mut any = false;

    for &bucket in Bucket::all() {
        let mut entries: Vec<&BucketEntry> = findings.bucket(bucket).iter().collect();
        if entries.is_empty() {
            continue;
        }
        any = true;
        entries.sort_by(|a, b| a.ingredient.cmp(&b.ingredient));

        output.push_str(heading(bucket));
        output.push('\n');
        for entry in entries {
            let _ = writeln!(
                output,
                "- **{}**: {}",
                capitalize(&entry.ingredient),
                entry.impact
            );
        }
        output.push('\n');
    }

    if !any {
        output.push_str("No ingredients were found or analyzed in this text.\n");
    }
    output
}

/// Renders the full Markdown report: score, explanation, breakdown and the
/// names newly added to the knowledge base.
#[must_use]
pub fn render_report(findings: &Findings) -> String {
    let mut output = format!("## Overall Score: {}\n\n", findings.overall_score);
    if !findings.explanation.trim().is_empty() {
        output.push_str(findings.explanation.trim());
        output.push_str("\n\n");
    }
    output.push_str(&render_markdown(findings));
    if !findings.new_entries.is_empty() {
        let _ = writeln!(
            output,
            "_Added to knowledge base: {}_",
            findings.new_entries.join(", ")
        );
    }
    output
}

/// Renders findings in the requested format.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn render(findings: &Findings, format: ReportFormat) -> Result<String> {
    match format {
        ReportFormat::Markdown => Ok(render_report(findings)),
        ReportFormat::Json => {
            serde_json::to_string_pretty(findings).map_err(|e| Error::OperationFailed {
                operation: "render_json".to_string(),
                cause: e.to_string(),
            })
        },
    }
}
