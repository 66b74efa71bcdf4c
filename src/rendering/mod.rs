//! Findings rendering.
//!
//! Turns a [`crate::models::Findings`] record into Markdown for terminals and
//! chat surfaces, or JSON for machine consumers.

mod report;

pub use report::{ReportFormat, render, render_markdown, render_report};
