//! Check-compat command - breaking changes and production locks between two refs

use crate::workspace::Workspace;
use anyhow::{bail, Context, Result};
use dataspec_bundle::{
    CompatibilityChecker, CompatibilityReport, ConsumerMatrix, GitRevisionSource,
};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Default)]
pub struct CheckCompatArgs {
    pub base_ref: String,
    pub head_ref: String,
    /// Defaults to the workspace's configured matrix file
    pub matrix: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub fail_on_breaking: bool,
}

pub fn run(ws: &Workspace, args: CheckCompatArgs) -> Result<()> {
    let matrix_path = args.matrix.unwrap_or_else(|| ws.config.matrix_file());
    let matrix = ConsumerMatrix::from_file(&matrix_path)
        .with_context(|| format!("Failed to load consumer matrix: {}", matrix_path.display()))?;

    let source = GitRevisionSource::new(ws.root());
    let report = CompatibilityChecker::new(&source)
        .check(&args.base_ref, &args.head_ref, &matrix)
        .with_context(|| format!("Failed to compare {}...{}", args.base_ref, args.head_ref))?;

    if let Some(output) = &args.output {
        if let Some(parent) = output.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }
        let mut content = serde_json::to_string_pretty(&report)?;
        content.push('\n');
        fs::write(output, content)
            .with_context(|| format!("Failed to write report: {}", output.display()))?;
        println!("Report written to {}", output.display());
    }

    print_summary(&report);

    if args.fail_on_breaking && report.has_blocking_findings() {
        bail!(
            "{} breaking changes and {} production conflicts between {} and {}",
            report.summary.breaking_changes_count,
            report.summary.production_conflicts_count,
            report.base_ref,
            report.head_ref
        );
    }
    Ok(())
}

fn print_summary(report: &CompatibilityReport) {
    let summary = &report.summary;
    println!("Compatibility {}...{}", report.base_ref, report.head_ref);
    println!("  channels changed:     {}", summary.total_channels_changed);
    println!("  breaking changes:     {}", summary.breaking_changes_count);
    println!("  production conflicts: {}", summary.production_conflicts_count);
    println!("  severity:             {}", summary.severity);

    if !report.affected_consumers.is_empty() {
        println!("  affected consumers:   {}", report.affected_consumers.join(", "));
    }
    for change in &report.breaking_changes {
        println!("  breaking: {}", change);
    }
    for conflict in &report.production_conflicts {
        println!("  locked: {} ({})", conflict.message, conflict.severity);
    }
    for warning in &report.warnings {
        println!("  warning: {}", warning);
    }
}
