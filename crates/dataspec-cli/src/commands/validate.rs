//! Validate command - re-derive a bundle's checks from its own content

use crate::workspace::Workspace;
use anyhow::{bail, Context, Result};
use dataspec_bundle::{BundleValidator, ValidationReport};
use std::path::Path;

pub fn run(ws: &Workspace, bundle: &Path, json: bool, quiet: bool) -> Result<()> {
    let catalog = ws.catalog()?;
    let report = BundleValidator::new(ws.root(), catalog.as_ref())
        .validate(bundle)
        .with_context(|| format!("Failed to read bundle: {}", bundle.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report, quiet);
    }

    if !report.valid {
        bail!(
            "Bundle validation failed: {} ({} errors)",
            bundle.display(),
            report.errors.len()
        );
    }
    Ok(())
}

fn print_report(report: &ValidationReport, quiet: bool) {
    if !quiet {
        println!(
            "Bundle: {} ({}@{})",
            report.bundle_path.display(),
            report.bundle_name.as_deref().unwrap_or("?"),
            report.bundle_version.as_deref().unwrap_or("?")
        );
        for (check, passed) in &report.checks {
            println!("  [{}] {}", if *passed { "ok" } else { "FAIL" }, check);
        }
    }

    if !report.errors.is_empty() {
        println!("Errors:");
        for error in &report.errors {
            println!("  - {}", error);
        }
    }

    if !quiet && !report.warnings.is_empty() {
        println!("Warnings:");
        for warning in &report.warnings {
            println!("  - {}", warning);
        }
    }

    if !quiet {
        println!("{}", if report.valid { "valid" } else { "invalid" });
    }
}
