//! Analyze command - summary statistics for a bundle

use anyhow::{Context, Result};
use dataspec_bundle::Bundle;
use std::path::Path;

pub fn run(bundle_path: &Path, show_conflicts: bool, json: bool) -> Result<()> {
    let bundle = Bundle::from_file(bundle_path)
        .with_context(|| format!("Failed to read bundle: {}", bundle_path.display()))?;
    let analysis = bundle.analyze();

    if json {
        println!("{}", serde_json::to_string_pretty(&analysis)?);
        return Ok(());
    }

    println!("Bundle: {}@{}", analysis.bundle_name, analysis.bundle_version);
    println!("Channels: {}", analysis.channel_count);
    println!("Version distribution:");
    for (major, count) in &analysis.version_distribution {
        println!("  v{}: {}", major, count);
    }

    if show_conflicts {
        if analysis.conflicts.is_empty() {
            println!("Conflicts: none");
        } else {
            println!("Conflicts:");
            for conflict in &analysis.conflicts {
                print!("{}", conflict.report());
            }
        }
    }
    Ok(())
}
