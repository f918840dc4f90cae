//! Alias commands - consumer version to bundle registry

use crate::workspace::Workspace;
use anyhow::{bail, Context, Result};
use dataspec_bundle::{BundleType, ConsumerAliases};
use std::path::Path;

pub fn register(
    ws: &Workspace,
    consumer: &str,
    version: &str,
    bundle: &Path,
    bundle_type: BundleType,
) -> Result<()> {
    if !bundle.is_file() {
        bail!("Bundle not found: {}", bundle.display());
    }
    let bundle_ref = ws.relative(bundle);

    let path = ws.config.aliases_file();
    let mut aliases = ConsumerAliases::load(&path)
        .with_context(|| format!("Failed to load aliases: {}", path.display()))?;
    aliases.register(consumer, version, bundle_ref.clone(), bundle_type);
    aliases
        .save(&path)
        .with_context(|| format!("Failed to save aliases: {}", path.display()))?;

    println!("Registered {}@{} -> {}", consumer, version, bundle_ref);
    Ok(())
}

pub fn resolve(ws: &Workspace, consumer: &str, version: Option<&str>) -> Result<()> {
    let path = ws.config.aliases_file();
    let aliases = ConsumerAliases::load(&path)
        .with_context(|| format!("Failed to load aliases: {}", path.display()))?;

    match aliases.bundle_for(consumer, version) {
        Some(bundle) => {
            println!("{}", bundle);
            Ok(())
        }
        None => {
            let known = aliases.versions(consumer);
            let label = version.unwrap_or("latest");
            if known.is_empty() {
                bail!("No bundles registered for {}", consumer);
            }
            bail!(
                "No bundle registered for {}@{} (known versions: {})",
                consumer,
                label,
                known.join(", ")
            );
        }
    }
}
