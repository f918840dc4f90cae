//! Create command - resolve a consumer into a bundle file

use crate::workspace::Workspace;
use anyhow::{Context, Result};
use dataspec_bundle::{BundleBuilder, BundleType, Consumer, ConsumerAliases};
use std::path::PathBuf;

/// Arguments for bundle creation
#[derive(Debug, Clone, Default)]
pub struct CreateArgs {
    /// Consumer file path or name under the consumers directory
    pub consumer: String,
    pub name: Option<String>,
    pub version: Option<String>,
    pub bundle_type: BundleType,
    pub output: Option<PathBuf>,
    /// Register `consumer@version -> bundle` in the alias registry
    pub register: bool,
}

pub fn run(ws: &Workspace, args: CreateArgs) -> Result<()> {
    let consumer_path = ws.consumer_path(&args.consumer);
    let consumer = Consumer::from_file(&consumer_path)
        .with_context(|| format!("Failed to load consumer: {}", args.consumer))?;

    let catalog = ws.catalog()?;
    let mut builder = BundleBuilder::new(catalog.as_ref())
        .with_aliases(ws.channel_aliases()?)
        .with_detector(ws.conflict_detector());
    if let Some(name) = args.name {
        builder = builder.with_name(name);
    }
    if let Some(version) = args.version {
        builder = builder.with_version_label(version);
    }

    let output = builder
        .build(&consumer, args.bundle_type)
        .with_context(|| format!("Failed to build bundle for consumer '{}'", consumer.name()))?;
    let mut bundle = output.bundle;
    bundle.source_consumer = ws.relative(&consumer_path);

    let path = args
        .output
        .unwrap_or_else(|| bundle.default_path(&ws.config.bundles_dir()));
    bundle
        .write_to_file(&path)
        .with_context(|| format!("Failed to write bundle: {}", path.display()))?;

    println!("Created bundle: {}", path.display());
    println!("  name:      {}", bundle.meta.bundle_name);
    println!("  version:   {}", bundle.meta.bundle_version);
    println!("  channels:  {}", bundle.channels.len());
    println!("  integrity: {}", bundle.integrity_hash);
    for entry in &bundle.channels {
        println!(
            "    {}@{} ({})",
            entry.channel, entry.version, entry.source_constraint
        );
    }
    if !output.warnings.is_empty() {
        println!("Warnings:");
        for warning in &output.warnings {
            println!("  - {}", warning);
        }
    }
    for conflict in &bundle.compatibility.conflicts {
        print!("{}", conflict.report());
    }

    if args.register {
        let version = consumer
            .meta
            .version
            .as_deref()
            .context("--register needs meta.version in the consumer file")?;
        let aliases_path = ws.config.aliases_file();
        let mut aliases = ConsumerAliases::load(&aliases_path)?;
        aliases.register(
            consumer.name(),
            version,
            ws.relative(&path),
            bundle.meta.bundle_type,
        );
        aliases
            .save(&aliases_path)
            .with_context(|| format!("Failed to save aliases: {}", aliases_path.display()))?;
        println!("Registered {}@{}", consumer.name(), version);
    }

    Ok(())
}
