//! Lock command - pin spec content hashes for a bundle

use crate::workspace::Workspace;
use anyhow::{bail, Context, Result};
use dataspec_bundle::{Bundle, Lock, LockGenerator};
use std::path::{Path, PathBuf};

pub fn run(ws: &Workspace, bundle_path: &Path, output: Option<PathBuf>, check: bool) -> Result<()> {
    let bundle = Bundle::from_file(bundle_path)
        .with_context(|| format!("Failed to read bundle: {}", bundle_path.display()))?;
    let lock_path = output.unwrap_or_else(|| Lock::path_for(bundle_path));

    if check {
        return verify(&bundle, &lock_path);
    }

    bundle
        .verify_integrity()
        .with_context(|| format!("Refusing to lock {}", bundle_path.display()))?;

    let catalog = ws.catalog()?;
    let lock = LockGenerator::new(catalog.as_ref()).generate(&bundle, ws.relative(bundle_path))?;
    lock.write_to_file(&lock_path)
        .with_context(|| format!("Failed to write lock: {}", lock_path.display()))?;

    println!("Wrote lock: {}", lock_path.display());
    println!("  channels:  {}", lock.channels.len());
    println!("  integrity: {}", lock.integrity_hash);
    for channel in lock.unknown_specs() {
        println!("  warning: spec for {} not found, spec_hash is unknown", channel);
    }
    Ok(())
}

/// Check an existing lock against itself and against the bundle
fn verify(bundle: &Bundle, lock_path: &Path) -> Result<()> {
    let lock = Lock::from_file(lock_path)
        .with_context(|| format!("Failed to read lock: {}", lock_path.display()))?;
    lock.verify()
        .with_context(|| format!("Lock integrity check failed: {}", lock_path.display()))?;

    if lock.bundle.integrity_hash != bundle.integrity_hash {
        bail!(
            "Lock {} belongs to a different bundle (lock has {}, bundle has {})",
            lock_path.display(),
            lock.bundle.integrity_hash,
            bundle.integrity_hash
        );
    }

    println!("Lock is valid: {}", lock_path.display());
    Ok(())
}
