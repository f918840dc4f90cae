//! Release catalogs: per-channel views over published releases
//!
//! [`ReleaseCatalog`] is the only way the engine reads releases. Two
//! backends answer the same contract: [`FsCatalog`] over a `channels/`
//! directory tree, and [`IndexCatalog`] over a JSON index document (the
//! database-backed variant).

use crate::spec::Release;
use crate::Result;
use semver::Version;

mod fs;
mod index;

pub use fs::FsCatalog;
pub use index::IndexCatalog;

/// Read-only view over the releases of every channel
pub trait ReleaseCatalog {
    /// Versions of `channel`, ascending by semver precedence.
    ///
    /// Entries that are not valid semantic versions are skipped with a
    /// warning. Fails with `ChannelNotFound` when the channel is unknown.
    fn list_versions(&self, channel: &str) -> Result<Vec<Version>>;

    /// Load one release. Fails with `ReleaseNotFound` when absent.
    fn get_release(&self, channel: &str, version: &Version) -> Result<Release>;

    /// Raw bytes of the spec artifact, `None` when it does not exist
    fn spec_content(&self, channel: &str, version: &Version) -> Result<Option<Vec<u8>>>;

    /// Whether a spec artifact for `channel@version` can be retrieved
    fn has_release(&self, channel: &str, version: &Version) -> bool {
        matches!(self.spec_content(channel, version), Ok(Some(_)))
    }

    /// Workspace-relative locator of the spec artifact
    fn spec_locator(&self, channel: &str, version: &Version) -> String {
        format!("channels/{}/spec-{}.yaml", channel, version)
    }
}

/// Parse raw version labels, dropping (and logging) anything that is not semver
pub(crate) fn parse_versions<I, S>(channel: &str, labels: I) -> Vec<Version>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut versions: Vec<Version> = labels
        .into_iter()
        .filter_map(|label| {
            let label = label.as_ref();
            match Version::parse(label) {
                Ok(v) => Some(v),
                Err(e) => {
                    tracing::warn!(channel, version = label, error = %e, "skipping non-semver release");
                    None
                }
            }
        })
        .collect();
    versions.sort();
    versions.dedup();
    versions
}
