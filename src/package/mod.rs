//! Package identity resolution.
//!
//! Maps a manifest record onto the archive that holds it for the current
//! platform, or onto nothing when the record does not apply here.

mod rules;

use anyhow::Result;
use log::debug;
use std::path::Path;

use crate::manifest::{self, PackageRecord};
use crate::platform::PlatformId;
use crate::runtime::Runtime;

pub use rules::{Classification, RULES, Rule};

/// Where a package comes from and how it is unpacked.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageIdentity {
    /// Package path below the namespace, without the platform component.
    pub logical_name: String,
    pub archive_file_name: String,
    /// The archive carries one standalone artifact named after the package.
    pub is_single_file: bool,
    /// `/<platform>` for platform packages, empty otherwise.
    pub package_suffix: String,
}

impl PackageIdentity {
    /// Last component of the logical name (`tools/gn` -> `gn`).
    pub fn base_name(&self) -> &str {
        self.logical_name
            .rsplit('/')
            .next()
            .unwrap_or(&self.logical_name)
    }

    /// Archive name without its `.zip` extension.
    pub fn archive_stem(&self) -> &str {
        self.archive_file_name
            .strip_suffix(".zip")
            .unwrap_or(&self.archive_file_name)
    }

    /// `<logical_name><package_suffix>`, as shown to users.
    pub fn display_name(&self) -> String {
        format!("{}{}", self.logical_name, self.package_suffix)
    }

    /// Download location of a specific version of this package.
    pub fn download_url(&self, url_prefix: &str, version: &str) -> String {
        format!(
            "{}/{}{}/+/{}",
            url_prefix.trim_end_matches('/'),
            self.logical_name,
            self.package_suffix,
            version
        )
    }
}

/// A record together with its identity on this platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPackage {
    pub record: PackageRecord,
    pub identity: PackageIdentity,
}

/// Resolves a record for `platform`; `None` when it does not apply.
///
/// Rules are tried in [`RULES`] order and the first one that recognizes the
/// path decides.
pub fn resolve(record: &PackageRecord, platform: PlatformId) -> Option<PackageIdentity> {
    let path = record.relative_path()?;

    for rule in RULES {
        match (rule.apply)(path, platform) {
            Some(Classification::Package(identity)) => return Some(identity),
            Some(Classification::Foreign) => {
                debug!("Skipping {} (not for {})", record.package_path, platform);
                return None;
            }
            None => {}
        }
    }

    debug!("Skipping {} (unrecognized layout)", record.package_path);
    None
}

/// Resolves every record, keeping those that apply to `platform`.
pub fn resolve_all<I>(records: I, platform: PlatformId) -> Vec<ResolvedPackage>
where
    I: IntoIterator<Item = PackageRecord>,
{
    records
        .into_iter()
        .filter_map(|record| {
            resolve(&record, platform).map(|identity| ResolvedPackage { record, identity })
        })
        .collect()
}

/// Reads a versions file and resolves the packages that apply to `platform`.
pub fn load<R: Runtime>(
    runtime: &R,
    versions: &Path,
    platform: PlatformId,
) -> Result<Vec<ResolvedPackage>> {
    let records = manifest::read_records(runtime, versions)?;
    Ok(resolve_all(records, platform))
}
