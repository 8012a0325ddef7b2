//! Installed-version stamps.
//!
//! One file per package, `<root>/<archive stem>.stamp`, holding the version
//! that was last unpacked successfully. Stamps are replaced atomically so a
//! reader never sees a partially written value.

use anyhow::{Context, Result};
use log::debug;
use std::path::PathBuf;

use crate::package::PackageIdentity;
use crate::runtime::Runtime;

/// Installed state of a package relative to the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StampStatus {
    Current,
    Missing,
    /// Installed at a different version.
    Stale(String),
}

impl StampStatus {
    /// `current`, `missing`, or the installed version.
    pub fn label(&self) -> &str {
        match self {
            StampStatus::Current => "current",
            StampStatus::Missing => "missing",
            StampStatus::Stale(version) => version,
        }
    }
}

pub struct StampStore<'a, R: Runtime> {
    runtime: &'a R,
    root: PathBuf,
}

impl<'a, R: Runtime> StampStore<'a, R> {
    pub fn new(runtime: &'a R, root: impl Into<PathBuf>) -> Self {
        Self {
            runtime,
            root: root.into(),
        }
    }

    pub fn path_for(&self, identity: &PackageIdentity) -> PathBuf {
        self.root.join(format!("{}.stamp", identity.archive_stem()))
    }

    /// The stamped version, or `None` if the package was never installed.
    #[tracing::instrument(skip(self))]
    pub fn read(&self, identity: &PackageIdentity) -> Result<Option<String>> {
        let path = self.path_for(identity);
        if !self.runtime.exists(&path) {
            return Ok(None);
        }
        let content = self
            .runtime
            .read_to_string(&path)
            .with_context(|| format!("Failed to read stamp {:?}", path))?;
        Ok(Some(content.trim().to_string()))
    }

    /// Records `version` as installed.
    #[tracing::instrument(skip(self))]
    pub fn write(&self, identity: &PackageIdentity, version: &str) -> Result<()> {
        let path = self.path_for(identity);
        let tmp = path.with_extension("stamp.tmp");
        self.runtime.create_dir_all(&self.root)?;
        self.runtime
            .write(&tmp, version.as_bytes())
            .with_context(|| format!("Failed to write stamp {:?}", tmp))?;
        self.runtime
            .rename(&tmp, &path)
            .with_context(|| format!("Failed to move stamp into place at {:?}", path))?;
        debug!("Stamped {} at {}", identity.display_name(), version);
        Ok(())
    }

    pub fn status(
        &self,
        identity: &PackageIdentity,
        manifest_version: &str,
    ) -> Result<StampStatus> {
        Ok(match self.read(identity)? {
            None => StampStatus::Missing,
            Some(installed) if installed == manifest_version => StampStatus::Current,
            Some(installed) => StampStatus::Stale(installed),
        })
    }
}
