//! Per-package fetch pipeline for the direct backend.
//!
//! stamp check → download (resumable) → verify → unpack → stamp.
//! Every failure is scoped to the package being fetched; the stamp is only
//! written once everything before it succeeded.

use log::{debug, info, warn};
use std::path::{Path, PathBuf};

use crate::archive::{ArchiveExtractor, ZipExtractor};
use crate::download::download_file;
use crate::error::PrebuiltError;
use crate::http::HttpClient;
use crate::package::ResolvedPackage;
use crate::runtime::Runtime;
use crate::stamp::{StampStatus, StampStore};
use crate::verify::{ExpectedDigest, verify_file};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Stamp already matched; nothing was touched.
    UpToDate,
    Installed,
}

pub struct Fetcher<'a, R: Runtime> {
    runtime: &'a R,
    http_client: &'a HttpClient,
    root: PathBuf,
    url_prefix: String,
    extractor: ZipExtractor,
}

impl<'a, R: Runtime> Fetcher<'a, R> {
    pub fn new(
        runtime: &'a R,
        http_client: &'a HttpClient,
        root: impl Into<PathBuf>,
        url_prefix: impl Into<String>,
    ) -> Self {
        Self {
            runtime,
            http_client,
            root: root.into(),
            url_prefix: url_prefix.into(),
            extractor: ZipExtractor,
        }
    }

    /// Partial download for one version of `archive_file_name`.
    pub fn part_path(&self, archive_file_name: &str, version: &str) -> PathBuf {
        self.root
            .join(format!("{}.{}.part", archive_file_name, version))
    }

    #[tracing::instrument(skip(self, package), fields(package = %package.identity.display_name()))]
    pub async fn fetch(&self, package: &ResolvedPackage) -> Result<FetchOutcome, PrebuiltError> {
        let identity = &package.identity;
        let version = package.record.version.as_str();
        let name = identity.display_name();
        let stamps = StampStore::new(self.runtime, &self.root);

        let status = stamps
            .status(identity, version)
            .map_err(|cause| PrebuiltError::Stamp {
                package: name.clone(),
                cause,
            })?;
        if status == StampStatus::Current {
            info!("{} is up to date", name);
            return Ok(FetchOutcome::UpToDate);
        }

        let url = identity.download_url(&self.url_prefix, version);

        // Reject unusable versions before spending a download on them.
        if let Err(source) = ExpectedDigest::parse(version) {
            return Err(PrebuiltError::Integrity {
                package: name,
                url,
                source,
            });
        }

        let archive = self.root.join(&identity.archive_file_name);
        let part = self.part_path(&identity.archive_file_name, version);
        let download_error = |cause: anyhow::Error| PrebuiltError::Download {
            package: name.clone(),
            url: url.clone(),
            cause,
        };

        if self.runtime.exists(&archive) {
            debug!("Removing stale archive {:?}", archive);
            self.runtime.remove_file(&archive).map_err(download_error)?;
        }
        self.remove_stale_parts(&identity.archive_file_name, &part);

        eprintln!("Downloading {} ...", name);
        download_file(self.runtime, &url, &part, self.http_client)
            .await
            .map_err(download_error)?;

        if let Err(source) = verify_file(self.runtime, &part, version) {
            if let Err(e) = self.runtime.remove_file(&part) {
                warn!("Failed to remove corrupt download {:?}: {:#}", part, e);
            }
            return Err(PrebuiltError::Integrity {
                package: name,
                url,
                source,
            });
        }

        let unpack_error = |cause: anyhow::Error| PrebuiltError::Unpack {
            package: name.clone(),
            archive: archive.clone(),
            cause,
        };
        self.runtime
            .rename(&part, &archive)
            .map_err(unpack_error)?;
        self.unpack(package, &archive).map_err(unpack_error)?;

        stamps
            .write(identity, version)
            .map_err(|cause| PrebuiltError::Stamp {
                package: name.clone(),
                cause,
            })?;

        info!("Installed {} at {}", name, version);
        Ok(FetchOutcome::Installed)
    }

    /// Drops partial downloads of other versions of the same archive.
    fn remove_stale_parts(&self, archive_file_name: &str, keep: &Path) {
        if !self.runtime.exists(&self.root) {
            return;
        }
        let entries = match self.runtime.read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Failed to look for stale downloads: {:#}", e);
                return;
            }
        };
        let prefix = format!("{}.", archive_file_name);
        for path in entries {
            let is_part = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(&prefix) && n.ends_with(".part"));
            if !is_part || path.as_path() == keep {
                continue;
            }
            debug!("Removing stale partial download {:?}", path);
            if let Err(e) = self.runtime.remove_file(&path) {
                warn!("Failed to remove {:?}: {:#}", path, e);
            }
        }
    }

    fn unpack(&self, package: &ResolvedPackage, archive: &Path) -> anyhow::Result<()> {
        let identity = &package.identity;
        if !self.extractor.can_handle(archive) {
            anyhow::bail!("{:?} is not a zip archive", archive);
        }
        if identity.is_single_file {
            let base = identity.base_name();
            self.extractor
                .extract_entry(self.runtime, archive, base, &self.root.join(base))
        } else {
            self.extractor
                .extract(self.runtime, archive, &self.root.join(identity.archive_stem()))
        }
    }
}
