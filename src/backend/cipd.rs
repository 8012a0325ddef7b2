use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, info};

use super::{Backend, EnsureReport};
use crate::cipd::CipdTool;
use crate::config::{Config, ManifestSet, ManifestSource};
use crate::error::PrebuiltError;
use crate::manifest::combine_ensure_files;
use crate::package::{self, ResolvedPackage};
use crate::runtime::Runtime;
use crate::stamp::{StampStatus, StampStore};

/// Hands the whole manifest to cipd in a single `ensure` run.
pub struct CipdBackend<'a, R: Runtime, T: CipdTool> {
    runtime: &'a R,
    tool: T,
    config: &'a Config,
}

impl<'a, R: Runtime, T: CipdTool> CipdBackend<'a, R, T> {
    pub fn new(runtime: &'a R, tool: T, config: &'a Config) -> Self {
        Self {
            runtime,
            tool,
            config,
        }
    }

    /// The private source, if it is configured and we may read it.
    async fn accessible_private<'m>(
        &self,
        manifests: &'m ManifestSet,
    ) -> Result<Option<&'m ManifestSource>> {
        let Some(private) = &manifests.private else {
            return Ok(None);
        };
        if self.tool.has_read_access(&manifests.private_prefix).await? {
            Ok(Some(private))
        } else {
            info!(
                "No read access to {}, skipping {:?}",
                manifests.private_prefix, private.ensure
            );
            Ok(None)
        }
    }

    /// Packages of the public versions file, if it exists.
    ///
    /// Private versions files name `fuchsia_internal/` packages, which the
    /// manifest parser filters out, so only public packages carry stamps.
    fn public_packages(&self, public: &ManifestSource) -> Result<Option<Vec<ResolvedPackage>>> {
        if !self.runtime.exists(&public.versions) {
            debug!("No versions file at {:?}", public.versions);
            return Ok(None);
        }
        package::load(self.runtime, &public.versions, self.config.platform).map(Some)
    }
}

#[async_trait]
impl<R: Runtime, T: CipdTool> Backend for CipdBackend<'_, R, T> {
    fn name(&self) -> &'static str {
        "cipd"
    }

    #[tracing::instrument(skip(self, manifests))]
    async fn ensure(&self, manifests: &ManifestSet) -> Result<EnsureReport> {
        let root = &self.config.download_root;
        let stamps = StampStore::new(self.runtime, root);

        let known = self.public_packages(&manifests.public)?;

        // Everything already stamped: no reason to start the tool at all.
        // Private packages have no stamps, so a private set always runs it.
        if let (Some(known), None) = (&known, &manifests.private) {
            let mut all_current = true;
            for package in known {
                let status = stamps.status(&package.identity, &package.record.version)?;
                all_current &= status == StampStatus::Current;
            }
            if all_current {
                info!("All {} packages are up to date", known.len());
                return Ok(EnsureReport {
                    up_to_date: known.iter().map(|p| p.identity.display_name()).collect(),
                    ..Default::default()
                });
            }
        }

        let mut sources = vec![&manifests.public];
        sources.extend(self.accessible_private(manifests).await?);

        let mut ensure_files = Vec::with_capacity(sources.len());
        for source in &sources {
            ensure_files.push(
                self.runtime
                    .read_to_string(&source.ensure)
                    .with_context(|| format!("Failed to read ensure file {:?}", source.ensure))?,
            );
        }
        let combined = combine_ensure_files(&ensure_files);

        self.runtime.create_dir_all(root)?;
        self.tool
            .ensure(root, &combined, &manifests.public.dir())
            .await?;

        // cipd owns the layout it just installed; record the manifest
        // versions without re-checking each package.
        let mut report = EnsureReport::default();
        for package in known.into_iter().flatten() {
            stamps
                .write(&package.identity, &package.record.version)
                .map_err(|cause| PrebuiltError::Stamp {
                    package: package.identity.display_name(),
                    cause,
                })?;
            report.installed.push(package.identity.display_name());
        }
        Ok(report)
    }

    #[tracing::instrument(skip(self, manifests))]
    async fn resolve_versions(&self, manifests: &ManifestSet) -> Result<()> {
        let mut sources = vec![&manifests.public];
        sources.extend(self.accessible_private(manifests).await?);

        for source in sources {
            info!("Resolving {:?}", source.ensure);
            self.tool.resolve(&source.ensure, &source.dir()).await?;
        }
        Ok(())
    }
}
