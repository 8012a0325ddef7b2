use anyhow::Result;
use async_trait::async_trait;
use log::{error, info};

use super::{Backend, EnsureReport};
use crate::config::{Config, ManifestSet};
use crate::error::PrebuiltError;
use crate::fetch::{FetchOutcome, Fetcher};
use crate::http::HttpClient;
use crate::package;
use crate::runtime::Runtime;

/// Fetches packages one at a time straight from the package server.
pub struct DirectBackend<'a, R: Runtime> {
    runtime: &'a R,
    http_client: HttpClient,
    config: &'a Config,
}

impl<'a, R: Runtime> DirectBackend<'a, R> {
    pub fn new(runtime: &'a R, http_client: HttpClient, config: &'a Config) -> Self {
        Self {
            runtime,
            http_client,
            config,
        }
    }
}

#[async_trait]
impl<R: Runtime> Backend for DirectBackend<'_, R> {
    fn name(&self) -> &'static str {
        "direct"
    }

    #[tracing::instrument(skip(self, manifests))]
    async fn ensure(&self, manifests: &ManifestSet) -> Result<EnsureReport> {
        if let Some(private) = &manifests.private {
            info!(
                "Skipping private manifest {:?}: its packages are only reachable through cipd",
                private.versions
            );
        }

        let packages = package::load(
            self.runtime,
            &manifests.public.versions,
            self.config.platform,
        )?;
        let fetcher = Fetcher::new(
            self.runtime,
            &self.http_client,
            &self.config.download_root,
            &self.config.url_prefix,
        );

        let mut report = EnsureReport::default();
        for package in &packages {
            let name = package.identity.display_name();
            match fetcher.fetch(package).await {
                Ok(FetchOutcome::Installed) => report.installed.push(name),
                Ok(FetchOutcome::UpToDate) => report.up_to_date.push(name),
                Err(e) => {
                    error!("{}", e);
                    report.failed.push(name);
                }
            }
        }

        info!(
            "{} installed, {} up to date, {} failed",
            report.installed.len(),
            report.up_to_date.len(),
            report.failed.len()
        );
        Ok(report)
    }

    async fn resolve_versions(&self, _manifests: &ManifestSet) -> Result<()> {
        Err(PrebuiltError::Usage(
            "resolving versions requires cipd; install it or pass --cipd <PATH>".into(),
        )
        .into())
    }
}
