//! Installation backends.
//!
//! `cipd` installs everything in one delegated run when it is available;
//! otherwise packages are fetched one at a time over HTTP. Both sit behind
//! [`Backend`] so the update and resolve modes do not care which one runs.

mod cipd;
mod direct;

use anyhow::Result;
use async_trait::async_trait;

use crate::cipd::Cipd;
use crate::config::{BackendChoice, Config, ManifestSet};
use crate::error::PrebuiltError;
use crate::http::HttpClient;
use crate::runtime::Runtime;

pub use cipd::CipdBackend;
pub use direct::DirectBackend;

/// Package names grouped by what happened to them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnsureReport {
    pub installed: Vec<String>,
    pub up_to_date: Vec<String>,
    pub failed: Vec<String>,
}

impl EnsureReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Turns collected per-package failures into one aggregate error.
    pub fn into_result(self) -> Result<Self, PrebuiltError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(PrebuiltError::PackagesFailed {
                failed: self.failed,
            })
        }
    }
}

#[async_trait]
pub trait Backend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Brings the download root in line with `manifests`.
    async fn ensure(&self, manifests: &ManifestSet) -> Result<EnsureReport>;

    /// Regenerates versions files from their ensure files.
    async fn resolve_versions(&self, manifests: &ManifestSet) -> Result<()>;
}

/// The backend `config` asks for.
pub fn from_config<'a, R: Runtime>(
    runtime: &'a R,
    config: &'a Config,
) -> Result<Box<dyn Backend + 'a>> {
    Ok(match &config.backend {
        BackendChoice::Cipd(exe) => Box::new(CipdBackend::new(
            runtime,
            Cipd::new(exe, config.tool_timeout),
            config,
        )),
        BackendChoice::Direct => Box::new(DirectBackend::new(
            runtime,
            HttpClient::with_timeout(config.download_timeout)?,
            config,
        )),
    })
}
