use anyhow::{Context, Result};
use log::info;

use crate::backend;
use crate::buildcfg;
use crate::config::Config;
use crate::runtime::Runtime;
use crate::stamp::{StampStatus, StampStore};

use super::resolved_packages;

/// Installs everything the manifests pin, then refreshes the build config.
#[tracing::instrument(skip(runtime, config))]
pub async fn update<R: Runtime>(runtime: &R, config: &Config) -> Result<()> {
    let backend = backend::from_config(runtime, config)?;
    info!("Updating prebuilts using the {} backend", backend.name());

    let report = backend.ensure(&config.manifests).await?.into_result()?;
    info!(
        "{} installed, {} already up to date",
        report.installed.len(),
        report.up_to_date.len()
    );

    write_build_config(runtime, config)
}

/// Describes the packages whose stamps match the manifest.
fn write_build_config<R: Runtime>(runtime: &R, config: &Config) -> Result<()> {
    let stamps = StampStore::new(runtime, &config.download_root);
    let mut installed = Vec::new();
    for package in resolved_packages(runtime, config)? {
        if stamps.status(&package.identity, &package.record.version)? == StampStatus::Current {
            installed.push(package);
        }
    }

    let root = std::path::absolute(&config.download_root)
        .with_context(|| format!("Failed to resolve {:?}", config.download_root))?;
    let content = buildcfg::render(config.platform, &root, &installed);
    buildcfg::write_if_changed(runtime, &config.config_out, &content)?;
    Ok(())
}
