use anyhow::Result;

use crate::config::Config;
use crate::runtime::Runtime;
use crate::stamp::StampStore;

use super::resolved_packages;

/// One `<name> installed=<state> current=<version>` line per package.
#[tracing::instrument(skip(runtime, config))]
pub fn list<R: Runtime>(runtime: &R, config: &Config) -> Result<Vec<String>> {
    let stamps = StampStore::new(runtime, &config.download_root);
    resolved_packages(runtime, config)?
        .iter()
        .map(|package| -> Result<String> {
            let status = stamps.status(&package.identity, &package.record.version)?;
            Ok(format!(
                "{} installed={} current={}",
                package.identity.display_name(),
                status.label(),
                package.record.version
            ))
        })
        .collect()
}
