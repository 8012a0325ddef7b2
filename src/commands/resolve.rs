use anyhow::Result;
use log::info;

use crate::backend;
use crate::config::Config;
use crate::runtime::Runtime;

/// Regenerates the versions files from their ensure files.
#[tracing::instrument(skip(runtime, config))]
pub async fn resolve<R: Runtime>(runtime: &R, config: &Config) -> Result<()> {
    let backend = backend::from_config(runtime, config)?;
    backend.resolve_versions(&config.manifests).await?;
    info!("Versions resolved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests::config;
    use crate::config::Mode;
    use crate::runtime::RealRuntime;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_resolve_without_cipd_is_usage_error() {
        let dir = tempdir().unwrap();
        let config = config(dir.path(), Mode::Resolve);

        let err = resolve(&RealRuntime, &config).await.unwrap_err();
        assert_eq!(crate::error::exit_code(&err), 1);
    }
}
