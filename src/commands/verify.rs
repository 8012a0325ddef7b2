use anyhow::Result;
use log::debug;

use crate::config::Config;
use crate::error::PrebuiltError;
use crate::runtime::Runtime;
use crate::stamp::{StampStatus, StampStore};

use super::resolved_packages;

/// Checks every stamp against the manifest; silent when all match.
#[tracing::instrument(skip(runtime, config))]
pub fn verify<R: Runtime>(runtime: &R, config: &Config) -> Result<()> {
    let stamps = StampStore::new(runtime, &config.download_root);
    let packages = resolved_packages(runtime, config)?;

    let mut mismatches = 0;
    for package in &packages {
        let status = stamps.status(&package.identity, &package.record.version)?;
        if status != StampStatus::Current {
            eprintln!(
                "warning: {} is {}, manifest wants {}",
                package.identity.display_name(),
                match &status {
                    StampStatus::Missing => "not installed".to_string(),
                    other => format!("at {}", other.label()),
                },
                package.record.version
            );
            mismatches += 1;
        }
    }

    debug!("{} of {} packages match", packages.len() - mismatches, packages.len());
    if mismatches > 0 {
        return Err(PrebuiltError::VerifyMismatch { count: mismatches }.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests::{CLANG_VERSION, GN_VERSION, config, write_versions};
    use crate::config::Mode;
    use crate::runtime::RealRuntime;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_verify_all_current() {
        let dir = tempdir().unwrap();
        write_versions(dir.path());
        let config = config(dir.path(), Mode::Verify);
        fs::create_dir_all(&config.download_root).unwrap();
        fs::write(config.download_root.join("gn.stamp"), GN_VERSION).unwrap();
        fs::write(config.download_root.join("clang.stamp"), CLANG_VERSION).unwrap();

        verify(&RealRuntime, &config).unwrap();
    }

    #[test]
    fn test_verify_counts_mismatches() {
        let dir = tempdir().unwrap();
        write_versions(dir.path());
        let config = config(dir.path(), Mode::Verify);
        fs::create_dir_all(&config.download_root).unwrap();
        fs::write(config.download_root.join("clang.stamp"), "stale").unwrap();

        let err = verify(&RealRuntime, &config).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PrebuiltError>(),
            Some(PrebuiltError::VerifyMismatch { count: 2 })
        ));
        assert_eq!(crate::error::exit_code(&err), 2);
    }
}
