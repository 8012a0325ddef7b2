//! Make-syntax fragment pointing the build at installed prebuilts.

use anyhow::{Context, Result};
use log::{debug, info};
use std::fmt::Write as _;
use std::path::Path;

use crate::package::ResolvedPackage;
use crate::platform::PlatformId;
use crate::runtime::Runtime;

const HEADER: &str = "# Generated by prebuilts. Do not edit.\n";

/// `clang` -> `CLANG`, `arm-trusted-firmware` -> `ARM_TRUSTED_FIRMWARE`.
pub fn variable_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Renders the fragment for `packages` installed under `root`.
pub fn render(platform: PlatformId, root: &Path, packages: &[ResolvedPackage]) -> String {
    let mut out = String::from(HEADER);
    let _ = writeln!(out, "PREBUILT_PLATFORM := {}", platform);
    for package in packages {
        let identity = &package.identity;
        let (kind, path) = if identity.is_single_file {
            ("TOOL", root.join(identity.base_name()))
        } else {
            ("DIR", root.join(identity.archive_stem()))
        };
        let _ = writeln!(
            out,
            "PREBUILT_{}_{} := {}",
            variable_name(identity.archive_stem()),
            kind,
            path.display()
        );
    }
    out
}

/// Writes `content` to `path` unless it already holds exactly that.
///
/// Returns whether the file was rewritten. Leaving an unchanged file alone
/// keeps its mtime, so make does not rebuild everything that includes it.
#[tracing::instrument(skip(runtime, content))]
pub fn write_if_changed<R: Runtime>(runtime: &R, path: &Path, content: &str) -> Result<bool> {
    if runtime.exists(path) {
        let current = runtime
            .read_to_string(path)
            .with_context(|| format!("Failed to read {:?}", path))?;
        if current == content {
            debug!("{:?} is unchanged", path);
            return Ok(false);
        }
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        runtime.create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    runtime
        .write(&tmp, content.as_bytes())
        .with_context(|| format!("Failed to write {:?}", tmp))?;
    runtime
        .rename(&tmp, path)
        .with_context(|| format!("Failed to move build config into place at {:?}", path))?;
    info!("Wrote {:?}", path);
    Ok(true)
}
