//! Error taxonomy for prebuilt fetching.
//!
//! Per-package failures (`Download`, `Integrity`, `Unpack`, `Stamp`) are
//! caught at the package boundary and aggregated into `PackagesFailed`.
//! `ToolInvocation` is never isolated: the external tool manages every
//! package as one operation.

use std::path::PathBuf;
use thiserror::Error;

use crate::verify::DigestError;

const NO_CIPD_HINT: &str =
    "Pass --no-cipd (or remove cipd from PATH) to download packages directly.";

#[derive(Debug, Error)]
pub enum PrebuiltError {
    #[error("{0}")]
    Usage(String),

    #[error("Unsupported host platform: {os}/{arch}")]
    PlatformUnsupported { os: String, arch: String },

    #[error("Failed to download {package} from {url}: {cause:#}")]
    Download {
        package: String,
        url: String,
        cause: anyhow::Error,
    },

    #[error("Integrity check failed for {package} ({url}): {source}")]
    Integrity {
        package: String,
        url: String,
        #[source]
        source: DigestError,
    },

    #[error("Failed to unpack {} for {package}: {cause:#}", .archive.display())]
    Unpack {
        package: String,
        archive: PathBuf,
        cause: anyhow::Error,
    },

    #[error("Failed to record installed version of {package}: {cause:#}")]
    Stamp {
        package: String,
        cause: anyhow::Error,
    },

    #[error("`{command}` failed ({status}): {detail}\n{hint}", hint = NO_CIPD_HINT)]
    ToolInvocation {
        command: String,
        status: String,
        code: Option<i32>,
        detail: String,
    },

    #[error("{} package(s) failed: {}", .failed.len(), .failed.join(", "))]
    PackagesFailed { failed: Vec<String> },

    #[error("{count} package(s) do not match the manifest")]
    VerifyMismatch { count: usize },
}

impl PrebuiltError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            PrebuiltError::Usage(_) => 1,
            PrebuiltError::PlatformUnsupported { .. } => 3,
            PrebuiltError::ToolInvocation { code, .. } => match code {
                Some(code) if *code > 4 && *code <= u8::MAX as i32 => *code as u8,
                _ => 4,
            },
            _ => 2,
        }
    }
}

/// Maps any error surfacing from a run onto a process exit code.
pub fn exit_code(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<PrebuiltError>()
        .map(PrebuiltError::exit_code)
        .unwrap_or(2)
}
