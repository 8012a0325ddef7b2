//! Host platform detection.
//!
//! Packages are published per platform under a closed set of identifiers.
//! The host is detected once at startup and mapped onto that set; any
//! other OS/architecture combination is rejected before work begins.

use std::fmt;
use std::str::FromStr;

use crate::error::PrebuiltError;

/// Raw host information, as reported by the compiler target.
#[derive(Debug, Clone, PartialEq)]
pub struct HostPlatform {
    pub os: String,
    pub arch: String,
}

impl HostPlatform {
    /// Detect the current platform
    pub fn detect() -> Self {
        Self {
            os: Self::detect_os(),
            arch: Self::detect_arch(),
        }
    }

    fn detect_os() -> String {
        #[cfg(target_os = "macos")]
        {
            "macos".to_string()
        }
        #[cfg(target_os = "linux")]
        {
            "linux".to_string()
        }
        #[cfg(not(any(target_os = "macos", target_os = "linux")))]
        {
            std::env::consts::OS.to_string()
        }
    }

    fn detect_arch() -> String {
        #[cfg(target_arch = "x86_64")]
        {
            "x86_64".to_string()
        }
        #[cfg(target_arch = "aarch64")]
        {
            "aarch64".to_string()
        }
        #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
        {
            std::env::consts::ARCH.to_string()
        }
    }
}

/// Platform identifier used as the last component of package paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlatformId {
    MacAmd64,
    LinuxAmd64,
    LinuxArm64,
}

impl PlatformId {
    pub const ALL: [PlatformId; 3] = [
        PlatformId::MacAmd64,
        PlatformId::LinuxAmd64,
        PlatformId::LinuxArm64,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PlatformId::MacAmd64 => "mac-amd64",
            PlatformId::LinuxAmd64 => "linux-amd64",
            PlatformId::LinuxArm64 => "linux-arm64",
        }
    }

    /// Detect the platform of the running host.
    pub fn detect() -> Result<Self, PrebuiltError> {
        Self::try_from(&HostPlatform::detect())
    }
}

impl TryFrom<&HostPlatform> for PlatformId {
    type Error = PrebuiltError;

    fn try_from(host: &HostPlatform) -> Result<Self, Self::Error> {
        match (host.os.as_str(), host.arch.as_str()) {
            ("macos", "x86_64") => Ok(PlatformId::MacAmd64),
            ("linux", "x86_64") => Ok(PlatformId::LinuxAmd64),
            ("linux", "aarch64") => Ok(PlatformId::LinuxArm64),
            (os, arch) => Err(PrebuiltError::PlatformUnsupported {
                os: os.to_string(),
                arch: arch.to_string(),
            }),
        }
    }
}

impl fmt::Display for PlatformId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlatformId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PlatformId::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Unknown platform: {}. Expected mac-amd64, linux-amd64, or linux-arm64.",
                    s
                )
            })
    }
}
