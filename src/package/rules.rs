use crate::platform::PlatformId;

use super::PackageIdentity;

/// Outcome of a rule that recognized a package path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Package(PackageIdentity),
    /// Built for a platform other than the current one.
    Foreign,
}

/// A path-shape rule. `apply` returns `None` when the shape does not match.
pub struct Rule {
    pub name: &'static str,
    pub apply: fn(&str, PlatformId) -> Option<Classification>,
}

/// Classification rules, first match wins.
///
/// Order matters: `tools/gn/linux-amd64` also has the generic
/// `<name>/<platform>` shape, so the tool rule must run before it.
pub const RULES: &[Rule] = &[
    Rule {
        name: "tool",
        apply: tool_package,
    },
    Rule {
        name: "platform-directory",
        apply: platform_directory_package,
    },
    Rule {
        name: "firmware",
        apply: firmware_package,
    },
    Rule {
        name: "foreign-platform",
        apply: foreign_platform_package,
    },
];

/// `tools/<name>/<platform>`: one standalone executable.
fn tool_package(path: &str, platform: PlatformId) -> Option<Classification> {
    let parts: Vec<&str> = path.split('/').collect();
    match parts.as_slice() {
        ["tools", name, suffix] if !name.is_empty() && *suffix == platform.as_str() => {
            Some(Classification::Package(PackageIdentity {
                logical_name: format!("tools/{}", name),
                archive_file_name: format!("{}.zip", name),
                is_single_file: true,
                package_suffix: format!("/{}", platform),
            }))
        }
        _ => None,
    }
}

/// `<name>/<platform>` outside `tools/`: unpacked as a directory.
fn platform_directory_package(path: &str, platform: PlatformId) -> Option<Classification> {
    let (name, suffix) = path.rsplit_once('/')?;
    if suffix != platform.as_str() || name.is_empty() {
        return None;
    }
    if name.split('/').next() == Some("tools") {
        return None;
    }
    let base = name.rsplit('/').next().filter(|b| !b.is_empty())?;
    Some(Classification::Package(PackageIdentity {
        logical_name: name.to_string(),
        archive_file_name: format!("{}.zip", base),
        is_single_file: false,
        package_suffix: format!("/{}", platform),
    }))
}

/// `firmware/<name>`: platform independent.
fn firmware_package(path: &str, _platform: PlatformId) -> Option<Classification> {
    let name = path.strip_prefix("firmware/")?;
    if name.is_empty() || name.contains('/') || name.parse::<PlatformId>().is_ok() {
        return None;
    }
    Some(Classification::Package(PackageIdentity {
        logical_name: path.to_string(),
        archive_file_name: format!("{}.zip", name),
        is_single_file: false,
        package_suffix: String::new(),
    }))
}

/// Anything ending in a platform that is not ours.
fn foreign_platform_package(path: &str, platform: PlatformId) -> Option<Classification> {
    let suffix = path.rsplit('/').next()?;
    match suffix.parse::<PlatformId>() {
        Ok(other) if other != platform => Some(Classification::Foreign),
        _ => None,
    }
}
