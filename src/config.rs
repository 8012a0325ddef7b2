//! Run configuration.
//!
//! [`Config`] is built once from the parsed command line, the host platform
//! and cipd discovery, then passed by reference to every component.

use anyhow::Result;
use log::{debug, info};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cipd;
use crate::error::PrebuiltError;
use crate::platform::PlatformId;
use crate::runtime::Runtime;
use crate::runtime::path::{normalize_path, parent_dir};

pub const DEFAULT_VERSIONS: &str = "prebuilt/prebuilts.versions";
pub const DEFAULT_URL_PREFIX: &str = "https://chrome-infra-packages.appspot.com/dl/fuchsia";
pub const DEFAULT_PRIVATE_PREFIX: &str = "fuchsia_internal";
pub const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 1800;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Update,
    Verify,
    List,
    Resolve,
}

/// An ensure file and the versions file resolved from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestSource {
    pub ensure: PathBuf,
    pub versions: PathBuf,
}

impl ManifestSource {
    /// Pairs `versions` with `ensure`, defaulting to the `.ensure` sibling.
    pub fn new(versions: PathBuf, ensure: Option<PathBuf>) -> Self {
        let ensure = ensure.unwrap_or_else(|| versions.with_extension("ensure"));
        Self { ensure, versions }
    }

    /// Directory relative references in the manifest resolve against.
    pub fn dir(&self) -> PathBuf {
        parent_dir(&self.versions)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestSet {
    pub public: ManifestSource,
    pub private: Option<ManifestSource>,
    /// Package prefix checked with `acl-check` before using `private`.
    pub private_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendChoice {
    Direct,
    Cipd(PathBuf),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub mode: Mode,
    pub platform: PlatformId,
    pub download_root: PathBuf,
    pub manifests: ManifestSet,
    pub url_prefix: String,
    pub backend: BackendChoice,
    pub download_timeout: Duration,
    pub tool_timeout: Duration,
    pub config_out: PathBuf,
}

/// Raw settings as given on the command line, before defaults are applied.
#[derive(Debug, Clone)]
pub struct Options {
    pub mode: Mode,
    pub no_cipd: bool,
    pub versions: PathBuf,
    pub ensure: Option<PathBuf>,
    pub private_versions: Option<PathBuf>,
    pub private_ensure: Option<PathBuf>,
    pub private_prefix: String,
    pub root: Option<PathBuf>,
    pub url_prefix: String,
    pub cipd: Option<PathBuf>,
    pub platform: Option<PlatformId>,
    pub timeout_secs: u64,
    pub tool_timeout_secs: u64,
    pub config_out: Option<PathBuf>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            mode: Mode::Update,
            no_cipd: false,
            versions: PathBuf::from(DEFAULT_VERSIONS),
            ensure: None,
            private_versions: None,
            private_ensure: None,
            private_prefix: DEFAULT_PRIVATE_PREFIX.to_string(),
            root: None,
            url_prefix: DEFAULT_URL_PREFIX.to_string(),
            cipd: None,
            platform: None,
            timeout_secs: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
            tool_timeout_secs: DEFAULT_TOOL_TIMEOUT_SECS,
            config_out: None,
        }
    }
}

impl Config {
    pub fn new<R: Runtime>(runtime: &R, options: Options) -> Result<Self> {
        if options.mode == Mode::Resolve && options.no_cipd {
            return Err(
                PrebuiltError::Usage("--resolve cannot be combined with --no-cipd".into()).into(),
            );
        }

        let platform = match options.platform {
            Some(platform) => platform,
            None => PlatformId::detect()?,
        };

        let public = ManifestSource::new(options.versions, options.ensure);
        let versions_dir = public.dir();
        let download_root = options
            .root
            .unwrap_or_else(|| versions_dir.join("downloads"));

        let private = match (options.private_versions, options.private_ensure) {
            (Some(versions), ensure) => Some(ManifestSource::new(versions, ensure)),
            (None, Some(ensure)) => Some(ManifestSource {
                versions: ensure.with_extension("versions"),
                ensure,
            }),
            (None, None) => None,
        };

        let backend = if options.no_cipd {
            debug!("cipd disabled, downloading directly");
            BackendChoice::Direct
        } else {
            match cipd::discover(
                runtime,
                options.cipd.as_deref(),
                &default_cipd_location(&versions_dir),
            ) {
                Some(exe) => {
                    debug!("Using cipd at {:?}", exe);
                    BackendChoice::Cipd(exe)
                }
                None => {
                    info!("cipd not found, downloading directly");
                    BackendChoice::Direct
                }
            }
        };

        let config_out = options
            .config_out
            .unwrap_or_else(|| download_root.join("config.mk"));

        Ok(Self {
            mode: options.mode,
            platform,
            download_root,
            manifests: ManifestSet {
                public,
                private,
                private_prefix: options.private_prefix,
            },
            url_prefix: options.url_prefix,
            backend,
            download_timeout: Duration::from_secs(options.timeout_secs),
            tool_timeout: Duration::from_secs(options.tool_timeout_secs),
            config_out,
        })
    }
}

/// `<versions dir>/../.cipd/cipd`, where the checkout bootstraps the tool.
pub fn default_cipd_location(versions_dir: &Path) -> PathBuf {
    normalize_path(&versions_dir.join("..").join(".cipd").join(cipd::EXECUTABLE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::MockRuntime;
    use mockall::predicate::eq;

    fn options() -> Options {
        Options {
            platform: Some(PlatformId::LinuxAmd64),
            versions: PathBuf::from("/src/prebuilt/prebuilts.versions"),
            ..Options::default()
        }
    }

    #[test]
    fn test_defaults_derive_from_versions_path() {
        let runtime = MockRuntime::new();
        let config = Config::new(
            &runtime,
            Options {
                no_cipd: true,
                ..options()
            },
        )
        .unwrap();

        assert_eq!(config.mode, Mode::Update);
        assert_eq!(
            config.manifests.public.ensure,
            PathBuf::from("/src/prebuilt/prebuilts.ensure")
        );
        assert_eq!(config.download_root, PathBuf::from("/src/prebuilt/downloads"));
        assert_eq!(
            config.config_out,
            PathBuf::from("/src/prebuilt/downloads/config.mk")
        );
        assert_eq!(config.manifests.private, None);
        assert_eq!(config.manifests.private_prefix, "fuchsia_internal");
        assert_eq!(config.backend, BackendChoice::Direct);
        assert_eq!(config.download_timeout, Duration::from_secs(600));
        assert_eq!(config.tool_timeout, Duration::from_secs(1800));
    }

    #[test]
    fn test_default_cipd_location() {
        assert_eq!(
            default_cipd_location(Path::new("/src/prebuilt")),
            PathBuf::from("/src/.cipd/cipd")
        );
        assert_eq!(
            default_cipd_location(Path::new(".")),
            PathBuf::from("../.cipd/cipd")
        );
    }

    #[test]
    fn test_cipd_from_default_location() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_exists()
            .with(eq(PathBuf::from("/src/.cipd/cipd")))
            .returning(|_| true);

        let config = Config::new(&runtime, options()).unwrap();
        assert_eq!(
            config.backend,
            BackendChoice::Cipd(PathBuf::from("/src/.cipd/cipd"))
        );
    }

    #[test]
    fn test_no_cipd_skips_discovery() {
        // Strict mock: discovery must not touch the filesystem.
        let runtime = MockRuntime::new();
        let config = Config::new(
            &runtime,
            Options {
                no_cipd: true,
                cipd: Some(PathBuf::from("/opt/cipd")),
                ..options()
            },
        )
        .unwrap();
        assert_eq!(config.backend, BackendChoice::Direct);
    }

    #[test]
    fn test_private_manifest_pairing() {
        let runtime = MockRuntime::new();
        let config = Config::new(
            &runtime,
            Options {
                no_cipd: true,
                private_versions: Some(PathBuf::from("/src/internal/prebuilts.versions")),
                ..options()
            },
        )
        .unwrap();
        assert_eq!(
            config.manifests.private,
            Some(ManifestSource {
                ensure: PathBuf::from("/src/internal/prebuilts.ensure"),
                versions: PathBuf::from("/src/internal/prebuilts.versions"),
            })
        );
    }

    #[test]
    fn test_explicit_root_and_config_out() {
        let runtime = MockRuntime::new();
        let config = Config::new(
            &runtime,
            Options {
                no_cipd: true,
                root: Some(PathBuf::from("/cache")),
                ..options()
            },
        )
        .unwrap();
        assert_eq!(config.download_root, PathBuf::from("/cache"));
        assert_eq!(config.config_out, PathBuf::from("/cache/config.mk"));
    }

    #[test]
    fn test_resolve_conflicts_with_no_cipd() {
        let runtime = MockRuntime::new();
        let err = Config::new(
            &runtime,
            Options {
                mode: Mode::Resolve,
                no_cipd: true,
                ..options()
            },
        )
        .unwrap_err();
        assert_eq!(crate::error::exit_code(&err), 1);
    }

    #[test]
    fn test_bare_versions_file_uses_current_dir() {
        let runtime = MockRuntime::new();
        let config = Config::new(
            &runtime,
            Options {
                no_cipd: true,
                versions: PathBuf::from("prebuilts.versions"),
                ..options()
            },
        )
        .unwrap();
        assert_eq!(config.download_root, PathBuf::from("./downloads"));
    }
}
