use anyhow::Result;
use log::debug;

use crate::config::{Config, Mode};
use crate::package::{self, ResolvedPackage};
use crate::runtime::Runtime;

mod list;
mod resolve;
mod update;
mod verify;

pub use list::list;
pub use resolve::resolve;
pub use update::update;
pub use verify::verify;

/// Runs the mode selected in `config`.
#[tracing::instrument(skip(runtime, config))]
pub async fn run<R: Runtime>(runtime: &R, config: &Config) -> Result<()> {
    debug!("Running {:?} for {}", config.mode, config.platform);
    match config.mode {
        Mode::Update => update(runtime, config).await,
        Mode::Verify => verify(runtime, config),
        Mode::List => {
            for line in list(runtime, config)? {
                println!("{}", line);
            }
            Ok(())
        }
        Mode::Resolve => resolve(runtime, config).await,
    }
}

/// Packages for this platform from the public versions file.
///
/// A private versions file only names `fuchsia_internal/` packages, which
/// the parser does not track, so it never contributes here.
pub fn resolved_packages<R: Runtime>(runtime: &R, config: &Config) -> Result<Vec<ResolvedPackage>> {
    package::load(runtime, &config.manifests.public.versions, config.platform)
}
