//! Versions manifest parsing.
//!
//! A versions file is a flat sequence of three-line records:
//!
//! ```text
//! # comment
//! fuchsia/tools/gn/linux-amd64
//!     git_revision:0123abcd
//!     6a4e3c1b8f0e0c4b9d3f1b5f2e7d9a8c6b4a2e0f
//! ```
//!
//! Blank lines and `#` comments may appear anywhere, including between the
//! lines of one record, without disturbing the grouping.

mod ensure;

use anyhow::{Context, Result};
use log::debug;
use std::path::Path;

use crate::runtime::Runtime;

pub use ensure::combine_ensure_files;

/// Package paths outside this namespace belong to other ecosystems.
pub const NAMESPACE: &str = "fuchsia/";

/// One pinned package from a versions file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRecord {
    pub package_path: String,
    pub tag: String,
    pub version: String,
}

impl PackageRecord {
    /// Package path with the namespace prefix removed.
    pub fn relative_path(&self) -> Option<&str> {
        self.package_path.strip_prefix(NAMESPACE)
    }
}

/// Lazily groups manifest lines into records.
pub struct Records<I> {
    lines: I,
    slots: Vec<String>,
}

impl<I, S> Iterator for Records<I>
where
    I: Iterator<Item = S>,
    S: AsRef<str>,
{
    type Item = PackageRecord;

    fn next(&mut self) -> Option<PackageRecord> {
        for line in self.lines.by_ref() {
            let line = line.as_ref().trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            self.slots.push(line.to_string());
            if self.slots.len() == 3 {
                let mut slots = std::mem::take(&mut self.slots).into_iter();
                return Some(PackageRecord {
                    package_path: slots.next()?,
                    tag: slots.next()?,
                    version: slots.next()?,
                });
            }
        }

        if !self.slots.is_empty() {
            debug!(
                "Dropping incomplete trailing manifest record: {:?}",
                self.slots
            );
            self.slots.clear();
        }
        None
    }
}

/// Groups lines into records without filtering.
pub fn records<I, S>(lines: I) -> Records<I::IntoIter>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    Records {
        lines: lines.into_iter(),
        slots: Vec::with_capacity(3),
    }
}

/// Parses manifest lines into the records of our namespace.
pub fn parse<I, S>(lines: I) -> impl Iterator<Item = PackageRecord>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    records(lines).filter(|record| {
        let keep = record.package_path.starts_with(NAMESPACE);
        if !keep {
            debug!("Ignoring package outside namespace: {}", record.package_path);
        }
        keep
    })
}

/// Reads and parses a versions file.
#[tracing::instrument(skip(runtime))]
pub fn read_records<R: Runtime>(runtime: &R, path: &Path) -> Result<Vec<PackageRecord>> {
    let content = runtime
        .read_to_string(path)
        .with_context(|| format!("Failed to read manifest {:?}", path))?;
    Ok(parse(content.lines()).collect())
}
