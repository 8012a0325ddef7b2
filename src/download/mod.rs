use crate::http::{HttpClient, WriteMode};
use crate::runtime::Runtime;
use anyhow::{Context, Result};
use log::debug;
use std::path::Path;

/// Downloads `url` into `part_path`, resuming from whatever is already there.
#[tracing::instrument(skip(runtime, part_path, http_client))]
pub async fn download_file<R: Runtime>(
    runtime: &R,
    url: &str,
    part_path: &Path,
    http_client: &HttpClient,
) -> Result<()> {
    if let Some(parent) = part_path.parent() {
        runtime.create_dir_all(parent)?;
    }

    let existing_len = || {
        if runtime.exists(part_path) {
            runtime.file_size(part_path).unwrap_or(0)
        } else {
            0
        }
    };
    let open_writer = |mode: WriteMode| match mode {
        WriteMode::Truncate => runtime
            .create_file(part_path)
            .with_context(|| format!("Failed to create {:?}", part_path)),
        WriteMode::Append => runtime
            .append_file(part_path)
            .with_context(|| format!("Failed to reopen {:?} for resume", part_path)),
    };

    let bytes = http_client
        .download_file(url, existing_len, open_writer)
        .await?;

    debug!("Download complete ({} bytes received).", bytes);
    Ok(())
}
