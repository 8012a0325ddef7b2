use crate::runtime::Runtime;
use anyhow::{Context, Result, anyhow};
use log::debug;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use zip::ZipArchive;

use super::ArchiveExtractor;

/// Mode given to a standalone tool whose entry carries no unix permissions.
const DEFAULT_TOOL_MODE: u32 = 0o755;

/// Extractor for .zip archives
pub struct ZipExtractor;

impl ArchiveExtractor for ZipExtractor {
    fn can_handle(&self, archive_path: &Path) -> bool {
        let name = archive_path.to_string_lossy().to_lowercase();
        name.ends_with(".zip")
    }

    #[tracing::instrument(skip(self, runtime))]
    fn extract<R: Runtime>(
        &self,
        runtime: &R,
        archive_path: &Path,
        extract_to: &Path,
    ) -> Result<()> {
        debug!("Extracting zip archive to {:?}...", extract_to);
        let mut archive = open_archive(runtime, archive_path)?;
        if archive.is_empty() {
            return Err(anyhow!("Archive appears to be empty."));
        }

        // Unpack next to the destination first, so a failure halfway leaves
        // the previous contents in place.
        let temp_extract_dir = sibling(extract_to, "_temp_extract")?;
        if runtime.exists(&temp_extract_dir) {
            runtime.remove_dir_all(&temp_extract_dir)?;
        }
        runtime.create_dir_all(&temp_extract_dir)?;

        debug!("Unpacking to temp dir: {:?}", temp_extract_dir);

        for i in 0..archive.len() {
            let mut entry = archive
                .by_index(i)
                .with_context(|| format!("Failed to read ZIP entry {}", i))?;

            let entry_path = match entry.enclosed_name() {
                Some(path) => path.to_path_buf(),
                None => {
                    debug!("Skipping entry with unsafe path {:?}", entry.name());
                    continue;
                }
            };

            let full_path = temp_extract_dir.join(&entry_path);

            if entry.is_dir() {
                runtime.create_dir_all(&full_path)?;
            } else {
                if let Some(parent) = full_path.parent() {
                    runtime.create_dir_all(parent)?;
                }
                let mode = entry.unix_mode();
                write_entry(runtime, &mut entry, &full_path, mode)?;
            }
        }

        if runtime.exists(extract_to) {
            debug!("Removing previous contents of {:?}", extract_to);
            runtime.remove_dir_all(extract_to)?;
        }
        runtime
            .rename(&temp_extract_dir, extract_to)
            .with_context(|| format!("Failed to move extracted files to {:?}", extract_to))?;

        debug!("Extraction complete.");
        Ok(())
    }

    #[tracing::instrument(skip(self, runtime))]
    fn extract_entry<R: Runtime>(
        &self,
        runtime: &R,
        archive_path: &Path,
        entry_name: &str,
        dest: &Path,
    ) -> Result<()> {
        let mut archive = open_archive(runtime, archive_path)?;
        let mut entry = archive.by_name(entry_name).map_err(|_| {
            anyhow!(
                "Archive {:?} does not contain an entry named {:?}",
                archive_path,
                entry_name
            )
        })?;
        if entry.is_dir() {
            return Err(anyhow!(
                "Entry {:?} in {:?} is a directory",
                entry_name,
                archive_path
            ));
        }

        if let Some(parent) = dest.parent() {
            runtime.create_dir_all(parent)?;
        }
        let temp_dest = sibling(dest, ".tmp")?;
        let mode = entry.unix_mode().unwrap_or(DEFAULT_TOOL_MODE);
        write_entry(runtime, &mut entry, &temp_dest, Some(mode))?;
        runtime
            .rename(&temp_dest, dest)
            .with_context(|| format!("Failed to move {:?} into place", dest))?;

        debug!("Extracted {} to {:?}", entry_name, dest);
        Ok(())
    }
}

/// The zip crate needs `Read + Seek`; runtime files are only `Read`.
fn open_archive<R: Runtime>(
    runtime: &R,
    archive_path: &Path,
) -> Result<ZipArchive<Cursor<Vec<u8>>>> {
    let mut reader = runtime
        .open(archive_path)
        .with_context(|| format!("Failed to open archive at {:?}", archive_path))?;
    let mut buffer = Vec::new();
    reader
        .read_to_end(&mut buffer)
        .with_context(|| format!("Failed to read archive {:?}", archive_path))?;
    ZipArchive::new(Cursor::new(buffer)).context("Failed to parse ZIP archive")
}

/// `<path><suffix>`, in the same directory as `path`.
fn sibling(path: &Path, suffix: &str) -> Result<PathBuf> {
    let name = path
        .file_name()
        .ok_or_else(|| anyhow!("Invalid extraction target {:?}", path))?;
    Ok(path.with_file_name(format!("{}{}", name.to_string_lossy(), suffix)))
}

fn write_entry<R: Runtime>(
    runtime: &R,
    entry: &mut impl Read,
    path: &Path,
    mode: Option<u32>,
) -> Result<()> {
    {
        let mut dest_file = runtime.create_file(path)?;
        std::io::copy(entry, &mut dest_file)
            .with_context(|| format!("Failed to extract file {:?}", path))?;
    }

    if let Some(mode) = mode {
        runtime.set_permissions(path, mode & 0o7777)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::RealRuntime;
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::tempdir;
    use zip::CompressionMethod;
    use zip::ZipWriter;
    use zip::write::FileOptions;

    fn create_test_archive(path: &Path, files: &[(&str, &str)]) -> Result<()> {
        let file = File::create(path)?;
        let mut zip = ZipWriter::new(file);
        let options: FileOptions<()> =
            FileOptions::default().compression_method(CompressionMethod::Deflated);

        for (name, content) in files {
            zip.start_file(*name, options)?;
            zip.write_all(content.as_bytes())?;
        }

        zip.finish()?;
        Ok(())
    }

    #[test]
    fn test_can_handle_zip() {
        let extractor = ZipExtractor;
        assert!(extractor.can_handle(Path::new("gn.zip")));
        assert!(extractor.can_handle(Path::new("GN.ZIP")));
        assert!(!extractor.can_handle(Path::new("gn.zip.abc.part")));
    }

    #[test]
    fn test_extract_directory_package() -> Result<()> {
        let dir = tempdir()?;
        let archive_path = dir.path().join("clang.zip");
        let extract_path = dir.path().join("clang");

        create_test_archive(
            &archive_path,
            &[("bin/clang", "elf"), ("lib/libc++.so", "so")],
        )?;

        ZipExtractor.extract(&RealRuntime, &archive_path, &extract_path)?;

        assert_eq!(fs::read_to_string(extract_path.join("bin/clang"))?, "elf");
        assert_eq!(fs::read_to_string(extract_path.join("lib/libc++.so"))?, "so");
        assert!(!dir.path().join("clang_temp_extract").exists());

        Ok(())
    }

    #[test]
    fn test_extract_replaces_previous_contents() -> Result<()> {
        let dir = tempdir()?;
        let archive_path = dir.path().join("clang.zip");
        let extract_path = dir.path().join("clang");
        fs::create_dir_all(extract_path.join("old"))?;
        fs::write(extract_path.join("old/leftover"), "v0")?;

        create_test_archive(&archive_path, &[("bin/clang", "v1")])?;

        ZipExtractor.extract(&RealRuntime, &archive_path, &extract_path)?;

        assert!(!extract_path.join("old").exists());
        assert_eq!(fs::read_to_string(extract_path.join("bin/clang"))?, "v1");

        Ok(())
    }

    #[test]
    fn test_extract_temp_dir_already_exists() -> Result<()> {
        let dir = tempdir()?;
        let archive_path = dir.path().join("clang.zip");
        let extract_path = dir.path().join("clang");
        let temp_extract_dir = dir.path().join("clang_temp_extract");
        fs::create_dir(&temp_extract_dir)?;
        fs::write(temp_extract_dir.join("junk"), "from an interrupted run")?;

        create_test_archive(&archive_path, &[("bin/clang", "elf")])?;

        ZipExtractor.extract(&RealRuntime, &archive_path, &extract_path)?;

        assert!(!extract_path.join("junk").exists());
        assert!(extract_path.join("bin/clang").exists());

        Ok(())
    }

    #[test]
    fn test_extract_skips_unsafe_paths() -> Result<()> {
        let dir = tempdir()?;
        let archive_path = dir.path().join("firmware.zip");
        let extract_path = dir.path().join("out/firmware");

        create_test_archive(
            &archive_path,
            &[("../escape.txt", "nope"), ("blob.bin", "ok")],
        )?;

        ZipExtractor.extract(&RealRuntime, &archive_path, &extract_path)?;

        assert!(extract_path.join("blob.bin").exists());
        assert!(!dir.path().join("out/escape.txt").exists());

        Ok(())
    }

    #[test]
    fn test_extract_empty_archive() {
        let dir = tempdir().unwrap();
        let archive_path = dir.path().join("empty.zip");
        create_test_archive(&archive_path, &[]).unwrap();

        let result = ZipExtractor.extract(&RealRuntime, &archive_path, &dir.path().join("empty"));
        assert!(result.is_err());
    }

    #[test]
    fn test_extract_corrupted_archive() {
        let dir = tempdir().unwrap();
        let archive_path = dir.path().join("clang.zip");
        let extract_path = dir.path().join("clang");
        fs::create_dir(&extract_path).unwrap();
        fs::write(extract_path.join("keep"), "previous").unwrap();

        fs::write(&archive_path, "corrupted data").unwrap();

        let result = ZipExtractor.extract(&RealRuntime, &archive_path, &extract_path);
        assert!(result.is_err());
        assert!(extract_path.join("keep").exists());
    }

    #[test]
    fn test_extract_entry() -> Result<()> {
        let dir = tempdir()?;
        let archive_path = dir.path().join("gn.zip");
        create_test_archive(&archive_path, &[("gn", "gn binary"), ("README", "docs")])?;

        let dest = dir.path().join("gn");
        ZipExtractor.extract_entry(&RealRuntime, &archive_path, "gn", &dest)?;

        assert_eq!(fs::read_to_string(&dest)?, "gn binary");
        assert!(!dir.path().join("README").exists());
        assert!(!dir.path().join("gn.tmp").exists());

        Ok(())
    }

    #[test]
    fn test_extract_entry_missing() {
        let dir = tempdir().unwrap();
        let archive_path = dir.path().join("gn.zip");
        create_test_archive(&archive_path, &[("README", "docs")]).unwrap();

        let dest = dir.path().join("gn");
        let err = ZipExtractor
            .extract_entry(&RealRuntime, &archive_path, "gn", &dest)
            .unwrap_err();

        assert!(err.to_string().contains("does not contain"));
        assert!(!dest.exists());
    }

    #[test]
    #[cfg(unix)]
    fn test_extract_entry_preserves_mode() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir()?;
        let archive_path = dir.path().join("gn.zip");
        {
            let file = File::create(&archive_path)?;
            let mut zip = ZipWriter::new(file);
            let options: FileOptions<()> = FileOptions::default()
                .compression_method(CompressionMethod::Deflated)
                .unix_permissions(0o750);
            zip.start_file("gn", options)?;
            zip.write_all(b"#!/bin/sh\necho gn")?;
            zip.finish()?;
        }

        let dest = dir.path().join("gn");
        ZipExtractor.extract_entry(&RealRuntime, &archive_path, "gn", &dest)?;

        let mode = fs::metadata(&dest)?.permissions().mode();
        assert_eq!(mode & 0o777, 0o750);

        Ok(())
    }

    #[test]
    #[cfg(unix)]
    fn test_extract_archive_preserves_file_permissions() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir()?;
        let archive_path = dir.path().join("clang.zip");
        let extract_path = dir.path().join("clang");

        {
            let file = File::create(&archive_path)?;
            let mut zip = ZipWriter::new(file);

            let options: FileOptions<()> = FileOptions::default()
                .compression_method(CompressionMethod::Deflated)
                .unix_permissions(0o755);
            zip.start_file("bin/clang", options)?;
            zip.write_all(b"#!/bin/sh\necho clang")?;

            let options: FileOptions<()> = FileOptions::default()
                .compression_method(CompressionMethod::Deflated)
                .unix_permissions(0o644);
            zip.start_file("share/config.txt", options)?;
            zip.write_all(b"some config")?;

            zip.finish()?;
        }

        ZipExtractor.extract(&RealRuntime, &archive_path, &extract_path)?;

        let script_mode = fs::metadata(extract_path.join("bin/clang"))?
            .permissions()
            .mode();
        assert!(
            script_mode & 0o111 != 0,
            "Expected bin/clang to be executable, but mode was {:o}",
            script_mode
        );

        let config_mode = fs::metadata(extract_path.join("share/config.txt"))?
            .permissions()
            .mode();
        assert!(
            config_mode & 0o111 == 0,
            "Expected config.txt to NOT be executable, but mode was {:o}",
            config_mode
        );

        Ok(())
    }
}
