use std::fs::File;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, info};

use crate::core::error::{LauncherError, LauncherResult};

use super::{external, ArchiveFormat};

/// Extract `archive` into `dest`, dropping a redundant root folder.
///
/// Extraction happens in a scratch directory first. When every entry sits
/// under one top-level directory, only that directory's children are copied
/// into `dest`. Existing files in `dest` are overwritten. Returns the
/// number of files copied; fails when nothing was produced.
pub async fn extract_and_normalize(archive: &Path, dest: &Path) -> LauncherResult<usize> {
    let archive = archive.to_path_buf();
    let dest = dest.to_path_buf();
    tokio::task::spawn_blocking(move || extract_and_normalize_blocking(&archive, &dest))
        .await
        .map_err(|e| LauncherError::Other(format!("extraction task failed: {e}")))?
}

pub fn extract_and_normalize_blocking(archive: &Path, dest: &Path) -> LauncherResult<usize> {
    let format = ArchiveFormat::from_path(archive).ok_or_else(|| {
        LauncherError::UnsupportedArchiveFormat {
            path: archive.to_path_buf(),
            reason: "unrecognized extension (expected .zip, .tar.gz, .rar or .7z)".into(),
        }
    })?;
    if format.needs_external_tool() {
        // Fail before creating anything when the tool is missing.
        external::locate_tool(format, archive)?;
    }

    std::fs::create_dir_all(dest).map_err(|e| LauncherError::io(dest, e))?;
    let scratch = tempfile::Builder::new()
        .prefix("blocklaunch-extract-")
        .tempdir()
        .map_err(|e| LauncherError::io(std::env::temp_dir(), e))?;

    match format {
        ArchiveFormat::Zip => extract_zip(archive, scratch.path())?,
        ArchiveFormat::TarGz => extract_tar_gz(archive, scratch.path())?,
        ArchiveFormat::Rar | ArchiveFormat::SevenZip => {
            external::run(format, archive, scratch.path())?
        }
    }

    let source = match single_root_dir(scratch.path())? {
        Some(root) => {
            info!("Archive {:?} has a single root folder {:?}, flattening", archive, root.file_name());
            root
        }
        None => scratch.path().to_path_buf(),
    };
    let copied = copy_tree(&source, dest)?;

    if is_empty_dir(dest)? {
        return Err(LauncherError::CorruptArtifact {
            origin: archive.display().to_string(),
            reason: format!("extraction left {} empty", dest.display()),
        });
    }
    debug!("Extracted {} files from {:?} into {:?}", copied, archive, dest);
    Ok(copied)
}

fn extract_zip(archive_path: &Path, into: &Path) -> LauncherResult<()> {
    let file = File::open(archive_path).map_err(|e| LauncherError::io(archive_path, e))?;
    let mut archive = zip::ZipArchive::new(file)?;

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let Some(relative) = entry.enclosed_name() else {
            debug!("Skipping unsafe zip entry {}", entry.name());
            continue;
        };
        let out_path = into.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(|e| LauncherError::io(&out_path, e))?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LauncherError::io(parent, e))?;
        }
        let mut out = File::create(&out_path).map_err(|e| LauncherError::io(&out_path, e))?;
        std::io::copy(&mut entry, &mut out).map_err(|e| LauncherError::io(&out_path, e))?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            let _ = std::fs::set_permissions(&out_path, std::fs::Permissions::from_mode(mode));
        }
    }
    Ok(())
}

fn extract_tar_gz(archive_path: &Path, into: &Path) -> LauncherResult<()> {
    let file = File::open(archive_path).map_err(|e| LauncherError::io(archive_path, e))?;
    let mut archive = tar::Archive::new(flate2::read::GzDecoder::new(file));
    archive
        .unpack(into)
        .map_err(|e| LauncherError::CorruptArtifact {
            origin: archive_path.display().to_string(),
            reason: format!("tar.gz extraction failed: {e}"),
        })
}

/// The lone top-level directory of `dir`, if it has exactly one entry and
/// that entry is a directory.
fn single_root_dir(dir: &Path) -> LauncherResult<Option<PathBuf>> {
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| LauncherError::io(dir, e))? {
        let entry = entry.map_err(|e| LauncherError::io(dir, e))?;
        entries.push(entry.path());
        if entries.len() > 1 {
            return Ok(None);
        }
    }
    Ok(entries.pop().filter(|p| p.is_dir()))
}

fn is_empty_dir(dir: &Path) -> LauncherResult<bool> {
    let mut entries = std::fs::read_dir(dir).map_err(|e| LauncherError::io(dir, e))?;
    Ok(entries.next().is_none())
}

/// Copy `source`'s contents into `destination` without recursion.
pub(crate) fn copy_tree(source: &Path, destination: &Path) -> LauncherResult<usize> {
    let mut copied = 0;
    let mut stack = vec![PathBuf::new()];

    while let Some(relative) = stack.pop() {
        let from_dir = source.join(&relative);
        let to_dir = destination.join(&relative);
        std::fs::create_dir_all(&to_dir).map_err(|e| LauncherError::io(&to_dir, e))?;

        for entry in std::fs::read_dir(&from_dir).map_err(|e| LauncherError::io(&from_dir, e))? {
            let entry = entry.map_err(|e| LauncherError::io(&from_dir, e))?;
            let file_type = entry
                .file_type()
                .map_err(|e| LauncherError::io(entry.path(), e))?;
            let child = relative.join(entry.file_name());
            if child.components().any(|c| !matches!(c, Component::Normal(_))) {
                continue;
            }

            if file_type.is_dir() {
                stack.push(child);
            } else if file_type.is_file() {
                let target = destination.join(&child);
                std::fs::copy(entry.path(), &target).map_err(|e| LauncherError::io(&target, e))?;
                copied += 1;
            }
        }
    }
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        for (name, body) in entries {
            if name.ends_with('/') {
                writer.add_directory(*name, SimpleFileOptions::default()).unwrap();
            } else {
                writer.start_file(*name, SimpleFileOptions::default()).unwrap();
                writer.write_all(body).unwrap();
            }
        }
        writer.finish().unwrap();
    }

    #[tokio::test]
    async fn single_root_folder_is_flattened() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("pack.zip");
        write_zip(
            &archive,
            &[
                ("rootFolder/", b""),
                ("rootFolder/mods/a.jar", b"a"),
                ("rootFolder/config/b.toml", b"b"),
                ("rootFolder/options.txt", b"c"),
            ],
        );
        let dest = temp.path().join("instance");

        let copied = extract_and_normalize(&archive, &dest).await.unwrap();

        assert_eq!(copied, 3);
        assert!(dest.join("mods/a.jar").is_file());
        assert!(dest.join("config/b.toml").is_file());
        assert!(dest.join("options.txt").is_file());
        assert!(!dest.join("rootFolder").exists());
    }

    #[tokio::test]
    async fn several_top_level_entries_are_copied_as_is() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("pack.zip");
        write_zip(&archive, &[("mods/a.jar", b"a"), ("options.txt", b"c")]);
        let dest = temp.path().join("instance");

        extract_and_normalize(&archive, &dest).await.unwrap();

        assert!(dest.join("mods/a.jar").is_file());
        assert_eq!(std::fs::read(dest.join("options.txt")).unwrap(), b"c");
    }

    #[tokio::test]
    async fn single_top_level_file_is_not_a_wrapper() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("one.zip");
        write_zip(&archive, &[("readme.txt", b"hi")]);
        let dest = temp.path().join("out");

        extract_and_normalize(&archive, &dest).await.unwrap();
        assert!(dest.join("readme.txt").is_file());
    }

    #[tokio::test]
    async fn existing_files_are_overwritten() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("pack.zip");
        write_zip(&archive, &[("root/options.txt", b"new")]);
        let dest = temp.path().join("instance");
        std::fs::create_dir_all(&dest).unwrap();
        std::fs::write(dest.join("options.txt"), b"old").unwrap();

        extract_and_normalize(&archive, &dest).await.unwrap();
        assert_eq!(std::fs::read(dest.join("options.txt")).unwrap(), b"new");
    }

    #[tokio::test]
    async fn empty_archive_fails() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("empty.zip");
        write_zip(&archive, &[]);
        let dest = temp.path().join("out");

        let err = extract_and_normalize(&archive, &dest).await.unwrap_err();
        assert!(matches!(err, LauncherError::CorruptArtifact { .. }));
    }

    #[tokio::test]
    async fn tar_gz_runtime_archive_is_flattened() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("jdk.tar.gz");
        {
            let file = File::create(&archive).unwrap();
            let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
            let mut builder = tar::Builder::new(encoder);
            let body = b"#!/bin/sh\n";
            let mut header = tar::Header::new_gnu();
            header.set_size(body.len() as u64);
            header.set_mode(0o755);
            header.set_cksum();
            builder
                .append_data(&mut header, "jdk-17.0.9+9/bin/java", &body[..])
                .unwrap();
            builder.into_inner().unwrap().finish().unwrap();
        }
        let dest = temp.path().join("runtime");

        extract_and_normalize(&archive, &dest).await.unwrap();
        assert!(dest.join("bin/java").is_file());
    }

    #[tokio::test]
    async fn unknown_extension_is_unsupported() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("pack.cab");
        std::fs::write(&archive, b"x").unwrap();

        let err = extract_and_normalize(&archive, &temp.path().join("out"))
            .await
            .unwrap_err();
        assert!(matches!(err, LauncherError::UnsupportedArchiveFormat { .. }));
    }
}
