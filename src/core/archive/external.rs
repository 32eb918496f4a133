use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info};

use crate::core::error::{LauncherError, LauncherResult};

use super::ArchiveFormat;

const UNRAR_HELP: &str = "UnRAR is required for .rar archives. \
Windows: download it from https://www.rarlab.com/rar_add.htm; \
Linux: sudo apt-get install unrar; macOS: brew install unrar. \
Alternatively repackage the archive as .zip";

const SEVEN_ZIP_HELP: &str = "7-Zip is required for .7z archives. \
Windows: download it from https://www.7-zip.org/; \
Linux: sudo apt-get install p7zip-full; macOS: brew install p7zip. \
Alternatively repackage the archive as .zip";

fn candidates(format: ArchiveFormat) -> &'static [&'static str] {
    match format {
        ArchiveFormat::Rar => &["unrar", "UnRAR"],
        ArchiveFormat::SevenZip => &["7z", "7za", "7zz"],
        ArchiveFormat::Zip | ArchiveFormat::TarGz => &[],
    }
}

/// Locate the extraction tool for `format` on `PATH`.
pub(super) fn locate_tool(format: ArchiveFormat, archive: &Path) -> LauncherResult<PathBuf> {
    for name in candidates(format) {
        if let Ok(path) = which::which(name) {
            debug!("Using {:?} for {:?}", path, archive);
            return Ok(path);
        }
    }
    let reason = match format {
        ArchiveFormat::Rar => UNRAR_HELP,
        _ => SEVEN_ZIP_HELP,
    };
    Err(LauncherError::UnsupportedArchiveFormat {
        path: archive.to_path_buf(),
        reason: reason.to_string(),
    })
}

/// Run the external tool, extracting `archive` into `into`.
pub(super) fn run(format: ArchiveFormat, archive: &Path, into: &Path) -> LauncherResult<()> {
    let tool = locate_tool(format, archive)?;
    let mut command = Command::new(&tool);
    match format {
        ArchiveFormat::Rar => {
            // unrar treats the destination as a directory only with a trailing separator.
            let mut dest = into.as_os_str().to_os_string();
            dest.push(std::path::MAIN_SEPARATOR_STR);
            command.arg("x").arg("-o+").arg(archive).arg(dest);
        }
        _ => {
            let mut out_flag = std::ffi::OsString::from("-o");
            out_flag.push(into.as_os_str());
            command.arg("x").arg("-y").arg(out_flag).arg(archive);
        }
    }

    info!("Extracting {:?} with {:?}", archive, tool);
    let output = command
        .output()
        .map_err(|e| LauncherError::io(&tool, e))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let detail = stderr
            .lines()
            .chain(stdout.lines())
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or("unknown error")
            .to_string();
        return Err(LauncherError::CorruptArtifact {
            origin: archive.display().to_string(),
            reason: format!("{} exited with {}: {}", tool.display(), output.status, detail),
        });
    }
    Ok(())
}
