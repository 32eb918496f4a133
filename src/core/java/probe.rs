use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// `ETXTBSY`: the binary was written moments ago and a forked child still
/// holds it open.
#[cfg(unix)]
const TEXT_FILE_BUSY: i32 = 26;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JavaInstallation {
    pub path: PathBuf,
    pub version: String,
    pub major: u32,
    pub is_64bit: bool,
    pub vendor: String,
}

/// Run `java -version` and parse what it reports. `None` when the binary
/// cannot be run or prints no version.
#[instrument]
pub async fn probe_java(path: &Path) -> Option<JavaInstallation> {
    let mut attempt = 0;
    let output = loop {
        attempt += 1;
        match tokio::process::Command::new(path)
            .args(["-XshowSettings:properties", "-version"])
            .output()
            .await
        {
            Ok(output) => break output,
            #[cfg(unix)]
            Err(e) if e.raw_os_error() == Some(TEXT_FILE_BUSY) && attempt < 5 => {
                tokio::time::sleep(Duration::from_millis(50 * attempt)).await;
            }
            Err(e) => {
                debug!("Could not run {:?}: {}", path, e);
                return None;
            }
        }
    };

    let text = format!(
        "{}\n{}",
        String::from_utf8_lossy(&output.stderr),
        String::from_utf8_lossy(&output.stdout)
    );
    parse_output(path, &text)
}

fn parse_output(path: &Path, version_output: &str) -> Option<JavaInstallation> {
    debug!(
        "Probing {:?}: {}",
        path,
        version_output.lines().find(|l| !l.trim().is_empty()).unwrap_or("")
    );

    let version = parse_version_string(version_output)?;
    let major = parse_major_version(&version);
    let lower = version_output.to_ascii_lowercase();
    let is_64bit = lower.contains("sun.arch.data.model = 64")
        || lower.contains("os.arch = amd64")
        || lower.contains("os.arch = x86_64")
        || lower.contains("os.arch = aarch64")
        || lower.contains("64-bit");

    Some(JavaInstallation {
        path: path.to_path_buf(),
        version,
        major,
        is_64bit,
        vendor: parse_vendor(version_output),
    })
}

/// The first double-quoted token, e.g. `17.0.9` from `openjdk version "17.0.9"`.
fn parse_version_string(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let start = line.find('"')?;
        let end = line[start + 1..].find('"')?;
        Some(line[start + 1..start + 1 + end].to_string())
    })
}

/// `1.8.0_382` is Java 8; `17.0.9` is Java 17.
pub(crate) fn parse_major_version(version: &str) -> u32 {
    let mut parts = version.split(|c: char| c == '.' || c == '_' || c == '+' || c == '-');
    let first: u32 = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    if first == 1 {
        parts.next().and_then(|p| p.parse().ok()).unwrap_or(first)
    } else {
        first
    }
}

fn parse_vendor(output: &str) -> String {
    for (needle, vendor) in [
        ("Temurin", "Temurin"),
        ("Adoptium", "Adoptium"),
        ("Zulu", "Zulu"),
        ("OpenJDK", "OpenJDK"),
        ("Java(TM)", "Oracle"),
    ] {
        if output.contains(needle) {
            return vendor.to_string();
        }
    }
    "unknown".to_string()
}
