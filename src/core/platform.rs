// ─── Platform ───
// Operating system + architecture the launcher is acting for.
// Passed explicitly so resolution can be evaluated for any target.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Mojang OS names as they appear in descriptor rules and `natives` maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsName {
    Windows,
    Osx,
    Linux,
}

impl OsName {
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            OsName::Windows
        } else if cfg!(target_os = "macos") {
            OsName::Osx
        } else {
            OsName::Linux
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OsName::Windows => "windows",
            OsName::Osx => "osx",
            OsName::Linux => "linux",
        }
    }

    /// Markers that native archives for this OS carry in their file name.
    pub fn native_suffixes(&self) -> &'static [&'static str] {
        match self {
            OsName::Windows => &["natives-windows"],
            OsName::Osx => &["natives-macos", "natives-osx"],
            OsName::Linux => &["natives-linux"],
        }
    }

    /// File extensions of loadable native binaries on this OS.
    pub fn native_extensions(&self) -> &'static [&'static str] {
        match self {
            OsName::Windows => &["dll"],
            OsName::Osx => &["dylib", "jnilib"],
            OsName::Linux => &["so"],
        }
    }

    pub fn classpath_separator(&self) -> &'static str {
        match self {
            OsName::Windows => ";",
            _ => ":",
        }
    }

    /// OS name used by the Adoptium API.
    pub fn adoptium_name(&self) -> &'static str {
        match self {
            OsName::Windows => "windows",
            OsName::Osx => "mac",
            OsName::Linux => "linux",
        }
    }
}

impl fmt::Display for OsName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    pub os: OsName,
    pub arch: String,
}

impl Platform {
    pub fn new(os: OsName, arch: impl Into<String>) -> Self {
        Self {
            os,
            arch: arch.into(),
        }
    }

    pub fn current() -> Self {
        Self::new(OsName::current(), std::env::consts::ARCH)
    }

    /// Compare against a rule's `arch` value, treating historical aliases
    /// of the same architecture as equal.
    pub fn arch_matches(&self, rule_arch: &str) -> bool {
        canonical_arch(&self.arch) == canonical_arch(rule_arch)
    }

    /// Value substituted for `${arch}` in natives classifier keys.
    pub fn arch_bits(&self) -> &'static str {
        match canonical_arch(&self.arch).as_str() {
            "x86" | "arm" => "32",
            _ => "64",
        }
    }

    /// Architecture name used by the Adoptium API.
    pub fn adoptium_arch(&self) -> &'static str {
        match canonical_arch(&self.arch).as_str() {
            "aarch64" => "aarch64",
            "x86" => "x32",
            "arm" => "arm",
            _ => "x64",
        }
    }
}

fn canonical_arch(raw: &str) -> String {
    let lower = raw.trim().to_ascii_lowercase();
    match lower.as_str() {
        "x86_64" | "amd64" | "x64" => "x86_64".to_string(),
        "x86" | "i386" | "i686" => "x86".to_string(),
        "aarch64" | "arm64" => "aarch64".to_string(),
        "arm" | "armv7" | "arm32" => "arm".to_string(),
        _ => lower,
    }
}
