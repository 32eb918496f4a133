// ─── Archive Extractor ───
// Format-dispatching extraction with root-folder normalization. Zip and
// tar.gz are handled in-process; rar and 7z shell out to the usual tools.

mod external;
mod extract;

use std::path::Path;

pub use extract::{extract_and_normalize, extract_and_normalize_blocking};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    TarGz,
    Rar,
    SevenZip,
}

impl ArchiveFormat {
    /// Detect the format from the file name.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_ascii_lowercase();
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            return Some(Self::TarGz);
        }
        match name.rsplit_once('.')?.1 {
            "zip" | "jar" | "mrpack" => Some(Self::Zip),
            "rar" => Some(Self::Rar),
            "7z" => Some(Self::SevenZip),
            _ => None,
        }
    }

    pub fn needs_external_tool(&self) -> bool {
        matches!(self, Self::Rar | Self::SevenZip)
    }
}
