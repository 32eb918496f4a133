use std::path::{Path, PathBuf};

/// On-disk layout shared by the installer and the launcher.
///
/// Every path is derived from the root plus an id, coordinate or hash.
/// Nothing here is stored; both sides compute the same path the same way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceLayout {
    root: PathBuf,
}

impl InstanceLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // ── Versions ────────────────────────────────────────

    pub fn versions_dir(&self) -> PathBuf {
        self.root.join("versions")
    }

    pub fn version_dir(&self, id: &str) -> PathBuf {
        self.versions_dir().join(id)
    }

    pub fn version_json(&self, id: &str) -> PathBuf {
        self.version_dir(id).join(format!("{id}.json"))
    }

    pub fn version_jar(&self, id: &str) -> PathBuf {
        self.version_dir(id).join(format!("{id}.jar"))
    }

    // ── Libraries ───────────────────────────────────────

    pub fn libraries_dir(&self) -> PathBuf {
        self.root.join("libraries")
    }

    /// Absolute path of a library given its repository-relative path.
    pub fn library_path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.libraries_dir().join(relative)
    }

    // ── Assets ──────────────────────────────────────────

    pub fn assets_dir(&self) -> PathBuf {
        self.root.join("assets")
    }

    pub fn asset_index_path(&self, index_id: &str) -> PathBuf {
        self.assets_dir()
            .join("indexes")
            .join(format!("{index_id}.json"))
    }

    pub fn asset_object_path(&self, hash: &str) -> PathBuf {
        let prefix = hash.get(..2).unwrap_or(hash);
        self.assets_dir().join("objects").join(prefix).join(hash)
    }

    // ── Runtime ─────────────────────────────────────────

    pub fn runtime_dir(&self, major: u32) -> PathBuf {
        self.root.join("runtime").join(format!("java-{major}"))
    }

    // ── Instances ───────────────────────────────────────

    pub fn instances_dir(&self) -> PathBuf {
        self.root.join("instances")
    }

    pub fn instance_dir(&self, instance_id: &str) -> PathBuf {
        self.instances_dir().join(instance_id)
    }

    pub fn natives_dir(&self, instance_id: &str) -> PathBuf {
        self.instance_dir(instance_id).join("natives")
    }

    pub fn mods_dir(&self, instance_id: &str) -> PathBuf {
        self.instance_dir(instance_id).join("mods")
    }

    pub fn logs_dir(&self, instance_id: &str) -> PathBuf {
        self.instance_dir(instance_id).join("logs")
    }

    pub fn launch_log(&self, instance_id: &str) -> PathBuf {
        self.logs_dir(instance_id).join("launcher.log")
    }

    pub fn installed_marker(&self, instance_id: &str) -> PathBuf {
        self.instance_dir(instance_id).join("installed.json")
    }

    // ── Bookkeeping ─────────────────────────────────────

    pub fn locks_dir(&self) -> PathBuf {
        self.root.join("locks")
    }

    pub fn lock_path(&self, version_id: &str) -> PathBuf {
        self.locks_dir().join(format!("{version_id}.lock"))
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.root.join("temp")
    }
}
