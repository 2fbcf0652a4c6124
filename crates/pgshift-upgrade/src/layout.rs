use std::path::{Path, PathBuf};

pub const OLD_STAGING_DIR: &str = "old";
pub const NEW_STAGING_DIR: &str = "new";

/// Scripts `pg_upgrade` leaves in its working directory after a successful run.
pub const HELPER_SCRIPTS: &[&str] = &["delete_old_cluster.sh", "analyze_new_cluster.sh"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataDirLayout {
    root: PathBuf,
}

impl DataDirLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn old_dir(&self) -> PathBuf {
        self.root.join(OLD_STAGING_DIR)
    }

    pub fn new_dir(&self) -> PathBuf {
        self.root.join(NEW_STAGING_DIR)
    }

    pub fn helper_script_paths(&self) -> Vec<PathBuf> {
        HELPER_SCRIPTS
            .iter()
            .map(|name| self.root.join(name))
            .collect()
    }
}
