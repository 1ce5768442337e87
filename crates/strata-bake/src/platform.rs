//! Platform directory resolution for the bake tool.

use std::io;
use std::path::{Path, PathBuf};

/// Errors that can occur while preparing directories.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    /// The OS did not provide a configuration directory.
    #[error("could not determine OS configuration directory")]
    NoConfigDir,
    /// A directory could not be created.
    #[error("platform I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Where the bake tool keeps its files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BakeDirs {
    /// `config.ron` lives here.
    pub config_dir: PathBuf,
    /// JSON log output.
    pub log_dir: PathBuf,
}

const APP_NAME: &str = "strata";

impl BakeDirs {
    /// Resolve OS directories (XDG on Linux, Known Folders on Windows,
    /// Library on macOS) without touching the disk.
    pub fn resolve() -> Result<Self, PlatformError> {
        let base = dirs::config_dir().ok_or(PlatformError::NoConfigDir)?;
        Ok(Self::resolve_with_root(&base))
    }

    /// Directories rooted under a custom base path.
    pub fn resolve_with_root(root: &Path) -> Self {
        let app_dir = root.join(APP_NAME);
        Self {
            config_dir: app_dir.join("config"),
            log_dir: app_dir.join("logs"),
        }
    }

    /// Use `config_dir` for the config and keep logs next to it.
    pub fn with_config_override(mut self, config_dir: Option<&Path>) -> Self {
        if let Some(dir) = config_dir {
            self.config_dir = dir.to_path_buf();
            self.log_dir = dir.join("logs");
        }
        self
    }

    pub fn create_dirs(&self) -> Result<(), PlatformError> {
        std::fs::create_dir_all(&self.config_dir)?;
        std::fs::create_dir_all(&self.log_dir)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_with_root_layout() {
        let dirs = BakeDirs::resolve_with_root(Path::new("/tmp/base"));
        assert_eq!(dirs.config_dir, PathBuf::from("/tmp/base/strata/config"));
        assert_eq!(dirs.log_dir, PathBuf::from("/tmp/base/strata/logs"));
    }

    #[test]
    fn test_config_override_moves_logs() {
        let dirs = BakeDirs::resolve_with_root(Path::new("/tmp/base"))
            .with_config_override(Some(Path::new("/srv/bake")));
        assert_eq!(dirs.config_dir, PathBuf::from("/srv/bake"));
        assert_eq!(dirs.log_dir, PathBuf::from("/srv/bake/logs"));
    }

    #[test]
    fn test_create_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let dirs = BakeDirs::resolve_with_root(tmp.path());
        dirs.create_dirs().unwrap();
        assert!(dirs.config_dir.is_dir());
        assert!(dirs.log_dir.is_dir());
    }
}
