use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Scratch library plus a private settings file, so runs never read the
/// user's own configuration.
pub struct TestEnvironment {
    temp_dir: TempDir,
}

impl TestEnvironment {
    pub fn new() -> Result<Self> {
        let temp_dir = tempfile::tempdir()?;
        fs::create_dir_all(temp_dir.path().join("library"))?;
        fs::write(temp_dir.path().join("config.toml"), "")?;
        Ok(Self { temp_dir })
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Directory holding both videos and sidecars.
    pub fn library(&self) -> PathBuf {
        self.path().join("library")
    }

    pub fn config_path(&self) -> PathBuf {
        self.path().join("config.toml")
    }

    /// `library:library` batch pair.
    pub fn library_pair(&self) -> String {
        format!("{}:{}", self.library().display(), self.library().display())
    }

    pub fn write_file(&self, name: &str, contents: &str) -> Result<PathBuf> {
        let path = self.library().join(name);
        fs::write(&path, contents)?;
        Ok(path)
    }

    pub fn read_file(&self, name: &str) -> Result<String> {
        Ok(fs::read_to_string(self.library().join(name))?)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.library().join(name).exists()
    }
}
