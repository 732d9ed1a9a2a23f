use anyhow::{Context, Result};
use std::path::PathBuf;

/// Directory holding vidmeta's settings file.
pub fn config_dir() -> Result<PathBuf> {
    Ok(dirs::config_dir()
        .context("Unable to determine user config directory")?
        .join("vidmeta"))
}

pub fn default_config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Expand a leading `~` and environment variables in a user-supplied path.
pub fn expand_user_path(raw: &str) -> PathBuf {
    match shellexpand::full(raw) {
        Ok(expanded) => PathBuf::from(expanded.into_owned()),
        Err(_) => PathBuf::from(shellexpand::tilde(raw).into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_paths_are_untouched() {
        assert_eq!(expand_user_path("/srv/videos"), PathBuf::from("/srv/videos"));
    }

    #[test]
    fn test_default_config_path_ends_with_file_name() {
        if let Ok(path) = default_config_path() {
            assert!(path.ends_with("vidmeta/config.toml"));
        }
    }
}
