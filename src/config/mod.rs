//! Runtime settings.
//!
//! Settings come from a TOML file (`~/.config/vidmeta/config.toml` unless
//! `--config` points elsewhere) and are then overridden by command line flags.
//! Every field carries a serde default, so a missing or partial file is fine.
//! `--write-config` saves the effective settings with one description comment
//! per key.

pub mod paths;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum NamingStyle {
    Spaces,
    Underscores,
    FixesOnly,
    #[default]
    Skip,
}

impl std::str::FromStr for NamingStyle {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "spaces" => Ok(NamingStyle::Spaces),
            "underscores" => Ok(NamingStyle::Underscores),
            "fixes-only" | "fixes" => Ok(NamingStyle::FixesOnly),
            "skip" | "none" => Ok(NamingStyle::Skip),
            other => Err(crate::error::Error::config(format!(
                "unknown naming style '{}' (expected spaces, underscores, fixes-only or skip)",
                other
            ))),
        }
    }
}

/// Which sidecars are deleted once a record is committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PurgeMode {
    All,
    Json,
    Nfo,
    #[default]
    None,
}

impl PurgeMode {
    pub fn permits(self, extension: &str) -> bool {
        let ext = extension.to_ascii_lowercase();
        match self {
            PurgeMode::All => ext == "json" || ext == "nfo",
            PurgeMode::Json => ext == "json",
            PurgeMode::Nfo => ext == "nfo",
            PurgeMode::None => false,
        }
    }
}

impl std::str::FromStr for PurgeMode {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(PurgeMode::All),
            "json" => Ok(PurgeMode::Json),
            "nfo" => Ok(PurgeMode::Nfo),
            "none" | "" => Ok(PurgeMode::None),
            other => Err(crate::error::Error::config(format!(
                "unknown purge mode '{}' (expected all, json, nfo or none)",
                other
            ))),
        }
    }
}

/// Case-insensitive file name filters applied while scanning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanFilters {
    pub prefixes: Vec<String>,
    pub suffixes: Vec<String>,
    pub contains: Vec<String>,
    pub omits: Vec<String>,
}

impl ScanFilters {
    /// Every non-empty filter group must match; `omits` must not.
    pub fn accepts(&self, file_name: &str) -> bool {
        let name = file_name.to_lowercase();
        let any = |list: &[String], test: &dyn Fn(&str) -> bool| {
            list.is_empty() || list.iter().any(|p| test(&p.to_lowercase()))
        };
        any(&self.prefixes, &|p| name.starts_with(p))
            && any(&self.suffixes, &|p| {
                let stem = name.rsplit_once('.').map(|(s, _)| s).unwrap_or(name.as_str());
                stem.ends_with(p) || name.ends_with(p)
            })
            && any(&self.contains, &|p| name.contains(p))
            && !self.omits.iter().any(|p| name.contains(&p.to_lowercase()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub batch_pairs: Vec<String>,
    pub meta_ops: Vec<String>,
    pub filename_ops: Vec<String>,
    pub naming_style: NamingStyle,
    pub filename_prefix_fields: Vec<String>,
    pub concurrency: usize,
    pub overwrite_all: bool,
    pub preserve_all: bool,
    pub backup_sidecars: bool,
    pub output_dir: Option<PathBuf>,
    pub purge_metafile: PurgeMode,
    pub video_extensions: Vec<String>,
    pub filters: ScanFilters,
    pub embed_metadata: bool,
    pub ffmpeg_program: String,
    pub ffprobe_program: String,
    pub keep_video_backup: bool,
    pub max_cpu_pct: f32,
    pub min_free_mem_bytes: u64,
}

pub const DEFAULT_VIDEO_EXTENSIONS: &[&str] = &[
    "mkv", "mp4", "webm", "m4v", "mov", "avi", "wmv", "flv", "ts", "mpg", "mpeg", "3gp", "ogv",
];

impl Default for Settings {
    fn default() -> Self {
        Self {
            batch_pairs: Vec::new(),
            meta_ops: Vec::new(),
            filename_ops: Vec::new(),
            naming_style: NamingStyle::default(),
            filename_prefix_fields: Vec::new(),
            concurrency: 5,
            overwrite_all: false,
            preserve_all: false,
            backup_sidecars: false,
            output_dir: None,
            purge_metafile: PurgeMode::default(),
            video_extensions: DEFAULT_VIDEO_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            filters: ScanFilters::default(),
            embed_metadata: false,
            ffmpeg_program: "ffmpeg".to_string(),
            ffprobe_program: "ffprobe".to_string(),
            keep_video_backup: false,
            max_cpu_pct: 100.0,
            min_free_mem_bytes: 0,
        }
    }
}

/// Description comments written next to each key by `save_with_documentation`.
const FIELD_DOCS: &[(&str, &str)] = &[
    ("batch_pairs", "video_path_or_dir:meta_path_or_dir pairs to process"),
    ("meta_ops", "Metadata operations, e.g. \"title:set:New\""),
    ("filename_ops", "Filename operations, e.g. \"date-tag:prefix:ymd\""),
    ("naming_style", "spaces, underscores, fixes-only or skip"),
    ("filename_prefix_fields", "Fields joined into a [prefix] tag on renamed files"),
    ("concurrency", "Records processed in parallel"),
    ("overwrite_all", "Overwrite existing field values without asking"),
    ("preserve_all", "Keep existing field values without asking"),
    ("backup_sidecars", "Copy each sidecar to <stem>.bak.<ext> before writing"),
    ("output_dir", "Move renamed files into this directory"),
    ("purge_metafile", "Delete sidecars after commit: all, json, nfo or none"),
    ("video_extensions", "Video file extensions to scan for"),
    ("filters", "Case-insensitive file name filters (prefixes, suffixes, contains, omits)"),
    ("embed_metadata", "Stamp fields into the container with ffmpeg"),
    ("ffmpeg_program", "ffmpeg executable"),
    ("ffprobe_program", "ffprobe executable"),
    ("keep_video_backup", "Keep <stem>.bak.<ext> of videos rewritten by ffmpeg"),
    ("max_cpu_pct", "Wait before starting a record while process CPU is above this"),
    ("min_free_mem_bytes", "Wait before starting a record while free memory is below this"),
];

impl Settings {
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading settings from {}", path.display()))?;
        Self::load_from_str(&contents)
            .with_context(|| format!("parsing settings file {}", path.display()))
    }

    pub fn load_from_str(contents: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(contents).context("parsing settings")?;
        Ok(settings)
    }

    /// Load the file named on the command line, or the default location.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => {
                let expanded = paths::expand_user_path(&path.to_string_lossy());
                if !expanded.exists() {
                    anyhow::bail!("settings file {} does not exist", expanded.display());
                }
                Self::load_from_path(&expanded)
            }
            None => Self::load_from_path(&paths::default_config_path()?),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            anyhow::bail!("concurrency must be at least 1");
        }
        if self.overwrite_all && self.preserve_all {
            anyhow::bail!("overwrite_all and preserve_all cannot both be set");
        }
        if !(0.0..=100.0).contains(&self.max_cpu_pct) {
            anyhow::bail!("max_cpu_pct must be between 0 and 100");
        }
        Ok(())
    }

    pub fn render_documented(&self) -> Result<String> {
        let value = toml::Value::try_from(self).context("serializing settings")?;
        let table = value
            .as_table()
            .context("settings did not serialize to a table")?;

        let mut output = String::new();
        let mut sections = String::new();
        for (name, description) in FIELD_DOCS {
            match table.get(*name) {
                // Tables must follow every top-level key
                Some(toml::Value::Table(inner)) => {
                    sections.push_str(&format!("\n# {}\n[{}]\n", description, name));
                    for (key, value) in inner {
                        sections.push_str(&format!("{} = {}\n", key, value));
                    }
                }
                Some(value) => {
                    output.push_str(&format!("{} = {}  # {}\n", name, value, description));
                }
                None => output.push_str(&format!("# {} = \"\"  # {}\n", name, description)),
            }
        }
        output.push_str(&sections);
        Ok(output)
    }

    pub fn save_with_documentation(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating config directory {}", parent.display()))?;
        }
        fs::write(path, self.render_documented()?)
            .with_context(|| format!("writing config to {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_uses_defaults() {
        let settings = Settings::load_from_str(
            r#"
naming_style = "spaces"
meta_ops = ["title:set:New"]
"#,
        )
        .unwrap();
        assert_eq!(settings.naming_style, NamingStyle::Spaces);
        assert_eq!(settings.meta_ops, vec!["title:set:New"]);
        assert_eq!(settings.concurrency, 5);
        assert!(settings.video_extensions.contains(&"mkv".to_string()));
    }

    #[test]
    fn test_documented_output_parses_back() {
        let mut settings = Settings::default();
        settings.purge_metafile = PurgeMode::Json;
        settings.filters.omits = vec!["trailer".into()];
        let rendered = settings.render_documented().unwrap();
        assert!(rendered.contains("# output_dir = \"\""));
        assert!(rendered.contains("concurrency = 5  # Records processed in parallel"));
        let reparsed = Settings::load_from_str(&rendered).unwrap();
        assert_eq!(reparsed, settings);
    }

    #[test]
    fn test_validate_rejects_conflicting_policies() {
        let settings = Settings {
            overwrite_all: true,
            preserve_all: true,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
        let zero = Settings {
            concurrency: 0,
            ..Settings::default()
        };
        assert!(zero.validate().is_err());
    }

    #[test]
    fn test_purge_mode_permits() {
        assert!(PurgeMode::All.permits("JSON"));
        assert!(PurgeMode::Nfo.permits("nfo"));
        assert!(!PurgeMode::Json.permits("nfo"));
        assert!(!PurgeMode::None.permits("json"));
    }

    #[test]
    fn test_filters() {
        let filters = ScanFilters {
            prefixes: vec!["Show".into()],
            omits: vec!["trailer".into()],
            ..ScanFilters::default()
        };
        assert!(filters.accepts("show_ep1.mp4"));
        assert!(!filters.accepts("show_TRAILER.mp4"));
        assert!(!filters.accepts("other.mp4"));

        let suffix = ScanFilters {
            suffixes: vec!["_final".into()],
            ..ScanFilters::default()
        };
        assert!(suffix.accepts("clip_final.mkv"));
        assert!(!suffix.accepts("clip.mkv"));
    }

    #[test]
    fn test_naming_style_parse() {
        assert_eq!("fixes_only".parse::<NamingStyle>().unwrap(), NamingStyle::FixesOnly);
        assert!("camel".parse::<NamingStyle>().is_err());
    }
}
