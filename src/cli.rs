use crate::config::{NamingStyle, PurgeMode, Settings};
use clap::Parser;
use std::path::PathBuf;

/// Batch metadata editing and renaming for videos with JSON/NFO sidecars
#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Settings file (defaults to ~/.config/vidmeta/config.toml)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Video and sidecar sources as VIDEO:META (both files or both directories)
    #[arg(short = 'b', long = "batch", value_name = "VIDEO:META")]
    pub batch_pairs: Vec<String>,

    /// Metadata operation, e.g. title:set:New or date:date-tag:prefix:ymd
    #[arg(short = 'm', long = "meta-op", value_name = "FIELD:OP:ARGS", allow_hyphen_values = true)]
    pub meta_ops: Vec<String>,

    /// Filename operation, e.g. date-tag:prefix:ymd
    #[arg(short = 'f', long = "filename-op", value_name = "OP:ARGS", allow_hyphen_values = true)]
    pub filename_ops: Vec<String>,

    /// spaces, underscores, fixes-only or skip
    #[arg(long)]
    pub naming_style: Option<NamingStyle>,

    /// Move committed pairs into this directory
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Delete sidecars after commit: all, json, nfo or none
    #[arg(long, value_name = "MODE")]
    pub purge_metafile: Option<PurgeMode>,

    /// Records processed in parallel
    #[arg(short = 'c', long)]
    pub concurrency: Option<usize>,

    /// Overwrite existing values without asking
    #[arg(long, conflicts_with = "preserve")]
    pub overwrite: bool,

    /// Keep existing values without asking
    #[arg(long)]
    pub preserve: bool,

    /// Keep a .bak. copy of each sidecar before its first rewrite
    #[arg(long)]
    pub backup: bool,

    /// Write the final metadata into the video container with ffmpeg
    #[arg(long)]
    pub embed_metadata: bool,

    /// Metadata fields joined into a [..] filename prefix
    #[arg(long, value_delimiter = ',', value_name = "FIELDS")]
    pub prefix_fields: Vec<String>,

    #[arg(long, value_name = "TEXT")]
    pub filter_prefix: Vec<String>,

    #[arg(long, value_name = "TEXT")]
    pub filter_suffix: Vec<String>,

    #[arg(long, value_name = "TEXT")]
    pub filter_contains: Vec<String>,

    #[arg(long, value_name = "TEXT")]
    pub filter_omits: Vec<String>,

    /// Video extensions to scan for (replaces the default list)
    #[arg(long = "video-ext", value_delimiter = ',', value_name = "EXT")]
    pub video_extensions: Vec<String>,

    /// Hold new records while process CPU is above this percentage
    #[arg(long, value_name = "PCT")]
    pub max_cpu: Option<f32>,

    /// Hold new records while free memory is below this many bytes
    #[arg(long, value_name = "BYTES")]
    pub min_free_mem: Option<u64>,

    /// Emit one JSON object per log line
    #[arg(long)]
    pub json: bool,

    #[arg(long)]
    pub no_color: bool,

    /// Activate debug mode
    #[arg(short, long)]
    pub debug: bool,

    /// Save the effective settings as a documented config file and exit
    #[arg(long)]
    pub write_config: bool,
}

impl Cli {
    /// Layer command line values over settings loaded from file.
    pub fn apply_to(&self, settings: &mut Settings) {
        settings.batch_pairs.extend(self.batch_pairs.iter().cloned());
        settings.meta_ops.extend(self.meta_ops.iter().cloned());
        settings.filename_ops.extend(self.filename_ops.iter().cloned());

        if let Some(style) = self.naming_style {
            settings.naming_style = style;
        }
        if let Some(dir) = &self.output_dir {
            settings.output_dir = Some(dir.clone());
        }
        if let Some(mode) = self.purge_metafile {
            settings.purge_metafile = mode;
        }
        if let Some(n) = self.concurrency {
            settings.concurrency = n;
        }
        if self.overwrite {
            settings.overwrite_all = true;
            settings.preserve_all = false;
        }
        if self.preserve {
            settings.preserve_all = true;
            settings.overwrite_all = false;
        }
        settings.backup_sidecars |= self.backup;
        settings.embed_metadata |= self.embed_metadata;

        if !self.prefix_fields.is_empty() {
            settings.filename_prefix_fields = self.prefix_fields.clone();
        }
        if !self.video_extensions.is_empty() {
            settings.video_extensions = self
                .video_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect();
        }
        let filters = &mut settings.filters;
        filters.prefixes.extend(self.filter_prefix.iter().cloned());
        filters.suffixes.extend(self.filter_suffix.iter().cloned());
        filters.contains.extend(self.filter_contains.iter().cloned());
        filters.omits.extend(self.filter_omits.iter().cloned());

        if let Some(pct) = self.max_cpu {
            settings.max_cpu_pct = pct;
        }
        if let Some(bytes) = self.min_free_mem {
            settings.min_free_mem_bytes = bytes;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_file_values() {
        let cli = Cli::parse_from([
            "vidmeta",
            "-b",
            "/v:/m",
            "-m",
            "title:set:New",
            "--naming-style",
            "spaces",
            "--preserve",
            "--prefix-fields",
            "uploader,date",
            "--video-ext",
            ".MKV,mp4",
            "-c",
            "2",
        ]);
        let mut settings = Settings {
            overwrite_all: true,
            meta_ops: vec!["title:append:!".into()],
            ..Settings::default()
        };
        cli.apply_to(&mut settings);

        assert_eq!(settings.batch_pairs, vec!["/v:/m"]);
        assert_eq!(settings.meta_ops, vec!["title:append:!", "title:set:New"]);
        assert_eq!(settings.naming_style, NamingStyle::Spaces);
        assert!(settings.preserve_all && !settings.overwrite_all);
        assert_eq!(settings.filename_prefix_fields, vec!["uploader", "date"]);
        assert_eq!(settings.video_extensions, vec!["mkv", "mp4"]);
        assert_eq!(settings.concurrency, 2);
    }

    #[test]
    fn test_overwrite_and_preserve_conflict() {
        assert!(Cli::try_parse_from(["vidmeta", "--overwrite", "--preserve"]).is_err());
    }

    #[test]
    fn test_unset_flags_leave_settings_alone() {
        let mut settings = Settings {
            concurrency: 9,
            purge_metafile: PurgeMode::Json,
            ..Settings::default()
        };
        Cli::parse_from(["vidmeta"]).apply_to(&mut settings);
        assert_eq!(settings.concurrency, 9);
        assert_eq!(settings.purge_metafile, PurgeMode::Json);
    }
}
