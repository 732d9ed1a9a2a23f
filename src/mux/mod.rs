//! Stamping metadata into video containers.

use crate::commit::rename_to_backup;
use crate::error::{Error, IoResultExt, Result};
use crate::record::Metadata;
use crate::ui::prelude::*;
use serde_json::Value;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::path::Path;
use tokio_util::sync::CancellationToken;

/// Container tag -> metadata fields tried in order.
const FIELD_MAP: &[(&str, &[&str])] = &[
    ("title", &["title"]),
    ("description", &["description", "plot", "synopsis"]),
    ("artist", &["artist", "uploader", "channel", "actor"]),
    ("album", &["album"]),
    ("genre", &["genre"]),
    ("composer", &["composer"]),
    ("publisher", &["publisher"]),
    ("comment", &["webpage_url", "webpage"]),
];

/// Container tags for a record's final metadata.
pub fn mux_fields(meta: &Metadata, formatted_date: &str) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();
    for (tag, sources) in FIELD_MAP {
        let value = sources
            .iter()
            .filter_map(|s| meta.get(*s).and_then(Value::as_str))
            .map(str::trim)
            .find(|v| !v.is_empty());
        if let Some(value) = value {
            fields.insert(tag.to_string(), value.to_string());
        }
    }
    if !formatted_date.is_empty() {
        fields.insert("date".to_string(), formatted_date.to_string());
    }
    fields
}

/// Whether the `format.tags` of an ffprobe JSON report already hold every
/// field. Tag names compare case-insensitively.
pub fn tags_match(probe: &Value, fields: &BTreeMap<String, String>) -> bool {
    let Some(tags) = probe.pointer("/format/tags").and_then(Value::as_object) else {
        return fields.is_empty();
    };
    fields.iter().all(|(key, wanted)| {
        tags.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .and_then(|(_, v)| v.as_str())
            .is_some_and(|v| v == wanted)
    })
}

pub trait Muxer: Send + Sync {
    /// True when the container already carries `fields`.
    fn already_applied(&self, video: &Path, fields: &BTreeMap<String, String>) -> Result<bool>;

    /// Rewrite `video` in place with `fields` as container tags.
    fn apply(&self, video: &Path, fields: &BTreeMap<String, String>, cancel: &CancellationToken) -> Result<()>;
}

/// Stream-copying ffmpeg remux.
#[derive(Debug, Clone)]
pub struct FfmpegMuxer {
    pub ffmpeg: String,
    pub ffprobe: String,
    pub keep_backup: bool,
}

impl FfmpegMuxer {
    fn ffmpeg_args(input: &Path, output: &Path, fields: &BTreeMap<String, String>) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["-y", "-hide_banner", "-loglevel", "error", "-i"]
            .iter()
            .map(OsString::from)
            .collect();
        args.push(input.as_os_str().to_owned());
        for flag in ["-map", "0", "-c", "copy", "-map_metadata", "0"] {
            args.push(flag.into());
        }
        for (key, value) in fields {
            args.push("-metadata".into());
            args.push(format!("{}={}", key, value).into());
        }
        args.push(output.as_os_str().to_owned());
        args
    }

    fn restore(backup: &Path, video: &Path) {
        if let Err(err) = fs::rename(backup, video) {
            emit(
                Level::Error,
                "mux.restore.failed",
                &format!("Could not restore {} from {}: {}", video.display(), backup.display(), err),
                None,
            );
        }
    }
}

impl Muxer for FfmpegMuxer {
    fn already_applied(&self, video: &Path, fields: &BTreeMap<String, String>) -> Result<bool> {
        let args: Vec<OsString> = vec![
            "-v".into(),
            "quiet".into(),
            "-show_format".into(),
            "-of".into(),
            "json".into(),
            video.as_os_str().to_owned(),
        ];
        let output = duct::cmd(self.ffprobe.as_str(), args)
            .stdout_capture()
            .stderr_capture()
            .unchecked()
            .run()
            .map_err(|e| Error::Muxer(format!("running {}: {}", self.ffprobe, e)))?;
        if !output.status.success() {
            return Err(Error::Muxer(format!(
                "{} exited with {} for {}",
                self.ffprobe,
                output.status,
                video.display()
            )));
        }
        let probe: Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| Error::Muxer(format!("unreadable ffprobe output: {}", e)))?;
        Ok(tags_match(&probe, fields))
    }

    fn apply(&self, video: &Path, fields: &BTreeMap<String, String>, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(Error::OperationCanceled);
        }
        let dir = video.parent().unwrap_or(Path::new("."));
        let suffix = video
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        let staged = tempfile::Builder::new()
            .prefix(".vidmeta-")
            .suffix(&suffix)
            .tempfile_in(dir)
            .at_path(dir)?
            .into_temp_path();

        let backup = rename_to_backup(video)?;
        let output = duct::cmd(self.ffmpeg.as_str(), Self::ffmpeg_args(&backup, &staged, fields))
            .stdout_capture()
            .stderr_capture()
            .unchecked()
            .run();

        let output = match output {
            Ok(output) => output,
            Err(e) => {
                Self::restore(&backup, video);
                return Err(Error::Muxer(format!("running {}: {}", self.ffmpeg, e)));
            }
        };
        if !output.status.success() {
            Self::restore(&backup, video);
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Muxer(format!(
                "{} exited with {}: {}",
                self.ffmpeg,
                output.status,
                stderr.trim()
            )));
        }

        if let Err(err) = staged.persist(video) {
            Self::restore(&backup, video);
            return Err(Error::io(video, err.error));
        }
        if !self.keep_backup {
            fs::remove_file(&backup).at_path(&backup)?;
        } else {
            emit(
                Level::Debug,
                "mux.backup.kept",
                &format!("Kept {}", backup.display()),
                None,
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(value: Value) -> Metadata {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_field_map_prefers_first_source() {
        let m = meta(json!({
            "title": "Clip",
            "plot": "Long story",
            "uploader": "Chan",
            "actor": "Alice",
            "webpage_url": "https://example.org/v",
            "view_count": 3
        }));
        let fields = mux_fields(&m, "2024-01-07");
        assert_eq!(fields["title"], "Clip");
        assert_eq!(fields["description"], "Long story");
        assert_eq!(fields["artist"], "Chan");
        assert_eq!(fields["comment"], "https://example.org/v");
        assert_eq!(fields["date"], "2024-01-07");
        assert!(!fields.contains_key("album"));
    }

    #[test]
    fn test_tags_match_ignores_case() {
        let probe = json!({"format": {"tags": {"TITLE": "Clip", "date": "2024-01-07"}}});
        let mut fields = BTreeMap::new();
        fields.insert("title".to_string(), "Clip".to_string());
        assert!(tags_match(&probe, &fields));
        fields.insert("artist".to_string(), "Chan".to_string());
        assert!(!tags_match(&probe, &fields));
        assert!(!tags_match(&json!({"format": {}}), &fields));
    }

    #[test]
    fn test_ffmpeg_args_stream_copy() {
        let mut fields = BTreeMap::new();
        fields.insert("title".to_string(), "A = B".to_string());
        let args = FfmpegMuxer::ffmpeg_args(Path::new("in.bak.mp4"), Path::new("out.mp4"), &fields);
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert!(args.windows(2).any(|w| w == ["-c", "copy"]));
        assert!(args.windows(2).any(|w| w == ["-metadata", "title=A = B"]));
        assert_eq!(args.last().map(String::as_str), Some("out.mp4"));
    }

    #[test]
    fn test_missing_muxer_restores_video() {
        let tmp = tempfile::tempdir().unwrap();
        let video = tmp.path().join("clip.mp4");
        fs::write(&video, b"frames").unwrap();
        let muxer = FfmpegMuxer {
            ffmpeg: "vidmeta-no-such-ffmpeg".into(),
            ffprobe: "vidmeta-no-such-ffprobe".into(),
            keep_backup: false,
        };
        let fields = mux_fields(&meta(json!({"title": "T"})), "");
        let err = muxer.apply(&video, &fields, &CancellationToken::new()).unwrap_err();
        assert!(matches!(err, Error::Muxer(_)));
        assert_eq!(fs::read(&video).unwrap(), b"frames");
        assert!(matches!(muxer.already_applied(&video, &fields), Err(Error::Muxer(_))));
    }
}
