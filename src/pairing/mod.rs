//! Pairing of video files with their sidecar metadata files.

use crate::config::ScanFilters;
use crate::config::paths::expand_user_path;
use crate::error::{Error, Result};
use crate::ops::Ops;
use crate::record::{BACKUP_TAG, FileRecord, MetaKind};
use crate::ui::prelude::*;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use walkdir::WalkDir;

/// Downloader and media-server sidecar suffixes, checked in this order.
pub const SIDECAR_INFIXES: &[&str] = &[
    ".info.json",
    ".metadata.json",
    ".model.json",
    ".manifest.cdm.json",
    ".movie.nfo",
    ".tvshow.nfo",
    ".episode.nfo",
    ".disc.nfo",
    ".release.nfo",
    ".bdinfo.nfo",
    ".mediainfo.nfo",
];

/// A `video_source:meta_source` pair from the command line or settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPair {
    pub video: PathBuf,
    pub meta: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairKind {
    Files,
    Directories,
}

impl FromStr for BatchPair {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(':').collect();
        match parts.as_slice() {
            [video, meta] if !video.trim().is_empty() && !meta.trim().is_empty() => Ok(BatchPair {
                video: expand_user_path(video.trim()),
                meta: expand_user_path(meta.trim()),
            }),
            _ => Err(Error::config(format!(
                "batch pair '{}' must be video_path_or_dir:meta_path_or_dir (colons inside paths are not allowed)",
                s
            ))),
        }
    }
}

impl fmt::Display for BatchPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.video.display(), self.meta.display())
    }
}

impl BatchPair {
    /// Both sides must exist and be of the same kind.
    pub fn validate(&self) -> Result<PairKind> {
        let kind_of = |path: &Path| -> Result<bool> {
            let meta = std::fs::metadata(path).map_err(|e| {
                Error::config(format!("batch source {} is not accessible: {}", path.display(), e))
            })?;
            Ok(meta.is_dir())
        };
        match (kind_of(&self.video)?, kind_of(&self.meta)?) {
            (true, true) => Ok(PairKind::Directories),
            (false, false) => Ok(PairKind::Files),
            _ => Err(Error::config(format!(
                "batch pair {} mixes a directory with a file",
                self
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub video_extensions: Vec<String>,
    pub filters: ScanFilters,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            video_extensions: crate::config::DEFAULT_VIDEO_EXTENSIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            filters: ScanFilters::default(),
        }
    }
}

fn extension_lower(path: &Path) -> Option<String> {
    path.extension().map(|e| e.to_string_lossy().to_lowercase())
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

pub fn has_backup_tag(path: &Path) -> bool {
    file_name_of(path).to_lowercase().contains(BACKUP_TAG)
}

/// Regular files directly inside `dir` whose extension is in `extensions`.
pub fn scan_directory(dir: &Path, extensions: &[String], filters: &ScanFilters) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| dir.to_path_buf());
            Error::io(path, e.into())
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let Some(ext) = extension_lower(path) else {
            continue;
        };
        if !extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext)) {
            continue;
        }
        if has_backup_tag(path) {
            emit(
                Level::Debug,
                "pairing.skip_backup",
                &format!("Skipping backup file {}", path.display()),
                None,
            );
            continue;
        }
        if !filters.accepts(&file_name_of(path)) {
            continue;
        }
        files.push(path.to_path_buf());
    }
    Ok(files)
}

/// The known infix carried by a sidecar stem, e.g. `.info` for `clip.info`.
pub fn known_infix(meta_base: &str, kind: MetaKind) -> Option<&'static str> {
    let lower = meta_base.to_lowercase();
    let ext_suffix = format!(".{}", kind.extension());
    SIDECAR_INFIXES.iter().find_map(|infix| {
        let stem_part = infix.strip_suffix(ext_suffix.as_str())?;
        lower.ends_with(stem_part).then_some(stem_part)
    })
}

/// Lookup key for a sidecar file name: lower-cased, first matching infix
/// removed, otherwise just the extension.
pub fn normalized_meta_key(file_name: &str) -> String {
    let lower = file_name.to_lowercase();
    for infix in SIDECAR_INFIXES {
        if let Some(stripped) = lower.strip_suffix(infix) {
            return stripped.to_string();
        }
    }
    exact_key(&lower)
}

fn exact_key(file_name: &str) -> String {
    let lower = file_name.to_lowercase();
    match lower.rsplit_once('.') {
        Some((stem, _)) => stem.to_string(),
        None => lower,
    }
}

/// Result of matching one batch pair.
#[derive(Debug, Default)]
pub struct PairMatches {
    pub records: Vec<FileRecord>,
    pub unmatched: Vec<PathBuf>,
}

/// Join videos with sidecars by normalized stem. An exact stem match wins
/// over an infix-stripped one, so `clip.metadata.mp4` keeps
/// `clip.metadata.json`.
pub fn match_files(videos: &[PathBuf], metas: &[PathBuf], ops: &Arc<Ops>) -> Result<PairMatches> {
    let mut exact: HashMap<String, &PathBuf> = HashMap::new();
    let mut normalized: HashMap<String, &PathBuf> = HashMap::new();
    for meta in metas {
        let name = file_name_of(meta);
        exact.entry(exact_key(&name)).or_insert(meta);
        normalized.entry(normalized_meta_key(&name)).or_insert(meta);
    }

    let mut matches = PairMatches::default();
    for video in videos {
        let key = exact_key(&file_name_of(video));
        match exact.get(&key).or_else(|| normalized.get(&key)) {
            Some(meta) => matches.records.push(FileRecord::new(video, meta, Arc::clone(ops))?),
            None => matches.unmatched.push(video.clone()),
        }
    }
    Ok(matches)
}

/// Resolve one batch pair into records. Unmatched videos are warned about;
/// a pair with no match at all is a `Match` error.
pub fn collect_records(pair: &BatchPair, options: &ScanOptions, ops: &Arc<Ops>) -> Result<PairMatches> {
    let matches = match pair.validate()? {
        PairKind::Files => {
            if MetaKind::from_extension(&extension_lower(&pair.meta).unwrap_or_default()).is_none() {
                return Err(Error::config(format!(
                    "{} is not a json or nfo sidecar",
                    pair.meta.display()
                )));
            }
            PairMatches {
                records: vec![FileRecord::new(&pair.video, &pair.meta, Arc::clone(ops))?],
                unmatched: Vec::new(),
            }
        }
        PairKind::Directories => {
            let videos = scan_directory(&pair.video, &options.video_extensions, &options.filters)?;
            let meta_exts = vec!["json".to_string(), "nfo".to_string()];
            let metas = scan_directory(&pair.meta, &meta_exts, &ScanFilters::default())?;
            match_files(&videos, &metas, ops)?
        }
    };

    for video in &matches.unmatched {
        emit(
            Level::Warn,
            "pairing.unmatched",
            &format!("No sidecar found for {}", video.display()),
            Some(serde_json::json!({ "video": video.display().to_string() })),
        );
    }

    if matches.records.is_empty() {
        return Err(Error::Match(format!("no video in {} has a sidecar", pair)));
    }
    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, b"{}").unwrap();
        path
    }

    fn ops() -> Arc<Ops> {
        Arc::new(Ops::default())
    }

    #[test]
    fn test_normalized_keys_strip_infixes() {
        assert_eq!(normalized_meta_key("A_B_C.info.json"), "a_b_c");
        assert_eq!(normalized_meta_key("Show.tvshow.nfo"), "show");
        assert_eq!(normalized_meta_key("plain.json"), "plain");
    }

    #[test]
    fn test_known_infix() {
        assert_eq!(known_infix("clip.info", MetaKind::Json), Some(".info"));
        assert_eq!(known_infix("clip.episode", MetaKind::Nfo), Some(".episode"));
        assert_eq!(known_infix("clip", MetaKind::Json), None);
    }

    #[test]
    fn test_exact_match_beats_infix_stripping() {
        let videos = vec![PathBuf::from("/v/file.metadata.mp4"), PathBuf::from("/v/other.mp4")];
        let metas = vec![
            PathBuf::from("/m/file.metadata.json"),
            PathBuf::from("/m/other.info.json"),
        ];
        let matches = match_files(&videos, &metas, &ops()).unwrap();
        assert_eq!(matches.records.len(), 2);
        assert_eq!(matches.records[0].meta_path, PathBuf::from("/m/file.metadata.json"));
        assert_eq!(matches.records[1].meta_path, PathBuf::from("/m/other.info.json"));
    }

    #[test]
    fn test_directory_pair_skips_backups_and_reports_unmatched() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "a_b_c.mp4");
        touch(tmp.path(), "a_b_c.info.json");
        touch(tmp.path(), "lonely.mkv");
        touch(tmp.path(), "old.bak.mp4");
        touch(tmp.path(), "old.bak.json");
        touch(tmp.path(), "notes.txt");

        let pair = BatchPair {
            video: tmp.path().to_path_buf(),
            meta: tmp.path().to_path_buf(),
        };
        let matches = collect_records(&pair, &ScanOptions::default(), &ops()).unwrap();
        assert_eq!(matches.records.len(), 1);
        assert_eq!(matches.records[0].video_base, "a_b_c");
        assert_eq!(matches.records[0].meta_kind, MetaKind::Json);
        assert_eq!(matches.unmatched, vec![tmp.path().join("lonely.mkv")]);
    }

    #[test]
    fn test_empty_match_is_match_error() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "clip.mp4");
        let pair = BatchPair {
            video: tmp.path().to_path_buf(),
            meta: tmp.path().to_path_buf(),
        };
        let err = collect_records(&pair, &ScanOptions::default(), &ops()).unwrap_err();
        assert!(matches!(err, Error::Match(_)));
    }

    #[test]
    fn test_mixed_pair_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let file = touch(tmp.path(), "clip.mp4");
        let pair = BatchPair {
            video: file,
            meta: tmp.path().to_path_buf(),
        };
        assert!(matches!(pair.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_parse_batch_pair() {
        let pair: BatchPair = "/videos:/meta".parse().unwrap();
        assert_eq!(pair.video, PathBuf::from("/videos"));
        assert_eq!(pair.meta, PathBuf::from("/meta"));
        assert!("/a:/b:/c".parse::<BatchPair>().is_err());
        assert!("/only".parse::<BatchPair>().is_err());
    }

    #[test]
    fn test_filters_apply_to_videos() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "keep_1.mp4");
        touch(tmp.path(), "skip_trailer.mp4");
        let filters = ScanFilters {
            omits: vec!["TRAILER".into()],
            ..ScanFilters::default()
        };
        let files = scan_directory(tmp.path(), &["mp4".to_string()], &filters).unwrap();
        assert_eq!(files, vec![tmp.path().join("keep_1.mp4")]);
    }
}
