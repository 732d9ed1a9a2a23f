use crate::error::Error;
use crate::ops::Ops;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Sidecar fields in file order.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Literal inserted into the names of pre-change copies.
pub const BACKUP_TAG: &str = ".bak.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetaKind {
    Json,
    Nfo,
}

impl MetaKind {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "json" => Some(MetaKind::Json),
            "nfo" => Some(MetaKind::Nfo),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            MetaKind::Json => "json",
            MetaKind::Nfo => "nfo",
        }
    }
}

impl fmt::Display for MetaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Strings derived from the final metadata, used for naming.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Computed {
    pub date_tag: String,
    pub filename_meta_prefix: String,
    pub formatted_date: String,
}

#[derive(Debug, Clone)]
pub struct FileRecord {
    pub video_dir: PathBuf,
    pub video_base: String,
    pub video_ext: String,
    pub original_video_path: PathBuf,

    pub meta_kind: MetaKind,
    pub meta_dir: PathBuf,
    pub meta_base: String,
    pub meta_ext: String,
    pub meta_path: PathBuf,

    pub computed: Computed,
    pub final_video_path: Option<PathBuf>,
    pub final_meta_path: Option<PathBuf>,
    pub meta_already_applied: bool,
    pub ops: Arc<Ops>,
}

fn split_name(path: &Path) -> (PathBuf, String, String) {
    let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    let base = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    (dir, base, ext)
}

impl FileRecord {
    pub fn new(video: &Path, meta: &Path, ops: Arc<Ops>) -> Result<Self, Error> {
        let (video_dir, video_base, video_ext) = split_name(video);
        let (meta_dir, meta_base, meta_ext) = split_name(meta);
        let meta_kind = MetaKind::from_extension(&meta_ext).ok_or_else(|| {
            Error::config(format!(
                "{} is not a json or nfo sidecar",
                meta.display()
            ))
        })?;

        Ok(Self {
            video_dir,
            video_base,
            video_ext,
            original_video_path: video.to_path_buf(),
            meta_kind,
            meta_dir,
            meta_base,
            meta_ext,
            meta_path: meta.to_path_buf(),
            computed: Computed::default(),
            final_video_path: None,
            final_meta_path: None,
            meta_already_applied: false,
            ops,
        })
    }

    /// Short display name used in log lines.
    pub fn label(&self) -> String {
        if self.video_ext.is_empty() {
            self.video_base.clone()
        } else {
            format!("{}.{}", self.video_base, self.video_ext)
        }
    }

    /// Text between the video stem and the sidecar extension, e.g. `.info`
    /// for `clip.info.json` next to `clip.mp4`.
    pub fn meta_infix(&self) -> String {
        let n = self.video_base.len();
        if let Some(head) = self.meta_base.get(..n) {
            if head.eq_ignore_ascii_case(&self.video_base) {
                return self.meta_base[n..].to_string();
            }
        }
        crate::pairing::known_infix(&self.meta_base, self.meta_kind)
            .map(str::to_string)
            .unwrap_or_default()
    }

    pub fn video_path_for(&self, stem: &str) -> PathBuf {
        let name = if self.video_ext.is_empty() {
            stem.to_string()
        } else {
            format!("{}.{}", stem, self.video_ext)
        };
        self.video_dir.join(name)
    }

    pub fn meta_path_for(&self, stem: &str) -> PathBuf {
        self.meta_dir
            .join(format!("{}{}.{}", stem, self.meta_infix(), self.meta_ext))
    }
}

/// Progress of one record through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordState {
    Discovered,
    MetaOpened,
    MetaTransformed,
    MuxRequested,
    Muxed,
    FilenameComputed,
    Committed,
    Failed {
        at: Box<RecordState>,
        kind: &'static str,
    },
    Canceled,
}

impl RecordState {
    pub fn name(&self) -> &'static str {
        match self {
            RecordState::Discovered => "discovered",
            RecordState::MetaOpened => "meta-opened",
            RecordState::MetaTransformed => "meta-transformed",
            RecordState::MuxRequested => "mux-requested",
            RecordState::Muxed => "muxed",
            RecordState::FilenameComputed => "filename-computed",
            RecordState::Committed => "committed",
            RecordState::Failed { .. } => "failed",
            RecordState::Canceled => "canceled",
        }
    }

    /// Terminal state for an error raised while in `self`.
    pub fn fail(&self, err: &Error) -> RecordState {
        match err {
            Error::OperationCanceled => RecordState::Canceled,
            other => RecordState::Failed {
                at: Box::new(self.clone()),
                kind: other.kind(),
            },
        }
    }
}

impl fmt::Display for RecordState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordState::Failed { at, kind } => write!(f, "failed at {} ({})", at.name(), kind),
            other => f.write_str(other.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(video: &str, meta: &str) -> FileRecord {
        FileRecord::new(Path::new(video), Path::new(meta), Arc::new(Ops::default())).unwrap()
    }

    #[test]
    fn test_split_fields() {
        let rec = record("/v/a_b_c.mp4", "/m/a_b_c.info.json");
        assert_eq!(rec.video_dir, PathBuf::from("/v"));
        assert_eq!(rec.video_base, "a_b_c");
        assert_eq!(rec.video_ext, "mp4");
        assert_eq!(rec.meta_base, "a_b_c.info");
        assert_eq!(rec.meta_kind, MetaKind::Json);
        assert_eq!(rec.meta_infix(), ".info");
    }

    #[test]
    fn test_renamed_paths_keep_infix() {
        let rec = record("/v/a_b_c.mp4", "/v/a_b_c.info.json");
        assert_eq!(rec.video_path_for("a b c"), PathBuf::from("/v/a b c.mp4"));
        assert_eq!(rec.meta_path_for("a b c"), PathBuf::from("/v/a b c.info.json"));
    }

    #[test]
    fn test_rejects_unknown_sidecar_kind() {
        let err = FileRecord::new(Path::new("a.mp4"), Path::new("a.txt"), Arc::new(Ops::default()));
        assert!(matches!(err, Err(Error::Config(_))));
    }

    #[test]
    fn test_failure_state_records_where() {
        let state = RecordState::MetaOpened.fail(&Error::format("x.nfo", "bad"));
        assert_eq!(state.to_string(), "failed at meta-opened (format)");
        assert!(matches!(state, RecordState::Failed { kind: "format", .. }));
        assert_eq!(RecordState::Muxed.fail(&Error::OperationCanceled), RecordState::Canceled);
    }
}
