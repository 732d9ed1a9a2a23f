//! Renames, moves and deletions that finish a record.

use crate::config::PurgeMode;
use crate::error::{Error, IoResultExt, Result};
use crate::record::BACKUP_TAG;
use crate::ui::prelude::*;
use nix::errno::Errno;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read};
use std::path::{Path, PathBuf};

pub const COPY_BUFFER_SIZE: usize = 4 * 1024 * 1024;

pub fn compute_file_hash(path: &Path) -> Result<String> {
    let mut file = File::open(path).at_path(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buffer).at_path(path)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// `<stem>.bak.<ext>` next to `path`.
pub fn backup_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}{}{}", stem, BACKUP_TAG, ext.to_string_lossy()),
        None => format!("{}{}", stem, BACKUP_TAG.trim_end_matches('.')),
    };
    path.with_file_name(name)
}

/// Stream `src` into a new `dst` through 4 MiB buffers.
pub fn copy_streaming(src: &Path, dst: &Path) -> Result<u64> {
    let reader = File::open(src).at_path(src)?;
    let writer = File::create(dst).at_path(dst)?;
    let mut reader = BufReader::with_capacity(COPY_BUFFER_SIZE, reader);
    let mut writer = BufWriter::with_capacity(COPY_BUFFER_SIZE, writer);
    let copied = io::copy(&mut reader, &mut writer).at_path(dst)?;
    let file = writer
        .into_inner()
        .map_err(|e| Error::io(dst, e.into_error()))?;
    file.sync_all().at_path(dst)?;
    Ok(copied)
}

/// Copy and check the destination against `expected_hash`. The destination
/// never survives a failure.
pub fn copy_verified(src: &Path, dst: &Path, expected_hash: &str) -> Result<()> {
    let outcome = copy_streaming(src, dst).and_then(|_| {
        let actual = compute_file_hash(dst)?;
        if actual != expected_hash {
            return Err(Error::HashMismatch {
                source_path: src.to_path_buf(),
                destination: dst.to_path_buf(),
            });
        }
        Ok(())
    });
    if outcome.is_err() {
        let _ = fs::remove_file(dst);
    }
    outcome
}

fn is_cross_device(err: &io::Error) -> bool {
    err.raw_os_error() == Some(Errno::EXDEV as i32)
}

/// Copy, verify against `source_hash`, then remove the source.
pub fn copy_then_delete(src: &Path, dst: &Path, source_hash: &str) -> Result<()> {
    copy_verified(src, dst, source_hash)?;
    if let Err(e) = fs::remove_file(src) {
        let _ = fs::remove_file(dst);
        return Err(Error::io(src, e));
    }
    Ok(())
}

fn ensure_vacant(path: &Path) -> Result<()> {
    if fs::symlink_metadata(path).is_ok() {
        return Err(Error::io(
            path,
            io::Error::new(io::ErrorKind::AlreadyExists, "destination already exists"),
        ));
    }
    Ok(())
}

/// Rename, falling back to a verified copy across filesystems. The source
/// is hashed before the rename is attempted.
pub fn move_file(src: &Path, dst: &Path) -> Result<()> {
    ensure_vacant(dst)?;
    let source_hash = compute_file_hash(src)?;
    let renamed = fs::rename(src, dst);
    finish_move(src, dst, renamed, &source_hash)
}

/// Settle a rename attempt. `EXDEV` turns into a copy checked against
/// `source_hash`; other errors fail the move.
fn finish_move(src: &Path, dst: &Path, renamed: io::Result<()>, source_hash: &str) -> Result<()> {
    match renamed {
        Ok(()) => Ok(()),
        Err(e) if is_cross_device(&e) => {
            emit(
                Level::Debug,
                "commit.cross_device",
                &format!("{} is on another filesystem, copying", dst.display()),
                None,
            );
            copy_then_delete(src, dst, source_hash)
        }
        Err(e) => Err(Error::io(src, e)),
    }
}

pub fn move_to_dir(path: &Path, target_dir: &Path) -> Result<PathBuf> {
    let name = path
        .file_name()
        .ok_or_else(|| Error::config(format!("{} has no file name", path.display())))?;
    fs::create_dir_all(target_dir).at_path(target_dir)?;
    let dst = target_dir.join(name);
    if dst == path {
        return Ok(dst);
    }
    move_file(path, &dst)?;
    Ok(dst)
}

/// Move a video and its sidecar together. When the sidecar cannot follow,
/// the video is moved back.
pub fn move_pair(video: &Path, meta: Option<&Path>, target_dir: &Path) -> Result<(PathBuf, Option<PathBuf>)> {
    let moved_video = move_to_dir(video, target_dir)?;
    let Some(meta) = meta else {
        return Ok((moved_video, None));
    };
    match move_to_dir(meta, target_dir) {
        Ok(moved_meta) => Ok((moved_video, Some(moved_meta))),
        Err(err) => {
            if moved_video != video {
                if let Err(undo) = move_file(&moved_video, video) {
                    emit(
                        Level::Error,
                        "commit.rollback.failed",
                        &format!("Could not move {} back: {}", moved_video.display(), undo),
                        None,
                    );
                }
            }
            Err(err)
        }
    }
}

/// Rename both sides in place. `None` skips a side. Existing destinations
/// are never replaced; a failed sidecar rename undoes the video rename.
pub fn write_results(
    src_video: &Path,
    dst_video: &Path,
    src_meta: Option<&Path>,
    dst_meta: Option<&Path>,
) -> Result<()> {
    let video_moves = src_video != dst_video;
    if video_moves {
        ensure_vacant(dst_video)?;
        fs::rename(src_video, dst_video).at_path(src_video)?;
    }

    let (Some(src_meta), Some(dst_meta)) = (src_meta, dst_meta) else {
        return Ok(());
    };
    if src_meta == dst_meta {
        return Ok(());
    }

    let renamed = ensure_vacant(dst_meta).and_then(|_| fs::rename(src_meta, dst_meta).at_path(src_meta));
    if let Err(err) = renamed {
        if video_moves {
            if let Err(undo) = fs::rename(dst_video, src_video) {
                emit(
                    Level::Error,
                    "commit.rollback.failed",
                    &format!("Could not restore {}: {}", src_video.display(), undo),
                    None,
                );
            }
        }
        return Err(err);
    }
    Ok(())
}

/// Delete a committed sidecar when `mode` covers its extension.
pub fn delete_metafile(path: &Path, mode: PurgeMode) -> Result<bool> {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default();
    if !mode.permits(&ext) {
        return Ok(false);
    }
    let meta = fs::symlink_metadata(path).at_path(path)?;
    if !meta.file_type().is_file() {
        return Err(Error::io(
            path,
            io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"),
        ));
    }
    fs::remove_file(path).at_path(path)?;
    Ok(true)
}

pub fn rename_to_backup(path: &Path) -> Result<PathBuf> {
    let backup = backup_path(path);
    move_file(path, &backup)?;
    Ok(backup)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write(path: &Path, contents: &str) {
        let mut file = File::create(path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
    }

    #[test]
    fn test_backup_path_keeps_extension() {
        assert_eq!(
            backup_path(Path::new("/m/clip.info.json")),
            PathBuf::from("/m/clip.info.bak.json")
        );
        assert_eq!(backup_path(Path::new("/v/clip.mp4")), PathBuf::from("/v/clip.bak.mp4"));
    }

    #[test]
    fn test_verified_copy_removes_source() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let src = tmp.path().join("clip.mp4");
        let dst = tmp.path().join("moved.mp4");
        write(&src, "frames");
        let hash = compute_file_hash(&src)?;

        copy_then_delete(&src, &dst, &hash)?;
        assert!(!src.exists());
        assert!(fs::metadata(&dst)?.is_file());
        assert_eq!(compute_file_hash(&dst)?, hash);
        Ok(())
    }

    fn cross_device() -> io::Result<()> {
        Err(io::Error::from_raw_os_error(Errno::EXDEV as i32))
    }

    #[test]
    fn test_cross_device_rename_falls_back_to_verified_copy() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let src = tmp.path().join("clip.mp4");
        let dst = tmp.path().join("other").join("clip.mp4");
        fs::create_dir_all(dst.parent().unwrap())?;
        write(&src, "frames");
        let hash = compute_file_hash(&src)?;

        finish_move(&src, &dst, cross_device(), &hash)?;
        assert!(!src.exists());
        assert_eq!(compute_file_hash(&dst)?, hash);
        Ok(())
    }

    #[test]
    fn test_cross_device_mismatch_keeps_source() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let src = tmp.path().join("clip.mp4");
        let dst = tmp.path().join("moved.mp4");
        write(&src, "frames");
        let stale = compute_file_hash(&src)?;
        write(&src, "frames changed after hashing");

        let err = finish_move(&src, &dst, cross_device(), &stale).unwrap_err();
        assert!(matches!(err, Error::HashMismatch { .. }));
        assert!(src.exists());
        assert!(!dst.exists());
        Ok(())
    }

    #[test]
    fn test_other_rename_errors_do_not_copy() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let src = tmp.path().join("clip.mp4");
        let dst = tmp.path().join("moved.mp4");
        write(&src, "frames");
        let hash = compute_file_hash(&src)?;
        let denied = Err(io::Error::from(io::ErrorKind::PermissionDenied));

        let err = finish_move(&src, &dst, denied, &hash).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
        assert!(src.exists());
        assert!(!dst.exists());
        Ok(())
    }

    #[test]
    fn test_hash_mismatch_leaves_no_destination() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let src = tmp.path().join("clip.mp4");
        let dst = tmp.path().join("moved.mp4");
        write(&src, "frames");

        let err = copy_verified(&src, &dst, "0000").unwrap_err();
        assert!(matches!(err, Error::HashMismatch { .. }));
        assert!(!dst.exists());
        assert!(src.exists());
        Ok(())
    }

    #[test]
    fn test_write_results_refuses_to_clobber() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let video = tmp.path().join("a_b.mp4");
        let taken = tmp.path().join("a b.mp4");
        write(&video, "v");
        write(&taken, "other");

        assert!(write_results(&video, &taken, None, None).is_err());
        assert!(video.exists());
        assert_eq!(fs::read_to_string(&taken)?, "other");
        Ok(())
    }

    #[test]
    fn test_failed_meta_rename_restores_video() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let video = tmp.path().join("a_b.mp4");
        let meta = tmp.path().join("a_b.info.json");
        let new_video = tmp.path().join("a b.mp4");
        let new_meta = tmp.path().join("a b.info.json");
        write(&video, "v");
        write(&meta, "{}");
        write(&new_meta, "in the way");

        assert!(write_results(&video, &new_video, Some(&meta), Some(&new_meta)).is_err());
        assert!(video.exists());
        assert!(!new_video.exists());
        Ok(())
    }

    #[test]
    fn test_move_pair_into_directory() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let video = tmp.path().join("clip.mp4");
        let meta = tmp.path().join("clip.nfo");
        write(&video, "v");
        write(&meta, "<movie></movie>");
        let target = tmp.path().join("done");

        let (v, m) = move_pair(&video, Some(&meta), &target)?;
        assert_eq!(v, target.join("clip.mp4"));
        assert_eq!(m, Some(target.join("clip.nfo")));
        assert!(!video.exists() && !meta.exists());
        Ok(())
    }

    #[test]
    fn test_delete_metafile_respects_mode() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let json = tmp.path().join("clip.info.json");
        write(&json, "{}");
        assert!(!delete_metafile(&json, PurgeMode::Nfo)?);
        assert!(json.exists());
        assert!(delete_metafile(&json, PurgeMode::All)?);
        assert!(!json.exists());

        let dir = tmp.path().join("folder.json");
        fs::create_dir(&dir)?;
        assert!(delete_metafile(&dir, PurgeMode::Json).is_err());
        Ok(())
    }

    #[test]
    fn test_rename_to_backup() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let video = tmp.path().join("clip.mkv");
        write(&video, "v");
        let backup = rename_to_backup(&video)?;
        assert_eq!(backup, tmp.path().join("clip.bak.mkv"));
        assert!(backup.exists() && !video.exists());
        Ok(())
    }
}
