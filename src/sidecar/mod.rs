//! Reading and rewriting sidecar files.
//!
//! A sidecar is opened once per record and stays under an exclusive advisory
//! lock until the record is done with it. Writes replace the whole file in
//! place (seek, truncate, write, fsync) through the same handle; when a write
//! fails the previous bytes are put back.

mod json;
mod nfo;

pub use json::JsonSidecar;
pub use nfo::NfoSidecar;

use crate::commit::{backup_path, copy_streaming};
use crate::error::{Error, IoResultExt, Result};
use crate::ops::MetaOps;
use crate::record::{FileRecord, MetaKind, Metadata};
use crate::transform::{EditContext, apply_date_tag_edits, apply_meta_edits};
use crate::ui::prelude::*;
use nix::fcntl::{Flock, FlockArg};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

pub trait Sidecar: Send {
    fn path(&self) -> &Path;

    fn kind(&self) -> MetaKind;

    /// Fields of the current buffer.
    fn decode(&mut self) -> Result<Metadata>;

    /// Re-read the file from disk, then decode.
    fn refresh(&mut self) -> Result<Metadata>;

    fn write(&mut self, meta: &Metadata) -> Result<()>;

    /// Put back the bytes the file had when it was opened.
    fn rollback(&mut self) -> Result<()>;

    fn make_meta_edits(&mut self, ctx: &EditContext<'_>) -> Result<bool> {
        let mut meta = self.decode()?;
        let changed = apply_meta_edits(&mut meta, ctx)?;
        if changed {
            self.write(&meta)?;
        }
        Ok(changed)
    }

    fn make_date_tag_edits(&mut self, ops: &MetaOps, label: &str) -> Result<bool> {
        let mut meta = self.decode()?;
        let changed = apply_date_tag_edits(&mut meta, ops, label);
        if changed {
            self.write(&meta)?;
        }
        Ok(changed)
    }
}

/// Open the record's sidecar with the adapter for its kind.
pub fn open(record: &FileRecord, backup: bool) -> Result<Box<dyn Sidecar>> {
    let file = LockedFile::open(&record.meta_path, backup)?;
    Ok(match record.meta_kind {
        MetaKind::Json => Box::new(JsonSidecar::new(file)),
        MetaKind::Nfo => Box::new(NfoSidecar::new(file)),
    })
}

/// A sidecar handle held under `flock(LOCK_EX)` with its bytes in memory.
pub struct LockedFile {
    path: PathBuf,
    file: Flock<File>,
    buf: Vec<u8>,
    original: Vec<u8>,
    backup: bool,
    backed_up: bool,
}

impl LockedFile {
    pub fn open(path: &Path, backup: bool) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .at_path(path)?;
        let file = Flock::lock(file, FlockArg::LockExclusive)
            .map_err(|(_, errno)| Error::io(path, errno.into()))?;

        let mut locked = Self {
            path: path.to_path_buf(),
            file,
            buf: Vec::new(),
            original: Vec::new(),
            backup,
            backed_up: false,
        };
        locked.reload()?;
        locked.original = locked.buf.clone();
        Ok(locked)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Refill the buffer from disk, reusing its allocation.
    pub fn reload(&mut self) -> Result<()> {
        self.buf.clear();
        self.file.seek(SeekFrom::Start(0)).at_path(&self.path)?;
        self.file.read_to_end(&mut self.buf).at_path(&self.path)?;
        Ok(())
    }

    fn write_through(&mut self, data: &[u8]) -> std::io::Result<()> {
        self.file.seek(SeekFrom::Start(0))?;
        self.file.set_len(0)?;
        self.file.write_all(data)?;
        self.file.sync_all()
    }

    fn ensure_backup(&mut self) -> Result<()> {
        if !self.backup || self.backed_up {
            return Ok(());
        }
        let target = backup_path(&self.path);
        copy_streaming(&self.path, &target)?;
        emit(
            Level::Debug,
            "sidecar.backup",
            &format!("Backed up {} to {}", self.path.display(), target.display()),
            None,
        );
        self.backed_up = true;
        Ok(())
    }

    /// Replace the file contents with `data`.
    pub fn replace(&mut self, data: &[u8]) -> Result<()> {
        self.ensure_backup()?;
        if let Err(err) = self.write_through(data) {
            let previous = std::mem::take(&mut self.buf);
            if let Err(restore) = self.write_through(&previous) {
                emit(
                    Level::Error,
                    "sidecar.restore.failed",
                    &format!("Could not restore {}: {}", self.path.display(), restore),
                    None,
                );
            }
            self.buf = previous;
            return Err(Error::io(&self.path, err));
        }
        self.buf.clear();
        self.buf.extend_from_slice(data);
        Ok(())
    }

    pub fn restore_original(&mut self) -> Result<()> {
        if self.buf == self.original {
            return Ok(());
        }
        let original = std::mem::take(&mut self.original);
        let outcome = self.write_through(&original).at_path(&self.path);
        if outcome.is_ok() {
            self.buf.clone_from(&original);
        }
        self.original = original;
        outcome
    }
}
