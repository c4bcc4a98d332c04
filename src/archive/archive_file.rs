//-
// Copyright (c) 2024, Jason Lingle
//
// This file is part of Archivemail.
//
// Archivemail is free software: you can redistribute it and/or modify it
// under the terms of the GNU General Public License as published by the Free
// Software Foundation, either version 3 of the License, or (at your option)
// any later version.
//
// Archivemail is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or
// FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for
// more details.
//
// You should have received a copy of the GNU General Public License along with
// Archivemail. If not, see <http://www.gnu.org/licenses/>.

//! Writing archive files.
//!
//! An archive is never modified in place. All content, including whatever
//! the archive already held, is written to a temporary file in the archive's
//! directory, which then takes the archive's name in a single rename. The
//! process has three stages:
//!
//! - `ArchiveWriter` accumulates content in the temporary file.
//!
//! - `PreparedArchive` is the complete, synced temporary file.
//!
//! - `CommittedArchive` has been renamed into place, but can still be undone
//!   until it is confirmed, since the mailbox swap that follows may fail.

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::fs;
use std::io::{self, BufWriter};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use log::{debug, info};
use tempfile::NamedTempFile;

use super::name::parent_dir;
use crate::mbox::message::Message;
use crate::mbox::writer::MboxWriter;
use crate::support::compression::{Compression, FinishWrite};
use crate::support::error::Error;
use crate::support::file_ops::{self, ErrorTransforms, IgnoreKinds};

pub struct ArchiveWriter {
    path: PathBuf,
    existing: Option<fs::Metadata>,
    tmp: NamedTempFile,
    writer: MboxWriter<Box<dyn FinishWrite>>,
    appended: usize,
}

impl fmt::Debug for ArchiveWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<ArchiveWriter {}, {} appended>",
            self.path.display(),
            self.appended
        )
    }
}

impl ArchiveWriter {
    /// Start writing the archive at `path`.
    ///
    /// If the archive exists, its current content is carried over first
    /// (decompressing it if `compression` calls for that), so that new
    /// messages are appended after it.
    ///
    /// Fails with `ArchiveNameCollision` if `path` exists but isn't a
    /// regular file, or if a differently-compressed archive of the same name
    /// exists.
    pub fn open_or_create(
        path: &Path,
        compression: Compression,
    ) -> Result<Self, Error> {
        if let Some(other) = alternate_path(path, compression) {
            if fs::symlink_metadata(&other).is_ok() {
                return Err(Error::ArchiveNameCollision(other));
            }
        }

        let existing = match fs::symlink_metadata(path) {
            Ok(md) if md.file_type().is_file() => Some(md),
            Ok(_) => return Err(Error::ArchiveNameCollision(path.to_owned())),
            Err(e) if io::ErrorKind::NotFound == e.kind() => None,
            Err(e) => return Err(e.into()),
        };

        let tmp = tempfile::Builder::new()
            .prefix(".archivemail")
            .suffix(".tmp")
            .tempfile_in(parent_dir(path))?;
        let out = compression
            .compressor(BufWriter::new(tmp.as_file().try_clone()?));
        let mut writer = MboxWriter::new(out);

        if existing.is_some() {
            let old = compression.decompressor(fs::File::open(path)?);
            let carried = writer.copy_raw(old)?;
            debug!(
                "Carried over {} bytes from existing archive {}",
                carried,
                path.display()
            );
        }

        Ok(ArchiveWriter {
            path: path.to_owned(),
            existing,
            tmp,
            writer,
            appended: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&mut self, message: &Message) -> Result<(), Error> {
        self.writer.append(message)?;
        self.appended += 1;
        Ok(())
    }

    /// Finish writing and flush everything to disk.
    pub fn finalize(self) -> Result<PreparedArchive, Error> {
        let mut out = self.writer.into_inner();
        out.finish()?;
        drop(out);
        self.tmp.as_file().sync_all()?;

        if let Some(ref md) = self.existing {
            file_ops::chmod(self.tmp.path(), md.permissions().mode())?;
        }

        Ok(PreparedArchive {
            path: self.path,
            existing: self.existing.is_some(),
            tmp: self.tmp,
            appended: self.appended,
        })
    }
}

/// A fully written archive, not yet visible under its final name.
///
/// Dropping it discards the new content.
pub struct PreparedArchive {
    path: PathBuf,
    existing: bool,
    tmp: NamedTempFile,
    appended: usize,
}

impl PreparedArchive {
    /// Move the new archive into place.
    ///
    /// If an archive already existed, it remains reachable through a backup
    /// link until the returned value is confirmed or rolled back. A new
    /// archive never replaces a file that appeared after the writer was
    /// opened.
    pub fn commit(self) -> Result<CommittedArchive, Error> {
        let backup = if self.existing {
            let backup = file_ops::backup_link(&self.path)?;
            if let Err(e) = self.tmp.persist(&self.path) {
                let _ = fs::remove_file(&backup);
                return Err(e.error.into());
            }
            Some(backup)
        } else {
            self.tmp
                .persist_noclobber(&self.path)
                .map_err(|e| e.error)
                .on_exists(Error::ArchiveNameCollision(self.path.clone()))?;
            None
        };

        info!(
            "Wrote {} message(s) to {}",
            self.appended,
            self.path.display()
        );
        Ok(CommittedArchive {
            path: self.path,
            backup,
        })
    }
}

/// An archive in its final place, whose previous state can still be
/// restored.
#[derive(Debug)]
pub struct CommittedArchive {
    path: PathBuf,
    backup: Option<PathBuf>,
}

impl CommittedArchive {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Make the new archive permanent.
    pub fn confirm(self) -> Result<(), Error> {
        if let Some(ref backup) = self.backup {
            fs::remove_file(backup).ignore_not_found()?;
        }
        Ok(())
    }

    /// Put back whatever was at the archive's path before the commit.
    pub fn rollback(self) -> Result<(), Error> {
        match self.backup {
            Some(ref backup) => fs::rename(backup, &self.path)?,
            None => fs::remove_file(&self.path).ignore_not_found()?,
        }
        debug!("Rolled back {}", self.path.display());
        Ok(())
    }
}

/// The name an archive with the other compression setting would have.
fn alternate_path(path: &Path, compression: Compression) -> Option<PathBuf> {
    let bytes = path.as_os_str().as_bytes();
    match compression {
        Compression::Gzip => bytes
            .strip_suffix(Compression::Gzip.extension().as_bytes())
            .filter(|b| !b.is_empty())
            .map(|b| PathBuf::from(OsStr::from_bytes(b))),
        Compression::None => {
            let mut s = OsString::from(path.as_os_str());
            s.push(Compression::Gzip.extension());
            Some(PathBuf::from(s))
        }
    }
}
