//-
// Copyright (c) 2020, 2024, Jason Lingle
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

//! Miscellaneous functions for working with files.

use std::fs;
use std::io;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};

use log::debug;
use nix::sys::stat::{utimensat, UtimensatFlags};
use nix::sys::time::{TimeSpec, TimeValLike};
use nix::unistd::{Gid, Uid};
use rand::{rngs::OsRng, Rng};

use crate::support::error::Error;

/// Atomically replace `path` with the staged file `tmp`.
///
/// Before the rename, `tmp` takes on the permission bits and (where the
/// process is allowed to) the ownership recorded in `original`. Times are
/// left alone; see `restore_times()`.
pub fn replace_preserving(
    tmp: tempfile::NamedTempFile,
    path: impl AsRef<Path>,
    original: &fs::Metadata,
) -> Result<(), Error> {
    let path = path.as_ref();

    chmod(tmp.path(), original.permissions().mode())?;
    if let Err(e) = nix::unistd::chown(
        tmp.path(),
        Some(Uid::from_raw(original.uid())),
        Some(Gid::from_raw(original.gid())),
    ) {
        // Only root may give files away; the replacement then simply stays
        // owned by us.
        debug!("Not preserving owner of {}: {}", path.display(), e);
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Set the access and modification times of `path` to those recorded in
/// `original`.
pub fn restore_times(
    path: impl AsRef<Path>,
    original: &fs::Metadata,
) -> Result<(), Error> {
    let atime = TimeSpec::nanoseconds(
        original.atime() * 1_000_000_000 + original.atime_nsec(),
    );
    let mtime = TimeSpec::nanoseconds(
        original.mtime() * 1_000_000_000 + original.mtime_nsec(),
    );
    utimensat(
        None,
        path.as_ref(),
        &atime,
        &mtime,
        UtimensatFlags::FollowSymlink,
    )?;
    Ok(())
}

/// Create a new hard link to `target` in the same directory, with a fresh
/// random name, and return the name of that link.
///
/// This keeps the current content of `target` reachable while `target`
/// itself is replaced.
pub fn backup_link(target: impl AsRef<Path>) -> io::Result<PathBuf> {
    let target = target.as_ref();
    let dir = target.parent().unwrap_or_else(|| Path::new("."));
    let base = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    loop {
        let name = format!(".{}.{}.bak", base, OsRng.gen::<u64>());
        let dst = dir.join(name);

        match fs::hard_link(target, &dst) {
            Ok(()) => return Ok(dst),
            Err(e) if io::ErrorKind::AlreadyExists == e.kind() => continue,
            Err(e) => return Err(e),
        }
    }
}

pub fn chmod(path: impl AsRef<Path>, mode: u32) -> io::Result<()> {
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

pub trait IgnoreKinds {
    fn ignore_not_found(self) -> Self;
}

impl<R: Default> IgnoreKinds for Result<R, io::Error> {
    fn ignore_not_found(self) -> Self {
        match self {
            Ok(r) => Ok(r),
            Err(e) if io::ErrorKind::NotFound == e.kind() => Ok(R::default()),
            Err(e) => Err(e),
        }
    }
}

pub trait ErrorTransforms {
    type Coerced;
    fn on_exists(self, error: Error) -> Self::Coerced;
}

impl<R, E: Into<Error>> ErrorTransforms for Result<R, E> {
    type Coerced = Result<R, Error>;

    fn on_exists(self, error: Error) -> Result<R, Error> {
        match self.map_err(|e| e.into()) {
            Err(Error::Io(e)) if io::ErrorKind::AlreadyExists == e.kind() => {
                Err(error)
            }
            Err(Error::Nix(nix::Error::Sys(nix::errno::Errno::EEXIST))) => {
                Err(error)
            }
            s => s,
        }
    }
}
