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

//! Mailbox locking.
//!
//! Two independent conventions are honoured, since different mail agents
//! respect different ones:
//!
//! - The dotlock: a file named `<mailbox>.lock` created exclusively next to
//!   the mailbox. Creating it in a directory we can't write to fails with
//!   `EACCES`; in that case the dotlock is skipped (many system spool
//!   directories are like this) and the lock records that it did so.
//!
//! - Kernel locks on the open mailbox: a POSIX (`fcntl`) write lock over the
//!   whole file, which is what most delivery agents and mail clients use,
//!   and an exclusive `flock(2)` for those which use that instead. On Linux
//!   the two don't interact, so both are taken. Acquiring either blocks for
//!   as long as another process holds it.
//!
//! POSIX locks belong to the process and are dropped as soon as any
//! descriptor of the file is closed, so nothing else may open and close the
//! mailbox while it is locked.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::mem;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};

use log::{debug, warn};
use nix::fcntl::{fcntl, flock, FcntlArg, FlockArg};
use nix::libc;

use crate::support::error::Error;
use crate::support::file_ops::{ErrorTransforms, IgnoreKinds};

/// What became of the dotlock when the mailbox was locked.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DotlockState {
    /// The marker file at the given path was created and is owned by us.
    Held(PathBuf),
    /// The mailbox directory does not permit creating the marker file, so
    /// only the kernel lock protects the mailbox.
    SkippedPermissionDenied,
}

/// Exclusive access to a mailbox file.
///
/// The lock is released by `release()` or, failing that, when dropped.
#[derive(Debug)]
pub struct MboxLock {
    path: PathBuf,
    file: fs::File,
    dotlock: DotlockState,
    released: bool,
}

impl MboxLock {
    /// Open the mailbox at `path` and lock it.
    ///
    /// Fails with an I/O error if the mailbox can't be opened, or with
    /// `LockUnavailable` if another process holds the dotlock or the kernel
    /// refuses the lock. Nothing is left behind on failure.
    pub fn acquire(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref().to_owned();
        // Read-write, since POSIX write locks require it
        let file = fs::OpenOptions::new().read(true).write(true).open(&path)?;
        let dotlock = create_dotlock(&path)?;

        debug!("Waiting for exclusive lock on {}", path.display());
        let locked =
            posix_lock(file.as_raw_fd(), libc::F_WRLCK as libc::c_short, true)
                .and_then(|_| {
                    flock(file.as_raw_fd(), FlockArg::LockExclusive)
                });
        if let Err(e) = locked {
            if let DotlockState::Held(ref marker) = dotlock {
                if let Err(e) = fs::remove_file(marker).ignore_not_found() {
                    warn!("Failed to remove {}: {}", marker.display(), e);
                }
            }

            return Err(Error::LockUnavailable {
                path,
                reason: e.to_string(),
            });
        }

        debug!("Locked {}", path.display());
        Ok(MboxLock {
            path,
            file,
            dotlock,
            released: false,
        })
    }

    /// The mailbox, opened read-write, positioned at the start.
    pub fn file(&self) -> &fs::File {
        &self.file
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dotlock(&self) -> &DotlockState {
        &self.dotlock
    }

    /// Remove the dotlock and drop the kernel locks.
    ///
    /// All steps are always attempted; the first error is returned.
    pub fn release(mut self) -> Result<(), Error> {
        self.release_impl()
    }

    fn release_impl(&mut self) -> Result<(), Error> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        let dotlock_result = match self.dotlock {
            DotlockState::Held(ref marker) => fs::remove_file(marker)
                .ignore_not_found()
                .map_err(Error::from),
            DotlockState::SkippedPermissionDenied => Ok(()),
        };
        let posix_result = posix_lock(
            self.file.as_raw_fd(),
            libc::F_UNLCK as libc::c_short,
            false,
        )
        .map_err(Error::from);
        let flock_result = flock(self.file.as_raw_fd(), FlockArg::Unlock)
            .map_err(Error::from);

        debug!("Unlocked {}", self.path.display());
        dotlock_result.and(posix_result).and(flock_result)
    }
}

impl Drop for MboxLock {
    fn drop(&mut self) {
        if let Err(e) = self.release_impl() {
            warn!("Failed to unlock {}: {}", self.path.display(), e);
        }
    }
}

/// Set (`F_WRLCK`) or clear (`F_UNLCK`) a POSIX lock covering all of `fd`,
/// waiting for conflicting locks to go away if `wait` is set.
fn posix_lock(fd: RawFd, kind: libc::c_short, wait: bool) -> nix::Result<()> {
    // All-zero start and length cover the whole file, including any part
    // appended later.
    let mut lock: libc::flock = unsafe { mem::zeroed() };
    lock.l_type = kind;
    lock.l_whence = libc::SEEK_SET as libc::c_short;

    let arg = if wait {
        FcntlArg::F_SETLKW(&lock)
    } else {
        FcntlArg::F_SETLK(&lock)
    };
    fcntl(fd, arg).map(|_| ())
}

/// The path of the dotlock for the mailbox at `path`.
pub fn dotlock_path(path: &Path) -> PathBuf {
    let mut s = OsString::from(path.as_os_str());
    s.push(".lock");
    PathBuf::from(s)
}

fn create_dotlock(path: &Path) -> Result<DotlockState, Error> {
    let marker = dotlock_path(path);
    let result = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(&marker);

    match result {
        Ok(_) => Ok(DotlockState::Held(marker)),
        Err(ref e) if io::ErrorKind::PermissionDenied == e.kind() => {
            debug!(
                "No permission to create {}; continuing without dotlock",
                marker.display()
            );
            Ok(DotlockState::SkippedPermissionDenied)
        }
        Err(e) => {
            Err::<DotlockState, _>(e).on_exists(Error::LockUnavailable {
                path: path.to_owned(),
                reason: format!("{} already exists", marker.display()),
            })
        }
    }
}

#[cfg(test)]
mod test {
    use std::os::unix::fs::PermissionsExt;

    use super::*;

    fn setup() -> (tempfile::TempDir, PathBuf) {
        crate::init_test_log();
        let root = tempfile::TempDir::new().unwrap();
        let mailbox = root.path().join("inbox");
        fs::write(&mailbox, b"").unwrap();
        (root, mailbox)
    }

    fn try_flock(path: &Path) -> nix::Result<fs::File> {
        let file = fs::File::open(path).unwrap();
        flock(file.as_raw_fd(), FlockArg::LockExclusiveNonblock)?;
        Ok(file)
    }

    /// Whether a forked child process could take a POSIX write lock on
    /// `path` right now.
    ///
    /// This opens and closes `path`, which drops any POSIX lock this process
    /// holds on it.
    fn child_can_posix_lock(path: &Path) -> bool {
        use nix::sys::wait::{waitpid, WaitStatus};
        use nix::unistd::{fork, ForkResult};

        let file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .unwrap();
        let mut lock: libc::flock = unsafe { mem::zeroed() };
        lock.l_type = libc::F_WRLCK as libc::c_short;
        lock.l_whence = libc::SEEK_SET as libc::c_short;

        #[allow(unused_unsafe)]
        let forked = unsafe { fork() }.unwrap();
        match forked {
            ForkResult::Child => {
                // Only async-signal-safe calls from here on
                let status =
                    if fcntl(file.as_raw_fd(), FcntlArg::F_SETLK(&lock)).is_ok()
                    {
                        0
                    } else {
                        1
                    };
                unsafe { libc::_exit(status) }
            }
            ForkResult::Parent { child } => match waitpid(child, None).unwrap()
            {
                WaitStatus::Exited(_, status) => 0 == status,
                status => panic!("Unexpected child status: {:?}", status),
            },
        }
    }

    #[test]
    fn posix_lock_excludes_other_processes() {
        let (_root, mailbox) = setup();
        assert!(child_can_posix_lock(&mailbox));

        let lock = MboxLock::acquire(&mailbox).unwrap();
        assert!(!child_can_posix_lock(&mailbox));
        lock.release().unwrap();

        assert!(child_can_posix_lock(&mailbox));
    }

    #[test]
    fn acquire_creates_marker_and_locks() {
        let (_root, mailbox) = setup();
        let marker = dotlock_path(&mailbox);

        let lock = MboxLock::acquire(&mailbox).unwrap();
        assert_eq!(&DotlockState::Held(marker.clone()), lock.dotlock());
        assert!(marker.is_file());
        assert!(try_flock(&mailbox).is_err());

        lock.release().unwrap();
        assert!(!marker.exists());
        try_flock(&mailbox).unwrap();
    }

    #[test]
    fn reacquire_after_release() {
        let (_root, mailbox) = setup();
        MboxLock::acquire(&mailbox).unwrap().release().unwrap();
        let lock = MboxLock::acquire(&mailbox).unwrap();
        lock.release().unwrap();
        assert!(!dotlock_path(&mailbox).exists());
    }

    #[test]
    fn drop_releases() {
        let (_root, mailbox) = setup();
        {
            let _lock = MboxLock::acquire(&mailbox).unwrap();
            assert!(dotlock_path(&mailbox).exists());
        }
        assert!(!dotlock_path(&mailbox).exists());
        try_flock(&mailbox).unwrap();
    }

    #[test]
    fn existing_marker_is_unavailable() {
        let (_root, mailbox) = setup();
        let marker = dotlock_path(&mailbox);
        fs::write(&marker, b"12345").unwrap();

        assert_matches!(
            Err(Error::LockUnavailable { .. }),
            MboxLock::acquire(&mailbox)
        );
        // Someone else's marker must not be touched
        assert_eq!(b"12345".to_vec(), fs::read(&marker).unwrap());
        try_flock(&mailbox).unwrap();
    }

    #[test]
    fn missing_marker_on_release_is_tolerated() {
        let (_root, mailbox) = setup();
        let lock = MboxLock::acquire(&mailbox).unwrap();
        fs::remove_file(dotlock_path(&mailbox)).unwrap();
        lock.release().unwrap();
    }

    #[test]
    fn missing_mailbox() {
        let (root, _) = setup();
        let nx = root.path().join("nx");
        assert_matches!(Err(Error::Io(_)), MboxLock::acquire(&nx));
        assert!(!dotlock_path(&nx).exists());
    }

    #[test]
    fn unwritable_directory_skips_dotlock() {
        if nix::unistd::geteuid().is_root() {
            // Permissions don't apply to root
            return;
        }

        let (root, _) = setup();
        let spool = root.path().join("spool");
        fs::create_dir(&spool).unwrap();
        let mailbox = spool.join("user");
        fs::write(&mailbox, b"").unwrap();
        fs::set_permissions(&spool, fs::Permissions::from_mode(0o555))
            .unwrap();

        let lock = MboxLock::acquire(&mailbox).unwrap();
        assert_eq!(&DotlockState::SkippedPermissionDenied, lock.dotlock());
        assert!(try_flock(&mailbox).is_err());
        lock.release().unwrap();
        try_flock(&mailbox).unwrap();

        fs::set_permissions(&spool, fs::Permissions::from_mode(0o755))
            .unwrap();
    }
}
