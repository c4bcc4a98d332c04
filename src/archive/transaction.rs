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

//! The archival run for a single mailbox.
//!
//! A run moves through these states:
//!
//! ```text
//! Idle -> Locked -> Scanning -> Splitting -> Committing -> Unlocked
//! ```
//!
//! While scanning, kept messages are streamed into a replacement mailbox
//! staged next to the original and old messages are streamed into the
//! archive writer. Nothing visible changes until committing, which first
//! puts the archive in place and then renames the replacement over the
//! mailbox. If the latter fails, the archive is rolled back. Once both are
//! in place, the run has succeeded; restoring the mailbox's times afterwards
//! is only attempted. The lock is released however the run ends.

use std::fmt;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use chrono::prelude::*;
use log::{debug, error, warn};

use super::archive_file::{ArchiveWriter, CommittedArchive};
use super::eligibility::Criteria;
use super::name::{archive_path, parent_dir};
use crate::mbox::lock::MboxLock;
use crate::mbox::reader::MboxReader;
use crate::mbox::writer::TempMbox;
use crate::support::archive_config::{ArchiveConfig, Mode};
use crate::support::compression::Compression;
use crate::support::error::Error;
use crate::support::file_ops;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RunState {
    Idle,
    Locked,
    Scanning,
    Splitting,
    Committing,
    Unlocked { success: bool },
}

struct Run<'a> {
    mailbox: &'a Path,
    state: RunState,
}

impl Run<'_> {
    fn enter(&mut self, state: RunState) {
        debug!(
            "{}: {:?} -> {:?}",
            self.mailbox.display(),
            self.state,
            state
        );
        self.state = state;
    }
}

/// What a run did, or in a dry run, would have done.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Outcome {
    pub mailbox: PathBuf,
    pub mode: Mode,
    /// Messages found in the mailbox
    pub total: usize,
    /// Messages selected for archival (or deletion)
    pub archived: usize,
    /// Messages left in the mailbox
    pub kept: usize,
    pub total_bytes: u64,
    pub archived_bytes: u64,
    /// The archive written to, if any
    pub archive: Option<PathBuf>,
}

impl Outcome {
    fn new(mailbox: &Path, mode: Mode) -> Self {
        Outcome {
            mailbox: mailbox.to_owned(),
            mode,
            total: 0,
            archived: 0,
            kept: 0,
            total_bytes: 0,
            archived_bytes: 0,
            archive: None,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self.mode {
            Mode::Archive => "archived",
            Mode::Copy => "copied",
            Mode::Delete => "deleted",
            Mode::DryRun => "I would have archived",
        };

        write!(
            f,
            "{}: {} {} of {} message(s) ({} of {})",
            self.mailbox.display(),
            verb,
            self.archived,
            self.total,
            nice_size(self.archived_bytes),
            nice_size(self.total_bytes),
        )?;

        if let Some(ref archive) = self.archive {
            write!(f, " to {}", archive.display())?;
        }

        Ok(())
    }
}

fn nice_size(bytes: u64) -> String {
    let kb = bytes as f64 / 1024.0;
    let mb = kb / 1024.0;
    if mb >= 1.0 {
        format!("{:.1}MB", mb)
    } else if kb >= 1.0 {
        format!("{:.1}kB", kb)
    } else {
        format!("{} bytes", bytes)
    }
}

/// Archive the old messages of the mailbox at `path`, as of `now`.
///
/// On failure, the mailbox and any existing archive are as they were before
/// the call, and no new archive exists.
pub fn archive_mailbox(
    path: &Path,
    config: &ArchiveConfig,
    now: DateTime<Utc>,
) -> Result<Outcome, Error> {
    config.validate()?;

    let mode = config.mode();
    let criteria = Criteria::new(config, now);
    let archive_target = match mode {
        Mode::Archive | Mode::Copy => {
            Some(archive_path(path, config, criteria.cutoff())?)
        }
        Mode::Delete | Mode::DryRun => None,
    };

    let mut run = Run {
        mailbox: path,
        state: RunState::Idle,
    };

    let lock = MboxLock::acquire(path)?;
    run.enter(RunState::Locked);

    let result =
        run_locked(&mut run, &lock, config, &criteria, archive_target);
    let unlocked = lock.release();
    run.enter(RunState::Unlocked {
        success: result.is_ok() && unlocked.is_ok(),
    });

    let outcome = result?;
    unlocked?;
    Ok(outcome)
}

fn run_locked(
    run: &mut Run<'_>,
    lock: &MboxLock,
    config: &ArchiveConfig,
    criteria: &Criteria<'_>,
    archive_target: Option<PathBuf>,
) -> Result<Outcome, Error> {
    let path = run.mailbox;
    let mode = config.mode();
    let mut outcome = Outcome::new(path, mode);

    let original = lock.file().metadata()?;
    if !original.is_file() {
        return Err(Error::NotMbox(path.to_owned()));
    }
    if 0 == original.len() {
        debug!("{} is empty", path.display());
        return Ok(outcome);
    }

    run.enter(RunState::Scanning);
    let kept = match mode {
        Mode::Archive | Mode::Delete => {
            Some(TempMbox::new_in(parent_dir(path))?)
        }
        Mode::Copy | Mode::DryRun => None,
    };
    let split = scan(
        MboxReader::new(BufReader::new(lock.file()), path),
        original.len(),
        criteria,
        archive_target
            .as_deref()
            .map(|target| (target, config.compression())),
        kept,
        &mut outcome,
    )?;

    run.enter(RunState::Splitting);
    if 0 == outcome.archived {
        debug!("Nothing to archive in {}", path.display());
        if Mode::DryRun != mode {
            file_ops::restore_times(path, &original)?;
        }
        return Ok(outcome);
    }

    if Mode::DryRun == mode {
        return Ok(outcome);
    }

    run.enter(RunState::Committing);
    let committed = match split.archive {
        Some(writer) => Some(writer.finalize()?.commit()?),
        None => None,
    };
    outcome.archive = committed.as_ref().map(|c| c.path().to_owned());

    let mailbox_result = match split.kept {
        Some(kept) => kept.finish().map_err(Error::from).and_then(|tmp| {
            file_ops::replace_preserving(tmp, path, &original)
        }),
        // Copy mode; the mailbox was only read
        None => Ok(()),
    };
    finish_commit(mailbox_result, committed)?;

    // Both files are final by now, so this can no longer fail the run
    if let Err(e) = file_ops::restore_times(path, &original) {
        warn!("Failed to restore times of {}: {}", path.display(), e);
    }
    Ok(outcome)
}

/// Where the messages of the mailbox went.
#[derive(Debug)]
struct Split {
    kept: Option<TempMbox>,
    archive: Option<ArchiveWriter>,
}

/// Read every message from `reader`, counting it in `outcome`.
///
/// Old messages go to the archive at `archive_target`, which is opened on
/// the first old message; the rest go to `kept`. Either destination may be
/// absent, in which case those messages are only counted.
///
/// Fails with `MailboxChanged` if the stream turns out not to be exactly
/// `expected_len` bytes long. On any failure, everything written so far is
/// discarded.
fn scan<R: BufRead>(
    mut reader: MboxReader<R>,
    expected_len: u64,
    criteria: &Criteria<'_>,
    archive_target: Option<(&Path, Compression)>,
    mut kept: Option<TempMbox>,
    outcome: &mut Outcome,
) -> Result<Split, Error> {
    let mut archive: Option<ArchiveWriter> = None;

    while let Some(message) = reader.next_message()? {
        outcome.total += 1;
        outcome.total_bytes += message.len() as u64;

        if criteria.should_archive(&message) {
            outcome.archived += 1;
            outcome.archived_bytes += message.len() as u64;

            if let (true, Some((target, compression))) =
                (archive.is_none(), archive_target)
            {
                archive =
                    Some(ArchiveWriter::open_or_create(target, compression)?);
            }
            if let Some(ref mut writer) = archive {
                writer.append(&message)?;
            }
        } else {
            outcome.kept += 1;
            if let Some(ref mut kept) = kept {
                kept.append(&message)?;
            }
        }
    }

    if reader.bytes_read() != expected_len {
        return Err(Error::MailboxChanged(outcome.mailbox.clone()));
    }

    Ok(Split { kept, archive })
}

/// Confirm the archive if the mailbox was dealt with, or roll it back
/// otherwise.
fn finish_commit(
    mailbox_result: Result<(), Error>,
    committed: Option<CommittedArchive>,
) -> Result<(), Error> {
    match (mailbox_result, committed) {
        (Ok(()), Some(committed)) => committed.confirm(),
        (Ok(()), None) => Ok(()),
        (Err(e), Some(committed)) => {
            let archive = committed.path().to_owned();
            if let Err(e2) = committed.rollback() {
                error!(
                    "Failed to roll back {}: {}; it may contain messages \
                     which are still in the mailbox",
                    archive.display(),
                    e2
                );
            }
            Err(e)
        }
        (Err(e), None) => Err(e),
    }
}
