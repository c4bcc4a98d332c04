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

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::prelude::*;

use crate::support::archive_config::{check_time_pattern, ArchiveConfig};
use crate::support::error::Error;

/// Work out where the archive for `mailbox` goes.
///
/// The archive is named `<prefix><base><suffix>[.gz]`, where the prefix and
/// suffix are strftime patterns expanded at `cutoff` in local time, and the
/// base is the configured archive name or else the mailbox's own file name.
/// It is placed in the configured output directory, or next to the mailbox.
pub fn archive_path(
    mailbox: &Path,
    config: &ArchiveConfig,
    cutoff: DateTime<Utc>,
) -> Result<PathBuf, Error> {
    let base = match config.archive_name {
        Some(ref name) => OsString::from(name),
        None => mailbox
            .file_name()
            .ok_or_else(|| Error::NotMbox(mailbox.to_owned()))?
            .to_owned(),
    };

    let cutoff = cutoff.with_timezone(&Local);
    let mut name = OsString::new();
    if let Some(ref prefix) = config.archive_prefix {
        check_time_pattern(prefix)?;
        name.push(cutoff.format(prefix).to_string());
    }
    name.push(base);
    check_time_pattern(&config.archive_suffix)?;
    name.push(cutoff.format(&config.archive_suffix).to_string());
    name.push(config.compression().extension());

    let mailbox_dir = parent_dir(mailbox);
    let dir = config.output_dir.as_deref().unwrap_or(mailbox_dir);
    let path = dir.join(&name);

    if Some(name.as_os_str()) == mailbox.file_name()
        && same_dir(dir, mailbox_dir)
    {
        return Err(Error::ArchiveNameCollision(path));
    }

    Ok(path)
}

/// The directory containing `path`, which is `.` for bare file names.
pub fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn same_dir(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}
