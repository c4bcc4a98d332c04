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

//! Builders for the mailboxes used by tests.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::prelude::*;
use nix::sys::stat::{utimensat, UtimensatFlags};
use nix::sys::time::{TimeSpec, TimeValLike};

/// The body every generated message carries, ending with the empty line
/// that separates it from the next message.
pub static BODY: &str = "This is the message body.\nIt's very exciting.\n\n";

/// Format `t` the way delivery agents write the `From_` line.
pub fn envelope_time(t: DateTime<Utc>) -> String {
    t.with_timezone(&Local)
        .format("%a %b %e %H:%M:%S %Y")
        .to_string()
}

/// A typical message delivered at `t`, with matching envelope and `Date`.
pub fn message_at(t: DateTime<Utc>) -> String {
    message_with(t, &[("Date", &t.to_rfc2822()[..])])
}

/// A message whose envelope is dated `envelope` and which carries exactly
/// `extra` in addition to the usual addressing headers.
pub fn message_with(
    envelope: DateTime<Utc>,
    extra: &[(&str, &str)],
) -> String {
    let mut s = format!(
        "From sender@dummy.domain {}\n\
         From: sender@dummy.domain\n\
         To: receipient@dummy.domain\n\
         Subject: This is a dummy message\n",
        envelope_time(envelope)
    );
    for &(name, value) in extra {
        s.push_str(name);
        s.push_str(": ");
        s.push_str(value);
        s.push('\n');
    }
    s.push('\n');
    s.push_str(BODY);
    s
}

/// `days` days before `now`, plus `hours` hours.
pub fn days_ago(now: DateTime<Utc>, days: i64, hours: i64) -> DateTime<Utc> {
    now - chrono::Duration::days(days) + chrono::Duration::hours(hours)
}

/// Write `messages` as the mbox `name` under `dir`.
pub fn write_mbox(dir: &Path, name: &str, messages: &[String]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, messages.concat()).unwrap();
    path
}

/// Set the access and modification times of `path` to the given number of
/// seconds since the epoch.
pub fn set_times(path: &Path, atime: i64, mtime: i64) {
    utimensat(
        None,
        path,
        &TimeSpec::seconds(atime),
        &TimeSpec::seconds(mtime),
        UtimensatFlags::FollowSymlink,
    )
    .unwrap();
}
