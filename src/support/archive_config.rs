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

use std::path::PathBuf;

use chrono::format::{Item, StrftimeItems};
use chrono::prelude::*;
use serde::{Deserialize, Serialize};

use super::chronox::local_midnight;
use super::compression::Compression;
use super::error::Error;

/// The configuration for an archival run.
///
/// This is assembled by the command line front-end, optionally starting from
/// a TOML file, and is never modified once a run has begun. Every engine
/// entry point receives it explicitly.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Archive messages older than this many days.
    ///
    /// Mutually exclusive with `date_old_max`. If neither is set,
    /// `DEFAULT_DAYS_OLD_MAX` applies.
    pub days_old_max: Option<u32>,
    /// Archive messages dated before the start of this (local) day.
    pub date_old_max: Option<NaiveDate>,
    /// Only archive messages of at least this many bytes.
    pub min_size: Option<u64>,
    /// Also archive messages marked as flagged (important).
    pub include_flagged: bool,
    /// Never archive messages which have not been read.
    pub preserve_unread: bool,
    /// Archive every message, regardless of age, size, or status.
    pub archive_all: bool,
    /// Only report what would be done.
    pub dry_run: bool,
    /// Delete old messages instead of archiving them.
    pub delete_old_mail: bool,
    /// Copy old messages to the archive but leave the mailbox alone.
    pub copy_old_mail: bool,
    /// Write uncompressed archives.
    pub no_compress: bool,
    /// Put archives in this directory instead of next to the mailbox.
    pub output_dir: Option<PathBuf>,
    /// strftime pattern prepended to the archive name.
    pub archive_prefix: Option<String>,
    /// strftime pattern appended to the archive name.
    ///
    /// The time formatted is the archival cutoff, so that e.g. `_%Y` names
    /// the archive after the year the archived mail is older than.
    pub archive_suffix: String,
    /// Use this base name for the archive instead of the mailbox's name.
    pub archive_name: Option<String>,
    /// Only report errors.
    pub quiet: bool,
    /// Report details of processing.
    pub verbose: bool,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        ArchiveConfig {
            days_old_max: None,
            date_old_max: None,
            min_size: None,
            include_flagged: false,
            preserve_unread: false,
            archive_all: false,
            dry_run: false,
            delete_old_mail: false,
            copy_old_mail: false,
            no_compress: false,
            output_dir: None,
            archive_prefix: None,
            archive_suffix: ArchiveConfig::DEFAULT_SUFFIX.to_owned(),
            archive_name: None,
            quiet: false,
            verbose: false,
        }
    }
}

/// What happens to messages selected for archival.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Move them into the archive.
    Archive,
    /// Copy them into the archive and leave the mailbox untouched.
    Copy,
    /// Remove them from the mailbox without archiving them.
    Delete,
    /// Count them; write nothing.
    DryRun,
}

/// The rule deciding whether a message is old enough.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AgeLimit {
    Days(u32),
    Before(NaiveDate),
}

impl ArchiveConfig {
    pub const DEFAULT_DAYS_OLD_MAX: u32 = 180;
    pub const DEFAULT_SUFFIX: &'static str = "_archive";

    /// Check that the options make sense together.
    pub fn validate(&self) -> Result<(), Error> {
        if self.days_old_max.is_some() && self.date_old_max.is_some() {
            return Err(Error::BadConfig(
                "an age in days and a cutoff date cannot both be given"
                    .to_owned(),
            ));
        }

        if self.delete_old_mail && self.copy_old_mail {
            return Err(Error::BadConfig(
                "old mail cannot be both deleted and copied".to_owned(),
            ));
        }

        if self.quiet && self.verbose {
            return Err(Error::BadConfig(
                "quiet and verbose are mutually exclusive".to_owned(),
            ));
        }

        check_time_pattern(&self.archive_suffix)?;
        if let Some(ref prefix) = self.archive_prefix {
            check_time_pattern(prefix)?;
        }

        if let Some(ref name) = self.archive_name {
            if name.is_empty() || name.contains('/') {
                return Err(Error::BadConfig(format!(
                    "bad archive name: {:?}",
                    name
                )));
            }
        }

        Ok(())
    }

    pub fn mode(&self) -> Mode {
        if self.dry_run {
            Mode::DryRun
        } else if self.delete_old_mail {
            Mode::Delete
        } else if self.copy_old_mail {
            Mode::Copy
        } else {
            Mode::Archive
        }
    }

    pub fn age_limit(&self) -> AgeLimit {
        match (self.days_old_max, self.date_old_max) {
            (_, Some(date)) => AgeLimit::Before(date),
            (Some(days), None) => AgeLimit::Days(days),
            (None, None) => AgeLimit::Days(Self::DEFAULT_DAYS_OLD_MAX),
        }
    }

    pub fn compression(&self) -> Compression {
        if self.no_compress {
            Compression::None
        } else {
            Compression::Gzip
        }
    }

    /// Return the instant before which messages count as old, for a run
    /// taking place at `now`.
    ///
    /// Day counts reaching further back than chrono can represent are
    /// clamped to a day after the earliest representable instant, which no
    /// message can predate.
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self.age_limit() {
            AgeLimit::Days(days) => {
                // A day of slack so that local-time conversions of the
                // cutoff can't underflow either
                let floor =
                    DateTime::<Utc>::MIN_UTC + chrono::Duration::days(1);
                now.checked_sub_signed(chrono::Duration::seconds(
                    i64::from(days) * 86400,
                ))
                .filter(|&cutoff| cutoff > floor)
                .unwrap_or(floor)
            }
            AgeLimit::Before(date) => local_midnight(date).with_timezone(&Utc),
        }
    }
}

/// Fail if `pattern` contains anything chrono can't format.
pub fn check_time_pattern(pattern: &str) -> Result<(), Error> {
    if StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error)) {
        Err(Error::BadConfig(format!("bad time pattern: {:?}", pattern)))
    } else {
        Ok(())
    }
}

/// Parse a cutoff date as given on the command line.
///
/// ISO dates (`2000-07-29`) and Internet-style dates with abbreviated or
/// full month names (`29 Jul 2000`, `29 July 2000`) are accepted.
pub fn parse_cutoff_date(s: &str) -> Result<NaiveDate, Error> {
    ["%Y-%m-%d", "%d %b %Y", "%d %B %Y"]
        .iter()
        .filter_map(|fmt| NaiveDate::parse_from_str(s.trim(), fmt).ok())
        .next()
        .ok_or_else(|| Error::BadConfig(format!("bad date: {:?}", s)))
}
