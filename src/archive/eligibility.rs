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

use chrono::prelude::*;
use log::debug;

use crate::mbox::message::Message;
use crate::support::archive_config::ArchiveConfig;

/// Headers consulted, in order, for the time a message was sent or
/// delivered. The `From_` line is the last resort.
pub static DATE_HEADERS: &[&str] = &["Date", "Delivery-date", "Resent-Date"];

/// The archival decision rules for one run.
///
/// The cutoff is fixed when the criteria are built, so every message in a
/// run is judged against the same instant.
#[derive(Clone, Debug)]
pub struct Criteria<'a> {
    config: &'a ArchiveConfig,
    cutoff: DateTime<Utc>,
}

impl<'a> Criteria<'a> {
    pub fn new(config: &'a ArchiveConfig, now: DateTime<Utc>) -> Self {
        Criteria {
            config,
            cutoff: config.cutoff(now),
        }
    }

    /// Messages strictly older than this are old enough to archive.
    pub fn cutoff(&self) -> DateTime<Utc> {
        self.cutoff
    }

    /// Decide whether `message` leaves the mailbox.
    pub fn should_archive(&self, message: &Message) -> bool {
        if self.config.archive_all {
            return true;
        }

        if !self.config.include_flagged && is_flagged(message) {
            return false;
        }

        if self.config.preserve_unread && is_unread(message) {
            return false;
        }

        let old_enough = match message_time(message) {
            Some(time) => time < self.cutoff,
            None => {
                debug!("No usable date in {:?}; keeping it", message);
                false
            }
        };

        let big_enough = self
            .config
            .min_size
            .map_or(true, |min| message.len() as u64 >= min);

        old_enough && big_enough
    }
}

/// Determine when `message` was sent.
///
/// The first date header that parses wins. Unparsable headers are skipped.
/// If none of them is usable, the envelope time is used, which may itself
/// be unparsable.
pub fn message_time(message: &Message) -> Option<DateTime<FixedOffset>> {
    for &name in DATE_HEADERS {
        match message.header_date(name) {
            Ok(Some(time)) => return Some(time),
            Ok(None) => (),
            Err(e) => debug!("{:?}: {}", message, e),
        }
    }

    message.envelope_date()
}

/// Whether the message has been marked important (`F` in `X-Status`).
pub fn is_flagged(message: &Message) -> bool {
    message
        .header("X-Status")
        .map_or(false, |status| status.contains(&b'F'))
}

/// Whether the message has not been read (no `R` in `Status`).
pub fn is_unread(message: &Message) -> bool {
    !message
        .header("Status")
        .map_or(false, |status| status.contains(&b'R'))
}
