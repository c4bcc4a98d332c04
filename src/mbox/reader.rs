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

use std::io::BufRead;
use std::path::PathBuf;

use super::message::{is_blank, Message};
use crate::support::error::Error;

/// Splits an mbox stream into messages.
///
/// A line beginning with `From ` starts a new message if it is the first
/// line of the stream or immediately follows an empty line. Any other
/// `From ` line is part of the current message's body.
///
/// Consequently, a mailbox written without an empty line before each
/// envelope line reads as fewer, merged messages. Those are archived (or
/// kept) as a whole, judged by the headers of the first.
///
/// The reader is forward-only; once it returns `None` (or an error) it stays
/// exhausted.
pub struct MboxReader<R> {
    reader: R,
    name: PathBuf,
    /// The envelope line of the next message, already consumed from `reader`
    pending: Option<Vec<u8>>,
    started: bool,
    done: bool,
    bytes_read: u64,
}

impl<R: BufRead> MboxReader<R> {
    /// Create a reader over `reader`, which must be positioned at the start
    /// of the mailbox. `name` is only used for error reporting.
    pub fn new(reader: R, name: impl Into<PathBuf>) -> Self {
        MboxReader {
            reader,
            name: name.into(),
            pending: None,
            started: false,
            done: false,
            bytes_read: 0,
        }
    }

    /// The total number of bytes consumed from the underlying stream.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Read the next message.
    ///
    /// Returns `Ok(None)` at the end of the mailbox, including for a
    /// completely empty stream. A non-empty stream whose first line is not
    /// an envelope line yields `NotMbox`.
    pub fn next_message(&mut self) -> Result<Option<Message>, Error> {
        if self.done {
            return Ok(None);
        }

        let result = self.read_message();
        if !matches!(result, Ok(Some(_))) {
            self.done = true;
        }
        result
    }

    fn read_message(&mut self) -> Result<Option<Message>, Error> {
        if !self.started {
            self.started = true;
            let first = self.read_line()?;
            if first.is_empty() {
                return Ok(None);
            }
            if !first.starts_with(b"From ") {
                return Err(Error::NotMbox(self.name.clone()));
            }
            self.pending = Some(first);
        }

        let mut data = match self.pending.take() {
            Some(envelope) => envelope,
            None => return Ok(None),
        };

        let mut after_blank = false;
        loop {
            let line = self.read_line()?;
            if line.is_empty() {
                break;
            }

            if after_blank && line.starts_with(b"From ") {
                self.pending = Some(line);
                break;
            }

            after_blank = is_blank(&line);
            data.extend_from_slice(&line);
        }

        Ok(Some(Message::parse(data)))
    }

    fn read_line(&mut self) -> Result<Vec<u8>, Error> {
        let mut line = Vec::new();
        let n = self.reader.read_until(b'\n', &mut line)?;
        self.bytes_read += n as u64;
        Ok(line)
    }
}

impl<R: BufRead> Iterator for MboxReader<R> {
    type Item = Result<Message, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_message().transpose()
    }
}
