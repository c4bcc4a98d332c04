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

use std::fmt;
use std::io::{self, Write};
use std::ops::Range;

use chrono::prelude::*;

use crate::mime::header;
use crate::support::error::Error;

/// One message of an mbox file, exactly as it was read.
///
/// The message owns its raw bytes, starting with the `From_` envelope line
/// and running up to (but not including) the envelope line of the next
/// message. The header block is indexed on construction; nothing is ever
/// decoded or rewritten, so `as_bytes()` always returns precisely what the
/// reader consumed.
#[derive(Clone)]
pub struct Message {
    data: Vec<u8>,
    envelope_end: usize,
    body_start: usize,
    headers: Vec<HeaderSpan>,
}

/// Byte ranges of one (possibly folded) header field within the message.
#[derive(Clone, Debug)]
struct HeaderSpan {
    name: Range<usize>,
    value: Range<usize>,
}

impl Message {
    /// Index `data`, which must begin with the envelope line.
    pub fn parse(data: Vec<u8>) -> Self {
        let envelope_end = line_end(&data, 0);
        let mut headers = Vec::<HeaderSpan>::new();
        let mut pos = envelope_end;
        // Header lines which aren't `name: value` and aren't continuations
        // are retained in the data but otherwise ignored.
        let mut continuable = false;

        let body_start = loop {
            if pos >= data.len() {
                break data.len();
            }

            let end = line_end(&data, pos);
            let line = &data[pos..end];
            if is_blank(line) {
                break end;
            }

            if (b' ' == line[0] || b'\t' == line[0]) && continuable {
                if let Some(last) = headers.last_mut() {
                    last.value.end = trim_newline(&data, pos, end);
                }
            } else if let Some(colon) = memchr::memchr(b':', line) {
                let name_end = pos
                    + line[..colon]
                        .iter()
                        .rposition(|&b| b' ' != b && b'\t' != b)
                        .map_or(0, |ix| ix + 1);
                let value_start = pos
                    + colon
                    + 1
                    + line[colon + 1..]
                        .iter()
                        .position(|&b| b' ' != b && b'\t' != b)
                        .unwrap_or(line.len() - colon - 1);
                let value_end =
                    trim_newline(&data, pos, end).max(value_start);
                headers.push(HeaderSpan {
                    name: pos..name_end,
                    value: value_start..value_end,
                });
                continuable = true;
            } else {
                continuable = false;
            }

            pos = end;
        };

        Message {
            data,
            envelope_end,
            body_start,
            headers,
        }
    }

    /// The `From_` line, including its line ending.
    pub fn envelope(&self) -> &[u8] {
        &self.data[..self.envelope_end]
    }

    /// The delivery time recorded on the `From_` line, if it can be parsed.
    pub fn envelope_date(&self) -> Option<DateTime<FixedOffset>> {
        header::parse_envelope(self.envelope()).map(|(_, date)| date)
    }

    /// All header fields, in order, as `(name, value)` pairs.
    ///
    /// Values of folded fields retain their internal line breaks.
    pub fn headers(&self) -> impl Iterator<Item = (&[u8], &[u8])> + '_ {
        self.headers.iter().map(move |span| {
            (&self.data[span.name.clone()], &self.data[span.value.clone()])
        })
    }

    /// The values of every header named `name` (case-insensitively), in
    /// order of appearance.
    pub fn headers_named<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = &'a [u8]> + 'a {
        self.headers()
            .filter(move |&(n, _)| n.eq_ignore_ascii_case(name.as_bytes()))
            .map(|(_, v)| v)
    }

    /// The value of the first header named `name`, if any.
    pub fn header(&self, name: &str) -> Option<&[u8]> {
        self.headers()
            .find(|&(n, _)| n.eq_ignore_ascii_case(name.as_bytes()))
            .map(|(_, v)| v)
    }

    /// Interpret the first header named `name` as a date.
    ///
    /// Returns `Ok(None)` if there is no such header and
    /// `Err(MalformedHeader)` if there is one but it is not a date (this
    /// includes empty values).
    pub fn header_date(
        &self,
        name: &str,
    ) -> Result<Option<DateTime<FixedOffset>>, Error> {
        match self.header(name) {
            None => Ok(None),
            Some(value) => header::parse_datetime(value)
                .map(Some)
                .ok_or_else(|| Error::MalformedHeader(name.to_owned())),
        }
    }

    /// Everything after the blank line terminating the header block.
    pub fn body(&self) -> &[u8] {
        &self.data[self.body_start..]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn write_to(&self, mut w: impl Write) -> io::Result<()> {
        w.write_all(&self.data)
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let envelope = self.envelope();
        write!(
            f,
            "<Message {:?}, {} bytes>",
            String::from_utf8_lossy(
                &envelope[..trim_newline(envelope, 0, envelope.len())]
            ),
            self.data.len()
        )
    }
}

/// Return the index just past the `\n` ending the line at `start`, or the
/// end of `data` if the line is unterminated.
fn line_end(data: &[u8], start: usize) -> usize {
    memchr::memchr(b'\n', &data[start..])
        .map_or(data.len(), |ix| start + ix + 1)
}

fn trim_newline(data: &[u8], start: usize, mut end: usize) -> usize {
    if end > start && b'\n' == data[end - 1] {
        end -= 1;
    }
    if end > start && b'\r' == data[end - 1] {
        end -= 1;
    }
    end
}

/// Whether `line` is an empty line (bare LF or CRLF).
pub fn is_blank(line: &[u8]) -> bool {
    b"\n" == line || b"\r\n" == line
}
