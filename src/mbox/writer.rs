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

use std::io::{self, BufRead, BufWriter, Write};
use std::path::Path;

use tempfile::NamedTempFile;

use super::message::Message;

/// Writes messages into an mbox stream.
///
/// Messages are written verbatim. The only bytes ever added are line
/// breaks in front of a message when the preceding output does not already
/// end with an empty line, since otherwise the new envelope line would not
/// be recognised as a message boundary. Messages read from a well-formed
/// mbox always end with an empty line (except possibly the last one), so
/// copying messages from one mbox to another reproduces them exactly.
#[derive(Debug)]
pub struct MboxWriter<W> {
    inner: W,
    written: u64,
    /// The last (up to) 3 bytes written
    last: Vec<u8>,
}

impl<W: Write> MboxWriter<W> {
    pub fn new(inner: W) -> Self {
        MboxWriter {
            inner,
            written: 0,
            last: Vec::with_capacity(6),
        }
    }

    /// Append `message`, separating it from any preceding content.
    pub fn append(&mut self, message: &Message) -> io::Result<()> {
        if !self.is_separated() {
            if self.last.ends_with(b"\n") {
                self.write_raw(b"\n")?;
            } else {
                self.write_raw(b"\n\n")?;
            }
        }
        self.write_raw(message.as_bytes())
    }

    /// Write `data` with no interpretation, e.g. to carry over the content
    /// of an existing mbox file.
    pub fn write_raw(&mut self, data: &[u8]) -> io::Result<()> {
        self.inner.write_all(data)?;

        self.written += data.len() as u64;
        self.last
            .extend_from_slice(&data[data.len().saturating_sub(3)..]);
        let excess = self.last.len().saturating_sub(3);
        self.last.drain(..excess);
        Ok(())
    }

    /// Copy everything from `reader` with `write_raw()`.
    pub fn copy_raw(&mut self, mut reader: impl BufRead) -> io::Result<u64> {
        let mut total = 0u64;
        loop {
            let buf = reader.fill_buf()?;
            if buf.is_empty() {
                break;
            }

            let n = buf.len();
            self.write_raw(buf)?;
            reader.consume(n);
            total += n as u64;
        }
        Ok(total)
    }

    /// The number of bytes written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    /// Whether an envelope line written now would start a new message.
    fn is_separated(&self) -> bool {
        let last = &self.last[..];
        0 == self.written
            || last.ends_with(b"\n\n")
            || last.ends_with(b"\n\r\n")
            // The entire output is a single empty line
            || (1 == self.written && b"\n" == last)
            || (2 == self.written && b"\r\n" == last)
    }
}

/// A replacement mailbox being staged in a temporary file.
///
/// The file lives in the directory of the mailbox it will replace, so that
/// it can be renamed into place atomically. It is deleted if dropped
/// without calling `finish()`.
#[derive(Debug)]
pub struct TempMbox {
    writer: MboxWriter<BufWriter<NamedTempFile>>,
}

impl TempMbox {
    pub fn new_in(dir: impl AsRef<Path>) -> io::Result<Self> {
        let tmp = tempfile::Builder::new()
            .prefix(".archivemail")
            .suffix(".tmp")
            .tempfile_in(dir)?;
        Ok(TempMbox {
            writer: MboxWriter::new(BufWriter::new(tmp)),
        })
    }

    pub fn append(&mut self, message: &Message) -> io::Result<()> {
        self.writer.append(message)
    }

    /// Flush all content and return the underlying file.
    pub fn finish(self) -> io::Result<NamedTempFile> {
        let mut buffered = self.writer.into_inner();
        buffered.flush()?;
        buffered.into_inner().map_err(io::Error::from)
    }
}

#[cfg(test)]
mod test {
    use std::fs;

    use proptest::prelude::*;

    use super::*;
    use crate::mbox::reader::MboxReader;

    fn message(s: &str) -> Message {
        Message::parse(s.as_bytes().to_vec())
    }

    fn write_all(messages: &[Message]) -> Vec<u8> {
        let mut writer = MboxWriter::new(Vec::new());
        for m in messages {
            writer.append(m).unwrap();
        }
        writer.into_inner()
    }

    #[test]
    fn separated_messages_are_written_verbatim() {
        let a = message("From a@b Fri Jul 28 16:11:36 2000\n\nfirst\n\n");
        let b = message("From c@d Sat Jul 29 16:11:36 2000\r\n\r\nsecond\r\n\r\n");
        let c = message("From e@f Sun Jul 30 16:11:36 2000\n\nthird");
        let out = write_all(&[a.clone(), b.clone(), c.clone()]);

        let mut expected = a.as_bytes().to_vec();
        expected.extend_from_slice(b.as_bytes());
        expected.extend_from_slice(c.as_bytes());
        assert_eq!(expected, out);
    }

    #[test]
    fn unseparated_messages_get_blank_line() {
        let unterminated = message("From a@b Fri Jul 28 16:11:36 2000\n\nno newline");
        let no_blank = message("From a@b Fri Jul 28 16:11:36 2000\n\nnewline\n");
        let next = message("From c@d Sat Jul 29 16:11:36 2000\n\nnext\n\n");

        assert_eq!(
            b"From a@b Fri Jul 28 16:11:36 2000\n\nno newline\n\n\
              From c@d Sat Jul 29 16:11:36 2000\n\nnext\n\n"
                .to_vec(),
            write_all(&[unterminated, next.clone()])
        );
        assert_eq!(
            b"From a@b Fri Jul 28 16:11:36 2000\n\nnewline\n\n\
              From c@d Sat Jul 29 16:11:36 2000\n\nnext\n\n"
                .to_vec(),
            write_all(&[no_blank, next])
        );
    }

    #[test]
    fn raw_content_is_taken_into_account() {
        let next = message("From c@d Sat Jul 29 16:11:36 2000\n\nnext\n\n");

        let mut writer = MboxWriter::new(Vec::new());
        writer
            .copy_raw(&b"From a@b Fri Jul 28 16:11:36 2000\n\nold\n"[..])
            .unwrap();
        writer.append(&next).unwrap();
        assert_eq!(
            b"From a@b Fri Jul 28 16:11:36 2000\n\nold\n\n\
              From c@d Sat Jul 29 16:11:36 2000\n\nnext\n\n"
                .to_vec(),
            writer.into_inner()
        );

        // Chunk boundaries between the two newlines don't matter
        let mut writer = MboxWriter::new(Vec::new());
        writer.write_raw(b"From a@b Fri Jul 28 16:11:36 2000\n\nold\n").unwrap();
        writer.write_raw(b"\n").unwrap();
        writer.append(&next).unwrap();
        assert_eq!(
            b"From a@b Fri Jul 28 16:11:36 2000\n\nold\n\n".len() as u64
                + next.len() as u64,
            writer.written()
        );
    }

    #[test]
    fn temp_mbox_is_created_in_place() {
        let root = tempfile::TempDir::new().unwrap();
        let mut tmp = TempMbox::new_in(root.path()).unwrap();
        tmp.append(&message("From a@b Fri Jul 28 16:11:36 2000\n\nhi\n\n"))
            .unwrap();
        let file = tmp.finish().unwrap();

        assert_eq!(root.path(), file.path().parent().unwrap());
        assert_eq!(
            b"From a@b Fri Jul 28 16:11:36 2000\n\nhi\n\n".to_vec(),
            fs::read(file.path()).unwrap()
        );
    }

    #[test]
    fn dropped_temp_mbox_is_removed() {
        let root = tempfile::TempDir::new().unwrap();
        let tmp = TempMbox::new_in(root.path()).unwrap();
        drop(tmp);
        assert_eq!(0, fs::read_dir(root.path()).unwrap().count());
    }

    /// Generates a message ending with an empty line, whose body may contain
    /// escaped and unescaped `From ` lines that don't follow empty lines.
    fn arb_message() -> impl Strategy<Value = String> {
        (
            "[a-z]{1,8}@[a-z]{1,8}",
            prop::collection::vec("[A-Za-z-]{1,12}: [ -~]{0,20}", 0..4),
            prop::collection::vec(
                prop_oneof!["[ -~]{0,30}", "From [ -~]{0,20}", ">From [ -~]{0,10}"],
                0..8,
            ),
        )
            .prop_map(|(sender, headers, body)| {
                let mut s =
                    format!("From {} Fri Jul 28 16:11:36 2000\n", sender);
                for h in headers {
                    s.push_str(&h);
                    s.push('\n');
                }
                s.push('\n');

                let mut after_blank = true;
                for line in body {
                    if after_blank && line.starts_with("From ") {
                        s.push_str("text\n");
                    }
                    after_blank = line.is_empty();
                    s.push_str(&line);
                    s.push('\n');
                }
                s.push('\n');
                s
            })
    }

    proptest! {
        #[test]
        fn mbox_round_trip(messages in prop::collection::vec(arb_message(), 0..6)) {
            let parsed = messages
                .iter()
                .map(|m| message(m))
                .collect::<Vec<_>>();
            let out = write_all(&parsed);
            prop_assert_eq!(messages.concat().into_bytes(), out.clone());

            let reread = MboxReader::new(&out[..], "test")
                .collect::<Result<Vec<_>, _>>()
                .unwrap();
            prop_assert_eq!(messages.len(), reread.len());
            for (original, reread) in messages.iter().zip(&reread) {
                prop_assert_eq!(original.as_bytes(), reread.as_bytes());
            }
        }
    }
}
