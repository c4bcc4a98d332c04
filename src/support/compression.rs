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

//! Provides a façade around compression and decompression, as used for
//! archive files.

use std::io::{self, BufRead, Read, Write};

use flate2::{read::MultiGzDecoder, write::GzEncoder};

/// Extends the `Write` trait to have a `finish()` method.
pub trait FinishWrite: Write {
    /// Perform any finishing operations on this object.
    ///
    /// Nothing may be written after this call.
    fn finish(&mut self) -> io::Result<()>;
}

impl<W: Write> FinishWrite for GzEncoder<W> {
    fn finish(&mut self) -> io::Result<()> {
        self.try_finish()?;
        self.get_mut().flush()
    }
}

impl<W: FinishWrite + ?Sized> FinishWrite for Box<W> {
    fn finish(&mut self) -> io::Result<()> {
        (**self).finish()
    }
}

/// Passes data through unchanged.
struct Identity<W>(W);

impl<W: Write> Write for Identity<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl<W: Write> FinishWrite for Identity<W> {
    fn finish(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

/// The compression schemes an archive may be stored with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Compression {
    /// The archive is a plain mbox file.
    None,
    /// The archive is a gzip-compressed mbox file.
    Gzip,
}

impl Compression {
    /// The file name extension, including the dot, used for this scheme.
    pub fn extension(self) -> &'static str {
        match self {
            Compression::None => "",
            Compression::Gzip => ".gz",
        }
    }

    /// Wrap `reader` to decompress according to this scheme.
    ///
    /// Gzip streams consisting of several concatenated members (as produced
    /// by tools which append to gzip files) are decompressed in full.
    pub fn decompressor<'a>(
        self,
        reader: impl Read + 'a,
    ) -> Box<dyn BufRead + 'a> {
        match self {
            Compression::None => Box::new(io::BufReader::new(reader)),
            Compression::Gzip => {
                Box::new(io::BufReader::new(MultiGzDecoder::new(reader)))
            }
        }
    }

    /// Wrap `writer` to compress according to this scheme.
    pub fn compressor<'a>(
        self,
        writer: impl Write + 'a,
    ) -> Box<dyn FinishWrite + 'a> {
        match self {
            Compression::None => Box::new(Identity(writer)),
            Compression::Gzip => Box::new(GzEncoder::new(
                writer,
                flate2::Compression::default(),
            )),
        }
    }
}
