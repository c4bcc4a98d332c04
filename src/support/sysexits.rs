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

//! Constants from `sysexits.h`
//!
//! Relevant for things that use the sendmail/procmail/etc conventions for
//! exit codes, such as cron jobs wrapping this program.
#![allow(dead_code)]

use std::io;

use super::error::Error;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Sysexit(pub i32);

pub const EX_OK: Sysexit = Sysexit(0);
pub const EX_USAGE: Sysexit = Sysexit(64);
pub const EX_DATAERR: Sysexit = Sysexit(65);
pub const EX_NOINPUT: Sysexit = Sysexit(66);
pub const EX_UNAVAILABLE: Sysexit = Sysexit(69);
pub const EX_SOFTWARE: Sysexit = Sysexit(70);
pub const EX_OSERR: Sysexit = Sysexit(71);
pub const EX_CANTCREAT: Sysexit = Sysexit(73);
pub const EX_IOERR: Sysexit = Sysexit(74);
pub const EX_TEMPFAIL: Sysexit = Sysexit(75);
pub const EX_NOPERM: Sysexit = Sysexit(77);
pub const EX_CONFIG: Sysexit = Sysexit(78);

impl Sysexit {
    pub fn exit(self) -> ! {
        std::process::exit(self.0)
    }
}

impl From<&Error> for Sysexit {
    fn from(e: &Error) -> Self {
        match *e {
            Error::LockUnavailable { .. } => EX_TEMPFAIL,
            Error::MalformedHeader(_)
            | Error::NotMbox(_)
            | Error::MailboxChanged(_) => EX_DATAERR,
            Error::ArchiveNameCollision(_) => EX_CANTCREAT,
            Error::BadConfig(_) => EX_CONFIG,
            Error::Io(ref e) if io::ErrorKind::NotFound == e.kind() => {
                EX_NOINPUT
            }
            Error::Io(ref e) if io::ErrorKind::PermissionDenied == e.kind() => {
                EX_NOPERM
            }
            Error::Io(_) => EX_IOERR,
            Error::Nix(_) => EX_OSERR,
        }
    }
}
