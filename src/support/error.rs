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

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Unable to lock {}: {}", .path.display(), .reason)]
    LockUnavailable { path: PathBuf, reason: String },
    #[error("Unparsable {0} header")]
    MalformedHeader(String),
    #[error("{} is not an mbox mailbox", .0.display())]
    NotMbox(PathBuf),
    #[error("{} was modified by another process during archival", .0.display())]
    MailboxChanged(PathBuf),
    #[error("There is already a file named {}", .0.display())]
    ArchiveNameCollision(PathBuf),
    #[error("Bad configuration: {0}")]
    BadConfig(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Nix(#[from] nix::Error),
}
