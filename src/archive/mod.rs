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

//! Selection of old messages and their removal from mailboxes into archives.

pub mod archive_file;
pub mod eligibility;
pub mod name;
pub mod transaction;
