//-
// Copyright (c) 2023, 2024, Jason Lingle
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

//! Helper traits which make local-time conversions total, plus panicking
//! constructors (with 'x' appended to disambiguate) for tests, since Chrono
//! decided to make everything super noisy instead.

use chrono::prelude::*;

pub trait NaiveDateTimeX {
    /// Interpret this wall-clock time in the local time zone.
    ///
    /// Ambiguous times (the repeated hour when clocks go back) resolve to the
    /// earlier instant. Times which do not exist (the skipped hour when
    /// clocks go forward) are moved one hour later; should even that fail,
    /// the value is taken as UTC.
    fn resolve_local(&self) -> DateTime<Local>;
}

impl NaiveDateTimeX for NaiveDateTime {
    fn resolve_local(&self) -> DateTime<Local> {
        Local
            .from_local_datetime(self)
            .earliest()
            .or_else(|| {
                Local
                    .from_local_datetime(&(*self + chrono::Duration::hours(1)))
                    .earliest()
            })
            .unwrap_or_else(|| Local.from_utc_datetime(self))
    }
}

/// The instant at which `date` begins in the local time zone.
pub fn local_midnight(date: NaiveDate) -> DateTime<Local> {
    date.and_hms_opt(0, 0, 0)
        .unwrap_or_else(|| date.and_time(NaiveTime::MIN))
        .resolve_local()
}

pub trait FixedOffsetX {
    fn eastx(secs: i32) -> Self;
}

impl FixedOffsetX for FixedOffset {
    fn eastx(secs: i32) -> Self {
        Self::east_opt(secs).unwrap()
    }
}

pub trait OffsetX {
    type DateTime;

    fn ymd_hmsx(
        &self,
        y: i32,
        m: u32,
        d: u32,
        h: u32,
        min: u32,
        s: u32,
    ) -> Self::DateTime;
}

impl<T: chrono::TimeZone> OffsetX for T {
    type DateTime = DateTime<T>;

    fn ymd_hmsx(
        &self,
        y: i32,
        m: u32,
        d: u32,
        h: u32,
        min: u32,
        s: u32,
    ) -> Self::DateTime {
        self.with_ymd_and_hms(y, m, d, h, min, s).earliest().unwrap()
    }
}
