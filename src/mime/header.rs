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

//! Utilities for parsing the dates found in message headers and mbox
//! envelope lines.
//!
//! Two families of syntax are understood:
//!
//! - RFC 2822 3.3 date-time, including the obsolete forms (optional day of
//!   week, two-digit years, named zones, comments anywhere).
//!
//! - The C `asctime()` format (`Fri Jul 28 16:11:36 2000`) used on mbox
//!   `From_` lines and by some broken agents in `Date` headers, optionally
//!   with a numeric zone before or after the year.
//!
//! Dates without any zone information are taken to be in local time.

use chrono::prelude::*;
use memchr::memchr_iter;
use nom::{
    branch::alt,
    bytes::complete::{is_a, is_not, tag, take, take_while1, take_while_m_n},
    character::{is_alphabetic, is_digit},
    combinator::{map, map_opt, opt},
    multi::many0_count,
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};

use crate::support::chronox::NaiveDateTimeX;

/// A wall-clock time and the zone it was written in, in seconds east of
/// UTC, if known.
type ZonedTime = (NaiveDateTime, Option<i32>);

// RFC 2822 3.2.3 "Folding white space".
// Unfolding is performed elsewhere, so line endings are just whitespace.
fn fws(i: &[u8]) -> IResult<&[u8], ()> {
    map(is_a(" \t\r\n"), |_| ())(i)
}

// RFC 2822 3.2.3 "Comment". Note it is recursive.
fn comment(i: &[u8]) -> IResult<&[u8], ()> {
    map(
        delimited(
            tag("("),
            many0_count(alt((
                map(is_not("()\\"), |_| ()),
                map(preceded(tag("\\"), take(1usize)), |_| ()),
                comment,
            ))),
            tag(")"),
        ),
        |_| (),
    )(i)
}

// RFC 2822 3.2.3 "Comment or folding white space", which is always optional
// in the obsolete date syntax.
fn cfws(i: &[u8]) -> IResult<&[u8], ()> {
    map(many0_count(alt((fws, comment))), |_| ())(i)
}

fn parse_u32(digits: &[u8]) -> u32 {
    digits
        .iter()
        .fold(0, |accum, &d| accum * 10 + u32::from(d - b'0'))
}

fn one_or_two_digit(i: &[u8]) -> IResult<&[u8], u32> {
    map(take_while_m_n(1, 2, is_digit), parse_u32)(i)
}

fn two_digit(i: &[u8]) -> IResult<&[u8], u32> {
    map(take_while_m_n(2, 2, is_digit), parse_u32)(i)
}

fn year(i: &[u8]) -> IResult<&[u8], i32> {
    map(take_while_m_n(2, 4, is_digit), |s: &[u8]| {
        // At most 4 digits, so this can't overflow
        let y = parse_u32(s) as i32;
        // Y2K compliance workarounds described by RFC 2822 4.3
        if s.len() == 2 && y < 50 {
            y + 2000
        } else if s.len() < 4 {
            y + 1900
        } else {
            y
        }
    })(i)
}

static MONTH_NAMES: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

// Three-letter abbreviations per RFC 2822, but full names are tolerated.
fn month(i: &[u8]) -> IResult<&[u8], u32> {
    map_opt(take_while1(is_alphabetic), |name: &[u8]| {
        if name.len() < 3 {
            return None;
        }

        MONTH_NAMES
            .iter()
            .position(|full| {
                let full = full.as_bytes();
                name.len() <= full.len()
                    && full[..3].eq_ignore_ascii_case(&name[..3])
                    && full[..name.len()].eq_ignore_ascii_case(name)
            })
            .map(|ix| ix as u32 + 1)
    })(i)
}

fn day_of_week(i: &[u8]) -> IResult<&[u8], ()> {
    map(
        tuple((take_while1(is_alphabetic), cfws, opt(tag(",")), cfws)),
        |_| (),
    )(i)
}

// Seconds are optional in the obsolete syntax.
fn time_of_day(i: &[u8]) -> IResult<&[u8], (u32, u32, u32)> {
    tuple((
        one_or_two_digit,
        preceded(tag(":"), two_digit),
        map(opt(preceded(tag(":"), two_digit)), |s| s.unwrap_or(0)),
    ))(i)
}

fn numeric_zone(i: &[u8]) -> IResult<&[u8], i32> {
    map(
        pair(alt((tag("+"), tag("-"))), pair(two_digit, two_digit)),
        |(sign, (h, m))| {
            let secs = (h * 3600 + m * 60) as i32;
            if b"-" == sign {
                -secs
            } else {
                secs
            }
        },
    )(i)
}

fn named_zone(i: &[u8]) -> IResult<&[u8], i32> {
    map_opt(take_while1(is_alphabetic), |name: &[u8]| {
        let hours = match name.to_ascii_lowercase().as_slice() {
            b"ut" | b"utc" | b"gmt" | b"z" => 0,
            // US time zones
            b"edt" => -4,
            b"est" | b"cdt" => -5,
            b"cst" | b"mdt" => -6,
            b"mst" | b"pdt" => -7,
            b"pst" => -8,
            // RFC 2822 indicates that the military time zones were so poorly
            // defined that they must be treated as 0 unless additional
            // information is available.
            [_] => 0,
            _ => return None,
        };
        Some(hours * 3600)
    })(i)
}

fn zone(i: &[u8]) -> IResult<&[u8], i32> {
    alt((numeric_zone, named_zone))(i)
}

// RFC 2822 3.3 date-time, with the obsolete forms.
fn rfc2822_date_time(i: &[u8]) -> IResult<&[u8], ZonedTime> {
    map_opt(
        tuple((
            cfws,
            opt(day_of_week),
            terminated(one_or_two_digit, cfws),
            terminated(month, cfws),
            terminated(year, cfws),
            terminated(time_of_day, cfws),
            // Unrecognised zones must be treated as UTC
            opt(alt((zone, map(take_while1(is_alphabetic), |_| 0)))),
        )),
        |(_, _, d, m, y, (h, min, s), zone)| {
            NaiveDate::from_ymd_opt(y, m, d)
                .and_then(|date| date.and_hms_opt(h, min, s))
                .map(|datetime| (datetime, zone))
        },
    )(i)
}

// asctime() format, as found on mbox From_ lines.
fn asctime_date_time(i: &[u8]) -> IResult<&[u8], ZonedTime> {
    map_opt(
        tuple((
            cfws,
            terminated(take_while1(is_alphabetic), cfws),
            terminated(month, cfws),
            terminated(one_or_two_digit, cfws),
            terminated(time_of_day, cfws),
            opt(terminated(zone, cfws)),
            year,
            cfws,
            opt(numeric_zone),
        )),
        |(_, _, m, d, (h, min, s), zone_before, y, _, zone_after)| {
            NaiveDate::from_ymd_opt(y, m, d)
                .and_then(|date| date.and_hms_opt(h, min, s))
                .map(|datetime| (datetime, zone_before.or(zone_after)))
        },
    )(i)
}

fn resolve((datetime, zone): ZonedTime) -> Option<DateTime<FixedOffset>> {
    match zone {
        Some(secs) => FixedOffset::east_opt(secs)
            .and_then(|offset| offset.from_local_datetime(&datetime).single()),
        None => Some(datetime.resolve_local().into()),
    }
}

/// Parse the value of a date-bearing header (`Date`, `Delivery-date`,
/// `Resent-Date`).
///
/// Trailing content after a complete date is ignored.
pub fn parse_datetime(value: &[u8]) -> Option<DateTime<FixedOffset>> {
    alt((rfc2822_date_time, asctime_date_time))(value)
        .ok()
        .and_then(|(_, zoned)| resolve(zoned))
}

/// Parse an mbox `From_` envelope line (with or without its line ending)
/// into the sender and the delivery time.
///
/// The sender normally contains no whitespace, but quoted local parts may,
/// so each whitespace-delimited split is tried until the remainder parses
/// as a date.
pub fn parse_envelope(line: &[u8]) -> Option<(&[u8], DateTime<FixedOffset>)> {
    let rest = line.strip_prefix(b"From ")?;
    let start = rest.iter().position(|&b| b' ' != b && b'\t' != b)?;
    let rest = &rest[start..];

    memchr_iter(b' ', rest)
        .filter(|&split| split > 0)
        .filter_map(|split| {
            asctime_date_time(&rest[split..])
                .or_else(|_| rfc2822_date_time(&rest[split..]))
                .ok()
                .and_then(|(_, zoned)| resolve(zoned))
                .map(|date| (&rest[..split], date))
        })
        .next()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::support::chronox::*;

    fn parse(s: &str) -> Option<DateTime<FixedOffset>> {
        parse_datetime(s.as_bytes())
    }

    #[test]
    fn parse_rfc2822() {
        assert_eq!(
            Some(FixedOffset::eastx(36000).ymd_hmsx(2000, 7, 28, 16, 11, 36)),
            parse("Fri, 28 Jul 2000 16:11:36 +1000")
        );
        assert_eq!(
            Some(FixedOffset::eastx(-5 * 3600).ymd_hmsx(2020, 3, 1, 8, 0, 0)),
            parse("1 Mar 2020 08:00:00 -0500")
        );
        assert_eq!(
            Some(FixedOffset::eastx(-7 * 3600).ymd_hmsx(2019, 12, 31, 23, 59, 0)),
            parse("  Tue (of course), 31 Dec 2019 23:59 PDT (Pacific)")
        );
        assert_eq!(
            Some(Utc.ymd_hmsx(1999, 1, 1, 0, 0, 0).into()),
            parse("Fri, 1 Jan 99 00:00:00 GMT")
        );
        assert_eq!(
            Some(Utc.ymd_hmsx(2003, 2, 3, 4, 5, 6).into()),
            parse("Mon, 3 Feb 03 04:05:06 CEST")
        );
        assert_eq!(
            Some(Utc.ymd_hmsx(2000, 7, 28, 16, 11, 36).into()),
            parse("Fri, 28 July 2000 16:11:36 +0000")
        );
    }

    #[test]
    fn parse_rfc2822_without_zone_is_local() {
        assert_eq!(
            Some(Local.ymd_hmsx(2000, 7, 28, 16, 11, 36)),
            parse("Fri, 28 Jul 2000 16:11:36").map(|d| d.with_timezone(&Local))
        );
    }

    #[test]
    fn parse_asctime() {
        assert_eq!(
            Some(Local.ymd_hmsx(2000, 7, 28, 16, 11, 36)),
            parse("Fri Jul 28 16:11:36 2000").map(|d| d.with_timezone(&Local))
        );
        assert_eq!(
            Some(Local.ymd_hmsx(2000, 7, 8, 6, 1, 3)),
            parse("Sat Jul  8 06:01:03 2000").map(|d| d.with_timezone(&Local))
        );
        assert_eq!(
            Some(FixedOffset::eastx(7200).ymd_hmsx(2000, 7, 28, 16, 11, 36)),
            parse("Fri Jul 28 16:11:36 +0200 2000")
        );
        assert_eq!(
            Some(FixedOffset::eastx(-3600).ymd_hmsx(2000, 7, 28, 16, 11, 36)),
            parse("Fri Jul 28 16:11:36 2000 -0100")
        );
    }

    #[test]
    fn garbage_does_not_parse() {
        assert_eq!(None, parse(""));
        assert_eq!(None, parse("   "));
        assert_eq!(None, parse("yesterday"));
        assert_eq!(
            None,
            parse("Friskhdfkjkh, 28 Jul 2002 1line noise6:11:36 +1000")
        );
        assert_eq!(
            None,
            parse("Frcorruptioni, 28 Jul 20line noise00 16:6 +1000")
        );
        assert_eq!(None, parse("Wed, 31 Feb 2001 10:00:00 +0000"));
        assert_eq!(None, parse("Wed, 12 Foo 2001 10:00:00 +0000"));
        assert_eq!(None, parse("Wed, 12 Ja 2001 10:00:00 +0000"));
    }

    #[test]
    fn parse_envelopes() {
        let (sender, date) =
            parse_envelope(b"From sender@dummy.domain Fri Jul 28 16:11:36 2000\n")
                .unwrap();
        assert_eq!(b"sender@dummy.domain", sender);
        assert_eq!(
            Local.ymd_hmsx(2000, 7, 28, 16, 11, 36),
            date.with_timezone(&Local)
        );

        let (sender, date) = parse_envelope(
            b"From \"odd sender\"@example.com  Mon Jan  3 01:02:03 2005\r\n",
        )
        .unwrap();
        assert_eq!(b"\"odd sender\"@example.com", sender);
        assert_eq!(
            Local.ymd_hmsx(2005, 1, 3, 1, 2, 3),
            date.with_timezone(&Local)
        );

        let (_, date) = parse_envelope(
            b"From MAILER-DAEMON Fri, 28 Jul 2000 16:11:36 +1000\n",
        )
        .unwrap();
        assert_eq!(
            FixedOffset::eastx(36000).ymd_hmsx(2000, 7, 28, 16, 11, 36),
            date
        );

        assert_eq!(None, parse_envelope(b"From is on this line\n"));
        assert_eq!(None, parse_envelope(b"From: someone@example.com\n"));
        assert_eq!(None, parse_envelope(b"Subject: Fri Jul 28 16:11:36 2000\n"));
    }
}
