//! `date` filter: instant parsing and format tokens in the
//! `d/m/Y H:i:s` style.

use chrono::{
    DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc,
};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::value::{parse_number, Value};

pub const DEFAULT_FORMAT: &str = "F j, Y H:i";

const MONTHS: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

const WEEKDAYS: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

/// Format `input` as a date.
///
/// Numbers (and numeric strings) are Unix timestamps in milliseconds,
/// other strings are parsed in a handful of common layouts, and `null`
/// means now. Strings without an offset are read in `config.timezone`;
/// output is in `timezone` if given, else `config.timezone`.
pub fn format_date(
    input: &Value,
    format: Option<&str>,
    timezone: Option<&str>,
    config: &Config,
) -> Result<String> {
    let zone = match timezone {
        Some(tz) => parse_timezone(tz)
            .ok_or_else(|| Error::eval(format!("date: unrecognized timezone `{tz}`")))?,
        None => config.timezone,
    };

    let instant = match input {
        Value::Null => Utc::now(),
        Value::Number(ms) => from_millis(*ms)?,
        Value::String(s) => match parse_number(s) {
            Some(ms) => from_millis(ms)?,
            None => parse_date(s, config.timezone)
                .ok_or_else(|| Error::eval(format!("date: unrecognized date `{s}`")))?,
        },
        other => {
            return Err(Error::eval(format!(
                "date expects a timestamp or date string, got {}",
                other.type_name()
            )))
        }
    };

    Ok(render(&instant.with_timezone(&zone), format.unwrap_or(DEFAULT_FORMAT)))
}

fn from_millis(ms: f64) -> Result<DateTime<Utc>> {
    if !ms.is_finite() {
        return Err(Error::eval("date: timestamp is not finite"));
    }
    DateTime::from_timestamp_millis(ms.trunc() as i64)
        .ok_or_else(|| Error::eval(format!("date: timestamp {ms} out of range")))
}

fn parse_date(s: &str, zone: FixedOffset) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("now") {
        return Some(Utc::now());
    }

    let zoned = DateTime::parse_from_rfc3339(s)
        .or_else(|_| DateTime::parse_from_rfc2822(s))
        .or_else(|_| DateTime::parse_from_str(s, "%a %b %d %H:%M:%S %z %Y"))
        .or_else(|_| DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S %z"));
    if let Ok(dt) = zoned {
        return Some(dt.with_timezone(&Utc));
    }

    // Layouts without an offset are read as local time in `zone`.
    let naive = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })?;
    zone.from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

/// `UTC`, `Z`, `GMT`, or a signed offset: `+02`, `-0430`, `+05:30`.
pub fn parse_timezone(tz: &str) -> Option<FixedOffset> {
    let tz = tz.trim();
    if matches!(tz.to_ascii_uppercase().as_str(), "UTC" | "Z" | "GMT") {
        return FixedOffset::east_opt(0);
    }

    let (sign, rest) = match tz.as_bytes().first()? {
        b'+' => (1, &tz[1..]),
        b'-' => (-1, &tz[1..]),
        _ => return None,
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let (hours, minutes) = match digits.len() {
        2 => (digits.parse::<i32>().ok()?, 0),
        4 => (digits[..2].parse::<i32>().ok()?, digits[2..].parse::<i32>().ok()?),
        _ => return None,
    };
    if minutes >= 60 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

fn offset(dt: &DateTime<FixedOffset>, colon: bool) -> String {
    let secs = dt.offset().local_minus_utc();
    let sign = if secs < 0 { '-' } else { '+' };
    let (h, m) = (secs.abs() / 3600, secs.abs() % 3600 / 60);
    if colon {
        format!("{sign}{h:02}:{m:02}")
    } else {
        format!("{sign}{h:02}{m:02}")
    }
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (y, m) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(y, m, 1)
        .and_then(|d| d.pred_opt())
        .map_or(31, |d| d.day())
}

fn ordinal_suffix(day: u32) -> &'static str {
    match (day % 10, day % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    }
}

fn render(dt: &DateTime<FixedOffset>, format: &str) -> String {
    let mut out = String::new();
    let mut chars = format.chars();
    let hour12 = match dt.hour() % 12 {
        0 => 12,
        h => h,
    };
    let month_name = MONTHS[dt.month0() as usize];
    let weekday_name = WEEKDAYS[dt.weekday().num_days_from_monday() as usize];

    while let Some(c) = chars.next() {
        match c {
            // Day
            'd' => out.push_str(&format!("{:02}", dt.day())),
            'D' => out.push_str(&weekday_name[..3]),
            'j' => out.push_str(&dt.day().to_string()),
            'l' => out.push_str(weekday_name),
            'S' => out.push_str(ordinal_suffix(dt.day())),
            'N' => out.push_str(&dt.weekday().number_from_monday().to_string()),
            'w' => out.push_str(&dt.weekday().num_days_from_sunday().to_string()),
            'z' => out.push_str(&dt.ordinal0().to_string()),
            // Week
            'W' => out.push_str(&format!("{:02}", dt.iso_week().week())),
            // Month
            'F' => out.push_str(month_name),
            'M' => out.push_str(&month_name[..3]),
            'm' => out.push_str(&format!("{:02}", dt.month())),
            'n' => out.push_str(&dt.month().to_string()),
            't' => out.push_str(&days_in_month(dt.year(), dt.month()).to_string()),
            // Year
            'L' => out.push(if NaiveDate::from_ymd_opt(dt.year(), 2, 29).is_some() { '1' } else { '0' }),
            'Y' => out.push_str(&dt.year().to_string()),
            'y' => out.push_str(&format!("{:02}", dt.year().rem_euclid(100))),
            // Time
            'a' => out.push_str(if dt.hour() < 12 { "am" } else { "pm" }),
            'A' => out.push_str(if dt.hour() < 12 { "AM" } else { "PM" }),
            'g' => out.push_str(&hour12.to_string()),
            'G' => out.push_str(&dt.hour().to_string()),
            'h' => out.push_str(&format!("{hour12:02}")),
            'H' => out.push_str(&format!("{:02}", dt.hour())),
            'i' => out.push_str(&format!("{:02}", dt.minute())),
            's' => out.push_str(&format!("{:02}", dt.second())),
            'u' => out.push_str(&format!("{:06}", dt.timestamp_subsec_micros())),
            'v' => out.push_str(&format!("{:03}", dt.timestamp_subsec_millis())),
            // Zone
            'e' | 'P' => out.push_str(&offset(dt, true)),
            'O' => out.push_str(&offset(dt, false)),
            'T' => {
                if dt.offset().local_minus_utc() == 0 {
                    out.push_str("UTC");
                } else {
                    out.push_str(&offset(dt, true));
                }
            }
            // Full date/time
            'U' => out.push_str(&dt.timestamp().to_string()),
            'c' => out.push_str(&render(dt, "Y-m-d\\TH:i:sP")),
            'r' => out.push_str(&render(dt, "D, d M Y H:i:s O")),
            '\\' => {
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            }
            other => out.push(other),
        }
    }
    out
}
