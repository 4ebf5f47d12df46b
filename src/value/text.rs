// Canonical text forms
// Culture-independent encodings used for XML values and for parsing text input

use crate::config::DateTimeMode;
use crate::storage::table::ColumnMeta;
use time::format_description::FormatItem;
use time::macros::format_description;
use time::{Date, Duration, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};

const DATE_TIME_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
const DATE_TIME_FRACTION_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]");
const DATE_ONLY_FORMAT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");
const OFFSET_FORMAT: &[FormatItem<'static>] =
    format_description!("[offset_hour sign:mandatory]:[offset_minute]");
const OFFSET_SECONDS_FORMAT: &[FormatItem<'static>] =
    format_description!("[offset_hour sign:mandatory]:[offset_minute]:[offset_second]");

const NANOS_PER_SECOND: i128 = 1_000_000_000;

pub(crate) fn format_f64(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v == f64::INFINITY {
        "INF".to_string()
    } else if v == f64::NEG_INFINITY {
        "-INF".to_string()
    } else {
        v.to_string()
    }
}

pub(crate) fn parse_f64(text: &str) -> Option<f64> {
    match text.trim() {
        "INF" => Some(f64::INFINITY),
        "-INF" => Some(f64::NEG_INFINITY),
        "NaN" => Some(f64::NAN),
        t => t.parse().ok(),
    }
}

pub(crate) fn format_f32(v: f32) -> String {
    if v.is_finite() {
        v.to_string()
    } else {
        format_f64(f64::from(v))
    }
}

pub(crate) fn parse_f32(text: &str) -> Option<f32> {
    match text.trim() {
        "INF" => Some(f32::INFINITY),
        "-INF" => Some(f32::NEG_INFINITY),
        "NaN" => Some(f32::NAN),
        t => t.parse().ok(),
    }
}

/// Shifts an offset-bearing instant into the wall clock the column's
/// date-time mode asks for.
pub(crate) fn normalize_date_time(value: OffsetDateTime, column: &ColumnMeta) -> PrimitiveDateTime {
    let shifted = match column.date_time_mode() {
        DateTimeMode::Utc => value.to_offset(UtcOffset::UTC),
        DateTimeMode::Local | DateTimeMode::UnspecifiedLocal => {
            value.to_offset(column.local_offset())
        }
        DateTimeMode::Unspecified => value,
    };
    PrimitiveDateTime::new(shifted.date(), shifted.time())
}

/// Attaches the offset implied by the column's date-time mode to a wall-clock value.
pub(crate) fn attach_offset(value: PrimitiveDateTime, column: &ColumnMeta) -> OffsetDateTime {
    match column.date_time_mode() {
        DateTimeMode::Utc => value.assume_utc(),
        _ => value.assume_offset(column.local_offset()),
    }
}

fn format_wall_clock(value: PrimitiveDateTime) -> String {
    let format = if value.nanosecond() == 0 {
        DATE_TIME_FORMAT
    } else {
        DATE_TIME_FRACTION_FORMAT
    };
    value
        .format(format)
        .unwrap_or_else(|_| value.to_string())
}

/// `+hh:mm`, or `+hh:mm:ss` when the offset has a seconds part.
fn format_offset(offset: UtcOffset) -> String {
    let format = if offset.seconds_past_minute() == 0 {
        OFFSET_FORMAT
    } else {
        OFFSET_SECONDS_FORMAT
    };
    offset.format(format).unwrap_or_default()
}

/// ISO-8601 text; UTC columns get a `Z` suffix and local columns the local offset.
pub(crate) fn format_date_time(value: PrimitiveDateTime, column: &ColumnMeta) -> String {
    let body = format_wall_clock(value);
    match column.date_time_mode() {
        DateTimeMode::Utc => format!("{}Z", body),
        DateTimeMode::Local => format!("{}{}", body, format_offset(column.local_offset())),
        DateTimeMode::Unspecified | DateTimeMode::UnspecifiedLocal => body,
    }
}

fn parse_wall_clock(text: &str) -> Option<PrimitiveDateTime> {
    PrimitiveDateTime::parse(text, DATE_TIME_FORMAT)
        .or_else(|_| PrimitiveDateTime::parse(text, DATE_TIME_FRACTION_FORMAT))
        .ok()
        .or_else(|| {
            Date::parse(text, DATE_ONLY_FORMAT)
                .ok()
                .map(|date| PrimitiveDateTime::new(date, Time::MIDNIGHT))
        })
}

fn split_offset(text: &str) -> Option<(&str, UtcOffset)> {
    if let Some(body) = text.strip_suffix('Z') {
        return Some((body, UtcOffset::UTC));
    }
    for (width, format) in [(9, OFFSET_SECONDS_FORMAT), (6, OFFSET_FORMAT)] {
        if text.len() <= width || !text.is_char_boundary(text.len() - width) {
            continue;
        }
        let (body, suffix) = text.split_at(text.len() - width);
        if !suffix.starts_with(['+', '-']) || !body.ends_with(|c: char| c.is_ascii_digit()) {
            continue;
        }
        if let Ok(offset) = UtcOffset::parse(suffix, format) {
            return Some((body, offset));
        }
    }
    None
}

/// Parses ISO-8601 date-time text, with or without an offset suffix.
pub(crate) fn parse_date_time(text: &str, column: &ColumnMeta) -> Option<PrimitiveDateTime> {
    let text = text.trim();
    match split_offset(text) {
        Some((body, offset)) => {
            let wall = parse_wall_clock(body)?;
            Some(normalize_date_time(wall.assume_offset(offset), column))
        }
        None => parse_wall_clock(text),
    }
}

pub(crate) fn format_date_time_offset(value: OffsetDateTime) -> String {
    let wall = PrimitiveDateTime::new(value.date(), value.time());
    format!("{}{}", format_wall_clock(wall), format_offset(value.offset()))
}

pub(crate) fn parse_date_time_offset(text: &str) -> Option<OffsetDateTime> {
    let (body, offset) = split_offset(text.trim())?;
    parse_wall_clock(body).map(|wall| wall.assume_offset(offset))
}

/// ISO-8601 duration text such as `-P1DT2H3M4.5S`.
pub(crate) fn format_duration(value: Duration) -> String {
    let nanos = value.whole_nanoseconds();
    let sign = if nanos < 0 { "-" } else { "" };
    let nanos = nanos.unsigned_abs();
    let total_seconds = nanos / NANOS_PER_SECOND as u128;
    let fraction = nanos % NANOS_PER_SECOND as u128;
    let days = total_seconds / 86_400;
    let hours = total_seconds % 86_400 / 3_600;
    let minutes = total_seconds % 3_600 / 60;
    let seconds = total_seconds % 60;

    let mut out = format!("{}P", sign);
    if days > 0 {
        out.push_str(&format!("{}D", days));
    }
    out.push('T');
    if hours > 0 {
        out.push_str(&format!("{}H", hours));
    }
    if minutes > 0 {
        out.push_str(&format!("{}M", minutes));
    }
    if fraction > 0 {
        let digits = format!("{:09}", fraction);
        out.push_str(&format!("{}.{}S", seconds, digits.trim_end_matches('0')));
    } else {
        out.push_str(&format!("{}S", seconds));
    }
    out
}

pub(crate) fn parse_duration(text: &str) -> Option<Duration> {
    let text = text.trim();
    let (negative, text) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let mut rest = text.strip_prefix('P')?;
    let mut nanos: i128 = 0;
    let mut in_time = false;
    let mut seen_unit = false;

    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix('T') {
            if in_time {
                return None;
            }
            in_time = true;
            rest = after;
            continue;
        }
        let end = rest.find(|c: char| !(c.is_ascii_digit() || c == '.'))?;
        let (number, tail) = rest.split_at(end);
        let mut tail_chars = tail.chars();
        let unit = tail_chars.next()?;
        rest = tail_chars.as_str();

        let (whole, fraction) = match number.split_once('.') {
            Some((whole, fraction)) if unit == 'S' && in_time => (whole, fraction),
            Some(_) => return None,
            None => (number, ""),
        };
        let whole: i128 = whole.parse().ok()?;
        let scale = match (unit, in_time) {
            ('D', false) => 86_400,
            ('H', true) => 3_600,
            ('M', true) => 60,
            ('S', true) => 1,
            _ => return None,
        };
        nanos = nanos.checked_add(whole.checked_mul(scale * NANOS_PER_SECOND)?)?;
        if !fraction.is_empty() {
            if fraction.len() > 9 || !fraction.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            let padded = format!("{:0<9}", fraction);
            nanos += padded.parse::<i128>().ok()?;
        }
        seen_unit = true;
    }
    if !seen_unit {
        return None;
    }
    if negative {
        nanos = -nanos;
    }
    duration_from_nanos(nanos)
}

pub(crate) fn duration_from_nanos(nanos: i128) -> Option<Duration> {
    let seconds = i64::try_from(nanos / NANOS_PER_SECOND).ok()?;
    let subsec = (nanos % NANOS_PER_SECOND) as i32;
    Some(Duration::new(seconds, subsec))
}

const BASE64_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

pub(crate) fn base64_encode(data: &[u8]) -> String {
    let mut result = String::with_capacity(data.len().div_ceil(3) * 4);

    for chunk in data.chunks(3) {
        let b0 = chunk[0] as usize;
        let b1 = chunk.get(1).copied().unwrap_or(0) as usize;
        let b2 = chunk.get(2).copied().unwrap_or(0) as usize;

        result.push(BASE64_ALPHABET[b0 >> 2] as char);
        result.push(BASE64_ALPHABET[((b0 & 0x03) << 4) | (b1 >> 4)] as char);

        if chunk.len() > 1 {
            result.push(BASE64_ALPHABET[((b1 & 0x0f) << 2) | (b2 >> 6)] as char);
        } else {
            result.push('=');
        }

        if chunk.len() > 2 {
            result.push(BASE64_ALPHABET[b2 & 0x3f] as char);
        } else {
            result.push('=');
        }
    }

    result
}

pub(crate) fn base64_decode(text: &str) -> Option<Vec<u8>> {
    let text: Vec<u8> = text.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
    if text.len() % 4 != 0 {
        return None;
    }
    let sextet = |b: u8| BASE64_ALPHABET.iter().position(|&a| a == b).map(|p| p as u32);
    let mut out = Vec::with_capacity(text.len() / 4 * 3);

    for (index, chunk) in text.chunks(4).enumerate() {
        let last = index == text.len() / 4 - 1;
        let padding = chunk.iter().rev().take_while(|&&b| b == b'=').count();
        if padding > 2 || (padding > 0 && !last) {
            return None;
        }
        let mut word = 0u32;
        for &b in &chunk[..4 - padding] {
            word = (word << 6) | sextet(b)?;
        }
        word <<= 6 * padding as u32;
        let bytes = word.to_be_bytes();
        out.extend_from_slice(&bytes[1..4 - padding]);
    }
    Some(out)
}
