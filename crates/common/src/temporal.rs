//! # Temporal Literals
//!
//! Parses the two literal grammars carried by `duration` and `timestamp`
//! defaults into protobuf-normalized values.
//!
//! ## Duration grammar
//! `[N y][N w][N d][N h][N m][N s][N ms]`: every unit optional but at least one
//! present, units strictly in that order, `y` = 365 days, `w` = 7 days.
//! The bare literal `0` is also accepted.
//!
//! ## Timestamp formats
//! Tried in order, first match wins:
//! RFC822, RFC822Z, RFC850, RFC1123, RFC1123Z, RFC3339.
//! Zone abbreviations (`UTC`, `GMT`, `MST`, ...) carry a zero offset; numeric
//! zones (`-0700`) are honored.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};

pub const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Human-readable list of the timestamp layouts accepted by [`parse_timestamp`].
pub const SUPPORTED_FORMATS: &str = "RFC822 / RFC822Z / RFC850 / RFC1123 / RFC1123Z / RFC3339";

/// Errors produced while parsing temporal literals.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemporalError {
    #[error("invalid duration {literal:?}: {reason}")]
    InvalidDuration { literal: String, reason: String },
    #[error("invalid timestamp {literal:?}: supported formats are {}", SUPPORTED_FORMATS)]
    InvalidTimestamp { literal: String },
}

/// Signed interval with protobuf `google.protobuf.Duration` normalization:
/// `nanos` carries the same sign as `seconds`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Duration {
    pub seconds: i64,
    pub nanos: i32,
}

impl Duration {
    /// Splits a nanosecond count into seconds and a same-signed remainder.
    pub fn from_nanos(total: i64) -> Self {
        Self {
            seconds: total / NANOS_PER_SECOND,
            nanos: (total % NANOS_PER_SECOND) as i32,
        }
    }

    /// Total length in nanoseconds.
    pub fn as_nanos(&self) -> i128 {
        i128::from(self.seconds) * i128::from(NANOS_PER_SECOND) + i128::from(self.nanos)
    }

    pub fn is_zero(&self) -> bool {
        self.seconds == 0 && self.nanos == 0
    }
}

/// Absolute instant with protobuf `google.protobuf.Timestamp` normalization:
/// `nanos` is always in `0..1_000_000_000`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Timestamp {
    pub seconds: i64,
    pub nanos: i32,
}

impl Timestamp {
    /// Wall-clock time at the moment of the call. Never cached.
    pub fn now() -> Self {
        Self::from_datetime(&Utc::now())
    }

    pub fn from_datetime<Tz: TimeZone>(dt: &DateTime<Tz>) -> Self {
        // Leap seconds surface as nanos >= 1e9; fold them into the last representable nano.
        let nanos = dt.timestamp_subsec_nanos().min(999_999_999);
        Self {
            seconds: dt.timestamp(),
            nanos: nanos as i32,
        }
    }

    /// RFC3339 rendering in UTC, `None` when outside chrono's range.
    pub fn to_rfc3339(&self) -> Option<String> {
        DateTime::<Utc>::from_timestamp(self.seconds, self.nanos as u32).map(|dt| dt.to_rfc3339())
    }

    pub fn is_zero(&self) -> bool {
        self.seconds == 0 && self.nanos == 0
    }
}

/// A classified timestamp literal: either the dynamic `now` sentinel or a fixed instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampLiteral {
    Now,
    At(Timestamp),
}

impl TimestampLiteral {
    /// Recognizes `now` (trimmed, case-insensitive) before falling back to [`parse_timestamp`].
    pub fn parse(literal: &str) -> Result<Self, TemporalError> {
        if is_now(literal) {
            return Ok(Self::Now);
        }
        parse_timestamp(literal.trim()).map(Self::At)
    }
}

/// Returns `true` for the current-time sentinel.
///
/// # Examples
/// ```
/// # use common::temporal::is_now;
/// assert!(is_now(" NOW "));
/// assert!(!is_now("nowish"));
/// ```
pub fn is_now(literal: &str) -> bool {
    literal.trim().eq_ignore_ascii_case("now")
}

// ---------------------------------------------------------------------------
// Durations
// ---------------------------------------------------------------------------

/// Units in the only order the grammar accepts.
const DURATION_UNITS: &[(&str, i64)] = &[
    ("y", 365 * 24 * 3600 * NANOS_PER_SECOND),
    ("w", 7 * 24 * 3600 * NANOS_PER_SECOND),
    ("d", 24 * 3600 * NANOS_PER_SECOND),
    ("h", 3600 * NANOS_PER_SECOND),
    ("m", 60 * NANOS_PER_SECOND),
    ("s", NANOS_PER_SECOND),
    ("ms", 1_000_000),
];

/// Parses a compound duration literal such as `1h30m` or `2w`.
///
/// # Errors
/// `InvalidDuration` when the literal is empty, uses an unknown unit, repeats
/// or reorders units, or overflows the signed 64-bit nanosecond range.
pub fn parse_duration(literal: &str) -> Result<Duration, TemporalError> {
    let invalid = |reason: &str| TemporalError::InvalidDuration {
        literal: literal.to_string(),
        reason: reason.to_string(),
    };

    if literal == "0" {
        return Ok(Duration::default());
    }
    if literal.is_empty() {
        return Err(invalid("empty duration"));
    }

    let bytes = literal.as_bytes();
    let mut pos = 0usize;
    // Index of the next unit allowed in DURATION_UNITS.
    let mut next_unit = 0usize;
    let mut total: i64 = 0;

    while pos < bytes.len() {
        let digits_start = pos;
        while pos < bytes.len() && bytes[pos].is_ascii_digit() {
            pos += 1;
        }
        if pos == digits_start {
            return Err(invalid("expected a number"));
        }
        let unit_start = pos;
        while pos < bytes.len() && bytes[pos].is_ascii_alphabetic() {
            pos += 1;
        }
        let unit = &literal[unit_start..pos];
        if unit.is_empty() {
            return Err(invalid("missing unit"));
        }

        let offset = DURATION_UNITS[next_unit..]
            .iter()
            .position(|(name, _)| *name == unit)
            .ok_or_else(|| invalid(&format!("unexpected unit {unit:?}")))?;
        let (_, scale) = DURATION_UNITS[next_unit + offset];
        next_unit += offset + 1;

        let amount: i64 = literal[digits_start..unit_start]
            .parse()
            .map_err(|_| invalid("number out of range"))?;
        total = amount
            .checked_mul(scale)
            .and_then(|part| total.checked_add(part))
            .ok_or_else(|| invalid("duration out of range"))?;
    }

    Ok(Duration::from_nanos(total))
}

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

type Layout = fn(&str) -> Option<DateTime<FixedOffset>>;

const LAYOUTS: &[Layout] = &[
    parse_rfc822,
    parse_rfc822z,
    parse_rfc850,
    parse_rfc1123,
    parse_rfc1123z,
    parse_rfc3339,
];

const SHORT_DAYS: &[&str] = &["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
const LONG_DAYS: &[&str] = &[
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

/// Parses an absolute timestamp literal, trying each supported layout in order.
///
/// # Examples
/// ```
/// # use common::temporal::parse_timestamp;
/// let a = parse_timestamp("Mon, 02 Jan 2006 15:04:05 -0700").unwrap();
/// let b = parse_timestamp("2006-01-02T22:04:05Z").unwrap();
/// assert_eq!(a, b);
/// ```
pub fn parse_timestamp(literal: &str) -> Result<Timestamp, TemporalError> {
    LAYOUTS
        .iter()
        .find_map(|layout| layout(literal))
        .map(|dt| Timestamp::from_datetime(&dt))
        .ok_or_else(|| TemporalError::InvalidTimestamp {
            literal: literal.to_string(),
        })
}

/// `02 Jan 06 15:04 MST`
fn parse_rfc822(s: &str) -> Option<DateTime<FixedOffset>> {
    let (rest, zone) = s.rsplit_once(' ')?;
    rfc822_body(rest, named_zone(zone)?)
}

/// `02 Jan 06 15:04 -0700`
fn parse_rfc822z(s: &str) -> Option<DateTime<FixedOffset>> {
    let (rest, zone) = s.rsplit_once(' ')?;
    rfc822_body(rest, numeric_zone(zone)?)
}

fn rfc822_body(s: &str, offset: FixedOffset) -> Option<DateTime<FixedOffset>> {
    if !fits_layout(s, "dd Mmm dd dd:dd") {
        return None;
    }
    let parts: Vec<&str> = s.split(' ').collect();
    let [day, month, year, clock] = parts.as_slice() else {
        return None;
    };
    let year = expand_year(year)?;
    let naive = NaiveDateTime::parse_from_str(
        &format!("{day} {month} {year} {clock}"),
        "%d %b %Y %H:%M",
    )
    .ok()?;
    offset.from_local_datetime(&naive).single()
}

/// `Monday, 02-Jan-06 15:04:05 MST`
fn parse_rfc850(s: &str) -> Option<DateTime<FixedOffset>> {
    let (rest, zone) = s.rsplit_once(' ')?;
    let offset = named_zone(zone)?;
    let body = strip_weekday(rest, LONG_DAYS)?;
    if !fits_layout(body, "dd-Mmm-dd dd:dd:dd") {
        return None;
    }
    let (date, clock) = body.split_once(' ')?;
    let parts: Vec<&str> = date.split('-').collect();
    let [day, month, year] = parts.as_slice() else {
        return None;
    };
    let year = expand_year(year)?;
    let naive = NaiveDateTime::parse_from_str(
        &format!("{day} {month} {year} {clock}"),
        "%d %b %Y %H:%M:%S",
    )
    .ok()?;
    offset.from_local_datetime(&naive).single()
}

/// `Mon, 02 Jan 2006 15:04:05 MST`
fn parse_rfc1123(s: &str) -> Option<DateTime<FixedOffset>> {
    let (rest, zone) = s.rsplit_once(' ')?;
    rfc1123_body(rest, named_zone(zone)?)
}

/// `Mon, 02 Jan 2006 15:04:05 -0700`
fn parse_rfc1123z(s: &str) -> Option<DateTime<FixedOffset>> {
    let (rest, zone) = s.rsplit_once(' ')?;
    rfc1123_body(rest, numeric_zone(zone)?)
}

fn rfc1123_body(s: &str, offset: FixedOffset) -> Option<DateTime<FixedOffset>> {
    let body = strip_weekday(s, SHORT_DAYS)?;
    if !fits_layout(body, "dd Mmm dddd dd:dd:dd") {
        return None;
    }
    let naive = NaiveDateTime::parse_from_str(body, "%d %b %Y %H:%M:%S").ok()?;
    offset.from_local_datetime(&naive).single()
}

/// `2006-01-02T15:04:05Z07:00`, fractional seconds allowed.
fn parse_rfc3339(s: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(s).ok()
}

/// The weekday is checked for spelling only; its value never moves the date.
fn strip_weekday<'a>(s: &'a str, names: &[&str]) -> Option<&'a str> {
    let (day, rest) = s.split_once(", ")?;
    names.contains(&day).then_some(rest)
}

/// Two-digit years: 69..=99 → 19xx, 00..=68 → 20xx.
fn expand_year(yy: &str) -> Option<i32> {
    if yy.len() != 2 || !yy.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let n: i32 = yy.parse().ok()?;
    Some(if n >= 69 { 1900 + n } else { 2000 + n })
}

/// Fixed-width layout check: `d` is a digit, `M` an uppercase and `m` a
/// lowercase letter, anything else must match literally.
fn fits_layout(s: &str, layout: &str) -> bool {
    s.len() == layout.len()
        && s.bytes().zip(layout.bytes()).all(|(c, l)| match l {
            b'd' => c.is_ascii_digit(),
            b'M' => c.is_ascii_uppercase(),
            b'm' => c.is_ascii_lowercase(),
            _ => c == l,
        })
}

/// Zone abbreviations: three uppercase letters, four ending in `T`, or one
/// of the mixed-case exceptions.
fn named_zone(zone: &str) -> Option<FixedOffset> {
    let upper = zone.bytes().all(|b| b.is_ascii_uppercase());
    let plausible = match zone.len() {
        3 => upper,
        4 => (upper && zone.ends_with('T')) || matches!(zone, "WITA" | "ChST" | "MeST"),
        _ => false,
    };
    if plausible {
        FixedOffset::east_opt(0)
    } else {
        None
    }
}

/// `±hhmm`
fn numeric_zone(zone: &str) -> Option<FixedOffset> {
    let bytes = zone.as_bytes();
    if bytes.len() != 5 || !bytes[1..].iter().all(u8::is_ascii_digit) {
        return None;
    }
    let sign = match bytes[0] {
        b'+' => 1,
        b'-' => -1,
        _ => return None,
    };
    let hours: i32 = zone[1..3].parse().ok()?;
    let minutes: i32 = zone[3..5].parse().ok()?;
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_hour() {
        let d = parse_duration("1h").unwrap();
        assert_eq!(d.as_nanos(), 3_600_000_000_000);
        assert_eq!(d, Duration { seconds: 3600, nanos: 0 });
    }

    #[test]
    fn test_compound_duration() {
        let d = parse_duration("1h30m").unwrap();
        assert_eq!(d.seconds, 5400);

        let d = parse_duration("2w").unwrap();
        assert_eq!(d.seconds, 14 * 24 * 3600);

        let d = parse_duration("1y1d").unwrap();
        assert_eq!(d.seconds, 366 * 24 * 3600);
    }

    #[test]
    fn test_milliseconds_do_not_collide_with_minutes() {
        let d = parse_duration("1m500ms").unwrap();
        assert_eq!(d, Duration { seconds: 60, nanos: 500_000_000 });

        let d = parse_duration("250ms").unwrap();
        assert_eq!(d, Duration { seconds: 0, nanos: 250_000_000 });
    }

    #[test]
    fn test_zero_duration() {
        assert!(parse_duration("0").unwrap().is_zero());
        assert!(parse_duration("0s").unwrap().is_zero());
    }

    #[test]
    fn test_invalid_durations() {
        for literal in ["", "h", "1", "1x", "30m1h", "1h1h", "-1h", "1.5h", "1h "] {
            assert!(
                matches!(parse_duration(literal), Err(TemporalError::InvalidDuration { .. })),
                "{literal:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_duration_overflow() {
        assert!(parse_duration("99999999999y").is_err());
    }

    #[test]
    fn test_negative_nanos_share_sign() {
        let d = Duration::from_nanos(-1_500_000_000);
        assert_eq!(d, Duration { seconds: -1, nanos: -500_000_000 });
        assert_eq!(d.as_nanos(), -1_500_000_000);
    }

    #[test]
    fn test_rfc1123_and_rfc3339_agree() {
        let a = parse_timestamp("Mon, 02 Jan 2006 15:04:05 -0700").unwrap();
        let b = parse_timestamp("2006-01-02T22:04:05Z").unwrap();
        assert_eq!(a, b);

        let c = parse_timestamp("Mon, 02 Jan 2006 22:04:05 UTC").unwrap();
        assert_eq!(a, c);
    }

    #[test]
    fn test_rfc822_layouts() {
        let a = parse_timestamp("02 Jan 06 15:04 UTC").unwrap();
        let b = parse_timestamp("2006-01-02T15:04:00Z").unwrap();
        assert_eq!(a, b);

        let z = parse_timestamp("02 Jan 06 15:04 +0100").unwrap();
        assert_eq!(z.seconds, b.seconds - 3600);
    }

    #[test]
    fn test_rfc850_two_digit_years() {
        let a = parse_timestamp("Monday, 02-Jan-06 15:04:05 GMT").unwrap();
        let b = parse_timestamp("2006-01-02T15:04:05Z").unwrap();
        assert_eq!(a, b);

        let old = parse_timestamp("Tuesday, 11-Mar-69 00:00:00 GMT").unwrap();
        assert_eq!(old, parse_timestamp("1969-03-11T00:00:00Z").unwrap());
    }

    #[test]
    fn test_layouts_are_fixed_width() {
        assert!(parse_timestamp("Mon, 2 Jan 2006 15:04:05 UTC").is_err());
        assert!(parse_timestamp("2 Jan 06 15:04 UTC").is_err());
        assert!(parse_timestamp("Monday, 2-Jan-06 15:04:05 GMT").is_err());
        assert!(parse_timestamp("Mon, 02 Jan 2006 5:04:05 UTC").is_err());
    }

    #[test]
    fn test_zone_abbreviations() {
        let utc = parse_timestamp("Mon, 02 Jan 2006 15:04:05 UTC").unwrap();
        assert_eq!(parse_timestamp("Mon, 02 Jan 2006 15:04:05 AEST").unwrap(), utc);
        assert_eq!(parse_timestamp("Mon, 02 Jan 2006 15:04:05 ChST").unwrap(), utc);
        assert!(parse_timestamp("Mon, 02 Jan 2006 15:04:05 XYZAB").is_err());
        assert!(parse_timestamp("Mon, 02 Jan 2006 15:04:05 ABCD").is_err());
        assert!(parse_timestamp("Mon, 02 Jan 2006 15:04:05 UT").is_err());
    }

    #[test]
    fn test_pre_epoch_timestamp() {
        let ts = parse_timestamp("1952-03-11T00:00:00Z").unwrap();
        assert_eq!(ts, Timestamp { seconds: -562_032_000, nanos: 0 });
    }

    #[test]
    fn test_fractional_rfc3339() {
        let ts = parse_timestamp("2020-05-01T10:00:00.25+02:00").unwrap();
        assert_eq!(ts.nanos, 250_000_000);
        assert_eq!(ts.to_rfc3339().as_deref(), Some("2020-05-01T08:00:00.250+00:00"));
    }

    #[test]
    fn test_invalid_timestamp_lists_formats() {
        let err = parse_timestamp("not-a-time").unwrap_err();
        assert!(matches!(err, TemporalError::InvalidTimestamp { .. }));
        assert!(err.to_string().contains("RFC1123Z"));
    }

    #[test]
    fn test_now_sentinel() {
        assert_eq!(TimestampLiteral::parse("  Now\n").unwrap(), TimestampLiteral::Now);
        let fixed = TimestampLiteral::parse(" 2006-01-02T15:04:05Z ").unwrap();
        assert!(matches!(fixed, TimestampLiteral::At(_)));
    }

    #[test]
    fn test_now_is_not_cached() {
        let a = Timestamp::now();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let b = Timestamp::now();
        assert!(b > a);
    }
}
