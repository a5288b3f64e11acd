//! Textual timestamp conversion: `YYYYMMDDThhmmss[.ffffff]` <-> microsecond
//! epoch, plus the `not-a-date-time` / `+infinity` / `-infinity` sentinels.
//!
//! This is the one piece of the component design marked as an external
//! collaborator whose contract is merely referenced; it is implemented
//! here with plain integer day-math rather than a date/time crate, since
//! the grammar is fixed and narrow (one calendar, one textual form, no
//! time zones beyond UTC).

use crate::error::Error;

/// Sentinel epoch value standing in for "not a date/time" (numpy's `NaT`).
pub const NOT_A_DATE_TIME: i64 = i64::MIN + 1;
/// Sentinel epoch value for `+infinity`.
pub const POS_INF: i64 = i64::MAX;
/// Sentinel epoch value for `-infinity`.
pub const NEG_INF: i64 = i64::MIN;

const MICROS_PER_SEC: i64 = 1_000_000;
const SECS_PER_MIN: i64 = 60;
const SECS_PER_HOUR: i64 = 3_600;
const SECS_PER_DAY: i64 = 86_400;

fn is_leap(year: i64) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

const DAYS_IN_MONTH: [i64; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

fn days_from_civil(year: i64, month: i64, day: i64) -> i64 {
    // Howard Hinnant's days_from_civil algorithm (proleptic Gregorian,
    // epoch day 0 == 1970-01-01).
    let y = if month <= 2 { year - 1 } else { year };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = (y - era * 400) as i64;
    let mp = (month + 9) % 12;
    let doy = (153 * mp + 2) / 5 + day - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

fn civil_from_days(z: i64) -> (i64, i64, i64) {
    let z = z + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = if m <= 2 { y + 1 } else { y };
    (year, m, d)
}

fn days_in_month(year: i64, month: i64) -> i64 {
    if month == 2 && is_leap(year) {
        29
    } else {
        DAYS_IN_MONTH[(month - 1) as usize]
    }
}

/// Parses the grammar `YYYYMMDDThhmmss[.ffffff]` (1-12 fractional digits
/// tolerated; digits beyond microseconds are truncated, not rounded), or
/// one of the sentinel tokens, into a microsecond epoch value.
pub fn to_wire(s: &str) -> Result<i64, Error> {
    let trimmed = s.trim();
    match trimmed.to_ascii_lowercase().as_str() {
        "" | "not-a-date-time" => return Ok(NOT_A_DATE_TIME),
        "+infinity" | "+inf" | "infinity" | "inf" => return Ok(POS_INF),
        "-infinity" | "-inf" => return Ok(NEG_INF),
        _ => {}
    }
    if trimmed.len() < 15 {
        return Err(Error::ShapeError {
            message: format!("timestamp {trimmed:?} shorter than the minimum 15-character form"),
        });
    }
    let bytes = trimmed.as_bytes();
    if bytes[8] != b'T' {
        return Err(Error::ShapeError {
            message: format!("timestamp {trimmed:?} missing the 'T' date/time separator"),
        });
    }
    let digit_field = |a: usize, b: usize| -> Result<i64, Error> {
        trimmed[a..b]
            .parse::<i64>()
            .map_err(|_| Error::ShapeError {
                message: format!("timestamp {trimmed:?} has a non-numeric field"),
            })
    };
    let year = digit_field(0, 4)?;
    let month = digit_field(4, 6)?;
    let day = digit_field(6, 8)?;
    let hour = digit_field(9, 11)?;
    let minute = digit_field(11, 13)?;
    let second = digit_field(13, 15)?;
    if !(1..=12).contains(&month) || day < 1 || day > days_in_month(year, month) {
        return Err(Error::ShapeError {
            message: format!("timestamp {trimmed:?} has an out-of-range calendar field"),
        });
    }
    if hour > 23 || minute > 59 || second > 59 {
        return Err(Error::ShapeError {
            message: format!("timestamp {trimmed:?} has an out-of-range time field"),
        });
    }
    let micros = if trimmed.len() > 15 {
        if bytes[15] != b'.' {
            return Err(Error::ShapeError {
                message: format!("timestamp {trimmed:?} expected '.' before fractional digits"),
            });
        }
        let frac = &trimmed[16..];
        if frac.is_empty() || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::ShapeError {
                message: format!("timestamp {trimmed:?} has non-digit fractional part"),
            });
        }
        let truncated: String = frac.chars().take(6).collect();
        let padded = format!("{truncated:0<6}");
        padded.parse::<i64>().unwrap_or(0)
    } else {
        0
    };

    let days = days_from_civil(year, month, day);
    let secs_of_day = hour * SECS_PER_HOUR + minute * SECS_PER_MIN + second;
    Ok(days * SECS_PER_DAY * MICROS_PER_SEC + secs_of_day * MICROS_PER_SEC + micros)
}

/// Renders a microsecond epoch value back to the canonical 15- or
/// 22-character textual form (no trailing `.000000` when the fractional
/// part is zero), or a sentinel token.
pub fn from_wire(value: i64) -> String {
    match value {
        NOT_A_DATE_TIME => return "not-a-date-time".to_string(),
        POS_INF => return "+infinity".to_string(),
        NEG_INF => return "-infinity".to_string(),
        _ => {}
    }
    let micros_per_day = SECS_PER_DAY * MICROS_PER_SEC;
    let mut days = value.div_euclid(micros_per_day);
    let mut rem = value.rem_euclid(micros_per_day);
    if rem < 0 {
        days -= 1;
        rem += micros_per_day;
    }
    let (year, month, day) = civil_from_days(days);
    let secs_of_day = rem / MICROS_PER_SEC;
    let micros = rem % MICROS_PER_SEC;
    let hour = secs_of_day / SECS_PER_HOUR;
    let minute = (secs_of_day % SECS_PER_HOUR) / SECS_PER_MIN;
    let second = secs_of_day % SECS_PER_MIN;
    if micros == 0 {
        format!("{year:04}{month:02}{day:02}T{hour:02}{minute:02}{second:02}")
    } else {
        format!("{year:04}{month:02}{day:02}T{hour:02}{minute:02}{second:02}.{micros:06}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fractional_microseconds() {
        let v = to_wire("20150102T122345.012345").unwrap();
        assert_eq!(v.rem_euclid(MICROS_PER_SEC), 12_345);
    }

    #[test]
    fn round_trip_no_fraction() {
        let v = to_wire("20150102T122345").unwrap();
        assert_eq!(from_wire(v), "20150102T122345");
    }

    #[test]
    fn round_trip_with_fraction() {
        let s = "20150102T122345.012345";
        assert_eq!(from_wire(to_wire(s).unwrap()), s);
    }

    #[test]
    fn sentinels() {
        assert_eq!(to_wire("not-a-date-time").unwrap(), NOT_A_DATE_TIME);
        assert_eq!(from_wire(NOT_A_DATE_TIME), "not-a-date-time");
        assert_eq!(to_wire("+infinity").unwrap(), POS_INF);
        assert_eq!(to_wire("-inf").unwrap(), NEG_INF);
    }

    #[test]
    fn truncates_not_rounds() {
        let v = to_wire("20150102T122345.9999996").unwrap();
        assert_eq!(v.rem_euclid(MICROS_PER_SEC), 999_999);
    }
}
