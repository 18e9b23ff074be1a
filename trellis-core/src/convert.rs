//! Text-to-value conversion used by `#[value]` fields and typed property getters.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use std::fmt;
use std::time::Duration;

/// Values that can be read from a property string.
///
/// `layout` is the optional format declared on the field, e.g. `#[value("k", layout = "%Y-%m-%d")]`.
pub trait FromProperty: Sized + Send + Sync + 'static {
    fn from_property(raw: &str, layout: Option<&str>) -> Result<Self, String>;
}

impl FromProperty for String {
    fn from_property(raw: &str, _layout: Option<&str>) -> Result<Self, String> {
        Ok(raw.to_string())
    }
}

impl FromProperty for bool {
    fn from_property(raw: &str, _layout: Option<&str>) -> Result<Self, String> {
        parse_bool(raw)
    }
}

macro_rules! from_property_parse {
    ($($ty:ty),*) => {
        $(
            impl FromProperty for $ty {
                fn from_property(raw: &str, _layout: Option<&str>) -> Result<Self, String> {
                    raw.trim()
                        .parse::<$ty>()
                        .map_err(|e| format!("invalid {} '{}': {}", stringify!($ty), raw, e))
                }
            }
        )*
    };
}

from_property_parse!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64);

impl FromProperty for Duration {
    fn from_property(raw: &str, _layout: Option<&str>) -> Result<Self, String> {
        parse_duration(raw)
    }
}

impl FromProperty for FileMode {
    fn from_property(raw: &str, _layout: Option<&str>) -> Result<Self, String> {
        Ok(FileMode::parse(raw))
    }
}

impl FromProperty for NaiveDate {
    fn from_property(raw: &str, layout: Option<&str>) -> Result<Self, String> {
        let layout = layout.unwrap_or("%Y-%m-%d");
        NaiveDate::parse_from_str(raw.trim(), layout)
            .map_err(|e| format!("invalid date '{}' for layout '{}': {}", raw, layout, e))
    }
}

impl FromProperty for NaiveDateTime {
    fn from_property(raw: &str, layout: Option<&str>) -> Result<Self, String> {
        let layout = layout.unwrap_or("%Y-%m-%dT%H:%M:%S");
        NaiveDateTime::parse_from_str(raw.trim(), layout)
            .map_err(|e| format!("invalid date-time '{}' for layout '{}': {}", raw, layout, e))
    }
}

impl FromProperty for DateTime<FixedOffset> {
    fn from_property(raw: &str, layout: Option<&str>) -> Result<Self, String> {
        match layout {
            Some(layout) => DateTime::parse_from_str(raw.trim(), layout)
                .map_err(|e| format!("invalid date-time '{}' for layout '{}': {}", raw, layout, e)),
            None => DateTime::parse_from_rfc3339(raw.trim())
                .map_err(|e| format!("invalid RFC 3339 date-time '{}': {}", raw, e)),
        }
    }
}

/// `;`-separated list, blank items skipped.
impl<T: FromProperty> FromProperty for Vec<T> {
    fn from_property(raw: &str, layout: Option<&str>) -> Result<Self, String> {
        raw.split(';')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(|item| T::from_property(item, layout))
            .collect()
    }
}

/// Parses the boolean spellings accepted in property files.
pub fn parse_bool(raw: &str) -> Result<bool, String> {
    match raw.trim() {
        "1" | "t" | "T" | "true" | "TRUE" | "True" | "on" | "ON" | "On" => Ok(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" | "off" | "OFF" | "Off" => Ok(false),
        other => Err(format!("invalid syntax '{}'", other)),
    }
}

/// Parses durations such as `300ms`, `1.5s` or `1h30m`.
///
/// Units: `ns`, `us` (`µs`), `ms`, `s`, `m`, `h`. A bare `0` is accepted.
pub fn parse_duration(raw: &str) -> Result<Duration, String> {
    let s = raw.trim();
    let s = s.strip_prefix('+').unwrap_or(s);
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.is_empty() {
        return Err("invalid duration ''".to_string());
    }
    if s.starts_with('-') {
        return Err(format!("negative duration '{}'", raw));
    }

    let mut total_nanos: f64 = 0.0;
    let mut rest = s;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_len == 0 {
            return Err(format!("invalid duration '{}'", raw));
        }
        let number: f64 = rest[..number_len]
            .parse()
            .map_err(|_| format!("invalid duration '{}'", raw))?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let scale = match &rest[..unit_len] {
            "ns" => 1.0,
            "us" | "µs" | "μs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60.0 * 1e9,
            "h" => 3600.0 * 1e9,
            "" => return Err(format!("missing unit in duration '{}'", raw)),
            unit => return Err(format!("unknown unit '{}' in duration '{}'", unit, raw)),
        };
        rest = &rest[unit_len..];
        total_nanos += number * scale;
    }

    Ok(Duration::from_nanos(total_nanos.round() as u64))
}

/// Unix permission bits parsed from `rwxr-xr-x` notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileMode(pub u32);

impl FileMode {
    /// Reads the last nine characters as permission flags; shorter input is left-padded with `-`.
    pub fn parse(raw: &str) -> Self {
        const RWX: &[u8; 9] = b"rwxrwxrwx";
        let bytes = raw.trim().as_bytes();
        let mut padded = [b'-'; 9];
        if bytes.len() >= 9 {
            padded.copy_from_slice(&bytes[bytes.len() - 9..]);
        } else {
            padded[9 - bytes.len()..].copy_from_slice(bytes);
        }

        let mut mode = 0u32;
        for (i, flag) in RWX.iter().enumerate() {
            if padded[i] == *flag {
                mode |= 1 << (8 - i);
            }
        }
        FileMode(mode)
    }

    pub fn bits(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for FileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const RWX: &[u8; 9] = b"rwxrwxrwx";
        f.write_str("-")?;
        for (i, flag) in RWX.iter().enumerate() {
            let c = if self.0 & (1 << (8 - i)) != 0 { *flag as char } else { '-' };
            write!(f, "{}", c)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("300ms").unwrap(), Duration::from_millis(300));
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("1.5s").unwrap(), Duration::from_millis(1500));
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
        assert_eq!(parse_duration("10us").unwrap(), Duration::from_micros(10));
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("10d").is_err());
        assert!(parse_duration("-1s").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("on").unwrap());
        assert!(parse_bool("True").unwrap());
        assert!(!parse_bool("0").unwrap());
        assert!(parse_bool("yes").is_err());
    }

    #[test]
    fn test_file_mode() {
        assert_eq!(FileMode::parse("-rwxrwxr-x").bits(), 0o775);
        assert_eq!(FileMode::parse("-rw-rw-r--").bits(), 0o664);
        assert_eq!(FileMode::parse("r-x").bits(), 0o005);
        assert_eq!(FileMode(0o644).to_string(), "-rw-r--r--");
    }

    #[test]
    fn test_list_and_dates() {
        let list = Vec::<i32>::from_property("1; 2;;3", None).unwrap();
        assert_eq!(list, vec![1, 2, 3]);
        assert!(Vec::<i32>::from_property("", None).unwrap().is_empty());

        let date = NaiveDate::from_property("2022-10-22", None).unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2022, 10, 22).unwrap());

        let date = NaiveDate::from_property("22/10/2022", Some("%d/%m/%Y")).unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2022, 10, 22).unwrap());

        assert!(DateTime::<FixedOffset>::from_property("2022-10-22T10:00:00+02:00", None).is_ok());
        assert!(u8::from_property("300", None).is_err());
    }
}
