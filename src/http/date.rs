//! HTTP-date formatting and parsing (RFC 9110 §5.6.7, IMF-fixdate).
//!
//! Only the preferred `Sun, 06 Nov 1994 08:49:37 GMT` form is produced and
//! accepted. Sub-second precision is dropped on formatting.

use chrono::{DateTime, NaiveDateTime, ParseError, Utc};

const IMF_FIXDATE: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Formats `time` as an IMF-fixdate string.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use rttp_cache::http::date::fmt_http_date;
///
/// let t = Utc.with_ymd_and_hms(1994, 11, 6, 8, 49, 37).unwrap();
/// assert_eq!(fmt_http_date(t), "Sun, 06 Nov 1994 08:49:37 GMT");
/// ```
pub fn fmt_http_date(time: DateTime<Utc>) -> String {
    time.format(IMF_FIXDATE).to_string()
}

/// Parses an IMF-fixdate string back into a UTC timestamp.
pub fn parse_http_date(value: &str) -> Result<DateTime<Utc>, ParseError> {
    NaiveDateTime::parse_from_str(value.trim(), IMF_FIXDATE).map(|naive| naive.and_utc())
}
