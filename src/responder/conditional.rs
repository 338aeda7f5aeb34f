//! Conditional GET validators.
//!
//! # Design Decisions
//! - The entity tag is the lower-case hex of the modification time in ticks
//!   (100 ns units since 0001-01-01 UTC), sent without quotes
//! - `If-Modified-Since` is compared at whole-second precision, the
//!   resolution of HTTP dates

use std::time::{SystemTime, UNIX_EPOCH};

use axum::http::header::{IF_MODIFIED_SINCE, IF_NONE_MATCH};
use axum::http::HeaderMap;
use chrono::{DateTime, NaiveDateTime, Utc};

const TICKS_PER_SECOND: u64 = 10_000_000;
const NANOS_PER_TICK: u32 = 100;
/// Ticks between 0001-01-01 and 1970-01-01.
const TICKS_AT_UNIX_EPOCH: u64 = 621_355_968_000_000_000;

const IMF_FIXDATE: &str = "%a, %d %b %Y %H:%M:%S GMT";
const RFC850_DATE: &str = "%A, %d-%b-%y %H:%M:%S GMT";
const ASCTIME_DATE: &str = "%a %b %e %H:%M:%S %Y";

pub fn ticks(time: SystemTime) -> u64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(since) => {
            TICKS_AT_UNIX_EPOCH
                + since.as_secs() * TICKS_PER_SECOND
                + u64::from(since.subsec_nanos() / NANOS_PER_TICK)
        }
        Err(before) => {
            let before = before.duration();
            TICKS_AT_UNIX_EPOCH
                .saturating_sub(before.as_secs() * TICKS_PER_SECOND + u64::from(before.subsec_nanos() / NANOS_PER_TICK))
        }
    }
}

pub fn etag(modified: SystemTime) -> String {
    format!("{:x}", ticks(modified))
}

/// Format as an IMF-fixdate, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`.
pub fn http_date(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).format(IMF_FIXDATE).to_string()
}

/// Parse any of the three HTTP date formats.
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc2822(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    [RFC850_DATE, ASCTIME_DATE]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
}

/// Whether the request's validators show the client copy is current.
pub fn is_not_modified(headers: &HeaderMap, etag: &str, modified: SystemTime) -> bool {
    let tag_matches = headers
        .get_all(IF_NONE_MATCH)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(normalize_tag)
        .any(|candidate| candidate == "*" || candidate == etag);
    if tag_matches {
        return true;
    }

    let Some(since) = headers
        .get(IF_MODIFIED_SINCE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_http_date)
    else {
        return false;
    };
    since.timestamp() >= DateTime::<Utc>::from(modified).timestamp()
}

fn normalize_tag(tag: &str) -> &str {
    let tag = tag.trim();
    let tag = tag.strip_prefix("W/").unwrap_or(tag);
    tag.strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(tag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use std::time::Duration;

    fn at(secs: u64, nanos: u32) -> SystemTime {
        UNIX_EPOCH + Duration::new(secs, nanos)
    }

    #[test]
    fn test_ticks_at_known_instant() {
        assert_eq!(ticks(UNIX_EPOCH), TICKS_AT_UNIX_EPOCH);
        assert_eq!(ticks(at(1, 250)), TICKS_AT_UNIX_EPOCH + TICKS_PER_SECOND + 2);
        assert_eq!(etag(UNIX_EPOCH), "89f7ff5f7b58000");
    }

    #[test]
    fn test_http_date_round_trip() {
        let time = at(784_111_777, 0);
        assert_eq!(http_date(time), "Sun, 06 Nov 1994 08:49:37 GMT");
        assert_eq!(parse_http_date("Sun, 06 Nov 1994 08:49:37 GMT").unwrap().timestamp(), 784_111_777);
        assert_eq!(parse_http_date("Sunday, 06-Nov-94 08:49:37 GMT").unwrap().timestamp(), 784_111_777);
        assert_eq!(parse_http_date("Sun Nov  6 08:49:37 1994").unwrap().timestamp(), 784_111_777);
        assert!(parse_http_date("yesterday").is_none());
    }

    #[test]
    fn test_if_none_match_list() {
        let modified = at(1_000, 0);
        let tag = etag(modified);
        let mut headers = HeaderMap::new();
        headers.insert(IF_NONE_MATCH, HeaderValue::from_str(&format!("abc, {} ", tag)).unwrap());
        assert!(is_not_modified(&headers, &tag, modified));

        headers.insert(IF_NONE_MATCH, HeaderValue::from_static("abc"));
        assert!(!is_not_modified(&headers, &tag, modified));
    }

    #[test]
    fn test_if_modified_since_ignores_subsecond() {
        let modified = at(784_111_777, 900_000_000);
        let mut headers = HeaderMap::new();
        headers.insert(IF_MODIFIED_SINCE, HeaderValue::from_static("Sun, 06 Nov 1994 08:49:37 GMT"));
        assert!(is_not_modified(&headers, "x", modified));

        headers.insert(IF_MODIFIED_SINCE, HeaderValue::from_static("Sun, 06 Nov 1994 08:49:36 GMT"));
        assert!(!is_not_modified(&headers, "x", modified));
    }
}
