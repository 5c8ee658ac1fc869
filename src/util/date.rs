//! Best-effort date parsing for feed timestamps.
//!
//! Three strategies are tried in a fixed order and the first success wins:
//! structured (RFC 3339 / XML Schema), mail (RFC 2822), then a list of loose
//! layouts seen in the wild. Nothing here ever returns an error; a date that
//! cannot be understood is simply absent.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};

/// The strategy that produced a resolved date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateFormat {
    /// RFC 3339 or one of its XML Schema subsets.
    Structured,
    /// RFC 2822 mail date.
    Mail,
    /// One of the permissive fallback layouts.
    FreeForm,
}

/// XML Schema `dateTime` without an offset; read as UTC.
const STRUCTURED_NAIVE_LAYOUTS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

/// Layouts carrying an explicit numeric offset.
const FREE_FORM_ZONED_LAYOUTS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f %z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%d %b %Y %H:%M:%S %z",
    "%a %b %e %H:%M:%S %z %Y",
];

/// Layouts without a zone; read as UTC.
const FREE_FORM_NAIVE_LAYOUTS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d %b %Y %H:%M:%S",
    "%d %b %Y %H:%M",
    "%a, %d %b %Y %H:%M:%S",
    "%a, %d %b %Y %H:%M",
    "%a %b %e %H:%M:%S %Y",
    "%B %d, %Y %H:%M:%S",
    "%B %d, %Y %I:%M %p",
];

/// Date-only layouts; midnight UTC.
const FREE_FORM_DATE_LAYOUTS: &[&str] = &[
    "%Y/%m/%d",
    "%d/%m/%Y",
    "%d %b %Y",
    "%d %B %Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%B %d %Y",
    "%Y%m%d",
];

/// Resolves a feed date string, preserving the offset the source provided.
///
/// # Examples
///
/// ```
/// use feedmend::util::resolve_date;
///
/// let iso = resolve_date("2003-06-10T09:41:01Z").unwrap();
/// let mail = resolve_date("Tue, 10 Jun 2003 09:41:01 GMT").unwrap();
/// assert_eq!(iso, mail);
/// assert!(resolve_date("not a date").is_none());
/// ```
pub fn resolve_date(text: &str) -> Option<DateTime<FixedOffset>> {
    resolve_with_format(text).map(|(date, _)| date)
}

/// Like [`resolve_date`] but also reports which strategy succeeded.
pub fn resolve_with_format(text: &str) -> Option<(DateTime<FixedOffset>, DateFormat)> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Some(date) = parse_structured(text) {
        return Some((date, DateFormat::Structured));
    }
    if let Some(date) = parse_mail(text) {
        return Some((date, DateFormat::Mail));
    }
    if let Some(date) = parse_free_form(text) {
        return Some((date, DateFormat::FreeForm));
    }

    tracing::debug!(date = text, "Unrecognized date format");
    None
}

fn parse_structured(text: &str) -> Option<DateTime<FixedOffset>> {
    if let Ok(date) = DateTime::parse_from_rfc3339(text) {
        return Some(date);
    }
    STRUCTURED_NAIVE_LAYOUTS
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(text, layout).ok())
        .or_else(|| midnight(NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()?))
        .map(as_utc)
}

fn parse_mail(text: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc2822(text).ok()
}

fn parse_free_form(text: &str) -> Option<DateTime<FixedOffset>> {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let candidates = [collapsed.as_str(), without_weekday(&collapsed)];

    candidates.iter().find_map(|candidate| {
        parse_mail(candidate)
            .or_else(|| {
                FREE_FORM_ZONED_LAYOUTS
                    .iter()
                    .find_map(|layout| DateTime::parse_from_str(candidate, layout).ok())
            })
            .or_else(|| {
                FREE_FORM_NAIVE_LAYOUTS
                    .iter()
                    .find_map(|layout| NaiveDateTime::parse_from_str(candidate, layout).ok())
                    .map(as_utc)
            })
            .or_else(|| {
                FREE_FORM_DATE_LAYOUTS
                    .iter()
                    .find_map(|layout| NaiveDate::parse_from_str(candidate, layout).ok())
                    .and_then(midnight)
                    .map(as_utc)
            })
    })
}

/// Drops a leading `Tuesday,`-style token so the rest can be read as a mail date.
fn without_weekday(text: &str) -> &str {
    match text.split_once(", ") {
        Some((head, rest)) if head.len() > 3 && head.chars().all(|c| c.is_ascii_alphabetic()) => {
            rest
        }
        _ => text,
    }
}

fn midnight(date: NaiveDate) -> Option<NaiveDateTime> {
    date.and_hms_opt(0, 0, 0)
}

fn as_utc(naive: NaiveDateTime) -> DateTime<FixedOffset> {
    naive.and_utc().fixed_offset()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<FixedOffset> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s)
            .single()
            .map(|d| d.fixed_offset())
            .unwrap()
    }

    #[test]
    fn test_structured_and_mail_agree() {
        let (iso, iso_fmt) = resolve_with_format("2003-06-10T09:41:01Z").unwrap();
        let (mail, mail_fmt) = resolve_with_format("Tue, 10 Jun 2003 09:41:01 GMT").unwrap();
        assert_eq!(iso_fmt, DateFormat::Structured);
        assert_eq!(mail_fmt, DateFormat::Mail);
        assert_eq!(iso, mail);
        assert_eq!(iso, utc(2003, 6, 10, 9, 41, 1));
    }

    #[test]
    fn test_offset_is_preserved() {
        let date = resolve_date("2003-06-10T11:41:01+02:00").unwrap();
        assert_eq!(date.offset().local_minus_utc(), 2 * 3600);
        assert_eq!(date, utc(2003, 6, 10, 9, 41, 1));

        let date = resolve_date("Tue, 10 Jun 2003 04:41:01 -0500").unwrap();
        assert_eq!(date.offset().local_minus_utc(), -5 * 3600);
    }

    #[test]
    fn test_structured_subsets() {
        let (date, fmt) = resolve_with_format("2003-06-10T09:41:01").unwrap();
        assert_eq!(fmt, DateFormat::Structured);
        assert_eq!(date, utc(2003, 6, 10, 9, 41, 1));

        let (date, fmt) = resolve_with_format("2003-06-10").unwrap();
        assert_eq!(fmt, DateFormat::Structured);
        assert_eq!(date, utc(2003, 6, 10, 0, 0, 0));
    }

    #[test]
    fn test_named_mail_zone() {
        let date = resolve_date("Tue, 10 Jun 2003 09:41:01 EST").unwrap();
        assert_eq!(date, utc(2003, 6, 10, 14, 41, 1));
    }

    #[test]
    fn test_free_form_layouts() {
        for (input, expected) in [
            ("2003-06-10 09:41:01", utc(2003, 6, 10, 9, 41, 1)),
            ("2003/06/10 09:41", utc(2003, 6, 10, 9, 41, 0)),
            ("10 Jun 2003", utc(2003, 6, 10, 0, 0, 0)),
            ("June 10, 2003", utc(2003, 6, 10, 0, 0, 0)),
            ("Tue Jun 10 09:41:01 2003", utc(2003, 6, 10, 9, 41, 1)),
            ("Tue, 10 Jun 2003 09:41:01", utc(2003, 6, 10, 9, 41, 1)),
            ("  2003-06-10   09:41:01 +0000 ", utc(2003, 6, 10, 9, 41, 1)),
        ] {
            let (date, fmt) = resolve_with_format(input)
                .unwrap_or_else(|| panic!("failed to resolve {input:?}"));
            assert_eq!(date, expected, "input {input:?}");
            assert_eq!(fmt, DateFormat::FreeForm, "input {input:?}");
        }
    }

    #[test]
    fn test_long_weekday_name() {
        let date = resolve_date("Tuesday, 10 Jun 2003 09:41:01 GMT").unwrap();
        assert_eq!(date, utc(2003, 6, 10, 9, 41, 1));
    }

    #[test]
    fn test_unparseable_is_absent() {
        assert!(resolve_date("not a date").is_none());
        assert!(resolve_date("").is_none());
        assert!(resolve_date("   ").is_none());
        assert!(resolve_date("2003-13-45").is_none());
    }

    #[test]
    fn test_without_weekday() {
        assert_eq!(without_weekday("Tuesday, 10 Jun 2003"), "10 Jun 2003");
        assert_eq!(without_weekday("Tue, 10 Jun 2003"), "Tue, 10 Jun 2003");
        assert_eq!(without_weekday("June 10, 2003"), "June 10, 2003");
    }

    proptest! {
        #[test]
        fn prop_resolve_never_panics(s in "\\PC{0,40}") {
            let _ = resolve_date(&s);
        }
    }
}
