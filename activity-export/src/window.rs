use chrono::{DateTime, FixedOffset, Utc};
use chrono_tz::Tz;
use serde_json::Value;
use tracing::warn;

use crate::error::ConfigError;
use crate::value::{truncate, Lookup};

/// One end of the time window. The raw string is what gets sent to the API,
/// the instant is what local filtering compares against, and both come from
/// the same input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bound {
    raw: String,
    at: DateTime<Utc>,
}

impl Bound {
    pub fn parse(name: &'static str, raw: &str) -> Result<Self, ConfigError> {
        let raw = raw.trim();
        let at = parse_timestamp(raw).map_err(|source| ConfigError::InvalidTimestamp {
            name,
            value: raw.to_owned(),
            source,
        })?;
        Ok(Self {
            raw: raw.to_owned(),
            at,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn at(&self) -> DateTime<Utc> {
        self.at
    }
}

/// Parse an ISO-8601 instant with a `Z` or numeric offset into UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::<FixedOffset>::parse_from_rfc3339(raw.trim()).map(|dt| dt.with_timezone(&Utc))
}

/// An optional, inclusive `[since, until]` range, fixed for the whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimeWindow {
    since: Option<Bound>,
    until: Option<Bound>,
}

impl TimeWindow {
    /// Build a window from the configured strings. Unset or blank bounds are
    /// open; a bound that doesn't parse is a configuration error.
    pub fn new(since: Option<&str>, until: Option<&str>) -> Result<Self, ConfigError> {
        let since = since
            .filter(|s| !s.trim().is_empty())
            .map(|s| Bound::parse("SINCE", s))
            .transpose()?;
        let until = until
            .filter(|s| !s.trim().is_empty())
            .map(|s| Bound::parse("UNTIL", s))
            .transpose()?;
        Ok(Self { since, until })
    }

    pub fn since(&self) -> Option<&Bound> {
        self.since.as_ref()
    }

    pub fn until(&self) -> Option<&Bound> {
        self.until.as_ref()
    }

    /// Whether a timestamp falls inside the window. Missing or unparsable
    /// timestamps are let through.
    pub fn in_range(&self, timestamp: Option<&str>) -> bool {
        let Some(raw) = timestamp.filter(|t| !t.trim().is_empty()) else {
            return true;
        };
        let at = match parse_timestamp(raw) {
            Ok(at) => at,
            Err(e) => {
                warn!(
                    "Unparsable timestamp {:?} treated as in range: {e}",
                    truncate(raw, 50)
                );
                return true;
            }
        };
        if let Some(since) = &self.since {
            if at < since.at {
                return false;
            }
        }
        if let Some(until) = &self.until {
            if at > until.at {
                return false;
            }
        }
        true
    }

    /// Filter a raw record by its best-available timestamp: `updated_at`,
    /// falling back to `created_at`.
    pub fn contains(&self, record: &Value) -> bool {
        let timestamp = record
            .opt_str("updated_at")
            .or_else(|| record.opt_str("created_at"));
        self.in_range(timestamp.as_deref())
    }

    /// Append the window to `url` as query parameters, for endpoints that
    /// filter server-side. Values are percent-encoded so a `+hh:mm` offset
    /// survives the trip.
    pub fn render_query(&self, url: &str, since_param: &str, until_param: &str) -> String {
        let mut params = Vec::with_capacity(2);
        if let Some(since) = &self.since {
            params.push(format!("{since_param}={}", urlencoding::encode(since.as_str())));
        }
        if let Some(until) = &self.until {
            params.push(format!("{until_param}={}", urlencoding::encode(until.as_str())));
        }
        if params.is_empty() {
            return url.to_owned();
        }
        format!("{url}{}{}", query_separator(url), params.join("&"))
    }

    /// Name of the directory CSV output lands in when none is configured.
    /// The precision letter reflects the window width: D up to a week, W up
    /// to a month, M up to a quarter, Q beyond.
    pub fn output_dir_name(&self, tz: Tz, now: DateTime<Utc>) -> String {
        let end = self.until.as_ref().map(|b| b.at).unwrap_or(now);
        let end_local = end.with_timezone(&tz);

        let Some(since) = &self.since else {
            return format!("Audit_Output_All_19700101-{}", end_local.format("%Y%m%d"));
        };

        let start_local = since.at.with_timezone(&tz);
        let days = (end - since.at).num_days();
        let precision = match days {
            d if d <= 7 => 'D',
            d if d <= 30 => 'W',
            d if d <= 90 => 'M',
            _ => 'Q',
        };
        format!(
            "Audit_Output_{precision}_{}-{}",
            start_local.format("%Y%m%d"),
            end_local.format("%Y%m%d")
        )
    }
}

/// `?` for a URL without a query string yet, `&` otherwise.
pub fn query_separator(url: &str) -> char {
    if url.contains('?') {
        '&'
    } else {
        '?'
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    fn window(since: Option<&str>, until: Option<&str>) -> TimeWindow {
        TimeWindow::new(since, until).unwrap()
    }

    #[test]
    fn test_z_suffix_matches_explicit_utc_offset() {
        for ts in [
            "2024-11-27T00:00:00Z",
            "2024-02-29T23:59:59.123Z",
            "1999-12-31T12:00:00Z",
        ] {
            let explicit = ts.replace('Z', "+00:00");
            assert_eq!(
                parse_timestamp(ts).unwrap(),
                parse_timestamp(&explicit).unwrap(),
                "{ts}"
            );
        }
    }

    #[test]
    fn test_offsets_normalize_to_utc() {
        let local = parse_timestamp("2024-01-01T08:00:00+08:00").unwrap();
        assert_eq!(local, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_bounds_are_inclusive() {
        let w = window(Some("2024-01-01T00:00:00Z"), Some("2024-01-31T00:00:00Z"));

        assert!(w.in_range(Some("2024-01-01T00:00:00Z")));
        assert!(w.in_range(Some("2024-01-31T00:00:00Z")));
        assert!(w.in_range(Some("2024-01-15T10:00:00Z")));
        assert!(!w.in_range(Some("2023-12-31T23:59:59Z")));
        assert!(!w.in_range(Some("2024-01-31T00:00:01Z")));
    }

    #[test]
    fn test_single_bound_checks_only_that_bound() {
        let since_only = window(Some("2024-01-01T00:00:00Z"), None);
        assert!(since_only.in_range(Some("2099-01-01T00:00:00Z")));
        assert!(!since_only.in_range(Some("2000-01-01T00:00:00Z")));

        let until_only = window(None, Some("2024-01-01T00:00:00Z"));
        assert!(until_only.in_range(Some("2000-01-01T00:00:00Z")));
        assert!(!until_only.in_range(Some("2099-01-01T00:00:00Z")));
    }

    #[test]
    fn test_missing_or_garbage_timestamps_fail_open() {
        let w = window(Some("2024-01-01T00:00:00Z"), Some("2024-01-02T00:00:00Z"));
        assert!(w.in_range(None));
        assert!(w.in_range(Some("")));
        assert!(w.in_range(Some("yesterday")));
    }

    #[test]
    fn test_contains_prefers_updated_at() {
        let w = window(Some("2024-01-01T00:00:00Z"), None);
        let record = json!({"created_at": "2023-06-01T00:00:00Z", "updated_at": "2024-02-01T00:00:00Z"});
        assert!(w.contains(&record));

        let stale = json!({"created_at": "2023-06-01T00:00:00Z"});
        assert!(!w.contains(&stale));

        assert!(w.contains(&json!({"name": "no timestamps"})));
    }

    #[test]
    fn test_invalid_bound_is_a_config_error() {
        assert!(TimeWindow::new(Some("last tuesday"), None).is_err());
        assert_eq!(TimeWindow::new(Some("  "), None).unwrap(), TimeWindow::default());
    }

    #[test]
    fn test_render_query_separator() {
        let w = window(Some("2024-01-01T00:00:00Z"), Some("2024-02-01T00:00:00Z"));

        assert_eq!(
            w.render_query("https://h/api/v4/projects/1/repository/commits", "since", "until"),
            "https://h/api/v4/projects/1/repository/commits?since=2024-01-01T00%3A00%3A00Z&until=2024-02-01T00%3A00%3A00Z"
        );

        let rendered = w.render_query("https://h/api/v4/projects?a=1", "updated_after", "updated_before");
        assert_eq!(
            rendered,
            "https://h/api/v4/projects?a=1&updated_after=2024-01-01T00%3A00%3A00Z&updated_before=2024-02-01T00%3A00%3A00Z"
        );
        assert_eq!(rendered.matches('?').count(), 1);
    }

    #[test]
    fn test_render_query_without_bounds_is_identity() {
        let url = "https://h/api/v4/audit_events";
        assert_eq!(TimeWindow::default().render_query(url, "created_after", "created_before"), url);

        let until_only = window(None, Some("2024-02-01T00:00:00Z"));
        assert_eq!(
            until_only.render_query(url, "created_after", "created_before"),
            "https://h/api/v4/audit_events?created_before=2024-02-01T00%3A00%3A00Z"
        );
    }

    #[test]
    fn test_render_query_encodes_offsets() {
        let w = window(Some("2024-01-01T08:00:00+08:00"), None);
        assert_eq!(
            w.render_query("https://h/api/v4/audit_events", "created_after", "created_before"),
            "https://h/api/v4/audit_events?created_after=2024-01-01T08%3A00%3A00%2B08%3A00"
        );
    }

    #[test]
    fn test_output_dir_name() {
        let tz: Tz = "Asia/Shanghai".parse().unwrap();
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 20, 0, 0).unwrap();

        assert_eq!(
            TimeWindow::default().output_dir_name(tz, now),
            "Audit_Output_All_19700101-20240311"
        );

        let week = window(Some("2024-03-01T00:00:00Z"), Some("2024-03-05T00:00:00Z"));
        assert_eq!(week.output_dir_name(tz, now), "Audit_Output_D_20240301-20240305");

        let month = window(Some("2024-02-01T00:00:00Z"), Some("2024-02-20T00:00:00Z"));
        assert_eq!(month.output_dir_name(tz, now), "Audit_Output_W_20240201-20240220");

        let quarter = window(Some("2024-01-01T00:00:00Z"), None);
        assert_eq!(quarter.output_dir_name(tz, now), "Audit_Output_M_20240101-20240311");

        let year = window(Some("2023-01-01T00:00:00Z"), Some("2024-01-01T00:00:00Z"));
        assert_eq!(year.output_dir_name(tz, now), "Audit_Output_Q_20230101-20240101");
    }
}
