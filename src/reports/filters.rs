//! Filter condition parsing
//!
//! Filter `data` strings are opaque everywhere except here: multi-value
//! selections and ranges are joined with the `#@#` delimiter
//! (e.g. `ANSWERED#@#PARTIAL`, `1746297000000#@#1748888999999`).

use chrono::{DateTime, TimeZone, Utc};

use crate::types::FilterSet;

/// Delimiter between values inside a filter condition's `data` string.
pub const MULTI_VALUE_DELIMITER: &str = "#@#";

/// Field path carrying the report date range in the page filter.
const CREATED_FIELD: &str = "meta.created";

/// Answer-status label attached to sheet titles and the FAQ filename,
/// derived from the `status` condition of the job filter.
pub fn sheet_suffix(filter: Option<&FilterSet>) -> &'static str {
    let Some(data) = filter
        .and_then(|f| f.condition("status"))
        .map(|c| c.data.as_str())
    else {
        return "All";
    };

    if data.contains("ANSWERED#@#NO_INFORMATION#@#PARTIAL") {
        "All"
    } else if data.contains("ANSWERED#@#PARTIAL") {
        "Answered"
    } else if data.contains("NO_INFORMATION") {
        "Unanswered"
    } else {
        "All"
    }
}

/// A report's date window, parsed from the page filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    /// Human form for sheet metadata: `"May 3, 2025 to Jun 2, 2025"`.
    pub fn display(&self) -> String {
        format!(
            "{} to {}",
            self.start.format("%b %-d, %Y"),
            self.end.format("%b %-d, %Y")
        )
    }

    /// Filename-safe form: `"May_3_2025_to_Jun_2_2025"`.
    pub fn file_label(&self) -> String {
        format!(
            "{}_to_{}",
            self.start.format("%b_%-d_%Y"),
            self.end.format("%b_%-d_%Y")
        )
    }
}

/// Parse `pageFilter.conditions["meta.created"].data` as
/// `"<start_ms>#@#<end_ms>"`, both UTC epoch milliseconds.
pub fn date_range(page_filter: Option<&FilterSet>) -> Option<DateRange> {
    let data = page_filter?.condition(CREATED_FIELD)?.data.as_str();
    let (start_raw, end_raw) = data.split_once(MULTI_VALUE_DELIMITER)?;
    let start = Utc.timestamp_millis_opt(start_raw.trim().parse().ok()?).single()?;
    let end = Utc.timestamp_millis_opt(end_raw.trim().parse().ok()?).single()?;
    Some(DateRange { start, end })
}

/// Date-range line for sheet metadata, with the documented fallback.
pub fn date_range_label(page_filter: Option<&FilterSet>) -> String {
    date_range(page_filter)
        .map(|r| r.display())
        .unwrap_or_else(|| "Date range not specified".to_string())
}

/// Render an epoch-millisecond timestamp as a cell date (`"May 3, 2025"`).
pub fn cell_date(epoch_ms: i64) -> String {
    Utc.timestamp_millis_opt(epoch_ms)
        .single()
        .map(|d| d.format("%b %-d, %Y").to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FilterCondition;
    use std::collections::BTreeMap;

    fn filter_with(field: &str, data: &str) -> FilterSet {
        let mut conditions = BTreeMap::new();
        conditions.insert(
            field.to_string(),
            FilterCondition {
                field: field.to_string(),
                data: data.to_string(),
                operation: "IN".to_string(),
            },
        );
        FilterSet {
            conditions,
            regex: String::new(),
        }
    }

    #[test]
    fn test_suffix_table() {
        let cases = [
            ("ANSWERED#@#NO_INFORMATION#@#PARTIAL", "All"),
            ("ANSWERED#@#PARTIAL", "Answered"),
            ("NO_INFORMATION", "Unanswered"),
            ("SOMETHING_ELSE", "All"),
        ];
        for (data, expected) in cases {
            let filter = filter_with("status", data);
            assert_eq!(sheet_suffix(Some(&filter)), expected, "data={data}");
        }
    }

    #[test]
    fn test_suffix_absent_filter_is_all() {
        assert_eq!(sheet_suffix(None), "All");
        let unrelated = filter_with("user", "42");
        assert_eq!(sheet_suffix(Some(&unrelated)), "All");
    }

    #[test]
    fn test_suffix_is_deterministic() {
        let filter = filter_with("status", "ANSWERED#@#PARTIAL");
        let first = sheet_suffix(Some(&filter));
        for _ in 0..10 {
            assert_eq!(sheet_suffix(Some(&filter)), first);
        }
    }

    #[test]
    fn test_date_range_display() {
        let filter = filter_with("meta.created", "1746297000000#@#1748888999999");
        let range = date_range(Some(&filter)).unwrap();
        assert_eq!(range.display(), "May 3, 2025 to Jun 2, 2025");
        assert_eq!(range.file_label(), "May_3_2025_to_Jun_2_2025");
    }

    #[test]
    fn test_date_range_label_fallback() {
        assert_eq!(date_range_label(None), "Date range not specified");
        let bad = filter_with("meta.created", "not-a-range");
        assert_eq!(date_range_label(Some(&bad)), "Date range not specified");
        let half = filter_with("meta.created", "17462970000000#@#banana");
        assert_eq!(date_range_label(Some(&half)), "Date range not specified");
    }

    #[test]
    fn test_cell_date_renders_without_zero_padding() {
        assert_eq!(cell_date(1746297000000), "May 3, 2025");
    }
}
