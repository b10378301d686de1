//! Calendar date parsing for the date layouts found in brokerage exports.
use chrono::NaiveDate;

/// Accepted layouts, tried in order.
///
/// Korean brokers export `YYYY/MM/DD` or `YYYY-MM-DD`, US brokers export `MM/DD/YYYY`. The
/// layouts do not overlap, so the first successful parse is the only possible one.
pub const DATE_FORMATS: [&str; 5] = ["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d", "%Y%m%d", "%m/%d/%Y"];

/// Parse a calendar date in any of the [`DATE_FORMATS`].
///
/// Returns the error for the ISO layout when none match.
pub fn parse_date(s: &str) -> Result<NaiveDate, chrono::ParseError> {
    let s = s.trim();

    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(s, format).ok())
        .map_or_else(|| NaiveDate::parse_from_str(s, DATE_FORMATS[0]), Ok)
}
