//! Text decoding and number formatting helpers.
use encoding_rs::EUC_KR;
use std::borrow::Cow;
use tracing::debug;

const UTF8_BOM: &str = "\u{feff}";

/// Decode raw file contents.
///
/// Korean brokerages export EUC-KR (CP949) while everything else uses UTF-8. Input that is valid
/// UTF-8 is taken as-is (minus any byte order mark), anything else is decoded as EUC-KR with
/// malformed sequences replaced.
pub fn decode(bytes: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(bytes) {
        Ok(text) => Cow::Borrowed(text.strip_prefix(UTF8_BOM).unwrap_or(text)),
        Err(_) => {
            let (text, _, had_errors) = EUC_KR.decode(bytes);
            if had_errors {
                debug!("EUC-KR decoding replaced malformed sequences");
            }
            text
        }
    }
}

/// Format an integer with `,` thousands separators, e.g. `-1,234,567`.
pub fn group_thousands(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);

    if value < 0 {
        grouped.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    grouped
}
