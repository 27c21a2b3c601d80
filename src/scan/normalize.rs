//! Response normalization
//!
//! Turns loosely-typed model output into an [`ExtractionResult`]. Everything
//! here is total: malformed fields fall back to defaults instead of failing.

use chrono::{DateTime, NaiveDate};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

use super::types::{Category, ExtractionResult, MAX_DESCRIPTION_CHARS};

pub const NOT_A_RECEIPT: &str = "Not a receipt";

pub const FALLBACK_DESCRIPTION: &str = "Receipt (manual extraction)";
pub const FALLBACK_MERCHANT: &str = "Unknown";
pub const FALLBACK_WARNING: &str =
    "Could not access AI. Manual extraction attempted. Please review the extracted data.";

lazy_static! {
    /// Integer part with one consistent thousands separator, then an optional
    /// 1-2 digit decimal part after `.` or `,`
    static ref AMOUNT_PATTERN: Regex = Regex::new(
        r"(\d{1,3}(?:,\d{3})+|\d{1,3}(?:\.\d{3})+|\d{1,3}(?:[ \u{00a0}]\d{3})+|\d+)(?:[.,](\d{1,2})\b)?"
    ).unwrap();
}

/// Remove markdown code fences (```` ``` ```` or ```` ```json ````) wrapped around the payload
pub fn strip_code_fences(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(idx) = rest.find("```") {
        out.push_str(&rest[..idx]);
        rest = &rest[idx + 3..];
        rest = rest.strip_prefix("json").unwrap_or(rest);
        rest = rest
            .strip_prefix("\r\n")
            .or_else(|| rest.strip_prefix('\n'))
            .unwrap_or(rest);
    }
    out.push_str(rest);

    out.trim().to_string()
}

/// Normalize parsed model output into the fixed result shape
pub fn normalize(value: &Value, today: NaiveDate) -> ExtractionResult {
    let amount = coerce_amount(value.get("amount"));
    let description = string_field(value, "description");

    if amount == 0.0 && description.trim().eq_ignore_ascii_case(NOT_A_RECEIPT) {
        return not_a_receipt();
    }

    ExtractionResult {
        amount,
        date: coerce_date(value.get("date"), today),
        description: truncate_chars(description.trim(), MAX_DESCRIPTION_CHARS),
        merchant_name: string_field(value, "merchantName").trim().to_string(),
        category: value
            .get("category")
            .and_then(Value::as_str)
            .and_then(Category::parse)
            .unwrap_or_default()
            .as_str()
            .to_string(),
        from_fallback: None,
        warning: None,
    }
}

/// Placeholder record returned when no backend answered
pub fn fallback_record(today: NaiveDate) -> ExtractionResult {
    ExtractionResult {
        amount: 0.0,
        date: format_date(today),
        description: FALLBACK_DESCRIPTION.to_string(),
        merchant_name: FALLBACK_MERCHANT.to_string(),
        category: Category::OtherExpense.as_str().to_string(),
        from_fallback: Some(true),
        warning: Some(FALLBACK_WARNING.to_string()),
    }
}

fn not_a_receipt() -> ExtractionResult {
    ExtractionResult {
        amount: 0.0,
        date: String::new(),
        description: NOT_A_RECEIPT.to_string(),
        merchant_name: String::new(),
        category: String::new(),
        from_fallback: None,
        warning: None,
    }
}

fn coerce_amount(value: Option<&Value>) -> f64 {
    let amount = match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => parse_amount(s).unwrap_or(0.0),
        _ => 0.0,
    };

    if amount.is_finite() {
        amount.abs()
    } else {
        0.0
    }
}

// Accepts "12.99", "$12.99", "1,234.50 USD", "12,99", "1.234,56 EUR"
fn parse_amount(raw: &str) -> Option<f64> {
    let caps = AMOUNT_PATTERN.captures(raw)?;
    let integer: String = caps[1].chars().filter(char::is_ascii_digit).collect();

    let amount = match caps.get(2) {
        Some(decimal) => format!("{}.{}", integer, decimal.as_str()),
        None => integer,
    };
    amount.parse::<f64>().ok()
}

fn coerce_date(value: Option<&Value>, today: NaiveDate) -> String {
    let parsed = value.and_then(Value::as_str).map(str::trim).and_then(|raw| {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
            .or_else(|| {
                raw.get(..10)
                    .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
            })
    });

    format_date(parsed.unwrap_or(today))
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn string_field(value: &Value, key: &str) -> String {
    match value.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
