//! Turn price text and JSON values into [`Price`] amounts.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::models::Price;

/// Currency symbol followed by an amount, optionally with thousands
/// separators and a two-digit fraction.
static SYMBOL_AMOUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[£$€]\s?(\d{1,3}(?:,\d{3})+(?:\.\d{2})?|\d+(?:\.\d{2})?)").unwrap()
});

static DECIMAL_AMOUNT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(\d+\.\d{2})\b").unwrap());

static INTEGER_AMOUNT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(\d+)\b").unwrap());

/// Integers at or above this are read as minor units by the embedded-JSON
/// strategy.
pub const PENCE_THRESHOLD: i64 = 1000;

const SENTINEL_MAJOR: i64 = 9_999_999_999;

/// Parse the first price found in free text.
///
/// A symbol-prefixed amount wins, so `"£58.50 £65.00"` yields the sale price.
/// Otherwise the first bare two-decimal amount, then the first bare integer.
pub fn parse_price_text(text: &str) -> Option<Price> {
    [&*SYMBOL_AMOUNT, &*DECIMAL_AMOUNT, &*INTEGER_AMOUNT]
        .into_iter()
        .find_map(|re| {
            re.captures(text)
                .and_then(|caps| Price::parse_decimal(caps.get(1)?.as_str()))
        })
}

/// Coerce a resolved field value into a price.
pub fn price_from_value(value: &Value) -> Option<Price> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .and_then(Price::from_major)
            .or_else(|| n.as_f64().and_then(Price::from_f64)),
        Value::String(s) => parse_price_text(s),
        _ => None,
    }
}

/// Reinterpret a large integer price as minor units.
///
/// Returns the replacement value when the heuristic applies: an integer (or
/// digits-only string) at or above [`PENCE_THRESHOLD`] is divided by 100.
/// The "unavailable" sentinel is left alone so it can still be recognised.
pub fn apply_pence_heuristic(value: &Value) -> Option<Value> {
    let minor = match value {
        Value::Number(n) => n.as_i64()?,
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            s.parse::<i64>().ok()?
        }
        _ => return None,
    };

    if minor < PENCE_THRESHOLD || minor == SENTINEL_MAJOR {
        return None;
    }
    Some(Value::from(minor as f64 / 100.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_symbol_amount_wins() {
        assert_eq!(parse_price_text("£58.50 £65.00"), Some(Price::from_minor(5850)));
        assert_eq!(parse_price_text("Now $1,299.00"), Some(Price::from_minor(129_900)));
        assert_eq!(parse_price_text("€ 12"), Some(Price::from_minor(1200)));
    }

    #[test]
    fn test_bare_amounts() {
        assert_eq!(parse_price_text("Price: 19.99 GBP"), Some(Price::from_minor(1999)));
        assert_eq!(parse_price_text("only 45 left"), Some(Price::from_minor(4500)));
        assert_eq!(parse_price_text("no price"), None);
        assert_eq!(parse_price_text(""), None);
    }

    #[test]
    fn test_price_from_value() {
        assert_eq!(price_from_value(&json!(12.5)), Some(Price::from_minor(1250)));
        assert_eq!(price_from_value(&json!(7)), Some(Price::from_minor(700)));
        assert_eq!(price_from_value(&json!("£3.20")), Some(Price::from_minor(320)));
        assert_eq!(price_from_value(&json!(null)), None);
        assert_eq!(price_from_value(&json!(-4)), None);
    }

    #[test]
    fn test_pence_heuristic() {
        let adjusted = apply_pence_heuristic(&json!("1299")).unwrap();
        assert_eq!(price_from_value(&adjusted), Some(Price::from_minor(1299)));

        let adjusted = apply_pence_heuristic(&json!(5000)).unwrap();
        assert_eq!(price_from_value(&adjusted), Some(Price::from_minor(5000)));

        assert_eq!(apply_pence_heuristic(&json!(999)), None);
        assert_eq!(apply_pence_heuristic(&json!(12.99)), None);
        assert_eq!(apply_pence_heuristic(&json!("12.99")), None);
        assert_eq!(apply_pence_heuristic(&json!(9_999_999_999_i64)), None);
    }
}
