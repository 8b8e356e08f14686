//! Money amounts held exactly as minor currency units.

use std::fmt;

use serde::{Serialize, Serializer};

/// A non-negative amount in minor currency units (pence, cents).
///
/// Prices are compared and stored exactly; conversion to and from floating
/// point happens only at the storage and serialization boundaries, rounding
/// to the nearest minor unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Price(i64);

/// Marker some sites publish when a price is unavailable (9999999999.00).
pub const SENTINEL_PRICE: Price = Price(999_999_999_900);

impl Price {
    pub const ZERO: Price = Price(0);

    /// Create a price from minor units. Negative amounts clamp to zero.
    pub const fn from_minor(minor: i64) -> Self {
        if minor < 0 {
            Price(0)
        } else {
            Price(minor)
        }
    }

    /// Create a price from a whole number of major units.
    pub fn from_major(major: i64) -> Option<Self> {
        if major < 0 {
            return None;
        }
        major.checked_mul(100).map(Price)
    }

    /// Create a price from a floating point amount in major units.
    pub fn from_f64(value: f64) -> Option<Self> {
        if !value.is_finite() || value < 0.0 {
            return None;
        }
        let minor = (value * 100.0).round();
        if minor >= i64::MAX as f64 {
            return None;
        }
        Some(Price(minor as i64))
    }

    /// Parse a plain decimal amount such as `"1,299.00"`, `"58.5"` or `"12"`.
    ///
    /// Digits beyond the second fractional place round half up.
    pub fn parse_decimal(text: &str) -> Option<Self> {
        let cleaned: String = text.trim().chars().filter(|c| *c != ',').collect();
        let (whole, frac) = cleaned.split_once('.').unwrap_or((cleaned.as_str(), ""));

        if whole.is_empty() && frac.is_empty() {
            return None;
        }
        if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit())
        {
            return None;
        }

        let whole: i64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
        let mut digits = frac.chars().filter_map(|c| c.to_digit(10)).map(i64::from);
        let tenths = digits.next().unwrap_or(0);
        let hundredths = digits.next().unwrap_or(0);
        let round_up = digits.next().is_some_and(|d| d >= 5);

        let minor = whole
            .checked_mul(100)?
            .checked_add(tenths * 10 + hundredths + i64::from(round_up))?;
        Some(Price(minor))
    }

    pub fn minor_units(self) -> i64 {
        self.0
    }

    pub fn as_f64(self) -> f64 {
        self.0 as f64 / 100.0
    }

    pub fn is_sentinel(self) -> bool {
        self == SENTINEL_PRICE
    }

    /// Percentage by which `self` sits below `previous`; zero when not lower.
    pub fn percent_below(self, previous: Price) -> f64 {
        if previous.0 <= 0 || self >= previous {
            return 0.0;
        }
        (previous.0 - self.0) as f64 * 100.0 / previous.0 as f64
    }

    /// Difference to a higher previous price, or zero.
    pub fn saving_from(self, previous: Price) -> Price {
        Price(previous.0.saturating_sub(self.0).max(0))
    }

    /// Compact form used in notifications: `12` for whole amounts, `12.50` otherwise.
    pub fn short(self) -> String {
        if self.0 % 100 == 0 {
            (self.0 / 100).to_string()
        } else {
            self.to_string()
        }
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl Serialize for Price {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_decimal() {
        assert_eq!(Price::parse_decimal("58.50"), Some(Price::from_minor(5850)));
        assert_eq!(Price::parse_decimal("58.5"), Some(Price::from_minor(5850)));
        assert_eq!(Price::parse_decimal("12"), Some(Price::from_minor(1200)));
        assert_eq!(Price::parse_decimal("1,299.00"), Some(Price::from_minor(129_900)));
        assert_eq!(Price::parse_decimal("9.995"), Some(Price::from_minor(1000)));
        assert_eq!(Price::parse_decimal("abc"), None);
        assert_eq!(Price::parse_decimal(""), None);
        assert_eq!(Price::parse_decimal("-5"), None);
    }

    #[test]
    fn test_from_f64_rounds_to_minor_units() {
        assert_eq!(Price::from_f64(12.99), Some(Price::from_minor(1299)));
        assert_eq!(Price::from_f64(0.1 + 0.2), Some(Price::from_minor(30)));
        assert_eq!(Price::from_f64(-1.0), None);
        assert_eq!(Price::from_f64(f64::NAN), None);
    }

    #[test]
    fn test_sentinel() {
        assert!(Price::from_major(9_999_999_999).unwrap().is_sentinel());
        assert!(!Price::from_major(99).unwrap().is_sentinel());
    }

    #[test]
    fn test_percent_below() {
        let stored = Price::from_major(100).unwrap();
        let observed = Price::from_major(49).unwrap();
        assert_eq!(observed.percent_below(stored), 51.0);
        assert_eq!(stored.percent_below(observed), 0.0);
        assert_eq!(observed.percent_below(Price::ZERO), 0.0);
    }

    #[test]
    fn test_display_and_short() {
        let price = Price::from_minor(1250);
        assert_eq!(price.to_string(), "12.50");
        assert_eq!(price.short(), "12.50");
        assert_eq!(Price::from_minor(1200).short(), "12");
        assert_eq!(Price::from_minor(5).to_string(), "0.05");
    }

    #[test]
    fn test_serializes_as_number() {
        let json = serde_json::to_string(&Price::from_minor(5850)).unwrap();
        assert_eq!(json, "58.5");
    }
}
