// src/fields.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Stands in for a merchant no strategy could determine.
pub const UNKNOWN_MERCHANT: &str = "Unknown Merchant";

/// Stands in for a strategy that failed outright.
pub const MERCHANT_ERROR: &str = "Error extracting merchant";

/// Currency code used when none is captured.
pub const DEFAULT_CURRENCY: &str = "USD";

/// The canonical extraction record.
///
/// Every field is always present with either a captured value or its
/// documented default; the optional fields are absent, not zero, when
/// undetermined. The record is never partially constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedFields {
    pub merchant_name: String,
    pub total_amount: Decimal,
    pub purchased_at: DateTime<Utc>,
    pub currency: String,
    pub tax_amount: Option<Decimal>,
    pub subtotal_amount: Option<Decimal>,
    pub payment_method: Option<String>,
    pub receipt_number: Option<String>,
}

impl ExtractedFields {
    /// A record with every field at its default, anchored at `now`.
    pub fn defaulted(now: DateTime<Utc>) -> Self {
        Self {
            merchant_name: UNKNOWN_MERCHANT.to_string(),
            total_amount: Decimal::ZERO,
            purchased_at: now,
            currency: DEFAULT_CURRENCY.to_string(),
            tax_amount: None,
            subtotal_amount: None,
            payment_method: None,
            receipt_number: None,
        }
    }

    /// The record a strategy hands back when it failed outright.
    pub fn error_fallback(now: DateTime<Utc>) -> Self {
        Self {
            merchant_name: MERCHANT_ERROR.to_string(),
            ..Self::defaulted(now)
        }
    }

    /// A result is trustworthy only when some strategy actually identified
    /// the merchant.
    pub fn is_usable(&self) -> bool {
        self.merchant_name != UNKNOWN_MERCHANT && self.merchant_name != MERCHANT_ERROR
    }
}

/// What one extraction strategy produced. Both variants carry a complete
/// record, so the coordinator always has something well-formed to return.
#[derive(Debug, Clone)]
pub enum Outcome {
    Usable(ExtractedFields),
    Unusable { reason: String, fields: ExtractedFields },
}

impl Outcome {
    /// Classify a finished record, tagging unusable ones with `reason`.
    pub fn from_fields(fields: ExtractedFields, reason: &str) -> Self {
        if fields.is_usable() {
            Outcome::Usable(fields)
        } else {
            Outcome::Unusable {
                reason: reason.to_string(),
                fields,
            }
        }
    }

    pub fn into_fields(self) -> ExtractedFields {
        match self {
            Outcome::Usable(fields) => fields,
            Outcome::Unusable { fields, .. } => fields,
        }
    }

    pub fn is_usable(&self) -> bool {
        matches!(self, Outcome::Usable(_))
    }
}

/// Parse a money string such as "$2,254.00", tolerating one leading currency
/// symbol and thousands separators. Negative amounts are rejected.
pub(crate) fn parse_money(raw: &str) -> Option<Decimal> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.starts_with('-') {
        return None;
    }
    let cleaned: String = trimmed
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    if !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    cleaned.parse::<Decimal>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn parses_symbols_and_separators() {
        assert_eq!(parse_money("$2,254.00"), Some("2254.00".parse().unwrap()));
        assert_eq!(parse_money("$45.50"), Some("45.50".parse().unwrap()));
        assert_eq!(parse_money("12.00"), Some("12.00".parse().unwrap()));
        assert_eq!(parse_money("  $ 1,000.99 "), Some("1000.99".parse().unwrap()));
    }

    #[test]
    fn rejects_junk_amounts() {
        assert_eq!(parse_money(""), None);
        assert_eq!(parse_money("n/a"), None);
        assert_eq!(parse_money("-5.00"), None);
        assert_eq!(parse_money("1.2.3"), None);
    }

    #[test]
    fn sentinels_are_unusable() {
        let mut fields = ExtractedFields::defaulted(now());
        assert!(!fields.is_usable());

        fields.merchant_name = MERCHANT_ERROR.to_string();
        assert!(!fields.is_usable());

        fields.merchant_name = "Joe's Diner".to_string();
        assert!(fields.is_usable());
    }

    #[test]
    fn default_records_are_fully_populated() {
        let fields = ExtractedFields::defaulted(now());
        assert_eq!(fields.merchant_name, UNKNOWN_MERCHANT);
        assert_eq!(fields.total_amount, Decimal::ZERO);
        assert_eq!(fields.purchased_at, now());
        assert_eq!(fields.currency, DEFAULT_CURRENCY);
        assert_eq!(fields.tax_amount, None);
        assert_eq!(fields.subtotal_amount, None);
        assert_eq!(fields.payment_method, None);
        assert_eq!(fields.receipt_number, None);

        let errored = ExtractedFields::error_fallback(now());
        assert_eq!(errored.merchant_name, MERCHANT_ERROR);
        assert_eq!(errored.total_amount, Decimal::ZERO);
    }

    #[test]
    fn outcome_classification_follows_the_merchant() {
        let usable = Outcome::from_fields(
            ExtractedFields {
                merchant_name: "Acme Corp".to_string(),
                ..ExtractedFields::defaulted(now())
            },
            "unused",
        );
        assert!(usable.is_usable());

        let unusable = Outcome::from_fields(ExtractedFields::defaulted(now()), "no merchant");
        assert!(!unusable.is_usable());
        assert_eq!(unusable.into_fields().merchant_name, UNKNOWN_MERCHANT);
    }
}
