// src/pattern_extract.rs

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use rust_decimal::Decimal;

use crate::fields::{self, DEFAULT_CURRENCY, ExtractedFields, Outcome, UNKNOWN_MERCHANT};
use crate::patterns;
use crate::pipeline::FieldExtraction;

/// Deterministic fallback extractor: a fixed battery of label-anchored
/// patterns, resolved independently per field, first match wins.
pub struct PatternExtractor;

impl PatternExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Build the full record from `text`, defaulting every unresolved field.
    pub fn extract_fields(&self, text: &str, now: DateTime<Utc>) -> ExtractedFields {
        ExtractedFields {
            merchant_name: extract_merchant(text)
                .unwrap_or_else(|| UNKNOWN_MERCHANT.to_string()),
            total_amount: extract_total(text).unwrap_or(Decimal::ZERO),
            purchased_at: extract_date(text).unwrap_or(now),
            // This path never attempts symbol-to-code mapping.
            currency: DEFAULT_CURRENCY.to_string(),
            tax_amount: labeled_amount(&patterns::TAX_LABELED, text),
            subtotal_amount: labeled_amount(&patterns::SUBTOTAL_LABELED, text),
            payment_method: capture_trimmed(&patterns::PAYMENT_LABELED, text),
            receipt_number: capture_trimmed(&patterns::RECEIPT_NUMBER_LABELED, text),
        }
    }
}

impl Default for PatternExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FieldExtraction for PatternExtractor {
    fn name(&self) -> &'static str {
        "patterns"
    }

    async fn extract(&self, text: &str) -> Outcome {
        let fields = self.extract_fields(text, Utc::now());
        Outcome::from_fields(fields, "no merchant pattern matched")
    }
}

fn extract_merchant(text: &str) -> Option<String> {
    if let Some(cap) = patterns::MERCHANT_LABELED.captures(text) {
        return Some(cap[1].trim().to_string());
    }
    // No label anywhere: fall back to the letterhead heuristic.
    patterns::MERCHANT_FIRST_LINE
        .captures(text)
        .map(|cap| cap[1].trim().to_string())
}

/// Labeled totals win; among several labeled matches the largest is taken,
/// since the grand total sits above sub-totals. With no label at all, the
/// largest dollar-formatted number in the text stands in.
fn extract_total(text: &str) -> Option<Decimal> {
    let labeled = patterns::TOTAL_LABELED
        .captures_iter(text)
        .filter_map(|cap| fields::parse_money(&cap[1]))
        .max();
    if labeled.is_some() {
        return labeled;
    }
    patterns::BARE_AMOUNT
        .captures_iter(text)
        .filter_map(|cap| fields::parse_money(&cap[1]))
        .max()
}

fn extract_date(text: &str) -> Option<DateTime<Utc>> {
    let raw = patterns::DATE_LABELED
        .captures(text)
        .or_else(|| patterns::DATE_BARE.captures(text))?;
    let date = parse_mdy(raw[1].trim())?;
    Some(date.and_hms_opt(0, 0, 0)?.and_utc())
}

/// Split a slash- or dash-separated token as month/day/year. Two-digit
/// years are promoted to the 2000s.
fn parse_mdy(raw: &str) -> Option<NaiveDate> {
    let sep = if raw.contains('/') { '/' } else { '-' };
    let mut parts = raw.split(sep);
    let month: u32 = parts.next()?.trim().parse().ok()?;
    let day: u32 = parts.next()?.trim().parse().ok()?;
    let year_raw = parts.next()?.trim();
    let mut year: i32 = year_raw.parse().ok()?;
    if year_raw.len() == 2 {
        year += 2000;
    }
    NaiveDate::from_ymd_opt(year, month, day)
}

fn labeled_amount(re: &Regex, text: &str) -> Option<Decimal> {
    fields::parse_money(&re.captures(text)?[1])
}

fn capture_trimmed(re: &Regex, text: &str) -> Option<String> {
    Some(re.captures(text)?[1].trim().to_string())
}
