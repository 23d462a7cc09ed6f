// src/ai_extract.rs

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{AiBackend, AiSection};
use crate::fields::{self, ExtractedFields, Outcome};
use crate::pipeline::FieldExtraction;

/// The instruction that tells the model exactly which fields to extract.
const SYSTEM_PROMPT: &str = r#"Extract the fields below from the provided receipt text.

purchased_at      Date and time of purchase
merchant_name     Merchant name
total_amount      Total amount spent
currency          Currency used in the transaction
tax_amount        Tax amount
subtotal_amount   Subtotal amount before tax
payment_method    Payment method used
receipt_number    Receipt/invoice/transaction number

Reply with one line per field, formatted exactly as:
* **field_name**: value"#;

/// Keep request bodies within the model's context budget.
const MAX_PROMPT_CHARS: usize = 12_000;

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Resolved endpoint configuration ready to make API calls.
#[derive(Debug, Clone)]
pub struct ResolvedEndpoint {
    pub base_url: String,
    pub model: String,
    pub api_key: String,
}

/// Resolve the `[ai]` config section into a concrete endpoint.
pub fn resolve_endpoint(ai: &AiSection) -> Result<ResolvedEndpoint, Box<dyn std::error::Error>> {
    match ai.backend {
        AiBackend::Ollama => {
            info!(url = %ai.base_url, model = %ai.model, "Using Ollama (local) backend");
            Ok(ResolvedEndpoint {
                base_url: ai.base_url.clone(),
                model: ai.model.clone(),
                api_key: "ollama".to_string(), // required by the API but ignored
            })
        }
        AiBackend::Remote => {
            let api_key = std::env::var(&ai.api_key_env).map_err(|_| {
                format!("{} env var required for the remote backend", ai.api_key_env)
            })?;
            info!(url = %ai.base_url, model = %ai.model, "Using remote API backend");
            Ok(ResolvedEndpoint {
                base_url: ai.base_url.clone(),
                model: ai.model.clone(),
                api_key,
            })
        }
        AiBackend::Patterns => Err("patterns backend selected, no AI endpoint to resolve".into()),
    }
}

/// Extracts receipt fields by sending the raw text to a chat-completions
/// service and parsing the formatted reply.
///
/// This extractor never fails outward: transport errors, non-2xx statuses,
/// and unparsable replies all collapse into an unusable outcome carrying the
/// error-sentinel record. Callers needing finer diagnostics get them from
/// the logs emitted at this boundary.
pub struct AiFieldExtractor {
    client: Client,
    endpoint: ResolvedEndpoint,
    timeout: Duration,
}

impl AiFieldExtractor {
    pub fn new(endpoint: ResolvedEndpoint, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            endpoint,
            timeout,
        }
    }

    async fn call_service(
        &self,
        text: &str,
    ) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
        // Truncate very long receipts, flooring to a char boundary.
        let mut cut = MAX_PROMPT_CHARS.min(text.len());
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        let text = &text[..cut];

        let request = ChatRequest {
            model: self.endpoint.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: text.to_string(),
                },
            ],
            temperature: 0.0,
        };

        let url = format!("{}/chat/completions", self.endpoint.base_url);
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.endpoint.api_key))
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(format!("extraction service error {status}: {body}").into());
        }

        let chat_response: ChatResponse = response.json().await?;
        let content = chat_response
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or("empty response from extraction service")?;
        Ok(content.to_string())
    }
}

#[async_trait]
impl FieldExtraction for AiFieldExtractor {
    fn name(&self) -> &'static str {
        "ai"
    }

    async fn extract(&self, text: &str) -> Outcome {
        let now = Utc::now();
        match self.call_service(text).await {
            Ok(reply) => {
                let fields = parse_reply(&reply, now);
                Outcome::from_fields(fields, "reply did not identify the merchant")
            }
            Err(e) => {
                warn!(error = %e, "AI extraction failed");
                Outcome::Unusable {
                    reason: e.to_string(),
                    fields: ExtractedFields::error_fallback(now),
                }
            }
        }
    }
}

/// Parse the service's formatted reply into a record, field by field.
///
/// Each field is independent and tolerant of partial replies: a missing or
/// unparsable label leaves that field at its default and touches nothing
/// else.
fn parse_reply(reply: &str, now: DateTime<Utc>) -> ExtractedFields {
    let mut fields = ExtractedFields::defaulted(now);

    if let Some(value) = reply_value(reply, "merchant_name") {
        fields.merchant_name = value.to_string();
    }
    if let Some(value) = reply_value(reply, "total_amount") {
        if let Some(amount) = fields::parse_money(value) {
            fields.total_amount = amount;
        }
    }
    if let Some(value) = reply_value(reply, "purchased_at") {
        match parse_datetime_loose(value) {
            Some(ts) => fields.purchased_at = ts,
            // Keep the extraction-time default rather than failing the call.
            None => warn!(value = %value, "Could not parse purchase date from reply"),
        }
    }
    if let Some(value) = reply_value(reply, "currency") {
        if is_hedged_currency(value) {
            warn!(value = %value, "Discarding hedged currency value");
        } else {
            fields.currency = value.to_string();
        }
    }
    fields.tax_amount = reply_value(reply, "tax_amount").and_then(fields::parse_money);
    fields.subtotal_amount = reply_value(reply, "subtotal_amount").and_then(fields::parse_money);
    fields.payment_method = reply_value(reply, "payment_method").map(str::to_string);
    fields.receipt_number = reply_value(reply, "receipt_number").map(str::to_string);

    fields
}

/// Locate a `**field**: value` line in the reply. The value runs to the end
/// of the line, the end of the reply, or the next bold marker.
fn reply_value<'a>(reply: &'a str, field: &str) -> Option<&'a str> {
    // Same-line whitespace only, so a label with nothing after it never
    // swallows the following line.
    let re = Regex::new(&format!(r"\*\*{field}\*\*:[ \t]*(.+?)(?:\n|\*\*|$)")).ok()?;
    let value = re.captures(reply)?.get(1)?.as_str().trim();
    (!value.is_empty()).then_some(value)
}

/// The service sometimes emits commentary instead of a bare currency code,
/// e.g. "(not explicitly mentioned, assume USD)".
fn is_hedged_currency(value: &str) -> bool {
    value.is_empty() || value.contains('(') || value.to_lowercase().contains("assume")
}

/// Best-effort parse of the free-form dates the service replies with.
fn parse_datetime_loose(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }

    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%m/%d/%Y %H:%M",
        "%B %d, %Y %H:%M",
    ];
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt.and_utc());
        }
    }

    const DATE_FORMATS: &[&str] = &[
        "%Y-%m-%d",
        "%m/%d/%Y",
        "%m/%d/%y",
        "%m-%d-%Y",
        "%m-%d-%y",
        "%B %d, %Y",
        "%b %d, %Y",
        "%d %B %Y",
    ];
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, fmt) {
            return Some(date.and_hms_opt(0, 0, 0)?.and_utc());
        }
    }

    None
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
    fn parses_a_partial_reply() {
        let reply = "Here are the extracted fields:\n\n\
                     * **merchant_name**: Acme Corp\n\
                     * **total_amount**: $12.00\n";
        let fields = parse_reply(reply, now());

        assert_eq!(fields.merchant_name, "Acme Corp");
        assert_eq!(fields.total_amount, "12.00".parse().unwrap());
        assert_eq!(fields.purchased_at, now());
        assert_eq!(fields.currency, "USD");
        assert_eq!(fields.tax_amount, None);
        assert_eq!(fields.subtotal_amount, None);
        assert_eq!(fields.payment_method, None);
        assert_eq!(fields.receipt_number, None);
        assert!(fields.is_usable());
    }

    #[test]
    fn parses_a_full_reply() {
        let reply = "* **purchased_at**: 03/15/2024\n\
                     * **merchant_name**: Joe's Diner\n\
                     * **total_amount**: $2,254.00\n\
                     * **currency**: EUR\n\
                     * **tax_amount**: $3.67\n\
                     * **subtotal_amount**: $2,250.33\n\
                     * **payment_method**: Credit Card\n\
                     * **receipt_number**: R-2024-0315\n";
        let fields = parse_reply(reply, now());

        assert_eq!(fields.merchant_name, "Joe's Diner");
        assert_eq!(fields.total_amount, "2254.00".parse().unwrap());
        assert_eq!(
            fields.purchased_at,
            Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap()
        );
        assert_eq!(fields.currency, "EUR");
        assert_eq!(fields.tax_amount, Some("3.67".parse().unwrap()));
        assert_eq!(fields.subtotal_amount, Some("2250.33".parse().unwrap()));
        assert_eq!(fields.payment_method.as_deref(), Some("Credit Card"));
        assert_eq!(fields.receipt_number.as_deref(), Some("R-2024-0315"));
    }

    #[test]
    fn missing_merchant_stays_at_the_sentinel() {
        let fields = parse_reply("* **total_amount**: $5.00\n", now());
        assert_eq!(fields.merchant_name, crate::fields::UNKNOWN_MERCHANT);
        assert!(!fields.is_usable());
    }

    #[test]
    fn hedged_currency_is_discarded() {
        let reply = "* **merchant_name**: Acme Corp\n\
                     * **currency**: (not explicitly mentioned, assume USD)\n";
        let fields = parse_reply(reply, now());
        assert_eq!(fields.currency, "USD");
    }

    #[test]
    fn unparsable_date_keeps_the_default() {
        let reply = "* **merchant_name**: Acme Corp\n\
                     * **purchased_at**: [date/time]\n";
        let fields = parse_reply(reply, now());
        assert_eq!(fields.purchased_at, now());
    }

    #[test]
    fn value_ends_at_the_next_bold_marker() {
        let reply = "**merchant_name**: Acme Corp **total_amount**: $5.00";
        assert_eq!(reply_value(reply, "merchant_name"), Some("Acme Corp"));
        assert_eq!(reply_value(reply, "total_amount"), Some("$5.00"));
    }

    #[test]
    fn blank_values_count_as_missing() {
        assert_eq!(reply_value("**merchant_name**:   \nrest", "merchant_name"), None);
        assert_eq!(reply_value("no labels here", "merchant_name"), None);
    }

    #[test]
    fn loose_date_formats_parse() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap();
        assert_eq!(parse_datetime_loose("2024-03-15"), Some(expected));
        assert_eq!(parse_datetime_loose("03/15/2024"), Some(expected));
        assert_eq!(parse_datetime_loose("March 15, 2024"), Some(expected));
        assert_eq!(parse_datetime_loose("not a date"), None);
    }
}
