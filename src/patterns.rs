// src/patterns.rs

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Label-prefixed merchant line. The labels are uppercase on real
    // receipts; the value capture stops at end of line.
    pub static ref MERCHANT_LABELED: Regex =
        Regex::new(r"\b(?:MERCHANT|STORE|RESTAURANT|VENDOR)\s*:\s*([A-Za-z0-9][A-Za-z0-9 &'\-\.]*)")
            .unwrap();

    // Fallback: a line that is entirely a capitalized phrase, usually the
    // letterhead at the top of the receipt.
    pub static ref MERCHANT_FIRST_LINE: Regex =
        Regex::new(r"(?m)^([A-Z][A-Za-z0-9 \t&'\-\.]+)$").unwrap();

    pub static ref TOTAL_LABELED: Regex =
        Regex::new(r"(?i)\b(?:TOTAL|AMOUNT|SUM)\s*:\s*\$?\s*(\d[\d,]*\.\d{2})").unwrap();

    // Any dollar-formatted number anywhere in the text.
    pub static ref BARE_AMOUNT: Regex = Regex::new(r"\$\s*(\d[\d,]*\.\d{2})").unwrap();

    pub static ref DATE_LABELED: Regex =
        Regex::new(r"(?i)\b(?:DATE|PURCHASED)\s*:\s*(\d{1,2}[/\-]\d{1,2}[/\-]\d{2,4})").unwrap();

    pub static ref DATE_BARE: Regex =
        Regex::new(r"\b(\d{1,2}[/\-]\d{1,2}[/\-]\d{2,4})\b").unwrap();

    pub static ref TAX_LABELED: Regex =
        Regex::new(r"(?i)\b(?:TAX|VAT|GST)\s*:\s*\$?\s*(\d[\d,]*\.\d{2})").unwrap();

    pub static ref SUBTOTAL_LABELED: Regex =
        Regex::new(r"(?i)\b(?:SUBTOTAL|SUB-TOTAL)\s*:\s*\$?\s*(\d[\d,]*\.\d{2})").unwrap();

    pub static ref PAYMENT_LABELED: Regex =
        Regex::new(r"(?i)\b(?:PAYMENT|PAID BY|METHOD)\s*:\s*([A-Za-z]+)").unwrap();

    pub static ref RECEIPT_NUMBER_LABELED: Regex =
        Regex::new(r"(?i)\b(?:RECEIPT|INVOICE|ORDER)[\s#:]*(?:NO\.?|NUMBER)?[\s#:]*([A-Za-z0-9][A-Za-z0-9\-]*)")
            .unwrap();
}
