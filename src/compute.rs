//! Totals and money formatting derived from a document's line items.
//!
//! Everything here is a pure function of its input.

use std::sync::LazyLock;

use regex::Regex;

use crate::model::{InvoiceData, LineItem};

static LEADING_INT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([+-]?\d+)").expect("valid integer pattern"));

static LEADING_DECIMAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([+-]?(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?)").expect("valid decimal pattern")
});

pub fn line_total(item: &LineItem) -> f64 {
    item.quantity as f64 * item.unit_price
}

pub fn subtotal(items: &[LineItem]) -> f64 {
    items.iter().fold(0.0, |acc, item| acc + line_total(item))
}

/// No taxes, discounts or fees are modelled, so this is the subtotal.
pub fn total(items: &[LineItem]) -> f64 {
    subtotal(items)
}

/// Two fractional digits with the symbol prepended verbatim: `$2497.00`.
pub fn format_money(symbol: &str, amount: f64) -> String {
    // -0.0 + 0.0 is +0.0, so a zero amount never prints as "-0.00"
    format!("{}{:.2}", symbol, amount + 0.0)
}

/// Display totals for a whole document.
#[derive(Debug, Clone, PartialEq)]
pub struct Totals {
    pub subtotal: f64,
    pub total: f64,
}

impl Totals {
    pub fn of(doc: &InvoiceData) -> Self {
        Self {
            subtotal: subtotal(&doc.items),
            total: total(&doc.items),
        }
    }
}

/// Quantity text to an integer: the leading whole number, or 0.
///
/// `"12abc"` gives 12 and `"3.9"` gives 3.
pub fn parse_quantity(input: &str) -> i64 {
    LEADING_INT
        .captures(input)
        .and_then(|caps| caps[1].parse::<i64>().ok())
        .unwrap_or(0)
}

/// Unit price text to a number: the leading decimal literal, or 0.
pub fn parse_unit_price(input: &str) -> f64 {
    LEADING_DECIMAL
        .captures(input)
        .and_then(|caps| caps[1].parse::<f64>().ok())
        .filter(|value| value.is_finite())
        .unwrap_or(0.0)
}
