//! Print job models
//!
//! Jobs are immutable once submitted. Field-level problems (bad UPC,
//! non-numeric counts) degrade the affected section only.

use serde::{Deserialize, Serialize};

/// Length of a UPC-A code
pub const UPC_LEN: usize = 12;

/// A UPC-A value must be exactly 12 ASCII digits.
pub fn is_valid_upc(value: &str) -> bool {
    value.len() == UPC_LEN && value.bytes().all(|b| b.is_ascii_digit())
}

/// Parse the `upcs` request parameter.
///
/// Accepts a JSON array of numbers or strings (`[860012979325,"012345678905"]`)
/// or a single JSON scalar. Returns `None` when the value is not valid JSON;
/// callers log that and print no barcodes.
pub fn parse_upc_list(raw: &str) -> Option<Vec<String>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Some(Vec::new());
    }
    let value: serde_json::Value = serde_json::from_str(raw).ok()?;
    let scalar = |v: &serde_json::Value| match v {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    };
    match &value {
        serde_json::Value::Array(items) => Some(items.iter().filter_map(scalar).collect()),
        other => scalar(other).map(|s| vec![s]),
    }
}

/// Receipt print job
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ReceiptJob {
    /// Order identifier, also used for the backend print notification
    pub order_id: String,
    /// Heading text; falls back to the title-cased order id
    #[serde(default)]
    pub heading: Option<String>,
    /// Bold instruction line printed under the heading
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default)]
    pub body_lines: Vec<String>,
    #[serde(default)]
    pub upcs: Vec<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub wait_minutes: Option<u32>,
}

impl ReceiptJob {
    pub fn new(order_id: impl Into<String>) -> Self {
        Self {
            order_id: order_id.into(),
            ..Default::default()
        }
    }

    /// Heading to print, if any.
    pub fn heading_text(&self) -> Option<String> {
        match &self.heading {
            Some(h) if !h.trim().is_empty() => Some(h.clone()),
            _ if !self.order_id.trim().is_empty() => Some(title_case(&self.order_id)),
            _ => None,
        }
    }
}

/// Label print job
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct LabelJob {
    pub order: String,
    pub item: String,
    #[serde(default)]
    pub upcs: Vec<String>,
    /// Position of this item in the order, as received
    #[serde(default)]
    pub item_number: String,
    /// Number of items in the order, as received
    #[serde(default)]
    pub item_total: String,
    /// Backend fulfillment id; enables the feedback QR code and the label notification
    #[serde(default)]
    pub fulfillment: Option<String>,
    #[serde(default)]
    pub paid: bool,
}

impl LabelJob {
    /// `(n, total)` when both parse and the count is worth printing.
    pub fn item_count(&self) -> Option<(u32, u32)> {
        let number = self.item_number.trim().parse::<u32>().ok()?;
        let total = self.item_total.trim().parse::<u32>().ok()?;
        (total > 1 && number > 0).then_some((number, total))
    }

    /// Whether the feedback QR code goes on this label.
    pub fn wants_feedback_qr(&self) -> bool {
        let has_fulfillment = self.fulfillment.as_deref().is_some_and(|f| !f.is_empty());
        has_fulfillment && !self.item.is_empty() && (self.upcs.len() <= 1 || self.paid)
    }
}

/// Title-case every whitespace-separated word.
pub fn title_case(s: &str) -> String {
    s.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(|c| c.to_lowercase()))
                    .collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
