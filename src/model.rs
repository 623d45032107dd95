use std::sync::Arc;

use chrono::{Datelike, Duration, Local, NaiveDate};
use serde::{Deserialize, Serialize};

pub const GUARANTEE_TEXT: &str = r#"PAYMENT TERMS:
Full payment is due prior to the start of services.

REFUND & GURU GUARANTEE:
"I do refund if student follow what I did and no personal issue but still not pass within 3 prop firm challenges."

ADDITIONAL CONDITIONS:
1. The student must provide proof of adherence to the specific strategy taught.
2. "No personal issue" is defined as zero violations of risk management rules or emotional trading errors.
3. The refund applies only after the failure of the 3rd challenge attempt under these strict conditions."#;

pub const DEFAULT_NOTES: &str = "Welcome to TradeQuest. Success is the only option.";

// Description given to rows created with `add_item`
pub const NEW_ITEM_DESCRIPTION: &str = "New Service";

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum DocumentType {
    Invoice,
    Quotation,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Invoice => "INVOICE",
            DocumentType::Quotation => "QUOTATION",
        }
    }

    /// Case-insensitive; anything else is rejected rather than coerced.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "INVOICE" => Some(DocumentType::Invoice),
            "QUOTATION" => Some(DocumentType::Quotation),
            _ => None,
        }
    }
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The issuing party. This is the only part of a document that outlives a session.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompanyProfile {
    pub name: String,
    pub owner_name: String,
    pub address: String,
    pub email: String,
    pub website: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature_url: Option<String>,
}

impl Default for CompanyProfile {
    fn default() -> Self {
        Self {
            name: "TradeQuest".into(),
            owner_name: "Head Mentor".into(),
            address: "Global Financial District".into(),
            email: "support@tradequest.com".into(),
            website: String::new(),
            logo_url: None,
            signature_url: Some(String::new()),
        }
    }
}

impl CompanyProfile {
    pub fn logo(&self) -> Option<&str> {
        self.logo_url.as_deref().filter(|url| !url.is_empty())
    }

    pub fn signature(&self) -> Option<&str> {
        self.signature_url.as_deref().filter(|url| !url.is_empty())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ClientProfile {
    pub name: String,
    pub email: String,
    pub address: String,
    pub phone: String,
}

impl Default for ClientProfile {
    fn default() -> Self {
        Self {
            name: "Aspiring Trader".into(),
            email: "student@example.com".into(),
            address: "123 Market Lane".into(),
            phone: "+1 555-0123".into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub id: String,
    pub description: String,
    pub quantity: i64,
    pub unit_price: f64,
}

impl LineItem {
    /// A fresh row with a newly generated id.
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            id: generate_item_id(),
            description: description.into(),
            quantity: 1,
            unit_price: 0.0,
        }
    }

    fn fixed(id: &str, description: &str, quantity: i64, unit_price: f64) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            quantity,
            unit_price,
        }
    }
}

// v4 uuids never collide with the short numeric ids of the built-in rows
fn generate_item_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// The complete invoice/quotation edited in a session.
///
/// `company`, `client` and `items` sit behind `Arc` so that an edit to one
/// branch leaves the others shared with the previous value.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceData {
    pub document_type: DocumentType,
    pub document_number: String,
    pub date: String,
    pub due_date: String,
    pub currency_symbol: String,
    pub company: Arc<CompanyProfile>,
    pub client: Arc<ClientProfile>,
    pub items: Arc<Vec<LineItem>>,
    pub notes: String,
    pub terms: String,
}

impl InvoiceData {
    /// The built-in document for a session started on `today`.
    pub fn defaults_for(today: NaiveDate) -> Self {
        let due = today + Duration::days(7);
        Self {
            document_type: DocumentType::Quotation,
            document_number: format!("TQ-{}-001", today.year()),
            date: today.format("%Y-%m-%d").to_string(),
            due_date: due.format("%Y-%m-%d").to_string(),
            currency_symbol: "$".into(),
            company: Arc::new(CompanyProfile::default()),
            client: Arc::new(ClientProfile::default()),
            items: Arc::new(vec![
                LineItem::fixed("1", "VIP Forex Mentorship (Lifetime Access)", 1, 1500.0),
                LineItem::fixed("2", "Prop Firm Funding Service", 1, 997.0),
            ]),
            notes: DEFAULT_NOTES.into(),
            terms: GUARANTEE_TEXT.into(),
        }
    }

    pub fn item(&self, id: &str) -> Option<&LineItem> {
        self.items.iter().find(|item| item.id == id)
    }
}

impl Default for InvoiceData {
    fn default() -> Self {
        Self::defaults_for(Local::now().date_naive())
    }
}
