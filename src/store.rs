//! The session's single document and the company profile cache behind it.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::assist::{Assistant, TextGenerator};
use crate::cache::KeyValueStore;
use crate::error::{PersistenceError, ServiceError, SignatureError};
use crate::media;
use crate::model::{
    CompanyProfile, DocumentType, GUARANTEE_TEXT, InvoiceData, LineItem, NEW_ITEM_DESCRIPTION,
};

/// Cache key the company profile is stored under.
pub const COMPANY_CACHE_KEY: &str = "tradequest_company_data";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootField {
    DocumentType,
    DocumentNumber,
    Date,
    DueDate,
    CurrencySymbol,
    Notes,
    Terms,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompanyField {
    Name,
    OwnerName,
    Address,
    Email,
    Website,
    LogoUrl,
    SignatureUrl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientField {
    Name,
    Email,
    Address,
    Phone,
}

/// Addresses one editable text field of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldPath {
    Root(RootField),
    Company(CompanyField),
    Client(ClientField),
}

/// A change to a single field of one line item.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemChange {
    Description(String),
    Quantity(i64),
    UnitPrice(f64),
}

pub struct DocumentStore<C: KeyValueStore> {
    cache: C,
    current: InvoiceData,
}

impl<C: KeyValueStore> DocumentStore<C> {
    /// Starts a session from today's defaults.
    pub fn initialize(cache: C) -> Self {
        Self::initialize_with(cache, InvoiceData::default())
    }

    /// Starts a session from `defaults`, taking the company profile from the
    /// cache when one can be read. Read and parse failures fall back to
    /// `defaults` untouched.
    pub fn initialize_with(cache: C, defaults: InvoiceData) -> Self {
        let current = match load_company(&cache) {
            Ok(Some(company)) => {
                debug!(company = %company.name, "restored company profile from cache");
                InvoiceData {
                    company: Arc::new(company),
                    ..defaults
                }
            }
            Ok(None) => defaults,
            Err(e) => {
                warn!("Failed to load saved company data: {}", e);
                defaults
            }
        };
        Self { cache, current }
    }

    pub fn document(&self) -> &InvoiceData {
        &self.current
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// Swaps in `next` wholesale. The company profile is written to the cache
    /// only if it differs from the one being replaced.
    pub fn replace(&mut self, next: InvoiceData) {
        let company_changed = !Arc::ptr_eq(&self.current.company, &next.company)
            && self.current.company != next.company;
        self.current = next;
        if company_changed {
            self.persist_company();
        }
    }

    /// Sets one text field, copy-on-write. Unknown document types are ignored.
    pub fn update_field(&mut self, path: FieldPath, value: impl Into<String>) -> &InvoiceData {
        let value = value.into();
        let mut next = self.current.clone();
        match path {
            FieldPath::Root(RootField::DocumentType) => match DocumentType::parse(&value) {
                Some(kind) => next.document_type = kind,
                None => warn!(value = %value, "ignoring unknown document type"),
            },
            FieldPath::Root(field) => {
                if let Some(slot) = root_text(&mut next, field) {
                    *slot = value;
                }
            }
            FieldPath::Company(field) => {
                let company = Arc::make_mut(&mut next.company);
                match field {
                    CompanyField::Name => company.name = value,
                    CompanyField::OwnerName => company.owner_name = value,
                    CompanyField::Address => company.address = value,
                    CompanyField::Email => company.email = value,
                    CompanyField::Website => company.website = value,
                    CompanyField::LogoUrl => company.logo_url = Some(value),
                    CompanyField::SignatureUrl => company.signature_url = Some(value),
                }
            }
            FieldPath::Client(field) => {
                let client = Arc::make_mut(&mut next.client);
                let slot = match field {
                    ClientField::Name => &mut client.name,
                    ClientField::Email => &mut client.email,
                    ClientField::Address => &mut client.address,
                    ClientField::Phone => &mut client.phone,
                };
                *slot = value;
            }
        }
        self.commit(next)
    }

    /// Appends a fresh row and returns it.
    pub fn add_item(&mut self) -> LineItem {
        let item = LineItem::new(NEW_ITEM_DESCRIPTION);
        let mut next = self.current.clone();
        Arc::make_mut(&mut next.items).push(item.clone());
        self.commit(next);
        item
    }

    /// Applies `change` to the row with `id`. Returns false if there is none.
    pub fn update_item(&mut self, id: &str, change: ItemChange) -> bool {
        let Some(index) = self.current.items.iter().position(|item| item.id == id) else {
            return false;
        };
        let mut next = self.current.clone();
        let item = &mut Arc::make_mut(&mut next.items)[index];
        match change {
            ItemChange::Description(description) => item.description = description,
            ItemChange::Quantity(quantity) => item.quantity = quantity,
            ItemChange::UnitPrice(unit_price) => item.unit_price = unit_price,
        }
        self.commit(next);
        true
    }

    /// Drops the row with `id`, keeping the others in order.
    pub fn remove_item(&mut self, id: &str) -> bool {
        let Some(index) = self.current.items.iter().position(|item| item.id == id) else {
            return false;
        };
        let mut next = self.current.clone();
        Arc::make_mut(&mut next.items).remove(index);
        self.commit(next);
        true
    }

    pub fn reset_terms(&mut self) -> &InvoiceData {
        self.update_field(FieldPath::Root(RootField::Terms), GUARANTEE_TEXT)
    }

    /// Stores an uploaded logo file as a data URL.
    pub fn set_logo(&mut self, bytes: &[u8]) -> Result<&InvoiceData, SignatureError> {
        let url = media::image_data_url(bytes)?;
        Ok(self.update_field(FieldPath::Company(CompanyField::LogoUrl), url))
    }

    pub fn clear_logo(&mut self) -> &InvoiceData {
        self.update_field(FieldPath::Company(CompanyField::LogoUrl), "")
    }

    /// Rewrites the terms through the assistant. On failure the terms are left
    /// as they were and the error is handed back for the caller to report.
    pub fn polish_terms<G: TextGenerator>(
        &mut self,
        assistant: &Assistant<G>,
    ) -> Result<&InvoiceData, ServiceError> {
        let polished = assistant.polish(&self.current.terms)?;
        Ok(self.update_field(FieldPath::Root(RootField::Terms), polished))
    }

    /// Replaces the footer note with a generated one (or the fallback note).
    pub fn generate_note<G: TextGenerator>(&mut self, assistant: &Assistant<G>) -> &InvoiceData {
        let note = assistant.generate_note(&self.current.client.name, &self.current.company.name);
        self.update_field(FieldPath::Root(RootField::Notes), note)
    }

    fn commit(&mut self, next: InvoiceData) -> &InvoiceData {
        self.replace(next);
        &self.current
    }

    fn persist_company(&mut self) {
        let result = serde_json::to_vec(&*self.current.company)
            .map_err(PersistenceError::from)
            .and_then(|bytes| self.cache.set(COMPANY_CACHE_KEY, &bytes));
        match result {
            Ok(()) => debug!("company profile saved"),
            Err(e) => warn!("Failed to save company data: {}", e),
        }
    }
}

fn root_text(doc: &mut InvoiceData, field: RootField) -> Option<&mut String> {
    match field {
        RootField::DocumentType => None,
        RootField::DocumentNumber => Some(&mut doc.document_number),
        RootField::Date => Some(&mut doc.date),
        RootField::DueDate => Some(&mut doc.due_date),
        RootField::CurrencySymbol => Some(&mut doc.currency_symbol),
        RootField::Notes => Some(&mut doc.notes),
        RootField::Terms => Some(&mut doc.terms),
    }
}

fn load_company<C: KeyValueStore>(cache: &C) -> Result<Option<CompanyProfile>, PersistenceError> {
    let Some(bytes) = cache.get(COMPANY_CACHE_KEY)? else {
        return Ok(None);
    };
    Ok(Some(serde_json::from_slice(&bytes)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use chrono::NaiveDate;

    fn defaults() -> InvoiceData {
        InvoiceData::defaults_for(NaiveDate::from_ymd_opt(2025, 3, 14).unwrap())
    }

    fn store() -> DocumentStore<MemoryCache> {
        DocumentStore::initialize_with(MemoryCache::new(), defaults())
    }

    #[test]
    fn fresh_cache_gives_defaults_without_writing() {
        let store = store();
        assert_eq!(store.document(), &defaults());
        assert_eq!(store.cache().writes(), 0);
    }

    #[test]
    fn company_edit_persists_once() {
        let mut store = store();
        store.update_field(FieldPath::Company(CompanyField::Name), "Acme");
        assert_eq!(store.cache().writes(), 1);

        let saved: CompanyProfile =
            serde_json::from_slice(store.cache().raw(COMPANY_CACHE_KEY).unwrap()).unwrap();
        assert_eq!(saved.name, "Acme");
        assert_eq!(saved.owner_name, CompanyProfile::default().owner_name);
        assert_eq!(saved.signature_url, Some(String::new()));
    }

    #[test]
    fn unrelated_edits_never_touch_the_cache() {
        let mut store = store();
        store.update_field(FieldPath::Root(RootField::Terms), "net 30");
        store.update_field(FieldPath::Client(ClientField::Name), "Bob");
        let item = store.add_item();
        store.update_item(&item.id, ItemChange::Quantity(4));
        store.remove_item("1");
        assert_eq!(store.cache().writes(), 0);
    }

    #[test]
    fn same_company_value_does_not_rewrite() {
        let mut store = store();
        store.update_field(FieldPath::Company(CompanyField::Email), "a@b.c");
        store.update_field(FieldPath::Company(CompanyField::Email), "a@b.c");
        assert_eq!(store.cache().writes(), 1);
    }

    #[test]
    fn edits_share_untouched_branches() {
        let mut store = store();
        let before = store.document().clone();
        let after = store.update_field(FieldPath::Client(ClientField::Phone), "555");
        assert!(Arc::ptr_eq(&before.company, &after.company));
        assert!(Arc::ptr_eq(&before.items, &after.items));
        assert!(!Arc::ptr_eq(&before.client, &after.client));
        assert_eq!(before.client.phone, "+1 555-0123");
    }

    #[test]
    fn updating_with_current_value_is_a_no_op() {
        let mut store = store();
        let before = store.document().clone();
        let name = before.company.name.clone();
        let after = store.update_field(FieldPath::Company(CompanyField::Name), name);
        assert_eq!(after, &before);
    }

    #[test]
    fn document_type_accepts_known_names_only() {
        let mut store = store();
        store.update_field(FieldPath::Root(RootField::DocumentType), "invoice");
        assert_eq!(store.document().document_type, DocumentType::Invoice);
        store.update_field(FieldPath::Root(RootField::DocumentType), "receipt");
        assert_eq!(store.document().document_type, DocumentType::Invoice);
    }

    #[test]
    fn item_commands_address_by_id() {
        let mut store = store();
        let added = store.add_item();
        assert_eq!(store.document().items.len(), 3);
        assert_eq!(store.document().items[2].description, NEW_ITEM_DESCRIPTION);

        assert!(store.update_item("2", ItemChange::UnitPrice(1000.0)));
        assert_eq!(store.document().item("2").unwrap().unit_price, 1000.0);
        assert_eq!(store.document().item("1").unwrap().unit_price, 1500.0);

        assert!(store.remove_item("1"));
        let ids: Vec<_> = store.document().items.iter().map(|i| i.id.clone()).collect();
        assert_eq!(ids, vec!["2".to_string(), added.id]);

        assert!(!store.remove_item("missing"));
        assert!(!store.update_item("missing", ItemChange::Quantity(9)));
        assert_eq!(store.document().items.len(), 2);
    }

    #[test]
    fn write_failures_are_swallowed() {
        let mut store = DocumentStore::initialize_with(MemoryCache::full(), defaults());
        let doc = store.update_field(FieldPath::Company(CompanyField::Name), "Acme");
        assert_eq!(doc.company.name, "Acme");
    }

    #[test]
    fn reset_terms_restores_guarantee() {
        let mut store = store();
        store.update_field(FieldPath::Root(RootField::Terms), "none");
        assert_eq!(store.reset_terms().terms, GUARANTEE_TEXT);
    }

    #[test]
    fn incompatible_cached_profile_falls_back() {
        let cache = MemoryCache::with_entry(COMPANY_CACHE_KEY, r#"{"name": 42}"#);
        let store = DocumentStore::initialize_with(cache, defaults());
        assert_eq!(store.document(), &defaults());
    }
}
