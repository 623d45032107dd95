pub mod assist;
pub mod cache;
pub mod compute;
pub mod config;
pub mod error;
pub mod media;
pub mod model;
pub mod render;
pub mod signature;
pub mod store;

pub use assist::{Assistant, FALLBACK_NOTE, GeminiClient, TextGenerator};
pub use cache::{FileCache, KeyValueStore, MemoryCache};
pub use compute::{Totals, format_money, line_total, subtotal, total};
pub use error::{PersistenceError, RenderError, ServiceError, SignatureError};
pub use model::{ClientProfile, CompanyProfile, DocumentType, InvoiceData, LineItem};
pub use signature::{PointerAction, PointerEvent, SignaturePad, SignatureSink};
pub use store::{
    COMPANY_CACHE_KEY, ClientField, CompanyField, DocumentStore, FieldPath, ItemChange, RootField,
};
