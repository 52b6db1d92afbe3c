//! CRM-side HTTP surface: query, upsert-by-external-id, patch-by-id.

pub mod client;
pub mod types;

pub use client::{CrmClient, CrmSettings};
pub use types::{Pricebook, PricebookEntry, RemoteOrder, UpsertKind, UpsertOutcome};
