//! erp-order-sync: a scheduled agent that reconciles ERP order line
//! items into a CRM.
//!
//! Each cycle fetches the current line-item rows from the ERP source,
//! and for every row: normalizes its fields, locates the parent order
//! in the CRM, verifies the order is still editable, resolves a
//! pricebook (running a fallback chain when the order has none),
//! resolves the product's pricebook entry, builds the payload and
//! upserts it keyed by an external id. Failures are isolated per row.

pub mod auth;
pub mod config;
pub mod crm;
pub mod errors;
pub mod scheduler;
pub mod source;
pub mod sync;

pub use config::AppConfig;
pub use errors::SyncError;
pub use scheduler::SyncScheduler;
pub use sync::{RunSummary, SyncOrchestrator, SyncSettings};
