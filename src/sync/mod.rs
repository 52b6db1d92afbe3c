//! Per-row reconciliation pipeline: normalize, gate, resolve pricing,
//! build payload, upsert.

pub mod normalize;
pub mod orchestrator;
pub mod payload;
pub mod pricebook;
pub mod status;

pub use normalize::NormalizedLineItem;
pub use orchestrator::{RunSummary, SyncOrchestrator, SyncSettings};

use std::fmt;

/// Why a row was excluded from the run without being counted as an
/// error. Skips are expected business conditions, logged at INFO.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// A required key field was empty in the source row
    MissingField(&'static str),
    /// No order in the CRM matches the document number
    OrderNotFound,
    /// The order carries an activation timestamp or an activated status
    OrderActivated { status: String },
    /// The order status did not normalize to Draft
    OrderNotDraft { status: String },
    /// Order has no pricebook and auto-assignment is disabled
    PricebookAssignmentDisabled,
    /// The fallback chain found no usable pricebook
    NoPricebookAvailable,
    /// A CRM validation rule blocked assigning the pricebook
    PricebookAssignmentBlocked(String),
    /// Assigning the pricebook failed for another reason
    PricebookAssignmentFailed(String),
    /// The product has no active entry in the order's pricebook
    ProductNotInPricebook { item_code: String },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingField(field) => write!(f, "required field {} is empty", field),
            Self::OrderNotFound => write!(f, "order not found in CRM"),
            Self::OrderActivated { status } => {
                write!(f, "order already activated (status={})", status)
            }
            Self::OrderNotDraft { status } => {
                write!(f, "order status is not Draft (status={})", status)
            }
            Self::PricebookAssignmentDisabled => {
                write!(f, "order has no pricebook and auto-assignment is disabled")
            }
            Self::NoPricebookAvailable => {
                write!(f, "no active pricebook configured or found")
            }
            Self::PricebookAssignmentBlocked(detail) => write!(
                f,
                "validation rule blocked pricebook assignment: {}",
                detail
            ),
            Self::PricebookAssignmentFailed(detail) => {
                write!(f, "pricebook assignment failed: {}", detail)
            }
            Self::ProductNotInPricebook { item_code } => {
                write!(f, "product {} is not in the order's pricebook", item_code)
            }
        }
    }
}
