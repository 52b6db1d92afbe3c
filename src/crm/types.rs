use rust_decimal::Decimal;
use serde::Deserialize;

/// CRM order matched to a source document number.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteOrder {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Status")]
    pub status: Option<String>,
    #[serde(rename = "ActivatedDate")]
    pub activated_date: Option<String>,
    #[serde(rename = "Pricebook2Id")]
    pub pricebook_id: Option<String>,
}

/// CRM price list.
#[derive(Debug, Clone, Deserialize)]
pub struct Pricebook {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "IsActive", default)]
    pub is_active: Option<bool>,
}

impl Pricebook {
    pub fn is_active(&self) -> bool {
        self.is_active == Some(true)
    }
}

/// Product-price binding within a pricebook. Read-only to this agent.
#[derive(Debug, Clone, Deserialize)]
pub struct PricebookEntry {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "UnitPrice", default)]
    pub unit_price: Option<Decimal>,
    #[serde(rename = "IsActive", default)]
    pub is_active: Option<bool>,
}

/// How the CRM classified one upsert call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertKind {
    /// HTTP 201: a new record was created
    Inserted,
    /// HTTP 204: an existing record was updated
    Updated,
    /// Any other 2xx: success, not separately counted
    Acknowledged,
}

/// Result of one upsert call. Produced once per successful call and
/// reused for all logging and accounting; the call is never repeated
/// to re-derive it.
#[derive(Debug, Clone)]
pub struct UpsertOutcome {
    pub kind: UpsertKind,
    pub status: u16,
    /// Assigned record id, present on insert when the body parses
    pub record_id: Option<String>,
    pub raw_body: String,
}

#[derive(Debug, Deserialize)]
struct UpsertResponseBody {
    id: Option<String>,
}

impl UpsertOutcome {
    /// Classifies a successful (2xx) upsert response.
    ///
    /// A 201 body carries the new record id; parse failures leave the
    /// id absent rather than failing the call.
    pub fn classify(status: u16, raw_body: String) -> Self {
        match status {
            201 => {
                let record_id = serde_json::from_str::<UpsertResponseBody>(&raw_body)
                    .ok()
                    .and_then(|b| b.id);
                Self {
                    kind: UpsertKind::Inserted,
                    status,
                    record_id,
                    raw_body,
                }
            }
            204 => Self {
                kind: UpsertKind::Updated,
                status,
                record_id: None,
                raw_body,
            },
            _ => Self {
                kind: UpsertKind::Acknowledged,
                status,
                record_id: None,
                raw_body,
            },
        }
    }
}
