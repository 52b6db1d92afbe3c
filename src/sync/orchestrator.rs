//! Drives the per-row pipeline and enforces error isolation: one bad
//! record never aborts the run. Only setup failures (token, source
//! query) abort a cycle; the next scheduled run retries naturally.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::auth::TokenProvider;
use crate::crm::{CrmClient, PricebookEntry, RemoteOrder, UpsertKind, UpsertOutcome};
use crate::errors::SyncError;
use crate::source::{SourceDataProvider, SourceRow};
use crate::sync::normalize::{opt_string, NormalizedLineItem};
use crate::sync::payload::LineItemPayload;
use crate::sync::pricebook::PricebookResolver;
use crate::sync::status::{classify, OrderStatus};
use crate::sync::SkipReason;

/// Aggregate counters for one sync cycle.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub inserted: u64,
    pub updated: u64,
    pub acknowledged: u64,
    pub skipped: u64,
    pub errors: u64,
    pub total: u64,
}

/// Sync behavior knobs, lifted from the application config.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub external_id_field: String,
    pub default_pricebook_external_id: Option<String>,
    pub auto_assign_pricebook: bool,
}

enum RowOutcome {
    Upserted(UpsertOutcome),
    Skipped(SkipReason),
}

pub struct SyncOrchestrator {
    auth: Arc<dyn TokenProvider>,
    source: Arc<dyn SourceDataProvider>,
    crm: CrmClient,
    settings: SyncSettings,
}

impl SyncOrchestrator {
    pub fn new(
        auth: Arc<dyn TokenProvider>,
        source: Arc<dyn SourceDataProvider>,
        crm: CrmClient,
        settings: SyncSettings,
    ) -> Self {
        Self {
            auth,
            source,
            crm,
            settings,
        }
    }

    /// Runs one full reconciliation cycle over the current source rows.
    #[instrument(skip(self), fields(run_id = %Uuid::new_v4()))]
    pub async fn run_once(&self) -> Result<RunSummary, SyncError> {
        let token = self.auth.access_token().await?;
        let rows = self.source.fetch_rows().await?;

        let mut summary = RunSummary::default();
        for row in &rows {
            summary.total += 1;
            match self.process_row(&token, row).await {
                Ok(RowOutcome::Upserted(outcome)) => match outcome.kind {
                    UpsertKind::Inserted => summary.inserted += 1,
                    UpsertKind::Updated => summary.updated += 1,
                    UpsertKind::Acknowledged => summary.acknowledged += 1,
                },
                Ok(RowOutcome::Skipped(reason)) => {
                    summary.skipped += 1;
                    info!(
                        reason = %reason,
                        doc_num = %row_key(row, "DocNum"),
                        line_num = %row_key(row, "LineNum"),
                        "Row skipped"
                    );
                }
                Err(err) => {
                    summary.errors += 1;
                    error!(
                        error = %err,
                        external_id = %row_key(row, "IdExternoItem"),
                        row = %serde_json::Value::Object(row.clone()),
                        "Row failed"
                    );
                }
            }
        }

        info!(
            inserted = summary.inserted,
            updated = summary.updated,
            acknowledged = summary.acknowledged,
            skipped = summary.skipped,
            errors = summary.errors,
            total = summary.total,
            "Sync cycle finished"
        );
        Ok(summary)
    }

    async fn process_row(&self, token: &str, row: &SourceRow) -> Result<RowOutcome, SyncError> {
        let item = match NormalizedLineItem::from_row(row) {
            Ok(item) => item,
            Err(reason) => return Ok(RowOutcome::Skipped(reason)),
        };

        let mut order = match self.fetch_order(token, &item.doc_num).await? {
            Some(order) => order,
            None => return Ok(RowOutcome::Skipped(SkipReason::OrderNotFound)),
        };

        if let Some(reason) = editability_block(&order) {
            return Ok(RowOutcome::Skipped(reason));
        }

        let pricebook_id = match order.pricebook_id.take() {
            Some(id) => id,
            None if !self.settings.auto_assign_pricebook => {
                return Ok(RowOutcome::Skipped(SkipReason::PricebookAssignmentDisabled));
            }
            None => {
                let resolver = PricebookResolver::new(
                    &self.crm,
                    self.settings.default_pricebook_external_id.as_deref(),
                );
                match resolver
                    .resolve_and_assign(token, &order.id, &item.doc_num)
                    .await?
                {
                    Ok(id) => id,
                    Err(reason) => return Ok(RowOutcome::Skipped(reason)),
                }
            }
        };

        let entry = match self
            .fetch_pricebook_entry(token, &pricebook_id, &item.item_code)
            .await?
        {
            Some(entry) => entry,
            None => {
                return Ok(RowOutcome::Skipped(SkipReason::ProductNotInPricebook {
                    item_code: item.item_code.clone(),
                }));
            }
        };

        let payload = LineItemPayload::build(
            &order.id,
            &entry.id,
            &item,
            &self.settings.external_id_field,
            Utc::now(),
        );
        let body = serde_json::to_value(&payload)?;

        // One upsert per row: the outcome is bound once and reused for
        // both accounting and logging.
        let outcome = self
            .crm
            .upsert_by_external_id(token, &item.item_external_id, &body)
            .await?;

        info!(
            kind = ?outcome.kind,
            status = outcome.status,
            external_id = %item.item_external_id,
            record_id = outcome.record_id.as_deref().unwrap_or(""),
            "Line item upserted"
        );
        Ok(RowOutcome::Upserted(outcome))
    }

    async fn fetch_order(
        &self,
        token: &str,
        doc_num: &str,
    ) -> Result<Option<RemoteOrder>, SyncError> {
        let soql = format!(
            "SELECT Id, Pricebook2Id, Status, ActivatedDate FROM Order WHERE {} = '{}' LIMIT 1",
            self.settings.external_id_field,
            CrmClient::soql_escape(doc_num)
        );
        match self.crm.query_single(token, &soql).await? {
            Some(record) => Ok(Some(serde_json::from_value(record)?)),
            None => Ok(None),
        }
    }

    async fn fetch_pricebook_entry(
        &self,
        token: &str,
        pricebook_id: &str,
        item_code: &str,
    ) -> Result<Option<PricebookEntry>, SyncError> {
        let soql = format!(
            "SELECT Id, UnitPrice, IsActive FROM PricebookEntry \
             WHERE Pricebook2Id = '{}' AND Product2.{} = '{}' AND IsActive = true LIMIT 1",
            CrmClient::soql_escape(pricebook_id),
            self.settings.external_id_field,
            CrmClient::soql_escape(item_code)
        );
        match self.crm.query_single(token, &soql).await? {
            Some(record) => Ok(Some(serde_json::from_value(record)?)),
            None => Ok(None),
        }
    }
}

/// An order is editable only while its status normalizes to Draft AND
/// it has never been activated; either condition alone blocks edits.
fn editability_block(order: &RemoteOrder) -> Option<SkipReason> {
    let label = order.status.clone().unwrap_or_default();
    let status = classify(&label);
    let activated = order.activated_date.is_some();

    if status == OrderStatus::Draft && !activated {
        return None;
    }
    if activated || status == OrderStatus::Activated {
        Some(SkipReason::OrderActivated { status: label })
    } else {
        Some(SkipReason::OrderNotDraft { status: label })
    }
}

// Sources emit numbers or strings for these columns; render both.
fn row_key(row: &SourceRow, key: &str) -> String {
    opt_string(row.get(key)).unwrap_or_default()
}
