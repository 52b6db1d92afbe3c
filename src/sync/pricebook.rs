//! Pricebook resolution for orders that arrive without one.
//!
//! Fallback chain, first hit wins: configured external id, then the
//! org's standard pricebook, then any active pricebook. Activation of
//! an inactive candidate is best-effort; its failure is logged and the
//! chain continues. Assignment failures skip the row, they do not
//! error it.

use serde_json::json;
use tracing::{info, instrument, warn};

use crate::crm::{CrmClient, Pricebook};
use crate::errors::SyncError;
use crate::sync::SkipReason;

pub struct PricebookResolver<'a> {
    client: &'a CrmClient,
    default_external_id: Option<&'a str>,
}

/// Either the pricebook id now assigned to the order, or the reason
/// the row must be skipped. Transport and query failures propagate as
/// row-level errors instead.
pub type ResolveOutcome = Result<String, SkipReason>;

impl<'a> PricebookResolver<'a> {
    pub fn new(client: &'a CrmClient, default_external_id: Option<&'a str>) -> Self {
        Self {
            client,
            default_external_id,
        }
    }

    /// Runs the fallback chain and assigns the winning pricebook to the
    /// order. On success the caller updates its in-memory order; the
    /// order is not re-fetched.
    #[instrument(skip(self, token), fields(doc_num = %doc_num))]
    pub async fn resolve_and_assign(
        &self,
        token: &str,
        order_id: &str,
        doc_num: &str,
    ) -> Result<ResolveOutcome, SyncError> {
        let chosen = match self.find_candidate(token).await? {
            Some(id) => id,
            None => return Ok(Err(SkipReason::NoPricebookAvailable)),
        };

        let body = json!({ "Pricebook2Id": chosen });
        match self.client.patch_object(token, "Order", order_id, &body).await {
            Ok(()) => {
                info!(pricebook_id = %chosen, "Pricebook assigned to order");
                Ok(Ok(chosen))
            }
            Err(err) if err.is_validation_block() => {
                Ok(Err(SkipReason::PricebookAssignmentBlocked(err.to_string())))
            }
            Err(err) => Ok(Err(SkipReason::PricebookAssignmentFailed(err.to_string()))),
        }
    }

    async fn find_candidate(&self, token: &str) -> Result<Option<String>, SyncError> {
        if let Some(external_id) = self.default_external_id {
            if let Some(id) = self.configured_pricebook(token, external_id).await? {
                return Ok(Some(id));
            }
        }
        if let Some(id) = self.standard_pricebook(token).await? {
            return Ok(Some(id));
        }
        self.any_active_pricebook(token).await
    }

    async fn configured_pricebook(
        &self,
        token: &str,
        external_id: &str,
    ) -> Result<Option<String>, SyncError> {
        let soql = format!(
            "SELECT Id, IsActive FROM Pricebook2 WHERE {} = '{}' LIMIT 1",
            self.client.external_id_field(),
            CrmClient::soql_escape(external_id)
        );
        match self.query_pricebook(token, &soql).await? {
            Some(pb) => {
                if !pb.is_active() {
                    self.activate_best_effort(token, &pb.id, external_id).await;
                }
                Ok(Some(pb.id))
            }
            None => {
                warn!(external_id = %external_id, "Configured default pricebook not found");
                Ok(None)
            }
        }
    }

    async fn standard_pricebook(&self, token: &str) -> Result<Option<String>, SyncError> {
        let soql = "SELECT Id, IsActive FROM Pricebook2 WHERE IsStandard = true LIMIT 1";
        match self.query_pricebook(token, soql).await? {
            Some(pb) => {
                if !pb.is_active() {
                    self.activate_best_effort(token, &pb.id, "standard").await;
                }
                Ok(Some(pb.id))
            }
            None => {
                warn!("No standard pricebook found in the org");
                Ok(None)
            }
        }
    }

    async fn any_active_pricebook(&self, token: &str) -> Result<Option<String>, SyncError> {
        let soql = "SELECT Id FROM Pricebook2 WHERE IsActive = true \
                    ORDER BY IsStandard DESC, CreatedDate ASC LIMIT 1";
        let found = self.query_pricebook(token, soql).await?;
        if let Some(pb) = &found {
            info!(pricebook_id = %pb.id, "Falling back to an active pricebook");
        }
        Ok(found.map(|pb| pb.id))
    }

    async fn query_pricebook(
        &self,
        token: &str,
        soql: &str,
    ) -> Result<Option<Pricebook>, SyncError> {
        match self.client.query_single(token, soql).await? {
            Some(record) => Ok(Some(serde_json::from_value(record)?)),
            None => Ok(None),
        }
    }

    /// Activation is best-effort: failure is a warning, never an error,
    /// and the surrounding chain keeps the candidate anyway.
    async fn activate_best_effort(&self, token: &str, pricebook_id: &str, label: &str) {
        let body = json!({ "IsActive": true });
        match self
            .client
            .patch_object(token, "Pricebook2", pricebook_id, &body)
            .await
        {
            Ok(()) => info!(pricebook_id = %pricebook_id, "Activated inactive pricebook ({})", label),
            Err(err) => {
                warn!(pricebook_id = %pricebook_id, error = %err, "Could not activate pricebook ({})", label)
            }
        }
    }
}
