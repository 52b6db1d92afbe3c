//! Assembles the upsert payload for one line item.
//!
//! Absent values are omitted from the body entirely; the integration
//! status marker pair and the last-ERP-update timestamp are always
//! present. The upsert key itself travels in the URL, never here.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{json, Value};

use crate::sync::normalize::{round_money, NormalizedLineItem};

const INTEGRATION_STATUS: &str = "Integrado";

#[derive(Debug, Serialize)]
pub struct LineItemPayload {
    #[serde(rename = "OrderId")]
    pub order_id: String,
    #[serde(rename = "PricebookEntryId")]
    pub pricebook_entry_id: String,

    #[serde(rename = "Quantity", skip_serializing_if = "Option::is_none")]
    pub quantity: Option<Decimal>,
    #[serde(rename = "UnitPrice", skip_serializing_if = "Option::is_none")]
    pub unit_price: Option<Decimal>,

    #[serde(rename = "CA_CodImposto__c", skip_serializing_if = "Option::is_none")]
    pub tax_code: Option<String>,
    #[serde(rename = "CA_QtdAuthPend__c", skip_serializing_if = "Option::is_none")]
    pub pending_auth_qty: Option<String>,
    #[serde(rename = "CA_UnFat__c", skip_serializing_if = "Option::is_none")]
    pub unbilled_unit: Option<String>,

    #[serde(rename = "CA_Markup__c", skip_serializing_if = "Option::is_none")]
    pub markup: Option<Decimal>,
    #[serde(rename = "CA_QtdUnFat__c", skip_serializing_if = "Option::is_none")]
    pub unbilled_qty: Option<Decimal>,
    #[serde(rename = "CA_Comissao__c", skip_serializing_if = "Option::is_none")]
    pub commission: Option<Decimal>,
    #[serde(rename = "CA_Gratuito__c")]
    pub free_of_charge: bool,

    #[serde(rename = "CA_ValorICMS__c", skip_serializing_if = "Option::is_none")]
    pub icms_value: Option<Decimal>,
    #[serde(rename = "CA_ValorPIS__c", skip_serializing_if = "Option::is_none")]
    pub pis_value: Option<Decimal>,
    #[serde(rename = "CA_ValorCOFINS__c", skip_serializing_if = "Option::is_none")]
    pub cofins_value: Option<Decimal>,
    #[serde(rename = "CA_TaxaFinanceira__c", skip_serializing_if = "Option::is_none")]
    pub financial_fee: Option<Decimal>,
    #[serde(rename = "CA_PesoLiquido__c", skip_serializing_if = "Option::is_none")]
    pub net_weight: Option<Decimal>,

    #[serde(rename = "CA_DataEntrega__c", skip_serializing_if = "Option::is_none")]
    pub delivery_date: Option<String>,
    #[serde(rename = "CA_MotivoAlteracao__c", skip_serializing_if = "Option::is_none")]
    pub change_reason: Option<&'static str>,
    #[serde(rename = "CA_Observacao__c", skip_serializing_if = "Option::is_none")]
    pub observation: Option<String>,

    #[serde(rename = "CA_CFOP__c", skip_serializing_if = "Option::is_none")]
    pub cfop: Option<String>,
    #[serde(rename = "CA_CST__c", skip_serializing_if = "Option::is_none")]
    pub cst: Option<String>,

    #[serde(rename = "CA_StatusIntegracao__c")]
    pub integration_status: &'static str,
    #[serde(rename = "CA_RetornoIntegracao__c")]
    pub integration_result: &'static str,
    #[serde(rename = "CA_AtualizacaoERP__c")]
    pub erp_updated_at: String,

    #[serde(rename = "CA_Deposito__r", skip_serializing_if = "Option::is_none")]
    pub warehouse: Option<Value>,
    #[serde(rename = "CA_UsoPrincipal__r", skip_serializing_if = "Option::is_none")]
    pub primary_usage: Option<Value>,
}

impl LineItemPayload {
    /// Builds the payload from resolved relationship ids and a
    /// normalized item. `external_id_field` names the lookup key used
    /// for the optional relationship references.
    pub fn build(
        order_id: &str,
        pricebook_entry_id: &str,
        item: &NormalizedLineItem,
        external_id_field: &str,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            order_id: order_id.to_string(),
            pricebook_entry_id: pricebook_entry_id.to_string(),
            quantity: item.quantity,
            unit_price: effective_unit_price(item),
            tax_code: item.tax_code.clone(),
            pending_auth_qty: item.pending_auth_qty.clone(),
            unbilled_unit: item.unbilled_unit.clone(),
            markup: item.markup,
            unbilled_qty: item.unbilled_qty,
            commission: item.commission,
            free_of_charge: item.free_of_charge,
            icms_value: item.icms_value,
            pis_value: item.pis_value,
            cofins_value: item.cofins_value,
            financial_fee: item.financial_fee,
            net_weight: item.net_weight,
            delivery_date: item.delivery_date.clone(),
            change_reason: item.change_reason,
            observation: item.observation.clone(),
            cfop: item.cfop.clone(),
            cst: item.cst.clone(),
            integration_status: INTEGRATION_STATUS,
            integration_result: INTEGRATION_STATUS,
            erp_updated_at: now.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            warehouse: lookup_ref(external_id_field, item.warehouse_code.clone()),
            primary_usage: lookup_ref(
                external_id_field,
                item.usage_code.map(|u| u.to_string()),
            ),
        }
    }
}

/// Unit price as sent: the source value when present, otherwise
/// derived from line total and quantity when both exist and quantity
/// is nonzero.
fn effective_unit_price(item: &NormalizedLineItem) -> Option<Decimal> {
    if item.unit_price.is_some() {
        return item.unit_price;
    }
    match (item.line_total, item.quantity) {
        (Some(total), Some(qty)) if !qty.is_zero() => Some(round_money(total / qty)),
        _ => None,
    }
}

fn lookup_ref(external_id_field: &str, value: Option<String>) -> Option<Value> {
    value.map(|v| json!({ external_id_field: v }))
}
