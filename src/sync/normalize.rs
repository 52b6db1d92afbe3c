//! Converts raw, loosely-typed source rows into validated line items.
//!
//! Conversions are best-effort by contract: a value that fails to
//! parse becomes an absent field, never an error. Only the three key
//! fields are required; their absence skips the row.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::Value;

use crate::source::SourceRow;
use crate::sync::status::canonical_key;
use crate::sync::SkipReason;

/// Validated, strongly-typed view of one source row.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedLineItem {
    pub doc_num: String,
    pub line_num: i64,
    pub item_external_id: String,
    pub item_code: String,
    pub warehouse_code: Option<String>,
    pub tax_code: Option<String>,
    pub quantity: Option<Decimal>,
    pub unit_price: Option<Decimal>,
    pub line_total: Option<Decimal>,
    pub markup: Option<Decimal>,
    pub pending_auth_qty: Option<String>,
    pub unbilled_qty: Option<Decimal>,
    pub unbilled_unit: Option<String>,
    pub commission: Option<Decimal>,
    pub free_of_charge: bool,
    pub icms_value: Option<Decimal>,
    pub pis_value: Option<Decimal>,
    pub cofins_value: Option<Decimal>,
    pub financial_fee: Option<Decimal>,
    pub delivery_date: Option<String>,
    pub change_reason: Option<&'static str>,
    pub observation: Option<String>,
    pub net_weight: Option<Decimal>,
    pub cfop: Option<String>,
    pub cst: Option<String>,
    pub usage_code: Option<i64>,
}

impl NormalizedLineItem {
    /// Normalizes one source row, or reports which key field is missing.
    pub fn from_row(row: &SourceRow) -> Result<Self, SkipReason> {
        let item_external_id =
            opt_string(row.get("IdExternoItem")).ok_or(SkipReason::MissingField("IdExternoItem"))?;
        let doc_num = opt_string(row.get("DocNum")).ok_or(SkipReason::MissingField("DocNum"))?;
        let item_code = opt_text(row, "ItemCode", 50).ok_or(SkipReason::MissingField("ItemCode"))?;

        Ok(Self {
            doc_num,
            line_num: opt_int(row.get("LineNum")).unwrap_or(0),
            item_external_id,
            item_code,
            warehouse_code: opt_text(row, "WhsCode", 8),
            tax_code: opt_text(row, "TaxCode", 8),
            quantity: opt_quantity(row.get("Quantity")),
            unit_price: opt_money(row.get("UnitPrice")),
            line_total: opt_money(row.get("LineTotal")),
            markup: opt_money(row.get("Markup")),
            pending_auth_qty: opt_text(row, "QtdAuthPend", 255),
            unbilled_qty: opt_quantity(row.get("QtdUnFat")),
            unbilled_unit: opt_text(row, "UnFat", 10),
            commission: opt_money(row.get("Comissao")),
            free_of_charge: flag_is_set(row.get("GratisYN")),
            icms_value: opt_money(row.get("VlrICMS")),
            pis_value: opt_money(row.get("VlrPIS")),
            cofins_value: opt_money(row.get("VlrCOFINS")),
            financial_fee: opt_money(row.get("VlrTaxaFin")),
            delivery_date: normalize_date(row.get("DataEntrega")),
            change_reason: opt_string(row.get("MotivoAlteracao"))
                .as_deref()
                .and_then(map_change_reason),
            observation: opt_text(row, "Observacao", 255),
            net_weight: opt_quantity(row.get("PesoLiquido")),
            cfop: opt_text(row, "CFOP", 6),
            cst: opt_text(row, "CST", 6),
            usage_code: opt_int(row.get("Usage")),
        })
    }
}

/// Monetary rounding: 2 decimals, ties away from zero.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Quantity rounding: 3 decimals, ties away from zero.
pub fn round_quantity(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(3, RoundingStrategy::MidpointAwayFromZero)
}

/// Truncates to at most `max` characters; never rejects for length.
pub fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Flag fields treat case-insensitive {"Y", "1", "T"} as set.
pub fn flag_is_set(value: Option<&Value>) -> bool {
    match opt_string(value) {
        Some(s) => {
            let s = s.trim();
            s.eq_ignore_ascii_case("Y") || s == "1" || s.eq_ignore_ascii_case("T")
        }
        None => false,
    }
}

/// Null, missing and blank values normalize to absent, not zero.
pub fn opt_string(value: Option<&Value>) -> Option<String> {
    let s = match value? {
        Value::Null => return None,
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn opt_text(row: &SourceRow, key: &str, max: usize) -> Option<String> {
    opt_string(row.get(key)).map(|s| truncate(&s, max))
}

/// Best-effort integer conversion; absent on failure.
pub fn opt_int(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Best-effort decimal conversion; absent on failure.
pub fn opt_decimal(value: Option<&Value>) -> Option<Decimal> {
    match value? {
        Value::Number(n) => n.to_string().parse::<Decimal>().ok(),
        Value::String(s) => s.trim().parse::<Decimal>().ok(),
        _ => None,
    }
}

fn opt_money(value: Option<&Value>) -> Option<Decimal> {
    opt_decimal(value).map(round_money)
}

fn opt_quantity(value: Option<&Value>) -> Option<Decimal> {
    opt_decimal(value).map(round_quantity)
}

/// Normalizes a date-bearing value to a `yyyy-mm-dd` string; values
/// that fail every accepted shape yield absent, not an error.
pub fn normalize_date(value: Option<&Value>) -> Option<String> {
    let raw = opt_string(value)?;
    let s = raw.trim();

    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").map(|dt| dt.date()))
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|dt| dt.date()))
        .or_else(|_| DateTime::parse_from_rfc3339(s).map(|dt| dt.date_naive()))
        .ok()?;

    Some(date.format("%Y-%m-%d").to_string())
}

/// Maps a free-text change reason onto the fixed category table.
/// Matching happens on the accent-stripped lower-cased key so "Preço",
/// "preco" and "PREÇO" land in the same bucket. Unmatched text is
/// absent, not an error.
pub fn map_change_reason(raw: &str) -> Option<&'static str> {
    let key = canonical_key(raw);
    if key.is_empty() {
        return None;
    }
    if key.contains("condi") && key.contains("pag") {
        Some("Condição de Pagamento")
    } else if key.contains("credit") {
        Some("Crédito")
    } else if key.contains("estoq") {
        Some("Estoque")
    } else if key.contains("prazo") {
        Some("Prazo de Entrega")
    } else if key.contains("prec") {
        Some("Preço")
    } else if key.contains("residual") {
        Some("Quantidade Residual")
    } else if key.contains("tomada") {
        Some("Tomada de Preço")
    } else if key.contains("troca") {
        Some("Troca de Pedido")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn row(pairs: &[(&str, Value)]) -> SourceRow {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn complete_row() -> SourceRow {
        row(&[
            ("DocNum", json!("12345")),
            ("LineNum", json!(2)),
            ("IdExternoItem", json!("12345-2")),
            ("ItemCode", json!("PROD-001")),
            ("WhsCode", json!("WH-MAIN-01")),
            ("TaxCode", json!("ICMS18XYZ")),
            ("Quantity", json!(4.0005)),
            ("UnitPrice", json!(10.255)),
            ("LineTotal", json!(41.02)),
            ("GratisYN", json!("N")),
            ("DataEntrega", json!("2026-03-15T00:00:00")),
            ("MotivoAlteracao", json!("ajuste de preço")),
            ("Usage", json!(9)),
        ])
    }

    #[test]
    fn normalizes_a_complete_row() {
        let item = NormalizedLineItem::from_row(&complete_row()).unwrap();
        assert_eq!(item.doc_num, "12345");
        assert_eq!(item.line_num, 2);
        assert_eq!(item.item_external_id, "12345-2");
        assert_eq!(item.item_code, "PROD-001");
        // truncation maxima applied
        assert_eq!(item.warehouse_code.as_deref(), Some("WH-MAIN-"));
        assert_eq!(item.tax_code.as_deref(), Some("ICMS18XY"));
        assert_eq!(item.quantity, Some(dec!(4.001)));
        assert_eq!(item.unit_price, Some(dec!(10.26)));
        assert!(!item.free_of_charge);
        assert_eq!(item.delivery_date.as_deref(), Some("2026-03-15"));
        assert_eq!(item.change_reason, Some("Preço"));
        assert_eq!(item.usage_code, Some(9));
    }

    #[test]
    fn missing_key_fields_are_reported_in_order() {
        let mut r = complete_row();
        r.insert("IdExternoItem".into(), json!("   "));
        assert_eq!(
            NormalizedLineItem::from_row(&r),
            Err(SkipReason::MissingField("IdExternoItem"))
        );

        let mut r = complete_row();
        r.remove("DocNum");
        assert_eq!(
            NormalizedLineItem::from_row(&r),
            Err(SkipReason::MissingField("DocNum"))
        );

        let mut r = complete_row();
        r.insert("ItemCode".into(), Value::Null);
        assert_eq!(
            NormalizedLineItem::from_row(&r),
            Err(SkipReason::MissingField("ItemCode"))
        );
    }

    #[test]
    fn rounding_is_away_from_zero_at_ties() {
        assert_eq!(round_money(dec!(2.345)), dec!(2.35));
        assert_eq!(round_money(dec!(-2.345)), dec!(-2.35));
        assert_eq!(round_quantity(dec!(1.0005)), dec!(1.001));
        assert_eq!(round_quantity(dec!(-1.0005)), dec!(-1.001));
    }

    #[test]
    fn flags_accept_y_one_t_case_insensitively() {
        for v in ["Y", "y", "1", "T", "t"] {
            assert!(flag_is_set(Some(&json!(v))), "{} should set the flag", v);
        }
        for v in ["N", "0", "yes", "true", ""] {
            assert!(!flag_is_set(Some(&json!(v))), "{} should not set it", v);
        }
        assert!(!flag_is_set(None));
        assert!(!flag_is_set(Some(&Value::Null)));
    }

    #[test]
    fn conversion_failures_become_absent_not_zero() {
        assert_eq!(opt_decimal(Some(&json!("not-a-number"))), None);
        assert_eq!(opt_int(Some(&json!("abc"))), None);
        assert_eq!(normalize_date(Some(&json!("15/03/2026"))), None);
        assert_eq!(opt_string(Some(&json!(""))), None);
    }

    #[test]
    fn dates_parse_from_common_shapes() {
        assert_eq!(
            normalize_date(Some(&json!("2026-03-15"))).as_deref(),
            Some("2026-03-15")
        );
        assert_eq!(
            normalize_date(Some(&json!("2026-03-15 10:30:00"))).as_deref(),
            Some("2026-03-15")
        );
        assert_eq!(
            normalize_date(Some(&json!("2026-03-15T10:30:00+00:00"))).as_deref(),
            Some("2026-03-15")
        );
    }

    #[test]
    fn change_reason_table_covers_all_categories() {
        assert_eq!(
            map_change_reason("Condição de pagamento alterada"),
            Some("Condição de Pagamento")
        );
        assert_eq!(map_change_reason("limite de credito"), Some("Crédito"));
        assert_eq!(map_change_reason("sem estoque"), Some("Estoque"));
        assert_eq!(map_change_reason("novo prazo"), Some("Prazo de Entrega"));
        assert_eq!(map_change_reason("PREÇO"), Some("Preço"));
        assert_eq!(
            map_change_reason("quantidade residual"),
            Some("Quantidade Residual")
        );
        assert_eq!(map_change_reason("tomada de preço"), Some("Tomada de Preço"));
        assert_eq!(map_change_reason("troca do pedido"), Some("Troca de Pedido"));
        assert_eq!(map_change_reason("outro motivo"), None);
    }

    proptest! {
        #[test]
        fn truncation_is_a_prefix_and_bounded(s in ".{0,300}", max in 0usize..64) {
            let out = truncate(&s, max);
            prop_assert!(out.chars().count() <= max);
            prop_assert!(s.starts_with(&out));
        }

        #[test]
        fn money_rounding_scale_is_two(units in -10_000_000i64..10_000_000) {
            let value = Decimal::new(units, 4);
            let rounded = round_money(value);
            prop_assert!(rounded.scale() <= 2);
            // within half a cent of the input
            prop_assert!((value - rounded).abs() <= dec!(0.005));
        }

        #[test]
        fn quantity_rounding_scale_is_three(units in -10_000_000i64..10_000_000) {
            let value = Decimal::new(units, 5);
            let rounded = round_quantity(value);
            prop_assert!(rounded.scale() <= 3);
            prop_assert!((value - rounded).abs() <= dec!(0.0005));
        }
    }
}
