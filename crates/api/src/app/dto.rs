use serde::Deserialize;

use carbonledger_credits::{CarbonCredit, Transaction};
use carbonledger_infra::ExpiryReport;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct IssueCreditRequest {
    pub owner: String,
    pub amount: f64,
}

#[derive(Debug, Deserialize)]
pub struct TransferCreditRequest {
    pub from_owner: String,
    pub to_owner: String,
    pub amount: f64,
}

#[derive(Debug, Deserialize)]
pub struct RetireCreditRequest {
    pub amount: f64,
}

#[derive(Debug, Deserialize)]
pub struct TradeRequest {
    pub side: String,
    pub amount: f64,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListCreditsQuery {
    pub active_only: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub owner: Option<String>,
}

// -------------------------
// Response mapping
// -------------------------

pub fn credit_to_json(credit: &CarbonCredit) -> serde_json::Value {
    serde_json::json!({
        "id": credit.id.to_string(),
        "amount": credit.amount,
        "owner": credit.owner.as_str(),
        "creation_date": credit.creation_date.to_rfc3339(),
        "expiration_date": credit.expiration_date.to_rfc3339(),
        "is_active": credit.is_active,
    })
}

pub fn transaction_to_json(tx: &Transaction) -> serde_json::Value {
    serde_json::json!({
        "id": tx.id.to_string(),
        "kind": tx.kind.as_str(),
        "credit_id": tx.credit_id.to_string(),
        "related_credit_id": tx.related_credit_id.map(|id| id.to_string()),
        "amount": tx.amount,
        "from_owner": tx.from_owner.as_ref().map(|o| o.as_str()),
        "to_owner": tx.to_owner.as_ref().map(|o| o.as_str()),
        "date": tx.date.to_rfc3339(),
    })
}

pub fn expiry_report_to_json(report: &ExpiryReport) -> serde_json::Value {
    serde_json::json!({
        "scanned": report.scanned,
        "expired": report.expired,
        "skipped": report.skipped,
        "failed": report.failed,
        "expired_amount": report.expired_amount,
    })
}
