//! Fraud and dispute intake.
//!
//! Opens a dispute case for a transaction: a case reference, the dispute category
//! (classified from the description when not given), immediate actions, the customer's
//! liability given how late the transaction was reported, and the service deadlines.
//!
//! Liability for reports made:
//! - within 3 days: zero
//! - within 4 to 7 days: limited to the transaction amount or [`LIMITED_LIABILITY_CAP`],
//!   whichever is lower
//! - later: decided per the bank's board approved policy

use chrono::{DateTime, Days, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;

use super::{Tool, ToolDefinition, ToolError, call_typed, round2};

pub const TOOL_NAME: &str = "handle_fraud_dispute";
pub const CASE_PREFIX: &str = "FRD-";
pub const LIMITED_LIABILITY_CAP: f64 = 25_000.0;
pub const PROVISIONAL_CREDIT_DAYS: u64 = 10;
pub const RESOLUTION_DAYS: u64 = 90;

static CARD_LOST: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(lost|stolen|missing)\b").unwrap());
static DUPLICATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(twice|duplicate|double|charged two times)\b").unwrap());
static MERCHANT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(not received|not delivered|never arrived|refund|merchant)").unwrap());
static UNAUTHORIZED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(unauthori[sz]ed|did not make|didn't make|without (my )?permission|fraud|not me)").unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeCategory {
    Unauthorized,
    CardLost,
    DuplicateCharge,
    MerchantDispute,
    Other,
}

impl DisputeCategory {
    /// Classify a free-text complaint.
    pub fn classify(description: &str) -> Self {
        if CARD_LOST.is_match(description) {
            DisputeCategory::CardLost
        } else if DUPLICATE.is_match(description) {
            DisputeCategory::DuplicateCharge
        } else if MERCHANT.is_match(description) {
            DisputeCategory::MerchantDispute
        } else if UNAUTHORIZED.is_match(description) {
            DisputeCategory::Unauthorized
        } else {
            DisputeCategory::Other
        }
    }

    pub fn blocks_card(&self) -> bool {
        matches!(self, DisputeCategory::Unauthorized | DisputeCategory::CardLost)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "level", rename_all = "snake_case")]
pub enum Liability {
    Zero,
    Limited { max_amount: f64 },
    BoardPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisputeRequest {
    pub transaction_id: String,
    pub amount: f64,
    pub transaction_date: NaiveDate,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: Option<DisputeCategory>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisputeCase {
    pub case_id: String,
    pub transaction_id: String,
    pub amount: f64,
    pub category: DisputeCategory,
    pub card_blocked: bool,
    pub actions: Vec<String>,
    pub reporting_delay_days: i64,
    pub liability: Liability,
    pub provisional_credit_due: NaiveDate,
    pub resolution_deadline: NaiveDate,
    pub opened_at: DateTime<Utc>,
}

/// `FRD-` followed by the first 10 hex digits of a SHA-256 over the transaction and time.
pub fn case_reference(transaction_id: &str, amount: f64, now: DateTime<Utc>) -> String {
    let digest = sha256::digest(format!(
        "{transaction_id}|{amount:.2}|{}",
        now.timestamp_millis()
    ));
    format!("{CASE_PREFIX}{}", &digest[..10]).to_uppercase()
}

pub fn liability_for(delay_days: i64, amount: f64) -> Liability {
    match delay_days {
        ..=3 => Liability::Zero,
        4..=7 => Liability::Limited {
            max_amount: round2(amount.min(LIMITED_LIABILITY_CAP)),
        },
        _ => Liability::BoardPolicy,
    }
}

fn add_days(date: NaiveDate, days: u64) -> Result<NaiveDate, ToolError> {
    date.checked_add_days(Days::new(days))
        .ok_or_else(|| ToolError::InvalidArgument("date out of range".into()))
}

pub fn handle_dispute(request: &DisputeRequest, now: DateTime<Utc>) -> Result<DisputeCase, ToolError> {
    if request.transaction_id.trim().is_empty() {
        return Err(ToolError::InvalidArgument("transaction_id must not be empty".into()));
    }
    if !request.amount.is_finite() || request.amount <= 0.0 {
        return Err(ToolError::InvalidArgument("amount must be positive".into()));
    }
    let today = now.date_naive();
    let reporting_delay_days = (today - request.transaction_date).num_days();
    if reporting_delay_days < 0 {
        return Err(ToolError::InvalidArgument(
            "transaction_date is in the future".into(),
        ));
    }

    let category = request
        .category
        .unwrap_or_else(|| DisputeCategory::classify(&request.description));
    let card_blocked = category.blocks_card();
    let case_id = case_reference(&request.transaction_id, request.amount, now);

    let mut actions = Vec::new();
    if card_blocked {
        actions.push("Card blocked to prevent further misuse".to_string());
        actions.push("Replacement card requested".to_string());
    }
    match category {
        DisputeCategory::Unauthorized | DisputeCategory::CardLost => {
            actions.push("Report the incident to the cyber crime helpline 1930".to_string())
        }
        DisputeCategory::DuplicateCharge => {
            actions.push("Duplicate charge flagged for chargeback".to_string())
        }
        DisputeCategory::MerchantDispute => {
            actions.push("Merchant contacted through the card network".to_string())
        }
        DisputeCategory::Other => {}
    }
    actions.push(format!("Dispute registered under case {case_id}"));

    info!("Opened dispute {case_id} ({category:?}) for transaction {}", request.transaction_id);
    Ok(DisputeCase {
        case_id,
        transaction_id: request.transaction_id.clone(),
        amount: request.amount,
        category,
        card_blocked,
        actions,
        reporting_delay_days,
        liability: liability_for(reporting_delay_days, request.amount),
        provisional_credit_due: add_days(today, PROVISIONAL_CREDIT_DAYS)?,
        resolution_deadline: add_days(today, RESOLUTION_DAYS)?,
        opened_at: now,
    })
}

pub struct FraudDisputeTool;

impl Tool for FraudDisputeTool {
    fn name(&self) -> &'static str {
        TOOL_NAME
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: TOOL_NAME.to_string(),
            description: "Open a fraud or dispute case for a card or account transaction and report next steps and liability.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "transaction_id": {"type": "string"},
                    "amount": {"type": "number", "description": "Disputed amount in INR"},
                    "transaction_date": {"type": "string", "format": "date", "description": "YYYY-MM-DD"},
                    "description": {"type": "string", "description": "What happened, in the customer's words"},
                    "category": {
                        "type": "string",
                        "enum": ["unauthorized", "card_lost", "duplicate_charge", "merchant_dispute", "other"]
                    }
                },
                "required": ["transaction_id", "amount", "transaction_date"]
            }),
        }
    }

    fn call(&self, args: Value) -> Result<Value, ToolError> {
        call_typed(args, |req: DisputeRequest| handle_dispute(&req, Utc::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 20, 10, 30, 0).unwrap()
    }

    fn request(description: &str, date: (i32, u32, u32)) -> DisputeRequest {
        DisputeRequest {
            transaction_id: "TXN123".into(),
            amount: 42_000.0,
            transaction_date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            description: description.into(),
            category: None,
        }
    }

    #[test]
    fn test_classify() {
        assert_eq!(DisputeCategory::classify("My card was stolen"), DisputeCategory::CardLost);
        assert_eq!(DisputeCategory::classify("I was charged twice"), DisputeCategory::DuplicateCharge);
        assert_eq!(DisputeCategory::classify("order never arrived"), DisputeCategory::MerchantDispute);
        assert_eq!(
            DisputeCategory::classify("a transaction I did not make"),
            DisputeCategory::Unauthorized
        );
        assert_eq!(DisputeCategory::classify("something odd"), DisputeCategory::Other);
    }

    #[test]
    fn test_case_reference_is_stable() {
        let a = case_reference("TXN123", 42_000.0, now());
        let b = case_reference("TXN123", 42_000.0, now());
        assert_eq!(a, b);
        assert!(a.starts_with(CASE_PREFIX));
        assert_eq!(a.len(), CASE_PREFIX.len() + 10);
        assert_ne!(a, case_reference("TXN124", 42_000.0, now()));
    }

    #[test]
    fn test_unauthorized_reported_quickly() {
        let case = handle_dispute(&request("unauthorized purchase", (2024, 3, 18)), now()).unwrap();
        assert_eq!(case.category, DisputeCategory::Unauthorized);
        assert!(case.card_blocked);
        assert_eq!(case.reporting_delay_days, 2);
        assert_eq!(case.liability, Liability::Zero);
        assert_eq!(case.provisional_credit_due, NaiveDate::from_ymd_opt(2024, 3, 30).unwrap());
        assert_eq!(case.resolution_deadline, NaiveDate::from_ymd_opt(2024, 6, 18).unwrap());
        assert!(case.actions.last().unwrap().contains(&case.case_id));
    }

    #[test]
    fn test_liability_windows() {
        assert_eq!(liability_for(0, 100.0), Liability::Zero);
        assert_eq!(liability_for(3, 100.0), Liability::Zero);
        assert_eq!(liability_for(4, 100.0), Liability::Limited { max_amount: 100.0 });
        assert_eq!(
            liability_for(7, 42_000.0),
            Liability::Limited {
                max_amount: LIMITED_LIABILITY_CAP
            }
        );
        assert_eq!(liability_for(8, 100.0), Liability::BoardPolicy);
    }

    #[test]
    fn test_duplicate_charge_keeps_card() {
        let case = handle_dispute(&request("charged twice at the store", (2024, 3, 5)), now()).unwrap();
        assert_eq!(case.category, DisputeCategory::DuplicateCharge);
        assert!(!case.card_blocked);
        assert_eq!(case.liability, Liability::BoardPolicy);
    }

    #[test]
    fn test_explicit_category_and_validation() {
        let mut req = request("", (2024, 3, 20));
        req.category = Some(DisputeCategory::CardLost);
        assert!(handle_dispute(&req, now()).unwrap().card_blocked);

        assert!(handle_dispute(&request("x", (2024, 3, 21)), now()).is_err());
        let mut empty = request("x", (2024, 3, 1));
        empty.transaction_id = " ".into();
        assert!(handle_dispute(&empty, now()).is_err());
    }

    #[test]
    fn test_tool_call() {
        let out = FraudDisputeTool
            .call(json!({
                "transaction_id": "TXN9",
                "amount": 1500.0,
                "transaction_date": Utc::now().date_naive().to_string(),
                "description": "I lost my debit card"
            }))
            .unwrap();
        assert_eq!(out["category"], "card_lost");
        assert_eq!(out["liability"]["level"], "zero");
    }
}
