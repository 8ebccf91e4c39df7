//! Credit card recommendation over a built-in catalogue.
//!
//! A card is eligible when the applicant meets its income and credit score floors. Eligible
//! cards are ranked by estimated annual net value: monthly spend per category times the
//! card's reward rate for that category (or its `other` rate), over twelve months, minus
//! the annual fee.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;

use super::{Tool, ToolDefinition, ToolError, call_typed, round2};

pub const TOOL_NAME: &str = "recommend_card";
pub const DEFAULT_LIMIT: usize = 3;
const FALLBACK_CATEGORY: &str = "other";

#[derive(Debug, Clone, PartialEq)]
pub struct CardProduct {
    pub name: &'static str,
    pub annual_fee: f64,
    pub min_annual_income: f64,
    pub min_credit_score: u16,
    /// Reward rate per spend category as a fraction (0.05 = 5%).
    pub reward_rates: &'static [(&'static str, f64)],
    pub perks: &'static [&'static str],
}

impl CardProduct {
    fn rate(&self, category: &str) -> f64 {
        let lookup = |c: &str| self.reward_rates.iter().find(|(k, _)| *k == c).map(|(_, r)| *r);
        lookup(category)
            .or_else(|| lookup(FALLBACK_CATEGORY))
            .unwrap_or(0.0)
    }
}

pub const CARD_CATALOGUE: &[CardProduct] = &[
    CardProduct {
        name: "Everyday Cashback",
        annual_fee: 499.0,
        min_annual_income: 300_000.0,
        min_credit_score: 700,
        reward_rates: &[("online", 0.05), ("groceries", 0.02), ("other", 0.01)],
        perks: &["5% cashback on online shopping"],
    },
    CardProduct {
        name: "Travel Elite",
        annual_fee: 2999.0,
        min_annual_income: 1_200_000.0,
        min_credit_score: 750,
        reward_rates: &[("travel", 0.06), ("dining", 0.03), ("other", 0.01)],
        perks: &["8 domestic lounge visits a year", "1.99% forex markup"],
    },
    CardProduct {
        name: "Fuel Saver",
        annual_fee: 199.0,
        min_annual_income: 200_000.0,
        min_credit_score: 650,
        reward_rates: &[("fuel", 0.04), ("other", 0.005)],
        perks: &["1% fuel surcharge waiver"],
    },
    CardProduct {
        name: "Lifetime Free Basic",
        annual_fee: 0.0,
        min_annual_income: 150_000.0,
        min_credit_score: 650,
        reward_rates: &[("other", 0.0075)],
        perks: &["No annual fee"],
    },
    CardProduct {
        name: "Dining Delight",
        annual_fee: 999.0,
        min_annual_income: 600_000.0,
        min_credit_score: 720,
        reward_rates: &[("dining", 0.08), ("groceries", 0.03), ("other", 0.01)],
        perks: &["Complimentary movie tickets"],
    },
    CardProduct {
        name: "Premium Signature",
        annual_fee: 9999.0,
        min_annual_income: 3_000_000.0,
        min_credit_score: 780,
        reward_rates: &[
            ("travel", 0.05),
            ("dining", 0.05),
            ("online", 0.04),
            ("other", 0.02),
        ],
        perks: &["Unlimited lounge access", "Golf privileges", "Concierge"],
    },
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardRequest {
    pub annual_income: f64,
    pub credit_score: u16,
    /// Monthly spend in rupees keyed by category (`online`, `travel`, `dining`, `fuel`,
    /// `groceries`, `other`).
    #[serde(default)]
    pub monthly_spend: BTreeMap<String, f64>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardRecommendation {
    pub name: String,
    pub annual_fee: f64,
    pub estimated_annual_value: f64,
    /// Spend category contributing the most rewards.
    pub best_category: Option<String>,
    pub perks: Vec<String>,
}

pub fn recommend_cards(request: &CardRequest) -> Result<Vec<CardRecommendation>, ToolError> {
    if !request.annual_income.is_finite() || request.annual_income < 0.0 {
        return Err(ToolError::InvalidArgument("annual_income must be non-negative".into()));
    }
    if !(300..=900).contains(&request.credit_score) {
        return Err(ToolError::InvalidArgument(
            "credit_score must be between 300 and 900".into(),
        ));
    }
    if let Some((category, _)) = request
        .monthly_spend
        .iter()
        .find(|(_, v)| !v.is_finite() || **v < 0.0)
    {
        return Err(ToolError::InvalidArgument(format!(
            "monthly spend for '{category}' must be non-negative"
        )));
    }
    let limit = request.limit.unwrap_or(DEFAULT_LIMIT);
    if limit == 0 {
        return Err(ToolError::InvalidArgument("limit must be at least 1".into()));
    }

    let mut ranked: Vec<(f64, CardRecommendation)> = CARD_CATALOGUE
        .iter()
        .filter(|card| {
            request.annual_income >= card.min_annual_income && request.credit_score >= card.min_credit_score
        })
        .map(|card| {
            let rewards: Vec<(&String, f64)> = request
                .monthly_spend
                .iter()
                .map(|(category, spend)| (category, spend * card.rate(category) * 12.0))
                .collect();
            let value = rewards.iter().map(|(_, r)| r).sum::<f64>() - card.annual_fee;
            let best_category = rewards
                .iter()
                .filter(|(_, r)| *r > 0.0)
                .max_by(|a, b| a.1.total_cmp(&b.1))
                .map(|(c, _)| c.to_string());
            (
                value,
                CardRecommendation {
                    name: card.name.to_string(),
                    annual_fee: card.annual_fee,
                    estimated_annual_value: round2(value),
                    best_category,
                    perks: card.perks.iter().map(|p| p.to_string()).collect(),
                },
            )
        })
        .collect();

    ranked.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.name.cmp(&b.1.name)));
    Ok(ranked.into_iter().take(limit).map(|(_, r)| r).collect())
}

pub struct CardTool;

impl Tool for CardTool {
    fn name(&self) -> &'static str {
        TOOL_NAME
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: TOOL_NAME.to_string(),
            description: "Recommend credit cards the customer is eligible for, ranked by estimated annual rewards net of fees.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "annual_income": {"type": "number", "description": "Annual income in INR"},
                    "credit_score": {"type": "integer", "minimum": 300, "maximum": 900},
                    "monthly_spend": {
                        "type": "object",
                        "description": "Monthly spend in INR per category: online, travel, dining, fuel, groceries, other",
                        "additionalProperties": {"type": "number"}
                    },
                    "limit": {"type": "integer", "minimum": 1, "default": DEFAULT_LIMIT}
                },
                "required": ["annual_income", "credit_score"]
            }),
        }
    }

    fn call(&self, args: Value) -> Result<Value, ToolError> {
        call_typed(args, |req: CardRequest| recommend_cards(&req))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(income: f64, score: u16) -> CardRequest {
        CardRequest {
            annual_income: income,
            credit_score: score,
            monthly_spend: BTreeMap::from([
                ("online".to_string(), 10_000.0),
                ("groceries".to_string(), 5_000.0),
                ("other".to_string(), 5_000.0),
            ]),
            limit: None,
        }
    }

    #[test]
    fn test_ranking_by_net_value() {
        let recs = recommend_cards(&request(500_000.0, 720)).unwrap();
        let names: Vec<_> = recs.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Everyday Cashback", "Lifetime Free Basic", "Fuel Saver"]);
        assert_eq!(recs[0].estimated_annual_value, 7301.0);
        assert_eq!(recs[0].best_category.as_deref(), Some("online"));
        assert_eq!(recs[1].estimated_annual_value, 1800.0);
        assert_eq!(recs[2].estimated_annual_value, 1001.0);
    }

    #[test]
    fn test_eligibility_filters() {
        assert!(recommend_cards(&request(500_000.0, 640)).unwrap().is_empty());
        let rich = recommend_cards(&CardRequest {
            limit: Some(10),
            ..request(5_000_000.0, 800)
        })
        .unwrap();
        assert_eq!(rich.len(), CARD_CATALOGUE.len());
    }

    #[test]
    fn test_limit_and_validation() {
        let one = recommend_cards(&CardRequest {
            limit: Some(1),
            ..request(500_000.0, 720)
        })
        .unwrap();
        assert_eq!(one.len(), 1);

        assert!(recommend_cards(&CardRequest {
            limit: Some(0),
            ..request(500_000.0, 720)
        })
        .is_err());
        assert!(recommend_cards(&request(500_000.0, 950)).is_err());
        let mut negative = request(500_000.0, 720);
        negative.monthly_spend.insert("fuel".into(), -1.0);
        assert!(recommend_cards(&negative).is_err());
    }

    #[test]
    fn test_no_spend_ranks_by_fee() {
        let recs = recommend_cards(&CardRequest {
            monthly_spend: BTreeMap::new(),
            ..request(500_000.0, 720)
        })
        .unwrap();
        assert_eq!(recs[0].name, "Lifetime Free Basic");
        assert_eq!(recs[0].best_category, None);
    }
}
