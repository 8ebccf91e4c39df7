//! Foreign exchange rate card in INR.
//!
//! Rates are rupees per unit of foreign currency. `buy` is what the bank pays for
//! currency it buys from a customer, `sell` what it charges a customer buying currency.
//! [`QuoteSide`] is always from the customer's point of view.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;

use super::{Tool, ToolDefinition, ToolError, call_typed, round2};

pub const TOOL_NAME: &str = "get_forex_rates";

static CURRENCY_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z]{3}$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForexRate {
    pub buy: f64,
    pub sell: f64,
}

impl ForexRate {
    pub fn mid(&self) -> f64 {
        (self.buy + self.sell) / 2.0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuoteSide {
    /// Customer buys foreign currency (bank sell rate).
    #[default]
    Buy,
    /// Customer sells foreign currency (bank buy rate).
    Sell,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForexQuote {
    pub currency: String,
    pub buy_rate: f64,
    pub sell_rate: f64,
    pub mid_rate: f64,
    pub side: QuoteSide,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    /// Rupees paid (side `buy`) or received (side `sell`) for `amount`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inr_amount: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForexRequest {
    /// ISO 4217 code; the full rate card is returned when absent.
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub side: QuoteSide,
}

/// Normalise and validate a currency code.
pub fn parse_currency(code: &str) -> Result<String, ToolError> {
    let code = code.trim().to_ascii_uppercase();
    if CURRENCY_CODE.is_match(&code) {
        Ok(code)
    } else {
        Err(ToolError::InvalidArgument(format!(
            "'{code}' is not a three-letter currency code"
        )))
    }
}

pub struct ForexDesk {
    rates: BTreeMap<String, ForexRate>,
}

impl Default for ForexDesk {
    fn default() -> Self {
        let card = [
            ("USD", 82.90, 84.10),
            ("EUR", 89.60, 91.40),
            ("GBP", 104.20, 106.30),
            ("AED", 22.45, 23.05),
            ("SGD", 61.40, 62.80),
            ("JPY", 0.548, 0.566),
            ("AUD", 54.20, 55.60),
            ("CAD", 60.70, 62.10),
            ("CHF", 93.80, 95.90),
        ];
        Self::new(
            card.into_iter()
                .map(|(code, buy, sell)| (code.to_string(), ForexRate { buy, sell }))
                .collect(),
        )
    }
}

impl ForexDesk {
    pub fn new(rates: BTreeMap<String, ForexRate>) -> Self {
        Self { rates }
    }

    pub fn currencies(&self) -> Vec<&str> {
        self.rates.keys().map(String::as_str).collect()
    }

    pub fn rate(&self, currency: &str) -> Result<ForexRate, ToolError> {
        let code = parse_currency(currency)?;
        self.rates
            .get(&code)
            .copied()
            .ok_or(ToolError::UnknownCurrency(code))
    }

    /// Rates for `currency`, with the rupee value of `amount` on `side` when given.
    pub fn quote(&self, currency: &str, amount: Option<f64>, side: QuoteSide) -> Result<ForexQuote, ToolError> {
        let code = parse_currency(currency)?;
        let rate = self.rate(&code)?;
        if amount.is_some_and(|a| !a.is_finite() || a <= 0.0) {
            return Err(ToolError::InvalidArgument("amount must be positive".into()));
        }
        let applied = match side {
            QuoteSide::Buy => rate.sell,
            QuoteSide::Sell => rate.buy,
        };
        Ok(ForexQuote {
            currency: code,
            buy_rate: rate.buy,
            sell_rate: rate.sell,
            mid_rate: round2(rate.mid()),
            side,
            amount,
            inr_amount: amount.map(|a| round2(a * applied)),
        })
    }

    /// Quotes for every currency on the card.
    pub fn rate_card(&self) -> Vec<ForexQuote> {
        self.rates
            .iter()
            .map(|(code, rate)| ForexQuote {
                currency: code.clone(),
                buy_rate: rate.buy,
                sell_rate: rate.sell,
                mid_rate: round2(rate.mid()),
                side: QuoteSide::Buy,
                amount: None,
                inr_amount: None,
            })
            .collect()
    }
}

impl Tool for ForexDesk {
    fn name(&self) -> &'static str {
        TOOL_NAME
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: TOOL_NAME.to_string(),
            description: "Get INR buy/sell rates for a foreign currency, optionally converting an amount.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "currency": {"type": "string", "description": "ISO 4217 code such as USD; omit for all rates"},
                    "amount": {"type": "number", "description": "Foreign currency amount to convert"},
                    "side": {"type": "string", "enum": ["buy", "sell"], "default": "buy"}
                }
            }),
        }
    }

    fn call(&self, args: Value) -> Result<Value, ToolError> {
        call_typed(args, |req: ForexRequest| match req.currency {
            Some(currency) => Ok(json!(self.quote(&currency, req.amount, req.side)?)),
            None => Ok(json!(self.rate_card())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_currency() {
        assert_eq!(parse_currency(" usd ").unwrap(), "USD");
        assert!(parse_currency("US").is_err());
        assert!(parse_currency("US1").is_err());
        assert!(parse_currency("dollar").is_err());
    }

    #[test]
    fn test_quote_sides() {
        let desk = ForexDesk::default();
        let buy = desk.quote("usd", Some(1000.0), QuoteSide::Buy).unwrap();
        assert_eq!(buy.currency, "USD");
        assert_eq!(buy.inr_amount, Some(84_100.0));
        assert_eq!(buy.mid_rate, 83.5);

        let sell = desk.quote("USD", Some(1000.0), QuoteSide::Sell).unwrap();
        assert_eq!(sell.inr_amount, Some(82_900.0));

        let plain = desk.quote("eur", None, QuoteSide::Buy).unwrap();
        assert_eq!(plain.inr_amount, None);
    }

    #[test]
    fn test_errors() {
        let desk = ForexDesk::default();
        assert!(matches!(desk.quote("XYZ", None, QuoteSide::Buy), Err(ToolError::UnknownCurrency(_))));
        assert!(matches!(desk.quote("12", None, QuoteSide::Buy), Err(ToolError::InvalidArgument(_))));
        assert!(desk.quote("USD", Some(-5.0), QuoteSide::Buy).is_err());
    }

    #[test]
    fn test_tool_call() {
        let desk = ForexDesk::default();
        let card = desk.call(json!({})).unwrap();
        assert_eq!(card.as_array().unwrap().len(), desk.currencies().len());
        let quote = desk
            .call(json!({"currency": "gbp", "amount": 100.0, "side": "sell"}))
            .unwrap();
        assert_eq!(quote["inr_amount"], 10_420.0);
    }
}
