//! Loan EMI calculator.
//!
//! `EMI = P · r · (1 + r)^n / ((1 + r)^n − 1)` with `r` the monthly rate
//! (annual % / 12 / 100) and `n` the tenure in months. A zero rate reduces to `P / n`.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::{Tool, ToolDefinition, ToolError, call_typed, round2};

pub const TOOL_NAME: &str = "calculate_emi";
pub const MAX_TENURE_MONTHS: u32 = 360;
pub const MAX_ANNUAL_RATE: f64 = 50.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmiRequest {
    /// Loan amount in rupees.
    pub principal: f64,
    /// Annual interest rate in percent.
    pub annual_rate: f64,
    pub tenure_months: u32,
    /// Number of leading amortization rows to include; 0 for none.
    #[serde(default)]
    pub schedule_months: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmortizationRow {
    pub month: u32,
    pub emi: f64,
    pub principal: f64,
    pub interest: f64,
    pub balance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmiQuote {
    pub principal: f64,
    pub annual_rate: f64,
    pub tenure_months: u32,
    pub emi: f64,
    pub total_payment: f64,
    pub total_interest: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub schedule: Vec<AmortizationRow>,
}

fn monthly_installment(principal: f64, monthly_rate: f64, months: u32) -> f64 {
    if monthly_rate == 0.0 {
        return principal / months as f64;
    }
    let growth = (1.0 + monthly_rate).powi(months as i32);
    principal * monthly_rate * growth / (growth - 1.0)
}

pub fn calculate_emi(request: &EmiRequest) -> Result<EmiQuote, ToolError> {
    if !request.principal.is_finite() || request.principal <= 0.0 {
        return Err(ToolError::InvalidArgument("principal must be positive".into()));
    }
    if !(1..=MAX_TENURE_MONTHS).contains(&request.tenure_months) {
        return Err(ToolError::InvalidArgument(format!(
            "tenure_months must be between 1 and {MAX_TENURE_MONTHS}"
        )));
    }
    if !request.annual_rate.is_finite() || !(0.0..=MAX_ANNUAL_RATE).contains(&request.annual_rate) {
        return Err(ToolError::InvalidArgument(format!(
            "annual_rate must be between 0 and {MAX_ANNUAL_RATE}"
        )));
    }

    let monthly_rate = request.annual_rate / 12.0 / 100.0;
    let emi = monthly_installment(request.principal, monthly_rate, request.tenure_months);
    let total_payment = emi * request.tenure_months as f64;

    let rows = request.schedule_months.min(request.tenure_months);
    let mut schedule = Vec::with_capacity(rows as usize);
    let mut balance = request.principal;
    for month in 1..=rows {
        let interest = balance * monthly_rate;
        let principal = emi - interest;
        balance = (balance - principal).max(0.0);
        schedule.push(AmortizationRow {
            month,
            emi: round2(emi),
            principal: round2(principal),
            interest: round2(interest),
            balance: round2(balance),
        });
    }

    Ok(EmiQuote {
        principal: request.principal,
        annual_rate: request.annual_rate,
        tenure_months: request.tenure_months,
        emi: round2(emi),
        total_payment: round2(total_payment),
        total_interest: round2(total_payment - request.principal),
        schedule,
    })
}

pub struct EmiTool;

impl Tool for EmiTool {
    fn name(&self) -> &'static str {
        TOOL_NAME
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: TOOL_NAME.to_string(),
            description: "Calculate the monthly EMI, total interest and an optional amortization schedule for a loan.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "principal": {"type": "number", "description": "Loan amount in INR", "exclusiveMinimum": 0},
                    "annual_rate": {"type": "number", "description": "Annual interest rate in percent", "minimum": 0, "maximum": MAX_ANNUAL_RATE},
                    "tenure_months": {"type": "integer", "minimum": 1, "maximum": MAX_TENURE_MONTHS},
                    "schedule_months": {"type": "integer", "description": "Amortization rows to return", "default": 0}
                },
                "required": ["principal", "annual_rate", "tenure_months"]
            }),
        }
    }

    fn call(&self, args: Value) -> Result<Value, ToolError> {
        call_typed(args, |req: EmiRequest| calculate_emi(&req))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(principal: f64, annual_rate: f64, tenure_months: u32) -> EmiRequest {
        EmiRequest {
            principal,
            annual_rate,
            tenure_months,
            schedule_months: 0,
        }
    }

    #[test]
    fn test_standard_emi() {
        let quote = calculate_emi(&request(100_000.0, 12.0, 12)).unwrap();
        assert_eq!(quote.emi, 8884.88);
        assert!((quote.total_interest - 6618.55).abs() < 0.011);
        assert!(quote.schedule.is_empty());
    }

    #[test]
    fn test_zero_rate() {
        let quote = calculate_emi(&request(120_000.0, 0.0, 24)).unwrap();
        assert_eq!(quote.emi, 5000.0);
        assert_eq!(quote.total_interest, 0.0);
    }

    #[test]
    fn test_schedule() {
        let mut req = request(100_000.0, 12.0, 12);
        req.schedule_months = 12;
        let quote = calculate_emi(&req).unwrap();
        assert_eq!(quote.schedule.len(), 12);
        let first = &quote.schedule[0];
        assert_eq!(first.interest, 1000.0);
        assert_eq!(first.principal, 7884.88);
        assert_eq!(first.balance, 92115.12);
        assert!(quote.schedule[11].balance.abs() < 0.01);

        req.schedule_months = 500;
        assert_eq!(calculate_emi(&req).unwrap().schedule.len(), 12);
    }

    #[test]
    fn test_bounds() {
        assert!(calculate_emi(&request(0.0, 10.0, 12)).is_err());
        assert!(calculate_emi(&request(-5.0, 10.0, 12)).is_err());
        assert!(calculate_emi(&request(1000.0, 10.0, 0)).is_err());
        assert!(calculate_emi(&request(1000.0, 10.0, 361)).is_err());
        assert!(calculate_emi(&request(1000.0, 51.0, 12)).is_err());
        assert!(calculate_emi(&request(1000.0, f64::NAN, 12)).is_err());
        assert!(calculate_emi(&request(1000.0, 50.0, 360)).is_ok());
    }
}
