//! Fixed deposit ladder planner.
//!
//! The amount is split evenly across `rungs` deposits maturing every `interval_months`
//! (any paise left over from the split go to the first rung). Each rung earns the rate of
//! its tenure slab, plus [`SENIOR_CITIZEN_BONUS`] for senior citizens, compounded
//! quarterly: `A = P · (1 + r/4)^(4t)`.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::{Tool, ToolDefinition, ToolError, call_typed, round2};

pub const TOOL_NAME: &str = "suggest_fd_ladder";
pub const SENIOR_CITIZEN_BONUS: f64 = 0.50;
pub const MIN_DEPOSIT: f64 = 1_000.0;
pub const MAX_RUNGS: u32 = 10;
pub const MAX_TENURE_MONTHS: u32 = 120;

/// `(minimum tenure in months, annual rate %)`, ascending.
pub const RATE_SLABS: &[(u32, f64)] = &[
    (1, 4.50),
    (6, 5.75),
    (12, 6.80),
    (24, 7.00),
    (36, 7.10),
    (60, 6.75),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FdLadderRequest {
    pub amount: f64,
    pub rungs: u32,
    pub interval_months: u32,
    #[serde(default)]
    pub senior_citizen: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FdRung {
    pub rung: u32,
    pub tenure_months: u32,
    pub principal: f64,
    pub annual_rate: f64,
    pub maturity_amount: f64,
    pub interest: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FdLadder {
    pub total_principal: f64,
    pub total_maturity: f64,
    pub total_interest: f64,
    pub rungs: Vec<FdRung>,
}

/// Annual rate for a tenure, senior citizen bonus included.
pub fn slab_rate(tenure_months: u32, senior_citizen: bool) -> f64 {
    let base = RATE_SLABS
        .iter()
        .rev()
        .find(|(min, _)| tenure_months >= *min)
        .map_or(0.0, |(_, rate)| *rate);
    if senior_citizen { base + SENIOR_CITIZEN_BONUS } else { base }
}

fn maturity(principal: f64, annual_rate: f64, tenure_months: u32) -> f64 {
    let years = tenure_months as f64 / 12.0;
    principal * (1.0 + annual_rate / 100.0 / 4.0).powf(4.0 * years)
}

pub fn suggest_fd_ladder(request: &FdLadderRequest) -> Result<FdLadder, ToolError> {
    if !(1..=MAX_RUNGS).contains(&request.rungs) {
        return Err(ToolError::InvalidArgument(format!(
            "rungs must be between 1 and {MAX_RUNGS}"
        )));
    }
    request
        .rungs
        .checked_mul(request.interval_months)
        .filter(|months| (1..=MAX_TENURE_MONTHS).contains(months))
        .ok_or_else(|| {
            ToolError::InvalidArgument(format!(
                "ladder must mature within {MAX_TENURE_MONTHS} months"
            ))
        })?;
    if !request.amount.is_finite() || request.amount < MIN_DEPOSIT * request.rungs as f64 {
        return Err(ToolError::InvalidArgument(format!(
            "amount must be at least {} for {} rungs",
            MIN_DEPOSIT * request.rungs as f64,
            request.rungs
        )));
    }

    let total_paise = (request.amount * 100.0).round() as i64;
    let base = total_paise / request.rungs as i64;
    let remainder = total_paise - base * request.rungs as i64;

    let rungs: Vec<FdRung> = (1..=request.rungs)
        .map(|rung| {
            let paise = if rung == 1 { base + remainder } else { base };
            let principal = paise as f64 / 100.0;
            let tenure_months = rung * request.interval_months;
            let annual_rate = slab_rate(tenure_months, request.senior_citizen);
            let maturity_amount = round2(maturity(principal, annual_rate, tenure_months));
            FdRung {
                rung,
                tenure_months,
                principal,
                annual_rate,
                maturity_amount,
                interest: round2(maturity_amount - principal),
            }
        })
        .collect();

    let total_principal = round2(rungs.iter().map(|r| r.principal).sum());
    let total_maturity = round2(rungs.iter().map(|r| r.maturity_amount).sum());
    Ok(FdLadder {
        total_principal,
        total_maturity,
        total_interest: round2(total_maturity - total_principal),
        rungs,
    })
}

pub struct FdLadderTool;

impl Tool for FdLadderTool {
    fn name(&self) -> &'static str {
        TOOL_NAME
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: TOOL_NAME.to_string(),
            description: "Split an amount into a ladder of fixed deposits maturing at regular intervals and project maturity values.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "amount": {"type": "number", "description": "Total amount to invest in INR"},
                    "rungs": {"type": "integer", "minimum": 1, "maximum": MAX_RUNGS},
                    "interval_months": {"type": "integer", "minimum": 1, "description": "Months between maturities"},
                    "senior_citizen": {"type": "boolean", "default": false}
                },
                "required": ["amount", "rungs", "interval_months"]
            }),
        }
    }

    fn call(&self, args: Value) -> Result<Value, ToolError> {
        call_typed(args, |req: FdLadderRequest| suggest_fd_ladder(&req))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(amount: f64, rungs: u32, interval_months: u32) -> FdLadderRequest {
        FdLadderRequest {
            amount,
            rungs,
            interval_months,
            senior_citizen: false,
        }
    }

    #[test]
    fn test_slab_rates() {
        assert_eq!(slab_rate(3, false), 4.50);
        assert_eq!(slab_rate(12, false), 6.80);
        assert_eq!(slab_rate(48, false), 7.10);
        assert_eq!(slab_rate(60, false), 6.75);
        assert_eq!(slab_rate(12, true), 7.30);
    }

    #[test]
    fn test_even_ladder() {
        let ladder = suggest_fd_ladder(&request(100_000.0, 4, 12)).unwrap();
        assert_eq!(ladder.rungs.len(), 4);
        let tenures: Vec<u32> = ladder.rungs.iter().map(|r| r.tenure_months).collect();
        assert_eq!(tenures, vec![12, 24, 36, 48]);
        assert!(ladder.rungs.iter().all(|r| r.principal == 25_000.0));
        assert!((ladder.rungs[0].maturity_amount - 26_743.84).abs() < 0.011);
        assert_eq!(ladder.total_principal, 100_000.0);
        assert!(ladder.total_interest > 0.0);
    }

    #[test]
    fn test_remainder_goes_to_first_rung() {
        let ladder = suggest_fd_ladder(&request(100_001.0, 3, 6)).unwrap();
        assert_eq!(ladder.rungs[0].principal, 33_333.68);
        assert_eq!(ladder.rungs[1].principal, 33_333.66);
        assert_eq!(ladder.rungs[2].principal, 33_333.66);
        assert_eq!(ladder.total_principal, 100_001.0);
    }

    #[test]
    fn test_senior_citizen_earns_more() {
        let regular = suggest_fd_ladder(&request(50_000.0, 2, 12)).unwrap();
        let senior = suggest_fd_ladder(&FdLadderRequest {
            senior_citizen: true,
            ..request(50_000.0, 2, 12)
        })
        .unwrap();
        assert_eq!(senior.rungs[0].annual_rate, regular.rungs[0].annual_rate + SENIOR_CITIZEN_BONUS);
        assert!(senior.total_maturity > regular.total_maturity);
    }

    #[test]
    fn test_validation() {
        assert!(suggest_fd_ladder(&request(100_000.0, 0, 12)).is_err());
        assert!(suggest_fd_ladder(&request(100_000.0, 11, 6)).is_err());
        assert!(suggest_fd_ladder(&request(100_000.0, 5, 0)).is_err());
        assert!(suggest_fd_ladder(&request(100_000.0, 5, 25)).is_err());
        assert!(suggest_fd_ladder(&request(2_000.0, 3, 12)).is_err());
        assert!(suggest_fd_ladder(&request(f64::INFINITY, 3, 12)).is_err());
    }

    #[test]
    fn test_huge_interval_is_rejected() {
        let err = suggest_fd_ladder(&request(100_000.0, 2, u32::MAX)).unwrap_err();
        assert!(matches!(err, ToolError::InvalidArgument(_)));
        assert!(suggest_fd_ladder(&request(100_000.0, 2, 3_000_000_000)).is_err());

        let err = FdLadderTool
            .call(json!({"amount": 100000.0, "rungs": 5, "interval_months": 4_000_000_000u32}))
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArgument(_)));
    }
}
