use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::AppError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Plan {
    Free,
    Pro,
    Business,
}

/// Per-plan cardinality limits. `None` means unlimited.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct PlanLimits {
    pub max_cards: Option<i64>,
    pub max_leads: Option<i64>,
    pub max_segments: Option<i64>,
    pub booking_enabled: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanInfo {
    pub plan: Plan,
    pub monthly_price_cents: i64,
    pub limits: PlanLimits,
}

pub const ALL_PLANS: [Plan; 3] = [Plan::Free, Plan::Pro, Plan::Business];

impl Plan {
    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Free => "free",
            Plan::Pro => "pro",
            Plan::Business => "business",
        }
    }

    pub fn limits(&self) -> PlanLimits {
        match self {
            Plan::Free => PlanLimits {
                max_cards: Some(1),
                max_leads: Some(100),
                max_segments: Some(1),
                booking_enabled: false,
            },
            Plan::Pro => PlanLimits {
                max_cards: Some(5),
                max_leads: Some(5_000),
                max_segments: Some(20),
                booking_enabled: true,
            },
            Plan::Business => PlanLimits {
                max_cards: None,
                max_leads: None,
                max_segments: None,
                booking_enabled: true,
            },
        }
    }

    pub fn monthly_price_cents(&self) -> i64 {
        match self {
            Plan::Free => 0,
            Plan::Pro => 1_200,
            Plan::Business => 4_900,
        }
    }

    pub fn info(&self) -> PlanInfo {
        PlanInfo {
            plan: *self,
            monthly_price_cents: self.monthly_price_cents(),
            limits: self.limits(),
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Plan {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(Plan::Free),
            "pro" => Ok(Plan::Pro),
            "business" => Ok(Plan::Business),
            other => Err(AppError::Validation(format!("Unknown plan '{other}'"))),
        }
    }
}

/// Fails with `PlanLimit` once `current` has reached `limit`.
pub fn check_limit(resource: &str, current: i64, limit: Option<i64>) -> Result<(), AppError> {
    match limit {
        Some(max) if current >= max => Err(AppError::PlanLimit(format!(
            "Your plan allows at most {max} {resource}"
        ))),
        _ => Ok(()),
    }
}

/// How many more items fit under `limit`; `None` when unlimited.
pub fn remaining(current: i64, limit: Option<i64>) -> Option<i64> {
    limit.map(|max| (max - current).max(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_free_plan_card_limit() {
        let limits = Plan::Free.limits();
        assert!(check_limit("cards", 0, limits.max_cards).is_ok());
        let err = check_limit("cards", 1, limits.max_cards).unwrap_err();
        assert!(matches!(err, AppError::PlanLimit(_)));
    }

    #[test]
    fn test_business_is_unlimited() {
        let limits = Plan::Business.limits();
        assert!(check_limit("leads", 1_000_000, limits.max_leads).is_ok());
        assert_eq!(remaining(1_000_000, limits.max_leads), None);
    }

    #[test]
    fn test_remaining_never_negative() {
        assert_eq!(remaining(7, Some(5)), Some(0));
        assert_eq!(remaining(2, Some(5)), Some(3));
    }

    #[test]
    fn test_parse_round_trip() {
        for plan in ALL_PLANS {
            assert_eq!(plan.as_str().parse::<Plan>().unwrap(), plan);
        }
        assert!("enterprise".parse::<Plan>().is_err());
    }

    #[test]
    fn test_booking_only_on_paid_plans() {
        assert!(!Plan::Free.limits().booking_enabled);
        assert!(Plan::Pro.limits().booking_enabled);
    }
}
