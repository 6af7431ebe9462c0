use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::AppError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    New,
    Contacted,
    Qualified,
    Proposal,
    Won,
    Lost,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LeadSource {
    Referral,
    Event,
    CardForm,
    CardScan,
    Website,
    Social,
    Manual,
    Import,
    Other,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LeadPriority {
    High,
    Medium,
    Low,
}

impl LeadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::New => "new",
            LeadStatus::Contacted => "contacted",
            LeadStatus::Qualified => "qualified",
            LeadStatus::Proposal => "proposal",
            LeadStatus::Won => "won",
            LeadStatus::Lost => "lost",
        }
    }
}

impl FromStr for LeadStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(LeadStatus::New),
            "contacted" => Ok(LeadStatus::Contacted),
            "qualified" => Ok(LeadStatus::Qualified),
            "proposal" => Ok(LeadStatus::Proposal),
            "won" => Ok(LeadStatus::Won),
            "lost" => Ok(LeadStatus::Lost),
            other => Err(AppError::Validation(format!("Unknown lead status '{other}'"))),
        }
    }
}

impl LeadSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadSource::Referral => "referral",
            LeadSource::Event => "event",
            LeadSource::CardForm => "card_form",
            LeadSource::CardScan => "card_scan",
            LeadSource::Website => "website",
            LeadSource::Social => "social",
            LeadSource::Manual => "manual",
            LeadSource::Import => "import",
            LeadSource::Other => "other",
        }
    }
}

impl FromStr for LeadSource {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "referral" => Ok(LeadSource::Referral),
            "event" => Ok(LeadSource::Event),
            "card_form" => Ok(LeadSource::CardForm),
            "card_scan" => Ok(LeadSource::CardScan),
            "website" => Ok(LeadSource::Website),
            "social" => Ok(LeadSource::Social),
            "manual" => Ok(LeadSource::Manual),
            "import" => Ok(LeadSource::Import),
            "other" => Ok(LeadSource::Other),
            other => Err(AppError::Validation(format!("Unknown lead source '{other}'"))),
        }
    }
}

impl LeadPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadPriority::High => "high",
            LeadPriority::Medium => "medium",
            LeadPriority::Low => "low",
        }
    }
}

impl FromStr for LeadPriority {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "high" => Ok(LeadPriority::High),
            "medium" => Ok(LeadPriority::Medium),
            "low" => Ok(LeadPriority::Low),
            other => Err(AppError::Validation(format!(
                "Unknown lead priority '{other}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_matches_as_str() {
        let json = serde_json::to_string(&LeadSource::CardForm).unwrap();
        assert_eq!(json, "\"card_form\"");
        assert_eq!("card_form".parse::<LeadSource>().unwrap(), LeadSource::CardForm);
    }

    #[test]
    fn test_unknown_status_is_validation_error() {
        assert!(matches!(
            "archived".parse::<LeadStatus>(),
            Err(AppError::Validation(_))
        ));
    }
}
