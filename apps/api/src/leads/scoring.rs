//! Lead scoring: a weighted sum over completeness, source quality, priority and
//! recency, capped at 100.
//!
//! `AppState` carries an `Arc<dyn LeadScorer>` so the weighting can be swapped
//! without touching handlers.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::leads::models::{LeadPriority, LeadSource};
use crate::models::lead::LeadRow;

pub const MAX_SCORE: i32 = 100;

/// The fields scoring looks at, borrowed from a row or a pending insert.
#[derive(Debug, Clone)]
pub struct ScoreInput<'a> {
    pub first_name: &'a str,
    pub last_name: Option<&'a str>,
    pub email: Option<&'a str>,
    pub phone: Option<&'a str>,
    pub company: Option<&'a str>,
    pub job_title: Option<&'a str>,
    pub source: LeadSource,
    pub priority: LeadPriority,
    pub created_at: DateTime<Utc>,
    pub last_contacted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct ScoreBreakdown {
    pub completeness: i32,
    pub source_quality: i32,
    pub priority: i32,
    pub recency: i32,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct LeadScore {
    pub total: i32,
    pub breakdown: ScoreBreakdown,
}

pub trait LeadScorer: Send + Sync {
    fn score(&self, lead: &ScoreInput<'_>, now: DateTime<Utc>) -> LeadScore;
}

/// Default scorer with fixed per-category weights.
pub struct WeightedLeadScorer;

impl LeadScorer for WeightedLeadScorer {
    fn score(&self, lead: &ScoreInput<'_>, now: DateTime<Utc>) -> LeadScore {
        let breakdown = ScoreBreakdown {
            completeness: completeness_points(lead),
            source_quality: source_points(lead.source),
            priority: priority_points(lead.priority),
            recency: recency_points(lead.last_contacted_at.unwrap_or(lead.created_at), now),
        };
        let total = (breakdown.completeness
            + breakdown.source_quality
            + breakdown.priority
            + breakdown.recency)
            .min(MAX_SCORE);
        LeadScore { total, breakdown }
    }
}

fn present(v: Option<&str>) -> bool {
    v.map(|s| !s.trim().is_empty()).unwrap_or(false)
}

/// Up to 40 points for contact details on file.
fn completeness_points(lead: &ScoreInput<'_>) -> i32 {
    let mut points = 0;
    if present(lead.email) {
        points += 10;
    }
    if present(lead.phone) {
        points += 10;
    }
    if present(lead.company) {
        points += 8;
    }
    if present(lead.job_title) {
        points += 7;
    }
    if !lead.first_name.trim().is_empty() && present(lead.last_name) {
        points += 5;
    }
    points
}

fn source_points(source: LeadSource) -> i32 {
    match source {
        LeadSource::Referral => 25,
        LeadSource::Event => 20,
        LeadSource::CardScan => 18,
        LeadSource::CardForm | LeadSource::Website => 15,
        LeadSource::Social => 10,
        LeadSource::Manual => 8,
        LeadSource::Import | LeadSource::Other => 5,
    }
}

fn priority_points(priority: LeadPriority) -> i32 {
    match priority {
        LeadPriority::High => 20,
        LeadPriority::Medium => 12,
        LeadPriority::Low => 5,
    }
}

fn recency_points(last_touch: DateTime<Utc>, now: DateTime<Utc>) -> i32 {
    let days = (now - last_touch).num_days().max(0);
    match days {
        0..=7 => 15,
        8..=30 => 10,
        31..=90 => 5,
        _ => 0,
    }
}

/// Scoring input for a stored row. Unparseable enum columns score as
/// `other` / `low`.
pub fn input_from_row(row: &LeadRow) -> ScoreInput<'_> {
    ScoreInput {
        first_name: &row.first_name,
        last_name: row.last_name.as_deref(),
        email: row.email.as_deref(),
        phone: row.phone.as_deref(),
        company: row.company.as_deref(),
        job_title: row.job_title.as_deref(),
        source: row.source.parse().unwrap_or(LeadSource::Other),
        priority: row.priority.parse().unwrap_or(LeadPriority::Low),
        created_at: row.created_at,
        last_contacted_at: row.last_contacted_at,
    }
}
