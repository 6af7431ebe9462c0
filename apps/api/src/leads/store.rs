use chrono::Utc;
use serde::Deserialize;
use sqlx::{PgConnection, PgPool};
use tracing::info;
use uuid::Uuid;
use validator::{Validate, ValidateEmail};

use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::leads::models::{LeadPriority, LeadSource, LeadStatus};
use crate::leads::scoring::{input_from_row, LeadScore, LeadScorer, ScoreInput};
use crate::models::lead::LeadRow;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateLeadRequest {
    #[validate(length(min = 1, max = 100))]
    pub first_name: String,
    #[validate(length(max = 100))]
    pub last_name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(max = 40))]
    pub phone: Option<String>,
    #[validate(length(max = 200))]
    pub company: Option<String>,
    #[validate(length(max = 200))]
    pub job_title: Option<String>,
    pub source: Option<LeadSource>,
    pub priority: Option<LeadPriority>,
    pub status: Option<LeadStatus>,
    #[validate(length(max = 5000))]
    pub notes: Option<String>,
    #[serde(default)]
    #[validate(length(max = 50))]
    pub tags: Vec<String>,
    pub card_id: Option<Uuid>,
}

/// Partial update. `Some("")` clears an optional text field.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateLeadRequest {
    #[validate(length(min = 1, max = 100))]
    pub first_name: Option<String>,
    #[validate(length(max = 100))]
    pub last_name: Option<String>,
    pub email: Option<String>,
    #[validate(length(max = 40))]
    pub phone: Option<String>,
    #[validate(length(max = 200))]
    pub company: Option<String>,
    #[validate(length(max = 200))]
    pub job_title: Option<String>,
    pub source: Option<LeadSource>,
    pub priority: Option<LeadPriority>,
    pub status: Option<LeadStatus>,
    #[validate(length(max = 5000))]
    pub notes: Option<String>,
    #[validate(length(max = 50))]
    pub tags: Option<Vec<String>>,
}

/// Trimmed, lowercased, deduplicated, blanks dropped.
pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut out: Vec<String> = tags
        .iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}

/// Trims; an empty result becomes `None`.
pub fn non_blank(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Folds a partial update into a row. Score is left for the caller to recompute.
pub fn apply_update(row: &mut LeadRow, req: UpdateLeadRequest) -> Result<(), AppError> {
    if let Some(email) = req.email.as_deref().map(str::trim).filter(|e| !e.is_empty()) {
        if !email.validate_email() {
            return Err(AppError::Validation(format!("'{email}' is not a valid email")));
        }
    }
    if let Some(first) = req.first_name {
        if first.trim().is_empty() {
            return Err(AppError::Validation("first_name cannot be blank".to_string()));
        }
        row.first_name = first.trim().to_string();
    }
    if req.last_name.is_some() {
        row.last_name = non_blank(req.last_name);
    }
    if req.email.is_some() {
        row.email = non_blank(req.email);
    }
    if req.phone.is_some() {
        row.phone = non_blank(req.phone);
    }
    if req.company.is_some() {
        row.company = non_blank(req.company);
    }
    if req.job_title.is_some() {
        row.job_title = non_blank(req.job_title);
    }
    if req.notes.is_some() {
        row.notes = non_blank(req.notes);
    }
    if let Some(source) = req.source {
        row.source = source.as_str().to_string();
    }
    if let Some(priority) = req.priority {
        row.priority = priority.as_str().to_string();
    }
    if let Some(status) = req.status {
        row.status = status.as_str().to_string();
    }
    if let Some(tags) = req.tags {
        row.tags = normalize_tags(&tags);
    }
    Ok(())
}

pub async fn count_leads(conn: &mut PgConnection, owner_id: Uuid) -> Result<i64, AppError> {
    Ok(
        sqlx::query_scalar("SELECT COUNT(*) FROM leads WHERE owner_id = $1")
            .bind(owner_id)
            .fetch_one(conn)
            .await?,
    )
}

/// Loads a lead and checks the caller may touch it.
pub async fn fetch_owned_lead(
    pool: &PgPool,
    auth: &AuthUser,
    lead_id: Uuid,
) -> Result<LeadRow, AppError> {
    let lead = sqlx::query_as::<_, LeadRow>("SELECT * FROM leads WHERE id = $1")
        .bind(lead_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Lead {lead_id} not found")))?;
    auth.ensure_owner(lead.owner_id)?;
    Ok(lead)
}

/// Inserts a lead with its score computed up front.
/// `default_source` applies when the request names none.
pub async fn insert_lead(
    conn: &mut PgConnection,
    scorer: &dyn LeadScorer,
    owner_id: Uuid,
    req: &CreateLeadRequest,
    default_source: LeadSource,
) -> Result<LeadRow, AppError> {
    if let Some(card_id) = req.card_id {
        let card_owner: Option<Uuid> =
            sqlx::query_scalar("SELECT owner_id FROM business_cards WHERE id = $1")
                .bind(card_id)
                .fetch_optional(&mut *conn)
                .await?;
        if card_owner != Some(owner_id) {
            return Err(AppError::Validation(format!(
                "card_id {card_id} does not belong to this account"
            )));
        }
    }

    let source = req.source.unwrap_or(default_source);
    let priority = req.priority.unwrap_or(LeadPriority::Medium);
    let status = req.status.unwrap_or(LeadStatus::New);
    let first_name = req.first_name.trim().to_string();
    let last_name = non_blank(req.last_name.clone());
    let email = non_blank(req.email.clone());
    let phone = non_blank(req.phone.clone());
    let company = non_blank(req.company.clone());
    let job_title = non_blank(req.job_title.clone());
    let tags = normalize_tags(&req.tags);

    let now = Utc::now();
    let score = scorer.score(
        &ScoreInput {
            first_name: &first_name,
            last_name: last_name.as_deref(),
            email: email.as_deref(),
            phone: phone.as_deref(),
            company: company.as_deref(),
            job_title: job_title.as_deref(),
            source,
            priority,
            created_at: now,
            last_contacted_at: None,
        },
        now,
    );

    let lead = sqlx::query_as::<_, LeadRow>(
        r#"
        INSERT INTO leads
            (owner_id, card_id, first_name, last_name, email, phone, company, job_title,
             source, priority, status, notes, tags, score, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $15)
        RETURNING *
        "#,
    )
    .bind(owner_id)
    .bind(req.card_id)
    .bind(&first_name)
    .bind(&last_name)
    .bind(&email)
    .bind(&phone)
    .bind(&company)
    .bind(&job_title)
    .bind(source.as_str())
    .bind(priority.as_str())
    .bind(status.as_str())
    .bind(non_blank(req.notes.clone()))
    .bind(&tags)
    .bind(score.total)
    .bind(now)
    .fetch_one(conn)
    .await?;

    info!(
        "Created lead {} for owner {owner_id} (source={}, score={})",
        lead.id, lead.source, lead.score
    );
    Ok(lead)
}

/// Writes every mutable column of `row` back, with a freshly computed score.
pub async fn save_lead(
    pool: &PgPool,
    scorer: &dyn LeadScorer,
    mut row: LeadRow,
) -> Result<(LeadRow, LeadScore), AppError> {
    let score = scorer.score(&input_from_row(&row), Utc::now());
    row.score = score.total;

    let saved = sqlx::query_as::<_, LeadRow>(
        r#"
        UPDATE leads SET
            first_name = $2, last_name = $3, email = $4, phone = $5, company = $6,
            job_title = $7, source = $8, priority = $9, status = $10, notes = $11,
            tags = $12, score = $13, last_contacted_at = $14, updated_at = now()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(row.id)
    .bind(&row.first_name)
    .bind(&row.last_name)
    .bind(&row.email)
    .bind(&row.phone)
    .bind(&row.company)
    .bind(&row.job_title)
    .bind(&row.source)
    .bind(&row.priority)
    .bind(&row.status)
    .bind(&row.notes)
    .bind(&row.tags)
    .bind(row.score)
    .bind(row.last_contacted_at)
    .fetch_one(pool)
    .await?;

    Ok((saved, score))
}
