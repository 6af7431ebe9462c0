use axum::{extract::State, http::StatusCode};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::extract::{Json, Path, Query};
use crate::leads::import::{run_import, ImportRequest, ImportSummary, MAX_IMPORT_ROWS};
use crate::leads::models::{LeadPriority, LeadSource, LeadStatus};
use crate::leads::scoring::{input_from_row, LeadScore};
use crate::leads::store::{
    apply_update, count_leads, fetch_owned_lead, insert_lead, save_lead, CreateLeadRequest,
    UpdateLeadRequest,
};
use crate::models::lead::LeadRow;
use crate::pagination::{PageParams, Paginated};
use crate::plans::check_limit;
use crate::segments::criteria::{lead_query, SegmentCriteria};
use crate::state::AppState;
use crate::users::lock_plan;

#[derive(Debug, Default, Deserialize)]
pub struct LeadFilter {
    pub status: Option<LeadStatus>,
    pub source: Option<LeadSource>,
    pub priority: Option<LeadPriority>,
    pub min_score: Option<i32>,
    pub tag: Option<String>,
    pub q: Option<String>,
}

impl From<LeadFilter> for SegmentCriteria {
    fn from(f: LeadFilter) -> Self {
        SegmentCriteria {
            statuses: f.status.into_iter().collect(),
            sources: f.source.into_iter().collect(),
            priorities: f.priority.into_iter().collect(),
            min_score: f.min_score,
            tags_any: f.tag.into_iter().filter(|t| !t.trim().is_empty()).collect(),
            search: f.q,
            ..Default::default()
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LeadDetail {
    pub lead: LeadRow,
    pub score: LeadScore,
}

/// GET /api/v1/leads
pub async fn handle_list_leads(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(page): Query<PageParams>,
    Query(filter): Query<LeadFilter>,
) -> Result<Json<Paginated<LeadRow>>, AppError> {
    let page = state.page(&page);
    let criteria = SegmentCriteria::from(filter);

    let total: i64 = lead_query("SELECT COUNT(*) FROM leads", auth.user_id, &criteria)
        .build_query_scalar()
        .fetch_one(&state.db)
        .await?;

    let mut qb = lead_query("SELECT * FROM leads", auth.user_id, &criteria);
    qb.push(" ORDER BY score DESC, created_at DESC LIMIT ")
        .push_bind(page.limit())
        .push(" OFFSET ")
        .push_bind(page.offset());
    let items = qb.build_query_as::<LeadRow>().fetch_all(&state.db).await?;

    Ok(Json(Paginated::new(items, page, total)))
}

/// POST /api/v1/leads
pub async fn handle_create_lead(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<CreateLeadRequest>,
) -> Result<(StatusCode, Json<LeadDetail>), AppError> {
    req.validate()?;

    let mut tx = state.db.begin().await?;
    let plan = lock_plan(&mut tx, auth.user_id).await?;
    let current = count_leads(&mut tx, auth.user_id).await?;
    check_limit("leads", current, plan.limits().max_leads)?;

    let lead = insert_lead(
        &mut tx,
        state.lead_scorer.as_ref(),
        auth.user_id,
        &req,
        LeadSource::Manual,
    )
    .await?;
    tx.commit().await?;
    let score = state.lead_scorer.score(&input_from_row(&lead), Utc::now());
    Ok((StatusCode::CREATED, Json(LeadDetail { lead, score })))
}

/// GET /api/v1/leads/:id
pub async fn handle_get_lead(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<LeadDetail>, AppError> {
    let lead = fetch_owned_lead(&state.db, &auth, id).await?;
    let score = state.lead_scorer.score(&input_from_row(&lead), Utc::now());
    Ok(Json(LeadDetail { lead, score }))
}

/// PATCH /api/v1/leads/:id
pub async fn handle_update_lead(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateLeadRequest>,
) -> Result<Json<LeadDetail>, AppError> {
    req.validate()?;
    let mut lead = fetch_owned_lead(&state.db, &auth, id).await?;
    apply_update(&mut lead, req)?;
    let (lead, score) = save_lead(&state.db, state.lead_scorer.as_ref(), lead).await?;
    info!("Updated lead {id} (score={})", lead.score);
    Ok(Json(LeadDetail { lead, score }))
}

/// DELETE /api/v1/leads/:id
pub async fn handle_delete_lead(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let lead = fetch_owned_lead(&state.db, &auth, id).await?;
    sqlx::query("DELETE FROM leads WHERE id = $1")
        .bind(lead.id)
        .execute(&state.db)
        .await?;
    info!("Deleted lead {id}");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/leads/:id/contacted
pub async fn handle_mark_contacted(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<LeadDetail>, AppError> {
    let mut lead = fetch_owned_lead(&state.db, &auth, id).await?;
    lead.last_contacted_at = Some(Utc::now());
    if lead.status == LeadStatus::New.as_str() {
        lead.status = LeadStatus::Contacted.as_str().to_string();
    }
    let (lead, score) = save_lead(&state.db, state.lead_scorer.as_ref(), lead).await?;
    Ok(Json(LeadDetail { lead, score }))
}

/// POST /api/v1/leads/:id/rescore
pub async fn handle_rescore_lead(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<LeadDetail>, AppError> {
    let lead = fetch_owned_lead(&state.db, &auth, id).await?;
    let (lead, score) = save_lead(&state.db, state.lead_scorer.as_ref(), lead).await?;
    Ok(Json(LeadDetail { lead, score }))
}

/// POST /api/v1/leads/import
pub async fn handle_import_leads(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<ImportRequest>,
) -> Result<Json<ImportSummary>, AppError> {
    if req.rows.is_empty() {
        return Err(AppError::Validation("rows cannot be empty".to_string()));
    }
    if req.rows.len() > MAX_IMPORT_ROWS {
        return Err(AppError::Validation(format!(
            "At most {MAX_IMPORT_ROWS} rows per import"
        )));
    }

    let summary = run_import(
        &state.db,
        state.lead_scorer.as_ref(),
        auth.user_id,
        req.rows,
    )
    .await?;
    Ok(Json(summary))
}
