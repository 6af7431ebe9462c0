use axum::{extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::extract::{Json, Path, Query};
use crate::models::lead::LeadRow;
use crate::models::segment::SegmentRow;
use crate::pagination::{PageParams, Paginated};
use crate::plans::check_limit;
use crate::segments::criteria::{lead_query, SegmentCriteria};
use crate::state::AppState;
use crate::users::lock_plan;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateSegmentRequest {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
    #[serde(default)]
    pub criteria: Value,
    #[serde(default = "default_dynamic")]
    pub is_dynamic: bool,
}

fn default_dynamic() -> bool {
    true
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateSegmentRequest {
    #[validate(length(min = 1, max = 120))]
    pub name: Option<String>,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
    pub criteria: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct PreviewRequest {
    #[serde(default)]
    pub criteria: Value,
}

#[derive(Debug, Serialize)]
pub struct PreviewResponse {
    pub criteria: SegmentCriteria,
    pub matching_leads: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddMembersRequest {
    #[validate(length(min = 1, max = 500))]
    pub lead_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct AddMembersResponse {
    pub added: u64,
}

async fn fetch_owned_segment(
    pool: &PgPool,
    auth: &AuthUser,
    segment_id: Uuid,
) -> Result<SegmentRow, AppError> {
    let segment = sqlx::query_as::<_, SegmentRow>("SELECT * FROM segments WHERE id = $1")
        .bind(segment_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Segment {segment_id} not found")))?;
    auth.ensure_owner(segment.owner_id)?;
    Ok(segment)
}

fn require_static(segment: &SegmentRow) -> Result<(), AppError> {
    if segment.is_dynamic {
        return Err(AppError::Validation(
            "Dynamic segments derive membership from criteria; members cannot be edited"
                .to_string(),
        ));
    }
    Ok(())
}

/// GET /api/v1/segments
pub async fn handle_list_segments(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<SegmentRow>>, AppError> {
    let segments = sqlx::query_as::<_, SegmentRow>(
        "SELECT * FROM segments WHERE owner_id = $1 ORDER BY created_at DESC",
    )
    .bind(auth.user_id)
    .fetch_all(&state.db)
    .await?;
    Ok(Json(segments))
}

/// POST /api/v1/segments
pub async fn handle_create_segment(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<CreateSegmentRequest>,
) -> Result<(StatusCode, Json<SegmentRow>), AppError> {
    req.validate()?;
    let criteria = SegmentCriteria::from_json(&req.criteria)?;

    let mut tx = state.db.begin().await?;
    let plan = lock_plan(&mut tx, auth.user_id).await?;
    let current: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM segments WHERE owner_id = $1")
        .bind(auth.user_id)
        .fetch_one(&mut *tx)
        .await?;
    check_limit("segments", current, plan.limits().max_segments)?;

    let segment = sqlx::query_as::<_, SegmentRow>(
        r#"
        INSERT INTO segments (owner_id, name, description, criteria, is_dynamic)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(auth.user_id)
    .bind(req.name.trim())
    .bind(&req.description)
    .bind(criteria.to_json())
    .bind(req.is_dynamic)
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;

    info!(
        "Created {} segment {} for {}",
        if segment.is_dynamic { "dynamic" } else { "static" },
        segment.id,
        auth.user_id
    );
    Ok((StatusCode::CREATED, Json(segment)))
}

/// GET /api/v1/segments/:id
pub async fn handle_get_segment(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<SegmentRow>, AppError> {
    Ok(Json(fetch_owned_segment(&state.db, &auth, id).await?))
}

/// PATCH /api/v1/segments/:id
pub async fn handle_update_segment(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateSegmentRequest>,
) -> Result<Json<SegmentRow>, AppError> {
    req.validate()?;
    let criteria = req
        .criteria
        .as_ref()
        .map(SegmentCriteria::from_json)
        .transpose()?;
    let existing = fetch_owned_segment(&state.db, &auth, id).await?;

    let segment = sqlx::query_as::<_, SegmentRow>(
        r#"
        UPDATE segments
        SET name = $2, description = $3, criteria = $4, updated_at = now()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(req.name.as_deref().map(str::trim).unwrap_or(&existing.name))
    .bind(req.description.or(existing.description))
    .bind(criteria.map(|c| c.to_json()).unwrap_or(existing.criteria))
    .fetch_one(&state.db)
    .await?;

    info!("Updated segment {id}");
    Ok(Json(segment))
}

/// DELETE /api/v1/segments/:id
pub async fn handle_delete_segment(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    fetch_owned_segment(&state.db, &auth, id).await?;
    sqlx::query("DELETE FROM segments WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await?;
    info!("Deleted segment {id}");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/segments/:id/leads
pub async fn handle_segment_leads(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Query(page): Query<PageParams>,
) -> Result<Json<Paginated<LeadRow>>, AppError> {
    let segment = fetch_owned_segment(&state.db, &auth, id).await?;
    let page = state.page(&page);

    if segment.is_dynamic {
        let criteria = SegmentCriteria::from_json(&segment.criteria)?;
        let total: i64 = lead_query("SELECT COUNT(*) FROM leads", segment.owner_id, &criteria)
            .build_query_scalar()
            .fetch_one(&state.db)
            .await?;
        let mut qb = lead_query("SELECT * FROM leads", segment.owner_id, &criteria);
        qb.push(" ORDER BY score DESC, created_at DESC LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());
        let items = qb.build_query_as::<LeadRow>().fetch_all(&state.db).await?;
        return Ok(Json(Paginated::new(items, page, total)));
    }

    let total: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM segment_members WHERE segment_id = $1")
            .bind(id)
            .fetch_one(&state.db)
            .await?;
    let items = sqlx::query_as::<_, LeadRow>(
        r#"
        SELECT l.* FROM leads l
        JOIN segment_members m ON m.lead_id = l.id
        WHERE m.segment_id = $1
        ORDER BY m.added_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(id)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(&state.db)
    .await?;
    Ok(Json(Paginated::new(items, page, total)))
}

/// POST /api/v1/segments/:id/members
pub async fn handle_add_members(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<AddMembersRequest>,
) -> Result<Json<AddMembersResponse>, AppError> {
    req.validate()?;
    let segment = fetch_owned_segment(&state.db, &auth, id).await?;
    require_static(&segment)?;

    // Only leads of the segment owner are inserted; foreign ids are ignored.
    let result = sqlx::query(
        r#"
        INSERT INTO segment_members (segment_id, lead_id)
        SELECT $1, id FROM leads WHERE owner_id = $2 AND id = ANY($3)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(id)
    .bind(segment.owner_id)
    .bind(&req.lead_ids)
    .execute(&state.db)
    .await?;

    info!("Added {} members to segment {id}", result.rows_affected());
    Ok(Json(AddMembersResponse {
        added: result.rows_affected(),
    }))
}

/// DELETE /api/v1/segments/:id/members/:lead_id
pub async fn handle_remove_member(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((id, lead_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    let segment = fetch_owned_segment(&state.db, &auth, id).await?;
    require_static(&segment)?;

    let result = sqlx::query("DELETE FROM segment_members WHERE segment_id = $1 AND lead_id = $2")
        .bind(id)
        .bind(lead_id)
        .execute(&state.db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "Lead {lead_id} is not a member of segment {id}"
        )));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/segments/preview
pub async fn handle_preview_segment(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<PreviewRequest>,
) -> Result<Json<PreviewResponse>, AppError> {
    let criteria = SegmentCriteria::from_json(&req.criteria)?;
    let matching_leads: i64 = lead_query("SELECT COUNT(*) FROM leads", auth.user_id, &criteria)
        .build_query_scalar()
        .fetch_one(&state.db)
        .await?;
    Ok(Json(PreviewResponse {
        criteria,
        matching_leads,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_require_static() {
        let now = Utc::now();
        let mut segment = SegmentRow {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            name: "VIPs".into(),
            description: None,
            criteria: Value::Null,
            is_dynamic: true,
            created_at: now,
            updated_at: now,
        };
        assert!(require_static(&segment).is_err());
        segment.is_dynamic = false;
        assert!(require_static(&segment).is_ok());
    }

    #[test]
    fn test_create_request_defaults_to_dynamic() {
        let req: CreateSegmentRequest =
            serde_json::from_value(serde_json::json!({"name": "Hot"})).unwrap();
        assert!(req.is_dynamic);
        assert!(req.criteria.is_null());
    }
}
