use std::collections::BTreeMap;

use axum::extract::State;
use serde::{Deserialize, Serialize};
use sqlx::{Postgres, QueryBuilder};
use tracing::info;
use uuid::Uuid;

use crate::auth::AdminUser;
use crate::errors::AppError;
use crate::extract::{Json, Path, Query};
use crate::models::user::User;
use crate::pagination::{PageParams, Paginated};
use crate::plans::Plan;
use crate::segments::criteria::like_pattern;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct UserStats {
    pub total: i64,
    pub by_plan: BTreeMap<String, i64>,
    pub new_last_30_days: i64,
}

#[derive(Debug, Serialize)]
pub struct AdminStats {
    pub users: UserStats,
    pub cards_total: i64,
    pub card_views_total: i64,
    pub leads_total: i64,
    pub average_lead_score: Option<f64>,
    pub appointments_by_status: BTreeMap<String, i64>,
    pub mrr_cents: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct UserFilter {
    pub q: Option<String>,
    pub plan: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangePlanRequest {
    pub plan: String,
}

/// Estimated monthly revenue from per-plan user counts. Unknown plan names
/// contribute nothing.
pub fn monthly_recurring_revenue(by_plan: &BTreeMap<String, i64>) -> i64 {
    by_plan
        .iter()
        .filter_map(|(name, count)| {
            name.parse::<Plan>()
                .ok()
                .map(|plan| plan.monthly_price_cents() * count)
        })
        .sum()
}

fn push_user_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &UserFilter) -> Result<(), AppError> {
    qb.push(" WHERE TRUE");
    if let Some(q) = filter.q.as_deref().filter(|q| !q.trim().is_empty()) {
        let pattern = like_pattern(q);
        qb.push(" AND (email ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR full_name ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(plan) = filter.plan.as_deref() {
        let plan: Plan = plan.parse()?;
        qb.push(" AND plan = ").push_bind(plan.as_str());
    }
    Ok(())
}

async fn grouped_counts(
    pool: &sqlx::PgPool,
    sql: &'static str,
) -> Result<BTreeMap<String, i64>, AppError> {
    let rows: Vec<(String, i64)> = sqlx::query_as(sql).fetch_all(pool).await?;
    Ok(rows.into_iter().collect())
}

/// GET /api/v1/admin/stats
pub async fn handle_stats(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<AdminStats>, AppError> {
    let by_plan = grouped_counts(
        &state.db,
        "SELECT plan, COUNT(*) FROM users GROUP BY plan",
    )
    .await?;
    let new_last_30_days: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM users WHERE created_at >= now() - INTERVAL '30 days'",
    )
    .fetch_one(&state.db)
    .await?;
    let (cards_total, card_views_total): (i64, i64) = sqlx::query_as(
        "SELECT COUNT(*), COALESCE(SUM(view_count), 0)::BIGINT FROM business_cards",
    )
    .fetch_one(&state.db)
    .await?;
    let (leads_total, average_lead_score): (i64, Option<f64>) =
        sqlx::query_as("SELECT COUNT(*), AVG(score)::FLOAT8 FROM leads")
            .fetch_one(&state.db)
            .await?;
    let appointments_by_status = grouped_counts(
        &state.db,
        "SELECT status, COUNT(*) FROM appointments GROUP BY status",
    )
    .await?;

    let mrr_cents = monthly_recurring_revenue(&by_plan);
    Ok(Json(AdminStats {
        users: UserStats {
            total: by_plan.values().sum(),
            by_plan,
            new_last_30_days,
        },
        cards_total,
        card_views_total,
        leads_total,
        average_lead_score,
        appointments_by_status,
        mrr_cents,
    }))
}

/// GET /api/v1/admin/users
pub async fn handle_list_users(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(page): Query<PageParams>,
    Query(filter): Query<UserFilter>,
) -> Result<Json<Paginated<User>>, AppError> {
    let page = state.page(&page);

    let mut count = QueryBuilder::new("SELECT COUNT(*) FROM users");
    push_user_filters(&mut count, &filter)?;
    let total: i64 = count.build_query_scalar().fetch_one(&state.db).await?;

    let mut qb = QueryBuilder::new("SELECT * FROM users");
    push_user_filters(&mut qb, &filter)?;
    qb.push(" ORDER BY created_at DESC LIMIT ")
        .push_bind(page.limit())
        .push(" OFFSET ")
        .push_bind(page.offset());
    let items = qb.build_query_as::<User>().fetch_all(&state.db).await?;

    Ok(Json(Paginated::new(items, page, total)))
}

/// PATCH /api/v1/admin/users/:id/plan
pub async fn handle_change_plan(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
    Json(req): Json<ChangePlanRequest>,
) -> Result<Json<User>, AppError> {
    let plan: Plan = req.plan.parse()?;
    let user = sqlx::query_as::<_, User>(
        "UPDATE users SET plan = $2, updated_at = now() WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(plan.as_str())
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("User {id} not found")))?;

    info!("Admin {} moved user {id} to plan {plan}", admin.user_id);
    Ok(Json(user))
}
