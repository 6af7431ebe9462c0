use axum::extract::State;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::extract::Json;
use crate::plans::{remaining, Plan, PlanInfo, PlanLimits, ALL_PLANS};
use crate::state::AppState;
use crate::users::load_plan;

#[derive(Debug, Serialize)]
pub struct ResourceUsage {
    pub used: i64,
    pub limit: Option<i64>,
    pub remaining: Option<i64>,
}

impl ResourceUsage {
    pub fn new(used: i64, limit: Option<i64>) -> Self {
        Self {
            used,
            limit,
            remaining: remaining(used, limit),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UsageResponse {
    pub plan: Plan,
    pub limits: PlanLimits,
    pub cards: ResourceUsage,
    pub leads: ResourceUsage,
    pub segments: ResourceUsage,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, sqlx::FromRow)]
pub struct UsageCounts {
    pub cards: i64,
    pub leads: i64,
    pub segments: i64,
}

pub async fn usage_counts(pool: &PgPool, user_id: Uuid) -> Result<UsageCounts, AppError> {
    Ok(sqlx::query_as::<_, UsageCounts>(
        r#"
        SELECT
            (SELECT COUNT(*) FROM business_cards WHERE owner_id = $1) AS cards,
            (SELECT COUNT(*) FROM leads WHERE owner_id = $1) AS leads,
            (SELECT COUNT(*) FROM segments WHERE owner_id = $1) AS segments
        "#,
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?)
}

pub fn build_usage(plan: Plan, counts: UsageCounts) -> UsageResponse {
    let limits = plan.limits();
    UsageResponse {
        plan,
        limits,
        cards: ResourceUsage::new(counts.cards, limits.max_cards),
        leads: ResourceUsage::new(counts.leads, limits.max_leads),
        segments: ResourceUsage::new(counts.segments, limits.max_segments),
    }
}

/// GET /api/v1/billing/plans
pub async fn handle_list_plans() -> Json<Vec<PlanInfo>> {
    Json(ALL_PLANS.iter().map(Plan::info).collect())
}

/// GET /api/v1/billing/usage
pub async fn handle_usage(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<UsageResponse>, AppError> {
    let plan = load_plan(&state.db, auth.user_id).await?;
    let counts = usage_counts(&state.db, auth.user_id).await?;
    Ok(Json(build_usage(plan, counts)))
}
