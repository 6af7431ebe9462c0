use axum::extract::State;
use serde::Serialize;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::extract::Json;
use crate::models::user::User;
use crate::plans::{Plan, PlanLimits};
use crate::state::AppState;

/// Loads the caller's account row. A valid token for a deleted account is
/// treated as unauthenticated.
pub async fn load_user(pool: &PgPool, user_id: Uuid) -> Result<User, AppError> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::Unauthorized)
}

pub async fn load_plan(pool: &PgPool, user_id: Uuid) -> Result<Plan, AppError> {
    Ok(load_user(pool, user_id).await?.plan())
}

/// Locks the account row until `conn`'s transaction ends and returns the plan.
/// Holders serialise per owner, so a count taken afterwards stays valid until commit.
pub async fn lock_plan(conn: &mut PgConnection, user_id: Uuid) -> Result<Plan, AppError> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1 FOR UPDATE")
        .bind(user_id)
        .fetch_optional(conn)
        .await?
        .ok_or(AppError::Unauthorized)?;
    Ok(user.plan())
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: User,
    pub plan: Plan,
    pub limits: PlanLimits,
}

/// GET /api/v1/me
pub async fn handle_me(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<MeResponse>, AppError> {
    let user = load_user(&state.db, auth.user_id).await?;
    let plan = user.plan();
    Ok(Json(MeResponse {
        user,
        plan,
        limits: plan.limits(),
    }))
}
