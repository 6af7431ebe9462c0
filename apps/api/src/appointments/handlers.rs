use axum::{extract::State, http::StatusCode};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::appointments::availability::{
    open_slots, validate_rules, within_availability, AvailabilityRule,
};
use crate::appointments::conflicts::{
    ensure_no_conflict, TimeWindow, MAX_DURATION_MINUTES, MIN_DURATION_MINUTES,
};
use crate::appointments::models::{blocking_statuses, AppointmentStatus};
use crate::auth::AuthUser;
use crate::cards::handlers::fetch_public_card;
use crate::errors::AppError;
use crate::extract::{Json, Path, Query};
use crate::models::appointment::{AppointmentRow, AvailabilityRuleRow};
use crate::models::card::BusinessCardRow;
use crate::pagination::{PageParams, Paginated};
use crate::state::AppState;
use crate::users::load_plan;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateAppointmentRequest {
    pub card_id: Option<Uuid>,
    #[validate(length(min = 1, max = 120))]
    pub guest_name: String,
    #[validate(email)]
    pub guest_email: String,
    #[validate(length(max = 40))]
    pub guest_phone: Option<String>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RescheduleRequest {
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusChangeRequest {
    pub status: AppointmentStatus,
}

#[derive(Debug, Default, Deserialize)]
pub struct AppointmentFilter {
    pub status: Option<AppointmentStatus>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct SlotQuery {
    pub date: NaiveDate,
    pub duration: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct SlotsResponse {
    pub date: NaiveDate,
    pub duration_minutes: i64,
    pub slots: Vec<TimeWindow>,
}

#[derive(Debug, Deserialize)]
pub struct ReplaceAvailabilityRequest {
    pub rules: Vec<AvailabilityRule>,
}

/// Host's blocking appointments that intersect `window`. The exact half-open
/// test still runs in `ensure_no_conflict`.
async fn blocking_in_window(
    pool: &PgPool,
    owner_id: Uuid,
    window: &TimeWindow,
) -> Result<Vec<AppointmentRow>, AppError> {
    Ok(sqlx::query_as::<_, AppointmentRow>(
        r#"
        SELECT * FROM appointments
        WHERE owner_id = $1 AND status = ANY($2) AND starts_at < $4 AND ends_at > $3
        ORDER BY starts_at
        "#,
    )
    .bind(owner_id)
    .bind(blocking_statuses())
    .bind(window.start)
    .bind(window.end)
    .fetch_all(pool)
    .await?)
}

async fn load_rules(pool: &PgPool, owner_id: Uuid) -> Result<Vec<AvailabilityRule>, AppError> {
    let rows = sqlx::query_as::<_, AvailabilityRuleRow>(
        "SELECT * FROM availability_rules WHERE owner_id = $1 ORDER BY weekday, start_time",
    )
    .bind(owner_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(AvailabilityRule::from).collect())
}

async fn fetch_owned_appointment(
    pool: &PgPool,
    auth: &AuthUser,
    id: Uuid,
) -> Result<AppointmentRow, AppError> {
    let appt = sqlx::query_as::<_, AppointmentRow>("SELECT * FROM appointments WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Appointment {id} not found")))?;
    auth.ensure_owner(appt.owner_id)?;
    Ok(appt)
}

async fn insert_appointment(
    pool: &PgPool,
    owner_id: Uuid,
    card_id: Option<Uuid>,
    req: &CreateAppointmentRequest,
    window: &TimeWindow,
    status: AppointmentStatus,
) -> Result<AppointmentRow, AppError> {
    let appt = sqlx::query_as::<_, AppointmentRow>(
        r#"
        INSERT INTO appointments
            (owner_id, card_id, guest_name, guest_email, guest_phone, starts_at, ends_at, status, notes)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING *
        "#,
    )
    .bind(owner_id)
    .bind(card_id)
    .bind(req.guest_name.trim())
    .bind(req.guest_email.trim())
    .bind(&req.guest_phone)
    .bind(window.start)
    .bind(window.end)
    .bind(status.as_str())
    .bind(&req.notes)
    .fetch_one(pool)
    .await?;

    info!(
        "Booked appointment {} for host {owner_id} at {} ({})",
        appt.id, appt.starts_at, appt.status
    );
    Ok(appt)
}

fn push_appointment_filters(
    qb: &mut QueryBuilder<'_, Postgres>,
    owner_id: Uuid,
    filter: &AppointmentFilter,
) {
    qb.push(" WHERE owner_id = ").push_bind(owner_id);
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(from) = filter.from {
        qb.push(" AND starts_at >= ").push_bind(from);
    }
    if let Some(to) = filter.to {
        qb.push(" AND starts_at < ").push_bind(to);
    }
}

/// GET /api/v1/appointments
pub async fn handle_list_appointments(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(page): Query<PageParams>,
    Query(filter): Query<AppointmentFilter>,
) -> Result<Json<Paginated<AppointmentRow>>, AppError> {
    let page = state.page(&page);

    let mut count = QueryBuilder::new("SELECT COUNT(*) FROM appointments");
    push_appointment_filters(&mut count, auth.user_id, &filter);
    let total: i64 = count.build_query_scalar().fetch_one(&state.db).await?;

    let mut qb = QueryBuilder::new("SELECT * FROM appointments");
    push_appointment_filters(&mut qb, auth.user_id, &filter);
    qb.push(" ORDER BY starts_at ASC LIMIT ")
        .push_bind(page.limit())
        .push(" OFFSET ")
        .push_bind(page.offset());
    let items = qb
        .build_query_as::<AppointmentRow>()
        .fetch_all(&state.db)
        .await?;

    Ok(Json(Paginated::new(items, page, total)))
}

/// POST /api/v1/appointments
///
/// Host-created bookings skip the availability check but not the conflict check.
pub async fn handle_create_appointment(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<CreateAppointmentRequest>,
) -> Result<(StatusCode, Json<AppointmentRow>), AppError> {
    req.validate()?;
    let window = TimeWindow::new(req.starts_at, req.ends_at)?;

    if let Some(card_id) = req.card_id {
        let owner: Option<Uuid> =
            sqlx::query_scalar("SELECT owner_id FROM business_cards WHERE id = $1")
                .bind(card_id)
                .fetch_optional(&state.db)
                .await?;
        if owner != Some(auth.user_id) {
            return Err(AppError::Validation(format!(
                "card_id {card_id} does not belong to this account"
            )));
        }
    }

    let existing = blocking_in_window(&state.db, auth.user_id, &window).await?;
    ensure_no_conflict(&window, &existing, None)?;

    let appt = insert_appointment(
        &state.db,
        auth.user_id,
        req.card_id,
        &req,
        &window,
        AppointmentStatus::Confirmed,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(appt)))
}

/// GET /api/v1/appointments/:id
pub async fn handle_get_appointment(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<AppointmentRow>, AppError> {
    Ok(Json(fetch_owned_appointment(&state.db, &auth, id).await?))
}

/// PATCH /api/v1/appointments/:id
pub async fn handle_reschedule_appointment(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<RescheduleRequest>,
) -> Result<Json<AppointmentRow>, AppError> {
    req.validate()?;
    let appt = fetch_owned_appointment(&state.db, &auth, id).await?;
    let status: AppointmentStatus = appt.status.parse()?;

    let window = TimeWindow::new(
        req.starts_at.unwrap_or(appt.starts_at),
        req.ends_at.unwrap_or(appt.ends_at),
    )?;
    let moved = window.start != appt.starts_at || window.end != appt.ends_at;
    if moved {
        if !status.blocks_calendar() {
            return Err(AppError::Validation(format!(
                "A {} appointment cannot be rescheduled",
                status.as_str()
            )));
        }
        let existing = blocking_in_window(&state.db, appt.owner_id, &window).await?;
        ensure_no_conflict(&window, &existing, Some(appt.id))?;
    }

    let updated = sqlx::query_as::<_, AppointmentRow>(
        r#"
        UPDATE appointments
        SET starts_at = $2, ends_at = $3, notes = $4, updated_at = now()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(window.start)
    .bind(window.end)
    .bind(req.notes.or(appt.notes))
    .fetch_one(&state.db)
    .await?;

    if moved {
        info!("Rescheduled appointment {id} to {}", updated.starts_at);
    }
    Ok(Json(updated))
}

/// POST /api/v1/appointments/:id/status
pub async fn handle_change_status(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<StatusChangeRequest>,
) -> Result<Json<AppointmentRow>, AppError> {
    let appt = fetch_owned_appointment(&state.db, &auth, id).await?;
    let current: AppointmentStatus = appt.status.parse()?;
    if !current.can_transition_to(req.status) {
        return Err(AppError::Validation(format!(
            "Cannot move appointment from {} to {}",
            current.as_str(),
            req.status.as_str()
        )));
    }

    // Re-confirming a pending slot must not double-book if the host created an
    // overlapping appointment meanwhile.
    if req.status == AppointmentStatus::Confirmed {
        let window = TimeWindow {
            start: appt.starts_at,
            end: appt.ends_at,
        };
        let existing = blocking_in_window(&state.db, appt.owner_id, &window).await?;
        ensure_no_conflict(&window, &existing, Some(appt.id))?;
    }

    let updated = sqlx::query_as::<_, AppointmentRow>(
        "UPDATE appointments SET status = $2, updated_at = now() WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(req.status.as_str())
    .fetch_one(&state.db)
    .await?;

    info!(
        "Appointment {id}: {} -> {}",
        current.as_str(),
        req.status.as_str()
    );
    Ok(Json(updated))
}

/// DELETE /api/v1/appointments/:id
pub async fn handle_delete_appointment(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    fetch_owned_appointment(&state.db, &auth, id).await?;
    sqlx::query("DELETE FROM appointments WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await?;
    info!("Deleted appointment {id}");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/availability
pub async fn handle_get_availability(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<AvailabilityRule>>, AppError> {
    Ok(Json(load_rules(&state.db, auth.user_id).await?))
}

/// PUT /api/v1/availability
///
/// Replaces the whole weekly schedule atomically.
pub async fn handle_replace_availability(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<ReplaceAvailabilityRequest>,
) -> Result<Json<Vec<AvailabilityRule>>, AppError> {
    validate_rules(&req.rules)?;

    let mut tx = state.db.begin().await?;
    sqlx::query("DELETE FROM availability_rules WHERE owner_id = $1")
        .bind(auth.user_id)
        .execute(&mut *tx)
        .await?;
    for rule in &req.rules {
        sqlx::query(
            "INSERT INTO availability_rules (owner_id, weekday, start_time, end_time) VALUES ($1, $2, $3, $4)",
        )
        .bind(auth.user_id)
        .bind(rule.weekday)
        .bind(rule.start_time)
        .bind(rule.end_time)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    info!(
        "Replaced availability for {} ({} rules)",
        auth.user_id,
        req.rules.len()
    );
    Ok(Json(load_rules(&state.db, auth.user_id).await?))
}

fn slot_duration(requested: Option<i64>) -> Result<i64, AppError> {
    let minutes = requested.unwrap_or(30);
    if !(MIN_DURATION_MINUTES..=MAX_DURATION_MINUTES).contains(&minutes) {
        return Err(AppError::Validation(format!(
            "duration must be between {MIN_DURATION_MINUTES} and {MAX_DURATION_MINUTES} minutes"
        )));
    }
    Ok(minutes)
}

/// Public card whose owner's plan includes booking.
async fn fetch_bookable_card(pool: &PgPool, slug: &str) -> Result<BusinessCardRow, AppError> {
    let card = fetch_public_card(pool, slug).await?;
    let plan = load_plan(pool, card.owner_id).await?;
    if !plan.limits().booking_enabled {
        return Err(AppError::NotFound(format!(
            "Card '{slug}' does not accept bookings"
        )));
    }
    Ok(card)
}

/// GET /api/v1/public/cards/:slug/slots
pub async fn handle_public_slots(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(query): Query<SlotQuery>,
) -> Result<Json<SlotsResponse>, AppError> {
    let duration = slot_duration(query.duration)?;
    let card = fetch_bookable_card(&state.db, &slug).await?;
    let rules = load_rules(&state.db, card.owner_id).await?;

    let midnight = Utc.from_utc_datetime(&query.date.and_time(NaiveTime::MIN));
    let day = TimeWindow {
        start: midnight,
        end: midnight + Duration::days(1),
    };
    let booked = blocking_in_window(&state.db, card.owner_id, &day).await?;
    let slots = open_slots(query.date, &rules, duration, &booked, Utc::now());

    Ok(Json(SlotsResponse {
        date: query.date,
        duration_minutes: duration,
        slots,
    }))
}

/// POST /api/v1/public/cards/:slug/appointments
pub async fn handle_public_book(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Json(req): Json<CreateAppointmentRequest>,
) -> Result<(StatusCode, Json<AppointmentRow>), AppError> {
    req.validate()?;
    let window = TimeWindow::new(req.starts_at, req.ends_at)?;
    if window.start < Utc::now() {
        return Err(AppError::Validation(
            "Cannot book a time in the past".to_string(),
        ));
    }

    let card = fetch_bookable_card(&state.db, &slug).await?;

    let rules = load_rules(&state.db, card.owner_id).await?;
    if !within_availability(&window, &rules) {
        return Err(AppError::Validation(
            "Requested time is outside the host's availability".to_string(),
        ));
    }

    let existing = blocking_in_window(&state.db, card.owner_id, &window).await?;
    ensure_no_conflict(&window, &existing, None)?;

    let appt = insert_appointment(
        &state.db,
        card.owner_id,
        Some(card.id),
        &req,
        &window,
        AppointmentStatus::Pending,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(appt)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_duration_bounds() {
        assert_eq!(slot_duration(None).unwrap(), 30);
        assert_eq!(slot_duration(Some(5)).unwrap(), 5);
        assert_eq!(slot_duration(Some(480)).unwrap(), 480);
        assert!(slot_duration(Some(4)).is_err());
        assert!(slot_duration(Some(481)).is_err());
    }

    #[test]
    fn test_filter_sql() {
        let filter = AppointmentFilter {
            status: Some(AppointmentStatus::Pending),
            from: Some(Utc::now()),
            to: None,
        };
        let mut qb = QueryBuilder::new("SELECT * FROM appointments");
        push_appointment_filters(&mut qb, Uuid::nil(), &filter);
        assert_eq!(
            qb.sql(),
            "SELECT * FROM appointments WHERE owner_id = $1 AND status = $2 AND starts_at >= $3"
        );
    }

    #[test]
    fn test_create_request_rejects_bad_email() {
        let req: CreateAppointmentRequest = serde_json::from_value(serde_json::json!({
            "guest_name": "Sam",
            "guest_email": "sam",
            "starts_at": "2026-05-01T10:00:00Z",
            "ends_at": "2026-05-01T10:30:00Z"
        }))
        .unwrap();
        assert!(req.validate().is_err());
    }
}
