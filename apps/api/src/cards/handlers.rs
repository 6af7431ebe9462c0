use axum::{extract::State, http::StatusCode};
use serde::Deserialize;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;
use validator::{Validate, ValidateEmail, ValidateUrl};

use crate::auth::AuthUser;
use crate::cards::slug::{is_reserved, slugify, validate_slug, with_suffix};
use crate::errors::AppError;
use crate::extract::{Json, Path, Query};
use crate::leads::handlers::LeadDetail;
use crate::leads::models::LeadSource;
use crate::leads::scoring::input_from_row;
use crate::leads::store::{count_leads, insert_lead, non_blank, CreateLeadRequest};
use crate::models::card::{BusinessCardRow, PublicCard};
use crate::pagination::{PageParams, Paginated};
use crate::plans::check_limit;
use crate::state::AppState;
use crate::users::lock_plan;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCardRequest {
    pub slug: Option<String>,
    #[validate(length(min = 1, max = 120))]
    pub full_name: String,
    #[validate(length(max = 120))]
    pub title: Option<String>,
    #[validate(length(max = 120))]
    pub company: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(max = 40))]
    pub phone: Option<String>,
    #[validate(url)]
    pub website: Option<String>,
    #[validate(length(max = 2000))]
    pub bio: Option<String>,
    #[validate(length(min = 1, max = 32))]
    pub theme: Option<String>,
    pub is_public: Option<bool>,
}

/// Partial update. `Some("")` clears an optional text field.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateCardRequest {
    pub slug: Option<String>,
    #[validate(length(min = 1, max = 120))]
    pub full_name: Option<String>,
    #[validate(length(max = 120))]
    pub title: Option<String>,
    #[validate(length(max = 120))]
    pub company: Option<String>,
    #[validate(length(max = 254))]
    pub email: Option<String>,
    #[validate(length(max = 40))]
    pub phone: Option<String>,
    #[validate(length(max = 2048))]
    pub website: Option<String>,
    #[validate(length(max = 2000))]
    pub bio: Option<String>,
    #[validate(length(min = 1, max = 32))]
    pub theme: Option<String>,
    pub is_public: Option<bool>,
}

fn patch_text(update: Option<String>, current: Option<String>) -> Option<String> {
    match update {
        Some(value) => non_blank(Some(value)),
        None => current,
    }
}

/// Folds a partial update into a card row. The slug is checked by the caller.
pub fn apply_card_update(card: &mut BusinessCardRow, req: UpdateCardRequest) -> Result<(), AppError> {
    if let Some(email) = req.email.as_deref().map(str::trim).filter(|e| !e.is_empty()) {
        if !email.validate_email() {
            return Err(AppError::Validation(format!("'{email}' is not a valid email")));
        }
    }
    if let Some(website) = req.website.as_deref().map(str::trim).filter(|w| !w.is_empty()) {
        if !website.validate_url() {
            return Err(AppError::Validation(format!("'{website}' is not a valid URL")));
        }
    }
    if let Some(name) = req.full_name {
        if name.trim().is_empty() {
            return Err(AppError::Validation("full_name cannot be blank".to_string()));
        }
        card.full_name = name.trim().to_string();
    }
    if let Some(slug) = req.slug {
        card.slug = slug;
    }
    card.title = patch_text(req.title, card.title.take());
    card.company = patch_text(req.company, card.company.take());
    card.email = patch_text(req.email, card.email.take());
    card.phone = patch_text(req.phone, card.phone.take());
    card.website = patch_text(req.website, card.website.take());
    card.bio = patch_text(req.bio, card.bio.take());
    if let Some(theme) = req.theme {
        card.theme = theme;
    }
    if let Some(is_public) = req.is_public {
        card.is_public = is_public;
    }
    Ok(())
}

pub async fn slug_taken(pool: &PgPool, slug: &str) -> Result<bool, AppError> {
    Ok(
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM business_cards WHERE slug = $1)")
            .bind(slug)
            .fetch_one(pool)
            .await?,
    )
}

/// Picks the slug for a new card. An explicit slug must be valid and free;
/// a generated one gets a random suffix on collision.
async fn resolve_slug(
    pool: &PgPool,
    requested: Option<&str>,
    full_name: &str,
) -> Result<String, AppError> {
    if let Some(slug) = requested {
        validate_slug(slug)?;
        if slug_taken(pool, slug).await? {
            return Err(AppError::Conflict(format!("Slug '{slug}' is already taken")));
        }
        return Ok(slug.to_string());
    }

    let base = slugify(full_name);
    if !is_reserved(&base) && !slug_taken(pool, &base).await? {
        return Ok(base);
    }
    Ok(with_suffix(&base))
}

pub async fn fetch_owned_card(
    pool: &PgPool,
    auth: &AuthUser,
    card_id: Uuid,
) -> Result<BusinessCardRow, AppError> {
    let card = sqlx::query_as::<_, BusinessCardRow>("SELECT * FROM business_cards WHERE id = $1")
        .bind(card_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Card {card_id} not found")))?;
    auth.ensure_owner(card.owner_id)?;
    Ok(card)
}

/// Public, published card by slug. Private cards are indistinguishable from missing ones.
pub async fn fetch_public_card(pool: &PgPool, slug: &str) -> Result<BusinessCardRow, AppError> {
    sqlx::query_as::<_, BusinessCardRow>(
        "SELECT * FROM business_cards WHERE slug = $1 AND is_public = TRUE",
    )
    .bind(slug)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Card '{slug}' not found")))
}

/// GET /api/v1/cards
pub async fn handle_list_cards(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(page): Query<PageParams>,
) -> Result<Json<Paginated<BusinessCardRow>>, AppError> {
    let page = state.page(&page);
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM business_cards WHERE owner_id = $1")
        .bind(auth.user_id)
        .fetch_one(&state.db)
        .await?;
    let items = sqlx::query_as::<_, BusinessCardRow>(
        r#"
        SELECT * FROM business_cards
        WHERE owner_id = $1
        ORDER BY created_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(auth.user_id)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(&state.db)
    .await?;
    Ok(Json(Paginated::new(items, page, total)))
}

/// POST /api/v1/cards
pub async fn handle_create_card(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<CreateCardRequest>,
) -> Result<(StatusCode, Json<BusinessCardRow>), AppError> {
    req.validate()?;
    if let Some(slug) = req.slug.as_deref() {
        validate_slug(slug)?;
    }

    let mut tx = state.db.begin().await?;
    let plan = lock_plan(&mut tx, auth.user_id).await?;
    let current: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM business_cards WHERE owner_id = $1")
        .bind(auth.user_id)
        .fetch_one(&mut *tx)
        .await?;
    check_limit("cards", current, plan.limits().max_cards)?;

    let slug = resolve_slug(&state.db, req.slug.as_deref(), &req.full_name).await?;

    let card = sqlx::query_as::<_, BusinessCardRow>(
        r#"
        INSERT INTO business_cards
            (owner_id, slug, full_name, title, company, email, phone, website, bio, theme, is_public)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING *
        "#,
    )
    .bind(auth.user_id)
    .bind(&slug)
    .bind(req.full_name.trim())
    .bind(&req.title)
    .bind(&req.company)
    .bind(&req.email)
    .bind(&req.phone)
    .bind(&req.website)
    .bind(&req.bio)
    .bind(req.theme.as_deref().unwrap_or("classic"))
    .bind(req.is_public.unwrap_or(true))
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;

    info!("Created card {} ({slug}) for {}", card.id, auth.user_id);
    Ok((StatusCode::CREATED, Json(card)))
}

/// GET /api/v1/cards/:id
pub async fn handle_get_card(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<BusinessCardRow>, AppError> {
    Ok(Json(fetch_owned_card(&state.db, &auth, id).await?))
}

/// PATCH /api/v1/cards/:id
pub async fn handle_update_card(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateCardRequest>,
) -> Result<Json<BusinessCardRow>, AppError> {
    req.validate()?;
    if let Some(slug) = req.slug.as_deref() {
        validate_slug(slug)?;
    }
    let mut card = fetch_owned_card(&state.db, &auth, id).await?;

    if let Some(slug) = req.slug.as_deref() {
        if slug != card.slug && slug_taken(&state.db, slug).await? {
            return Err(AppError::Conflict(format!("Slug '{slug}' is already taken")));
        }
    }
    apply_card_update(&mut card, req)?;

    let card = sqlx::query_as::<_, BusinessCardRow>(
        r#"
        UPDATE business_cards SET
            slug = $2, full_name = $3, title = $4, company = $5, email = $6, phone = $7,
            website = $8, bio = $9, theme = $10, is_public = $11, updated_at = now()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(&card.slug)
    .bind(&card.full_name)
    .bind(&card.title)
    .bind(&card.company)
    .bind(&card.email)
    .bind(&card.phone)
    .bind(&card.website)
    .bind(&card.bio)
    .bind(&card.theme)
    .bind(card.is_public)
    .fetch_one(&state.db)
    .await?;

    info!("Updated card {id}");
    Ok(Json(card))
}

/// DELETE /api/v1/cards/:id
pub async fn handle_delete_card(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    fetch_owned_card(&state.db, &auth, id).await?;
    sqlx::query("DELETE FROM business_cards WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await?;
    info!("Deleted card {id}");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/public/cards/:slug
///
/// Counts a view on every successful fetch.
pub async fn handle_public_card(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<PublicCard>, AppError> {
    let card = sqlx::query_as::<_, BusinessCardRow>(
        r#"
        UPDATE business_cards SET view_count = view_count + 1
        WHERE slug = $1 AND is_public = TRUE
        RETURNING *
        "#,
    )
    .bind(&slug)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Card '{slug}' not found")))?;
    Ok(Json(PublicCard::from(card)))
}

/// POST /api/v1/public/cards/:slug/leads
///
/// Contact form on a public card; the lead lands in the card owner's CRM.
pub async fn handle_public_contact(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Json(mut req): Json<CreateLeadRequest>,
) -> Result<(StatusCode, Json<LeadDetail>), AppError> {
    req.validate()?;
    let card = fetch_public_card(&state.db, &slug).await?;

    // Visitors cannot choose how their lead is classified.
    req.card_id = Some(card.id);
    req.source = Some(LeadSource::CardForm);
    req.status = None;
    req.priority = None;

    let mut tx = state.db.begin().await?;
    let plan = lock_plan(&mut tx, card.owner_id).await?;
    let current = count_leads(&mut tx, card.owner_id).await?;
    check_limit("leads", current, plan.limits().max_leads)?;

    let lead = insert_lead(
        &mut tx,
        state.lead_scorer.as_ref(),
        card.owner_id,
        &req,
        LeadSource::CardForm,
    )
    .await?;
    tx.commit().await?;
    let score = state
        .lead_scorer
        .score(&input_from_row(&lead), chrono::Utc::now());
    Ok((StatusCode::CREATED, Json(LeadDetail { lead, score })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card() -> BusinessCardRow {
        let now = chrono::Utc::now();
        BusinessCardRow {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            slug: "ada-lovelace".into(),
            full_name: "Ada Lovelace".into(),
            title: Some("Analyst".into()),
            company: Some("Engines Ltd".into()),
            email: Some("ada@example.com".into()),
            phone: Some("+44 20 0000".into()),
            website: Some("https://ada.example.com".into()),
            bio: Some("First programmer".into()),
            theme: "classic".into(),
            is_public: true,
            view_count: 3,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_empty_strings_clear_optional_fields() {
        let mut c = card();
        let req = UpdateCardRequest {
            title: Some("".into()),
            company: Some("  ".into()),
            email: Some("".into()),
            website: Some("".into()),
            bio: Some("".into()),
            ..Default::default()
        };
        assert!(req.validate().is_ok());
        apply_card_update(&mut c, req).unwrap();
        assert_eq!(c.title, None);
        assert_eq!(c.company, None);
        assert_eq!(c.email, None);
        assert_eq!(c.website, None);
        assert_eq!(c.bio, None);
        assert_eq!(c.phone.as_deref(), Some("+44 20 0000"));
    }

    #[test]
    fn test_absent_fields_are_kept() {
        let mut c = card();
        let req = UpdateCardRequest {
            title: Some(" Countess ".into()),
            ..Default::default()
        };
        apply_card_update(&mut c, req).unwrap();
        assert_eq!(c.title.as_deref(), Some("Countess"));
        assert_eq!(c.email.as_deref(), Some("ada@example.com"));
        assert_eq!(c.full_name, "Ada Lovelace");
    }

    #[test]
    fn test_bad_email_and_url_rejected() {
        let mut c = card();
        let bad_email = UpdateCardRequest {
            email: Some("not-an-email".into()),
            ..Default::default()
        };
        assert!(apply_card_update(&mut c, bad_email).is_err());

        let bad_url = UpdateCardRequest {
            website: Some("not a url".into()),
            ..Default::default()
        };
        assert!(apply_card_update(&mut c, bad_url).is_err());
    }

    #[test]
    fn test_blank_full_name_rejected() {
        let mut c = card();
        let req = UpdateCardRequest {
            full_name: Some("   ".into()),
            ..Default::default()
        };
        assert!(apply_card_update(&mut c, req).is_err());
        assert_eq!(c.full_name, "Ada Lovelace");
    }
}
