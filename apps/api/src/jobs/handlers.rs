use std::collections::HashSet;

use axum::{extract::State, http::StatusCode};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::extract::{Json, Path, Query};
use crate::jobs::completeness::{compute_profile_completeness, ProfileCompleteness};
use crate::models::job_profile::{EducationRow, ExperienceRow, JobProfileRow, SkillRow};
use crate::pagination::{PageParams, Paginated};
use crate::segments::criteria::like_pattern;
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Validate)]
pub struct UpsertProfileRequest {
    #[validate(length(max = 160))]
    pub headline: Option<String>,
    #[validate(length(max = 5000))]
    pub summary: Option<String>,
    #[validate(length(max = 120))]
    pub location: Option<String>,
    #[serde(default)]
    pub open_to_work: bool,
    #[serde(default)]
    #[validate(length(max = 10))]
    pub desired_roles: Vec<String>,
    #[validate(range(min = 0, max = 70))]
    pub years_experience: Option<i32>,
    #[serde(default)]
    pub is_public: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateExperienceRequest {
    #[validate(length(min = 1, max = 160))]
    pub company: String,
    #[validate(length(min = 1, max = 160))]
    pub title: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateEducationRequest {
    #[validate(length(min = 1, max = 160))]
    pub institution: String,
    #[validate(length(min = 1, max = 160))]
    pub degree: String,
    #[validate(length(max = 160))]
    pub field: Option<String>,
    #[validate(range(min = 1900, max = 2100))]
    pub start_year: i32,
    #[validate(range(min = 1900, max = 2100))]
    pub end_year: Option<i32>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateSkillRequest {
    #[validate(length(min = 1, max = 60))]
    pub name: String,
    #[validate(range(min = 1, max = 5))]
    pub level: i16,
}

#[derive(Debug, Default, Deserialize)]
pub struct TalentFilter {
    pub skill: Option<String>,
    pub location: Option<String>,
    pub open_to_work: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct ProfileDetail {
    pub profile: JobProfileRow,
    pub experiences: Vec<ExperienceRow>,
    pub educations: Vec<EducationRow>,
    pub skills: Vec<SkillRow>,
    pub completeness: ProfileCompleteness,
}

// ────────────────────────────────────────────────────────────────────────────
// Helpers
// ────────────────────────────────────────────────────────────────────────────

pub fn check_experience_dates(req: &CreateExperienceRequest) -> Result<(), AppError> {
    match req.end_date {
        Some(end) if end < req.start_date => Err(AppError::Validation(
            "end_date cannot be before start_date".to_string(),
        )),
        _ => Ok(()),
    }
}

pub fn check_education_years(req: &CreateEducationRequest) -> Result<(), AppError> {
    match req.end_year {
        Some(end) if end < req.start_year => Err(AppError::Validation(
            "end_year cannot be before start_year".to_string(),
        )),
        _ => Ok(()),
    }
}

/// Trimmed, blanks dropped, case-insensitive duplicates removed keeping the
/// first spelling and the submitted order.
fn clean_roles(roles: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    roles
        .iter()
        .map(|r| r.trim())
        .filter(|r| !r.is_empty() && seen.insert(r.to_lowercase()))
        .map(str::to_string)
        .collect()
}

async fn profile_for_user(pool: &PgPool, user_id: Uuid) -> Result<JobProfileRow, AppError> {
    sqlx::query_as::<_, JobProfileRow>("SELECT * FROM job_profiles WHERE user_id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Create a job profile first".to_string()))
}

async fn list_experiences(pool: &PgPool, profile_id: Uuid) -> Result<Vec<ExperienceRow>, AppError> {
    Ok(sqlx::query_as::<_, ExperienceRow>(
        "SELECT * FROM job_experiences WHERE profile_id = $1 ORDER BY start_date DESC",
    )
    .bind(profile_id)
    .fetch_all(pool)
    .await?)
}

async fn list_educations(pool: &PgPool, profile_id: Uuid) -> Result<Vec<EducationRow>, AppError> {
    Ok(sqlx::query_as::<_, EducationRow>(
        "SELECT * FROM job_educations WHERE profile_id = $1 ORDER BY start_year DESC",
    )
    .bind(profile_id)
    .fetch_all(pool)
    .await?)
}

async fn list_skills(pool: &PgPool, profile_id: Uuid) -> Result<Vec<SkillRow>, AppError> {
    Ok(sqlx::query_as::<_, SkillRow>(
        "SELECT * FROM job_skills WHERE profile_id = $1 ORDER BY level DESC, name",
    )
    .bind(profile_id)
    .fetch_all(pool)
    .await?)
}

async fn load_detail(pool: &PgPool, profile: JobProfileRow) -> Result<ProfileDetail, AppError> {
    let experiences = list_experiences(pool, profile.id).await?;
    let educations = list_educations(pool, profile.id).await?;
    let skills = list_skills(pool, profile.id).await?;

    let completeness =
        compute_profile_completeness(&profile, experiences.len(), educations.len(), skills.len());
    Ok(ProfileDetail {
        profile,
        experiences,
        educations,
        skills,
        completeness,
    })
}

/// Deletes a profile sub-resource after checking it hangs off the caller's profile.
async fn delete_profile_child(
    pool: &PgPool,
    auth: &AuthUser,
    table: &'static str,
    id: Uuid,
) -> Result<StatusCode, AppError> {
    let owner_sql = format!(
        "SELECT p.user_id FROM {table} t JOIN job_profiles p ON p.id = t.profile_id WHERE t.id = $1"
    );
    let owner: Uuid = sqlx::query_scalar(&owner_sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("{id} not found")))?;
    auth.ensure_owner(owner)?;

    let delete_sql = format!("DELETE FROM {table} WHERE id = $1");
    sqlx::query(&delete_sql).bind(id).execute(pool).await?;
    info!("Deleted {table} row {id}");
    Ok(StatusCode::NO_CONTENT)
}

fn push_talent_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &TalentFilter) {
    qb.push(" WHERE p.is_public = TRUE");
    if let Some(skill) = filter.skill.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        qb.push(
            " AND EXISTS (SELECT 1 FROM job_skills s WHERE s.profile_id = p.id AND lower(s.name) = lower(",
        )
        .push_bind(skill.to_string())
        .push("))");
    }
    if let Some(location) = filter
        .location
        .as_deref()
        .filter(|l| !l.trim().is_empty())
    {
        qb.push(" AND p.location ILIKE ")
            .push_bind(like_pattern(location));
    }
    if let Some(open) = filter.open_to_work {
        qb.push(" AND p.open_to_work = ").push_bind(open);
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// GET /api/v1/job-profile
pub async fn handle_get_profile(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<ProfileDetail>, AppError> {
    let profile = profile_for_user(&state.db, auth.user_id).await?;
    Ok(Json(load_detail(&state.db, profile).await?))
}

/// PUT /api/v1/job-profile
pub async fn handle_upsert_profile(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<UpsertProfileRequest>,
) -> Result<Json<ProfileDetail>, AppError> {
    req.validate()?;

    let profile = sqlx::query_as::<_, JobProfileRow>(
        r#"
        INSERT INTO job_profiles
            (user_id, headline, summary, location, open_to_work, desired_roles, years_experience, is_public)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (user_id) DO UPDATE SET
            headline = EXCLUDED.headline,
            summary = EXCLUDED.summary,
            location = EXCLUDED.location,
            open_to_work = EXCLUDED.open_to_work,
            desired_roles = EXCLUDED.desired_roles,
            years_experience = EXCLUDED.years_experience,
            is_public = EXCLUDED.is_public,
            updated_at = now()
        RETURNING *
        "#,
    )
    .bind(auth.user_id)
    .bind(&req.headline)
    .bind(&req.summary)
    .bind(&req.location)
    .bind(req.open_to_work)
    .bind(clean_roles(&req.desired_roles))
    .bind(req.years_experience)
    .bind(req.is_public)
    .fetch_one(&state.db)
    .await?;

    info!("Saved job profile {} for {}", profile.id, auth.user_id);
    Ok(Json(load_detail(&state.db, profile).await?))
}

/// GET /api/v1/job-profile/experiences
pub async fn handle_list_experiences(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<ExperienceRow>>, AppError> {
    let profile = profile_for_user(&state.db, auth.user_id).await?;
    Ok(Json(list_experiences(&state.db, profile.id).await?))
}

/// POST /api/v1/job-profile/experiences
pub async fn handle_create_experience(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<CreateExperienceRequest>,
) -> Result<(StatusCode, Json<ExperienceRow>), AppError> {
    req.validate()?;
    check_experience_dates(&req)?;
    let profile = profile_for_user(&state.db, auth.user_id).await?;

    let row = sqlx::query_as::<_, ExperienceRow>(
        r#"
        INSERT INTO job_experiences (profile_id, company, title, start_date, end_date, description)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(profile.id)
    .bind(req.company.trim())
    .bind(req.title.trim())
    .bind(req.start_date)
    .bind(req.end_date)
    .bind(&req.description)
    .fetch_one(&state.db)
    .await?;
    Ok((StatusCode::CREATED, Json(row)))
}

/// DELETE /api/v1/job-profile/experiences/:id
pub async fn handle_delete_experience(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    delete_profile_child(&state.db, &auth, "job_experiences", id).await
}

/// GET /api/v1/job-profile/educations
pub async fn handle_list_educations(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<EducationRow>>, AppError> {
    let profile = profile_for_user(&state.db, auth.user_id).await?;
    Ok(Json(list_educations(&state.db, profile.id).await?))
}

/// POST /api/v1/job-profile/educations
pub async fn handle_create_education(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<CreateEducationRequest>,
) -> Result<(StatusCode, Json<EducationRow>), AppError> {
    req.validate()?;
    check_education_years(&req)?;
    let profile = profile_for_user(&state.db, auth.user_id).await?;

    let row = sqlx::query_as::<_, EducationRow>(
        r#"
        INSERT INTO job_educations (profile_id, institution, degree, field, start_year, end_year)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(profile.id)
    .bind(req.institution.trim())
    .bind(req.degree.trim())
    .bind(&req.field)
    .bind(req.start_year)
    .bind(req.end_year)
    .fetch_one(&state.db)
    .await?;
    Ok((StatusCode::CREATED, Json(row)))
}

/// DELETE /api/v1/job-profile/educations/:id
pub async fn handle_delete_education(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    delete_profile_child(&state.db, &auth, "job_educations", id).await
}

/// GET /api/v1/job-profile/skills
pub async fn handle_list_skills(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<SkillRow>>, AppError> {
    let profile = profile_for_user(&state.db, auth.user_id).await?;
    Ok(Json(list_skills(&state.db, profile.id).await?))
}

/// POST /api/v1/job-profile/skills
///
/// Skill names are unique per profile, case-insensitively; a duplicate is a 409.
pub async fn handle_create_skill(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<CreateSkillRequest>,
) -> Result<(StatusCode, Json<SkillRow>), AppError> {
    req.validate()?;
    let name = req.name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("name cannot be blank".to_string()));
    }
    let profile = profile_for_user(&state.db, auth.user_id).await?;

    let row = sqlx::query_as::<_, SkillRow>(
        "INSERT INTO job_skills (profile_id, name, level) VALUES ($1, $2, $3) RETURNING *",
    )
    .bind(profile.id)
    .bind(name)
    .bind(req.level)
    .fetch_one(&state.db)
    .await?;
    Ok((StatusCode::CREATED, Json(row)))
}

/// DELETE /api/v1/job-profile/skills/:id
pub async fn handle_delete_skill(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    delete_profile_child(&state.db, &auth, "job_skills", id).await
}

/// GET /api/v1/talent
pub async fn handle_search_talent(
    State(state): State<AppState>,
    _auth: AuthUser,
    Query(page): Query<PageParams>,
    Query(filter): Query<TalentFilter>,
) -> Result<Json<Paginated<JobProfileRow>>, AppError> {
    let page = state.page(&page);

    let mut count = QueryBuilder::new("SELECT COUNT(*) FROM job_profiles p");
    push_talent_filters(&mut count, &filter);
    let total: i64 = count.build_query_scalar().fetch_one(&state.db).await?;

    let mut qb = QueryBuilder::new("SELECT p.* FROM job_profiles p");
    push_talent_filters(&mut qb, &filter);
    qb.push(" ORDER BY p.updated_at DESC LIMIT ")
        .push_bind(page.limit())
        .push(" OFFSET ")
        .push_bind(page.offset());
    let items = qb
        .build_query_as::<JobProfileRow>()
        .fetch_all(&state.db)
        .await?;

    Ok(Json(Paginated::new(items, page, total)))
}

/// GET /api/v1/talent/:profile_id
pub async fn handle_get_talent(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(profile_id): Path<Uuid>,
) -> Result<Json<ProfileDetail>, AppError> {
    let profile = sqlx::query_as::<_, JobProfileRow>(
        "SELECT * FROM job_profiles WHERE id = $1 AND is_public = TRUE",
    )
    .bind(profile_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Profile {profile_id} not found")))?;
    Ok(Json(load_detail(&state.db, profile).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn experience(start: NaiveDate, end: Option<NaiveDate>) -> CreateExperienceRequest {
        CreateExperienceRequest {
            company: "Acme".into(),
            title: "Engineer".into(),
            start_date: start,
            end_date: end,
            description: None,
        }
    }

    #[test]
    fn test_experience_dates() {
        assert!(check_experience_dates(&experience(date(2020, 1, 1), None)).is_ok());
        assert!(
            check_experience_dates(&experience(date(2020, 1, 1), Some(date(2020, 1, 1)))).is_ok()
        );
        assert!(
            check_experience_dates(&experience(date(2020, 1, 1), Some(date(2019, 12, 31))))
                .is_err()
        );
    }

    #[test]
    fn test_education_years() {
        let mut req = CreateEducationRequest {
            institution: "MIT".into(),
            degree: "BSc".into(),
            field: None,
            start_year: 2015,
            end_year: Some(2019),
        };
        assert!(check_education_years(&req).is_ok());
        req.end_year = Some(2014);
        assert!(check_education_years(&req).is_err());
    }

    #[test]
    fn test_skill_level_bounds() {
        let ok = CreateSkillRequest {
            name: "Rust".into(),
            level: 5,
        };
        assert!(ok.validate().is_ok());
        let bad = CreateSkillRequest {
            name: "Rust".into(),
            level: 6,
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_clean_roles() {
        let roles = vec![" Staff Engineer ".into(), "staff engineer".into(), "".into()];
        assert_eq!(clean_roles(&roles), vec!["Staff Engineer"]);
    }

    #[test]
    fn test_clean_roles_drops_non_adjacent_duplicates() {
        let roles = vec!["Architect".into(), "Backend".into(), "ARCHITECT".into()];
        assert_eq!(clean_roles(&roles), vec!["Architect", "Backend"]);
    }

    #[test]
    fn test_talent_filter_sql() {
        let filter = TalentFilter {
            skill: Some("Rust".into()),
            location: Some("Berlin".into()),
            open_to_work: Some(true),
        };
        let mut qb = QueryBuilder::new("SELECT p.* FROM job_profiles p");
        push_talent_filters(&mut qb, &filter);
        assert_eq!(
            qb.sql(),
            "SELECT p.* FROM job_profiles p WHERE p.is_public = TRUE \
             AND EXISTS (SELECT 1 FROM job_skills s WHERE s.profile_id = p.id AND lower(s.name) = lower($1)) \
             AND p.location ILIKE $2 AND p.open_to_work = $3"
        );
    }

    #[test]
    fn test_talent_filter_public_only_by_default() {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM job_profiles p");
        push_talent_filters(&mut qb, &TalentFilter::default());
        assert_eq!(
            qb.sql(),
            "SELECT COUNT(*) FROM job_profiles p WHERE p.is_public = TRUE"
        );
    }
}
