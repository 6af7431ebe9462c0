//! Bulk import. Rows are validated one at a time; a bad row is skipped and
//! reported, never fatal for the batch.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{Acquire, PgPool};
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::errors::AppError;
use crate::leads::models::LeadSource;
use crate::leads::scoring::LeadScorer;
use crate::leads::store::{count_leads, insert_lead, CreateLeadRequest};
use crate::plans::remaining;
use crate::users::lock_plan;

pub const MAX_IMPORT_ROWS: usize = 1_000;

#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    pub rows: Vec<Value>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ImportRowError {
    /// Zero-based position in the submitted `rows` array.
    pub row: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped: usize,
    pub lead_ids: Vec<Uuid>,
    pub errors: Vec<ImportRowError>,
}

/// Splits raw rows into insertable requests and per-row rejections.
/// `headroom` is how many more leads the plan allows (`None` = unlimited); rows past it are rejected.
pub fn prepare_rows(
    rows: Vec<Value>,
    headroom: Option<i64>,
) -> (Vec<(usize, CreateLeadRequest)>, Vec<ImportRowError>) {
    let mut accepted = Vec::new();
    let mut errors = Vec::new();

    for (idx, raw) in rows.into_iter().enumerate() {
        let req: CreateLeadRequest = match serde_json::from_value(raw) {
            Ok(r) => r,
            Err(e) => {
                errors.push(ImportRowError {
                    row: idx,
                    reason: format!("Malformed row: {e}"),
                });
                continue;
            }
        };
        if let Err(e) = req.validate() {
            errors.push(ImportRowError {
                row: idx,
                reason: e.to_string(),
            });
            continue;
        }
        if let Some(left) = headroom {
            if accepted.len() as i64 >= left {
                errors.push(ImportRowError {
                    row: idx,
                    reason: "Plan lead limit reached".to_string(),
                });
                continue;
            }
        }
        accepted.push((idx, req));
    }

    (accepted, errors)
}

/// Imports under the owner's row lock so concurrent imports cannot overrun the
/// plan limit. Each row is inserted in its own savepoint; a failed row is
/// rolled back and reported while the rest of the batch commits.
pub async fn run_import(
    pool: &PgPool,
    scorer: &dyn LeadScorer,
    owner_id: Uuid,
    rows: Vec<Value>,
) -> Result<ImportSummary, AppError> {
    let total = rows.len();
    let mut tx = pool.begin().await?;
    let plan = lock_plan(&mut tx, owner_id).await?;
    let current = count_leads(&mut tx, owner_id).await?;
    let headroom = remaining(current, plan.limits().max_leads);

    let (accepted, mut errors) = prepare_rows(rows, headroom);
    for e in &errors {
        warn!("Lead import for {owner_id}: skipping row {}: {}", e.row, e.reason);
    }

    let mut lead_ids = Vec::with_capacity(accepted.len());
    for (idx, req) in accepted {
        let mut savepoint = tx.begin().await?;
        match insert_lead(&mut savepoint, scorer, owner_id, &req, LeadSource::Import).await {
            Ok(lead) => {
                savepoint.commit().await?;
                lead_ids.push(lead.id);
            }
            Err(e) => {
                savepoint.rollback().await?;
                warn!("Lead import for {owner_id}: row {idx} failed to insert: {e}");
                errors.push(ImportRowError {
                    row: idx,
                    reason: e.to_string(),
                });
            }
        }
    }
    tx.commit().await?;
    errors.sort_by_key(|e| e.row);

    info!(
        "Lead import for {owner_id}: {} of {total} rows imported",
        lead_ids.len()
    );
    Ok(ImportSummary {
        imported: lead_ids.len(),
        skipped: errors.len(),
        lead_ids,
        errors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bad_rows_are_skipped_not_fatal() {
        let rows = vec![
            json!({"first_name": "Ada", "email": "ada@example.com"}),
            json!({"first_name": "", "email": "x@example.com"}),
            json!({"email": "missing-first-name@example.com"}),
            json!({"first_name": "Bob", "email": "bob-at-example"}),
            json!({"first_name": "Cy"}),
        ];
        let (ok, errors) = prepare_rows(rows, None);
        assert_eq!(ok.iter().map(|(i, _)| *i).collect::<Vec<_>>(), vec![0, 4]);
        assert_eq!(errors.iter().map(|e| e.row).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert!(errors[1].reason.starts_with("Malformed row"));
    }

    #[test]
    fn test_plan_headroom_caps_rows() {
        let rows = (0..5).map(|i| json!({"first_name": format!("L{i}")})).collect();
        let (ok, errors) = prepare_rows(rows, Some(2));
        assert_eq!(ok.len(), 2);
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().all(|e| e.reason == "Plan lead limit reached"));
    }

    #[test]
    fn test_invalid_rows_do_not_consume_headroom() {
        let rows = vec![
            json!({"first_name": ""}),
            json!({"first_name": "A"}),
            json!({"first_name": "B"}),
        ];
        let (ok, errors) = prepare_rows(rows, Some(2));
        assert_eq!(ok.len(), 2);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].row, 0);
    }

    #[test]
    fn test_unknown_source_is_malformed() {
        let (ok, errors) = prepare_rows(vec![json!({"first_name": "A", "source": "fax"})], None);
        assert!(ok.is_empty());
        assert_eq!(errors.len(), 1);
    }
}
