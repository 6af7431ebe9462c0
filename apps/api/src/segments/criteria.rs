//! Segment criteria: a JSON object translated field by field into a `WHERE`
//! fragment over `leads`. Every clause is AND-combined and every value is bound.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use crate::errors::AppError;
use crate::leads::models::{LeadPriority, LeadSource, LeadStatus};
use crate::leads::store::normalize_tags;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SegmentCriteria {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub statuses: Vec<LeadStatus>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<LeadSource>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub priorities: Vec<LeadPriority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_score: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_score: Option<i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags_any: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_contains: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_after: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_before: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_email: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_phone: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
}

impl SegmentCriteria {
    /// Parses and validates a stored or submitted criteria blob.
    /// `null` is treated as "match every lead".
    pub fn from_json(value: &Value) -> Result<Self, AppError> {
        if value.is_null() {
            return Ok(Self::default());
        }
        let criteria: SegmentCriteria = serde_json::from_value(value.clone())
            .map_err(|e| AppError::Validation(format!("Invalid segment criteria: {e}")))?;
        criteria.validate()?;
        Ok(criteria)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if let (Some(min), Some(max)) = (self.min_score, self.max_score) {
            if min > max {
                return Err(AppError::Validation(format!(
                    "min_score ({min}) is greater than max_score ({max})"
                )));
            }
        }
        if let (Some(after), Some(before)) = (self.created_after, self.created_before) {
            if after > before {
                return Err(AppError::Validation(
                    "created_after is later than created_before".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Object(Default::default()))
    }

    /// Appends ` AND ...` clauses. Expects the builder to already hold a
    /// `WHERE` clause.
    pub fn push_filters(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        if !self.statuses.is_empty() {
            qb.push(" AND status = ANY(");
            qb.push_bind(self.statuses.iter().map(|s| s.as_str().to_string()).collect::<Vec<_>>());
            qb.push(")");
        }
        if !self.sources.is_empty() {
            qb.push(" AND source = ANY(");
            qb.push_bind(self.sources.iter().map(|s| s.as_str().to_string()).collect::<Vec<_>>());
            qb.push(")");
        }
        if !self.priorities.is_empty() {
            qb.push(" AND priority = ANY(");
            qb.push_bind(
                self.priorities
                    .iter()
                    .map(|p| p.as_str().to_string())
                    .collect::<Vec<_>>(),
            );
            qb.push(")");
        }
        if let Some(min) = self.min_score {
            qb.push(" AND score >= ").push_bind(min);
        }
        if let Some(max) = self.max_score {
            qb.push(" AND score <= ").push_bind(max);
        }
        let tags = normalize_tags(&self.tags_any);
        if !tags.is_empty() {
            qb.push(" AND tags && ").push_bind(tags);
        }
        if let Some(company) = self.company_contains.as_deref().filter(|c| !c.trim().is_empty()) {
            qb.push(" AND company ILIKE ").push_bind(like_pattern(company));
        }
        if let Some(after) = self.created_after {
            qb.push(" AND created_at >= ").push_bind(after);
        }
        if let Some(before) = self.created_before {
            qb.push(" AND created_at < ").push_bind(before);
        }
        match self.has_email {
            Some(true) => {
                qb.push(" AND email IS NOT NULL AND email <> ''");
            }
            Some(false) => {
                qb.push(" AND (email IS NULL OR email = '')");
            }
            None => {}
        }
        match self.has_phone {
            Some(true) => {
                qb.push(" AND phone IS NOT NULL AND phone <> ''");
            }
            Some(false) => {
                qb.push(" AND (phone IS NULL OR phone = '')");
            }
            None => {}
        }
        if let Some(term) = self.search.as_deref().filter(|t| !t.trim().is_empty()) {
            let pattern = like_pattern(term);
            qb.push(" AND ((first_name || ' ' || COALESCE(last_name, '')) ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR email ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR company ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
    }
}

/// Starts `<select> WHERE owner_id = $1` and applies the criteria.
pub fn lead_query(
    select: &str,
    owner_id: Uuid,
    criteria: &SegmentCriteria,
) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(select);
    qb.push(" WHERE owner_id = ").push_bind(owner_id);
    criteria.push_filters(&mut qb);
    qb
}

/// `%term%` with LIKE metacharacters escaped.
pub fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.trim().chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sql_for(criteria: &SegmentCriteria) -> String {
        lead_query("SELECT * FROM leads", Uuid::nil(), criteria)
            .sql()
            .to_string()
    }

    #[test]
    fn test_empty_criteria_scopes_to_owner_only() {
        assert_eq!(
            sql_for(&SegmentCriteria::default()),
            "SELECT * FROM leads WHERE owner_id = $1"
        );
    }

    #[test]
    fn test_null_matches_everything() {
        assert_eq!(
            SegmentCriteria::from_json(&Value::Null).unwrap(),
            SegmentCriteria::default()
        );
    }

    #[test]
    fn test_status_and_score_clauses() {
        let c = SegmentCriteria::from_json(&json!({
            "statuses": ["new", "qualified"],
            "min_score": 50
        }))
        .unwrap();
        assert_eq!(
            sql_for(&c),
            "SELECT * FROM leads WHERE owner_id = $1 AND status = ANY($2) AND score >= $3"
        );
    }

    #[test]
    fn test_search_binds_three_params() {
        let c = SegmentCriteria {
            search: Some("acme".into()),
            ..Default::default()
        };
        let sql = sql_for(&c);
        assert!(sql.contains("ILIKE $2"));
        assert!(sql.contains("email ILIKE $3"));
        assert!(sql.contains("company ILIKE $4"));
    }

    #[test]
    fn test_has_email_false_clause() {
        let c = SegmentCriteria {
            has_email: Some(false),
            ..Default::default()
        };
        assert!(sql_for(&c).ends_with("AND (email IS NULL OR email = '')"));
    }

    #[test]
    fn test_blank_search_is_ignored() {
        let c = SegmentCriteria {
            search: Some("   ".into()),
            company_contains: Some("".into()),
            ..Default::default()
        };
        assert_eq!(sql_for(&c), "SELECT * FROM leads WHERE owner_id = $1");
    }

    #[test]
    fn test_blank_tags_are_ignored() {
        let c = SegmentCriteria::from_json(&json!({"tags_any": ["  ", ""]})).unwrap();
        assert_eq!(sql_for(&c), "SELECT * FROM leads WHERE owner_id = $1");

        let mixed = SegmentCriteria::from_json(&json!({"tags_any": [" ", "VIP"]})).unwrap();
        assert_eq!(
            sql_for(&mixed),
            "SELECT * FROM leads WHERE owner_id = $1 AND tags && $2"
        );
    }

    #[test]
    fn test_all_clauses_in_order() {
        let c = SegmentCriteria::from_json(&json!({
            "statuses": ["won"],
            "sources": ["referral"],
            "priorities": ["high"],
            "min_score": 10,
            "max_score": 90,
            "tags_any": ["VIP"],
            "company_contains": "acme",
            "created_after": "2026-01-01T00:00:00Z",
            "created_before": "2026-02-01T00:00:00Z",
            "has_phone": true
        }))
        .unwrap();
        assert_eq!(
            sql_for(&c),
            "SELECT * FROM leads WHERE owner_id = $1 AND status = ANY($2) AND source = ANY($3) \
             AND priority = ANY($4) AND score >= $5 AND score <= $6 AND tags && $7 \
             AND company ILIKE $8 AND created_at >= $9 AND created_at < $10 \
             AND phone IS NOT NULL AND phone <> ''"
        );
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = SegmentCriteria::from_json(&json!({"country": "NZ"})).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_unknown_enum_value_rejected() {
        assert!(SegmentCriteria::from_json(&json!({"statuses": ["archived"]})).is_err());
    }

    #[test]
    fn test_inverted_score_range_rejected() {
        assert!(SegmentCriteria::from_json(&json!({"min_score": 80, "max_score": 20})).is_err());
    }

    #[test]
    fn test_inverted_date_range_rejected() {
        let r = SegmentCriteria::from_json(&json!({
            "created_after": "2026-05-01T00:00:00Z",
            "created_before": "2026-01-01T00:00:00Z"
        }));
        assert!(r.is_err());
    }

    #[test]
    fn test_to_json_omits_empty_fields() {
        let c = SegmentCriteria {
            min_score: Some(40),
            ..Default::default()
        };
        assert_eq!(c.to_json(), json!({"min_score": 40}));
    }

    #[test]
    fn test_like_pattern_escapes() {
        assert_eq!(like_pattern(" 50%_off "), "%50\\%\\_off%");
    }
}
