use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::appointments::models::AppointmentStatus;
use crate::errors::AppError;
use crate::models::appointment::AppointmentRow;

pub const MIN_DURATION_MINUTES: i64 = 5;
pub const MAX_DURATION_MINUTES: i64 = 8 * 60;

/// A half-open `[start, end)` window.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Rejects empty, inverted, too short and too long windows.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, AppError> {
        if end <= start {
            return Err(AppError::Validation(
                "ends_at must be after starts_at".to_string(),
            ));
        }
        let length = end - start;
        if length < Duration::minutes(MIN_DURATION_MINUTES) {
            return Err(AppError::Validation(format!(
                "Appointments must last at least {MIN_DURATION_MINUTES} minutes"
            )));
        }
        if length > Duration::minutes(MAX_DURATION_MINUTES) {
            return Err(AppError::Validation(format!(
                "Appointments cannot last longer than {} hours",
                MAX_DURATION_MINUTES / 60
            )));
        }
        Ok(Self { start, end })
    }

    pub fn starting_at(start: DateTime<Utc>, minutes: i64) -> Result<Self, AppError> {
        Self::new(start, start + Duration::minutes(minutes))
    }

    /// Touching windows (one ends exactly when the other starts) do not overlap.
    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains(&self, other: &TimeWindow) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

/// First existing booking that blocks `proposed`. Non-blocking statuses and
/// the appointment being rescheduled (`exclude`) are ignored.
pub fn find_conflict<'a>(
    proposed: &TimeWindow,
    existing: &'a [AppointmentRow],
    exclude: Option<Uuid>,
) -> Option<&'a AppointmentRow> {
    existing.iter().find(|appt| {
        if Some(appt.id) == exclude {
            return false;
        }
        let blocking = appt
            .status
            .parse::<AppointmentStatus>()
            .map(|s| s.blocks_calendar())
            .unwrap_or(false);
        blocking
            && proposed.overlaps(&TimeWindow {
                start: appt.starts_at,
                end: appt.ends_at,
            })
    })
}

pub fn ensure_no_conflict(
    proposed: &TimeWindow,
    existing: &[AppointmentRow],
    exclude: Option<Uuid>,
) -> Result<(), AppError> {
    match find_conflict(proposed, existing, exclude) {
        Some(conflict) => Err(AppError::Conflict(format!(
            "Requested time overlaps an existing appointment from {} to {}",
            conflict.starts_at.to_rfc3339(),
            conflict.ends_at.to_rfc3339()
        ))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(hh: u32, mm: u32) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(&format!("2026-04-06T{hh:02}:{mm:02}:00Z"))
            .unwrap()
            .with_timezone(&Utc)
    }

    fn appt(start: DateTime<Utc>, end: DateTime<Utc>, status: &str) -> AppointmentRow {
        AppointmentRow {
            id: Uuid::new_v4(),
            owner_id: Uuid::nil(),
            card_id: None,
            guest_name: "Guest".into(),
            guest_email: "guest@example.com".into(),
            guest_phone: None,
            starts_at: start,
            ends_at: end,
            status: status.into(),
            notes: None,
            created_at: start,
            updated_at: start,
        }
    }

    #[test]
    fn test_window_validation() {
        assert!(TimeWindow::new(t(10, 0), t(10, 0)).is_err());
        assert!(TimeWindow::new(t(10, 0), t(9, 0)).is_err());
        assert!(TimeWindow::new(t(10, 0), t(10, 4)).is_err());
        assert!(TimeWindow::new(t(10, 0), t(10, 5)).is_ok());
        assert!(TimeWindow::new(t(9, 0), t(17, 0)).is_ok());
        assert!(TimeWindow::new(t(9, 0), t(17, 1)).is_err());
    }

    #[test]
    fn test_window_bounds_count_seconds() {
        let start = t(9, 0);
        let over = start + Duration::minutes(MAX_DURATION_MINUTES) + Duration::seconds(1);
        assert!(TimeWindow::new(start, over).is_err());
        let barely_over = start + Duration::minutes(MAX_DURATION_MINUTES) + Duration::seconds(59);
        assert!(TimeWindow::new(start, barely_over).is_err());
        let short = start + Duration::minutes(MIN_DURATION_MINUTES) - Duration::seconds(1);
        assert!(TimeWindow::new(start, short).is_err());
    }

    #[test]
    fn test_overlap_cases() {
        let a = TimeWindow::new(t(10, 0), t(11, 0)).unwrap();
        let inside = TimeWindow::new(t(10, 15), t(10, 45)).unwrap();
        let partial = TimeWindow::new(t(10, 30), t(11, 30)).unwrap();
        let touching = TimeWindow::new(t(11, 0), t(11, 30)).unwrap();
        let before = TimeWindow::new(t(9, 0), t(10, 0)).unwrap();
        let enclosing = TimeWindow::new(t(9, 0), t(12, 0)).unwrap();

        assert!(a.overlaps(&inside));
        assert!(a.overlaps(&partial));
        assert!(partial.overlaps(&a));
        assert!(a.overlaps(&enclosing));
        assert!(!a.overlaps(&touching));
        assert!(!a.overlaps(&before));
    }

    #[test]
    fn test_conflict_only_with_blocking_status() {
        let existing = vec![
            appt(t(10, 0), t(11, 0), "cancelled"),
            appt(t(10, 0), t(11, 0), "completed"),
        ];
        let proposed = TimeWindow::new(t(10, 30), t(11, 0)).unwrap();
        assert!(find_conflict(&proposed, &existing, None).is_none());

        let existing = vec![appt(t(10, 0), t(11, 0), "pending")];
        assert!(find_conflict(&proposed, &existing, None).is_some());

        let existing = vec![appt(t(10, 0), t(11, 0), "confirmed")];
        assert!(ensure_no_conflict(&proposed, &existing, None).is_err());
    }

    #[test]
    fn test_reschedule_excludes_self() {
        let me = appt(t(10, 0), t(11, 0), "confirmed");
        let my_id = me.id;
        let existing = vec![me];
        let moved = TimeWindow::new(t(10, 30), t(11, 30)).unwrap();
        assert!(find_conflict(&moved, &existing, Some(my_id)).is_none());
        assert!(find_conflict(&moved, &existing, None).is_some());
    }

    #[test]
    fn test_back_to_back_allowed() {
        let existing = vec![appt(t(10, 0), t(11, 0), "confirmed")];
        let next = TimeWindow::new(t(11, 0), t(12, 0)).unwrap();
        assert!(ensure_no_conflict(&next, &existing, None).is_ok());
    }

    #[test]
    fn test_contains() {
        let day = TimeWindow::new(t(9, 0), t(17, 0)).unwrap();
        assert!(day.contains(&TimeWindow::new(t(9, 0), t(9, 30)).unwrap()));
        assert!(day.contains(&TimeWindow::new(t(16, 30), t(17, 0)).unwrap()));
        assert!(!day.contains(&TimeWindow::new(t(16, 45), t(17, 15)).unwrap()));
    }
}
