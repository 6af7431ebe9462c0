//! Weekly availability rules and the bookable slots they produce.
//! All times are UTC.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::appointments::conflicts::{find_conflict, TimeWindow};
use crate::errors::AppError;
use crate::models::appointment::{AppointmentRow, AvailabilityRuleRow};

pub const MAX_RULES: usize = 50;

#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq, Eq)]
pub struct AvailabilityRule {
    /// 0 = Monday .. 6 = Sunday
    #[validate(range(min = 0, max = 6))]
    pub weekday: i16,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

impl From<&AvailabilityRuleRow> for AvailabilityRule {
    fn from(row: &AvailabilityRuleRow) -> Self {
        Self {
            weekday: row.weekday,
            start_time: row.start_time,
            end_time: row.end_time,
        }
    }
}

pub fn weekday_index(date: NaiveDate) -> i16 {
    date.weekday().num_days_from_monday() as i16
}

/// Each rule must be a forward range, and rules on the same weekday must not overlap.
pub fn validate_rules(rules: &[AvailabilityRule]) -> Result<(), AppError> {
    if rules.len() > MAX_RULES {
        return Err(AppError::Validation(format!(
            "At most {MAX_RULES} availability rules are allowed"
        )));
    }
    for rule in rules {
        rule.validate()?;
        if rule.start_time >= rule.end_time {
            return Err(AppError::Validation(format!(
                "Rule on weekday {} ends before it starts",
                rule.weekday
            )));
        }
    }

    let mut sorted: Vec<&AvailabilityRule> = rules.iter().collect();
    sorted.sort_by_key(|r| (r.weekday, r.start_time));
    for pair in sorted.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        if a.weekday == b.weekday && b.start_time < a.end_time {
            return Err(AppError::Validation(format!(
                "Rules on weekday {} overlap ({}-{} and {}-{})",
                a.weekday, a.start_time, a.end_time, b.start_time, b.end_time
            )));
        }
    }
    Ok(())
}

/// The concrete windows `rules` open on `date`, earliest first.
pub fn day_windows(date: NaiveDate, rules: &[AvailabilityRule]) -> Vec<TimeWindow> {
    let weekday = weekday_index(date);
    let mut windows: Vec<TimeWindow> = rules
        .iter()
        .filter(|r| r.weekday == weekday && r.start_time < r.end_time)
        .map(|r| TimeWindow {
            start: Utc.from_utc_datetime(&date.and_time(r.start_time)),
            end: Utc.from_utc_datetime(&date.and_time(r.end_time)),
        })
        .collect();
    windows.sort_by_key(|w| w.start);
    windows
}

/// True if `window` fits entirely inside one availability window of its start day.
pub fn within_availability(window: &TimeWindow, rules: &[AvailabilityRule]) -> bool {
    day_windows(window.start.date_naive(), rules)
        .iter()
        .any(|w| w.contains(window))
}

/// Slots of `duration_minutes` stepping from each window start. Slots that
/// start before `now` or collide with a blocking appointment are dropped.
pub fn open_slots(
    date: NaiveDate,
    rules: &[AvailabilityRule],
    duration_minutes: i64,
    booked: &[AppointmentRow],
    now: DateTime<Utc>,
) -> Vec<TimeWindow> {
    let step = Duration::minutes(duration_minutes);
    let mut slots = Vec::new();
    for window in day_windows(date, rules) {
        let mut start = window.start;
        while start + step <= window.end {
            let slot = TimeWindow {
                start,
                end: start + step,
            };
            if slot.start >= now && find_conflict(&slot, booked, None).is_none() {
                slots.push(slot);
            }
            start += step;
        }
    }
    slots
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    // 2026-04-06 is a Monday
    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 4, 6).unwrap()
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.from_utc_datetime(&monday().and_time(hm(h, m)))
    }

    fn rule(weekday: i16, start: NaiveTime, end: NaiveTime) -> AvailabilityRule {
        AvailabilityRule {
            weekday,
            start_time: start,
            end_time: end,
        }
    }

    fn booked(start: DateTime<Utc>, end: DateTime<Utc>, status: &str) -> AppointmentRow {
        AppointmentRow {
            id: Uuid::new_v4(),
            owner_id: Uuid::nil(),
            card_id: None,
            guest_name: "G".into(),
            guest_email: "g@example.com".into(),
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
    fn test_weekday_index_monday_is_zero() {
        assert_eq!(weekday_index(monday()), 0);
        assert_eq!(weekday_index(monday() + Duration::days(6)), 6);
    }

    #[test]
    fn test_validate_rules_ok() {
        let rules = vec![
            rule(0, hm(9, 0), hm(12, 0)),
            rule(0, hm(13, 0), hm(17, 0)),
            rule(1, hm(9, 0), hm(17, 0)),
        ];
        assert!(validate_rules(&rules).is_ok());
    }

    #[test]
    fn test_validate_rules_rejects_overlap_and_inversion() {
        let overlapping = vec![rule(2, hm(9, 0), hm(12, 0)), rule(2, hm(11, 0), hm(14, 0))];
        assert!(validate_rules(&overlapping).is_err());

        let inverted = vec![rule(3, hm(17, 0), hm(9, 0))];
        assert!(validate_rules(&inverted).is_err());

        let bad_day = vec![rule(7, hm(9, 0), hm(10, 0))];
        assert!(validate_rules(&bad_day).is_err());
    }

    #[test]
    fn test_adjacent_rules_allowed() {
        let rules = vec![rule(4, hm(9, 0), hm(12, 0)), rule(4, hm(12, 0), hm(15, 0))];
        assert!(validate_rules(&rules).is_ok());
    }

    #[test]
    fn test_open_slots_steps_and_skips_booked() {
        let rules = vec![rule(0, hm(9, 0), hm(11, 0))];
        let booked = vec![
            booked(at(9, 30), at(10, 0), "confirmed"),
            booked(at(10, 0), at(10, 30), "cancelled"),
        ];
        let slots = open_slots(monday(), &rules, 30, &booked, at(0, 0));
        let starts: Vec<_> = slots.iter().map(|s| s.start).collect();
        assert_eq!(starts, vec![at(9, 0), at(10, 0), at(10, 30)]);
    }

    #[test]
    fn test_open_slots_drops_past_and_partial() {
        let rules = vec![rule(0, hm(9, 0), hm(10, 10))];
        let slots = open_slots(monday(), &rules, 30, &[], at(9, 15));
        let starts: Vec<_> = slots.iter().map(|s| s.start).collect();
        // 9:00 is past; 10:00-10:30 would overrun the window
        assert_eq!(starts, vec![at(9, 30)]);
    }

    #[test]
    fn test_no_rules_for_day_no_slots() {
        let rules = vec![rule(1, hm(9, 0), hm(17, 0))];
        assert!(open_slots(monday(), &rules, 30, &[], at(0, 0)).is_empty());
    }

    #[test]
    fn test_within_availability() {
        let rules = vec![rule(0, hm(9, 0), hm(12, 0)), rule(0, hm(13, 0), hm(17, 0))];
        let ok = TimeWindow::new(at(13, 0), at(14, 0)).unwrap();
        let lunch = TimeWindow::new(at(11, 30), at(13, 30)).unwrap();
        assert!(within_availability(&ok, &rules));
        assert!(!within_availability(&lunch, &rules));
    }
}
