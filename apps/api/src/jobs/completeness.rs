use serde::Serialize;

use crate::models::job_profile::JobProfileRow;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProfileCompleteness {
    pub score: u32,
    pub missing: Vec<String>,
}

const MIN_SKILLS: usize = 3;

/// Points per section, summing to 100.
const WEIGHTS: &[(&str, u32)] = &[
    ("headline", 15),
    ("summary", 15),
    ("location", 10),
    ("desired_roles", 10),
    ("experience", 25),
    ("education", 15),
    ("skills", 10),
];

fn filled(v: &Option<String>) -> bool {
    v.as_deref().map(|s| !s.trim().is_empty()).unwrap_or(false)
}

pub fn compute_profile_completeness(
    profile: &JobProfileRow,
    experience_count: usize,
    education_count: usize,
    skill_count: usize,
) -> ProfileCompleteness {
    let mut score = 0;
    let mut missing = Vec::new();

    for (section, points) in WEIGHTS {
        let present = match *section {
            "headline" => filled(&profile.headline),
            "summary" => filled(&profile.summary),
            "location" => filled(&profile.location),
            "desired_roles" => !profile.desired_roles.is_empty(),
            "experience" => experience_count > 0,
            "education" => education_count > 0,
            "skills" => skill_count >= MIN_SKILLS,
            _ => false,
        };
        if present {
            score += points;
        } else if *section == "skills" {
            missing.push(format!("skills (at least {MIN_SKILLS})"));
        } else {
            missing.push(section.to_string());
        }
    }

    ProfileCompleteness { score, missing }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn profile() -> JobProfileRow {
        let now = Utc::now();
        JobProfileRow {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            headline: None,
            summary: None,
            location: None,
            open_to_work: false,
            desired_roles: vec![],
            years_experience: None,
            is_public: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_weights_sum_to_100() {
        assert_eq!(WEIGHTS.iter().map(|(_, w)| w).sum::<u32>(), 100);
    }

    #[test]
    fn test_empty_profile() {
        let c = compute_profile_completeness(&profile(), 0, 0, 0);
        assert_eq!(c.score, 0);
        assert_eq!(c.missing.len(), WEIGHTS.len());
    }

    #[test]
    fn test_full_profile() {
        let p = JobProfileRow {
            headline: Some("Backend engineer".into()),
            summary: Some("Builds APIs".into()),
            location: Some("Lisbon".into()),
            desired_roles: vec!["staff engineer".into()],
            ..profile()
        };
        let c = compute_profile_completeness(&p, 2, 1, 3);
        assert_eq!(c.score, 100);
        assert!(c.missing.is_empty());
    }

    #[test]
    fn test_two_skills_not_enough() {
        let c = compute_profile_completeness(&profile(), 1, 0, 2);
        assert_eq!(c.score, 25);
        assert!(c.missing.contains(&"skills (at least 3)".to_string()));
    }

    #[test]
    fn test_blank_headline_counts_as_missing() {
        let p = JobProfileRow {
            headline: Some("   ".into()),
            ..profile()
        };
        let c = compute_profile_completeness(&p, 0, 0, 0);
        assert!(c.missing.contains(&"headline".to_string()));
    }
}
