use crate::errors::AppError;

pub const MIN_SLUG_LEN: usize = 3;
pub const MAX_SLUG_LEN: usize = 64;

const RESERVED: &[&str] = &[
    "admin", "api", "app", "www", "login", "signup", "settings", "billing",
];

/// Slugs are public URL segments: `[a-z0-9-]`, 3-64 chars, single inner hyphens.
pub fn validate_slug(slug: &str) -> Result<(), AppError> {
    let len = slug.chars().count();
    if !(MIN_SLUG_LEN..=MAX_SLUG_LEN).contains(&len) {
        return Err(AppError::Validation(format!(
            "slug must be between {MIN_SLUG_LEN} and {MAX_SLUG_LEN} characters"
        )));
    }
    if !slug
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(AppError::Validation(
            "slug may only contain lowercase letters, digits and hyphens".to_string(),
        ));
    }
    if slug.starts_with('-') || slug.ends_with('-') || slug.contains("--") {
        return Err(AppError::Validation(
            "slug cannot start or end with a hyphen or contain '--'".to_string(),
        ));
    }
    if RESERVED.contains(&slug) {
        return Err(AppError::Validation(format!("slug '{slug}' is reserved")));
    }
    Ok(())
}

/// Derives a slug from free text. Always returns something `validate_slug`
/// accepts, except that it may collide with a reserved word or an existing card.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut last_hyphen = true;
    for c in text.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
            last_hyphen = false;
        } else if !last_hyphen {
            slug.push('-');
            last_hyphen = true;
        }
    }
    // leave room for a collision suffix
    slug.truncate(MAX_SLUG_LEN - 7);
    let mut slug = slug.trim_matches('-').to_string();
    if slug.len() < MIN_SLUG_LEN {
        slug = if slug.is_empty() {
            "card".to_string()
        } else {
            format!("{slug}-card")
        };
    }
    slug
}

/// `base-xxxxxx` with six hex characters from a fresh v4 uuid.
pub fn with_suffix(base: &str) -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("{base}-{}", &id[..6])
}

pub fn is_reserved(slug: &str) -> bool {
    RESERVED.contains(&slug)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_slugs() {
        for s in ["ada", "ada-lovelace", "team-42", "a1b"] {
            assert!(validate_slug(s).is_ok(), "{s} should be valid");
        }
    }

    #[test]
    fn test_invalid_slugs() {
        for s in ["ab", "Ada", "ada_l", "-ada", "ada-", "ada--l", "admin", "ad a"] {
            assert!(validate_slug(s).is_err(), "{s} should be invalid");
        }
        assert!(validate_slug(&"a".repeat(65)).is_err());
        assert!(validate_slug(&"a".repeat(64)).is_ok());
    }

    #[test]
    fn test_slugify_basic() {
        assert_eq!(slugify("Ada Lovelace"), "ada-lovelace");
        assert_eq!(slugify("  Dr. Grace  M. Hopper!! "), "dr-grace-m-hopper");
    }

    #[test]
    fn test_slugify_drops_non_ascii() {
        assert_eq!(slugify("José Müller"), "jos-m-ller");
    }

    #[test]
    fn test_slugify_short_and_empty() {
        assert_eq!(slugify("Al"), "al-card");
        assert_eq!(slugify("日本"), "card");
        assert!(validate_slug(&slugify("Al")).is_ok());
    }

    #[test]
    fn test_slugify_truncates_with_room_for_suffix() {
        let long = "word ".repeat(40);
        let slug = slugify(&long);
        assert!(slug.len() <= MAX_SLUG_LEN - 7);
        assert!(validate_slug(&with_suffix(&slug)).is_ok());
    }

    #[test]
    fn test_with_suffix_shape() {
        let s = with_suffix("ada");
        assert_eq!(s.len(), "ada-".len() + 6);
        assert!(s.starts_with("ada-"));
        assert!(validate_slug(&s).is_ok());
    }
}
