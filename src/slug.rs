//! Mailbox slugs: the URL-safe identifier a mailbox is served under.

use thiserror::Error;

pub const MAX_SLUG_LEN: usize = 128;

/// Why a slug cannot be used. Messages are shown to the user as-is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SlugError {
    #[error("please provide a url.")]
    Empty,
    #[error("maximum length is 128 characters.")]
    TooLong,
    #[error("invalid url, must contain only lowercase letters, numbers and _")]
    InvalidChars,
}

/// Derives a slug from a mailbox title.
///
/// Lowercases, turns each whitespace character into `_`, drops everything
/// outside `[a-z0-9_]` and keeps at most 128 characters.
///
/// ```
/// use feedscout::slug::title_to_slug;
///
/// assert_eq!(title_to_slug("My Tech News!"), "my_tech_news");
/// ```
pub fn title_to_slug(title: &str) -> String {
    title
        .chars()
        .flat_map(char::to_lowercase)
        .filter_map(|c| match c {
            c if c.is_whitespace() => Some('_'),
            'a'..='z' | '0'..='9' | '_' => Some(c),
            _ => None,
        })
        .take(MAX_SLUG_LEN)
        .collect()
}

/// Checks a slug before asking the server for it.
pub fn validate_slug(slug: &str) -> Result<(), SlugError> {
    if slug.is_empty() {
        return Err(SlugError::Empty);
    }
    if slug.chars().count() > MAX_SLUG_LEN {
        return Err(SlugError::TooLong);
    }
    if !slug
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
    {
        return Err(SlugError::InvalidChars);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_title_to_slug() {
        assert_eq!(title_to_slug("Hello World"), "hello_world");
        assert_eq!(title_to_slug("  Two  Spaces "), "__two__spaces_");
        assert_eq!(title_to_slug("Café & Crème"), "caf__crme");
        assert_eq!(title_to_slug("tab\there"), "tab_here");
        assert_eq!(title_to_slug("!!!"), "");
    }

    #[test]
    fn test_title_to_slug_truncates() {
        let slug = title_to_slug(&"a".repeat(200));
        assert_eq!(slug.len(), MAX_SLUG_LEN);
    }

    #[test]
    fn test_validate_slug() {
        assert_eq!(validate_slug("news_2024"), Ok(()));
        assert_eq!(validate_slug(""), Err(SlugError::Empty));
        assert_eq!(validate_slug(&"a".repeat(129)), Err(SlugError::TooLong));
        assert_eq!(validate_slug(&"a".repeat(128)), Ok(()));
        assert_eq!(validate_slug("Upper"), Err(SlugError::InvalidChars));
        assert_eq!(validate_slug("with-dash"), Err(SlugError::InvalidChars));
        assert_eq!(validate_slug("sp ace"), Err(SlugError::InvalidChars));
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(SlugError::Empty.to_string(), "please provide a url.");
        assert_eq!(
            SlugError::TooLong.to_string(),
            "maximum length is 128 characters."
        );
    }

    proptest! {
        #[test]
        fn prop_derived_slugs_are_valid_or_empty(title in "\\PC{0,300}") {
            let slug = title_to_slug(&title);
            prop_assert!(slug.is_empty() || validate_slug(&slug).is_ok());
        }

        #[test]
        fn prop_slug_is_idempotent(title in "\\PC{0,300}") {
            let slug = title_to_slug(&title);
            prop_assert_eq!(title_to_slug(&slug), slug);
        }
    }
}
