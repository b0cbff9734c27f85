/// Case-insensitive substring test, the in-process equivalent of an ILIKE
/// `%needle%` filter.
pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}
