//! LIKE pattern helpers for substring filters
//!
//! Patterns are bound as parameters and always rendered with an explicit
//! escape character, so `%`, `_` and `\` in a needle match literally on
//! both backends.

/// Escape character declared on every rendered LIKE
pub const LIKE_ESCAPE: char = '\\';

/// Build a `%needle%` pattern with LIKE metacharacters escaped
///
/// ```
/// use querydeck::utils::sql::contains_pattern;
///
/// assert_eq!(contains_pattern("Rep::1"), "%Rep::1%");
/// assert_eq!(contains_pattern("100%_off"), "%100\\%\\_off%");
/// ```
pub fn contains_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | LIKE_ESCAPE) {
            pattern.push(LIKE_ESCAPE);
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Render `target [NOT] LIKE placeholder ESCAPE '\'`
pub fn like_clause(target: &str, placeholder: &str, negated: bool) -> String {
    format!(
        "{} {}LIKE {} ESCAPE '{}'",
        target,
        if negated { "NOT " } else { "" },
        placeholder,
        LIKE_ESCAPE
    )
}
