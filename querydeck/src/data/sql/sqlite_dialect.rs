//! SQLite SQL dialect implementation

use super::SqlDialect;

/// SQLite SQL dialect
pub struct SqliteDialect;

impl SqlDialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    /// Backtick quoting: SQLite reads an unresolvable double-quoted
    /// identifier as a string literal, which would hide unknown columns.
    fn quote_ident(&self, ident: &str) -> String {
        format!("`{}`", ident.replace('`', "``"))
    }

    fn cast_to_string(&self, col: &str) -> String {
        format!("CAST({} AS TEXT)", col)
    }

    fn max_bind_params(&self) -> usize {
        // SQLITE_MAX_VARIABLE_NUMBER default since 3.32
        32_766
    }

    fn date_to_string(&self, col: &str) -> String {
        // SQLite stores dates as ISO-8601 text; strftime normalizes the 'T' separator and zone suffix
        format!("strftime('%Y-%m-%d %H:%M:%S', {})", col)
    }
}
