//! SQL dialect trait for multi-database support
//!
//! This trait defines the interface for generating database-specific SQL syntax.

/// SQL dialect trait for generating database-specific SQL
///
/// Different databases have different syntax for:
/// - Parameter placeholders (? vs $1)
/// - Type casting
/// - Date formatting
/// - Limit/offset clauses
pub trait SqlDialect: Send + Sync {
    /// Get the dialect name
    fn name(&self) -> &'static str;

    /// Generate a parameter placeholder for the given index (1-based)
    ///
    /// - SQLite: Always returns "?"
    /// - PostgreSQL: Returns "$1", "$2", etc.
    fn placeholder(&self, index: usize) -> String;

    /// Placeholder for a textual value compared against a date-valued column
    ///
    /// PostgreSQL types bound text parameters as TEXT, which has no
    /// comparison operators against timestamps, so the parameter is cast.
    fn date_placeholder(&self, index: usize) -> String {
        self.placeholder(index)
    }

    /// Quote an identifier (table or column name)
    ///
    /// Embedded quotes are doubled, so any caller-supplied field name is
    /// rendered as a single identifier and never as SQL.
    fn quote_ident(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    /// Cast a column to string type
    ///
    /// - SQLite: `CAST(col AS TEXT)`
    /// - PostgreSQL: `col::TEXT`
    fn cast_to_string(&self, col: &str) -> String;

    /// Render a date-valued column as a canonical `YYYY-MM-DD HH:MM:SS` string
    ///
    /// - SQLite: `strftime('%Y-%m-%d %H:%M:%S', col)`
    /// - PostgreSQL: `to_char(col, 'YYYY-MM-DD HH24:MI:SS')`
    fn date_to_string(&self, col: &str) -> String;

    /// Most bound parameters one statement may carry
    fn max_bind_params(&self) -> usize;

    /// Generate LIMIT/OFFSET clause
    fn limit_offset(&self, limit: u32, offset: u32) -> String {
        format!("LIMIT {} OFFSET {}", limit, offset)
    }
}
