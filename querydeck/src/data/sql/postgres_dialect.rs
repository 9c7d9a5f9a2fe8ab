//! PostgreSQL SQL dialect implementation

use super::SqlDialect;

/// PostgreSQL SQL dialect
pub struct PostgresDialect;

impl SqlDialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }

    fn date_placeholder(&self, index: usize) -> String {
        format!("${}::TIMESTAMPTZ", index)
    }

    fn cast_to_string(&self, col: &str) -> String {
        format!("{}::TEXT", col)
    }

    fn max_bind_params(&self) -> usize {
        // Bind message parameter count is an Int16
        u16::MAX as usize
    }

    fn date_to_string(&self, col: &str) -> String {
        format!("to_char({}, 'YYYY-MM-DD HH24:MI:SS')", col)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder() {
        let dialect = PostgresDialect;
        assert_eq!(dialect.placeholder(1), "$1");
        assert_eq!(dialect.placeholder(5), "$5");
    }

    #[test]
    fn test_date_placeholder() {
        assert_eq!(PostgresDialect.date_placeholder(3), "$3::TIMESTAMPTZ");
    }

    #[test]
    fn test_max_bind_params() {
        assert_eq!(PostgresDialect.max_bind_params(), 65_535);
    }

    #[test]
    fn test_casts() {
        let dialect = PostgresDialect;
        assert_eq!(dialect.cast_to_string("\"score\""), "\"score\"::TEXT");
        assert_eq!(
            dialect.date_to_string("\"created_at\""),
            "to_char(\"created_at\", 'YYYY-MM-DD HH24:MI:SS')"
        );
    }
}
