// =============================================================================
// Configuration Files
// =============================================================================

/// Environment variable for config file path
pub const ENV_CONFIG: &str = "QUERYDECK_CONFIG";

// =============================================================================
// Environment Variables - Database
// =============================================================================

/// Environment variable for database backend (sqlite or postgres)
pub const ENV_DATABASE_BACKEND: &str = "QUERYDECK_DATABASE_BACKEND";

/// Environment variable for the database connection URL
pub const ENV_DATABASE_URL: &str = "QUERYDECK_DATABASE_URL";

/// Environment variable overriding the default `find` page size
pub const ENV_DEFAULT_LIMIT: &str = "QUERYDECK_DEFAULT_LIMIT";

/// Environment variable overriding the stream buffer capacity
pub const ENV_STREAM_BUFFER: &str = "QUERYDECK_STREAM_BUFFER";

// =============================================================================
// Query Defaults
// =============================================================================

/// Rows returned by `find` when no limit is given
pub const DEFAULT_FIND_LIMIT: u32 = 100;

/// Rows skipped by `find` when no offset is given
pub const DEFAULT_FIND_OFFSET: u32 = 0;

/// Rows buffered between a cursor and its consumer before the cursor is paused
pub const DEFAULT_STREAM_BUFFER: usize = 64;

/// Maximum size of filter JSON in bytes (64KB)
pub const MAX_FILTER_JSON_SIZE: usize = 64 * 1024;

/// Maximum number of OR-ed clauses in one filter expression
pub const MAX_FILTER_CLAUSES: usize = 50;

// =============================================================================
// SQLite Database
// =============================================================================

/// SQLite in-memory URL used when no URL is configured
pub const SQLITE_DEFAULT_URL: &str = "sqlite::memory:";

/// SQLite connection pool max connections
pub const SQLITE_MAX_CONNECTIONS: u32 = 5;

/// SQLite busy timeout in seconds
pub const SQLITE_BUSY_TIMEOUT_SECS: u64 = 30;

// =============================================================================
// PostgreSQL Database
// =============================================================================

/// PostgreSQL default max connections
pub const POSTGRES_DEFAULT_MAX_CONNECTIONS: u32 = 20;

/// PostgreSQL default min connections (keep warm for low latency)
pub const POSTGRES_DEFAULT_MIN_CONNECTIONS: u32 = 2;

/// PostgreSQL default connection acquire timeout in seconds
pub const POSTGRES_DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// PostgreSQL idle connection timeout in seconds (release unused connections)
pub const POSTGRES_DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;

/// PostgreSQL max connection lifetime in seconds
pub const POSTGRES_DEFAULT_MAX_LIFETIME_SECS: u64 = 1800;

/// PostgreSQL statement timeout in seconds (prevent runaway queries, 0 = disabled)
pub const POSTGRES_DEFAULT_STATEMENT_TIMEOUT_SECS: u64 = 60;
