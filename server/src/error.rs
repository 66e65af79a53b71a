use thiserror::Error;

/// Errors raised by the persistence and registry layers.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached at startup.
    #[error("failed to connect to database {url}: {source}")]
    Connection {
        url: String,
        #[source]
        source: sqlx::Error,
    },

    /// A schema delta failed to apply.
    #[error("migration step '{operation}' failed: {source}")]
    Migration {
        operation: String,
        #[source]
        source: sqlx::Error,
    },

    /// A create or upsert violated a uniqueness constraint.
    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    /// A registry mutation referenced a server that is not cached.
    #[error("unknown server: {0}")]
    UnknownServer(String),

    /// A reporting query failed.
    #[error("query failed: {source}\nQuery: {query}")]
    Query {
        query: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Classify a write error, lifting unique-constraint violations into `DuplicateKey`.
    pub fn from_write(err: sqlx::Error, key: &str) -> Self {
        let is_unique = err
            .as_database_error()
            .map(|db| db.is_unique_violation())
            .unwrap_or(false);
        if is_unique {
            StoreError::DuplicateKey(key.to_string())
        } else {
            StoreError::Database(err)
        }
    }

    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, StoreError::DuplicateKey(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_the_failing_operation() {
        let err = StoreError::Migration {
            operation: "add column servers.prefix".into(),
            source: sqlx::Error::RowNotFound,
        };
        assert!(err.to_string().contains("add column servers.prefix"));
    }

    #[test]
    fn test_query_error_includes_query_text() {
        let err = StoreError::Query {
            query: "SELECT 1".into(),
            source: sqlx::Error::RowNotFound,
        };
        assert!(err.to_string().ends_with("Query: SELECT 1"));
    }

    #[test]
    fn test_non_database_error_is_not_duplicate() {
        let err = StoreError::from_write(sqlx::Error::RowNotFound, "G1");
        assert!(!err.is_duplicate_key());
        assert!(matches!(err, StoreError::Database(_)));
    }
}
