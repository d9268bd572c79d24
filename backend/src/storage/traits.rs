//! # Storage Traits
//!
//! Abstractions over the remote backend so the domain layer can run against the
//! real Supabase service, a disabled stand-in when no credentials are
//! configured, or an in-memory fake in tests.

use async_trait::async_trait;
use serde_json::Value;

/// Error raised by any remote operation.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("remote backend is not configured")]
    NotConfigured,
    #[error("remote request failed with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("remote transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed remote response: {0}")]
    Malformed(String),
    #[error("no {table} row matched id {id}")]
    NoMatchingRow { table: &'static str, id: String },
}

impl RemoteError {
    /// The server understood the request and refused it (4xx). Such errors
    /// are answers, not connectivity problems, and must not trigger a local
    /// fallback for authentication.
    pub fn is_rejection(&self) -> bool {
        matches!(self, RemoteError::Status { status, .. } if (400..500).contains(status))
    }

    /// Best human-readable message for a rejection body.
    pub fn user_message(&self) -> String {
        match self {
            RemoteError::Status { body, .. } => serde_json::from_str::<Value>(body)
                .ok()
                .and_then(|v| {
                    ["msg", "message", "error_description", "error"]
                        .iter()
                        .find_map(|k| v.get(*k).and_then(Value::as_str).map(str::to_string))
                })
                .unwrap_or_else(|| body.clone()),
            other => other.to_string(),
        }
    }
}

/// A single row filter.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, String),
    IsNull(String),
}

/// Filtered select/update/delete description, shaped after PostgREST.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub columns: Option<String>,
    pub filters: Vec<Filter>,
    pub order: Option<(String, bool)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(mut self, columns: &str) -> Self {
        self.columns = Some(columns.to_string());
        self
    }

    pub fn eq(mut self, column: &str, value: impl ToString) -> Self {
        self.filters.push(Filter::Eq(column.to_string(), value.to_string()));
        self
    }

    pub fn is_null(mut self, column: &str) -> Self {
        self.filters.push(Filter::IsNull(column.to_string()));
        self
    }

    pub fn order(mut self, column: &str, ascending: bool) -> Self {
        self.order = Some((column.to_string(), ascending));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Value of an equality filter on `column`, if any.
    pub fn eq_value(&self, column: &str) -> Option<&str> {
        self.filters.iter().find_map(|f| match f {
            Filter::Eq(c, v) if c == column => Some(v.as_str()),
            _ => None,
        })
    }

    /// Whether a JSON row satisfies every filter.
    pub fn matches(&self, row: &Value) -> bool {
        self.filters.iter().all(|filter| match filter {
            Filter::Eq(column, expected) => match row.get(column) {
                Some(Value::String(s)) => s == expected,
                Some(Value::Null) | None => false,
                Some(other) => other.to_string() == *expected,
            },
            Filter::IsNull(column) => row.get(column).map_or(true, Value::is_null),
        })
    }

    /// PostgREST query-string parameters.
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = vec![(
            "select".to_string(),
            self.columns.clone().unwrap_or_else(|| "*".to_string()),
        )];
        for filter in &self.filters {
            match filter {
                Filter::Eq(column, value) => params.push((column.clone(), format!("eq.{}", value))),
                Filter::IsNull(column) => params.push((column.clone(), "is.null".to_string())),
            }
        }
        if let Some((column, ascending)) = &self.order {
            let direction = if *ascending { "asc" } else { "desc" };
            params.push(("order".to_string(), format!("{}.{}", column, direction)));
        }
        if let Some(limit) = self.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        params
    }
}

/// Row-oriented query/mutation interface against the hosted tables.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Select rows matching the query.
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>, RemoteError>;

    /// Insert one row and return it as stored.
    async fn insert(&self, table: &str, row: Value) -> Result<Value, RemoteError>;

    /// Apply `patch` to every row matching the query; returns the updated rows.
    async fn update(&self, table: &str, query: &Query, patch: Value) -> Result<Vec<Value>, RemoteError>;

    /// Insert or merge rows by primary key.
    async fn upsert(&self, table: &str, rows: Vec<Value>) -> Result<(), RemoteError>;

    /// Delete every row matching the query.
    async fn delete(&self, table: &str, query: &Query) -> Result<(), RemoteError>;

    /// Call a stored procedure.
    async fn rpc(&self, function: &str, args: Value) -> Result<Value, RemoteError>;
}

/// Minimal identity returned by the remote auth service.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub id: String,
    pub email: Option<String>,
}

/// Password authentication against the remote identity service.
#[async_trait]
pub trait RemoteAuth: Send + Sync {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<AuthUser, RemoteError>;

    /// `metadata` is stored with the account (name, role, birthdate).
    async fn sign_up(&self, email: &str, password: &str, metadata: Value) -> Result<AuthUser, RemoteError>;

    async fn sign_out(&self) -> Result<(), RemoteError>;

    /// The currently authenticated user, if a session exists.
    async fn current_auth_user(&self) -> Result<Option<AuthUser>, RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_params_follow_postgrest_syntax() {
        let query = Query::new()
            .eq("parent_id", "p1")
            .is_null("deleted_at")
            .order("created_at", false)
            .limit(1);
        assert_eq!(
            query.to_params(),
            vec![
                ("select".to_string(), "*".to_string()),
                ("parent_id".to_string(), "eq.p1".to_string()),
                ("deleted_at".to_string(), "is.null".to_string()),
                ("order".to_string(), "created_at.desc".to_string()),
                ("limit".to_string(), "1".to_string()),
            ]
        );
    }

    #[test]
    fn test_query_matches_rows() {
        let query = Query::new().eq("id", "k1").is_null("deleted_at");
        assert!(query.matches(&json!({"id": "k1", "deleted_at": null})));
        assert!(query.matches(&json!({"id": "k1"})));
        assert!(!query.matches(&json!({"id": "k1", "deleted_at": "2024-01-01T00:00:00Z"})));
        assert!(!query.matches(&json!({"id": "k2"})));
        assert_eq!(query.eq_value("id"), Some("k1"));
    }

    #[test]
    fn test_rejection_message_is_extracted() {
        let err = RemoteError::Status {
            status: 400,
            body: r#"{"error_description":"Invalid login credentials"}"#.to_string(),
        };
        assert!(err.is_rejection());
        assert_eq!(err.user_message(), "Invalid login credentials");

        let server = RemoteError::Status { status: 503, body: "down".to_string() };
        assert!(!server.is_rejection());
    }
}
