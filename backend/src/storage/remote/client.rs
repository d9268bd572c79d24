//! HTTP client for the hosted Supabase backend.
//!
//! Table access goes through PostgREST (`/rest/v1`), identity through GoTrue
//! (`/auth/v1`). Every request carries the project's anon key; once a user has
//! signed in, their access token replaces it as the bearer credential.

use std::sync::RwLock;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::{Client, Method, RequestBuilder};
use serde_json::{json, Value};

use crate::config::AppConfig;
use crate::storage::traits::{AuthUser, Query, RemoteAuth, RemoteError, RemoteStore};

pub struct SupabaseClient {
    client: Client,
    base_url: String,
    anon_key: String,
    access_token: RwLock<Option<String>>,
}

impl SupabaseClient {
    /// Build a client from configuration. Returns `None` when the endpoint or
    /// key is missing.
    pub fn from_config(config: &AppConfig) -> Result<Option<Self>, RemoteError> {
        let (Some(url), Some(key)) = (&config.supabase_url, &config.supabase_anon_key) else {
            return Ok(None);
        };

        let client = Client::builder().timeout(config.http_timeout).build()?;
        Ok(Some(Self {
            client,
            base_url: url.trim_end_matches('/').to_string(),
            anon_key: key.clone(),
            access_token: RwLock::new(None),
        }))
    }

    fn bearer(&self) -> String {
        self.access_token
            .read()
            .ok()
            .and_then(|token| token.clone())
            .unwrap_or_else(|| self.anon_key.clone())
    }

    fn set_access_token(&self, token: Option<String>) {
        match self.access_token.write() {
            Ok(mut guard) => *guard = token,
            Err(_) => warn!("Access token lock poisoned; session token not updated"),
        }
    }

    fn has_session(&self) -> bool {
        self.access_token
            .read()
            .map(|token| token.is_some())
            .unwrap_or(false)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .header("apikey", &self.anon_key)
            .bearer_auth(self.bearer())
    }

    fn table(&self, method: Method, table: &str) -> RequestBuilder {
        self.request(method, &format!("/rest/v1/{}", table))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Value, RemoteError> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            debug!("Supabase request failed with {}: {}", status, body);
            return Err(RemoteError::Status {
                status: status.as_u16(),
                body,
            });
        }
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| RemoteError::Malformed(e.to_string()))
    }

    async fn send_rows(&self, request: RequestBuilder) -> Result<Vec<Value>, RemoteError> {
        match self.send(request).await? {
            Value::Array(rows) => Ok(rows),
            Value::Null => Ok(Vec::new()),
            other => Err(RemoteError::Malformed(format!("expected a row list, got {}", other))),
        }
    }

    fn auth_user(body: &Value) -> Result<AuthUser, RemoteError> {
        let user = body.get("user").unwrap_or(body);
        let id = user
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| RemoteError::Malformed("auth response without user id".to_string()))?;
        Ok(AuthUser {
            id: id.to_string(),
            email: user.get("email").and_then(Value::as_str).map(str::to_string),
        })
    }

    fn remember_token(&self, body: &Value) {
        if let Some(token) = body.get("access_token").and_then(Value::as_str) {
            self.set_access_token(Some(token.to_string()));
        }
    }
}

#[async_trait]
impl RemoteStore for SupabaseClient {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>, RemoteError> {
        let request = self.table(Method::GET, table).query(&query.to_params());
        self.send_rows(request).await
    }

    async fn insert(&self, table: &str, row: Value) -> Result<Value, RemoteError> {
        let request = self
            .table(Method::POST, table)
            .header("Prefer", "return=representation")
            .json(&json!([row]));
        self.send_rows(request)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RemoteError::Malformed(format!("insert into {} returned no row", table)))
    }

    async fn update(&self, table: &str, query: &Query, patch: Value) -> Result<Vec<Value>, RemoteError> {
        let request = self
            .table(Method::PATCH, table)
            .query(&query.to_params())
            .header("Prefer", "return=representation")
            .json(&patch);
        self.send_rows(request).await
    }

    async fn upsert(&self, table: &str, rows: Vec<Value>) -> Result<(), RemoteError> {
        if rows.is_empty() {
            return Ok(());
        }
        let request = self
            .table(Method::POST, table)
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&rows);
        self.send(request).await.map(|_| ())
    }

    async fn delete(&self, table: &str, query: &Query) -> Result<(), RemoteError> {
        let request = self.table(Method::DELETE, table).query(&query.to_params());
        self.send(request).await.map(|_| ())
    }

    async fn rpc(&self, function: &str, args: Value) -> Result<Value, RemoteError> {
        let request = self
            .request(Method::POST, &format!("/rest/v1/rpc/{}", function))
            .json(&args);
        self.send(request).await
    }
}

#[async_trait]
impl RemoteAuth for SupabaseClient {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<AuthUser, RemoteError> {
        let request = self
            .request(Method::POST, "/auth/v1/token")
            .query(&[("grant_type", "password")])
            .json(&json!({ "email": email, "password": password }));
        let body = self.send(request).await?;
        self.remember_token(&body);
        Self::auth_user(&body)
    }

    async fn sign_up(&self, email: &str, password: &str, metadata: Value) -> Result<AuthUser, RemoteError> {
        let request = self
            .request(Method::POST, "/auth/v1/signup")
            .json(&json!({ "email": email, "password": password, "data": metadata }));
        let body = self.send(request).await?;
        self.remember_token(&body);
        Self::auth_user(&body)
    }

    async fn sign_out(&self) -> Result<(), RemoteError> {
        if self.has_session() {
            let result = self.send(self.request(Method::POST, "/auth/v1/logout")).await;
            self.set_access_token(None);
            result.map(|_| ())
        } else {
            Ok(())
        }
    }

    async fn current_auth_user(&self) -> Result<Option<AuthUser>, RemoteError> {
        if !self.has_session() {
            return Ok(None);
        }
        match self.send(self.request(Method::GET, "/auth/v1/user")).await {
            Ok(body) => Self::auth_user(&body).map(Some),
            Err(RemoteError::Status { status: 401 | 403, .. }) => {
                self.set_access_token(None);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendMode;

    #[test]
    fn test_client_requires_credentials() {
        let config = AppConfig::for_testing("/tmp/finedu", BackendMode::Auto, false);
        assert!(SupabaseClient::from_config(&config).unwrap().is_none());

        let config = AppConfig::for_testing("/tmp/finedu", BackendMode::Auto, true);
        let client = SupabaseClient::from_config(&config).unwrap().unwrap();
        assert_eq!(client.bearer(), "test-anon-key");
        assert!(!client.has_session());
    }

    #[test]
    fn test_auth_user_accepts_both_response_shapes() {
        let session = json!({"access_token": "t", "user": {"id": "u1", "email": "a@b.c"}});
        assert_eq!(SupabaseClient::auth_user(&session).unwrap().id, "u1");

        let bare = json!({"id": "u2", "email": null});
        let user = SupabaseClient::auth_user(&bare).unwrap();
        assert_eq!(user.id, "u2");
        assert!(user.email.is_none());

        assert!(SupabaseClient::auth_user(&json!({})).is_err());
    }
}
