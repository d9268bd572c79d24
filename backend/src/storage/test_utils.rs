//! Test utilities: temporary local stores and an in-memory remote backend.
//!
//! Everything here cleans up after itself through RAII, even when a test
//! panics.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};
use shared::{Kid, SyncState, Tx, TxType};
use tempfile::TempDir;
use uuid::Uuid;

use super::local::LocalConnection;
use super::mappers::{pick_f64, pick_str, pick_time, KidMapper};
use super::traits::{AuthUser, Query, RemoteAuth, RemoteError, RemoteStore};
use crate::config::{AppConfig, BackendMode};
use crate::context::AppContext;
use crate::domain::{ConnectivityMonitor, FixedClock};

/// Temporary data directory with a connection on top of it.
pub struct TestEnvironment {
    pub connection: LocalConnection,
    /// Base directory path for manual inspection if needed
    pub base_path: PathBuf,
    _temp_dir: TempDir,
}

impl TestEnvironment {
    pub fn new() -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let connection = LocalConnection::new(temp_dir.path())?;
        Ok(Self {
            connection,
            base_path: temp_dir.path().to_path_buf(),
            _temp_dir: temp_dir,
        })
    }
}

pub fn sample_kid(id: &str, parent_id: &str, saldo: f64, mesada_semanal: f64) -> Kid {
    let created = Utc::now();
    Kid {
        id: id.to_string(),
        parent_id: parent_id.to_string(),
        user_id: None,
        nome: format!("Kid {}", id),
        avatar: None,
        saldo,
        mesada_semanal,
        last_allowance_at: None,
        created_at: created,
        updated_at: created,
        deleted_at: None,
        sync_state: SyncState::Synced,
    }
}

pub fn sample_tx(id: &str, kid_id: &str, tx_type: TxType, amount: f64, created_at: DateTime<Utc>) -> Tx {
    Tx {
        id: id.to_string(),
        kid_id: kid_id.to_string(),
        tx_type,
        amount,
        description: None,
        created_at,
        sync_state: SyncState::Synced,
    }
}

struct FakeAccount {
    user: AuthUser,
    password: String,
}

/// In-memory stand-in for the hosted backend: tables of JSON rows plus a
/// password-based identity service. Failures can be switched on per test.
#[derive(Default)]
pub struct FakeRemote {
    tables: Mutex<HashMap<String, Vec<Value>>>,
    accounts: Mutex<Vec<FakeAccount>>,
    session: Mutex<Option<AuthUser>>,
    fail_all: AtomicBool,
    failing_kids: Mutex<HashSet<String>>,
}

fn unavailable() -> RemoteError {
    RemoteError::Status {
        status: 503,
        body: "service unavailable".to_string(),
    }
}

fn rejected(body: Value) -> RemoteError {
    RemoteError::Status {
        status: 400,
        body: body.to_string(),
    }
}

fn sort_key(row: &Value, column: &str) -> String {
    match row.get(column) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call fails with a 503 while set.
    pub fn set_failing(&self, failing: bool) {
        self.fail_all.store(failing, Ordering::SeqCst);
    }

    /// Updates to this kid's row fail with a 500.
    pub fn fail_updates_for(&self, kid_id: &str) {
        self.failing_kids.lock().unwrap().insert(kid_id.to_string());
    }

    fn check(&self) -> Result<(), RemoteError> {
        if self.fail_all.load(Ordering::SeqCst) {
            Err(unavailable())
        } else {
            Ok(())
        }
    }

    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.tables.lock().unwrap().get(table).cloned().unwrap_or_default()
    }

    /// Insert or replace a kid row.
    pub fn seed_kid(&self, kid: &Kid) {
        let row = KidMapper::to_remote(kid);
        let mut tables = self.tables.lock().unwrap();
        let kids = tables.entry("kids".to_string()).or_default();
        kids.retain(|r| r["id"] != row["id"]);
        kids.push(row);
    }

    fn kid_row(&self, kid_id: &str) -> Option<Value> {
        self.rows("kids")
            .into_iter()
            .find(|r| pick_str(r, &["id"]).as_deref() == Some(kid_id))
    }

    pub fn kid_balance(&self, kid_id: &str) -> Option<f64> {
        self.kid_row(kid_id).and_then(|r| pick_f64(&r, &["balance"]))
    }

    pub fn kid_last_allowance(&self, kid_id: &str) -> Option<DateTime<Utc>> {
        self.kid_row(kid_id).and_then(|r| pick_time(&r, &["last_allowance_at"]))
    }

    fn accept_invitation(&self, token: &str) -> Value {
        let user_id = self.session.lock().unwrap().as_ref().map(|u| u.id.clone());
        let mut tables = self.tables.lock().unwrap();
        let invitations = tables.entry("kid_invitations".to_string()).or_default();
        let Some(invite) = invitations.iter_mut().find(|r| r["token"] == token) else {
            return json!({ "ok": false, "error": "Invitation not found" });
        };
        if invite["status"] != "pending" {
            return json!({ "ok": false, "error": "Invitation already used" });
        }
        invite["status"] = json!("accepted");
        let kid_id = invite["kid_id"].clone();

        if let Some(user_id) = user_id {
            if let Some(kid) = tables
                .entry("kids".to_string())
                .or_default()
                .iter_mut()
                .find(|r| r["id"] == kid_id)
            {
                kid["user_id"] = json!(user_id);
            }
        }
        json!({ "ok": true })
    }
}

#[async_trait]
impl RemoteStore for FakeRemote {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>, RemoteError> {
        self.check()?;
        let mut rows: Vec<Value> = self.rows(table).into_iter().filter(|r| query.matches(r)).collect();
        if let Some((column, ascending)) = &query.order {
            rows.sort_by_key(|r| sort_key(r, column));
            if !ascending {
                rows.reverse();
            }
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn insert(&self, table: &str, row: Value) -> Result<Value, RemoteError> {
        self.check()?;
        let mut row = row;
        if row.get("id").map_or(true, Value::is_null) {
            row["id"] = json!(Uuid::new_v4().to_string());
        }
        if row.get("created_at").map_or(true, Value::is_null) {
            row["created_at"] = json!(Utc::now().to_rfc3339());
        }
        self.tables
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_default()
            .push(row.clone());
        Ok(row)
    }

    async fn update(&self, table: &str, query: &Query, patch: Value) -> Result<Vec<Value>, RemoteError> {
        self.check()?;
        if table == "kids" {
            if let Some(id) = query.eq_value("id") {
                if self.failing_kids.lock().unwrap().contains(id) {
                    return Err(RemoteError::Status {
                        status: 500,
                        body: "update failed".to_string(),
                    });
                }
            }
        }

        let mut tables = self.tables.lock().unwrap();
        let mut updated = Vec::new();
        for row in tables.entry(table.to_string()).or_default().iter_mut() {
            if !query.matches(row) {
                continue;
            }
            if let (Some(target), Some(changes)) = (row.as_object_mut(), patch.as_object()) {
                for (key, value) in changes {
                    target.insert(key.clone(), value.clone());
                }
            }
            updated.push(row.clone());
        }
        Ok(updated)
    }

    async fn upsert(&self, table: &str, rows: Vec<Value>) -> Result<(), RemoteError> {
        self.check()?;
        let key = if table == "prefs" { "owner_id" } else { "id" };
        let mut tables = self.tables.lock().unwrap();
        let stored = tables.entry(table.to_string()).or_default();
        for row in rows {
            match stored.iter_mut().find(|r| r[key] == row[key]) {
                Some(existing) => {
                    if let (Some(target), Some(changes)) = (existing.as_object_mut(), row.as_object()) {
                        for (k, v) in changes {
                            target.insert(k.clone(), v.clone());
                        }
                    }
                }
                None => stored.push(row),
            }
        }
        Ok(())
    }

    async fn delete(&self, table: &str, query: &Query) -> Result<(), RemoteError> {
        self.check()?;
        if let Some(rows) = self.tables.lock().unwrap().get_mut(table) {
            rows.retain(|r| !query.matches(r));
        }
        Ok(())
    }

    async fn rpc(&self, function: &str, args: Value) -> Result<Value, RemoteError> {
        self.check()?;
        match function {
            "accept_kid_invitation" => {
                let token = args["p_token"].as_str().unwrap_or_default().to_string();
                Ok(self.accept_invitation(&token))
            }
            other => Err(RemoteError::Status {
                status: 404,
                body: json!({ "message": format!("function {} not found", other) }).to_string(),
            }),
        }
    }
}

#[async_trait]
impl RemoteAuth for FakeRemote {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<AuthUser, RemoteError> {
        self.check()?;
        let accounts = self.accounts.lock().unwrap();
        let account = accounts
            .iter()
            .find(|a| {
                a.user.email.as_deref().is_some_and(|e| e.eq_ignore_ascii_case(email)) && a.password == password
            })
            .ok_or_else(|| rejected(json!({ "error_description": "Invalid login credentials" })))?;
        *self.session.lock().unwrap() = Some(account.user.clone());
        Ok(account.user.clone())
    }

    async fn sign_up(&self, email: &str, password: &str, _metadata: Value) -> Result<AuthUser, RemoteError> {
        self.check()?;
        let mut accounts = self.accounts.lock().unwrap();
        if accounts
            .iter()
            .any(|a| a.user.email.as_deref().is_some_and(|e| e.eq_ignore_ascii_case(email)))
        {
            return Err(rejected(json!({ "msg": "User already registered" })));
        }
        let user = AuthUser {
            id: Uuid::new_v4().to_string(),
            email: Some(email.to_lowercase()),
        };
        accounts.push(FakeAccount {
            user: user.clone(),
            password: password.to_string(),
        });
        *self.session.lock().unwrap() = Some(user.clone());
        Ok(user)
    }

    async fn sign_out(&self) -> Result<(), RemoteError> {
        self.check()?;
        *self.session.lock().unwrap() = None;
        Ok(())
    }

    async fn current_auth_user(&self) -> Result<Option<AuthUser>, RemoteError> {
        self.check()?;
        Ok(self.session.lock().unwrap().clone())
    }
}

/// A fully wired [`AppContext`] over a temporary directory, the in-memory
/// remote and a clock that only moves when told to. Starts online.
pub struct TestApp {
    pub context: AppContext,
    pub remote: Arc<FakeRemote>,
    pub connectivity: ConnectivityMonitor,
    pub clock: Arc<FixedClock>,
    pub connection: LocalConnection,
    _env: TestEnvironment,
}

impl TestApp {
    /// `with_remote` decides whether remote credentials are configured.
    pub async fn new(mode: BackendMode, with_remote: bool) -> Self {
        let env = TestEnvironment::new().expect("temporary data directory");
        let config = AppConfig::for_testing(env.base_path.clone(), mode, with_remote);
        let remote = Arc::new(FakeRemote::new());
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap()));
        let connectivity = ConnectivityMonitor::new(true);

        let context = AppContext::with_parts(
            config,
            env.connection.clone(),
            remote.clone(),
            remote.clone(),
            clock.clone(),
            connectivity.clone(),
        );
        Self {
            context,
            remote,
            connectivity,
            clock,
            connection: env.connection.clone(),
            _env: env,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_cleanup() -> Result<()> {
        let base_path;
        {
            let env = TestEnvironment::new()?;
            base_path = env.base_path.clone();
            assert!(base_path.exists());
        }
        assert!(!base_path.exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_fake_remote_filters_and_orders() {
        let remote = FakeRemote::new();
        remote.seed_kid(&sample_kid("a", "p1", 1.0, 0.0));
        remote.seed_kid(&sample_kid("b", "p2", 2.0, 0.0));

        let rows = remote
            .select("kids", &Query::new().eq("parent_id", "p1").is_null("deleted_at"))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);

        remote.set_failing(true);
        assert!(remote.select("kids", &Query::new()).await.is_err());
    }
}
