//! # Remote Storage Module
//!
//! Typed access to the hosted tables, one repository per entity, all on top of
//! the [`RemoteStore`] trait. Every method either returns mapped domain values
//! or a [`RemoteError`]; none of them touch the local cache.

pub mod auth_repository;
pub mod client;
pub mod kid_repository;
pub mod prefs_repository;
pub mod reward_repository;
pub mod transaction_repository;

pub use auth_repository::RemoteAuthRepository;
pub use client::SupabaseClient;
pub use kid_repository::RemoteKidRepository;
pub use prefs_repository::RemotePrefsRepository;
pub use reward_repository::RemoteRewardRepository;
pub use transaction_repository::RemoteTransactionRepository;

use async_trait::async_trait;
use serde_json::Value;

use crate::storage::traits::{AuthUser, Query, RemoteAuth, RemoteError, RemoteStore};

/// Table names in the hosted schema.
pub mod tables {
    pub const KIDS: &str = "kids";
    pub const TRANSACTIONS: &str = "transactions";
    pub const REWARDS: &str = "rewards";
    pub const REDEMPTIONS: &str = "redemptions";
    pub const PROFILES: &str = "profiles";
    pub const PREFS: &str = "prefs";
    pub const KID_INVITATIONS: &str = "kid_invitations";
}

/// Stand-in used when no remote credentials are configured. Every call fails
/// with [`RemoteError::NotConfigured`].
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledRemote;

#[async_trait]
impl RemoteStore for DisabledRemote {
    async fn select(&self, _table: &str, _query: &Query) -> Result<Vec<Value>, RemoteError> {
        Err(RemoteError::NotConfigured)
    }

    async fn insert(&self, _table: &str, _row: Value) -> Result<Value, RemoteError> {
        Err(RemoteError::NotConfigured)
    }

    async fn update(&self, _table: &str, _query: &Query, _patch: Value) -> Result<Vec<Value>, RemoteError> {
        Err(RemoteError::NotConfigured)
    }

    async fn upsert(&self, _table: &str, _rows: Vec<Value>) -> Result<(), RemoteError> {
        Err(RemoteError::NotConfigured)
    }

    async fn delete(&self, _table: &str, _query: &Query) -> Result<(), RemoteError> {
        Err(RemoteError::NotConfigured)
    }

    async fn rpc(&self, _function: &str, _args: Value) -> Result<Value, RemoteError> {
        Err(RemoteError::NotConfigured)
    }
}

#[async_trait]
impl RemoteAuth for DisabledRemote {
    async fn sign_in_with_password(&self, _email: &str, _password: &str) -> Result<AuthUser, RemoteError> {
        Err(RemoteError::NotConfigured)
    }

    async fn sign_up(&self, _email: &str, _password: &str, _metadata: Value) -> Result<AuthUser, RemoteError> {
        Err(RemoteError::NotConfigured)
    }

    async fn sign_out(&self) -> Result<(), RemoteError> {
        Ok(())
    }

    async fn current_auth_user(&self) -> Result<Option<AuthUser>, RemoteError> {
        Ok(None)
    }
}

/// Map rows with `parse`, logging and dropping the ones that don't fit.
pub(crate) fn map_rows<T>(table: &str, rows: &[Value], parse: impl Fn(&Value) -> Option<T>) -> Vec<T> {
    let mapped: Vec<T> = rows.iter().filter_map(parse).collect();
    if mapped.len() < rows.len() {
        log::warn!(
            "Skipped {} malformed rows from remote table {}",
            rows.len() - mapped.len(),
            table
        );
    }
    mapped
}
