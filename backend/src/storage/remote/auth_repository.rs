use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::info;
use serde_json::{json, Map, Value};
use shared::{Outcome, SignUpRequest, User, UserPatch};

use super::{map_rows, tables};
use crate::storage::mappers::UserMapper;
use crate::storage::traits::{Query, RemoteAuth, RemoteError, RemoteStore};

/// Remote identity: GoTrue accounts plus the `profiles` table.
///
/// Requests the server refuses (bad password, e-mail taken) come back as a
/// declined [`Outcome`]; only transport and server failures are errors.
#[derive(Clone)]
pub struct RemoteAuthRepository {
    auth: Arc<dyn RemoteAuth>,
    store: Arc<dyn RemoteStore>,
}

fn declined_or_err<T>(err: RemoteError) -> Result<Outcome<T>, RemoteError> {
    if err.is_rejection() {
        Ok(Outcome::declined(err.user_message()))
    } else {
        Err(err)
    }
}

impl RemoteAuthRepository {
    pub fn new(auth: Arc<dyn RemoteAuth>, store: Arc<dyn RemoteStore>) -> Self {
        Self { auth, store }
    }

    pub async fn profile(&self, user_id: &str) -> Result<Option<User>, RemoteError> {
        let query = Query::new().eq("id", user_id).limit(1);
        let rows = self.store.select(tables::PROFILES, &query).await?;
        Ok(map_rows(tables::PROFILES, &rows, UserMapper::from_profile)
            .into_iter()
            .next())
    }

    pub async fn current_user(&self) -> Result<Option<User>, RemoteError> {
        match self.auth.current_auth_user().await? {
            Some(auth_user) => self.profile(&auth_user.id).await,
            None => Ok(None),
        }
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Outcome<User>, RemoteError> {
        let auth_user = match self.auth.sign_in_with_password(email.trim(), password).await {
            Ok(user) => user,
            Err(e) => return declined_or_err(e),
        };
        match self.profile(&auth_user.id).await? {
            Some(user) => {
                info!("Remote sign-in for user {}", user.id);
                Ok(Outcome::success(user))
            }
            None => Ok(Outcome::declined("Profile not found for this account")),
        }
    }

    pub async fn sign_up(&self, request: &SignUpRequest, now: DateTime<Utc>) -> Result<Outcome<User>, RemoteError> {
        let birthdate = request.birthdate.map(|d| d.format("%Y-%m-%d").to_string());
        let metadata = json!({
            "name": request.name.trim(),
            "role": request.role.as_str(),
            "birthdate": birthdate,
        });
        let auth_user = match self
            .auth
            .sign_up(request.email.trim(), &request.password, metadata)
            .await
        {
            Ok(user) => user,
            Err(e) => return declined_or_err(e),
        };

        let user = User {
            id: auth_user.id,
            name: request.name.trim().to_string(),
            email: auth_user.email.unwrap_or_else(|| request.email.trim().to_string()),
            role: request.role,
            birthdate: request.birthdate,
            avatar_url: None,
            created_at: Some(now),
        };
        self.store
            .upsert(tables::PROFILES, vec![UserMapper::to_profile(&user)])
            .await?;
        info!("Registered remote account {} ({})", user.id, user.role);
        Ok(Outcome::success(user))
    }

    pub async fn sign_out(&self) -> Result<(), RemoteError> {
        self.auth.sign_out().await
    }

    pub async fn update_user(&self, user_id: &str, patch: &UserPatch) -> Result<Outcome<User>, RemoteError> {
        let mut row = Map::new();
        if let Some(name) = &patch.name {
            row.insert("name".to_string(), json!(name.trim()));
        }
        if let Some(email) = &patch.email {
            row.insert("email".to_string(), json!(email.trim()));
        }
        if let Some(birthdate) = &patch.birthdate {
            row.insert(
                "birthdate".to_string(),
                json!(birthdate.map(|d| d.format("%Y-%m-%d").to_string())),
            );
        }
        if let Some(avatar_url) = &patch.avatar_url {
            row.insert("avatar_url".to_string(), json!(avatar_url));
        }

        let query = Query::new().eq("id", user_id);
        let rows = match self.store.update(tables::PROFILES, &query, Value::Object(row)).await {
            Ok(rows) => rows,
            Err(e) => return declined_or_err(e),
        };
        Ok(match map_rows(tables::PROFILES, &rows, UserMapper::from_profile).into_iter().next() {
            Some(user) => Outcome::success(user),
            None => Outcome::declined("User not found"),
        })
    }
}
