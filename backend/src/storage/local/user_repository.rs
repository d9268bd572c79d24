//! # Local User Repository
//!
//! Offline/dev accounts and the signed-in identity pointer.
//!
//! Accounts are stored under `finedu_users` with a SHA-256 digest of the
//! password salted with the account id; the plaintext is never written. The
//! current session is `finedu_session` (`{userId}`), and the active identity
//! used to scope cached data is `finedu_active_uid` / `finedu_active_role`.

use anyhow::Result;
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use shared::{Role, SignUpRequest, User, UserPatch};
use uuid::Uuid;

use super::connection::LocalConnection;
use super::keys;
use crate::domain::validation::ValidationError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LocalAccount {
    #[serde(flatten)]
    user: User,
    password_digest: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionRecord {
    user_id: String,
}

fn password_digest(user_id: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

fn same_email(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

#[derive(Clone)]
pub struct LocalUserRepository {
    connection: LocalConnection,
}

impl LocalUserRepository {
    pub fn new(connection: LocalConnection) -> Self {
        Self { connection }
    }

    fn accounts(&self) -> Result<Vec<LocalAccount>> {
        self.connection
            .read_rows(keys::USERS, |row| serde_json::from_value(row.clone()).ok())
    }

    pub fn find_by_id(&self, user_id: &str) -> Result<Option<User>> {
        Ok(self
            .accounts()?
            .into_iter()
            .find(|a| a.user.id == user_id)
            .map(|a| a.user))
    }

    pub fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self
            .accounts()?
            .into_iter()
            .find(|a| same_email(&a.user.email, email))
            .map(|a| a.user))
    }

    /// Check credentials and open a session.
    pub fn sign_in(&self, email: &str, password: &str) -> Result<std::result::Result<User, ValidationError>> {
        if email.trim().is_empty() || password.is_empty() {
            return Ok(Err(ValidationError::MissingCredentials));
        }
        let Some(account) = self
            .accounts()?
            .into_iter()
            .find(|a| same_email(&a.user.email, email))
        else {
            return Ok(Err(ValidationError::UserNotFound));
        };
        if account.password_digest != password_digest(&account.user.id, password) {
            return Ok(Err(ValidationError::InvalidCredentials));
        }
        self.set_session(&account.user.id)?;
        info!("Local sign-in for user {}", account.user.id);
        Ok(Ok(account.user))
    }

    /// Register a new account and open a session for it.
    pub fn sign_up(
        &self,
        request: &SignUpRequest,
        now: DateTime<Utc>,
    ) -> Result<std::result::Result<User, ValidationError>> {
        let user = User {
            id: Uuid::new_v4().to_string(),
            name: request.name.trim().to_string(),
            email: request.email.trim().to_string(),
            role: request.role,
            birthdate: request.birthdate,
            avatar_url: None,
            created_at: Some(now),
        };
        let digest = password_digest(&user.id, &request.password);

        let created = self
            .connection
            .update_json(keys::USERS, |current: Option<Vec<Value>>| {
                let mut rows = current.unwrap_or_default();
                let taken = rows
                    .iter()
                    .filter_map(|row| serde_json::from_value::<LocalAccount>(row.clone()).ok())
                    .any(|a| same_email(&a.user.email, &user.email));
                if taken {
                    return Ok((rows, false));
                }
                let account = LocalAccount {
                    user: user.clone(),
                    password_digest: digest,
                };
                rows.insert(0, serde_json::to_value(&account)?);
                Ok((rows, true))
            })?;

        if !created {
            return Ok(Err(ValidationError::DuplicateEmail));
        }
        self.set_session(&user.id)?;
        info!("Created local account {} ({})", user.id, user.role);
        Ok(Ok(user))
    }

    /// Update profile fields of a local account.
    pub fn update(&self, user_id: &str, patch: &UserPatch) -> Result<std::result::Result<User, ValidationError>> {
        self.connection
            .update_json(keys::USERS, |current: Option<Vec<Value>>| {
                let rows = current.unwrap_or_default();
                let mut accounts: Vec<LocalAccount> = rows
                    .iter()
                    .filter_map(|row| serde_json::from_value(row.clone()).ok())
                    .collect();

                if let Some(email) = &patch.email {
                    let conflict = accounts
                        .iter()
                        .any(|a| a.user.id != user_id && same_email(&a.user.email, email));
                    if conflict {
                        return Ok((rows, Err(ValidationError::DuplicateEmail)));
                    }
                }

                let Some(account) = accounts.iter_mut().find(|a| a.user.id == user_id) else {
                    return Ok((rows, Err(ValidationError::UserNotFound)));
                };
                if let Some(name) = &patch.name {
                    account.user.name = name.trim().to_string();
                }
                if let Some(email) = &patch.email {
                    account.user.email = email.trim().to_string();
                }
                if let Some(birthdate) = patch.birthdate {
                    account.user.birthdate = birthdate;
                }
                if let Some(avatar_url) = &patch.avatar_url {
                    account.user.avatar_url = avatar_url.clone();
                }
                let updated = account.user.clone();

                let rows = accounts
                    .iter()
                    .map(serde_json::to_value)
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok((rows, Ok(updated)))
            })
    }

    /// Cache a remote profile so it can be served offline.
    pub fn remember_profile(&self, user: &User) -> Result<()> {
        self.connection
            .update_json(keys::USERS, |current: Option<Vec<Value>>| {
                let mut accounts: Vec<LocalAccount> = current
                    .unwrap_or_default()
                    .iter()
                    .filter_map(|row| serde_json::from_value(row.clone()).ok())
                    .collect();
                match accounts.iter_mut().find(|a| a.user.id == user.id) {
                    Some(account) => account.user = user.clone(),
                    None => accounts.push(LocalAccount {
                        user: user.clone(),
                        password_digest: String::new(),
                    }),
                }
                let rows = accounts
                    .iter()
                    .map(serde_json::to_value)
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok((rows, ()))
            })
    }

    // ----- session -----

    pub fn session_user_id(&self) -> Result<Option<String>> {
        Ok(self
            .connection
            .read_json::<SessionRecord>(keys::SESSION)?
            .map(|s| s.user_id))
    }

    pub fn set_session(&self, user_id: &str) -> Result<()> {
        self.connection.write_json(
            keys::SESSION,
            &SessionRecord {
                user_id: user_id.to_string(),
            },
        )
    }

    pub fn clear_session(&self) -> Result<()> {
        self.connection.remove(keys::SESSION)
    }

    /// The signed-in user according to the local session.
    pub fn current_user(&self) -> Result<Option<User>> {
        match self.session_user_id()? {
            Some(id) => self.find_by_id(&id),
            None => Ok(None),
        }
    }

    // ----- active identity -----

    /// Record the active identity. Switching to a different user wipes the
    /// previous user's cached data first. Returns true if caches were cleared.
    pub fn set_active_user(&self, user_id: &str, role: Role) -> Result<bool> {
        let previous = self.connection.read_json::<String>(keys::ACTIVE_UID)?;
        let switched = previous.as_deref().is_some_and(|prev| prev != user_id);
        if switched {
            let mut cleared = 0;
            for key in self.connection.keys_with_prefix(keys::PREFIX)? {
                if keys::is_user_scoped(&key) {
                    self.connection.remove(&key)?;
                    cleared += 1;
                }
            }
            warn!("Active user changed; cleared {} cached documents", cleared);
        }
        self.connection.write_json(keys::ACTIVE_UID, user_id)?;
        self.connection.write_json(keys::ACTIVE_ROLE, &role)?;
        Ok(switched)
    }

    pub fn active_user(&self) -> Result<Option<(String, Role)>> {
        let uid = self.connection.read_json::<String>(keys::ACTIVE_UID)?;
        let role = self.connection.read_json::<Role>(keys::ACTIVE_ROLE)?;
        Ok(uid.zip(role))
    }

    pub fn clear_active_user(&self) -> Result<()> {
        self.connection.remove(keys::ACTIVE_UID)?;
        self.connection.remove(keys::ACTIVE_ROLE)
    }
}
