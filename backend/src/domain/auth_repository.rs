//! # Auth Repository
//!
//! Sign-in, sign-up and profile edits against the hosted identity service,
//! with local accounts as the offline and development fallback.
//!
//! A request the server refuses (wrong password, e-mail taken) is an answer,
//! not an outage: it comes back as a declined [`Outcome`] and the local
//! accounts are not consulted. Only transport and server failures fall back.
//!
//! A successful sign-in or sign-up also records the active identity. Signing
//! in as someone else wipes the previous user's cached documents.

use std::sync::Arc;

use anyhow::Result;
use log::{info, warn};
use shared::{Outcome, Role, SignUpRequest, User, UserPatch};
use tokio::sync::broadcast;

use super::clock::Clock;
use super::events::{ChangeFeed, SessionEvent};
use super::fallback::FallbackExecutor;
use super::validation::{normalize_email, validate_name, ValidationError};
use crate::storage::local::LocalUserRepository;
use crate::storage::remote::RemoteAuthRepository;

#[derive(Clone)]
pub struct AuthRepository {
    executor: FallbackExecutor,
    remote: RemoteAuthRepository,
    local: LocalUserRepository,
    clock: Arc<dyn Clock>,
    feed: ChangeFeed<SessionEvent>,
}

fn to_outcome(result: std::result::Result<User, ValidationError>) -> Outcome<User> {
    match result {
        Ok(user) => Outcome::success(user),
        Err(e) => e.into_outcome(),
    }
}

impl AuthRepository {
    pub fn new(
        executor: FallbackExecutor,
        remote: RemoteAuthRepository,
        local: LocalUserRepository,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            executor,
            remote,
            local,
            clock,
            feed: ChangeFeed::new(),
        }
    }

    /// The signed-in user, if any.
    pub async fn current_user(&self) -> Result<Option<User>> {
        let remote = &self.remote;
        let local = &self.local;
        let result = self
            .executor
            .run(
                "auth.current_user",
                move || async move {
                    match remote.current_user().await? {
                        Some(user) => {
                            remember(local, &user);
                            Ok(Some(user))
                        }
                        None => local.current_user(),
                    }
                },
                move || async move { local.current_user() },
            )
            .await?;
        Ok(result.value)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Outcome<User>> {
        if email.trim().is_empty() || password.is_empty() {
            return Ok(ValidationError::MissingCredentials.into_outcome());
        }

        let remote = &self.remote;
        let local = &self.local;
        let result = self
            .executor
            .run(
                "auth.sign_in",
                move || async move {
                    let outcome = remote.sign_in(email, password).await?;
                    if let Some(user) = &outcome.value {
                        remember(local, user);
                        local.set_session(&user.id)?;
                    }
                    Ok(outcome)
                },
                move || async move { Ok(to_outcome(local.sign_in(email, password)?)) },
            )
            .await?;

        self.after_sign_in(result.value)
    }

    pub async fn sign_up(&self, request: SignUpRequest) -> Result<Outcome<User>> {
        let name = match validate_name(&request.name) {
            Ok(name) => name,
            Err(e) => return Ok(e.into_outcome()),
        };
        let email = match normalize_email(&request.email) {
            Ok(email) => email,
            Err(e) => return Ok(e.into_outcome()),
        };
        if request.password.is_empty() {
            return Ok(ValidationError::MissingCredentials.into_outcome());
        }
        let request = SignUpRequest { name, email, ..request };

        let now = self.clock.now();
        let remote = &self.remote;
        let local = &self.local;
        let registration = &request;
        let result = self
            .executor
            .run(
                "auth.sign_up",
                move || async move {
                    let outcome = remote.sign_up(registration, now).await?;
                    if let Some(user) = &outcome.value {
                        remember(local, user);
                        local.set_session(&user.id)?;
                    }
                    Ok(outcome)
                },
                move || async move { Ok(to_outcome(local.sign_up(registration, now)?)) },
            )
            .await?;

        self.after_sign_in(result.value)
    }

    fn after_sign_in(&self, outcome: Outcome<User>) -> Result<Outcome<User>> {
        if let Some(user) = &outcome.value {
            self.set_active_user(&user.id, user.role)?;
            self.feed.publish(SessionEvent::SignedIn(user.clone()));
        }
        Ok(outcome)
    }

    /// End the session everywhere. A remote sign-out failure is logged; the
    /// local session is cleared regardless.
    pub async fn sign_out(&self) -> Result<()> {
        if self.executor.remote_reachable() {
            if let Err(e) = self.remote.sign_out().await {
                warn!("Remote sign-out failed: {}", e);
            }
        }
        self.local.clear_session()?;
        self.local.clear_active_user()?;
        info!("Signed out");
        self.feed.publish(SessionEvent::SignedOut);
        Ok(())
    }

    pub async fn update_user(&self, user_id: &str, mut patch: UserPatch) -> Result<Outcome<User>> {
        if let Some(name) = &patch.name {
            match validate_name(name) {
                Ok(name) => patch.name = Some(name),
                Err(e) => return Ok(e.into_outcome()),
            }
        }
        if let Some(email) = &patch.email {
            match normalize_email(email) {
                Ok(email) => patch.email = Some(email),
                Err(e) => return Ok(e.into_outcome()),
            }
        }

        let remote = &self.remote;
        let local = &self.local;
        let changes = &patch;
        let result = self
            .executor
            .run(
                "auth.update_user",
                move || async move {
                    let outcome = remote.update_user(user_id, changes).await?;
                    if let Some(user) = &outcome.value {
                        remember(local, user);
                    }
                    Ok(outcome)
                },
                move || async move { Ok(to_outcome(local.update(user_id, changes)?)) },
            )
            .await?;

        let outcome = result.value;
        if let Some(user) = &outcome.value {
            self.feed.publish(SessionEvent::ProfileUpdated(user.clone()));
        }
        Ok(outcome)
    }

    /// Record who is using the app. Returns true if a different user's cached
    /// documents were cleared.
    pub fn set_active_user(&self, user_id: &str, role: Role) -> Result<bool> {
        self.local.set_active_user(user_id, role)
    }

    pub fn active_user(&self) -> Result<Option<(String, Role)>> {
        self.local.active_user()
    }

    pub fn clear_active_user(&self) -> Result<()> {
        self.local.clear_active_user()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.feed.subscribe()
    }
}

/// Cache a remote profile for offline reads.
fn remember(local: &LocalUserRepository, user: &User) {
    if let Err(e) = local.remember_profile(user) {
        warn!("Could not cache profile {}: {:#}", user.id, e);
    }
}
