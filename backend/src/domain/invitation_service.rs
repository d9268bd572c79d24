//! Account-linking invitations between a kid profile and a child login.
//!
//! Invitations live only in the remote store. Without it every call answers
//! with a declined [`Outcome`] (or `None`), never an error.

use std::sync::Arc;

use log::{info, warn};
use reqwest::Url;
use serde_json::{json, Value};
use shared::{Invitation, Outcome};
use uuid::Uuid;

use super::clock::Clock;
use super::fallback::FallbackExecutor;
use super::validation::normalize_email;
use crate::storage::mappers::{pick_id, pick_str};
use crate::storage::remote::tables;
use crate::storage::traits::{Query, RemoteError, RemoteStore};

const ACCEPT_RPC: &str = "accept_kid_invitation";
const OFFLINE_MESSAGE: &str = "Invitations need a connection to the server";
const INVALID_INVITATION: &str = "Invalid invitation";

#[derive(Clone)]
pub struct InvitationService {
    executor: FallbackExecutor,
    store: Arc<dyn RemoteStore>,
    clock: Arc<dyn Clock>,
    app_origin: String,
}

impl InvitationService {
    pub fn new(
        executor: FallbackExecutor,
        store: Arc<dyn RemoteStore>,
        clock: Arc<dyn Clock>,
        app_origin: impl Into<String>,
    ) -> Self {
        Self {
            executor,
            store,
            clock,
            app_origin: app_origin.into(),
        }
    }

    /// Invite `child_email` to link their account to `kid_id`.
    pub async fn create_invitation(&self, parent_id: &str, kid_id: &str, child_email: &str) -> Outcome<Invitation> {
        let email = match normalize_email(child_email) {
            Ok(email) => email,
            Err(e) => return e.into_outcome(),
        };
        if !self.executor.remote_reachable() {
            return Outcome::declined(OFFLINE_MESSAGE);
        }

        let id = Uuid::new_v4().to_string();
        let token = Uuid::new_v4().simple().to_string();
        let row = json!({
            "id": id,
            "parent_id": parent_id,
            "kid_id": kid_id,
            "child_email": email,
            "token": token,
            "status": "pending",
            "created_at": self.clock.now().to_rfc3339(),
        });

        let stored = match self.store.insert(tables::KID_INVITATIONS, row).await {
            Ok(stored) => stored,
            Err(e) => {
                warn!("Could not create invitation for kid {}: {}", kid_id, e);
                return Outcome::declined(e.user_message());
            }
        };
        let id = pick_id(&stored, &["id"]).unwrap_or(id);
        let token = pick_id(&stored, &["token"]).unwrap_or(token);

        match self.invite_url(&token) {
            Some(url) => {
                info!("Created invitation {} for kid {}", id, kid_id);
                Outcome::success(Invitation { id, token, url })
            }
            None => Outcome::declined("Invalid application origin for invitation links"),
        }
    }

    fn invite_url(&self, token: &str) -> Option<String> {
        let base = format!("{}/invite", self.app_origin.trim_end_matches('/'));
        Url::parse_with_params(&base, &[("token", token)])
            .map(String::from)
            .ok()
    }

    /// Link the signed-in child account through an invitation token.
    pub async fn accept_invitation(&self, token: &str) -> Outcome<()> {
        let token = token.trim();
        if token.is_empty() {
            return Outcome::declined(INVALID_INVITATION);
        }
        if !self.executor.remote_reachable() {
            return Outcome::declined(OFFLINE_MESSAGE);
        }

        match self.store.rpc(ACCEPT_RPC, json!({ "p_token": token })).await {
            Ok(reply) if reply.get("ok").and_then(Value::as_bool) == Some(true) => {
                info!("Accepted invitation");
                Outcome::success(())
            }
            Ok(reply) => Outcome::declined(
                pick_str(&reply, &["error"]).unwrap_or_else(|| INVALID_INVITATION.to_string()),
            ),
            Err(e) => {
                warn!("Invitation acceptance failed: {}", e);
                Outcome::declined(e.user_message())
            }
        }
    }

    /// E-mail of the child linked to a kid: the account's e-mail when one is
    /// linked, otherwise the most recently invited address.
    pub async fn child_email_for_kid(&self, kid_id: &str) -> Option<String> {
        if kid_id.is_empty() || !self.executor.remote_reachable() {
            return None;
        }
        match self.lookup_child_email(kid_id).await {
            Ok(email) => email,
            Err(e) => {
                warn!("Could not look up child e-mail for kid {}: {}", kid_id, e);
                None
            }
        }
    }

    async fn lookup_child_email(&self, kid_id: &str) -> Result<Option<String>, RemoteError> {
        let kid_query = Query::new().select("user_id").eq("id", kid_id).limit(1);
        let kid_rows = self.store.select(tables::KIDS, &kid_query).await?;
        let user_id = kid_rows.first().and_then(|row| pick_id(row, &["user_id"]));

        if let Some(user_id) = user_id {
            let profile_query = Query::new().select("email").eq("id", user_id).limit(1);
            let profiles = self.store.select(tables::PROFILES, &profile_query).await?;
            if let Some(email) = profiles.first().and_then(|row| pick_id(row, &["email"])) {
                return Ok(Some(email));
            }
        }

        let invite_query = Query::new()
            .select("child_email,status")
            .eq("kid_id", kid_id)
            .order("created_at", false)
            .limit(1);
        let invites = self.store.select(tables::KID_INVITATIONS, &invite_query).await?;
        Ok(invites.first().and_then(|row| pick_id(row, &["child_email"])))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendMode;
    use crate::storage::test_utils::{sample_kid, TestApp};

    #[tokio::test]
    async fn test_create_invitation_builds_link() {
        let app = TestApp::new(BackendMode::Auto, true).await;
        let outcome = app
            .context
            .invitations
            .create_invitation("parent-1", "kid-1", " Leo@Example.com ")
            .await;

        let invitation = outcome.value.unwrap();
        assert_eq!(
            invitation.url,
            format!("http://localhost:5173/invite?token={}", invitation.token)
        );
        let rows = app.remote.rows("kid_invitations");
        assert_eq!(rows[0]["child_email"], "leo@example.com");
        assert_eq!(rows[0]["status"], "pending");
    }

    #[tokio::test]
    async fn test_invitations_are_declined_offline() {
        let app = TestApp::new(BackendMode::Auto, true).await;
        app.connectivity.set_online(false);

        let created = app
            .context
            .invitations
            .create_invitation("parent-1", "kid-1", "leo@example.com")
            .await;
        assert_eq!(created.error.as_deref(), Some(OFFLINE_MESSAGE));
        assert!(!app.context.invitations.accept_invitation("abc").await.ok);
        assert!(app.context.invitations.child_email_for_kid("kid-1").await.is_none());
    }

    #[tokio::test]
    async fn test_invalid_email_is_declined() {
        let app = TestApp::new(BackendMode::Auto, true).await;
        let outcome = app
            .context
            .invitations
            .create_invitation("parent-1", "kid-1", "not-an-email")
            .await;
        assert_eq!(outcome.error.as_deref(), Some("Invalid e-mail address"));
    }

    #[tokio::test]
    async fn test_accept_and_child_email_lookup() {
        let app = TestApp::new(BackendMode::Auto, true).await;
        app.remote.seed_kid(&sample_kid("kid-1", "parent-1", 0.0, 10.0));
        let invitation = app
            .context
            .invitations
            .create_invitation("parent-1", "kid-1", "leo@example.com")
            .await
            .value
            .unwrap();

        assert_eq!(
            app.context.invitations.child_email_for_kid("kid-1").await.as_deref(),
            Some("leo@example.com")
        );
        assert!(app.context.invitations.accept_invitation(&invitation.token).await.ok);
        let again = app.context.invitations.accept_invitation(&invitation.token).await;
        assert_eq!(again.error.as_deref(), Some("Invitation already used"));
    }
}
