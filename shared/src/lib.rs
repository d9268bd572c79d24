//! Canonical domain types for the finedu family allowance app.
//!
//! These types are shared between the sync core and any UI layer. They are the
//! single runtime representation of each entity: the storage boundaries in the
//! backend translate to and from the local and remote formats, so neither naming
//! convention ever leaks into these structs.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Round a currency value to whole cents.
pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Current time as epoch milliseconds, used to stamp queue items.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Parent,
    Child,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Parent => "parent",
            Role::Child => "child",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "parent" => Some(Role::Parent),
            "child" => Some(Role::Child),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A signed-in identity. Role is fixed at registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub birthdate: Option<NaiveDate>,
    pub avatar_url: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Registration input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignUpRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
    pub birthdate: Option<NaiveDate>,
}

/// Profile changes. `None` leaves a field untouched; `Some(None)` clears an
/// optional one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub birthdate: Option<Option<NaiveDate>>,
    pub avatar_url: Option<Option<String>>,
}

// ---------------------------------------------------------------------------
// Sync state
// ---------------------------------------------------------------------------

/// Whether a cached record is known to match the remote store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    /// Last write was confirmed by the remote store.
    #[default]
    Synced,
    /// Written locally only; the remote store has not seen it yet.
    Pending,
    /// A replay was attempted and failed; it stays queued.
    Failed,
}

impl SyncState {
    pub fn is_synced(&self) -> bool {
        matches!(self, SyncState::Synced)
    }
}

// ---------------------------------------------------------------------------
// Kids
// ---------------------------------------------------------------------------

/// A child's financial profile.
///
/// `saldo` is only ever changed by a transaction-recording credit or debit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Kid {
    pub id: String,
    pub parent_id: String,
    pub user_id: Option<String>,
    pub nome: String,
    pub avatar: Option<String>,
    pub saldo: f64,
    pub mesada_semanal: f64,
    pub last_allowance_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sync_state: SyncState,
}

impl Kid {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Input for creating a kid. New kids always start with a zero balance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewKid {
    pub parent_id: String,
    pub user_id: Option<String>,
    pub nome: String,
    pub avatar: Option<String>,
    pub mesada_semanal: f64,
}

/// Editable kid fields. The owning parent and the balance are not editable here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KidPatch {
    pub nome: Option<String>,
    pub avatar: Option<Option<String>>,
    pub user_id: Option<Option<String>>,
    pub mesada_semanal: Option<f64>,
}

impl KidPatch {
    pub fn is_empty(&self) -> bool {
        self.nome.is_none()
            && self.avatar.is_none()
            && self.user_id.is_none()
            && self.mesada_semanal.is_none()
    }
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxType {
    Mesada,
    Extra,
    Redeem,
    Gasto,
    Guardar,
    Investir,
    Recompensa,
    Meta,
    Outro,
}

impl TxType {
    pub const ALL: [TxType; 9] = [
        TxType::Mesada,
        TxType::Extra,
        TxType::Redeem,
        TxType::Gasto,
        TxType::Guardar,
        TxType::Investir,
        TxType::Recompensa,
        TxType::Meta,
        TxType::Outro,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TxType::Mesada => "mesada",
            TxType::Extra => "extra",
            TxType::Redeem => "redeem",
            TxType::Gasto => "gasto",
            TxType::Guardar => "guardar",
            TxType::Investir => "investir",
            TxType::Recompensa => "recompensa",
            TxType::Meta => "meta",
            TxType::Outro => "outro",
        }
    }

    /// Parse a stored type; unknown values fall into `Outro`.
    pub fn parse_lenient(value: &str) -> Self {
        TxType::ALL
            .into_iter()
            .find(|t| t.as_str() == value.trim().to_lowercase())
            .unwrap_or(TxType::Outro)
    }
}

/// An immutable ledger entry. Positive amounts credit, negative debit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tx {
    pub id: String,
    pub kid_id: String,
    #[serde(rename = "type")]
    pub tx_type: TxType,
    pub amount: f64,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub sync_state: SyncState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTx {
    pub kid_id: String,
    #[serde(rename = "type")]
    pub tx_type: TxType,
    pub amount: f64,
    pub description: Option<String>,
}

/// Sum of a kid's transactions over a window, overall and per type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxTotals {
    pub total: f64,
    pub by_type: BTreeMap<TxType, f64>,
}

// ---------------------------------------------------------------------------
// Rewards
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RewardTag {
    Diversao,
    Educacao,
    Saude,
    Custom,
}

/// A catalog entry, scoped to one family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reward {
    pub id: String,
    pub parent_id: String,
    pub title: String,
    pub desc: Option<String>,
    pub price: f64,
    pub tag: Option<RewardTag>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RedemptionStatus {
    #[default]
    Approved,
    Pending,
    Denied,
}

/// A reward exchange. Title and price are copied from the reward at redeem time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Redemption {
    pub id: String,
    pub kid_id: String,
    pub reward_id: String,
    pub title: String,
    pub price: f64,
    pub status: RedemptionStatus,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Preferences
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prefs {
    pub sound: bool,
    pub notifications: bool,
}

impl Default for Prefs {
    fn default() -> Self {
        Self {
            sound: true,
            notifications: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Invitations
// ---------------------------------------------------------------------------

/// A freshly created account-linking invitation for a kid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invitation {
    pub id: String,
    pub token: String,
    pub url: String,
}

// ---------------------------------------------------------------------------
// Sync queue
// ---------------------------------------------------------------------------

/// A remote mutation waiting to be replayed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum QueueItem {
    #[serde(rename = "kids.update_balance", rename_all = "camelCase")]
    UpdateBalance {
        kid_id: String,
        parent_id: String,
        new_balance: f64,
        ts: i64,
    },
    #[serde(rename = "kids.mark_allowance", rename_all = "camelCase")]
    MarkAllowance {
        kid_id: String,
        #[serde(rename = "whenISO")]
        when_iso: DateTime<Utc>,
        ts: i64,
    },
}

impl QueueItem {
    pub fn kind(&self) -> &'static str {
        match self {
            QueueItem::UpdateBalance { .. } => "kids.update_balance",
            QueueItem::MarkAllowance { .. } => "kids.mark_allowance",
        }
    }

    pub fn kid_id(&self) -> &str {
        match self {
            QueueItem::UpdateBalance { kid_id, .. } => kid_id,
            QueueItem::MarkAllowance { kid_id, .. } => kid_id,
        }
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Result of a UI-facing operation: either a value or a user-presentable
/// reason it was declined. Unexpected failures travel as `Err` instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome<T> {
    pub ok: bool,
    pub error: Option<String>,
    pub value: Option<T>,
}

impl<T> Outcome<T> {
    pub fn success(value: T) -> Self {
        Self {
            ok: true,
            error: None,
            value: Some(value),
        }
    }

    pub fn declined(reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(reason.into()),
            value: None,
        }
    }

    pub fn into_result(self) -> Result<T, String> {
        match (self.ok, self.value) {
            (true, Some(value)) => Ok(value),
            _ => Err(self.error.unwrap_or_else(|| "unknown error".to_string())),
        }
    }
}
