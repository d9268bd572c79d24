use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use shared::{round_cents, Kid, KidPatch, SyncState};

use super::{pick, pick_f64, pick_id, pick_str, pick_time, time_to_value};

/// Mapper between the canonical `Kid` and its stored forms.
pub struct KidMapper;

impl KidMapper {
    /// Columns requested from the remote `kids` table.
    pub const REMOTE_COLUMNS: &'static str =
        "id,name,avatar,balance,weekly_allowance,parent_id,user_id,last_allowance_at,created_at,updated_at,deleted_at";

    /// Parse a local record. Older clients stored both naming conventions side
    /// by side; either is accepted here.
    pub fn from_local(row: &Value) -> Option<Kid> {
        let id = pick_id(row, &["id"])?;
        let parent_id = pick_id(row, &["parentId", "parent_id"])?;
        let created_at = pick_time(row, &["createdAt", "created_at"]);
        let updated_at = pick_time(row, &["updatedAt", "updated_at"]);
        let fallback_time = created_at.or(updated_at).unwrap_or_else(Utc::now);

        let sync_state = pick(row, &["syncState"])
            .and_then(|v| serde_json::from_value::<SyncState>(v.clone()).ok())
            .unwrap_or_default();

        Some(Kid {
            id,
            parent_id,
            user_id: pick_id(row, &["userId", "user_id"]),
            nome: pick_str(row, &["nome", "name"]).unwrap_or_default(),
            avatar: pick_str(row, &["avatar"]),
            saldo: round_cents(pick_f64(row, &["saldo", "balance"]).unwrap_or(0.0)),
            mesada_semanal: round_cents(
                pick_f64(row, &["mesadaSemanal", "mesada_semanal", "weekly_allowance"]).unwrap_or(0.0),
            ),
            last_allowance_at: pick_time(row, &["lastAllowanceAt", "last_allowance_at"]),
            created_at: created_at.unwrap_or(fallback_time),
            updated_at: updated_at.unwrap_or(fallback_time),
            deleted_at: pick_time(row, &["deletedAt", "deleted_at"]),
            sync_state,
        })
    }

    /// Local record, camelCase only.
    pub fn to_local(kid: &Kid) -> Value {
        json!({
            "id": kid.id,
            "parentId": kid.parent_id,
            "userId": kid.user_id,
            "nome": kid.nome,
            "avatar": kid.avatar,
            "saldo": kid.saldo,
            "mesadaSemanal": kid.mesada_semanal,
            "lastAllowanceAt": time_to_value(kid.last_allowance_at),
            "createdAt": kid.created_at.to_rfc3339(),
            "updatedAt": kid.updated_at.to_rfc3339(),
            "deletedAt": time_to_value(kid.deleted_at),
            "syncState": kid.sync_state,
        })
    }

    /// Parse a remote row. Rows without an id or owner are rejected.
    pub fn from_remote(row: &Value) -> Option<Kid> {
        let id = pick_id(row, &["id"])?;
        let parent_id = pick_id(row, &["parent_id"])?;
        let created_at = pick_time(row, &["created_at"]);
        let updated_at = pick_time(row, &["updated_at"]);
        let fallback_time = created_at.or(updated_at).unwrap_or_else(Utc::now);

        Some(Kid {
            id,
            parent_id,
            user_id: pick_id(row, &["user_id"]),
            nome: pick_str(row, &["name", "nome"]).unwrap_or_default(),
            avatar: pick_str(row, &["avatar"]),
            saldo: round_cents(pick_f64(row, &["balance", "saldo"]).unwrap_or(0.0)),
            mesada_semanal: round_cents(
                pick_f64(row, &["weekly_allowance", "mesada_semanal"]).unwrap_or(0.0),
            ),
            last_allowance_at: pick_time(row, &["last_allowance_at"]),
            created_at: created_at.unwrap_or(fallback_time),
            updated_at: updated_at.unwrap_or(fallback_time),
            deleted_at: pick_time(row, &["deleted_at"]),
            sync_state: SyncState::Synced,
        })
    }

    /// Full remote row for an insert.
    pub fn to_remote(kid: &Kid) -> Value {
        json!({
            "id": kid.id,
            "parent_id": kid.parent_id,
            "user_id": kid.user_id,
            "name": kid.nome,
            "avatar": kid.avatar,
            "balance": kid.saldo,
            "weekly_allowance": kid.mesada_semanal,
            "last_allowance_at": time_to_value(kid.last_allowance_at),
            "created_at": kid.created_at.to_rfc3339(),
            "updated_at": kid.updated_at.to_rfc3339(),
        })
    }

    /// Remote columns touched by a patch.
    pub fn patch_to_remote(patch: &KidPatch, now: DateTime<Utc>) -> Value {
        let mut row = Map::new();
        if let Some(nome) = &patch.nome {
            row.insert("name".to_string(), json!(nome.trim()));
        }
        if let Some(avatar) = &patch.avatar {
            row.insert("avatar".to_string(), json!(avatar));
        }
        if let Some(user_id) = &patch.user_id {
            row.insert("user_id".to_string(), json!(user_id));
        }
        if let Some(weekly) = patch.mesada_semanal {
            row.insert("weekly_allowance".to_string(), json!(round_cents(weekly)));
        }
        row.insert("updated_at".to_string(), json!(now.to_rfc3339()));
        Value::Object(row)
    }
}
