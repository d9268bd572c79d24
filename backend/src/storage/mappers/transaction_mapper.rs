use serde_json::{json, Value};
use shared::{round_cents, SyncState, Tx, TxType};

use super::{pick, pick_f64, pick_id, pick_str, pick_time};

/// Mapper between `Tx` and its stored forms.
pub struct TransactionMapper;

impl TransactionMapper {
    pub fn from_local(row: &Value) -> Option<Tx> {
        Some(Tx {
            id: pick_id(row, &["id"])?,
            kid_id: pick_id(row, &["kidId", "kid_id"])?,
            tx_type: TxType::parse_lenient(&pick_str(row, &["type"]).unwrap_or_default()),
            amount: round_cents(pick_f64(row, &["amount"])?),
            description: pick_str(row, &["description"]),
            created_at: pick_time(row, &["createdAt", "created_at"])?,
            sync_state: pick(row, &["syncState"])
                .and_then(|v| serde_json::from_value(v.clone()).ok())
                .unwrap_or_default(),
        })
    }

    pub fn to_local(tx: &Tx) -> Value {
        json!({
            "id": tx.id,
            "kidId": tx.kid_id,
            "type": tx.tx_type.as_str(),
            "amount": tx.amount,
            "description": tx.description,
            "createdAt": tx.created_at.to_rfc3339(),
            "syncState": tx.sync_state,
        })
    }

    pub fn from_remote(row: &Value) -> Option<Tx> {
        Some(Tx {
            id: pick_id(row, &["id"])?,
            kid_id: pick_id(row, &["kid_id"])?,
            tx_type: TxType::parse_lenient(&pick_str(row, &["type"]).unwrap_or_default()),
            amount: round_cents(pick_f64(row, &["amount"])?),
            description: pick_str(row, &["description"]),
            created_at: pick_time(row, &["created_at"])?,
            sync_state: SyncState::Synced,
        })
    }

    pub fn to_remote(tx: &Tx) -> Value {
        json!({
            "id": tx.id,
            "kid_id": tx.kid_id,
            "type": tx.tx_type.as_str(),
            "amount": tx.amount,
            "description": tx.description,
            "created_at": tx.created_at.to_rfc3339(),
        })
    }
}
