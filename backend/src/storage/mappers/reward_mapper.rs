use serde_json::{json, Value};
use shared::{round_cents, Redemption, RedemptionStatus, Reward, RewardTag};

use super::{pick, pick_f64, pick_id, pick_str, pick_time, time_to_value};

fn parse_tag(row: &Value) -> Option<RewardTag> {
    pick(row, &["tag"]).and_then(|v| serde_json::from_value(v.clone()).ok())
}

fn tag_value(tag: Option<RewardTag>) -> Value {
    tag.and_then(|t| serde_json::to_value(t).ok())
        .unwrap_or(Value::Null)
}

/// Mapper between `Reward` and its stored forms.
pub struct RewardMapper;

impl RewardMapper {
    pub fn from_local(row: &Value) -> Option<Reward> {
        Some(Reward {
            id: pick_id(row, &["id"])?,
            parent_id: pick_str(row, &["parentId", "parent_id"]).unwrap_or_default(),
            title: pick_str(row, &["title"])?,
            desc: pick_str(row, &["desc", "description"]),
            price: round_cents(pick_f64(row, &["price"])?),
            tag: parse_tag(row),
            created_at: pick_time(row, &["createdAt", "created_at"]),
        })
    }

    pub fn to_local(reward: &Reward) -> Value {
        json!({
            "id": reward.id,
            "parentId": reward.parent_id,
            "title": reward.title,
            "desc": reward.desc,
            "price": reward.price,
            "tag": tag_value(reward.tag),
            "createdAt": time_to_value(reward.created_at),
        })
    }

    pub fn from_remote(row: &Value) -> Option<Reward> {
        Some(Reward {
            id: pick_id(row, &["id"])?,
            parent_id: pick_id(row, &["parent_id"])?,
            title: pick_str(row, &["title"])?,
            desc: pick_str(row, &["desc", "description"]),
            price: round_cents(pick_f64(row, &["price"])?),
            tag: parse_tag(row),
            created_at: pick_time(row, &["created_at"]),
        })
    }

    pub fn to_remote(reward: &Reward) -> Value {
        json!({
            "id": reward.id,
            "parent_id": reward.parent_id,
            "title": reward.title,
            "desc": reward.desc,
            "price": reward.price,
            "tag": tag_value(reward.tag),
        })
    }
}

/// Mapper between `Redemption` and its stored forms.
pub struct RedemptionMapper;

impl RedemptionMapper {
    fn parse_status(row: &Value) -> RedemptionStatus {
        pick(row, &["status"])
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }

    pub fn from_local(row: &Value) -> Option<Redemption> {
        Some(Redemption {
            id: pick_id(row, &["id"])?,
            kid_id: pick_id(row, &["kidId", "kid_id"])?,
            reward_id: pick_str(row, &["rewardId", "reward_id"]).unwrap_or_default(),
            title: pick_str(row, &["title"]).unwrap_or_default(),
            price: round_cents(pick_f64(row, &["price"])?),
            status: Self::parse_status(row),
            created_at: pick_time(row, &["createdAt", "created_at"])?,
        })
    }

    pub fn to_local(redemption: &Redemption) -> Value {
        json!({
            "id": redemption.id,
            "kidId": redemption.kid_id,
            "rewardId": redemption.reward_id,
            "title": redemption.title,
            "price": redemption.price,
            "status": redemption.status,
            "createdAt": redemption.created_at.to_rfc3339(),
        })
    }

    pub fn from_remote(row: &Value) -> Option<Redemption> {
        Some(Redemption {
            id: pick_id(row, &["id"])?,
            kid_id: pick_id(row, &["kid_id"])?,
            reward_id: pick_str(row, &["reward_id"]).unwrap_or_default(),
            title: pick_str(row, &["title"]).unwrap_or_default(),
            price: round_cents(pick_f64(row, &["price"])?),
            status: Self::parse_status(row),
            created_at: pick_time(row, &["created_at"])?,
        })
    }

    pub fn to_remote(redemption: &Redemption) -> Value {
        json!({
            "id": redemption.id,
            "kid_id": redemption.kid_id,
            "reward_id": redemption.reward_id,
            "title": redemption.title,
            "price": redemption.price,
            "status": redemption.status,
            "created_at": redemption.created_at.to_rfc3339(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reward_tag_is_optional() {
        let row = json!({"id": "r1", "parent_id": "p1", "title": "Livro", "price": 20, "tag": "educacao"});
        assert_eq!(RewardMapper::from_remote(&row).unwrap().tag, Some(RewardTag::Educacao));

        let row = json!({"id": "r1", "parent_id": "p1", "title": "Livro", "price": 20, "tag": "???"});
        let reward = RewardMapper::from_remote(&row).unwrap();
        assert_eq!(reward.tag, None);
        assert_eq!(RewardMapper::to_remote(&reward)["tag"], Value::Null);
    }

    #[test]
    fn test_redemption_status_defaults_to_approved() {
        let row = json!({
            "id": "x1",
            "kid_id": "k1",
            "reward_id": "r1",
            "title": "Livro",
            "price": 20,
            "created_at": "2024-03-01T10:00:00Z"
        });
        let redemption = RedemptionMapper::from_remote(&row).unwrap();
        assert_eq!(redemption.status, RedemptionStatus::Approved);
        assert_eq!(RedemptionMapper::to_local(&redemption)["status"], "approved");
    }
}
