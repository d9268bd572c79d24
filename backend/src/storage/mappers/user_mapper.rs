use serde_json::{json, Value};
use shared::{Role, User};

use super::{pick_date, pick_id, pick_str, pick_time, time_to_value};

/// Mapper between `User` and the remote `profiles` table.
pub struct UserMapper;

impl UserMapper {
    pub fn from_profile(row: &Value) -> Option<User> {
        Some(User {
            id: pick_id(row, &["id"])?,
            name: pick_str(row, &["name"]).unwrap_or_default(),
            email: pick_str(row, &["email"]).unwrap_or_default(),
            role: pick_str(row, &["role"]).and_then(|r| Role::parse(&r))?,
            birthdate: pick_date(row, &["birthdate"]),
            avatar_url: pick_str(row, &["avatar_url"]),
            created_at: pick_time(row, &["created_at"]),
        })
    }

    pub fn to_profile(user: &User) -> Value {
        json!({
            "id": user.id,
            "name": user.name,
            "email": user.email,
            "role": user.role.as_str(),
            "birthdate": user.birthdate.map(|d| d.format("%Y-%m-%d").to_string()),
            "avatar_url": user.avatar_url,
            "created_at": time_to_value(user.created_at),
        })
    }
}
