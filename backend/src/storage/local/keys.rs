//! Key names in the local namespace. All keys share the `finedu_` prefix.

pub const PREFIX: &str = "finedu_";

pub const KIDS: &str = "finedu_kids";
pub const REWARDS_CATALOG: &str = "finedu_rewards_catalog";
pub const QUEUE: &str = "finedu_queue";
pub const USERS: &str = "finedu_users";
pub const SESSION: &str = "finedu_session";
pub const ACTIVE_UID: &str = "finedu_active_uid";
pub const ACTIVE_ROLE: &str = "finedu_active_role";

pub fn transactions(kid_id: &str) -> String {
    format!("finedu_tx_{}", kid_id)
}

pub fn redemptions(kid_id: &str) -> String {
    format!("finedu_rewards_redeemed_{}", kid_id)
}

pub fn prefs(owner_id: &str) -> String {
    format!("finedu_prefs_{}", owner_id)
}

/// Keys that hold data belonging to whoever is signed in. They are wiped when
/// a different user becomes active. Account records and the queue survive.
pub fn is_user_scoped(key: &str) -> bool {
    key.starts_with(PREFIX) && !matches!(key, USERS | QUEUE | ACTIVE_UID | ACTIVE_ROLE | SESSION)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scoped_keys() {
        assert!(is_user_scoped(KIDS));
        assert!(is_user_scoped(&transactions("k1")));
        assert!(is_user_scoped(&prefs("u1")));
        assert!(!is_user_scoped(USERS));
        assert!(!is_user_scoped(QUEUE));
        assert!(!is_user_scoped(ACTIVE_UID));
        assert!(!is_user_scoped("other"));
    }
}
