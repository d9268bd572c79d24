use anyhow::Result;
use shared::Prefs;

use super::connection::LocalConnection;
use super::keys;

/// Preferences per owner under `finedu_prefs_<ownerId>`.
#[derive(Clone)]
pub struct LocalPrefsRepository {
    connection: LocalConnection,
}

impl LocalPrefsRepository {
    pub fn new(connection: LocalConnection) -> Self {
        Self { connection }
    }

    /// Stored preferences, or defaults when none were saved.
    pub fn get(&self, owner_id: &str) -> Result<Prefs> {
        Ok(self
            .connection
            .read_json::<Prefs>(&keys::prefs(owner_id))?
            .unwrap_or_default())
    }

    pub fn set(&self, owner_id: &str, prefs: &Prefs) -> Result<()> {
        self.connection.write_json(&keys::prefs(owner_id), prefs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_utils::TestEnvironment;

    #[test]
    fn test_prefs_default_then_persist() {
        let env = TestEnvironment::new().unwrap();
        let repo = LocalPrefsRepository::new(env.connection.clone());

        assert_eq!(repo.get("u1").unwrap(), Prefs::default());
        let quiet = Prefs { sound: false, notifications: true };
        repo.set("u1", &quiet).unwrap();
        assert_eq!(repo.get("u1").unwrap(), quiet);
        assert_eq!(repo.get("u2").unwrap(), Prefs::default());
    }
}
