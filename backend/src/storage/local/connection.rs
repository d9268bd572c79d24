use anyhow::{anyhow, Context, Result};
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// LocalConnection owns the on-disk key-value namespace.
///
/// Each key maps to one JSON document `<base>/<key>.json`. Writes go through a
/// temp file and a rename so a crash never leaves a half-written document.
#[derive(Clone)]
pub struct LocalConnection {
    base_directory: Arc<PathBuf>,
    write_lock: Arc<Mutex<()>>,
}

impl LocalConnection {
    /// Create a new connection rooted at `base_directory`, creating it if needed
    pub fn new<P: AsRef<Path>>(base_directory: P) -> Result<Self> {
        let base_path = base_directory.as_ref().to_path_buf();

        if !base_path.exists() {
            fs::create_dir_all(&base_path).with_context(|| {
                format!("Failed to create data directory {}", base_path.display())
            })?;
            info!("Created local data directory: {}", base_path.display());
        }

        Ok(Self {
            base_directory: Arc::new(base_path),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Create a connection in the platform data directory
    pub fn new_default() -> Result<Self> {
        let dir = dirs::data_local_dir()
            .map(|d| d.join("finedu"))
            .ok_or_else(|| anyhow!("Could not determine a local data directory"))?;
        Self::new(dir)
    }

    pub fn base_directory(&self) -> &Path {
        &self.base_directory
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.' { c } else { '_' })
            .collect();
        self.base_directory.join(format!("{}.json", file_name))
    }

    /// Whether a document exists for `key`
    pub fn contains(&self, key: &str) -> bool {
        self.path_for(key).exists()
    }

    /// Read a document. Missing and corrupt documents both read as `None`.
    pub fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        match serde_json::from_str(&content) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!("Ignoring corrupt local document {}: {}", key, e);
                Ok(None)
            }
        }
    }

    /// Read an array document row by row, skipping rows that don't parse.
    pub fn read_rows<T, F>(&self, key: &str, parse: F) -> Result<Vec<T>>
    where
        F: Fn(&Value) -> Option<T>,
    {
        let rows = match self.read_json::<Value>(key)? {
            Some(Value::Array(rows)) => rows,
            Some(_) => {
                warn!("Local document {} is not a list; treating as empty", key);
                return Ok(Vec::new());
            }
            None => return Ok(Vec::new()),
        };

        let total = rows.len();
        let parsed: Vec<T> = rows.iter().filter_map(|row| parse(row)).collect();
        if parsed.len() < total {
            warn!("Skipped {} malformed rows in {}", total - parsed.len(), key);
        }
        Ok(parsed)
    }

    /// Write a document atomically.
    pub fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| anyhow!("Local store lock poisoned"))?;
        self.write_unlocked(key, value)
    }

    fn write_unlocked<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let path = self.path_for(key);
        let content = serde_json::to_string_pretty(value)?;

        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, content)
            .with_context(|| format!("Failed to write {}", temp_path.display()))?;
        fs::rename(&temp_path, &path)
            .with_context(|| format!("Failed to replace {}", path.display()))?;

        debug!("Wrote local document {}", key);
        Ok(())
    }

    /// Read-modify-write a document under the store lock.
    ///
    /// The closure sees the current value (`None` if missing or corrupt) and
    /// returns the value to store together with a result for the caller.
    pub fn update_json<T, R, F>(&self, key: &str, f: F) -> Result<R>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(Option<T>) -> Result<(T, R)>,
    {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| anyhow!("Local store lock poisoned"))?;

        let current = self.read_json::<T>(key)?;
        let (next, result) = f(current)?;
        self.write_unlocked(key, &next)?;
        Ok(result)
    }

    /// Delete a document. Missing documents are not an error.
    pub fn remove(&self, key: &str) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| anyhow!("Local store lock poisoned"))?;

        let path = self.path_for(key);
        if path.exists() {
            fs::remove_file(&path).with_context(|| format!("Failed to remove {}", path.display()))?;
            debug!("Removed local document {}", key);
        }
        Ok(())
    }

    /// Every key currently stored that starts with `prefix`.
    pub fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(self.base_directory.as_path())? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(key) = name.strip_suffix(".json") {
                if key.starts_with(prefix) {
                    keys.push(key.to_string());
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn setup() -> (LocalConnection, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let connection = LocalConnection::new(temp_dir.path()).expect("Failed to create connection");
        (connection, temp_dir)
    }

    #[test]
    fn test_missing_document_reads_as_none() {
        let (connection, _temp_dir) = setup();
        let value: Option<Value> = connection.read_json("finedu_kids").unwrap();
        assert!(value.is_none());
        assert!(!connection.contains("finedu_kids"));
    }

    #[test]
    fn test_corrupt_document_reads_as_none() {
        let (connection, temp_dir) = setup();
        fs::write(temp_dir.path().join("finedu_kids.json"), "{not json").unwrap();
        let value: Option<Value> = connection.read_json("finedu_kids").unwrap();
        assert!(value.is_none());
    }

    #[test]
    fn test_read_rows_skips_malformed_rows() {
        let (connection, _temp_dir) = setup();
        connection
            .write_json("rows", &json!([{"n": 1}, {"n": "x"}, {"n": 3}]))
            .unwrap();
        let rows = connection
            .read_rows("rows", |row| row.get("n").and_then(Value::as_i64))
            .unwrap();
        assert_eq!(rows, vec![1, 3]);
    }

    #[test]
    fn test_update_json_and_remove() {
        let (connection, _temp_dir) = setup();
        let n = connection
            .update_json("counter", |current: Option<i64>| {
                let next = current.unwrap_or(0) + 1;
                Ok((next, next))
            })
            .unwrap();
        assert_eq!(n, 1);
        let n = connection
            .update_json("counter", |current: Option<i64>| {
                let next = current.unwrap_or(0) + 1;
                Ok((next, next))
            })
            .unwrap();
        assert_eq!(n, 2);

        assert_eq!(connection.keys_with_prefix("count").unwrap(), vec!["counter".to_string()]);
        connection.remove("counter").unwrap();
        assert!(!connection.contains("counter"));
        connection.remove("counter").unwrap();
    }
}
