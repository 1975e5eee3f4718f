//! [`ScriptStore`] persisted to a single JSON document
//!
//! The document maps `namespace -> name -> key -> value`. It is read once on
//! open and rewritten after every mutation. A mutation only becomes visible
//! once the rewrite succeeded.

use std::collections::BTreeMap;
use std::fs;
use std::sync::{Mutex, MutexGuard};

use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

use crate::identity::ScriptId;
use crate::store::{ScriptStore, StoreError};

type Document = BTreeMap<String, BTreeMap<String, BTreeMap<String, String>>>;

#[derive(Debug)]
pub struct JsonFileScriptStore {
    path: Utf8PathBuf,
    document: Mutex<Document>,
}

impl JsonFileScriptStore {
    /// Opens the store at `path`, starting empty when the file does not exist
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or is not a valid store document
    pub fn open(path: impl AsRef<Utf8Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let document = if path.exists() {
            debug!(%path, "Loading value store");
            serde_json::from_str(&fs::read_to_string(&path)?)?
        } else {
            Document::new()
        };

        Ok(Self {
            path,
            document: Mutex::new(document),
        })
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Writes `next` to disk and only then makes it the current document
    fn commit(
        &self,
        current: &mut MutexGuard<'_, Document>,
        next: Document,
    ) -> Result<(), StoreError> {
        let contents = serde_json::to_string_pretty(&next)?;
        fs::write(&self.path, contents)?;
        **current = next;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Document>, StoreError> {
        self.document
            .lock()
            .map_err(|e| StoreError::Lock(e.to_string()))
    }
}

impl ScriptStore for JsonFileScriptStore {
    fn get_value(&self, script: &ScriptId, key: &str) -> Result<Option<String>, StoreError> {
        let document = self.lock()?;
        Ok(document
            .get(&script.namespace)
            .and_then(|names| names.get(&script.name))
            .and_then(|values| values.get(key))
            .cloned())
    }

    fn set_value(&self, script: &ScriptId, key: &str, value: &str) -> Result<(), StoreError> {
        let mut document = self.lock()?;
        let mut next = document.clone();
        next.entry(script.namespace.clone())
            .or_default()
            .entry(script.name.clone())
            .or_default()
            .insert(key.into(), value.into());
        self.commit(&mut document, next)
    }

    fn delete_value(&self, script: &ScriptId, key: &str) -> Result<(), StoreError> {
        let mut document = self.lock()?;
        let present = document
            .get(&script.namespace)
            .and_then(|names| names.get(&script.name))
            .is_some_and(|values| values.contains_key(key));
        if !present {
            return Ok(());
        }

        let mut next = document.clone();
        if let Some(names) = next.get_mut(&script.namespace) {
            if let Some(values) = names.get_mut(&script.name) {
                values.remove(key);
                if values.is_empty() {
                    names.remove(&script.name);
                }
            }
            if names.is_empty() {
                next.remove(&script.namespace);
            }
        }
        self.commit(&mut document, next)
    }

    fn value_names(&self, script: &ScriptId) -> Result<Vec<String>, StoreError> {
        let document = self.lock()?;
        Ok(document
            .get(&script.namespace)
            .and_then(|names| names.get(&script.name))
            .map(|values| values.keys().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_path(dir: &tempfile::TempDir, file: &str) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().join(file)).unwrap()
    }

    #[test]
    fn test_values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = store_path(&dir, "values.json");
        let id = ScriptId::new("pager", "example.org");

        {
            let store = JsonFileScriptStore::open(&path).unwrap();
            store.set_value(&id, "page", "3").unwrap();
            store.set_value(&id, "mode", "auto").unwrap();
        }

        let store = JsonFileScriptStore::open(&path).unwrap();
        assert_eq!(store.get_value(&id, "page").unwrap().as_deref(), Some("3"));
        assert_eq!(
            store.value_names(&id).unwrap(),
            vec!["mode".to_string(), "page".to_string()]
        );
    }

    #[test]
    fn test_delete_prunes_empty_scripts() {
        let dir = tempfile::tempdir().unwrap();
        let path = store_path(&dir, "values.json");
        let id = ScriptId::new("pager", "example.org");

        let store = JsonFileScriptStore::open(&path).unwrap();
        store.set_value(&id, "page", "3").unwrap();
        store.delete_value(&id, "page").unwrap();
        store.delete_value(&id, "page").unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw, serde_json::json!({}));
    }

    #[test]
    fn test_open_rejects_invalid_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = store_path(&dir, "values.json");
        fs::write(&path, "[1, 2, 3]").unwrap();

        let err = JsonFileScriptStore::open(&path).unwrap_err();
        assert!(matches!(err, StoreError::InvalidData(_)));
    }

    #[test]
    fn test_failed_write_leaves_values_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = store_path(&dir, "values.json");
        let id = ScriptId::new("pager", "example.org");

        let store = JsonFileScriptStore::open(&path).unwrap();
        store.set_value(&id, "page", "3").unwrap();

        // the directory disappears, so every rewrite fails from now on
        drop(dir);

        assert!(matches!(
            store.set_value(&id, "page", "4"),
            Err(StoreError::Io(_))
        ));
        assert!(store.set_value(&id, "mode", "auto").is_err());
        assert!(store.delete_value(&id, "page").is_err());

        assert_eq!(store.get_value(&id, "page").unwrap().as_deref(), Some("3"));
        assert_eq!(store.get_value(&id, "mode").unwrap(), None);
        assert_eq!(store.value_names(&id).unwrap(), vec!["page".to_string()]);
    }

    #[test]
    fn test_unwritable_location_never_stores() {
        let dir = tempfile::tempdir().unwrap();
        let path = store_path(&dir, "missing/values.json");
        let id = ScriptId::new("pager", "example.org");

        let store = JsonFileScriptStore::open(&path).unwrap();
        assert!(store.set_value(&id, "page", "3").is_err());
        assert_eq!(store.get_value(&id, "page").unwrap(), None);
        assert!(store.value_names(&id).unwrap().is_empty());
        assert!(!path.exists());
    }
}
