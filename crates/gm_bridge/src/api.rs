//! Secret-gated value API exposed to injected scripts
//!
//! Every entry point takes the calling script's identity and the secret it
//! was injected with. A wrong secret turns the call into a no-op: reads
//! return `None`, writes are dropped, and the rejection is logged with the
//! method name. The secret itself is the boundary between trusted injected
//! code and the page, so a caller holding it may address any script's
//! values.

use std::sync::Arc;

use tracing::{error, info};

use crate::identity::{ScriptId, Secret};
use crate::store::ScriptStore;

/// Separator between keys in [`GmApi::list_values`]
pub const VALUE_NAME_DELIMITER: char = ',';

#[derive(Clone)]
pub struct GmApi {
    store: Arc<dyn ScriptStore>,
    secret: Secret,
}

impl std::fmt::Debug for GmApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GmApi").field("secret", &self.secret).finish()
    }
}

impl GmApi {
    pub fn new(store: Arc<dyn ScriptStore>, secret: Secret) -> Self {
        Self { store, secret }
    }

    /// Checks the supplied secret, logging a rejection for `method`
    pub(crate) fn authorize(&self, method: &str, secret: &str) -> bool {
        if self.secret.matches(secret) {
            return true;
        }
        error!(method, "Call to \"{method}\" did not supply correct secret");
        false
    }

    /// `GM_listValues`: all key names of `script` joined by
    /// [`VALUE_NAME_DELIMITER`], empty when the script has none.
    ///
    /// Returns `None` when the secret is wrong.
    pub fn list_values(&self, script: &ScriptId, secret: &str) -> Option<String> {
        if !self.authorize("listValues", secret) {
            return None;
        }
        match self.store.value_names(script) {
            Ok(names) => Some(names.join(&VALUE_NAME_DELIMITER.to_string())),
            Err(e) => {
                error!(script = %script, error = %e, "Failed listing values");
                Some(String::new())
            }
        }
    }

    /// `GM_getValue`: the stored value, else `default`.
    ///
    /// Returns `None` when the secret is wrong. Without a default this is
    /// indistinguishable from an absent value.
    pub fn get_value(
        &self,
        script: &ScriptId,
        secret: &str,
        key: &str,
        default: Option<&str>,
    ) -> Option<String> {
        if !self.authorize("getValue", secret) {
            return None;
        }
        let stored = self.store.get_value(script, key).unwrap_or_else(|e| {
            error!(script = %script, key, error = %e, "Failed reading value");
            None
        });
        stored.or_else(|| default.map(String::from))
    }

    /// `GM_setValue`
    pub fn set_value(&self, script: &ScriptId, secret: &str, key: &str, value: &str) {
        if !self.authorize("setValue", secret) {
            return;
        }
        if let Err(e) = self.store.set_value(script, key, value) {
            error!(script = %script, key, error = %e, "Failed writing value");
        }
    }

    /// `GM_deleteValue`
    pub fn delete_value(&self, script: &ScriptId, secret: &str, key: &str) {
        if !self.authorize("deleteValue", secret) {
            return;
        }
        if let Err(e) = self.store.delete_value(script, key) {
            error!(script = %script, key, error = %e, "Failed deleting value");
        }
    }

    /// `GM_log`
    pub fn log(&self, script: &ScriptId, secret: &str, message: &str) {
        if !self.authorize("log", secret) {
            return;
        }
        info!(
            target: "gm_bridge::script",
            script = %script.name,
            namespace = %script.namespace,
            "{script}: {message}"
        );
    }
}
