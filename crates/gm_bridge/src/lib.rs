//! # GM Bridge
//!
//! The privileged half of a userscript host. Scripts injected into a page run
//! in a sandboxed engine; this crate gives them the few capabilities they may
//! not have on their own.
//!
//! ## Overview
//!
//! - **Value API** ([`GmApi`]): per-script key/value storage
//!   (`GM_listValues`, `GM_getValue`, `GM_setValue`, `GM_deleteValue`) and
//!   `GM_log`, gated on a secret handed only to injected code
//! - **Request API** ([`Bridge::xml_http_request`]): cross-origin HTTP
//!   requests that mimic the browser `XMLHttpRequest` lifecycle, reporting
//!   every step back through named script callbacks
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use gm_bridge::{Bridge, BridgeConfig, MemoryScriptStore, ScriptId, Secret};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let secret = Secret::generate();
//! let (tx, rx) = std::sync::mpsc::channel();
//! let bridge = Bridge::new(
//!     BridgeConfig::default(),
//!     Arc::new(MemoryScriptStore::new()),
//!     secret.clone(),
//!     Arc::new(tx),
//! )?;
//!
//! let script = ScriptId::new("Example", "https://example.org");
//! bridge.api().set_value(&script, secret.expose(), "visits", "1");
//!
//! bridge.xml_http_request(
//!     r#"{ "method": "GET", "url": "https://example.org/", "onload": "done" }"#,
//! )?;
//! for invocation in rx {
//!     // evaluate in the page's script engine
//!     println!("{}", invocation.to_script()?);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Callbacks
//!
//! Requests never touch the script engine. Each lifecycle event becomes a
//! [`CallbackInvocation`] carrying a full snapshot of the response, handed to
//! the [`CallbackSink`] the bridge was built with. Invocations of one request
//! arrive in order: `readystatechange` for each state, `progress` while the
//! body streams, then `load`, or a single `error` / `timeout` instead.

mod api;
mod bridge;
mod error;
mod file_store;
mod identity;
mod store;
pub mod xhr;

#[cfg(test)]
mod tests;

pub use api::{GmApi, VALUE_NAME_DELIMITER};
pub use bridge::{Bridge, BridgeConfig};
pub use error::{BridgeError, Result};
pub use file_store::JsonFileScriptStore;
pub use identity::{ScriptId, Secret};
pub use store::{MemoryScriptStore, ScriptStore, StoreError};
pub use xhr::{
    CallbackInvocation, CallbackSink, Context, LifecycleEvent, ReadyState, ResponseState,
};
