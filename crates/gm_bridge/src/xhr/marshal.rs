//! Delivery of response snapshots back into the script engine
//!
//! The script engine is single threaded and owned by the hosting shell.
//! Requests never call into it directly: each lifecycle event becomes a
//! [`CallbackInvocation`] handed to a [`CallbackSink`], typically the
//! sending half of a channel the shell drains on its engine thread. The
//! hand-off never waits for the callback to run.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};
use uuid::Uuid;

use super::descriptor::Callbacks;
use super::response::ResponseState;

#[derive(Debug, thiserror::Error)]
pub enum MarshalError {
    #[error("Failed serializing response: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Callback name \"{0}\" is not a script identifier")]
    InvalidCallbackName(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleEvent {
    ReadyStateChange,
    Load,
    Error,
    /// Reserved, requests cannot be cancelled so nothing fires it
    Abort,
    Progress,
    Timeout,
    #[serde(rename = "upload.progress")]
    UploadProgress,
}

/// One callback call for the script engine to perform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackInvocation {
    pub request_id: Uuid,
    pub event: LifecycleEvent,
    /// Script function to call, may be a dotted path
    pub callback: String,
    pub response: ResponseState,
}

impl CallbackInvocation {
    /// The response document passed to the callback
    ///
    /// # Errors
    ///
    /// Returns an error if the response cannot be serialized
    pub fn payload(&self) -> Result<String, MarshalError> {
        Ok(serde_json::to_string(&self.response)?)
    }

    /// Renders the invocation as script text, for shells that can only
    /// evaluate source code in the page's global scope
    ///
    /// # Errors
    ///
    /// Returns an error if the callback name is not a dotted identifier path
    /// or the response cannot be serialized
    pub fn to_script(&self) -> Result<String, MarshalError> {
        if !is_identifier_path(&self.callback) {
            return Err(MarshalError::InvalidCallbackName(self.callback.clone()));
        }
        let literal = serde_json::to_string(&self.payload()?)?;
        Ok(format!(
            "(function() {{ unsafeWindow.{}(JSON.parse({literal})); }})()",
            self.callback
        ))
    }
}

fn is_identifier_path(name: &str) -> bool {
    !name.is_empty()
        && name.split('.').all(|segment| {
            let mut chars = segment.chars();
            chars
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        })
}

/// Receiver of callback invocations, called from whichever thread runs the request
pub trait CallbackSink: Send + Sync {
    fn deliver(&self, invocation: CallbackInvocation);
}

impl CallbackSink for tokio::sync::mpsc::UnboundedSender<CallbackInvocation> {
    fn deliver(&self, invocation: CallbackInvocation) {
        if let Err(e) = self.send(invocation) {
            warn!(
                callback = %e.0.callback,
                "Script engine channel closed, dropping callback"
            );
        }
    }
}

impl CallbackSink for std::sync::mpsc::Sender<CallbackInvocation> {
    fn deliver(&self, invocation: CallbackInvocation) {
        if let Err(e) = self.send(invocation) {
            warn!(
                callback = %e.0.callback,
                "Script engine channel closed, dropping callback"
            );
        }
    }
}

/// Turns lifecycle events of one request into invocations of its callbacks
#[derive(Clone)]
pub struct Marshaler {
    request_id: Uuid,
    callbacks: Callbacks,
    sink: Arc<dyn CallbackSink>,
}

impl std::fmt::Debug for Marshaler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Marshaler")
            .field("request_id", &self.request_id)
            .field("callbacks", &self.callbacks)
            .finish_non_exhaustive()
    }
}

impl Marshaler {
    pub fn new(request_id: Uuid, callbacks: Callbacks, sink: Arc<dyn CallbackSink>) -> Self {
        Self {
            request_id,
            callbacks,
            sink,
        }
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Hands a full snapshot of `state` to the sink. Events without a
    /// callback name are skipped.
    pub fn deliver(&self, event: LifecycleEvent, state: &ResponseState) {
        let Some(callback) = self.callbacks.for_event(event) else {
            trace!(?event, "No callback registered, skipping");
            return;
        };
        debug!(
            ?event,
            callback,
            ready_state = u8::from(state.ready_state),
            "Delivering callback"
        );
        self.sink.deliver(CallbackInvocation {
            request_id: self.request_id,
            event,
            callback: callback.to_string(),
            response: state.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xhr::response::ReadyState;
    use serde_json::json;

    fn invocation(callback: &str) -> CallbackInvocation {
        CallbackInvocation {
            request_id: Uuid::nil(),
            event: LifecycleEvent::Load,
            callback: callback.into(),
            response: ResponseState {
                ready_state: ReadyState::Done,
                status: 200,
                status_text: "OK".into(),
                response_text: "say \"hi\"\n</script>".into(),
                context: json!({ "n": 1 }).into(),
                ..ResponseState::default()
            },
        }
    }

    #[test]
    fn test_script_round_trips_payload() {
        let inv = invocation("handlers.onDone");
        let script = inv.to_script().unwrap();

        let prefix = "(function() { unsafeWindow.handlers.onDone(JSON.parse(";
        let suffix = ")); })()";
        assert!(script.starts_with(prefix));
        assert!(script.ends_with(suffix));

        let literal = &script[prefix.len()..script.len() - suffix.len()];
        let payload: String = serde_json::from_str(literal).unwrap();
        let response: ResponseState = serde_json::from_str(&payload).unwrap();
        assert_eq!(response, inv.response);
    }

    #[test]
    fn test_script_rejects_non_identifiers() {
        for name in ["", "a b", "alert(1);x", "1abc", "a..b", "a."] {
            assert!(
                matches!(
                    invocation(name).to_script(),
                    Err(MarshalError::InvalidCallbackName(_))
                ),
                "{name} should be rejected"
            );
        }
        for name in ["cb", "$cb", "_cb1", "a.b.c"] {
            assert!(invocation(name).to_script().is_ok(), "{name} should render");
        }
    }

    #[test]
    fn test_invocation_wire_format() {
        let value = serde_json::to_value(invocation("cb")).unwrap();
        assert_eq!(value["requestId"], Uuid::nil().to_string());
        assert_eq!(value["event"], "load");
        assert_eq!(value["callback"], "cb");
        assert_eq!(value["response"]["readyState"], 4);

        let upload = serde_json::to_value(LifecycleEvent::UploadProgress).unwrap();
        assert_eq!(upload, "upload.progress");
        let change = serde_json::to_value(LifecycleEvent::ReadyStateChange).unwrap();
        assert_eq!(change, "readystatechange");
    }

    #[test]
    fn test_marshaler_skips_events_without_callback() {
        let (tx, rx) = std::sync::mpsc::channel();
        let callbacks = Callbacks {
            onload: "loaded".into(),
            ..Callbacks::default()
        };
        let marshaler = Marshaler::new(Uuid::new_v4(), callbacks, Arc::new(tx));
        let state = ResponseState::new(json!("ctx").into());

        marshaler.deliver(LifecycleEvent::ReadyStateChange, &state);
        marshaler.deliver(LifecycleEvent::Error, &state);
        marshaler.deliver(LifecycleEvent::Load, &state);
        drop(marshaler);

        let received: Vec<CallbackInvocation> = rx.iter().collect();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].event, LifecycleEvent::Load);
        assert_eq!(received[0].callback, "loaded");
        assert_eq!(received[0].response.context, json!("ctx"));
    }

    #[test]
    fn test_closed_channel_is_not_fatal() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        drop(rx);
        let callbacks = Callbacks {
            onerror: "failed".into(),
            ..Callbacks::default()
        };
        let marshaler = Marshaler::new(Uuid::new_v4(), callbacks, Arc::new(tx));
        marshaler.deliver(LifecycleEvent::Error, &ResponseState::default());
    }
}
