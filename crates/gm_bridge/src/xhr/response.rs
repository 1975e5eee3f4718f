use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_json::value::RawValue;

/// Request progress, only ever moves forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum ReadyState {
    #[default]
    Unsent = 0,
    Opened = 1,
    HeadersReceived = 2,
    Loading = 3,
    Done = 4,
}

impl From<ReadyState> for u8 {
    fn from(state: ReadyState) -> Self {
        state as u8
    }
}

impl TryFrom<u8> for ReadyState {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ReadyState::Unsent),
            1 => Ok(ReadyState::Opened),
            2 => Ok(ReadyState::HeadersReceived),
            3 => Ok(ReadyState::Loading),
            4 => Ok(ReadyState::Done),
            other => Err(format!("invalid readyState {other}")),
        }
    }
}

/// The request's `context`, kept as the exact JSON text the script sent
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context(Box<RawValue>);

impl Context {
    pub fn from_raw(raw: Box<RawValue>) -> Self {
        Self(raw)
    }

    pub fn as_str(&self) -> &str {
        self.0.get()
    }

    /// Decodes the context, numbers may lose their original spelling
    ///
    /// # Errors
    ///
    /// Never for contexts built by this crate, which always hold valid JSON
    pub fn to_value(&self) -> serde_json::Result<Value> {
        serde_json::from_str(self.as_str())
    }
}

impl From<Value> for Context {
    fn from(value: Value) -> Self {
        RawValue::from_string(value.to_string()).map_or_else(|_| Self::default(), Self)
    }
}

impl PartialEq for Context {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl PartialEq<Value> for Context {
    fn eq(&self, other: &Value) -> bool {
        self.to_value().is_ok_and(|value| value == *other)
    }
}

/// Everything a lifecycle callback gets to see about a request.
///
/// Serialized in full at every event, not as a delta.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseState {
    pub ready_state: ReadyState,
    /// `0` until headers arrive
    pub status: u16,
    pub status_text: String,
    /// URL after transport-level redirects
    pub final_url: String,
    pub response_text: String,
    pub length_computable: bool,
    /// Declared content length, `0` when unknown
    pub total: u64,
    pub loaded: u64,
    /// Echo of the request's `context`
    pub context: Context,
}

impl ResponseState {
    pub fn new(context: Context) -> Self {
        Self {
            context,
            ..Self::default()
        }
    }

    /// Moves to `next`, ignoring attempts to go backwards or stay put
    pub(crate) fn advance(&mut self, next: ReadyState) -> bool {
        if next <= self.ready_state {
            return false;
        }
        self.ready_state = next;
        true
    }
}
