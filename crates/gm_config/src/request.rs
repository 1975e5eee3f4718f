use serde::{Deserialize, Serialize};

/// Values applied to optional request descriptor fields that are missing
/// or carry the wrong JSON type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequestDefaults {
    /// Connect and read timeout in milliseconds, `0` leaves the transport
    /// without a timeout.
    #[serde(default)]
    pub timeout_ms: u64,
    #[serde(default)]
    pub synchronous: bool,
    #[serde(default)]
    pub binary: bool,
    /// Largest slice of the response body consumed between two progress
    /// checks.
    #[serde(default = "crate::defaults::default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "crate::defaults::default_success_policy")]
    pub success: SuccessPolicy,
}

impl Default for RequestDefaults {
    fn default() -> Self {
        Self {
            timeout_ms: 0,
            synchronous: false,
            binary: false,
            chunk_size: crate::defaults::default_chunk_size(),
            success: crate::defaults::default_success_policy(),
        }
    }
}

/// Which HTTP statuses let a request proceed past `HEADERS_RECEIVED`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SuccessPolicy {
    /// Only `200 OK`; 201, 204 and friends fire `onerror`.
    #[default]
    OkOnly,
    /// Any status in `200..=299`.
    AnySuccess,
}

impl SuccessPolicy {
    pub fn accepts(self, status: u16) -> bool {
        match self {
            SuccessPolicy::OkOnly => status == 200,
            SuccessPolicy::AnySuccess => (200..300).contains(&status),
        }
    }
}
