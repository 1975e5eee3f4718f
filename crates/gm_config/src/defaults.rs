// Various default functions to be used by serde

use crate::request::SuccessPolicy;

pub(crate) fn default_true() -> bool {
    true
}

pub(crate) fn default_name() -> String {
    "gm".into()
}

pub(crate) fn default_chunk_size() -> usize {
    4096
}

pub(crate) fn default_success_policy() -> SuccessPolicy {
    SuccessPolicy::OkOnly
}

pub(crate) fn default_workers() -> usize {
    4
}

pub(crate) fn default_queue_capacity() -> usize {
    64
}

pub(crate) fn default_shutdown_grace_ms() -> u64 {
    5000
}
