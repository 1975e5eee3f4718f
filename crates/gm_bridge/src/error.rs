use crate::xhr::{DescriptorError, ExecutorError, PoolError};

pub type Result<T> = std::result::Result<T, BridgeError>;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Malformed request: {0}")]
    Descriptor(#[from] DescriptorError),
    #[error("Environment error: {0}")]
    Environment(#[from] ExecutorError),
    #[error("Pool error: {0}")]
    Pool(#[from] PoolError),
}
