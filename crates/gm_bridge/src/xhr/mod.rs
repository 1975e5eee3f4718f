//! `GM_xmlhttpRequest`: cross-origin requests on behalf of scripts

mod decode;
pub mod descriptor;
pub mod executor;
pub mod marshal;
pub mod pool;
pub mod response;

pub use descriptor::{Callbacks, DescriptorError, RequestDescriptor};
pub use executor::{ExecutorError, XmlHttpRequest};
pub use marshal::{CallbackInvocation, CallbackSink, LifecycleEvent, MarshalError, Marshaler};
pub use pool::{PoolError, RequestPool};
pub use response::{Context, ReadyState, ResponseState};
