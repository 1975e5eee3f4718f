use std::sync::Arc;

use gm_config::Config;
use gm_config::pool::PoolConfig;
use gm_config::request::RequestDefaults;
use tracing::{debug, warn};

use crate::api::GmApi;
use crate::error::Result;
use crate::identity::{ScriptId, Secret};
use crate::store::ScriptStore;
use crate::xhr::{CallbackSink, RequestDescriptor, RequestPool, ResponseState, XmlHttpRequest};

/// Settings the bridge needs from the host configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BridgeConfig {
    pub requests: RequestDefaults,
    pub pool: PoolConfig,
}

impl From<&Config> for BridgeConfig {
    fn from(config: &Config) -> Self {
        Self {
            requests: config.requests.clone(),
            pool: config.pool.clone(),
        }
    }
}

/// Everything a host injects into the script engine: the value API and the
/// request entry point, sharing one secret.
pub struct Bridge {
    api: GmApi,
    requests: RequestDefaults,
    pool: RequestPool,
    sink: Arc<dyn CallbackSink>,
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("api", &self.api)
            .field("requests", &self.requests)
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

impl Bridge {
    /// Creates a bridge and starts its request pool
    ///
    /// # Errors
    ///
    /// Returns an error if the request pool cannot start
    pub fn new(
        config: BridgeConfig,
        store: Arc<dyn ScriptStore>,
        secret: Secret,
        sink: Arc<dyn CallbackSink>,
    ) -> Result<Self> {
        Ok(Self {
            api: GmApi::new(store, secret),
            requests: config.requests,
            pool: RequestPool::new(&config.pool)?,
            sink,
        })
    }

    pub fn api(&self) -> &GmApi {
        &self.api
    }

    /// `GM_xmlhttpRequest` for hosts that authenticate callers themselves.
    ///
    /// Synchronous requests run on the calling thread and return their final
    /// state. Asynchronous requests are queued and return the `UNSENT` state
    /// at once; their progress arrives only through the callback sink.
    ///
    /// # Errors
    ///
    /// Returns an error, before anything is sent, if the request document is
    /// malformed, and an environment error if a synchronous request cannot
    /// create its transport
    ///
    /// # Panics
    ///
    /// Synchronous requests panic when issued from within an asynchronous
    /// execution context
    pub fn xml_http_request(&self, json: &str) -> Result<ResponseState> {
        let descriptor = RequestDescriptor::parse(json, &self.requests).inspect_err(|e| {
            warn!(error = %e, "Rejecting malformed request");
        })?;
        let request = XmlHttpRequest::new(descriptor, &self.requests, Arc::clone(&self.sink));

        if request.descriptor().synchronous {
            debug!(request_id = %request.id(), "Running synchronous request");
            return Ok(self.pool.block_on(request)?);
        }

        let state = request.initial_state();
        debug!(request_id = %request.id(), "Queueing asynchronous request");
        // a refused request has already been reported through onerror
        if let Err(e) = self.pool.submit(request) {
            debug!(error = %e, "Request refused");
        }
        Ok(state)
    }

    /// `GM_xmlhttpRequest` as injected into scripts, gated on the secret.
    ///
    /// Returns `Ok(None)` without parsing anything when the secret is wrong.
    ///
    /// # Errors
    ///
    /// See [`Bridge::xml_http_request`]
    ///
    /// # Panics
    ///
    /// See [`Bridge::xml_http_request`]
    pub fn xml_http_request_as(
        &self,
        script: &ScriptId,
        secret: &str,
        json: &str,
    ) -> Result<Option<ResponseState>> {
        if !self.api.authorize("xmlHttpRequest", secret) {
            return Ok(None);
        }
        debug!(script = %script, "Accepted request from script");
        self.xml_http_request(json).map(Some)
    }

    /// Stops the request pool, waiting up to its grace period for queued
    /// requests
    ///
    /// # Panics
    ///
    /// Panics if called from within an asynchronous execution context
    pub fn shutdown(self) {
        self.pool.shutdown();
    }
}
