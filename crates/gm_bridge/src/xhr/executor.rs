//! The request state machine
//!
//! A request walks `UNSENT → OPENED → HEADERS_RECEIVED → LOADING → DONE`,
//! firing `onreadystatechange` at every step and `onload` at the end. A
//! failure stops it wherever it is and fires exactly one of `onerror` or
//! `ontimeout`; a failed request never reaches `DONE`.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use gm_config::request::{RequestDefaults, SuccessPolicy};
use reqwest::header::{
    AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue,
};
use tracing::{debug, error, instrument, warn};
use url::Url;
use uuid::Uuid;

use super::decode::BodyDecoder;
use super::descriptor::RequestDescriptor;
use super::marshal::{CallbackSink, LifecycleEvent, Marshaler};
use super::response::{ReadyState, ResponseState};

/// Failures that point at the host environment rather than the network.
/// No callback fires for these.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("Failed creating HTTP client: {0}")]
    Client(String),
    #[error("Failed encoding credentials: {0}")]
    Credentials(String),
}

enum Failure {
    Timeout,
    Error,
}

/// One `GM_xmlhttpRequest` call, owns its response state until it finishes
#[derive(Debug)]
pub struct XmlHttpRequest {
    descriptor: RequestDescriptor,
    chunk_size: usize,
    success: SuccessPolicy,
    marshaler: Marshaler,
}

impl XmlHttpRequest {
    pub fn new(
        descriptor: RequestDescriptor,
        defaults: &RequestDefaults,
        sink: Arc<dyn CallbackSink>,
    ) -> Self {
        let marshaler = Marshaler::new(Uuid::new_v4(), descriptor.callbacks.clone(), sink);
        Self {
            descriptor,
            chunk_size: defaults.chunk_size.max(1),
            success: defaults.success,
            marshaler,
        }
    }

    pub fn id(&self) -> Uuid {
        self.marshaler.request_id()
    }

    pub fn descriptor(&self) -> &RequestDescriptor {
        &self.descriptor
    }

    /// The `UNSENT` state handed to asynchronous callers
    pub fn initial_state(&self) -> ResponseState {
        ResponseState::new(self.descriptor.context.clone())
    }

    /// Runs the request to completion or to its first failure.
    ///
    /// Transport failures and rejected statuses are reported through the
    /// callbacks and still return `Ok` with the state reached.
    ///
    /// # Errors
    ///
    /// Returns an error, without firing any callback, if the HTTP client
    /// cannot be created or the credentials cannot be encoded
    #[instrument(
        name = "xml_http_request",
        skip_all,
        fields(request_id = %self.id(), method = %self.descriptor.method, url = %self.descriptor.url)
    )]
    pub async fn run(self) -> Result<ResponseState, ExecutorError> {
        let mut state = self.initial_state();

        let url = match parse_url(&self.descriptor.url) {
            Ok(url) => url,
            Err(reason) => {
                error!(%reason, "Specified URL is malformed");
                self.marshaler.deliver(LifecycleEvent::Error, &state);
                return Ok(state);
            }
        };

        let timeout = (self.descriptor.timeout_ms > 0)
            .then(|| Duration::from_millis(self.descriptor.timeout_ms));
        let client = build_client(timeout)?;
        self.transition(&mut state, ReadyState::Opened);

        let body = self.descriptor.body_bytes();
        let headers = self.request_headers(body.as_ref().map(Vec::len))?;
        let mut request = client
            .request(self.descriptor.method.clone(), url)
            .headers(headers);
        let body_len = body.as_ref().map(|b| b.len() as u64);
        if let Some(body) = body {
            request = request.body(body);
        }

        // connect and first read are each bounded, so headers may take both budgets
        let sent = match timeout {
            Some(t) => match tokio::time::timeout(t * 2, request.send()).await {
                Ok(result) => result.map_err(|e| classify(&e)),
                Err(_) => {
                    error!("Timeout waiting for response headers");
                    Err(Failure::Timeout)
                }
            },
            None => request.send().await.map_err(|e| classify(&e)),
        };
        let mut response = match sent {
            Ok(response) => response,
            Err(failure) => return Ok(self.fail(state, failure)),
        };

        if let Some(len) = body_len {
            let mut snapshot = state.clone();
            snapshot.length_computable = true;
            snapshot.loaded = len;
            snapshot.total = len;
            self.marshaler
                .deliver(LifecycleEvent::UploadProgress, &snapshot);
        }

        let status = response.status();
        state.status = status.as_u16();
        state.status_text = status_text(&response);
        state.final_url = response.url().to_string();
        self.transition(&mut state, ReadyState::HeadersReceived);

        if !self.success.accepts(state.status) {
            error!(status = state.status, "HTTP error response");
            self.marshaler.deliver(LifecycleEvent::Error, &state);
            return Ok(state);
        }

        if let Some(total) = response.content_length().filter(|len| *len > 0) {
            state.length_computable = true;
            state.total = total;
        }
        self.transition(&mut state, ReadyState::Loading);

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let mut decoder = BodyDecoder::new(content_type.as_deref(), self.descriptor.binary);
        let mut text = String::new();
        let mut read: u64 = 0;

        loop {
            let chunk = match response.chunk().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(e) => return Ok(self.fail(state, classify(&e))),
            };
            for piece in chunk.chunks(self.chunk_size) {
                // progress reports the bytes read before this piece
                if read > 0 && state.total > 0 {
                    state.loaded = read;
                    self.marshaler.deliver(LifecycleEvent::Progress, &state);
                }
                decoder.decode(piece, &mut text);
                read += piece.len() as u64;
            }
        }
        decoder.finish(&mut text);
        drop(response);
        drop(client);

        state.response_text = text;
        state.loaded = read;
        self.transition(&mut state, ReadyState::Done);
        self.marshaler.deliver(LifecycleEvent::Load, &state);

        Ok(state)
    }

    /// Reports a request that will never be sent through `onerror`
    pub(crate) fn reject(self) {
        let state = self.initial_state();
        self.marshaler.deliver(LifecycleEvent::Error, &state);
    }

    /// Guard that reports the request through `onerror` with its initial
    /// state if it is dropped before [`InFlight::finish`]
    pub(crate) fn in_flight(&self) -> InFlight {
        InFlight {
            marshaler: self.marshaler.clone(),
            state: Some(self.initial_state()),
        }
    }

    fn transition(&self, state: &mut ResponseState, next: ReadyState) {
        if state.advance(next) {
            debug!(ready_state = u8::from(next), "Ready state changed");
            self.marshaler
                .deliver(LifecycleEvent::ReadyStateChange, state);
        }
    }

    fn fail(&self, state: ResponseState, failure: Failure) -> ResponseState {
        let event = match failure {
            Failure::Timeout => LifecycleEvent::Timeout,
            Failure::Error => LifecycleEvent::Error,
        };
        self.marshaler.deliver(event, &state);
        state
    }

    fn request_headers(&self, body_len: Option<usize>) -> Result<HeaderMap, ExecutorError> {
        let descriptor = &self.descriptor;
        let mut headers = HeaderMap::new();

        if let Some(len) = body_len {
            headers.insert(CONTENT_LENGTH, HeaderValue::from(len));
        }

        if !descriptor.user.is_empty() && !descriptor.password.is_empty() {
            let token = STANDARD.encode(format!("{}:{}", descriptor.user, descriptor.password));
            let value = HeaderValue::from_str(&format!("Basic {token}"))
                .map_err(|e| ExecutorError::Credentials(e.to_string()))?;
            headers.insert(AUTHORIZATION, value);
        }

        for (name, value) in &descriptor.headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => warn!(header = %name, "Skipping invalid request header"),
            }
        }

        if !descriptor.override_mime_type.is_empty() {
            match HeaderValue::from_str(&descriptor.override_mime_type) {
                Ok(value) => {
                    headers.insert(CONTENT_TYPE, value);
                }
                Err(_) => warn!(
                    mime_type = %descriptor.override_mime_type,
                    "Skipping invalid overrideMimeType"
                ),
            }
        }

        Ok(headers)
    }
}

fn parse_url(raw: &str) -> Result<Url, String> {
    let url = Url::parse(raw).map_err(|e| e.to_string())?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(format!("unsupported scheme \"{other}\"")),
    }
}

/// A running request whose terminal callback is still owed
pub(crate) struct InFlight {
    marshaler: Marshaler,
    state: Option<ResponseState>,
}

impl InFlight {
    pub(crate) fn finish(mut self) {
        self.state = None;
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if let Some(state) = self.state.take() {
            warn!(
                request_id = %self.marshaler.request_id(),
                "Request abandoned before finishing"
            );
            self.marshaler.deliver(LifecycleEvent::Error, &state);
        }
    }
}

/// The server's own reason phrase, the standard one when it sent that
fn status_text(response: &reqwest::Response) -> String {
    match response.extensions().get::<hyper::ext::ReasonPhrase>() {
        Some(reason) => String::from_utf8_lossy(reason.as_bytes()).into_owned(),
        None => response
            .status()
            .canonical_reason()
            .unwrap_or_default()
            .to_string(),
    }
}

fn build_client(timeout: Option<Duration>) -> Result<reqwest::Client, ExecutorError> {
    let mut builder = reqwest::Client::builder();
    if let Some(timeout) = timeout {
        builder = builder.connect_timeout(timeout).read_timeout(timeout);
    }
    builder
        .build()
        .map_err(|e| ExecutorError::Client(e.to_string()))
}

fn classify(err: &reqwest::Error) -> Failure {
    if is_timeout(err) {
        error!(error = %err, "Timeout issuing request");
        Failure::Timeout
    } else {
        error!(error = %err, "Exception issuing request");
        Failure::Error
    }
}

fn is_timeout(err: &reqwest::Error) -> bool {
    if err.is_timeout() {
        return true;
    }
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>()
            && io.kind() == std::io::ErrorKind::TimedOut
        {
            return true;
        }
        source = cause.source();
    }
    false
}
