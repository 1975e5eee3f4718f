//! Parsing of the JSON request document sent by `GM_xmlhttpRequest`
//!
//! `method` and `url` are mandatory and checked strictly. Every other field
//! is optional and permissive: when it is missing or carries the wrong JSON
//! type it falls back to the configured [`RequestDefaults`].

use gm_config::request::RequestDefaults;
use indexmap::IndexMap;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use serde_json::{Map, Value};
use tracing::warn;

use super::marshal::LifecycleEvent;
use super::response::Context;

#[derive(Debug, thiserror::Error)]
pub enum DescriptorError {
    #[error("Request is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Request must be a JSON object")]
    NotAnObject,
    #[error("Request is missing required field \"{0}\"")]
    MissingField(&'static str),
    #[error("Request field \"{0}\" must be a string")]
    NotAString(&'static str),
    #[error("Request method \"{0}\" is not a valid HTTP method")]
    InvalidMethod(String),
}

/// Names of script functions to call at each lifecycle event, empty means none
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Callbacks {
    pub onload: String,
    pub onerror: String,
    pub onabort: String,
    pub onprogress: String,
    pub onreadystatechange: String,
    pub ontimeout: String,
    /// `upload.onprogress`
    pub upload_onprogress: String,
}

impl Callbacks {
    pub fn for_event(&self, event: LifecycleEvent) -> Option<&str> {
        let name = match event {
            LifecycleEvent::Load => &self.onload,
            LifecycleEvent::Error => &self.onerror,
            LifecycleEvent::Abort => &self.onabort,
            LifecycleEvent::Progress => &self.onprogress,
            LifecycleEvent::ReadyStateChange => &self.onreadystatechange,
            LifecycleEvent::Timeout => &self.ontimeout,
            LifecycleEvent::UploadProgress => &self.upload_onprogress,
        };
        (!name.is_empty()).then_some(name.as_str())
    }
}

#[derive(Clone)]
pub struct RequestDescriptor {
    pub method: Method,
    /// Unvalidated, checked by the executor so a bad URL reports through `onerror`
    pub url: String,
    pub data: String,
    pub binary: bool,
    pub headers: IndexMap<String, String>,
    pub user: String,
    pub password: String,
    /// `0` means no timeout
    pub timeout_ms: u64,
    pub synchronous: bool,
    pub override_mime_type: String,
    /// `null` when absent
    pub context: Context,
    pub callbacks: Callbacks,
}

impl std::fmt::Debug for RequestDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestDescriptor")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("data_len", &self.data.len())
            .field("binary", &self.binary)
            .field("headers", &self.headers)
            .field("user", &self.user)
            .field("password", &"***")
            .field("timeout_ms", &self.timeout_ms)
            .field("synchronous", &self.synchronous)
            .field("override_mime_type", &self.override_mime_type)
            .field("context", &self.context)
            .field("callbacks", &self.callbacks)
            .finish()
    }
}

impl RequestDescriptor {
    /// Parses a request document
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not a JSON object, or if `method`
    /// or `url` is missing, not a string, or (for `method`) not a valid token
    pub fn parse(json: &str, defaults: &RequestDefaults) -> Result<Self, DescriptorError> {
        let value: Value = serde_json::from_str(json)?;
        let mut descriptor = Self::from_value(value, defaults)?;

        // a second pass keeps the context exactly as the script spelled it
        if let Ok(ContextText {
            context: Some(raw),
        }) = serde_json::from_str::<ContextText<'_>>(json)
        {
            descriptor.context = Context::from_raw(raw.to_owned());
        }
        Ok(descriptor)
    }

    /// Same as [`RequestDescriptor::parse`] for an already decoded document.
    /// The context is re-encoded from its decoded form.
    ///
    /// # Errors
    ///
    /// See [`RequestDescriptor::parse`]
    pub fn from_value(value: Value, defaults: &RequestDefaults) -> Result<Self, DescriptorError> {
        let Value::Object(mut object) = value else {
            return Err(DescriptorError::NotAnObject);
        };

        let method = parse_method(required_string(&object, "method")?)?;
        let url = required_string(&object, "url")?.to_string();

        let upload_onprogress = object
            .get("upload")
            .and_then(Value::as_object)
            .map(|upload| opt_string(upload, "onprogress"))
            .unwrap_or_default();

        Ok(Self {
            method,
            url,
            data: opt_string(&object, "data"),
            binary: opt_bool(&object, "binary", defaults.binary),
            headers: opt_headers(&object),
            user: opt_string(&object, "user"),
            password: opt_string(&object, "password"),
            timeout_ms: opt_millis(&object, "timeout", defaults.timeout_ms),
            synchronous: opt_bool(&object, "synchronous", defaults.synchronous),
            override_mime_type: opt_string(&object, "overrideMimeType"),
            context: object.remove("context").unwrap_or(Value::Null).into(),
            callbacks: Callbacks {
                onload: opt_string(&object, "onload"),
                onerror: opt_string(&object, "onerror"),
                onabort: opt_string(&object, "onabort"),
                onprogress: opt_string(&object, "onprogress"),
                onreadystatechange: opt_string(&object, "onreadystatechange"),
                ontimeout: opt_string(&object, "ontimeout"),
                upload_onprogress,
            },
        })
    }

    /// Request body bytes, `None` when there is no payload.
    ///
    /// Text is sent as UTF-8. Binary payloads follow the binary-string
    /// convention: each char carries one byte in its low 8 bits.
    pub fn body_bytes(&self) -> Option<Vec<u8>> {
        if self.data.is_empty() {
            return None;
        }
        if self.binary {
            Some(self.data.chars().map(|c| (u32::from(c) & 0xff) as u8).collect())
        } else {
            Some(self.data.as_bytes().to_vec())
        }
    }
}

#[derive(Deserialize)]
struct ContextText<'a> {
    #[serde(borrow, default)]
    context: Option<&'a RawValue>,
}

fn required_string<'a>(
    object: &'a Map<String, Value>,
    field: &'static str,
) -> Result<&'a str, DescriptorError> {
    match object.get(field) {
        None | Some(Value::Null) => Err(DescriptorError::MissingField(field)),
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(DescriptorError::NotAString(field)),
    }
}

const STANDARD_METHODS: &[&str] = &["DELETE", "GET", "HEAD", "OPTIONS", "POST", "PUT"];

fn parse_method(raw: &str) -> Result<Method, DescriptorError> {
    let normalized = STANDARD_METHODS
        .iter()
        .find(|m| m.eq_ignore_ascii_case(raw))
        .map_or_else(|| raw.to_string(), |m| (*m).to_string());

    if normalized.is_empty() {
        return Err(DescriptorError::InvalidMethod(raw.into()));
    }
    Method::from_bytes(normalized.as_bytes())
        .map_err(|_| DescriptorError::InvalidMethod(raw.into()))
}

fn opt_string(object: &Map<String, Value>, field: &str) -> String {
    match object.get(field) {
        Some(Value::String(s)) => s.clone(),
        _ => String::new(),
    }
}

fn opt_bool(object: &Map<String, Value>, field: &str, default: bool) -> bool {
    match object.get(field) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) if s.eq_ignore_ascii_case("true") => true,
        Some(Value::String(s)) if s.eq_ignore_ascii_case("false") => false,
        _ => default,
    }
}

fn opt_millis(object: &Map<String, Value>, field: &str, default: u64) -> u64 {
    match object.get(field) {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .unwrap_or(default),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(default),
        _ => default,
    }
}

fn opt_headers(object: &Map<String, Value>) -> IndexMap<String, String> {
    let Some(Value::Object(headers)) = object.get("headers") else {
        return IndexMap::new();
    };

    let mut out = IndexMap::with_capacity(headers.len());
    for (name, value) in headers {
        let value = match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            other => {
                warn!(header = %name, value = %other, "Dropping header with non-scalar value");
                continue;
            }
        };
        out.insert(name.clone(), value);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(json: &Value) -> Result<RequestDescriptor, DescriptorError> {
        RequestDescriptor::parse(&json.to_string(), &RequestDefaults::default())
    }

    #[test]
    fn test_minimal_request_uses_defaults() {
        let req = parse(&json!({ "method": "GET", "url": "http://example.org/" })).unwrap();
        assert_eq!(req.method, Method::GET);
        assert_eq!(req.url, "http://example.org/");
        assert!(req.data.is_empty());
        assert!(!req.binary);
        assert!(!req.synchronous);
        assert!(req.headers.is_empty());
        assert_eq!(req.timeout_ms, 0);
        assert_eq!(req.context, Value::Null);
        assert_eq!(req.callbacks, Callbacks::default());
        assert!(req.body_bytes().is_none());
    }

    #[test]
    fn test_context_kept_as_written() {
        let req = RequestDescriptor::parse(
            r#"{"method":"GET","url":"u","context":{"price":1.10,"id":123456789012345678901234567890,"e":1e2}}"#,
            &RequestDefaults::default(),
        )
        .unwrap();
        assert_eq!(
            req.context.as_str(),
            r#"{"price":1.10,"id":123456789012345678901234567890,"e":1e2}"#
        );

        let absent =
            RequestDescriptor::parse(r#"{"method":"GET","url":"u"}"#, &RequestDefaults::default())
                .unwrap();
        assert_eq!(absent.context.as_str(), "null");
    }

    #[test]
    fn test_full_request() {
        let req = parse(&json!({
            "method": "POST",
            "url": "https://api.example.org/items",
            "data": "a=1",
            "headers": { "X-One": "1", "X-Two": 2, "X-Three": true, "X-Bad": { "no": 1 } },
            "user": "alice",
            "password": "pw",
            "timeout": 2500,
            "synchronous": true,
            "overrideMimeType": "text/plain; charset=x-user-defined",
            "context": [1, "two"],
            "onload": "done",
            "onerror": "failed",
            "onabort": "aborted",
            "onprogress": "progressed",
            "onreadystatechange": "changed",
            "ontimeout": "timedOut",
            "upload": { "onprogress": "uploaded" }
        }))
        .unwrap();

        assert_eq!(req.method, Method::POST);
        assert_eq!(req.data, "a=1");
        assert_eq!(
            req.headers.iter().collect::<Vec<_>>(),
            vec![
                (&"X-One".to_string(), &"1".to_string()),
                (&"X-Two".to_string(), &"2".to_string()),
                (&"X-Three".to_string(), &"true".to_string()),
            ]
        );
        assert_eq!(req.user, "alice");
        assert_eq!(req.password, "pw");
        assert_eq!(req.timeout_ms, 2500);
        assert!(req.synchronous);
        assert_eq!(req.context, json!([1, "two"]));
        assert_eq!(req.callbacks.for_event(LifecycleEvent::Load), Some("done"));
        assert_eq!(req.callbacks.for_event(LifecycleEvent::Timeout), Some("timedOut"));
        assert_eq!(
            req.callbacks.for_event(LifecycleEvent::UploadProgress),
            Some("uploaded")
        );
        assert_eq!(req.body_bytes().unwrap(), b"a=1".to_vec());
    }

    #[test]
    fn test_missing_required_fields() {
        assert!(matches!(
            parse(&json!({ "url": "http://example.org/" })),
            Err(DescriptorError::MissingField("method"))
        ));
        assert!(matches!(
            parse(&json!({ "method": "GET" })),
            Err(DescriptorError::MissingField("url"))
        ));
        assert!(matches!(
            parse(&json!({ "method": "GET", "url": null })),
            Err(DescriptorError::MissingField("url"))
        ));
        assert!(matches!(
            parse(&json!({ "method": "GET", "url": 42 })),
            Err(DescriptorError::NotAString("url"))
        ));
    }

    #[test]
    fn test_malformed_documents() {
        let defaults = RequestDefaults::default();
        assert!(matches!(
            RequestDescriptor::parse("{ method: GET", &defaults),
            Err(DescriptorError::Json(_))
        ));
        assert!(matches!(
            RequestDescriptor::parse("[1, 2]", &defaults),
            Err(DescriptorError::NotAnObject)
        ));
    }

    #[test]
    fn test_invalid_method() {
        assert!(matches!(
            parse(&json!({ "method": "", "url": "http://example.org/" })),
            Err(DescriptorError::InvalidMethod(_))
        ));
        assert!(matches!(
            parse(&json!({ "method": "GE T", "url": "http://example.org/" })),
            Err(DescriptorError::InvalidMethod(_))
        ));
    }

    #[test]
    fn test_standard_methods_are_case_insensitive() {
        let req = parse(&json!({ "method": "post", "url": "http://example.org/" })).unwrap();
        assert_eq!(req.method, Method::POST);
        let req = parse(&json!({ "method": "PATCH", "url": "http://example.org/" })).unwrap();
        assert_eq!(req.method.as_str(), "PATCH");
    }

    #[test]
    fn test_wrong_types_fall_back_to_defaults() {
        let defaults = RequestDefaults {
            timeout_ms: 900,
            synchronous: true,
            ..RequestDefaults::default()
        };
        let req = RequestDescriptor::parse(
            &json!({
                "method": "GET",
                "url": "http://example.org/",
                "data": 12,
                "timeout": "soon",
                "synchronous": 1,
                "binary": "true",
                "headers": "X-A: b",
                "onload": false
            })
            .to_string(),
            &defaults,
        )
        .unwrap();

        assert!(req.data.is_empty());
        assert_eq!(req.timeout_ms, 900);
        assert!(req.synchronous);
        assert!(req.binary);
        assert!(req.headers.is_empty());
        assert_eq!(req.callbacks.for_event(LifecycleEvent::Load), None);
    }

    #[test]
    fn test_timeout_accepts_floats_and_strings() {
        let req = parse(&json!({ "method": "GET", "url": "u", "timeout": 1500.7 })).unwrap();
        assert_eq!(req.timeout_ms, 1500);
        let req = parse(&json!({ "method": "GET", "url": "u", "timeout": " 300 " })).unwrap();
        assert_eq!(req.timeout_ms, 300);
        let req = parse(&json!({ "method": "GET", "url": "u", "timeout": -5 })).unwrap();
        assert_eq!(req.timeout_ms, 0);
    }

    #[test]
    fn test_binary_body_keeps_low_bytes() {
        let req = parse(&json!({
            "method": "POST",
            "url": "u",
            "binary": true,
            "data": "\u{00}\u{7f}\u{80}\u{ff}"
        }))
        .unwrap();
        assert_eq!(req.body_bytes().unwrap(), vec![0x00, 0x7f, 0x80, 0xff]);

        let text = parse(&json!({ "method": "POST", "url": "u", "data": "\u{ff}" })).unwrap();
        assert_eq!(text.body_bytes().unwrap(), vec![0xc3, 0xbf]);
    }

    #[test]
    fn test_debug_redacts_password() {
        let req = parse(&json!({
            "method": "GET", "url": "u", "user": "alice", "password": "hunter2"
        }))
        .unwrap();
        let debug = format!("{req:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("alice"));
    }
}
