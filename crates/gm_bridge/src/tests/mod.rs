//! Request lifecycle tests against local HTTP servers


use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::sync::mpsc::{Receiver, channel};
use std::time::Duration;

use gm_config::request::RequestDefaults;

use crate::{Bridge, BridgeConfig, CallbackInvocation, LifecycleEvent, MemoryScriptStore, Secret};

pub(crate) const SECRET: &str = "test-secret";

pub(crate) fn all_callbacks() -> serde_json::Value {
    serde_json::json!({
        "onload": "onLoad",
        "onerror": "onError",
        "onabort": "onAbort",
        "onprogress": "onProgress",
        "onreadystatechange": "onReadyStateChange",
        "ontimeout": "onTimeout",
        "upload": { "onprogress": "onUploadProgress" }
    })
}

/// Merges the descriptor fields over [`all_callbacks`]
pub(crate) fn descriptor(fields: serde_json::Value) -> String {
    let mut document = all_callbacks();
    if let (Some(target), serde_json::Value::Object(fields)) = (document.as_object_mut(), fields)
    {
        target.extend(fields);
    }
    document.to_string()
}

pub(crate) fn bridge_with(config: BridgeConfig) -> (Bridge, Receiver<CallbackInvocation>) {
    let (tx, rx) = channel();
    let bridge = Bridge::new(
        config,
        Arc::new(MemoryScriptStore::new()),
        Secret::new(SECRET),
        Arc::new(tx),
    )
    .unwrap();
    (bridge, rx)
}

pub(crate) fn bridge() -> (Bridge, Receiver<CallbackInvocation>) {
    bridge_with(BridgeConfig::default())
}

pub(crate) fn bridge_with_requests(requests: RequestDefaults) -> (Bridge, Receiver<CallbackInvocation>) {
    bridge_with(BridgeConfig {
        requests,
        ..BridgeConfig::default()
    })
}

pub(crate) fn events(invocations: &[CallbackInvocation]) -> Vec<LifecycleEvent> {
    invocations.iter().map(|i| i.event).collect()
}

pub(crate) fn ready_states(invocations: &[CallbackInvocation]) -> Vec<u8> {
    invocations
        .iter()
        .filter(|i| i.event == LifecycleEvent::ReadyStateChange)
        .map(|i| u8::from(i.response.ready_state))
        .collect()
}

pub(crate) fn count(invocations: &[CallbackInvocation], event: LifecycleEvent) -> usize {
    invocations.iter().filter(|i| i.event == event).count()
}

/// Collects invocations until a terminal event arrives
pub(crate) fn until_terminal(rx: &Receiver<CallbackInvocation>) -> Vec<CallbackInvocation> {
    let mut received = Vec::new();
    while let Ok(invocation) = rx.recv_timeout(Duration::from_secs(10)) {
        let terminal = matches!(
            invocation.event,
            LifecycleEvent::Load | LifecycleEvent::Error | LifecycleEvent::Timeout
        );
        received.push(invocation);
        if terminal {
            break;
        }
    }
    received
}

/// An address nothing listens on
pub(crate) fn unreachable_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

/// A listener that accepts connections but never answers
pub(crate) fn silent_listener() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// Answers the first connection with `response` as raw bytes, then keeps the
/// connection open for `hold` before closing it
pub(crate) fn scripted_server(response: &'static str, hold: Duration) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    std::thread::spawn(move || {
        let Ok((mut stream, _)) = listener.accept() else {
            return;
        };
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            match stream.read(&mut buf) {
                Ok(0) | Err(_) => return,
                Ok(n) => request.extend_from_slice(&buf[..n]),
            }
        }
        if stream.write_all(response.as_bytes()).is_ok() {
            let _ = stream.flush();
            std::thread::sleep(hold);
        }
    });
    addr
}
