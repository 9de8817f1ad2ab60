//! C2 — CDP Client. Drives a browser over the Chrome DevTools Protocol: one
//! WebSocket, JSON-RPC-shaped commands correlated by id, and a demultiplexed
//! event stream read from a background task. Grounded on
//! `Nunley-Media-Group-chrome-cli` for target discovery (`discover.rs`) and
//! on the teacher's `bg_poll` reader-task/channel shape for how a background
//! task hands data back to callers without blocking them on each other.

pub mod discover;
pub mod protocol;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::CoreError;

use protocol::{CdpRequest, IncomingMessage};

/// What the Page Poller needs from a live page: one HTML pull per tick.
/// Kept as a trait, rather than depending on `CdpClient` directly, so the
/// poller can be exercised against a stub in tests without a real
/// WebSocket server.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn extract_html(&self) -> Result<String, CoreError>;
}

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);
const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(45);

/// Settling delay after `Page.loadEventFired` before the caller is handed
/// back control, letting client-side rendering that fires just after
/// `load` finish (spec §4.1).
const SETTLING_DELAY: Duration = Duration::from_millis(150);

/// Minimum length, in characters, a candidate `outerHTML` extraction must
/// clear before the client accepts it (spec §4.1 — guards against a page
/// that is still blank when every strategy is tried).
const MIN_HTML_LEN: usize = 100;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value, CoreError>>>>>;

pub struct CdpClient {
    sink: Mutex<futures::stream::SplitSink<WsStream, Message>>,
    pending: PendingMap,
    next_id: AtomicU64,
    events: flume::Receiver<(String, Value)>,
    reader: tokio::task::JoinHandle<()>,
}

impl Drop for CdpClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

impl CdpClient {
    /// Resolves a debug target on `host:port` and opens the CDP WebSocket.
    pub async fn connect(host: &str, port: u16) -> Result<Self, CoreError> {
        let ws_url = discover::select_target(host, port).await?;

        let (stream, _response) = tokio::time::timeout(
            CONNECT_TIMEOUT,
            tokio_tungstenite::connect_async(&ws_url),
        )
        .await
        .map_err(|_| CoreError::CdpTransportFailed(format!("connect to {ws_url} timed out")))?
        .map_err(|e| CoreError::CdpTransportFailed(format!("connect to {ws_url}: {e}")))?;

        let (sink, mut stream) = stream.split();
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let (event_tx, events) = flume::unbounded();

        let reader_pending = Arc::clone(&pending);
        let reader = tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                let Ok(frame) = frame else { break };
                let Message::Text(text) = frame else { continue };
                match IncomingMessage::parse(&text) {
                    Some(IncomingMessage::Response { id, result, error }) => {
                        if let Some(sender) = reader_pending.lock().await.remove(&id) {
                            let outcome = match error {
                                Some(e) => Err(CoreError::CdpTransportFailed(format!(
                                    "{} (code {})",
                                    e.message, e.code
                                ))),
                                None => Ok(result.unwrap_or(Value::Null)),
                            };
                            let _ = sender.send(outcome);
                        }
                    }
                    Some(IncomingMessage::Event { method, params }) => {
                        let _ = event_tx.send((method, params));
                    }
                    None => {}
                }
            }
        });

        Ok(Self {
            sink: Mutex::new(sink),
            pending,
            next_id: AtomicU64::new(1),
            events,
            reader,
        })
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, CoreError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let request = CdpRequest {
            id,
            method: method.to_owned(),
            params,
        };
        let payload = serde_json::to_string(&request)?;
        self.sink
            .lock()
            .await
            .send(Message::Text(payload))
            .await
            .map_err(|e| CoreError::CdpTransportFailed(format!("send {method}: {e}")))?;

        match tokio::time::timeout(COMMAND_TIMEOUT, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(CoreError::CdpTransportFailed(format!(
                "{method}: response channel closed"
            ))),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(CoreError::CdpTransportFailed(format!(
                    "{method}: timed out after {:?}",
                    COMMAND_TIMEOUT
                )))
            }
        }
    }

    /// Navigates the target, waits for `Page.loadEventFired` up to the 45s
    /// navigation budget, then sleeps a bounded settling delay so
    /// client-side rendering that fires after `load` has a moment to
    /// finish (spec §4.1, scenario S7).
    pub async fn navigate(&self, url: &str) -> Result<(), CoreError> {
        self.call("Page.enable", json!({})).await?;
        self.call("Page.navigate", json!({ "url": url }))
            .await
            .map_err(|e| CoreError::NavigationFailed(format!("{url}: {e}")))?;

        let deadline = tokio::time::Instant::now() + NAVIGATION_TIMEOUT;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Err(CoreError::NavigationFailed(format!(
                    "{url}: no load event within {:?}",
                    NAVIGATION_TIMEOUT
                )));
            }
            match tokio::time::timeout(remaining, self.events.recv_async()).await {
                Ok(Ok((method, _params))) if method == "Page.loadEventFired" => break,
                Ok(Ok(_)) => continue,
                Ok(Err(_)) => {
                    return Err(CoreError::NavigationFailed(format!(
                        "{url}: event stream closed before load"
                    )))
                }
                Err(_) => {
                    return Err(CoreError::NavigationFailed(format!(
                        "{url}: no load event within {:?}",
                        NAVIGATION_TIMEOUT
                    )))
                }
            }
        }

        tokio::time::sleep(SETTLING_DELAY).await;
        Ok(())
    }

    /// Extracts the page's current `outerHTML`, trying progressively more
    /// roundabout strategies until one produces a plausible document (spec
    /// §4.1's four-strategy fallback):
    /// (a) `Runtime.evaluate` the document's `outerHTML` directly;
    /// (b) reconstruct it from `document.head.innerHTML` +
    ///     `document.body.innerHTML`;
    /// (c) `DOM.getDocument{depth:-1,pierce:true}` then
    ///     `DOM.getOuterHTML{nodeId}`;
    /// (d) `XMLSerializer().serializeToString(document)`.
    pub async fn extract_html(&self) -> Result<String, CoreError> {
        for strategy in [
            Self::try_runtime_evaluate_outer_html,
            Self::try_reconstruct_head_and_body,
            Self::try_dom_get_document_then_outer_html,
            Self::try_xml_serializer,
        ] {
            if let Some(html) = strategy(self).await {
                if html.len() >= MIN_HTML_LEN {
                    return Ok(html);
                }
            }
        }
        Err(CoreError::HtmlExtractFailed)
    }

    async fn try_runtime_evaluate_outer_html(&self) -> Option<String> {
        self.evaluate_to_string("document.documentElement.outerHTML")
            .await
    }

    async fn try_reconstruct_head_and_body(&self) -> Option<String> {
        let head = self
            .evaluate_to_string("document.head ? document.head.innerHTML : ''")
            .await
            .unwrap_or_default();
        let body = self
            .evaluate_to_string("document.body ? document.body.innerHTML : ''")
            .await
            .unwrap_or_default();
        if head.is_empty() && body.is_empty() {
            return None;
        }
        Some(format!("<html><head>{head}</head><body>{body}</body></html>"))
    }

    async fn evaluate_to_string(&self, expression: &str) -> Option<String> {
        let result = self
            .call(
                "Runtime.evaluate",
                json!({ "expression": expression, "returnByValue": true }),
            )
            .await
            .ok()?;
        result
            .get("result")?
            .get("value")?
            .as_str()
            .map(str::to_owned)
    }

    async fn try_dom_get_document_then_outer_html(&self) -> Option<String> {
        let document = self
            .call("DOM.getDocument", json!({ "depth": -1, "pierce": true }))
            .await
            .ok()?;
        let node_id = document.get("root")?.get("nodeId")?.as_u64()?;
        let result = self
            .call("DOM.getOuterHTML", json!({ "nodeId": node_id }))
            .await
            .ok()?;
        result.get("outerHTML")?.as_str().map(str::to_owned)
    }

    async fn try_xml_serializer(&self) -> Option<String> {
        self.evaluate_to_string("new XMLSerializer().serializeToString(document)")
            .await
    }

    /// Current document URL, title, `readyState`, and `documentElement`
    /// content length, used to populate a `PageCapture` row without a
    /// second round trip through `extract_html` (spec §4.1).
    pub async fn get_info(&self) -> Result<PageInfo, CoreError> {
        let result = self
            .call(
                "Runtime.evaluate",
                json!({
                    "expression": "JSON.stringify({url: document.location.href, title: document.title, \
                        ready_state: document.readyState, \
                        content_length: document.documentElement ? document.documentElement.outerHTML.length : 0})",
                    "returnByValue": true,
                }),
            )
            .await?;
        let raw = result
            .get("result")
            .and_then(|r| r.get("value"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| CoreError::CdpTransportFailed("get_info: no value returned".into()))?;
        serde_json::from_str(raw).map_err(CoreError::from)
    }

    /// Closes the underlying WebSocket and stops the background reader
    /// task. Subsequent calls on this client fail.
    pub async fn close(&self) -> Result<(), CoreError> {
        self.reader.abort();
        self.sink
            .lock()
            .await
            .close()
            .await
            .map_err(|e| CoreError::CdpTransportFailed(format!("close: {e}")))
    }
}

#[async_trait]
impl PageSource for CdpClient {
    async fn extract_html(&self) -> Result<String, CoreError> {
        CdpClient::extract_html(self).await
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct PageInfo {
    pub url: String,
    pub title: String,
    pub ready_state: String,
    pub content_length: u64,
}

/// A canned `PageSource` for exercising the Poller without a real browser.
#[cfg(test)]
pub mod testing {
    use super::PageSource;
    use crate::error::CoreError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    pub struct ScriptedPageSource {
        pages: Vec<String>,
        cursor: AtomicUsize,
    }

    #[async_trait]
    impl PageSource for ScriptedPageSource {
        async fn extract_html(&self) -> Result<String, CoreError> {
            let idx = self.cursor.fetch_add(1, Ordering::SeqCst);
            let idx = idx.min(self.pages.len() - 1);
            Ok(self.pages[idx].clone())
        }
    }

    /// A page source that always returns the same HTML (never changes).
    pub fn always_ok_client(html: &str) -> Arc<dyn PageSource> {
        Arc::new(ScriptedPageSource {
            pages: vec![html.to_owned()],
            cursor: AtomicUsize::new(0),
        })
    }

    /// A page source that replays `pages` in order, repeating the last one
    /// once exhausted — useful for asserting a change is detected partway
    /// through a poll window.
    pub fn scripted_client(pages: Vec<String>) -> Arc<dyn PageSource> {
        Arc::new(ScriptedPageSource {
            pages,
            cursor: AtomicUsize::new(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::protocol::IncomingMessage;

    #[test]
    fn response_and_event_are_distinguished_by_id_presence() {
        let response = IncomingMessage::parse(r#"{"id":1,"result":{"a":1}}"#).unwrap();
        assert!(matches!(response, IncomingMessage::Response { id: 1, .. }));

        let event = IncomingMessage::parse(r#"{"method":"Page.loadEventFired","params":{}}"#)
            .unwrap();
        assert!(matches!(event, IncomingMessage::Event { .. }));
    }
}
