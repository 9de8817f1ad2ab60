//! Drives `CdpClient` against a hand-rolled mock Chrome: a tiny HTTP server
//! answering `/json/list` and a tiny WebSocket server answering the handful
//! of CDP methods the client actually sends. No real browser required —
//! this is the "exercise C2 against a mock" smoke binary the crate has no
//! other non-unit-test coverage for, since the Poller's own tests stub
//! `PageSource` directly rather than going through the wire.

use std::net::SocketAddr;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;

use tod_core::cdp::CdpClient;

const MOCK_PAGE_HTML: &str = "<html><body><h1>Mock Chrome</h1><p>This page is served entirely in-process by the smoke test's own WebSocket handler, padded well past the hundred-character extraction floor so every fallback strategy accepts it on the first try.</p></body></html>";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let ws_addr = spawn_mock_websocket_server().await?;
    let http_addr = spawn_mock_discovery_server(ws_addr).await?;

    let client = CdpClient::connect(&http_addr.ip().to_string(), http_addr.port()).await?;

    client.navigate("https://example.com/smoke").await?;
    println!("navigated without error");

    let html = client.extract_html().await?;
    println!("extracted {} characters of html", html.len());
    assert!(html.len() >= 100);

    let info = client.get_info().await?;
    println!(
        "page info: url={} title={} ready_state={} content_length={}",
        info.url, info.title, info.ready_state, info.content_length
    );

    client.close().await?;
    println!("closed cleanly");

    Ok(())
}

/// Binds a one-shot HTTP listener that answers `GET /json/list` with a
/// single page target pointing at `ws_addr`, mirroring the shape a real
/// Chrome `--remote-debugging-port` endpoint returns.
async fn spawn_mock_discovery_server(ws_addr: SocketAddr) -> anyhow::Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let local_addr = listener.local_addr()?;

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let ws_addr = ws_addr;
            tokio::spawn(async move {
                let _ = serve_one_discovery_request(stream, ws_addr).await;
            });
        }
    });

    Ok(local_addr)
}

async fn serve_one_discovery_request(mut stream: TcpStream, ws_addr: SocketAddr) -> anyhow::Result<()> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let mut buf = [0u8; 4096];
    let _ = stream.read(&mut buf).await?;

    let ws_url = format!("ws://{ws_addr}/devtools/page/1");
    let body = json!([
        {
            "id": "1",
            "type": "page",
            "title": "mock tab",
            "url": "about:blank",
            "webSocketDebuggerUrl": ws_url,
        }
    ])
    .to_string();

    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await?;
    Ok(())
}

/// Binds a one-shot WebSocket listener answering the CDP methods the real
/// client sends during `connect` -> `navigate` -> `extract_html` ->
/// `get_info` -> `close`.
async fn spawn_mock_websocket_server() -> anyhow::Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let local_addr = listener.local_addr()?;

    tokio::spawn(async move {
        if let Ok((stream, _)) = listener.accept().await {
            let _ = serve_one_cdp_session(stream).await;
        }
    });

    Ok(local_addr)
}

async fn serve_one_cdp_session(stream: TcpStream) -> anyhow::Result<()> {
    let ws = tokio_tungstenite::accept_async(stream).await?;
    let (mut sink, mut source) = ws.split();

    while let Some(frame) = source.next().await {
        let Ok(Message::Text(text)) = frame else { continue };
        let Ok(request) = serde_json::from_str::<Value>(&text) else { continue };
        let Some(id) = request.get("id").and_then(Value::as_u64) else { continue };
        let method = request.get("method").and_then(Value::as_str).unwrap_or("");

        match method {
            "Page.enable" => {
                send(&mut sink, json!({"id": id, "result": {}})).await?;
            }
            "Page.navigate" => {
                send(&mut sink, json!({"id": id, "result": {"frameId": "1", "loaderId": "1"}})).await?;
                send(&mut sink, json!({"method": "Page.loadEventFired", "params": {"timestamp": 0}})).await?;
            }
            "Runtime.evaluate" => {
                let expression = request
                    .pointer("/params/expression")
                    .and_then(Value::as_str)
                    .unwrap_or("");
                let value = if expression.contains("JSON.stringify") {
                    json!({
                        "url": "https://example.com/smoke",
                        "title": "Mock Chrome",
                        "ready_state": "complete",
                        "content_length": MOCK_PAGE_HTML.len(),
                    })
                    .to_string()
                } else {
                    MOCK_PAGE_HTML.to_string()
                };
                send(
                    &mut sink,
                    json!({"id": id, "result": {"result": {"type": "string", "value": value}}}),
                )
                .await?;
            }
            _ => {
                send(&mut sink, json!({"id": id, "result": {}})).await?;
            }
        }
    }

    Ok(())
}

async fn send(
    sink: &mut futures::stream::SplitSink<tokio_tungstenite::WebSocketStream<TcpStream>, Message>,
    payload: Value,
) -> anyhow::Result<()> {
    sink.send(Message::Text(payload.to_string())).await?;
    Ok(())
}
