//! Target discovery over the CDP HTTP endpoint. Grounded on
//! `Nunley-Media-Group-chrome-cli`'s `resolve_connection`/`select_target`
//! priority chain: prefer an explicit page target, fall back to the
//! browser-level endpoint if no page is open yet.

use crate::error::CoreError;

use super::protocol::{BrowserVersion, Target};

pub async fn list_targets(host: &str, port: u16) -> Result<Vec<Target>, CoreError> {
    let url = format!("http://{host}:{port}/json/list");
    let response = reqwest::get(&url)
        .await
        .map_err(|e| CoreError::CdpTransportFailed(format!("GET {url}: {e}")))?;
    response
        .json::<Vec<Target>>()
        .await
        .map_err(|e| CoreError::CdpTransportFailed(format!("decoding target list: {e}")))
}

pub async fn browser_endpoint(host: &str, port: u16) -> Result<String, CoreError> {
    let url = format!("http://{host}:{port}/json/version");
    let response = reqwest::get(&url)
        .await
        .map_err(|e| CoreError::CdpTransportFailed(format!("GET {url}: {e}")))?;
    let version: BrowserVersion = response
        .json()
        .await
        .map_err(|e| CoreError::CdpTransportFailed(format!("decoding version info: {e}")))?;
    Ok(version.web_socket_debugger_url)
}

/// Picks the target to drive: an existing `page` target whose URL is not the
/// new-tab placeholder, else the first `page` target, else falls back to
/// opening a connection on the browser endpoint itself.
pub async fn select_target(host: &str, port: u16) -> Result<String, CoreError> {
    let targets = list_targets(host, port).await?;

    let pages: Vec<&Target> = targets
        .iter()
        .filter(|t| t.target_type == "page")
        .collect();

    let chosen = pages
        .iter()
        .find(|t| !t.url.starts_with("chrome://newtab") && !t.url.is_empty())
        .or_else(|| pages.first())
        .copied();

    match chosen.and_then(|t| t.web_socket_debugger_url.clone()) {
        Some(ws_url) => Ok(ws_url),
        None => browser_endpoint(host, port).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_json_decodes() {
        let raw = r#"[{"id":"1","type":"page","title":"t","url":"https://x","webSocketDebuggerUrl":"ws://x/1"}]"#;
        let targets: Vec<Target> = serde_json::from_str(raw).unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].target_type, "page");
    }
}
