//! C8 — Mail Watcher. Polls an IMAP inbox for magic-link authentication
//! emails, running alongside browser discovery rather than blocking it.
//! There is no IMAP precedent anywhere in the pack, so `async-imap` +
//! `async-native-tls` + `mail-parser` are enrichment dependencies chosen for
//! being the standard async IMAP stack (documented in DESIGN.md), wired up
//! in the teacher's reconnect/backoff loop shape from `bg_poll`.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use crate::config::MailConfig;
use crate::error::CoreError;

const BACKOFF_FLOOR: Duration = Duration::from_secs(1);
const BACKOFF_CEILING: Duration = Duration::from_secs(60);

/// How many recently-seen message ids are remembered so a re-poll of the
/// same mailbox window never re-delivers the same magic link twice.
const SEEN_CAPACITY: usize = 256;

static URL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"https?://[^\s"'<>]+"#).expect("static regex is valid"));

/// Substrings in a URL's path or query that mark it as a magic-link
/// sign-in URL rather than an incidental link in the email body (spec §6
/// Mail interface).
const MAGIC_LINK_MARKERS: &[&str] = &["token=", "magic", "/verify", "/signin", "/sign-in", "otp="];

fn looks_like_magic_link(url: &str) -> bool {
    let lower = url.to_lowercase();
    MAGIC_LINK_MARKERS.iter().any(|marker| lower.contains(marker))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MagicLink {
    pub message_id: String,
    pub url: String,
    pub received_at: DateTime<Utc>,
}

#[async_trait]
pub trait MagicLinkHandler: Send + Sync {
    async fn handle(&self, link: MagicLink);
}

/// Default handler (spec §4.7): navigates the given CDP client to the
/// magic link. A navigation failure attempts one reconnect, then drops the
/// link — a later mail poll will re-find it if it is still present, since
/// the at-most-once guard only applies per delivered link, not per retry.
pub struct CdpNavigateHandler {
    host: String,
    port: u16,
    client: tokio::sync::Mutex<Arc<crate::cdp::CdpClient>>,
}

impl CdpNavigateHandler {
    pub fn new(host: impl Into<String>, port: u16, client: Arc<crate::cdp::CdpClient>) -> Self {
        Self {
            host: host.into(),
            port,
            client: tokio::sync::Mutex::new(client),
        }
    }
}

#[async_trait]
impl MagicLinkHandler for CdpNavigateHandler {
    async fn handle(&self, link: MagicLink) {
        let mut guard = self.client.lock().await;
        if guard.navigate(&link.url).await.is_ok() {
            return;
        }

        match crate::cdp::CdpClient::connect(&self.host, self.port).await {
            Ok(reconnected) => {
                *guard = Arc::new(reconnected);
                let _ = guard.navigate(&link.url).await;
            }
            Err(_) => {}
        }
    }
}

/// At-most-once delivery guard: a bounded FIFO of message ids already
/// handed to the handler. Bounded so a long-lived watcher doesn't grow
/// memory without limit; old entries age out in arrival order.
struct SeenLedger {
    order: VecDeque<String>,
}

impl SeenLedger {
    fn new() -> Self {
        Self { order: VecDeque::with_capacity(SEEN_CAPACITY) }
    }

    /// Returns `true` the first time a given id is observed, `false` on
    /// every subsequent observation.
    fn observe(&mut self, id: &str) -> bool {
        if self.order.iter().any(|seen| seen == id) {
            return false;
        }
        if self.order.len() >= SEEN_CAPACITY {
            self.order.pop_front();
        }
        self.order.push_back(id.to_owned());
        true
    }
}

pub struct MailWatcher {
    config: MailConfig,
    seen: Mutex<SeenLedger>,
}

impl MailWatcher {
    pub fn new(config: MailConfig) -> Self {
        Self {
            config,
            seen: Mutex::new(SeenLedger::new()),
        }
    }

    /// Runs the poll loop until `cancel` fires. Connection failures retry
    /// with exponential backoff between `BACKOFF_FLOOR` and
    /// `BACKOFF_CEILING`; a successful poll resets the backoff.
    pub async fn run(&self, handler: &dyn MagicLinkHandler, cancel: &CancellationToken) {
        let mut backoff = BACKOFF_FLOOR;

        loop {
            if cancel.is_cancelled() {
                return;
            }

            let mut failed = false;
            match self.poll_once().await {
                Ok(links) => {
                    backoff = BACKOFF_FLOOR;
                    for link in links {
                        let is_new = self.seen.lock().expect("seen ledger mutex poisoned").observe(&link.message_id);
                        if is_new {
                            handler.handle(link).await;
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, "mail poll failed, backing off");
                    failed = true;
                }
            }

            let sleep_for = if failed {
                let wait = backoff;
                backoff = (backoff * 2).min(BACKOFF_CEILING);
                wait
            } else {
                Duration::from_secs(self.config.poll_interval_s)
            };

            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(sleep_for) => {}
            }
        }
    }

    /// One connect-search-fetch-parse cycle, looking back
    /// `config.lookback_minutes` from now.
    async fn poll_once(&self) -> Result<Vec<MagicLink>, CoreError> {
        let mut session = self.connect().await?;
        session
            .select("INBOX")
            .await
            .map_err(|e| CoreError::MailTransport(format!("SELECT INBOX: {e}")))?;

        let since = Utc::now() - chrono::Duration::minutes(self.config.lookback_minutes);
        let search_query = format!("SINCE {}", imap_date(since));
        let uids = session
            .search(&search_query)
            .await
            .map_err(|e| CoreError::MailTransport(format!("SEARCH: {e}")))?;

        if uids.is_empty() {
            let _ = session.logout().await;
            return Ok(Vec::new());
        }

        let sequence = uids
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(",");

        let mut links = Vec::new();
        {
            use futures::StreamExt;
            let mut stream = session
                .fetch(&sequence, "RFC822")
                .await
                .map_err(|e| CoreError::MailTransport(format!("FETCH: {e}")))?;
            while let Some(fetch) = stream.next().await {
                let fetch = fetch.map_err(|e| CoreError::MailTransport(format!("FETCH item: {e}")))?;
                if let Some(body) = fetch.body() {
                    if let Some(link) = extract_magic_link(body) {
                        links.push(link);
                    }
                }
            }
        }

        let _ = session.logout().await;
        Ok(links)
    }

    async fn connect(&self) -> Result<async_imap::Session<async_native_tls::TlsStream<TcpStream>>, CoreError> {
        let addr = (self.config.host.as_str(), self.config.port);
        let tcp = TcpStream::connect(addr)
            .await
            .map_err(|e| CoreError::MailTransport(format!("TCP connect {}:{}: {e}", self.config.host, self.config.port)))?;

        let tls = async_native_tls::TlsConnector::new();
        let tls_stream = tls
            .connect(&self.config.host, tcp)
            .await
            .map_err(|e| CoreError::MailTransport(format!("TLS handshake: {e}")))?;

        let client = async_imap::Client::new(tls_stream);
        client
            .login(&self.config.username, &self.config.password)
            .await
            .map_err(|(e, _client)| CoreError::MailTransport(format!("IMAP login: {e}")))
    }
}

fn imap_date(when: DateTime<Utc>) -> String {
    when.format("%d-%b-%Y").to_string()
}

fn extract_magic_link(raw_message: &[u8]) -> Option<MagicLink> {
    let parsed = mail_parser::MessageParser::default().parse(raw_message)?;
    let message_id = parsed
        .message_id()
        .map(str::to_owned)
        .unwrap_or_else(|| blake3::hash(raw_message).to_hex().to_string());

    let text = parsed
        .body_text(0)
        .map(|s| s.to_string())
        .or_else(|| parsed.body_html(0).map(|s| s.to_string()))?;

    let url = URL_PATTERN
        .find_iter(&text)
        .map(|m| m.as_str())
        .find(|url| looks_like_magic_link(url))?
        .to_owned();

    Some(MagicLink {
        message_id,
        url,
        received_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seen_ledger_is_at_most_once() {
        let mut ledger = SeenLedger::new();
        assert!(ledger.observe("msg-1"));
        assert!(!ledger.observe("msg-1"));
        assert!(ledger.observe("msg-2"));
    }

    #[test]
    fn seen_ledger_evicts_oldest_past_capacity() {
        let mut ledger = SeenLedger::new();
        for i in 0..SEEN_CAPACITY {
            assert!(ledger.observe(&format!("msg-{i}")));
        }
        assert!(ledger.observe("msg-overflow"));
        assert!(ledger.observe("msg-0"));
    }

    #[test]
    fn url_pattern_finds_magic_link_in_body() {
        let text = "Hi,\nClick here to sign in: https://app.example.com/auth/magic?token=abc123\nThanks";
        let found = URL_PATTERN.find(text).unwrap();
        assert_eq!(found.as_str(), "https://app.example.com/auth/magic?token=abc123");
    }

    #[test]
    fn incidental_links_are_not_mistaken_for_magic_links() {
        assert!(!looks_like_magic_link("https://example.com/unsubscribe"));
        assert!(looks_like_magic_link("https://example.com/auth/magic?token=abc123"));
        assert!(looks_like_magic_link("https://example.com/verify/email"));
        assert!(looks_like_magic_link("https://example.com/signin?otp=1234"));
    }

    #[test]
    fn extract_magic_link_skips_a_leading_unsubscribe_link() {
        let raw = b"From: a@b.com\r\nSubject: sign in\r\nContent-Type: text/plain\r\n\r\n\
            Unsubscribe here: https://example.com/unsubscribe\r\n\
            Or sign in: https://example.com/auth/verify?token=xyz\r\n";
        let link = extract_magic_link(raw).expect("message parses and contains a magic link");
        assert_eq!(link.url, "https://example.com/auth/verify?token=xyz");
    }
}
