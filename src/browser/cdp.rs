use crate::browser::launcher::build_command;
use crate::browser::port::allocate_free_cdp_port;
use crate::browser::{BrowserDriver, ClickTarget, TextMatches};
use crate::config::schema::BrowserSettings;
use crate::error::{DuetError, Result};
use async_trait::async_trait;
use base64::Engine as _;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Child;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};
use tokio_tungstenite::{
    connect_async, tungstenite::Message as WsMessage, MaybeTlsStream, WebSocketStream,
};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;
type PendingResponses = Arc<Mutex<HashMap<u64, oneshot::Sender<Value>>>>;

const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);
const LOAD_TIMEOUT: Duration = Duration::from_secs(15);
const CONNECT_RETRIES: u32 = 30;
const PORT_ATTEMPTS: u16 = 64;

/// Clicks the first visible element whose label equals (or else contains) the text.
const CLICK_TEXT_JS: &str = r##"
(function(text, linkOnly) {
    const selector = linkOnly
        ? "a"
        : "a, button, input[type=button], input[type=submit], [role=button], [onclick], summary, label";
    const label = el => (el.innerText || el.value || el.getAttribute("aria-label") || "").trim();
    const visible = el => {
        const rect = el.getBoundingClientRect();
        return rect.width > 0 && rect.height > 0;
    };
    const candidates = Array.from(document.querySelectorAll(selector)).filter(visible);
    const el = candidates.find(c => label(c) === text)
        || candidates.find(c => label(c).includes(text));
    if (!el) return "not_found";
    if (el.disabled) return "disabled";
    el.scrollIntoView({ block: "center" });
    el.click();
    return "clicked";
})
"##;

/// Elements whose first text node contains the query, in document order.
/// Same selection as the XPath `//*[contains(text(), query)]`.
const SEARCH_TEXT_JS: &str = r##"
(function(text, nth) {
    const skipped = ["SCRIPT", "STYLE", "NOSCRIPT", "TEMPLATE"];
    const matches = [];
    for (const el of document.querySelectorAll("*")) {
        if (skipped.includes(el.tagName)) continue;
        const first = Array.from(el.childNodes).find(n => n.nodeType === Node.TEXT_NODE);
        if (first && first.nodeValue.includes(text)) {
            matches.push(el);
        }
    }
    if (nth >= 1 && nth <= matches.length) {
        matches[nth - 1].scrollIntoView(true);
    }
    return matches.length;
})
"##;

/// CDP client over a raw WebSocket to a Chrome process it launched and owns.
///
/// The Chrome process and its throwaway profile directory are released by
/// `close`, or by `Drop` if `close` was never reached.
pub struct CdpClient {
    ws_tx: Mutex<Option<WsSink>>,
    responses: PendingResponses,
    chrome: std::sync::Mutex<Option<Child>>,
    user_data_dir: PathBuf,
    current_url: Mutex<String>,
    msg_id: AtomicU64,
    cdp_port: u16,
}

impl CdpClient {
    /// Launch Chrome with CDP enabled and connect to its first page target
    pub async fn launch(chrome_path: &Path, settings: &BrowserSettings) -> Result<Self> {
        let cdp_port = allocate_free_cdp_port(PORT_ATTEMPTS)
            .ok_or_else(|| DuetError::Browser("No free CDP port available".to_string()))?;
        let user_data_dir =
            std::env::temp_dir().join(format!("duet-profile-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&user_data_dir)?;

        let child = build_command(chrome_path, settings, cdp_port, &user_data_dir)
            .spawn()
            .map_err(|e| {
                DuetError::Browser(format!(
                    "Failed to launch Chrome at {:?}: {}",
                    chrome_path, e
                ))
            })?;
        tracing::info!(pid = child.id(), cdp_port, "Chrome launched");

        // From here on an early return drops the client, which kills Chrome
        let client = Self {
            ws_tx: Mutex::new(None),
            responses: Arc::new(Mutex::new(HashMap::new())),
            chrome: std::sync::Mutex::new(Some(child)),
            user_data_dir,
            current_url: Mutex::new(String::new()),
            msg_id: AtomicU64::new(1),
            cdp_port,
        };

        let ws_url = client.wait_for_page_target().await?;
        client.connect(&ws_url).await?;

        client.send_command("Page.enable", json!({})).await?;
        client.send_command("Runtime.enable", json!({})).await?;
        tracing::info!("CDP domains enabled");

        Ok(client)
    }

    pub fn cdp_port(&self) -> u16 {
        self.cdp_port
    }

    /// Poll `/json/list` until Chrome exposes a page target
    async fn wait_for_page_target(&self) -> Result<String> {
        let list_url = format!("http://127.0.0.1:{}/json/list", self.cdp_port);
        let mut last_error = String::new();

        for attempt in 1..=CONNECT_RETRIES {
            tokio::time::sleep(Duration::from_millis(500)).await;

            match reqwest::get(&list_url).await {
                Ok(response) if response.status().is_success() => {
                    match response.json::<Value>().await {
                        Ok(targets) => match page_ws_url(&targets) {
                            Some(ws_url) => return Ok(ws_url),
                            None => last_error = "No page target found".to_string(),
                        },
                        Err(e) => last_error = format!("Failed to parse targets response: {}", e),
                    }
                }
                Ok(response) => last_error = format!("HTTP error: {}", response.status()),
                Err(e) => last_error = format!("Connection error: {}", e),
            }

            tracing::debug!("Retry {}/{}: {}", attempt, CONNECT_RETRIES, last_error);
        }

        Err(DuetError::Browser(format!(
            "Failed to connect to Chrome after {} retries: {}",
            CONNECT_RETRIES, last_error
        )))
    }

    async fn connect(&self, ws_url: &str) -> Result<()> {
        tracing::info!("Connecting to page target WebSocket: {}", ws_url);
        let (ws_stream, _) = connect_async(ws_url)
            .await
            .map_err(|e| DuetError::Browser(format!("Failed to connect WebSocket: {}", e)))?;
        let (tx, mut rx) = ws_stream.split();
        *self.ws_tx.lock().await = Some(tx);

        let responses = Arc::clone(&self.responses);
        tokio::spawn(async move {
            while let Some(msg) = rx.next().await {
                match msg {
                    Ok(WsMessage::Text(text)) => route_response(&responses, &text).await,
                    Ok(WsMessage::Close(_)) => {
                        tracing::debug!("WebSocket closed");
                        break;
                    }
                    Err(e) => {
                        tracing::debug!("WebSocket error: {:?}", e);
                        break;
                    }
                    _ => {}
                }
            }
            // Dropping the senders fails every command still waiting
            responses.lock().await.clear();
        });

        tracing::info!("CDP client connected on port {}", self.cdp_port);
        Ok(())
    }

    /// Send a CDP command and wait for its `result` object
    async fn send_command(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.msg_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.responses.lock().await.insert(id, tx);

        let command = json!({
            "id": id,
            "method": method,
            "params": params
        });

        let sent = {
            let mut guard = self.ws_tx.lock().await;
            match guard.as_mut() {
                Some(sink) => sink
                    .send(WsMessage::Text(command.to_string()))
                    .await
                    .map_err(|e| format!("Failed to send {}: {}", method, e)),
                None => Err("WebSocket not connected".to_string()),
            }
        };
        if let Err(e) = sent {
            self.responses.lock().await.remove(&id);
            return Err(DuetError::Browser(e));
        }

        let response = match tokio::time::timeout(COMMAND_TIMEOUT, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => {
                return Err(DuetError::Browser(format!(
                    "Connection closed while waiting for {}",
                    method
                )))
            }
            Err(_) => {
                self.responses.lock().await.remove(&id);
                return Err(DuetError::Browser(format!("{} timed out", method)));
            }
        };

        if let Some(error) = response.get("error") {
            let message = error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown error");
            return Err(DuetError::Browser(format!("{} failed: {}", method, message)));
        }

        Ok(response.get("result").cloned().unwrap_or(Value::Null))
    }

    /// Evaluate an expression in the page and return its JSON value
    async fn evaluate(&self, expression: &str) -> Result<Value> {
        let result = self
            .send_command(
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "returnByValue": true
                }),
            )
            .await?;

        if let Some(details) = result.get("exceptionDetails") {
            let description = details
                .pointer("/exception/description")
                .or_else(|| details.get("text"))
                .and_then(|v| v.as_str())
                .unwrap_or("script exception");
            return Err(DuetError::Browser(format!("Script failed: {}", description)));
        }

        Ok(result.pointer("/result/value").cloned().unwrap_or(Value::Null))
    }

    /// Navigate to a URL and wait until the document reports `complete`
    pub async fn navigate(&self, url: &str) -> Result<()> {
        let result = self
            .send_command("Page.navigate", json!({ "url": url }))
            .await?;

        if let Some(error_text) = result.get("errorText").and_then(|v| v.as_str()) {
            return Err(DuetError::Browser(format!(
                "Navigation to {} failed: {}",
                url, error_text
            )));
        }

        *self.current_url.lock().await = url.to_string();
        self.wait_for_load().await;
        tracing::info!("Navigated to: {}", url);
        Ok(())
    }

    async fn wait_for_load(&self) {
        let start = Instant::now();
        tokio::time::sleep(Duration::from_millis(200)).await;

        loop {
            match self.evaluate("document.readyState").await {
                Ok(Value::String(state)) if state == "complete" => return,
                Ok(_) => {}
                Err(e) => tracing::debug!("readyState check failed: {}", e),
            }

            if start.elapsed() > LOAD_TIMEOUT {
                tracing::warn!("Page did not finish loading within {:?}", LOAD_TIMEOUT);
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Get current URL from browser, falling back to the last navigated URL
    pub async fn get_url(&self) -> Result<String> {
        match self.evaluate("window.location.href").await? {
            Value::String(url) => {
                *self.current_url.lock().await = url.clone();
                Ok(url)
            }
            _ => Ok(self.current_url.lock().await.clone()),
        }
    }

    /// Get page title
    pub async fn get_title(&self) -> Result<Option<String>> {
        Ok(self
            .evaluate("document.title")
            .await?
            .as_str()
            .map(|s| s.to_string()))
    }

    pub async fn click_text(&self, text: &str, target: ClickTarget) -> Result<()> {
        let expression = format!(
            "({})({}, {})",
            CLICK_TEXT_JS,
            serde_json::to_string(text)?,
            target == ClickTarget::Link
        );

        let kind = match target {
            ClickTarget::Link => "link",
            ClickTarget::Clickable => "clickable element",
        };

        match self.evaluate(&expression).await?.as_str() {
            Some("clicked") => {
                tracing::debug!("Clicked {} with text: {}", kind, text);
                Ok(())
            }
            Some("disabled") => Err(DuetError::Browser(format!(
                "The {} with text '{}' is disabled",
                kind, text
            ))),
            _ => Err(DuetError::Browser(format!(
                "No {} with text '{}' found",
                kind, text
            ))),
        }
    }

    pub async fn search_text(&self, text: &str, nth: usize) -> Result<TextMatches> {
        let expression = format!(
            "({})({}, {})",
            SEARCH_TEXT_JS,
            serde_json::to_string(text)?,
            nth
        );

        let total = self
            .evaluate(&expression)
            .await?
            .as_u64()
            .ok_or_else(|| DuetError::Browser("Text search returned no count".to_string()))?
            as usize;

        let focused = (nth >= 1 && nth <= total).then_some(nth);
        tracing::debug!("Found {} matches for '{}', focused {:?}", total, text, focused);
        Ok(TextMatches { total, focused })
    }

    /// Capture the viewport as PNG bytes
    pub async fn screenshot(&self) -> Result<Vec<u8>> {
        let result = self
            .send_command("Page.captureScreenshot", json!({ "format": "png" }))
            .await?;

        let data = result
            .get("data")
            .and_then(|d| d.as_str())
            .ok_or_else(|| DuetError::Browser("Failed to capture screenshot".to_string()))?;

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(data)
            .map_err(|e| DuetError::Browser(format!("Screenshot is not valid base64: {}", e)))?;
        tracing::debug!("Screenshot taken ({} bytes)", bytes.len());
        Ok(bytes)
    }

    /// Close the WebSocket and kill Chrome
    pub async fn close(&self) -> Result<()> {
        if let Some(mut tx) = self.ws_tx.lock().await.take() {
            let _ = tx.close().await;
        }
        self.kill_chrome();
        tracing::info!("CDP client on port {} closed", self.cdp_port);
        Ok(())
    }

    fn kill_chrome(&self) {
        let child = match self.chrome.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };

        if let Some(mut child) = child {
            let _ = child.kill();
            let _ = child.wait();
            let _ = std::fs::remove_dir_all(&self.user_data_dir);
        }
    }
}

#[async_trait]
impl BrowserDriver for CdpClient {
    async fn navigate(&self, url: &str) -> Result<()> {
        CdpClient::navigate(self, url).await
    }

    async fn current_url(&self) -> Result<String> {
        self.get_url().await
    }

    async fn click_text(&self, text: &str, target: ClickTarget) -> Result<()> {
        CdpClient::click_text(self, text, target).await
    }

    async fn search_text(&self, text: &str, nth: usize) -> Result<TextMatches> {
        CdpClient::search_text(self, text, nth).await
    }

    async fn screenshot_png(&self) -> Result<Vec<u8>> {
        self.screenshot().await
    }
}

impl Drop for CdpClient {
    fn drop(&mut self) {
        self.kill_chrome();
    }
}

/// Route a CDP message to the command waiting on its id
async fn route_response(responses: &PendingResponses, text: &str) {
    if let Ok(json) = serde_json::from_str::<Value>(text) {
        if let Some(id) = json.get("id").and_then(|i| i.as_u64()) {
            if let Some(sender) = responses.lock().await.remove(&id) {
                let _ = sender.send(json);
            }
        }
    }
    tracing::trace!(
        "WS received: {}",
        text.chars().take(100).collect::<String>()
    );
}

/// WebSocket URL of the first `page` target in a `/json/list` response
fn page_ws_url(targets: &Value) -> Option<String> {
    targets
        .as_array()?
        .iter()
        .find(|t| t.get("type").and_then(|v| v.as_str()) == Some("page"))?
        .get("webSocketDebuggerUrl")?
        .as_str()
        .map(|s| s.to_string())
}
