//! Minimal headless-browser channel for providers behind anti-bot
//! challenges. Speaks the DevTools protocol over one WebSocket: discover
//! the debugger endpoint, open a blank target, and run page-context
//! `fetch` calls so requests carry the browser's TLS and cookie posture.
//!
//! A session is expected to outlive a scrape cycle. On any protocol error
//! the owner tears the session down and recreates it on the next cycle.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::adapters::AdapterError;

const PROTOCOL_TIMEOUT: Duration = Duration::from_secs(30);

pub struct BrowserSession {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    session_id: String,
    next_id: u64,
}

impl BrowserSession {
    /// Connect to a DevTools endpoint (`http://host:port`), open a target
    /// and attach to it.
    pub async fn connect(devtools_url: &str) -> Result<Self, AdapterError> {
        let version_url = format!("{}/json/version", devtools_url.trim_end_matches('/'));
        let meta: Value = reqwest::get(&version_url)
            .await
            .map_err(|e| AdapterError::Browser(format!("devtools discovery: {}", e)))?
            .json()
            .await
            .map_err(|e| AdapterError::Browser(format!("devtools discovery body: {}", e)))?;
        let ws_url = meta
            .get("webSocketDebuggerUrl")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AdapterError::Browser("no webSocketDebuggerUrl".into()))?;

        let (ws, _) = connect_async(ws_url)
            .await
            .map_err(|e| AdapterError::Browser(format!("connect: {}", e)))?;
        let mut session = Self { ws, session_id: String::new(), next_id: 0 };

        let target = session
            .call(None, "Target.createTarget", json!({"url": "about:blank"}))
            .await?;
        let target_id = target
            .get("targetId")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AdapterError::Browser("createTarget returned no targetId".into()))?
            .to_string();
        let attached = session
            .call(
                None,
                "Target.attachToTarget",
                json!({"targetId": target_id, "flatten": true}),
            )
            .await?;
        session.session_id = attached
            .get("sessionId")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AdapterError::Browser("attach returned no sessionId".into()))?
            .to_string();

        debug!(target_id, "browser session established");
        Ok(session)
    }

    /// Fetch a URL from page context and return the response body.
    pub async fn fetch(&mut self, url: &str) -> Result<String, AdapterError> {
        let expression = format!(
            "fetch({}).then(r => {{ if (!r.ok) throw new Error('status ' + r.status); return r.text(); }})",
            serde_json::to_string(url).unwrap_or_default()
        );
        let session_id = self.session_id.clone();
        let result = self
            .call(
                Some(&session_id),
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "awaitPromise": true,
                    "returnByValue": true,
                }),
            )
            .await?;

        if let Some(desc) = result
            .pointer("/exceptionDetails/exception/description")
            .and_then(|v| v.as_str())
        {
            return Err(AdapterError::Browser(format!("page fetch failed: {}", desc)));
        }
        result
            .pointer("/result/value")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| AdapterError::Browser("page fetch returned no body".into()))
    }

    /// One DevTools command round-trip. Unrelated protocol events arriving
    /// in between are skipped.
    async fn call(
        &mut self,
        session_id: Option<&str>,
        method: &str,
        params: Value,
    ) -> Result<Value, AdapterError> {
        self.next_id += 1;
        let id = self.next_id;
        let mut command = json!({"id": id, "method": method, "params": params});
        if let Some(sid) = session_id {
            command["sessionId"] = Value::String(sid.to_string());
        }
        self.ws
            .send(Message::Text(command.to_string()))
            .await
            .map_err(|e| AdapterError::Browser(format!("{}: send: {}", method, e)))?;

        tokio::time::timeout(PROTOCOL_TIMEOUT, self.read_response(id, method))
            .await
            .map_err(|_| AdapterError::Browser(format!("{}: timed out", method)))?
    }

    async fn read_response(&mut self, id: u64, method: &str) -> Result<Value, AdapterError> {
        while let Some(message) = self.ws.next().await {
            let message =
                message.map_err(|e| AdapterError::Browser(format!("{}: recv: {}", method, e)))?;
            let Message::Text(text) = message else { continue };
            let Ok(value) = serde_json::from_str::<Value>(&text) else { continue };
            if value.get("id").and_then(|v| v.as_u64()) != Some(id) {
                continue;
            }
            if let Some(error) = value.get("error") {
                return Err(AdapterError::Browser(format!("{}: {}", method, error)));
            }
            return Ok(value.get("result").cloned().unwrap_or(Value::Null));
        }
        Err(AdapterError::Browser(format!("{}: socket closed", method)))
    }
}
