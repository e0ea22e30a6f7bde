//! MCP transports: a child process speaking newline-delimited JSON on
//! stdio, and the streamable HTTP transport.

use async_trait::async_trait;
use serde_json::Value;
use shopbot_core::error::ToolError;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::protocol::{Incoming, classify};

/// Moves JSON-RPC messages to and from one MCP server.
#[async_trait]
pub trait McpTransport: Send + Sync {
    /// Send a request and wait for the response carrying `id`.
    async fn request(&self, id: u64, message: Value) -> Result<Value, ToolError>;

    /// Send a notification (no response expected).
    async fn notify(&self, message: Value) -> Result<(), ToolError>;

    /// Tear the connection down.
    async fn close(&self) -> Result<(), ToolError>;
}

fn method_of(message: &Value) -> &str {
    message.get("method").and_then(|m| m.as_str()).unwrap_or("unknown")
}

// --- stdio ---

type BoxedReader = Lines<BufReader<Box<dyn AsyncRead + Send + Unpin>>>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

struct StdioIo {
    reader: BoxedReader,
    writer: BoxedWriter,
}

/// Newline-delimited JSON over a child's stdin/stdout.
pub struct StdioTransport {
    server: String,
    timeout: Duration,
    io: Mutex<StdioIo>,
    child: Mutex<Option<Child>>,
}

impl StdioTransport {
    /// Spawn `command args…` with `env` added to the inherited environment.
    pub fn spawn(
        server: &str,
        command: &str,
        args: &[String],
        env: &[(String, String)],
        timeout: Duration,
    ) -> Result<Self, ToolError> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in env {
            cmd.env(key, value);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| ToolError::Transport(format!("failed to spawn '{command}': {e}")))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ToolError::Transport(format!("'{server}': no stdin")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ToolError::Transport(format!("'{server}': no stdout")))?;

        // Drain stderr so a chatty server can't block on a full pipe.
        if let Some(stderr) = child.stderr.take() {
            let name = server.to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(server = %name, "{line}");
                }
            });
        }

        debug!(server = %server, command = %command, pid = ?child.id(), "Spawned MCP server");

        let mut transport = Self::from_streams(server, stdout, stdin, timeout);
        transport.child = Mutex::new(Some(child));
        Ok(transport)
    }

    /// Wrap an existing reader/writer pair (no child process to manage).
    pub fn from_streams<R, W>(server: &str, reader: R, writer: W, timeout: Duration) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let reader: Box<dyn AsyncRead + Send + Unpin> = Box::new(reader);
        Self {
            server: server.to_string(),
            timeout,
            io: Mutex::new(StdioIo {
                reader: BufReader::new(reader).lines(),
                writer: Box::new(writer),
            }),
            child: Mutex::new(None),
        }
    }

    async fn write_message(&self, io: &mut StdioIo, message: &Value) -> Result<(), ToolError> {
        let mut line = serde_json::to_string(message)
            .map_err(|e| ToolError::Protocol(format!("encode failed: {e}")))?;
        line.push('\n');
        io.writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| ToolError::Transport(format!("'{}' write: {e}", self.server)))?;
        io.writer
            .flush()
            .await
            .map_err(|e| ToolError::Transport(format!("'{}' flush: {e}", self.server)))
    }
}

/// Read lines until the response to `id` arrives.
async fn read_response(server: &str, reader: &mut BoxedReader, id: u64) -> Result<Value, ToolError> {
    loop {
        let line = reader
            .next_line()
            .await
            .map_err(|e| ToolError::Transport(format!("'{server}' read: {e}")))?
            .ok_or_else(|| ToolError::Transport(format!("'{server}': server closed connection")))?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Ok(value) = serde_json::from_str::<Value>(line) else {
            debug!(server = %server, "Ignoring non-JSON output: {line}");
            continue;
        };
        match classify(value, id)? {
            Incoming::Response(resp) => return Ok(resp),
            Incoming::Skip => debug!(server = %server, "Skipping server message while awaiting {id}"),
        }
    }
}

#[async_trait]
impl McpTransport for StdioTransport {
    async fn request(&self, id: u64, message: Value) -> Result<Value, ToolError> {
        let method = method_of(&message).to_string();
        let mut io = self.io.lock().await;
        self.write_message(&mut io, &message).await?;

        let server = self.server.as_str();
        let read = read_response(server, &mut io.reader, id);

        tokio::time::timeout(self.timeout, read)
            .await
            .map_err(|_| ToolError::Timeout {
                tool_name: format!("{server}:{method}"),
                timeout_secs: self.timeout.as_secs(),
            })?
    }

    async fn notify(&self, message: Value) -> Result<(), ToolError> {
        let mut io = self.io.lock().await;
        self.write_message(&mut io, &message).await
    }

    async fn close(&self) -> Result<(), ToolError> {
        let mut child = self.child.lock().await;
        if let Some(mut child) = child.take() {
            child
                .kill()
                .await
                .map_err(|e| ToolError::Transport(format!("'{}' kill: {e}", self.server)))?;
            debug!(server = %self.server, "MCP server stopped");
        }
        Ok(())
    }
}

// --- streamable HTTP ---

const SESSION_HEADER: &str = "mcp-session-id";

/// MCP streamable HTTP: every message is a POST; responses come back as
/// plain JSON or as a short server-sent event stream.
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    bearer_token: Option<String>,
    timeout: Duration,
    session_id: std::sync::Mutex<Option<String>>,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>, bearer_token: Option<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .expect("Failed to build HTTP client"),
            url: url.into(),
            bearer_token,
            timeout,
            session_id: std::sync::Mutex::new(None),
        }
    }

    fn session_id(&self) -> Option<String> {
        self.session_id.lock().ok().and_then(|s| s.clone())
    }

    fn authorize(&self, mut request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }
        if let Some(session) = self.session_id() {
            request = request.header(SESSION_HEADER, session);
        }
        request
    }

    async fn post(&self, message: &Value) -> Result<reqwest::Response, ToolError> {
        let method = method_of(message).to_string();
        let request = self
            .client
            .post(&self.url)
            .header("accept", "application/json, text/event-stream")
            .json(message);
        let response = self.authorize(request).send().await.map_err(|e| {
            if e.is_timeout() {
                ToolError::Timeout {
                    tool_name: method.clone(),
                    timeout_secs: self.timeout.as_secs(),
                }
            } else {
                ToolError::Transport(e.to_string())
            }
        })?;

        if let Some(session) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            if let Ok(mut slot) = self.session_id.lock() {
                *slot = Some(session.to_string());
            }
        }

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ToolError::Transport(format!("{method}: HTTP {status}: {body}")));
        }
        Ok(response)
    }
}

/// Pull the `data:` payloads out of a server-sent event stream body.
fn sse_payloads(body: &str) -> Vec<String> {
    let mut events = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in body.lines() {
        if line.is_empty() {
            if !current.is_empty() {
                events.push(current.join("\n"));
                current.clear();
            }
        } else if let Some(data) = line.strip_prefix("data:") {
            current.push(data.strip_prefix(' ').unwrap_or(data));
        }
    }
    if !current.is_empty() {
        events.push(current.join("\n"));
    }
    events
}

#[async_trait]
impl McpTransport for HttpTransport {
    async fn request(&self, id: u64, message: Value) -> Result<Value, ToolError> {
        let response = self.post(&message).await?;
        let is_stream = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("text/event-stream"));
        let body = response
            .text()
            .await
            .map_err(|e| ToolError::Transport(e.to_string()))?;

        let candidates: Vec<Value> = if is_stream {
            sse_payloads(&body)
                .iter()
                .filter_map(|data| serde_json::from_str(data).ok())
                .collect()
        } else {
            match serde_json::from_str::<Value>(&body)
                .map_err(|e| ToolError::Protocol(format!("invalid JSON response: {e}")))?
            {
                Value::Array(batch) => batch,
                single => vec![single],
            }
        };

        for candidate in candidates {
            if let Incoming::Response(resp) = classify(candidate, id)? {
                return Ok(resp);
            }
        }
        Err(ToolError::Protocol(format!("no response for request {id}")))
    }

    async fn notify(&self, message: Value) -> Result<(), ToolError> {
        self.post(&message).await.map(|_| ())
    }

    async fn close(&self) -> Result<(), ToolError> {
        let Some(session) = self.session_id() else {
            return Ok(());
        };
        let request = self.authorize(self.client.delete(&self.url));
        match request.send().await {
            Ok(resp) if resp.status().is_success() || resp.status().as_u16() == 405 => Ok(()),
            Ok(resp) => {
                warn!(session = %session, status = %resp.status(), "MCP session delete rejected");
                Ok(())
            }
            Err(e) => Err(ToolError::Transport(e.to_string())),
        }
    }
}
