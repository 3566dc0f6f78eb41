//! Out-of-process transport that shells out to `curl`.
//!
//! Used where the in-process network stack cannot resolve a backend host.
//! The URL, headers and body are written to curl's stdin as a config file
//! so keys never appear in the process argument list.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::error::BackendError;
use super::trait_def::Transport;
use super::types::{BackendId, BackendRequest};
use super::wire::{self, Endpoints, WireRequest};

/// curl exit code for "operation timed out".
const CURL_TIMEOUT_EXIT: i32 = 28;

/// Extra wall time granted on top of curl's own `--max-time`.
const KILL_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct ProcessTransport {
    program: String,
    endpoints: Endpoints,
}

impl ProcessTransport {
    /// Use `curl` from `$PATH`.
    pub fn new() -> Self {
        Self::with_program("curl")
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            endpoints: Endpoints::default(),
        }
    }

    pub fn endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }
}

impl Default for ProcessTransport {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// curl config helpers
// ---------------------------------------------------------------------------

/// Quote `value` for a curl config file.
fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

/// Render the request as a curl config document.
fn render_config(wire: &WireRequest) -> Result<String, serde_json::Error> {
    let body = serde_json::to_string(&wire.body)?;
    let mut config = format!("url = {}\n", quote(&wire.url));
    for (name, value) in &wire.headers {
        config.push_str(&format!("header = {}\n", quote(&format!("{name}: {value}"))));
    }
    config.push_str(&format!("data-binary = {}\n", quote(&body)));
    Ok(config)
}

/// Split curl's stdout into the response body and the trailing status line
/// produced by `--write-out "\n%{http_code}"`.
fn split_status(backend: BackendId, stdout: &str) -> Result<(u16, &str), BackendError> {
    let (body, code) = stdout.rsplit_once('\n').unwrap_or(("", stdout));
    let status = code
        .trim()
        .parse::<u16>()
        .map_err(|_| BackendError::Malformed {
            backend,
            message: format!("curl printed no status code (tail {:?})", code.trim()),
        })?;
    Ok((status, body))
}

// ---------------------------------------------------------------------------
// Transport implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl Transport for ProcessTransport {
    fn name(&self) -> &str {
        "process"
    }

    async fn send(&self, req: &BackendRequest<'_>) -> Result<String, BackendError> {
        let backend = req.backend;
        let timeout = req.options.timeout;
        let wire = wire::build_request(self.endpoints.base_url(backend), req);
        let config = render_config(&wire).map_err(|e| BackendError::Malformed {
            backend,
            message: e.to_string(),
        })?;

        let transport_err = |message: String| BackendError::Transport { backend, message };

        let mut child = Command::new(&self.program)
            .args(["--silent", "--show-error", "--config", "-"])
            .args(["--write-out", "\n%{http_code}"])
            .arg("--max-time")
            .arg(timeout.as_secs().max(1).to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| transport_err(format!("failed to spawn {}: {e}", self.program)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(config.as_bytes())
                .await
                .map_err(|e| transport_err(format!("failed to write curl config: {e}")))?;
        }

        let output = match tokio::time::timeout(timeout + KILL_GRACE, child.wait_with_output()).await
        {
            Ok(result) => result.map_err(|e| transport_err(format!("curl did not exit: {e}")))?,
            Err(_) => return Err(BackendError::Timeout { backend, timeout }),
        };

        if !output.status.success() {
            if output.status.code() == Some(CURL_TIMEOUT_EXIT) {
                return Err(BackendError::Timeout { backend, timeout });
            }
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(transport_err(format!(
                "curl exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let (status, body) = split_status(backend, &stdout)?;
        debug!(%backend, status, bytes = body.len(), "curl responded");
        wire::decode_response(backend, status, body)
    }
}
