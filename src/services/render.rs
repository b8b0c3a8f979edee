//! Rendering engine adapters.
//!
//! A [`RenderClient`] turns a URL into a [`RenderedPage`] or a typed
//! [`RenderError`]. Two engines are provided:
//!
//! - [`ChromiumRenderer`] drives a local headless Chromium binary. Each browser
//!   command runs in its own process group, which is killed once the command
//!   finishes, times out or is abandoned.
//! - [`RemoteRenderer`] calls an HTTP rendering service.

use async_trait::async_trait;
use base64::Engine;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use strum::{AsRefStr, Display};
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::time::Instant;
use uuid::Uuid;

use crate::config::{AppConfig, ConfigError, RendererKind};

/// Output of a successful render.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPage {
    /// Document title; empty when the page has none.
    pub title: String,
    pub html: String,
    /// Visible body text, whitespace-collapsed.
    pub text: String,
    /// Full-page PNG screenshot, when the engine produced one.
    pub screenshot: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
pub enum RenderErrorKind {
    /// The page did not finish loading within the deadline.
    NavigationTimeout,
    /// DNS, connection, TLS or HTTP-level navigation failure.
    NavigationFailed,
    /// The rendering engine itself failed.
    RenderCrash,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct RenderError {
    pub kind: RenderErrorKind,
    pub message: String,
}

impl RenderError {
    pub fn timeout(after: Duration) -> Self {
        Self {
            kind: RenderErrorKind::NavigationTimeout,
            message: format!("render did not finish within {}s", after.as_secs_f64()),
        }
    }

    pub fn navigation(message: impl Into<String>) -> Self {
        Self {
            kind: RenderErrorKind::NavigationFailed,
            message: message.into(),
        }
    }

    pub fn crash(message: impl Into<String>) -> Self {
        Self {
            kind: RenderErrorKind::RenderCrash,
            message: message.into(),
        }
    }
}

/// Headless rendering capability.
#[async_trait]
pub trait RenderClient: Send + Sync {
    /// Render `url`, giving up after `timeout`.
    async fn render(&self, url: &str, timeout: Duration) -> Result<RenderedPage, RenderError>;
}

/// Extract the title and visible body text from an HTML document.
pub fn extract_title_and_text(html: &str) -> (String, String) {
    let doc = Html::parse_document(html);
    let title_sel = Selector::parse("title").expect("valid selector");
    let body_sel = Selector::parse("body").expect("valid selector");

    let title = doc
        .select(&title_sel)
        .next()
        .map(|t| collapse_whitespace(&t.text().collect::<String>()))
        .unwrap_or_default();

    let mut words = Vec::new();
    if let Some(body) = doc.select(&body_sel).next() {
        for node in body.descendants() {
            let Some(text) = node.value().as_text() else {
                continue;
            };
            let hidden = node.ancestors().any(|a| {
                a.value()
                    .as_element()
                    .map(|e| matches!(e.name(), "script" | "style" | "noscript" | "template"))
                    .unwrap_or(false)
            });
            if !hidden {
                words.extend(text.split_whitespace().map(str::to_string));
            }
        }
    }

    (title, words.join(" "))
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Headless Chromium driven through its command line.
pub struct ChromiumRenderer {
    binary: PathBuf,
    extra_args: Vec<String>,
    window_size: (u32, u32),
    scratch_dir: PathBuf,
}

struct ProcessOutput {
    status: ExitStatus,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

impl ChromiumRenderer {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            extra_args: Vec::new(),
            window_size: (1366, 768),
            scratch_dir: std::env::temp_dir(),
        }
    }

    /// Arguments placed before the generated flags (e.g. `--no-sandbox`).
    pub fn with_extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    pub fn with_window_size(mut self, width: u32, height: u32) -> Self {
        self.window_size = (width, height);
        self
    }

    /// Directory for temporary screenshot files.
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    fn command(&self, flags: &[String], url: &str) -> Command {
        let mut command = Command::new(&self.binary);
        command
            .args(&self.extra_args)
            .args(["--headless=new", "--disable-gpu", "--hide-scrollbars", "--mute-audio"])
            .args(flags)
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        {
            command.process_group(0);
        }
        command
    }

    /// Run a browser command to completion or until `budget` elapses.
    ///
    /// The budget covers the exit of the browser and the draining of its
    /// output pipes, which helpers that inherited them can hold open. The
    /// process group is killed on every exit path, including cancellation.
    async fn run_bounded(
        &self,
        mut command: Command,
        budget: Duration,
    ) -> Result<ProcessOutput, RenderError> {
        let mut child = command
            .spawn()
            .map_err(|e| RenderError::crash(format!("failed to launch {}: {}", self.binary.display(), e)))?;
        let group = ProcessGroupGuard::of(&child);

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let collect = async {
            let (status, stdout, stderr) =
                tokio::join!(child.wait(), read_pipe(stdout), read_pipe(stderr));
            status.map(|status| ProcessOutput {
                status,
                stdout,
                stderr,
            })
        };

        match tokio::time::timeout(budget, collect).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => {
                group.kill();
                terminate(&mut child).await;
                Err(RenderError::crash(format!("failed to wait for browser: {}", e)))
            }
            Err(_) => {
                group.kill();
                terminate(&mut child).await;
                Err(RenderError::timeout(budget))
            }
        }
    }

    async fn capture_screenshot(&self, url: &str, budget: Duration) -> Option<Vec<u8>> {
        let path = self.scratch_dir.join(format!("archive-hub-{}.png", Uuid::new_v4()));
        let (width, height) = self.window_size;
        let flags = vec![
            format!("--screenshot={}", path.display()),
            format!("--window-size={},{}", width, height),
        ];

        let result = self.run_bounded(self.command(&flags, url), budget).await;
        let bytes = match result {
            Ok(output) if output.status.success() => tokio::fs::read(&path).await.ok(),
            Ok(output) => {
                tracing::warn!(url = %url, exit_code = ?output.status.code(), "Screenshot command failed");
                None
            }
            Err(e) => {
                tracing::warn!(url = %url, kind = %e.kind, error = %e, "Screenshot capture failed");
                None
            }
        };
        let _ = tokio::fs::remove_file(&path).await;
        bytes
    }
}

async fn read_pipe<R: tokio::io::AsyncRead + Unpin>(pipe: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buf).await;
    }
    buf
}

/// Kills a browser's process group when dropped.
///
/// The browser leads its own group (`process_group(0)`), so this reaches
/// helpers that outlive it, which `kill_on_drop` does not.
struct ProcessGroupGuard {
    pgid: Option<u32>,
}

impl ProcessGroupGuard {
    fn of(child: &Child) -> Self {
        Self { pgid: child.id() }
    }

    fn kill(&self) {
        #[cfg(unix)]
        if let Some(pgid) = self.pgid {
            // ESRCH once the whole group is gone.
            unsafe {
                libc::killpg(pgid as libc::pid_t, libc::SIGKILL);
            }
        }
    }
}

impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Kill and reap the browser leader.
async fn terminate(child: &mut Child) {
    if let Err(e) = child.kill().await {
        tracing::debug!(error = %e, "Browser process already exited");
    }
}

/// Map Chromium's `net::ERR_*` diagnostics to a navigation failure.
fn navigation_error(stderr: &str) -> Option<RenderError> {
    let start = stderr.find("net::ERR_")?;
    let code: String = stderr[start..]
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == ':')
        .collect();
    if code == "net::ERR_TIMED_OUT" || code == "net::ERR_CONNECTION_TIMED_OUT" {
        return Some(RenderError {
            kind: RenderErrorKind::NavigationTimeout,
            message: code,
        });
    }
    Some(RenderError::navigation(code))
}

#[async_trait]
impl RenderClient for ChromiumRenderer {
    async fn render(&self, url: &str, timeout: Duration) -> Result<RenderedPage, RenderError> {
        let deadline = Instant::now() + timeout;
        let timeout_ms = timeout.as_millis().to_string();
        let flags = vec!["--dump-dom".to_string(), format!("--timeout={}", timeout_ms)];

        let output = self.run_bounded(self.command(&flags, url), timeout).await?;
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            return Err(navigation_error(&stderr).unwrap_or_else(|| {
                RenderError::crash(format!(
                    "browser exited with {}: {}",
                    output.status,
                    stderr.trim()
                ))
            }));
        }

        // Sub-resource failures also log net::ERR_*; only an empty or error-page
        // document means the main navigation failed.
        let html = String::from_utf8_lossy(&output.stdout).into_owned();
        if html.trim().is_empty() || html.contains("chrome-error://") {
            return Err(navigation_error(&stderr).unwrap_or_else(|| {
                RenderError::navigation("browser returned an empty document")
            }));
        }
        let (title, text) = extract_title_and_text(&html);

        let remaining = deadline.saturating_duration_since(Instant::now());
        let screenshot = if remaining.is_zero() {
            None
        } else {
            self.capture_screenshot(url, remaining).await
        };

        Ok(RenderedPage {
            title,
            html,
            text,
            screenshot,
        })
    }
}

#[derive(Serialize)]
struct RemoteRenderRequest<'a> {
    url: &'a str,
    timeout_ms: u64,
    full_page: bool,
}

#[derive(Deserialize)]
struct RemoteRenderResponse {
    #[serde(default)]
    title: Option<String>,
    html: String,
    #[serde(default)]
    text: Option<String>,
    /// Base64-encoded PNG.
    #[serde(default)]
    screenshot: Option<String>,
}

/// Client for an HTTP rendering service exposing `POST {endpoint}/render`.
pub struct RemoteRenderer {
    http: reqwest::Client,
    endpoint: String,
}

impl RemoteRenderer {
    pub fn new(endpoint: &str) -> Result<Self, RenderError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("archive-hub/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RenderError::crash(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl RenderClient for RemoteRenderer {
    async fn render(&self, url: &str, timeout: Duration) -> Result<RenderedPage, RenderError> {
        let request = RemoteRenderRequest {
            url,
            timeout_ms: timeout.as_millis() as u64,
            full_page: true,
        };

        let response = self
            .http
            .post(format!("{}/render", self.endpoint))
            .timeout(timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RenderError::timeout(timeout)
                } else {
                    RenderError::crash(format!("render service unreachable: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = format!("render service returned {}: {}", status, body.trim());
            return Err(match status.as_u16() {
                504 | 408 => RenderError {
                    kind: RenderErrorKind::NavigationTimeout,
                    message,
                },
                502 | 422 => RenderError::navigation(message),
                _ => RenderError::crash(message),
            });
        }

        let body: RemoteRenderResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                RenderError::timeout(timeout)
            } else {
                RenderError::crash(format!("invalid render service response: {}", e))
            }
        })?;

        let (dom_title, dom_text) = extract_title_and_text(&body.html);
        let screenshot = match body.screenshot {
            Some(encoded) => match base64::engine::general_purpose::STANDARD.decode(encoded) {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "Discarding undecodable screenshot");
                    None
                }
            },
            None => None,
        };

        Ok(RenderedPage {
            title: body.title.unwrap_or(dom_title),
            text: body.text.unwrap_or(dom_text),
            html: body.html,
            screenshot,
        })
    }
}

/// Build the render client selected by `RENDERER`.
pub fn from_config(config: &AppConfig) -> Result<Arc<dyn RenderClient>, ConfigError> {
    match config.renderer {
        RendererKind::Chromium => {
            let extra_args = config
                .chromium_args
                .as_deref()
                .map(|args| args.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default();
            Ok(Arc::new(
                ChromiumRenderer::new(&config.chromium_path).with_extra_args(extra_args),
            ))
        }
        RendererKind::Remote => {
            let endpoint = config
                .render_endpoint
                .as_deref()
                .ok_or(ConfigError::Missing("RENDER_ENDPOINT"))?;
            let client = RemoteRenderer::new(endpoint)
                .map_err(|e| ConfigError::Invalid(e.to_string()))?;
            Ok(Arc::new(client))
        }
    }
}
