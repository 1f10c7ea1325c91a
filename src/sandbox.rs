//! Typed capability client for a provisioned desktop environment.
//!
//! [`Sandbox`] owns a [`DesktopEnv`] and speaks to its automation server
//! through the retrying [`RpcClient`]. Methods map one-to-one onto server
//! routes; the embedded browser's DevTools session is resolved lazily the
//! first time something needs it.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::config::SandboxOptions;
use crate::env::{DesktopEnv, StreamViewer};
use crate::error::SandboxError;
use crate::responses::{
    AccessibilityTreeResponse, CommandResponse, CursorPositionResponse, DesktopPathResponse,
    DirectoryTreeResponse, PlatformResponse, RecordingResponse, ScreenSizeResponse,
    TerminalOutputResponse, WindowInfoResponse, WindowListResponse, WindowSizeResponse,
};
use crate::retry::RetryPolicy;
use crate::rpc::{FileUpload, RpcClient};

const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(120);

/// How long to keep polling the embedded browser's DevTools endpoint
/// after a page open, while the browser is still launching.
const BROWSER_RETRY: RetryPolicy = RetryPolicy {
    attempts: 15,
    interval: Duration::from_secs(5),
    break_on_timeout: false,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl MouseButton {
    fn as_str(self) -> &'static str {
        match self {
            MouseButton::Left => "left",
            MouseButton::Right => "right",
            MouseButton::Middle => "middle",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDirection {
    Up,
    Down,
}

impl ScrollDirection {
    fn as_str(self) -> &'static str {
        match self {
            ScrollDirection::Up => "up",
            ScrollDirection::Down => "down",
        }
    }
}

/// DevTools connection details for the in-container browser.
#[derive(Debug, Clone)]
pub struct BrowserSession {
    pub ws_url: String,
}

pub struct Sandbox {
    env: DesktopEnv,
    rpc: RpcClient,
    browser: Mutex<Option<BrowserSession>>,
    pkgs_installed: Mutex<BTreeSet<String>>,
}

impl Sandbox {
    /// Provision a fresh environment and connect to it.
    pub async fn open(options: SandboxOptions) -> Result<Self, SandboxError> {
        let env = DesktopEnv::open(options).await?;
        Ok(Self::from_env(env))
    }

    pub(crate) fn from_env(env: DesktopEnv) -> Self {
        let rpc = RpcClient::new(env.api_url(), env.session_password().map(str::to_string));
        Self {
            env,
            rpc,
            browser: Mutex::new(None),
            pkgs_installed: Mutex::new(BTreeSet::new()),
        }
    }

    fn ensure_open(&self) -> Result<(), SandboxError> {
        if self.env.is_closed() {
            Err(SandboxError::Closed)
        } else {
            Ok(())
        }
    }

    /// Identifier of the backing instance, when the backend has one.
    pub fn sandbox_id(&self) -> Option<&str> {
        self.env.instance_id()
    }

    pub fn stream(&self) -> Option<&StreamViewer> {
        self.env.stream()
    }

    pub fn base_url(&self) -> &str {
        self.env.base_url()
    }

    // ── command execution ──

    /// Run a shell command in the environment. `timeout` bounds both the
    /// server-side execution and the HTTP request carrying it.
    pub async fn execute_command(
        &self,
        command: &str,
        background: bool,
        timeout: Option<Duration>,
    ) -> Result<CommandResponse, SandboxError> {
        self.ensure_open()?;
        let timeout = timeout.unwrap_or(DEFAULT_COMMAND_TIMEOUT);
        self.rpc
            .post_query_with_timeout(
                "/execute",
                vec![
                    ("command", command.to_string()),
                    ("background", background.to_string()),
                    ("timeout", timeout.as_secs().to_string()),
                ],
                Some(timeout),
            )
            .await
    }

    /// Run a Python expression, pip-installing `imports` first if this
    /// sandbox has not installed them yet.
    pub async fn execute_python(
        &self,
        command: &str,
        imports: &[&str],
    ) -> Result<CommandResponse, SandboxError> {
        self.ensure_open()?;
        {
            let mut installed = self.pkgs_installed.lock().await;
            for pkg in imports {
                if !installed.contains(*pkg) {
                    tracing::info!(package = pkg, "installing python package");
                    self.execute_command(&format!("pip install {pkg}"), false, None)
                        .await?;
                    installed.insert(pkg.to_string());
                }
            }
        }
        let prelude: String = imports.iter().map(|pkg| format!("import {pkg}; ")).collect();
        let code = format!("{prelude} {command}");
        let command_line = format!("python -c {}", shell_quote(&code));
        self.execute_command(&command_line, false, None).await
    }

    // ── observation ──

    /// PNG of the current desktop.
    pub async fn screenshot(&self) -> Result<Vec<u8>, SandboxError> {
        self.ensure_open()?;
        self.rpc.get_bytes("/screenshot").await
    }

    pub async fn accessibility_tree(&self) -> Result<AccessibilityTreeResponse, SandboxError> {
        self.ensure_open()?;
        self.rpc.get_json("/accessibility").await
    }

    pub async fn platform(&self) -> Result<PlatformResponse, SandboxError> {
        self.ensure_open()?;
        self.rpc.get_json("/platform").await
    }

    pub async fn desktop_path(&self) -> Result<DesktopPathResponse, SandboxError> {
        self.ensure_open()?;
        self.rpc.get_json("/desktop_path").await
    }

    pub async fn directory_tree(&self, path: &str) -> Result<DirectoryTreeResponse, SandboxError> {
        self.ensure_open()?;
        self.rpc
            .get_json_query("/list_directory", vec![("path", path.to_string())])
            .await
    }

    pub async fn terminal_output(&self) -> Result<TerminalOutputResponse, SandboxError> {
        self.ensure_open()?;
        self.rpc.get_json("/terminal").await
    }

    pub async fn cursor_position(&self) -> Result<(i32, i32), SandboxError> {
        self.ensure_open()?;
        let resp: CursorPositionResponse = self.rpc.get_json("/cursor_position").await?;
        Ok((resp.x, resp.y))
    }

    pub async fn screen_size(&self) -> Result<(u32, u32), SandboxError> {
        self.ensure_open()?;
        let resp: ScreenSizeResponse = self.rpc.get_json("/screen_size").await?;
        Ok((resp.width, resp.height))
    }

    // ── file transfer ──

    /// Copy a file out of the environment to `local_dest`.
    pub async fn download_file_from_remote(
        &self,
        remote_path: &str,
        local_dest: impl AsRef<Path>,
    ) -> Result<(), SandboxError> {
        self.ensure_open()?;
        let bytes = self
            .rpc
            .get_bytes_query("/file", vec![("file_path", remote_path.to_string())])
            .await?;
        tokio::fs::write(local_dest, bytes).await?;
        Ok(())
    }

    /// Copy a local file into the environment at `remote_path`.
    pub async fn upload_file_to_remote(
        &self,
        local_path: impl AsRef<Path>,
        remote_path: &str,
    ) -> Result<(), SandboxError> {
        self.ensure_open()?;
        let local_path = local_path.as_ref();
        let data = tokio::fs::read(local_path).await?;
        let file_name = local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.rpc
            .post_file(
                "/upload",
                FileUpload {
                    file_name,
                    data,
                    remote_path: remote_path.to_string(),
                },
            )
            .await
    }

    /// Have the environment itself download `url` to `remote_path`.
    pub async fn download_url_file_to_remote(
        &self,
        url: &str,
        remote_path: &str,
    ) -> Result<(), SandboxError> {
        self.ensure_open()?;
        self.rpc
            .post_query_unit(
                "/download_url",
                vec![("url", url.to_string()), ("path_name", remote_path.to_string())],
            )
            .await
    }

    // ── recording ──

    pub async fn start_recording(&self) -> Result<RecordingResponse, SandboxError> {
        self.ensure_open()?;
        self.rpc.post("/start_recording").await
    }

    /// Stop recording and download the capture to `dest`.
    pub async fn end_recording(
        &self,
        dest: impl AsRef<Path>,
    ) -> Result<RecordingResponse, SandboxError> {
        self.ensure_open()?;
        let metadata: RecordingResponse = self.rpc.post("/end_recording").await?;
        let bytes = self
            .rpc
            .get_bytes_query("/file", vec![("file_path", metadata.path.clone())])
            .await?;
        let dest = dest.as_ref();
        tokio::fs::write(dest, bytes).await?;
        Ok(RecordingResponse {
            path: dest.to_string_lossy().into_owned(),
            ..metadata
        })
    }

    // ── applications and windows ──

    /// Open a file or URL with the desktop's default handler (the server's
    /// `/open` route). Opening an http(s) URL also resolves the browser's
    /// DevTools session.
    pub async fn open_url(&self, file_or_url: &str) -> Result<(), SandboxError> {
        self.ensure_open()?;
        self.rpc
            .post_query_unit("/open", vec![("file_or_url", file_or_url.to_string())])
            .await?;
        if file_or_url.starts_with("http://") || file_or_url.starts_with("https://") {
            self.ensure_browser().await?;
        }
        Ok(())
    }

    pub async fn launch(
        &self,
        application: &str,
        wait_for_window: bool,
    ) -> Result<(), SandboxError> {
        self.ensure_open()?;
        self.rpc
            .post_query_unit(
                "/launch",
                vec![
                    ("application", application.to_string()),
                    ("wait_for_window", wait_for_window.to_string()),
                ],
            )
            .await
    }

    pub async fn current_window_id(&self) -> Result<Option<String>, SandboxError> {
        self.ensure_open()?;
        let resp: WindowInfoResponse = self.rpc.get_json("/current_window_id").await?;
        Ok(resp.window_id)
    }

    pub async fn application_windows(
        &self,
        application: &str,
    ) -> Result<Vec<WindowInfoResponse>, SandboxError> {
        self.ensure_open()?;
        let resp: WindowListResponse = self
            .rpc
            .get_json_query(
                "/application_windows",
                vec![("application", application.to_string())],
            )
            .await?;
        Ok(resp.windows)
    }

    pub async fn window_title(&self, window_id: &str) -> Result<Option<String>, SandboxError> {
        self.ensure_open()?;
        let resp: WindowInfoResponse = self
            .rpc
            .get_json_query("/window_name", vec![("window_id", window_id.to_string())])
            .await?;
        Ok(resp.window_name)
    }

    pub async fn window_size(&self, window_id: &str) -> Result<WindowSizeResponse, SandboxError> {
        self.ensure_open()?;
        self.rpc
            .get_json_query("/window_size", vec![("window_id", window_id.to_string())])
            .await
    }

    pub async fn activate_window(&self, window_id: &str) -> Result<(), SandboxError> {
        self.ensure_open()?;
        self.rpc
            .post_query_unit("/activate_window", vec![("window_id", window_id.to_string())])
            .await
    }

    pub async fn close_window(&self, window_id: &str) -> Result<(), SandboxError> {
        self.ensure_open()?;
        self.rpc
            .post_query_unit("/close_window", vec![("window_id", window_id.to_string())])
            .await
    }

    /// Ask the environment to idle for `ms` milliseconds.
    pub async fn wait(&self, ms: u64) -> Result<(), SandboxError> {
        self.ensure_open()?;
        self.rpc
            .post_query_unit("/wait", vec![("ms", ms.to_string())])
            .await
    }

    // ── input ──

    async fn click(&self, route: &str, at: Option<(i32, i32)>) -> Result<(), SandboxError> {
        self.ensure_open()?;
        let mut query = Vec::new();
        if let Some((x, y)) = at {
            query.push(("x", x.to_string()));
            query.push(("y", y.to_string()));
        }
        self.rpc.post_query_unit(route, query).await
    }

    /// Left-click, at a point or at the current cursor position.
    pub async fn left_click(&self, at: Option<(i32, i32)>) -> Result<(), SandboxError> {
        self.click("/left_click", at).await
    }

    pub async fn right_click(&self, at: Option<(i32, i32)>) -> Result<(), SandboxError> {
        self.click("/right_click", at).await
    }

    pub async fn middle_click(&self, at: Option<(i32, i32)>) -> Result<(), SandboxError> {
        self.click("/middle_click", at).await
    }

    pub async fn double_click(&self, at: Option<(i32, i32)>) -> Result<(), SandboxError> {
        self.click("/double_click", at).await
    }

    pub async fn scroll(
        &self,
        direction: ScrollDirection,
        amount: u32,
    ) -> Result<(), SandboxError> {
        self.ensure_open()?;
        self.rpc
            .post_query_unit(
                "/scroll",
                vec![
                    ("direction", direction.as_str().to_string()),
                    ("amount", amount.to_string()),
                ],
            )
            .await
    }

    pub async fn move_mouse(&self, x: i32, y: i32) -> Result<(), SandboxError> {
        self.ensure_open()?;
        self.rpc
            .post_query_unit("/move_mouse", vec![("x", x.to_string()), ("y", y.to_string())])
            .await
    }

    pub async fn mouse_press(&self, button: MouseButton) -> Result<(), SandboxError> {
        self.ensure_open()?;
        self.rpc
            .post_query_unit("/mouse_press", vec![("button", button.as_str().to_string())])
            .await
    }

    pub async fn mouse_release(&self, button: MouseButton) -> Result<(), SandboxError> {
        self.ensure_open()?;
        self.rpc
            .post_query_unit("/mouse_release", vec![("button", button.as_str().to_string())])
            .await
    }

    /// Type `text` at the current focus, one keystroke per `delay_in_ms`.
    pub async fn write(&self, text: &str, delay_in_ms: u32) -> Result<(), SandboxError> {
        self.ensure_open()?;
        self.rpc
            .post_query_unit(
                "/write",
                vec![
                    ("text", text.to_string()),
                    ("delay_in_ms", delay_in_ms.to_string()),
                ],
            )
            .await
    }

    /// Press a single key.
    pub async fn press(&self, key: &str) -> Result<(), SandboxError> {
        self.ensure_open()?;
        self.rpc
            .post_json_unit("/press", serde_json::json!(key))
            .await
    }

    /// Press a key combination, e.g. `["ctrl", "c"]`.
    pub async fn press_combo(&self, keys: &[&str]) -> Result<(), SandboxError> {
        self.ensure_open()?;
        self.rpc
            .post_json_unit("/press", serde_json::json!(keys))
            .await
    }

    pub async fn drag(&self, from: (i32, i32), to: (i32, i32)) -> Result<(), SandboxError> {
        self.ensure_open()?;
        self.rpc
            .post_json_unit(
                "/drag",
                serde_json::json!({
                    "fr": [from.0, from.1],
                    "to": [to.0, to.1],
                }),
            )
            .await
    }

    // ── browser ──

    /// DevTools WebSocket URL of the embedded browser, opening a page
    /// first if no browser is running yet.
    pub async fn browser_ws_url(&self) -> Result<String, SandboxError> {
        self.ensure_open()?;
        {
            let browser = self.browser.lock().await;
            if let Some(session) = browser.as_ref() {
                return Ok(session.ws_url.clone());
            }
        }
        self.open_url("https://www.google.com").await?;
        let browser = self.browser.lock().await;
        browser
            .as_ref()
            .map(|s| s.ws_url.clone())
            .ok_or_else(|| SandboxError::Provision("browser did not come up".to_string()))
    }

    async fn ensure_browser(&self) -> Result<(), SandboxError> {
        let mut browser = self.browser.lock().await;
        if browser.is_some() {
            return Ok(());
        }
        let session = resolve_browser_session(self.env.browser_url()).await?;
        tracing::info!(ws_url = %session.ws_url, "browser devtools session resolved");
        *browser = Some(session);
        Ok(())
    }

    // ── lifecycle ──

    /// Re-provision the backing instance. The automation client and any
    /// browser session are rebuilt, since ports may have moved.
    pub async fn reset(&mut self) -> Result<(), SandboxError> {
        self.env.reset().await?;
        self.rpc = RpcClient::new(
            self.env.api_url(),
            self.env.session_password().map(str::to_string),
        );
        *self.browser.lock().await = None;
        self.pkgs_installed.lock().await.clear();
        Ok(())
    }

    /// Tear the environment down. Idempotent; further calls return
    /// [`SandboxError::Closed`].
    pub async fn close(&mut self) {
        self.env.close().await;
    }

    /// Alias of [`close`](Self::close).
    pub async fn kill(&mut self) {
        self.close().await;
    }
}

/// Fetch the browser's DevTools descriptor from its debugging proxy.
/// The browser may still be starting, so this polls patiently.
async fn resolve_browser_session(browser_url: &str) -> Result<BrowserSession, SandboxError> {
    let url = format!("{}json/version", browser_url);
    let http = reqwest::Client::new();
    crate::retry::retry(&BROWSER_RETRY, "resolve browser session", || {
        let url = url.clone();
        let http = http.clone();
        async move {
            let response = http.get(&url).send().await?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(SandboxError::Rpc {
                    method: "GET".to_string(),
                    url,
                    status: status.as_u16(),
                    body,
                });
            }
            let value: serde_json::Value = response.json().await?;
            let ws_url = value
                .get("webSocketDebuggerUrl")
                .and_then(|v| v.as_str())
                .ok_or_else(|| {
                    SandboxError::Serde("missing webSocketDebuggerUrl".to_string())
                })?;
            Ok(BrowserSession {
                ws_url: ws_url.to_string(),
            })
        }
    })
    .await
}

/// POSIX shell quoting: safe words pass through, anything else is
/// single-quoted with embedded quotes escaped.
fn shell_quote(s: &str) -> String {
    if !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || "@%+=:,./-_".contains(c))
    {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', "'\"'\"'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::ENDPOINT_PORT;
    use crate::provider::{FakeProvider, FakeProviderConfig, InstanceAddress, PortMap, Provider};
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use axum::Router;
    use axum::extract::{Query as AxumQuery, State};
    use axum::routing::{get, post};

    fn init_logs() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    }

    async fn serve(router: Router) -> (u16, tokio::task::JoinHandle<()>) {
        init_logs();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        (port, handle)
    }

    async fn sandbox_against(port: u16, password: Option<&str>) -> Sandbox {
        let mut ports = PortMap::new();
        ports.insert(ENDPOINT_PORT, port);
        let provider = Provider::Fake(FakeProvider::new(FakeProviderConfig {
            address: InstanceAddress {
                host: "127.0.0.1".to_string(),
                ports,
            },
        }));
        let env = DesktopEnv::bootstrap(provider, password.map(str::to_string), false)
            .await
            .unwrap();
        Sandbox::from_env(env)
    }

    #[tokio::test]
    async fn execute_command_round_trip() {
        let router = Router::new().route(
            "/api/execute",
            post(|AxumQuery(params): AxumQuery<HashMap<String, String>>| async move {
                assert_eq!(params["command"], "echo hi");
                assert_eq!(params["background"], "false");
                axum::Json(serde_json::json!({
                    "status": "success",
                    "output": "hi\n",
                    "returncode": 0
                }))
            }),
        );
        let (port, server) = serve(router).await;

        let sandbox = sandbox_against(port, None).await;
        let resp = sandbox.execute_command("echo hi", false, None).await.unwrap();
        assert_eq!(resp.output, "hi\n");
        assert_eq!(resp.returncode, 0);
        server.abort();
    }

    #[tokio::test]
    async fn execute_python_installs_imports_once() {
        let installs = Arc::new(AtomicU32::new(0));
        let state = Arc::clone(&installs);
        let router = Router::new()
            .route(
                "/api/execute",
                post(
                    |State(installs): State<Arc<AtomicU32>>,
                     AxumQuery(params): AxumQuery<HashMap<String, String>>| async move {
                        if params["command"].starts_with("pip install") {
                            installs.fetch_add(1, Ordering::SeqCst);
                        }
                        axum::Json(serde_json::json!({"output": "", "returncode": 0}))
                    },
                ),
            )
            .with_state(state);
        let (port, server) = serve(router).await;

        let sandbox = sandbox_against(port, None).await;
        sandbox.execute_python("print(1)", &["requests"]).await.unwrap();
        sandbox.execute_python("print(2)", &["requests"]).await.unwrap();
        assert_eq!(installs.load(Ordering::SeqCst), 1);
        server.abort();
    }

    #[tokio::test]
    async fn screenshot_returns_raw_png_bytes() {
        let router = Router::new().route(
            "/api/screenshot",
            get(|| async { vec![0x89u8, b'P', b'N', b'G'] }),
        );
        let (port, server) = serve(router).await;

        let sandbox = sandbox_against(port, None).await;
        let bytes = sandbox.screenshot().await.unwrap();
        assert_eq!(&bytes[..4], &[0x89, b'P', b'N', b'G']);
        server.abort();
    }

    #[tokio::test]
    async fn upload_then_download_round_trip() {
        let stored: Arc<tokio::sync::Mutex<HashMap<String, Vec<u8>>>> = Arc::default();
        let upload_state = Arc::clone(&stored);
        let download_state = Arc::clone(&stored);
        let router = Router::new()
            .route(
                "/api/upload",
                post(
                    move |mut multipart: axum::extract::Multipart| {
                        let stored = Arc::clone(&upload_state);
                        async move {
                            let mut data = Vec::new();
                            let mut path = String::new();
                            while let Some(field) = multipart.next_field().await.unwrap() {
                                match field.name().unwrap_or_default() {
                                    "file_data" => data = field.bytes().await.unwrap().to_vec(),
                                    "file_path" => path = field.text().await.unwrap(),
                                    _ => {}
                                }
                            }
                            stored.lock().await.insert(path, data);
                            axum::http::StatusCode::OK
                        }
                    },
                ),
            )
            .route(
                "/api/file",
                get(
                    move |AxumQuery(params): AxumQuery<HashMap<String, String>>| {
                        let stored = Arc::clone(&download_state);
                        async move {
                            stored
                                .lock()
                                .await
                                .get(&params["file_path"])
                                .cloned()
                                .unwrap_or_default()
                        }
                    },
                ),
            );
        let (port, server) = serve(router).await;

        let dir = tempfile::tempdir().unwrap();
        let local_src = dir.path().join("src.txt");
        let local_dest = dir.path().join("dest.txt");
        tokio::fs::write(&local_src, b"round trip").await.unwrap();

        let sandbox = sandbox_against(port, None).await;
        sandbox
            .upload_file_to_remote(&local_src, "/root/Desktop/src.txt")
            .await
            .unwrap();
        sandbox
            .download_file_from_remote("/root/Desktop/src.txt", &local_dest)
            .await
            .unwrap();
        assert_eq!(tokio::fs::read(&local_dest).await.unwrap(), b"round trip");
        server.abort();
    }

    #[tokio::test]
    async fn end_recording_downloads_the_capture() {
        let router = Router::new()
            .route(
                "/api/end_recording",
                post(|| async {
                    axum::Json(serde_json::json!({
                        "path": "/tmp/rec.mp4",
                        "size": 4,
                        "format": "mp4"
                    }))
                }),
            )
            .route(
                "/api/file",
                get(|AxumQuery(params): AxumQuery<HashMap<String, String>>| async move {
                    assert_eq!(params["file_path"], "/tmp/rec.mp4");
                    b"mp4!".to_vec()
                }),
            );
        let (port, server) = serve(router).await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("capture.mp4");

        let sandbox = sandbox_against(port, None).await;
        let resp = sandbox.end_recording(&dest).await.unwrap();
        assert_eq!(resp.path, dest.to_string_lossy());
        assert_eq!(resp.format, "mp4");
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"mp4!");
        server.abort();
    }

    #[tokio::test]
    async fn open_url_resolves_browser_session() {
        let router = Router::new()
            .route(
                "/api/open",
                post(|AxumQuery(params): AxumQuery<HashMap<String, String>>| async move {
                    assert_eq!(params["file_or_url"], "https://example.com");
                    axum::http::StatusCode::OK
                }),
            )
            .route(
                "/browser/json/version",
                get(|| async {
                    axum::Json(serde_json::json!({
                        "webSocketDebuggerUrl": "ws://127.0.0.1:1/devtools/browser/abc"
                    }))
                }),
            );
        let (port, server) = serve(router).await;

        let sandbox = sandbox_against(port, None).await;
        sandbox.open_url("https://example.com").await.unwrap();
        let ws = sandbox.browser_ws_url().await.unwrap();
        assert_eq!(ws, "ws://127.0.0.1:1/devtools/browser/abc");
        server.abort();
    }

    #[tokio::test]
    async fn input_routes_receive_coordinates() {
        let router = Router::new()
            .route(
                "/api/left_click",
                post(|AxumQuery(params): AxumQuery<HashMap<String, String>>| async move {
                    assert_eq!(params["x"], "10");
                    assert_eq!(params["y"], "20");
                    axum::http::StatusCode::OK
                }),
            )
            .route(
                "/api/double_click",
                post(|AxumQuery(params): AxumQuery<HashMap<String, String>>| async move {
                    assert!(params.is_empty());
                    axum::http::StatusCode::OK
                }),
            )
            .route(
                "/api/drag",
                post(|axum::Json(body): axum::Json<serde_json::Value>| async move {
                    assert_eq!(body["fr"], serde_json::json!([0, 0]));
                    assert_eq!(body["to"], serde_json::json!([5, 5]));
                    axum::http::StatusCode::OK
                }),
            );
        let (port, server) = serve(router).await;

        let sandbox = sandbox_against(port, None).await;
        sandbox.left_click(Some((10, 20))).await.unwrap();
        sandbox.double_click(None).await.unwrap();
        sandbox.drag((0, 0), (5, 5)).await.unwrap();
        server.abort();
    }

    #[tokio::test]
    async fn closed_sandbox_rejects_calls() {
        let (port, server) = serve(Router::new()).await;
        let mut sandbox = sandbox_against(port, None).await;
        sandbox.close().await;
        assert!(matches!(
            sandbox.screenshot().await,
            Err(SandboxError::Closed)
        ));
        assert!(matches!(
            sandbox.execute_command("ls", false, None).await,
            Err(SandboxError::Closed)
        ));
        // close is idempotent
        sandbox.kill().await;
        server.abort();
    }

    #[test]
    fn shell_quote_matches_posix_rules() {
        assert_eq!(shell_quote("simple-word_1.py"), "simple-word_1.py");
        assert_eq!(shell_quote("two words"), "'two words'");
        assert_eq!(shell_quote("it's"), "'it'\"'\"'s'");
        assert_eq!(shell_quote(""), "''");
        assert_eq!(
            shell_quote("import os;  print(1)"),
            "'import os;  print(1)'"
        );
    }
}
