//! Ephemeral containerized desktop environments with a typed automation
//! client.
//!
//! A [`Sandbox`] provisions a throwaway Linux desktop in a Docker
//! container, waits for its automation server to come up, and exposes the
//! desktop's capabilities as typed async methods: shell and Python
//! execution, mouse and keyboard input, window management, file transfer,
//! screen recording, and a DevTools handle to the embedded browser.
//!
//! ```no_run
//! use deskbox::{Sandbox, SandboxOptions};
//!
//! # async fn run() -> Result<(), deskbox::SandboxError> {
//! let mut sandbox = Sandbox::open(SandboxOptions::default()).await?;
//! let resp = sandbox.execute_command("echo hello", false, None).await?;
//! println!("{}", resp.output);
//! sandbox.close().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod env;
pub mod error;
pub mod provider;
pub mod responses;
pub mod retry;
pub mod rpc;
pub mod sandbox;

pub use config::{DEFAULT_IMAGE, OsType, ProviderKind, SandboxOptions, SessionPolicy};
pub use env::{DesktopEnv, ENDPOINT_PORT, StreamViewer};
pub use error::SandboxError;
pub use provider::{
    DockerProvider, DockerProviderConfig, FakeProvider, FakeProviderConfig, HealthCheckConfig,
    InstanceAddress, PortMap, ProbeMethod, Provider, ProviderConfig,
};
pub use responses::{
    AccessibilityTreeResponse, CommandResponse, CursorPositionResponse, DesktopPathResponse,
    DirectoryNode, DirectoryTreeResponse, PlatformResponse, RecordingResponse,
    ScreenSizeResponse, Status, TerminalOutputResponse, WindowInfoResponse, WindowListResponse,
    WindowSizeResponse,
};
pub use retry::RetryPolicy;
pub use rpc::{FileUpload, RpcClient};
pub use sandbox::{BrowserSession, MouseButton, Sandbox, ScrollDirection};
