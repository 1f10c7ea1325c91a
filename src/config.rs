//! User-facing environment options.

use std::collections::BTreeMap;
use std::time::Duration;

/// Default desktop image for Ubuntu environments.
pub const DEFAULT_IMAGE: &str = "amhma/ubuntu-desktop:22.04-0.1.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OsType {
    #[default]
    Ubuntu,
    Windows,
    MacOs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderKind {
    #[default]
    Docker,
    Aws,
    Hf,
}

/// How the per-session password protecting the automation server and the
/// stream viewer is chosen.
#[derive(Debug, Clone, Default)]
pub enum SessionPolicy {
    /// A random password per environment.
    #[default]
    Generate,
    Fixed(String),
    /// Run the in-container services unauthenticated.
    Disabled,
}

/// Options for [`DesktopEnv`](crate::env::DesktopEnv) construction. The
/// defaults describe a headful Ubuntu desktop on the Docker backend.
#[derive(Debug, Clone)]
pub struct SandboxOptions {
    pub os_type: OsType,
    pub provider: ProviderKind,
    /// Bind mounts in `host:container[:mode]` form.
    pub volumes: Vec<String>,
    /// Run without the live stream viewer.
    pub headless: bool,
    /// Desktop resolution (width, height).
    pub resolution: (u32, u32),
    pub disk_size: String,
    pub ram_size: String,
    pub cpu_cores: String,
    /// Shared memory size for the container, e.g. "4g".
    pub shm_size: String,
    pub session_password: SessionPolicy,
    /// Serve the noVNC stream viewer from the container.
    pub stream_server: bool,
    pub dpi: u32,
    /// Deadline for the environment to pass its readiness probe.
    pub ready_timeout: Duration,
    /// Override the desktop image; defaults to [`DEFAULT_IMAGE`].
    pub image: Option<String>,
    /// Extra container environment merged over the derived set.
    pub extra_env: BTreeMap<String, String>,
}

impl Default for SandboxOptions {
    fn default() -> Self {
        Self {
            os_type: OsType::Ubuntu,
            provider: ProviderKind::Docker,
            volumes: Vec::new(),
            headless: false,
            resolution: (1920, 1080),
            disk_size: "32G".to_string(),
            ram_size: "4G".to_string(),
            cpu_cores: "4".to_string(),
            shm_size: "4g".to_string(),
            session_password: SessionPolicy::Generate,
            stream_server: true,
            dpi: 96,
            ready_timeout: Duration::from_secs(1000),
            image: None,
            extra_env: BTreeMap::new(),
        }
    }
}

impl SandboxOptions {
    pub fn image(&self) -> &str {
        self.image.as_deref().unwrap_or(DEFAULT_IMAGE)
    }
}
