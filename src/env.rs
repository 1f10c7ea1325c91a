//! Desktop environment lifecycle and URL derivation.
//!
//! [`DesktopEnv`] turns user-facing [`SandboxOptions`] into a provider
//! config, starts the backing instance, and derives the URLs everything
//! else uses: the API root the capability client talks to, the embedded
//! browser's debugging proxy, and the noVNC stream viewer.

use std::collections::BTreeMap;

use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};

use crate::config::{OsType, ProviderKind, SandboxOptions, SessionPolicy};
use crate::error::SandboxError;
use crate::provider::{
    DockerProviderConfig, HealthCheckConfig, InstanceAddress, Provider, ProviderConfig,
};

/// Port the automation server listens on inside the container.
pub const ENDPOINT_PORT: u16 = 7860;

/// A provisioned desktop instance: the provider that owns it plus the
/// derived connection surface.
#[derive(Debug)]
pub struct DesktopEnv {
    provider: Provider,
    address: InstanceAddress,
    session_password: Option<String>,
    base_url: String,
    api_url: String,
    browser_url: String,
    stream: Option<StreamViewer>,
    closed: bool,
}

/// Connection details for the noVNC viewer served from the container.
#[derive(Debug, Clone)]
pub struct StreamViewer {
    base_url: String,
    host: String,
    port: u16,
    password: Option<String>,
}

impl StreamViewer {
    /// Viewer page URL without credentials.
    pub fn url(&self) -> String {
        format!(
            "{}/vnc.html?host={}&port={}&autoconnect=true",
            self.base_url, self.host, self.port
        )
    }

    /// Viewer page URL with the session password as a query parameter.
    pub fn url_with_auth(&self) -> String {
        match &self.password {
            Some(password) => {
                let encoded = utf8_percent_encode(password, NON_ALPHANUMERIC);
                format!("{}&password={}", self.url(), encoded)
            }
            None => self.url(),
        }
    }

    /// The raw session password, when the stream is protected.
    pub fn auth_key(&self) -> Option<&str> {
        self.password.as_deref()
    }
}

fn resolve_password(policy: &SessionPolicy) -> Option<String> {
    match policy {
        SessionPolicy::Generate => Some(uuid::Uuid::new_v4().simple().to_string()),
        SessionPolicy::Fixed(password) => Some(password.clone()),
        SessionPolicy::Disabled => {
            tracing::warn!("session password disabled, in-container services are unauthenticated");
            None
        }
    }
}

/// Container environment derived from the options. Resource hints are
/// consumed by the image's init, not enforced by the engine.
fn container_env(
    options: &SandboxOptions,
    password: Option<&str>,
    stream_server: bool,
) -> BTreeMap<String, String> {
    let (width, height) = options.resolution;
    let mut env = BTreeMap::new();
    env.insert("DISK_SIZE".to_string(), options.disk_size.clone());
    env.insert("RAM_SIZE".to_string(), options.ram_size.clone());
    env.insert("CPU_CORES".to_string(), options.cpu_cores.clone());
    env.insert("SCREEN_SIZE".to_string(), format!("{width}x{height}x24"));
    env.insert("SERVER_TYPE".to_string(), "fastapi".to_string());
    env.insert("DPI".to_string(), options.dpi.to_string());
    env.insert("ENDPOINT_PORT".to_string(), ENDPOINT_PORT.to_string());
    env.insert(
        "NOVNC_SERVER_ENABLED".to_string(),
        stream_server.to_string(),
    );
    if let Some(password) = password {
        env.insert("SESSION_PASSWORD".to_string(), password.to_string());
    }
    for (k, v) in &options.extra_env {
        env.insert(k.clone(), v.clone());
    }
    env
}

fn compose(
    options: &SandboxOptions,
    password: Option<&str>,
    stream_server: bool,
) -> Result<ProviderConfig, SandboxError> {
    match (options.os_type, options.provider) {
        (OsType::Ubuntu, ProviderKind::Docker) => {}
        (os, provider) => {
            return Err(SandboxError::UnsupportedConfiguration(format!(
                "{os:?} on {provider:?} is not supported"
            )));
        }
    }

    Ok(ProviderConfig::Docker(DockerProviderConfig {
        image: options.image().to_string(),
        ports_to_forward: [ENDPOINT_PORT].into_iter().collect(),
        endpoint_port: ENDPOINT_PORT,
        health: HealthCheckConfig {
            endpoint: Some("/health".to_string()),
            port: Some(ENDPOINT_PORT),
            ..Default::default()
        },
        environment: container_env(options, password, stream_server),
        volumes: options.volumes.clone(),
        shm_size: Some(options.shm_size.clone()),
        ready_timeout: options.ready_timeout,
        ..Default::default()
    }))
}

impl DesktopEnv {
    /// Provision an environment per `options` and wait until it is ready.
    pub async fn open(options: SandboxOptions) -> Result<Self, SandboxError> {
        let stream_server = options.stream_server;
        let headless = options.headless || !stream_server;
        if !stream_server && !options.headless {
            tracing::warn!("stream server disabled, forcing headless mode");
        }

        let password = resolve_password(&options.session_password);
        let config = compose(&options, password.as_deref(), stream_server)?;
        let provider = Provider::build(config)?;
        Self::bootstrap(provider, password, stream_server && !headless).await
    }

    /// Start `provider` and derive the connection surface. Separated from
    /// [`open`](Self::open) so tests can drive the lifecycle with a fake
    /// backend.
    pub(crate) async fn bootstrap(
        mut provider: Provider,
        session_password: Option<String>,
        stream: bool,
    ) -> Result<Self, SandboxError> {
        provider.start().await?;
        // The instance is running from here on; a failure deriving the
        // connection surface must tear it down before propagating.
        let derived = derive_surface(&provider, &session_password, stream);
        let (address, base_url, api_url, browser_url, stream) = match derived {
            Ok(parts) => parts,
            Err(e) => {
                provider.stop().await;
                return Err(e);
            }
        };
        tracing::info!(%base_url, "desktop environment ready");
        Ok(Self {
            provider,
            address,
            session_password,
            base_url,
            api_url,
            browser_url,
            stream,
            closed: false,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Root of the automation server's API.
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Debugging proxy for the in-container browser.
    pub fn browser_url(&self) -> &str {
        &self.browser_url
    }

    pub fn address(&self) -> &InstanceAddress {
        &self.address
    }

    pub fn session_password(&self) -> Option<&str> {
        self.session_password.as_deref()
    }

    pub fn stream(&self) -> Option<&StreamViewer> {
        self.stream.as_ref()
    }

    pub fn instance_id(&self) -> Option<&str> {
        self.provider.instance_id()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn ensure_open(&self) -> Result<(), SandboxError> {
        if self.closed {
            Err(SandboxError::Closed)
        } else {
            Ok(())
        }
    }

    /// Tear down and re-provision the backing instance. Ports may move,
    /// so all URLs are re-derived.
    pub async fn reset(&mut self) -> Result<(), SandboxError> {
        self.ensure_open()?;
        self.provider.reset().await?;
        self.address = self.provider.address()?;
        let (base_url, api_url, browser_url) = derive_urls(&self.address)?;
        self.base_url = base_url;
        self.api_url = api_url;
        self.browser_url = browser_url;
        if self.stream.is_some() {
            self.stream = Some(stream_viewer(
                &self.base_url,
                &self.address,
                self.session_password.clone(),
            )?);
        }
        tracing::info!(base_url = %self.base_url, "environment reset");
        Ok(())
    }

    /// Tear the environment down. Idempotent and infallible; provider
    /// teardown failures are logged, not raised.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.provider.stop().await;
        self.closed = true;
        tracing::info!("environment closed");
    }
}

type Surface = (InstanceAddress, String, String, String, Option<StreamViewer>);

fn derive_surface(
    provider: &Provider,
    session_password: &Option<String>,
    stream: bool,
) -> Result<Surface, SandboxError> {
    let address = provider.address()?;
    let (base_url, api_url, browser_url) = derive_urls(&address)?;
    let stream = if stream {
        Some(stream_viewer(&base_url, &address, session_password.clone())?)
    } else {
        None
    };
    Ok((address, base_url, api_url, browser_url, stream))
}

fn derive_urls(address: &InstanceAddress) -> Result<(String, String, String), SandboxError> {
    let port = address
        .ports
        .host_port(ENDPOINT_PORT)
        .ok_or(SandboxError::NotStarted)?;
    let base = format!("http://{}:{}", address.host, port);
    let api = format!("{base}/api");
    let browser = format!("{base}/browser/");
    Ok((base, api, browser))
}

fn stream_viewer(
    base_url: &str,
    address: &InstanceAddress,
    password: Option<String>,
) -> Result<StreamViewer, SandboxError> {
    let port = address
        .ports
        .host_port(ENDPOINT_PORT)
        .ok_or(SandboxError::NotStarted)?;
    Ok(StreamViewer {
        base_url: base_url.to_string(),
        host: address.host.clone(),
        port,
        password,
    })
}
