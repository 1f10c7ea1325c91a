use std::time::Duration;

/// Errors from sandbox provisioning and RPC operations.
///
/// Provisioning-phase variants (`PortExhausted`, `LockTimeout`,
/// `ReadinessTimeout`, `Provision`, ...) abort construction entirely; the
/// partially started backing resource is torn down before they propagate.
/// `Unsupported` is the expected return for capability-gated operations a
/// particular backend does not implement (e.g. snapshots on the Docker
/// backend).
#[derive(thiserror::Error, Debug)]
pub enum SandboxError {
    #[error("no free host port at or above {start}")]
    PortExhausted { start: u16 },

    #[error("could not acquire port allocation lock {path} within {timeout:?}")]
    LockTimeout { path: String, timeout: Duration },

    #[error("environment not started - ports not allocated")]
    NotStarted,

    #[error("environment failed to become ready within {timeout:?}")]
    ReadinessTimeout { timeout: Duration },

    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    #[error("unsupported configuration: {0}")]
    UnsupportedConfiguration(String),

    #[error("{method} {url} returned {status}: {body}")]
    Rpc {
        method: String,
        url: String,
        status: u16,
        body: String,
    },

    #[error("{op} failed after {attempts} attempts")]
    RetryExhausted {
        op: String,
        attempts: u32,
        #[source]
        source: Box<SandboxError>,
    },

    #[error("environment is closed")]
    Closed,

    #[error("provision failed: {0}")]
    Provision(String),

    #[error("http: {0}")]
    Http(#[from] reqwest::Error),

    #[error("docker: {0}")]
    Docker(#[from] bollard::errors::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization: {0}")]
    Serde(String),

    /// Timeout of a single call (not the readiness deadline). Mainly produced
    /// by transports; used by the retry layer's `break_on_timeout` policy.
    #[error("timeout")]
    Timeout,
}

impl SandboxError {
    /// Whether this error is a per-call timeout. The retry layer stops
    /// immediately on these when `break_on_timeout` is set.
    pub fn is_timeout(&self) -> bool {
        match self {
            SandboxError::Timeout => true,
            SandboxError::Http(e) => e.is_timeout(),
            _ => false,
        }
    }
}
