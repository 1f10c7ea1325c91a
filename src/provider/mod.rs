//! Instance providers.
//!
//! A provider owns one backing instance (a Docker container, or an
//! in-process fake for tests) and exposes a uniform lifecycle: start,
//! stop, reset, and the address the instance is reachable at. The set of
//! backends is closed, so dispatch is an exhaustive match rather than a
//! trait object.

pub mod docker;
pub mod fake;
pub mod health;
pub mod ports;
pub mod types;

use crate::error::SandboxError;

pub use docker::DockerProvider;
pub use fake::FakeProvider;
pub use types::{
    DockerProviderConfig, FakeProviderConfig, HealthCheckConfig, InstanceAddress, PortMap,
    ProbeMethod, ProviderConfig,
};

#[derive(Debug)]
pub enum Provider {
    Docker(DockerProvider),
    Fake(FakeProvider),
}

impl Provider {
    pub fn build(config: ProviderConfig) -> Result<Self, SandboxError> {
        Ok(match config {
            ProviderConfig::Docker(cfg) => Provider::Docker(DockerProvider::new(cfg)?),
            ProviderConfig::Fake(cfg) => Provider::Fake(FakeProvider::new(cfg)),
        })
    }

    pub async fn start(&mut self) -> Result<(), SandboxError> {
        match self {
            Provider::Docker(p) => p.start().await,
            Provider::Fake(p) => p.start().await,
        }
    }

    /// Best-effort teardown; never fails.
    pub async fn stop(&mut self) {
        match self {
            Provider::Docker(p) => p.stop().await,
            Provider::Fake(p) => p.stop().await,
        }
    }

    pub async fn reset(&mut self) -> Result<(), SandboxError> {
        match self {
            Provider::Docker(p) => p.reset().await,
            Provider::Fake(p) => p.reset().await,
        }
    }

    pub fn address(&self) -> Result<InstanceAddress, SandboxError> {
        match self {
            Provider::Docker(p) => p.address(),
            Provider::Fake(p) => p.address(),
        }
    }

    /// Stable identifier of the backing instance, when the backend has one.
    pub fn instance_id(&self) -> Option<&str> {
        match self {
            Provider::Docker(p) => p.container_id(),
            Provider::Fake(_) => None,
        }
    }

    /// Persist instance state for later restoration. No current backend
    /// supports this.
    pub async fn save_state(&mut self) -> Result<(), SandboxError> {
        Err(SandboxError::Unsupported("save_state"))
    }

    /// Restore a previously saved snapshot. No current backend supports
    /// this.
    pub async fn revert_to_snapshot(&mut self) -> Result<(), SandboxError> {
        Err(SandboxError::Unsupported("revert_to_snapshot"))
    }
}
