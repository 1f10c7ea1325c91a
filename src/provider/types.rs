//! Shared provider types: addresses, port maps, and per-backend configs.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::SandboxError;

/// Internal (container) port to allocated host port.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortMap(BTreeMap<u16, u16>);

impl PortMap {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn insert(&mut self, internal: u16, host: u16) {
        self.0.insert(internal, host);
    }

    /// Host port that `internal` was mapped to, if any.
    pub fn host_port(&self, internal: u16) -> Option<u16> {
        self.0.get(&internal).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u16, u16)> + '_ {
        self.0.iter().map(|(i, h)| (*i, *h))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

impl FromIterator<(u16, u16)> for PortMap {
    fn from_iter<T: IntoIterator<Item = (u16, u16)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Where a running instance can be reached from the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceAddress {
    pub host: String,
    pub ports: PortMap,
}

impl InstanceAddress {
    pub fn localhost(ports: PortMap) -> Self {
        Self {
            host: "localhost".to_string(),
            ports,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProbeMethod {
    #[default]
    Get,
    Post,
}

/// Readiness probe description. `endpoint` and `port` are both optional:
/// when either is missing the poller logs a warning and reports ready
/// without probing, so images without a health route still come up.
#[derive(Debug, Clone)]
pub struct HealthCheckConfig {
    /// Path on the in-container server, e.g. "/health".
    pub endpoint: Option<String>,
    /// Internal port the probe targets (mapped to a host port at runtime).
    pub port: Option<u16>,
    /// Delay between probe attempts.
    pub interval: Duration,
    pub method: ProbeMethod,
    pub headers: BTreeMap<String, String>,
    pub body: Option<serde_json::Value>,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            port: None,
            interval: Duration::from_secs(10),
            method: ProbeMethod::Get,
            headers: BTreeMap::new(),
            body: None,
        }
    }
}

fn default_lock_file() -> PathBuf {
    std::env::temp_dir().join("deskbox_port_allocation.lck")
}

/// Full description of a Docker-backed instance.
#[derive(Debug, Clone)]
pub struct DockerProviderConfig {
    pub image: String,
    /// Container ports to publish; each gets a dynamically allocated host port.
    pub ports_to_forward: BTreeSet<u16>,
    /// The forwarded port the automation server listens on.
    pub endpoint_port: u16,
    pub health: HealthCheckConfig,
    /// Container environment, merged into the image's.
    pub environment: BTreeMap<String, String>,
    /// Bind mounts in `host:container[:mode]` form.
    pub volumes: Vec<String>,
    /// Cross-process lock serializing port allocation across concurrent
    /// provisioners on the same machine.
    pub lock_file: PathBuf,
    pub privileged: bool,
    pub cap_add: Vec<String>,
    /// Device mappings in `host[:container[:permissions]]` form.
    pub devices: Vec<String>,
    pub user: Option<String>,
    /// Shared memory size, e.g. "4g".
    pub shm_size: Option<String>,
    /// Overall deadline for the instance to pass its readiness probe.
    pub ready_timeout: Duration,
}

impl Default for DockerProviderConfig {
    fn default() -> Self {
        Self {
            image: String::new(),
            ports_to_forward: BTreeSet::new(),
            endpoint_port: 8080,
            health: HealthCheckConfig::default(),
            environment: BTreeMap::new(),
            volumes: Vec::new(),
            lock_file: default_lock_file(),
            privileged: false,
            cap_add: Vec::new(),
            devices: Vec::new(),
            user: None,
            shm_size: None,
            ready_timeout: Duration::from_secs(1000),
        }
    }
}

impl DockerProviderConfig {
    /// Reject configurations that could only fail later in stranger ways.
    pub fn validate(&self) -> Result<(), SandboxError> {
        if self.image.is_empty() {
            return Err(SandboxError::UnsupportedConfiguration(
                "image must not be empty".to_string(),
            ));
        }
        if self.ports_to_forward.is_empty() {
            return Err(SandboxError::UnsupportedConfiguration(
                "at least one port must be forwarded".to_string(),
            ));
        }
        if !self.ports_to_forward.contains(&self.endpoint_port) {
            return Err(SandboxError::UnsupportedConfiguration(format!(
                "endpoint port {} is not in the forwarded set",
                self.endpoint_port
            )));
        }
        if let Some(port) = self.health.port {
            if !self.ports_to_forward.contains(&port) {
                return Err(SandboxError::UnsupportedConfiguration(format!(
                    "health check port {port} is not in the forwarded set"
                )));
            }
        }
        if let Some(shm) = &self.shm_size {
            crate::provider::docker::parse_size_bytes(shm).ok_or_else(|| {
                SandboxError::UnsupportedConfiguration(format!(
                    "invalid shm_size {shm:?}"
                ))
            })?;
        }
        Ok(())
    }
}

/// Config for the in-process fake backend used by tests.
#[derive(Debug, Clone)]
pub struct FakeProviderConfig {
    pub address: InstanceAddress,
}

impl FakeProviderConfig {
    /// A fake instance reachable at localhost with a single identity-mapped
    /// port.
    pub fn with_port(port: u16) -> Self {
        let mut ports = PortMap::new();
        ports.insert(port, port);
        Self {
            address: InstanceAddress::localhost(ports),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ProviderConfig {
    Docker(DockerProviderConfig),
    Fake(FakeProviderConfig),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> DockerProviderConfig {
        DockerProviderConfig {
            image: "example/desktop:latest".to_string(),
            ports_to_forward: [7860].into_iter().collect(),
            endpoint_port: 7860,
            ..Default::default()
        }
    }

    #[test]
    fn validate_accepts_minimal_config() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_image() {
        let cfg = DockerProviderConfig {
            image: String::new(),
            ..valid_config()
        };
        assert!(matches!(
            cfg.validate(),
            Err(SandboxError::UnsupportedConfiguration(_))
        ));
    }

    #[test]
    fn validate_rejects_unforwarded_endpoint_port() {
        let cfg = DockerProviderConfig {
            endpoint_port: 9999,
            ..valid_config()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("9999"));
    }

    #[test]
    fn validate_rejects_unforwarded_health_port() {
        let mut cfg = valid_config();
        cfg.health.port = Some(5900);
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("5900"));
    }

    #[test]
    fn validate_rejects_bad_shm_size() {
        let cfg = DockerProviderConfig {
            shm_size: Some("lots".to_string()),
            ..valid_config()
        };
        assert!(cfg.validate().is_err());
        let cfg = DockerProviderConfig {
            shm_size: Some("4g".to_string()),
            ..valid_config()
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn port_map_lookup() {
        let ports: PortMap = [(7860, 32801), (5900, 32802)].into_iter().collect();
        assert_eq!(ports.host_port(7860), Some(32801));
        assert_eq!(ports.host_port(5900), Some(32802));
        assert_eq!(ports.host_port(22), None);
        assert_eq!(ports.len(), 2);
    }

    #[test]
    fn fake_config_identity_port() {
        let cfg = FakeProviderConfig::with_port(7860);
        assert_eq!(cfg.address.host, "localhost");
        assert_eq!(cfg.address.ports.host_port(7860), Some(7860));
    }
}
