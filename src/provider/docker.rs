//! Docker-backed instance lifecycle.
//!
//! Provisioning is strictly ordered: pull the image if missing, take the
//! cross-process port lock, allocate one host port per forwarded container
//! port, create and start the container, release the lock, then poll the
//! readiness probe. Any failure after the container exists tears it down
//! before the error propagates, so a failed start never leaks a container.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use bollard::Docker;
use bollard::models::{ContainerCreateBody, DeviceMapping, HostConfig, PortBinding};
use bollard::query_parameters::{
    CreateContainerOptions, CreateImageOptionsBuilder, ListContainersOptions,
    RemoveContainerOptionsBuilder, StartContainerOptions, StopContainerOptionsBuilder,
};
use futures::StreamExt;

use crate::error::SandboxError;
use crate::provider::health::wait_until_ready;
use crate::provider::ports::{DEFAULT_LOCK_TIMEOUT, PortLock, bind_probe, next_free_port};
use crate::provider::types::{DockerProviderConfig, InstanceAddress, PortMap};

/// Containers stop asynchronously; give the daemon a moment to release
/// published ports before the next allocation scan.
const STOP_SETTLE: Duration = Duration::from_secs(3);

pub struct DockerProvider {
    /// Engine handle, connected on first use so constructing a provider
    /// (and calling `stop` before any start) needs no daemon.
    docker: Option<Docker>,
    config: DockerProviderConfig,
    container_id: Option<String>,
    ports: PortMap,
    http: reqwest::Client,
}

impl std::fmt::Debug for DockerProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DockerProvider")
            .field("image", &self.config.image)
            .field("container_id", &self.container_id)
            .field("ports", &self.ports)
            .finish_non_exhaustive()
    }
}

impl DockerProvider {
    pub fn new(config: DockerProviderConfig) -> Result<Self, SandboxError> {
        config.validate()?;
        Ok(Self {
            docker: None,
            config,
            container_id: None,
            ports: PortMap::new(),
            http: reqwest::Client::new(),
        })
    }

    pub fn config(&self) -> &DockerProviderConfig {
        &self.config
    }

    /// Handle to the engine, connecting on first use. Clones are cheap;
    /// bollard shares the underlying transport.
    fn engine(&mut self) -> Result<Docker, SandboxError> {
        match &self.docker {
            Some(docker) => Ok(docker.clone()),
            None => {
                let docker = Docker::connect_with_local_defaults()?;
                self.docker = Some(docker.clone());
                Ok(docker)
            }
        }
    }

    /// Pull, allocate, create, start, wait for readiness. On any failure
    /// after creation the container is stopped and removed before the
    /// error is returned.
    pub async fn start(&mut self) -> Result<(), SandboxError> {
        match self.start_inner().await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::error!(error = %e, "instance start failed, tearing down");
                self.stop().await;
                Err(e)
            }
        }
    }

    async fn start_inner(&mut self) -> Result<(), SandboxError> {
        let docker = self.engine()?;
        self.ensure_image(&docker).await?;

        let allocated = {
            let _lock =
                PortLock::acquire(&self.config.lock_file, DEFAULT_LOCK_TIMEOUT).await?;
            let mut claimed = self.used_docker_ports(&docker).await?;
            let mut allocated = PortMap::new();
            // Scan upward from the internal port, so mappings stay close
            // to the ports they forward.
            for &internal in &self.config.ports_to_forward {
                let host = next_free_port(internal, |p| {
                    !claimed.contains(&p) && bind_probe(p)
                })?;
                claimed.insert(host);
                allocated.insert(internal, host);
            }
            // Container creation happens under the lock so concurrent
            // provisioners see these ports as taken.
            self.create_and_start(&docker, &allocated).await?;
            allocated
        };

        self.ports = allocated;
        let address = self.address()?;
        wait_until_ready(
            &self.http,
            &self.config.health,
            &address,
            self.config.ready_timeout,
        )
        .await
    }

    async fn create_and_start(
        &mut self,
        docker: &Docker,
        ports: &PortMap,
    ) -> Result<(), SandboxError> {
        let env: Vec<String> = self
            .config
            .environment
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        tracing::info!(
            image = %self.config.image,
            ports = ?ports,
            env = ?mask_env(&self.config.environment),
            "creating container"
        );

        let exposed_ports: HashMap<String, HashMap<(), ()>> = self
            .config
            .ports_to_forward
            .iter()
            .map(|p| (format!("{p}/tcp"), HashMap::new()))
            .collect();

        let host_config = HostConfig {
            binds: if self.config.volumes.is_empty() {
                None
            } else {
                Some(self.config.volumes.clone())
            },
            port_bindings: Some(port_bindings(ports)),
            privileged: Some(self.config.privileged),
            cap_add: if self.config.cap_add.is_empty() {
                None
            } else {
                Some(self.config.cap_add.clone())
            },
            devices: if self.config.devices.is_empty() {
                None
            } else {
                Some(device_mappings(&self.config.devices))
            },
            shm_size: self
                .config
                .shm_size
                .as_deref()
                .and_then(parse_size_bytes),
            ..Default::default()
        };

        let body = ContainerCreateBody {
            image: Some(self.config.image.clone()),
            env: Some(env),
            exposed_ports: Some(exposed_ports),
            user: self.config.user.clone(),
            host_config: Some(host_config),
            ..Default::default()
        };

        let id = docker
            .create_container(None::<CreateContainerOptions>, body)
            .await?
            .id;
        self.container_id = Some(id.clone());
        docker
            .start_container(&id, None::<StartContainerOptions>)
            .await?;
        tracing::info!(container_id = %id, "container started");
        Ok(())
    }

    /// Pull the configured image if it is not present locally.
    async fn ensure_image(&self, docker: &Docker) -> Result<(), SandboxError> {
        match docker.inspect_image(&self.config.image).await {
            Ok(_) => return Ok(()),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => {
                tracing::info!(image = %self.config.image, "image not found locally, pulling");
            }
            Err(e) => return Err(e.into()),
        }

        let options = CreateImageOptionsBuilder::default()
            .from_image(&self.config.image)
            .build();
        let mut pull = docker.create_image(Some(options), None, None);
        while let Some(item) = pull.next().await {
            let info = item?;
            if let Some(status) = info.status {
                tracing::debug!(image = %self.config.image, %status, "pull progress");
            }
        }
        tracing::info!(image = %self.config.image, "image pulled");
        Ok(())
    }

    /// Host ports currently published by any running container.
    async fn used_docker_ports(&self, docker: &Docker) -> Result<BTreeSet<u16>, SandboxError> {
        let containers = docker
            .list_containers(None::<ListContainersOptions>)
            .await?;
        let mut used = BTreeSet::new();
        for container in containers {
            for port in container.ports.into_iter().flatten() {
                if let Some(public) = port.public_port {
                    used.insert(public);
                }
            }
        }
        Ok(used)
    }

    /// Stop and remove the container. Best-effort: failures are logged,
    /// never raised, so teardown is safe to call from error paths and
    /// drop-adjacent contexts.
    pub async fn stop(&mut self) {
        // A container id implies the engine was already connected.
        if let (Some(id), Some(docker)) = (self.container_id.take(), self.docker.clone()) {
            let stop = docker
                .stop_container(
                    &id,
                    Some(StopContainerOptionsBuilder::default().t(5).build()),
                )
                .await;
            if let Err(e) = stop {
                tracing::warn!(container_id = %id, error = %e, "stop_container failed");
            }
            let remove = docker
                .remove_container(
                    &id,
                    Some(RemoveContainerOptionsBuilder::default().force(true).build()),
                )
                .await;
            if let Err(e) = remove {
                tracing::warn!(container_id = %id, error = %e, "remove_container failed");
            } else {
                tracing::info!(container_id = %id, "container removed");
            }
            tokio::time::sleep(STOP_SETTLE).await;
        }
        self.ports.clear();
    }

    /// Tear the current container down and bring up a fresh one with the
    /// same configuration. Port assignments may change.
    pub async fn reset(&mut self) -> Result<(), SandboxError> {
        self.stop().await;
        self.start().await
    }

    pub fn address(&self) -> Result<InstanceAddress, SandboxError> {
        if self.ports.is_empty() {
            return Err(SandboxError::NotStarted);
        }
        Ok(InstanceAddress::localhost(self.ports.clone()))
    }

    pub fn container_id(&self) -> Option<&str> {
        self.container_id.as_deref()
    }
}

/// Parse a human size like "4g", "512m", "4096" into bytes.
pub(crate) fn parse_size_bytes(s: &str) -> Option<i64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    let (digits, unit) = match s.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => s.split_at(idx),
        None => (s, ""),
    };
    let value: i64 = digits.parse().ok()?;
    let multiplier: i64 = match unit.to_ascii_lowercase().as_str() {
        "" | "b" => 1,
        "k" | "kb" => 1 << 10,
        "m" | "mb" => 1 << 20,
        "g" | "gb" => 1 << 30,
        _ => return None,
    };
    value.checked_mul(multiplier)
}

/// Environment map with secret-looking values replaced, for logging.
fn mask_env(
    env: &std::collections::BTreeMap<String, String>,
) -> std::collections::BTreeMap<String, String> {
    const SENSITIVE: [&str; 6] = ["password", "passwd", "ssl", "cert", "key", "ssh"];
    env.iter()
        .map(|(k, v)| {
            let lower = k.to_ascii_lowercase();
            let value = if SENSITIVE.iter().any(|s| lower.contains(s)) {
                "***".to_string()
            } else {
                v.clone()
            };
            (k.clone(), value)
        })
        .collect()
}

fn port_bindings(ports: &PortMap) -> HashMap<String, Option<Vec<PortBinding>>> {
    ports
        .iter()
        .map(|(internal, host)| {
            (
                format!("{internal}/tcp"),
                Some(vec![PortBinding {
                    host_ip: None,
                    host_port: Some(host.to_string()),
                }]),
            )
        })
        .collect()
}

/// Expand `host[:container[:permissions]]` device specs.
fn device_mappings(devices: &[String]) -> Vec<DeviceMapping> {
    devices
        .iter()
        .map(|spec| {
            let mut parts = spec.splitn(3, ':');
            let host = parts.next().unwrap_or_default().to_string();
            let container = parts.next().map(str::to_string).unwrap_or_else(|| host.clone());
            let permissions = parts.next().unwrap_or("rwm").to_string();
            DeviceMapping {
                path_on_host: Some(host),
                path_in_container: Some(container),
                cgroup_permissions: Some(permissions),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn parse_size_units() {
        assert_eq!(parse_size_bytes("4096"), Some(4096));
        assert_eq!(parse_size_bytes("1k"), Some(1024));
        assert_eq!(parse_size_bytes("512m"), Some(512 * 1024 * 1024));
        assert_eq!(parse_size_bytes("4g"), Some(4 * 1024 * 1024 * 1024));
        assert_eq!(parse_size_bytes("2GB"), Some(2 * 1024 * 1024 * 1024));
        assert_eq!(parse_size_bytes(""), None);
        assert_eq!(parse_size_bytes("lots"), None);
        assert_eq!(parse_size_bytes("4x"), None);
    }

    #[test]
    fn mask_env_hides_sensitive_keys() {
        let mut env = BTreeMap::new();
        env.insert("SESSION_PASSWORD".to_string(), "hunter2".to_string());
        env.insert("SSH_AUTH".to_string(), "agent".to_string());
        env.insert("SSL_CERT_FILE".to_string(), "/tmp/ca.pem".to_string());
        env.insert("SCREEN_SIZE".to_string(), "1920x1080x24".to_string());

        let masked = mask_env(&env);
        assert_eq!(masked["SESSION_PASSWORD"], "***");
        assert_eq!(masked["SSH_AUTH"], "***");
        assert_eq!(masked["SSL_CERT_FILE"], "***");
        assert_eq!(masked["SCREEN_SIZE"], "1920x1080x24");
    }

    #[test]
    fn port_bindings_shape() {
        let ports: PortMap = [(7860, 32801)].into_iter().collect();
        let bindings = port_bindings(&ports);
        let binding = bindings["7860/tcp"].as_ref().unwrap();
        assert_eq!(binding.len(), 1);
        assert_eq!(binding[0].host_port.as_deref(), Some("32801"));
        assert!(binding[0].host_ip.is_none());
    }

    #[tokio::test]
    async fn stop_before_start_is_a_no_op() {
        let config = DockerProviderConfig {
            image: "example/desktop:latest".to_string(),
            ports_to_forward: [7860].into_iter().collect(),
            endpoint_port: 7860,
            ..Default::default()
        };
        // The engine connection is deferred to start, so neither
        // construction nor a premature stop needs a daemon or socket.
        let mut provider = DockerProvider::new(config).unwrap();
        assert!(matches!(provider.address(), Err(SandboxError::NotStarted)));
        provider.stop().await;
        provider.stop().await;
        assert!(provider.container_id().is_none());
        assert!(matches!(provider.address(), Err(SandboxError::NotStarted)));
    }

    #[test]
    fn device_mapping_forms() {
        let devices = vec![
            "/dev/dri".to_string(),
            "/dev/snd:/dev/snd".to_string(),
            "/dev/fuse:/dev/fuse:rw".to_string(),
        ];
        let mapped = device_mappings(&devices);
        assert_eq!(mapped[0].path_on_host.as_deref(), Some("/dev/dri"));
        assert_eq!(mapped[0].path_in_container.as_deref(), Some("/dev/dri"));
        assert_eq!(mapped[0].cgroup_permissions.as_deref(), Some("rwm"));
        assert_eq!(mapped[1].path_in_container.as_deref(), Some("/dev/snd"));
        assert_eq!(mapped[2].cgroup_permissions.as_deref(), Some("rw"));
    }
}
