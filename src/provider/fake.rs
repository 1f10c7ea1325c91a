//! In-process fake backend for tests.
//!
//! Reports a preconfigured address once started and tracks lifecycle
//! state, so environment and client code can be exercised against a
//! local HTTP fixture instead of a real container.

use crate::error::SandboxError;
use crate::provider::types::{FakeProviderConfig, InstanceAddress};

#[derive(Debug)]
pub struct FakeProvider {
    config: FakeProviderConfig,
    started: bool,
}

impl FakeProvider {
    pub fn new(config: FakeProviderConfig) -> Self {
        Self {
            config,
            started: false,
        }
    }

    pub async fn start(&mut self) -> Result<(), SandboxError> {
        self.started = true;
        Ok(())
    }

    pub async fn stop(&mut self) {
        self.started = false;
    }

    pub async fn reset(&mut self) -> Result<(), SandboxError> {
        self.stop().await;
        self.start().await
    }

    pub fn address(&self) -> Result<InstanceAddress, SandboxError> {
        if !self.started {
            return Err(SandboxError::NotStarted);
        }
        Ok(self.config.address.clone())
    }

    pub fn is_started(&self) -> bool {
        self.started
    }
}
