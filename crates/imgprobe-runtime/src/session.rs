//! Process-wide runtime session.
//!
//! Initialised once at harness startup and shut down explicitly at the end;
//! every container started through it carries the session label so that
//! shutdown can sweep anything a crashed run left behind.

use std::sync::Arc;

use imgprobe_common::config::HarnessConfig;
use imgprobe_common::error::Result;
use uuid::Uuid;

use crate::backend::{self, ContainerBackend};
use crate::ports::PortAllocator;

/// Shared connection to the container runtime.
pub struct RuntimeSession {
    id: String,
    backend: Arc<dyn ContainerBackend>,
    ports: Arc<PortAllocator>,
    shut_down: bool,
}

impl RuntimeSession {
    /// Connects to the configured runtime and checks it is reachable.
    ///
    /// # Errors
    ///
    /// Returns `ProbeError::RuntimeUnavailable` if the runtime binary is
    /// missing or the daemon does not answer.
    pub fn init(config: &HarnessConfig) -> Result<Self> {
        Self::with_backend(backend::from_config(config)?)
    }

    /// Opens a session over an explicit backend.
    ///
    /// # Errors
    ///
    /// Returns `ProbeError::RuntimeUnavailable` if the backend does not answer.
    pub fn with_backend(backend: Arc<dyn ContainerBackend>) -> Result<Self> {
        backend.ping()?;
        let id = Uuid::new_v4().simple().to_string();
        tracing::info!(session = %id, runtime = backend.name(), "runtime session started");
        Ok(Self {
            id,
            backend,
            ports: Arc::new(PortAllocator::new()),
            shut_down: false,
        })
    }

    /// Session ID, carried as a label on every container.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Shared backend handle.
    #[must_use]
    pub fn backend(&self) -> Arc<dyn ContainerBackend> {
        Arc::clone(&self.backend)
    }

    /// Shared host port allocator.
    #[must_use]
    pub fn ports(&self) -> Arc<PortAllocator> {
        Arc::clone(&self.ports)
    }

    /// Ends the session, removing any container still labelled with it.
    /// Returns how many leftovers were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the leftovers cannot be listed.
    pub fn shutdown(mut self) -> Result<usize> {
        self.shut_down = true;
        self.sweep()
    }

    fn sweep(&self) -> Result<usize> {
        let removed = self.backend.sweep(&self.id)?;
        if removed > 0 {
            tracing::warn!(session = %self.id, removed, "removed leftover containers");
        }
        tracing::info!(session = %self.id, "runtime session ended");
        Ok(removed)
    }
}

impl Drop for RuntimeSession {
    fn drop(&mut self) {
        if !self.shut_down {
            let _ = self.sweep();
        }
    }
}

impl std::fmt::Debug for RuntimeSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeSession")
            .field("id", &self.id)
            .field("backend", &self.backend.name())
            .field("shut_down", &self.shut_down)
            .finish_non_exhaustive()
    }
}
