//! Container lifecycle: start, logs, exec, and guaranteed teardown.

use std::ops::Deref;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use imgprobe_common::config::HarnessConfig;
use imgprobe_common::error::{ProbeError, Result};
use imgprobe_common::types::{PortBinding, unique_container_name};
use imgprobe_image::ImageReference;

use crate::backend::{ContainerBackend, RuntimeConfig, StartRequest};
use crate::container::ContainerHandle;
use crate::exec::ExecOutput;
use crate::logs;
use crate::ports::{PortAllocator, PortReservation};
use crate::session::RuntimeSession;

/// The start/logs/exec/terminate contract a contract run relies on.
pub trait Lifecycle: Send + Sync {
    /// Starts a container from `image` and waits until it is running.
    ///
    /// # Errors
    ///
    /// Returns `ProbeError::StartFailure` if the container cannot be
    /// brought up within the startup timeout.
    fn start(&self, image: &ImageReference, config: Option<&RuntimeConfig>)
    -> Result<ContainerHandle>;

    /// Returns all log output captured since start.
    ///
    /// # Errors
    ///
    /// Returns `ProbeError::LogRetrievalFailure` if the handle is no longer
    /// valid or the runtime cannot produce the logs.
    fn logs(&self, handle: &ContainerHandle) -> Result<String>;

    /// Runs `argv` inside the container. A non-zero exit is a normal result.
    ///
    /// # Errors
    ///
    /// Returns `ProbeError::ExecFailure` if the handle is invalid or the
    /// command cannot be dispatched.
    fn exec(&self, handle: &ContainerHandle, argv: &[String]) -> Result<ExecOutput>;

    /// Tears the container down. Idempotent; problems are logged, never
    /// returned.
    fn terminate(&self, handle: &ContainerHandle);
}

/// [`Lifecycle`] implementation over a [`ContainerBackend`].
pub struct LifecycleManager {
    backend: Arc<dyn ContainerBackend>,
    ports: Arc<PortAllocator>,
    session_id: String,
    startup_timeout: Duration,
    log_dir: Option<PathBuf>,
}

impl LifecycleManager {
    /// Creates a manager bound to an initialised runtime session.
    #[must_use]
    pub fn new(session: &RuntimeSession, config: &HarnessConfig) -> Self {
        Self {
            backend: session.backend(),
            ports: session.ports(),
            session_id: session.id().to_string(),
            startup_timeout: config.startup_timeout(),
            log_dir: config.log_dir.clone(),
        }
    }

    /// Archives container logs into `dir` on teardown.
    #[must_use]
    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    /// Overrides the startup timeout.
    #[must_use]
    pub const fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    fn reserve_ports(
        &self,
        image: &ImageReference,
        ports: &[u16],
    ) -> Result<(Vec<PortBinding>, Vec<PortReservation>)> {
        let mut bindings = Vec::with_capacity(ports.len());
        let mut reservations = Vec::with_capacity(ports.len());
        for &container in ports {
            let reservation = self.ports.reserve().map_err(|e| ProbeError::StartFailure {
                image: image.to_string(),
                message: format!("no host port for container port {container}: {e}"),
            })?;
            bindings.push(PortBinding {
                container,
                host: reservation.port(),
            });
            reservations.push(reservation);
        }
        Ok((bindings, reservations))
    }

    fn archive(&self, handle: &ContainerHandle) {
        let Some(dir) = &self.log_dir else {
            return;
        };
        let result = self
            .backend
            .logs(handle.id())
            .and_then(|text| logs::archive_logs(dir, &handle.image().slug(), handle.name(), &text));
        match result {
            Ok(path) => tracing::info!(id = %handle.id().short(), path = %path.display(), "container logs archived"),
            Err(e) => tracing::warn!(id = %handle.id().short(), error = %e, "failed to archive container logs"),
        }
    }
}

impl std::fmt::Debug for LifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleManager")
            .field("backend", &self.backend.name())
            .field("session_id", &self.session_id)
            .field("startup_timeout", &self.startup_timeout)
            .field("log_dir", &self.log_dir)
            .finish_non_exhaustive()
    }
}

impl Lifecycle for LifecycleManager {
    fn start(
        &self,
        image: &ImageReference,
        config: Option<&RuntimeConfig>,
    ) -> Result<ContainerHandle> {
        let config = config.cloned().unwrap_or_default();
        let (bindings, reservations) = self.reserve_ports(image, &config.ports)?;
        let name = unique_container_name();
        tracing::info!(image = %image, name = %name, state = "starting", "starting container");

        let request = StartRequest {
            name: name.clone(),
            image: image.clone(),
            session: self.session_id.clone(),
            config,
            bindings: bindings.clone(),
            startup_timeout: self.startup_timeout,
        };
        let id = self.backend.start(&request).inspect_err(|e| {
            tracing::info!(image = %image, name = %name, state = "failed", error = %e, "container failed to start");
        })?;

        for binding in &bindings {
            tracing::debug!(id = %id.short(), binding = %binding, "port published");
        }
        tracing::info!(id = %id.short(), image = %image, state = "running", "container started");
        Ok(ContainerHandle::new(id, name, image.clone(), bindings).with_reservations(reservations))
    }

    fn logs(&self, handle: &ContainerHandle) -> Result<String> {
        if handle.is_terminated() {
            return Err(ProbeError::LogRetrievalFailure {
                id: handle.id().to_string(),
                message: "container already terminated".into(),
            });
        }
        self.backend.logs(handle.id())
    }

    fn exec(&self, handle: &ContainerHandle, argv: &[String]) -> Result<ExecOutput> {
        if handle.is_terminated() {
            return Err(ProbeError::ExecFailure {
                id: handle.id().to_string(),
                message: "container already terminated".into(),
            });
        }
        tracing::debug!(id = %handle.id().short(), argv = ?argv, "exec");
        self.backend.exec(handle.id(), argv)
    }

    fn terminate(&self, handle: &ContainerHandle) {
        if !handle.mark_terminated() {
            tracing::debug!(id = %handle.id().short(), "container already terminated");
            return;
        }
        tracing::info!(id = %handle.id().short(), image = %handle.image(), state = "terminating", "terminating container");
        self.archive(handle);
        if let Err(e) = self.backend.remove(handle.id()) {
            tracing::warn!(id = %handle.id().short(), error = %e, "failed to remove container");
        }
        handle.release_ports();
        tracing::info!(
            id = %handle.id().short(),
            state = "done",
            uptime = ?handle.uptime(),
            "container terminated"
        );
    }
}

/// Scoped ownership of a started container. Dropping the guard terminates
/// the container, on every exit path including panics.
pub struct ContainerGuard<'a, L: Lifecycle + ?Sized> {
    lifecycle: &'a L,
    handle: ContainerHandle,
}

impl<'a, L: Lifecycle + ?Sized> ContainerGuard<'a, L> {
    /// Starts a container and wraps it in a guard.
    ///
    /// # Errors
    ///
    /// Propagates the start error; nothing needs tearing down in that case.
    pub fn start(
        lifecycle: &'a L,
        image: &ImageReference,
        config: Option<&RuntimeConfig>,
    ) -> Result<Self> {
        let handle = lifecycle.start(image, config)?;
        Ok(Self { lifecycle, handle })
    }

    /// The guarded handle.
    #[must_use]
    pub const fn handle(&self) -> &ContainerHandle {
        &self.handle
    }

    /// The lifecycle the container was started through.
    #[must_use]
    pub const fn lifecycle(&self) -> &'a L {
        self.lifecycle
    }
}

impl<L: Lifecycle + ?Sized> Deref for ContainerGuard<'_, L> {
    type Target = ContainerHandle;

    fn deref(&self) -> &ContainerHandle {
        &self.handle
    }
}

impl<L: Lifecycle + ?Sized> Drop for ContainerGuard<'_, L> {
    fn drop(&mut self) {
        self.lifecycle.terminate(&self.handle);
    }
}

impl<L: Lifecycle + ?Sized> std::fmt::Debug for ContainerGuard<'_, L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerGuard")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}
