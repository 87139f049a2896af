//! Handle to a running container instance.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use imgprobe_common::types::{ContainerId, PortBinding};
use imgprobe_image::ImageReference;

use crate::ports::PortReservation;

/// Host address published container ports are bound to.
pub const PUBLISH_HOST: &str = "127.0.0.1";

/// An opaque handle to one running container.
///
/// The handle owns the host port reservations of its published ports and
/// a termination flag; once terminated it is no longer valid for logs or
/// exec, and terminating it again is a no-op.
#[derive(Debug)]
pub struct ContainerHandle {
    id: ContainerId,
    name: String,
    image: ImageReference,
    bindings: Vec<PortBinding>,
    reservations: Mutex<Vec<PortReservation>>,
    terminated: AtomicBool,
    started_at: DateTime<Utc>,
}

impl ContainerHandle {
    /// Creates a handle for a container that is already running.
    #[must_use]
    pub fn new(
        id: ContainerId,
        name: impl Into<String>,
        image: ImageReference,
        bindings: Vec<PortBinding>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            image,
            bindings,
            reservations: Mutex::new(Vec::new()),
            terminated: AtomicBool::new(false),
            started_at: Utc::now(),
        }
    }

    /// Attaches the host port reservations backing this handle's bindings.
    #[must_use]
    pub fn with_reservations(self, reservations: Vec<PortReservation>) -> Self {
        *self
            .reservations
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = reservations;
        self
    }

    /// Runtime-assigned container ID.
    #[must_use]
    pub const fn id(&self) -> &ContainerId {
        &self.id
    }

    /// Container name given at start.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Image the container was started from.
    #[must_use]
    pub const fn image(&self) -> &ImageReference {
        &self.image
    }

    /// Published port bindings.
    #[must_use]
    pub fn bindings(&self) -> &[PortBinding] {
        &self.bindings
    }

    /// Host port a container port is published on, if any.
    #[must_use]
    pub fn host_port(&self, container_port: u16) -> Option<u16> {
        self.bindings
            .iter()
            .find(|b| b.container == container_port)
            .map(|b| b.host)
    }

    /// When the handle was created.
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Time since the container reached the running state.
    #[must_use]
    pub fn uptime(&self) -> Duration {
        (Utc::now() - self.started_at).to_std().unwrap_or_default()
    }

    /// Returns whether the container has been terminated.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    /// Marks the handle terminated. Returns `true` only for the call that
    /// flipped the flag, so teardown work runs at most once.
    pub fn mark_terminated(&self) -> bool {
        self.terminated
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Releases the host port reservations.
    pub fn release_ports(&self) {
        self.reservations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
