//! Exclusive host port reservation for published container ports.
//!
//! Concurrent runs in one process share a [`PortAllocator`]; a port stays
//! reserved until its [`PortReservation`] is dropped, so two live
//! containers are never handed the same host port.

use std::collections::HashSet;
use std::net::TcpListener;
use std::sync::{Arc, Mutex, PoisonError};

use imgprobe_common::error::{ProbeError, Result};

const MAX_ATTEMPTS: usize = 32;

/// Process-wide set of reserved host ports.
#[derive(Debug, Default)]
pub struct PortAllocator {
    reserved: Mutex<HashSet<u16>>,
}

impl PortAllocator {
    /// Creates an empty allocator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves a free loopback port.
    ///
    /// The OS picks a free port by binding port 0; the port is then held in
    /// the reservation set so other runs in this process skip it.
    ///
    /// # Errors
    ///
    /// Returns an error if no port can be bound or every candidate the OS
    /// offers is already reserved.
    pub fn reserve(self: &Arc<Self>) -> Result<PortReservation> {
        self.reserve_from(free_loopback_port)
    }

    fn reserve_from<F>(self: &Arc<Self>, mut candidate: F) -> Result<PortReservation>
    where
        F: FnMut() -> Result<u16>,
    {
        for _ in 0..MAX_ATTEMPTS {
            let port = candidate()?;
            if self.lock().insert(port) {
                tracing::debug!(port, "reserved host port");
                return Ok(PortReservation {
                    port,
                    allocator: Arc::clone(self),
                });
            }
        }
        Err(ProbeError::Runtime {
            operation: "port reservation",
            message: format!("no unreserved host port found after {MAX_ATTEMPTS} attempts"),
        })
    }

    /// Number of ports currently reserved.
    #[must_use]
    pub fn reserved_count(&self) -> usize {
        self.lock().len()
    }

    /// Returns whether `port` is currently reserved.
    #[must_use]
    pub fn is_reserved(&self, port: u16) -> bool {
        self.lock().contains(&port)
    }

    fn release(&self, port: u16) {
        if self.lock().remove(&port) {
            tracing::debug!(port, "released host port");
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<u16>> {
        self.reserved.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn free_loopback_port() -> Result<u16> {
    let io_error = |e| ProbeError::Io {
        path: "127.0.0.1:0".into(),
        source: e,
    };
    let listener = TcpListener::bind("127.0.0.1:0").map_err(io_error)?;
    Ok(listener.local_addr().map_err(io_error)?.port())
}

/// A reserved host port, released when dropped.
#[derive(Debug)]
pub struct PortReservation {
    port: u16,
    allocator: Arc<PortAllocator>,
}

impl PortReservation {
    /// The reserved port number.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }
}

impl Drop for PortReservation {
    fn drop(&mut self) {
        self.allocator.release(self.port);
    }
}
