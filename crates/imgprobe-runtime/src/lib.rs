//! Container lifecycle management for imgprobe.
//!
//! The [`session::RuntimeSession`] owns the connection to the container
//! runtime; the [`lifecycle::LifecycleManager`] starts containers through
//! it and guarantees their teardown.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod backend;
pub mod container;
pub mod exec;
pub mod lifecycle;
pub mod logs;
pub mod ports;
pub mod process;
pub mod session;

pub use backend::{ContainerBackend, RuntimeConfig, StartRequest};
pub use container::ContainerHandle;
pub use exec::ExecOutput;
pub use lifecycle::{ContainerGuard, Lifecycle, LifecycleManager};
pub use session::RuntimeSession;
