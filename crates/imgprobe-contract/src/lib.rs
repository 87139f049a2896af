//! # imgprobe-contract
//!
//! Declares what a healthy container looks like and checks it.
//!
//! - [`ReadinessCheck`]: file, command, HTTP, and log conditions.
//! - [`ContractRunner`]: starts one container, evaluates every check in
//!   order, and always tears the container down.
//! - [`Contract`]: a named image plus its checks, built fluently or loaded
//!   from a YAML manifest.
//! - [`catalog`]: the canonical contracts for this repository's images.
//!
//! # Example
//!
//! ```rust,no_run
//! use imgprobe_contract::{Contract, EvalPolicy, ReadinessCheck};
//! use imgprobe_common::config::HarnessConfig;
//! use imgprobe_image::Resolver;
//! use imgprobe_runtime::{LifecycleManager, RuntimeSession};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = HarnessConfig::from_env()?;
//! let session = RuntimeSession::init(&config)?;
//! let lifecycle = LifecycleManager::new(&session, &config);
//!
//! let contract = Contract::builder("busybox")
//!     .image("busybox")
//!     .keep_alive()
//!     .check(ReadinessCheck::command_succeeds(["/bin/busybox", "--list"]))
//!     .build()?;
//! let report = contract.execute(
//!     &Resolver::from_config(&config)?,
//!     &lifecycle,
//!     &EvalPolicy::from_config(&config),
//! )?;
//! report.into_result()?;
//! session.shutdown()?;
//! # Ok(())
//! # }
//! ```

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod cancel;
pub mod catalog;
pub mod check;
pub mod contract;
pub mod policy;
pub mod result;
pub mod runner;

pub use cancel::CancelToken;
pub use check::ReadinessCheck;
pub use contract::{Contract, ContractBuilder};
pub use policy::EvalPolicy;
pub use result::{ContractFailure, ContractReport, ContractResult};
pub use runner::{ContractRunner, FailureKind, RunState, StateLog};
