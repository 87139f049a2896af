//! # imgprobe-image
//!
//! Maps logical image names to pinned registry references.
//!
//! - **Reference**: parsing and validation of `registry/repository:tag`.
//! - **Resolver**: applies the configured registry prefix, default tag,
//!   and CI overrides to a logical name.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod reference;
pub mod resolver;

pub use reference::ImageReference;
pub use resolver::Resolver;
