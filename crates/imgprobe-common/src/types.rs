//! Domain primitive types used across the imgprobe workspace.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier the container runtime assigned to a container.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerId(String);

impl ContainerId {
    /// Creates a container ID from a string value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the 12-character short form runtimes print in listings.
    #[must_use]
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Generates a unique container name with the harness prefix.
#[must_use]
pub fn unique_container_name() -> String {
    format!(
        "{}-{}",
        crate::constants::CONTAINER_NAME_PREFIX,
        uuid::Uuid::new_v4().simple()
    )
}

/// A container port published on a host port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortBinding {
    /// Port inside the container.
    pub container: u16,
    /// Port on the host loopback interface.
    pub host: u16,
}

impl fmt::Display for PortBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "127.0.0.1:{}->{}/tcp", self.host, self.container)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_id_truncates_long_ids() {
        let id = ContainerId::new("0123456789abcdef0123");
        assert_eq!(id.short(), "0123456789ab");
    }

    #[test]
    fn short_id_keeps_short_ids() {
        let id = ContainerId::new("abc");
        assert_eq!(id.short(), "abc");
    }

    #[test]
    fn unique_names_carry_prefix_and_differ() {
        let a = unique_container_name();
        let b = unique_container_name();
        assert!(a.starts_with("imgprobe-"));
        assert_ne!(a, b);
    }

    #[test]
    fn port_binding_displays_host_to_container() {
        let binding = PortBinding {
            container: 8337,
            host: 49152,
        };
        assert_eq!(binding.to_string(), "127.0.0.1:49152->8337/tcp");
    }
}
