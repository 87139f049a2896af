//! Canonical contracts for the images built in this repository.

use imgprobe_common::error::Result;

use crate::check::ReadinessCheck;
use crate::contract::{self, Contract};

/// Names of the built-in contracts, in listing order.
pub const NAMES: [&str; 5] = ["auto-m4b", "autom4b", "beets-audible", "busybox", "m4b-tool"];

/// Returns every built-in contract.
///
/// # Errors
///
/// Returns an error only if a built-in definition is malformed.
pub fn builtin() -> Result<Vec<Contract>> {
    Ok(vec![
        Contract::builder("auto-m4b")
            .image("auto-m4b")
            .tag("alpine")
            .check(ReadinessCheck::log_contains([
                "Created missing",
                "Using all CPU cores",
                "No folders detected",
            ]))
            .build()?,
        Contract::builder("autom4b")
            .image("autom4b")
            .check(ReadinessCheck::log_contains([
                "Created missing",
                "Using",
                "Sleeping",
            ]))
            .build()?,
        Contract::builder("beets-audible")
            .image("beets-audible")
            .check(ReadinessCheck::http_ready(8337))
            .build()?,
        Contract::builder("busybox")
            .image("busybox")
            .keep_alive()
            .check(ReadinessCheck::command_succeeds(["/bin/busybox", "--list"]))
            .build()?,
        Contract::builder("m4b-tool")
            .image("m4b-tool")
            .keep_alive()
            .check(ReadinessCheck::file_exists("/runscript.sh"))
            .build()?,
    ])
}

/// Looks up a built-in contract by name.
///
/// # Errors
///
/// Returns `ProbeError::NotFound` for an unknown name.
pub fn find(name: &str) -> Result<Contract> {
    contract::by_name(&builtin()?, name).cloned()
}

#[cfg(test)]
mod tests {
    use imgprobe_image::Resolver;

    use super::*;

    #[test]
    fn names_match_definitions() {
        let names: Vec<String> = builtin().unwrap().into_iter().map(|c| c.name).collect();
        assert_eq!(names, NAMES);
    }

    #[test]
    fn default_references_point_at_project_registry() {
        let resolver = Resolver::new("ghcr.io/aedot", "rolling").unwrap();
        let refs: Vec<String> = builtin()
            .unwrap()
            .iter()
            .map(|c| c.resolve(&resolver).unwrap().to_string())
            .collect();
        assert_eq!(
            refs,
            vec![
                "ghcr.io/aedot/auto-m4b:alpine",
                "ghcr.io/aedot/autom4b:rolling",
                "ghcr.io/aedot/beets-audible:rolling",
                "ghcr.io/aedot/busybox:rolling",
                "ghcr.io/aedot/m4b-tool:rolling",
            ]
        );
    }

    #[test]
    fn every_contract_has_exactly_one_check() {
        for contract in builtin().unwrap() {
            assert_eq!(contract.checks.len(), 1, "{}", contract.name);
        }
    }

    #[test]
    fn exec_based_contracts_keep_the_container_alive() {
        let busybox = find("busybox").unwrap();
        assert_eq!(busybox.config.entrypoint.as_deref(), Some("tail"));
        assert!(matches!(
            find("nginx"),
            Err(imgprobe_common::error::ProbeError::NotFound { .. })
        ));
    }
}
