//! Parsing and validation of `registry/repository:tag` image references.

use std::fmt;

use imgprobe_common::constants::MAX_TAG_LENGTH;
use imgprobe_common::error::{ProbeError, Result};
use serde::{Deserialize, Serialize};

/// A fully resolved image reference. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageReference {
    registry: String,
    repository: String,
    tag: String,
}

impl ImageReference {
    /// Builds a reference after validating every part.
    ///
    /// # Errors
    ///
    /// Returns `ProbeError::InvalidReference` if any part is malformed or the
    /// repository is empty.
    pub fn new(
        registry: impl Into<String>,
        repository: impl Into<String>,
        tag: impl Into<String>,
    ) -> Result<Self> {
        let registry = registry.into();
        let repository = repository.into();
        let tag = tag.into();
        let display = format!("{registry}/{repository}:{tag}");

        validate_registry(&registry).map_err(|reason| invalid(&display, reason))?;
        validate_repository(&repository).map_err(|reason| invalid(&display, reason))?;
        validate_tag(&tag).map_err(|reason| invalid(&display, reason))?;

        Ok(Self {
            registry,
            repository,
            tag,
        })
    }

    /// Registry host, optionally with a port (e.g. `ghcr.io`, `localhost:5000`).
    #[must_use]
    pub fn registry(&self) -> &str {
        &self.registry
    }

    /// Repository path inside the registry (e.g. `aedot/auto-m4b`).
    #[must_use]
    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// Tag of the image.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Last path component of the repository.
    #[must_use]
    pub fn name(&self) -> &str {
        self.repository
            .rsplit('/')
            .next()
            .unwrap_or(&self.repository)
    }

    /// A filesystem-safe identifier such as `auto-m4b-alpine`.
    #[must_use]
    pub fn slug(&self) -> String {
        format!("{}-{}", self.name(), self.tag)
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
            .collect()
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.registry, self.repository, self.tag)
    }
}

/// Components of a user-supplied image name before defaults are applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedName<'a> {
    /// Explicit registry, if the first path component names one.
    pub registry: Option<&'a str>,
    /// Repository path without registry or tag.
    pub repository: &'a str,
    /// Explicit tag, if present.
    pub tag: Option<&'a str>,
}

/// Splits a name like `ghcr.io/aedot/auto-m4b:alpine` into its parts.
///
/// The first path component is treated as a registry when it contains a
/// `.` or `:` or is `localhost`, matching how container CLIs disambiguate.
///
/// # Errors
///
/// Returns `ProbeError::InvalidReference` for empty input, whitespace,
/// digest references, an empty tag, or a missing repository.
pub fn split_name(input: &str) -> Result<ParsedName<'_>> {
    if input.is_empty() {
        return Err(invalid(input, "name is empty"));
    }
    if input.chars().any(char::is_whitespace) {
        return Err(invalid(input, "name contains whitespace"));
    }
    if input.contains('@') {
        return Err(invalid(input, "digest references are not supported"));
    }

    let last_slash = input.rfind('/').map_or(0, |i| i + 1);
    let (path, tag) = match input[last_slash..].rfind(':') {
        Some(i) => {
            let colon = last_slash + i;
            let tag = &input[colon + 1..];
            if tag.is_empty() {
                return Err(invalid(input, "tag is empty"));
            }
            (&input[..colon], Some(tag))
        }
        None => (input, None),
    };

    let (registry, repository) = match path.split_once('/') {
        Some((first, rest)) if looks_like_registry(first) => (Some(first), rest),
        _ => (None, path),
    };

    if repository.is_empty() {
        return Err(invalid(input, "repository is empty"));
    }

    Ok(ParsedName {
        registry,
        repository,
        tag,
    })
}

/// Returns whether a leading path component names a registry host.
#[must_use]
pub fn looks_like_registry(component: &str) -> bool {
    component.contains('.') || component.contains(':') || component == "localhost"
}

fn invalid(reference: &str, reason: impl Into<String>) -> ProbeError {
    ProbeError::InvalidReference {
        reference: reference.to_string(),
        reason: reason.into(),
    }
}

fn validate_registry(registry: &str) -> std::result::Result<(), String> {
    if registry.is_empty() {
        return Err("registry is empty".into());
    }
    if let Some(c) = registry
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | ':')))
    {
        return Err(format!("registry contains invalid character {c:?}"));
    }
    Ok(())
}

fn validate_repository(repository: &str) -> std::result::Result<(), String> {
    if repository.is_empty() {
        return Err("repository is empty".into());
    }
    for component in repository.split('/') {
        if component.is_empty() {
            return Err("repository has an empty path component".into());
        }
        if let Some(c) = component.chars().find(|c| {
            !(c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-'))
        }) {
            return Err(format!("repository component {component:?} contains {c:?}"));
        }
        let starts_ok = component.starts_with(|c: char| c.is_ascii_alphanumeric());
        let ends_ok = component.ends_with(|c: char| c.is_ascii_alphanumeric());
        if !starts_ok || !ends_ok {
            return Err(format!(
                "repository component {component:?} must start and end with a letter or digit"
            ));
        }
    }
    Ok(())
}

fn validate_tag(tag: &str) -> std::result::Result<(), String> {
    if tag.is_empty() {
        return Err("tag is empty".into());
    }
    if tag.len() > MAX_TAG_LENGTH {
        return Err(format!("tag is longer than {MAX_TAG_LENGTH} characters"));
    }
    if tag.starts_with(['.', '-']) {
        return Err("tag must start with a letter, digit, or underscore".into());
    }
    if let Some(c) = tag
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')))
    {
        return Err(format!("tag contains invalid character {c:?}"));
    }
    Ok(())
}
