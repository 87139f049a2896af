//! Logical image name resolution.
//!
//! Turns short names such as `auto-m4b` into pinned references such as
//! `ghcr.io/aedot/auto-m4b:rolling`, honouring CI overrides.

use imgprobe_common::config::HarnessConfig;
use imgprobe_common::constants::FALLBACK_REGISTRY;
use imgprobe_common::error::{ProbeError, Result};

use crate::reference::{ImageReference, looks_like_registry, split_name};

/// Resolves logical image names against a registry prefix and tag policy.
///
/// Resolution is a pure function of the resolver's fields and its inputs;
/// the environment is read once, when the [`HarnessConfig`] is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolver {
    registry: String,
    namespace: Option<String>,
    default_tag: String,
    tag_override: Option<String>,
    image_override: Option<String>,
}

impl Resolver {
    /// Creates a resolver for a registry prefix such as `ghcr.io/aedot`.
    ///
    /// A prefix whose first component is not a registry host is treated as
    /// a namespace on `docker.io`; an empty prefix means `docker.io` itself.
    ///
    /// # Errors
    ///
    /// Returns `ProbeError::InvalidReference` if the prefix contains a digest
    /// or whitespace, or the default tag is empty.
    pub fn new(prefix: &str, default_tag: impl Into<String>) -> Result<Self> {
        let default_tag = default_tag.into();
        if default_tag.is_empty() {
            return Err(ProbeError::InvalidReference {
                reference: prefix.to_string(),
                reason: "default tag is empty".into(),
            });
        }

        let prefix = prefix.trim_end_matches('/');
        if prefix.contains(['@', ' ']) {
            return Err(ProbeError::InvalidReference {
                reference: prefix.to_string(),
                reason: "registry prefix must not contain a digest or whitespace".into(),
            });
        }

        let (registry, namespace) = match prefix.split_once('/') {
            _ if prefix.is_empty() => (FALLBACK_REGISTRY.to_string(), None),
            Some((host, ns)) if looks_like_registry(host) => {
                (host.to_string(), Some(ns.to_string()))
            }
            None if looks_like_registry(prefix) => (prefix.to_string(), None),
            _ => (FALLBACK_REGISTRY.to_string(), Some(prefix.to_string())),
        };

        Ok(Self {
            registry,
            namespace,
            default_tag,
            tag_override: None,
            image_override: None,
        })
    }

    /// Creates a resolver from harness configuration, including CI overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured prefix or default tag is invalid.
    pub fn from_config(config: &HarnessConfig) -> Result<Self> {
        let mut resolver = Self::new(&config.registry, config.default_tag.clone())?;
        resolver.tag_override.clone_from(&config.tag_override);
        resolver.image_override.clone_from(&config.image_override);
        Ok(resolver)
    }

    /// Pins every resolved reference to `tag`.
    #[must_use]
    pub fn with_tag_override(mut self, tag: impl Into<String>) -> Self {
        self.tag_override = Some(tag.into());
        self
    }

    /// Replaces every logical name with `image`.
    #[must_use]
    pub fn with_image_override(mut self, image: impl Into<String>) -> Self {
        self.image_override = Some(image.into());
        self
    }

    /// Resolves a logical name into a pinned reference.
    ///
    /// Tag precedence, first match wins: the pinned tag override, the
    /// `override_tag` argument, the tag written in the name, the default
    /// tag. When an image override is configured it replaces the logical
    /// name and `override_tag` is ignored.
    ///
    /// # Errors
    ///
    /// Returns `ProbeError::InvalidReference` if the name (or override)
    /// cannot be parsed into registry + repository form.
    pub fn resolve(&self, logical_name: &str, override_tag: Option<&str>) -> Result<ImageReference> {
        let (name, override_tag) = match &self.image_override {
            Some(image) => {
                tracing::info!(logical = logical_name, image = %image, "image override in effect");
                (image.as_str(), None)
            }
            None => (logical_name, override_tag),
        };

        let parsed = split_name(name)?;
        let (registry, repository) = match parsed.registry {
            Some(registry) => (registry.to_string(), parsed.repository.to_string()),
            None => (
                self.registry.clone(),
                self.namespace.as_deref().map_or_else(
                    || parsed.repository.to_string(),
                    |ns| format!("{ns}/{}", parsed.repository),
                ),
            ),
        };

        let tag = self
            .tag_override
            .as_deref()
            .or(override_tag)
            .or(parsed.tag)
            .unwrap_or(self.default_tag.as_str());

        let reference = ImageReference::new(registry, repository, tag)?;
        tracing::debug!(logical = logical_name, reference = %reference, "resolved image");
        Ok(reference)
    }
}
