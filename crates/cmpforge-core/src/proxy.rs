//! Versioned serialization proxy.
//!
//! A comparator is never written as itself. Its wire form is a
//! [`ComparatorProxy`] naming everything needed to rebuild it through the
//! builder and engine in the reading process.

use serde::{Deserialize, Serialize};

use crate::builder::SpecBuilder;
use crate::error::{ComparatorError, Result};
use crate::registry::SerialRegistry;
use crate::spec::{FallbackMode, HashParams, NullPolicy, Spec};

/// Highest proxy version this build reads and the version it writes.
pub const PROXY_VERSION: u32 = 1;

/// Wire form of a comparator.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ComparatorProxy {
    pub version: u32,

    /// Fully qualified name of the target type.
    pub target: String,

    #[serde(default)]
    pub hash: HashParams,

    #[serde(default)]
    pub strict_types: bool,

    /// Criterion names in spec order.
    #[serde(default)]
    pub criteria: Vec<String>,

    /// Present for ordering comparators only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nulls: Option<NullPolicy>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackMode>,

    /// Hex blake3 digest of the fields above.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

impl ComparatorProxy {
    /// Captures `spec`, fingerprinting the record when `protected`.
    pub fn capture(spec: &Spec, protected: bool) -> Self {
        let mut proxy = Self {
            version: PROXY_VERSION,
            target: spec.target().name().to_string(),
            hash: spec.hash_params(),
            strict_types: spec.strict_types(),
            criteria: spec
                .criteria()
                .iter()
                .map(|c| c.name().to_string())
                .collect(),
            nulls: spec.kind().nulls(),
            fallback: spec.fallback(),
            fingerprint: None,
        };
        if protected {
            proxy.fingerprint = Some(proxy.compute_fingerprint());
        }
        proxy
    }

    /// Digest over every field except the fingerprint itself.
    pub fn compute_fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.version.to_le_bytes());
        hasher.update(&(self.target.len() as u64).to_le_bytes());
        hasher.update(self.target.as_bytes());
        hasher.update(&self.hash.initial.to_le_bytes());
        hasher.update(&self.hash.multiplier.to_le_bytes());
        hasher.update(&[u8::from(self.strict_types)]);
        hasher.update(&(self.criteria.len() as u64).to_le_bytes());
        for name in &self.criteria {
            hasher.update(&(name.len() as u64).to_le_bytes());
            hasher.update(name.as_bytes());
        }
        hasher.update(self.nulls.map_or("-", NullPolicy::as_str).as_bytes());
        hasher.update(b"|");
        hasher.update(self.fallback.map_or("-", FallbackMode::as_str).as_bytes());
        hasher.finalize().to_hex().to_string()
    }

    /// Checks the version and, when present or required, the fingerprint.
    pub fn verify(&self, require_fingerprint: bool) -> Result<()> {
        if self.version == 0 || self.version > PROXY_VERSION {
            return Err(ComparatorError::UnsupportedProxyVersion {
                found: self.version,
                supported: PROXY_VERSION,
            });
        }
        match &self.fingerprint {
            Some(fingerprint) if *fingerprint != self.compute_fingerprint() => {
                Err(ComparatorError::ProxyTampered {
                    target: self.target.clone(),
                })
            }
            None if require_fingerprint => Err(ComparatorError::ProxyTampered {
                target: self.target.clone(),
            }),
            _ => Ok(()),
        }
    }

    /// Rebuilds the spec, resolving names through `registry`.
    pub fn to_spec(&self, registry: &SerialRegistry) -> Result<Spec> {
        let target = registry.type_token(&self.target)?;
        let mut builder = match self.nulls {
            Some(nulls) => SpecBuilder::ordering(target).nulls(nulls),
            None => SpecBuilder::equivalence(target),
        };
        builder = builder
            .hash_params(self.hash.initial, self.hash.multiplier)
            .strict_types(self.strict_types)
            .serializable();
        for name in &self.criteria {
            builder = builder.with(registry.criterion(name)?);
        }
        if let Some(fallback) = self.fallback {
            builder = fallback.resolve(WithFallback(builder));
        }
        builder.build()
    }
}

struct WithFallback(SpecBuilder);

impl crate::spec::FallbackHandler for WithFallback {
    type Output = SpecBuilder;

    fn on_identity(self) -> SpecBuilder {
        self.0.fallback_to_identity()
    }

    fn on_natural(self) -> SpecBuilder {
        self.0.fallback_to_natural()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criterion::ordered_by_key;
    use crate::value::TypeToken;

    #[derive(PartialEq, Eq, PartialOrd, Ord)]
    struct Version {
        major: u32,
        minor: u32,
    }

    fn registry() -> SerialRegistry {
        let registry = SerialRegistry::new();
        registry.register_type(TypeToken::ordered::<Version>());
        registry
            .register_criterion(
                ordered_by_key("major", |v: &Version| v.major)
                    .serializable()
                    .shared(),
            )
            .unwrap();
        registry
            .register_criterion(
                ordered_by_key("minor", |v: &Version| v.minor)
                    .serializable()
                    .shared(),
            )
            .unwrap();
        registry
    }

    fn spec(registry: &SerialRegistry) -> Spec {
        SpecBuilder::ordering(TypeToken::of::<Version>())
            .with(registry.criterion("major").unwrap())
            .with(registry.criterion("minor").unwrap())
            .nulls(NullPolicy::NullsFirst)
            .strict_types(true)
            .serializable()
            .build()
            .unwrap()
    }

    #[test]
    fn test_capture_and_rebuild() {
        let registry = registry();
        let original = spec(&registry);
        let proxy = original.write_replace(true).unwrap();
        assert_eq!(proxy.criteria, vec!["major", "minor"]);
        assert_eq!(proxy.nulls, Some(NullPolicy::NullsFirst));
        proxy.verify(true).unwrap();

        let rebuilt = proxy.to_spec(&registry).unwrap();
        assert_eq!(rebuilt, original);
    }

    #[test]
    fn test_fingerprint_detects_edits() {
        let registry = registry();
        let mut proxy = spec(&registry).write_replace(true).unwrap();
        proxy.criteria.reverse();
        assert!(matches!(
            proxy.verify(false),
            Err(ComparatorError::ProxyTampered { .. })
        ));
    }

    #[test]
    fn test_unprotected_proxy() {
        let registry = registry();
        let proxy = spec(&registry).write_replace(false).unwrap();
        assert!(proxy.fingerprint.is_none());
        proxy.verify(false).unwrap();
        assert!(matches!(
            proxy.verify(true),
            Err(ComparatorError::ProxyTampered { .. })
        ));
    }

    #[test]
    fn test_newer_version_rejected() {
        let registry = registry();
        let mut proxy = spec(&registry).write_replace(false).unwrap();
        proxy.version = PROXY_VERSION + 1;
        assert!(matches!(
            proxy.verify(false),
            Err(ComparatorError::UnsupportedProxyVersion { found: 2, supported: 1 })
        ));
    }

    #[test]
    fn test_json_shape() {
        let registry = registry();
        let proxy = spec(&registry).write_replace(false).unwrap();
        let json = serde_json::to_value(&proxy).unwrap();
        assert_eq!(json["version"], 1);
        assert_eq!(json["nulls"], "nulls_first");
        assert!(json.get("fingerprint").is_none());
        assert!(json.get("fallback").is_none());

        let back: ComparatorProxy = serde_json::from_value(json).unwrap();
        assert_eq!(back, proxy);
    }

    #[test]
    fn test_unregistered_criterion_fails_to_resolve() {
        let registry = registry();
        let mut proxy = spec(&registry).write_replace(false).unwrap();
        proxy.criteria.push("patch".to_string());
        assert!(matches!(
            proxy.to_spec(&registry),
            Err(ComparatorError::Unresolved { kind: "criterion", .. })
        ));
    }
}
