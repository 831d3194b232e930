//! Fluent construction of [`Spec`]s.

use std::any::Any;
use std::sync::Arc;

use crate::criterion::{self, Criterion};
use crate::error::{ComparatorError, Result};
use crate::hash::StableHash;
use crate::host::HostContext;
use crate::spec::{FallbackMode, HashParams, NullPolicy, Spec, SpecKind};
use crate::value::TypeToken;

/// Assembles a [`Spec`]. Not thread-safe and not meant to be shared.
#[derive(Debug, Clone)]
pub struct SpecBuilder {
    target: TypeToken,
    criteria: Vec<Arc<dyn Criterion>>,
    hash: HashParams,
    strict_types: bool,
    fallback: Option<FallbackMode>,
    kind: SpecKind,
    serializable: bool,
    host: Option<HostContext>,
}

impl Spec {
    /// Starts an equivalence spec (hash and equality) for `T`.
    pub fn equivalence<T: Any>() -> SpecBuilder {
        SpecBuilder::equivalence(TypeToken::of::<T>())
    }

    /// Starts an ordering spec for `T` with the `Throw` null policy.
    pub fn ordering<T: Any>() -> SpecBuilder {
        SpecBuilder::ordering(TypeToken::of::<T>())
    }
}

impl SpecBuilder {
    fn new(target: TypeToken, kind: SpecKind) -> Self {
        Self {
            target,
            criteria: Vec::new(),
            hash: HashParams::default(),
            strict_types: false,
            fallback: None,
            kind,
            serializable: false,
            host: None,
        }
    }

    pub fn equivalence(target: TypeToken) -> Self {
        Self::new(target, SpecKind::Equivalence)
    }

    pub fn ordering(target: TypeToken) -> Self {
        Self::new(
            target,
            SpecKind::Ordering {
                nulls: NullPolicy::Throw,
            },
        )
    }

    /// Appends a criterion. Order is significant.
    pub fn with(mut self, criterion: Arc<dyn Criterion>) -> Self {
        self.criteria.push(criterion);
        self
    }

    /// Appends a hash/equality criterion over a key of `T`.
    pub fn by_key<T, K, F>(self, name: impl Into<String>, key: F) -> Self
    where
        T: Any,
        K: StableHash + Eq + 'static,
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        self.with(criterion::by_key(name, key).shared())
    }

    /// Appends an ordered criterion over a key of `T`.
    pub fn ordered_by_key<T, K, F>(self, name: impl Into<String>, key: F) -> Self
    where
        T: Any,
        K: StableHash + Ord + 'static,
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        self.with(criterion::ordered_by_key(name, key).shared())
    }

    pub fn hash_params(mut self, initial: i32, multiplier: i32) -> Self {
        self.hash = HashParams::new(initial, multiplier);
        self
    }

    pub fn strict_types(mut self, strict: bool) -> Self {
        self.strict_types = strict;
        self
    }

    /// Sets the null policy. Has no effect on equivalence specs.
    pub fn nulls(mut self, policy: NullPolicy) -> Self {
        if let SpecKind::Ordering { nulls } = &mut self.kind {
            *nulls = policy;
        }
        self
    }

    pub fn fallback_to_identity(mut self) -> Self {
        self.fallback = Some(FallbackMode::Identity);
        self
    }

    pub fn fallback_to_natural(mut self) -> Self {
        self.fallback = Some(FallbackMode::Natural);
        self
    }

    pub fn serializable(mut self) -> Self {
        self.serializable = true;
        self
    }

    pub fn host(mut self, host: HostContext) -> Self {
        self.host = Some(host);
        self
    }

    /// Validates and freezes the spec.
    pub fn build(self) -> Result<Spec> {
        if self.target.is_void() {
            return Err(ComparatorError::InvalidArgument(format!(
                "`{}` cannot be the target of a comparator",
                self.target.name()
            )));
        }
        if self.criteria.is_empty() && self.fallback.is_none() {
            return Err(ComparatorError::MissingCriteria {
                type_name: self.target.name(),
            });
        }
        if self.kind != SpecKind::Equivalence {
            if let Some(unordered) = self.criteria.iter().find(|c| !c.is_ordered()) {
                return Err(ComparatorError::InvalidArgument(format!(
                    "criterion `{}` has no ordering but the spec for `{}` is an ordering",
                    unordered.name(),
                    self.target.name()
                )));
            }
        }
        if self.fallback == Some(FallbackMode::Natural) {
            if self.kind == SpecKind::Equivalence {
                return Err(ComparatorError::InvalidArgument(
                    "natural fallback requires an ordering spec".to_string(),
                ));
            }
            if !self.target.has_natural_order() {
                return Err(ComparatorError::InvalidArgument(format!(
                    "`{}` does not declare a natural ordering",
                    self.target.name()
                )));
            }
        }
        if self.serializable {
            if let Some(opaque) = self.criteria.iter().find(|c| !c.is_serializable()) {
                return Err(ComparatorError::InvalidArgument(format!(
                    "criterion `{}` is not serializable",
                    opaque.name()
                )));
            }
        }

        Ok(Spec {
            target: self.target,
            criteria: self.criteria,
            hash: self.hash,
            strict_types: self.strict_types,
            fallback: self.fallback,
            kind: self.kind,
            serializable: self.serializable,
            host: self.host,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
    struct Person {
        name: String,
        age: u32,
    }

    #[test]
    fn test_build_equivalence() {
        let spec = Spec::equivalence::<Person>()
            .by_key("name", |p: &Person| p.name.clone())
            .by_key("age", |p: &Person| p.age)
            .hash_params(3, 5)
            .build()
            .unwrap();
        assert_eq!(spec.criteria().len(), 2);
        assert_eq!(spec.hash_params(), HashParams::new(3, 5));
        assert_eq!(spec.kind(), SpecKind::Equivalence);
        assert!(!spec.is_empty());
        assert_eq!(spec.to_string(), "Eq<Person>[name, age] hash=(3, 5)");
    }

    #[test]
    fn test_void_target_rejected() {
        let err = Spec::equivalence::<()>().fallback_to_identity().build().unwrap_err();
        assert!(matches!(err, ComparatorError::InvalidArgument(_)));
    }

    #[test]
    fn test_empty_criteria_requires_fallback() {
        let err = Spec::equivalence::<Person>().build().unwrap_err();
        assert!(matches!(err, ComparatorError::MissingCriteria { .. }));

        let spec = Spec::equivalence::<Person>().fallback_to_identity().build().unwrap();
        assert!(spec.is_empty());
        assert_eq!(spec.fallback(), Some(FallbackMode::Identity));
    }

    #[test]
    fn test_ordering_requires_ordered_criteria() {
        let err = Spec::ordering::<Person>()
            .by_key("name", |p: &Person| p.name.clone())
            .build()
            .unwrap_err();
        assert!(matches!(err, ComparatorError::InvalidArgument(msg) if msg.contains("name")));
    }

    #[test]
    fn test_natural_fallback_checks_declared_order() {
        let err = Spec::ordering::<Person>().fallback_to_natural().build().unwrap_err();
        assert!(matches!(err, ComparatorError::InvalidArgument(_)));

        let err = SpecBuilder::equivalence(TypeToken::ordered::<Person>())
            .fallback_to_natural()
            .build()
            .unwrap_err();
        assert!(matches!(err, ComparatorError::InvalidArgument(_)));

        let spec = SpecBuilder::ordering(TypeToken::ordered::<Person>())
            .fallback_to_natural()
            .nulls(NullPolicy::NullsLast)
            .build()
            .unwrap();
        assert_eq!(spec.kind().nulls(), Some(NullPolicy::NullsLast));
    }

    #[test]
    fn test_serializable_requires_serializable_criteria() {
        let err = Spec::equivalence::<Person>()
            .by_key("age", |p: &Person| p.age)
            .serializable()
            .build()
            .unwrap_err();
        assert!(matches!(err, ComparatorError::InvalidArgument(_)));

        let spec = Spec::equivalence::<Person>()
            .with(criterion::by_key("age", |p: &Person| p.age).serializable().shared())
            .serializable()
            .build()
            .unwrap();
        assert!(spec.is_serializable());
    }

    #[test]
    fn test_write_replace_requires_serializable() {
        let spec = Spec::equivalence::<Person>().fallback_to_identity().build().unwrap();
        assert!(matches!(
            spec.write_replace(true),
            Err(ComparatorError::SerializationDisabled(_))
        ));
    }

    #[test]
    fn test_equality_is_structural_over_shared_criteria() {
        let name = criterion::by_key("name", |p: &Person| p.name.clone()).shared();
        let a = Spec::equivalence::<Person>().with(name.clone()).build().unwrap();
        let b = Spec::equivalence::<Person>().with(name).build().unwrap();
        let c = Spec::equivalence::<Person>()
            .by_key("name", |p: &Person| p.name.clone())
            .build()
            .unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
