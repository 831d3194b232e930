//! The comparator specification.
//!
//! A [`Spec`] is the sole input to comparator synthesis. It is assembled and
//! validated by [`SpecBuilder`](crate::SpecBuilder) and never mutated
//! afterwards.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::criterion::Criterion;
use crate::error::{ComparatorError, Result};
use crate::host::HostContext;
use crate::proxy::ComparatorProxy;
use crate::value::TypeToken;

/// Seed parameters for hash accumulation.
///
/// The hash of a value is `h = initial`, then `h = h * multiplier + c.hash(x)`
/// for each criterion `c` in order, with wrapping 32-bit arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct HashParams {
    pub initial: i32,
    pub multiplier: i32,
}

impl HashParams {
    pub fn new(initial: i32, multiplier: i32) -> Self {
        Self {
            initial,
            multiplier,
        }
    }
}

impl Default for HashParams {
    fn default() -> Self {
        Self::new(17, 37)
    }
}

/// How an ordering treats absent arguments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NullPolicy {
    /// Reject nulls (with strict types) or hand them to the first criterion.
    #[default]
    Throw,

    /// Absent values sort before present ones.
    NullsFirst,

    /// Absent values sort after present ones.
    NullsLast,
}

impl NullPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            NullPolicy::Throw => "throw",
            NullPolicy::NullsFirst => "nulls_first",
            NullPolicy::NullsLast => "nulls_last",
        }
    }

    /// Result for `compare(null, present)`, if the policy decides it.
    pub fn null_sign(self) -> Option<i64> {
        match self {
            NullPolicy::Throw => None,
            NullPolicy::NullsFirst => Some(-1),
            NullPolicy::NullsLast => Some(1),
        }
    }
}

/// Behavior of a spec without criteria.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackMode {
    /// Reference identity.
    Identity,

    /// The target type's declared natural ordering. Ordering specs only.
    Natural,
}

/// Total mapping over [`FallbackMode`].
///
/// Every consumer of fallback modes implements this trait, so adding a mode
/// is a compile-time obligation for all of them.
pub trait FallbackHandler {
    type Output;

    fn on_identity(self) -> Self::Output;

    fn on_natural(self) -> Self::Output;
}

impl FallbackMode {
    pub fn resolve<H: FallbackHandler>(self, handler: H) -> H::Output {
        match self {
            FallbackMode::Identity => handler.on_identity(),
            FallbackMode::Natural => handler.on_natural(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FallbackMode::Identity => "identity",
            FallbackMode::Natural => "natural",
        }
    }
}

/// Whether the spec describes an equivalence or an ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecKind {
    Equivalence,
    Ordering { nulls: NullPolicy },
}

impl SpecKind {
    /// Prefix used in synthesized artifact names.
    pub fn prefix(self) -> &'static str {
        match self {
            SpecKind::Equivalence => "Eq",
            SpecKind::Ordering { .. } => "Ord",
        }
    }

    pub fn nulls(self) -> Option<NullPolicy> {
        match self {
            SpecKind::Equivalence => None,
            SpecKind::Ordering { nulls } => Some(nulls),
        }
    }
}

/// Immutable description of one comparator to build.
#[derive(Clone)]
pub struct Spec {
    pub(crate) target: TypeToken,
    pub(crate) criteria: Vec<Arc<dyn Criterion>>,
    pub(crate) hash: HashParams,
    pub(crate) strict_types: bool,
    pub(crate) fallback: Option<FallbackMode>,
    pub(crate) kind: SpecKind,
    pub(crate) serializable: bool,
    pub(crate) host: Option<HostContext>,
}

impl Spec {
    pub fn target(&self) -> &TypeToken {
        &self.target
    }

    /// Criteria in hash-accumulation and short-circuit order.
    pub fn criteria(&self) -> &[Arc<dyn Criterion>] {
        &self.criteria
    }

    pub fn hash_params(&self) -> HashParams {
        self.hash
    }

    pub fn strict_types(&self) -> bool {
        self.strict_types
    }

    pub fn fallback(&self) -> Option<FallbackMode> {
        self.fallback
    }

    pub fn kind(&self) -> SpecKind {
        self.kind
    }

    pub fn is_ordering(&self) -> bool {
        matches!(self.kind, SpecKind::Ordering { .. })
    }

    pub fn is_serializable(&self) -> bool {
        self.serializable
    }

    /// Privileged-access token scoping the synthesized code, if any.
    pub fn host(&self) -> Option<&HostContext> {
        self.host.as_ref()
    }

    /// Returns `true` if the spec has no criteria.
    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }

    /// Produces the serialized form of a comparator built from this spec.
    ///
    /// `protected` adds a fingerprint that readers verify.
    pub fn write_replace(&self, protected: bool) -> Result<ComparatorProxy> {
        if !self.serializable {
            return Err(ComparatorError::SerializationDisabled(format!(
                "spec for `{}` is not serializable",
                self.target.name()
            )));
        }
        Ok(ComparatorProxy::capture(self, protected))
    }
}

impl PartialEq for Spec {
    fn eq(&self, other: &Self) -> bool {
        self.target == other.target
            && self.hash == other.hash
            && self.strict_types == other.strict_types
            && self.fallback == other.fallback
            && self.kind == other.kind
            && self.serializable == other.serializable
            && self.host == other.host
            && self.criteria.len() == other.criteria.len()
            && self
                .criteria
                .iter()
                .zip(&other.criteria)
                .all(|(a, b)| std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b)))
    }
}

impl fmt::Debug for Spec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Spec")
            .field("target", &self.target.name())
            .field("criteria", &self.criteria)
            .field("hash", &self.hash)
            .field("strict_types", &self.strict_types)
            .field("fallback", &self.fallback)
            .field("kind", &self.kind)
            .field("serializable", &self.serializable)
            .field("host", &self.host)
            .finish()
    }
}

impl fmt::Display for Spec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}<{}>[", self.kind.prefix(), self.target.short_name())?;
        for (idx, criterion) in self.criteria.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            f.write_str(criterion.name())?;
        }
        write!(
            f,
            "] hash=({}, {})",
            self.hash.initial, self.hash.multiplier
        )?;
        if let Some(nulls) = self.kind.nulls() {
            write!(f, " nulls={}", nulls.as_str())?;
        }
        if let Some(fallback) = self.fallback {
            write!(f, " fallback={}", fallback.as_str())?;
        }
        if self.strict_types {
            f.write_str(" strict")?;
        }
        Ok(())
    }
}
