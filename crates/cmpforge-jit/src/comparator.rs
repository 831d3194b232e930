//! The public comparator handle.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use cmpforge_config::{DefinerKind, InstantiatorKind, SerializationMode, WiringMode};
use cmpforge_core::{ComparatorError, ComparatorProxy, Result, Spec, Value};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::engine::Engine;

/// Behavior shared by every comparator implementation.
pub(crate) trait ComparatorBody: Send + Sync {
    fn spec(&self) -> &Arc<Spec>;

    fn hash(&self, value: Option<&dyn Value>) -> Result<i32>;

    fn are_equal(&self, left: Option<&dyn Value>, right: Option<&dyn Value>) -> Result<bool>;

    /// Only called for ordering specs.
    fn compare(&self, left: Option<&dyn Value>, right: Option<&dyn Value>) -> Result<Ordering>;

    fn write_replace(&self, protected: bool) -> Result<ComparatorProxy> {
        self.spec().write_replace(protected)
    }

    fn form(&self) -> ComparatorForm;
}

/// How a comparator was produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComparatorForm {
    /// Native code from the given backend combination.
    Synthesized {
        artifact: String,
        definer: DefinerKind,
        instantiator: InstantiatorKind,
        wiring: WiringMode,
    },
    /// Criteria walked at call time.
    Interpreted,
    /// Empty criteria, reference identity.
    Identity,
    /// Empty criteria, the target's natural ordering.
    Natural,
}

impl ComparatorForm {
    pub fn is_synthesized(&self) -> bool {
        matches!(self, ComparatorForm::Synthesized { .. })
    }
}

impl fmt::Display for ComparatorForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComparatorForm::Synthesized {
                artifact,
                definer,
                instantiator,
                wiring,
            } => write!(f, "synthesized {artifact} ({definer}/{instantiator}/{wiring})"),
            ComparatorForm::Interpreted => f.write_str("interpreted"),
            ComparatorForm::Identity => f.write_str("identity"),
            ComparatorForm::Natural => f.write_str("natural"),
        }
    }
}

/// Equality, ordering and hashing for one [`Spec`].
///
/// Cheap to clone; clones share the underlying implementation. Arguments
/// are passed as `Option<&dyn Value>` with `None` standing for null.
///
/// # Example
///
/// ```no_run
/// use cmpforge_jit::{Engine, SpecBuilderExt};
/// use cmpforge_core::{ordered_by_key, Spec};
///
/// struct Point { x: i32, y: i32 }
///
/// let cmp = Spec::ordering::<Point>()
///     .with(ordered_by_key("x", |p: &Point| p.x).shared())
///     .with(ordered_by_key("y", |p: &Point| p.y).shared())
///     .comparator()
///     .unwrap();
///
/// let a = Point { x: 1, y: 2 };
/// let b = Point { x: 1, y: 3 };
/// assert!(cmp.compare(Some(&a), Some(&b)).unwrap().is_lt());
/// ```
#[derive(Clone)]
pub struct Comparator {
    body: Arc<dyn ComparatorBody>,
    serialization: SerializationMode,
}

impl Comparator {
    pub(crate) fn new(body: Arc<dyn ComparatorBody>, serialization: SerializationMode) -> Self {
        Self {
            body,
            serialization,
        }
    }

    pub fn spec(&self) -> &Spec {
        self.body.spec()
    }

    pub fn form(&self) -> ComparatorForm {
        self.body.form()
    }

    pub fn hash(&self, value: Option<&dyn Value>) -> Result<i32> {
        self.body.hash(value)
    }

    pub fn are_equal(&self, left: Option<&dyn Value>, right: Option<&dyn Value>) -> Result<bool> {
        self.body.are_equal(left, right)
    }

    /// Orders two values. Fails for equivalence specs.
    pub fn compare(&self, left: Option<&dyn Value>, right: Option<&dyn Value>) -> Result<Ordering> {
        if !self.spec().is_ordering() {
            return Err(ComparatorError::InvalidArgument(format!(
                "`{}` defines equivalence only",
                self.spec()
            )));
        }
        self.body.compare(left, right)
    }

    /// The serialization record for this comparator.
    pub fn to_proxy(&self) -> Result<ComparatorProxy> {
        match self.serialization {
            SerializationMode::Hostile => Err(ComparatorError::SerializationBlocked(format!(
                "comparators for `{}` refuse serialization",
                self.spec().target()
            ))),
            SerializationMode::Incompatible => Err(ComparatorError::SerializationDisabled(
                format!("comparators for `{}` are not serializable", self.spec().target()),
            )),
            mode => self.body.write_replace(mode.protects()),
        }
    }
}

impl fmt::Debug for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Comparator")
            .field("spec", &self.spec().to_string())
            .field("form", &self.form())
            .field("serialization", &self.serialization)
            .finish()
    }
}

impl Serialize for Comparator {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_proxy()
            .map_err(serde::ser::Error::custom)?
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Comparator {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let proxy = ComparatorProxy::deserialize(deserializer)?;
        Engine::shared()
            .rebuild(proxy)
            .map_err(serde::de::Error::custom)
    }
}

/// Refuses direct deserialization of an internal comparator form.
pub(crate) fn proxy_required<'de, D, T>(deserializer: D, form: &'static str) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
{
    serde::de::IgnoredAny::deserialize(deserializer)?;
    Err(serde::de::Error::custom(ComparatorError::ProxyRequired { form }))
}
