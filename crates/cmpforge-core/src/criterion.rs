//! Comparison criteria.
//!
//! A criterion is one unit of comparison over a single aspect of the target
//! type. A spec's ordered list of criteria is both the hash accumulation
//! order and the short-circuit comparison order.

use std::any::Any;
use std::cmp::Ordering;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::{ComparatorError, Result, Side};
use crate::hash::StableHash;
use crate::value::Value;

/// One comparison unit over a single aspect of the target type.
pub trait Criterion: Send + Sync {
    /// Name of the criterion; also the key under which serializable
    /// criteria are registered.
    fn name(&self) -> &str;

    fn hash(&self, value: &dyn Value) -> Result<i32>;

    fn are_equal(&self, left: &dyn Value, right: &dyn Value) -> Result<bool>;

    /// Orders two values. Absent values reach this method only when the
    /// ordering uses the `Throw` null policy without strict types.
    fn compare(&self, _left: Option<&dyn Value>, _right: Option<&dyn Value>) -> Result<Ordering> {
        Err(ComparatorError::InvalidArgument(format!(
            "criterion `{}` does not define an ordering",
            self.name()
        )))
    }

    fn is_ordered(&self) -> bool {
        false
    }

    /// Whether the criterion can be named in a serialized proxy.
    fn is_serializable(&self) -> bool {
        false
    }
}

impl fmt::Debug for dyn Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Criterion({})", self.name())
    }
}

/// Criterion comparing a key extracted from a concrete `T`.
pub struct KeyCriterion<T, K, F> {
    name: String,
    key: F,
    order: Option<fn(&K, &K) -> Ordering>,
    serializable: bool,
    _marker: PhantomData<fn(&T) -> K>,
}

/// Criterion over `key(&T)` supporting hash and equality.
pub fn by_key<T, K, F>(name: impl Into<String>, key: F) -> KeyCriterion<T, K, F>
where
    T: Any,
    K: StableHash + Eq,
    F: Fn(&T) -> K + Send + Sync,
{
    KeyCriterion {
        name: name.into(),
        key,
        order: None,
        serializable: false,
        _marker: PhantomData,
    }
}

/// Criterion over `key(&T)` supporting hash, equality and ordering.
pub fn ordered_by_key<T, K, F>(name: impl Into<String>, key: F) -> KeyCriterion<T, K, F>
where
    T: Any,
    K: StableHash + Ord,
    F: Fn(&T) -> K + Send + Sync,
{
    KeyCriterion {
        order: Some(<K as Ord>::cmp),
        ..by_key(name, key)
    }
}

impl<T, K, F> KeyCriterion<T, K, F> {
    /// Marks the criterion as serializable. It must also be registered with
    /// the serial registry under its name to be resolvable on read.
    pub fn serializable(mut self) -> Self {
        self.serializable = true;
        self
    }

    /// Wraps the criterion for use in a spec.
    pub fn shared(self) -> Arc<dyn Criterion>
    where
        T: Any,
        K: StableHash + Eq + 'static,
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        Arc::new(self)
    }
}

impl<T, K, F> KeyCriterion<T, K, F>
where
    T: Any,
    F: Fn(&T) -> K,
{
    fn extract(&self, value: &dyn Value) -> Result<K> {
        value
            .downcast_ref::<T>()
            .map(|v| (self.key)(v))
            .ok_or_else(|| ComparatorError::TypeMismatch {
                expected: std::any::type_name::<T>(),
                found: value.type_name(),
            })
    }
}

impl<T, K, F> Criterion for KeyCriterion<T, K, F>
where
    T: Any,
    K: StableHash + Eq,
    F: Fn(&T) -> K + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn hash(&self, value: &dyn Value) -> Result<i32> {
        Ok(self.extract(value)?.stable_hash())
    }

    fn are_equal(&self, left: &dyn Value, right: &dyn Value) -> Result<bool> {
        Ok(self.extract(left)? == self.extract(right)?)
    }

    fn compare(&self, left: Option<&dyn Value>, right: Option<&dyn Value>) -> Result<Ordering> {
        let Some(order) = self.order else {
            return Err(ComparatorError::InvalidArgument(format!(
                "criterion `{}` does not define an ordering",
                self.name
            )));
        };
        let left = left.ok_or(ComparatorError::NullArgument { side: Side::Left })?;
        let right = right.ok_or(ComparatorError::NullArgument { side: Side::Right })?;
        Ok(order(&self.extract(left)?, &self.extract(right)?))
    }

    fn is_ordered(&self) -> bool {
        self.order.is_some()
    }

    fn is_serializable(&self) -> bool {
        self.serializable
    }
}
