//! Dynamically typed arguments and type tokens.
//!
//! Comparators accept `Option<&dyn Value>`; `None` plays the role of a null
//! input. Every `'static` type is a [`Value`], so callers simply pass `&x`.

use std::any::{Any, TypeId};
use std::cmp::Ordering;
use std::convert::Infallible;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::{ComparatorError, Result};

/// An argument handed to a comparator or criterion.
pub trait Value: Any {
    /// Upcast used for downcasting to the concrete type.
    fn as_any(&self) -> &dyn Any;

    /// Name of the concrete type, for diagnostics.
    fn type_name(&self) -> &'static str;
}

impl<T: Any> Value for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

impl dyn Value {
    /// Returns `true` if the concrete type is `T`.
    pub fn is<T: Any>(&self) -> bool {
        self.as_any().is::<T>()
    }

    /// Downcasts to the concrete type.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    /// Address of the referenced data, used for identity comparison.
    pub fn address(&self) -> *const u8 {
        self as *const dyn Value as *const u8
    }
}

/// Reference identity of two optional arguments. Two absent values are identical.
///
/// Identity needs both the address and the concrete type to match: a struct
/// shares its address with its first field, and distinct zero-sized values
/// may share one address.
pub fn same_instance(left: Option<&dyn Value>, right: Option<&dyn Value>) -> bool {
    match (left, right) {
        (None, None) => true,
        (Some(l), Some(r)) => {
            std::ptr::addr_eq(l.address(), r.address())
                && l.as_any().type_id() == r.as_any().type_id()
        }
        _ => false,
    }
}

type NaturalOrder = fn(&dyn Value, &dyn Value) -> Option<Ordering>;

/// Runtime token for the target type of a comparator.
///
/// Tokens compare by `TypeId`. A token created with [`TypeToken::ordered`]
/// additionally records the type's natural ordering, which is what the
/// `Natural` fallback inspects before use.
#[derive(Clone, Copy)]
pub struct TypeToken {
    id: TypeId,
    name: &'static str,
    natural_order: Option<NaturalOrder>,
}

fn natural_cmp<T: Any + Ord>(left: &dyn Value, right: &dyn Value) -> Option<Ordering> {
    Some(left.downcast_ref::<T>()?.cmp(right.downcast_ref::<T>()?))
}

impl TypeToken {
    /// Token for `T` without a declared natural ordering.
    pub fn of<T: Any>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
            natural_order: None,
        }
    }

    /// Token for `T` declaring its `Ord` implementation as natural ordering.
    pub fn ordered<T: Any + Ord>() -> Self {
        Self {
            natural_order: Some(natural_cmp::<T>),
            ..Self::of::<T>()
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Fully qualified type name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Type name without module path or generic arguments.
    pub fn short_name(&self) -> &'static str {
        let base = self.name.split('<').next().unwrap_or(self.name);
        base.rsplit("::").next().unwrap_or(base)
    }

    /// Unit-like types that cannot be the target of a comparator.
    pub fn is_void(&self) -> bool {
        self.id == TypeId::of::<()>() || self.id == TypeId::of::<Infallible>()
    }

    pub fn has_natural_order(&self) -> bool {
        self.natural_order.is_some()
    }

    /// Compares two values by the declared natural ordering.
    ///
    /// Returns `None` when no ordering is declared or either value is not
    /// an instance of the token's type.
    pub fn natural_compare(&self, left: &dyn Value, right: &dyn Value) -> Option<Ordering> {
        self.natural_order.and_then(|order| order(left, right))
    }

    /// Returns `true` if `value` is exactly of this token's type.
    pub fn is_instance(&self, value: &dyn Value) -> bool {
        value.as_any().type_id() == self.id
    }

    /// Checked cast: absent values pass, present values must match.
    pub fn cast<'a>(&self, value: Option<&'a dyn Value>) -> Result<Option<&'a dyn Value>> {
        match value {
            Some(v) if !self.is_instance(v) => Err(ComparatorError::TypeMismatch {
                expected: self.name,
                found: v.type_name(),
            }),
            other => Ok(other),
        }
    }
}

impl PartialEq for TypeToken {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeToken {}

impl Hash for TypeToken {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeToken")
            .field("name", &self.name)
            .field("natural_order", &self.natural_order.is_some())
            .finish()
    }
}

impl fmt::Display for TypeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}
