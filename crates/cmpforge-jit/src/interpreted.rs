//! Comparators that run without generated code.
//!
//! [`InterpretedComparator`] walks the criteria list on every call using the
//! same algorithms the synthesizer unrolls. The identity and natural forms
//! serve specs without criteria.

use std::cmp::Ordering;
use std::sync::Arc;

use cmpforge_core::{
    same_instance, ComparatorError, NullPolicy, Result, Side, Spec, TypeToken, Value,
};
use serde::{Deserialize, Deserializer};

use crate::comparator::{proxy_required, ComparatorBody, ComparatorForm};

/// Ordering of a pair with at least one null under `policy`, if the policy
/// places nulls itself.
pub(crate) fn null_order(
    policy: NullPolicy,
    left: Option<&dyn Value>,
    right: Option<&dyn Value>,
) -> Option<Ordering> {
    let sign = policy.null_sign()?;
    let first = if sign < 0 {
        Ordering::Less
    } else {
        Ordering::Greater
    };
    match (left, right) {
        (None, None) => Some(Ordering::Equal),
        (None, Some(_)) => Some(first),
        (Some(_), None) => Some(first.reverse()),
        (Some(_), Some(_)) => None,
    }
}

fn reject_nulls(left: Option<&dyn Value>, right: Option<&dyn Value>) -> Result<()> {
    if left.is_none() {
        return Err(ComparatorError::NullArgument { side: Side::Left });
    }
    if right.is_none() {
        return Err(ComparatorError::NullArgument { side: Side::Right });
    }
    Ok(())
}

fn nulls_of(spec: &Spec) -> NullPolicy {
    spec.kind().nulls().unwrap_or_default()
}

/// Criteria evaluated in a loop. Used when a spec has more criteria than
/// the synthesizer unrolls.
pub struct InterpretedComparator {
    spec: Arc<Spec>,
}

impl InterpretedComparator {
    pub(crate) fn new(spec: Arc<Spec>) -> Self {
        Self { spec }
    }
}

impl ComparatorBody for InterpretedComparator {
    fn spec(&self) -> &Arc<Spec> {
        &self.spec
    }

    fn hash(&self, value: Option<&dyn Value>) -> Result<i32> {
        let Some(value) = value else {
            return Ok(0);
        };
        if self.spec.strict_types() {
            self.spec.target().cast(Some(value))?;
        }
        let params = self.spec.hash_params();
        self.spec
            .criteria()
            .iter()
            .try_fold(params.initial, |h, criterion| {
                Ok(h.wrapping_mul(params.multiplier)
                    .wrapping_add(criterion.hash(value)?))
            })
    }

    fn are_equal(&self, left: Option<&dyn Value>, right: Option<&dyn Value>) -> Result<bool> {
        if same_instance(left, right) {
            return Ok(true);
        }
        let (Some(left), Some(right)) = (left, right) else {
            return Ok(false);
        };
        if self.spec.strict_types() {
            let target = self.spec.target();
            target.cast(Some(left))?;
            if !target.is_instance(right) {
                return Ok(false);
            }
        }
        for criterion in self.spec.criteria() {
            if !criterion.are_equal(left, right)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn compare(&self, left: Option<&dyn Value>, right: Option<&dyn Value>) -> Result<Ordering> {
        let strict = self.spec.strict_types();
        if strict {
            let target = self.spec.target();
            target.cast(left)?;
            target.cast(right)?;
        }
        let policy = nulls_of(&self.spec);
        if let Some(order) = null_order(policy, left, right) {
            return Ok(order);
        }
        if policy == NullPolicy::Throw && strict {
            reject_nulls(left, right)?;
        }
        for criterion in self.spec.criteria() {
            let order = criterion.compare(left, right)?;
            if order != Ordering::Equal {
                return Ok(order);
            }
        }
        Ok(Ordering::Equal)
    }

    fn form(&self) -> ComparatorForm {
        ComparatorForm::Interpreted
    }
}

impl<'de> Deserialize<'de> for InterpretedComparator {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        proxy_required(deserializer, "InterpretedComparator")
    }
}

/// Reference identity. Orders every pair as equal.
pub(crate) struct IdentityComparator {
    spec: Arc<Spec>,
}

impl IdentityComparator {
    pub(crate) fn new(spec: Arc<Spec>) -> Self {
        Self { spec }
    }
}

impl ComparatorBody for IdentityComparator {
    fn spec(&self) -> &Arc<Spec> {
        &self.spec
    }

    fn hash(&self, value: Option<&dyn Value>) -> Result<i32> {
        let Some(value) = value else {
            return Ok(0);
        };
        if self.spec.strict_types() {
            self.spec.target().cast(Some(value))?;
        }
        Ok(self.spec.hash_params().initial)
    }

    fn are_equal(&self, left: Option<&dyn Value>, right: Option<&dyn Value>) -> Result<bool> {
        if self.spec.strict_types() {
            self.spec.target().cast(left)?;
        }
        Ok(same_instance(left, right))
    }

    // Kept at Equal even for distinct instances, so ordering and equality
    // disagree for this form.
    fn compare(&self, left: Option<&dyn Value>, right: Option<&dyn Value>) -> Result<Ordering> {
        if self.spec.strict_types() {
            let target = self.spec.target();
            target.cast(left)?;
            target.cast(right)?;
        }
        Ok(Ordering::Equal)
    }

    fn form(&self) -> ComparatorForm {
        ComparatorForm::Identity
    }
}

/// The target type's own `Ord`, with the null policy applied.
pub(crate) struct NaturalComparator {
    spec: Arc<Spec>,
}

impl NaturalComparator {
    pub(crate) fn new(spec: Arc<Spec>) -> Result<Self> {
        if !spec.target().has_natural_order() {
            return Err(ComparatorError::InvalidArgument(format!(
                "`{}` declares no natural ordering",
                spec.target()
            )));
        }
        Ok(Self { spec })
    }

    fn natural(&self, left: &dyn Value, right: &dyn Value) -> Result<Ordering> {
        let target: &TypeToken = self.spec.target();
        target.natural_compare(left, right).ok_or_else(|| {
            let found = if target.is_instance(left) { right } else { left };
            ComparatorError::TypeMismatch {
                expected: target.name(),
                found: found.type_name(),
            }
        })
    }
}

impl ComparatorBody for NaturalComparator {
    fn spec(&self) -> &Arc<Spec> {
        &self.spec
    }

    fn hash(&self, value: Option<&dyn Value>) -> Result<i32> {
        let Some(value) = value else {
            return Ok(0);
        };
        if self.spec.strict_types() {
            self.spec.target().cast(Some(value))?;
        }
        Ok(self.spec.hash_params().initial)
    }

    fn are_equal(&self, left: Option<&dyn Value>, right: Option<&dyn Value>) -> Result<bool> {
        if same_instance(left, right) {
            return Ok(true);
        }
        let (Some(left), Some(right)) = (left, right) else {
            return Ok(false);
        };
        Ok(self.natural(left, right)? == Ordering::Equal)
    }

    fn compare(&self, left: Option<&dyn Value>, right: Option<&dyn Value>) -> Result<Ordering> {
        if self.spec.strict_types() {
            let target = self.spec.target();
            target.cast(left)?;
            target.cast(right)?;
        }
        if let Some(order) = null_order(nulls_of(&self.spec), left, right) {
            return Ok(order);
        }
        match (left, right) {
            (Some(left), Some(right)) => self.natural(left, right),
            _ => reject_nulls(left, right).map(|()| Ordering::Equal),
        }
    }

    fn form(&self) -> ComparatorForm {
        ComparatorForm::Natural
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cmpforge_core::{by_key, ordered_by_key, SpecBuilder};

    #[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
    struct Version(u32);

    struct Row {
        a: i32,
        b: &'static str,
    }

    fn rows(nulls: NullPolicy, strict: bool) -> InterpretedComparator {
        let spec = Spec::ordering::<Row>()
            .with(ordered_by_key("a", |r: &Row| r.a).shared())
            .with(ordered_by_key("b", |r: &Row| r.b).shared())
            .nulls(nulls)
            .strict_types(strict)
            .build()
            .unwrap();
        InterpretedComparator::new(Arc::new(spec))
    }

    #[test]
    fn test_null_order() {
        let x = 1;
        assert_eq!(
            null_order(NullPolicy::NullsFirst, None, Some(&x)),
            Some(Ordering::Less)
        );
        assert_eq!(
            null_order(NullPolicy::NullsLast, None, Some(&x)),
            Some(Ordering::Greater)
        );
        assert_eq!(
            null_order(NullPolicy::NullsLast, Some(&x), None),
            Some(Ordering::Less)
        );
        assert_eq!(null_order(NullPolicy::NullsFirst, None, None), Some(Ordering::Equal));
        assert_eq!(null_order(NullPolicy::Throw, None, Some(&x)), None);
        assert_eq!(null_order(NullPolicy::NullsFirst, Some(&x), Some(&x)), None);
    }

    #[test]
    fn test_interpreted_short_circuits_in_order() {
        let cmp = rows(NullPolicy::Throw, false);
        let a = Row { a: 1, b: "z" };
        let b = Row { a: 2, b: "a" };
        let c = Row { a: 1, b: "y" };
        assert_eq!(cmp.compare(Some(&a), Some(&b)).unwrap(), Ordering::Less);
        assert_eq!(cmp.compare(Some(&a), Some(&c)).unwrap(), Ordering::Greater);
        assert!(!cmp.are_equal(Some(&a), Some(&c)).unwrap());
        assert!(cmp.are_equal(Some(&a), Some(&a)).unwrap());
        assert!(!cmp.are_equal(Some(&a), None).unwrap());
    }

    #[repr(C)]
    struct Cell {
        a: i32,
        b: i32,
    }

    #[test]
    fn test_field_sharing_an_address_is_not_the_same_instance() {
        let cell = Cell { a: 4, b: 5 };
        let strict = Spec::equivalence::<Cell>()
            .with(by_key("a", |c: &Cell| c.a).shared())
            .strict_types(true)
            .build()
            .unwrap();
        let cmp = InterpretedComparator::new(Arc::new(strict));
        assert!(!cmp.are_equal(Some(&cell), Some(&cell.a)).unwrap());
        assert!(cmp.are_equal(Some(&cell), Some(&cell)).unwrap());
        assert_eq!(cell.b, 5);

        let lax = Spec::equivalence::<Cell>()
            .with(by_key("a", |c: &Cell| c.a).shared())
            .build()
            .unwrap();
        let cmp = InterpretedComparator::new(Arc::new(lax));
        assert!(matches!(
            cmp.are_equal(Some(&cell), Some(&cell.a)),
            Err(ComparatorError::TypeMismatch { .. })
        ));

        let identity = Spec::equivalence::<Cell>()
            .fallback_to_identity()
            .build()
            .unwrap();
        let cmp = IdentityComparator::new(Arc::new(identity));
        assert!(!cmp.are_equal(Some(&cell), Some(&cell.a)).unwrap());
    }

    #[test]
    fn test_interpreted_throw_passes_nulls_to_criteria_unless_strict() {
        let a = Row { a: 1, b: "a" };
        let lax = rows(NullPolicy::Throw, false);
        assert!(matches!(
            lax.compare(None, Some(&a)),
            Err(ComparatorError::NullArgument { side: Side::Left })
        ));
        let strict = rows(NullPolicy::Throw, true);
        assert!(matches!(
            strict.compare(Some(&a), None),
            Err(ComparatorError::NullArgument { side: Side::Right })
        ));
    }

    #[test]
    fn test_interpreted_hash_folds_criteria() {
        let spec = Spec::equivalence::<Row>()
            .with(by_key("a", |r: &Row| r.a).shared())
            .hash_params(3, 5)
            .build()
            .unwrap();
        let cmp = InterpretedComparator::new(Arc::new(spec));
        let row = Row { a: 7, b: "" };
        assert_eq!(cmp.hash(Some(&row)).unwrap(), 3 * 5 + 7);
        assert_eq!(cmp.hash(None).unwrap(), 0);
    }

    #[test]
    fn test_identity() {
        let spec = Spec::ordering::<Row>()
            .fallback_to_identity()
            .hash_params(9, 31)
            .build()
            .unwrap();
        let cmp = IdentityComparator::new(Arc::new(spec));
        let a = Row { a: 1, b: "" };
        let b = Row { a: 1, b: "" };
        assert!(cmp.are_equal(Some(&a), Some(&a)).unwrap());
        assert!(!cmp.are_equal(Some(&a), Some(&b)).unwrap());
        assert_eq!(cmp.compare(Some(&a), Some(&b)).unwrap(), Ordering::Equal);
        assert_eq!(cmp.hash(Some(&a)).unwrap(), 9);
        assert_eq!(cmp.hash(None).unwrap(), 0);
    }

    #[test]
    fn test_natural() {
        let spec = SpecBuilder::ordering(TypeToken::ordered::<Version>())
            .fallback_to_natural()
            .nulls(NullPolicy::NullsLast)
            .build()
            .unwrap();
        let cmp = NaturalComparator::new(Arc::new(spec)).unwrap();
        let v1 = Version(1);
        let v2 = Version(2);
        assert_eq!(cmp.compare(Some(&v1), Some(&v2)).unwrap(), Ordering::Less);
        assert_eq!(cmp.compare(None, Some(&v2)).unwrap(), Ordering::Greater);
        assert!(cmp.are_equal(Some(&v1), Some(&Version(1))).unwrap());
        assert!(matches!(
            cmp.compare(Some(&v1), Some(&"text")),
            Err(ComparatorError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_natural_throw_rejects_nulls() {
        let spec = SpecBuilder::ordering(TypeToken::ordered::<Version>())
            .fallback_to_natural()
            .build()
            .unwrap();
        let cmp = NaturalComparator::new(Arc::new(spec)).unwrap();
        assert!(matches!(
            cmp.compare(Some(&Version(1)), None),
            Err(ComparatorError::NullArgument { side: Side::Right })
        ));
    }

    #[test]
    fn test_direct_deserialization_needs_proxy() {
        let err = serde_json::from_str::<InterpretedComparator>("{}").err().unwrap();
        assert!(err.to_string().contains("proxy"));
    }
}
