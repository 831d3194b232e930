//! Calling convention between synthesized code and the process.
//!
//! Every synthesized method takes one argument, a pointer to a [`CallFrame`],
//! and returns an `i64`. Method bodies reach criteria, the type token and the
//! spec through `extern "C"` helpers whose parameters are all `i64` words:
//! slot words (addresses of runtime values), the frame pointer and small
//! integers. A helper that fails stores the error, or the caught panic, in
//! the frame and returns [`FAULT`]; generated code then returns `FAULT` from
//! a shared block and [`CallFrame::finish`] turns it back into an error.

use std::any::Any;
use std::cmp::Ordering;
use std::mem::offset_of;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::sync::Arc;

use cmpforge_core::{
    same_instance, ComparatorError, ComparatorProxy, Criterion, Result, Side, Spec, TypeToken,
    Value,
};

use crate::bridge::cmpforge_bridge_resolve;

/// Fault sentinel returned by helpers and synthesized methods.
pub const FAULT: i64 = i64::MIN;

/// Byte offset of the left argument's data address in [`CallFrame`].
pub(crate) const LEFT_OFFSET: i32 = offset_of!(CallFrame<'static>, left) as i32;

/// Byte offset of the right argument's data address in [`CallFrame`].
pub(crate) const RIGHT_OFFSET: i32 = offset_of!(CallFrame<'static>, right) as i32;

/// Byte offset of the identity flag in [`CallFrame`].
pub(crate) const IDENTICAL_OFFSET: i32 = offset_of!(CallFrame<'static>, identical) as i32;

pub(crate) enum Fault {
    Error(ComparatorError),
    Panic(Box<dyn Any + Send>),
}

/// Per-call state shared with synthesized code.
///
/// Generated code reads only `left`, `right` and `identical`; everything
/// else is touched by helpers.
#[repr(C)]
pub(crate) struct CallFrame<'a> {
    #[allow(dead_code)]
    left: *const u8,
    #[allow(dead_code)]
    right: *const u8,
    /// 1 when both arguments are the same instance of the same type.
    #[allow(dead_code)]
    identical: i64,
    left_value: Option<&'a dyn Value>,
    right_value: Option<&'a dyn Value>,
    fault: Option<Fault>,
    proxy: Option<ComparatorProxy>,
    protected: bool,
}

impl<'a> CallFrame<'a> {
    pub(crate) fn new(left: Option<&'a dyn Value>, right: Option<&'a dyn Value>) -> Self {
        Self {
            left: left.map_or(ptr::null(), |v| v.address()),
            right: right.map_or(ptr::null(), |v| v.address()),
            identical: i64::from(same_instance(left, right)),
            left_value: left,
            right_value: right,
            fault: None,
            proxy: None,
            protected: false,
        }
    }

    /// Frame for the serialization hook.
    pub(crate) fn for_write_replace(protected: bool) -> Self {
        Self {
            protected,
            ..Self::new(None, None)
        }
    }

    /// Address passed to synthesized code.
    pub(crate) fn as_word(&mut self) -> i64 {
        self as *mut CallFrame<'a> as i64
    }

    fn value(&self, side: Side) -> Option<&'a dyn Value> {
        match side {
            Side::Left => self.left_value,
            Side::Right => self.right_value,
        }
    }

    pub(crate) fn take_proxy(&mut self) -> Option<ComparatorProxy> {
        self.proxy.take()
    }

    /// Maps a raw method result back into Rust, resuming caught panics.
    pub(crate) fn finish(&mut self, raw: i64) -> Result<i64> {
        if raw != FAULT {
            return Ok(raw);
        }
        match self.fault.take() {
            Some(Fault::Error(err)) => Err(err),
            Some(Fault::Panic(payload)) => panic::resume_unwind(payload),
            None => Err(ComparatorError::InvalidArgument(
                "synthesized code raised a fault without recording it".to_string(),
            )),
        }
    }
}

/// Runs a helper body against the frame at `frame`, recording any failure.
fn guarded(frame: i64, body: impl FnOnce(&mut CallFrame<'_>) -> Result<i64>) -> i64 {
    // SAFETY: synthesized code only passes the frame pointer it was called
    // with, which points to a live `CallFrame` on the caller's stack.
    let frame = unsafe { &mut *(frame as *mut CallFrame<'_>) };
    match panic::catch_unwind(AssertUnwindSafe(|| body(&mut *frame))) {
        Ok(Ok(value)) => value,
        Ok(Err(err)) => {
            frame.fault = Some(Fault::Error(err));
            FAULT
        }
        Err(payload) => {
            frame.fault = Some(Fault::Panic(payload));
            FAULT
        }
    }
}

/// # Safety
///
/// `word` must be a criterion slot word of a live artifact.
unsafe fn criterion<'a>(word: i64) -> &'a dyn Criterion {
    unsafe { &**(word as *const Arc<dyn Criterion>) }
}

/// # Safety
///
/// `word` must be the token slot word of a live artifact.
unsafe fn token<'a>(word: i64) -> &'a TypeToken {
    unsafe { &*(word as *const TypeToken) }
}

fn present<'a>(frame: &CallFrame<'a>, side: Side) -> Result<&'a dyn Value> {
    frame
        .value(side)
        .ok_or(ComparatorError::NullArgument { side })
}

fn ordering_word(ordering: Ordering) -> i64 {
    match ordering {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    }
}

pub(crate) extern "C" fn cmpforge_criterion_hash(criterion_word: i64, frame: i64) -> i64 {
    guarded(frame, |frame| {
        // SAFETY: emitted only with criterion slot words.
        let criterion = unsafe { criterion(criterion_word) };
        Ok(i64::from(criterion.hash(present(frame, Side::Left)?)?))
    })
}

pub(crate) extern "C" fn cmpforge_criterion_equal(criterion_word: i64, frame: i64) -> i64 {
    guarded(frame, |frame| {
        // SAFETY: emitted only with criterion slot words.
        let criterion = unsafe { criterion(criterion_word) };
        let equal = criterion.are_equal(present(frame, Side::Left)?, present(frame, Side::Right)?)?;
        Ok(i64::from(equal))
    })
}

pub(crate) extern "C" fn cmpforge_criterion_compare(criterion_word: i64, frame: i64) -> i64 {
    guarded(frame, |frame| {
        // SAFETY: emitted only with criterion slot words.
        let criterion = unsafe { criterion(criterion_word) };
        let ordering = criterion.compare(frame.left_value, frame.right_value)?;
        Ok(ordering_word(ordering))
    })
}

pub(crate) extern "C" fn cmpforge_check_cast(token_word: i64, frame: i64, side: i64) -> i64 {
    guarded(frame, |frame| {
        // SAFETY: emitted only with the token slot word.
        let token = unsafe { token(token_word) };
        token.cast(frame.value(Side::from_index(side)))?;
        Ok(0)
    })
}

pub(crate) extern "C" fn cmpforge_is_instance(token_word: i64, frame: i64, side: i64) -> i64 {
    guarded(frame, |frame| {
        // SAFETY: emitted only with the token slot word.
        let token = unsafe { token(token_word) };
        let instance = frame
            .value(Side::from_index(side))
            .is_some_and(|v| token.is_instance(v));
        Ok(i64::from(instance))
    })
}

pub(crate) extern "C" fn cmpforge_reject_null(frame: i64, side: i64) -> i64 {
    guarded(frame, |_| {
        Err(ComparatorError::NullArgument {
            side: Side::from_index(side),
        })
    })
}

pub(crate) extern "C" fn cmpforge_write_replace(spec_word: i64, frame: i64) -> i64 {
    guarded(frame, |frame| {
        // SAFETY: emitted only with the spec slot word of a serializable
        // artifact, which holds the spec alive.
        let spec = unsafe { &*(spec_word as *const Spec) };
        frame.proxy = Some(spec.write_replace(frame.protected)?);
        Ok(0)
    })
}

/// Process functions callable from synthesized code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Helper {
    CriterionHash,
    CriterionEqual,
    CriterionCompare,
    CheckCast,
    IsInstance,
    RejectNull,
    WriteReplace,
    BridgeResolve,
}

impl Helper {
    pub(crate) const ALL: [Helper; 8] = [
        Helper::CriterionHash,
        Helper::CriterionEqual,
        Helper::CriterionCompare,
        Helper::CheckCast,
        Helper::IsInstance,
        Helper::RejectNull,
        Helper::WriteReplace,
        Helper::BridgeResolve,
    ];

    pub(crate) fn symbol(self) -> &'static str {
        match self {
            Helper::CriterionHash => "cmpforge_criterion_hash",
            Helper::CriterionEqual => "cmpforge_criterion_equal",
            Helper::CriterionCompare => "cmpforge_criterion_compare",
            Helper::CheckCast => "cmpforge_check_cast",
            Helper::IsInstance => "cmpforge_is_instance",
            Helper::RejectNull => "cmpforge_reject_null",
            Helper::WriteReplace => "cmpforge_write_replace",
            Helper::BridgeResolve => "cmpforge_bridge_resolve",
        }
    }

    /// Number of `i64` parameters.
    pub(crate) fn arity(self) -> usize {
        match self {
            Helper::BridgeResolve => 1,
            Helper::CheckCast | Helper::IsInstance => 3,
            _ => 2,
        }
    }

    pub(crate) fn address(self) -> *const u8 {
        match self {
            Helper::CriterionHash => cmpforge_criterion_hash as *const u8,
            Helper::CriterionEqual => cmpforge_criterion_equal as *const u8,
            Helper::CriterionCompare => cmpforge_criterion_compare as *const u8,
            Helper::CheckCast => cmpforge_check_cast as *const u8,
            Helper::IsInstance => cmpforge_is_instance as *const u8,
            Helper::RejectNull => cmpforge_reject_null as *const u8,
            Helper::WriteReplace => cmpforge_write_replace as *const u8,
            Helper::BridgeResolve => cmpforge_bridge_resolve as *const u8,
        }
    }

    /// Symbol table registered with every synthesis module.
    pub(crate) fn symbols() -> Vec<(&'static str, *const u8)> {
        Self::ALL
            .iter()
            .map(|helper| (helper.symbol(), helper.address()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cmpforge_core::{by_key, ordered_by_key};

    struct Pair {
        a: i32,
    }

    fn word<T>(value: &T) -> i64 {
        value as *const T as i64
    }

    #[test]
    fn test_frame_offsets_are_leading_words() {
        assert_eq!(LEFT_OFFSET, 0);
        assert_eq!(RIGHT_OFFSET, 8);
        assert_eq!(IDENTICAL_OFFSET, 16);
    }

    #[test]
    fn test_identity_flag_needs_same_type() {
        let x = Pair { a: 3 };
        assert_eq!(CallFrame::new(Some(&x), Some(&x)).identical, 1);
        assert_eq!(CallFrame::new(None, None).identical, 1);
        assert_eq!(CallFrame::new(Some(&x), Some(&x.a)).identical, 0);
        assert_eq!(CallFrame::new(Some(&x), None).identical, 0);
    }

    #[test]
    fn test_hash_helper_reads_left_value() {
        let criterion = by_key("a", |p: &Pair| p.a).shared();
        let x = Pair { a: -5 };
        let mut frame = CallFrame::new(Some(&x), None);
        let raw = cmpforge_criterion_hash(word(&criterion), frame.as_word());
        assert_eq!(frame.finish(raw).unwrap(), -5);
    }

    #[test]
    fn test_compare_helper_maps_ordering() {
        let criterion = ordered_by_key("a", |p: &Pair| p.a).shared();
        let x = Pair { a: 1 };
        let y = Pair { a: 2 };
        let mut frame = CallFrame::new(Some(&x), Some(&y));
        let raw = cmpforge_criterion_compare(word(&criterion), frame.as_word());
        assert_eq!(frame.finish(raw).unwrap(), -1);
    }

    #[test]
    fn test_failures_are_recorded_in_frame() {
        let token = TypeToken::of::<Pair>();
        let s = String::from("wrong");
        let mut frame = CallFrame::new(Some(&s), None);
        let raw = cmpforge_check_cast(word(&token), frame.as_word(), Side::Left.index());
        assert_eq!(raw, FAULT);
        assert!(matches!(
            frame.finish(raw),
            Err(ComparatorError::TypeMismatch { .. })
        ));

        let raw = cmpforge_reject_null(frame.as_word(), Side::Right.index());
        assert!(matches!(
            frame.finish(raw),
            Err(ComparatorError::NullArgument { side: Side::Right })
        ));
    }

    #[test]
    fn test_is_instance_helper() {
        let token = TypeToken::of::<Pair>();
        let x = Pair { a: 0 };
        let mut frame = CallFrame::new(Some(&x), Some(&"str"));
        assert_eq!(cmpforge_is_instance(word(&token), frame.as_word(), 0), 1);
        assert_eq!(cmpforge_is_instance(word(&token), frame.as_word(), 1), 0);
    }

    #[test]
    fn test_panics_are_carried_across_the_boundary() {
        let criterion = by_key("boom", |_: &Pair| -> i32 { panic!("criterion exploded") }).shared();
        let x = Pair { a: 0 };
        let mut frame = CallFrame::new(Some(&x), None);
        let raw = cmpforge_criterion_hash(word(&criterion), frame.as_word());
        assert_eq!(raw, FAULT);
        let payload = panic::catch_unwind(AssertUnwindSafe(|| frame.finish(raw))).unwrap_err();
        assert_eq!(payload.downcast_ref::<&str>(), Some(&"criterion exploded"));
    }

    #[test]
    fn test_symbols_cover_every_helper() {
        let symbols = Helper::symbols();
        assert_eq!(symbols.len(), Helper::ALL.len());
        assert!(symbols.iter().all(|(_, address)| !address.is_null()));
    }
}
