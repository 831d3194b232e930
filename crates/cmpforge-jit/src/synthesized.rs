//! Comparators backed by generated code.

use std::cmp::Ordering;
use std::sync::Arc;

use cmpforge_config::InstantiatorKind;
use cmpforge_core::{ComparatorError, ComparatorProxy, Result, Spec, Value};
use serde::{Deserialize, Deserializer};

use crate::abi::CallFrame;
use crate::artifact::Artifact;
use crate::comparator::{proxy_required, ComparatorBody, ComparatorForm};

type MethodFn = extern "C" fn(i64) -> i64;

/// A comparator whose methods are an artifact's compiled entry points.
pub struct SynthesizedComparator {
    artifact: Arc<Artifact>,
    spec: Arc<Spec>,
    instantiator: InstantiatorKind,
}

impl SynthesizedComparator {
    pub(crate) fn new(
        artifact: Arc<Artifact>,
        spec: Arc<Spec>,
        instantiator: InstantiatorKind,
    ) -> Self {
        Self {
            artifact,
            spec,
            instantiator,
        }
    }

    fn call(entry: *const u8, frame: &mut CallFrame<'_>) -> Result<i64> {
        // SAFETY: every method except `init` was compiled as
        // `extern "C" fn(frame: i64) -> i64`, and `self.artifact` keeps the
        // code alive for the duration of the call.
        let method: MethodFn = unsafe { std::mem::transmute(entry) };
        let raw = method(frame.as_word());
        frame.finish(raw)
    }
}

impl ComparatorBody for SynthesizedComparator {
    fn spec(&self) -> &Arc<Spec> {
        &self.spec
    }

    fn hash(&self, value: Option<&dyn Value>) -> Result<i32> {
        let mut frame = CallFrame::new(value, None);
        let raw = Self::call(self.artifact.methods().hash, &mut frame)?;
        // The method sign-extends its 32-bit result.
        Ok(raw as i32)
    }

    fn are_equal(&self, left: Option<&dyn Value>, right: Option<&dyn Value>) -> Result<bool> {
        let mut frame = CallFrame::new(left, right);
        Ok(Self::call(self.artifact.methods().equals, &mut frame)? != 0)
    }

    fn compare(&self, left: Option<&dyn Value>, right: Option<&dyn Value>) -> Result<Ordering> {
        let Some(entry) = self.artifact.methods().compare else {
            return Err(ComparatorError::InvalidArgument(format!(
                "artifact `{}` has no ordering",
                self.artifact.name()
            )));
        };
        let mut frame = CallFrame::new(left, right);
        Ok(Self::call(entry, &mut frame)?.cmp(&0))
    }

    fn write_replace(&self, protected: bool) -> Result<ComparatorProxy> {
        let Some(entry) = self.artifact.methods().write_replace else {
            return self.spec.write_replace(protected);
        };
        let mut frame = CallFrame::for_write_replace(protected);
        Self::call(entry, &mut frame)?;
        frame.take_proxy().ok_or_else(|| {
            ComparatorError::SerializationDisabled(format!(
                "artifact `{}` produced no proxy",
                self.artifact.name()
            ))
        })
    }

    fn form(&self) -> ComparatorForm {
        ComparatorForm::Synthesized {
            artifact: self.artifact.name().to_string(),
            definer: self.artifact.definer(),
            instantiator: self.instantiator,
            wiring: self.artifact.wiring(),
        }
    }
}

impl<'de> Deserialize<'de> for SynthesizedComparator {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        proxy_required(deserializer, "SynthesizedComparator")
    }
}
