//! cmpforge - comparators synthesized to native code
//!
//! Describe which criteria decide equality, ordering and hashing for a type,
//! then ask for a comparator. The first build compiles a specialized
//! artifact; specs outside what the synthesizer covers fall back to
//! interpreted forms transparently.
//!
//! # Example
//!
//! ```no_run
//! use cmpforge::prelude::*;
//!
//! struct Order { customer: u32, total: i64 }
//!
//! let cmp = Spec::ordering::<Order>()
//!     .with(ordered_by_key("customer", |o: &Order| o.customer).shared())
//!     .with(ordered_by_key("total", |o: &Order| o.total).shared())
//!     .nulls(NullPolicy::NullsLast)
//!     .comparator()
//!     .unwrap();
//!
//! let a = Order { customer: 7, total: 120 };
//! let b = Order { customer: 7, total: 90 };
//! assert!(cmp.compare(Some(&a), Some(&b)).unwrap().is_gt());
//! assert!(cmp.compare(Some(&a), None).unwrap().is_lt());
//! ```

// Specification model
pub use cmpforge_core::{
    by_key, ordered_by_key, same_instance, Criterion, FallbackMode, HashParams, HostContext,
    KeyCriterion, NullPolicy, Spec, SpecBuilder, SpecKind, StableHash, TypeToken, Value,
};

// Errors
pub use cmpforge_core::{ComparatorError, Result, Side};

// Serialization
pub use cmpforge_core::{ComparatorProxy, SerialRegistry, PROXY_VERSION};

// Configuration
pub use cmpforge_config::{
    ConfigError, DefinerKind, InstantiatorKind, SerializationMode, SynthesisConfig, WiringMode,
};

// Engine and comparators
pub use cmpforge_jit::{
    Comparator, ComparatorForm, Engine, SpecBuilderExt, MAX_SYNTHESIZED_CRITERIA,
};

/// Host capability probes and the fallback walker.
pub mod runtime {
    pub use cmpforge_jit::capability::{
        Capability, CapabilityDescriptor, Probe, SlotWriter, EXECUTABLE_MEMORY, SLOT_WRITER,
        TARGET_ISA,
    };
    pub use cmpforge_jit::fallback::Fallback;
}

#[cfg(feature = "console")]
pub mod console;

pub mod prelude {
    pub use super::{by_key, ordered_by_key, Criterion, NullPolicy, Spec, SpecBuilder, TypeToken};
    pub use super::{Comparator, ComparatorError, Engine, SpecBuilderExt, SynthesisConfig};
}
