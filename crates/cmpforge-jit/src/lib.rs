//! Native comparator synthesis for cmpforge.
//!
//! The [`Engine`] turns a [`Spec`](cmpforge_core::Spec) into a
//! [`Comparator`] whose hash, equality and ordering run as Cranelift-compiled
//! code specialized for the spec's criteria. Backends that need privileged
//! host facilities are pruned when those facilities are missing, and specs
//! the synthesizer does not cover degrade to interpreted forms.

mod abi;
mod artifact;
mod bridge;
pub mod capability;
mod codegen;
mod comparator;
mod definer;
mod engine;
pub mod fallback;
mod instantiator;
mod interpreted;
mod synthesized;
mod wiring;

pub use abi::FAULT;
pub use capability::{
    Capability, CapabilityDescriptor, Probe, SlotWriter, EXECUTABLE_MEMORY, SLOT_WRITER,
    TARGET_ISA,
};
pub use comparator::{Comparator, ComparatorForm};
pub use engine::{Engine, SpecBuilderExt, MAX_SYNTHESIZED_CRITERIA};
pub use fallback::Fallback;
pub use interpreted::InterpretedComparator;
pub use synthesized::SynthesizedComparator;
