//! cmpforge Core - Specification model for synthesized comparators
//!
//! This crate provides the inputs the synthesis engine consumes:
//! - Dynamically typed values and type tokens
//! - Criteria and stable key hashing
//! - The immutable `Spec` and its builder
//! - The serialization proxy and the name registry that resolves it

pub mod builder;
pub mod criterion;
pub mod error;
pub mod hash;
pub mod host;
pub mod proxy;
pub mod registry;
pub mod spec;
pub mod value;

pub use builder::SpecBuilder;
pub use criterion::{by_key, ordered_by_key, Criterion, KeyCriterion};
pub use error::{ComparatorError, Result, Side};
pub use hash::StableHash;
pub use host::{HostContext, DEFAULT_HOST};
pub use proxy::{ComparatorProxy, PROXY_VERSION};
pub use registry::SerialRegistry;
pub use spec::{FallbackHandler, FallbackMode, HashParams, NullPolicy, Spec, SpecKind};
pub use value::{same_instance, TypeToken, Value};
