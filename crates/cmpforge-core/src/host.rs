//! Host visibility context.
//!
//! A `HostContext` names the scope a comparator is synthesized for and
//! carries the privileges the synthesized code may use. Artifact names are
//! derived from the host name; definers refuse to load native code for a
//! host without the `native_code` privilege, and external wiring refuses to
//! patch slots without `external_writes`.

use std::fmt;

/// Default host name used when neither the spec nor the engine supplies one.
pub const DEFAULT_HOST: &str = "cmpforge";

/// Named privilege scope for synthesized code.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostContext {
    name: String,
    native_code: bool,
    external_writes: bool,
}

impl HostContext {
    /// Creates a host with every privilege granted.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            native_code: true,
            external_writes: true,
        }
    }

    /// Revokes the right to load native code.
    pub fn deny_native_code(mut self) -> Self {
        self.native_code = false;
        self
    }

    /// Revokes the right to write slots after definition.
    pub fn deny_external_writes(mut self) -> Self {
        self.external_writes = false;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn permits_native_code(&self) -> bool {
        self.native_code
    }

    pub fn permits_external_writes(&self) -> bool {
        self.external_writes
    }
}

impl Default for HostContext {
    fn default() -> Self {
        Self::new(DEFAULT_HOST)
    }
}

impl fmt::Display for HostContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
