//! Configuration system for cmpforge.
//!
//! Select and order the synthesis backends, force a wiring mode and pick a
//! serialization policy from TOML or YAML without code changes.
//!
//! # Examples
//!
//! ```
//! use cmpforge_config::{DefinerKind, SerializationMode, SynthesisConfig, WiringMode};
//!
//! let config = SynthesisConfig::from_toml_str(r#"
//!     definers = ["named"]
//!     instantiators = ["by_name", "initializer"]
//!     wiring = "external"
//!     serialization = "compatible_unprotected"
//! "#).unwrap();
//!
//! assert_eq!(config.definers, vec![DefinerKind::Named]);
//! assert_eq!(config.wiring, Some(WiringMode::External));
//! assert_eq!(config.serialization, SerializationMode::CompatibleUnprotected);
//! ```
//!
//! Use the default config when the file is missing:
//!
//! ```
//! use cmpforge_config::SynthesisConfig;
//!
//! let config = SynthesisConfig::load("cmpforge.toml").unwrap_or_default();
//! assert!(config.bridge_methods);
//! ```

use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Synthesis engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct SynthesisConfig {
    /// Materialization backends, in preference order.
    #[serde(default = "default_definers")]
    pub definers: Vec<DefinerKind>,

    /// Instantiation backends, in preference order.
    #[serde(default = "default_instantiators")]
    pub instantiators: Vec<InstantiatorKind>,

    /// Forces one wiring mode instead of the per-candidate preference.
    #[serde(default)]
    pub wiring: Option<WiringMode>,

    #[serde(default)]
    pub serialization: SerializationMode,

    /// Allows wiring through generated initializers calling shared code.
    #[serde(default = "default_true")]
    pub bridge_methods: bool,
}

fn default_definers() -> Vec<DefinerKind> {
    vec![DefinerKind::Anonymous, DefinerKind::Named]
}

fn default_instantiators() -> Vec<InstantiatorKind> {
    vec![
        InstantiatorKind::Bypass,
        InstantiatorKind::Initializer,
        InstantiatorKind::ByName,
    ]
}

fn default_true() -> bool {
    true
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            definers: default_definers(),
            instantiators: default_instantiators(),
            wiring: None,
            serialization: SerializationMode::default(),
            bridge_methods: true,
        }
    }
}

impl SynthesisConfig {
    /// Creates a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns error if file doesn't exist or contains invalid TOML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_toml_file(path)
    }

    /// Loads configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Loads configuration from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    /// Parses configuration from a YAML string.
    pub fn from_yaml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(s)?)
    }

    /// Replaces the definer preference list.
    pub fn with_definers(mut self, definers: impl IntoIterator<Item = DefinerKind>) -> Self {
        self.definers = definers.into_iter().collect();
        self
    }

    /// Replaces the instantiator preference list.
    pub fn with_instantiators(
        mut self,
        instantiators: impl IntoIterator<Item = InstantiatorKind>,
    ) -> Self {
        self.instantiators = instantiators.into_iter().collect();
        self
    }

    pub fn with_wiring(mut self, wiring: WiringMode) -> Self {
        self.wiring = Some(wiring);
        self
    }

    pub fn with_serialization(mut self, mode: SerializationMode) -> Self {
        self.serialization = mode;
        self
    }

    pub fn with_bridge_methods(mut self, enabled: bool) -> Self {
        self.bridge_methods = enabled;
        self
    }

    /// Rejects configurations that can never be satisfied.
    ///
    /// Empty backend lists are accepted; they surface as a failed build
    /// naming this configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_unique("definers", &self.definers)?;
        check_unique("instantiators", &self.instantiators)?;
        if self.wiring == Some(WiringMode::Bridge) && !self.bridge_methods {
            return Err(ConfigError::Invalid(
                "wiring = \"bridge\" requires bridge_methods = true".to_string(),
            ));
        }
        Ok(())
    }
}

fn check_unique<T: Copy + Eq + Hash + fmt::Display>(
    field: &str,
    items: &[T],
) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for item in items {
        if !seen.insert(*item) {
            return Err(ConfigError::Invalid(format!(
                "{field} lists `{item}` more than once"
            )));
        }
    }
    Ok(())
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for SynthesisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "definers=[{}] instantiators=[{}] wiring={} bridge_methods={}",
            join(&self.definers),
            join(&self.instantiators),
            self.wiring.map_or("auto", WiringMode::as_str),
            self.bridge_methods
        )
    }
}

/// Materialization backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DefinerKind {
    /// Unnamed code in a private module; slot values embedded as immediates.
    Anonymous,

    /// Exported symbols and a writable slot object, registered by name.
    Named,
}

impl DefinerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DefinerKind::Anonymous => "anonymous",
            DefinerKind::Named => "named",
        }
    }
}

impl fmt::Display for DefinerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Instantiation backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstantiatorKind {
    /// Wraps the artifact without running its initializer.
    Bypass,

    /// Runs the artifact's initializer.
    Initializer,

    /// Looks the artifact up by name, then runs its initializer.
    ByName,
}

impl InstantiatorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            InstantiatorKind::Bypass => "bypass",
            InstantiatorKind::Initializer => "initializer",
            InstantiatorKind::ByName => "by_name",
        }
    }
}

impl fmt::Display for InstantiatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How synthesized code reaches its runtime values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WiringMode {
    /// Values are compiled into the code as constants.
    Embedded,

    /// The generated initializer pulls values from a thread-confined handoff.
    Bridge,

    /// Values are written into the slot object after definition.
    External,
}

impl WiringMode {
    pub fn as_str(self) -> &'static str {
        match self {
            WiringMode::Embedded => "embedded",
            WiringMode::Bridge => "bridge",
            WiringMode::External => "external",
        }
    }
}

impl fmt::Display for WiringMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serialization policy for built comparators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SerializationMode {
    /// Fingerprinted proxy; readers require the fingerprint.
    #[default]
    Compatible,

    /// Proxy without fingerprint; readers check one if present.
    CompatibleUnprotected,

    /// Serialization is not supported.
    Incompatible,

    /// Serialization is refused in both directions.
    Hostile,
}

impl SerializationMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SerializationMode::Compatible => "compatible",
            SerializationMode::CompatibleUnprotected => "compatible_unprotected",
            SerializationMode::Incompatible => "incompatible",
            SerializationMode::Hostile => "hostile",
        }
    }

    /// Whether written proxies carry a fingerprint.
    pub fn protects(self) -> bool {
        self == SerializationMode::Compatible
    }
}

impl fmt::Display for SerializationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
