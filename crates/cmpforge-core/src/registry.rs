//! Process-wide name registry used to resolve serialized proxies.
//!
//! A proxy names its target type and criteria; reading it back requires the
//! reading process to have registered the same names.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use tracing::{debug, warn};

use crate::criterion::Criterion;
use crate::error::{ComparatorError, Result};
use crate::value::TypeToken;

/// Name-keyed lookup for serializable criteria and target types.
#[derive(Default)]
pub struct SerialRegistry {
    criteria: RwLock<HashMap<String, Arc<dyn Criterion>>>,
    types: RwLock<HashMap<String, TypeToken>>,
}

static GLOBAL: OnceLock<SerialRegistry> = OnceLock::new();

impl SerialRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry consulted when comparators are deserialized.
    pub fn global() -> &'static SerialRegistry {
        GLOBAL.get_or_init(SerialRegistry::new)
    }

    /// Registers a criterion under its own name.
    pub fn register_criterion(&self, criterion: Arc<dyn Criterion>) -> Result<()> {
        if !criterion.is_serializable() {
            return Err(ComparatorError::InvalidArgument(format!(
                "criterion `{}` is not serializable",
                criterion.name()
            )));
        }
        let name = criterion.name().to_string();
        let mut criteria = self
            .criteria
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if criteria.insert(name.clone(), criterion).is_some() {
            warn!(criterion = %name, "Replaced registered criterion");
        } else {
            debug!(criterion = %name, "Registered criterion");
        }
        Ok(())
    }

    /// Registers a target type under its fully qualified name.
    pub fn register_type(&self, token: TypeToken) {
        let mut types = self
            .types
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if types.insert(token.name().to_string(), token).is_some() {
            debug!(target_type = token.name(), "Re-registered target type");
        }
    }

    pub fn criterion(&self, name: &str) -> Result<Arc<dyn Criterion>> {
        self.criteria
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(name)
            .cloned()
            .ok_or_else(|| ComparatorError::Unresolved {
                kind: "criterion",
                name: name.to_string(),
            })
    }

    pub fn type_token(&self, name: &str) -> Result<TypeToken> {
        self.types
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(name)
            .copied()
            .ok_or_else(|| ComparatorError::Unresolved {
                kind: "type",
                name: name.to_string(),
            })
    }
}
