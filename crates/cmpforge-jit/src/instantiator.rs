//! Instantiation backends: how a defined artifact becomes a usable instance.

use std::sync::Arc;

use cmpforge_config::InstantiatorKind;
use cmpforge_core::{ComparatorError, Result};
use tracing::trace;

use crate::artifact::{Artifact, ArtifactRegistry};

pub(crate) trait Instantiator: Send + Sync {
    fn kind(&self) -> InstantiatorKind;

    /// Only works on artifacts that were registered by name.
    fn requires_named(&self) -> bool {
        false
    }

    /// Whether the artifact's initializer runs as part of instantiation.
    fn runs_initializer(&self) -> bool;

    fn instantiate(&self, artifact: Arc<Artifact>) -> Result<Arc<Artifact>>;
}

fn initialize(artifact: Arc<Artifact>) -> Result<Arc<Artifact>> {
    let status = artifact.run_init();
    if status != 1 {
        return Err(ComparatorError::Instantiation {
            artifact: artifact.name().to_string(),
            reason: format!("initializer returned {status}"),
        });
    }
    trace!(artifact = %artifact.name(), "Initializer completed");
    Ok(artifact)
}

/// Uses the artifact as defined, skipping its initializer.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct BypassInstantiator;

impl Instantiator for BypassInstantiator {
    fn kind(&self) -> InstantiatorKind {
        InstantiatorKind::Bypass
    }

    fn runs_initializer(&self) -> bool {
        false
    }

    fn instantiate(&self, artifact: Arc<Artifact>) -> Result<Arc<Artifact>> {
        Ok(artifact)
    }
}

/// Runs the artifact's initializer on the definition in hand.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct InitializerInstantiator;

impl Instantiator for InitializerInstantiator {
    fn kind(&self) -> InstantiatorKind {
        InstantiatorKind::Initializer
    }

    fn runs_initializer(&self) -> bool {
        true
    }

    fn instantiate(&self, artifact: Arc<Artifact>) -> Result<Arc<Artifact>> {
        initialize(artifact)
    }
}

/// Resolves the artifact through the registry by name, then initializes it.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ByNameInstantiator;

impl Instantiator for ByNameInstantiator {
    fn kind(&self) -> InstantiatorKind {
        InstantiatorKind::ByName
    }

    fn requires_named(&self) -> bool {
        true
    }

    fn runs_initializer(&self) -> bool {
        true
    }

    fn instantiate(&self, artifact: Arc<Artifact>) -> Result<Arc<Artifact>> {
        let name = artifact.name().to_string();
        let resolved = ArtifactRegistry::global().lookup(&name).ok_or_else(|| {
            ComparatorError::Instantiation {
                artifact: name.clone(),
                reason: "no artifact registered under this name".to_string(),
            }
        })?;
        initialize(resolved)
    }
}

static BYPASS: BypassInstantiator = BypassInstantiator;
static INITIALIZER: InitializerInstantiator = InitializerInstantiator;
static BY_NAME: ByNameInstantiator = ByNameInstantiator;

pub(crate) fn instantiator(kind: InstantiatorKind) -> &'static dyn Instantiator {
    match kind {
        InstantiatorKind::Bypass => &BYPASS,
        InstantiatorKind::Initializer => &INITIALIZER,
        InstantiatorKind::ByName => &BY_NAME,
    }
}
