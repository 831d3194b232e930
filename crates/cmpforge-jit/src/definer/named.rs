use std::sync::Arc;

use cmpforge_config::DefinerKind;
use cmpforge_core::Result;
use tracing::debug;

use super::unit::{self, DefinitionRequest, DefinitionUnit, Naming};
use super::Definer;
use crate::artifact::{Artifact, ArtifactRegistry};
use crate::capability::SLOT_WRITER;
use crate::codegen::CodeBuffer;

/// Defines artifacts with exported symbols and registers them by name.
///
/// Named artifacts keep their slots in an exported data object, which is
/// filled either by the artifact's initializer over the bridge or from Rust
/// through the slot writer.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct NamedDefiner;

impl Definer for NamedDefiner {
    fn kind(&self) -> DefinerKind {
        DefinerKind::Named
    }

    fn supports_embedding(&self) -> bool {
        false
    }

    fn supports_external_init(&self) -> bool {
        SLOT_WRITER.is_available()
    }

    fn supports_bridge(&self) -> bool {
        true
    }

    fn produces_named(&self) -> bool {
        true
    }

    fn open(&self, request: DefinitionRequest) -> Result<DefinitionUnit> {
        unit::open(request, Naming::Exported)
    }

    fn define(&self, unit: DefinitionUnit, code: CodeBuffer) -> Result<Arc<Artifact>> {
        let artifact = Arc::new(unit::finish(unit, code, self.kind())?);
        ArtifactRegistry::global().register(Arc::clone(&artifact));
        debug!(artifact = %artifact.name(), "Defined named artifact");
        Ok(artifact)
    }
}
