use std::sync::Arc;

use cmpforge_config::DefinerKind;
use cmpforge_core::Result;
use tracing::debug;

use super::unit::{self, DefinitionRequest, DefinitionUnit, Naming};
use super::Definer;
use crate::artifact::Artifact;
use crate::codegen::CodeBuffer;

/// Defines artifacts without exported symbols.
///
/// Nothing outside the artifact can find its slot object, so the only
/// supported wiring is embedding the slot values as constants.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct AnonymousDefiner;

impl Definer for AnonymousDefiner {
    fn kind(&self) -> DefinerKind {
        DefinerKind::Anonymous
    }

    fn supports_embedding(&self) -> bool {
        true
    }

    fn supports_external_init(&self) -> bool {
        false
    }

    fn supports_bridge(&self) -> bool {
        false
    }

    fn produces_named(&self) -> bool {
        false
    }

    fn open(&self, request: DefinitionRequest) -> Result<DefinitionUnit> {
        unit::open(request, Naming::Anonymous)
    }

    fn define(&self, unit: DefinitionUnit, code: CodeBuffer) -> Result<Arc<Artifact>> {
        let artifact = unit::finish(unit, code, self.kind())?;
        debug!(artifact = %artifact.name(), "Defined anonymous artifact");
        Ok(Arc::new(artifact))
    }
}
