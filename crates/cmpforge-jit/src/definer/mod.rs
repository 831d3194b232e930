//! Artifact definition backends.
//!
//! A definer turns an [`ArtifactName`](crate::artifact::ArtifactName) and a
//! spec into loaded code in two phases: [`Definer::open`] declares the
//! module contents and [`Definer::define`] takes the emitted bodies and
//! finalizes them. The two backends differ in how code is named, which in
//! turn decides which wiring modes they can serve.

mod anonymous;
mod named;
mod unit;

use std::sync::Arc;

use cmpforge_config::{DefinerKind, WiringMode};
use cmpforge_core::Result;

use crate::artifact::Artifact;
use crate::capability::{EXECUTABLE_MEMORY, TARGET_ISA};
use crate::codegen::CodeBuffer;

pub(crate) use anonymous::AnonymousDefiner;
pub(crate) use named::NamedDefiner;
pub(crate) use unit::{definition_error, DefinitionRequest, DefinitionUnit, SlotStorage};

pub(crate) trait Definer: Send + Sync {
    fn kind(&self) -> DefinerKind;

    /// Whether the host can run this backend at all.
    fn is_available(&self) -> bool {
        TARGET_ISA.is_available() && EXECUTABLE_MEMORY.is_available()
    }

    /// Slot values compiled in as constants.
    fn supports_embedding(&self) -> bool;

    /// Slot object written from Rust after definition.
    fn supports_external_init(&self) -> bool;

    /// Slot object filled by the artifact's own initializer.
    fn supports_bridge(&self) -> bool;

    /// Whether artifacts get process-visible names.
    fn produces_named(&self) -> bool;

    fn supports(&self, wiring: WiringMode) -> bool {
        match wiring {
            WiringMode::Embedded => self.supports_embedding(),
            WiringMode::External => self.supports_external_init(),
            WiringMode::Bridge => self.supports_bridge(),
        }
    }

    fn open(&self, request: DefinitionRequest) -> Result<DefinitionUnit>;

    fn define(&self, unit: DefinitionUnit, code: CodeBuffer) -> Result<Arc<Artifact>>;
}

static ANONYMOUS: AnonymousDefiner = AnonymousDefiner;
static NAMED: NamedDefiner = NamedDefiner;

pub(crate) fn definer(kind: DefinerKind) -> &'static dyn Definer {
    match kind {
        DefinerKind::Anonymous => &ANONYMOUS,
        DefinerKind::Named => &NAMED,
    }
}

#[cfg(test)]
mod tests;
