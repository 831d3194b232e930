//! Wiring: how slot values reach a synthesized artifact.

use cmpforge_config::{SynthesisConfig, WiringMode};
use cmpforge_core::{HostContext, Result};
use tracing::trace;

use crate::artifact::Artifact;
use crate::capability::SLOT_WRITER;
use crate::definer::{definition_error, Definer};
use crate::instantiator::Instantiator;

/// Preference order when the configuration does not force a mode.
pub(crate) const PREFERENCE: [WiringMode; 3] = [
    WiringMode::Embedded,
    WiringMode::External,
    WiringMode::Bridge,
];

/// Wiring modes usable with this definer and instantiator, best first.
pub(crate) fn modes(
    definer: &dyn Definer,
    instantiator: &dyn Instantiator,
    config: &SynthesisConfig,
) -> Vec<WiringMode> {
    let candidates: &[WiringMode] = match &config.wiring {
        Some(forced) => std::slice::from_ref(forced),
        None => &PREFERENCE,
    };
    candidates
        .iter()
        .copied()
        .filter(|mode| definer.supports(*mode))
        .filter(|mode| match mode {
            WiringMode::Bridge => config.bridge_methods && instantiator.runs_initializer(),
            _ => true,
        })
        .collect()
}

/// Writes the slot words of an externally wired artifact.
pub(crate) fn write_external(artifact: &Artifact, host: &HostContext) -> Result<()> {
    if !host.permits_external_writes() {
        return Err(definition_error(
            artifact.name(),
            format!("host `{host}` does not permit writing artifact slots"),
        ));
    }
    let writer = SLOT_WRITER
        .require()
        .map_err(|e| definition_error(artifact.name(), e))?;
    let Some((base, len)) = artifact.slots() else {
        return Err(definition_error(artifact.name(), "artifact has no slot object"));
    };
    let words = artifact.values().words();
    if words.len() != len {
        return Err(definition_error(
            artifact.name(),
            format!("slot object holds {len} words, {} needed", words.len()),
        ));
    }
    for (k, word) in words.iter().enumerate() {
        // SAFETY: `base` is the artifact's writable slot object of `len`
        // words, and the artifact has not been shared yet.
        unsafe { writer.write(base.add(k), *word) };
    }
    trace!(artifact = %artifact.name(), writer = writer.name(), len, "Wrote external slots");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definer::definer;
    use crate::instantiator::instantiator;
    use cmpforge_config::{DefinerKind, InstantiatorKind};

    fn modes_for(
        definer_kind: DefinerKind,
        instantiator_kind: InstantiatorKind,
        config: &SynthesisConfig,
    ) -> Vec<WiringMode> {
        modes(definer(definer_kind), instantiator(instantiator_kind), config)
    }

    #[test]
    fn test_anonymous_only_embeds() {
        let config = SynthesisConfig::default();
        for kind in [
            InstantiatorKind::Bypass,
            InstantiatorKind::Initializer,
            InstantiatorKind::ByName,
        ] {
            assert_eq!(
                modes_for(DefinerKind::Anonymous, kind, &config),
                vec![WiringMode::Embedded]
            );
        }
    }

    #[test]
    fn test_named_prefers_external_then_bridge() {
        let config = SynthesisConfig::default();
        let modes = modes_for(DefinerKind::Named, InstantiatorKind::Initializer, &config);
        if SLOT_WRITER.is_available() {
            assert_eq!(modes, vec![WiringMode::External, WiringMode::Bridge]);
        } else {
            assert_eq!(modes, vec![WiringMode::Bridge]);
        }
    }

    #[test]
    fn test_bridge_needs_initializer_and_bridge_methods() {
        let config = SynthesisConfig::default().with_wiring(WiringMode::Bridge);
        assert!(modes_for(DefinerKind::Named, InstantiatorKind::Bypass, &config).is_empty());
        assert_eq!(
            modes_for(DefinerKind::Named, InstantiatorKind::ByName, &config),
            vec![WiringMode::Bridge]
        );

        let without = SynthesisConfig::default().with_bridge_methods(false);
        assert!(!modes_for(DefinerKind::Named, InstantiatorKind::Initializer, &without)
            .contains(&WiringMode::Bridge));
    }

    #[test]
    fn test_forced_mode_is_the_only_candidate() {
        let config = SynthesisConfig::default().with_wiring(WiringMode::Embedded);
        assert!(modes_for(DefinerKind::Named, InstantiatorKind::Initializer, &config).is_empty());
        assert_eq!(
            modes_for(DefinerKind::Anonymous, InstantiatorKind::Bypass, &config),
            vec![WiringMode::Embedded]
        );
    }
}
