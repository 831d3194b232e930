//! The synthesis engine.
//!
//! Building a comparator is a fallback walk at two levels. The outer walk
//! picks how the comparator comes to exist: a fallback form for specs
//! without criteria, the interpreted form for specs with more criteria than
//! the synthesizer unrolls, or synthesis. Synthesis is itself a walk over
//! every valid (definer, instantiator, wiring) candidate in configuration
//! order.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use cmpforge_config::{
    DefinerKind, InstantiatorKind, SerializationMode, SynthesisConfig, WiringMode,
};
use cmpforge_core::{
    ComparatorError, ComparatorProxy, FallbackHandler, HostContext, Result, SerialRegistry, Spec,
    SpecBuilder,
};
use tracing::{debug, info};

use crate::artifact::ArtifactName;
use crate::bridge;
use crate::codegen;
use crate::comparator::{Comparator, ComparatorBody};
use crate::definer::{definer, DefinitionRequest};
use crate::fallback::Fallback;
use crate::instantiator::instantiator;
use crate::interpreted::{IdentityComparator, InterpretedComparator, NaturalComparator};
use crate::synthesized::SynthesizedComparator;
use crate::wiring;

/// Specs with more criteria than this use the interpreted form.
pub const MAX_SYNTHESIZED_CRITERIA: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Genesis {
    Fallback,
    Interpreted,
    Synthesized,
}

impl Genesis {
    const ALL: [Genesis; 3] = [Genesis::Fallback, Genesis::Interpreted, Genesis::Synthesized];
}

impl fmt::Display for Genesis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Genesis::Fallback => f.write_str("fallback"),
            Genesis::Interpreted => f.write_str("interpreted"),
            Genesis::Synthesized => f.write_str("synthesized"),
        }
    }
}

/// One backend combination to try.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Candidate {
    pub(crate) definer: DefinerKind,
    pub(crate) instantiator: InstantiatorKind,
    pub(crate) wiring: WiringMode,
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.definer, self.instantiator, self.wiring)
    }
}

struct FallbackBody<'a>(&'a Arc<Spec>);

impl FallbackHandler for FallbackBody<'_> {
    type Output = Result<Arc<dyn ComparatorBody>>;

    fn on_identity(self) -> Self::Output {
        Ok(Arc::new(IdentityComparator::new(Arc::clone(self.0))))
    }

    fn on_natural(self) -> Self::Output {
        Ok(Arc::new(NaturalComparator::new(Arc::clone(self.0))?))
    }
}

/// Builds comparators from specs.
///
/// # Example
///
/// ```no_run
/// use cmpforge_config::{DefinerKind, SynthesisConfig};
/// use cmpforge_core::{by_key, Spec};
/// use cmpforge_jit::Engine;
///
/// struct User { id: u64 }
///
/// let engine = Engine::new(
///     SynthesisConfig::default().with_definers([DefinerKind::Named]),
/// ).unwrap();
/// let spec = Spec::equivalence::<User>()
///     .with(by_key("id", |u: &User| u.id).shared())
///     .build()
///     .unwrap();
/// let cmp = engine.build(spec).unwrap();
/// assert!(cmp.form().is_synthesized());
/// ```
#[derive(Debug)]
pub struct Engine {
    config: SynthesisConfig,
    host: HostContext,
    interrupt: Arc<AtomicBool>,
}

static SHARED: OnceLock<Engine> = OnceLock::new();

impl Default for Engine {
    fn default() -> Self {
        Self {
            config: SynthesisConfig::default(),
            host: HostContext::default(),
            interrupt: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl Engine {
    /// Creates an engine after validating `config`.
    pub fn new(config: SynthesisConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| ComparatorError::InvalidArgument(e.to_string()))?;
        Ok(Self {
            config,
            ..Self::default()
        })
    }

    /// Process-wide engine with the default configuration. Used by
    /// [`SpecBuilderExt`] and by `Comparator` deserialization.
    pub fn shared() -> &'static Engine {
        SHARED.get_or_init(Engine::default)
    }

    /// Host used for specs that do not name their own.
    pub fn with_host(mut self, host: HostContext) -> Self {
        self.host = host;
        self
    }

    pub fn config(&self) -> &SynthesisConfig {
        &self.config
    }

    pub fn host(&self) -> &HostContext {
        &self.host
    }

    /// Setting the returned flag aborts builds at the next candidate.
    ///
    /// The flag stays set, and every later build fails with `Interrupted`,
    /// until [`Engine::reset_interrupt`] clears it.
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupt)
    }

    /// Clears a previous interrupt so the engine builds again.
    pub fn reset_interrupt(&self) {
        self.interrupt.store(false, Ordering::Release);
    }

    pub fn build(&self, spec: Spec) -> Result<Comparator> {
        let spec = Arc::new(spec);
        let body = Fallback::new(format!("comparator {spec}"))
            .with_interrupt(&self.interrupt)
            .apply(Genesis::ALL, |genesis| self.genesis(genesis, &spec))?;
        Ok(Comparator::new(body, self.config.serialization))
    }

    /// Rebuilds a comparator from its serialization record.
    pub fn rebuild(&self, proxy: ComparatorProxy) -> Result<Comparator> {
        match self.config.serialization {
            SerializationMode::Hostile => Err(ComparatorError::SerializationBlocked(format!(
                "refusing to read a comparator for `{}`",
                proxy.target
            ))),
            SerializationMode::Incompatible => Err(ComparatorError::SerializationDisabled(
                format!("cannot read a comparator for `{}`", proxy.target),
            )),
            mode => {
                proxy.verify(mode.protects())?;
                let spec = proxy.to_spec(SerialRegistry::global())?;
                self.build(spec)
            }
        }
    }

    fn genesis(
        &self,
        genesis: Genesis,
        spec: &Arc<Spec>,
    ) -> Result<Option<Arc<dyn ComparatorBody>>> {
        let count = spec.criteria().len();
        match genesis {
            Genesis::Fallback => match spec.fallback() {
                Some(mode) if count == 0 => mode.resolve(FallbackBody(spec)).map(Some),
                _ => Ok(None),
            },
            Genesis::Interpreted if count > MAX_SYNTHESIZED_CRITERIA => {
                debug!(
                    spec = %spec,
                    criteria = count,
                    max = MAX_SYNTHESIZED_CRITERIA,
                    "Too many criteria to synthesize, interpreting"
                );
                Ok(Some(Arc::new(InterpretedComparator::new(Arc::clone(spec)))))
            }
            Genesis::Synthesized if (1..=MAX_SYNTHESIZED_CRITERIA).contains(&count) => {
                self.synthesize(spec).map(Some)
            }
            _ => Ok(None),
        }
    }

    /// Valid backend combinations, in configuration order.
    pub(crate) fn candidates(&self) -> Vec<Candidate> {
        let mut candidates = Vec::new();
        for &definer_kind in &self.config.definers {
            let definer = definer(definer_kind);
            if !definer.is_available() {
                debug!(definer = %definer_kind, "Definer unavailable on this host, pruned");
                continue;
            }
            for &instantiator_kind in &self.config.instantiators {
                let instantiator = instantiator(instantiator_kind);
                if instantiator.requires_named() && !definer.produces_named() {
                    continue;
                }
                candidates.extend(
                    wiring::modes(definer, instantiator, &self.config)
                        .into_iter()
                        .map(|wiring| Candidate {
                            definer: definer_kind,
                            instantiator: instantiator_kind,
                            wiring,
                        }),
                );
            }
        }
        candidates
    }

    fn synthesize(&self, spec: &Arc<Spec>) -> Result<Arc<dyn ComparatorBody>> {
        let host = spec.host().unwrap_or(&self.host);
        Fallback::new(format!("synthesis of {spec} with {}", self.config))
            .with_interrupt(&self.interrupt)
            .apply(self.candidates(), |candidate| {
                self.attempt(candidate, spec, host).map(Some)
            })
    }

    fn attempt(
        &self,
        candidate: Candidate,
        spec: &Arc<Spec>,
        host: &HostContext,
    ) -> Result<Arc<dyn ComparatorBody>> {
        let definer = definer(candidate.definer);
        let instantiator = instantiator(candidate.instantiator);
        let name = ArtifactName::next(host.name(), spec);
        let serial = name.serial();

        let mut unit = definer.open(DefinitionRequest {
            name,
            spec: Arc::clone(spec),
            wiring: candidate.wiring,
            host: host.clone(),
        })?;
        let registration = match candidate.wiring {
            WiringMode::Bridge => Some(bridge::register(serial, unit.values.words())?),
            _ => None,
        };
        let code = codegen::emit(&mut unit)?;
        let artifact = definer.define(unit, code)?;
        let artifact = instantiator.instantiate(artifact)?;
        drop(registration);

        if candidate.wiring == WiringMode::External {
            wiring::write_external(&artifact, host)?;
        }

        info!(
            event = "artifact_synthesized",
            artifact = %artifact.name(),
            definer = %candidate.definer,
            instantiator = %candidate.instantiator,
            wiring = %candidate.wiring,
            criteria = spec.criteria().len(),
            "Synthesized comparator"
        );
        Ok(Arc::new(SynthesizedComparator::new(
            artifact,
            Arc::clone(spec),
            instantiator.kind(),
        )))
    }
}

/// Builds comparators straight from a [`SpecBuilder`] with the shared engine.
pub trait SpecBuilderExt {
    fn comparator(self) -> Result<Comparator>;
}

impl SpecBuilderExt for SpecBuilder {
    fn comparator(self) -> Result<Comparator> {
        Engine::shared().build(self.build()?)
    }
}
