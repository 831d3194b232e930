//! Generated artifacts: names, slot values, compiled methods, ownership.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, RwLock};

use cmpforge_config::{DefinerKind, WiringMode};
use cmpforge_core::{Criterion, Spec, TypeToken};
use cranelift_jit::JITModule;
use tracing::debug;

static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

/// Process-unique artifact name: `{host}.{prefix}${type}${serial}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct ArtifactName {
    host: String,
    prefix: &'static str,
    target: &'static str,
    serial: u64,
}

impl ArtifactName {
    /// Allocates the next serial for an artifact of `spec`.
    pub(crate) fn next(host: &str, spec: &Spec) -> Self {
        Self {
            host: host.to_string(),
            prefix: spec.kind().prefix(),
            target: spec.target().short_name(),
            serial: NEXT_SERIAL.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub(crate) fn serial(&self) -> u64 {
        self.serial
    }
}

impl fmt::Display for ArtifactName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}${}${}",
            self.host, self.prefix, self.target, self.serial
        )
    }
}

/// Runtime values the synthesized code reaches through its slots.
///
/// Slot layout: word 0 is the type token, words `1..=n` the criteria in
/// spec order, word `n + 1` the spec when it is serializable. Each word is
/// the address of a value owned here, so the owner must outlive the code.
pub(crate) struct SlotValues {
    token: Box<TypeToken>,
    criteria: Box<[Arc<dyn Criterion>]>,
    spec: Option<Arc<Spec>>,
}

impl SlotValues {
    pub(crate) fn capture(spec: &Arc<Spec>) -> Self {
        Self {
            token: Box::new(*spec.target()),
            criteria: spec.criteria().to_vec().into_boxed_slice(),
            spec: spec.is_serializable().then(|| Arc::clone(spec)),
        }
    }

    pub(crate) const TOKEN_SLOT: usize = 0;

    pub(crate) fn criterion_slot(index: usize) -> usize {
        1 + index
    }

    /// Slot of the spec, if present.
    pub(crate) fn spec_slot(&self) -> Option<usize> {
        self.spec.as_ref().map(|_| 1 + self.criteria.len())
    }

    pub(crate) fn len(&self) -> usize {
        1 + self.criteria.len() + usize::from(self.spec.is_some())
    }

    pub(crate) fn words(&self) -> Box<[usize]> {
        let mut words = Vec::with_capacity(self.len());
        words.push(&*self.token as *const TypeToken as usize);
        words.extend(
            self.criteria
                .iter()
                .map(|c| c as *const Arc<dyn Criterion> as usize),
        );
        if let Some(spec) = &self.spec {
            words.push(Arc::as_ptr(spec) as usize);
        }
        words.into_boxed_slice()
    }
}

/// One synthesized method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Method {
    Hash,
    Equals,
    Compare,
    WriteReplace,
    Init,
}

impl Method {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Method::Hash => "hash",
            Method::Equals => "equals",
            Method::Compare => "compare",
            Method::WriteReplace => "write_replace",
            Method::Init => "init",
        }
    }

    /// Methods an artifact for `spec` carries, in declaration order.
    pub(crate) fn for_spec(spec: &Spec) -> Vec<Method> {
        let mut methods = vec![Method::Hash, Method::Equals];
        if spec.is_ordering() {
            methods.push(Method::Compare);
        }
        if spec.is_serializable() {
            methods.push(Method::WriteReplace);
        }
        methods.push(Method::Init);
        methods
    }

    /// Whether the method takes the frame pointer.
    pub(crate) fn takes_frame(self) -> bool {
        self != Method::Init
    }
}

/// Finalized entry points.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Methods {
    pub(crate) hash: *const u8,
    pub(crate) equals: *const u8,
    pub(crate) compare: Option<*const u8>,
    pub(crate) write_replace: Option<*const u8>,
    pub(crate) init: *const u8,
}

/// A defined, loaded artifact.
pub(crate) struct Artifact {
    name: ArtifactName,
    definer: DefinerKind,
    wiring: WiringMode,
    methods: Methods,
    slots: Option<(*mut usize, usize)>,
    values: SlotValues,
    module: Option<JITModule>,
}

// SAFETY: the module owns the code and data memory behind every pointer
// held here; compiled code is immutable and slots are written only before
// the artifact is shared.
unsafe impl Send for Artifact {}
unsafe impl Sync for Artifact {}

impl Artifact {
    pub(crate) fn new(
        name: ArtifactName,
        definer: DefinerKind,
        wiring: WiringMode,
        methods: Methods,
        slots: Option<(*mut usize, usize)>,
        values: SlotValues,
        module: JITModule,
    ) -> Self {
        Self {
            name,
            definer,
            wiring,
            methods,
            slots,
            values,
            module: Some(module),
        }
    }

    pub(crate) fn name(&self) -> &ArtifactName {
        &self.name
    }

    pub(crate) fn definer(&self) -> DefinerKind {
        self.definer
    }

    pub(crate) fn wiring(&self) -> WiringMode {
        self.wiring
    }

    pub(crate) fn methods(&self) -> &Methods {
        &self.methods
    }

    pub(crate) fn values(&self) -> &SlotValues {
        &self.values
    }

    /// Writable slot object: base address and word count.
    pub(crate) fn slots(&self) -> Option<(*mut usize, usize)> {
        self.slots
    }

    /// Runs the generated initializer.
    pub(crate) fn run_init(&self) -> i64 {
        // SAFETY: `init` was compiled with the signature `() -> i64` and the
        // module that owns it lives as long as `self`.
        let init: extern "C" fn() -> i64 = unsafe { std::mem::transmute(self.methods.init) };
        init()
    }
}

impl Drop for Artifact {
    fn drop(&mut self) {
        if let Some(module) = self.module.take() {
            debug!(artifact = %self.name, "Releasing artifact code");
            // SAFETY: the last reference to this artifact is gone, so no
            // comparator can call into its code anymore.
            unsafe { module.free_memory() };
        }
    }
}

impl fmt::Debug for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Artifact")
            .field("name", &self.name.to_string())
            .field("definer", &self.definer)
            .field("wiring", &self.wiring)
            .finish()
    }
}

/// Named artifacts, owned until process exit.
#[derive(Default)]
pub(crate) struct ArtifactRegistry {
    artifacts: RwLock<HashMap<String, Arc<Artifact>>>,
}

static REGISTRY: OnceLock<ArtifactRegistry> = OnceLock::new();

impl ArtifactRegistry {
    pub(crate) fn global() -> &'static ArtifactRegistry {
        REGISTRY.get_or_init(ArtifactRegistry::default)
    }

    pub(crate) fn register(&self, artifact: Arc<Artifact>) {
        let name = artifact.name().to_string();
        self.artifacts
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(name, artifact);
    }

    pub(crate) fn lookup(&self, name: &str) -> Option<Arc<Artifact>> {
        self.artifacts
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(name)
            .cloned()
    }
}
