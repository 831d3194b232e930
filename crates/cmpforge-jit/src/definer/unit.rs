//! Definition units shared by both definers.
//!
//! `open` builds a fresh JIT module with the helper symbols registered,
//! declares helpers, methods and slot storage; `finish` defines the emitted
//! bodies, finalizes the module and packages the artifact.

use std::fmt;
use std::sync::Arc;

use cmpforge_config::{DefinerKind, WiringMode};
use cmpforge_core::{ComparatorError, HostContext, Result, Spec};
use cranelift_codegen::ir::types::I64;
use cranelift_codegen::ir::AbiParam;
use cranelift_jit::JITModule;
use cranelift_module::{DataDescription, DataId, FuncId, Linkage, Module};

use crate::abi::Helper;
use crate::artifact::{Artifact, ArtifactName, Method, Methods, SlotValues};
use crate::capability::{self, EXECUTABLE_MEMORY};
use crate::codegen::CodeBuffer;

/// Everything a definer needs to declare one artifact.
pub(crate) struct DefinitionRequest {
    pub(crate) name: ArtifactName,
    pub(crate) spec: Arc<Spec>,
    pub(crate) wiring: WiringMode,
    pub(crate) host: HostContext,
}

/// Where synthesized code finds its slot words.
pub(crate) enum SlotStorage {
    /// Compiled in as constants.
    Embedded(Box<[usize]>),
    /// Loaded from a writable data object of `len` words.
    Data { id: DataId, len: usize },
}

/// A module with everything declared and nothing defined yet.
pub(crate) struct DefinitionUnit {
    pub(crate) name: ArtifactName,
    pub(crate) spec: Arc<Spec>,
    pub(crate) values: SlotValues,
    pub(crate) wiring: WiringMode,
    pub(crate) module: JITModule,
    /// Indexed by `Helper as usize`.
    pub(crate) helpers: Vec<FuncId>,
    pub(crate) methods: Vec<(Method, FuncId)>,
    pub(crate) slots: SlotStorage,
}

/// Symbol naming for declared functions and data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Naming {
    Anonymous,
    Exported,
}

pub(crate) fn definition_error(name: &ArtifactName, reason: impl fmt::Display) -> ComparatorError {
    ComparatorError::ArtifactDefinition {
        artifact: name.to_string(),
        reason: reason.to_string(),
    }
}

pub(crate) fn open(request: DefinitionRequest, naming: Naming) -> Result<DefinitionUnit> {
    let DefinitionRequest {
        name,
        spec,
        wiring,
        host,
    } = request;
    if !host.permits_native_code() {
        return Err(definition_error(
            &name,
            format!("host `{host}` does not permit loading native code"),
        ));
    }
    EXECUTABLE_MEMORY
        .require()
        .map_err(|e| definition_error(&name, e))?;
    let mut module =
        capability::new_module(&Helper::symbols()).map_err(|e| definition_error(&name, e))?;

    let mut helpers = Vec::with_capacity(Helper::ALL.len());
    for helper in Helper::ALL {
        let mut sig = module.make_signature();
        sig.params
            .extend(std::iter::repeat(AbiParam::new(I64)).take(helper.arity()));
        sig.returns.push(AbiParam::new(I64));
        let id = module
            .declare_function(helper.symbol(), Linkage::Import, &sig)
            .map_err(|e| definition_error(&name, e))?;
        helpers.push(id);
    }

    let mut methods = Vec::new();
    for method in Method::for_spec(&spec) {
        let mut sig = module.make_signature();
        if method.takes_frame() {
            sig.params.push(AbiParam::new(I64));
        }
        sig.returns.push(AbiParam::new(I64));
        let id = match naming {
            Naming::Anonymous => module.declare_anonymous_function(&sig),
            Naming::Exported => module.declare_function(
                &format!("{name}::{}", method.as_str()),
                Linkage::Export,
                &sig,
            ),
        }
        .map_err(|e| definition_error(&name, e))?;
        methods.push((method, id));
    }

    let values = SlotValues::capture(&spec);
    let slots = if wiring == WiringMode::Embedded {
        SlotStorage::Embedded(values.words())
    } else {
        let id = match naming {
            Naming::Anonymous => module.declare_anonymous_data(true, false),
            Naming::Exported => {
                module.declare_data(&format!("{name}::slots"), Linkage::Export, true, false)
            }
        }
        .map_err(|e| definition_error(&name, e))?;
        let len = values.len();
        let mut desc = DataDescription::new();
        desc.define_zeroinit(len * std::mem::size_of::<usize>());
        desc.set_align(std::mem::align_of::<usize>() as u64);
        module
            .define_data(id, &desc)
            .map_err(|e| definition_error(&name, e))?;
        SlotStorage::Data { id, len }
    };

    Ok(DefinitionUnit {
        name,
        spec,
        values,
        wiring,
        module,
        helpers,
        methods,
        slots,
    })
}

pub(crate) fn finish(
    unit: DefinitionUnit,
    code: CodeBuffer,
    definer: DefinerKind,
) -> Result<Artifact> {
    let DefinitionUnit {
        name,
        values,
        wiring,
        mut module,
        methods,
        slots,
        ..
    } = unit;

    for body in code.bodies {
        let Some(&(_, id)) = methods.iter().find(|(method, _)| *method == body.method) else {
            return Err(definition_error(
                &name,
                format!("no declaration for method `{}`", body.method.as_str()),
            ));
        };
        let mut ctx = module.make_context();
        ctx.func = body.func;
        module
            .define_function(id, &mut ctx)
            .map_err(|e| definition_error(&name, format!("{}: {e:?}", body.method.as_str())))?;
        module.clear_context(&mut ctx);
    }
    module
        .finalize_definitions()
        .map_err(|e| definition_error(&name, e))?;

    let lookup = |wanted: Method| {
        methods
            .iter()
            .find(|(method, _)| *method == wanted)
            .map(|(_, id)| module.get_finalized_function(*id))
    };
    let missing = |method: Method| definition_error(&name, format!("`{}` was not declared", method.as_str()));
    let entry_points = Methods {
        hash: lookup(Method::Hash).ok_or_else(|| missing(Method::Hash))?,
        equals: lookup(Method::Equals).ok_or_else(|| missing(Method::Equals))?,
        compare: lookup(Method::Compare),
        write_replace: lookup(Method::WriteReplace),
        init: lookup(Method::Init).ok_or_else(|| missing(Method::Init))?,
    };
    let slot_object = match slots {
        SlotStorage::Embedded(_) => None,
        SlotStorage::Data { id, len } => {
            let (address, _) = module.get_finalized_data(id);
            Some((address as *mut usize, len))
        }
    };

    Ok(Artifact::new(
        name,
        definer,
        wiring,
        entry_points,
        slot_object,
        values,
        module,
    ))
}
