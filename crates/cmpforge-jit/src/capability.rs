//! Privileged capability broker.
//!
//! Each capability is probed lazily, once per process. Probes are tried in
//! declaration order through [`Fallback`]; the first success is cached and
//! so is total failure, as a reason string that is never retried. An
//! unavailable capability only prunes the backends that depend on it.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;

use cmpforge_core::{ComparatorError, Result};
use cranelift_codegen::ir::types::I64;
use cranelift_codegen::ir::{AbiParam, InstBuilder, MemFlags};
use cranelift_codegen::isa::{self, OwnedTargetIsa};
use cranelift_codegen::settings::{self, Configurable};
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext};
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{DataDescription, Module};
use tracing::debug;

use crate::fallback::Fallback;

/// Where a probe finds its facility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilityDescriptor {
    pub facility: &'static str,
    pub operation: &'static str,
    pub signature: &'static str,
}

impl fmt::Display for CapabilityDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}{}", self.facility, self.operation, self.signature)
    }
}

/// One way of obtaining a capability.
pub struct Probe<T> {
    pub descriptor: CapabilityDescriptor,
    pub resolve: fn() -> Result<T>,
}

impl<T> fmt::Display for Probe<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.descriptor.fmt(f)
    }
}

struct Resolved<T: 'static> {
    value: T,
    via: &'static CapabilityDescriptor,
}

/// Lazily probed, process-wide capability holder.
pub struct Capability<T: 'static> {
    name: &'static str,
    probes: &'static [Probe<T>],
    cell: OnceLock<std::result::Result<Resolved<T>, String>>,
}

impl<T: 'static> Capability<T> {
    pub const fn new(name: &'static str, probes: &'static [Probe<T>]) -> Self {
        Self {
            name,
            probes,
            cell: OnceLock::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn resolve(&self) -> &std::result::Result<Resolved<T>, String> {
        self.cell.get_or_init(|| {
            Fallback::new(format!("capability `{}`", self.name))
                .apply(self.probes.iter(), |probe| {
                    let value = (probe.resolve)()?;
                    debug!(capability = self.name, probe = %probe, "Capability resolved");
                    Ok(Some(Resolved {
                        value,
                        via: &probe.descriptor,
                    }))
                })
                .map_err(|err| {
                    debug!(capability = self.name, error = %err, "Capability unavailable");
                    err.to_string()
                })
        })
    }

    pub fn get(&self) -> Option<&T> {
        self.resolve().as_ref().ok().map(|resolved| &resolved.value)
    }

    /// Returns the capability or `CapabilityUnavailable` with the cached reason.
    pub fn require(&self) -> Result<&T> {
        match self.resolve() {
            Ok(resolved) => Ok(&resolved.value),
            Err(reason) => Err(ComparatorError::CapabilityUnavailable {
                capability: self.name,
                reason: reason.clone(),
            }),
        }
    }

    pub fn is_available(&self) -> bool {
        self.resolve().is_ok()
    }

    /// The probe that produced the capability.
    pub fn resolved_via(&self) -> Option<&'static CapabilityDescriptor> {
        self.resolve().as_ref().ok().map(|resolved| resolved.via)
    }
}

fn unavailable(capability: &'static str, reason: impl fmt::Display) -> ComparatorError {
    ComparatorError::CapabilityUnavailable {
        capability,
        reason: reason.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Target ISA
// ---------------------------------------------------------------------------

/// Code generator for the host.
pub static TARGET_ISA: Capability<OwnedTargetIsa> = Capability::new("target_isa", &ISA_PROBES);

static ISA_PROBES: [Probe<OwnedTargetIsa>; 2] = [
    Probe {
        descriptor: CapabilityDescriptor {
            facility: "cranelift_native",
            operation: "builder",
            signature: "() -> isa::Builder",
        },
        resolve: native_isa,
    },
    Probe {
        descriptor: CapabilityDescriptor {
            facility: "cranelift_native",
            operation: "builder_with_options",
            signature: "(infer_native_flags: false) -> isa::Builder",
        },
        resolve: baseline_isa,
    },
];

fn native_isa() -> Result<OwnedTargetIsa> {
    let builder = cranelift_native::builder().map_err(|e| unavailable("target_isa", e))?;
    finish_isa(builder)
}

fn baseline_isa() -> Result<OwnedTargetIsa> {
    let builder =
        cranelift_native::builder_with_options(false).map_err(|e| unavailable("target_isa", e))?;
    finish_isa(builder)
}

fn finish_isa(builder: isa::Builder) -> Result<OwnedTargetIsa> {
    let mut flag_builder = settings::builder();
    for (name, value) in [
        ("use_colocated_libcalls", "false"),
        ("is_pic", "false"),
        ("opt_level", "speed"),
    ] {
        flag_builder
            .set(name, value)
            .map_err(|e| unavailable("target_isa", format!("setting {name}: {e}")))?;
    }
    let isa = builder
        .finish(settings::Flags::new(flag_builder))
        .map_err(|e| unavailable("target_isa", e))?;
    // Slot words and frame fields are loaded as I64.
    if isa.pointer_bits() != 64 {
        return Err(unavailable(
            "target_isa",
            format!("{}-bit pointers are not supported", isa.pointer_bits()),
        ));
    }
    Ok(isa)
}

/// Fresh JIT module for the host ISA with the given symbols registered.
pub(crate) fn new_module(symbols: &[(&'static str, *const u8)]) -> Result<JITModule> {
    let isa = TARGET_ISA.require()?.clone();
    let mut builder = JITBuilder::with_isa(isa, cranelift_module::default_libcall_names());
    for (name, address) in symbols {
        builder.symbol(*name, *address);
    }
    Ok(JITModule::new(builder))
}

// ---------------------------------------------------------------------------
// Executable memory
// ---------------------------------------------------------------------------

const PROBE_WORD: i64 = 0x5A5A_A5A5;

/// Ability to map generated code executable and call into it.
pub static EXECUTABLE_MEMORY: Capability<()> =
    Capability::new("executable_memory", &EXECUTABLE_MEMORY_PROBES);

static EXECUTABLE_MEMORY_PROBES: [Probe<()>; 1] = [Probe {
        descriptor: CapabilityDescriptor {
            facility: "cranelift_jit",
            operation: "JITModule::finalize_definitions",
            signature: "() -> ModuleResult<()>",
        },
        resolve: call_constant_function,
    }];

fn call_constant_function() -> Result<()> {
    let fail = |e: &dyn fmt::Display| unavailable("executable_memory", e);
    let mut module = new_module(&[])?;
    let mut ctx = module.make_context();
    ctx.func.signature.returns.push(AbiParam::new(I64));
    let id = module
        .declare_anonymous_function(&ctx.func.signature)
        .map_err(|e| fail(&e))?;
    {
        let mut func_ctx = FunctionBuilderContext::new();
        let mut builder = FunctionBuilder::new(&mut ctx.func, &mut func_ctx);
        let entry = builder.create_block();
        builder.switch_to_block(entry);
        builder.seal_block(entry);
        let value = builder.ins().iconst(I64, PROBE_WORD);
        builder.ins().return_(&[value]);
        builder.finalize();
    }
    module.define_function(id, &mut ctx).map_err(|e| fail(&e))?;
    module.clear_context(&mut ctx);
    module.finalize_definitions().map_err(|e| fail(&e))?;

    let code = module.get_finalized_function(id);
    // SAFETY: `code` was just compiled with the signature `() -> i64`.
    let f: extern "C" fn() -> i64 = unsafe { std::mem::transmute(code) };
    let got = f();
    // SAFETY: nothing compiled in this module is referenced anymore.
    unsafe { module.free_memory() };
    if got == PROBE_WORD {
        Ok(())
    } else {
        Err(fail(&format!("probe returned {got:#x}")))
    }
}

// ---------------------------------------------------------------------------
// Slot writer
// ---------------------------------------------------------------------------

/// Writes words into finalized JIT data objects.
#[derive(Debug, Clone, Copy)]
pub struct SlotWriter {
    name: &'static str,
    write: unsafe fn(*mut usize, usize),
}

impl SlotWriter {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// # Safety
    ///
    /// `slot` must be an aligned, writable word inside a live data object.
    pub unsafe fn write(&self, slot: *mut usize, value: usize) {
        unsafe { (self.write)(slot, value) }
    }
}

unsafe fn write_release(slot: *mut usize, value: usize) {
    let word = unsafe { AtomicUsize::from_ptr(slot) };
    word.store(value, Ordering::Release);
}

unsafe fn write_volatile(slot: *mut usize, value: usize) {
    unsafe { slot.write_volatile(value) }
}

/// Post-finalization writes into writable JIT data objects.
pub static SLOT_WRITER: Capability<SlotWriter> = Capability::new("slot_writer", &SLOT_WRITER_PROBES);

static SLOT_WRITER_PROBES: [Probe<SlotWriter>; 2] = [
    Probe {
        descriptor: CapabilityDescriptor {
            facility: "core::sync::atomic",
            operation: "AtomicUsize::store",
            signature: "(usize, Ordering::Release)",
        },
        resolve: release_writer,
    },
    Probe {
        descriptor: CapabilityDescriptor {
            facility: "core::ptr",
            operation: "write_volatile",
            signature: "(*mut usize, usize)",
        },
        resolve: volatile_writer,
    },
];

fn release_writer() -> Result<SlotWriter> {
    verify_writer(SlotWriter {
        name: "atomic-release",
        write: write_release,
    })
}

fn volatile_writer() -> Result<SlotWriter> {
    verify_writer(SlotWriter {
        name: "volatile",
        write: write_volatile,
    })
}

/// Writes into a real finalized data object and reads it back through
/// compiled code.
fn verify_writer(writer: SlotWriter) -> Result<SlotWriter> {
    let fail = |e: &dyn fmt::Display| unavailable("slot_writer", format!("{}: {e}", writer.name));
    let mut module = new_module(&[])?;
    let pointer_type = module.target_config().pointer_type();

    let data = module
        .declare_anonymous_data(true, false)
        .map_err(|e| fail(&e))?;
    let mut desc = DataDescription::new();
    desc.define_zeroinit(8);
    desc.set_align(8);
    module.define_data(data, &desc).map_err(|e| fail(&e))?;

    let mut ctx = module.make_context();
    ctx.func.signature.returns.push(AbiParam::new(I64));
    let id = module
        .declare_anonymous_function(&ctx.func.signature)
        .map_err(|e| fail(&e))?;
    let slot = module.declare_data_in_func(data, &mut ctx.func);
    {
        let mut func_ctx = FunctionBuilderContext::new();
        let mut builder = FunctionBuilder::new(&mut ctx.func, &mut func_ctx);
        let entry = builder.create_block();
        builder.switch_to_block(entry);
        builder.seal_block(entry);
        let base = builder.ins().global_value(pointer_type, slot);
        let value = builder.ins().load(I64, MemFlags::trusted(), base, 0);
        builder.ins().return_(&[value]);
        builder.finalize();
    }
    module.define_function(id, &mut ctx).map_err(|e| fail(&e))?;
    module.clear_context(&mut ctx);
    module.finalize_definitions().map_err(|e| fail(&e))?;

    let (words, _) = module.get_finalized_data(data);
    let code = module.get_finalized_function(id);
    // SAFETY: the data object is one writable, 8-aligned word; `code` has
    // the signature `() -> i64`.
    let got = unsafe {
        writer.write(words as *mut usize, PROBE_WORD as usize);
        let f: extern "C" fn() -> i64 = std::mem::transmute(code);
        f()
    };
    // SAFETY: nothing compiled in this module is referenced anymore.
    unsafe { module.free_memory() };
    if got == PROBE_WORD {
        Ok(writer)
    } else {
        Err(fail(&format!("read back {got:#x}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static PROBE_RUNS: AtomicUsize = AtomicUsize::new(0);

    fn counted_failure() -> Result<u32> {
        PROBE_RUNS.fetch_add(1, Ordering::SeqCst);
        Err(ComparatorError::InvalidArgument("not here".into()))
    }

    fn counted_success() -> Result<u32> {
        PROBE_RUNS.fetch_add(1, Ordering::SeqCst);
        Ok(7)
    }

    const fn probe(operation: &'static str, resolve: fn() -> Result<u32>) -> Probe<u32> {
        Probe {
            descriptor: CapabilityDescriptor {
                facility: "test",
                operation,
                signature: "()",
            },
            resolve,
        }
    }

    fn never() -> Result<u32> {
        Err(ComparatorError::InvalidArgument("never".into()))
    }

    static COUNTED_PROBES: [Probe<u32>; 2] = [
        probe("fails", counted_failure),
        probe("succeeds", counted_success),
    ];
    static COUNTED: Capability<u32> = Capability::new("counted", &COUNTED_PROBES);

    static MISSING_PROBES: [Probe<u32>; 1] = [probe("fails", never)];
    static MISSING: Capability<u32> = Capability::new("missing", &MISSING_PROBES);

    #[test]
    fn test_probes_run_once_in_order() {
        assert_eq!(COUNTED.get(), Some(&7));
        assert_eq!(COUNTED.require().unwrap(), &7);
        assert!(COUNTED.is_available());
        assert_eq!(COUNTED.resolved_via().unwrap().operation, "succeeds");
        assert_eq!(PROBE_RUNS.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_failure_is_cached_with_reason() {
        assert!(!MISSING.is_available());
        let err = MISSING.require().unwrap_err();
        assert!(matches!(
            err,
            ComparatorError::CapabilityUnavailable { capability: "missing", ref reason } if reason.contains("never")
        ));
        assert!(MISSING.resolved_via().is_none());
    }

    #[test]
    fn test_racing_initializers_observe_one_winner() {
        let handles: Vec<_> = (0..8)
            .map(|_| std::thread::spawn(|| TARGET_ISA.resolved_via().map(|d| d.operation)))
            .collect();
        let seen: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(seen.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn test_host_capabilities() {
        let isa = TARGET_ISA.require().unwrap();
        assert_eq!(isa.pointer_bits(), 64);
        assert!(EXECUTABLE_MEMORY.is_available());
        let writer = SLOT_WRITER.require().unwrap();
        assert_eq!(writer.name(), "atomic-release");
    }

    #[test]
    fn test_descriptor_display() {
        let descriptor = CapabilityDescriptor {
            facility: "cranelift_native",
            operation: "builder",
            signature: "()",
        };
        assert_eq!(descriptor.to_string(), "cranelift_native::builder()");
    }
}
