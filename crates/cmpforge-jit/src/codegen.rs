//! Emits method bodies for a declared definition unit.
//!
//! Every body follows the same shape: read the argument addresses (and, for
//! equality, the identity flag) from the frame, settle null and identity cases inline, then call one helper per
//! criterion in spec order. Helper results equal to [`FAULT`] branch to a
//! shared block that returns `FAULT` unchanged.

use cmpforge_config::WiringMode;
use cmpforge_core::{HashParams, NullPolicy, Result, Side, Spec};
use cranelift_codegen::ir::condcodes::IntCC;
use cranelift_codegen::ir::types::{I32, I64};
use cranelift_codegen::ir::{
    AbiParam, Block, FuncRef, Function, GlobalValue, InstBuilder, MemFlags, UserFuncName, Value,
};
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext};
use cranelift_jit::JITModule;
use cranelift_module::{DataId, FuncId, Module};
use tracing::trace;

use crate::abi::{Helper, FAULT, IDENTICAL_OFFSET, LEFT_OFFSET, RIGHT_OFFSET};
use crate::artifact::{Method, SlotValues};
use crate::definer::{DefinitionUnit, SlotStorage};

/// One emitted, not yet defined, method body.
pub(crate) struct MethodBody {
    pub(crate) method: Method,
    pub(crate) func: Function,
}

/// Bodies for every method a unit declared.
pub(crate) struct CodeBuffer {
    pub(crate) bodies: Vec<MethodBody>,
}

/// Unrolled form of `h = initial; for v in values { h = h * multiplier + v }`.
///
/// Returns the seed `initial * multiplier^n` and the per-criterion factors
/// `multiplier^(n - 1 - i)`, all in wrapping 32-bit arithmetic.
pub(crate) fn hash_coefficients(params: HashParams, n: usize) -> (i32, Vec<i32>) {
    let mut powers = vec![1i32; n];
    for i in (0..n.saturating_sub(1)).rev() {
        powers[i] = powers[i + 1].wrapping_mul(params.multiplier);
    }
    let seed = match powers.first() {
        Some(&leading) => params
            .initial
            .wrapping_mul(leading.wrapping_mul(params.multiplier)),
        None => params.initial,
    };
    (seed, powers)
}

pub(crate) fn emit(unit: &mut DefinitionUnit) -> Result<CodeBuffer> {
    let declared: Vec<Method> = unit.methods.iter().map(|(method, _)| *method).collect();
    let spec_slot = unit.values.spec_slot();
    let serial = unit.name.serial();
    let mut bodies = Vec::with_capacity(declared.len());

    for (index, method) in declared.into_iter().enumerate() {
        let mut sig = unit.module.make_signature();
        if method.takes_frame() {
            sig.params.push(AbiParam::new(I64));
        }
        sig.returns.push(AbiParam::new(I64));
        let mut func = Function::with_name_signature(UserFuncName::user(0, index as u32), sig);
        let mut func_ctx = FunctionBuilderContext::new();
        let mut emitter = Emitter::new(
            FunctionBuilder::new(&mut func, &mut func_ctx),
            &mut unit.module,
            &unit.helpers,
            &unit.slots,
            &unit.spec,
        );
        match method {
            Method::Hash => emitter.hash(),
            Method::Equals => emitter.equals(),
            Method::Compare => emitter.compare(),
            Method::WriteReplace => emitter.write_replace(spec_slot),
            Method::Init => emitter.init(unit.wiring, serial),
        }
        emitter.finish();
        trace!(artifact = %unit.name, method = method.as_str(), "Emitted method body");
        bodies.push(MethodBody { method, func });
    }
    Ok(CodeBuffer { bodies })
}

struct Emitter<'a, 'f> {
    builder: FunctionBuilder<'f>,
    module: &'a mut JITModule,
    helpers: &'a [FuncId],
    slots: &'a SlotStorage,
    spec: &'a Spec,
    params: Vec<Value>,
    imported: Vec<Option<FuncRef>>,
    slot_object: Option<GlobalValue>,
    fault: Option<Block>,
}

impl<'a, 'f> Emitter<'a, 'f> {
    fn new(
        mut builder: FunctionBuilder<'f>,
        module: &'a mut JITModule,
        helpers: &'a [FuncId],
        slots: &'a SlotStorage,
        spec: &'a Spec,
    ) -> Self {
        let entry = builder.create_block();
        builder.append_block_params_for_function_params(entry);
        builder.switch_to_block(entry);
        let params = builder.block_params(entry).to_vec();
        Self {
            builder,
            module,
            helpers,
            slots,
            spec,
            params,
            imported: vec![None; Helper::ALL.len()],
            slot_object: None,
            fault: None,
        }
    }

    fn frame(&self) -> Value {
        self.params[0]
    }

    fn helper(&mut self, helper: Helper) -> FuncRef {
        let index = helper as usize;
        if let Some(func_ref) = self.imported[index] {
            return func_ref;
        }
        let func_ref = self
            .module
            .declare_func_in_func(self.helpers[index], self.builder.func);
        self.imported[index] = Some(func_ref);
        func_ref
    }

    fn call(&mut self, helper: Helper, args: &[Value]) -> Value {
        let callee = self.helper(helper);
        let call = self.builder.ins().call(callee, args);
        self.builder.inst_results(call)[0]
    }

    fn fault_block(&mut self) -> Block {
        *self
            .fault
            .get_or_insert_with(|| self.builder.create_block())
    }

    /// Calls `helper` and propagates a fault result.
    fn guarded_call(&mut self, helper: Helper, args: &[Value]) -> Value {
        let result = self.call(helper, args);
        let fault = self.fault_block();
        let next = self.builder.create_block();
        let faulted = self.builder.ins().icmp_imm(IntCC::Equal, result, FAULT);
        self.builder.ins().brif(faulted, fault, &[], next, &[]);
        self.builder.switch_to_block(next);
        result
    }

    fn return_const(&mut self, value: i64) {
        let value = self.builder.ins().iconst(I64, value);
        self.builder.ins().return_(&[value]);
    }

    fn return_const_if(&mut self, condition: Value, value: i64) {
        let exit = self.builder.create_block();
        let next = self.builder.create_block();
        self.builder.ins().brif(condition, exit, &[], next, &[]);
        self.builder.switch_to_block(exit);
        self.return_const(value);
        self.builder.switch_to_block(next);
    }

    fn slot_base(&mut self, id: DataId) -> Value {
        let object = match self.slot_object {
            Some(object) => object,
            None => {
                let object = self.module.declare_data_in_func(id, self.builder.func);
                self.slot_object = Some(object);
                object
            }
        };
        self.builder.ins().global_value(I64, object)
    }

    fn slot(&mut self, index: usize) -> Value {
        let slots = self.slots;
        match slots {
            SlotStorage::Embedded(words) => self.builder.ins().iconst(I64, words[index] as i64),
            SlotStorage::Data { id, .. } => {
                let base = self.slot_base(*id);
                let offset = (index * std::mem::size_of::<usize>()) as i32;
                self.builder
                    .ins()
                    .load(I64, MemFlags::trusted(), base, offset)
            }
        }
    }

    fn argument(&mut self, side: Side) -> Value {
        let offset = match side {
            Side::Left => LEFT_OFFSET,
            Side::Right => RIGHT_OFFSET,
        };
        let frame = self.frame();
        self.builder
            .ins()
            .load(I64, MemFlags::trusted(), frame, offset)
    }

    fn is_null(&mut self, address: Value) -> Value {
        self.builder.ins().icmp_imm(IntCC::Equal, address, 0)
    }

    fn check_cast(&mut self, side: Side) {
        let token = self.slot(SlotValues::TOKEN_SLOT);
        let frame = self.frame();
        let side = self.builder.ins().iconst(I64, side.index());
        self.guarded_call(Helper::CheckCast, &[token, frame, side]);
    }

    fn reject_if_null(&mut self, side: Side, address: Value) {
        let null = self.is_null(address);
        let reject = self.builder.create_block();
        let next = self.builder.create_block();
        self.builder.ins().brif(null, reject, &[], next, &[]);

        self.builder.switch_to_block(reject);
        let frame = self.frame();
        let side = self.builder.ins().iconst(I64, side.index());
        self.call(Helper::RejectNull, &[frame, side]);
        let fault = self.fault_block();
        self.builder.ins().jump(fault, &[]);

        self.builder.switch_to_block(next);
    }

    fn hash(&mut self) {
        let frame = self.frame();
        let left = self.argument(Side::Left);
        let null = self.is_null(left);
        self.return_const_if(null, 0);
        if self.spec.strict_types() {
            self.check_cast(Side::Left);
        }

        let (seed, powers) = hash_coefficients(self.spec.hash_params(), self.spec.criteria().len());
        let mut acc = self.builder.ins().iconst(I64, i64::from(seed));
        for (i, power) in powers.into_iter().enumerate() {
            let criterion = self.slot(SlotValues::criterion_slot(i));
            let value = self.guarded_call(Helper::CriterionHash, &[criterion, frame]);
            let term = if power == 1 {
                value
            } else {
                self.builder.ins().imul_imm(value, i64::from(power))
            };
            acc = self.builder.ins().iadd(acc, term);
        }
        let narrow = self.builder.ins().ireduce(I32, acc);
        let result = self.builder.ins().sextend(I64, narrow);
        self.builder.ins().return_(&[result]);
    }

    fn equals(&mut self) {
        let frame = self.frame();
        let identical = self
            .builder
            .ins()
            .load(I64, MemFlags::trusted(), frame, IDENTICAL_OFFSET);
        let same = self.builder.ins().icmp_imm(IntCC::NotEqual, identical, 0);
        self.return_const_if(same, 1);
        let left = self.argument(Side::Left);
        let right = self.argument(Side::Right);
        let left_null = self.is_null(left);
        let right_null = self.is_null(right);
        let either_null = self.builder.ins().bor(left_null, right_null);
        self.return_const_if(either_null, 0);

        if self.spec.strict_types() {
            self.check_cast(Side::Left);
            let token = self.slot(SlotValues::TOKEN_SLOT);
            let side = self.builder.ins().iconst(I64, Side::Right.index());
            let instance = self.guarded_call(Helper::IsInstance, &[token, frame, side]);
            let foreign = self.builder.ins().icmp_imm(IntCC::Equal, instance, 0);
            self.return_const_if(foreign, 0);
        }

        for i in 0..self.spec.criteria().len() {
            let criterion = self.slot(SlotValues::criterion_slot(i));
            let equal = self.guarded_call(Helper::CriterionEqual, &[criterion, frame]);
            let differs = self.builder.ins().icmp_imm(IntCC::Equal, equal, 0);
            self.return_const_if(differs, 0);
        }
        self.return_const(1);
    }

    fn compare(&mut self) {
        let frame = self.frame();
        let strict = self.spec.strict_types();
        if strict {
            self.check_cast(Side::Left);
            self.check_cast(Side::Right);
        }

        let nulls = self.spec.kind().nulls().unwrap_or(NullPolicy::Throw);
        match nulls.null_sign() {
            Some(sign) => {
                let left = self.argument(Side::Left);
                let right = self.argument(Side::Right);
                let left_null = self.is_null(left);
                let right_null = self.is_null(right);
                let left_missing = self.builder.create_block();
                let left_present = self.builder.create_block();
                self.builder
                    .ins()
                    .brif(left_null, left_missing, &[], left_present, &[]);

                self.builder.switch_to_block(left_missing);
                let tie = self.builder.ins().iconst(I64, 0);
                let first = self.builder.ins().iconst(I64, sign);
                let result = self.builder.ins().select(right_null, tie, first);
                self.builder.ins().return_(&[result]);

                self.builder.switch_to_block(left_present);
                self.return_const_if(right_null, -sign);
            }
            None if strict => {
                let left = self.argument(Side::Left);
                self.reject_if_null(Side::Left, left);
                let right = self.argument(Side::Right);
                self.reject_if_null(Side::Right, right);
            }
            // Criteria see nulls and decide for themselves.
            None => {}
        }

        let count = self.spec.criteria().len();
        if count == 0 {
            self.return_const(0);
            return;
        }
        let done = self.builder.create_block();
        self.builder.append_block_param(done, I64);
        for i in 0..count {
            let criterion = self.slot(SlotValues::criterion_slot(i));
            let order = self.guarded_call(Helper::CriterionCompare, &[criterion, frame]);
            if i + 1 < count {
                let decided = self.builder.ins().icmp_imm(IntCC::NotEqual, order, 0);
                let next = self.builder.create_block();
                self.builder.ins().brif(decided, done, &[order], next, &[]);
                self.builder.switch_to_block(next);
            } else {
                self.builder.ins().jump(done, &[order]);
            }
        }
        self.builder.switch_to_block(done);
        let result = self.builder.block_params(done)[0];
        self.builder.ins().return_(&[result]);
    }

    fn write_replace(&mut self, spec_slot: Option<usize>) {
        let Some(slot) = spec_slot else {
            self.return_const(FAULT);
            return;
        };
        let frame = self.frame();
        let spec = self.slot(slot);
        self.guarded_call(Helper::WriteReplace, &[spec, frame]);
        self.return_const(0);
    }

    /// Returns 1 once the slots are usable, 0 when bridge wiring found
    /// nothing to copy.
    fn init(&mut self, wiring: WiringMode, serial: u64) {
        let slots = self.slots;
        let (WiringMode::Bridge, SlotStorage::Data { id, len }) = (wiring, slots) else {
            self.return_const(1);
            return;
        };
        let serial = self.builder.ins().iconst(I64, serial as i64);
        let source = self.call(Helper::BridgeResolve, &[serial]);
        let missing = self.is_null(source);
        self.return_const_if(missing, 0);

        let base = self.slot_base(*id);
        for k in 0..*len {
            let offset = (k * std::mem::size_of::<usize>()) as i32;
            let word = self
                .builder
                .ins()
                .load(I64, MemFlags::trusted(), source, offset);
            self.builder
                .ins()
                .store(MemFlags::trusted(), word, base, offset);
        }
        self.return_const(1);
    }

    fn finish(mut self) {
        if let Some(fault) = self.fault {
            self.builder.switch_to_block(fault);
            self.return_const(FAULT);
        }
        self.builder.seal_all_blocks();
        self.builder.finalize();
    }
}
