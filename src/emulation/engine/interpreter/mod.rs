//! Core CIL instruction interpreter.
//!
//! Every call runs in its own [`Frame`]: argument and local slots, the evaluation stack
//! and the exception objects of the catch handlers currently executing. The dispatch
//! loop executes one instruction at a time and routes managed exceptions through the
//! exception regions of the frame.
//!
//! # Exception Handling
//!
//! When an instruction raises a managed exception, the regions protecting it are
//! visited in table order, innermost first:
//!
//! - a `catch` whose type the exception is an instance of receives control
//! - a `filter` block runs and receives control when it yields `true`
//! - `finally` and `fault` handlers run in place, then the search continues
//!
//! Without a matching handler the exception propagates to the calling frame. `leave`
//! runs the `finally` handlers of every region it exits before jumping.

mod handlers;
#[cfg(test)]
mod tests;

use std::{collections::HashMap, sync::Arc};

use crate::{
    assembly::{InstrId, Instruction, OpCode, Operand},
    emulation::{
        engine::context::{EmResult, NULL_REFERENCE_MESSAGE},
        memory::HeapObject,
        runtime::hook::{HookContext, HookOutcome},
        EmValue, EmulationError, Emulator, HeapRef, Member,
    },
    metadata::{
        method::{HandlerKind, MethodBody, RegionSpan},
        module::Module,
        signatures::TypeSignature,
        token::Token,
    },
};

use handlers::{Comparison, Fault};

/// Instruction positions and resolved exception regions of a method body
#[derive(Debug)]
pub(crate) struct BodyLayout {
    positions: HashMap<InstrId, usize>,
    spans: Vec<RegionSpan>,
}

/// How a run of the dispatch loop ended
#[derive(Debug)]
enum Exit<'m> {
    /// `ret`, with the return value or [`EmValue::Void`]
    Return(EmValue<'m>),
    /// `endfinally` of a finally or fault handler
    EndFinally,
    /// `endfilter` with the filter's verdict
    EndFilter(bool),
}

/// Control flow after one instruction
enum Flow<'m> {
    Next,
    Jump(usize),
    Exit(Exit<'m>),
}

/// Execution state of one method invocation
struct Frame<'m> {
    method: Member<'m>,
    body: &'m MethodBody,
    returns_value: bool,
    args: Vec<EmValue<'m>>,
    locals: Vec<EmValue<'m>>,
    stack: Vec<EmValue<'m>>,
    layout: Arc<BodyLayout>,
    // Exceptions of the catch handlers being executed, innermost last
    caught: Vec<HeapRef>,
}

impl<'m> Frame<'m> {
    fn push(&mut self, value: EmValue<'m>) {
        self.stack.push(value);
    }

    fn pop(&mut self) -> EmResult<EmValue<'m>> {
        self.stack
            .pop()
            .ok_or_else(|| EmulationError::StackUnderflow(self.method.to_string()))
    }

    fn pop_n(&mut self, count: usize) -> EmResult<Vec<EmValue<'m>>> {
        let start = self
            .stack
            .len()
            .checked_sub(count)
            .ok_or_else(|| EmulationError::StackUnderflow(self.method.to_string()))?;
        Ok(self.stack.split_off(start))
    }

    fn peek(&self) -> EmResult<&EmValue<'m>> {
        self.stack
            .last()
            .ok_or_else(|| EmulationError::StackUnderflow(self.method.to_string()))
    }

    fn target(&self, id: InstrId) -> EmResult<usize> {
        self.layout
            .positions
            .get(&id)
            .copied()
            .ok_or(EmulationError::InvalidBranchTarget(id))
    }

    fn slot<'s>(slots: &'s mut [EmValue<'m>], index: usize, method: Member<'m>) -> EmResult<&'s mut EmValue<'m>> {
        slots.get_mut(index).ok_or_else(|| {
            EmulationError::InvalidBody(format!("{method} has no slot {index}"))
        })
    }

    /// Drops the caught exceptions of handlers that do not contain `position`
    fn sync_caught(&mut self, position: usize) {
        let body = self.body;
        let regions = body.regions();
        let depth = self
            .layout
            .spans
            .iter()
            .filter(|span| span.in_handler(position))
            .filter(|span| {
                regions.get(span.index).is_some_and(|region| {
                    matches!(region.kind, HandlerKind::Catch(_) | HandlerKind::Filter { .. })
                })
            })
            .count();
        self.caught.truncate(depth);
    }
}

fn invalid_operand(instruction: &Instruction) -> EmulationError {
    EmulationError::InvalidBody(format!(
        "{} {:?} has operand {:?}",
        instruction.id, instruction.opcode, instruction.operand
    ))
}

/// Argument or local index of a load or store instruction
fn slot_index(instruction: &Instruction) -> EmResult<usize> {
    Ok(match (instruction.opcode, &instruction.operand) {
        (OpCode::Ldarg0 | OpCode::Ldloc0 | OpCode::Stloc0, _) => 0,
        (OpCode::Ldarg1 | OpCode::Ldloc1 | OpCode::Stloc1, _) => 1,
        (OpCode::Ldarg2 | OpCode::Ldloc2 | OpCode::Stloc2, _) => 2,
        (OpCode::Ldarg3 | OpCode::Ldloc3 | OpCode::Stloc3, _) => 3,
        (_, Operand::Argument(index) | Operand::Local(index)) => usize::from(*index),
        _ => return Err(invalid_operand(instruction)),
    })
}

/// Value pushed by a `ldc.*` instruction
fn constant<'m>(instruction: &Instruction) -> EmResult<EmValue<'m>> {
    Ok(match (instruction.opcode, &instruction.operand) {
        (OpCode::LdcI4M1, _) => EmValue::I32(-1),
        (OpCode::LdcI40, _) => EmValue::I32(0),
        (OpCode::LdcI41, _) => EmValue::I32(1),
        (OpCode::LdcI42, _) => EmValue::I32(2),
        (OpCode::LdcI43, _) => EmValue::I32(3),
        (OpCode::LdcI44, _) => EmValue::I32(4),
        (OpCode::LdcI45, _) => EmValue::I32(5),
        (OpCode::LdcI46, _) => EmValue::I32(6),
        (OpCode::LdcI47, _) => EmValue::I32(7),
        (OpCode::LdcI48, _) => EmValue::I32(8),
        (_, Operand::Int8(value)) => EmValue::I32(i32::from(*value)),
        (_, Operand::Int32(value)) => EmValue::I32(*value),
        (_, Operand::Int64(value)) => EmValue::I64(*value),
        (_, Operand::Float32(value)) => EmValue::F32(*value),
        (_, Operand::Float64(value)) => EmValue::F64(*value),
        _ => return Err(invalid_operand(instruction)),
    })
}

/// Name an object must carry in its type chain to pass a cast to `signature`
fn cast_target(module: &Module, signature: &TypeSignature) -> String {
    match signature {
        TypeSignature::GenericInst(base, _) => module.signature_name(base),
        other => module.signature_name(other),
    }
}

impl<'m> Emulator<'m> {
    /// Invokes a method through the hook manager, falling back to its IL body.
    ///
    /// `this` is the receiver of instance methods, `args` the declared arguments.
    pub(crate) fn invoke_method(
        &mut self,
        method: Member<'m>,
        this: Option<EmValue<'m>>,
        args: Vec<EmValue<'m>>,
    ) -> EmResult<EmValue<'m>> {
        let def = self.method_def(method)?;
        let owner = Member::new(method.module, def.declaring_type);
        let owner_def = self.type_def(owner)?;
        if def.is_static() {
            self.ensure_initialized(owner)?;
        }

        let context = HookContext {
            method,
            namespace: &owner_def.namespace,
            type_name: &owner_def.name,
            method_name: &def.name,
            this,
            args,
        };

        let hooks = Arc::clone(&self.hooks);
        let outcome = hooks.execute(&context, self, |emulator| {
            let result =
                emulator.execute_body(method, context.this.clone(), context.args.clone())?;
            Ok((result != EmValue::Void).then_some(result))
        })?;

        match outcome {
            HookOutcome::Handled(Some(value)) => Ok(value),
            HookOutcome::Handled(None) => Ok(EmValue::default_for(&def.signature.return_type)),
            HookOutcome::NoMatch => {
                let HookContext { this, args, .. } = context;
                self.execute_body(method, this, args)
            }
        }
    }

    /// Runs the IL body of a method in a new frame
    fn execute_body(
        &mut self,
        method: Member<'m>,
        this: Option<EmValue<'m>>,
        args: Vec<EmValue<'m>>,
    ) -> EmResult<EmValue<'m>> {
        let def = self.method_def(method)?;
        let Some(body) = def.body.as_ref() else {
            return Err(EmulationError::MissingNative(method.module.member_display_name(method.token)));
        };
        if self.depth >= self.limits.max_call_depth {
            return Err(EmulationError::CallDepthExceeded(self.limits.max_call_depth));
        }

        let mut slots = Vec::with_capacity(def.arg_count());
        if def.signature.has_this {
            slots.push(this.unwrap_or(EmValue::Null));
        }
        slots.extend(args);
        if slots.len() != def.arg_count() {
            return Err(EmulationError::ArgumentCount {
                method: method.to_string(),
                expected: def.arg_count(),
                actual: slots.len(),
            });
        }

        let mut frame = Frame {
            method,
            body,
            returns_value: def.returns_value(),
            args: slots,
            locals: body.locals.iter().map(EmValue::default_for).collect(),
            stack: Vec::with_capacity(usize::from(body.max_stack)),
            layout: self.layout(method, body)?,
            caught: Vec::new(),
        };

        self.depth += 1;
        let result = self.run(&mut frame, 0);
        self.depth -= 1;

        match result? {
            Exit::Return(value) => Ok(value),
            Exit::EndFinally | Exit::EndFilter(_) => Err(EmulationError::InvalidBody(format!(
                "{method} ends a handler outside of one"
            ))),
        }
    }

    fn layout(&mut self, method: Member<'m>, body: &'m MethodBody) -> EmResult<Arc<BodyLayout>> {
        if let Some(layout) = self.layouts.get(&method) {
            return Ok(Arc::clone(layout));
        }
        let spans = body
            .region_table()
            .map_err(|error| EmulationError::InvalidBody(format!("{method}: {error}")))?;
        let layout = Arc::new(BodyLayout {
            positions: body.position_map(),
            spans,
        });
        self.layouts.insert(method, Arc::clone(&layout));
        Ok(layout)
    }

    fn tick(&mut self) -> EmResult<()> {
        self.executed += 1;
        if self.executed > self.limits.max_instructions {
            return Err(EmulationError::InstructionLimitExceeded(
                self.limits.max_instructions,
            ));
        }
        Ok(())
    }

    /// Dispatch loop, from `start` until the frame returns or a handler ends
    fn run(&mut self, frame: &mut Frame<'m>, start: usize) -> EmResult<Exit<'m>> {
        let body = frame.body;
        let mut pc = start;
        loop {
            let instruction = body.instructions().get(pc).ok_or_else(|| {
                EmulationError::InvalidBody(format!("{} runs past its last instruction", frame.method))
            })?;
            self.tick()?;

            match self.step(frame, instruction, pc) {
                Ok(Flow::Next) => pc += 1,
                Ok(Flow::Jump(target)) => pc = target,
                Ok(Flow::Exit(exit)) => return Ok(exit),
                Err(error) if error.is_managed() => pc = self.dispatch(frame, pc, error)?,
                Err(error) => return Err(error),
            }
        }
    }

    /// Finds the handler for an exception raised at `pc`, running `finally` and `fault`
    /// handlers on the way. Returns the handler position or the exception itself.
    fn dispatch(&mut self, frame: &mut Frame<'m>, pc: usize, error: EmulationError) -> EmResult<usize> {
        let Some(exception) = error.exception() else {
            return Err(error);
        };
        let layout = Arc::clone(&frame.layout);
        let body = frame.body;
        let regions = body.regions();
        frame.sync_caught(pc);

        for span in layout.spans.iter().filter(|span| span.protects(pc)) {
            let Some(region) = regions.get(span.index) else {
                continue;
            };
            match &region.kind {
                HandlerKind::Catch(ty) => {
                    let target = cast_target(frame.method.module, ty);
                    if self.is_instance(exception, &target)? {
                        return Ok(Self::enter_handler(frame, span, exception));
                    }
                }
                HandlerKind::Filter { .. } => {
                    let Some(start) = span.filter_start else {
                        continue;
                    };
                    frame.stack.clear();
                    frame.push(EmValue::ObjectRef(exception));
                    if let Exit::EndFilter(true) = self.run(frame, start)? {
                        return Ok(Self::enter_handler(frame, span, exception));
                    }
                }
                HandlerKind::Finally | HandlerKind::Fault => {
                    self.run_finally(frame, span.handler_range.start)?;
                }
            }
        }
        Err(error)
    }

    fn enter_handler(frame: &mut Frame<'m>, span: &RegionSpan, exception: HeapRef) -> usize {
        frame.stack.clear();
        frame.push(EmValue::ObjectRef(exception));
        frame.caught.push(exception);
        span.handler_range.start
    }

    fn run_finally(&mut self, frame: &mut Frame<'m>, start: usize) -> EmResult<()> {
        frame.stack.clear();
        match self.run(frame, start)? {
            Exit::EndFinally => Ok(()),
            _ => Err(EmulationError::InvalidBody(format!(
                "control leaves a finally handler of {}",
                frame.method
            ))),
        }
    }

    /// `leave`: runs the finally handlers of the regions being exited, then jumps
    fn leave(&mut self, frame: &mut Frame<'m>, pc: usize, target: usize) -> EmResult<Flow<'m>> {
        let layout = Arc::clone(&frame.layout);
        let body = frame.body;
        let regions = body.regions();
        for span in &layout.spans {
            let is_finally = regions
                .get(span.index)
                .is_some_and(|region| region.kind == HandlerKind::Finally);
            if is_finally && span.protects(pc) && !span.protects(target) {
                self.run_finally(frame, span.handler_range.start)?;
            }
        }
        frame.stack.clear();
        frame.sync_caught(target);
        Ok(Flow::Jump(target))
    }

    fn null_reference(&mut self) -> EmulationError {
        self.throw("System.NullReferenceException", NULL_REFERENCE_MESSAGE)
    }

    fn fault(&mut self, fault: Fault) -> EmulationError {
        match fault {
            Fault::DivideByZero => {
                self.throw("System.DivideByZeroException", "Attempted to divide by zero.")
            }
            Fault::Overflow => self.throw(
                "System.OverflowException",
                "Arithmetic operation resulted in an overflow.",
            ),
            Fault::Operands(expected, found) => EmulationError::TypeMismatch { expected, found },
        }
    }

    fn invalid_cast(&mut self, object: HeapRef, target: &str) -> EmulationError {
        let actual = self
            .type_names(object)
            .ok()
            .and_then(|names| names.into_iter().next())
            .unwrap_or_default();
        self.throw(
            "System.InvalidCastException",
            &format!("Unable to cast object of type '{actual}' to type '{target}'."),
        )
    }

    /// `castclass` and `isinst`: `Some(value)` if the cast holds, `null` always does
    fn try_cast(&self, value: EmValue<'m>, target: &str) -> EmResult<Option<EmValue<'m>>> {
        match value {
            EmValue::Null => Ok(Some(EmValue::Null)),
            EmValue::ObjectRef(object) => {
                Ok(self.is_instance(object, target)?.then_some(value))
            }
            other => Err(EmulationError::TypeMismatch {
                expected: "object",
                found: other.kind(),
            }),
        }
    }

    /// Heap object behind a reference operand, raising for `null`
    fn object_operand(&mut self, value: &EmValue<'m>) -> EmResult<HeapRef> {
        match value {
            EmValue::ObjectRef(object) => Ok(*object),
            EmValue::Null => Err(self.null_reference()),
            other => Err(EmulationError::TypeMismatch {
                expected: "object",
                found: other.kind(),
            }),
        }
    }

    fn array_index(&mut self, array: HeapRef, index: &EmValue<'m>) -> EmResult<usize> {
        let length = match self.heap.get(array)? {
            HeapObject::Array { items, .. } => items.len(),
            other => {
                return Err(EmulationError::TypeMismatch {
                    expected: "array",
                    found: other.kind(),
                })
            }
        };
        match index.as_i64().and_then(|i| usize::try_from(i).ok()) {
            Some(i) if i < length => Ok(i),
            _ => Err(self.throw(
                "System.IndexOutOfRangeException",
                "Index was outside the bounds of the array.",
            )),
        }
    }

    fn exec_call(&mut self, frame: &mut Frame<'m>, token: Token, virtual_call: bool) -> EmResult<Flow<'m>> {
        let module = frame.method.module;
        let mut method = self.resolve_method(module, token)?;
        let def = self.method_def(method)?;
        let args = frame.pop_n(def.signature.params.len())?;
        let this = if def.signature.has_this {
            Some(frame.pop()?)
        } else {
            None
        };

        if virtual_call {
            if let Some(receiver) = &this {
                let object = self.object_operand(receiver)?;
                method = self.dispatch_virtual(method, object)?;
            }
        }

        let result = self.invoke_method(method, this, args)?;
        if result != EmValue::Void {
            frame.push(result);
        }
        Ok(Flow::Next)
    }

    fn exec_newobj(&mut self, frame: &mut Frame<'m>, token: Token) -> EmResult<Flow<'m>> {
        let ctor = self.resolve_method(frame.method.module, token)?;
        let def = self.method_def(ctor)?;
        let ty = Member::new(ctor.module, def.declaring_type);
        let args = frame.pop_n(def.signature.params.len())?;

        let is_delegate = self.ancestry(ty).iter().any(|t| {
            t.module
                .type_name(t.token)
                .is_ok_and(|name| name == "System.MulticastDelegate")
        });
        let object = if is_delegate {
            let [target, pointer]: [EmValue<'m>; 2] = args.try_into().map_err(|_| {
                EmulationError::InvalidBody(format!("delegate constructor of {ty} takes two arguments"))
            })?;
            let EmValue::FnPtr(method) = pointer else {
                return Err(EmulationError::TypeMismatch {
                    expected: "method pointer",
                    found: pointer.kind(),
                });
            };
            self.heap.alloc(HeapObject::Delegate { ty, target, method })?
        } else {
            self.ensure_initialized(ty)?;
            let object = self.alloc_object(ty)?;
            self.invoke_method(ctor, Some(EmValue::ObjectRef(object)), args)?;
            object
        };
        frame.push(EmValue::ObjectRef(object));
        Ok(Flow::Next)
    }

    fn unbox_any(&mut self, frame: &mut Frame<'m>, signature: &TypeSignature) -> EmResult<()> {
        let value = frame.pop()?;
        let module = frame.method.module;

        if signature.is_generic_parameter() {
            let value = self.unbox(&value).unwrap_or(value);
            frame.push(value);
            return Ok(());
        }
        if !signature.is_value_type() {
            let target = cast_target(module, signature);
            return match self.try_cast(value.clone(), &target)? {
                Some(value) => {
                    frame.push(value);
                    Ok(())
                }
                None => {
                    let object = self.object_operand(&value)?;
                    Err(self.invalid_cast(object, &target))
                }
            };
        }

        let object = self.object_operand(&value)?;
        let expected = EmValue::default_for(signature);
        match self.unbox(&value) {
            Some(inner) if inner.kind() == expected.kind() => {
                frame.push(inner);
                Ok(())
            }
            _ => Err(self.invalid_cast(object, &cast_target(module, signature))),
        }
    }

    #[allow(clippy::too_many_lines)]
    fn step(
        &mut self,
        frame: &mut Frame<'m>,
        instruction: &'m Instruction,
        pc: usize,
    ) -> EmResult<Flow<'m>> {
        let module = frame.method.module;

        match instruction.opcode {
            OpCode::Nop => {}

            OpCode::Ldarg0 | OpCode::Ldarg1 | OpCode::Ldarg2 | OpCode::Ldarg3 | OpCode::LdargS
            | OpCode::Ldarg => {
                let value = Frame::slot(&mut frame.args, slot_index(instruction)?, frame.method)?.clone();
                frame.push(value);
            }
            OpCode::StargS | OpCode::Starg => {
                let value = frame.pop()?;
                *Frame::slot(&mut frame.args, slot_index(instruction)?, frame.method)? = value;
            }
            OpCode::Ldloc0 | OpCode::Ldloc1 | OpCode::Ldloc2 | OpCode::Ldloc3 | OpCode::LdlocS
            | OpCode::Ldloc => {
                let value = Frame::slot(&mut frame.locals, slot_index(instruction)?, frame.method)?.clone();
                frame.push(value);
            }
            OpCode::Stloc0 | OpCode::Stloc1 | OpCode::Stloc2 | OpCode::Stloc3 | OpCode::StlocS
            | OpCode::Stloc => {
                let value = frame.pop()?;
                *Frame::slot(&mut frame.locals, slot_index(instruction)?, frame.method)? = value;
            }

            OpCode::Ldnull => frame.push(EmValue::Null),
            OpCode::LdcI4M1
            | OpCode::LdcI40
            | OpCode::LdcI41
            | OpCode::LdcI42
            | OpCode::LdcI43
            | OpCode::LdcI44
            | OpCode::LdcI45
            | OpCode::LdcI46
            | OpCode::LdcI47
            | OpCode::LdcI48
            | OpCode::LdcI4S
            | OpCode::LdcI4
            | OpCode::LdcI8
            | OpCode::LdcR4
            | OpCode::LdcR8 => frame.push(constant(instruction)?),
            OpCode::Ldstr => {
                let Operand::String(value) = &instruction.operand else {
                    return Err(invalid_operand(instruction));
                };
                let string = self.heap.alloc_string(value.as_str())?;
                frame.push(EmValue::ObjectRef(string));
            }
            OpCode::Dup => {
                let value = frame.peek()?.clone();
                frame.push(value);
            }
            OpCode::Pop => {
                frame.pop()?;
            }

            OpCode::Call | OpCode::Callvirt => {
                let Operand::Method(token) = instruction.operand else {
                    return Err(invalid_operand(instruction));
                };
                return self.exec_call(frame, token, instruction.opcode == OpCode::Callvirt);
            }
            OpCode::Newobj => {
                let Operand::Method(token) = instruction.operand else {
                    return Err(invalid_operand(instruction));
                };
                return self.exec_newobj(frame, token);
            }
            OpCode::Ret => {
                let value = if frame.returns_value {
                    frame.pop()?
                } else {
                    EmValue::Void
                };
                return Ok(Flow::Exit(Exit::Return(value)));
            }

            OpCode::Br | OpCode::BrS => {
                let Operand::Target(target) = instruction.operand else {
                    return Err(invalid_operand(instruction));
                };
                return Ok(Flow::Jump(frame.target(target)?));
            }
            OpCode::Brtrue | OpCode::BrtrueS | OpCode::Brfalse | OpCode::BrfalseS => {
                let Operand::Target(target) = instruction.operand else {
                    return Err(invalid_operand(instruction));
                };
                let condition = frame.pop()?.is_true();
                let expected = matches!(instruction.opcode, OpCode::Brtrue | OpCode::BrtrueS);
                if condition == expected {
                    return Ok(Flow::Jump(frame.target(target)?));
                }
            }
            OpCode::Beq
            | OpCode::BeqS
            | OpCode::BneUn
            | OpCode::BneUnS
            | OpCode::Bgt
            | OpCode::BgtS
            | OpCode::Bge
            | OpCode::BgeS
            | OpCode::Blt
            | OpCode::BltS
            | OpCode::Ble
            | OpCode::BleS => {
                let Operand::Target(target) = instruction.operand else {
                    return Err(invalid_operand(instruction));
                };
                let comparison = Comparison::of_branch(instruction.opcode)
                    .ok_or_else(|| invalid_operand(instruction))?;
                let right = frame.pop()?;
                let left = frame.pop()?;
                if handlers::compare(comparison, &left, &right).map_err(|f| self.fault(f))? {
                    return Ok(Flow::Jump(frame.target(target)?));
                }
            }
            OpCode::Switch => {
                let Operand::Switch(targets) = &instruction.operand else {
                    return Err(invalid_operand(instruction));
                };
                let index = frame.pop()?;
                let selected = index
                    .as_i32()
                    .and_then(|i| usize::try_from(i).ok())
                    .and_then(|i| targets.get(i));
                if let Some(target) = selected {
                    return Ok(Flow::Jump(frame.target(*target)?));
                }
            }

            OpCode::Add
            | OpCode::Sub
            | OpCode::Mul
            | OpCode::Div
            | OpCode::Rem
            | OpCode::And
            | OpCode::Or
            | OpCode::Xor => {
                let right = frame.pop()?;
                let left = frame.pop()?;
                let result = handlers::binary(instruction.opcode, &left, &right)
                    .map_err(|f| self.fault(f))?;
                frame.push(result);
            }
            OpCode::Shl | OpCode::Shr => {
                let amount = frame.pop()?;
                let value = frame.pop()?;
                let result = handlers::shift(instruction.opcode, &value, &amount)
                    .map_err(|f| self.fault(f))?;
                frame.push(result);
            }
            OpCode::Neg | OpCode::Not => {
                let value = frame.pop()?;
                let result =
                    handlers::unary(instruction.opcode, &value).map_err(|f| self.fault(f))?;
                frame.push(result);
            }
            OpCode::ConvI1
            | OpCode::ConvI2
            | OpCode::ConvI4
            | OpCode::ConvI8
            | OpCode::ConvU1
            | OpCode::ConvU2
            | OpCode::ConvU4
            | OpCode::ConvU8
            | OpCode::ConvR4
            | OpCode::ConvR8 => {
                let value = frame.pop()?;
                let result =
                    handlers::convert(instruction.opcode, &value).map_err(|f| self.fault(f))?;
                frame.push(result);
            }
            OpCode::Ceq | OpCode::Cgt | OpCode::Clt => {
                let right = frame.pop()?;
                let left = frame.pop()?;
                let comparison = match instruction.opcode {
                    OpCode::Ceq => Comparison::Equal,
                    OpCode::Cgt => Comparison::Greater,
                    _ => Comparison::Less,
                };
                let result =
                    handlers::compare(comparison, &left, &right).map_err(|f| self.fault(f))?;
                frame.push(EmValue::I32(i32::from(result)));
            }

            OpCode::Castclass | OpCode::Isinst => {
                let Operand::Type(signature) = &instruction.operand else {
                    return Err(invalid_operand(instruction));
                };
                let value = frame.pop()?;
                let target = cast_target(module, signature);
                match self.try_cast(value.clone(), &target)? {
                    Some(value) => frame.push(value),
                    None if instruction.opcode == OpCode::Isinst => frame.push(EmValue::Null),
                    None => {
                        let object = self.object_operand(&value)?;
                        return Err(self.invalid_cast(object, &target));
                    }
                }
            }
            OpCode::Box => {
                let Operand::Type(signature) = &instruction.operand else {
                    return Err(invalid_operand(instruction));
                };
                let value = frame.pop()?;
                let boxed = self.box_as(module, signature, value)?;
                frame.push(boxed);
            }
            OpCode::UnboxAny => {
                let Operand::Type(signature) = &instruction.operand else {
                    return Err(invalid_operand(instruction));
                };
                self.unbox_any(frame, signature)?;
            }

            OpCode::Newarr => {
                let Operand::Type(signature) = &instruction.operand else {
                    return Err(invalid_operand(instruction));
                };
                let count = frame.pop()?;
                let Some(length) = count.as_i64().and_then(|n| usize::try_from(n).ok()) else {
                    return Err(self.fault(Fault::Overflow));
                };
                let element = self.runtime_type(module, signature)?;
                let array = self.heap.alloc(HeapObject::Array {
                    element,
                    items: vec![EmValue::default_for(signature); length],
                })?;
                frame.push(EmValue::ObjectRef(array));
            }
            OpCode::Ldlen => {
                let value = frame.pop()?;
                let array = self.object_operand(&value)?;
                let length = match self.heap.get(array)? {
                    HeapObject::Array { items, .. } => items.len(),
                    other => {
                        return Err(EmulationError::TypeMismatch {
                            expected: "array",
                            found: other.kind(),
                        })
                    }
                };
                frame.push(EmValue::NativeInt(i64::try_from(length).unwrap_or(i64::MAX)));
            }
            OpCode::LdelemRef => {
                let index = frame.pop()?;
                let value = frame.pop()?;
                let array = self.object_operand(&value)?;
                let index = self.array_index(array, &index)?;
                let element = match self.heap.get(array)? {
                    HeapObject::Array { items, .. } => items.get(index).cloned(),
                    _ => None,
                };
                frame.push(element.unwrap_or(EmValue::Null));
            }
            OpCode::StelemRef => {
                let element = frame.pop()?;
                let index = frame.pop()?;
                let value = frame.pop()?;
                let array = self.object_operand(&value)?;
                let index = self.array_index(array, &index)?;
                if let HeapObject::Array { items, .. } = self.heap.get_mut(array)? {
                    if let Some(slot) = items.get_mut(index) {
                        *slot = element;
                    }
                }
            }

            OpCode::Ldtoken => {
                let value = match &instruction.operand {
                    Operand::Type(signature) => {
                        EmValue::TypeHandle(self.runtime_type(module, signature)?)
                    }
                    Operand::Method(token) => {
                        EmValue::MethodHandle(self.resolve_method(module, *token)?)
                    }
                    _ => return Err(EmulationError::Unsupported("ldtoken on a field".to_string())),
                };
                frame.push(value);
            }
            OpCode::Ldftn => {
                let Operand::Method(token) = instruction.operand else {
                    return Err(invalid_operand(instruction));
                };
                frame.push(EmValue::FnPtr(self.resolve_method(module, token)?));
            }

            OpCode::Ldfld => {
                let Operand::Field(token) = instruction.operand else {
                    return Err(invalid_operand(instruction));
                };
                let field = self.resolve_field(module, token)?;
                let value = frame.pop()?;
                let object = self.object_operand(&value)?;
                frame.push(self.load_field(object, field)?);
            }
            OpCode::Stfld => {
                let Operand::Field(token) = instruction.operand else {
                    return Err(invalid_operand(instruction));
                };
                let field = self.resolve_field(module, token)?;
                let value = frame.pop()?;
                let target = frame.pop()?;
                let object = self.object_operand(&target)?;
                self.store_field(object, field, value)?;
            }
            OpCode::Ldsfld => {
                let Operand::Field(token) = instruction.operand else {
                    return Err(invalid_operand(instruction));
                };
                let field = self.resolve_field(module, token)?;
                let value = self.load_static(field)?;
                frame.push(value);
            }
            OpCode::Stsfld => {
                let Operand::Field(token) = instruction.operand else {
                    return Err(invalid_operand(instruction));
                };
                let field = self.resolve_field(module, token)?;
                let value = frame.pop()?;
                self.store_static(field, value)?;
            }

            OpCode::Throw => {
                let value = frame.pop()?;
                let exception = self.object_operand(&value)?;
                return Err(self.raise(exception));
            }
            OpCode::Rethrow => {
                let exception = frame.caught.last().copied().ok_or_else(|| {
                    EmulationError::InvalidBody(format!("rethrow outside of a catch handler in {}", frame.method))
                })?;
                return Err(self.raise(exception));
            }
            OpCode::Leave | OpCode::LeaveS => {
                let Operand::Target(target) = instruction.operand else {
                    return Err(invalid_operand(instruction));
                };
                let target = frame.target(target)?;
                return self.leave(frame, pc, target);
            }
            OpCode::Endfinally => return Ok(Flow::Exit(Exit::EndFinally)),
            OpCode::Endfilter => {
                let verdict = frame.pop()?.is_true();
                return Ok(Flow::Exit(Exit::EndFilter(verdict)));
            }
        }

        Ok(Flow::Next)
    }
}
