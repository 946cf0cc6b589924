//! Method body model: local slots, the instruction sequence and exception regions.
//!
//! A [`MethodBody`] owns the id allocator for its instructions. Ids are never reused,
//! which lets the weaver clear a body and regenerate it while previously handed out
//! ids stay unambiguous.
//!
//! The body also knows how to check itself: [`MethodBody::validate`] enforces the
//! structural invariants of loadable IL (targets exist, slot indices are in range,
//! regions are well-formed and correctly nested, control cannot fall off the end) and
//! [`MethodBody::compute_max_stack`] simulates stack depth over all control flow paths.

use std::{collections::HashMap, fmt};

use crate::{
    assembly::{FlowType, InstrId, Instruction, OpCode, Operand, StackBehavior},
    metadata::{
        method::exceptions::{ExceptionRegion, HandlerKind, RegionEnd, RegionSpan},
        signatures::TypeSignature,
        token::Token,
    },
    Error, Result,
};

/// Supplies the stack effect of signature-dependent instructions.
///
/// Implemented by [`crate::metadata::module::Module`], which can look up the signature
/// behind a method token.
pub trait StackEffects {
    /// Stack effect of `call`, `callvirt` or `newobj` on `method`
    fn call_behavior(&self, opcode: OpCode, method: Token) -> Option<StackBehavior>;
}

/// The body of a method with IL code.
#[derive(Debug, Clone)]
pub struct MethodBody {
    /// Maximum evaluation stack depth
    pub max_stack: u16,
    /// Zero-initialize locals on entry
    pub init_locals: bool,
    /// Local variable slots in declaration order
    pub locals: Vec<TypeSignature>,
    instructions: Vec<Instruction>,
    regions: Vec<ExceptionRegion>,
    next_id: u32,
}

impl Default for MethodBody {
    fn default() -> Self {
        Self::new()
    }
}

impl MethodBody {
    /// Creates an empty body with `init_locals` set
    #[must_use]
    pub fn new() -> Self {
        MethodBody {
            max_stack: 8,
            init_locals: true,
            locals: Vec::new(),
            instructions: Vec::new(),
            regions: Vec::new(),
            next_id: 0,
        }
    }

    /// Instructions in execution order
    #[must_use]
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Mutable access to the instruction sequence
    pub fn instructions_mut(&mut self) -> &mut [Instruction] {
        &mut self.instructions
    }

    /// Exception regions, inner regions first
    #[must_use]
    pub fn regions(&self) -> &[ExceptionRegion] {
        &self.regions
    }

    /// True if the body holds no instructions
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Number of instructions
    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Drops instructions, locals and regions. Id allocation continues where it was.
    pub fn clear(&mut self) {
        self.instructions.clear();
        self.regions.clear();
        self.locals.clear();
    }

    /// Reserves a fresh instruction id
    pub fn allocate_id(&mut self) -> InstrId {
        let id = InstrId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Appends an instruction that already carries an id from [`MethodBody::allocate_id`]
    pub fn push(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    /// Appends a new instruction and returns its id
    pub fn emit(&mut self, opcode: OpCode, operand: Operand) -> InstrId {
        let id = self.allocate_id();
        self.instructions.push(Instruction {
            id,
            opcode,
            operand,
        });
        id
    }

    /// Adds a local variable slot and returns its index
    ///
    /// # Errors
    ///
    /// Returns an error if the body already has 65535 locals.
    pub fn add_local(&mut self, signature: TypeSignature) -> Result<u16> {
        let index = u16::try_from(self.locals.len())
            .map_err(|_| malformed_error!("Too many local variables"))?;
        if index == u16::MAX {
            return Err(malformed_error!("Too many local variables"));
        }
        self.locals.push(signature);
        Ok(index)
    }

    /// Adds an exception region after checking that its markers belong to this body
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRegion`] if a marker is missing or the blocks are empty
    /// or out of order.
    pub fn add_region(&mut self, region: ExceptionRegion) -> Result<()> {
        let positions = self.position_map();
        resolve_region(&region, 0, &positions, self.instructions.len())?;
        self.regions.push(region);
        Ok(())
    }

    /// Replaces the region table without validation, used when copying bodies
    pub fn set_regions(&mut self, regions: Vec<ExceptionRegion>) {
        self.regions = regions;
    }

    /// Position of the instruction with the given id
    #[must_use]
    pub fn position(&self, id: InstrId) -> Option<usize> {
        self.instructions.iter().position(|instr| instr.id == id)
    }

    /// Map from instruction id to position
    #[must_use]
    pub fn position_map(&self) -> HashMap<InstrId, usize> {
        self.instructions
            .iter()
            .enumerate()
            .map(|(position, instr)| (instr.id, position))
            .collect()
    }

    /// Resolves every region to instruction positions
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRegion`] for regions with missing markers, empty or
    /// inverted blocks, or a try block overlapping its own handler.
    pub fn region_table(&self) -> Result<Vec<RegionSpan>> {
        let positions = self.position_map();
        self.regions
            .iter()
            .enumerate()
            .map(|(index, region)| {
                resolve_region(region, index, &positions, self.instructions.len())
            })
            .collect()
    }

    /// Checks the structural invariants of the body
    ///
    /// # Arguments
    ///
    /// * `arg_count` - Number of IL arguments of the method, including `this`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`] for operand kind mismatches, missing branch targets,
    /// out of range slots or fall-through past the last instruction, and
    /// [`Error::InvalidRegion`] for bad region tables.
    pub fn validate(&self, arg_count: usize) -> Result<()> {
        let Some(last) = self.instructions.last() else {
            return Err(malformed_error!("Method body has no instructions"));
        };

        let positions = self.position_map();
        if positions.len() != self.instructions.len() {
            return Err(malformed_error!("Duplicate instruction ids"));
        }

        for instr in &self.instructions {
            if !instr.operand.matches(instr.opcode.operand_type()) {
                return Err(malformed_error!(
                    "{} has an operand of the wrong kind",
                    instr
                ));
            }

            for target in instr.operand.targets() {
                if !positions.contains_key(target) {
                    return Err(malformed_error!(
                        "{} branches to missing instruction {}",
                        instr,
                        target
                    ));
                }
            }

            if let Some(local) = local_index(instr) {
                if usize::from(local) >= self.locals.len() {
                    return Err(malformed_error!(
                        "{} uses local {} of {}",
                        instr,
                        local,
                        self.locals.len()
                    ));
                }
            }

            if let Some(arg) = arg_index(instr) {
                if usize::from(arg) >= arg_count {
                    return Err(malformed_error!(
                        "{} uses argument {} of {}",
                        instr,
                        arg,
                        arg_count
                    ));
                }
            }
        }

        if !last.flow_type().is_terminal() {
            return Err(malformed_error!("Control falls through past {}", last));
        }

        let spans = self.region_table()?;
        check_nesting(&spans)
    }

    /// Computes the maximum evaluation stack depth over every control flow path
    ///
    /// # Arguments
    ///
    /// * `effects` - Source of the stack effect of calls
    /// * `returns_value` - True if the method returns a value
    ///
    /// # Errors
    ///
    /// Returns [`Error::StackImbalance`] on underflow, on a merge point reached with
    /// different depths, or on a `ret` with extra values on the stack. Returns
    /// [`Error::Malformed`] for unknown call targets or missing branch targets.
    pub fn compute_max_stack(&self, effects: &dyn StackEffects, returns_value: bool) -> Result<u16> {
        let positions = self.position_map();
        let spans = self.region_table()?;

        let mut depth_at: Vec<Option<u32>> = vec![None; self.instructions.len()];
        let mut worklist: Vec<(usize, u32)> = Vec::new();

        if !self.instructions.is_empty() {
            worklist.push((0, 0));
        }
        for span in &spans {
            let region = &self.regions[span.index];
            let entry = match region.kind {
                HandlerKind::Catch(_) | HandlerKind::Filter { .. } => 1,
                HandlerKind::Finally | HandlerKind::Fault => 0,
            };
            worklist.push((span.handler_range.start, entry));
            if let Some(filter) = span.filter_start {
                worklist.push((filter, 1));
            }
        }

        let mut max_depth = 0u32;
        while let Some((position, depth)) = worklist.pop() {
            let Some(instr) = self.instructions.get(position) else {
                return Err(malformed_error!("Control falls through past the last instruction"));
            };

            match depth_at[position] {
                Some(known) if known == depth => continue,
                Some(known) => {
                    return Err(Error::StackImbalance {
                        at: instr.id,
                        message: format!("reached with depth {depth} and {known}"),
                    })
                }
                None => depth_at[position] = Some(depth),
            }

            let behavior = match instr.opcode {
                OpCode::Ret => StackBehavior {
                    pops: u8::from(returns_value),
                    pushes: 0,
                },
                OpCode::Call | OpCode::Callvirt | OpCode::Newobj => {
                    let Operand::Method(token) = instr.operand else {
                        return Err(malformed_error!("{} has no method operand", instr));
                    };
                    effects
                        .call_behavior(instr.opcode, token)
                        .ok_or_else(|| malformed_error!("Unknown call target in {}", instr))?
                }
                opcode => opcode
                    .stack_behavior()
                    .ok_or_else(|| malformed_error!("No stack behavior for {}", instr))?,
            };

            let pops = u32::from(behavior.pops);
            if depth < pops {
                return Err(Error::StackImbalance {
                    at: instr.id,
                    message: format!("pops {pops} with only {depth} on the stack"),
                });
            }
            let after = depth - pops + u32::from(behavior.pushes);
            max_depth = max_depth.max(after).max(depth);

            let target_position = |target: &InstrId| -> Result<usize> {
                positions
                    .get(target)
                    .copied()
                    .ok_or_else(|| malformed_error!("{} branches to missing {}", instr, target))
            };

            match instr.flow_type() {
                FlowType::Sequential | FlowType::Call => worklist.push((position + 1, after)),
                FlowType::ConditionalBranch | FlowType::Switch => {
                    for target in instr.operand.targets() {
                        worklist.push((target_position(target)?, after));
                    }
                    worklist.push((position + 1, after));
                }
                FlowType::UnconditionalBranch => {
                    for target in instr.operand.targets() {
                        worklist.push((target_position(target)?, after));
                    }
                }
                FlowType::Leave => {
                    for target in instr.operand.targets() {
                        worklist.push((target_position(target)?, 0));
                    }
                }
                FlowType::Return => {
                    if after != 0 {
                        return Err(Error::StackImbalance {
                            at: instr.id,
                            message: format!("returns with {after} extra value(s)"),
                        });
                    }
                }
                FlowType::Throw | FlowType::EndFinally => {}
            }
        }

        u16::try_from(max_depth).map_err(|_| malformed_error!("Stack depth {} too large", max_depth))
    }
}

impl fmt::Display for MethodBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, ".maxstack {}", self.max_stack)?;
        if !self.locals.is_empty() {
            f.write_str(".locals")?;
            if self.init_locals {
                f.write_str(" init")?;
            }
            f.write_str(" (")?;
            for (i, local) in self.locals.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{local} V_{i}")?;
            }
            writeln!(f, ")")?;
        }
        for instr in &self.instructions {
            writeln!(f, "{instr}")?;
        }
        for region in &self.regions {
            let end = |end: RegionEnd| match end {
                RegionEnd::At(id) => id.to_string(),
                RegionEnd::EndOfBody => "end".to_string(),
            };
            let handler = match &region.kind {
                HandlerKind::Catch(ty) => format!("catch {ty}"),
                HandlerKind::Filter { filter_start } => format!("filter {filter_start}"),
                HandlerKind::Finally => "finally".to_string(),
                HandlerKind::Fault => "fault".to_string(),
            };
            writeln!(
                f,
                ".try {} to {} {} handler {} to {}",
                region.try_start,
                end(region.try_end),
                handler,
                region.handler_start,
                end(region.handler_end)
            )?;
        }
        Ok(())
    }
}

/// Local slot used by a load or store instruction
fn local_index(instr: &Instruction) -> Option<u16> {
    match instr.opcode {
        OpCode::Ldloc0 | OpCode::Stloc0 => Some(0),
        OpCode::Ldloc1 | OpCode::Stloc1 => Some(1),
        OpCode::Ldloc2 | OpCode::Stloc2 => Some(2),
        OpCode::Ldloc3 | OpCode::Stloc3 => Some(3),
        _ => match instr.operand {
            Operand::Local(index) => Some(index),
            _ => None,
        },
    }
}

/// Argument slot used by a load or store instruction
fn arg_index(instr: &Instruction) -> Option<u16> {
    match instr.opcode {
        OpCode::Ldarg0 => Some(0),
        OpCode::Ldarg1 => Some(1),
        OpCode::Ldarg2 => Some(2),
        OpCode::Ldarg3 => Some(3),
        _ => match instr.operand {
            Operand::Argument(index) => Some(index),
            _ => None,
        },
    }
}

fn resolve_region(
    region: &ExceptionRegion,
    index: usize,
    positions: &HashMap<InstrId, usize>,
    len: usize,
) -> Result<RegionSpan> {
    let start = |id: InstrId| -> Result<usize> {
        positions
            .get(&id)
            .copied()
            .ok_or_else(|| Error::InvalidRegion(format!("marker {id} is not part of the body")))
    };
    let end = |end: RegionEnd| -> Result<usize> {
        match end {
            RegionEnd::At(id) => start(id),
            RegionEnd::EndOfBody => Ok(len),
        }
    };

    let try_range = start(region.try_start)?..end(region.try_end)?;
    let handler_range = start(region.handler_start)?..end(region.handler_end)?;
    let filter_start = match region.kind {
        HandlerKind::Filter { filter_start } => Some(start(filter_start)?),
        _ => None,
    };

    if try_range.is_empty() {
        return Err(Error::InvalidRegion(format!(
            "region {index} has an empty try block"
        )));
    }
    if handler_range.is_empty() {
        return Err(Error::InvalidRegion(format!(
            "region {index} has an empty handler block"
        )));
    }

    let handler_block_start = filter_start.unwrap_or(handler_range.start);
    if let Some(filter) = filter_start {
        if filter >= handler_range.start {
            return Err(Error::InvalidRegion(format!(
                "region {index} filter does not precede its handler"
            )));
        }
    }
    let overlaps = try_range.start < handler_range.end && handler_block_start < try_range.end;
    if overlaps {
        return Err(Error::InvalidRegion(format!(
            "region {index} try block overlaps its handler"
        )));
    }

    Ok(RegionSpan {
        index,
        try_range,
        handler_range,
        filter_start,
    })
}

/// Try blocks must be disjoint, identical, or nested, with inner regions listed first
fn check_nesting(spans: &[RegionSpan]) -> Result<()> {
    for (i, outer) in spans.iter().enumerate() {
        for inner in &spans[i + 1..] {
            let a = &outer.try_range;
            let b = &inner.try_range;
            let disjoint = a.end <= b.start || b.end <= a.start;
            let same = a == b;
            let b_in_a = a.start <= b.start && b.end <= a.end;
            let a_in_b = b.start <= a.start && a.end <= b.end;

            if disjoint || same || a_in_b {
                continue;
            }
            if b_in_a {
                return Err(Error::InvalidRegion(format!(
                    "region {} is nested in region {} but listed after it",
                    inner.index, outer.index
                )));
            }
            return Err(Error::InvalidRegion(format!(
                "regions {} and {} partially overlap",
                outer.index, inner.index
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoCalls;

    impl StackEffects for NoCalls {
        fn call_behavior(&self, _opcode: OpCode, _method: Token) -> Option<StackBehavior> {
            None
        }
    }

    struct OneArgCall;

    impl StackEffects for OneArgCall {
        fn call_behavior(&self, _opcode: OpCode, _method: Token) -> Option<StackBehavior> {
            Some(StackBehavior { pops: 1, pushes: 0 })
        }
    }

    fn add_body() -> MethodBody {
        let mut body = MethodBody::new();
        body.emit(OpCode::Ldarg0, Operand::None);
        body.emit(OpCode::Ldarg1, Operand::None);
        body.emit(OpCode::Add, Operand::None);
        body.emit(OpCode::Ret, Operand::None);
        body
    }

    #[test]
    fn test_ids_are_not_reused_after_clear() {
        let mut body = add_body();
        let before = body.instructions().last().unwrap().id;
        body.clear();
        assert!(body.is_empty());
        let after = body.emit(OpCode::Ret, Operand::None);
        assert!(after > before);
    }

    #[test]
    fn test_validate_accepts_simple_body() {
        let body = add_body();
        body.validate(2).unwrap();
        assert_eq!(body.compute_max_stack(&NoCalls, true).unwrap(), 2);
    }

    #[test]
    fn test_validate_rejects_argument_out_of_range() {
        let body = add_body();
        assert!(matches!(body.validate(1), Err(Error::Malformed { .. })));
    }

    #[test]
    fn test_validate_rejects_missing_target() {
        let mut body = MethodBody::new();
        body.emit(OpCode::Br, Operand::Target(InstrId(40)));
        assert!(matches!(body.validate(0), Err(Error::Malformed { .. })));
    }

    #[test]
    fn test_validate_rejects_fall_through() {
        let mut body = MethodBody::new();
        body.emit(OpCode::Nop, Operand::None);
        assert!(body.validate(0).is_err());
    }

    #[test]
    fn test_validate_rejects_wrong_operand_kind() {
        let mut body = MethodBody::new();
        body.emit(OpCode::Ldstr, Operand::Int32(4));
        body.emit(OpCode::Ret, Operand::None);
        assert!(body.validate(0).is_err());
    }

    #[test]
    fn test_local_range() {
        let mut body = MethodBody::new();
        body.emit(OpCode::Ldloc0, Operand::None);
        body.emit(OpCode::Ret, Operand::None);
        assert!(body.validate(0).is_err());
        body.add_local(TypeSignature::I4).unwrap();
        body.validate(0).unwrap();
    }

    #[test]
    fn test_add_region_rejects_foreign_markers() {
        let mut body = add_body();
        let region = ExceptionRegion::finally(InstrId(0), InstrId(1), InstrId(77), RegionEnd::EndOfBody);
        assert!(matches!(body.add_region(region), Err(Error::InvalidRegion(_))));
        assert!(body.regions().is_empty());
    }

    fn try_finally_body() -> (MethodBody, InstrId, InstrId, InstrId) {
        let mut body = MethodBody::new();
        let try_start = body.emit(OpCode::Nop, Operand::None);
        let tail = body.allocate_id();
        body.emit(OpCode::Leave, Operand::Target(tail));
        let finally_start = body.emit(OpCode::Nop, Operand::None);
        body.emit(OpCode::Endfinally, Operand::None);
        body.push(Instruction {
            id: tail,
            opcode: OpCode::Ret,
            operand: Operand::None,
        });
        (body, try_start, finally_start, tail)
    }

    #[test]
    fn test_try_finally_validates() {
        let (mut body, try_start, finally_start, tail) = try_finally_body();
        body.add_region(ExceptionRegion::finally(
            try_start,
            finally_start,
            finally_start,
            RegionEnd::At(tail),
        ))
        .unwrap();
        body.validate(0).unwrap();
        assert_eq!(body.compute_max_stack(&NoCalls, false).unwrap(), 0);

        let spans = body.region_table().unwrap();
        assert_eq!(spans[0].try_range, 0..2);
        assert_eq!(spans[0].handler_range, 2..4);
    }

    #[test]
    fn test_overlapping_try_and_handler_rejected() {
        let (mut body, try_start, _, tail) = try_finally_body();
        let region = ExceptionRegion::finally(try_start, tail, try_start, RegionEnd::At(tail));
        assert!(body.add_region(region).is_err());
    }

    #[test]
    fn test_inner_region_must_come_first() {
        let mut body = MethodBody::new();
        let ids: Vec<InstrId> = (0..6).map(|_| body.emit(OpCode::Nop, Operand::None)).collect();
        body.emit(OpCode::Ret, Operand::None);

        body.add_region(ExceptionRegion::finally(ids[0], ids[4], ids[4], RegionEnd::At(ids[5])))
            .unwrap();
        body.add_region(ExceptionRegion::fault(ids[1], ids[2], ids[2], RegionEnd::At(ids[3])))
            .unwrap();
        assert!(matches!(body.validate(0), Err(Error::InvalidRegion(_))));
    }

    #[test]
    fn test_stack_underflow_detected() {
        let mut body = MethodBody::new();
        body.emit(OpCode::Pop, Operand::None);
        body.emit(OpCode::Ret, Operand::None);
        assert!(matches!(
            body.compute_max_stack(&NoCalls, false),
            Err(Error::StackImbalance { .. })
        ));
    }

    #[test]
    fn test_extra_values_at_return_detected() {
        let mut body = MethodBody::new();
        body.emit(OpCode::Ldnull, Operand::None);
        body.emit(OpCode::Ldnull, Operand::None);
        body.emit(OpCode::Ret, Operand::None);
        assert!(body.compute_max_stack(&NoCalls, true).is_err());
    }

    #[test]
    fn test_inconsistent_merge_detected() {
        let mut body = MethodBody::new();
        body.emit(OpCode::LdcI40, Operand::None);
        let join = body.allocate_id();
        body.emit(OpCode::Brtrue, Operand::Target(join));
        body.emit(OpCode::Ldnull, Operand::None);
        body.push(Instruction {
            id: join,
            opcode: OpCode::Ret,
            operand: Operand::None,
        });
        assert!(matches!(
            body.compute_max_stack(&NoCalls, false),
            Err(Error::StackImbalance { .. })
        ));
    }

    #[test]
    fn test_call_effects_are_consulted() {
        let mut body = MethodBody::new();
        body.emit(OpCode::Ldnull, Operand::None);
        body.emit(OpCode::Call, Operand::Method(Token(0x0A000001)));
        body.emit(OpCode::Ret, Operand::None);
        assert_eq!(body.compute_max_stack(&OneArgCall, false).unwrap(), 1);
        assert!(body.compute_max_stack(&NoCalls, false).is_err());
    }

    #[test]
    fn test_display_lists_regions() {
        let (mut body, try_start, finally_start, tail) = try_finally_body();
        body.add_region(ExceptionRegion::finally(
            try_start,
            finally_start,
            finally_start,
            RegionEnd::At(tail),
        ))
        .unwrap();
        let listing = body.to_string();
        assert!(listing.contains("endfinally"));
        assert!(listing.contains("finally handler"));
    }
}
