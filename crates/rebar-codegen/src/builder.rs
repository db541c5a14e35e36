//! Two-pass function assembler.
//!
//! Instructions are recorded in program order. Branches carry a placeholder
//! operand and a [`Label`]; static address loads carry the block index and a
//! [`StaticDataRef`]. [`FunctionBuilder::create_function`] then:
//!
//! 1. walks the instruction list once, summing encoded lengths to get each
//!    instruction's final byte offset (lengths are fixed at emission time);
//! 2. rewrites every branch operand with its label's final offset, and
//!    records the final offset of every static load on its block;
//! 3. lays out the frame by prefix-summing the declared local sizes;
//! 4. encodes, verifies and returns the [`Function`].
//!
//! Static addresses are left for the loader to patch, since they depend on
//! which other functions share the data segment.

use rebar_types::{
    verify, Function, Instruction, OpCode, Operand, StaticDataIdentifier, StaticDataInformation,
    MAX_LOCALS,
};

use crate::allocator::ValueSource;
use crate::error::{CodegenError, CodegenResult};

/// Forward reference to an instruction offset that is not yet known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(u32);

/// Handle to a static data block defined on a builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StaticDataRef(u32);

/// A static data block awaiting placement by the loader.
#[derive(Debug, Clone, Default)]
pub struct StaticDataBuilder {
    pub data: Vec<u8>,
    pub identifier: Option<StaticDataIdentifier>,
}

impl StaticDataBuilder {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            identifier: None,
        }
    }

    /// Tag the block so it can be read back after execution.
    pub fn with_identifier(mut self, identifier: StaticDataIdentifier) -> Self {
        self.identifier = Some(identifier);
        self
    }
}

/// Accumulates instructions for a single function.
#[derive(Debug, Default)]
pub struct FunctionBuilder {
    name: String,
    local_sizes: Vec<usize>,
    instructions: Vec<Instruction>,
    /// Label id → index of the instruction it precedes, once set.
    labels: Vec<Option<usize>>,
    /// (instruction index, target label) for every branch.
    branches: Vec<(usize, Label)>,
    static_data: Vec<StaticDataBuilder>,
    /// (instruction index, block) for every static address load.
    static_loads: Vec<(usize, StaticDataRef)>,
}

impl FunctionBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declare the frame: one size per local slot, in slot order.
    pub fn set_local_sizes(&mut self, sizes: impl Into<Vec<usize>>) {
        self.local_sizes = sizes.into();
    }

    pub fn local_sizes(&self) -> &[usize] {
        &self.local_sizes
    }

    /// Number of instructions emitted so far.
    pub fn instruction_count(&self) -> usize {
        self.instructions.len()
    }

    // ── Labels and static data ───────────────────────────────────────────

    pub fn create_label(&mut self) -> Label {
        let id = self.labels.len() as u32;
        self.labels.push(None);
        Label(id)
    }

    /// Bind `label` to the next instruction to be emitted.
    pub fn set_label(&mut self, label: Label) -> CodegenResult<()> {
        let position = self.instructions.len();
        let slot = self
            .labels
            .get_mut(label.0 as usize)
            .ok_or(CodegenError::UnknownHandle {
                kind: "label",
                index: label.0,
            })?;
        if slot.is_some() {
            return Err(CodegenError::LabelAlreadySet(label.0));
        }
        *slot = Some(position);
        Ok(())
    }

    pub fn define_static_data(&mut self, block: StaticDataBuilder) -> StaticDataRef {
        let id = self.static_data.len() as u32;
        self.static_data.push(block);
        StaticDataRef(id)
    }

    // ── Emission ─────────────────────────────────────────────────────────

    fn emit_standalone(&mut self, opcode: OpCode) {
        self.instructions.push(Instruction::standalone(opcode));
    }

    fn emit_branch_placeholder(&mut self, opcode: OpCode, target: Label) {
        self.branches.push((self.instructions.len(), target));
        self.instructions.push(Instruction {
            opcode,
            operand: Operand::CodeAddress(0),
        });
    }

    pub fn emit_return(&mut self) {
        self.emit_standalone(OpCode::Ret);
    }

    pub fn emit_branch(&mut self, target: Label) {
        self.emit_branch_placeholder(OpCode::Branch, target);
    }

    pub fn emit_branch_if_false(&mut self, target: Label) {
        self.emit_branch_placeholder(OpCode::BranchIfFalse, target);
    }

    pub fn emit_load_integer_immediate(&mut self, constant: i32) {
        self.instructions.push(Instruction {
            opcode: OpCode::LoadIntegerImmediate,
            operand: Operand::Immediate(constant),
        });
    }

    pub fn emit_load_local_address(&mut self, local_index: u8) {
        self.instructions.push(Instruction {
            opcode: OpCode::LoadLocalAddress,
            operand: Operand::Local(local_index),
        });
    }

    /// Push the address a value source stands for. Both slot allocations
    /// and constant references resolve to a frame slot address.
    pub fn emit_load_value_source_address(&mut self, source: ValueSource) {
        let index = match source {
            ValueSource::LocalAllocation { index, .. } => index,
            ValueSource::ConstantLocalReference { referenced_index } => referenced_index,
        };
        self.emit_load_local_address(index);
    }

    /// Push the address of a static block. The operand holds the block
    /// index until the loader patches in the real address.
    pub fn emit_load_static_data_address(&mut self, block: StaticDataRef) {
        self.static_loads.push((self.instructions.len(), block));
        self.instructions.push(Instruction {
            opcode: OpCode::LoadStaticAddress,
            operand: Operand::DataAddress(block.0 as i32),
        });
    }

    pub fn emit_store_integer(&mut self) {
        self.emit_standalone(OpCode::StoreInteger);
    }

    pub fn emit_store_pointer(&mut self) {
        self.emit_standalone(OpCode::StorePointer);
    }

    pub fn emit_deref_integer(&mut self) {
        self.emit_standalone(OpCode::DerefInteger);
    }

    pub fn emit_deref_pointer(&mut self) {
        self.emit_standalone(OpCode::DerefPointer);
    }

    pub fn emit_add(&mut self) {
        self.emit_standalone(OpCode::Add);
    }

    pub fn emit_subtract(&mut self) {
        self.emit_standalone(OpCode::Subtract);
    }

    pub fn emit_multiply(&mut self) {
        self.emit_standalone(OpCode::Multiply);
    }

    pub fn emit_divide(&mut self) {
        self.emit_standalone(OpCode::Divide);
    }

    pub fn emit_and(&mut self) {
        self.emit_standalone(OpCode::And);
    }

    pub fn emit_or(&mut self) {
        self.emit_standalone(OpCode::Or);
    }

    pub fn emit_xor(&mut self) {
        self.emit_standalone(OpCode::Xor);
    }

    pub fn emit_greater_than(&mut self) {
        self.emit_standalone(OpCode::Gt);
    }

    pub fn emit_greater_than_or_equal(&mut self) {
        self.emit_standalone(OpCode::Gte);
    }

    pub fn emit_less_than(&mut self) {
        self.emit_standalone(OpCode::Lt);
    }

    pub fn emit_less_than_or_equal(&mut self) {
        self.emit_standalone(OpCode::Lte);
    }

    pub fn emit_equals(&mut self) {
        self.emit_standalone(OpCode::Eq);
    }

    pub fn emit_not_equals(&mut self) {
        self.emit_standalone(OpCode::Neq);
    }

    pub fn emit_duplicate(&mut self) {
        self.emit_standalone(OpCode::Dup);
    }

    pub fn emit_swap(&mut self) {
        self.emit_standalone(OpCode::Swap);
    }

    pub fn emit_exchange_bytes(&mut self) {
        self.emit_standalone(OpCode::ExchangeBytes);
    }

    pub fn emit_alloc(&mut self) {
        self.emit_standalone(OpCode::Alloc);
    }

    pub fn emit_output_string(&mut self) {
        self.emit_standalone(OpCode::OutputString);
    }

    pub fn emit_copy_bytes(&mut self) {
        self.emit_standalone(OpCode::CopyBytes);
    }

    pub fn emit_output(&mut self) {
        self.emit_standalone(OpCode::Output);
    }

    // ── Assembly ─────────────────────────────────────────────────────────

    /// Resolve labels, lay out the frame and produce a verified [`Function`].
    pub fn create_function(&self) -> CodegenResult<Function> {
        // Pass 1: final byte offset of every instruction, plus one entry for
        // the end of the code so a trailing label resolves.
        let mut positions = Vec::with_capacity(self.instructions.len() + 1);
        let mut position = 0usize;
        for instruction in &self.instructions {
            positions.push(position);
            position += instruction.encoded_len();
        }
        positions.push(position);
        if i32::try_from(position).is_err() {
            return Err(CodegenError::LimitExceeded(format!(
                "{position} bytes of code do not fit a 32-bit branch operand"
            )));
        }

        // Pass 2: patch branch operands.
        let mut instructions = self.instructions.clone();
        for &(instruction_index, label) in &self.branches {
            let target = self
                .labels
                .get(label.0 as usize)
                .copied()
                .ok_or(CodegenError::UnknownHandle {
                    kind: "label",
                    index: label.0,
                })?
                .ok_or(CodegenError::UnsetLabel(label.0))?;
            instructions[instruction_index].operand = Operand::CodeAddress(positions[target] as i32);
        }

        let mut load_offsets = vec![Vec::new(); self.static_data.len()];
        for &(instruction_index, block) in &self.static_loads {
            load_offsets
                .get_mut(block.0 as usize)
                .ok_or(CodegenError::UnknownHandle {
                    kind: "static data",
                    index: block.0,
                })?
                .push(positions[instruction_index]);
        }

        let (local_offsets, local_size) = self.frame_layout()?;

        let mut code = Vec::with_capacity(position);
        for instruction in &instructions {
            instruction.encode_into(&mut code);
        }

        let static_data = self
            .static_data
            .iter()
            .zip(load_offsets)
            .map(|(block, offsets)| {
                StaticDataInformation::new(block.data.clone(), offsets, block.identifier.clone())
            })
            .collect();

        let function = Function::new(self.name.clone(), local_offsets, local_size, code, static_data);
        verify(&function)?;

        tracing::debug!(
            name = %self.name,
            code_len = function.code().len(),
            locals = self.local_sizes.len(),
            frame = local_size,
            static_blocks = self.static_data.len(),
            "function assembled"
        );
        Ok(function)
    }

    /// Prefix sums of the declared local sizes, and their total.
    fn frame_layout(&self) -> CodegenResult<(Vec<u32>, u32)> {
        if self.local_sizes.len() > MAX_LOCALS {
            return Err(CodegenError::LimitExceeded(format!(
                "{} locals declared, at most {MAX_LOCALS} are addressable",
                self.local_sizes.len()
            )));
        }
        let mut offsets = Vec::with_capacity(self.local_sizes.len());
        let mut offset: u32 = 0;
        for &size in &self.local_sizes {
            offsets.push(offset);
            offset = u32::try_from(size)
                .ok()
                .and_then(|size| offset.checked_add(size))
                .filter(|total| i32::try_from(*total).is_ok())
                .ok_or_else(|| {
                    CodegenError::LimitExceeded("frame larger than the 32-bit address space".into())
                })?;
        }
        Ok((offsets, offset))
    }
}
