//! The stack-machine dispatch loop.
//!
//! One invocation owns an operand stack of untyped `i32` words, a frame at
//! the start of the stack region and a bump pointer at the start of the heap
//! region. Nothing survives the invocation except what it wrote to memory.

use rebar_types::data::round_up_to_nearest;
use rebar_types::{BytecodeError, Function, Instruction, OpCode, Operand, WORD_SIZE};

use crate::error::{Trap, TrapKind};
use crate::memory::Memory;
use crate::runtime::RuntimeServices;

/// Counters reported by a successful invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionSummary {
    pub instructions_executed: u64,
    pub peak_stack_depth: usize,
    pub heap_bytes_allocated: usize,
}

enum Control {
    Next,
    Jump(usize),
    Return,
}

pub(crate) struct Interpreter<'a, R> {
    function: &'a Function,
    memory: &'a mut Memory,
    services: &'a mut R,
    instruction_limit: Option<u64>,
    stack: Vec<i32>,
    /// First free byte above the frame; `ExchangeBytes` scratch lives here.
    stack_top: usize,
    heap_pointer: usize,
    summary: ExecutionSummary,
}

impl<'a, R: RuntimeServices> Interpreter<'a, R> {
    pub(crate) fn new(
        function: &'a Function,
        memory: &'a mut Memory,
        services: &'a mut R,
        instruction_limit: Option<u64>,
    ) -> Self {
        let layout = memory.layout();
        Self {
            function,
            memory,
            services,
            instruction_limit,
            stack: Vec::new(),
            stack_top: layout.stack_start,
            heap_pointer: layout.heap_start,
            summary: ExecutionSummary::default(),
        }
    }

    pub(crate) fn run(mut self) -> Result<ExecutionSummary, Trap> {
        let layout = self.memory.layout();
        self.stack_top = layout
            .stack_start
            .checked_add(self.function.local_size() as usize)
            .filter(|&top| top <= layout.heap_start)
            .ok_or(Trap {
                kind: TrapKind::StackOverflow,
                ip: 0,
            })?;

        let function = self.function;
        let code = function.code();
        let mut ip = 0usize;
        loop {
            if let Some(limit) = self.instruction_limit {
                if self.summary.instructions_executed >= limit {
                    return Err(Trap {
                        kind: TrapKind::InstructionLimitExceeded,
                        ip,
                    });
                }
            }
            let instruction = Instruction::decode_at(code, ip).map_err(|error| Trap {
                kind: decode_trap(error),
                ip,
            })?;
            self.summary.instructions_executed += 1;
            tracing::trace!(ip, %instruction, depth = self.stack.len(), "dispatch");

            match self.step(instruction) {
                Ok(Control::Next) => ip += instruction.encoded_len(),
                Ok(Control::Jump(target)) => ip = target,
                Ok(Control::Return) => return Ok(self.summary),
                Err(kind) => return Err(Trap { kind, ip }),
            }
        }
    }

    fn step(&mut self, instruction: Instruction) -> Result<Control, TrapKind> {
        match (instruction.opcode, instruction.operand) {
            (OpCode::Ret, _) => return Ok(Control::Return),
            (OpCode::Branch, Operand::CodeAddress(target)) => return jump(target),
            (OpCode::BranchIfFalse, Operand::CodeAddress(target)) => {
                if self.pop()? == 0 {
                    return jump(target);
                }
            }
            (OpCode::LoadIntegerImmediate, Operand::Immediate(value)) => self.push(value),
            (OpCode::LoadLocalAddress, Operand::Local(index)) => {
                let offset = self
                    .function
                    .local_offsets()
                    .get(index as usize)
                    .copied()
                    .ok_or(TrapKind::InvalidLocal(index))?;
                let address = address_word(self.memory.layout().stack_start + offset as usize);
                self.push(address);
            }
            (OpCode::LoadStaticAddress, Operand::DataAddress(address)) => self.push(address),
            (OpCode::StoreInteger | OpCode::StorePointer, _) => {
                let value = self.pop()?;
                let address = self.pop()?;
                self.memory.store_word(address, value)?;
            }
            (OpCode::DerefInteger | OpCode::DerefPointer, _) => {
                let address = self.pop()?;
                let value = self.memory.load_word(address)?;
                self.push(value);
            }
            (
                OpCode::Add
                | OpCode::Subtract
                | OpCode::Multiply
                | OpCode::Divide
                | OpCode::And
                | OpCode::Or
                | OpCode::Xor,
                _,
            ) => {
                let rhs = self.pop()?;
                let lhs = self.pop()?;
                self.push(arithmetic(instruction.opcode, lhs, rhs)?);
            }
            (
                OpCode::Gt | OpCode::Gte | OpCode::Lt | OpCode::Lte | OpCode::Eq | OpCode::Neq,
                _,
            ) => {
                let rhs = self.pop()?;
                let lhs = self.pop()?;
                let holds = match instruction.opcode {
                    OpCode::Gt => lhs > rhs,
                    OpCode::Gte => lhs >= rhs,
                    OpCode::Lt => lhs < rhs,
                    OpCode::Lte => lhs <= rhs,
                    OpCode::Eq => lhs == rhs,
                    _ => lhs != rhs,
                };
                self.push(i32::from(holds));
            }
            (OpCode::Dup, _) => {
                let value = self.pop()?;
                self.push(value);
                self.push(value);
            }
            (OpCode::Swap, _) => {
                let a = self.pop()?;
                let b = self.pop()?;
                self.push(a);
                self.push(b);
            }
            (OpCode::ExchangeBytes, _) => {
                let size = self.pop()?;
                let first = self.pop()?;
                let second = self.pop()?;
                self.exchange_bytes(first, second, size)?;
            }
            (OpCode::Alloc, _) => {
                let size = self.pop()?;
                let address = self.alloc(size)?;
                self.push(address);
            }
            (OpCode::OutputString, _) => {
                let size = self.pop()?;
                let address = self.pop()?;
                let text = std::str::from_utf8(self.memory.slice(address, size)?)
                    .map_err(|_| TrapKind::InvalidUtf8)?;
                self.services.output(text);
            }
            (OpCode::CopyBytes, _) => {
                let size = self.pop()?;
                let to = self.pop()?;
                let from = self.pop()?;
                self.memory.copy(from, to, size)?;
            }
            (OpCode::Output, _) => {
                let value = self.pop()?;
                self.services.output(&value.to_string());
            }
            // The decoder pairs every opcode with its own operand kind.
            (_, _) => return Err(TrapKind::InvalidOpcode(instruction.opcode.byte())),
        }
        Ok(Control::Next)
    }

    fn push(&mut self, value: i32) {
        self.stack.push(value);
        self.summary.peak_stack_depth = self.summary.peak_stack_depth.max(self.stack.len());
    }

    fn pop(&mut self) -> Result<i32, TrapKind> {
        self.stack.pop().ok_or(TrapKind::OperandStackUnderflow)
    }

    /// Swap two equal-sized regions through scratch space above the frame.
    fn exchange_bytes(&mut self, first: i32, second: i32, size: i32) -> Result<(), TrapKind> {
        self.memory.slice(first, size)?;
        self.memory.slice(second, size)?;
        let scratch_end = self.stack_top + size as usize;
        if scratch_end > self.memory.layout().heap_start {
            return Err(TrapKind::StackOverflow);
        }
        let scratch = address_word(self.stack_top);
        self.memory.copy(first, scratch, size)?;
        self.memory.copy(second, first, size)?;
        self.memory.copy(scratch, second, size)?;
        Ok(())
    }

    fn alloc(&mut self, size: i32) -> Result<i32, TrapKind> {
        let address = address_word(self.heap_pointer);
        // Non-positive sizes still take one word.
        let requested = usize::try_from(size.max(1)).unwrap_or(1);
        let rounded = round_up_to_nearest(requested, WORD_SIZE);
        let end = self.heap_pointer + rounded;
        if end > self.memory.layout().end {
            return Err(TrapKind::HeapExhausted);
        }
        tracing::trace!(address, size = rounded, "heap allocation");
        self.heap_pointer = end;
        self.summary.heap_bytes_allocated += rounded;
        Ok(address)
    }
}

fn jump(target: i32) -> Result<Control, TrapKind> {
    usize::try_from(target)
        .map(Control::Jump)
        .map_err(|_| TrapKind::CodeOutOfBounds)
}

/// Images never exceed `i32::MAX` bytes, so every in-image offset fits.
fn address_word(offset: usize) -> i32 {
    i32::try_from(offset).unwrap_or(i32::MAX)
}

fn arithmetic(opcode: OpCode, lhs: i32, rhs: i32) -> Result<i32, TrapKind> {
    Ok(match opcode {
        OpCode::Add => lhs.wrapping_add(rhs),
        OpCode::Subtract => lhs.wrapping_sub(rhs),
        OpCode::Multiply => lhs.wrapping_mul(rhs),
        OpCode::Divide => {
            if rhs == 0 {
                return Err(TrapKind::DivideByZero);
            }
            lhs.checked_div(rhs).ok_or(TrapKind::ArithmeticOverflow)?
        }
        OpCode::And => lhs & rhs,
        OpCode::Or => lhs | rhs,
        _ => lhs ^ rhs,
    })
}

fn decode_trap(error: BytecodeError) -> TrapKind {
    match error {
        BytecodeError::InvalidOpcode { byte, .. } => TrapKind::InvalidOpcode(byte),
        _ => TrapKind::CodeOutOfBounds,
    }
}
