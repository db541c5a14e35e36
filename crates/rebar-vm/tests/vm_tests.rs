//! Integration tests for the Rebar loader and interpreter.
//!
//! Programs are assembled with the real `FunctionBuilder`, loaded into an
//! `ExecutionContext` with a `BufferedOutput` hook, and checked by their
//! output, their traps and the static data they leave behind.

use proptest::prelude::*;
use rebar_codegen::{FunctionBuilder, StaticDataBuilder};
use rebar_types::{Function, Instruction, Operand, StaticDataIdentifier};
use rebar_vm::{
    BufferedOutput, ExecutionContext, ExecutionSummary, LoadPhase, Loader, TrapKind, VmConfig,
    VmError, VmResult,
};

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

/// Finalized context holding `functions`.
fn context_with(functions: impl IntoIterator<Item = Function>) -> ExecutionContext<BufferedOutput> {
    let mut context = ExecutionContext::new(BufferedOutput::new());
    for function in functions {
        context.load_function(function).unwrap();
    }
    context.finalize_load().unwrap();
    context
}

/// Build, load and run a single function named by its builder.
fn run(builder: FunctionBuilder) -> (VmResult<ExecutionSummary>, Vec<String>) {
    let name = builder.name().to_owned();
    let mut context = context_with([builder.create_function().unwrap()]);
    let result = context.execute_function_top_level(&name);
    (result, context.into_runtime_services().take_lines())
}

/// Output lines of a run that must succeed.
fn output_of(builder: FunctionBuilder) -> Vec<String> {
    let (result, lines) = run(builder);
    result.unwrap_or_else(|e| panic!("execution failed: {e}"));
    lines
}

/// `(kind, ip)` of a run that must trap.
fn trap_of(builder: FunctionBuilder) -> (TrapKind, usize) {
    match run(builder).0 {
        Err(VmError::Trap(trap)) => (trap.kind, trap.ip),
        other => panic!("expected a trap, got {other:?}"),
    }
}

/// A function that prints its single static string block.
fn greeter(name: &str, text: &str, identifier: &StaticDataIdentifier) -> Function {
    let mut b = FunctionBuilder::new(name);
    let block = b.define_static_data(
        StaticDataBuilder::new(text.as_bytes().to_vec()).with_identifier(identifier.clone()),
    );
    b.emit_load_static_data_address(block);
    b.emit_load_integer_immediate(text.len() as i32);
    b.emit_output_string();
    b.emit_return();
    b.create_function().unwrap()
}

// ══════════════════════════════════════════════════════════════════════════════
// Arithmetic and output
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn add_and_output() {
    let mut b = FunctionBuilder::new("main");
    b.emit_load_integer_immediate(3);
    b.emit_load_integer_immediate(4);
    b.emit_add();
    b.emit_output();
    b.emit_return();

    let (result, lines) = run(b);
    assert_eq!(lines, vec!["7"]);
    assert_eq!(
        result.unwrap(),
        ExecutionSummary {
            instructions_executed: 5,
            peak_stack_depth: 2,
            heap_bytes_allocated: 0,
        }
    );
}

#[test]
fn operand_order_for_binary_operators() {
    let mut b = FunctionBuilder::new("main");
    for emit in [
        FunctionBuilder::emit_subtract,
        FunctionBuilder::emit_divide,
        FunctionBuilder::emit_less_than,
        FunctionBuilder::emit_greater_than_or_equal,
        FunctionBuilder::emit_not_equals,
    ] {
        b.emit_load_integer_immediate(10);
        b.emit_load_integer_immediate(3);
        emit(&mut b);
        b.emit_output();
    }
    b.emit_return();
    assert_eq!(output_of(b), vec!["7", "3", "0", "1", "1"]);
}

#[test]
fn swap_and_duplicate() {
    let mut b = FunctionBuilder::new("main");
    b.emit_load_integer_immediate(2);
    b.emit_load_integer_immediate(5);
    b.emit_swap();
    b.emit_subtract(); // 5 - 2
    b.emit_duplicate();
    b.emit_multiply();
    b.emit_output();
    b.emit_return();
    assert_eq!(output_of(b), vec!["9"]);
}

#[test]
fn negative_numbers_print_in_decimal() {
    let mut b = FunctionBuilder::new("main");
    b.emit_load_integer_immediate(i32::MIN);
    b.emit_output();
    b.emit_load_integer_immediate(i32::MAX);
    b.emit_load_integer_immediate(1);
    b.emit_add();
    b.emit_output();
    b.emit_return();
    assert_eq!(output_of(b), vec!["-2147483648", "-2147483648"]);
}

proptest! {
    #[test]
    fn add_wraps_like_i32(a in any::<i32>(), c in any::<i32>()) {
        let mut b = FunctionBuilder::new("main");
        b.emit_load_integer_immediate(a);
        b.emit_load_integer_immediate(c);
        b.emit_add();
        b.emit_output();
        b.emit_return();
        prop_assert_eq!(output_of(b), vec![a.wrapping_add(c).to_string()]);
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Locals and control flow
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn store_and_deref_local() {
    let mut b = FunctionBuilder::new("main");
    b.set_local_sizes(vec![4]);
    b.emit_load_local_address(0);
    b.emit_load_integer_immediate(42);
    b.emit_store_integer();
    b.emit_load_local_address(0);
    b.emit_deref_integer();
    b.emit_output();
    b.emit_return();
    assert_eq!(output_of(b), vec!["42"]);
}

#[test]
fn pointer_stored_in_a_local() {
    // p = &x; *p = 9; print x
    let mut b = FunctionBuilder::new("main");
    b.set_local_sizes(vec![4, 4]);
    b.emit_load_local_address(1);
    b.emit_load_local_address(0);
    b.emit_store_pointer();
    b.emit_load_local_address(1);
    b.emit_deref_pointer();
    b.emit_load_integer_immediate(9);
    b.emit_store_integer();
    b.emit_load_local_address(0);
    b.emit_deref_integer();
    b.emit_output();
    b.emit_return();
    assert_eq!(output_of(b), vec!["9"]);
}

#[test]
fn countdown_loop() {
    let mut b = FunctionBuilder::new("main");
    b.set_local_sizes(vec![4]);
    let head = b.create_label();
    let exit = b.create_label();

    b.emit_load_local_address(0);
    b.emit_load_integer_immediate(3);
    b.emit_store_integer();

    b.set_label(head).unwrap();
    b.emit_load_local_address(0);
    b.emit_deref_integer();
    b.emit_branch_if_false(exit);

    b.emit_load_local_address(0);
    b.emit_deref_integer();
    b.emit_output();

    b.emit_load_local_address(0);
    b.emit_load_local_address(0);
    b.emit_deref_integer();
    b.emit_load_integer_immediate(1);
    b.emit_subtract();
    b.emit_store_integer();
    b.emit_branch(head);

    b.set_label(exit).unwrap();
    b.emit_return();

    assert_eq!(output_of(b), vec!["3", "2", "1"]);
}

// ══════════════════════════════════════════════════════════════════════════════
// Heap
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn alloc_bumps_by_rounded_size() {
    let mut b = FunctionBuilder::new("main");
    for size in [1, 0, 8] {
        b.emit_load_integer_immediate(size);
        b.emit_alloc();
        b.emit_output();
    }
    b.emit_return();

    // No static data: the stack starts at 0 and the heap at 1024.
    let (result, lines) = run(b);
    assert_eq!(lines, vec!["1024", "1028", "1032"]);
    assert_eq!(result.unwrap().heap_bytes_allocated, 16);
}

#[test]
fn negative_alloc_size_takes_one_word() {
    let mut b = FunctionBuilder::new("main");
    for size in [-8, 4] {
        b.emit_load_integer_immediate(size);
        b.emit_alloc();
        b.emit_output();
    }
    b.emit_return();

    let (result, lines) = run(b);
    assert_eq!(lines, vec!["1024", "1028"]);
    assert_eq!(result.unwrap().heap_bytes_allocated, 8);
}

#[test]
fn repeated_alloc_exhausts_heap() {
    const MARKER: i32 = 0x7f7f_7f7f;
    let mut b = FunctionBuilder::new("main");
    let head = b.create_label();
    b.set_label(head).unwrap();
    b.emit_load_integer_immediate(1000); // 0
    b.emit_alloc(); // 5
    b.emit_duplicate(); // 6
    b.emit_output(); // 7
    b.emit_load_integer_immediate(MARKER); // 8
    b.emit_store_integer(); // 13
    b.emit_branch(head); // 14
    b.emit_return();

    let mut context = context_with([b.create_function().unwrap()]);
    let layout = context.memory_image().unwrap().layout();
    let error = context.execute_function_top_level("main").unwrap_err();

    assert_eq!(
        error,
        VmError::Trap(rebar_vm::Trap {
            kind: TrapKind::HeapExhausted,
            ip: 5,
        })
    );
    assert_eq!(context.runtime_services().lines(), &["1024", "2024"]);

    // Only the first word of each successful block was written.
    let memory = context.memory_image().unwrap().memory();
    assert_eq!(memory.len(), layout.end);
    let marker = MARKER.to_le_bytes();
    assert_eq!(&memory[1024..1028], &marker);
    assert_eq!(&memory[2024..2028], &marker);
    assert!(memory[1028..2024].iter().all(|&byte| byte == 0));
    assert!(memory[2028..layout.end].iter().all(|&byte| byte == 0));
}

#[test]
fn heap_resets_between_invocations() {
    let mut b = FunctionBuilder::new("main");
    b.emit_load_integer_immediate(2000);
    b.emit_alloc();
    b.emit_output();
    b.emit_return();

    let mut context = context_with([b.create_function().unwrap()]);
    context.execute_function_top_level("main").unwrap();
    context.execute_function_top_level("main").unwrap();
    assert_eq!(context.runtime_services().lines(), &["1024", "1024"]);
}

#[test]
fn copy_static_string_to_heap_and_print() {
    let mut b = FunctionBuilder::new("main");
    let hello = b.define_static_data(StaticDataBuilder::new(b"hello".to_vec()));
    b.emit_load_integer_immediate(5);
    b.emit_alloc(); // [h]
    b.emit_duplicate(); // [h, h]
    b.emit_load_static_data_address(hello); // [h, h, s]
    b.emit_swap(); // [h, s, h]
    b.emit_load_integer_immediate(5); // [h, s, h, 5]
    b.emit_copy_bytes(); // [h]
    b.emit_load_integer_immediate(5);
    b.emit_output_string();
    b.emit_return();
    assert_eq!(output_of(b), vec!["hello"]);
}

// ══════════════════════════════════════════════════════════════════════════════
// Static data
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn exchange_bytes_swaps_regions() {
    let a = StaticDataIdentifier::labeled("a");
    let c = StaticDataIdentifier::labeled("c");
    let mut b = FunctionBuilder::new("main");
    let first = b.define_static_data(StaticDataBuilder::new(vec![1, 2, 3, 4]).with_identifier(a.clone()));
    let second = b.define_static_data(StaticDataBuilder::new(vec![5, 6, 7, 8]).with_identifier(c.clone()));
    b.emit_load_static_data_address(second);
    b.emit_load_static_data_address(first);
    b.emit_load_integer_immediate(4);
    b.emit_exchange_bytes();
    b.emit_return();

    let mut context = context_with([b.create_function().unwrap()]);
    context.execute_function_top_level("main").unwrap();
    assert_eq!(context.read_static_data(&a).unwrap(), vec![5, 6, 7, 8]);
    assert_eq!(context.read_static_data(&c).unwrap(), vec![1, 2, 3, 4]);
}

#[test]
fn static_blocks_read_back_in_either_load_order() {
    let hello = StaticDataIdentifier::labeled("hello");
    let rebar = StaticDataIdentifier::labeled("rebar");
    let alpha = greeter("alpha", "hello", &hello);
    let beta = greeter("beta", "rebar!", &rebar);

    for order in [[alpha.clone(), beta.clone()], [beta.clone(), alpha.clone()]] {
        let mut context = context_with(order);
        assert_eq!(context.read_static_data(&hello).unwrap(), b"hello");
        assert_eq!(context.read_static_data(&rebar).unwrap(), b"rebar!");

        context.execute_function_top_level("beta").unwrap();
        context.execute_function_top_level("alpha").unwrap();
        assert_eq!(context.runtime_services().lines(), &["rebar!", "hello"]);
    }
}

#[test]
fn linked_operands_hold_block_addresses() {
    let hello = StaticDataIdentifier::new();
    let rebar = StaticDataIdentifier::new();
    let mut loader = Loader::default();
    loader.load_function(greeter("beta", "rebar!", &rebar)).unwrap();
    loader.load_function(greeter("alpha", "hello", &hello)).unwrap();
    let image = loader.finalize().unwrap();

    // Sorted by name: alpha's 5 bytes at 0 (8 with padding), then beta's.
    assert_eq!(image.static_data_location(&hello), Some((0, 5)));
    assert_eq!(image.static_data_location(&rebar), Some((8, 6)));
    for (name, address) in [("alpha", 0), ("beta", 8)] {
        let function = image.function(name).unwrap();
        assert!(function.is_patched());
        let load = Instruction::decode_at(function.code(), 0).unwrap();
        assert_eq!(load.operand, Operand::DataAddress(address));
    }
    assert_eq!(image.layout().stack_start, 1024);
    assert_eq!(image.layout().heap_start, 2048);
    assert_eq!(image.memory().len(), 4096);
}

#[test]
fn writes_to_static_data_are_visible_after_execution() {
    let counter = StaticDataIdentifier::labeled("counter");
    let mut b = FunctionBuilder::new("main");
    let block = b.define_static_data(StaticDataBuilder::new(vec![0; 4]).with_identifier(counter.clone()));
    b.emit_load_static_data_address(block);
    b.emit_load_integer_immediate(0x0102_0304);
    b.emit_store_integer();
    b.emit_return();

    let mut context = context_with([b.create_function().unwrap()]);
    context.execute_function_top_level("main").unwrap();
    assert_eq!(context.read_static_data(&counter).unwrap(), vec![4, 3, 2, 1]);
}

#[test]
fn unknown_static_data_is_reported() {
    let context = context_with([]);
    let stranger = StaticDataIdentifier::new();
    assert_eq!(
        context.read_static_data(&stranger),
        Err(VmError::UnknownStaticData(stranger.clone()))
    );
}

// ══════════════════════════════════════════════════════════════════════════════
// Phases
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn execute_and_read_before_finalize_are_phase_violations() {
    let id = StaticDataIdentifier::new();
    let mut context = ExecutionContext::new(BufferedOutput::new());
    context.load_function(greeter("main", "hi", &id)).unwrap();

    assert_eq!(
        context.execute_function_top_level("main"),
        Err(VmError::PhaseViolation {
            operation: "execute_function_top_level",
            phase: LoadPhase::Loading,
        })
    );
    assert!(matches!(
        context.read_static_data(&id),
        Err(VmError::PhaseViolation { phase: LoadPhase::Loading, .. })
    ));
    assert_eq!(context.phase(), LoadPhase::Loading);
    assert!(context.runtime_services().lines().is_empty());

    // Still loadable and finalizable afterwards.
    context.finalize_load().unwrap();
    context.execute_function_top_level("main").unwrap();
    assert_eq!(context.runtime_services().lines(), &["hi"]);
}

#[test]
fn load_and_finalize_after_finalize_are_phase_violations() {
    let id = StaticDataIdentifier::new();
    let mut context = context_with([greeter("main", "hi", &id)]);

    assert_eq!(
        context.load_function(greeter("late", "no", &StaticDataIdentifier::new())),
        Err(VmError::PhaseViolation {
            operation: "load_function",
            phase: LoadPhase::Finalized,
        })
    );
    assert!(matches!(
        context.finalize_load(),
        Err(VmError::PhaseViolation { operation: "finalize_load", .. })
    ));

    let image = context.memory_image().unwrap();
    assert!(image.function("late").is_none());
    assert_eq!(context.read_static_data(&id).unwrap(), b"hi");
}

#[test]
fn unknown_function_is_reported() {
    let mut context = context_with([]);
    assert_eq!(
        context.execute_function_top_level("missing"),
        Err(VmError::UnknownFunction("missing".into()))
    );
}

#[test]
fn later_load_replaces_function_of_same_name() {
    let first = StaticDataIdentifier::new();
    let second = StaticDataIdentifier::new();
    let mut context = context_with([
        greeter("main", "first", &first),
        greeter("main", "second", &second),
    ]);
    context.execute_function_top_level("main").unwrap();
    assert_eq!(context.runtime_services().lines(), &["second"]);
    assert!(matches!(
        context.read_static_data(&first),
        Err(VmError::UnknownStaticData(_))
    ));
}

// ══════════════════════════════════════════════════════════════════════════════
// Traps
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn divide_by_zero_traps_at_divide() {
    let mut b = FunctionBuilder::new("main");
    b.emit_load_integer_immediate(1);
    b.emit_load_integer_immediate(0);
    b.emit_divide(); // 10
    b.emit_output();
    b.emit_return();
    assert_eq!(trap_of(b), (TrapKind::DivideByZero, 10));
}

#[test]
fn min_divided_by_minus_one_traps() {
    let mut b = FunctionBuilder::new("main");
    b.emit_load_integer_immediate(i32::MIN);
    b.emit_load_integer_immediate(-1);
    b.emit_divide();
    b.emit_return();
    assert_eq!(trap_of(b), (TrapKind::ArithmeticOverflow, 10));
}

#[test]
fn operand_stack_underflow() {
    let mut b = FunctionBuilder::new("main");
    b.emit_load_integer_immediate(1);
    b.emit_add(); // 5
    b.emit_return();
    assert_eq!(trap_of(b), (TrapKind::OperandStackUnderflow, 5));
}

#[test]
fn frame_larger_than_stack_overflows() {
    let mut b = FunctionBuilder::new("main");
    b.set_local_sizes(vec![1000, 100]);
    b.emit_return();
    assert_eq!(trap_of(b), (TrapKind::StackOverflow, 0));
}

#[test]
fn frame_filling_the_stack_exactly_is_fine() {
    let mut b = FunctionBuilder::new("main");
    b.set_local_sizes(vec![1024]);
    b.emit_return();
    assert!(run(b).0.is_ok());
}

#[test]
fn exchange_scratch_must_fit_above_frame() {
    let mut b = FunctionBuilder::new("main");
    b.set_local_sizes(vec![1020, 4]);
    b.emit_load_local_address(0);
    b.emit_load_local_address(1);
    b.emit_load_integer_immediate(4);
    b.emit_exchange_bytes(); // 9
    b.emit_return();
    assert_eq!(trap_of(b), (TrapKind::StackOverflow, 9));
}

#[test]
fn out_of_bounds_store_is_caught_before_writing() {
    let mut b = FunctionBuilder::new("main");
    b.emit_load_integer_immediate(3070);
    b.emit_load_integer_immediate(-1);
    b.emit_store_integer(); // 10
    b.emit_return();

    let mut context = context_with([b.create_function().unwrap()]);
    let error = context.execute_function_top_level("main").unwrap_err();
    assert_eq!(
        error.trap_kind(),
        Some(&TrapKind::MemoryOutOfBounds { address: 3070, len: 4 })
    );
    let memory = context.memory_image().unwrap().memory();
    assert!(memory[3064..].iter().all(|&byte| byte == 0));
}

#[test]
fn output_string_rejects_invalid_utf8() {
    let mut b = FunctionBuilder::new("main");
    let bad = b.define_static_data(StaticDataBuilder::new(vec![0xff, 0xfe]));
    b.emit_load_static_data_address(bad);
    b.emit_load_integer_immediate(2);
    b.emit_output_string(); // 10
    b.emit_return();
    assert_eq!(trap_of(b), (TrapKind::InvalidUtf8, 10));
}

#[test]
fn instruction_limit_stops_infinite_loop() {
    let mut b = FunctionBuilder::new("spin");
    let head = b.create_label();
    b.set_label(head).unwrap();
    b.emit_branch(head);
    b.emit_return();

    let config = VmConfig {
        instruction_limit: Some(100),
        ..VmConfig::default()
    };
    let mut context = ExecutionContext::with_config(BufferedOutput::new(), config).unwrap();
    context.load_function(b.create_function().unwrap()).unwrap();
    context.finalize_load().unwrap();
    let error = context.execute_function_top_level("spin").unwrap_err();
    assert_eq!(
        error,
        VmError::Trap(rebar_vm::Trap {
            kind: TrapKind::InstructionLimitExceeded,
            ip: 0,
        })
    );
}

// ══════════════════════════════════════════════════════════════════════════════
// Configuration
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn config_from_partial_json_keeps_defaults() {
    let config = VmConfig::from_json(r#"{ "heap_size": 4096, "instruction_limit": 10 }"#).unwrap();
    assert_eq!(config.heap_size, 4096);
    assert_eq!(config.instruction_limit, Some(10));
    assert_eq!(config.stack_size, 1024);
    assert_eq!(config.data_segment_alignment, 1024);
}

#[test]
fn config_rejects_malformed_and_invalid_json() {
    assert!(matches!(VmConfig::from_json("{ heap"), Err(VmError::InvalidConfig(_))));
    assert!(matches!(
        VmConfig::from_json(r#"{ "static_data_alignment": 0 }"#),
        Err(VmError::InvalidConfig(_))
    ));
}

#[test]
fn configured_sizes_shape_the_image() {
    let config = VmConfig::from_json(r#"{ "stack_size": 64, "heap_size": 128, "data_segment_alignment": 16 }"#)
        .unwrap();
    let mut context = ExecutionContext::with_config(BufferedOutput::new(), config).unwrap();
    context
        .load_function(greeter("main", "hi", &StaticDataIdentifier::new()))
        .unwrap();
    context.finalize_load().unwrap();

    let layout = context.memory_image().unwrap().layout();
    assert_eq!((layout.stack_start, layout.heap_start, layout.end), (16, 80, 208));
}
