//! End-to-end execution scenarios against raw script bytes.

use oxneo_vm::{ExecutionEngine, Script, StackItem, VmState};

fn run(bytes: &[u8]) -> ExecutionEngine {
    let mut engine = ExecutionEngine::new();
    engine
        .load_script(Script::new(bytes.to_vec()), -1)
        .expect("load");
    engine.execute();
    engine
}

#[test]
fn push_push_add_halts_with_three() {
    // PUSH1 PUSH2 ADD
    let engine = run(&[0x11, 0x12, 0x9e]);
    assert_eq!(engine.state(), VmState::Halt);
    let top = engine.result_stack().peek(0).unwrap();
    assert_eq!(top.get_integer(32).unwrap(), 3.into());
}

#[test]
fn divide_by_zero_faults() {
    // PUSH1 PUSH0 DIV
    let engine = run(&[0x11, 0x10, 0xa1]);
    assert_eq!(engine.state(), VmState::Fault);
}

#[test]
fn modulo_by_zero_faults() {
    // PUSH1 PUSH0 MOD
    let engine = run(&[0x11, 0x10, 0xa2]);
    assert_eq!(engine.state(), VmState::Fault);
}

#[test]
fn throw_caught_by_try_catch() {
    // PUSHNULL; TRY(catch=+5); THROW; (catch:) DROP PUSH1; ENDTRY(+2)
    let script = [
        0x0b, // 0: PUSHNULL
        0x3b, 0x05, 0x00, // 1..3: TRY catch=1+5=6
        0x3a, // 4: THROW
        0x21, // 5: NOP (skipped)
        0x45, // 6: DROP (catch entry, drops the exception)
        0x11, // 7: PUSH1
        0x3d, 0x02, // 8: ENDTRY end=8+2=10 (end of script)
    ];
    let mut engine = ExecutionEngine::new();
    engine
        .load_script(Script::new(script.to_vec()), -1)
        .unwrap();
    engine.execute();
    assert_eq!(engine.state(), VmState::Halt, "{:?}", engine.fault_reason());
    assert_eq!(engine.result_stack().len(), 1);
    let top = engine.result_stack().peek(0).unwrap();
    assert_eq!(top.get_integer(32).unwrap(), 1.into());
}

#[test]
fn uncaught_throw_faults() {
    // PUSH1 THROW
    let engine = run(&[0x11, 0x3a]);
    assert_eq!(engine.state(), VmState::Fault);
}

#[test]
fn finally_runs_on_endtry() {
    // TRY(no catch, finally=+4); PUSH1; ENDTRY(+4); (finally:) PUSH2; ENDFINALLY
    let script = [
        0x3b, 0x00, 0x06, // 0: TRY finally at 6
        0x11, // 3: PUSH1
        0x3d, 0x04, // 4: ENDTRY end=4+4=8 (end of script)
        0x12, // 6: PUSH2 (finally body)
        0x3f, // 7: ENDFINALLY
    ];
    let engine = run(&script);
    assert_eq!(engine.state(), VmState::Halt, "{:?}", engine.fault_reason());
    // Both pushes survive: 1 from the body, 2 from the finally block.
    assert_eq!(engine.result_stack().len(), 2);
    assert_eq!(
        engine.result_stack().peek(0).unwrap().get_integer(32).unwrap(),
        2.into()
    );
}

#[test]
fn finally_runs_during_unwinding_then_faults() {
    // An uncaught throw still executes the finally block on the way out.
    let script = [
        0x3b, 0x00, 0x07, // 0: TRY finally at 7
        0x0b, // 3: PUSHNULL
        0x3a, // 4: THROW
        0x21, // 5: NOP
        0x21, // 6: NOP
        0x12, // 7: PUSH2 (finally body)
        0x3f, // 8: ENDFINALLY rethrows
    ];
    let engine = run(&script);
    assert_eq!(engine.state(), VmState::Fault);
}

#[test]
fn reference_counter_cycle_reclaimed_by_script() {
    // Build A, make A reference itself, then drop it. The sweep after DROP
    // must reclaim the cycle; PUSH1 leaves a clean result.
    let script = [
        0xc2, // NEWARRAY0          -> A
        0x4a, // DUP                -> A A
        0x4a, // DUP                -> A A A
        0xcf, // APPEND             -> A      (A now holds A)
        0x45, // DROP               -> empty; cycle must be collected
        0x11, // PUSH1
    ];
    let engine = run(&script);
    assert_eq!(engine.state(), VmState::Halt, "{:?}", engine.fault_reason());
    assert_eq!(engine.result_stack().len(), 1);
    // Only the result item remains counted.
    assert_eq!(engine.reference_counter().borrow().count(), 1);
    assert_eq!(engine.reference_counter().borrow().tracked_count(), 0);
}

#[test]
fn call_and_ret_share_the_stack() {
    let script = [
        0x34, 0x03, // 0: CALL +3 -> 3
        0x40, // 2: RET
        0x15, // 3: PUSH5
        0x40, // 4: RET
    ];
    let engine = run(&script);
    assert_eq!(engine.state(), VmState::Halt, "{:?}", engine.fault_reason());
    assert_eq!(
        engine.result_stack().peek(0).unwrap().get_integer(32).unwrap(),
        5.into()
    );
}

#[test]
fn initslot_moves_arguments() {
    // PUSH7; INITSLOT 0 locals, 1 arg; LDARG0; (implicit RET)
    let script = [
        0x17, // PUSH7
        0x57, 0x00, 0x01, // INITSLOT locals=0 args=1
        0x78, // LDARG0
    ];
    let engine = run(&script);
    assert_eq!(engine.state(), VmState::Halt, "{:?}", engine.fault_reason());
    assert_eq!(
        engine.result_stack().peek(0).unwrap().get_integer(32).unwrap(),
        7.into()
    );
}

#[test]
fn jmpif_takes_branch() {
    // PUSHT; JMPIF +3; PUSH1(skipped); PUSH2
    let script = [
        0x08, // 0: PUSHT
        0x24, 0x03, // 1: JMPIF -> 4
        0x11, // 3: PUSH1 (skipped)
        0x12, // 4: PUSH2
    ];
    let engine = run(&script);
    assert_eq!(engine.state(), VmState::Halt);
    assert_eq!(engine.result_stack().len(), 1);
    assert_eq!(
        engine.result_stack().peek(0).unwrap().get_integer(32).unwrap(),
        2.into()
    );
}

#[test]
fn out_of_gas_faults() {
    let mut engine = ExecutionEngine::new();
    engine.set_gas_limit(10);
    engine
        .load_script(Script::new(vec![0x11, 0x12, 0x9e]), -1)
        .unwrap();
    engine.execute();
    assert_eq!(engine.state(), VmState::Fault);
}

#[test]
fn invalid_opcode_faults() {
    let engine = run(&[0x11, 0xff]);
    assert_eq!(engine.state(), VmState::Fault);
}

#[test]
fn stack_underflow_faults() {
    // ADD with one operand.
    let engine = run(&[0x11, 0x9e]);
    assert_eq!(engine.state(), VmState::Fault);
}

#[test]
fn integer_overflow_faults() {
    // Square a 256-bit number: PUSHINT256(max) DUP MUL overflows 32 bytes.
    let mut script = vec![0x05];
    script.extend([0x7f; 32]);
    script.extend([0x4a, 0xa0]); // DUP MUL
    let engine = run(&script);
    assert_eq!(engine.state(), VmState::Fault);
}

#[test]
fn abort_is_uncatchable() {
    // TRY(catch=+4); ABORT - the catch must not see it.
    let script = [
        0x3b, 0x04, 0x00, // TRY catch at 4
        0x38, // ABORT
        0x11, // catch body (never reached)
    ];
    let engine = run(&script);
    assert_eq!(engine.state(), VmState::Fault);
}

#[test]
fn struct_append_copies_value() {
    // Build a struct, append it to an array, mutate the original, and
    // check the array's copy kept the old contents.
    let script = [
        0xc2, // NEWARRAY0                       -> arr
        0x4a, // DUP                              -> arr arr
        0xc5, // NEWSTRUCT0                       -> arr arr st
        0x4a, // DUP                              -> arr arr st st
        0x11, // PUSH1                            -> arr arr st st 1
        0xcf, // APPEND (st gets 1)               -> arr arr st
        0xcf, // APPEND (arr gets copy of st)     -> arr
        0x10, // PUSH0                            -> arr 0
        0xce, // PICKITEM                         -> st-copy
        0xca, // SIZE                             -> 1
    ];
    let engine = run(&script);
    assert_eq!(engine.state(), VmState::Halt, "{:?}", engine.fault_reason());
    assert_eq!(
        engine.result_stack().peek(0).unwrap().get_integer(32).unwrap(),
        1.into()
    );
}

#[test]
fn newbuffer_and_setitem() {
    // NEWBUFFER(3); DUP; PUSH0; PUSH16; SETITEM; PUSH0; PICKITEM
    let script = [
        0x13, // PUSH3
        0x88, // NEWBUFFER
        0x4a, // DUP
        0x10, // PUSH0
        0x20, // PUSH16
        0xd0, // SETITEM buffer[0] = 16
        0x10, // PUSH0
        0xce, // PICKITEM
    ];
    let engine = run(&script);
    assert_eq!(engine.state(), VmState::Halt, "{:?}", engine.fault_reason());
    assert_eq!(
        engine.result_stack().peek(0).unwrap().get_integer(32).unwrap(),
        16.into()
    );
}

#[test]
fn equal_is_reference_for_arrays_structural_for_structs() {
    // Two empty arrays are not EQUAL.
    let engine = run(&[0xc2, 0xc2, 0x97]);
    assert_eq!(engine.state(), VmState::Halt);
    assert!(!engine.result_stack().peek(0).unwrap().get_boolean());

    // Two empty structs are EQUAL.
    let engine = run(&[0xc5, 0xc5, 0x97]);
    assert_eq!(engine.state(), VmState::Halt);
    assert!(engine.result_stack().peek(0).unwrap().get_boolean());
}

#[test]
fn all_items_move_to_result_stack() {
    let engine = run(&[0x11, 0x12]);
    assert_eq!(engine.state(), VmState::Halt);
    assert_eq!(engine.result_stack().len(), 2);
}

#[test]
fn stack_item_conversion_convert_opcode() {
    // PUSH5; CONVERT ByteString; SIZE -> 1
    let script = [0x15, 0xdb, 0x28, 0xca];
    let engine = run(&script);
    assert_eq!(engine.state(), VmState::Halt, "{:?}", engine.fault_reason());
    assert_eq!(
        engine.result_stack().peek(0).unwrap().get_integer(32).unwrap(),
        1.into()
    );
}

#[test]
fn deep_stack_shuffles() {
    // PUSH1 PUSH2 PUSH3 ROT -> stack [2 3 1] top..bottom: 1,3,2? ROT moves
    // third to top: [1,2,3] -> [2,3,1] with 1 on top.
    let script = [0x11, 0x12, 0x13, 0x51];
    let engine = run(&script);
    assert_eq!(engine.state(), VmState::Halt);
    assert_eq!(
        engine.result_stack().peek(0).unwrap().get_integer(32).unwrap(),
        1.into()
    );
    assert_eq!(
        engine.result_stack().peek(1).unwrap().get_integer(32).unwrap(),
        3.into()
    );
    assert_eq!(
        engine.result_stack().peek(2).unwrap().get_integer(32).unwrap(),
        2.into()
    );
}

#[test]
fn checksig_pushes_false_without_valid_signature() {
    let mut engine = ExecutionEngine::new();
    engine.set_container_digest([7u8; 32]);
    // Push garbage signature and key, then CHECKSIG.
    let mut script = vec![0x0c, 64];
    script.extend([0u8; 64]);
    script.extend([0x0c, 33]);
    script.extend([2u8; 33]);
    script.push(0xad);
    engine.load_script(Script::new(script), -1).unwrap();
    engine.execute();
    assert_eq!(engine.state(), VmState::Halt, "{:?}", engine.fault_reason());
    assert!(!engine.result_stack().peek(0).unwrap().get_boolean());
}

#[test]
fn pusha_and_calla() {
    // 0: PUSHA(+7 -> 7); 5: CALLA; 6: RET; 7: PUSH9; 8: RET
    let script = [
        0x0a, 0x07, 0x00, 0x00, 0x00, // 0: PUSHA -> 7
        0x36, // 5: CALLA
        0x40, // 6: RET
        0x19, // 7: PUSH9
        0x40, // 8: RET
    ];
    let engine = run(&script);
    assert_eq!(engine.state(), VmState::Halt, "{:?}", engine.fault_reason());
    assert_eq!(
        engine.result_stack().peek(0).unwrap().get_integer(32).unwrap(),
        9.into()
    );
}
